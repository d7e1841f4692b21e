//! Request building and authenticated HTTP fetching with retry/backoff.

pub mod fetcher;
pub mod secrets;
pub mod template;
pub mod transport;

pub use fetcher::HttpFetcher;
pub use secrets::{EnvSecretResolver, SecretError, SecretResolver, StaticSecretResolver};
pub use template::{ResolvedRequest, TemplateError};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
