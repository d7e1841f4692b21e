pub mod config;
pub mod error;
pub mod item;
pub mod outcome;

pub use config::*;
pub use error::ErrorCategory;
pub use item::IterationItem;
pub use outcome::*;
