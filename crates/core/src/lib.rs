pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{RecError, RecResult};
pub use store::BookStore;
