pub mod config;
pub mod error;
pub mod service;

pub use config::Config;
pub use error::{Error, Result};
pub use service::EventSubService;
