pub mod config;
pub mod constants;
pub mod error;
pub mod lines;

pub use config::LinkConfig;
pub use error::{Error, Result};
pub use lines::split_lines;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
