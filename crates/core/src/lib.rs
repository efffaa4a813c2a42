pub mod config;
pub mod error;
pub mod event;
pub mod paths;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{input_channel, updates_channel, SessionEvent};
pub use paths::Paths;
