// Library interface for newsflash modules
// This allows tests and other binaries to import modules

pub mod classifier;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod item;
pub mod poller;
pub mod queue;
pub mod server;
pub mod sessions;
pub mod source;

pub use error::AlertError;
