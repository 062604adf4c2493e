pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::SyncOptions;
pub use core::{SyncConfig, SyncEngine, SyncReport};
pub use error::SyncError;
pub use storage::{LocalTree, RemoteStore, S3Store};
