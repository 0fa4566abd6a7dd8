pub mod config;
pub mod engine;
pub mod error;
pub mod fs_ops;
pub mod hasher;
pub mod naming;
pub mod notification;
pub mod progress;
pub mod relocation;
pub mod resolution;
pub mod scanner;
pub mod storage;
pub mod utils;
pub mod watch;

pub use config::AppConfig;
pub use engine::{LibraryEngine, ScanSummary};
pub use error::Error;
pub use progress::{ScanReporter, SilentReporter};
