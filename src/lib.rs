pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod index;
pub mod organize;
pub mod preview;
pub mod progress;
pub mod protocol;
pub mod qa;
pub mod reader;
pub mod record;
pub mod scanner;
pub mod table;
pub mod utils;

pub use config::AppConfig;
pub use engine::{RunEngine, RunStatus, RunSummary};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
pub use record::InstanceRecord;
