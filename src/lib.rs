//! Lecture Cleaner - Batch Noise Reduction and Speech Enhancement
//!
//! Recordings are admitted to a [`Scheduler`] as tasks. A fixed pool of
//! workers runs each task through noise reduction, speech enhancement and
//! format export, then commits the result atomically next to the source.
//! Progress and completion arrive on an [`EventReceiver`].

pub mod audio;
pub mod config;
pub mod error;
pub mod processing;
pub mod progress;
pub mod scheduler;
pub mod task;
pub mod writer;

pub use config::{Args, Config};
pub use error::{CleanerError, EnqueueError, Result, StageError, WriteError};
pub use progress::{EventKind, EventReceiver, TaskEvent};
pub use scheduler::{Scheduler, SchedulerStats, ShutdownMode};
pub use task::{EnhancementLevel, NoiseLevel, OutputFormat, TaskId, TaskOptions, TaskSnapshot, TaskState};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// `info` by default, `debug` when verbose. `RUST_LOG` still wins.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .try_init()
        .ok();
}

pub fn get_library_info() -> LibraryInfo {
    LibraryInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct LibraryInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl std::fmt::Display for LibraryInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{} - {}", self.name, self.version, self.description)
    }
}
