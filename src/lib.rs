//! Turn a screenshot of a LeetCode problem into a solution with an explanation.
//!
//! The user's preferences shape a fixed prompt; the screenshot and the prompt go
//! to a multimodal model in a single request, and the returned markdown is kept
//! in the user's session for display and download.

use flexi_logger::{DeferredNow, Logger, LoggerHandle};
use log::Record;
use once_cell::sync::OnceCell;
use thiserror::Error;

pub mod app;
pub mod config;
pub mod preferences;
pub mod request;
pub mod scratch;
pub mod session;

pub use preferences::{PreferenceForm, Preferences, UploadedImage};
pub use request::Handler;
pub use session::{Credential, GenerationRecord, GenerationResult, GenerationState, Session};

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Please provide your OpenAI API key first.")]
    MissingCredential,
    #[error("Please upload a LeetCode problem screenshot to proceed.")]
    MissingImage,
    #[error("A solution is already being generated, wait for it to finish.")]
    Busy,
    #[error("Failed to generate a solution: {0:#}")]
    GenerationFailed(eyre::Report),
    #[error("Unsupported image `{0}`, expected a jpg, jpeg or png file.")]
    UnsupportedImage(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn log_format(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &Record,
) -> Result<(), std::io::Error> {
    write!(
        w,
        "{} [{}] {}: {}",
        now.format("%H:%M:%S%.3f"),
        record.level(),
        record.module_path().unwrap_or("<unnamed>"),
        record.args()
    )
}

/// Start logging to stderr. `RUST_LOG` wins over `spec` when it is set.
pub fn init_logger(spec: &str) -> eyre::Result<()> {
    static LOGGER: OnceCell<LoggerHandle> = OnceCell::new();
    LOGGER.get_or_try_init(|| -> eyre::Result<LoggerHandle> {
        let handle = Logger::try_with_env_or_str(spec)?
            .format(log_format)
            .start()?;
        Ok(handle)
    })?;
    Ok(())
}

pub fn init_debug_logger() -> eyre::Result<()> {
    init_logger("debug")
}
