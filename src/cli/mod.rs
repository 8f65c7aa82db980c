//! CLI commands for Arbor.
//!
//! Each command is a thin presentation layer over the engine:
//! - **Content**: validate (course data checks)
//! - **Events**: apply (learning events), tick (companion), reset (admin)
//! - **Read model**: progress (snapshot, frontier, ledger)

pub mod apply;
pub mod progress;
pub mod reset;
pub mod tick;
pub mod validate;

use std::path::{Path, PathBuf};

use crate::config::{event_log_path, Config};
use crate::core::{load, load_course_file, ProgressionEngine};
use crate::error::{exit_codes, ArborError, Result};
use crate::events::EventLog;
use crate::storage::FileProgressStore;

pub use apply::ApplyCommand;
pub use progress::ProgressCommand;
pub use reset::ResetCommand;
pub use tick::TickCommand;
pub use validate::ValidateCommand;

/// Map an error to the process exit code reported for it.
pub fn exit_code_for(err: &ArborError) -> i32 {
    match err {
        ArborError::Validation { .. } => exit_codes::VALIDATION,
        err if err.is_rejection() => exit_codes::REJECTED,
        _ => exit_codes::ERROR,
    }
}

/// Pick the course file: explicit flag first, then configuration.
pub fn resolve_course_path(config: &Config, explicit: Option<&Path>) -> Result<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| config.course.path.clone())
        .ok_or_else(|| {
            ArborError::config("no course data given (use --course or set course.path)")
        })
}

/// Load the course and open a file-backed engine under the data directory.
///
/// Notifications are appended to `<data_dir>/events.log`.
pub fn open_engine(
    config: &Config,
    course_path: &Path,
) -> Result<ProgressionEngine<FileProgressStore>> {
    let course = load_course_file(course_path)?;
    let (graph, _report) = load(&course, &config.tracks.to_set())?;

    let data_dir = config
        .data_dir()
        .ok_or_else(|| ArborError::config("could not determine data directory"))?;
    let store = FileProgressStore::open(&data_dir)?;

    Ok(ProgressionEngine::new(graph, store, config.companion.clone())?
        .with_sink(EventLog::new(event_log_path(&data_dir))))
}
