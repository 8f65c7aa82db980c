//! Reset command for Arbor.
//!
//! Administrative reset of one skill's mastery. XP, unlocks and badges
//! are kept.

use serde::Serialize;

use crate::cli::exit_code_for;
use crate::core::ProgressionEngine;
use crate::error::exit_codes;
use crate::storage::ProgressStore;

/// Options for the reset command.
#[derive(Debug, Clone, Default)]
pub struct ResetOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the reset command.
#[derive(Debug, Clone, Serialize)]
pub struct ResetOutput {
    pub success: bool,
    pub student_id: String,
    pub skill_id: String,
    /// Whether a non-zero mastery value was cleared.
    pub cleared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub exit_code: i32,
}

/// The reset command implementation.
pub struct ResetCommand<S: ProgressStore> {
    engine: ProgressionEngine<S>,
}

impl<S: ProgressStore> ResetCommand<S> {
    /// Create a new reset command.
    pub fn new(engine: ProgressionEngine<S>) -> Self {
        Self { engine }
    }

    /// Reset mastery of `skill_id` for `student_id`.
    pub fn run(&self, student_id: &str, skill_id: &str) -> ResetOutput {
        let (cleared, error, exit_code) = match self.engine.reset_mastery(student_id, skill_id) {
            Ok(cleared) => (cleared, None, exit_codes::OK),
            Err(err) => (false, Some(err.to_string()), exit_code_for(&err)),
        };
        ResetOutput {
            success: error.is_none(),
            student_id: student_id.to_string(),
            skill_id: skill_id.to_string(),
            cleared,
            error,
            exit_code,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ResetOutput, options: &ResetOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &ResetOutput) -> String {
        if let Some(error) = &output.error {
            format!("Reset failed: {}\n", error)
        } else if output.cleared {
            format!(
                "Mastery of {} reset for {}.\n",
                output.skill_id, output.student_id
            )
        } else {
            format!(
                "Mastery of {} was already zero for {}.\n",
                output.skill_id, output.student_id
            )
        }
    }
}
