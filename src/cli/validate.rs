//! Validate command for Arbor.
//!
//! Loads course data and prints the itemized validation report without
//! touching any student records.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::cli::exit_code_for;
use crate::core::{load, load_course_file, ValidationReport};
use crate::error::{exit_codes, ArborError};

/// Options for the validate command.
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the validate command.
#[derive(Debug, Clone, Serialize)]
pub struct ValidateOutput {
    /// Whether the course loaded.
    pub success: bool,
    /// Number of skills in the loaded graph.
    pub skills: usize,
    /// Number of badge definitions.
    pub badges: usize,
    /// Every violation found.
    pub report: ValidationReport,
    /// Error message for failures other than validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Process exit code.
    #[serde(skip)]
    pub exit_code: i32,
}

impl ValidateOutput {
    fn failure(err: &ArborError) -> Self {
        let report = match err {
            ArborError::Validation { report } => report.clone(),
            _ => ValidationReport::default(),
        };
        let error = match err {
            ArborError::Validation { .. } => None,
            other => Some(other.to_string()),
        };
        Self {
            success: false,
            skills: 0,
            badges: 0,
            report,
            error,
            exit_code: exit_code_for(err),
        }
    }
}

/// The validate command implementation.
pub struct ValidateCommand {
    tracks: BTreeSet<String>,
}

impl ValidateCommand {
    /// Create a validate command for a set of configured tracks.
    pub fn new(tracks: BTreeSet<String>) -> Self {
        Self { tracks }
    }

    /// Validate the course file at `path`.
    pub fn run(&self, path: &Path) -> ValidateOutput {
        let result = load_course_file(path).and_then(|course| load(&course, &self.tracks));
        match result {
            Ok((graph, report)) => ValidateOutput {
                success: true,
                skills: graph.len(),
                badges: graph.badges().len(),
                report,
                error: None,
                exit_code: exit_codes::OK,
            },
            Err(err) => ValidateOutput::failure(&err),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ValidateOutput, options: &ValidateOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &ValidateOutput) -> String {
        if let Some(error) = &output.error {
            return format!("Validation failed: {}\n", error);
        }

        let mut text = if output.success {
            format!(
                "Course OK: {} skills, {} badges",
                output.skills, output.badges
            )
        } else {
            format!(
                "Course invalid: {} errors, {} warnings",
                output.report.errors.len(),
                output.report.warnings.len()
            )
        };
        text.push('\n');
        text.push_str(&output.report.to_string());
        text
    }
}
