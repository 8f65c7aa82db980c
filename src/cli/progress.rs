//! Progress command for Arbor.
//!
//! Shows a student's snapshot, the skills they can attempt next, and
//! optionally their XP ledger.

use serde::Serialize;

use crate::cli::exit_code_for;
use crate::core::{ProgressionEngine, StudentProgress, XpLedgerEntry};
use crate::error::{exit_codes, Result};
use crate::storage::ProgressStore;

/// Options for the progress command.
#[derive(Debug, Clone, Default)]
pub struct ProgressOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Include the XP ledger.
    pub ledger: bool,
}

/// Output format for the progress command.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<StudentProgress>,
    /// Skills eligible to unlock next.
    pub next_eligible: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger: Option<Vec<XpLedgerEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub exit_code: i32,
}

/// The progress command implementation.
pub struct ProgressCommand<S: ProgressStore> {
    engine: ProgressionEngine<S>,
}

impl<S: ProgressStore> ProgressCommand<S> {
    /// Create a new progress command.
    pub fn new(engine: ProgressionEngine<S>) -> Self {
        Self { engine }
    }

    /// Show progress for one student.
    pub fn run(&self, student_id: &str, options: &ProgressOptions) -> ProgressOutput {
        match self.collect(student_id, options.ledger) {
            Ok((progress, next_eligible, ledger)) => ProgressOutput {
                success: true,
                progress: Some(progress),
                next_eligible,
                ledger,
                error: None,
                exit_code: exit_codes::OK,
            },
            Err(err) => ProgressOutput {
                success: false,
                progress: None,
                next_eligible: Vec::new(),
                ledger: None,
                error: Some(err.to_string()),
                exit_code: exit_code_for(&err),
            },
        }
    }

    #[allow(clippy::type_complexity)]
    fn collect(
        &self,
        student_id: &str,
        with_ledger: bool,
    ) -> Result<(StudentProgress, Vec<String>, Option<Vec<XpLedgerEntry>>)> {
        let progress = self.engine.get_progress(student_id)?;
        let next_eligible = self.engine.graph().next_eligible_nodes(&progress);
        let ledger = if with_ledger {
            Some(self.engine.ledger(student_id)?)
        } else {
            None
        };
        Ok((progress, next_eligible, ledger))
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ProgressOutput, options: &ProgressOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &ProgressOutput) -> String {
        let Some(progress) = &output.progress else {
            return format!(
                "Progress unavailable: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        };

        let mut text = format!("Student: {}\n", progress.student_id);
        text.push_str(&format!("XP: {}\n", progress.xp_total));
        text.push_str(&format!(
            "Companion: {} ({} days in stage)\n",
            progress.companion.stage, progress.companion.days_in_stage
        ));
        text.push_str(&format!("Unlocked: {}\n", join_or_none(&progress.unlocked)));
        text.push_str(&format!("Badges: {}\n", join_or_none(&progress.badges)));
        text.push_str(&format!("Next: {}\n", join_or_none(&output.next_eligible)));

        if !progress.mastery.is_empty() {
            text.push_str("Mastery:\n");
            for (skill, percent) in &progress.mastery {
                text.push_str(&format!("  {}: {:.0}%\n", skill, percent));
            }
        }

        if let Some(ledger) = &output.ledger {
            text.push_str("Ledger:\n");
            for entry in ledger {
                text.push_str(&format!(
                    "  #{} {} {} +{} XP ({})\n",
                    entry.sequence,
                    entry.source_event_id,
                    entry.skill_id,
                    entry.amount,
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                ));
            }
        }
        text
    }
}

fn join_or_none<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    let joined = items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined
    }
}
