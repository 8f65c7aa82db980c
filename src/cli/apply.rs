//! Apply command for Arbor.
//!
//! Applies learning events, either one given on the command line or a
//! JSONL batch, and reports the outcome of each.

use std::path::Path;

use serde::Serialize;

use crate::cli::exit_code_for;
use crate::core::{LearningEvent, Outcome, ProgressionEngine};
use crate::error::{exit_codes, ArborError, Result};
use crate::storage::ProgressStore;
use crate::util::read_to_string_limited;

/// Options for the apply command.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Result of applying one event.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyResult {
    pub student_id: String,
    pub source_event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output format for the apply command.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutput {
    /// Whether every event was applied.
    pub success: bool,
    /// Number of events applied (replays included).
    pub applied: usize,
    /// Number of events rejected.
    pub rejected: usize,
    /// Per-event results, in submission order.
    pub results: Vec<ApplyResult>,
    /// Error that stopped the batch, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Process exit code.
    #[serde(skip)]
    pub exit_code: i32,
}

/// Parse a JSONL file of learning events.
pub fn read_events_file(path: &Path) -> Result<Vec<LearningEvent>> {
    let content = read_to_string_limited(path)?;
    let mut events = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: LearningEvent = serde_json::from_str(line).map_err(|e| {
            ArborError::serde(format!(
                "failed to parse event on line {}: {}",
                line_num + 1,
                e
            ))
        })?;
        events.push(event);
    }
    Ok(events)
}

/// The apply command implementation.
pub struct ApplyCommand<S: ProgressStore> {
    engine: ProgressionEngine<S>,
}

impl<S: ProgressStore> ApplyCommand<S> {
    /// Create a new apply command.
    pub fn new(engine: ProgressionEngine<S>) -> Self {
        Self { engine }
    }

    /// Apply events in order.
    ///
    /// Rejected events are reported and the batch continues. Any other
    /// error (such as a storage failure) stops the batch.
    pub fn run(&self, events: &[LearningEvent]) -> ApplyOutput {
        let mut results = Vec::with_capacity(events.len());
        let mut rejected = 0;
        let mut exit_code = exit_codes::OK;
        let mut error = None;

        for event in events {
            let mut result = ApplyResult {
                student_id: event.student_id.clone(),
                source_event_id: event.source_event_id.clone(),
                outcome: None,
                error: None,
            };
            match self.engine.apply_event(event) {
                Ok(outcome) => result.outcome = Some(outcome),
                Err(err) if err.is_rejection() => {
                    rejected += 1;
                    exit_code = exit_code_for(&err);
                    result.error = Some(err.to_string());
                }
                Err(err) => {
                    exit_code = exit_code_for(&err);
                    result.error = Some(err.to_string());
                    error = Some(format!(
                        "stopped at event {}: {}",
                        event.source_event_id, err
                    ));
                    results.push(result);
                    break;
                }
            }
            results.push(result);
        }

        let applied = results.iter().filter(|r| r.outcome.is_some()).count();
        ApplyOutput {
            success: exit_code == exit_codes::OK,
            applied,
            rejected,
            results,
            error,
            exit_code,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ApplyOutput, options: &ApplyOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &ApplyOutput) -> String {
        let mut text = String::new();
        for result in &output.results {
            match (&result.outcome, &result.error) {
                (Some(outcome), _) => {
                    text.push_str(&format!(
                        "{} {}: +{} XP",
                        result.student_id, result.source_event_id, outcome.xp_awarded
                    ));
                    if !outcome.newly_unlocked.is_empty() {
                        text.push_str(&format!(
                            ", unlocked {}",
                            outcome.newly_unlocked.join(", ")
                        ));
                    }
                    if !outcome.newly_badged.is_empty() {
                        text.push_str(&format!(", badges {}", outcome.newly_badged.join(", ")));
                    }
                    text.push('\n');
                }
                (None, Some(error)) => {
                    text.push_str(&format!(
                        "{} {}: could not be recorded: {}\n",
                        result.student_id, result.source_event_id, error
                    ));
                }
                (None, None) => {}
            }
        }
        text.push_str(&format!(
            "{} applied, {} rejected\n",
            output.applied, output.rejected
        ));
        if let Some(error) = &output.error {
            text.push_str(&format!("Error: {}\n", error));
        }
        text
    }
}
