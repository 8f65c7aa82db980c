//! Tick command for Arbor.
//!
//! Feeds one daily consistency score to a student's companion.

use serde::Serialize;

use crate::cli::exit_code_for;
use crate::core::{CompanionStage, Direction, ProgressionEngine, TransitionOutcome};
use crate::error::exit_codes;
use crate::storage::ProgressStore;

/// Options for the tick command.
#[derive(Debug, Clone, Default)]
pub struct TickOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the tick command.
#[derive(Debug, Clone, Serialize)]
pub struct TickOutput {
    pub success: bool,
    pub student_id: String,
    /// Stage after the tick.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<CompanionStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub exit_code: i32,
}

/// The tick command implementation.
pub struct TickCommand<S: ProgressStore> {
    engine: ProgressionEngine<S>,
}

impl<S: ProgressStore> TickCommand<S> {
    /// Create a new tick command.
    pub fn new(engine: ProgressionEngine<S>) -> Self {
        Self { engine }
    }

    /// Apply one tick.
    pub fn run(&self, student_id: &str, consistency_score: f64) -> TickOutput {
        let result = self
            .engine
            .tick_companion(student_id, consistency_score)
            .and_then(|transition| {
                let stage = self.engine.get_progress(student_id)?.companion.stage;
                Ok((stage, transition))
            });

        match result {
            Ok((stage, transition)) => TickOutput {
                success: true,
                student_id: student_id.to_string(),
                stage: Some(stage),
                transition,
                error: None,
                exit_code: exit_codes::OK,
            },
            Err(err) => TickOutput {
                success: false,
                student_id: student_id.to_string(),
                stage: None,
                transition: None,
                error: Some(err.to_string()),
                exit_code: exit_code_for(&err),
            },
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &TickOutput, options: &TickOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &TickOutput) -> String {
        match (&output.transition, output.stage) {
            (Some(t), _) => {
                let verb = match t.direction {
                    Direction::Advance => "advanced",
                    Direction::Decay => "decayed",
                };
                format!(
                    "{}: companion {} from {} to {}\n",
                    output.student_id, verb, t.from, t.to
                )
            }
            (None, Some(stage)) => format!("{}: companion stays {}\n", output.student_id, stage),
            (None, None) => format!(
                "Tick failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
