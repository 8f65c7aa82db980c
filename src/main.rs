//! Arbor - skill-tree progression and companion engine
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use arbor::cli::apply::{read_events_file, ApplyCommand, ApplyOptions};
use arbor::cli::progress::{ProgressCommand, ProgressOptions};
use arbor::cli::reset::{ResetCommand, ResetOptions};
use arbor::cli::tick::{TickCommand, TickOptions};
use arbor::cli::validate::{ValidateCommand, ValidateOptions};
use arbor::cli::{exit_code_for, open_engine, resolve_course_path};
use arbor::config::{arbor_home, Config};
use arbor::core::LearningEvent;
use arbor::error::exit_codes;

// =============================================================================
// CLI Definition
// =============================================================================

/// Arbor - skill-tree progression and companion engine
#[derive(Parser)]
#[command(name = "arbor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Course data file (overrides course.path)
    #[arg(long, global = true)]
    course: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command.
#[derive(Args, Clone, Copy)]
struct OutputArgs {
    /// Output as JSON
    #[arg(long, short)]
    json: bool,
    /// Suppress output
    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check course data and print every violation found
    Validate {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Apply a learning event, or a JSONL file of events
    Apply {
        #[command(flatten)]
        output: OutputArgs,
        /// JSONL file with one learning event per line
        #[arg(long, conflicts_with_all = ["student", "event_id", "skill", "points", "track", "mastery"])]
        events: Option<PathBuf>,
        /// Student id
        #[arg(long, required_unless_present = "events")]
        student: Option<String>,
        /// Upstream event id (replays are no-ops)
        #[arg(long, required_unless_present = "events")]
        event_id: Option<String>,
        /// Skill id
        #[arg(long, required_unless_present = "events")]
        skill: Option<String>,
        /// Raw points before track weighting
        #[arg(long, required_unless_present = "events", allow_hyphen_values = true)]
        points: Option<i64>,
        /// Track used to weight points
        #[arg(long, required_unless_present = "events")]
        track: Option<String>,
        /// Demonstrated mastery percentage (0-100)
        #[arg(long)]
        mastery: Option<f64>,
    },

    /// Show a student's progress and what they can attempt next
    Progress {
        #[command(flatten)]
        output: OutputArgs,
        /// Student id
        student: String,
        /// Include the XP ledger
        #[arg(long)]
        ledger: bool,
    },

    /// Feed one daily consistency score to a student's companion
    Tick {
        #[command(flatten)]
        output: OutputArgs,
        /// Student id
        student: String,
        /// Consistency score between 0.0 and 1.0
        score: f64,
    },

    /// Reset one skill's mastery for a student (administrative)
    Reset {
        #[command(flatten)]
        output: OutputArgs,
        /// Student id
        student: String,
        /// Skill id
        skill: String,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();

    let config = Config::load();
    init_tracing(&config);

    match run(&config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("arbor error: {}", e);
            exit_code(exit_codes::ERROR)
        }
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over `logging.filter`.
fn init_tracing(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Set up the global panic handler.
///
/// On panic, logs to `$ARBOR_HOME/crash.log` and exits with the error code.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("arbor panic: {}", info);

        if let Some(home) = arbor_home() {
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::ERROR);
    }));
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn print(formatted: &str) {
    if !formatted.is_empty() {
        print!("{}", formatted);
    }
}

/// Run the CLI and return the exit code.
fn run(config: &Config) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    config.validate()?;

    let course_path = resolve_course_path(config, cli.course.as_deref());

    match cli.command {
        Commands::Validate { output } => run_validate(config, &course_path?, output),
        Commands::Apply {
            output,
            events,
            student,
            event_id,
            skill,
            points,
            track,
            mastery,
        } => {
            let events = match events {
                Some(path) => match read_events_file(&path) {
                    Ok(events) => events,
                    Err(e) => {
                        eprintln!("arbor error: {}", e);
                        return Ok(exit_code(exit_code_for(&e)));
                    }
                },
                None => {
                    let mut event = LearningEvent::new(
                        student.unwrap_or_default(),
                        event_id.unwrap_or_default(),
                        skill.unwrap_or_default(),
                        points.unwrap_or_default(),
                        track.unwrap_or_default(),
                    );
                    event.mastery = mastery;
                    vec![event]
                }
            };
            run_apply(config, &course_path?, &events, output)
        }
        Commands::Progress {
            output,
            student,
            ledger,
        } => run_progress(config, &course_path?, &student, ledger, output),
        Commands::Tick {
            output,
            student,
            score,
        } => run_tick(config, &course_path?, &student, score, output),
        Commands::Reset {
            output,
            student,
            skill,
        } => run_reset(config, &course_path?, &student, &skill, output),
    }
}

fn run_validate(
    config: &Config,
    course: &Path,
    output: OutputArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cmd = ValidateCommand::new(config.tracks.to_set());
    let options = ValidateOptions {
        json: output.json,
        quiet: output.quiet,
    };

    let result = cmd.run(course);
    print(&cmd.format_output(&result, &options));
    Ok(exit_code(result.exit_code))
}

fn run_apply(
    config: &Config,
    course: &Path,
    events: &[LearningEvent],
    output: OutputArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cmd = ApplyCommand::new(open_engine(config, course)?);
    let options = ApplyOptions {
        json: output.json,
        quiet: output.quiet,
    };

    let result = cmd.run(events);
    print(&cmd.format_output(&result, &options));
    Ok(exit_code(result.exit_code))
}

fn run_progress(
    config: &Config,
    course: &Path,
    student: &str,
    ledger: bool,
    output: OutputArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cmd = ProgressCommand::new(open_engine(config, course)?);
    let options = ProgressOptions {
        json: output.json,
        quiet: output.quiet,
        ledger,
    };

    let result = cmd.run(student, &options);
    print(&cmd.format_output(&result, &options));
    Ok(exit_code(result.exit_code))
}

fn run_tick(
    config: &Config,
    course: &Path,
    student: &str,
    score: f64,
    output: OutputArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cmd = TickCommand::new(open_engine(config, course)?);
    let options = TickOptions {
        json: output.json,
        quiet: output.quiet,
    };

    let result = cmd.run(student, score);
    print(&cmd.format_output(&result, &options));
    Ok(exit_code(result.exit_code))
}

fn run_reset(
    config: &Config,
    course: &Path,
    student: &str,
    skill: &str,
    output: OutputArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cmd = ResetCommand::new(open_engine(config, course)?);
    let options = ResetOptions {
        json: output.json,
        quiet: output.quiet,
    };

    let result = cmd.run(student, skill);
    print(&cmd.format_output(&result, &options));
    Ok(exit_code(result.exit_code))
}
