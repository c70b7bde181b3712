//! Turn-gated conversational session engine.
//!
//! Keeps session records in `.turngate/records.json` and drives one
//! conversation at a time over stdin/stdout, one JSON invocation per line.

use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use turngate::dialogue::run_dialogue;
use turngate::engine::Engine;
use turngate::exit_codes;
use turngate::io::init::{InitOptions, init_engine};
use turngate::io::record_store::RecordStore;
use turngate::io::transcript::read_transcript;
use turngate::logging;
use turngate::validate::validate_project;

#[derive(Parser)]
#[command(
    name = "turngate",
    version,
    about = "Turn-gated conversational session engine"
)]
struct Cli {
    /// Project directory (contains .turngate/).
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.turngate/` with config and seed records if missing.
    Init {
        /// Overwrite existing config and records.
        #[arg(short, long)]
        force: bool,
        /// Built-in scenario name or path to a scenario TOML.
        #[arg(long)]
        scenario: Option<String>,
    },
    /// Check layout, config, scenario and records.
    Validate,
    /// Print every record as `key<TAB>status<TAB>outcome`.
    List,
    /// Print the tool catalogue as JSON.
    Tools,
    /// Run one conversation: JSON invocations on stdin, outcomes on stdout.
    Session {
        /// Session id (used for the transcript file name).
        #[arg(long)]
        id: Option<String>,
    },
    /// Print a session transcript.
    Transcript {
        /// Session id.
        session: String,
    },
}

fn main() {
    logging::init("warn");
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli.project_dir;
    match cli.command {
        Command::Init { force, scenario } => {
            let report = init_engine(&root, &InitOptions { force, scenario })?;
            println!(
                "initialized scenario '{}' ({} seeded records at {})",
                report.scenario,
                report.seeded,
                report.records_path.display()
            );
            Ok(exit_codes::OK)
        }
        Command::Validate => {
            let outcome = validate_project(&root)?;
            println!(
                "ok: scenario '{}', {} records ({} closed)",
                outcome.scenario, outcome.records, outcome.closed
            );
            Ok(exit_codes::OK)
        }
        Command::List => {
            let engine = Engine::open(&root)?;
            let records = engine
                .controller()
                .store()
                .load_all()
                .context("load records")?;
            for record in records {
                println!("{}\t{}\t{}", record.key, record.status, record.outcome);
            }
            Ok(exit_codes::OK)
        }
        Command::Tools => {
            let engine = Engine::open(&root)?;
            let tools = engine.controller().scenario().tools();
            let payload = serde_json::to_string_pretty(&tools).context("serialize tools")?;
            println!("{payload}");
            Ok(exit_codes::OK)
        }
        Command::Session { id } => cmd_session(&root, id),
        Command::Transcript { session } => {
            let engine = Engine::open(&root)?;
            for entry in read_transcript(engine.transcripts_dir(), &session)? {
                println!(
                    "{}",
                    serde_json::to_string(&entry).context("serialize transcript entry")?
                );
            }
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_session(root: &std::path::Path, id: Option<String>) -> Result<i32> {
    let engine = Engine::open(root)?;
    let id = id.unwrap_or_else(|| format!("session-{}", Utc::now().format("%Y%m%dT%H%M%S")));
    let controller = engine.controller();
    let mut session = controller.start_session(id);

    let stdin = io::stdin();
    let stdout = BufWriter::new(io::stdout().lock());
    let summary = run_dialogue(controller, &mut session, stdin.lock(), stdout, |outcome| {
        engine.record_transcript(outcome);
    })?;

    if summary.terminal {
        Ok(exit_codes::TERMINAL)
    } else {
        Ok(exit_codes::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["turngate", "init"]);
        assert!(matches!(
            cli.command,
            Command::Init {
                force: false,
                scenario: None
            }
        ));
        assert_eq!(cli.project_dir, PathBuf::from("."));
    }

    #[test]
    fn parse_init_force_with_scenario() {
        let cli = Cli::parse_from(["turngate", "init", "--force", "--scenario", "adventure"]);
        match cli.command {
            Command::Init { force, scenario } => {
                assert!(force);
                assert_eq!(scenario.as_deref(), Some("adventure"));
            }
            _ => panic!("expected init"),
        }
    }

    #[test]
    fn parse_session_with_project_dir() {
        let cli = Cli::parse_from([
            "turngate",
            "session",
            "--id",
            "call-7",
            "--project-dir",
            "/tmp/demo",
        ]);
        assert_eq!(cli.project_dir, PathBuf::from("/tmp/demo"));
        assert!(matches!(cli.command, Command::Session { id: Some(ref id) } if id == "call-7"));
    }

    #[test]
    fn parse_transcript_requires_session() {
        assert!(Cli::try_parse_from(["turngate", "transcript"]).is_err());
    }
}
