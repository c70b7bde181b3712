//! Line-oriented dialogue adapter: one JSON invocation in, one JSON outcome out.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::debug;

use crate::controller::SessionController;
use crate::core::session::Session;
use crate::core::types::{Invocation, Outcome};
use crate::io::record_store::RecordStore;

/// How a dialogue loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogueSummary {
    /// Invocations handed to the controller.
    pub invocations: u32,
    /// Lines that were not valid invocations.
    pub rejected_lines: u32,
    /// The last outcome was terminal.
    pub terminal: bool,
}

/// Drive `session` from `input` until EOF or a terminal outcome.
///
/// Blank lines are skipped. Malformed lines get an `{"error": ...}` reply and
/// never reach the controller, so they do not count as turns.
pub fn run_dialogue<S, R, W, F>(
    controller: &SessionController<S>,
    session: &mut Session,
    input: R,
    mut output: W,
    mut on_outcome: F,
) -> Result<DialogueSummary>
where
    S: RecordStore,
    R: BufRead,
    W: Write,
    F: FnMut(&Outcome),
{
    let mut summary = DialogueSummary {
        invocations: 0,
        rejected_lines: 0,
        terminal: false,
    };

    for line in input.lines() {
        let line = line.context("read dialogue input")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let invocation: Invocation = match serde_json::from_str(line) {
            Ok(invocation) => invocation,
            Err(err) => {
                debug!(error = %err, "rejected dialogue line");
                summary.rejected_lines += 1;
                write_line(&mut output, &json!({ "error": format!("invalid invocation: {err}") }))?;
                continue;
            }
        };

        let outcome = controller.invoke(session, &invocation);
        summary.invocations += 1;
        on_outcome(&outcome);
        write_line(&mut output, &outcome)?;
        if outcome.terminal {
            summary.terminal = true;
            break;
        }
    }

    Ok(summary)
}

fn write_line<W: Write, T: serde::Serialize>(output: &mut W, value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("serialize dialogue output")?;
    writeln!(output, "{line}").context("write dialogue output")?;
    output.flush().context("flush dialogue output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DenyReason;
    use crate::io::record_store::MemoryStore;
    use crate::test_support::{case_record, fraud_scenario};

    fn run(input: &str) -> (DialogueSummary, Vec<serde_json::Value>, Vec<Outcome>) {
        let controller = SessionController::new(
            fraud_scenario(),
            MemoryStore::new(vec![case_record("C-100", "blue")]),
        );
        let mut session = controller.start_session("s-1");
        let mut output = Vec::new();
        let mut seen = Vec::new();
        let summary = run_dialogue(
            &controller,
            &mut session,
            input.as_bytes(),
            &mut output,
            |outcome| seen.push(outcome.clone()),
        )
        .expect("dialogue");
        let lines = String::from_utf8(output)
            .expect("utf8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        (summary, lines, seen)
    }

    #[test]
    fn stops_after_terminal_outcome() {
        let input = concat!(
            r#"{"operation":"lookup_case","args":{"case_id":"C-100"}}"#,
            "\n",
            r#"{"operation":"verify_identity","args":{"answer":"red"}}"#,
            "\n\n",
            r#"{"operation":"verify_identity","args":{"answer":"green"}}"#,
            "\n",
            r#"{"operation":"read_transaction"}"#,
            "\n",
        );
        let (summary, lines, seen) = run(input);
        assert_eq!(summary.invocations, 3);
        assert!(summary.terminal);
        assert_eq!(lines.len(), 3);
        assert_eq!(
            seen[2].reason,
            Some(DenyReason::CeilingReached { max_attempts: 2 })
        );
        assert_eq!(lines[2]["reason"]["code"], "ceiling_reached");
    }

    #[test]
    fn malformed_lines_get_an_error_reply() {
        let input = "not json\n{\"operation\":\"lookup_case\",\"args\":{\"case_id\":\"C-100\"}}\n";
        let (summary, lines, _) = run(input);
        assert_eq!(summary.rejected_lines, 1);
        assert_eq!(summary.invocations, 1);
        assert!(lines[0]["error"].as_str().is_some_and(|e| e.contains("invalid invocation")));
        assert_eq!(lines[1]["session"]["turn"], 1);
        assert!(!summary.terminal);
    }
}
