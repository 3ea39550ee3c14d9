//! Terminal implementation of the dialog host
//!
//! Stdin is shared between the REPL prompt and the dialogs, and agent events
//! are printed from the same task so the transcript stays in order.

use async_trait::async_trait;
use crossterm::style::Stylize;
use scribe_core::{AgentEvent, Decision, DiffLine, DiffOp, DialogHost, PendingWrite};
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc::UnboundedReceiver;

/// Unchanged lines shown around each change
const DIFF_CONTEXT: usize = 3;

/// Line reader over stdin shared by every prompt.
pub struct Input {
    lines: tokio::sync::Mutex<Lines<BufReader<Stdin>>>,
}

impl Input {
    pub fn stdin() -> Self {
        Self {
            lines: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    /// Print `prompt` and read one line; `None` on end of input.
    pub async fn read_line(&self, prompt: &str) -> anyhow::Result<Option<String>> {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        let mut lines = self.lines.lock().await;
        Ok(lines.next_line().await?)
    }
}

/// Prints agent events as they arrive.
pub struct Console {
    events: Mutex<UnboundedReceiver<AgentEvent>>,
    streaming: bool,
    mid_line: AtomicBool,
}

impl Console {
    pub fn new(events: UnboundedReceiver<AgentEvent>, streaming: bool) -> Self {
        Self {
            events: Mutex::new(events),
            streaming,
            mid_line: AtomicBool::new(false),
        }
    }

    /// Print every event queued so far.
    pub fn drain(&self) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        while let Ok(event) = events.try_recv() {
            self.print(event);
        }
        let _ = std::io::stdout().flush();
    }

    fn end_line(&self) {
        if self.mid_line.swap(false, Ordering::SeqCst) {
            println!();
        }
    }

    fn print(&self, event: AgentEvent) {
        match event {
            AgentEvent::TextDelta(text) => {
                print!("{}", text);
                self.mid_line.store(!text.ends_with('\n'), Ordering::SeqCst);
            }
            AgentEvent::ModelText(text) => {
                if self.streaming {
                    self.end_line();
                } else {
                    println!("{}", text);
                }
            }
            AgentEvent::ToolRequested(call) => {
                self.end_line();
                println!("{}", format!("→ {}", call.name).dark_grey());
            }
            AgentEvent::ToolFinished { name, result, .. } => {
                self.end_line();
                println!("{}", format!("← {}: {}", name, first_line(&result)).dark_grey());
            }
            AgentEvent::Transcribed(instruction) => {
                self.end_line();
                println!("{} {}", "Heard:".bold(), instruction);
            }
            AgentEvent::IterationLimit(rounds) => {
                self.end_line();
                println!(
                    "{}",
                    format!("Stopped after {} tool rounds (iteration limit).", rounds).yellow()
                );
            }
        }
    }

    /// Finish a streamed line, if one is open.
    pub fn finish(&self) {
        self.drain();
        self.end_line();
    }
}

fn first_line(text: &str) -> String {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default().to_string();
    if lines.next().is_some() {
        format!("{} …", first)
    } else {
        first
    }
}

/// One printable row of a collapsed diff.
#[derive(Debug, PartialEq, Eq)]
enum Row<'a> {
    Line(&'a DiffLine),
    Skipped(usize),
}

/// Keep changes plus `context` unchanged lines around them.
fn collapse(diff: &[DiffLine], context: usize) -> Vec<Row<'_>> {
    let changed: Vec<usize> = diff
        .iter()
        .enumerate()
        .filter(|(_, l)| l.op != DiffOp::Equal)
        .map(|(i, _)| i)
        .collect();
    let near_change = |i: usize| changed.iter().any(|&c| c.abs_diff(i) <= context);

    let mut rows = Vec::new();
    let mut skipped = 0;
    for (i, line) in diff.iter().enumerate() {
        if line.op != DiffOp::Equal || near_change(i) {
            if skipped > 0 {
                rows.push(Row::Skipped(skipped));
                skipped = 0;
            }
            rows.push(Row::Line(line));
        } else {
            skipped += 1;
        }
    }
    if skipped > 0 {
        rows.push(Row::Skipped(skipped));
    }
    rows
}

pub struct TerminalHost {
    input: std::sync::Arc<Input>,
    console: std::sync::Arc<Console>,
}

impl TerminalHost {
    pub fn new(input: std::sync::Arc<Input>, console: std::sync::Arc<Console>) -> Self {
        Self { input, console }
    }

    fn print_diff(pending: &PendingWrite) {
        for row in collapse(&pending.diff, DIFF_CONTEXT) {
            match row {
                Row::Line(line) => match line.op {
                    DiffOp::Insert => println!("{}", line.to_string().green()),
                    DiffOp::Delete => println!("{}", line.to_string().red()),
                    DiffOp::Equal => println!("{}", line.to_string().dark_grey()),
                },
                Row::Skipped(n) => {
                    println!("{}", format!("  ⋯ {} unchanged lines", n).dark_grey())
                }
            }
        }
    }
}

#[async_trait]
impl DialogHost for TerminalHost {
    async fn confirm_write(&self, pending: &PendingWrite) -> Decision {
        self.console.finish();
        println!();
        println!(
            "{}",
            format!("Review {} for: {}", pending.action.label(), pending.path).bold()
        );
        let summary = pending.summary();
        if summary.is_identical() {
            println!("{}", "The proposed content matches the current file.".yellow());
        } else {
            Self::print_diff(pending);
        }
        println!("{}", summary.to_string().dark_grey());

        match self.input.read_line("Confirm & proceed? [y/N] ").await {
            Ok(Some(answer)) if matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") => {
                Decision::Confirmed
            }
            Ok(_) => Decision::Cancelled,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read confirmation");
                Decision::Cancelled
            }
        }
    }

    async fn ask(&self, questions: &str) -> Option<String> {
        self.console.finish();
        println!();
        println!("{}", "The assistant has some questions:".bold());
        println!("{}", questions);
        println!(
            "{}",
            "Type your answers and finish with a line containing only '.'. \
             An empty first line keeps the suggested answers; /cancel skips."
                .dark_grey()
        );

        let mut answer = Vec::new();
        loop {
            let prompt = if answer.is_empty() { "? " } else { "  " };
            let line = match self.input.read_line(prompt).await {
                Ok(Some(line)) => line,
                Ok(None) if answer.is_empty() => return None,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read answer");
                    return None;
                }
            };
            match line.trim() {
                "/cancel" => return None,
                "" if answer.is_empty() => return Some(questions.to_string()),
                "." => break,
                _ => answer.push(line),
            }
        }
        Some(answer.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::line_diff;

    #[test]
    fn test_collapse_hides_far_unchanged_lines() {
        let old: Vec<String> = (1..=20).map(|i| format!("line{i}")).collect();
        let mut new = old.clone();
        new[9] = "changed".to_string();
        let diff = line_diff(&old.join("\n"), &new.join("\n"));

        let rows = collapse(&diff, 3);

        assert_eq!(rows.first(), Some(&Row::Skipped(6)));
        assert_eq!(rows.last(), Some(&Row::Skipped(7)));
        let shown = rows.iter().filter(|r| matches!(r, Row::Line(_))).count();
        assert_eq!(shown, 3 + 2 + 3);
    }

    #[test]
    fn test_collapse_new_file_shows_everything() {
        let diff = line_diff("", "a\nb");
        assert!(collapse(&diff, 3).iter().all(|r| matches!(r, Row::Line(_))));
    }

    #[test]
    fn test_first_line_marks_truncation() {
        assert_eq!(first_line("one"), "one");
        assert_eq!(first_line("one\ntwo"), "one …");
    }
}
