//! Lean compiler output parsing.
//!
//! Lean reports messages as `<file>:<line>:<col>: <severity>: <text>`,
//! with the text continuing on following lines until the next header.

use std::sync::OnceLock;

use autoformal_core::{CompileDiagnostic, CompileOutcome, DiagnosticMessage, Severity, SourceLocation};
use regex::Regex;

/// Warning Lean attaches to any declaration that still uses `sorry`.
const SORRY_WARNING: &str = "declaration uses 'sorry'";

/// Raw output kept when a failing run printed nothing parseable.
const RAW_OUTPUT_LIMIT: usize = 2_000;

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<file>[^\s:][^:]*):(?P<line>\d+):(?P<col>\d+):\s*(?P<sev>error|warning|info|information)(?:\([^)]*\))?:\s?(?P<msg>.*)$",
        )
        .expect("diagnostic header pattern is valid")
    })
}

fn severity(raw: &str) -> Severity {
    match raw {
        "error" => Severity::Error,
        "warning" => Severity::Warning,
        _ => Severity::Info,
    }
}

/// Parse every diagnostic in `output`. Lines before the first header are dropped.
pub fn parse_messages(output: &str) -> Vec<DiagnosticMessage> {
    let mut messages: Vec<DiagnosticMessage> = Vec::new();
    for line in output.lines() {
        if let Some(caps) = header_pattern().captures(line) {
            let location = match (caps["line"].parse(), caps["col"].parse()) {
                (Ok(line), Ok(column)) => Some(SourceLocation { line, column }),
                _ => None,
            };
            messages.push(DiagnosticMessage {
                location,
                severity: severity(&caps["sev"]),
                message: caps["msg"].to_string(),
            });
        } else if let Some(last) = messages.last_mut() {
            last.message.push('\n');
            last.message.push_str(line);
        }
    }
    for msg in &mut messages {
        let trimmed = msg.message.trim_end().len();
        msg.message.truncate(trimmed);
    }
    messages
}

pub fn is_sorry_warning(msg: &DiagnosticMessage) -> bool {
    msg.message.contains(SORRY_WARNING)
}

/// Turn a finished compiler run into a diagnostic.
///
/// Success needs a zero exit status, no errors and no `sorry`.
pub fn interpret(exit_ok: bool, stdout: &str, stderr: &str) -> CompileDiagnostic {
    let mut messages = parse_messages(stdout);
    messages.extend(parse_messages(stderr));

    let has_errors = messages.iter().any(|m| m.severity == Severity::Error);
    let has_sorry = messages.iter().any(is_sorry_warning);

    if exit_ok && !has_errors && !has_sorry {
        return CompileDiagnostic {
            outcome: CompileOutcome::Success,
            messages,
        };
    }

    if !has_errors {
        if has_sorry {
            messages.insert(
                0,
                DiagnosticMessage::error("proof is incomplete: replace every `sorry`"),
            );
        } else {
            let raw = format!("{}\n{}", stdout.trim(), stderr.trim());
            let raw = raw.trim();
            let detail = if raw.is_empty() {
                "compiler exited with a failure status and no output".to_string()
            } else {
                truncate(raw, RAW_OUTPUT_LIMIT)
            };
            messages.insert(0, DiagnosticMessage::error(detail));
        }
    }
    CompileDiagnostic::failure(messages)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
