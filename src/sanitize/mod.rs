//! Traceback sanitization: raw interpreter faults become bounded,
//! line-accurate diagnostics suitable for feeding back to a code
//! generator.
//!
//! The execution boundary is a separate interpreter process, so the only
//! representation of the fault we ever see is traceback text; parsing that
//! text (rather than walking native frames) is the intended mode here.

use serde::{Deserialize, Serialize};

/// Filename the harness compiles user code under; frames elsewhere belong
/// to the harness or the interpreter and are never surfaced.
pub const ANALYSIS_FILENAME: &str = "<analysis>";

/// Hard cap on the rendered diagnostic, excluding the truncation marker.
pub const RENDERED_LIMIT: usize = 1000;
pub const TRUNCATION_MARKER: &str = " ...[truncated]";

/// How many lines of context to show on each side of the fault line.
const EXCERPT_CONTEXT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedError {
    pub error_type: String,
    pub error_message: String,
    /// Windowed excerpt of the *submitted* code with the fault line marked.
    pub code_excerpt: String,
    /// Fault line in the caller's own numbering; never points into the
    /// instrumentation preamble.
    pub fault_line: Option<usize>,
    /// Bounded text handed verbatim to the code generator.
    pub rendered: String,
}

/// Build a diagnostic from a raw fault.
///
/// `preamble_lines` is the number of instrumentation lines prepended ahead
/// of `user_code`; raw traceback line numbers are shifted down by it.
pub fn sanitize(
    error_type: &str,
    error_message: &str,
    traceback: &str,
    user_code: &str,
    preamble_lines: usize,
) -> SanitizedError {
    let user_line_total = user_code.lines().count();
    let fault_line = innermost_user_line(traceback, preamble_lines, user_line_total);
    let code_excerpt = fault_line
        .map(|line| excerpt(user_code, line))
        .unwrap_or_default();

    let mut rendered = format!("{error_type}: {error_message}");
    if !code_excerpt.is_empty() {
        rendered.push('\n');
        rendered.push_str(&code_excerpt);
    }
    if let Some(line) = fault_line {
        rendered.push_str(&format!("\nError at line {line}"));
    }
    let rendered = truncate_rendered(rendered);

    SanitizedError {
        error_type: error_type.to_string(),
        error_message: error_message.to_string(),
        code_excerpt,
        fault_line,
        rendered,
    }
}

impl SanitizedError {
    /// Best-effort reconstruction from a rendered diagnostic that crossed
    /// the wire as plain text (remote executions).
    pub fn from_rendered(rendered: &str) -> Self {
        let first = rendered.lines().next().unwrap_or_default();
        let (error_type, error_message) = match first.split_once(": ") {
            Some((t, m)) => (t.to_string(), m.to_string()),
            None => ("RuntimeError".to_string(), first.to_string()),
        };
        Self {
            error_type,
            error_message,
            code_excerpt: String::new(),
            fault_line: None,
            rendered: rendered.to_string(),
        }
    }
}

/// Innermost traceback frame inside the analysis unit, remapped to user
/// numbering. Frames that land inside the preamble (remapped <= 0) or past
/// the end of the submitted code are skipped in favor of outer frames.
fn innermost_user_line(traceback: &str, preamble_lines: usize, user_line_total: usize) -> Option<usize> {
    let mut frames: Vec<usize> = traceback
        .lines()
        .filter_map(|line| parse_frame_line(line))
        .collect();
    frames.reverse();
    for raw in frames {
        if raw > preamble_lines {
            let remapped = raw - preamble_lines;
            if user_line_total == 0 || remapped <= user_line_total {
                return Some(remapped);
            }
        }
    }
    None
}

/// Parse `  File "<analysis>", line N, in <module>` without regex.
fn parse_frame_line(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("File \"")?;
    let (filename, rest) = rest.split_once('"')?;
    if filename != ANALYSIS_FILENAME {
        return None;
    }
    let rest = rest.strip_prefix(", line ")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn excerpt(user_code: &str, fault_line: usize) -> String {
    let lines: Vec<&str> = user_code.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let first = fault_line.saturating_sub(EXCERPT_CONTEXT).max(1);
    let last = (fault_line + EXCERPT_CONTEXT).min(lines.len());
    (first..=last)
        .map(|n| {
            let marker = if n == fault_line { "--> " } else { "    " };
            format!("{marker}{n:>4} | {}", lines[n - 1])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_rendered(rendered: String) -> String {
    if rendered.chars().count() <= RENDERED_LIMIT {
        return rendered;
    }
    let mut cut: String = rendered.chars().take(RENDERED_LIMIT).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tb(line: usize) -> String {
        format!(
            "Traceback (most recent call last):\n  File \"<analysis>\", line {line}, in <module>\nZeroDivisionError: division by zero\n"
        )
    }

    #[test]
    fn remap_subtracts_preamble_lines() {
        // Holds for any non-negative preamble length.
        let code = "a = 1\nb = 2\nc = 1 / 0\nd = 4\ne = 5\n";
        for preamble in [0usize, 1, 7, 26] {
            let d = sanitize("ZeroDivisionError", "division by zero", &tb(preamble + 3), code, preamble);
            assert_eq!(d.fault_line, Some(3), "preamble={preamble}");
        }
    }

    #[test]
    fn preamble_frames_are_never_surfaced() {
        let code = "x = 1\n";
        let d = sanitize("ValueError", "bad", &tb(5), code, 10);
        assert_eq!(d.fault_line, None);
        assert!(d.code_excerpt.is_empty());
    }

    #[test]
    fn innermost_frame_wins() {
        let traceback = "Traceback (most recent call last):\n  File \"<analysis>\", line 8, in <module>\n  File \"<analysis>\", line 2, in helper\nValueError: bad\n";
        let code = "def helper():\n    raise ValueError('bad')\n\nx = 1\ny = 2\nz = 3\nw = 4\nhelper()\n";
        let d = sanitize("ValueError", "bad", traceback, code, 0);
        assert_eq!(d.fault_line, Some(2));
    }

    #[test]
    fn harness_frames_are_ignored() {
        let traceback = "Traceback (most recent call last):\n  File \"harness.py\", line 30, in <module>\n  File \"<analysis>\", line 1, in <module>\nValueError: bad\n";
        let d = sanitize("ValueError", "bad", traceback, "raise ValueError('bad')\n", 0);
        assert_eq!(d.fault_line, Some(1));
    }

    #[test]
    fn excerpt_marks_the_fault_line() {
        let code = "a = 1\nb = 2\nc = 1 / 0\nd = 4\n";
        let d = sanitize("ZeroDivisionError", "division by zero", &tb(3), code, 0);
        assert!(d.code_excerpt.contains("-->    3 | c = 1 / 0"));
        assert!(d.code_excerpt.contains("       1 | a = 1"));
        assert!(d.rendered.contains("Error at line 3"));
    }

    #[test]
    fn rendered_is_bounded() {
        let long_message = "x".repeat(5000);
        let d = sanitize("ValueError", &long_message, &tb(1), "raise\n", 0);
        assert!(d.rendered.chars().count() <= RENDERED_LIMIT + TRUNCATION_MARKER.chars().count());
        assert!(d.rendered.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn rendered_contains_type_and_message() {
        let d = sanitize("ValueError", "bad", &tb(1), "raise ValueError('bad')\n", 0);
        assert!(d.rendered.contains("ValueError: bad"));
    }

    #[test]
    fn from_rendered_round_trips_the_head_line() {
        let d = SanitizedError::from_rendered("TypeError: cannot add\nsome detail");
        assert_eq!(d.error_type, "TypeError");
        assert_eq!(d.error_message, "cannot add");
    }
}
