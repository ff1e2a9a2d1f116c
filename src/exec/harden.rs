//! Advisory deny-list applied to submitted code before execution.
//!
//! This is best-effort textual hardening, not a security boundary: a
//! determined author can evade a substring scan. It exists to stop the
//! obvious accidents (a generated `import socket`, a stray
//! `shutil.rmtree`) while keeping the rejection visible to the code's
//! producer instead of silently dropping lines.

/// Constructs a submitted line may not reference. Grouped by concern:
/// process spawning, raw sockets, destructive filesystem calls, dynamic
/// code loading, serialization back-doors.
const DENY_TOKENS: &[&str] = &[
    "subprocess",
    "os.system",
    "os.popen",
    "os.spawn",
    "os.fork",
    "os.exec",
    "socket",
    "shutil.rmtree",
    "os.remove",
    "os.unlink",
    "os.rmdir",
    "eval(",
    "exec(",
    "compile(",
    "__import__",
    "importlib",
    "pickle",
    "marshal",
    "shelve",
];

#[derive(Debug, Clone)]
pub struct Neutralized {
    /// Rewritten source, line count identical to the input so traceback
    /// remapping stays valid.
    pub code: String,
    /// `(1-based line, token)` for each replaced line.
    pub blocked: Vec<(usize, &'static str)>,
}

/// Replace every line referencing a deny-listed token with an
/// indentation-preserving `pass` carrying a visible marker.
pub fn neutralize(source: &str) -> Neutralized {
    let mut blocked = Vec::new();
    let lines: Vec<String> = source
        .lines()
        .enumerate()
        .map(|(i, line)| match DENY_TOKENS.iter().find(|t| line.contains(*t)) {
            Some(token) => {
                blocked.push((i + 1, *token));
                let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
                format!("{indent}pass  # blocked by sandbox: '{token}' is not allowed")
            }
            None => line.to_string(),
        })
        .collect();
    let mut code = lines.join("\n");
    if source.ends_with('\n') {
        code.push('\n');
    }
    Neutralized { code, blocked }
}
