//! Console chrome: section rules and failure lines.
//!
//! pip's own output is inherited by the child process; the few lines the
//! launcher prints itself go through here so they stay visually distinct.

use std::io::{IsTerminal, Write, stderr, stdout};

const RULE_WIDTH: usize = 72;

/// Print a horizontal section rule with a centered title.
pub fn rule(title: &str) {
    let mut out = stdout();
    let _ = writeln!(out, "{}", rule_line(title));
}

fn rule_line(title: &str) -> String {
    let label = format!(" {title} ");
    let fill = RULE_WIDTH.saturating_sub(label.chars().count());
    let left = fill / 2;
    let right = fill - left;
    format!("{}{}{}", "─".repeat(left), label, "─".repeat(right))
}

/// Print a failure message in the launcher's own voice.
pub fn failure(message: &str) {
    let mut err = stderr();
    if err.is_terminal() {
        let _ = writeln!(err, "\x1b[1;31mError:\x1b[0m {message}");
    } else {
        let _ = writeln!(err, "Error: {message}");
    }
}
