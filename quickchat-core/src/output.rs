//! Splitting a response into lines a launcher can show as a browsable list.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Code,
    Bullet,
    Numbered,
    Prose,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultLine {
    pub text: String,
    pub kind: LineKind,
}

/// Bullet items wrapped onto a two-space-indented continuation line are
/// joined first; fence lines are dropped.
pub fn result_lines(response: &str) -> Vec<ResultLine> {
    let mut lines: Vec<String> = Vec::new();
    for line in response.lines() {
        let continues_bullet = line.starts_with("  ")
            && !line.trim().is_empty()
            && lines.last().is_some_and(|prev| is_plain_bullet(prev));
        if continues_bullet {
            if let Some(prev) = lines.last_mut() {
                prev.push(' ');
                prev.push_str(line.trim_start());
            }
            continue;
        }
        lines.push(line.to_string());
    }

    let mut output = Vec::new();
    let mut in_code_block = false;
    for line in lines {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        let (text, kind) = if in_code_block {
            (line, LineKind::Code)
        } else if let Some(item) = line.trim_start().strip_prefix("- ") {
            (item.to_string(), LineKind::Bullet)
        } else if is_numbered(&line) {
            (line, LineKind::Numbered)
        } else {
            (line, LineKind::Prose)
        };
        output.push(ResultLine { text, kind });
    }
    output
}

fn is_plain_bullet(line: &str) -> bool {
    line.strip_prefix("- ")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
}

fn is_numbered(line: &str) -> bool {
    let trimmed = line.trim_start();
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    (1..=2).contains(&digits) && trimmed[digits..].starts_with(". ")
}
