// src/core/sanitize.rs

/// Collapse any run of whitespace (including NBSP) to one space and trim.
pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space { out.push(' '); prev_space = true; }
        } else { out.push(ch); prev_space = false; }
    }
    out.trim().to_string()
}

/// Ticker as typed in a list file: trimmed, upper-cased, inner spaces removed.
/// Returns `None` for blanks and for anything that is not `[A-Z0-9._-]`.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let t: String = raw
        .trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if t.is_empty() { return None; }
    if t.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-') {
        Some(t)
    } else {
        None
    }
}
