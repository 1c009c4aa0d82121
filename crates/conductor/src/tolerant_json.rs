//! Tolerant parsing of an in-progress JSON fragment.
//!
//! Tool-call arguments arrive as a streamed JSON fragment, one `partial_json`
//! delta at a time. At every delta the adapter needs *some* usable value —
//! waiting for a syntactically complete document would mean the partial
//! assistant message never reflects the tool call in progress. This module
//! gives the best parse available for a prefix of a JSON value: if the
//! prefix already parses, use that; otherwise close whatever string/array/
//! object is left open and try again; if that still fails, fall back to an
//! empty object. The whole thing is a pure function of its input — same
//! fragment in, same value out, every time.

use serde_json::Value;

/// Parse `fragment`, which may be an incomplete prefix of a JSON value.
pub fn tolerant_parse(fragment: &str) -> Value {
    if let Ok(v) = serde_json::from_str(fragment) {
        return v;
    }
    if let Some(v) = close_and_parse(fragment) {
        return v;
    }
    // Progressively drop trailing characters until something closes into
    // valid JSON. Fragments are small (tool-call argument blobs), so the
    // worst-case quadratic cost here is immaterial.
    let chars: Vec<char> = fragment.chars().collect();
    for end in (0..chars.len()).rev() {
        let candidate: String = chars[..end].iter().collect();
        if candidate.trim().is_empty() {
            break;
        }
        if let Some(v) = close_and_parse(&candidate) {
            return v;
        }
    }
    serde_json::json!({})
}

/// Close any unterminated string/array/object in `s` and attempt to parse
/// the result. Returns `None` if the closed form still fails to parse.
fn close_and_parse(s: &str) -> Option<Value> {
    let closed = close_unterminated(s);
    serde_json::from_str(&closed).ok()
}

fn close_unterminated(s: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    let mut buf = String::with_capacity(s.len() + 4);

    for c in s.chars() {
        buf.push(c);
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    if in_string {
        buf.push('"');
    }

    // A dangling trailing comma or colon (an object key with no value yet,
    // or a trailing element separator) cannot be closed into valid JSON —
    // strip it so the structural close below has a chance of succeeding.
    let mut trimmed = buf.trim_end().to_string();
    loop {
        match trimmed.chars().last() {
            Some(',') | Some(':') => {
                trimmed.pop();
                trimmed = trimmed.trim_end().to_string();
            }
            _ => break,
        }
    }

    for close in stack.into_iter().rev() {
        trimmed.push(close);
    }
    trimmed
}
