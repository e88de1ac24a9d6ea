//! Structured-record recovery from language model replies
//!
//! Replies are best-effort JSON. Recovery order:
//! 1. Direct parse of the whole (trimmed) reply
//! 2. Parse of the first balanced `{...}` substring (string/escape aware)
//! 3. The type's default value
//!
//! Recovery never fails.

use serde::de::DeserializeOwned;
use tracing::debug;

/// Which recovery step produced the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPath {
    Direct,
    Embedded,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered<T> {
    pub value: T,
    pub path: RecoveryPath,
}

/// Recover a `T` from free-form reply text
pub fn recover<T: DeserializeOwned + Default>(reply: &str) -> Recovered<T> {
    if let Ok(value) = serde_json::from_str::<T>(reply.trim()) {
        return Recovered {
            value,
            path: RecoveryPath::Direct,
        };
    }

    if let Some(object) = first_balanced_object(reply) {
        match serde_json::from_str::<T>(object) {
            Ok(value) => {
                return Recovered {
                    value,
                    path: RecoveryPath::Embedded,
                }
            }
            Err(e) => debug!(error = %e, "Embedded object did not match the expected shape"),
        }
    }

    Recovered {
        value: T::default(),
        path: RecoveryPath::Default,
    }
}

/// First `{` whose object closes, as a slice of the input
///
/// Braces inside JSON strings (including escaped quotes) are ignored.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    text.match_indices('{')
        .find_map(|(start, _)| balanced_end(&text[start..]).map(|len| &text[start..start + len]))
}

/// Byte length of the balanced object starting at `s[0] == '{'`
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}
