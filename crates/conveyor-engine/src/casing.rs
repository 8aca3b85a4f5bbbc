//! Port-name matching against function result fields.
//!
//! A result field matches an output port if it equals the port name under
//! one of five case folds, tried in a fixed priority order. Each fold is a
//! pure string transform so the search is exhaustively testable.

use serde_json::{Map, Value};

/// The case folds, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFold {
    /// "video title" → "videoTitle"
    Camel,
    /// "video title" → "videotitle"
    LowerJoined,
    /// "video title" → "VideoTitle"
    PascalJoined,
    /// "Video Title" → "video title"
    LowerSpaced,
    /// the name as declared
    Literal,
}

pub const FOLD_ORDER: [CaseFold; 5] = [
    CaseFold::Camel,
    CaseFold::LowerJoined,
    CaseFold::PascalJoined,
    CaseFold::LowerSpaced,
    CaseFold::Literal,
];

impl CaseFold {
    pub fn apply(&self, name: &str) -> String {
        match self {
            CaseFold::Camel => {
                let mut out = String::with_capacity(name.len());
                for (i, word) in name.split_whitespace().enumerate() {
                    if i == 0 {
                        out.push_str(&decapitalize(word));
                    } else {
                        out.push_str(&capitalize(word));
                    }
                }
                out
            }
            CaseFold::LowerJoined => name
                .split_whitespace()
                .map(|w| w.to_lowercase())
                .collect::<Vec<_>>()
                .join(""),
            CaseFold::PascalJoined => name.split_whitespace().map(capitalize).collect(),
            CaseFold::LowerSpaced => name
                .split_whitespace()
                .map(|w| w.to_lowercase())
                .collect::<Vec<_>>()
                .join(" "),
            CaseFold::Literal => name.to_string(),
        }
    }
}

// Only the first character changes; interior casing is preserved so
// "videoTitle" folds to "VideoTitle", not "Videotitle".
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn decapitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Find the result field matching a port name, trying each fold in
/// priority order.
pub fn match_field<'a>(result: &'a Map<String, Value>, port_name: &str) -> Option<&'a Value> {
    for fold in FOLD_ORDER {
        let candidate = fold.apply(port_name);
        if let Some(value) = result.get(&candidate) {
            return Some(value);
        }
    }
    None
}
