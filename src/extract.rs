//! Locating a JSON value inside free-form model output.
//!
//! Streamed model output is not guaranteed to be JSON-only: models prepend
//! commentary, wrap answers in Markdown fences, or add a closing remark. The
//! scanner walks candidate opening brackets left to right, finds each one's
//! matching close by depth counting (ignoring brackets inside string literals),
//! and returns the first enclosed region that parses.

use std::collections::HashMap;
use std::ops::Range;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{ExtractError, Result};

/// Lazily resolved bracket matches.
///
/// A scan that starts outside a string literal resolves every opening bracket
/// it later meets outside a string, since a fresh scan from any of those would
/// follow the same path. A new scan only starts at an opener every earlier scan
/// saw inside a string, so bracket-heavy prose costs one pass, not one per opener.
struct CandidateSpans<'t> {
    bytes: &'t [u8],
    next: usize,
    closes: HashMap<usize, Option<usize>>,
}

impl CandidateSpans<'_> {
    fn scan_from(&mut self, start: usize) {
        let mut open: Vec<usize> = Vec::new();
        let mut in_string = false;
        let mut escaped = false;

        for (pos, &byte) in self.bytes.iter().enumerate().skip(start) {
            if in_string {
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => in_string = true,
                b'{' | b'[' => open.push(pos),
                b'}' | b']' => {
                    if let Some(opener) = open.pop() {
                        self.closes.insert(opener, Some(pos));
                    }
                }
                _ => {}
            }
        }

        for opener in open {
            self.closes.insert(opener, None);
        }
    }
}

impl Iterator for CandidateSpans<'_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.bytes.len() {
            let start = self.next;
            self.next += 1;
            if !matches!(self.bytes[start], b'{' | b'[') {
                continue;
            }
            if !self.closes.contains_key(&start) {
                self.scan_from(start);
            }
            if let Some(Some(end)) = self.closes.get(&start) {
                return Some(start..end + 1);
            }
        }
        None
    }
}

/// Byte ranges of balanced `{...}` / `[...]` regions, one per opening bracket, in
/// order of their opening position. Brackets inside string literals are ignored
/// when matching, and each region is matched as if scanning began at its opener.
pub fn candidate_spans(text: &str) -> impl Iterator<Item = Range<usize>> + '_ {
    CandidateSpans {
        bytes: text.as_bytes(),
        next: 0,
        closes: HashMap::new(),
    }
}

/// First candidate region that parses, with its byte range in `text`.
pub fn find_json(text: &str) -> Option<(Range<usize>, Value)> {
    for span in candidate_spans(text) {
        match serde_json::from_str::<Value>(&text[span.clone()]) {
            Ok(value) => {
                debug!(start = span.start, end = span.end, "Located JSON value");
                return Some((span, value));
            }
            Err(err) => {
                trace!(start = span.start, error = %err, "Candidate region did not parse");
            }
        }
    }
    None
}

/// Parse the first JSON object or array embedded in `text`.
pub fn extract_json(text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Err(ExtractError::extraction("response was empty", text));
    }
    find_json(text)
        .map(|(_, value)| value)
        .ok_or_else(|| ExtractError::extraction("no parseable JSON object or array", text))
}
