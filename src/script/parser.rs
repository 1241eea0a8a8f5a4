//! Rule-based parser over a downloaded file.
//!
//! A script creates the parser with `create_parser_for_file` and registers
//! named rules with `add_parsing_rule`. The host application then drives it
//! through the engine's `parse` operation, one rule at a time.

use std::collections::HashMap;

use super::extract::{ceil_boundary, find, find_balanced};
use crate::{RiaError, RiaResult};

/// Marker returned by detection and iteration rules.
pub const FOUND: &str = "+";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Plain,
    /// End markers are only matched outside strings and nested brackets.
    Json,
}

impl ParserKind {
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") { ParserKind::Json } else { ParserKind::Plain }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hint {
    Extract,
    Detect,
    Iterate(String),
}

impl Hint {
    pub fn parse(hint: &str) -> RiaResult<Self> {
        match hint {
            "" => Ok(Hint::Extract),
            "?" => Ok(Hint::Detect),
            _ => match hint.strip_prefix('+') {
                Some(marker) if !marker.is_empty() => Ok(Hint::Iterate(marker.to_string())),
                _ => Err(RiaError::Message(format!("bad parsing rule hint '{hint}'"))),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub begin: String,
    pub end: String,
    pub hint: Hint,
}

#[derive(Debug, Clone, Copy)]
struct Iteration {
    limit: usize,
    after: usize,
}

#[derive(Debug)]
pub struct FileParser {
    text: String,
    kind: ParserKind,
    rules: HashMap<String, Rule>,
    active: HashMap<String, Iteration>,
}

impl FileParser {
    pub fn new(text: String, kind: ParserKind) -> Self {
        FileParser { text, kind, rules: HashMap::new(), active: HashMap::new() }
    }

    pub fn kind(&self) -> ParserKind {
        self.kind
    }

    pub fn add_rule(&mut self, name: &str, begin: &str, end: &str, hint: &str) -> RiaResult<()> {
        let rule = Rule { begin: begin.to_string(), end: end.to_string(), hint: Hint::parse(hint)? };
        let name = name.to_ascii_lowercase();
        self.active.remove(&name);
        self.rules.insert(name, rule);
        Ok(())
    }

    fn find_end(&self, from: usize, pattern: &str) -> Option<(usize, usize)> {
        match self.kind {
            ParserKind::Plain => find(&self.text, from, pattern),
            ParserKind::Json => find_balanced(&self.text, from, pattern),
        }
    }

    /// Block delimited by `rule` at or after `pos`: `(body_start, body_end, after)`.
    fn block(&self, rule: &Rule, pos: usize) -> Option<(usize, usize, usize)> {
        let (_, body_start) = find(&self.text, pos, &rule.begin)?;
        if rule.end.is_empty() {
            return Some((body_start, self.text.len(), self.text.len()));
        }
        let (body_end, after) = self.find_end(body_start, &rule.end)?;
        Some((body_start, body_end, after))
    }

    /// Apply rule `name` at `pos`.
    ///
    /// Extraction rules return the text and move `pos` past the end marker.
    /// Detection rules return [`FOUND`] without moving. Iteration rules
    /// return [`FOUND`] once per item and `None` when the block is exhausted.
    pub fn apply(&mut self, name: &str, pos: &mut usize) -> RiaResult<Option<String>> {
        let key = name.to_ascii_lowercase();
        let rule = self
            .rules
            .get(&key)
            .cloned()
            .ok_or_else(|| RiaError::Message(format!("unknown parsing rule '{name}'")))?;
        if *pos > self.text.len() {
            return Ok(None);
        }
        *pos = ceil_boundary(&self.text, *pos);
        match &rule.hint {
            Hint::Extract => Ok(self.block(&rule, *pos).map(|(start, end, after)| {
                *pos = after;
                self.text[start..end].to_string()
            })),
            Hint::Detect => Ok(self.block(&rule, *pos).map(|_| FOUND.to_string())),
            Hint::Iterate(marker) => {
                let existing = self.active.get(&key).copied();
                let state = match existing {
                    Some(state) => state,
                    None => {
                        let Some((start, end, after)) = self.block(&rule, *pos) else {
                            return Ok(None);
                        };
                        *pos = start;
                        let state = Iteration { limit: end, after };
                        self.active.insert(key.clone(), state);
                        state
                    }
                };
                match find(&self.text[..state.limit], *pos, marker) {
                    Some((_, item)) => {
                        *pos = item;
                        Ok(Some(FOUND.to_string()))
                    }
                    None => {
                        self.active.remove(&key);
                        *pos = state.after;
                        Ok(None)
                    }
                }
            }
        }
    }
}
