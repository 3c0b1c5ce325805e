//! Composable predicates over file metadata.
//!
//! A pattern is either a leaf (name, size range, age range) or a group of
//! child patterns merged with conjunction (`all`) or disjunction (`any`),
//! optionally inverted. Patterns have a textual surface syntax that
//! round-trips through [`std::fmt::Display`] and [`parse_pattern`]:
//!
//! ```text
//! ['.ext']     extension leaf        [10KB..1GB]   size range
//! ['name']     exact-name leaf       [7d..]        age range (modified)
//! [/regex/]    regex leaf            (a&b&c)       conjunction
//! !(a|b)       inverted disjunction
//! ```
//!
//! `[..]` is ambiguous without context and parses to a null pattern, as
//! does any range whose minimum exceeds its maximum and any bracketed
//! leaf the grammar does not recognize.

use crate::error::PatternError;
use crate::util::{human_duration, human_size, parse_duration, parse_size, NANOS_PER_SEC};
use camino::Utf8Path;
use itertools::Itertools;
use regex::Regex;

// ----------------------------------------------------------------------------
// Declarations
// ----------------------------------------------------------------------------

/// Anything a pattern can be evaluated against: a path plus stat fields.
pub trait FileMeta {
    fn path(&self) -> &Utf8Path;
    fn size(&self) -> u64;
    fn timestamp(&self, kind: DateKind) -> i64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameKind {
    Extension,
    Regex,
    Name,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateKind {
    Modified,
    Accessed,
    Created,
}

impl DateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateKind::Modified => "modified",
            DateKind::Accessed => "accessed",
            DateKind::Created => "created",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeMode {
    All,
    Any,
}

#[derive(Clone, Debug)]
pub struct NamePattern {
    kind: NameKind,
    raw: String,
    regex: Option<Regex>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SizePattern {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatePattern {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub kind: DateKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupPattern {
    pub children: Vec<Pattern>,
    pub inverted: bool,
    pub mode: MergeMode,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    Name(NamePattern),
    Size(SizePattern),
    Date(DatePattern),
    Group(GroupPattern),
}

// ----------------------------------------------------------------------------
// Construction
// ----------------------------------------------------------------------------

impl NamePattern {
    pub fn new(kind: NameKind, raw: impl Into<String>) -> Result<Self, PatternError> {
        let raw = raw.into();
        let regex = match kind {
            NameKind::Regex => {
                let compiled =
                    Regex::new(&format!("^(?:{raw})$")).map_err(|e| PatternError::BadRegex {
                        pattern: raw.clone(),
                        message: e.to_string(),
                    })?;
                Some(compiled)
            }
            _ => None,
        };
        Ok(NamePattern { kind, raw, regex })
    }

    pub fn kind(&self) -> NameKind {
        self.kind
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.raw == other.raw
    }
}

impl Pattern {
    /// The empty conjunction: matches every file.
    pub fn match_all() -> Pattern {
        Pattern::Group(GroupPattern {
            children: Vec::new(),
            inverted: false,
            mode: MergeMode::All,
        })
    }
}

// ----------------------------------------------------------------------------
// Evaluation
// ----------------------------------------------------------------------------

impl Pattern {
    pub fn matches<F: FileMeta>(&self, file: &F, now_ns: i64) -> bool {
        match self {
            Pattern::Name(p) => p.matches(file),
            Pattern::Size(p) => p.matches(file),
            Pattern::Date(p) => p.matches(file, now_ns),
            Pattern::Group(p) => {
                let merged = match p.mode {
                    MergeMode::All => p.children.iter().all(|c| c.matches(file, now_ns)),
                    MergeMode::Any => p.children.iter().any(|c| c.matches(file, now_ns)),
                };
                merged != p.inverted
            }
        }
    }
}

impl NamePattern {
    fn matches<F: FileMeta>(&self, file: &F) -> bool {
        let name = file.path().file_name().unwrap_or("");
        match self.kind {
            NameKind::Extension => {
                if self.raw == ".*" {
                    // Any file with any extension: a dot after the first char.
                    return name.len() > 1 && name[1..].contains('.');
                }
                match file.path().extension() {
                    Some(ext) => self.raw == format!(".{ext}"),
                    None => false,
                }
            }
            NameKind::Name => self.raw == "*" || name == self.raw,
            NameKind::Regex => self
                .regex
                .as_ref()
                .map(|re| re.is_match(name))
                .unwrap_or(false),
        }
    }
}

impl SizePattern {
    fn matches<F: FileMeta>(&self, file: &F) -> bool {
        if matches!(self.min, Some(min) if file.size() < min) {
            return false;
        }
        if matches!(self.max, Some(max) if file.size() > max) {
            return false;
        }
        true
    }
}

impl DatePattern {
    fn matches<F: FileMeta>(&self, file: &F, now_ns: i64) -> bool {
        let age = now_ns - file.timestamp(self.kind);
        if matches!(self.min, Some(min) if age < min) {
            return false;
        }
        if matches!(self.max, Some(max) if age > max) {
            return false;
        }
        true
    }
}

// ----------------------------------------------------------------------------
// Surface syntax: display
// ----------------------------------------------------------------------------

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Name(p) => match p.kind {
                NameKind::Regex => write!(f, "[/{}/]", p.raw),
                _ => write!(f, "['{}']", p.raw),
            },
            Pattern::Size(p) => {
                let min = p.min.map(human_size).unwrap_or_default();
                let max = p.max.map(human_size).unwrap_or_default();
                write!(f, "[{min}..{max}]")
            }
            Pattern::Date(p) => {
                let min = p
                    .min
                    .map(|ns| human_duration(ns / NANOS_PER_SEC))
                    .unwrap_or_default();
                let max = p
                    .max
                    .map(|ns| human_duration(ns / NANOS_PER_SEC))
                    .unwrap_or_default();
                write!(f, "[{min}..{max}]")
            }
            Pattern::Group(p) => {
                let sep = match p.mode {
                    MergeMode::All => "&",
                    MergeMode::Any => "|",
                };
                let inv = if p.inverted { "!" } else { "" };
                write!(f, "{inv}({})", p.children.iter().map(|c| c.to_string()).join(sep))
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Surface syntax: parsing
// ----------------------------------------------------------------------------

/// Parse the textual surface syntax. `Ok(None)` is the null pattern: a
/// bare `[..]`, a range whose minimum exceeds its maximum, or a bracketed
/// leaf the grammar does not recognize.
pub fn parse_pattern(input: &str) -> Result<Option<Pattern>, PatternError> {
    let s = input.trim();
    if let Some(inner) = s
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        parse_leaf(inner.trim())
    } else {
        parse_group(s).map(Some)
    }
}

fn parse_leaf(inner: &str) -> Result<Option<Pattern>, PatternError> {
    if inner == ".." {
        // Ambiguous without context: null.
        return Ok(None);
    }

    if let Some(quoted) = inner
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        let kind = if quoted.starts_with('.') {
            NameKind::Extension
        } else {
            NameKind::Name
        };
        return Ok(Some(Pattern::Name(NamePattern::new(kind, quoted)?)));
    }

    if let Some(regex) = inner
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
    {
        return Ok(Some(Pattern::Name(NamePattern::new(
            NameKind::Regex,
            regex,
        )?)));
    }

    let Some((lo, hi)) = inner.split_once("..") else {
        // Not a recognizable leaf: null.
        return Ok(None);
    };
    let (lo, hi) = (lo.trim(), hi.trim());

    // Size form wins when every present bound parses as a size.
    let min_size = if lo.is_empty() { None } else { parse_size(lo) };
    let max_size = if hi.is_empty() { None } else { parse_size(hi) };
    let size_ok = (lo.is_empty() || min_size.is_some()) && (hi.is_empty() || max_size.is_some());
    if size_ok {
        if let (Some(min), Some(max)) = (min_size, max_size) {
            if min > max {
                return Ok(None);
            }
        }
        return Ok(Some(Pattern::Size(SizePattern {
            min: min_size,
            max: max_size,
        })));
    }

    let min_age = if lo.is_empty() { None } else { parse_duration(lo) };
    let max_age = if hi.is_empty() { None } else { parse_duration(hi) };
    let duration_ok = (lo.is_empty() || min_age.is_some()) && (hi.is_empty() || max_age.is_some());
    if duration_ok {
        if let (Some(min), Some(max)) = (min_age, max_age) {
            if min > max {
                return Ok(None);
            }
        }
        return Ok(Some(Pattern::Date(DatePattern {
            min: min_age,
            max: max_age,
            kind: DateKind::Modified,
        })));
    }

    // A range that is neither sizes nor durations: null.
    Ok(None)
}

fn parse_group(input: &str) -> Result<Pattern, PatternError> {
    let (inverted, body) = match input.strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, input),
    };

    let inner = body
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| PatternError::MissingParens(input.to_string()))?;

    // Split on '&' / '|' at the current nesting level only.
    let mut parts: Vec<&str> = Vec::new();
    let mut mode: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in inner.char_indices() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '&' | '|' if depth == 0 => {
                parts.push(&inner[start..idx]);
                start = idx + 1;
                match mode {
                    None => mode = Some(ch),
                    Some(existing) if existing == ch => {}
                    Some(_) => return Err(PatternError::MixedOperators(input.to_string())),
                }
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);

    let mut children = Vec::new();
    for part in parts {
        // Null subpatterns are dropped.
        if let Some(child) = parse_pattern(part)? {
            children.push(child);
        }
    }

    let mode = match mode {
        Some('|') => MergeMode::Any,
        _ => MergeMode::All,
    };
    Ok(Pattern::Group(GroupPattern {
        children,
        inverted,
        mode,
    }))
}
