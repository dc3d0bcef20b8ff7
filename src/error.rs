//! Error types.
//!
//! Match-time failures are values inside the matcher; only the final
//! top-level failure surfaces as a [`ParseError`]. Grammar construction
//! problems are reported as [`GrammarError`] and never at parse time.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::ast::ExprId;

/// The set of expectations that failed at the rightmost failure position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpectedSet {
    expected: BTreeSet<String>,
}

impl ExpectedSet {
    pub(crate) fn insert(&mut self, description: String) {
        self.expected.insert(description);
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.expected.iter().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }
}

impl fmt::Display for ExpectedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.expected.is_empty() {
            write!(f, "<unreported>")?;
        } else if self.expected.len() == 1 {
            write!(f, "{}", self.expected.iter().next().unwrap())?;
        } else {
            let mut iter = self.expected.iter();
            write!(f, "one of {}", iter.next().unwrap())?;
            for item in iter {
                write!(f, ", {item}")?;
            }
        }
        Ok(())
    }
}

/// Per-parse failure tracker: the rightmost position any concrete expectation
/// (literal, regex, custom matcher) failed at, and which expressions failed
/// there. Combinator failures are implied by their members and add nothing to
/// the message, so only expecting expressions are recorded.
pub(crate) struct ErrorState {
    pub(crate) max_err_pos: usize,
    pub(crate) exprs: Vec<ExprId>,
    pub(crate) last: Option<ExprId>,
}

impl ErrorState {
    pub(crate) fn new(initial_pos: usize) -> ErrorState {
        ErrorState {
            max_err_pos: initial_pos,
            exprs: Vec::new(),
            last: None,
        }
    }

    pub(crate) fn mark_failure(&mut self, pos: usize, expr: ExprId) {
        if pos > self.max_err_pos {
            self.max_err_pos = pos;
            self.exprs.clear();
            self.exprs.push(expr);
            self.last = Some(expr);
        } else if pos == self.max_err_pos {
            if !self.exprs.contains(&expr) {
                self.exprs.push(expr);
            }
            self.last = Some(expr);
        }
    }
}

/// Where and why a parse stopped: the input (rendered as text), the failure
/// position, the rule being matched there, and the expectations that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub(crate) text: String,
    pub(crate) tail: String,
    pub(crate) pos: usize,
    pub(crate) rule: String,
    pub(crate) expected: ExpectedSet,
    pub(crate) line: usize,
    pub(crate) column: usize,
}

impl Mismatch {
    /// Position of the failure: the rightmost point any expectation failed,
    /// or for an incomplete parse, the end of the matched prefix.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Name (or printed form) of the expression that failed.
    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn expected(&self) -> &ExpectedSet {
        &self.expected
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// The input from the failure position onward. For an incomplete parse
    /// this is the unconsumed tail.
    pub fn tail(&self) -> &str {
        &self.tail
    }

    fn snippet(&self) -> String {
        self.tail.chars().take(20).collect()
    }
}

/// Why `parse` or `match_at` returned no tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The start rule failed to match.
    Mismatch(Mismatch),
    /// The start rule matched, but trailing input remains.
    Incomplete(Mismatch),
    /// The grammar has no default rule to start from.
    NoDefaultRule,
}

impl ParseError {
    /// The failure detail, when there is one.
    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            ParseError::Mismatch(m) | ParseError::Incomplete(m) => Some(m),
            ParseError::NoDefaultRule => None,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Mismatch(m) => write!(
                f,
                "Rule '{}' didn't match at '{}' (line {}, column {}).",
                m.rule,
                m.snippet(),
                m.line,
                m.column
            ),
            ParseError::Incomplete(m) => write!(
                f,
                "Rule '{}' matched in its entirety, but it didn't consume all the text. \
                 The non-matching portion of the text begins with '{}' (line {}, column {}).",
                m.rule,
                m.snippet(),
                m.line,
                m.column
            ),
            ParseError::NoDefaultRule => write!(
                f,
                "this grammar has no default rule to start parsing from; \
                 pick one with `default`"
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// A problem with the grammar itself, raised at construction and never at
/// parse time.
#[derive(Debug, Error)]
pub enum GrammarError {
    /// The grammar source failed to parse.
    #[error("there is an error in your grammar definition: {0}")]
    BadGrammar(#[source] Box<ParseError>),

    /// A rule reference was never given a definition.
    #[error("the label \"{label}\" was never defined")]
    UndefinedLabel {
        label: String,
        /// Byte offset of the reference in the grammar source, when known.
        pos: Option<usize>,
    },

    /// A regex atom failed to compile.
    #[error("invalid regular expression ~{pattern:?}: {source}")]
    BadRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Token grammars match token kinds, not characters; a regex atom cannot
    /// apply.
    #[error("token grammars cannot use regex atoms: ~{0:?}")]
    RegexInTokenGrammar(String),

    /// The grammar can recurse without consuming input, which would never
    /// terminate.
    #[error("left recursive rules create an infinite loop: {path}")]
    LeftRecursion { path: String },

    /// A rule name passed to `default` or looked up by the host is not in the
    /// grammar.
    #[error("no rule named {0:?} in this grammar")]
    MissingRule(String),
}
