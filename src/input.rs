//! Input types a grammar can match against.
//!
//! The matcher is generic over [`ParseInput`]. `str` input matches literals
//! character-for-character and supports regex atoms; `[Token]` input matches
//! one token per literal by comparing the token's kind, which is what a
//! [`TokenGrammar`](crate::TokenGrammar) compiles its literals into.

use std::borrow::Cow;

use regex::Regex;

use crate::ast::CustomMatcher;

/// A successful anchored regex match: the absolute end position and the
/// capture-group spans, group 0 being the whole match.
pub struct RegexMatch {
    pub(crate) end: usize,
    pub(crate) groups: Vec<Option<(usize, usize)>>,
}

/// A type that a compiled grammar can be matched against.
pub trait ParseInput {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Match `literal` at `pos`, returning the end position on success.
    fn match_literal(&self, pos: usize, literal: &str) -> Option<usize>;

    /// Match an anchored regex at `pos`. Inputs without regex support return
    /// `None`; grammars over such inputs reject regex atoms at compile time.
    fn match_regex(&self, pos: usize, re: &Regex) -> Option<RegexMatch>;

    /// Run a host-supplied matcher at `pos`.
    fn match_custom(&self, matcher: &CustomMatcher, pos: usize) -> Option<usize>;

    /// Render the span `[start, end)` for display.
    fn span(&self, start: usize, end: usize) -> Cow<'_, str>;

    /// 1-based line and column of `pos`, for error messages.
    fn line_col(&self, pos: usize) -> (usize, usize);
}

impl ParseInput for str {
    fn len(&self) -> usize {
        str::len(self)
    }

    fn match_literal(&self, pos: usize, literal: &str) -> Option<usize> {
        let l = literal.len();
        if str::len(self) >= pos + l && &self.as_bytes()[pos..pos + l] == literal.as_bytes() {
            Some(pos + l)
        } else {
            None
        }
    }

    fn match_regex(&self, pos: usize, re: &Regex) -> Option<RegexMatch> {
        if pos > str::len(self) {
            return None;
        }
        // The pattern is compiled with a leading `\A`, so searching the tail
        // is an anchored match at `pos`. Group spans are rebased to absolute
        // offsets.
        let caps = re.captures(&self[pos..])?;
        let groups: Vec<Option<(usize, usize)>> = caps
            .iter()
            .map(|g| g.map(|m| (m.start() + pos, m.end() + pos)))
            .collect();
        let end = groups[0].expect("group 0 is the whole match").1;
        Some(RegexMatch { end, groups })
    }

    fn match_custom(&self, matcher: &CustomMatcher, pos: usize) -> Option<usize> {
        matcher(self, pos)
    }

    fn span(&self, start: usize, end: usize) -> Cow<'_, str> {
        Cow::Borrowed(&self[start..end])
    }

    fn line_col(&self, pos: usize) -> (usize, usize) {
        let pos = pos.min(str::len(self));
        let before = &self.as_bytes()[..pos];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        (line, pos - line_start + 1)
    }
}

/// One token of pre-lexed input. A token grammar's literal `"plus"` matches a
/// single token whose kind is `plus`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    kind: Box<str>,
}

impl Token {
    pub fn new(kind: impl Into<Box<str>>) -> Token {
        Token { kind: kind.into() }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl ParseInput for [Token] {
    fn len(&self) -> usize {
        <[Token]>::len(self)
    }

    fn match_literal(&self, pos: usize, literal: &str) -> Option<usize> {
        match self.get(pos) {
            Some(token) if token.kind() == literal => Some(pos + 1),
            _ => None,
        }
    }

    fn match_regex(&self, _pos: usize, _re: &Regex) -> Option<RegexMatch> {
        None
    }

    fn match_custom(&self, _matcher: &CustomMatcher, _pos: usize) -> Option<usize> {
        None
    }

    fn span(&self, start: usize, end: usize) -> Cow<'_, str> {
        Cow::Owned(
            self[start..end]
                .iter()
                .map(Token::kind)
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    fn line_col(&self, pos: usize) -> (usize, usize) {
        // Token streams have no lines; report the token index as the column.
        (1, pos + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_match_is_exact_and_positioned() {
        let text = "hello";
        assert_eq!(text.match_literal(0, "he"), Some(2));
        assert_eq!(text.match_literal(2, "llo"), Some(5));
        assert_eq!(text.match_literal(0, "He"), None);
        assert_eq!(text.match_literal(4, "oo"), None);
    }

    #[test]
    fn line_col_is_one_based() {
        let text = "ab\ncd\ne";
        assert_eq!(text.line_col(0), (1, 1));
        assert_eq!(text.line_col(1), (1, 2));
        assert_eq!(text.line_col(3), (2, 1));
        assert_eq!(text.line_col(6), (3, 1));
    }

    #[test]
    fn token_literal_matches_by_kind() {
        let tokens = [Token::new("num"), Token::new("plus")];
        assert_eq!(tokens.match_literal(0, "num"), Some(1));
        assert_eq!(tokens.match_literal(1, "num"), None);
        assert_eq!(tokens.match_literal(2, "plus"), None);
    }
}
