//! The compiled grammar graph.
//!
//! Expressions are allocated in an arena owned by the [`Grammar`](crate::Grammar)
//! and refer to each other by [`ExprId`]. The id doubles as the expression's
//! identity for packrat caching: two textually identical expressions at
//! different ids are cached separately, so grammar authors control sharing by
//! factoring common subexpressions into named rules.

use std::fmt;
use std::sync::Arc;

/// A host-supplied matcher: given the full text and a position, return the end
/// position of a match starting there, or `None`.
pub type CustomMatcher = dyn Fn(&str, usize) -> Option<usize> + Send + Sync;

/// Arena index of an expression; stable for the lifetime of its grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub(crate) u32);

impl ExprId {
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

/// A node in the grammar graph: one match step, plus the rule name when this
/// expression is the right-hand side of a named rule.
pub struct Expr {
    pub(crate) name: Option<Arc<str>>,
    pub(crate) kind: ExprKind,
}

impl Expr {
    /// The rule name, if this expression is a rule's right-hand side.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// An anchored regular expression atom. The pattern and flag characters are
/// kept as written for round-trip printing; `re` is the compiled form,
/// anchored at the match position.
pub struct RegexExpr {
    pub(crate) pattern: String,
    pub(crate) flags: String,
    pub(crate) re: regex::Regex,
}

pub(crate) enum ExprKind {
    /// Matches the exact string (in token mode, a single token by its kind).
    Literal(String),
    /// Anchored regex match; produces a node retaining its capture groups.
    Regex(RegexExpr),
    /// Each member in order, concatenating consumed spans.
    Sequence(Vec<ExprId>),
    /// Prioritized choice: first member to match wins.
    OneOf(Vec<ExprId>),
    /// Succeeds iff the member matches here; consumes nothing.
    Lookahead(ExprId),
    /// Succeeds iff the member fails here; consumes nothing.
    Not(ExprId),
    /// Always succeeds; consumes the member's match if any.
    Optional(ExprId),
    /// Greedy repetition, possibly zero times.
    ZeroOrMore(ExprId),
    /// Greedy repetition, at least once.
    OneOrMore(ExprId),
    /// Placeholder for a rule name; must not survive resolution.
    Reference { name: Arc<str>, pos: Option<usize> },
    /// Host-supplied matcher with the same contract as the built-ins.
    Custom { label: Arc<str>, matcher: Arc<CustomMatcher> },
}

impl ExprKind {
    /// Child ids, in match order. Empty for atoms.
    pub(crate) fn children(&self) -> &[ExprId] {
        match self {
            ExprKind::Sequence(members) | ExprKind::OneOf(members) => members,
            ExprKind::Lookahead(child)
            | ExprKind::Not(child)
            | ExprKind::Optional(child)
            | ExprKind::ZeroOrMore(child)
            | ExprKind::OneOrMore(child) => std::slice::from_ref(child),
            _ => &[],
        }
    }

    pub(crate) fn set_children(&mut self, new: &[ExprId]) {
        match self {
            ExprKind::Sequence(members) | ExprKind::OneOf(members) => {
                members.copy_from_slice(new);
            }
            ExprKind::Lookahead(child)
            | ExprKind::Not(child)
            | ExprKind::Optional(child)
            | ExprKind::ZeroOrMore(child)
            | ExprKind::OneOrMore(child) => *child = new[0],
            _ => debug_assert!(new.is_empty()),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            ExprKind::Literal(s) => format!("Literal({s:?})"),
            ExprKind::Regex(r) => format!("Regex(~{:?}{})", r.pattern, r.flags),
            ExprKind::Sequence(m) => format!("Sequence({m:?})"),
            ExprKind::OneOf(m) => format!("OneOf({m:?})"),
            ExprKind::Lookahead(c) => format!("Lookahead({c:?})"),
            ExprKind::Not(c) => format!("Not({c:?})"),
            ExprKind::Optional(c) => format!("Optional({c:?})"),
            ExprKind::ZeroOrMore(c) => format!("ZeroOrMore({c:?})"),
            ExprKind::OneOrMore(c) => format!("OneOrMore({c:?})"),
            ExprKind::Reference { name, .. } => format!("Reference({name:?})"),
            ExprKind::Custom { label, .. } => format!("Custom({label:?})"),
        };
        match &self.name {
            Some(name) => write!(f, "{name} = {kind}"),
            None => f.write_str(&kind),
        }
    }
}

// Binding strength of the grammar notation, loosest to tightest. Used when
// printing to decide where parentheses are required for the round trip.
const PREC_CHOICE: u8 = 0;
const PREC_SEQUENCE: u8 = 1;
const PREC_PREFIX: u8 = 2;
const PREC_QUANTIFIED: u8 = 3;
const PREC_ATOM: u8 = 4;

fn precedence(kind: &ExprKind) -> u8 {
    match kind {
        ExprKind::OneOf(_) => PREC_CHOICE,
        ExprKind::Sequence(_) => PREC_SEQUENCE,
        ExprKind::Lookahead(_) | ExprKind::Not(_) => PREC_PREFIX,
        ExprKind::Optional(_) | ExprKind::ZeroOrMore(_) | ExprKind::OneOrMore(_) => {
            PREC_QUANTIFIED
        }
        _ => PREC_ATOM,
    }
}

/// Append `s` as a double-quoted grammar literal, escaping what the notation
/// must escape to survive a round trip.
pub(crate) fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

/// Write the expression in grammar notation. Named subexpressions print as
/// their rule name; `top` forces the outermost expression to print its
/// structure so a rule's right-hand side is spelled out.
fn write_expr(out: &mut String, exprs: &[Expr], id: ExprId, min_prec: u8, top: bool) {
    let expr = &exprs[id.idx()];
    if !top {
        if let Some(name) = &expr.name {
            out.push_str(name);
            return;
        }
    }
    let paren = precedence(&expr.kind) < min_prec;
    if paren {
        out.push('(');
    }
    match &expr.kind {
        ExprKind::Literal(s) => push_quoted(out, s),
        ExprKind::Regex(r) => {
            out.push('~');
            push_quoted(out, &r.pattern);
            out.push_str(&r.flags);
        }
        ExprKind::Sequence(members) => {
            for (i, &m) in members.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_expr(out, exprs, m, PREC_PREFIX, false);
            }
        }
        ExprKind::OneOf(members) => {
            for (i, &m) in members.iter().enumerate() {
                if i > 0 {
                    out.push_str(" / ");
                }
                write_expr(out, exprs, m, PREC_SEQUENCE, false);
            }
        }
        ExprKind::Lookahead(child) => {
            out.push('&');
            write_expr(out, exprs, *child, PREC_PREFIX, false);
        }
        ExprKind::Not(child) => {
            out.push('!');
            write_expr(out, exprs, *child, PREC_PREFIX, false);
        }
        ExprKind::Optional(child) => {
            write_expr(out, exprs, *child, PREC_ATOM, false);
            out.push('?');
        }
        ExprKind::ZeroOrMore(child) => {
            write_expr(out, exprs, *child, PREC_ATOM, false);
            out.push('*');
        }
        ExprKind::OneOrMore(child) => {
            write_expr(out, exprs, *child, PREC_ATOM, false);
            out.push('+');
        }
        ExprKind::Reference { name, .. } => out.push_str(name),
        ExprKind::Custom { label, .. } => out.push_str(label),
    }
    if paren {
        out.push(')');
    }
}

/// The right-hand side of the expression in grammar notation.
pub(crate) fn rhs_to_string(exprs: &[Expr], id: ExprId) -> String {
    let mut out = String::new();
    write_expr(&mut out, exprs, id, PREC_CHOICE, true);
    out
}

/// One printable rule line, `name = rhs`. When the expression carries a
/// different rule's name (an alias like `a = b`), the right-hand side is that
/// name, preserving the shared identity on re-parse.
pub(crate) fn rule_to_string(exprs: &[Expr], name: &str, id: ExprId) -> String {
    let expr = &exprs[id.idx()];
    match &expr.name {
        Some(own) if **own != *name => format!("{name} = {own}"),
        _ => format!("{name} = {}", rhs_to_string(exprs, id)),
    }
}

/// Compact description of a failed expectation for error messages: the
/// notation form of a literal or regex, or a custom matcher's label.
pub(crate) fn describe(exprs: &[Expr], id: ExprId) -> String {
    let expr = &exprs[id.idx()];
    match &expr.kind {
        ExprKind::Literal(s) => {
            let mut out = String::new();
            push_quoted(&mut out, s);
            out
        }
        ExprKind::Regex(r) => {
            let mut out = String::from("~");
            push_quoted(&mut out, &r.pattern);
            out.push_str(&r.flags);
            out
        }
        ExprKind::Custom { label, .. } => label.to_string(),
        _ => rhs_to_string(exprs, id),
    }
}
