//! The packrat matcher.
//!
//! One [`MatchState`] lives for the duration of a single top-level parse
//! call. It owns the memo table, keyed by `(expression id, position)`, and
//! the failure tracker. Every expression goes through the same wrapper:
//! probe the cache, dispatch on the variant, record the result. The cache is
//! what makes matching linear and what lets cyclic rule graphs terminate.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Expr, ExprId, ExprKind};
use crate::error::ErrorState;
use crate::input::ParseInput;
use crate::node::Node;

/// The result of matching one expression at one position.
pub(crate) enum RuleResult<'i, I: ParseInput + ?Sized> {
    Matched(Rc<Node<'i, I>>),
    Failed,
}

impl<'i, I: ParseInput + ?Sized> Clone for RuleResult<'i, I> {
    fn clone(&self) -> Self {
        match self {
            RuleResult::Matched(node) => RuleResult::Matched(Rc::clone(node)),
            RuleResult::Failed => RuleResult::Failed,
        }
    }
}

pub(crate) struct MatchState<'g, 'i, I: ParseInput + ?Sized> {
    exprs: &'g [Expr],
    input: &'i I,
    cache: HashMap<(ExprId, usize), RuleResult<'i, I>>,
    pub(crate) error: ErrorState,
}

impl<'g, 'i, I: ParseInput + ?Sized> MatchState<'g, 'i, I> {
    pub(crate) fn new(exprs: &'g [Expr], input: &'i I, start: usize) -> MatchState<'g, 'i, I> {
        MatchState {
            exprs,
            input,
            cache: HashMap::new(),
            error: ErrorState::new(start),
        }
    }

    pub(crate) fn match_at(&mut self, id: ExprId, pos: usize) -> RuleResult<'i, I> {
        let expr: &'g Expr = &self.exprs[id.idx()];

        if cfg!(feature = "trace") {
            if let Some(name) = &expr.name {
                let (line, col) = self.input.line_col(pos);
                println!("[PEG_TRACE] Attempting to match rule `{name}` at {line}:{col}");
            }
        }

        if let Some(entry) = self.cache.get(&(id, pos)) {
            if cfg!(feature = "trace") {
                if let Some(name) = &expr.name {
                    match entry {
                        RuleResult::Matched(..) => {
                            println!("[PEG_TRACE] Cached match of rule `{name}`")
                        }
                        RuleResult::Failed => println!("[PEG_TRACE] Cached fail of rule `{name}`"),
                    }
                }
            }
            return entry.clone();
        }

        let result = self.uncached_match(id, expr, pos);

        if cfg!(feature = "trace") {
            if let Some(name) = &expr.name {
                match &result {
                    RuleResult::Matched(node) => {
                        let (line, col) = self.input.line_col(node.end());
                        println!("[PEG_TRACE] Matched rule `{name}` up to {line}:{col}");
                    }
                    RuleResult::Failed => println!("[PEG_TRACE] Failed to match rule `{name}`"),
                }
            }
        }

        self.cache.insert((id, pos), result.clone());
        result
    }

    fn uncached_match(&mut self, id: ExprId, expr: &'g Expr, pos: usize) -> RuleResult<'i, I> {
        match &expr.kind {
            ExprKind::Literal(literal) => match self.input.match_literal(pos, literal) {
                Some(end) => self.node(expr, pos, end, Vec::new()),
                None => self.fail(id, pos),
            },

            ExprKind::Regex(regex) => match self.input.match_regex(pos, &regex.re) {
                Some(m) => RuleResult::Matched(Rc::new(Node::with_groups(
                    expr.name.clone(),
                    self.input,
                    pos,
                    m.end,
                    m.groups,
                ))),
                None => self.fail(id, pos),
            },

            ExprKind::Custom { matcher, .. } => match self.input.match_custom(&**matcher, pos) {
                Some(end) => self.node(expr, pos, end, Vec::new()),
                None => self.fail(id, pos),
            },

            ExprKind::Sequence(members) => {
                let mut children = Vec::with_capacity(members.len());
                let mut end = pos;
                for &member in members {
                    match self.match_at(member, end) {
                        RuleResult::Matched(node) => {
                            end = node.end();
                            children.push(node);
                        }
                        RuleResult::Failed => return RuleResult::Failed,
                    }
                }
                self.node(expr, pos, end, children)
            }

            ExprKind::OneOf(members) => {
                for &member in members {
                    if let RuleResult::Matched(node) = self.match_at(member, pos) {
                        let end = node.end();
                        return self.node(expr, pos, end, vec![node]);
                    }
                }
                RuleResult::Failed
            }

            ExprKind::Lookahead(member) => match self.match_at(*member, pos) {
                RuleResult::Matched(_) => self.node(expr, pos, pos, Vec::new()),
                RuleResult::Failed => RuleResult::Failed,
            },

            ExprKind::Not(member) => match self.match_at(*member, pos) {
                RuleResult::Matched(_) => RuleResult::Failed,
                RuleResult::Failed => self.node(expr, pos, pos, Vec::new()),
            },

            ExprKind::Optional(member) => match self.match_at(*member, pos) {
                RuleResult::Matched(node) => {
                    let end = node.end();
                    self.node(expr, pos, end, vec![node])
                }
                RuleResult::Failed => self.node(expr, pos, pos, Vec::new()),
            },

            ExprKind::ZeroOrMore(member) => {
                let mut children = Vec::new();
                let mut end = pos;
                loop {
                    match self.match_at(*member, end) {
                        // A zero-width match would repeat forever; stop
                        // without collecting it.
                        RuleResult::Matched(node) if node.end() > end => {
                            end = node.end();
                            children.push(node);
                        }
                        _ => return self.node(expr, pos, end, children),
                    }
                }
            }

            ExprKind::OneOrMore(member) => {
                let mut children = Vec::new();
                let mut end = pos;
                loop {
                    match self.match_at(*member, end) {
                        RuleResult::Matched(node) => {
                            let new_end = node.end();
                            children.push(node);
                            if new_end == end {
                                break;
                            }
                            end = new_end;
                        }
                        RuleResult::Failed => break,
                    }
                }
                if children.is_empty() {
                    RuleResult::Failed
                } else {
                    self.node(expr, pos, end, children)
                }
            }

            ExprKind::Reference { name, .. } => {
                panic!("unresolved reference `{name}` reached at match time; this is a bug")
            }
        }
    }

    fn node(
        &self,
        expr: &Expr,
        start: usize,
        end: usize,
        children: Vec<Rc<Node<'i, I>>>,
    ) -> RuleResult<'i, I> {
        RuleResult::Matched(Rc::new(Node::new(
            expr.name.clone(),
            self.input,
            start,
            end,
            children,
        )))
    }

    /// Record a failed expectation and fail. Only called for expressions that
    /// expect concrete input; combinators fail silently through their members.
    fn fail(&mut self, id: ExprId, pos: usize) -> RuleResult<'i, I> {
        self.error.mark_failure(pos, id);
        RuleResult::Failed
    }
}
