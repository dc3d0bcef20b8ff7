//! Static checks on a resolved grammar.
//!
//! If a PEG expression can recurse without first consuming input, matching it
//! would recurse until the host stack overflows — the packrat cache only
//! breaks recursion at distinct positions. Construction walks the prefix of
//! each rule reachable without consuming anything and rejects such grammars.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{Expr, ExprId, ExprKind};

pub(crate) struct LeftRecursionError {
    pub(crate) path: Vec<String>,
}

impl LeftRecursionError {
    pub(crate) fn path_string(&self) -> String {
        self.path.join(" -> ")
    }
}

pub(crate) fn check(
    exprs: &[Expr],
    rules: &[(Arc<str>, ExprId)],
) -> Result<(), LeftRecursionError> {
    let mut rule_ids: HashMap<ExprId, Arc<str>> = HashMap::new();
    for (name, id) in rules {
        rule_ids.entry(*id).or_insert_with(|| Arc::clone(name));
    }

    let mut visitor = LeftRecursionVisitor {
        exprs,
        rule_ids: &rule_ids,
        stack: Vec::new(),
        error: None,
    };

    for (_, id) in rules {
        visitor.walk(*id);
        debug_assert!(visitor.stack.is_empty());
        if let Some(error) = visitor.error.take() {
            return Err(error);
        }
    }
    Ok(())
}

struct LeftRecursionVisitor<'a> {
    exprs: &'a [Expr],
    rule_ids: &'a HashMap<ExprId, Arc<str>>,
    stack: Vec<ExprId>,
    error: Option<LeftRecursionError>,
}

impl<'a> LeftRecursionVisitor<'a> {
    /// Walk the prefix of `id` reachable without consuming input. Returns
    /// true if the expression is known to match completely without consuming
    /// anything; unknown cases (regexes, custom matchers) conservatively
    /// return false to avoid false positives.
    fn walk(&mut self, id: ExprId) -> bool {
        if let Some(name) = self.rule_ids.get(&id) {
            if let Some(loop_start) = self.stack.iter().position(|on_stack| *on_stack == id) {
                if self.error.is_none() {
                    let mut path: Vec<String> = self.stack[loop_start..]
                        .iter()
                        .map(|id| self.rule_ids[id].to_string())
                        .collect();
                    path.push(name.to_string());
                    self.error = Some(LeftRecursionError { path });
                }
                return false;
            }
            self.stack.push(id);
            let nullable = self.walk_members(id);
            self.stack.pop();
            return nullable;
        }
        self.walk_members(id)
    }

    fn walk_members(&mut self, id: ExprId) -> bool {
        match &self.exprs[id.idx()].kind {
            ExprKind::Literal(s) => s.is_empty(),
            ExprKind::Regex(_) | ExprKind::Custom { .. } => false,

            ExprKind::Sequence(members) => {
                for &member in members {
                    if !self.walk(member) {
                        return false;
                    }
                }
                true
            }

            ExprKind::OneOf(members) => {
                let mut nullable = false;
                for &member in members {
                    nullable |= self.walk(member);
                }
                nullable
            }

            ExprKind::Lookahead(member)
            | ExprKind::Not(member)
            | ExprKind::Optional(member)
            | ExprKind::ZeroOrMore(member) => {
                self.walk(*member);
                true
            }

            ExprKind::OneOrMore(member) => self.walk(*member),

            ExprKind::Reference { name, .. } => {
                unreachable!("reference `{name}` survived resolution")
            }
        }
    }
}
