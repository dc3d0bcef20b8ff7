//! Parse-tree nodes.
//!
//! The matcher produces a tree of immutable [`Node`]s behind `Rc`. Because
//! the packrat cache shares results, the same node may appear at several
//! places in one tree; treat trees as read-only and fold them with a
//! [`NodeVisitor`](crate::NodeVisitor) instead of rewriting in place.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::input::ParseInput;

/// One node of a concrete syntax tree: the name of the expression that
/// produced it (empty for structural interior nodes), the span it matched,
/// and its children in match order. Nodes produced by regex expressions also
/// carry the match's capture-group spans.
pub struct Node<'i, I: ParseInput + ?Sized = str> {
    expr_name: Option<Arc<str>>,
    input: &'i I,
    start: usize,
    end: usize,
    children: Vec<Rc<Node<'i, I>>>,
    groups: Option<Vec<Option<(usize, usize)>>>,
}

impl<'i, I: ParseInput + ?Sized> Node<'i, I> {
    pub(crate) fn new(
        expr_name: Option<Arc<str>>,
        input: &'i I,
        start: usize,
        end: usize,
        children: Vec<Rc<Node<'i, I>>>,
    ) -> Node<'i, I> {
        debug_assert!(start <= end && end <= input.len());
        Node {
            expr_name,
            input,
            start,
            end,
            children,
            groups: None,
        }
    }

    pub(crate) fn with_groups(
        expr_name: Option<Arc<str>>,
        input: &'i I,
        start: usize,
        end: usize,
        groups: Vec<Option<(usize, usize)>>,
    ) -> Node<'i, I> {
        Node {
            groups: Some(groups),
            ..Node::new(expr_name, input, start, end, Vec::new())
        }
    }

    /// The rule name of the expression that produced this node, if named.
    pub fn expr_name(&self) -> Option<&str> {
        self.expr_name.as_deref()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// The input this node matched against.
    pub fn input(&self) -> &'i I {
        self.input
    }

    /// The text this node matched.
    pub fn text(&self) -> Cow<'i, str> {
        self.input.span(self.start, self.end)
    }

    pub fn children(&self) -> &[Rc<Node<'i, I>>] {
        &self.children
    }

    /// Capture-group spans of a regex match (group 0 is the whole match);
    /// `None` for nodes not produced by a regex expression.
    pub fn groups(&self) -> Option<&[Option<(usize, usize)>]> {
        self.groups.as_deref()
    }

    /// Text of capture group `i`, if this is a regex node and the group
    /// participated in the match.
    pub fn group(&self, i: usize) -> Option<Cow<'i, str>> {
        let (start, end) = (*self.groups.as_ref()?.get(i)?)?;
        Some(self.input.span(start, end))
    }

    /// Pretty-print this subtree, one node per line. `error` marks a node
    /// (compared by address) to highlight where a visitor blew up.
    pub fn prettily(&self, error: Option<&Node<'i, I>>) -> String {
        let mut out = String::new();
        self.prettily_into(&mut out, 0, error);
        out
    }

    fn prettily_into(&self, out: &mut String, depth: usize, error: Option<&Node<'i, I>>) {
        for _ in 0..depth {
            out.push_str("    ");
        }
        let kind = if self.groups.is_some() { "RegexNode" } else { "Node" };
        out.push('<');
        out.push_str(kind);
        if let Some(name) = self.expr_name() {
            out.push_str(&format!(" called '{name}'"));
        }
        out.push_str(&format!(" matching \"{}\">", self.text()));
        if error.is_some_and(|e| std::ptr::eq(e, self)) {
            out.push_str("  <-- *** We were here. ***");
        }
        out.push('\n');
        for child in &self.children {
            child.prettily_into(out, depth + 1, error);
        }
    }
}

impl<'i, I: ParseInput + ?Sized> fmt::Display for Node<'i, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prettily(None).trim_end())
    }
}

impl<'i, I: ParseInput + ?Sized> fmt::Debug for Node<'i, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("expr_name", &self.expr_name)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("children", &self.children)
            .finish()
    }
}

/// Deep structural comparison: name, span, children, and capture groups.
impl<'i, I: ParseInput + ?Sized> PartialEq for Node<'i, I> {
    fn eq(&self, other: &Self) -> bool {
        self.expr_name == other.expr_name
            && self.start == other.start
            && self.end == other.end
            && self.groups == other.groups
            && self.children == other.children
    }
}

impl<'i, I: ParseInput + ?Sized> Eq for Node<'i, I> {}
