//! Folding parse trees into values.
//!
//! A [`NodeVisitor`] turns a parse tree bottom-up into whatever the host
//! wants: an AST, a number, a rendered document. The driver walks the tree
//! depth-first post-order, hands each node its already-visited children, and
//! dispatches on the node's rule name. Handler errors come back wrapped in a
//! [`VisitationError`] that pretty-prints the tree with the offending node
//! marked, unless the visitor declares that error kind unwrapped.

use std::fmt;

use crate::error::ParseError;
use crate::grammar::Grammar;
use crate::input::ParseInput;
use crate::node::Node;

/// The outcome of dispatching one node to a visitor.
pub enum Visit<T, E> {
    /// The node's visited value.
    Value(T),
    /// The handler failed.
    Error(E),
    /// No handler for this node; hands the children back so the driver can
    /// fall through to [`NodeVisitor::generic_visit`].
    Unhandled(Vec<T>),
}

/// A bottom-up fold over a parse tree.
///
/// Implementations dispatch on the rule name in [`visit_rule`]; a typical
/// visitor is a `match` with one arm per rule it cares about and
/// `Visit::Unhandled(children)` for the rest. Nodes without a name, and named
/// nodes the visitor declines, go to [`generic_visit`].
///
/// [`visit_rule`]: NodeVisitor::visit_rule
/// [`generic_visit`]: NodeVisitor::generic_visit
pub trait NodeVisitor<'i, I: ParseInput + ?Sized = str> {
    type Output;
    type Error: fmt::Display;

    /// Handle a node produced by the named rule, given its children's visited
    /// values in order.
    fn visit_rule(
        &mut self,
        rule: &str,
        node: &Node<'i, I>,
        children: Vec<Self::Output>,
    ) -> Visit<Self::Output, Self::Error>;

    /// Fallback for unnamed nodes and rules without a dedicated handler. The
    /// default declines everything, which the driver reports as a
    /// missing-handler error.
    fn generic_visit(
        &mut self,
        node: &Node<'i, I>,
        children: Vec<Self::Output>,
    ) -> Visit<Self::Output, Self::Error> {
        let _ = node;
        Visit::Unhandled(children)
    }

    /// Errors of this kind propagate raw instead of being wrapped in a
    /// [`VisitationError::Handler`] with the parse tree attached.
    fn is_unwrapped(&self, error: &Self::Error) -> bool {
        let _ = error;
        false
    }

    /// The grammar this visitor is meant to consume trees of; enables the
    /// [`NodeVisitorExt::parse`] and [`NodeVisitorExt::match_at`] shortcuts.
    fn grammar(&self) -> Option<&Grammar> {
        None
    }
}

/// Fold `root` with `visitor`, depth-first post-order.
pub fn visit<'i, I, V>(
    visitor: &mut V,
    root: &Node<'i, I>,
) -> Result<V::Output, VisitationError<V::Error>>
where
    I: ParseInput + ?Sized,
    V: NodeVisitor<'i, I> + ?Sized,
{
    visit_node(visitor, root, root)
}

fn visit_node<'i, I, V>(
    visitor: &mut V,
    node: &Node<'i, I>,
    root: &Node<'i, I>,
) -> Result<V::Output, VisitationError<V::Error>>
where
    I: ParseInput + ?Sized,
    V: NodeVisitor<'i, I> + ?Sized,
{
    let mut children = Vec::with_capacity(node.children().len());
    for child in node.children() {
        children.push(visit_node(visitor, child, root)?);
    }

    let outcome = match node.expr_name() {
        Some(rule) => match visitor.visit_rule(rule, node, children) {
            Visit::Unhandled(children) => visitor.generic_visit(node, children),
            handled => handled,
        },
        None => visitor.generic_visit(node, children),
    };

    match outcome {
        Visit::Value(value) => Ok(value),
        Visit::Error(error) if visitor.is_unwrapped(&error) => {
            Err(VisitationError::Unwrapped(error))
        }
        Visit::Error(error) => Err(VisitationError::Handler {
            error,
            tree: root.prettily(Some(node)),
        }),
        Visit::Unhandled(_) => Err(VisitationError::NoHandler {
            rule: node.expr_name().map(String::from),
        }),
    }
}

/// Something went wrong while folding a parse tree.
#[derive(Debug)]
pub enum VisitationError<E> {
    /// A handler failed; carries the original error and the pretty-printed
    /// tree with the offending node marked.
    Handler { error: E, tree: String },
    /// A handler failed with an error kind the visitor declared unwrapped.
    Unwrapped(E),
    /// No named handler and no generic fallback accepted the node.
    NoHandler { rule: Option<String> },
    /// The `parse`/`match_at` shortcut could not produce a tree to visit.
    Parse(ParseError),
    /// The `parse`/`match_at` shortcut was used on a visitor with no grammar.
    NoGrammar,
}

impl<E> VisitationError<E> {
    /// The handler's original error, for callers that want to inspect it
    /// regardless of wrapping.
    pub fn original(self) -> Option<E> {
        match self {
            VisitationError::Handler { error, .. } | VisitationError::Unwrapped(error) => {
                Some(error)
            }
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for VisitationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitationError::Handler { error, tree } => {
                write!(f, "{error}\n\nParse tree:\n{tree}")
            }
            VisitationError::Unwrapped(error) => write!(f, "{error}"),
            VisitationError::NoHandler { rule: Some(rule) } => {
                write!(f, "no visitor method was defined for rule '{rule}'")
            }
            VisitationError::NoHandler { rule: None } => {
                write!(f, "no visitor method was defined for an unnamed node")
            }
            VisitationError::Parse(error) => write!(f, "{error}"),
            VisitationError::NoGrammar => write!(
                f,
                "this visitor was never associated with a grammar; fill in `grammar` \
                 or parse separately and call `visit`"
            ),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for VisitationError<E> {}

impl<E> From<ParseError> for VisitationError<E> {
    fn from(error: ParseError) -> Self {
        VisitationError::Parse(error)
    }
}

/// Parse-then-visit shortcuts for visitors over text grammars.
pub trait NodeVisitorExt<'i>: NodeVisitor<'i, str> {
    /// Parse `text` with this visitor's grammar, then fold the tree.
    fn parse(&mut self, text: &'i str) -> Result<Self::Output, VisitationError<Self::Error>> {
        let grammar = self.grammar().cloned().ok_or(VisitationError::NoGrammar)?;
        let tree = grammar.parse(text)?;
        visit(self, &tree)
    }

    /// Prefix-match `text` at `pos` with this visitor's grammar, then fold
    /// the tree.
    fn match_at(
        &mut self,
        text: &'i str,
        pos: usize,
    ) -> Result<Self::Output, VisitationError<Self::Error>> {
        let grammar = self.grammar().cloned().ok_or(VisitationError::NoGrammar)?;
        let tree = grammar.match_at(text, pos)?;
        visit(self, &tree)
    }
}

impl<'i, V: NodeVisitor<'i, str> + ?Sized> NodeVisitorExt<'i> for V {}
