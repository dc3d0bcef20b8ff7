//! Packrat PEG parsing.
//!
//! A [`Grammar`] compiles rule text into an immutable graph of expressions
//! and parses input in linear time using a per-call memo table, producing a
//! concrete syntax tree of [`Node`]s. A [`NodeVisitor`] then folds that tree
//! bottom-up into whatever value the host wants.
//!
//! ```
//! use packrat::Grammar;
//!
//! let grammar = Grammar::new(concat!(
//!     "greeting = salutation \", \" object \"!\"\n",
//!     "salutation = \"Hello\" / \"Goodbye\"\n",
//!     "object = ~\"[a-z]+\"\n",
//! ))
//! .unwrap();
//!
//! let tree = grammar.parse("Hello, world!").unwrap();
//! assert_eq!(tree.expr_name(), Some("greeting"));
//! assert_eq!(tree.children()[2].text(), "world");
//! ```
//!
//! Choices are prioritized (the first matching alternative wins), lookaheads
//! `&`/`!` consume nothing, and quantifiers `?`/`*`/`+` are greedy — the
//! usual PEG semantics. Rules may reference each other forward and
//! cyclically; left recursion is rejected when the grammar is built, since a
//! PEG matcher cannot run it without recursing forever.
//!
//! Grammars are immutable once constructed and safe to share across threads;
//! each parse call owns its memo table and discards it on return.

mod analysis;
mod ast;
mod error;
mod grammar;
mod input;
mod matcher;
mod node;
mod visitor;

pub use crate::ast::{Expr, ExprId};
pub use crate::error::{ExpectedSet, GrammarError, Mismatch, ParseError};
pub use crate::grammar::{Grammar, GrammarBuilder, TokenGrammar};
pub use crate::input::{ParseInput, RegexMatch, Token};
pub use crate::node::Node;
pub use crate::visitor::{visit, NodeVisitor, NodeVisitorExt, Visit, VisitationError};
