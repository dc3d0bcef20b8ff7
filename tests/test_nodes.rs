//! The visitor framework: dispatch, error wrapping, and the parse-then-visit
//! shortcuts.

use std::fmt;

use packrat::{
    visit, Grammar, Node, NodeVisitor, NodeVisitorExt, Visit, VisitationError,
};

#[derive(Debug, PartialEq)]
enum CalcError {
    Overflow,
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sum overflowed")
    }
}

fn sum_grammar() -> Grammar {
    Grammar::new("expr = num plus_num*\nplus_num = \"+\" num\nnum = ~\"[0-9]+\"\n").unwrap()
}

/// Sums the numbers in `1+2+3`. Structural nodes just add up their children,
/// so only `num` needs a handler.
struct Summer {
    grammar: Grammar,
}

impl<'i> NodeVisitor<'i> for Summer {
    type Output = i64;
    type Error = CalcError;

    fn visit_rule(
        &mut self,
        rule: &str,
        node: &Node<'i>,
        children: Vec<i64>,
    ) -> Visit<i64, CalcError> {
        match rule {
            "num" => match node.text().parse::<i64>() {
                Ok(n) => Visit::Value(n),
                Err(_) => Visit::Error(CalcError::Overflow),
            },
            _ => Visit::Unhandled(children),
        }
    }

    fn generic_visit(&mut self, _node: &Node<'i>, children: Vec<i64>) -> Visit<i64, CalcError> {
        Visit::Value(children.into_iter().sum())
    }

    fn grammar(&self) -> Option<&Grammar> {
        Some(&self.grammar)
    }
}

#[test]
fn visitation_is_bottom_up_in_document_order() {
    let grammar = sum_grammar();
    let tree = grammar.parse("1+2+30").unwrap();
    let mut summer = Summer { grammar };
    assert_eq!(visit(&mut summer, &tree).unwrap(), 33);
}

#[test]
fn the_parse_shortcut_bundles_parsing_and_visiting() {
    let mut summer = Summer {
        grammar: sum_grammar(),
    };
    assert_eq!(summer.parse("4+5").unwrap(), 9);

    match summer.parse("4+") {
        Err(VisitationError::Parse(_)) => {}
        other => panic!("expected a parse error, got {other:?}"),
    }

    assert_eq!(summer.match_at("6+1 and the rest", 0).unwrap(), 7);
}

struct Grammarless;

impl<'i> NodeVisitor<'i> for Grammarless {
    type Output = ();
    type Error = CalcError;

    fn visit_rule(&mut self, _: &str, _: &Node<'i>, children: Vec<()>) -> Visit<(), CalcError> {
        Visit::Unhandled(children)
    }

    fn generic_visit(&mut self, _: &Node<'i>, _: Vec<()>) -> Visit<(), CalcError> {
        Visit::Value(())
    }
}

#[test]
fn the_parse_shortcut_needs_a_grammar() {
    match Grammarless.parse("anything") {
        Err(VisitationError::NoGrammar) => {}
        other => panic!("expected NoGrammar, got {:?}", other.map(|_| ())),
    }
}

/// A visitor with no fallback at all: every node must have a named handler.
struct Strict;

impl<'i> NodeVisitor<'i> for Strict {
    type Output = ();
    type Error = CalcError;

    fn visit_rule(&mut self, _: &str, _: &Node<'i>, children: Vec<()>) -> Visit<(), CalcError> {
        Visit::Unhandled(children)
    }
}

#[test]
fn missing_handlers_are_a_configuration_error() {
    let grammar = Grammar::new("r = \"x\"\n").unwrap();
    let tree = grammar.parse("x").unwrap();
    match visit(&mut Strict, &tree) {
        Err(VisitationError::NoHandler { rule }) => assert_eq!(rule.as_deref(), Some("r")),
        other => panic!("expected NoHandler, got {:?}", other.map(|_| ())),
    }
}

#[derive(Debug, PartialEq)]
enum LookupError {
    MissingKey(&'static str),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::MissingKey(key) => write!(f, "missing key {key:?}"),
        }
    }
}

/// Blows up on `text` nodes; used to exercise error wrapping.
struct Exploder {
    unwrap_lookup_errors: bool,
}

impl<'i> NodeVisitor<'i> for Exploder {
    type Output = ();
    type Error = LookupError;

    fn visit_rule(
        &mut self,
        rule: &str,
        _node: &Node<'i>,
        children: Vec<()>,
    ) -> Visit<(), LookupError> {
        match rule {
            "text" => Visit::Error(LookupError::MissingKey("style")),
            _ => Visit::Unhandled(children),
        }
    }

    fn generic_visit(&mut self, _: &Node<'i>, _: Vec<()>) -> Visit<(), LookupError> {
        Visit::Value(())
    }

    fn is_unwrapped(&self, _: &LookupError) -> bool {
        self.unwrap_lookup_errors
    }
}

fn bold_tree_grammar() -> Grammar {
    Grammar::new("bold = \"((\" text \"))\"\ntext = ~\"[A-Z 0-9]*\"i\n").unwrap()
}

#[test]
fn handler_errors_are_wrapped_with_a_marked_tree() {
    let grammar = bold_tree_grammar();
    let tree = grammar.parse("((BOLD STUFF))").unwrap();
    let mut visitor = Exploder {
        unwrap_lookup_errors: false,
    };
    match visit(&mut visitor, &tree) {
        Err(VisitationError::Handler { error, tree }) => {
            assert_eq!(error, LookupError::MissingKey("style"));
            assert!(tree.contains("called 'bold'"));
            let marked = tree
                .lines()
                .find(|line| line.contains("*** We were here. ***"))
                .expect("some line is marked");
            assert!(marked.contains("called 'text'"));
        }
        other => panic!("expected a wrapped error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn declared_error_kinds_propagate_unwrapped() {
    let grammar = bold_tree_grammar();
    let tree = grammar.parse("((BOLD STUFF))").unwrap();
    let mut visitor = Exploder {
        unwrap_lookup_errors: true,
    };
    match visit(&mut visitor, &tree) {
        Err(VisitationError::Unwrapped(error)) => {
            assert_eq!(error, LookupError::MissingKey("style"));
        }
        other => panic!("expected the raw error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn wrapped_errors_print_the_original_and_the_tree() {
    let grammar = bold_tree_grammar();
    let tree = grammar.parse("((A))").unwrap();
    let mut visitor = Exploder {
        unwrap_lookup_errors: false,
    };
    let err = visit(&mut visitor, &tree).unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("missing key \"style\""));
    assert!(message.contains("Parse tree:"));
    assert!(message.contains("We were here."));
}

#[test]
fn trees_pretty_print_one_node_per_line() {
    let grammar = bold_tree_grammar();
    let tree = grammar.parse("((HI))").unwrap();
    let printed = tree.prettily(None);
    let lines: Vec<&str> = printed.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("<Node called 'bold' matching \"((HI))\">"));
    assert!(lines[2].contains("<RegexNode called 'text' matching \"HI\">"));
    assert!(lines[1].starts_with("    "));
}
