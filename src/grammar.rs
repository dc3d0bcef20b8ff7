//! Grammar construction: the rule notation, its compiler, and the public
//! [`Grammar`] / [`TokenGrammar`] types.
//!
//! The notation is parsed by a meta-grammar that is itself built with this
//! engine. A small hand-assembled bootstrap grammar parses [`RULE_SYNTAX`],
//! the rule compiler turns that tree into the real meta-grammar, and from
//! then on user grammars go through the same pipeline: meta-parse, compile
//! each rule, resolve references, check for left recursion.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops;
use std::rc::Rc;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::analysis;
use crate::ast::{self, Expr, ExprId, ExprKind, RegexExpr};
use crate::error::{ExpectedSet, GrammarError, Mismatch, ParseError};
use crate::input::{ParseInput, Token};
use crate::matcher::{MatchState, RuleResult};
use crate::node::Node;
use crate::visitor::{visit, NodeVisitor, Visit, VisitationError};

/// The grammar notation, in itself. Rules are newline-terminated; `#` starts
/// a comment; whitespace inside a rule is horizontal only.
const RULE_SYNTAX: &str = r##"# The grammar of the grammar notation itself.
rules = rule_or_rubbish*
rule_or_rubbish = rule / ws / comment
rule = label _? "=" _? expression _? comment? eol
literal = ~"u?r?b?\"[^\"\\\\]*(?:\\\\.[^\"\\\\]*)*\"|u?r?b?'[^'\\\\]*(?:\\\\.[^'\\\\]*)*'"is
eol = ~"(?:[\r\n]|$)"
expression = ored / sequence / term
ored = alternative or_term+
or_term = _? "/" _? alternative
alternative = sequence / term
sequence = term another_term+
another_term = _ term
not_term = "!" term
lookahead_term = "&" term
term = not_term / lookahead_term / quantified / atom
quantified = atom quantifier
atom = literal / regex / label / parenthesized
regex = "~" literal ~"[ilmsux]*"i
parenthesized = "(" _? expression _? ")"
quantifier = ~"[*+?]"
label = ~"[a-zA-Z_][a-zA-Z_0-9]*"
_ = ~"[ \t]+"
ws = ~"\s+"
comment = ~"#[^\r\n]*"
"##;

/// Matches a quoted literal with optional `u`/`r`/`b` prefixes, either quote
/// style, and backslash escapes.
const LITERAL_PATTERN: &str =
    r#"u?r?b?"[^"\\]*(?:\\.[^"\\]*)*"|u?r?b?'[^'\\]*(?:\\.[^'\\]*)*'"#;

/// Hand-assemble just enough of the notation's grammar to parse
/// [`RULE_SYNTAX`]. The expressions here must produce the same tree shapes
/// as their textual counterparts so one [`RuleVisitor`] serves both stages.
fn bootstrap_grammar() -> Grammar {
    let mut b = GrammarBuilder::new();

    let ws = b.regex(r"\s+", "").expect("bootstrap regex");
    b.rule("ws", ws);
    let comment = b.regex(r"#[^\r\n]*", "").expect("bootstrap regex");
    b.rule("comment", comment);
    let hspace = b.regex(r"[ \t]+", "").expect("bootstrap regex");
    b.rule("_", hspace);
    let label = b.regex("[a-zA-Z_][a-zA-Z_0-9]*", "").expect("bootstrap regex");
    b.rule("label", label);
    let quantifier = b.regex(r"[*+?]", "").expect("bootstrap regex");
    b.rule("quantifier", quantifier);
    let literal = b.regex(LITERAL_PATTERN, "is").expect("bootstrap regex");
    b.rule("literal", literal);

    let tilde = b.literal("~");
    let regex_flags = b.regex("[ilmsux]*", "i").expect("bootstrap regex");
    let regex = b.sequence(vec![tilde, literal, regex_flags]);
    b.rule("regex", regex);

    // RULE_SYNTAX uses no parentheses, lookaheads, or negations, so the
    // bootstrap can leave those alternatives out.
    let atom = b.one_of(vec![literal, regex, label]);
    b.rule("atom", atom);
    let quantified = b.sequence(vec![atom, quantifier]);
    b.rule("quantified", quantified);
    let term = b.one_of(vec![quantified, atom]);
    b.rule("term", term);

    let another_term = b.sequence(vec![hspace, term]);
    b.rule("another_term", another_term);
    let more_terms = b.one_or_more(another_term);
    let sequence = b.sequence(vec![term, more_terms]);
    b.rule("sequence", sequence);

    // An alternative is a whole sequence: `a b / c d` reads as
    // (a b) / (c d), alternation binding loosest.
    let alternative = b.one_of(vec![sequence, term]);
    b.rule("alternative", alternative);
    let opt_space = b.optional(hspace);
    let slash = b.literal("/");
    let or_term = b.sequence(vec![opt_space, slash, opt_space, alternative]);
    b.rule("or_term", or_term);
    let or_terms = b.one_or_more(or_term);
    let ored = b.sequence(vec![alternative, or_terms]);
    b.rule("ored", ored);

    let expression = b.one_of(vec![ored, sequence, term]);
    b.rule("expression", expression);

    let eol = b.regex(r"[\r\n]", "").expect("bootstrap regex");
    b.rule("eol", eol);
    let equals = b.literal("=");
    let opt_comment = b.optional(comment);
    let rule = b.sequence(vec![
        label,
        opt_space,
        equals,
        opt_space,
        expression,
        opt_space,
        opt_comment,
        eol,
    ]);
    b.rule("rule", rule);

    let rule_or_rubbish = b.one_of(vec![rule, ws, comment]);
    b.rule("rule_or_rubbish", rule_or_rubbish);
    let rules = b.zero_or_more(rule_or_rubbish);
    b.rule("rules", rules);
    b.default_rule("rules");

    b.build().unwrap_or_else(|e| panic!("bootstrap grammar failed to build: {e}"))
}

static META_GRAMMAR: Lazy<Grammar> = Lazy::new(|| {
    let bootstrap = bootstrap_grammar();
    let tree = bootstrap
        .parse(RULE_SYNTAX)
        .unwrap_or_else(|e| panic!("the bootstrap grammar failed to parse the rule syntax: {e}"));
    let mut visitor = RuleVisitor {
        builder: GrammarBuilder::new(),
    };
    if let Err(e) = visit(&mut visitor, &tree) {
        panic!("the rule syntax failed to compile: {e}");
    }
    visitor
        .builder
        .finish(0)
        .unwrap_or_else(|e| panic!("the rule syntax failed to compile: {e}"))
});

fn meta_grammar() -> &'static Grammar {
    &META_GRAMMAR
}

/// Builds an expression arena by hand. This is how the bootstrap grammar is
/// assembled and how hosts supply custom rules to [`Grammar::with_rules`] or
/// whole grammars without any source text.
#[derive(Default)]
pub struct GrammarBuilder {
    exprs: Vec<Expr>,
    rules: Vec<(Arc<str>, ExprId)>,
    default_name: Option<Arc<str>>,
}

impl GrammarBuilder {
    pub fn new() -> GrammarBuilder {
        GrammarBuilder::default()
    }

    fn push(&mut self, kind: ExprKind) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr { name: None, kind });
        id
    }

    pub fn literal(&mut self, literal: &str) -> ExprId {
        self.push(ExprKind::Literal(literal.to_owned()))
    }

    /// An anchored regex atom. `flags` is any combination of `ilmsux`; `l`
    /// has no equivalent here and is accepted and ignored.
    pub fn regex(&mut self, pattern: &str, flags: &str) -> Result<ExprId, GrammarError> {
        let flags = flags.to_lowercase();
        let inline: String = flags.chars().filter(|c| "imsux".contains(*c)).collect();
        let anchored = if inline.is_empty() {
            format!(r"\A(?:{pattern})")
        } else {
            format!(r"\A(?{inline}:{pattern})")
        };
        let re = regex::Regex::new(&anchored).map_err(|source| GrammarError::BadRegex {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(self.push(ExprKind::Regex(RegexExpr {
            pattern: pattern.to_owned(),
            flags,
            re,
        })))
    }

    pub fn sequence(&mut self, members: Vec<ExprId>) -> ExprId {
        self.push(ExprKind::Sequence(members))
    }

    pub fn one_of(&mut self, members: Vec<ExprId>) -> ExprId {
        self.push(ExprKind::OneOf(members))
    }

    pub fn lookahead(&mut self, member: ExprId) -> ExprId {
        self.push(ExprKind::Lookahead(member))
    }

    pub fn not(&mut self, member: ExprId) -> ExprId {
        self.push(ExprKind::Not(member))
    }

    pub fn optional(&mut self, member: ExprId) -> ExprId {
        self.push(ExprKind::Optional(member))
    }

    pub fn zero_or_more(&mut self, member: ExprId) -> ExprId {
        self.push(ExprKind::ZeroOrMore(member))
    }

    pub fn one_or_more(&mut self, member: ExprId) -> ExprId {
        self.push(ExprKind::OneOrMore(member))
    }

    /// A reference to a rule by name, resolved when the grammar is built.
    pub fn reference(&mut self, name: &str) -> ExprId {
        self.push(ExprKind::Reference {
            name: Arc::from(name),
            pos: None,
        })
    }

    fn reference_at(&mut self, name: &str, pos: usize) -> ExprId {
        self.push(ExprKind::Reference {
            name: Arc::from(name),
            pos: Some(pos),
        })
    }

    /// A host-supplied matcher with the same contract as the built-in atoms.
    /// Only meaningful for text input; token grammars fail it unconditionally.
    pub fn custom(
        &mut self,
        label: &str,
        matcher: impl Fn(&str, usize) -> Option<usize> + Send + Sync + 'static,
    ) -> ExprId {
        self.push(ExprKind::Custom {
            label: Arc::from(label),
            matcher: Arc::new(matcher),
        })
    }

    /// Register `expr` as the rule `name`, naming the expression. Later
    /// registrations of the same name override earlier ones.
    pub fn rule(&mut self, name: &str, expr: ExprId) {
        let name: Arc<str> = Arc::from(name);
        self.exprs[expr.idx()].name = Some(Arc::clone(&name));
        self.rules.push((name, expr));
    }

    /// Override the default rule; otherwise the first registered rule is it.
    pub fn default_rule(&mut self, name: &str) {
        self.default_name = Some(Arc::from(name));
    }

    fn literal_value(&self, id: ExprId) -> Option<&str> {
        match &self.exprs[id.idx()].kind {
            ExprKind::Literal(s) => Some(s),
            _ => None,
        }
    }

    /// Resolve references and produce an immutable grammar. The default rule
    /// is the explicitly chosen one, or the first registered rule.
    pub fn build(self) -> Result<Grammar, GrammarError> {
        self.finish(0)
    }

    /// `default_from` skips host-supplied rules when choosing the implicit
    /// default, so a grammar compiled from source starts at its first textual
    /// rule.
    fn finish(mut self, default_from: usize) -> Result<Grammar, GrammarError> {
        // Consolidate the rule table: last definition of a name wins, the
        // table keeps first-occurrence order.
        let mut by_name: HashMap<Arc<str>, ExprId> = HashMap::new();
        let mut ordered: Vec<Arc<str>> = Vec::new();
        for (name, id) in &self.rules {
            if !by_name.contains_key(name) {
                ordered.push(Arc::clone(name));
            }
            by_name.insert(Arc::clone(name), *id);
        }

        let default_name = self.default_name.clone().or_else(|| {
            self.rules
                .get(default_from..)
                .and_then(<[_]>::first)
                .map(|(name, _)| Arc::clone(name))
        });

        // A rule whose whole right-hand side is a reference is an alias;
        // chase the chain so the rule shares the target's expression
        // identity. A chain that bites its own tail can never match.
        for name in &ordered {
            let mut id = by_name[name.as_ref()];
            let mut seen: Vec<Arc<str>> = vec![Arc::clone(name)];
            loop {
                let (target, pos) = match &self.exprs[id.idx()].kind {
                    ExprKind::Reference { name: target, pos } => (Arc::clone(target), *pos),
                    _ => break,
                };
                if seen.contains(&target) {
                    seen.push(target);
                    return Err(GrammarError::LeftRecursion {
                        path: seen.join(" -> "),
                    });
                }
                id = *by_name
                    .get(target.as_ref())
                    .ok_or_else(|| GrammarError::UndefinedLabel {
                        label: target.to_string(),
                        pos,
                    })?;
                seen.push(target);
            }
            by_name.insert(Arc::clone(name), id);
        }

        // Replace every reference reachable from a rule with the expression
        // bound to that name. The visited set keeps this terminating once
        // substitution makes the graph cyclic.
        let mut visited: HashSet<ExprId> = HashSet::new();
        let mut stack: Vec<ExprId> = ordered.iter().map(|n| by_name[n.as_ref()]).collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let children = self.exprs[id.idx()].kind.children().to_vec();
            if children.is_empty() {
                continue;
            }
            let mut resolved = Vec::with_capacity(children.len());
            for child in children {
                let target = match &self.exprs[child.idx()].kind {
                    ExprKind::Reference { name, pos } => *by_name.get(name.as_ref()).ok_or_else(
                        || GrammarError::UndefinedLabel {
                            label: name.to_string(),
                            pos: *pos,
                        },
                    )?,
                    _ => child,
                };
                resolved.push(target);
            }
            self.exprs[id.idx()].kind.set_children(&resolved);
            stack.extend(&resolved);
        }

        let rules: Vec<(Arc<str>, ExprId)> = ordered
            .iter()
            .map(|name| (Arc::clone(name), by_name[name.as_ref()]))
            .collect();

        analysis::check(&self.exprs, &rules).map_err(|e| GrammarError::LeftRecursion {
            path: e.path_string(),
        })?;

        let default = match default_name {
            Some(name) => {
                let id = *by_name
                    .get(name.as_ref())
                    .ok_or_else(|| GrammarError::MissingRule(name.to_string()))?;
                Some((name, id))
            }
            None => None,
        };

        Ok(Grammar {
            exprs: Arc::new(self.exprs),
            rules,
            by_name,
            default,
        })
    }
}

/// An immutable collection of named expressions describing a language, with a
/// designated default rule to start parsing from.
///
/// Construction compiles the source once; parsing never mutates the grammar,
/// so a grammar can be shared freely across threads.
#[derive(Clone, Debug)]
pub struct Grammar {
    exprs: Arc<Vec<Expr>>,
    rules: Vec<(Arc<str>, ExprId)>,
    by_name: HashMap<Arc<str>, ExprId>,
    default: Option<(Arc<str>, ExprId)>,
}

impl Grammar {
    /// Compile a grammar from rule source. The first rule is the default.
    pub fn new(source: &str) -> Result<Grammar, GrammarError> {
        Grammar::with_rules(source, GrammarBuilder::new())
    }

    /// Compile a grammar from rule source plus host-built rules. Custom rules
    /// can satisfy references from the textual rules; on a name collision the
    /// textual rule wins. The default is the first textual rule; with no
    /// textual rules the grammar has no default.
    pub fn with_rules(source: &str, custom: GrammarBuilder) -> Result<Grammar, GrammarError> {
        let default_from = custom.rules.len();
        let builder = compile_source(meta_grammar(), source, custom)?;
        builder.finish(default_from)
    }

    /// Assemble a grammar from per-rule source fragments, e.g. collected from
    /// the visitor methods that will consume the corresponding nodes. The
    /// first fragment's rule becomes the default.
    pub fn from_fragments(fragments: &[&str]) -> Result<Grammar, GrammarError> {
        Grammar::new(&fragments.join("\n"))
    }

    /// Parse `text` against the default rule, requiring the whole text to be
    /// consumed.
    pub fn parse<'i>(&self, text: &'i str) -> Result<Rc<Node<'i>>, ParseError> {
        self.run(text, 0, true)
    }

    /// Like [`parse`](Grammar::parse), starting at byte offset `pos` (which
    /// must lie on a character boundary).
    pub fn parse_at<'i>(&self, text: &'i str, pos: usize) -> Result<Rc<Node<'i>>, ParseError> {
        self.run(text, pos, true)
    }

    /// Match the default rule at `pos`, accepting any-length prefix match.
    pub fn match_at<'i>(&self, text: &'i str, pos: usize) -> Result<Rc<Node<'i>>, ParseError> {
        self.run(text, pos, false)
    }

    /// A copy of this grammar (sharing the expression arena) with a different
    /// default rule.
    pub fn default(&self, rule_name: &str) -> Result<Grammar, GrammarError> {
        match self.by_name.get_key_value(rule_name) {
            Some((name, id)) => Ok(Grammar {
                exprs: Arc::clone(&self.exprs),
                rules: self.rules.clone(),
                by_name: self.by_name.clone(),
                default: Some((Arc::clone(name), *id)),
            }),
            None => Err(GrammarError::MissingRule(rule_name.to_owned())),
        }
    }

    /// The expression bound to `name`, if any.
    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.by_name.get(name).map(|id| &self.exprs[id.idx()])
    }

    /// Rule names in definition order.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(name, _)| name.as_ref())
    }

    pub fn default_rule_name(&self) -> Option<&str> {
        self.default.as_ref().map(|(name, _)| name.as_ref())
    }

    pub(crate) fn run<'i, I: ParseInput + ?Sized>(
        &self,
        input: &'i I,
        pos: usize,
        complete: bool,
    ) -> Result<Rc<Node<'i, I>>, ParseError> {
        let (start_name, start_id) = match &self.default {
            Some((name, id)) => (Arc::clone(name), *id),
            None => return Err(ParseError::NoDefaultRule),
        };
        let mut state = MatchState::new(&self.exprs, input, pos);
        match state.match_at(start_id, pos) {
            RuleResult::Matched(node) if !complete || node.end() == input.len() => Ok(node),
            RuleResult::Matched(node) => Err(ParseError::Incomplete(self.mismatch(
                input,
                node.end(),
                start_name.to_string(),
                ExpectedSet::default(),
            ))),
            RuleResult::Failed => {
                let error = state.error;
                let rule = match error.last {
                    Some(id) => match self.exprs[id.idx()].name() {
                        Some(name) => name.to_owned(),
                        None => ast::describe(&self.exprs, id),
                    },
                    None => start_name.to_string(),
                };
                let mut expected = ExpectedSet::default();
                for id in &error.exprs {
                    expected.insert(ast::describe(&self.exprs, *id));
                }
                Err(ParseError::Mismatch(self.mismatch(
                    input,
                    error.max_err_pos,
                    rule,
                    expected,
                )))
            }
        }
    }

    fn mismatch<I: ParseInput + ?Sized>(
        &self,
        input: &I,
        pos: usize,
        rule: String,
        expected: ExpectedSet,
    ) -> Mismatch {
        let (line, column) = input.line_col(pos);
        Mismatch {
            text: input.span(0, input.len()).into_owned(),
            tail: input.span(pos.min(input.len()), input.len()).into_owned(),
            pos,
            rule,
            expected,
            line,
            column,
        }
    }

    /// The pattern of a regex atom reachable from some rule, if any. Token
    /// grammars use this to reject regexes at construction.
    pub(crate) fn reachable_regex(&self) -> Option<String> {
        let mut visited: HashSet<ExprId> = HashSet::new();
        let mut stack: Vec<ExprId> = self.rules.iter().map(|(_, id)| *id).collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            match &self.exprs[id.idx()].kind {
                ExprKind::Regex(r) => return Some(r.pattern.clone()),
                kind => stack.extend(kind.children()),
            }
        }
        None
    }
}

/// Round-trippable source form: the default rule first, then the rest in
/// definition order. Host-supplied rules have no textual form and print as
/// comments.
impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_rule = |f: &mut fmt::Formatter<'_>, name: &str, id: ExprId| {
            match &self.exprs[id.idx()].kind {
                ExprKind::Custom { .. } => writeln!(f, "# {name} is a host-supplied rule"),
                _ => writeln!(f, "{}", ast::rule_to_string(&self.exprs, name, id)),
            }
        };
        let default_name = self.default.as_ref().map(|(name, _)| name.as_ref());
        if let Some((name, id)) = &self.default {
            write_rule(f, name, *id)?;
        }
        for (name, id) in &self.rules {
            if Some(name.as_ref()) != default_name {
                write_rule(f, name, *id)?;
            }
        }
        Ok(())
    }
}

impl ops::Index<&str> for Grammar {
    type Output = Expr;

    fn index(&self, name: &str) -> &Expr {
        self.get(name)
            .unwrap_or_else(|| panic!("no rule named {name:?}"))
    }
}

/// A grammar over pre-lexed input: each literal matches one [`Token`] by its
/// kind instead of consuming characters. Regex atoms cannot apply to tokens
/// and are rejected at construction.
#[derive(Clone, Debug)]
pub struct TokenGrammar {
    grammar: Grammar,
}

impl TokenGrammar {
    pub fn new(source: &str) -> Result<TokenGrammar, GrammarError> {
        let grammar = Grammar::new(source)?;
        if let Some(pattern) = grammar.reachable_regex() {
            return Err(GrammarError::RegexInTokenGrammar(pattern));
        }
        Ok(TokenGrammar { grammar })
    }

    /// Parse the whole token sequence against the default rule.
    pub fn parse<'i>(&self, tokens: &'i [Token]) -> Result<Rc<Node<'i, [Token]>>, ParseError> {
        self.grammar.run(tokens, 0, true)
    }

    pub fn parse_at<'i>(
        &self,
        tokens: &'i [Token],
        pos: usize,
    ) -> Result<Rc<Node<'i, [Token]>>, ParseError> {
        self.grammar.run(tokens, pos, true)
    }

    pub fn match_at<'i>(
        &self,
        tokens: &'i [Token],
        pos: usize,
    ) -> Result<Rc<Node<'i, [Token]>>, ParseError> {
        self.grammar.run(tokens, pos, false)
    }

    pub fn default(&self, rule_name: &str) -> Result<TokenGrammar, GrammarError> {
        Ok(TokenGrammar {
            grammar: self.grammar.default(rule_name)?,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.grammar.get(name)
    }

    pub fn default_rule_name(&self) -> Option<&str> {
        self.grammar.default_rule_name()
    }
}

impl fmt::Display for TokenGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.grammar.fmt(f)
    }
}

impl ops::Index<&str> for TokenGrammar {
    type Output = Expr;

    fn index(&self, name: &str) -> &Expr {
        &self.grammar[name]
    }
}

fn compile_source(
    meta: &Grammar,
    source: &str,
    builder: GrammarBuilder,
) -> Result<GrammarBuilder, GrammarError> {
    let tree = meta
        .parse(source)
        .map_err(|e| GrammarError::BadGrammar(Box::new(e)))?;
    let mut visitor = RuleVisitor { builder };
    match visit(&mut visitor, &tree) {
        Ok(_) => Ok(visitor.builder),
        Err(VisitationError::Unwrapped(e)) | Err(VisitationError::Handler { error: e, .. }) => {
            Err(e)
        }
        Err(other) => unreachable!("the rule compiler handles every meta node: {other}"),
    }
}

/// Intermediate values produced while folding a meta-grammar parse tree into
/// expressions.
#[derive(Debug)]
enum MetaValue {
    /// Whitespace, comments, and other nodes with nothing to contribute.
    Skip,
    /// The matched text of a terminal the parent wants to look at.
    Text(String),
    /// A rule name, either a rule's left-hand side or a reference.
    Label { name: String, pos: usize },
    /// A compiled expression.
    Expr(ExprId),
    /// A finished `name = expression` rule.
    Rule { name: String, id: ExprId },
    /// Visited children of an unnamed structural node.
    List(Vec<MetaValue>),
    /// The final output of the whole tree.
    Done,
}

/// Turns a parse tree of the grammar notation into registered rules on its
/// builder. Textual references become [`Reference`](ExprKind::Reference)
/// placeholders for resolution.
struct RuleVisitor {
    builder: GrammarBuilder,
}

impl RuleVisitor {
    fn expr_of(&mut self, value: MetaValue) -> ExprId {
        match value {
            MetaValue::Expr(id) => id,
            MetaValue::Label { name, pos } => self.builder.reference_at(&name, pos),
            other => unreachable!("expected an expression in the meta tree, got {other:?}"),
        }
    }
}

impl<'i> NodeVisitor<'i, str> for RuleVisitor {
    type Output = MetaValue;
    type Error = GrammarError;

    fn visit_rule(
        &mut self,
        rule: &str,
        node: &Node<'i, str>,
        children: Vec<MetaValue>,
    ) -> Visit<MetaValue, GrammarError> {
        let value = match rule {
            "rules" => {
                for child in children {
                    if let MetaValue::Rule { name, id } = child {
                        self.builder.rule(&name, id);
                    }
                }
                MetaValue::Done
            }

            // One-of wrappers: hoist the chosen alternative.
            "rule_or_rubbish" | "expression" | "alternative" | "term" | "atom" => {
                let mut children = children;
                children.pop().expect("one-of node has a child")
            }

            "rule" => {
                // label _? "=" _? expression _? comment? eol
                let mut it = children.into_iter();
                let name = match it.next() {
                    Some(MetaValue::Label { name, .. }) => name,
                    other => unreachable!("rule starts with a label, got {other:?}"),
                };
                let rhs = it.nth(3).expect("rule has an expression");
                let id = self.expr_of(rhs);
                MetaValue::Rule { name, id }
            }

            "parenthesized" => {
                // "(" _? expression _? ")" — grouping only; the inner
                // expression's place in the tree keeps its meaning.
                let mut it = children.into_iter();
                it.nth(2).expect("parenthesized has an expression")
            }

            "quantified" => {
                let mut it = children.into_iter();
                let atom = it.next().expect("quantified has an atom");
                let atom = self.expr_of(atom);
                let quantifier = match it.next() {
                    Some(MetaValue::Text(q)) => q,
                    other => unreachable!("quantifier is a terminal, got {other:?}"),
                };
                MetaValue::Expr(match quantifier.as_str() {
                    "?" => self.builder.optional(atom),
                    "*" => self.builder.zero_or_more(atom),
                    "+" => self.builder.one_or_more(atom),
                    other => unreachable!("unknown quantifier {other:?}"),
                })
            }

            "not_term" => {
                let mut it = children.into_iter();
                let term = it.nth(1).expect("not_term has a term");
                let term = self.expr_of(term);
                MetaValue::Expr(self.builder.not(term))
            }

            "lookahead_term" => {
                let mut it = children.into_iter();
                let term = it.nth(1).expect("lookahead_term has a term");
                let term = self.expr_of(term);
                MetaValue::Expr(self.builder.lookahead(term))
            }

            "sequence" => {
                let mut it = children.into_iter();
                let first = it.next().expect("sequence has a first term");
                let first = self.expr_of(first);
                let mut members = vec![first];
                match it.next() {
                    Some(MetaValue::List(rest)) => {
                        for item in rest {
                            let member = self.expr_of(item);
                            members.push(member);
                        }
                    }
                    other => unreachable!("sequence tail is a list, got {other:?}"),
                }
                MetaValue::Expr(self.builder.sequence(members))
            }

            "ored" => {
                let mut it = children.into_iter();
                let first = it.next().expect("ored has a first term");
                let first = self.expr_of(first);
                let mut members = vec![first];
                match it.next() {
                    Some(MetaValue::List(rest)) => {
                        for item in rest {
                            let member = self.expr_of(item);
                            members.push(member);
                        }
                    }
                    other => unreachable!("ored tail is a list, got {other:?}"),
                }
                MetaValue::Expr(self.builder.one_of(members))
            }

            // _? "/" _? term — only the term matters.
            "or_term" => {
                let mut it = children.into_iter();
                it.nth(3).expect("or_term has a term")
            }

            // _ term — strip the space.
            "another_term" => {
                let mut it = children.into_iter();
                it.nth(1).expect("another_term has a term")
            }

            "label" => MetaValue::Label {
                name: node.text().into_owned(),
                pos: node.start(),
            },

            "literal" => {
                MetaValue::Expr(self.builder.literal(&unescape_literal(&node.text())))
            }

            "regex" => {
                // "~" literal flags
                let mut it = children.into_iter();
                let pattern = match it.nth(1) {
                    Some(MetaValue::Expr(id)) => self
                        .builder
                        .literal_value(id)
                        .expect("regex pattern is a literal")
                        .to_owned(),
                    other => unreachable!("regex pattern is a literal, got {other:?}"),
                };
                let flags = match it.next() {
                    Some(MetaValue::Text(flags)) => flags,
                    other => unreachable!("regex flags are a terminal, got {other:?}"),
                };
                match self.builder.regex(&pattern, &flags) {
                    Ok(id) => MetaValue::Expr(id),
                    Err(e) => return Visit::Error(e),
                }
            }

            "quantifier" => MetaValue::Text(node.text().into_owned()),

            "ws" | "comment" | "_" | "eol" => MetaValue::Skip,

            _ => return Visit::Unhandled(children),
        };
        Visit::Value(value)
    }

    fn generic_visit(
        &mut self,
        node: &Node<'i, str>,
        children: Vec<MetaValue>,
    ) -> Visit<MetaValue, GrammarError> {
        // Childbearing structural nodes reduce to their children; terminals
        // keep their text for parents that want it (quantifiers, flags).
        Visit::Value(if children.is_empty() {
            MetaValue::Text(node.text().into_owned())
        } else {
            MetaValue::List(children)
        })
    }

    fn is_unwrapped(&self, _error: &GrammarError) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_handles_prefixes_and_escapes() {
        assert_eq!(unescape_literal(r#""a\nb""#), "a\nb");
        assert_eq!(unescape_literal(r#"'a\'b'"#), "a'b");
        assert_eq!(unescape_literal(r#"r"a\nb""#), r"a\nb");
        assert_eq!(unescape_literal(r#"u"x""#), "x");
        assert_eq!(unescape_literal(r#""\d+""#), r"\d+");
        assert_eq!(unescape_literal(r#""\x41B""#), "AB");
    }

    #[test]
    fn meta_grammar_parses_the_rule_syntax() {
        let meta = meta_grammar();
        let tree = meta.parse(RULE_SYNTAX).expect("the rule syntax parses");
        assert_eq!(tree.end(), RULE_SYNTAX.len());
        assert_eq!(meta.default_rule_name(), Some("rules"));
    }

    #[test]
    fn recompiling_the_rule_syntax_is_stable() {
        // The compiled meta-grammar must accept and rebuild its own source
        // with the same rule set, which is what lets user grammars and the
        // notation itself share one pipeline.
        let again = Grammar::new(RULE_SYNTAX).unwrap();
        let ours: Vec<&str> = again.rule_names().collect();
        let meta: Vec<&str> = meta_grammar().rule_names().collect();
        assert_eq!(ours, meta);
        assert_eq!(again.default_rule_name(), Some("rules"));
    }
}

/// Strip the quotes and prefixes from a matched literal and process escapes.
/// An `r` prefix marks a raw literal that keeps its backslashes; unknown
/// escapes are preserved verbatim so regex patterns like `~"\d+"` survive.
fn unescape_literal(text: &str) -> String {
    let mut raw = false;
    let mut quote = '"';
    let mut body_start = 0;
    for (i, c) in text.char_indices() {
        match c {
            'r' | 'R' => raw = true,
            'u' | 'U' | 'b' | 'B' => {}
            q @ ('"' | '\'') => {
                quote = q;
                body_start = i + 1;
                break;
            }
            _ => unreachable!("literal starts with prefixes and a quote"),
        }
    }
    let body = &text[body_start..text.len() - quote.len_utf8()];
    if raw {
        return body.to_owned();
    }

    let chars: Vec<char> = body.chars().collect();
    let mut out = String::with_capacity(body.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if c != '\\' || i >= chars.len() {
            out.push(c);
            continue;
        }
        let escape = chars[i];
        i += 1;
        match escape {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '0' => out.push('\0'),
            '\\' | '"' | '\'' => out.push(escape),
            'x' | 'u' => {
                let digits = if escape == 'x' { 2 } else { 4 };
                let hex: String = chars[i..].iter().take(digits).collect();
                match (hex.len() == digits)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                {
                    Some(c) => {
                        out.push(c);
                        i += digits;
                    }
                    None => {
                        out.push('\\');
                        out.push(escape);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}
