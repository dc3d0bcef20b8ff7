//! Per-variant matching semantics.

use packrat::{Grammar, GrammarBuilder, ParseError};

#[test]
fn literal_matches_exactly() {
    let g = Grammar::new("greeting = \"hello\"\n").unwrap();
    let node = g.parse("hello").unwrap();
    assert_eq!(node.expr_name(), Some("greeting"));
    assert_eq!((node.start(), node.end()), (0, 5));

    assert!(g.parse("Hello").is_err());
    assert!(g.parse("hell").is_err());
}

#[test]
fn match_at_accepts_a_prefix_and_a_start_offset() {
    let g = Grammar::new("word = ~\"[a-z]+\"\n").unwrap();

    let node = g.match_at("abc def", 0).unwrap();
    assert_eq!(node.end(), 3);

    let node = g.match_at("abc def", 4).unwrap();
    assert_eq!((node.start(), node.end()), (4, 7));
    assert_eq!(node.text(), "def");
}

#[test]
fn regex_is_anchored_at_the_position() {
    let g = Grammar::new("digits = ~\"[0-9]+\"\n").unwrap();
    // A match further right does not count.
    assert!(g.match_at("ab12", 0).is_err());
    let node = g.match_at("12ab", 0).unwrap();
    assert_eq!(node.end(), 2);
}

#[test]
fn regex_node_retains_capture_groups() {
    let g = Grammar::new("pair = ~\"([a-z]+)=([0-9]+)?\"\n").unwrap();
    let node = g.parse("size=42").unwrap();
    assert_eq!(node.group(0).as_deref(), Some("size=42"));
    assert_eq!(node.group(1).as_deref(), Some("size"));
    assert_eq!(node.group(2).as_deref(), Some("42"));

    let node = g.parse("size=").unwrap();
    assert_eq!(node.group(1).as_deref(), Some("size"));
    assert_eq!(node.group(2), None);
}

#[test]
fn regex_flags_apply() {
    let g = Grammar::new("word = ~\"[a-z]+\"i\n").unwrap();
    assert!(g.parse("MiXeD").is_ok());

    let g = Grammar::new("pair = ~\"a.b\"s\n").unwrap();
    assert!(g.parse("a\nb").is_ok());
}

#[test]
fn sequence_concatenates_spans_and_keeps_all_children() {
    let g = Grammar::new("abc = \"a\" \"b\" \"c\"\n").unwrap();
    let node = g.parse("abc").unwrap();
    assert_eq!(node.children().len(), 3);
    assert_eq!(node.children()[1].text(), "b");
    assert_eq!((node.children()[2].start(), node.children()[2].end()), (2, 3));
}

#[test]
fn choice_is_prioritized() {
    // "a" wins even though "ab" would consume more.
    let g = Grammar::new("r = \"a\" / \"ab\"\n").unwrap();
    let node = g.match_at("ab", 0).unwrap();
    assert_eq!(node.end(), 1);
    assert_eq!(node.children().len(), 1);
    assert_eq!(node.children()[0].text(), "a");
}

#[test]
fn choice_falls_through_to_later_alternatives() {
    let g = Grammar::new("r = \"a\" / \"b\" / \"c\"\n").unwrap();
    let node = g.parse("c").unwrap();
    assert_eq!(node.children()[0].text(), "c");
    assert!(g.parse("d").is_err());
}

#[test]
fn optional_consumes_its_member_or_nothing() {
    let g = Grammar::new("r = \"a\"?\n").unwrap();

    let node = g.parse("a").unwrap();
    assert_eq!(node.children().len(), 1);
    assert_eq!(node.end(), 1);

    let node = g.parse("").unwrap();
    assert_eq!(node.children().len(), 0);
    assert_eq!((node.start(), node.end()), (0, 0));
}

#[test]
fn not_succeeds_exactly_when_its_member_fails() {
    let g = Grammar::new("consonants = (!vowel letter)+\nvowel = ~\"[aeiou]\"\nletter = ~\"[a-z]\"\n")
        .unwrap();
    assert!(g.parse("qwrty").is_ok());
    assert!(g.parse("rust").is_err());

    // Either way it consumes nothing.
    let node = g.parse("q").unwrap();
    let step = &node.children()[0];
    let lookahead = &step.children()[0];
    assert_eq!((lookahead.start(), lookahead.end()), (0, 0));
}

#[test]
fn lookahead_succeeds_with_its_member_and_consumes_nothing() {
    let g = Grammar::new("r = &\"ab\" letter letter\nletter = ~\"[a-z]\"\n").unwrap();
    let node = g.parse("ab").unwrap();
    assert_eq!(node.children()[0].end(), 0);
    assert_eq!(node.end(), 2);

    assert!(g.parse("ba").is_err());
}

#[test]
fn zero_or_more_collects_greedily_and_can_match_nothing() {
    let g = Grammar::new("r = \"a\"*\n").unwrap();
    assert_eq!(g.parse("aaa").unwrap().children().len(), 3);
    assert_eq!(g.parse("").unwrap().children().len(), 0);
    // Prefix match stops where the member stops.
    assert_eq!(g.match_at("aab", 0).unwrap().end(), 2);
}

#[test]
fn one_or_more_requires_a_first_match() {
    let g = Grammar::new("r = \"a\"+\n").unwrap();
    assert_eq!(g.parse("aa").unwrap().children().len(), 2);
    assert!(matches!(g.parse(""), Err(ParseError::Mismatch(_))));
}

#[test]
fn zero_width_quantified_members_terminate() {
    // A zero-width member would loop forever if the quantifier kept going;
    // it must stop instead.
    let g = Grammar::new("r = \"\"*\n").unwrap();
    let node = g.parse("").unwrap();
    assert_eq!(node.children().len(), 0);

    let g = Grammar::new("r = \"\"+\n").unwrap();
    let node = g.parse("").unwrap();
    assert_eq!(node.children().len(), 1);
    assert_eq!(node.end(), 0);

    let g = Grammar::new("r = (\"a\"?)*\n").unwrap();
    let node = g.match_at("b", 0).unwrap();
    assert_eq!(node.end(), 0);
}

#[test]
fn custom_matchers_have_the_builtin_contract() {
    let mut b = GrammarBuilder::new();
    let even = b.custom("even_digits", |text, pos| {
        let tail = &text[pos..];
        let len = tail.bytes().take_while(u8::is_ascii_digit).count();
        (len > 0 && len % 2 == 0).then_some(pos + len)
    });
    b.rule("even_digits", even);
    let g = Grammar::with_rules("value = even_digits \"!\"\n", b).unwrap();

    let node = g.parse("1234!").unwrap();
    assert_eq!(node.children()[0].text(), "1234");
    assert_eq!(node.children()[0].expr_name(), Some("even_digits"));
    assert!(g.parse("123!").is_err());
}

#[test]
fn parse_requires_consuming_to_the_end_but_match_does_not() {
    let g = Grammar::new("r = \"a\"\n").unwrap();
    assert!(g.match_at("ab", 0).is_ok());
    assert!(matches!(g.parse("ab"), Err(ParseError::Incomplete(_))));
}
