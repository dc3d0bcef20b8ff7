//! Packrat behavior: one evaluation per (expression, position), stable
//! results, and thread-safe grammars.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use packrat::{Grammar, GrammarBuilder, TokenGrammar};

#[test]
fn a_shared_rule_is_evaluated_once_per_position() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut b = GrammarBuilder::new();
    let counter = Arc::clone(&calls);
    let word = b.custom("word", move |text, pos| {
        counter.fetch_add(1, Ordering::SeqCst);
        let len = text[pos..]
            .bytes()
            .take_while(u8::is_ascii_lowercase)
            .count();
        (len > 0).then_some(pos + len)
    });
    b.rule("word", word);

    // The first alternative matches `word` at 0 and 4, fails, and the second
    // alternative revisits both positions — served from the cache.
    let g = Grammar::with_rules("pair = word \"+\" word / word \" \" word\n", b).unwrap();
    assert!(g.parse("abc zzz").is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn backtracking_reuses_cached_subtrees() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut b = GrammarBuilder::new();
    let counter = Arc::clone(&calls);
    let digits = b.custom("digits", move |text, pos| {
        counter.fetch_add(1, Ordering::SeqCst);
        let len = text[pos..].bytes().take_while(u8::is_ascii_digit).count();
        (len > 0).then_some(pos + len)
    });
    b.rule("digits", digits);

    let g = Grammar::with_rules(
        concat!(
            "value = digits \"kg\" / digits \"cm\" / digits\n",
        ),
        b,
    )
    .unwrap();
    assert!(g.parse("250").is_ok());
    // Three alternatives, one evaluation.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn the_cache_is_per_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut b = GrammarBuilder::new();
    let counter = Arc::clone(&calls);
    let letter = b.custom("letter", move |text, pos| {
        counter.fetch_add(1, Ordering::SeqCst);
        text[pos..]
            .starts_with(|c: char| c.is_ascii_alphabetic())
            .then_some(pos + 1)
    });
    b.rule("letter", letter);
    let g = Grammar::with_rules("start = letter\n", b).unwrap();

    assert!(g.parse("a").is_ok());
    assert!(g.parse("a").is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn repeated_parses_build_equal_trees() {
    let g = Grammar::new(concat!(
        "doc = word (\" \" word)*\n",
        "word = ~\"[a-z]+\"\n",
    ))
    .unwrap();
    let first = g.parse("lorem ipsum dolor").unwrap();
    let second = g.parse("lorem ipsum dolor").unwrap();
    assert_eq!(first, second);
}

#[test]
fn grammars_are_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Grammar>();
    assert_send_sync::<TokenGrammar>();

    let g = Arc::new(Grammar::new("word = ~\"[a-z]+\"\n").unwrap());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let g = Arc::clone(&g);
            std::thread::spawn(move || g.parse("concurrent").map(|node| node.end()))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), "concurrent".len());
    }
}
