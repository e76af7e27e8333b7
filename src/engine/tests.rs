use super::*;
use crate::grammars::{self, DATE, FLIGHT};
use crate::{Locale, RuleOptions, Rules, Span, tokenize};
use pretty_assertions::assert_eq;

fn spans(rules: &RulesSet, text: &str, locales: &[Locale]) -> Vec<(u64, usize, usize)> {
    let output = run(rules, &tokenize(text), &[], locales, &MatcherOptions::default());
    let mut found: Vec<(u64, usize, usize)> = output
        .derivations
        .iter()
        .map(|d| {
            let span = output.arena.get(d.root).unwrap().span;
            (d.rule_id, span.start, span.end)
        })
        .collect();
    found.sort();
    found
}

fn compile(rules: &Rules) -> RulesSet {
    rules.compile(true).unwrap()
}

#[test]
fn bundled_grammar_examples() {
    let rules = grammars::compile(true).unwrap();

    // Array of (input, expected (rule id, start, end) triples)
    let cases: Vec<(&str, Vec<(u64, usize, usize)>)> = vec![
        ("January 1, 1988", vec![(DATE, 0, 15)]),
        ("january 1 1988", vec![(DATE, 0, 14)]),
        ("1 Jan 1988", vec![(DATE, 0, 10)]),
        ("1 Jan. 1988", vec![(DATE, 0, 11)]),
        ("on 12 December 2001.", vec![(DATE, 3, 19)]),
        ("LX38", vec![(FLIGHT, 0, 4)]),
        ("LX 38", vec![(FLIGHT, 0, 5)]),
        ("lx38", vec![]),
        ("dl1234", vec![(FLIGHT, 0, 6)]),
        ("DL 1234", vec![(FLIGHT, 0, 7)]),
        ("Dl 12", vec![(FLIGHT, 0, 5)]),
        ("DL  1234", vec![]),
        ("LX38.00", vec![]),
        ("LX38. 00", vec![(FLIGHT, 0, 4)]),
        ("LX38 on 1 Jan 1988", vec![(DATE, 8, 18), (FLIGHT, 0, 4)]),
        ("3. März 2021", vec![]),
        ("nothing to see here", vec![]),
    ];

    for (input, expected) in cases {
        assert_eq!(spans(&rules, input, &[]), expected, "input: {input:?}");
    }
}

#[test]
fn locale_shards_add_german_months() {
    let rules = grammars::compile(false).unwrap();
    let german = Locale::parse_list("de").unwrap();
    let english = Locale::parse_list("en").unwrap();

    assert_eq!(spans(&rules, "3. März 2021", &german), vec![(DATE, 0, 12)]);
    assert_eq!(spans(&rules, "3. März 2021", &english), vec![]);
    // Untagged shards still run for German text.
    assert_eq!(spans(&rules, "LX38", &german), vec![(FLIGHT, 0, 4)]);
}

#[test]
fn matching_is_deterministic() {
    let rules = grammars::compile(true).unwrap();
    let text = "LX38 lands on 1 Jan 1988, LX38.00 is a price, DL 12 leaves January 2, 1990";

    let first = spans(&rules, text, &[]);
    for _ in 0..5 {
        assert_eq!(spans(&rules, text, &[]), first);
    }

    let reloaded = RulesSet::from_bytes(rules.as_bytes().to_vec()).unwrap();
    assert_eq!(spans(&reloaded, text, &[]), first);
}

#[test]
fn deduplicated_derivations_do_not_nest() {
    let rules = grammars::compile(true).unwrap();
    let text = "1 Jan 1988 and 2 Feb. 1990 and LX38.00 or dl 1234";
    let output = run(&rules, &tokenize(text), &[], &[], &MatcherOptions::default());

    assert!(output.candidates.len() > output.derivations.len());
    for a in &output.derivations {
        for b in &output.derivations {
            if a == b || a.rule_id != b.rule_id {
                continue;
            }
            let (sa, sb) = (output.arena.get(a.root).unwrap().span, output.arena.get(b.root).unwrap().span);
            assert!(!sa.contains(&sb), "{sa:?} contains {sb:?}");
        }
    }

    let again = deduplicate_derivations(&output.arena, &output.derivations);
    assert_eq!(again, output.derivations);
}

#[test]
fn whitespace_gap_limits() {
    let mut rules = Rules::new();
    rules.add("<tight>", &["a", "b"], RuleOptions::root(1).with_gap(0)).unwrap();
    rules.add("<loose>", &["c", "d"], RuleOptions::root(2)).unwrap();
    let set = compile(&rules);

    let cases: Vec<(&str, Vec<(u64, usize, usize)>)> = vec![
        ("a b", vec![]),
        ("a-b", vec![]),
        ("c d", vec![(2, 0, 3)]),
        ("c      d", vec![(2, 0, 8)]),
        ("c\nd", vec![(2, 0, 3)]),
    ];
    for (input, expected) in cases {
        assert_eq!(spans(&set, input, &[]), expected, "input: {input:?}");
    }

    // Sub-tokens of one token are adjacent.
    let mut rules = Rules::new();
    rules.add("<tight>", &["a", "<digits>"], RuleOptions::root(1).with_gap(0)).unwrap();
    let set = compile(&rules);
    assert_eq!(spans(&set, "a12", &[]), vec![(1, 0, 3)]);
    assert_eq!(spans(&set, "a 12", &[]), vec![]);
}

#[test]
fn optional_prefix_keeps_the_widest_match() {
    let mut rules = Rules::new();
    rules.add("<x>", &["a?", "b"], RuleOptions::root(1)).unwrap();
    let set = compile(&rules);

    assert_eq!(spans(&set, "a b", &[]), vec![(1, 0, 3)]);
    assert_eq!(spans(&set, "b", &[]), vec![(1, 0, 1)]);
    assert_eq!(spans(&set, "a b b", &[]), vec![(1, 0, 3), (1, 4, 5)]);
}

#[test]
fn digit_nonterminals_are_length_specific() {
    let mut rules = Rules::new();
    rules.add("<year>", &["<4_digits>"], RuleOptions::root(1)).unwrap();
    rules.add("<number>", &["<digits>"], RuleOptions::root(2)).unwrap();
    let set = compile(&rules);

    assert_eq!(spans(&set, "1988", &[]), vec![(1, 0, 4), (2, 0, 4)]);
    assert_eq!(spans(&set, "198", &[]), vec![(2, 0, 3)]);
    assert_eq!(spans(&set, "19880", &[]), vec![(2, 0, 5)]);
    assert_eq!(spans(&set, "abc", &[]), vec![]);
}

#[test]
fn anchors_bound_the_input() {
    let mut rules = Rules::new();
    rules.add("<whole>", &["<^>", "<token>", "<$>"], RuleOptions::root(1)).unwrap();
    let set = compile(&rules);

    assert_eq!(spans(&set, "hello", &[]), vec![(1, 0, 5)]);
    assert_eq!(spans(&set, "hello world", &[]), vec![]);
}

#[test]
fn exclusion_blocks_matching_spans() {
    let mut rules = Rules::new();
    rules.add("<stop>", &["the"], RuleOptions::default()).unwrap();
    rules.add("<stop>", &["a"], RuleOptions::default()).unwrap();
    rules.add_with_exclusion("<name>", &["<token>"], "<stop>", RuleOptions::default()).unwrap();
    rules.add("<greeting>", &["hi", "<name>"], RuleOptions::root(1)).unwrap();
    let set = compile(&rules);

    assert_eq!(spans(&set, "hi bob", &[]), vec![(1, 0, 6)]);
    assert_eq!(spans(&set, "hi the", &[]), vec![]);
    assert_eq!(spans(&set, "hi A", &[]), vec![]);
}

#[test]
fn typed_matches_carry_their_tag() {
    let mut rules = Rules::new();
    rules.add_with_type("<unit>", &["km"], 42, RuleOptions::default()).unwrap();
    rules.add("<distance>", &["<digits>", "<unit>"], RuleOptions::root(1)).unwrap();
    let set = compile(&rules);

    let output = run(&set, &tokenize("12 km"), &[], &[], &MatcherOptions::default());
    assert_eq!(output.derivations.len(), 1);
    let typed: Vec<(Span, MatchKind)> = output
        .arena
        .walk(output.derivations[0].root)
        .into_iter()
        .filter_map(|id| output.arena.get(id))
        .filter(|m| matches!(m.kind, MatchKind::Typed { .. }))
        .map(|m| (m.span, m.kind))
        .collect();
    assert_eq!(typed, vec![(Span::new(3, 5), MatchKind::Typed { tag: 42 })]);
}

#[test]
fn rules_set_is_shared_across_threads() {
    let rules = grammars::compile(true).unwrap();
    let inputs = ["January 1, 1988", "LX38", "1 Jan. 1988", "dl 1234"];
    let expected: Vec<_> = inputs.iter().map(|text| spans(&rules, text, &[])).collect();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .iter()
            .map(|text| {
                let rules = rules.clone();
                scope.spawn(move || spans(&rules, text, &[]))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(results, expected);
}

const MODERATE: crate::CallbackId = DefaultCallback::FIRST_USER_ID;
const UNHANDLED: crate::CallbackId = DefaultCallback::FIRST_USER_ID + 1;

/// Accepts words, drops "darn" and rewrites "yo" into the terminal "hey".
struct Moderator {
    text: Vec<char>,
    collector: DerivationCollector,
    unhandled: usize,
}

impl CallbackDelegate for Moderator {
    fn match_found(&mut self, matcher: &mut Matcher<'_>, id: MatchId, callback: Callback) {
        if callback.id != MODERATE {
            if callback.id == UNHANDLED {
                self.unhandled += 1;
            }
            self.collector.match_found(matcher, id, callback);
            return;
        }
        let Some(m) = matcher.get(id) else { return };
        let (span, match_offset) = (m.span, m.match_offset);
        let word: String = self.text[span.start..span.end].iter().collect();
        match word.as_str() {
            "darn" => {}
            "yo" => matcher.add_terminal(span, match_offset, "hey", self),
            _ => matcher.enqueue(id),
        }
    }
}

fn moderated(set: &RulesSet, text: &str) -> (Vec<(u64, usize, usize)>, Vec<Span>, usize) {
    let mut delegate = Moderator { text: text.chars().collect(), collector: DerivationCollector::new(), unhandled: 0 };
    let mut matcher = Matcher::new(set, &[], &MatcherOptions::default());
    matcher.reset(&mut delegate);
    Lexer::new(set).process(&tokenize(text), &[], &mut matcher, &mut delegate);
    assert_eq!(matcher.state(), MatcherState::Idle);

    let mut found: Vec<(u64, usize, usize)> = delegate
        .collector
        .derivations
        .iter()
        .filter_map(|d| matcher.get(d.root).map(|m| (d.rule_id, m.span.start, m.span.end)))
        .collect();
    found.sort();
    let words = matcher
        .arena()
        .iter()
        .filter(|(_, m)| set.debug_name(m.nonterminal) == Some("<word>"))
        .map(|(_, m)| m.span)
        .collect();
    (found, words, delegate.unhandled)
}

#[test]
fn user_filters_decide_what_propagates() {
    let mut rules = Rules::new();
    rules.define_filter(MODERATE).unwrap();
    rules.add("<word>", &["<token>"], RuleOptions { callback: MODERATE, ..RuleOptions::default() }).unwrap();
    rules.add("<greet>", &["hi", "<word>"], RuleOptions::root(1)).unwrap();
    rules.add("<filler>", &["um"], RuleOptions { callback: UNHANDLED, ..RuleOptions::default() }).unwrap();
    rules.add("<hesitant>", &["<filler>", "hi"], RuleOptions::root(2)).unwrap();
    rules.add("<salute>", &["hey"], RuleOptions::root(3)).unwrap();
    let set = compile(&rules);

    // Accepted through `enqueue`.
    let (found, _, _) = moderated(&set, "hi bob");
    assert_eq!(found, vec![(1, 0, 6)]);

    // Rejected: the filter match exists but never reaches a root rule.
    let (found, words, _) = moderated(&set, "hi darn");
    assert_eq!(found, vec![]);
    assert!(words.contains(&Span::new(3, 7)));

    // Substituted by a terminal added from inside the callback.
    let (found, _, _) = moderated(&set, "hi yo");
    assert_eq!(found, vec![(3, 3, 5)]);

    // An unknown non-filter callback is ignored, and its match still propagates.
    let (found, _, unhandled) = moderated(&set, "um hi bob");
    assert_eq!(found, vec![(1, 3, 9), (2, 0, 5)]);
    assert_eq!(unhandled, 1);
}
