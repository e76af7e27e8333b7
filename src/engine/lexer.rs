//! Token stream to matcher feed.
//!
//! ```text
//! tokens:   "LX38.00"            " "      "now"
//!              │                   │        │
//!   split ─▶ LX | 38 | . | 00    (skipped)  now
//!              │
//!   per sub-token:
//!     terminal            add_terminal (case sensitive + lowercased)
//!     <token>             every sub-token
//!     <uppercase_token>   letters, all uppercase
//!     <digits>            digit runs
//!     <N_digits>          digit runs of length N <= 20
//! ```
//!
//! Whitespace never reaches the matcher, not even when it sits inside a
//! caller's token ("New York"). A piece following whitespace gets the
//! previous piece's end as its `match_offset`, so neighbours look adjacent
//! while the whitespace gap stays observable.

use super::arena::{MatchKind, MatchRhs};
use super::callbacks::CallbackDelegate;
use super::matcher::Matcher;
use super::rules_set::RulesSet;
use crate::{Annotation, MAX_DIGITS_NONTERM, Nonterm, Span, Token, UNASSIGNED_NONTERM};
use bitflags::bitflags;

bitflags! {
    /// Character classes present in a (sub-)token.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TokenClass: u8 {
        const DIGIT       = 1 << 0;
        const LETTER      = 1 << 1;
        const PUNCTUATION = 1 << 2;
        const WHITESPACE  = 1 << 3;
        const UPPERCASE   = 1 << 4;
        const LOWERCASE   = 1 << 5;
    }
}

impl TokenClass {
    pub fn of_char(c: char) -> Self {
        if c.is_ascii_digit() {
            TokenClass::DIGIT
        } else if c.is_whitespace() {
            TokenClass::WHITESPACE
        } else if c.is_alphanumeric() {
            let mut class = TokenClass::LETTER;
            class.set(TokenClass::UPPERCASE, c.is_uppercase());
            class.set(TokenClass::LOWERCASE, c.is_lowercase());
            class
        } else {
            TokenClass::PUNCTUATION
        }
    }

    pub fn of_str(text: &str) -> Self {
        text.chars().map(Self::of_char).fold(TokenClass::empty(), |acc, c| acc | c)
    }

    /// Classes that force a sub-token boundary.
    fn kind(self) -> Self {
        self & (TokenClass::DIGIT | TokenClass::LETTER | TokenClass::PUNCTUATION | TokenClass::WHITESPACE)
    }

    pub fn is_digits(self) -> bool {
        self == TokenClass::DIGIT
    }

    /// Has letters, none of them lowercase.
    pub fn is_uppercase(self) -> bool {
        self.contains(TokenClass::LETTER | TokenClass::UPPERCASE) && !self.contains(TokenClass::LOWERCASE)
    }
}

/// Split `token` into single-class pieces. Letters, digits and whitespace
/// group into runs; every punctuation character stands alone.
pub fn split_token(token: &Token) -> Vec<Token> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_kind = TokenClass::empty();
    let mut start = token.span.start;
    let mut position = token.span.start;

    for c in token.value.chars() {
        let kind = TokenClass::of_char(c).kind();
        let boundary = !current.is_empty() && (kind != current_kind || kind == TokenClass::PUNCTUATION);
        if boundary {
            pieces.push(Token::new(std::mem::take(&mut current), start, position));
            start = position;
        }
        current.push(c);
        current_kind = kind;
        position += 1;
    }
    if !current.is_empty() {
        pieces.push(Token::new(current, start, position));
    }
    pieces
}

/// Feeds tokens and annotations into a [`Matcher`].
#[derive(Debug, Clone, Copy)]
pub struct Lexer<'r> {
    rules: &'r RulesSet,
}

impl<'r> Lexer<'r> {
    pub fn new(rules: &'r RulesSet) -> Self {
        Lexer { rules }
    }

    /// Run one text through `matcher`, which must have been reset.
    ///
    /// Annotations are spliced in, in order of their end, before the first
    /// token starting at or after their end. Their `match_offset` is the end
    /// of the last token ending at or before their start.
    pub fn process(
        &self,
        tokens: &[Token],
        annotations: &[Annotation],
        matcher: &mut Matcher<'_>,
        delegate: &mut dyn CallbackDelegate,
    ) {
        let mut pending: Vec<(usize, &Annotation)> = annotations.iter().enumerate().collect();
        pending.sort_by_key(|(_, a)| a.span.end);
        let mut pending = pending.into_iter().peekable();

        let pieces: Vec<Token> = tokens
            .iter()
            .flat_map(split_token)
            .filter(|piece| !piece.is_whitespace())
            .collect();
        let ends: Vec<usize> = pieces.iter().map(|p| p.span.end).collect();
        let mut last_end = 0usize;

        for piece in &pieces {
            while let Some(&(index, annotation)) = pending.peek() {
                if annotation.span.end > piece.span.start {
                    break;
                }
                self.emit_annotation(index, annotation, &ends, matcher, delegate);
                pending.next();
            }
            self.emit_token(piece, last_end, matcher, delegate);
            last_end = piece.span.end;
        }
        for (index, annotation) in pending {
            self.emit_annotation(index, annotation, &ends, matcher, delegate);
        }

        let end = self.rules.predefined().end;
        self.emit_symbol(end, Span::new(last_end, last_end), last_end, MatchKind::Plain, matcher, delegate);
    }

    fn emit_token(
        &self,
        token: &Token,
        match_offset: usize,
        matcher: &mut Matcher<'_>,
        delegate: &mut dyn CallbackDelegate,
    ) {
        let predefined = self.rules.predefined();
        let span = token.span;
        tracing::trace!(text = %token.value, start = span.start, end = span.end, match_offset, "terminal");

        matcher.add_terminal(span, match_offset, &token.value, delegate);
        self.emit_symbol(predefined.token, span, match_offset, MatchKind::Plain, matcher, delegate);

        let class = TokenClass::of_str(&token.value);
        if class.is_uppercase() {
            self.emit_symbol(predefined.uppercase_token, span, match_offset, MatchKind::Plain, matcher, delegate);
        }
        if class.is_digits() {
            self.emit_symbol(predefined.digits, span, match_offset, MatchKind::Plain, matcher, delegate);
            let len = span.len();
            if len <= MAX_DIGITS_NONTERM {
                let n_digits = predefined.n_digits(len);
                self.emit_symbol(n_digits, span, match_offset, MatchKind::Plain, matcher, delegate);
            }
        }
    }

    fn emit_annotation(
        &self,
        index: usize,
        annotation: &Annotation,
        ends: &[usize],
        matcher: &mut Matcher<'_>,
        delegate: &mut dyn CallbackDelegate,
    ) {
        let Some(nonterminal) = self.rules.annotation_nonterminal(&annotation.name) else {
            tracing::trace!(name = %annotation.name, "annotation has no bound nonterminal");
            return;
        };
        let match_offset = ends.iter().copied().filter(|&e| e <= annotation.span.start).max().unwrap_or(0);
        self.emit_symbol(nonterminal, annotation.span, match_offset, MatchKind::Annotation { index }, matcher, delegate);
    }

    fn emit_symbol(
        &self,
        nonterminal: Nonterm,
        span: Span,
        match_offset: usize,
        kind: MatchKind,
        matcher: &mut Matcher<'_>,
        delegate: &mut dyn CallbackDelegate,
    ) {
        if nonterminal == UNASSIGNED_NONTERM {
            return;
        }
        if let Some(id) = matcher.allocate(nonterminal, span, match_offset, kind, MatchRhs::None) {
            matcher.add_match(id, delegate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::callbacks::DerivationCollector;
    use crate::engine::matcher::MatcherOptions;
    use crate::{RuleOptions, Rules};
    use pretty_assertions::assert_eq;

    fn pieces(text: &str) -> Vec<(String, usize, usize)> {
        split_token(&Token::new(text, 10, 10 + text.chars().count()))
            .into_iter()
            .map(|t| (t.value, t.span.start, t.span.end))
            .collect()
    }

    #[test]
    fn splits_mixed_tokens_by_class() {
        assert_eq!(
            pieces("hello123!"),
            vec![("hello".into(), 10, 15), ("123".into(), 15, 18), ("!".into(), 18, 19)]
        );
        assert_eq!(
            pieces("LX38.00"),
            vec![("LX".into(), 10, 12), ("38".into(), 12, 14), (".".into(), 14, 15), ("00".into(), 15, 17)]
        );
        assert_eq!(pieces("?!"), vec![("?".into(), 10, 11), ("!".into(), 11, 12)]);
        assert_eq!(pieces("Zürich"), vec![("Zürich".into(), 10, 16)]);
        assert_eq!(pieces("a  b"), vec![("a".into(), 10, 11), ("  ".into(), 11, 13), ("b".into(), 13, 14)]);
    }

    #[test]
    fn classifies_tokens() {
        assert!(TokenClass::of_str("2345").is_digits());
        assert!(!TokenClass::of_str("23a").is_digits());
        assert!(TokenClass::of_str("LX").is_uppercase());
        assert!(!TokenClass::of_str("Lx").is_uppercase());
        assert!(!TokenClass::of_str("42").is_uppercase());
    }

    fn lexed_symbols(rules: &Rules, text: &str) -> Vec<(String, Span)> {
        let set = rules.compile(true).unwrap();
        let mut collector = DerivationCollector::new();
        let mut matcher = Matcher::new(&set, &[], &MatcherOptions::default());
        matcher.reset(&mut collector);
        Lexer::new(&set).process(&crate::tokenize(text), &[], &mut matcher, &mut collector);
        matcher
            .arena()
            .iter()
            .map(|(_, m)| (set.debug_name(m.nonterminal).unwrap_or("?").to_string(), m.span))
            .collect()
    }

    #[test]
    fn emits_digit_nonterminals() {
        let mut rules = Rules::new();
        rules.add("<year>", &["<4_digits>"], RuleOptions::root(1)).unwrap();
        rules.add("<num>", &["<digits>"], RuleOptions::root(2)).unwrap();

        let symbols = lexed_symbols(&rules, "2345");
        assert!(symbols.contains(&("<4_digits>".to_string(), Span::new(0, 4))));
        assert!(symbols.contains(&("<digits>".to_string(), Span::new(0, 4))));

        let symbols = lexed_symbols(&rules, "88");
        assert!(!symbols.iter().any(|(name, _)| name == "<4_digits>"));
        assert!(symbols.contains(&("<digits>".to_string(), Span::new(0, 2))));
    }

    #[test]
    fn emits_anchors_and_skips_whitespace() {
        let mut rules = Rules::new();
        rules.add("<all>", &["<^>", "<token>", "<token>", "<$>"], RuleOptions::root(1)).unwrap();
        let set = rules.compile(false).unwrap();

        let mut collector = DerivationCollector::new();
        let mut matcher = Matcher::new(&set, &[], &MatcherOptions::default());
        matcher.reset(&mut collector);
        Lexer::new(&set).process(&crate::tokenize("  hi   there "), &[], &mut matcher, &mut collector);

        assert_eq!(collector.derivations.len(), 1);
        let root = matcher.get(collector.derivations[0].root).unwrap();
        assert_eq!(root.span, Span::new(0, 12));
    }

    #[test]
    fn whitespace_inside_a_token_is_not_emitted() {
        let mut rules = Rules::new();
        rules.add("<three>", &["<token>", "<token>", "<token>"], RuleOptions::root(1)).unwrap();
        rules.add("<pair>", &["a", "b"], RuleOptions::root(2).with_gap(1)).unwrap();
        rules.add("<tight>", &["a", "b"], RuleOptions::root(3).with_gap(0)).unwrap();
        let set = rules.compile(false).unwrap();

        let tokens = [Token::new("a b", 0, 3)];
        let mut collector = DerivationCollector::new();
        let mut matcher = Matcher::new(&set, &[], &MatcherOptions::default());
        matcher.reset(&mut collector);
        Lexer::new(&set).process(&tokens, &[], &mut matcher, &mut collector);

        let found: Vec<(u64, Span)> = collector
            .derivations
            .iter()
            .map(|d| (d.rule_id, matcher.get(d.root).unwrap().span))
            .collect();
        assert_eq!(found, vec![(2, Span::new(0, 3))]);
        assert!(matcher.arena().iter().all(|(_, m)| m.span != Span::new(1, 2)));
    }

    #[test]
    fn splices_bound_annotations() {
        let mut rules = Rules::new();
        rules.bind_annotation("phone", "<phone>").unwrap();
        rules.add("<call>", &["call", "<phone>", "now"], RuleOptions::root(1)).unwrap();
        let set = rules.compile(false).unwrap();

        let tokens = crate::tokenize("call 555 1234 now");
        let annotations = [Annotation::new("phone", 5, 13), Annotation::new("unbound", 0, 4)];
        let mut collector = DerivationCollector::new();
        let mut matcher = Matcher::new(&set, &[], &MatcherOptions::default());
        matcher.reset(&mut collector);
        Lexer::new(&set).process(&tokens, &annotations, &mut matcher, &mut collector);

        assert_eq!(collector.derivations.len(), 1);
        let root = matcher.get(collector.derivations[0].root).unwrap();
        assert_eq!(root.span, Span::new(0, 17));
    }
}
