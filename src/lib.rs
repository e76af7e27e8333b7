extern crate self as grammatch;

#[macro_use]
mod macros;
mod api;
pub mod engine;
mod error;
pub mod grammars;
mod locale;
mod rules;
mod tokenizer;

pub use api::{
    Capture, Context, Entity, NodeSummary, Options, ParseDetails, ParseResult, ParseResultVerbose, parse, parse_verbose,
    parse_verbose_with, parse_verbose_with_rules, parse_with, parse_with_rules,
};
pub use engine::{
    Arena, CallbackDelegate, DefaultCallback, Derivation, DerivationCollector, Lexer, Match, MatchId, MatchKind,
    MatchRhs, Matcher, MatcherOptions, MatcherState, MatcherStats, RulesSet, RunMetrics,
};
pub use error::{GrammarError, LocaleError, RulesSetError};
pub use locale::{Locale, is_locale_supported};
pub use rules::{RuleOptions, Rules};
pub use tokenizer::tokenize;

// --- Symbols ----------------------------------------------------------------

/// Grammar nonterminal identifier as stored in a compiled [`RulesSet`].
///
/// `0` is reserved for "not yet assigned" during compilation.
pub type Nonterm = u32;

/// Sentinel for a nonterminal whose identity has not been decided yet.
pub const UNASSIGNED_NONTERM: Nonterm = 0;

/// Callback identifier attached to a rule's left-hand side.
pub type CallbackId = u32;

/// Sentinel callback id: the rule fires silently.
pub const NO_CALLBACK: CallbackId = 0;

/// Longest digit run that gets a dedicated `<N_digits>` nonterminal.
pub const MAX_DIGITS_NONTERM: usize = 20;

// --- Spans and tokens -------------------------------------------------------

/// Half-open codepoint range `[start, end)` into the input text.
///
/// Zero-width spans are only produced for the `<^>`/`<$>` anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Span {
    /// Start codepoint index (inclusive).
    pub start: usize,
    /// End codepoint index (exclusive).
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when `other` lies entirely inside `self` (equal spans included).
    pub const fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && self.end >= other.end
    }
}

/// A token handed to the [`Lexer`]: its text and codepoint span.
///
/// Tokens consisting only of whitespace are accepted and skipped by the lexer;
/// they only influence the whitespace gap seen by the next token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub span: Span,
}

impl Token {
    pub fn new(value: impl Into<String>, start: usize, end: usize) -> Self {
        Token { value: value.into(), span: Span::new(start, end) }
    }

    pub fn is_whitespace(&self) -> bool {
        self.value.chars().all(char::is_whitespace)
    }
}

/// An externally produced annotation (e.g. an entity found by another
/// component) that the lexer splices into the chart.
///
/// Only annotations whose `name` was bound with [`Rules::bind_annotation`]
/// have an effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub name: String,
    pub span: Span,
}

impl Annotation {
    pub fn new(name: impl Into<String>, start: usize, end: usize) -> Self {
        Annotation { name: name.into(), span: Span::new(start, end) }
    }
}
