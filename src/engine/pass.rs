//! One complete matching pass over a text.
//!
//! ```text
//! Matcher::new (shard selection) ─▶ reset (<^>) ─▶ Lexer::process (… <$>)
//!                                                        │
//!                      DerivationCollector.derivations ◀─┘
//!                                  │
//!                valid_deduplicated_derivations ─▶ RunOutput
//! ```

use super::arena::Arena;
use super::callbacks::{Derivation, DerivationCollector};
use super::derivation::valid_deduplicated_derivations;
use super::lexer::Lexer;
use super::matcher::{Matcher, MatcherOptions};
use super::metrics::{PassMetrics, RunMetrics};
use super::rules_set::RulesSet;
use crate::{Annotation, Locale, Token};
use std::time::Instant;

/// Everything a pass produced. `derivations` index into `arena`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub arena: Arena,
    /// Root rule firings in discovery order.
    pub candidates: Vec<Derivation>,
    /// Deduplicated, valid derivations.
    pub derivations: Vec<Derivation>,
}

pub fn run(
    rules: &RulesSet,
    tokens: &[Token],
    annotations: &[Annotation],
    locales: &[Locale],
    options: &MatcherOptions,
) -> RunOutput {
    run_with_metrics(rules, tokens, annotations, locales, options).0
}

pub fn run_with_metrics(
    rules: &RulesSet,
    tokens: &[Token],
    annotations: &[Annotation],
    locales: &[Locale],
    options: &MatcherOptions,
) -> (RunOutput, RunMetrics) {
    let total_start = Instant::now();

    let matching_start = Instant::now();
    let mut collector = DerivationCollector::new();
    let mut matcher = Matcher::new(rules, locales, options);
    matcher.reset(&mut collector);
    Lexer::new(rules).process(tokens, annotations, &mut matcher, &mut collector);
    let stats = matcher.stats();
    let matching = PassMetrics {
        duration: matching_start.elapsed(),
        tokens: tokens.iter().filter(|t| !t.is_whitespace()).count(),
        terminals: stats.terminals,
        matches_allocated: stats.allocated,
        matches_dropped: stats.dropped,
        callbacks: stats.callbacks,
        arena_bytes: matcher.arena().bytes_used(),
    };
    let arena = matcher.into_arena();

    let derivation_start = Instant::now();
    let derivations = valid_deduplicated_derivations(&arena, &collector.derivations);
    let derivation = derivation_start.elapsed();

    tracing::debug!(
        tokens = matching.tokens,
        matches = matching.matches_allocated,
        dropped = matching.matches_dropped,
        candidates = collector.derivations.len(),
        derivations = derivations.len(),
        "matching pass finished"
    );

    let metrics = RunMetrics {
        total: total_start.elapsed(),
        matching,
        derivation,
        candidates: collector.derivations.len(),
        derivations: derivations.len(),
    };
    (RunOutput { arena, candidates: collector.derivations, derivations }, metrics)
}
