//! Matching run metrics.
//!
//! Collected by [`run_with_metrics`](super::run_with_metrics) and surfaced by
//! the verbose API and the CLI report. Timings are wall clock; counters come
//! from the matcher and the derivation service.
//!
//! ```text
//! total
//!  ├─ matching      lexer + matcher (tokens → chart)
//!  └─ derivation    dedup + validation
//! ```

use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct RunMetrics {
    /// Total elapsed time for the run.
    pub total: Duration,
    pub matching: PassMetrics,
    /// Time spent deduplicating and validating derivations.
    pub derivation: Duration,
    /// Root rule firings before dedup.
    pub candidates: usize,
    /// Derivations surviving dedup and validation.
    pub derivations: usize,
}

/// Counters for the lexing/matching pass.
#[derive(Debug, Default, Clone)]
pub struct PassMetrics {
    pub duration: Duration,
    /// Non-whitespace tokens fed to the lexer.
    pub tokens: usize,
    /// Terminal lookups issued to the matcher.
    pub terminals: usize,
    pub matches_allocated: usize,
    /// Matches lost to the arena ceiling.
    pub matches_dropped: usize,
    pub callbacks: usize,
    pub arena_bytes: usize,
}
