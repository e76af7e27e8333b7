//! Grammar compilation and matching engine.
//!
//! The engine is split into focused submodules under `src/engine/`; this file
//! wires them together and re-exports the public surface.
//!
//! ## How the parts work together
//!
//! ```text
//! Rules (rules.rs)
//!   │  Rules::finalize                      symbol assignment, sharing
//!   v
//! Ir (ir.rs)                                terminal / unary / binary tables
//!   │  Ir::serialize
//!   v
//! bytes ── RulesSet::from_bytes ──▶ RulesSet (rules_set.rs, verified, shared)
//!                                      │
//! tokens ── Lexer::process (lexer.rs) ─┤
//!                                      v
//!                     Matcher (matcher.rs)
//!                       - chart of matches keyed by end
//!                       - unary / binary propagation
//!                       - callbacks (callbacks.rs)
//!                                      │
//!                                      v
//!                     derivation.rs
//!                       - dedup per rule id
//!                       - negative assertion validation
//!                                      │
//!                                      v
//!                            Vec<Derivation>
//! ```
//!
//! `pass.rs` runs the online half for one text; `metrics.rs` holds the timing
//! and counter structs it fills in.
//!
//! ## Responsibilities by module
//!
//! - `ir.rs`: lowered productions, symbol sharing, binarization.
//! - `rules_set.rs`: binary format writer and verifying zero-copy reader.
//! - `arena.rs`: match records addressed by [`MatchId`].
//! - `lexer.rs`: sub-token splitting and structural nonterminals.
//! - `matcher.rs`: the chart and rule propagation.
//! - `callbacks.rs`: the delegate trait and built-in callbacks.
//! - `derivation.rs`: dedup, validation, capture extraction.
//!
//! ## Debugging
//!
//! Rule firings and pass summaries are emitted as `tracing` events; set
//! `RUST_LOG=grammatch=trace` with a subscriber installed (the CLI does this).

#[path = "engine/arena.rs"]
mod arena;
#[path = "engine/callbacks.rs"]
mod callbacks;
#[path = "engine/derivation.rs"]
mod derivation;
#[path = "engine/ir.rs"]
pub mod ir;
#[path = "engine/lexer.rs"]
mod lexer;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/pass.rs"]
mod pass;
#[path = "engine/rules_set.rs"]
mod rules_set;

pub use arena::{Arena, Match, MatchId, MatchKind, MatchRhs};
pub use callbacks::{CallbackDelegate, DefaultCallback, Derivation, DerivationCollector, handle_default_callback};
pub use derivation::{Capture, captures, deduplicate_derivations, is_valid_derivation, valid_deduplicated_derivations};
pub use ir::{Callback, Ir, Lhs};
pub use lexer::{Lexer, TokenClass, split_token};
pub use matcher::{Matcher, MatcherOptions, MatcherState, MatcherStats};
pub use metrics::{PassMetrics, RunMetrics};
pub use pass::{RunOutput, run, run_with_metrics};
pub use rules_set::{LhsSetId, PredefinedNonterminals, RulesSet, RulesSetFlags};

#[cfg(test)]
#[path = "engine/tests.rs"]
mod tests;
