//! Bottom-up chart matcher.
//!
//! The matcher is fed terminals and ready-made matches left to right and
//! closes them under the grammar's unary and binary rules:
//!
//! ```text
//! add_terminal("38", 3..5)
//!   └─ terminal lhs sets ─▶ new matches ─▶ pending (LIFO)
//!                                            │
//!         ┌──────────────────────────────────┘
//!         ▼
//!   propagate(m)
//!     (1) insert m into the chart
//!     (2) unary rules on m.nonterminal
//!     (3) binary rules (l, m) for every chart match l ending at m.match_offset
//! ```
//!
//! The chart has 256 buckets keyed by `end % 256`. Each bucket is a chain of
//! matches linked through [`Match::next`] in decreasing end order, so matches
//! ending at a position are found by walking one chain.
//!
//! Rules fire when their *right* operand is added, so every left operand must
//! be in the chart before its right neighbour arrives. The lexer guarantees
//! this by feeding input in order of end position.

use super::arena::{Arena, Match, MatchId, MatchKind, MatchRhs};
use super::callbacks::CallbackDelegate;
use super::ir::Callback;
use super::rules_set::{LhsSetId, RulesSet};
use crate::{Locale, NO_CALLBACK, Nonterm, Span};

const CHART_BUCKETS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherOptions {
    /// Upper bound for match storage in one run.
    pub arena_limit_bytes: usize,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        MatcherOptions { arena_limit_bytes: 1 << 20 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherState {
    Idle,
    Processing,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MatcherStats {
    pub allocated: usize,
    /// Matches lost to the arena limit.
    pub dropped: usize,
    pub callbacks: usize,
    pub terminals: usize,
}

#[derive(Debug)]
pub struct Matcher<'r> {
    rules: &'r RulesSet,
    shards: Vec<usize>,
    arena: Arena,
    chart: Vec<Option<MatchId>>,
    pending: Vec<MatchId>,
    state: MatcherState,
    stats: MatcherStats,
}

impl<'r> Matcher<'r> {
    /// Create a matcher over the shards of `rules` that support `locales`.
    pub fn new(rules: &'r RulesSet, locales: &[Locale], options: &MatcherOptions) -> Self {
        let shards = rules.select_shards(locales);
        tracing::trace!(?shards, "selected shards");
        Matcher {
            rules,
            shards,
            arena: Arena::with_limit(options.arena_limit_bytes),
            chart: vec![None; CHART_BUCKETS],
            pending: Vec::new(),
            state: MatcherState::Idle,
            stats: MatcherStats::default(),
        }
    }

    pub fn rules(&self) -> &'r RulesSet {
        self.rules
    }

    pub fn active_shards(&self) -> &[usize] {
        &self.shards
    }

    pub fn state(&self) -> MatcherState {
        self.state
    }

    pub fn stats(&self) -> MatcherStats {
        self.stats
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn into_arena(self) -> Arena {
        self.arena
    }

    pub fn get(&self, id: MatchId) -> Option<&Match> {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: MatchId) -> Option<&mut Match> {
        self.arena.get_mut(id)
    }

    /// Forget all matches and start a new input with the `<^>` anchor.
    pub fn reset(&mut self, delegate: &mut dyn CallbackDelegate) {
        self.arena.clear();
        self.chart.iter_mut().for_each(|bucket| *bucket = None);
        self.pending.clear();
        self.state = MatcherState::Idle;
        self.stats = MatcherStats::default();

        let start = self.rules.predefined().start;
        if start != crate::UNASSIGNED_NONTERM {
            if let Some(id) = self.allocate(start, Span::new(0, 0), 0, MatchKind::Plain, MatchRhs::None) {
                self.add_match(id, delegate);
            }
        }
    }

    /// Store a new match without propagating it.
    pub fn allocate(
        &mut self,
        nonterminal: Nonterm,
        span: Span,
        match_offset: usize,
        kind: MatchKind,
        rhs: MatchRhs,
    ) -> Option<MatchId> {
        let m = Match { kind, rhs, ..Match::new(nonterminal, span, match_offset) };
        match self.arena.alloc(m) {
            Some(id) => {
                self.stats.allocated += 1;
                Some(id)
            }
            None => {
                if self.stats.dropped == 0 {
                    tracing::debug!(bytes = self.arena.bytes_used(), "match arena is full, dropping matches");
                }
                self.stats.dropped += 1;
                None
            }
        }
    }

    /// Queue a match for propagation. Outside of processing the match waits
    /// for the next `add_match`/`add_terminal` call.
    pub fn enqueue(&mut self, id: MatchId) {
        self.pending.push(id);
    }

    /// Match `text` against the terminal rules of every active shard.
    pub fn add_terminal(&mut self, span: Span, match_offset: usize, text: &str, delegate: &mut dyn CallbackDelegate) {
        self.stats.terminals += 1;
        let rules = self.rules;
        let lowercase = text.to_lowercase();
        for i in 0..self.shards.len() {
            let shard = self.shards[i];
            if let Some(set) = rules.find_terminal(shard, text, true) {
                self.execute_lhs_set(set, span, match_offset, MatchRhs::None, None, delegate);
            }
            if let Some(set) = rules.find_terminal(shard, &lowercase, false) {
                self.execute_lhs_set(set, span, match_offset, MatchRhs::None, None, delegate);
            }
        }
        self.process(delegate);
    }

    /// Propagate an already allocated match.
    pub fn add_match(&mut self, id: MatchId, delegate: &mut dyn CallbackDelegate) {
        self.enqueue(id);
        self.process(delegate);
    }

    /// Chart matches ending exactly at `end`, most recent first.
    pub fn matches_ending_at(&self, end: usize) -> impl Iterator<Item = MatchId> + '_ {
        let mut cursor = self.chart[end % CHART_BUCKETS];
        std::iter::from_fn(move || {
            while let Some(id) = cursor {
                let m = self.arena.get(id)?;
                cursor = m.next;
                if m.span.end > end {
                    continue;
                }
                if m.span.end < end {
                    cursor = None;
                    return None;
                }
                return Some(id);
            }
            None
        })
    }

    fn process(&mut self, delegate: &mut dyn CallbackDelegate) {
        // Nested calls from a delegate only queue; the outer loop drains.
        if self.state == MatcherState::Processing {
            return;
        }
        self.state = MatcherState::Processing;
        while let Some(id) = self.pending.pop() {
            self.propagate(id, delegate);
        }
        self.state = MatcherState::Idle;
    }

    fn insert_into_chart(&mut self, id: MatchId) {
        let Some(end) = self.arena.get(id).map(|m| m.span.end) else { return };
        let bucket = end % CHART_BUCKETS;

        let mut prev: Option<MatchId> = None;
        let mut cursor = self.chart[bucket];
        while let Some(current) = cursor {
            let Some(m) = self.arena.get(current) else { break };
            if m.span.end <= end {
                break;
            }
            prev = Some(current);
            cursor = m.next;
        }
        if let Some(m) = self.arena.get_mut(id) {
            m.next = cursor;
        }
        match prev {
            Some(p) => {
                if let Some(m) = self.arena.get_mut(p) {
                    m.next = Some(id);
                }
            }
            None => self.chart[bucket] = Some(id),
        }
    }

    fn propagate(&mut self, id: MatchId, delegate: &mut dyn CallbackDelegate) {
        let Some(m) = self.arena.get(id) else { return };
        let (nonterminal, span, match_offset, gap) = (m.nonterminal, m.span, m.match_offset, m.whitespace_gap());
        self.insert_into_chart(id);

        let rules = self.rules;
        for i in 0..self.shards.len() {
            let shard = self.shards[i];
            if let Some(set) = rules.find_unary(shard, nonterminal) {
                self.execute_lhs_set(set, span, match_offset, MatchRhs::Unary(id), None, delegate);
            }

            let lefts: Vec<MatchId> = self.matches_ending_at(match_offset).filter(|&l| l != id).collect();
            for left in lefts {
                let Some(l) = self.arena.get(left) else { continue };
                let (left_nt, left_start, left_offset) = (l.nonterminal, l.span.start, l.match_offset);
                if let Some(set) = rules.find_binary(shard, left_nt, nonterminal) {
                    self.execute_lhs_set(
                        set,
                        Span::new(left_start, span.end),
                        left_offset,
                        MatchRhs::Binary(left, id),
                        Some(gap),
                        delegate,
                    );
                }
            }
        }
    }

    /// Create the matches for one lhs set.
    ///
    /// Consecutive entries with the same nonterminal share one match, so a
    /// symbol with several output callbacks still propagates once. Filter
    /// entries always get a match of their own and are only queued if the
    /// delegate asks for it.
    fn execute_lhs_set(
        &mut self,
        set: LhsSetId,
        span: Span,
        match_offset: usize,
        rhs: MatchRhs,
        gap: Option<usize>,
        delegate: &mut dyn CallbackDelegate,
    ) {
        let rules = self.rules;
        let mut current: Option<(MatchId, Nonterm, bool)> = None;

        for lhs in rules.lhs_set(set) {
            if let Some(gap) = gap {
                if lhs.max_whitespace_gap >= 0 && gap > lhs.max_whitespace_gap as usize {
                    continue;
                }
            }
            let is_filter = lhs.callback.id != NO_CALLBACK && rules.is_filter(lhs.callback.id);

            let reusable = match current {
                Some((_, nonterminal, false)) => nonterminal == lhs.nonterminal && !is_filter,
                _ => false,
            };
            let (id, queued) = if reusable {
                let Some((id, _, _)) = current else { continue };
                (id, true)
            } else {
                let Some(id) = self.allocate(lhs.nonterminal, span, match_offset, MatchKind::Plain, rhs) else {
                    current = None;
                    continue;
                };
                (id, false)
            };
            current = Some((id, lhs.nonterminal, is_filter));

            if lhs.callback.id != NO_CALLBACK {
                self.stats.callbacks += 1;
                delegate.match_found(self, id, Callback { id: lhs.callback.id, param: lhs.callback.param });
            }
            if !is_filter && !queued {
                self.enqueue(id);
            }
        }
    }
}
