//! Match storage for one matcher run.
//!
//! Matches live in a single `Vec` and refer to each other by [`MatchId`], so a
//! derivation tree is just a root id plus the arena it was built in. The arena
//! is bounded: once `limit_bytes` worth of matches exist, allocation fails and
//! the matcher drops the would-be match.

use crate::{Nonterm, Span};
use std::mem::size_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchId(u32);

impl MatchId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a match carries beyond its nonterminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Plain,
    /// Tagged with a semantic type by the set-type callback.
    Typed { tag: u64 },
    /// Checked by the assertion callback; a negative assertion invalidates
    /// any derivation containing it.
    Assertion { negative: bool },
    /// Carries a value for capture extraction.
    Mapping { id: u64 },
    /// Produced from a caller-supplied annotation.
    Annotation { index: usize },
}

/// Children of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRhs {
    /// Terminals and lexer-produced nonterminals.
    None,
    Unary(MatchId),
    Binary(MatchId, MatchId),
}

impl MatchRhs {
    pub fn children(&self) -> impl Iterator<Item = MatchId> {
        let (a, b) = match *self {
            MatchRhs::None => (None, None),
            MatchRhs::Unary(a) => (Some(a), None),
            MatchRhs::Binary(a, b) => (Some(a), Some(b)),
        };
        a.into_iter().chain(b)
    }
}

/// A recognized nonterminal over a span of codepoints.
///
/// ```text
///   "LX   38"
///    ^^        <carrier>  span 0..2
///         ^^   <code>     span 5..7, match_offset 2 (whitespace gap 3)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub nonterminal: Nonterm,
    pub span: Span,
    /// End of the previous non-whitespace token; `span.start - match_offset`
    /// is the whitespace in front of this match.
    pub match_offset: usize,
    pub kind: MatchKind,
    pub rhs: MatchRhs,
    /// Next match in the same chart bucket.
    pub(crate) next: Option<MatchId>,
}

impl Match {
    pub fn new(nonterminal: Nonterm, span: Span, match_offset: usize) -> Self {
        Match { nonterminal, span, match_offset, kind: MatchKind::Plain, rhs: MatchRhs::None, next: None }
    }

    pub fn whitespace_gap(&self) -> usize {
        self.span.start.saturating_sub(self.match_offset)
    }
}

#[derive(Debug, Clone)]
pub struct Arena {
    matches: Vec<Match>,
    limit_bytes: usize,
}

impl Arena {
    pub fn with_limit(limit_bytes: usize) -> Self {
        Arena { matches: Vec::new(), limit_bytes }
    }

    /// Store `m`, or return `None` once the byte limit is reached.
    pub fn alloc(&mut self, m: Match) -> Option<MatchId> {
        if (self.matches.len() + 1) * size_of::<Match>() > self.limit_bytes {
            return None;
        }
        let id = MatchId(u32::try_from(self.matches.len()).ok()?);
        self.matches.push(m);
        Some(id)
    }

    pub fn get(&self, id: MatchId) -> Option<&Match> {
        self.matches.get(id.index())
    }

    pub fn get_mut(&mut self, id: MatchId) -> Option<&mut Match> {
        self.matches.get_mut(id.index())
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn bytes_used(&self) -> usize {
        self.matches.len() * size_of::<Match>()
    }

    pub fn clear(&mut self) {
        self.matches.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (MatchId, &Match)> {
        self.matches.iter().enumerate().map(|(i, m)| (MatchId(i as u32), m))
    }

    /// Depth-first walk of the tree rooted at `root`, parents before children.
    pub fn walk(&self, root: MatchId) -> Vec<MatchId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(m) = self.get(id) else { continue };
            out.push(id);
            let children: Vec<MatchId> = m.rhs.children().collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }
}
