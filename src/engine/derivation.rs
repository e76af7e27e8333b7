//! Derivation deduplication, validation, and capture extraction.
//!
//! A matching pass leaves one [`Derivation`] per root rule firing. Optional
//! elements make the same rule fire over several nested spans, so the service
//! keeps only the widest interpretation per rule:
//!
//! ```text
//! rule 1:  [0 ........ 7)   kept
//! rule 1:  [0 .... 4)       dropped (inside an earlier rule 1 span)
//! rule 2:  [0 .... 4)       kept    (different rule)
//! ```
//!
//! A derivation is valid unless its tree contains a negative assertion. Note
//! that dedup runs first: a wider invalid derivation still shadows the narrower
//! valid one, which is how "not followed by" rules suppress a match.

use super::arena::{Arena, MatchKind};
use super::callbacks::Derivation;
use crate::Span;

/// A mapping node inside a derivation tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub id: u64,
    pub span: Span,
}

fn span_of(arena: &Arena, derivation: &Derivation) -> Span {
    arena.get(derivation.root).map(|m| m.span).unwrap_or_default()
}

/// Keep, per rule id, only derivations not contained in an earlier one.
///
/// Candidates are stably sorted by (rule id, start, end descending); among
/// equal keys the first discovered wins.
pub fn deduplicate_derivations(arena: &Arena, derivations: &[Derivation]) -> Vec<Derivation> {
    let mut sorted: Vec<(Span, Derivation)> = derivations.iter().map(|d| (span_of(arena, d), *d)).collect();
    sorted.sort_by(|(a_span, a), (b_span, b)| {
        a.rule_id.cmp(&b.rule_id).then(a_span.start.cmp(&b_span.start)).then(b_span.end.cmp(&a_span.end))
    });

    let mut out: Vec<Derivation> = Vec::with_capacity(sorted.len());
    // Within one rule id, starts are non-decreasing, so a candidate is
    // contained in an earlier kept one iff it does not reach past the
    // furthest end kept so far.
    let mut current: Option<(u64, usize)> = None;
    for (span, derivation) in sorted {
        match current {
            Some((rule_id, max_end)) if rule_id == derivation.rule_id => {
                if span.end <= max_end {
                    continue;
                }
                current = Some((rule_id, span.end));
            }
            _ => current = Some((derivation.rule_id, span.end)),
        }
        out.push(derivation);
    }
    out
}

/// False when the tree contains a negative assertion.
pub fn is_valid_derivation(arena: &Arena, derivation: &Derivation) -> bool {
    !arena
        .walk(derivation.root)
        .into_iter()
        .filter_map(|id| arena.get(id))
        .any(|m| matches!(m.kind, MatchKind::Assertion { negative: true }))
}

pub fn valid_deduplicated_derivations(arena: &Arena, derivations: &[Derivation]) -> Vec<Derivation> {
    deduplicate_derivations(arena, derivations).into_iter().filter(|d| is_valid_derivation(arena, d)).collect()
}

/// Mapping nodes of a derivation, in tree order.
pub fn captures(arena: &Arena, derivation: &Derivation) -> Vec<Capture> {
    arena
        .walk(derivation.root)
        .into_iter()
        .filter_map(|id| arena.get(id))
        .filter_map(|m| match m.kind {
            MatchKind::Mapping { id } => Some(Capture { id, span: m.span }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::arena::{Match, MatchRhs};
    use pretty_assertions::assert_eq;

    fn candidate(arena: &mut Arena, rule_id: u64, start: usize, end: usize) -> Derivation {
        let root = arena.alloc(Match::new(1, Span::new(start, end), start)).unwrap();
        Derivation { rule_id, root }
    }

    fn spans(arena: &Arena, derivations: &[Derivation]) -> Vec<(u64, usize, usize)> {
        derivations
            .iter()
            .map(|d| {
                let span = span_of(arena, d);
                (d.rule_id, span.start, span.end)
            })
            .collect()
    }

    #[test]
    fn keeps_widest_per_rule() {
        let mut arena = Arena::with_limit(usize::MAX);
        let input = vec![
            candidate(&mut arena, 1, 0, 4),
            candidate(&mut arena, 2, 0, 4),
            candidate(&mut arena, 1, 0, 7),
            candidate(&mut arena, 1, 2, 5),
            candidate(&mut arena, 1, 5, 9),
            candidate(&mut arena, 1, 8, 9),
        ];
        let out = deduplicate_derivations(&arena, &input);
        assert_eq!(spans(&arena, &out), vec![(1, 0, 7), (1, 5, 9), (2, 0, 4)]);
    }

    #[test]
    fn dedup_is_idempotent_and_keeps_first_of_equal_spans() {
        let mut arena = Arena::with_limit(usize::MAX);
        let first = candidate(&mut arena, 3, 1, 2);
        let second = candidate(&mut arena, 3, 1, 2);
        let other = candidate(&mut arena, 3, 4, 6);
        let once = deduplicate_derivations(&arena, &[first, other, second]);
        assert_eq!(once, vec![first, other]);
        assert_eq!(deduplicate_derivations(&arena, &once), once);
    }

    #[test]
    fn negative_assertions_invalidate_and_mappings_capture() {
        let mut arena = Arena::with_limit(usize::MAX);
        let mut mapped = Match::new(2, Span::new(0, 2), 0);
        mapped.kind = MatchKind::Mapping { id: 9 };
        let mapped = arena.alloc(mapped).unwrap();
        let mut negative = Match::new(3, Span::new(2, 5), 2);
        negative.kind = MatchKind::Assertion { negative: true };
        let negative = arena.alloc(negative).unwrap();
        let mut positive = Match::new(3, Span::new(2, 5), 2);
        positive.kind = MatchKind::Assertion { negative: false };
        let positive = arena.alloc(positive).unwrap();

        let mut bad = Match::new(4, Span::new(0, 5), 0);
        bad.rhs = MatchRhs::Binary(mapped, negative);
        let bad = Derivation { rule_id: 1, root: arena.alloc(bad).unwrap() };
        let mut good = Match::new(4, Span::new(0, 5), 0);
        good.rhs = MatchRhs::Binary(mapped, positive);
        let good = Derivation { rule_id: 2, root: arena.alloc(good).unwrap() };

        assert!(!is_valid_derivation(&arena, &bad));
        assert!(is_valid_derivation(&arena, &good));
        assert_eq!(valid_deduplicated_derivations(&arena, &[bad, good]), vec![good]);
        assert_eq!(captures(&arena, &good), vec![Capture { id: 9, span: Span::new(0, 2) }]);
    }
}
