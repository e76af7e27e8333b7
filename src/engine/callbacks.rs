//! Callback dispatch between the matcher and its caller.
//!
//! When a rule with a callback fires, the matcher hands the new match to a
//! [`CallbackDelegate`]. For ordinary callbacks the match is already queued
//! for propagation; for *filters* it is not, and the delegate decides whether
//! to [`Matcher::enqueue`] it.
//!
//! The built-in callbacks below cover typing, assertions, value mappings,
//! exclusions, and root rules. [`DerivationCollector`] handles all of them and
//! gathers one [`Derivation`] per root rule match.

use super::arena::{MatchId, MatchKind};
use super::ir::Callback;
use super::matcher::Matcher;
use crate::CallbackId;

/// Ids of the built-in callbacks; user callbacks should start at
/// [`DefaultCallback::FIRST_USER_ID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefaultCallback {
    SetType = 1,
    Assertion = 2,
    Mapping = 3,
    Exclusion = 4,
    RootRule = 5,
}

impl DefaultCallback {
    pub const FIRST_USER_ID: CallbackId = 16;

    /// Built-ins that run as filters.
    pub const FILTERS: [DefaultCallback; 4] =
        [DefaultCallback::SetType, DefaultCallback::Assertion, DefaultCallback::Mapping, DefaultCallback::Exclusion];

    pub const fn id(self) -> CallbackId {
        self as CallbackId
    }

    pub fn from_id(id: CallbackId) -> Option<Self> {
        match id {
            1 => Some(DefaultCallback::SetType),
            2 => Some(DefaultCallback::Assertion),
            3 => Some(DefaultCallback::Mapping),
            4 => Some(DefaultCallback::Exclusion),
            5 => Some(DefaultCallback::RootRule),
            _ => None,
        }
    }
}

/// Receiver of rule callbacks.
pub trait CallbackDelegate {
    fn match_found(&mut self, matcher: &mut Matcher<'_>, id: MatchId, callback: Callback);
}

/// Apply one of the built-in filter callbacks. Returns `false` for callbacks
/// that are not built-in filters.
pub fn handle_default_callback(matcher: &mut Matcher<'_>, id: MatchId, callback: Callback) -> bool {
    let kind = match DefaultCallback::from_id(callback.id) {
        Some(DefaultCallback::SetType) => MatchKind::Typed { tag: callback.param },
        Some(DefaultCallback::Assertion) => MatchKind::Assertion { negative: callback.param != 0 },
        Some(DefaultCallback::Mapping) => MatchKind::Mapping { id: callback.param },
        Some(DefaultCallback::Exclusion) => {
            let Some(m) = matcher.get(id) else { return true };
            let (span, excluded) = (m.span, callback.param);
            let blocked = matcher
                .matches_ending_at(span.end)
                .filter_map(|other| matcher.get(other))
                .any(|other| other.span == span && other.nonterminal as u64 == excluded);
            if !blocked {
                matcher.enqueue(id);
            }
            return true;
        }
        Some(DefaultCallback::RootRule) | None => return false,
    };
    if let Some(m) = matcher.get_mut(id) {
        m.kind = kind;
    }
    matcher.enqueue(id);
    true
}

/// A root rule match: `rule_id` is the root rule's callback parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derivation {
    pub rule_id: u64,
    pub root: MatchId,
}

/// Delegate that applies the built-in filters and records derivations.
#[derive(Debug, Default)]
pub struct DerivationCollector {
    pub derivations: Vec<Derivation>,
}

impl DerivationCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CallbackDelegate for DerivationCollector {
    fn match_found(&mut self, matcher: &mut Matcher<'_>, id: MatchId, callback: Callback) {
        if callback.id == DefaultCallback::RootRule.id() {
            self.derivations.push(Derivation { rule_id: callback.param, root: id });
            return;
        }
        if !handle_default_callback(matcher, id, callback) {
            tracing::warn!(callback = callback.id, param = callback.param, "ignoring unknown callback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_ids_round_trip() {
        for cb in DefaultCallback::FILTERS.into_iter().chain([DefaultCallback::RootRule]) {
            assert_eq!(DefaultCallback::from_id(cb.id()), Some(cb));
        }
        assert_eq!(DefaultCallback::from_id(0), None);
        assert_eq!(DefaultCallback::from_id(DefaultCallback::FIRST_USER_ID), None);
    }
}
