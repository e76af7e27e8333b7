//! Intermediate representation of a compiled grammar.
//!
//! This module holds the *static* side of the engine between the author-facing
//! [`Rules`](crate::Rules) builder and the serialized [`RulesSet`]:
//!
//! ```text
//! Rules::finalize ──▶ Ir (terminal / unary / binary productions per shard)
//!                       │
//!                       └─ Ir::serialize ──▶ bytes ──▶ RulesSet::from_bytes
//! ```
//!
//! Every production maps a right-hand side to an *lhs set*: the list of
//! left-hand sides (nonterminal + callback + whitespace gap) that fire when the
//! right-hand side is matched. Sharing happens here: when a new left-hand side
//! is added to a set and an equivalent shareable entry already exists, its
//! nonterminal is reused, so identical sub-grammars collapse into one symbol.
//!
//! ## Invariants
//!
//! - `UNASSIGNED_NONTERM` never appears in a stored [`Lhs`].
//! - Unshareable nonterminals are never handed out for another left-hand side.
//! - Left-hand sides with a filter callback never share their nonterminal.

use super::rules_set::{PredefinedNonterminals, RulesSet, write_rules_set};
use crate::error::RulesSetError;
use crate::{CallbackId, Locale, MAX_DIGITS_NONTERM, NO_CALLBACK, Nonterm, UNASSIGNED_NONTERM};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Callback attached to a left-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Callback {
    pub id: CallbackId,
    pub param: u64,
}

/// One left-hand side of a production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lhs {
    pub nonterminal: Nonterm,
    pub callback: Callback,
    /// Maximum whitespace between the operands of a binary rule; `-1` means
    /// unconstrained.
    pub max_whitespace_gap: i8,
}

impl Lhs {
    pub const fn plain(nonterminal: Nonterm) -> Self {
        Lhs { nonterminal, callback: Callback { id: NO_CALLBACK, param: 0 }, max_whitespace_gap: -1 }
    }

    /// Plain left-hand sides are stored inline in the serialized lhs sets.
    pub const fn is_plain(&self) -> bool {
        self.callback.id == NO_CALLBACK && self.callback.param == 0 && self.max_whitespace_gap < 0
    }
}

pub type LhsSet = Vec<Lhs>;

/// Right-hand side element after symbol resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrElement {
    Terminal { text: String, case_sensitive: bool },
    Nonterminal(Nonterm),
}

/// Structural nonterminals the lexer produces on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predefined {
    Start,
    End,
    Token,
    UppercaseToken,
    Digits,
    NDigits(usize),
}

impl Predefined {
    /// Recognize a predefined nonterminal by its `<name>`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "<^>" => Some(Predefined::Start),
            "<$>" => Some(Predefined::End),
            "<token>" => Some(Predefined::Token),
            "<uppercase_token>" => Some(Predefined::UppercaseToken),
            "<digits>" => Some(Predefined::Digits),
            _ => {
                let caps = regex!(r"^<([1-9][0-9]?)_digits>$").captures(name)?;
                let n: usize = caps.get(1)?.as_str().parse().ok()?;
                (n <= MAX_DIGITS_NONTERM).then_some(Predefined::NDigits(n))
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct IrShard {
    pub(crate) terminal_rules: BTreeMap<String, LhsSet>,
    pub(crate) lowercase_terminal_rules: BTreeMap<String, LhsSet>,
    pub(crate) unary_rules: BTreeMap<Nonterm, LhsSet>,
    pub(crate) binary_rules: BTreeMap<(Nonterm, Nonterm), LhsSet>,
}

#[derive(Debug, Default)]
struct SymbolTable {
    last: Nonterm,
    unshareable: HashSet<Nonterm>,
    names: BTreeMap<Nonterm, String>,
    by_name: HashMap<String, Nonterm>,
}

impl SymbolTable {
    fn next(&mut self) -> Nonterm {
        self.last += 1;
        self.last
    }

    fn is_unshareable(&self, nonterminal: Nonterm) -> bool {
        self.unshareable.contains(&nonterminal)
    }
}

/// Lowered grammar: per-shard production tables plus symbol metadata.
#[derive(Debug)]
pub struct Ir {
    shards: Vec<IrShard>,
    shard_locales: Vec<Vec<Locale>>,
    filters: BTreeSet<CallbackId>,
    symbols: SymbolTable,
    predefined: PredefinedNonterminals,
    annotations: BTreeMap<String, Nonterm>,
}

impl Ir {
    pub fn new(shard_locales: Vec<Vec<Locale>>, filters: BTreeSet<CallbackId>) -> Self {
        let shards = shard_locales.iter().map(|_| IrShard::default()).collect();
        Ir {
            shards,
            shard_locales,
            filters,
            symbols: SymbolTable::default(),
            predefined: PredefinedNonterminals::default(),
            annotations: BTreeMap::new(),
        }
    }

    /// Allocate a fresh shareable nonterminal.
    pub fn add_nonterminal(&mut self, name: &str) -> Nonterm {
        let id = self.symbols.next();
        self.bind_name(name, id);
        id
    }

    /// Allocate a fresh nonterminal that will never be merged with another.
    pub fn add_unshareable_nonterminal(&mut self, name: &str) -> Nonterm {
        let id = self.add_nonterminal(name);
        self.symbols.unshareable.insert(id);
        id
    }

    /// Record `name` for `id`. The first name bound to an id is kept as its
    /// debug name; every name stays resolvable through [`Ir::nonterminal`].
    pub fn bind_name(&mut self, name: &str, id: Nonterm) {
        if name.is_empty() {
            return;
        }
        self.symbols.names.entry(id).or_insert_with(|| name.to_string());
        self.symbols.by_name.entry(name.to_string()).or_insert(id);
    }

    pub fn set_predefined(&mut self, kind: Predefined, id: Nonterm) {
        match kind {
            Predefined::Start => self.predefined.start = id,
            Predefined::End => self.predefined.end = id,
            Predefined::Token => self.predefined.token = id,
            Predefined::UppercaseToken => self.predefined.uppercase_token = id,
            Predefined::Digits => self.predefined.digits = id,
            Predefined::NDigits(n) => {
                if let Some(slot) = self.predefined.n_digits.get_mut(n) {
                    *slot = id;
                }
            }
        }
    }

    pub fn bind_annotation(&mut self, annotation: &str, id: Nonterm) {
        self.annotations.insert(annotation.to_string(), id);
    }

    pub fn add_terminal(&mut self, lhs: Lhs, terminal: &str, case_sensitive: bool, shard: usize) -> Nonterm {
        let Ir { shards, symbols, filters, .. } = self;
        let shard = &mut shards[shard];
        let set = if case_sensitive {
            shard.terminal_rules.entry(terminal.to_string()).or_default()
        } else {
            shard.lowercase_terminal_rules.entry(terminal.to_lowercase()).or_default()
        };
        add_to_set(symbols, filters, lhs, set)
    }

    pub fn add_unary(&mut self, lhs: Lhs, rhs: Nonterm, shard: usize) -> Nonterm {
        // A bare relabeling of a shareable symbol is just that symbol.
        if lhs.nonterminal == UNASSIGNED_NONTERM && lhs.callback.id == NO_CALLBACK {
            return rhs;
        }
        let Ir { shards, symbols, filters, .. } = self;
        let set = shards[shard].unary_rules.entry(rhs).or_default();
        add_to_set(symbols, filters, lhs, set)
    }

    pub fn add_binary(&mut self, lhs: Lhs, rhs1: Nonterm, rhs2: Nonterm, shard: usize) -> Nonterm {
        let Ir { shards, symbols, filters, .. } = self;
        let set = shards[shard].binary_rules.entry((rhs1, rhs2)).or_default();
        add_to_set(symbols, filters, lhs, set)
    }

    /// Lower one production of arbitrary length.
    ///
    /// Inline terminals become anonymous shareable terminal rules, and rules
    /// longer than two elements are binarized left to right:
    ///
    /// ```text
    /// <x> ::= a b c d   ──▶   t1 ::= (a b)   t2 ::= (t1 c)   <x> ::= (t2 d)
    /// ```
    ///
    /// The intermediates inherit the rule's whitespace gap so it holds between
    /// every pair of neighboring elements.
    pub fn add_rule(&mut self, lhs: Lhs, rhs: &[IrElement], shard: usize) -> Nonterm {
        match rhs {
            [] => UNASSIGNED_NONTERM,
            [IrElement::Terminal { text, case_sensitive }] => self.add_terminal(lhs, text, *case_sensitive, shard),
            [IrElement::Nonterminal(n)] => self.add_unary(lhs, *n, shard),
            _ => {
                let symbols: Vec<Nonterm> = rhs
                    .iter()
                    .map(|element| match element {
                        IrElement::Terminal { text, case_sensitive } => {
                            self.add_terminal(Lhs::plain(UNASSIGNED_NONTERM), text, *case_sensitive, shard)
                        }
                        IrElement::Nonterminal(n) => *n,
                    })
                    .collect();

                let intermediate = Lhs { max_whitespace_gap: lhs.max_whitespace_gap, ..Lhs::plain(UNASSIGNED_NONTERM) };
                let last = symbols.len() - 1;
                let mut prev = symbols[0];
                for &next in &symbols[1..last] {
                    prev = self.add_binary(intermediate, prev, next, shard);
                }
                self.add_binary(lhs, prev, symbols[last], shard)
            }
        }
    }

    pub fn nonterminal_count(&self) -> Nonterm {
        self.symbols.last
    }

    pub fn is_unshareable(&self, nonterminal: Nonterm) -> bool {
        self.symbols.is_unshareable(nonterminal)
    }

    /// Resolve a builder-side `<name>` to its compiled symbol.
    pub fn nonterminal(&self, name: &str) -> Option<Nonterm> {
        self.symbols.by_name.get(name).copied()
    }

    pub fn name_of(&self, nonterminal: Nonterm) -> Option<&str> {
        self.symbols.names.get(&nonterminal).map(String::as_str)
    }

    pub fn predefined(&self) -> &PredefinedNonterminals {
        &self.predefined
    }

    pub(crate) fn shards(&self) -> &[IrShard] {
        &self.shards
    }

    pub(crate) fn shard_locales(&self) -> &[Vec<Locale>] {
        &self.shard_locales
    }

    pub(crate) fn filters(&self) -> &BTreeSet<CallbackId> {
        &self.filters
    }

    pub(crate) fn annotations(&self) -> &BTreeMap<String, Nonterm> {
        &self.annotations
    }

    pub(crate) fn names(&self) -> &BTreeMap<Nonterm, String> {
        &self.symbols.names
    }

    /// Encode into the binary rule set format.
    pub fn serialize(&self, include_debug_information: bool) -> Vec<u8> {
        write_rules_set(self, include_debug_information)
    }

    /// Encode and immediately load, verifying the result.
    pub fn to_rules_set(&self, include_debug_information: bool) -> Result<RulesSet, RulesSetError> {
        RulesSet::from_bytes(self.serialize(include_debug_information))
    }
}

/// Add `lhs` to `set`, reusing an equivalent shareable nonterminal if one is
/// already present, and return the nonterminal that now stands for `lhs`.
fn add_to_set(symbols: &mut SymbolTable, filters: &BTreeSet<CallbackId>, lhs: Lhs, set: &mut LhsSet) -> Nonterm {
    let is_filter = |callback: &Callback| callback.id != NO_CALLBACK && filters.contains(&callback.id);

    let mut shared = lhs.nonterminal;
    for candidate in set.iter_mut() {
        if *candidate == lhs {
            return candidate.nonterminal;
        }
        if symbols.is_unshareable(candidate.nonterminal) || symbols.is_unshareable(lhs.nonterminal) {
            continue;
        }
        if candidate.max_whitespace_gap != lhs.max_whitespace_gap {
            continue;
        }
        // Every filter must run on its own match.
        if is_filter(&lhs.callback) || is_filter(&candidate.callback) {
            continue;
        }
        if lhs.nonterminal != UNASSIGNED_NONTERM && lhs.nonterminal != candidate.nonterminal {
            continue;
        }
        if lhs.callback == candidate.callback || lhs.callback.id == NO_CALLBACK {
            return candidate.nonterminal;
        }
        if candidate.callback.id == NO_CALLBACK {
            candidate.callback = lhs.callback;
            return candidate.nonterminal;
        }
        // Same symbol, second output callback: keep looking for an exact hit,
        // otherwise append an entry for the extra callback below.
        shared = candidate.nonterminal;
    }

    if shared == UNASSIGNED_NONTERM {
        shared = symbols.next();
    }
    set.push(Lhs { nonterminal: shared, ..lhs });
    shared
}
