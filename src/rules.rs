//! Grammar builder.
//!
//! Rules are declared as `<lhs> ::= element*` where an element is either a
//! nonterminal reference `<name>` or a literal terminal. A trailing `?` marks
//! an element optional:
//!
//! ```text
//! <date>  ::= <month> <day> ,? <year>
//! <day>   ::= <1_digits> | <2_digits>
//! ```
//!
//! [`Rules::finalize`] lowers everything into an [`Ir`]: predefined and
//! annotation-bound nonterminals are allocated first, nonterminals that need a
//! stable identity (several rules, or a filter callback) are marked
//! unshareable, and the remaining single-rule nonterminals get their symbol
//! from the first production that lowers them, possibly merging with an
//! equivalent sub-grammar.

use crate::engine::{DefaultCallback, RulesSet};
use crate::engine::ir::{Callback, Ir, IrElement, Lhs, Predefined};
use crate::error::GrammarError;
use crate::{CallbackId, Locale, NO_CALLBACK, Nonterm, UNASSIGNED_NONTERM};
use std::collections::{BTreeSet, HashMap, HashSet};

/// More optional elements than this would blow up the expansion.
const MAX_OPTIONALS: usize = 12;

/// Per-rule settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleOptions {
    pub callback: CallbackId,
    pub callback_param: u64,
    /// `-1` leaves the whitespace between binary operands unconstrained.
    pub max_whitespace_gap: i8,
    pub case_sensitive: bool,
    pub shard: usize,
}

impl Default for RuleOptions {
    fn default() -> Self {
        RuleOptions { callback: NO_CALLBACK, callback_param: 0, max_whitespace_gap: -1, case_sensitive: false, shard: 0 }
    }
}

impl RuleOptions {
    /// Options for a rule that reports a derivation with `rule_id`.
    pub fn root(rule_id: u64) -> Self {
        RuleOptions { callback: DefaultCallback::RootRule.id(), callback_param: rule_id, ..Default::default() }
    }

    pub fn with_gap(mut self, max_whitespace_gap: i8) -> Self {
        self.max_whitespace_gap = max_whitespace_gap;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn in_shard(mut self, shard: usize) -> Self {
        self.shard = shard;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RhsElement {
    Terminal(String),
    Nonterminal(usize),
}

#[derive(Debug, Clone)]
struct Rule {
    lhs: usize,
    rhs: Vec<RhsElement>,
    options: RuleOptions,
    excluded: Option<usize>,
}

#[derive(Debug, Clone, Default)]
struct NontermInfo {
    name: String,
    rules: Vec<usize>,
    annotation: Option<String>,
}

/// Mutable grammar under construction.
#[derive(Debug, Clone)]
pub struct Rules {
    shard_locales: Vec<Vec<Locale>>,
    nonterminals: Vec<NontermInfo>,
    by_name: HashMap<String, usize>,
    rules: Vec<Rule>,
    filters: BTreeSet<CallbackId>,
}

impl Default for Rules {
    fn default() -> Self {
        Self::new()
    }
}

impl Rules {
    /// A grammar with a single untagged shard.
    pub fn new() -> Self {
        Self::with_shards(vec![Vec::new()])
    }

    /// A grammar with one shard per entry; an empty locale list makes a shard
    /// run for every text.
    pub fn with_shards(shard_locales: Vec<Vec<Locale>>) -> Self {
        let shard_locales = if shard_locales.is_empty() { vec![Vec::new()] } else { shard_locales };
        Rules {
            shard_locales,
            nonterminals: Vec::new(),
            by_name: HashMap::new(),
            rules: Vec::new(),
            filters: DefaultCallback::FILTERS.iter().map(|c| c.id()).collect(),
        }
    }

    pub fn num_shards(&self) -> usize {
        self.shard_locales.len()
    }

    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    /// Declare (or look up) a nonterminal by its `<name>`.
    pub fn add_nonterminal(&mut self, name: &str) -> Result<usize, GrammarError> {
        if let Some(&index) = self.by_name.get(name) {
            return Ok(index);
        }
        if !is_nonterminal_name(name) {
            return Err(GrammarError::InvalidNonterminalName(name.to_string()));
        }
        let index = self.nonterminals.len();
        self.nonterminals.push(NontermInfo { name: name.to_string(), ..Default::default() });
        self.by_name.insert(name.to_string(), index);
        Ok(index)
    }

    /// Mark `callback` as a filter: its matches are handed to the callback
    /// delegate instead of propagating on their own.
    pub fn define_filter(&mut self, callback: CallbackId) -> Result<(), GrammarError> {
        if callback == NO_CALLBACK || callback == DefaultCallback::RootRule.id() {
            return Err(GrammarError::ReservedCallback(callback));
        }
        self.filters.insert(callback);
        Ok(())
    }

    /// Make `nonterminal` stand for every span the caller annotates with
    /// `annotation`.
    pub fn bind_annotation(&mut self, annotation: &str, nonterminal: &str) -> Result<(), GrammarError> {
        let index = self.add_nonterminal(nonterminal)?;
        self.nonterminals[index].annotation = Some(annotation.to_string());
        Ok(())
    }

    /// Add a production, expanding optional elements.
    pub fn add(&mut self, lhs: &str, rhs: &[&str], options: RuleOptions) -> Result<(), GrammarError> {
        self.add_rule(lhs, rhs, options, None)
    }

    /// Add a production whose match is checked by the assertion filter.
    /// Derivations that contain a negative assertion are dropped.
    pub fn add_assertion(
        &mut self,
        lhs: &str,
        rhs: &[&str],
        negative: bool,
        options: RuleOptions,
    ) -> Result<(), GrammarError> {
        let options =
            RuleOptions { callback: DefaultCallback::Assertion.id(), callback_param: negative as u64, ..options };
        self.add_rule(lhs, rhs, options, None)
    }

    /// Add a production whose match carries `value` as a capture.
    pub fn add_value_mapping(
        &mut self,
        lhs: &str,
        rhs: &[&str],
        value: u64,
        options: RuleOptions,
    ) -> Result<(), GrammarError> {
        let options = RuleOptions { callback: DefaultCallback::Mapping.id(), callback_param: value, ..options };
        self.add_rule(lhs, rhs, options, None)
    }

    /// Add a production whose match is tagged with a semantic type.
    pub fn add_with_type(&mut self, lhs: &str, rhs: &[&str], tag: u64, options: RuleOptions) -> Result<(), GrammarError> {
        let options = RuleOptions { callback: DefaultCallback::SetType.id(), callback_param: tag, ..options };
        self.add_rule(lhs, rhs, options, None)
    }

    /// Add a production that only matches where `excluded` does not match the
    /// same span.
    pub fn add_with_exclusion(
        &mut self,
        lhs: &str,
        rhs: &[&str],
        excluded: &str,
        options: RuleOptions,
    ) -> Result<(), GrammarError> {
        let excluded = self.add_nonterminal(excluded)?;
        let options = RuleOptions { callback: DefaultCallback::Exclusion.id(), callback_param: 0, ..options };
        self.add_rule(lhs, rhs, options, Some(excluded))
    }

    fn add_rule(
        &mut self,
        lhs: &str,
        rhs: &[&str],
        options: RuleOptions,
        excluded: Option<usize>,
    ) -> Result<(), GrammarError> {
        if options.shard >= self.num_shards() {
            return Err(GrammarError::InvalidShard { shard: options.shard, num_shards: self.num_shards() });
        }
        let lhs_index = self.add_nonterminal(lhs)?;
        if rhs.is_empty() {
            return Err(GrammarError::EmptyRhs { lhs: lhs.to_string() });
        }

        let mut elements = Vec::with_capacity(rhs.len());
        let mut optional = Vec::new();
        for (position, raw) in rhs.iter().enumerate() {
            let (element, is_optional) = self.parse_element(lhs, raw)?;
            elements.push(element);
            if is_optional {
                optional.push(position);
            }
        }
        if optional.len() == elements.len() {
            return Err(GrammarError::AllOptional { lhs: lhs.to_string() });
        }
        if optional.len() > MAX_OPTIONALS {
            return Err(GrammarError::TooManyOptionals {
                lhs: lhs.to_string(),
                count: optional.len(),
                max: MAX_OPTIONALS,
            });
        }

        // Bit i of `omitted` drops the i-th optional element.
        let mut seen: HashSet<Vec<RhsElement>> = HashSet::new();
        for omitted in 0u32..(1 << optional.len()) {
            let variant: Vec<RhsElement> = elements
                .iter()
                .enumerate()
                .filter(|(position, _)| {
                    optional.iter().position(|o| o == position).is_none_or(|bit| omitted & (1 << bit) == 0)
                })
                .map(|(_, element)| element.clone())
                .collect();
            if !seen.insert(variant.clone()) {
                continue;
            }
            let index = self.rules.len();
            self.rules.push(Rule { lhs: lhs_index, rhs: variant, options, excluded });
            self.nonterminals[lhs_index].rules.push(index);
        }
        Ok(())
    }

    fn parse_element(&mut self, lhs: &str, raw: &str) -> Result<(RhsElement, bool), GrammarError> {
        let invalid = |reason: &'static str| GrammarError::InvalidElement {
            lhs: lhs.to_string(),
            element: raw.to_string(),
            reason,
        };
        if raw.is_empty() {
            return Err(invalid("empty element"));
        }
        let (body, optional) = match raw.strip_suffix('?') {
            Some(body) if !body.is_empty() => (body, true),
            _ => (raw, false),
        };

        if body.starts_with('<') || body.ends_with('>') {
            if !is_nonterminal_name(body) {
                return Err(invalid("malformed nonterminal reference"));
            }
            return Ok((RhsElement::Nonterminal(self.add_nonterminal(body)?), optional));
        }
        if body.contains(['<', '>']) {
            return Err(invalid("angle bracket inside a terminal"));
        }
        if body.contains('?') {
            return Err(invalid("`?` inside a terminal"));
        }
        if body.contains('\0') {
            return Err(invalid("NUL inside a terminal"));
        }
        if body.chars().any(char::is_whitespace) {
            return Err(invalid("whitespace inside a terminal"));
        }
        Ok((RhsElement::Terminal(body.to_string()), optional))
    }

    /// Lower the grammar into its intermediate representation.
    pub fn finalize(&self) -> Result<Ir, GrammarError> {
        let mut ir = Ir::new(self.shard_locales.clone(), self.filters.clone());
        let mut ids: Vec<Nonterm> = vec![UNASSIGNED_NONTERM; self.nonterminals.len()];

        let mut referenced: HashSet<usize> = HashSet::new();
        for rule in &self.rules {
            referenced.extend(rule.rhs.iter().filter_map(|e| match e {
                RhsElement::Nonterminal(n) => Some(*n),
                RhsElement::Terminal(_) => None,
            }));
            referenced.extend(rule.excluded);
        }

        for (index, info) in self.nonterminals.iter().enumerate() {
            if let Some(kind) = Predefined::from_name(&info.name) {
                if !info.rules.is_empty() {
                    return Err(GrammarError::PredefinedWithRules { name: info.name.clone() });
                }
                ids[index] = ir.add_unshareable_nonterminal(&info.name);
                ir.set_predefined(kind, ids[index]);
            } else if let Some(annotation) = &info.annotation {
                if !info.rules.is_empty() {
                    return Err(GrammarError::AnnotationWithRules {
                        name: info.name.clone(),
                        annotation: annotation.clone(),
                    });
                }
                ids[index] = ir.add_unshareable_nonterminal(&info.name);
                ir.bind_annotation(annotation, ids[index]);
            }
        }

        for (index, info) in self.nonterminals.iter().enumerate() {
            if ids[index] != UNASSIGNED_NONTERM {
                continue;
            }
            if info.rules.is_empty() {
                if referenced.contains(&index) {
                    return Err(GrammarError::UndefinedNonterminal { name: info.name.clone() });
                }
                continue;
            }
            let has_filter = info.rules.iter().any(|&r| self.filters.contains(&self.rules[r].options.callback));
            if info.rules.len() > 1 || has_filter {
                ids[index] = ir.add_unshareable_nonterminal(&info.name);
            }
        }

        let mut lowered = vec![false; self.rules.len()];
        loop {
            let mut progress = false;
            for (index, rule) in self.rules.iter().enumerate() {
                if lowered[index] || !self.is_lowerable(rule, &ids) {
                    continue;
                }
                let param = match rule.excluded {
                    Some(excluded) => ids[excluded] as u64,
                    None => rule.options.callback_param,
                };
                let lhs = Lhs {
                    nonterminal: ids[rule.lhs],
                    callback: Callback { id: rule.options.callback, param },
                    max_whitespace_gap: rule.options.max_whitespace_gap,
                };
                let rhs: Vec<IrElement> = rule
                    .rhs
                    .iter()
                    .map(|e| match e {
                        RhsElement::Terminal(text) => {
                            IrElement::Terminal { text: text.clone(), case_sensitive: rule.options.case_sensitive }
                        }
                        RhsElement::Nonterminal(n) => IrElement::Nonterminal(ids[*n]),
                    })
                    .collect();
                let id = ir.add_rule(lhs, &rhs, rule.options.shard);
                if ids[rule.lhs] == UNASSIGNED_NONTERM {
                    ids[rule.lhs] = id;
                }
                ir.bind_name(&self.nonterminals[rule.lhs].name, ids[rule.lhs]);
                lowered[index] = true;
                progress = true;
            }
            if !progress {
                break;
            }
        }

        let stuck: Vec<usize> = (0..self.rules.len()).filter(|&i| !lowered[i]).collect();
        if !stuck.is_empty() {
            let names: BTreeSet<String> =
                stuck.iter().map(|&i| self.nonterminals[self.rules[i].lhs].name.clone()).collect();
            return Err(GrammarError::Unlowerable { count: stuck.len(), names: names.into_iter().collect() });
        }

        tracing::debug!(
            rules = self.rules.len(),
            nonterminals = ir.nonterminal_count(),
            shards = self.shard_locales.len(),
            "finalized grammar"
        );
        Ok(ir)
    }

    fn is_lowerable(&self, rule: &Rule, ids: &[Nonterm]) -> bool {
        let deps_ready = rule.rhs.iter().all(|e| match e {
            RhsElement::Nonterminal(n) => ids[*n] != UNASSIGNED_NONTERM,
            RhsElement::Terminal(_) => true,
        });
        deps_ready && rule.excluded.is_none_or(|n| ids[n] != UNASSIGNED_NONTERM)
    }

    /// Finalize and serialize in one step.
    pub fn compile(&self, include_debug_information: bool) -> Result<RulesSet, GrammarError> {
        Ok(self.finalize()?.to_rules_set(include_debug_information)?)
    }
}

fn is_nonterminal_name(name: &str) -> bool {
    regex!(r"^<[^<>?\s\x00]+>$").is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_malformed_rules() {
        let mut rules = Rules::new();
        assert_eq!(
            rules.add("<x>", &[], RuleOptions::default()),
            Err(GrammarError::EmptyRhs { lhs: "<x>".into() })
        );
        assert_eq!(
            rules.add("<x>", &["a?", "<y>?"], RuleOptions::default()),
            Err(GrammarError::AllOptional { lhs: "<x>".into() })
        );
        assert!(matches!(rules.add("<x>", &["a b"], RuleOptions::default()), Err(GrammarError::InvalidElement { .. })));
        assert!(matches!(rules.add("<x>", &["<y"], RuleOptions::default()), Err(GrammarError::InvalidElement { .. })));
        assert!(matches!(rules.add("<x>", &["?"], RuleOptions::default()), Err(GrammarError::InvalidElement { .. })));
        assert!(matches!(rules.add("<x>", &[""], RuleOptions::default()), Err(GrammarError::InvalidElement { .. })));
        assert_eq!(
            rules.add("x", &["a"], RuleOptions::default()),
            Err(GrammarError::InvalidNonterminalName("x".into()))
        );
        assert_eq!(
            rules.add("<x>", &["a"], RuleOptions::default().in_shard(3)),
            Err(GrammarError::InvalidShard { shard: 3, num_shards: 1 })
        );
    }

    #[test]
    fn optional_elements_expand() {
        let mut rules = Rules::new();
        rules.add("<x>", &["a?", "b", "c?"], RuleOptions::default()).unwrap();
        assert_eq!(rules.num_rules(), 4);

        let mut rules = Rules::new();
        rules.add("<x>", &["a?", "a?", "b"], RuleOptions::default()).unwrap();
        // Dropping either `a` yields the same variant.
        assert_eq!(rules.num_rules(), 3);
    }

    #[test]
    fn undefined_nonterminal_is_reported() {
        let mut rules = Rules::new();
        rules.add("<x>", &["<missing>", "b"], RuleOptions::root(1)).unwrap();
        assert_eq!(rules.finalize().unwrap_err(), GrammarError::UndefinedNonterminal { name: "<missing>".into() });
    }

    #[test]
    fn cycles_are_unlowerable() {
        let mut rules = Rules::new();
        rules.add("<a>", &["<b>", "x"], RuleOptions::default()).unwrap();
        rules.add("<b>", &["<a>", "y"], RuleOptions::default()).unwrap();
        let err = rules.finalize().unwrap_err();
        assert_eq!(err, GrammarError::Unlowerable { count: 2, names: vec!["<a>".into(), "<b>".into()] });
    }

    #[test]
    fn recursive_nonterminals_with_several_rules_lower() {
        let mut rules = Rules::new();
        rules.add("<list>", &["item"], RuleOptions::default()).unwrap();
        rules.add("<list>", &["<list>", "item"], RuleOptions::default()).unwrap();
        let ir = rules.finalize().unwrap();
        assert!(ir.is_unshareable(ir.nonterminal("<list>").unwrap()));
    }

    #[test]
    fn predefined_and_annotation_nonterminals_cannot_have_rules() {
        let mut rules = Rules::new();
        rules.add("<digits>", &["x"], RuleOptions::default()).unwrap();
        assert_eq!(rules.finalize().unwrap_err(), GrammarError::PredefinedWithRules { name: "<digits>".into() });

        let mut rules = Rules::new();
        rules.bind_annotation("phone", "<phone>").unwrap();
        rules.add("<phone>", &["x"], RuleOptions::default()).unwrap();
        assert!(matches!(rules.finalize(), Err(GrammarError::AnnotationWithRules { .. })));
    }

    #[test]
    fn single_rule_aliases_fold_into_their_target() {
        let mut rules = Rules::new();
        rules.add("<code>", &["<digits>"], RuleOptions::default()).unwrap();
        rules.add("<x>", &["LX", "<code>"], RuleOptions::root(1)).unwrap();
        let ir = rules.finalize().unwrap();
        assert_eq!(ir.nonterminal("<code>"), ir.nonterminal("<digits>"));
        assert_eq!(ir.predefined().digits, ir.nonterminal("<digits>").unwrap());
    }

    #[test]
    fn equivalent_single_rule_nonterminals_share() {
        let mut rules = Rules::new();
        rules.add("<a>", &["hello", "world"], RuleOptions::default()).unwrap();
        rules.add("<b>", &["hello", "world"], RuleOptions::default()).unwrap();
        let ir = rules.finalize().unwrap();
        assert_eq!(ir.nonterminal("<a>"), ir.nonterminal("<b>"));
    }

    #[test]
    fn filters_make_nonterminals_unshareable() {
        let mut rules = Rules::new();
        rules.add_assertion("<neg>", &["x"], true, RuleOptions::default()).unwrap();
        rules.add("<plain>", &["x"], RuleOptions::default()).unwrap();
        let ir = rules.finalize().unwrap();
        let neg = ir.nonterminal("<neg>").unwrap();
        assert!(ir.is_unshareable(neg));
        assert_ne!(Some(neg), ir.nonterminal("<plain>"));
    }

    #[test]
    fn exclusion_parameter_is_the_excluded_symbol() {
        let mut rules = Rules::new();
        rules.add("<stop>", &["the"], RuleOptions::default()).unwrap();
        rules.add("<stop>", &["a"], RuleOptions::default()).unwrap();
        rules.add_with_exclusion("<word>", &["<token>"], "<stop>", RuleOptions::default()).unwrap();
        let ir = rules.finalize().unwrap();
        let stop = ir.nonterminal("<stop>").unwrap();
        let token = ir.predefined().token;
        let set = &ir.shards()[0].unary_rules[&token];
        assert_eq!(set[0].callback, Callback { id: DefaultCallback::Exclusion.id(), param: stop as u64 });
    }

    #[test]
    fn reserved_filters_are_rejected() {
        let mut rules = Rules::new();
        assert_eq!(rules.define_filter(0), Err(GrammarError::ReservedCallback(0)));
        assert_eq!(
            rules.define_filter(DefaultCallback::RootRule.id()),
            Err(GrammarError::ReservedCallback(DefaultCallback::RootRule.id()))
        );
        assert!(rules.define_filter(100).is_ok());
    }

    #[test]
    fn shards_bound_rule_placement() {
        assert_eq!(Rules::with_shards(Vec::new()).num_shards(), 1);

        let mut rules = Rules::with_shards(vec![Vec::new(), Locale::parse_list("de").unwrap()]);
        assert_eq!(rules.num_shards(), 2);
        assert!(rules.add("<x>", &["ja"], RuleOptions::default().in_shard(1)).is_ok());
        assert_eq!(
            rules.add("<x>", &["oui"], RuleOptions::default().in_shard(2)),
            Err(GrammarError::InvalidShard { shard: 2, num_shards: 2 })
        );
    }
}
