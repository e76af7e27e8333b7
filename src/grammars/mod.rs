//! Bundled demo grammars.
//!
//! These back the default rule set used by [`parse`](crate::parse) and the
//! CLI. Each grammar adds its rules to a shared [`Rules`] builder; shard 0 is
//! locale-universal and shard 1 is German.

pub mod dates;
pub mod flights;

use crate::{GrammarError, Locale, Rules, RulesSet};

/// German-only rules go here.
pub const SHARD_DE: usize = 1;

/// Root rule ids of the bundled grammars.
pub const DATE: u64 = 1;
pub const FLIGHT: u64 = 2;

const ROOT_RULES: &[(u64, &str)] = &[(DATE, "date"), (FLIGHT, "flight")];

/// Human-readable name of a bundled root rule.
pub fn rule_name(rule_id: u64) -> Option<&'static str> {
    ROOT_RULES.iter().find(|(id, _)| *id == rule_id).map(|(_, name)| *name)
}

/// Builder with every bundled grammar declared.
pub fn build() -> Result<Rules, GrammarError> {
    let mut rules = Rules::with_shards(vec![Vec::new(), Locale::parse_list("de")?]);
    dates::add(&mut rules)?;
    flights::add(&mut rules)?;
    Ok(rules)
}

pub fn compile(include_debug_information: bool) -> Result<RulesSet, GrammarError> {
    build()?.compile(include_debug_information)
}
