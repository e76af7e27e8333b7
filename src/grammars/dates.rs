//! Calendar dates: "January 1, 1988", "1 Jan 1988", "3. März 2021".
//!
//! Months, days and years are captured; month captures carry the month number.

use super::{DATE, SHARD_DE};
use crate::{DefaultCallback, GrammarError, RuleOptions, Rules};

const ROOT: u32 = DefaultCallback::RootRule.id();

pub const CAPTURE_DAY: u64 = 100;
pub const CAPTURE_YEAR: u64 = 101;

const MONTHS: &[(&str, &str, u64)] = &[
    ("january", "jan", 1),
    ("february", "feb", 2),
    ("march", "mar", 3),
    ("april", "apr", 4),
    ("may", "may", 5),
    ("june", "jun", 6),
    ("july", "jul", 7),
    ("august", "aug", 8),
    ("september", "sep", 9),
    ("october", "oct", 10),
    ("november", "nov", 11),
    ("december", "dec", 12),
];

const MONTHS_DE: &[(&str, u64)] = &[
    ("januar", 1),
    ("februar", 2),
    ("märz", 3),
    ("mai", 5),
    ("juni", 6),
    ("juli", 7),
    ("oktober", 10),
    ("dezember", 12),
];

pub fn add(rules: &mut Rules) -> Result<(), GrammarError> {
    for &(name, abbreviation, number) in MONTHS {
        rules.add_value_mapping("<month>", &[name], number, RuleOptions::default())?;
        if abbreviation != name {
            rules.add_value_mapping("<month>", &[abbreviation, ".?"], number, RuleOptions::default())?;
        }
    }
    for &(name, number) in MONTHS_DE {
        rules.add_value_mapping("<month>", &[name], number, RuleOptions::default().in_shard(SHARD_DE))?;
    }

    rules.add_value_mapping("<day>", &["<1_digits>"], CAPTURE_DAY, RuleOptions::default())?;
    rules.add_value_mapping("<day>", &["<2_digits>"], CAPTURE_DAY, RuleOptions::default())?;
    rules.add_value_mapping("<year>", &["<4_digits>"], CAPTURE_YEAR, RuleOptions::default())?;

    // "January 1, 1988" / "January 1 1988"
    rule!(rules, lhs: "<date>", rhs: ["<month>", "<day>", ",?", "<year>"], callback: ROOT, param: DATE)?;
    // "1 January 1988" / "1. Januar 1988"
    rule!(rules, lhs: "<date>", rhs: ["<day>", ".?", "<month>", "<year>"], callback: ROOT, param: DATE)?;
    Ok(())
}
