//! Flight numbers: carrier code followed by one to four digits ("LX38",
//! "dl 1234"). A trailing decimal part ("LX38.00") marks a price or an amount,
//! not a flight, and suppresses the match.

use super::FLIGHT;
use crate::{DefaultCallback, GrammarError, RuleOptions, Rules};

/// IATA codes that are also common words are matched case sensitively.
const CARRIERS_EXACT: &[&str] = &["LX", "BA", "AF"];
const CARRIERS: &[&str] = &["dl", "lh", "ua", "ek"];

pub fn add(rules: &mut Rules) -> Result<(), GrammarError> {
    for &carrier in CARRIERS_EXACT {
        rules.add("<carrier>", &[carrier], RuleOptions::default().case_sensitive())?;
    }
    for &carrier in CARRIERS {
        rules.add("<carrier>", &[carrier], RuleOptions::default())?;
    }

    for n in 1..=4 {
        let digits = format!("<{n}_digits>");
        rules.add("<flight_code>", &[digits.as_str()], RuleOptions::default())?;
    }

    rules.add_assertion("<decimal_tail>", &[".", "<digits>"], true, RuleOptions::default().with_gap(0))?;

    rule!(
        rules,
        lhs: "<flight>",
        rhs: ["<carrier>", "<flight_code>", "<decimal_tail>?"],
        callback: DefaultCallback::RootRule.id(),
        param: FLIGHT,
        max_whitespace_gap: 1,
    )?;
    Ok(())
}
