#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Declare one production on a [`Rules`](crate::Rules) builder.
///
/// ```
/// use grammatch::{Rules, rule};
///
/// let mut rules = Rules::new();
/// rule!(
///     rules,
///     lhs: "<greeting>",
///     rhs: ["hello", "<name>?"],
///     max_whitespace_gap: 1,
/// )
/// .unwrap();
/// rule!(rules, lhs: "<name>", rhs: ["world"]).unwrap();
/// assert!(rules.finalize().is_ok());
/// ```
#[macro_export]
macro_rules! rule {
    (
        $rules:expr,
        lhs: $lhs:expr,
        rhs: [ $($elem:expr),* $(,)? ]
        $(, callback: $callback:expr)?
        $(, param: $param:expr)?
        $(, max_whitespace_gap: $gap:expr)?
        $(, case_sensitive: $case_sensitive:expr)?
        $(, shard: $shard:expr)?
        $(,)?
    ) => {{
        #[allow(unused_mut)]
        let mut options = $crate::RuleOptions::default();
        $( options.callback = $callback; )?
        $( options.callback_param = $param; )?
        $( options.max_whitespace_gap = $gap; )?
        $( options.case_sensitive = $case_sensitive; )?
        $( options.shard = $shard; )?
        $rules.add($lhs, &[ $($elem),* ], options)
    }};
}
