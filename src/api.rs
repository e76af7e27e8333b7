use crate::engine::{self, Arena, MatcherOptions, RunMetrics, RunOutput};
use crate::{Annotation, Derivation, Locale, RulesSet, Span, grammars, tokenize};
use once_cell::sync::Lazy;
use std::time::Duration;

static DEFAULT_RULES: Lazy<Option<RulesSet>> = Lazy::new(|| match grammars::compile(true) {
    Ok(rules) => Some(rules),
    Err(err) => {
        tracing::error!(%err, "bundled grammars failed to compile");
        None
    }
});

/// Parsing context.
///
/// Holds what is known about the text itself.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Locales the text is written in. Shards tagged with other locales are
    /// skipped; untagged shards always run.
    pub locales: Vec<Locale>,
    /// Spans found by other components, spliced in as matches of the
    /// nonterminals bound to their names.
    pub annotations: Vec<Annotation>,
}

impl Context {
    pub fn with_locales(locales: Vec<Locale>) -> Self {
        Context { locales, annotations: Vec::new() }
    }
}

/// Options that affect matching.
#[derive(Debug, Clone)]
pub struct Options {
    /// Upper bound for match storage per text.
    pub arena_limit_bytes: usize,
    /// Resolve rule names through the rule set's debug names when the rule id
    /// is not a bundled one.
    pub include_debug_names: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { arena_limit_bytes: MatcherOptions::default().arena_limit_bytes, include_debug_names: true }
    }
}

impl Options {
    fn matcher_options(&self) -> MatcherOptions {
        MatcherOptions { arena_limit_bytes: self.arena_limit_bytes }
    }
}

/// A captured sub-span of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Mapping id attached by the grammar.
    pub id: u64,
    pub span: Span,
    pub body: String,
}

/// A derivation found in the input.
///
/// `start`/`end` are codepoint offsets into the original input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub rule_id: u64,
    /// Name of the root rule, e.g. `"date"`.
    pub rule: String,
    /// Slice of the original input that matched.
    pub body: String,
    pub start: usize,
    pub end: usize,
    pub captures: Vec<Capture>,
}

/// Result from [`parse`] and [`parse_with`].
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// The parsed input text.
    pub text: String,
    pub results: Vec<Entity>,
    /// Total elapsed time spent lexing, matching and deduplicating.
    pub elapsed: Duration,
}

/// A compact match summary used in verbose traces.
#[derive(Debug, Clone)]
pub struct NodeSummary {
    pub start: usize,
    pub end: usize,
    pub nonterminal: String,
    pub preview: String,
}

/// Additional details returned by [`parse_verbose`] and [`parse_verbose_with`].
#[derive(Debug, Clone)]
pub struct ParseDetails {
    pub metrics: RunMetrics,
    /// Shards that participated for the context's locales.
    pub active_shards: Vec<usize>,
    /// Every root rule firing before dedup and validation.
    pub all_candidates: Vec<Entity>,
    /// The widest matches in the chart, for debugging grammars.
    pub samples: Vec<NodeSummary>,
}

/// Result from [`parse_verbose`] and [`parse_verbose_with`].
#[derive(Debug, Clone)]
pub struct ParseResultVerbose {
    pub text: String,
    pub results: Vec<Entity>,
    pub elapsed: Duration,
    pub details: ParseDetails,
}

/// Parse `text` with the bundled grammars and a default [`Context`].
///
/// # Example
/// ```
/// use grammatch::parse;
///
/// let out = parse("January 1, 1988");
/// assert_eq!(out.results.len(), 1);
/// assert_eq!(out.results[0].rule, "date");
/// ```
pub fn parse(text: &str) -> ParseResult {
    parse_with(text, &Context::default(), &Options::default())
}

/// Parse `text` with the bundled grammars.
pub fn parse_with(text: &str, context: &Context, options: &Options) -> ParseResult {
    match DEFAULT_RULES.as_ref() {
        Some(rules) => parse_with_rules(rules, text, context, options),
        None => ParseResult { text: text.to_string(), results: Vec::new(), elapsed: Duration::ZERO },
    }
}

/// Parse `text` with a caller-supplied rule set.
pub fn parse_with_rules(rules: &RulesSet, text: &str, context: &Context, options: &Options) -> ParseResult {
    let (output, metrics) = run(rules, text, context, options);
    let chars: Vec<char> = text.chars().collect();
    ParseResult {
        text: text.to_string(),
        results: to_entities(rules, &chars, &output.arena, &output.derivations, options),
        elapsed: metrics.total,
    }
}

/// Verbose variant of [`parse`].
pub fn parse_verbose(text: &str) -> ParseResultVerbose {
    parse_verbose_with(text, &Context::default(), &Options::default())
}

/// Parse `text` and return extra (compact) debug details.
///
/// The default [`parse_with`] path does not build these traces.
pub fn parse_verbose_with(text: &str, context: &Context, options: &Options) -> ParseResultVerbose {
    let Some(rules) = DEFAULT_RULES.as_ref() else {
        return ParseResultVerbose {
            text: text.to_string(),
            results: Vec::new(),
            elapsed: Duration::ZERO,
            details: ParseDetails {
                metrics: RunMetrics::default(),
                active_shards: Vec::new(),
                all_candidates: Vec::new(),
                samples: Vec::new(),
            },
        };
    };
    parse_verbose_with_rules(rules, text, context, options)
}

/// Verbose variant of [`parse_with_rules`].
pub fn parse_verbose_with_rules(
    rules: &RulesSet,
    text: &str,
    context: &Context,
    options: &Options,
) -> ParseResultVerbose {
    let (output, metrics) = run(rules, text, context, options);
    let chars: Vec<char> = text.chars().collect();

    let results = to_entities(rules, &chars, &output.arena, &output.derivations, options);
    let all_candidates = to_entities(rules, &chars, &output.arena, &output.candidates, options);

    let mut widest: Vec<_> = output.arena.iter().map(|(_, m)| m).filter(|m| !m.span.is_empty()).collect();
    widest.sort_by(|a, b| b.span.len().cmp(&a.span.len()).then(a.span.start.cmp(&b.span.start)));
    let samples = widest
        .into_iter()
        .take(8)
        .map(|m| NodeSummary {
            start: m.span.start,
            end: m.span.end,
            nonterminal: rules.debug_name(m.nonterminal).map(str::to_string).unwrap_or_else(|| format!("#{}", m.nonterminal)),
            preview: slice(&chars, m.span).chars().take(80).collect(),
        })
        .collect();

    let details = ParseDetails {
        active_shards: rules.select_shards(&context.locales),
        all_candidates,
        samples,
        metrics: metrics.clone(),
    };
    ParseResultVerbose { text: text.to_string(), results, elapsed: metrics.total, details }
}

fn run(rules: &RulesSet, text: &str, context: &Context, options: &Options) -> (RunOutput, RunMetrics) {
    let tokens = tokenize(text);
    engine::run_with_metrics(rules, &tokens, &context.annotations, &context.locales, &options.matcher_options())
}

fn slice(chars: &[char], span: Span) -> String {
    chars.get(span.start..span.end.min(chars.len())).map(|c| c.iter().collect()).unwrap_or_default()
}

fn is_bundled(rules: &RulesSet) -> bool {
    DEFAULT_RULES.as_ref().is_some_and(|bundled| std::ptr::eq(bundled, rules))
}

/// Root rule ids are only meaningful within their rule set, so the bundled
/// names apply to the bundled set alone.
fn rule_name(rules: &RulesSet, arena: &Arena, derivation: &Derivation, options: &Options) -> String {
    if is_bundled(rules) {
        if let Some(name) = grammars::rule_name(derivation.rule_id) {
            return name.to_string();
        }
    }
    if options.include_debug_names {
        if let Some(name) = arena.get(derivation.root).and_then(|m| rules.debug_name(m.nonterminal)) {
            return name.trim_start_matches('<').trim_end_matches('>').to_string();
        }
    }
    format!("rule#{}", derivation.rule_id)
}

fn to_entities(
    rules: &RulesSet,
    chars: &[char],
    arena: &Arena,
    derivations: &[Derivation],
    options: &Options,
) -> Vec<Entity> {
    derivations
        .iter()
        .filter_map(|d| {
            let span = arena.get(d.root)?.span;
            let captures = engine::captures(arena, d)
                .into_iter()
                .map(|c| Capture { id: c.id, span: c.span, body: slice(chars, c.span) })
                .collect();
            Some(Entity {
                rule_id: d.rule_id,
                rule: rule_name(rules, arena, d, options),
                body: slice(chars, span),
                start: span.start,
                end: span.end,
                captures,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammars::dates::{CAPTURE_DAY, CAPTURE_YEAR};
    use crate::{RuleOptions, Rules};
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_with_returns_entities() {
        let res = parse_with("Meet me on January 1, 1988 please", &Context::default(), &Options::default());

        assert_eq!(res.text, "Meet me on January 1, 1988 please");
        assert!(res.elapsed >= Duration::ZERO);

        let date = res.results.iter().find(|e| e.rule == "date").unwrap();
        assert_eq!(date.body, "January 1, 1988");
        assert_eq!(date.start, 11);
        assert_eq!(date.end, 26);
        let captures: Vec<(u64, &str)> = date.captures.iter().map(|c| (c.id, c.body.as_str())).collect();
        assert_eq!(captures, vec![(1, "January"), (CAPTURE_DAY, "1"), (CAPTURE_YEAR, "1988")]);
    }

    #[test]
    fn locales_select_shards() {
        let text = "3. März 2021";
        assert!(parse(text).results.is_empty());

        let german = Context::with_locales(Locale::parse_list("de-CH").unwrap());
        let res = parse_with(text, &german, &Options::default());
        assert_eq!(res.results.len(), 1);
        assert_eq!(res.results[0].body, "3. März 2021");
    }

    #[test]
    fn parse_verbose_includes_metrics_and_candidates() {
        let res = parse_verbose_with("LX38.00 or LX39", &Context::default(), &Options::default());

        assert_eq!(res.elapsed, res.details.metrics.total);
        assert!(res.details.metrics.matching.duration <= res.details.metrics.total);
        assert_eq!(res.details.active_shards, vec![0]);
        assert_eq!(res.results.len(), 1);
        assert_eq!(res.results[0].body, "LX39");
        // LX38, LX38.00 and LX39 all fired before dedup and validation.
        assert_eq!(res.details.all_candidates.len(), 3);
        assert!(!res.details.samples.is_empty());
    }

    #[test]
    fn custom_rules_use_debug_names() {
        let mut rules = Rules::new();
        rules.add("<greeting>", &["hello", "<token>"], RuleOptions::root(77)).unwrap();
        let set = rules.compile(true).unwrap();

        let res = parse_with_rules(&set, "well hello there", &Context::default(), &Options::default());
        assert_eq!(res.results.len(), 1);
        assert_eq!(res.results[0].rule, "greeting");
        assert_eq!(res.results[0].body, "hello there");

        let options = Options { include_debug_names: false, ..Options::default() };
        let res = parse_with_rules(&set, "hello you", &Context::default(), &options);
        assert_eq!(res.results[0].rule, "rule#77");
    }

    #[test]
    fn custom_root_ids_do_not_take_bundled_names() {
        let mut rules = Rules::new();
        rules.add("<greeting>", &["hello", "<token>"], RuleOptions::root(grammars::DATE)).unwrap();
        let set = rules.compile(true).unwrap();

        let res = parse_with_rules(&set, "hello there", &Context::default(), &Options::default());
        assert_eq!(res.results.len(), 1);
        assert_eq!(res.results[0].rule_id, grammars::DATE);
        assert_eq!(res.results[0].rule, "greeting");

        let options = Options { include_debug_names: false, ..Options::default() };
        let res = parse_with_rules(&set, "hello there", &Context::default(), &options);
        assert_eq!(res.results[0].rule, format!("rule#{}", grammars::DATE));

        // The bundled set keeps its names either way.
        let res = parse_with("LX38", &Context::default(), &options);
        assert_eq!(res.results[0].rule, "flight");
    }
}
