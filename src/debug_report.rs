use grammatch::{Entity, NodeSummary, ParseResultVerbose};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_run(input: &str, res: &ParseResultVerbose, color: bool) {
    let palette = ansi::Palette::new(color);
    let details = &res.details;
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Matching: \"{}\"", input), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Chart ━━━", ansi::GRAY));
    let m = &details.metrics.matching;
    println!(
        "  {} {}  {} {}  {} {}",
        palette.paint("Shards:", ansi::BLUE),
        palette.paint(format!("{:?}", details.active_shards), ansi::YELLOW),
        palette.dim("tokens:"),
        palette.paint(m.tokens.to_string(), ansi::YELLOW),
        palette.dim("matches:"),
        if m.matches_dropped > 0 {
            palette.paint(format!("{} ({} dropped)", m.matches_allocated, m.matches_dropped), ansi::YELLOW)
        } else {
            palette.paint(m.matches_allocated.to_string(), ansi::GREEN)
        },
    );
    for node in details.samples.iter().take(5) {
        println!("    {}", fmt_node_compact(node, &palette));
    }
    if details.samples.len() > 5 {
        println!("    {}", palette.dim(format!("... +{} more", details.samples.len() - 5)));
    }

    println!("\n{}", palette.paint("━━━ Results ━━━", ansi::GRAY));
    if res.results.is_empty() {
        println!("{}", palette.dim("  No derivations"));
        if details.all_candidates.is_empty() {
            println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
            println!("  • No root rule fired (check terminals and whitespace gaps)");
            println!("  • Locale-tagged shards were skipped (pass --locale)");
        } else {
            println!(
                "  {}",
                palette.dim(format!(
                    "{} candidate(s) were shadowed by wider matches or failed an assertion",
                    details.all_candidates.len()
                ))
            );
        }
        println!("\n{}", palette.dim("  Tip: set RUST_LOG=grammatch=trace to see rule firings"));
    } else {
        print_results(&res.results, &palette);
    }

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Matching: {}  │  Derivation: {}  │  Candidates: {}",
        palette.paint(format!("{:?}", details.metrics.total), ansi::GREEN),
        palette.paint(format!("{:?}", m.duration), ansi::CYAN),
        palette.dim(format!("{:?}", details.metrics.derivation)),
        palette.dim(details.metrics.candidates.to_string()),
    );
    println!();
}

fn print_results(results: &[Entity], palette: &ansi::Palette) {
    for (idx, ent) in results.iter().enumerate() {
        println!(
            "  {} {} {} {}",
            palette.paint(format!("[{}]", idx), ansi::GRAY),
            palette.bold(palette.paint(&ent.body, ansi::GREEN)),
            palette.dim("│"),
            palette.paint(format!("span {}..{}", ent.start, ent.end), ansi::YELLOW),
        );
        println!(
            "      {} {}  {} {}",
            palette.dim("rule:"),
            palette.paint(&ent.rule, ansi::CYAN),
            palette.dim("│ id:"),
            palette.paint(ent.rule_id.to_string(), ansi::BLUE)
        );
        for capture in &ent.captures {
            println!(
                "      {} {} {}",
                palette.dim(format!("#{}", capture.id)),
                palette.paint(&capture.body, ansi::BLUE),
                palette.dim(format!("{}..{}", capture.span.start, capture.span.end)),
            );
        }
    }
}

fn fmt_node_compact(node: &NodeSummary, palette: &ansi::Palette) -> String {
    format!(
        "{} {} {}",
        palette.paint(format!("{}..{}", node.start, node.end), ansi::YELLOW),
        palette.paint(&node.nonterminal, ansi::BLUE),
        palette.dim(node.preview.clone())
    )
}
