mod debug_report;

use grammatch::{Context, Locale, Options, grammars, parse_verbose_with};
use std::io::{self, IsTerminal, Read};
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    if let Some(path) = &config.write_rules {
        if let Err(err) = write_rules(path) {
            eprintln!("{err}");
            std::process::exit(1);
        }
        if config.input.is_none() {
            return;
        }
    }

    let Some(input) = config.input else {
        eprintln!("error: no input provided\n\n{}", help_text());
        std::process::exit(2);
    };

    let ctx = Context::with_locales(config.locales);
    let opts = Options::default();
    let res = parse_verbose_with(&input, &ctx, &opts);
    debug_report::print_run(&input, &res, config.color);
}

/// Events go to stderr so the report on stdout stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

fn write_rules(path: &str) -> Result<(), String> {
    let rules = grammars::compile(true).map_err(|err| format!("error: bundled grammars failed to compile: {err}"))?;
    std::fs::write(path, rules.as_bytes()).map_err(|err| format!("error: failed to write '{path}': {err}"))?;
    eprintln!("wrote {} bytes to {path}", rules.as_bytes().len());
    Ok(())
}

struct CliConfig {
    input: Option<String>,
    locales: Vec<Locale>,
    color: bool,
    write_rules: Option<String>,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut input: Option<String> = None;
    let mut locales = Vec::new();
    let mut color = io::stdout().is_terminal();
    let mut write_rules = None;
    let mut args = std::env::args().skip(1).peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("grammatch {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--locale" | "-l" => {
                let value = args.next().ok_or_else(|| "error: --locale expects a value".to_string())?;
                locales = parse_locales(&value)?;
            }
            "--write-rules" => {
                let value = args.next().ok_or_else(|| "error: --write-rules expects a path".to_string())?;
                write_rules = Some(value);
            }
            "--input" | "-i" => {
                let value = args.next().ok_or_else(|| "error: --input expects a value".to_string())?;
                set_input(&mut input, value)?;
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    set_input(&mut input, rest)?;
                }
                break;
            }
            _ if arg.starts_with("--locale=") => {
                locales = parse_locales(arg.trim_start_matches("--locale="))?;
            }
            _ if arg.starts_with("--input=") => {
                set_input(&mut input, arg.trim_start_matches("--input=").to_string())?;
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                set_input(&mut input, rest)?;
                break;
            }
        }
    }

    if input.is_none() && write_rules.is_none() {
        input = Some(read_stdin_input()?);
    }
    if input.as_deref().is_some_and(|text| text.trim().is_empty()) {
        return Err(format!("error: no input provided\n\n{}", help_text()));
    }

    Ok(CliConfig { input, locales, color, write_rules })
}

fn set_input(input: &mut Option<String>, value: String) -> Result<(), String> {
    if input.is_some() {
        return Err("error: input provided multiple times".to_string());
    }
    *input = Some(value);
    Ok(())
}

fn parse_locales(value: &str) -> Result<Vec<Locale>, String> {
    Locale::parse_list(value).map_err(|err| format!("error: invalid --locale '{value}': {err}"))
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "grammatch {version}

Runs the bundled date and flight grammars over text and prints what matched.

Usage:
  grammatch [OPTIONS] [--] <input...>
  grammatch [OPTIONS] --input <text>

Options:
  -i, --input <text>         Input text to parse. If omitted, reads remaining args
                             or stdin when no args are provided.
  -l, --locale <tags>        Comma separated text locales, e.g. 'de-CH,en'.
                             Locale-tagged rule shards only run for these.
  --write-rules <path>       Write the compiled bundled rule set to <path>.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  RUST_LOG                   Trace filter, e.g. 'grammatch=trace'. Default: warn

Exit codes:
  0  Success.
  1  Internal error.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
    )
}
