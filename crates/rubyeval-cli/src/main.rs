//! `rubyeval`: evaluates a Ruby document statement by statement, printing each
//! statement's output and value, or reads statements interactively when no file is
//! given.
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `error`).

use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use rubyeval::{
    Config, InputPrompt, InputRequest, RubyVersion, SessionManager, StatementOutcome,
    mini::{MiniRubyParser, MiniRubyProvider},
    segment, segment_all,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rubyeval", version, about = "Evaluate Ruby documents statement by statement")]
struct Cli {
    /// Ruby file to evaluate. Statements are read from stdin when omitted.
    file: Option<PathBuf>,

    /// Ruby version tag (3.2, 3.3 or 3.4). Overrides the config file and environment.
    #[arg(long = "ruby-version", value_name = "TAG")]
    ruby_version: Option<RubyVersion>,

    /// TOML config file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print one JSON object per statement instead of annotated text.
    #[arg(long)]
    json: bool,

    /// Line supplied to `$stdin` before evaluation starts. May be repeated.
    #[arg(long = "input", value_name = "LINE")]
    input: Vec<String>,

    /// Signal end of input after the `--input` lines instead of prompting.
    #[arg(long = "input-eof")]
    input_eof: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_tracing();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(version = %config.ruby_version, "starting session");

    let mut manager = match SessionManager::new(Box::new(MiniRubyProvider), config) {
        Ok(manager) => manager,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    for line in &cli.input {
        manager.session_mut().supply_input(Some(&format!("{line}\n")));
    }
    if cli.input_eof {
        manager.session_mut().supply_input(None);
    }

    let mut prompt = TerminalPrompt;
    match &cli.file {
        Some(path) if cli.json => run_json(&mut manager, path, &mut prompt),
        Some(path) => run_file(&mut manager, path, &mut prompt),
        None => run_repl(&mut manager, &mut prompt),
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Config file, then `RUBYEVAL_RUBY_VERSION`, then `--ruby-version`.
fn load_config(cli: &Cli) -> Result<Config, String> {
    let config = match &cli.config {
        Some(path) => Config::load(path).map_err(|err| err.to_string())?,
        None => Config::default(),
    };
    let mut config = config.with_env().map_err(|err| err.to_string())?;
    if let Some(version) = cli.ruby_version {
        config.ruby_version = version;
    }
    // output is printed per statement from the capture, not echoed while it is written
    config.echo_output = false;
    Ok(config)
}

fn read_source(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("error reading {}: {err}", path.display()))
}

fn run_file(manager: &mut SessionManager, path: &Path, prompt: &mut TerminalPrompt) -> ExitCode {
    let text = match read_source(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let source_name = path.display().to_string();
    let statements = match segment(&MiniRubyParser, &text) {
        Ok(statements) => statements,
        Err(err) => {
            eprintln!("{}", err.with_source_name(source_name));
            return ExitCode::FAILURE;
        }
    };

    let mut failed = false;
    for span in statements {
        let span = match span {
            Ok(span) => span,
            Err(err) => {
                eprintln!("{}", err.with_source_name(source_name.as_str()));
                return ExitCode::FAILURE;
            }
        };
        let result = match manager.evaluate(&span.source, prompt) {
            Ok(result) => result,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        };
        let outcome = StatementOutcome { span, result };
        print_outcome(&outcome);
        failed |= outcome.result.is_error();
    }

    if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn run_json(manager: &mut SessionManager, path: &Path, prompt: &mut TerminalPrompt) -> ExitCode {
    let text = match read_source(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let outcomes = match manager.evaluate_document(&MiniRubyParser, &text, prompt) {
        Ok(outcomes) => outcomes,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = io::stdout().lock();
    for outcome in &outcomes {
        let written = serde_json::to_string(outcome)
            .map_err(io::Error::other)
            .and_then(|line| writeln!(stdout, "{line}"));
        if let Err(err) = written {
            eprintln!("error writing output: {err}");
            return ExitCode::FAILURE;
        }
    }

    if outcomes.iter().any(|outcome| outcome.result.is_error()) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Reads statements from stdin. Lines accumulate until they form complete statements.
///
/// `:reset` starts a fresh session and `:version TAG` switches the Ruby version.
fn run_repl(manager: &mut SessionManager, prompt: &mut TerminalPrompt) -> ExitCode {
    let mut buffer = String::new();
    loop {
        eprint!("{}", if buffer.is_empty() { ">> " } else { ".. " });
        io::stderr().flush().ok();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                eprintln!("error reading stdin: {err}");
                return ExitCode::FAILURE;
            }
        }

        if buffer.is_empty() && line.trim_start().starts_with(':') {
            run_command(manager, line.trim());
            continue;
        }

        buffer.push_str(&line);
        let spans = match segment_all(&MiniRubyParser, &buffer) {
            Ok(spans) => spans,
            Err(err) if err.incomplete => continue,
            Err(err) => {
                eprintln!("{}", err.with_source_name("(repl)"));
                buffer.clear();
                continue;
            }
        };
        buffer.clear();

        for span in spans {
            match manager.evaluate(&span.source, prompt) {
                Ok(result) => print_result_lines(&StatementOutcome { span, result }),
                Err(err) => eprintln!("error: {err}"),
            }
        }
    }
    ExitCode::SUCCESS
}

fn run_command(manager: &mut SessionManager, command: &str) {
    let mut words = command.split_whitespace();
    match (words.next(), words.next()) {
        (Some(":reset"), None) => match manager.reset_session() {
            Ok(()) => eprintln!("session reset ({})", manager.session().version()),
            Err(err) => eprintln!("error: {err}"),
        },
        (Some(":version"), None) => eprintln!("{}", manager.session().version()),
        (Some(":version"), Some(tag)) => match tag.parse::<RubyVersion>() {
            Ok(version) => match manager.set_version(version) {
                Ok(true) => eprintln!("switched to Ruby {version}"),
                Ok(false) => eprintln!("already on Ruby {version}"),
                Err(err) => eprintln!("error: {err}"),
            },
            Err(_) => eprintln!("unknown Ruby version {tag:?}"),
        },
        _ => eprintln!("unknown command {command:?}; try :reset or :version [TAG]"),
    }
}

fn print_outcome(outcome: &StatementOutcome) {
    for (index, line) in outcome.span.source.lines().enumerate() {
        println!("{} {line}", if index == 0 { ">>" } else { ".." });
    }
    print_result_lines(outcome);
}

fn print_result_lines(outcome: &StatementOutcome) {
    if let Some(output) = &outcome.result.captured_output {
        print!("{output}");
        if !output.ends_with('\n') {
            println!();
        }
    }
    println!("{}", outcome.annotation().trim_start());
}

/// Asks the terminal for a line whenever a statement runs out of `$stdin`.
struct TerminalPrompt;

impl InputPrompt for TerminalPrompt {
    fn request_input(&mut self, request: &InputRequest) -> Option<String> {
        tracing::debug!(source = %request.source, "statement waiting for input");
        if let Some(output) = &request.output {
            eprint!("{output}");
        }
        eprint!("stdin> ");
        io::stderr().flush().ok();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }
}
