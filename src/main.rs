//! Purpose: `intstack` CLI entry point.
//! Role: Binary crate root; parses args, runs one device command, maps outcomes to exit codes.
//! Invariants: Popped values go to stdout one per line; an empty stack prints `NULL`.
//! Invariants: Errors go to stderr (JSON when stderr is not a terminal).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};

mod command_dispatch;
mod serve;

use intstack::api::{Error, ErrorKind, default_device_path, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `intstack --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let device = cli.device.unwrap_or_else(default_device_path);
    let color_mode = cli.color;

    command_dispatch::dispatch_command(cli.command, device, color_mode)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "intstack",
    version,
    about = "Resizable integer stack behind a hotplug-gated device",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"A daemon owns the stack; the device socket exists only while attached.
Many processes can push and pop concurrently.
"#,
    after_help = r#"EXAMPLES
  $ intstack serve --attached &       # start the daemon with the device attached
  $ intstack set-size 2
  $ intstack push 1
  $ intstack push 2
  $ intstack push 3                   # error: stack is full
  $ intstack pop                      # 2
  $ intstack unwind                   # 1
  $ intstack pop                      # NULL

HOTPLUG
  SIGUSR1 attaches the device, SIGUSR2 detaches it. Stack contents survive both."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Device socket path (default: ~/.intstack/int_stack)",
        value_hint = ValueHint::FilePath
    )]
    device: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics and pretty JSON output: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Set the stack capacity (shrinking drops the top elements)")]
    SetSize {
        #[arg(allow_negative_numbers = true, help = "New capacity, must be > 0")]
        size: i32,
    },
    #[command(about = "Push a value onto the stack")]
    Push {
        #[arg(allow_negative_numbers = true)]
        value: i32,
    },
    #[command(about = "Pop the top value (prints NULL when empty)")]
    Pop,
    #[command(about = "Pop and print every value until the stack is empty")]
    Unwind,
    #[command(about = "Report whether the device is attached")]
    Status,
    #[command(
        about = "Run the daemon that owns the stack and hosts the device",
        after_help = r#"NOTES
  - SIGUSR1 attaches (creates the device socket), SIGUSR2 detaches (removes it)
  - SIGINT/SIGTERM detach and exit; the stack is memory-resident only
  - Log verbosity follows RUST_LOG (default: info)"#
    )]
    Serve {
        #[arg(long, help = "Attach the device immediately on startup")]
        attached: bool,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn emit_json(value: Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::InvalidArgument => "invalid argument".to_string(),
        ErrorKind::Full => "stack is full".to_string(),
        ErrorKind::AllocationFailure => "out of memory".to_string(),
        ErrorKind::NotSupported => "operation not supported".to_string(),
        ErrorKind::NotConnected => "device is not attached".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Protocol => "protocol error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    std::iter::successors(err.source(), |&cause| cause.source())
        .map(ToString::to_string)
        .collect()
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        paint("error:", RED, use_color),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            paint("hint:", YELLOW, use_color)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            paint("device:", YELLOW, use_color),
            path.display()
        ));
    }

    if let Some(cause) = err.source() {
        lines.push(format!("{} {cause}", paint("caused by:", YELLOW, use_color)));
    }

    lines.join("\n")
}

// SGR foreground codes for stderr labels.
const RED: &str = "31";
const YELLOW: &str = "33";

fn paint(label: &str, sgr: &str, enabled: bool) -> String {
    if enabled {
        format!("\u{1b}[{sgr}m{label}\u{1b}[0m")
    } else {
        label.to_string()
    }
}

/// First non-empty line of clap's rendered error, without its `error:` prefix.
fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("error:").unwrap_or(line).trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Io => {
            err.with_hint("I/O error. Check the device path and that the daemon is running.")
        }
        ErrorKind::Protocol => err.with_hint(
            "Unexpected device protocol. Check the CLI and daemon run the same intstack version.",
        ),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    match (err.kind(), err.hint()) {
        (ErrorKind::Internal, None) => err.with_hint(
            "Daemon-side failure. Rerun `intstack serve` with RUST_LOG=debug for details.",
        ),
        _ => err,
    }
}
