#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # rpmmacro CLI
//!
//! A command-line interface for the rpmmacro expansion library.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rpmmacro::{LogicalLines, MacroConfig, MacroContext, MacroError, MacroLevel, MessageKind};
use serde::Serialize;
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Exit codes for different error conditions
mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const IO_ERROR: i32 = 2;
    pub const EXPANSION_ERROR: i32 = 3;
    pub const ARGUMENT_ERROR: i32 = 4;
}

/// Command-line interface for the rpmmacro expander
#[derive(Parser)]
#[command(
    name = "rpmmacro",
    version,
    author,
    about = "Expand RPM macros",
    long_about = "rpmmacro evaluates text against an RPM macro table loaded from macro files and command line definitions.",
    after_help = "EXAMPLES:
  # Evaluate an expression
  $ rpmmacro -E '%{basename:/a/b/c.txt}'

  # Load the system macro files and expand a path
  $ rpmmacro -m /usr/lib/rpm/macros:~/.rpmmacros -E '%{_topdir}/SOURCES'

  # Override a definition and expand a file line by line
  $ rpmmacro -D '_prefix /opt' input.txt -o output.txt

  # Read from stdin and show the resulting table
  $ cat defs.txt | rpmmacro - --dump

  # Dry run to see what would happen
  $ rpmmacro -E '%foo' --dry-run"
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Input file to expand line by line (use '-' for stdin)
    #[arg(help = "Input file to expand line by line (use '-' for stdin)")]
    input: Option<PathBuf>,

    /// Expressions to expand
    #[arg(
        short = 'E',
        long = "eval",
        value_name = "EXPR",
        help = "Expand EXPR and print the result (repeatable)"
    )]
    eval: Vec<String>,

    /// Output file (use '-' for stdout, default: stdout)
    #[arg(
        short = 'o',
        long,
        help = "Output file (use '-' for stdout, default: stdout)"
    )]
    output: Option<PathBuf>,

    /// Colon separated list of macro files
    #[arg(
        short = 'm',
        long = "macros",
        value_name = "PATHLIST",
        env = "RPMMACRO_FILES",
        help = "Colon separated list of macro files to load"
    )]
    macros: Option<String>,

    /// Command line definitions
    #[arg(
        short = 'D',
        long = "define",
        value_name = "'NAME BODY'",
        help = "Define a macro at command line level (repeatable)"
    )]
    define: Vec<String>,

    /// Names to undefine after loading
    #[arg(
        short = 'U',
        long = "undefine",
        value_name = "NAME",
        help = "Undefine a macro after all definitions are loaded"
    )]
    undefine: Vec<String>,

    /// Maximum recursion depth for macro expansion
    #[arg(
        long,
        default_value = "16",
        help = "Maximum recursion depth for macro expansion"
    )]
    recursion_limit: usize,

    /// Size of the expansion buffer
    #[arg(
        long,
        default_value = "8192",
        help = "Size of the expansion buffer in bytes"
    )]
    capacity: usize,

    /// Trace every expansion
    #[arg(long, help = "Print every macro and its expansion to stderr")]
    trace: bool,

    /// Print the macro table when done
    #[arg(long, help = "Print the macro table after expanding")]
    dump: bool,

    /// Output in JSON format
    #[arg(long, help = "Output expansion results in JSON format")]
    #[cfg(feature = "json")]
    json: bool,

    /// Enable verbose output
    #[arg(
        short = 'v',
        long,
        help = "Enable verbose output with diagnostic information"
    )]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short = 'q', long, help = "Suppress non-error output (quiet mode)")]
    quiet: bool,

    /// Show what would happen without expanding
    #[arg(
        short = 'n',
        long,
        help = "Show what would happen without actually expanding"
    )]
    dry_run: bool,

    /// Disable colored output
    #[arg(long, help = "Disable colored output")]
    no_color: bool,
}

/// Invalid command line usage detected after parsing
#[derive(Debug)]
struct ArgumentError(String);

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ArgumentError {}

/// One expanded expression or input line
#[derive(Debug, Serialize)]
struct Evaluation {
    source: String,
    output: String,
}

/// Everything produced by a run
#[derive(Debug, Default, Serialize)]
struct Report {
    success: bool,
    results: Vec<Evaluation>,
    input_file: Option<String>,
    output_file: Option<String>,
    macro_files_loaded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    dump: Option<String>,
}

/// Main application entry point
fn main() {
    std::process::exit(match run() {
        Ok(()) => exit_code::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            determine_exit_code(&e)
        }
    });
}

/// Determine the appropriate exit code based on the error
fn determine_exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<ArgumentError>().is_some() {
        exit_code::ARGUMENT_ERROR
    } else if let Some(macro_err) = error.downcast_ref::<MacroError>() {
        if macro_err.is_bad_spec() {
            exit_code::EXPANSION_ERROR
        } else {
            exit_code::IO_ERROR
        }
    } else if error.downcast_ref::<std::io::Error>().is_some() {
        exit_code::IO_ERROR
    } else {
        exit_code::GENERAL_ERROR
    }
}

/// Install the tracing subscriber; `-v` raises the default level to debug
fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else if cli.quiet {
        LevelFilter::ERROR
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .init();
}

/// Run the main application logic
fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color || !atty::is(atty::Stream::Stderr) {
        colored::control::set_override(false);
    }
    init_logging(&cli);

    // Validate arguments
    validate_args(&cli)?;

    // Show dry run information and exit
    if cli.dry_run {
        show_dry_run_info(&cli);
        return Ok(());
    }

    let mut mc = rpmmacro::global_context();
    let macro_files_loaded = load_context(&cli, &mut mc)?;

    let config = create_config(&cli);
    let start_time = std::time::Instant::now();

    let mut report = Report {
        input_file: cli.input.as_deref().map(format_input),
        output_file: cli.output.as_deref().map(format_output),
        macro_files_loaded,
        ..Report::default()
    };
    for expr in &cli.eval {
        let output = mc
            .expand_with(expr, &config)
            .with_context(|| format!("Failed to expand '{expr}'"))?;
        report.results.push(Evaluation {
            source: expr.clone(),
            output,
        });
    }
    if let Some(input) = &cli.input {
        expand_input(input, &mut mc, &config, &mut report)?;
    }
    if cli.dump {
        report.dump = Some(mc.dump());
    }
    report.success = true;
    let processing_time = start_time.elapsed();

    write_output(&cli, &report)?;

    if cli.verbose && !cli.quiet {
        show_verbose_info(&cli, &mc, &report, processing_time);
    }

    Ok(())
}

/// Validate command-line arguments
fn validate_args(cli: &Cli) -> Result<()> {
    if cli.input.is_none() && cli.eval.is_empty() && !cli.dump {
        return Err(ArgumentError("Nothing to expand: give an input file, --eval or --dump".to_string()).into());
    }

    if let (Some(input), Some(output)) = (&cli.input, &cli.output)
        && output != Path::new("-")
        && std::fs::canonicalize(output).ok() == std::fs::canonicalize(input).ok()
    {
        return Err(ArgumentError(format!(
            "Input and output files cannot be the same: {}",
            output.display()
        ))
        .into());
    }

    if cli.recursion_limit == 0 {
        return Err(ArgumentError("Recursion limit must be greater than 0".to_string()).into());
    }
    if cli.capacity < 2 {
        return Err(ArgumentError("Capacity must be at least 2 bytes".to_string()).into());
    }

    Ok(())
}

/// Show dry run information
fn show_dry_run_info(cli: &Cli) {
    let input_display = cli.input.as_deref().map_or("nothing".to_string(), format_input);
    let output_display = cli
        .output
        .as_deref()
        .map_or("stdout".to_string(), format_output);

    eprintln!("Dry run: would expand {input_display} -> {output_display}");
    eprintln!("Recursion limit: {}", cli.recursion_limit);
    eprintln!("Buffer capacity: {}", cli.capacity);

    if let Some(list) = &cli.macros {
        eprintln!("Macro files: {list}");
    }
    for define in &cli.define {
        eprintln!("  -D {define}");
    }
    for name in &cli.undefine {
        eprintln!("  -U {name}");
    }
    for expr in &cli.eval {
        eprintln!("  -E {expr}");
    }

    #[cfg(feature = "json")]
    if cli.json {
        eprintln!("Output format: JSON");
    }
}

/// Fill the macro table from macro files and command line options
///
/// Returns the number of macro files read.
fn load_context(cli: &Cli, mc: &mut MacroContext) -> Result<usize> {
    let mut cli_mc = rpmmacro::cli_context();
    for define in &cli.define {
        rpmmacro::define_macro(&mut cli_mc, define, MacroLevel::CMDLINE)
            .map_err(|e| ArgumentError(format!("Invalid --define '{define}': {e}")))?;
    }

    let loaded = match &cli.macros {
        Some(list) => rpmmacro::init_macros(mc, list, Some(&*cli_mc)),
        None => {
            cli_mc.load_into(mc, MacroLevel::CMDLINE);
            0
        }
    };
    tracing::debug!(files = loaded, macros = mc.len(), "macro table ready");

    for name in &cli.undefine {
        mc.undefine(name);
    }
    Ok(loaded)
}

/// Create expansion configuration from CLI arguments
fn create_config(cli: &Cli) -> MacroConfig {
    let quiet = cli.quiet;
    MacroConfig::default()
        .with_recursion_limit(cli.recursion_limit)
        .with_capacity(cli.capacity)
        .with_trace(cli.trace)
        .with_verbose(cli.verbose)
        .with_message_handler(Rc::new(move |kind, message: &str| match kind {
            MessageKind::Echo if !quiet => eprintln!("{message}"),
            MessageKind::Warning if !quiet => eprintln!("{} {message}", "warning:".yellow().bold()),
            MessageKind::Trace | MessageKind::Dump => eprint!("{message}"),
            _ => {}
        }))
}

/// Expand an input file or stdin one logical line at a time
fn expand_input(
    input: &Path,
    mc: &mut MacroContext,
    config: &MacroConfig,
    report: &mut Report,
) -> Result<()> {
    let reader: Box<dyn BufRead> = if input == Path::new("-") {
        Box::new(std::io::stdin().lock())
    } else {
        let file = std::fs::File::open(input)
            .with_context(|| format!("Failed to read input file: {}", input.display()))?;
        Box::new(BufReader::new(file))
    };

    for (number, line) in LogicalLines::new(reader, true).enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", format_input(input)))?;
        let output = mc
            .expand_with(&line, config)
            .with_context(|| format!("{}:{}: failed to expand line", format_input(input), number + 1))?;
        report.results.push(Evaluation { source: line, output });
    }
    Ok(())
}

/// Write output to file or stdout
fn write_output(cli: &Cli, report: &Report) -> Result<()> {
    #[cfg(feature = "json")]
    if cli.json {
        return write_json_output(cli, report);
    }

    let mut content = String::new();
    for result in &report.results {
        content.push_str(&result.output);
        content.push('\n');
    }
    if let Some(dump) = &report.dump {
        content.push_str(dump);
    }

    match &cli.output {
        Some(output_path) if output_path != Path::new("-") => {
            std::fs::write(output_path, content).with_context(|| {
                format!("Failed to write to output file: {}", output_path.display())
            })?;
        }
        _ => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(content.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }

    Ok(())
}

/// Write JSON output
#[cfg(feature = "json")]
fn write_json_output(cli: &Cli, report: &Report) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match &cli.output {
        Some(output_path) if output_path != Path::new("-") => {
            std::fs::write(output_path, json + "\n").with_context(|| {
                format!("Failed to write to output file: {}", output_path.display())
            })?;
        }
        _ => println!("{json}"),
    }
    Ok(())
}

/// Show verbose information
fn show_verbose_info(
    cli: &Cli,
    mc: &MacroContext,
    report: &Report,
    processing_time: std::time::Duration,
) {
    eprintln!("Recursion limit: {}", cli.recursion_limit);
    eprintln!("Buffer capacity: {}", cli.capacity);
    eprintln!("Macro files loaded: {}", report.macro_files_loaded);
    eprintln!("Macros defined: {}", mc.len());
    eprintln!("Expansions: {}", report.results.len());
    eprintln!("Processing time: {processing_time:?}");

    let output_display = report.output_file.as_deref().unwrap_or("stdout");
    eprintln!("{} expanded -> {output_display}", "✓".green());
}

/// Format input path for display
fn format_input(path: &Path) -> String {
    if path == Path::new("-") {
        "stdin".to_string()
    } else {
        path.display().to_string()
    }
}

/// Format output path for display
fn format_output(path: &Path) -> String {
    if path == Path::new("-") {
        "stdout".to_string()
    } else {
        path.display().to_string()
    }
}
