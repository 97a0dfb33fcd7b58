//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::output::{Output, OutputFormat};
use super::{linearize, markup, migrate};
use crate::domain::{LinearizeConfig, ReferenceKind, TieBreak};
use crate::storage::Config;

#[derive(Parser)]
#[command(name = "archive-bridge")]
#[command(author, version, about = "Migrates legacy archive records: rebuilds standoff markup and breaks reference cycles")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ./archive-bridge.toml, then the user config dir)
    #[arg(long, short = 'c', global = true, env = "ARCHIVE_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stage a legacy JSONL export, break reference cycles and write the result
    Migrate {
        /// Legacy records, one JSON object per line
        input: PathBuf,

        /// Where to write staged records (JSONL, creation order)
        #[arg(long, short)]
        output: PathBuf,

        /// Where to write the full migration report (JSON)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Reference kind to linearize (repeatable; default: every kind present)
        #[arg(long = "kind")]
        kinds: Vec<ReferenceKind>,

        /// Reversal search depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Ordering rule for annotations sharing an offset
        #[arg(long)]
        tie_break: Option<TieBreakArg>,
    },

    /// Rebuild nested markup for one annotated text
    Markup {
        /// JSON file with `text` and `ranges` (reads stdin if omitted)
        file: Option<PathBuf>,

        /// Ordering rule for annotations sharing an offset
        #[arg(long)]
        tie_break: Option<TieBreakArg>,
    },

    /// Compute the edits that make one reference kind acyclic
    Linearize {
        /// Reference graph as JSON: {"<id>": {"<kind>": ["<target>", ...]}}
        graph: PathBuf,

        /// Reference kind to linearize
        #[arg(long)]
        kind: ReferenceKind,

        /// Reversal search depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Feasibility pass cap
        #[arg(long)]
        max_passes: Option<usize>,
    },
}

/// Command-line spelling of [`TieBreak`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TieBreakArg {
    Nesting,
    Supplied,
}

impl From<TieBreakArg> for TieBreak {
    fn from(arg: TieBreakArg) -> Self {
        match arg {
            TieBreakArg::Nesting => TieBreak::Nesting,
            TieBreakArg::Supplied => TieBreak::Supplied,
        }
    }
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = Output::new(cli.format, cli.verbose);

    output.verbose("archive-bridge starting");

    let mut config = Config::load(cli.config.as_deref())?;
    match &config.source {
        Some(path) => output.verbose_ctx("config", &format!("Loaded {}", path.display())),
        None => output.verbose_ctx("config", "No config file found, using defaults"),
    }

    match cli.command {
        Commands::Migrate {
            input,
            output: out_path,
            report,
            kinds,
            max_depth,
            tie_break,
        } => {
            if !kinds.is_empty() {
                config.linearize.kinds = kinds;
            }
            if let Some(depth) = max_depth {
                config.linearize.max_depth = depth;
            }
            if let Some(tie_break) = tie_break {
                config.markup.tie_break = tie_break.into();
            }
            config.validate()?;
            migrate::run(&output, &input, &out_path, report.as_deref(), config.migration())?
        }

        Commands::Markup { file, tie_break } => {
            let tie_break = tie_break.map_or(config.markup.tie_break, TieBreak::from);
            markup::run(&output, file.as_deref(), tie_break)?
        }

        Commands::Linearize {
            graph,
            kind,
            max_depth,
            max_passes,
        } => {
            if let Some(depth) = max_depth {
                config.linearize.max_depth = depth;
            }
            if let Some(passes) = max_passes {
                config.linearize.max_passes = passes;
            }
            config.validate()?;
            let settings = LinearizeConfig::new(kind)
                .with_max_depth(config.linearize.max_depth)
                .with_max_passes(config.linearize.max_passes);
            linearize::run(&output, &graph, &settings)?
        }
    }

    output.verbose("Command completed successfully");
    Ok(())
}

/// Sends library `tracing` events to stderr
///
/// `RUST_LOG` wins when set; otherwise `warn`, or `debug` with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "archive_bridge=debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default.into());

    // A subscriber may already be installed when embedded
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_kinds() {
        let cli = Cli::try_parse_from([
            "archive-bridge",
            "migrate",
            "in.jsonl",
            "--output",
            "out.jsonl",
            "--kind",
            "hasLinkTo",
            "--kind",
            "partOf",
            "--tie-break",
            "supplied",
        ])
        .unwrap();

        match cli.command {
            Commands::Migrate {
                kinds, tie_break, ..
            } => {
                assert_eq!(kinds.len(), 2);
                assert_eq!(tie_break, Some(TieBreakArg::Supplied));
            }
            _ => panic!("expected migrate"),
        }
    }

    #[test]
    fn rejects_blank_kind() {
        let result = Cli::try_parse_from(["archive-bridge", "linearize", "g.json", "--kind", " "]);
        assert!(result.is_err());
    }
}
