//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `migrate` | Stage a legacy JSONL export, break cycles, write creation-ordered JSONL |
//! | `markup` | Rebuild nested markup for one annotated text |
//! | `linearize` | Show the edits that make one reference kind acyclic |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output, including library logs:
//! ```bash
//! archive-bridge --verbose migrate export.jsonl --output staged.jsonl
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod migrate;
mod markup;
mod linearize;

pub use app::{run, Cli, Commands, TieBreakArg};
pub use output::{Output, OutputFormat};
