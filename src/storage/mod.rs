//! # Storage Layer
//!
//! File formats read and written by archive-bridge.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Legacy records | JSONL (one JSON per line) | migration input |
//! | Staged records | JSONL, in creation order | `--output` |
//! | Migration report | Pretty JSON | `--report` |
//! | Config | TOML | `archive-bridge.toml` or platform config dir |
//!
//! ## Concurrency Safety
//!
//! - [`RecordStore`] takes a shared `fs2` lock while reading
//! - All writes are atomic (temp file + rename) under an exclusive lock
//!
//! ## Key Types
//!
//! - [`RecordStore`] - Read/write records as JSONL
//! - [`Config`] - Linearizer and markup settings

mod jsonl;
mod config;

pub use jsonl::{write_json_file, RecordStore};
pub use config::{Config, ConfigError, LinearizeSettings, MarkupSettings, LOCAL_CONFIG_FILE};
