//! Markup command

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::output::Output;
use crate::domain::{AnnotatedText, TextAttributes, TieBreak};

/// A rich-text value as found in legacy exports
#[derive(Deserialize)]
struct LegacyText {
    utf8str: String,
    #[serde(default)]
    textattr: Option<TextAttributes>,
}

/// Reconstructs markup from `{"text", "ranges"}` or legacy `{"utf8str", "textattr"}`
pub fn run(output: &Output, file: Option<&Path>, tie_break: TieBreak) -> Result<()> {
    let content = match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let value: serde_json::Value =
        serde_json::from_str(&content).context("Input is not valid JSON")?;

    let text = if value.get("utf8str").is_some() {
        output.verbose_ctx("markup", "Reading legacy textattr input");
        let legacy: LegacyText =
            serde_json::from_value(value).context("Invalid legacy rich-text value")?;
        let attributes = match &legacy.textattr {
            Some(attributes) => attributes.decode()?,
            None => Default::default(),
        };
        AnnotatedText::from_legacy(legacy.utf8str, &attributes)?
    } else {
        serde_json::from_value::<AnnotatedText>(value).context("Invalid annotated text")?
    };

    output.verbose_ctx(
        "markup",
        &format!("{} ranges, tie_break={:?}", text.ranges.len(), tie_break),
    );

    let result = text.reconstruct(tie_break)?;

    if output.is_json() {
        output.data(&result);
    } else {
        println!("{}", result.markup);
    }

    Ok(())
}
