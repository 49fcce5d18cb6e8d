//! Command implementations

mod classify;
mod import;
mod inspect;

pub use classify::{cmd_classify, ClassifyArgs};
pub use import::cmd_import;
pub use inspect::cmd_inspect;

use std::path::Path;

use anyhow::{bail, Context, Result};

use cofre_core::{
    decode_bytes, parse_auto, parse_delimited, parse_statement, FieldLayout, Institution,
    ParseOutcome, TextEncoding,
};

/// Read a statement file, decoding legacy encodings
pub(crate) fn load_statement(path: &Path) -> Result<(String, TextEncoding)> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(decode_bytes(&bytes))
}

/// Parse a statement, resolving the adapter in priority order:
/// explicit layout > named institution > auto-detection.
pub(crate) fn parse_with_options(
    content: &str,
    institution: Option<&str>,
    layout: Option<&FieldLayout>,
) -> Result<ParseOutcome> {
    if let Some(layout) = layout {
        return Ok(parse_delimited(content, layout));
    }

    if let Some(name) = institution {
        let institution: Institution = name.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        return Ok(parse_statement(content, institution));
    }

    parse_auto(content).context("pass --institution or --layout for this file")
}

/// Load a custom field layout from a JSON file
pub(crate) fn load_layout(path: &Path) -> Result<FieldLayout> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let layout: FieldLayout = serde_json::from_str(&text)
        .with_context(|| format!("invalid layout {}", path.display()))?;
    if layout.columns.date == layout.columns.amount {
        bail!("layout maps date and amount to the same column");
    }
    Ok(layout)
}
