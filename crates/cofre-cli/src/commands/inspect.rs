//! Inspect command: sniff format, dialect, encoding and institution

use std::path::Path;

use anyhow::Result;

use cofre_core::{detect_format, detect_institution, FormatKind};

use super::load_statement;

pub fn cmd_inspect(file: &Path) -> Result<()> {
    let (content, encoding) = load_statement(file)?;
    let format = detect_format(&content);
    let institution = detect_institution(&content);

    println!("File: {}", file.display());
    println!(
        "Format: {} (confidence {:.2})",
        format.kind, format.confidence
    );
    println!("Encoding: {}", encoding);

    if format.kind == FormatKind::Delimited {
        if let Some(sep) = format.separator {
            let shown = match sep {
                '\t' => "\\t".to_string(),
                c => c.to_string(),
            };
            println!("Separator: {}", shown);
        }
        match &format.header {
            Some(header) => println!("Header: {}", header.join(" | ")),
            None => println!("Header: none detected"),
        }
    }

    match institution {
        Some(inst) => println!("Institution: {}", inst),
        None => println!("Institution: unknown"),
    }

    Ok(())
}
