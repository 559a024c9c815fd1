use std::path::Path;

use colored::Colorize;
use serde_json::json;

use crate::address;
use crate::cli::Cli;
use crate::dom::Document;
use crate::error::{Result, VeditError};

pub async fn run(cli: &Cli, file: &Path, addr: &str) -> Result<()> {
    let html = std::fs::read_to_string(file)?;
    let doc = Document::parse(&html);

    let id = address::resolve(&doc, addr)
        .ok_or_else(|| VeditError::AddressNotFound(addr.to_string()))?;

    let tag = doc.tag(id).unwrap_or_default().to_string();
    let text = doc.text_content(id).trim().to_string();
    let attributes = doc.attributes(id);

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "address": addr,
                "tag": tag,
                "text": text,
                "attributes": attributes,
            }))?
        );
    } else {
        println!("{} {}", "✓".green(), format!("<{}>", tag).cyan());
        println!("  address: {}", addr);
        if !text.is_empty() {
            println!("  text: {}", text);
        }
        for (name, value) in &attributes {
            println!("  {}=\"{}\"", name, value);
        }
    }

    Ok(())
}
