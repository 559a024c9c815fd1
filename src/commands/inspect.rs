use std::path::Path;

use colored::Colorize;
use serde_json::json;

use crate::address;
use crate::cli::Cli;
use crate::dom::Document;
use crate::error::Result;

const TEXT_PREVIEW: usize = 40;

pub async fn run(cli: &Cli, file: &Path) -> Result<()> {
    let html = std::fs::read_to_string(file)?;
    let doc = Document::parse(&html);

    let mut rows = Vec::new();
    for id in doc.elements() {
        // only the body subtree is addressable
        if id != doc.body() && !doc.is_descendant_of(id, doc.body()) {
            continue;
        }
        let addr = address::compute(&doc, id);
        if addr.is_empty() {
            continue;
        }
        let tag = doc.tag(id).unwrap_or_default().to_string();
        let text: String = doc.text_content(id).trim().chars().take(TEXT_PREVIEW).collect();
        rows.push((addr, tag, text));
    }

    if cli.json {
        let elements: Vec<_> = rows
            .iter()
            .map(|(addr, tag, text)| {
                json!({
                    "address": addr,
                    "tag": tag,
                    "text": text,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "elements": elements }))?);
    } else {
        for (addr, tag, text) in &rows {
            if text.is_empty() {
                println!("{:<40} {}", addr, tag.cyan());
            } else {
                println!("{:<40} {} {}", addr, tag.cyan(), text.dimmed());
            }
        }
        println!("\n{} {} addressable elements", "✓".green(), rows.len());
    }

    Ok(())
}
