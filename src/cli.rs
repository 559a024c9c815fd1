use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands;
use crate::error::Result;

/// Vedit CLI - point-and-click editing for rendered pages
#[derive(Parser)]
#[command(name = "vedit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List addressable elements in an HTML file
    Inspect {
        /// HTML file to inspect
        file: PathBuf,
    },

    /// Resolve an element address against an HTML file
    Resolve {
        /// HTML file to resolve against
        file: PathBuf,

        /// Element address (id form or structural path)
        address: String,
    },

    /// Apply a text or attribute edit through the editor loop
    Edit {
        /// HTML file to edit
        file: PathBuf,

        /// Element address to edit
        #[arg(short, long)]
        address: String,

        /// Replace the element's text content
        #[arg(long, conflicts_with = "attr")]
        text: Option<String>,

        /// Set an attribute as name=value (empty value removes it)
        #[arg(long)]
        attr: Option<String>,

        /// Write the result here instead of back to the input file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show the configuration file path
    Path,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Inspect { file } => commands::inspect::run(self, file).await,
            Commands::Resolve { file, address } => {
                commands::resolve::run(self, file, address).await
            }
            Commands::Edit {
                file,
                address,
                text,
                attr,
                output,
            } => {
                commands::edit::run(
                    self,
                    file,
                    address,
                    text.as_deref(),
                    attr.as_deref(),
                    output.as_deref(),
                )
                .await
            }
            Commands::Config { command } => commands::config::run(self, command).await,
        }
    }
}
