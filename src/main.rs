//! mdpane - Main Entry Point
//!
//! Renders a markdown file (or stdin) to HTML with the same pipeline the
//! preview pane uses.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use mdpane::config::{get_config_file_path, load_config, load_config_from, save_config};
use mdpane::export::{generate_html_document, title_from_path, write_html_file};
use mdpane::markdown::Pipeline;
use mdpane::Result;

/// Application name constant.
const APP_NAME: &str = "mdpane";

/// Render markdown with math and diagrams to HTML.
#[derive(Debug, Parser)]
#[command(name = "mdpane", version, about)]
struct Cli {
    /// Markdown file to render; reads stdin when omitted
    file: Option<PathBuf>,

    /// Write HTML here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Wrap the output in a complete HTML document with inlined CSS
    #[arg(short, long)]
    standalone: bool,

    /// Document title for --standalone (defaults to the file name)
    #[arg(long)]
    title: Option<String>,

    /// Settings file to use instead of the one in the config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings to the config directory and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("Starting {}", APP_NAME);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config(),
    };

    if cli.init_config {
        save_config(&settings)?;
        info!("Wrote settings to {}", get_config_file_path()?.display());
        return Ok(());
    }

    let markdown = read_input(cli.file.as_deref())?;

    let pipeline = Pipeline::from_settings(&settings);
    info!(
        "Rendering {} bytes with extensions [{}]",
        markdown.len(),
        pipeline.extension_names().join(", ")
    );
    let body = pipeline.render(&markdown).await?;

    let html = if cli.standalone {
        let title = cli
            .title
            .as_deref()
            .or_else(|| cli.file.as_deref().and_then(title_from_path));
        generate_html_document(&body, title)
    } else {
        body
    };

    match &cli.output {
        Some(path) => write_html_file(path, &html),
        None => {
            std::io::stdout().write_all(html.as_bytes())?;
            Ok(())
        }
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut markdown = String::new();
            std::io::stdin().read_to_string(&mut markdown)?;
            Ok(markdown)
        }
    }
}
