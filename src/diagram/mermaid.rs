//! Mermaid backend through the mermaid-cli (`mmdc`) tool.
//!
//! Hosts that embed a Mermaid engine in-process implement
//! [`DiagramRenderer`] themselves and skip this backend.

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use super::process::run_piped;
use super::DiagramRenderer;
use crate::config::MermaidSettings;
use crate::error::Result;

const LANGUAGE: &str = "mermaid";

/// Renders Mermaid sources with `mmdc`, reading stdin and writing SVG to stdout.
#[derive(Debug, Clone)]
pub struct MermaidCli {
    command: String,
    timeout: Duration,
}

impl MermaidCli {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &MermaidSettings) -> Self {
        Self::new(
            settings.command.clone(),
            Duration::from_millis(settings.timeout_ms),
        )
    }

    fn args(target_id: &str) -> Vec<String> {
        [
            "--input",
            "-",
            "--output",
            "-",
            "--outputFormat",
            "svg",
            "--svgId",
            target_id,
            "--quiet",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
    }
}

impl DiagramRenderer for MermaidCli {
    fn language(&self) -> &'static str {
        LANGUAGE
    }

    fn render<'a>(&'a self, target_id: &'a str, source: &'a str) -> BoxFuture<'a, Result<String>> {
        async move {
            run_piped(
                LANGUAGE,
                &self.command,
                &Self::args(target_id),
                source,
                self.timeout,
            )
            .await
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_carry_target_id() {
        let args = MermaidCli::args("mermaid-3");
        let pos = args.iter().position(|a| a == "--svgId").unwrap();
        assert_eq!(args[pos + 1], "mermaid-3");
        assert!(args.contains(&"svg".to_string()));
    }

    #[test]
    fn test_from_settings() {
        let cli = MermaidCli::from_settings(&MermaidSettings::default());
        assert_eq!(cli.command, "mmdc");
        assert_eq!(cli.timeout, Duration::from_millis(10_000));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_command_surfaces_as_error() {
        let cli = MermaidCli::new("mdpane-missing-mmdc", Duration::from_secs(1));
        let err = cli.render("mermaid-0", "graph TD; A-->B").await.unwrap_err();
        assert!(err.is_diagram_failure());
        assert!(err.to_string().contains("mermaid"));
    }
}
