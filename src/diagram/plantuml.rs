//! PlantUML backend: one `java -jar plantuml.jar -pipe -tsvg` process per diagram.

use std::path::PathBuf;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use super::process::run_piped;
use super::DiagramRenderer;
use crate::config::PlantUmlSettings;
use crate::error::Result;

const LANGUAGE: &str = "plantuml";

/// Renders PlantUML sources by piping them through the PlantUML jar.
#[derive(Debug, Clone)]
pub struct PlantUmlProcess {
    java: String,
    jar: PathBuf,
    timeout: Duration,
}

impl PlantUmlProcess {
    pub fn new(java: impl Into<String>, jar: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            java: java.into(),
            jar: jar.into(),
            timeout,
        }
    }

    /// Build from settings; `None` when no jar is configured.
    pub fn from_settings(settings: &PlantUmlSettings) -> Option<Self> {
        settings.jar_path.as_ref().map(|jar| {
            Self::new(
                settings.java_path.clone(),
                jar.clone(),
                Duration::from_millis(settings.timeout_ms),
            )
        })
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-jar".to_string(),
            self.jar.display().to_string(),
            "-pipe".to_string(),
            "-tsvg".to_string(),
            "-charset".to_string(),
            "UTF-8".to_string(),
        ]
    }
}

/// PlantUML's pipe mode needs the `@start`/`@end` markers; add them to bare bodies.
fn with_markers(source: &str) -> String {
    if source.trim_start().starts_with("@start") {
        source.to_string()
    } else {
        format!("@startuml\n{}\n@enduml\n", source.trim_end())
    }
}

impl DiagramRenderer for PlantUmlProcess {
    fn language(&self) -> &'static str {
        LANGUAGE
    }

    fn render<'a>(&'a self, _target_id: &'a str, source: &'a str) -> BoxFuture<'a, Result<String>> {
        async move {
            let input = with_markers(source);
            run_piped(LANGUAGE, &self.java, &self.args(), &input, self.timeout).await
        }
        .boxed()
    }
}
