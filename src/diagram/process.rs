//! Piped child process runner shared by the process-backed renderers.

use std::process::Stdio;
use std::time::{Duration, Instant};

use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Run `program` with `args`, feed `input` on stdin and return the SVG it
/// prints on stdout.
///
/// The child is killed if the call times out or the returned future is
/// dropped. Anything before the `<svg` element (XML declarations, banners)
/// is stripped.
///
/// # Errors
///
/// - [`Error::DiagramTimeout`] if the process does not finish within `timeout`
/// - [`Error::DiagramResolution`] if it cannot be spawned, exits unsuccessfully,
///   prints non-UTF-8 output, or prints no `<svg` element
pub(crate) async fn run_piped(
    language: &'static str,
    program: &str,
    args: &[String],
    input: &str,
    timeout: Duration,
) -> Result<String> {
    debug!("Spawning {} renderer: {} {:?}", language, program, args);
    let started = Instant::now();

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::DiagramResolution {
            language,
            message: format!("failed to start '{}'", program),
            source: Some(Box::new(e)),
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::diagram(language, "child stdin is not available"))?;
    let input = input.to_owned();

    let write = async move {
        stdin.write_all(input.as_bytes()).await?;
        stdin.shutdown().await
    };

    let run = async move { tokio::join!(write, child.wait_with_output()) };

    let (written, output) = tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| Error::DiagramTimeout { language, timeout })?;

    let output = output.map_err(|e| Error::DiagramResolution {
        language,
        message: format!("failed to wait for '{}'", program),
        source: Some(Box::new(e)),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        let message = if detail.is_empty() {
            format!("'{}' exited with {}", program, output.status)
        } else {
            format!("'{}' exited with {}: {}", program, output.status, detail)
        };
        return Err(Error::diagram(language, message));
    }

    // A successful exit after a failed write means the input never fully arrived.
    written.map_err(|e| Error::DiagramResolution {
        language,
        message: format!("failed to write diagram source to '{}'", program),
        source: Some(Box::new(e)),
    })?;

    let stdout = String::from_utf8(output.stdout).map_err(|e| Error::DiagramResolution {
        language,
        message: "renderer output is not valid UTF-8".to_string(),
        source: Some(Box::new(e)),
    })?;

    let start = stdout
        .find("<svg")
        .ok_or_else(|| Error::diagram(language, "renderer output contains no <svg> element"))?;

    debug!(
        "{} renderer finished in {} ms ({} bytes)",
        language,
        started.elapsed().as_millis(),
        stdout.len()
    );

    Ok(stdout[start..].trim_end().to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
