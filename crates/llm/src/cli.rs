//! Text generation through a local command-line tool.
//!
//! The prompt is written to the child's stdin (long prompts do not fit in
//! argv) and stdout is the completion. The child is killed if it outlives
//! the timeout.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use storyboard_core::generation::{GenerationError, TextProvider};

/// Per-stream capture cap (4 MiB).
const MAX_OUTPUT_BYTES: u64 = 4 * 1024 * 1024;

/// Stderr included in failure messages is cut to this many chars.
const MAX_ERROR_CHARS: usize = 500;

/// Arguments telling the default CLI to read the prompt from stdin and
/// print plain text.
pub const DEFAULT_CLI_ARGS: &[&str] = &["-p", "-", "--output-format", "text"];

pub struct CliProvider {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CliProvider {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self::with_args(
            command,
            DEFAULT_CLI_ARGS.iter().map(|a| a.to_string()).collect(),
            timeout,
        )
    }

    pub fn with_args(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl TextProvider for CliProvider {
    fn name(&self) -> &str {
        &self.command
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GenerationError::NotConfigured(format!(
                    "'{}' not found; install it or set LLM_CLI_COMMAND",
                    self.command
                ))
            } else {
                GenerationError::Io(e)
            }
        })?;

        // Drain the output pipes before feeding stdin so a child that
        // writes while still reading cannot deadlock against us.
        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));
        let stdin_task = child.stdin.take().map(|mut stdin| {
            let input = prompt.as_bytes().to_vec();
            tokio::spawn(async move {
                // The child may exit without reading everything.
                let _ = stdin.write_all(&input).await;
            })
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(GenerationError::Io(e)),
            Err(_) => {
                if let Some(task) = &stdin_task {
                    task.abort();
                }
                tracing::warn!(command = %self.command, timeout = ?self.timeout, "Text CLI timed out");
                return Err(GenerationError::Timeout(self.timeout));
            }
        };
        if let Some(task) = stdin_task {
            let _ = task.await;
        }

        let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();

        if !status.success() {
            let detail: String = stderr.trim().chars().take(MAX_ERROR_CHARS).collect();
            return Err(GenerationError::Failed(format!(
                "'{}' exited with {}: {detail}",
                self.command,
                status.code().map_or_else(|| "signal".to_string(), |c| c.to_string())
            )));
        }

        let output = stdout.trim().to_string();
        if output.is_empty() {
            return Err(GenerationError::Failed(format!(
                "'{}' returned no output",
                self.command
            )));
        }

        tracing::debug!(
            command = %self.command,
            prompt_chars = prompt.chars().count(),
            output_chars = output.chars().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Text CLI completed"
        );
        Ok(output)
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn sh(script: &str, timeout: Duration) -> CliProvider {
        CliProvider::with_args("sh", vec!["-c".into(), script.into()], timeout)
    }

    #[tokio::test]
    async fn prompt_goes_through_stdin() {
        let provider = CliProvider::with_args("cat", Vec::new(), Duration::from_secs(5));
        let out = provider.generate("  分镜 JSON  \n").await.unwrap();
        assert_eq!(out, "分镜 JSON");
    }

    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let provider = sh("echo 'quota exceeded' >&2; exit 3", Duration::from_secs(5));
        let err = provider.generate("x").await.unwrap_err();
        assert_matches!(&err, GenerationError::Failed(msg) if msg.contains("quota exceeded") && msg.contains('3'));
    }

    #[tokio::test]
    async fn empty_output_is_failure() {
        let provider = sh("true", Duration::from_secs(5));
        assert_matches!(provider.generate("x").await, Err(GenerationError::Failed(_)));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let provider = sh("sleep 5", Duration::from_millis(100));
        assert_matches!(provider.generate("x").await, Err(GenerationError::Timeout(_)));
    }

    #[tokio::test]
    async fn large_prompt_with_early_output_completes() {
        // Writes more than a pipe buffer before reading its input.
        let provider = sh(
            "head -c 200000 /dev/zero | tr '\\0' a; cat > /dev/null",
            Duration::from_secs(10),
        );
        let prompt = "分".repeat(400_000);
        let out = provider.generate(&prompt).await.unwrap();
        assert_eq!(out.len(), 200_000);
    }

    #[tokio::test]
    async fn timeout_applies_while_stdin_is_blocked() {
        let provider = sh("sleep 5", Duration::from_millis(200));
        let prompt = "x".repeat(1_000_000);
        let started = Instant::now();
        assert_matches!(provider.generate(&prompt).await, Err(GenerationError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_binary_is_not_configured() {
        let provider = CliProvider::new("definitely-not-a-real-binary-xyz", Duration::from_secs(1));
        assert_matches!(
            provider.generate("x").await,
            Err(GenerationError::NotConfigured(_))
        );
    }
}
