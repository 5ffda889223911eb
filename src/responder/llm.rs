//! Generative-fallback collaborator: local model invocation via the
//! ollama CLI.
//!
//! The invocation is bounded by a hard wall-clock timeout; an overrunning
//! child is killed, never awaited past its budget.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::LlmError;

/// The narrow seam the resolver consumes.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Runs `ollama run <model>` with the composed prompt on stdin.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    program: String,
    model: String,
    timeout: Duration,
    max_tokens: u32,
    system_prompt: String,
}

impl OllamaGenerator {
    pub fn new(
        model: impl Into<String>,
        timeout: Duration,
        max_tokens: u32,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            program: "ollama".to_string(),
            model: model.into(),
            timeout,
            max_tokens,
            system_prompt: system_prompt.into(),
        }
    }

    /// Override the program name (tests substitute a stub executable).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    // The CLI has no token-cap flag, so the budget rides along as a
    // brevity instruction.
    fn compose(&self, prompt: &str) -> String {
        format!(
            "{}\nKeep the answer under about {} tokens.\n\nUser: {}\nAssistant:",
            self.system_prompt, self.max_tokens, prompt
        )
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(model = %self.model, "invoking generative fallback");

        let mut child = Command::new(&self.program)
            .arg("run")
            .arg(&self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(LlmError::Io)?;

        let composed = self.compose(prompt);
        let run = async {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(composed.as_bytes()).await?;
                // closing stdin signals end of prompt
                drop(stdin);
            }
            child.wait_with_output().await
        };

        // On timeout the dropped child is killed via kill_on_drop.
        let output = match tokio::time::timeout(self.timeout, run).await {
            Err(_) => {
                return Err(LlmError::Timeout {
                    timeout: self.timeout,
                })
            }
            Ok(Err(e)) => return Err(LlmError::Io(e)),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            return Err(LlmError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if text.is_empty() { "…".to_string() } else { text })
    }
}
