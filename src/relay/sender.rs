//! Outbound send via the external send command, with bounded retry.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

/// Invokes the external send command.
///
/// Retries a fixed number of times with a constant delay between attempts;
/// unlike the supervisor's restart backoff, the delay never grows.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    program: String,
    number: String,
    retries: u32,
    wait: Duration,
}

impl OutboundSender {
    pub fn new(
        program: impl Into<String>,
        number: impl Into<String>,
        retries: u32,
        wait: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            number: number.into(),
            retries: retries.max(1),
            wait,
        }
    }

    /// Send `text` into a group, or directly to `recipient` when no group
    /// id is supplied. Returns `true` on the first zero-exit attempt.
    pub async fn send(&self, recipient: &str, text: &str, group_id: Option<&str>) -> bool {
        for attempt in 1..=self.retries {
            match self.invoke(recipient, text, group_id).await {
                Ok((0, _)) => {
                    debug!(attempt, "message sent");
                    return true;
                }
                Ok((code, stderr)) => {
                    warn!(attempt, code, stderr = %stderr.trim(), "send attempt failed");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "send command could not run");
                }
            }
            if attempt < self.retries {
                tokio::time::sleep(self.wait).await;
            }
        }
        false
    }

    async fn invoke(
        &self,
        recipient: &str,
        text: &str,
        group_id: Option<&str>,
    ) -> std::io::Result<(i32, String)> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-u").arg(&self.number).arg("send");
        match group_id {
            Some(gid) => {
                cmd.arg("-g").arg(gid);
            }
            None => {
                cmd.arg(recipient);
            }
        }
        cmd.arg("-m").arg(text);

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok((
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }
}
