//! Relay supervisor: receiver subprocess lifecycle and the read loop.
//!
//! One logical task owns the subprocess, the dedup cache and the dispatch
//! chain; everything runs strictly sequentially, so nothing here is shared
//! across threads. The receiver is respawned with exponential backoff when
//! it exits; a single bad line never terminates the loop.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::relay::dedup::DedupCache;
use crate::relay::envelope::ReceivedEvent;
use crate::relay::sender::OutboundSender;
use crate::responder::Responder;

/// Restart backoff floor.
const BACKOFF_FLOOR: Duration = Duration::from_secs(1);
/// Re-check interval when the receiver's stdout hits end-of-stream while
/// the process still reports alive.
const EOF_RECHECK: Duration = Duration::from_millis(200);
/// Budget for draining pending stderr after the receiver exits.
const STDERR_DRAIN: Duration = Duration::from_millis(250);
/// Raw lines are clipped to this many bytes in logs.
const LOG_CLIP: usize = 500;

pub struct RelaySupervisor {
    cfg: RelayConfig,
    responder: Responder,
    sender: OutboundSender,
    seen: DedupCache,
}

impl RelaySupervisor {
    pub fn new(cfg: RelayConfig, responder: Responder, sender: OutboundSender) -> Self {
        let seen = DedupCache::new(cfg.dedup_capacity, cfg.dedup_ttl);
        Self {
            cfg,
            responder,
            sender,
            seen,
        }
    }

    /// Run the relay until `shutdown` flips.
    ///
    /// The receiver subprocess is killed best-effort on the way out; the
    /// loop does not wait for it to finish dying.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let recv_timeout = self.cfg.recv_timeout;
        let mut backoff = BACKOFF_FLOOR;

        self.startup_ping().await;

        loop {
            // starting
            let (mut child, mut lines, mut stderr) = match self.spawn_receiver() {
                Ok(spawned) => spawned,
                Err(e) => {
                    warn!(
                        error = %e,
                        wait_secs = backoff.as_secs(),
                        "receiver spawn failed, retrying"
                    );
                    if wait_or_shutdown(&mut shutdown, backoff).await {
                        return;
                    }
                    backoff = next_backoff(backoff, self.cfg.backoff_ceiling);
                    continue;
                }
            };
            let mut line_seen = false;

            // running
            let exit_code = loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("shutdown requested, stopping receiver");
                        let _ = child.start_kill();
                        return;
                    }
                    read = timeout(recv_timeout, lines.next_line()) => {
                        match read {
                            // idle past the receive timeout: health-check only
                            Err(_) => {
                                if let Ok(Some(status)) = child.try_wait() {
                                    break status.code();
                                }
                            }
                            Ok(Ok(Some(line))) => {
                                if !line_seen {
                                    // the spawn survived to its first line
                                    line_seen = true;
                                    backoff = BACKOFF_FLOOR;
                                }
                                self.handle_line(&line).await;
                            }
                            // end of stream: exited, or alive with a closed pipe
                            Ok(Ok(None)) | Ok(Err(_)) => match child.try_wait() {
                                Ok(Some(status)) => break status.code(),
                                Ok(None) => {
                                    if wait_or_shutdown(&mut shutdown, EOF_RECHECK).await {
                                        let _ = child.start_kill();
                                        return;
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "receiver status check failed");
                                    break None;
                                }
                            },
                        }
                    }
                }
            };

            // exited
            let errbuf = drain_stderr(&mut stderr).await;
            if !errbuf.is_empty() {
                warn!(stderr = %clip(&errbuf, LOG_CLIP), "receiver stderr");
            }
            warn!(
                code = ?exit_code,
                wait_secs = backoff.as_secs(),
                "receiver exited, restarting"
            );
            drop(child);

            if wait_or_shutdown(&mut shutdown, backoff).await {
                return;
            }
            backoff = next_backoff(backoff, self.cfg.backoff_ceiling);
        }
    }

    fn spawn_receiver(&self) -> std::io::Result<(Child, Lines<BufReader<ChildStdout>>, ChildStderr)> {
        info!(
            program = %self.cfg.signal_cli,
            number = %self.cfg.number,
            "spawning receiver"
        );
        let mut child = Command::new(&self.cfg.signal_cli)
            .arg("-u")
            .arg(&self.cfg.number)
            .arg("-o")
            .arg("json")
            .arg("receive")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("receiver stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("receiver stderr not captured"))?;
        Ok((child, BufReader::new(stdout).lines(), stderr))
    }

    /// Process one raw line. Every failure mode is absorbed here: a bad
    /// event is dropped and the loop continues.
    async fn handle_line(&mut self, line: &str) {
        let raw = line.trim();
        if raw.is_empty() {
            return;
        }
        debug!(line = %clip(raw, LOG_CLIP), "receiver line");

        let Some(event) = ReceivedEvent::parse(raw) else {
            debug!(line = %clip(raw, 120), "non-event line");
            return;
        };

        let id = event.message_id();
        if self.seen.contains(&id) {
            debug!(id = %id, "duplicate event");
            return;
        }
        self.seen.add(id);

        let body = event.message();

        // own traffic is logged for observability but never answered
        if event.is_from(&self.cfg.number) {
            match &body {
                Some(b) => info!(
                    kind = %b.kind,
                    group_id = ?b.group_id,
                    text = %b.text,
                    "own message echoed back"
                ),
                None => debug!("own protocol event"),
            }
            return;
        }

        let Some(body) = body else {
            // receipts, typing indicators and the like
            return;
        };
        info!(
            kind = %body.kind,
            source = %event.source(),
            group_id = ?body.group_id,
            sent_at = ?event.sent_at(),
            text = %body.text,
            "message received"
        );

        if !self.cfg.wildcard_group()
            && body.group_id.as_deref() != Some(self.cfg.group_id.as_str())
        {
            return;
        }
        if body.text.is_empty() {
            return;
        }

        let Some(reply) = self.responder.resolve(&body.text).await else {
            return;
        };

        let (recipient, group) = reply_target(
            &self.cfg.group_id,
            &self.cfg.number,
            event.source(),
            body.group_id.as_deref(),
        );
        if self.sender.send(recipient, &reply, group).await {
            info!("reply sent");
        } else {
            warn!("reply send failed");
        }
    }

    /// Informational ping so the channel shows the relay came up.
    async fn startup_ping(&self) {
        let group = (!self.cfg.wildcard_group()).then_some(self.cfg.group_id.as_str());
        let text = format!("✅ Online. Sende `{} hilfe`.", self.cfg.trigger);
        if !self.sender.send(&self.cfg.number, &text, group).await {
            warn!("startup ping failed");
        }
    }
}

/// Where a reply goes: the configured group when one is fixed; under the
/// wildcard, the message's own group, or directly back to its source.
fn reply_target<'a>(
    configured_group: &'a str,
    own_number: &'a str,
    source: &'a str,
    message_group: Option<&'a str>,
) -> (&'a str, Option<&'a str>) {
    if configured_group != crate::config::GROUP_WILDCARD {
        (own_number, Some(configured_group))
    } else if let Some(gid) = message_group {
        (own_number, Some(gid))
    } else {
        (source, None)
    }
}

/// Double the restart backoff, capped at the ceiling.
fn next_backoff(current: Duration, ceiling: Duration) -> Duration {
    (current * 2).min(ceiling)
}

/// Sleep for `dur`, returning true if shutdown flipped first.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, dur: Duration) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(dur) => false,
    }
}

async fn drain_stderr(stderr: &mut ChildStderr) -> String {
    let mut buf = vec![0u8; 4096];
    match timeout(STDERR_DRAIN, stderr.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => String::from_utf8_lossy(&buf[..n]).trim().to_string(),
        _ => String::new(),
    }
}

/// Clip to at most `max` bytes on a char boundary.
fn clip(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
