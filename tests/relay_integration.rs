//! End-to-end relay test against a stub signal-cli.
//!
//! One shell script stands in for the external command: its `receive`
//! branch emits fixture lines on stdout, every other invocation records
//! its argv to a log. The supervisor is driven through dedup, the
//! self-filter, the group filter, fixed resolution and shutdown.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use signal_relay::config::RelayConfig;
use signal_relay::relay::{OutboundSender, RelaySupervisor};
use signal_relay::responder::{FixedResponses, OllamaGenerator, Responder};

struct Stub {
    dir: tempfile::TempDir,
    program: PathBuf,
    sendlog: PathBuf,
    spawnlog: PathBuf,
}

/// Write the stub executable. `after_fixture` runs once the receive branch
/// has emitted its lines ("sleep 30" to park, "exit 1" to crash).
fn write_stub(fixture_lines: &str, after_fixture: &str) -> Stub {
    let dir = tempfile::tempdir().unwrap();
    let fixture = dir.path().join("fixture.jsonl");
    std::fs::write(&fixture, fixture_lines).unwrap();

    let sendlog = dir.path().join("send.log");
    let spawnlog = dir.path().join("spawn.log");
    let program = dir.path().join("signal-stub.sh");

    let script = format!(
        "#!/bin/sh\n\
         case \"$*\" in\n\
           *receive*)\n\
             echo spawn >> {spawnlog}\n\
             cat {fixture}\n\
             {after_fixture}\n\
             ;;\n\
           *)\n\
             echo \"$@\" >> {sendlog}\n\
             ;;\n\
         esac\n",
        spawnlog = spawnlog.display(),
        fixture = fixture.display(),
        sendlog = sendlog.display(),
    );
    std::fs::write(&program, script).unwrap();
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

    Stub {
        dir,
        program,
        sendlog,
        spawnlog,
    }
}

fn test_config(stub: &Stub, group_id: &str, fixed_file: &Path) -> RelayConfig {
    RelayConfig {
        number: "+49OWN".to_string(),
        group_id: group_id.to_string(),
        signal_cli: stub.program.to_str().unwrap().to_string(),
        fixed_file: fixed_file.to_path_buf(),
        send_retry: 1,
        send_retry_wait: Duration::from_millis(10),
        recv_timeout: Duration::from_secs(1),
        backoff_ceiling: Duration::from_secs(2),
        dedup_capacity: 64,
        dedup_ttl: Duration::from_secs(3600),
        ..RelayConfig::default()
    }
}

fn build_supervisor(cfg: RelayConfig) -> RelaySupervisor {
    let fixed = FixedResponses::load(&cfg.fixed_file).unwrap();
    let llm = OllamaGenerator::new(
        cfg.llm_model.clone(),
        cfg.llm_timeout,
        cfg.llm_max_tokens,
        cfg.system_prompt.clone(),
    );
    let responder = Responder::new(
        cfg.trigger.clone(),
        cfg.fallback.clone(),
        cfg.use_llm,
        fixed,
        Box::new(llm),
    );
    let sender = OutboundSender::new(
        cfg.signal_cli.clone(),
        cfg.number.clone(),
        cfg.send_retry,
        cfg.send_retry_wait,
    );
    RelaySupervisor::new(cfg, responder, sender)
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(String::from)
        .collect()
}

/// Poll `path` until it holds at least `n` lines or the deadline passes.
async fn wait_for_lines(path: &Path, n: usize) -> Vec<String> {
    for _ in 0..100 {
        let lines = read_lines(path);
        if lines.len() >= n {
            return lines;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    read_lines(path)
}

fn write_corpus(dir: &Path) -> PathBuf {
    let path = dir.join("responses.json");
    std::fs::write(&path, r#"{"hilfe": "Hier steht die Hilfe."}"#).unwrap();
    path
}

#[tokio::test]
async fn relays_a_triggered_group_message_exactly_once() {
    let fixture = concat!(
        // the message, then its redelivered duplicate
        r#"{"envelope":{"dataMessage":{"message":"!Bot hilfe","groupInfo":{"groupId":"G1"}},"source":"+49111","timestamp":1}}"#, "\n",
        r#"{"envelope":{"dataMessage":{"message":"!Bot hilfe","groupInfo":{"groupId":"G1"}},"source":"+49111","timestamp":1}}"#, "\n",
        // our own message echoed back
        r#"{"envelope":{"dataMessage":{"message":"!Bot hilfe","groupInfo":{"groupId":"G1"}},"source":"+49OWN","timestamp":2}}"#, "\n",
        // wrong group
        r#"{"envelope":{"dataMessage":{"message":"!Bot hilfe","groupInfo":{"groupId":"G2"}},"source":"+49111","timestamp":3}}"#, "\n",
        // noise
        "this is not json\n",
        // right group but not bot-directed
        r#"{"envelope":{"dataMessage":{"message":"hello there","groupInfo":{"groupId":"G1"}},"source":"+49111","timestamp":4}}"#, "\n",
    );
    let stub = write_stub(fixture, "sleep 30");
    let corpus = write_corpus(stub.dir.path());
    let cfg = test_config(&stub, "G1", &corpus);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn({
        let mut supervisor = build_supervisor(cfg);
        async move { supervisor.run(shutdown_rx).await }
    });

    // startup ping + exactly one reply
    let lines = wait_for_lines(&stub.sendlog, 2).await;
    assert_eq!(lines.len(), 2, "sendlog: {lines:?}");
    assert_eq!(lines[0], "-u +49OWN send -g G1 -m ✅ Online. Sende `!Bot hilfe`.");
    assert_eq!(lines[1], "-u +49OWN send -g G1 -m Hier steht die Hilfe.");

    // give the remaining fixture lines time to prove they stay silent
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(read_lines(&stub.sendlog).len(), 2);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor did not shut down")
        .unwrap();
}

#[tokio::test]
async fn wildcard_group_answers_direct_messages_at_their_source() {
    let fixture = concat!(
        r#"{"envelope":{"dataMessage":{"message":"!Bot hilfe"},"source":"+49222","timestamp":10}}"#,
        "\n",
    );
    let stub = write_stub(fixture, "sleep 30");
    let corpus = write_corpus(stub.dir.path());
    let cfg = test_config(&stub, "*", &corpus);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn({
        let mut supervisor = build_supervisor(cfg);
        async move { supervisor.run(shutdown_rx).await }
    });

    let lines = wait_for_lines(&stub.sendlog, 2).await;
    assert_eq!(lines.len(), 2, "sendlog: {lines:?}");
    // wildcard: the ping goes directly to our own number
    assert_eq!(lines[0], "-u +49OWN send +49OWN -m ✅ Online. Sende `!Bot hilfe`.");
    // and a direct message is answered at its source
    assert_eq!(lines[1], "-u +49OWN send +49222 -m Hier steht die Hilfe.");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor did not shut down")
        .unwrap();
}

#[tokio::test]
async fn crashed_receiver_is_respawned_with_backoff() {
    let stub = write_stub("", "exit 1");
    let corpus = write_corpus(stub.dir.path());
    let cfg = test_config(&stub, "G1", &corpus);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn({
        let mut supervisor = build_supervisor(cfg);
        async move { supervisor.run(shutdown_rx).await }
    });

    // first spawn immediately, second after the 1s floor
    let spawns = wait_for_lines(&stub.spawnlog, 2).await;
    assert!(spawns.len() >= 2, "spawnlog: {spawns:?}");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor did not shut down")
        .unwrap();
}
