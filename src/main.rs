use std::path::Path;

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use signal_relay::config::RelayConfig;
use signal_relay::relay::{OutboundSender, RelaySupervisor};
use signal_relay::responder::{FixedResponses, OllamaGenerator, Responder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cfg = RelayConfig::from_env();
    let _log_guard = init_tracing(cfg.log_dir.as_deref());

    if let Err(e) = cfg.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    info!(
        number = %cfg.number,
        group = %cfg.group_id,
        trigger = %cfg.trigger,
        "starting relay"
    );
    info!(
        llm = cfg.use_llm,
        model = %cfg.llm_model,
        fixed_file = %cfg.fixed_file.display(),
        "responder configuration"
    );

    let fixed = FixedResponses::load(&cfg.fixed_file)?;
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

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let mut supervisor = RelaySupervisor::new(cfg, responder, sender);
    supervisor.run(shutdown_rx).await;

    info!("bye");
    Ok(())
}

/// Console logging via `RUST_LOG` (default `info`), plus a rolling daily
/// file when a log directory is configured. The returned guard must stay
/// alive for the file writer to flush.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let file = tracing_appender::rolling::daily(dir, "signal-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .init();
            None
        }
    }
}
