use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use examinatord::bridge::{BridgeConfig, Envelope, ExtensionBridge, MessageChannel};
use examinatord::controller::Controller;
use examinatord::extract::Extractor;
use examinatord::ipc::{self, AppState, Request};
use examinatord::logging::init_logging;
use examinatord::root::{FsRootProvider, RootProvider};
use examinatord::settings::{Settings, SettingsArgs};
use examinatord::store::HandleStore;
use examinatord::xlsx;

#[derive(Parser, Debug)]
#[command(name = "examinatord", version, about = "Osiris examinator report sidecar")]
struct Cli {
    /// TOML settings file.
    #[arg(long, env = "EXAMINATORD_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: SettingsArgs,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Speak the JSON-lines protocol on stdin/stdout (default).
    Serve,
    /// Convert one saved report to a spreadsheet and exit.
    Convert {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.overrides.apply(&mut settings)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Convert { input, output } => convert(&settings, input, output).await,
    }
}

async fn convert(settings: &Settings, input: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&input)
        .await
        .with_context(|| format!("failed to read {}", input.to_string_lossy()))?;
    let extractor = Extractor::new(&settings.markers)?;
    let records = extractor.extract(&String::from_utf8_lossy(&bytes));
    let workbook = xlsx::emit(&records)?;
    let out = output.unwrap_or_else(|| settings.output_path());
    tokio::fs::write(&out, workbook)
        .await
        .with_context(|| format!("failed to write {}", out.to_string_lossy()))?;
    tracing::info!(records = records.len(), path = %out.to_string_lossy(), "converted report");
    println!("{}", out.to_string_lossy());
    Ok(())
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let store = HandleStore::open(settings.store_path()).await?;
    let provider: Arc<dyn RootProvider> = Arc::new(FsRootProvider::new(settings.directory_access));
    let gate = examinatord::permission::PermissionGate::new(store, provider, settings.origin.clone());

    let channel = MessageChannel::new();
    let bridge = ExtensionBridge::new(
        channel.clone(),
        BridgeConfig {
            page_source: settings.page_source.clone(),
            extension_source: settings.extension_source.clone(),
            require_session: settings.require_session,
        },
    );
    tracing::info!(session = bridge.session(), origin = %settings.origin, "sidecar starting");
    let controller = Controller::new(&settings, bridge, gate)?;
    controller.start();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            let written = async {
                stdout.write_all(line.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await
            };
            if let Err(e) = written.await {
                tracing::error!(error = %e, "stdout closed");
                break;
            }
        }
    });

    let mut forwarders = Vec::new();

    // Page-originated envelopes are what the relay on the other end delivers
    // to the extension.
    {
        let mut rx = channel.subscribe();
        let tx = out_tx.clone();
        let page_source = settings.page_source.clone();
        forwarders.push(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(env) if env.source == page_source => {
                        match serde_json::to_string(&env) {
                            Ok(line) => {
                                let _ = tx.send(line);
                            }
                            Err(e) => tracing::warn!(error = %e, "envelope not serializable"),
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "envelope forwarder lagged")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }
    {
        let mut rx = controller.subscribe();
        let tx = out_tx.clone();
        forwarders.push(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => {
                            let _ = tx.send(line);
                        }
                        Err(e) => tracing::warn!(error = %e, "event not serializable"),
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event forwarder lagged")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    {
        let c = controller.clone();
        tokio::spawn(async move {
            c.refresh_permission().await;
            c.probe_extension().await;
        });
    }

    let state = Arc::new(AppState {
        controller,
        settings,
    });
    let mut requests = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                let _ = out_tx.send(protocol_error("bad_json", e.to_string()));
                continue;
            }
        };

        if value.get("method").is_some() {
            let req: Request = match serde_json::from_value(value) {
                Ok(r) => r,
                Err(e) => {
                    let _ = out_tx.send(protocol_error("bad_request", e.to_string()));
                    continue;
                }
            };
            if ipc::runs_detached(&req.method) {
                let state = state.clone();
                let tx = out_tx.clone();
                requests.spawn(async move {
                    let resp = ipc::handle_request(&state, req).await;
                    let _ = tx.send(response_line(&resp));
                });
            } else {
                // Everything else is answered in arrival order.
                let resp = ipc::handle_request(&state, req).await;
                let _ = out_tx.send(response_line(&resp));
            }
        } else if value.get("source").is_some() {
            match serde_json::from_value::<Envelope>(value) {
                Ok(env) => channel.post(env),
                Err(e) => tracing::warn!(error = %e, "malformed envelope dropped"),
            }
        } else {
            let _ = out_tx.send(protocol_error(
                "bad_json",
                "expected a request or a message envelope",
            ));
        }
    }

    tracing::info!("stdin closed, shutting down");
    while requests.join_next().await.is_some() {}
    for f in forwarders {
        f.abort();
    }
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

fn response_line(resp: &serde_json::Value) -> String {
    serde_json::to_string(resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
}

fn protocol_error(code: &str, message: impl Into<String>) -> String {
    json!({
        "ok": false,
        "error": { "code": code, "message": message.into() },
    })
    .to_string()
}
