use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{HttpWalletDiscovery, SessionController, SessionEvent};
use shared::domain::{SessionPhase, VoteField};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::{load_settings, DEFAULT_CONFIG_FILE};
use render::{render_event, render_tallies, render_view};

#[derive(Parser, Debug)]
#[command(name = "voting-cli", about = "Connect a wallet and vote on the Voting contract")]
struct Args {
    /// Settings file; missing files are ignored.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// JSON-RPC endpoint of the wallet/node.
    #[arg(long, global = true)]
    rpc_url: Option<String>,
    #[arg(long, global = true)]
    contract_address: Option<String>,
    /// Hardhat artifact (or bare ABI) describing the contract interface.
    #[arg(long, global = true)]
    artifact: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show wallet and account state without prompting.
    Status,
    /// Request account access and bind the contract.
    Connect,
    /// Read the three vote counts.
    Tallies,
    /// Read the winning party.
    Winner,
    /// Set the total number of votes.
    SetTotal {
        #[arg(allow_hyphen_values = true)]
        votes: String,
    },
    /// Cast votes for party A.
    VoteA {
        #[arg(allow_hyphen_values = true)]
        votes: String,
    },
    /// Cast votes for party B.
    VoteB {
        #[arg(allow_hyphen_values = true)]
        votes: String,
    },
    /// Follow account switches and tallies until interrupted.
    Watch {
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,
    },
}

fn flush_events(rx: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = rx.try_recv() {
        if let Some(line) = render_event(&event) {
            eprintln!("{line}");
        }
    }
}

async fn ensure_bound(controller: &SessionController) -> Result<()> {
    if controller.snapshot().await.phase != SessionPhase::ContractBound {
        controller
            .connect_account()
            .await
            .context("failed to connect wallet account")?;
    }
    Ok(())
}

async fn submit(controller: &SessionController, field: VoteField, votes: String) -> Result<()> {
    ensure_bound(controller).await?;
    controller.set_input(field, votes).await;
    let receipt = controller
        .submit_input(field)
        .await
        .with_context(|| format!("failed to submit {}", field.label()))?;
    info!(
        "cli: submission confirmed field={} tx={}",
        field.label(),
        receipt.transaction_hash
    );
    Ok(())
}

async fn watch(
    controller: &SessionController,
    rx: &mut broadcast::Receiver<SessionEvent>,
    interval: Duration,
) -> Result<()> {
    ensure_bound(controller).await?;
    let mut last_rendered = None;

    loop {
        if let Err(err) = controller.sync_accounts().await {
            eprintln!("account sync failed: {err}");
        }
        match controller.fetch_tallies().await {
            Ok(tallies) => {
                if last_rendered != Some(tallies) {
                    println!("{}", render_tallies(&tallies));
                    last_rendered = Some(tallies);
                }
            }
            Err(err) if err.is_transient() => eprintln!("refresh failed, will retry: {err}"),
            Err(err) => return Err(err).context("failed to refresh tallies"),
        }
        flush_events(rx);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("cli: watch interrupted");
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn run(controller: &SessionController, command: Command) -> Result<()> {
    let mut rx = controller.subscribe_events();
    controller
        .discover_wallet()
        .await
        .context("failed to query wallet accounts")?;

    let outcome = match command {
        Command::Status => Ok(()),
        Command::Connect => ensure_bound(controller).await,
        Command::Tallies => {
            async {
                ensure_bound(controller).await?;
                controller
                    .fetch_tallies()
                    .await
                    .context("failed to read tallies")?;
                Ok::<_, anyhow::Error>(())
            }
            .await
        }
        Command::Winner => {
            async {
                ensure_bound(controller).await?;
                controller
                    .fetch_winning_party()
                    .await
                    .context("failed to read winning party")?;
                Ok::<_, anyhow::Error>(())
            }
            .await
        }
        Command::SetTotal { votes } => submit(controller, VoteField::TotalVotes, votes).await,
        Command::VoteA { votes } => submit(controller, VoteField::PartyA, votes).await,
        Command::VoteB { votes } => submit(controller, VoteField::PartyB, votes).await,
        Command::Watch { interval_ms } => {
            watch(controller, &mut rx, Duration::from_millis(interval_ms.max(100))).await
        }
    };

    flush_events(&mut rx);
    println!("{}", render_view(&controller.snapshot().await));
    outcome
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config);
    if let Some(rpc_url) = args.rpc_url {
        settings.rpc_url = Some(rpc_url);
    }
    if let Some(address) = args.contract_address {
        settings.contract_address = address;
    }
    if let Some(artifact) = args.artifact {
        settings.artifact_path = Some(artifact);
    }

    let discovery = HttpWalletDiscovery::new(settings.rpc_endpoint()?);
    let controller = SessionController::new(Arc::new(discovery), settings.contract_settings()?);

    run(&controller, args.command).await
}
