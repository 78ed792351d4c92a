//! Command-line mission and command tool over a UDP MAVLink link.
//!
//! Usage:
//!   waylink-mission --remote 127.0.0.1:14555 upload plan.toml
//!   waylink-mission download
//!   waylink-mission set-current 2

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mavlink::common::MavMissionType;
use tokio::sync::{oneshot, watch};
use tracing::info;

use waylink::command::CommandLong;
use waylink::mission::{Admission, MissionPlan, ProgressCallback};
use waylink::transport::UdpLink;
use waylink::{logging, Engine, LinkConfig, Sender};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
const RECEIVE_POLL: Duration = Duration::from_millis(5);

#[derive(Parser, Debug)]
#[command(name = "waylink-mission", version, about = "MAVLink mission and command tool")]
struct Cli {
    /// Local UDP address to bind.
    #[arg(long, default_value = "0.0.0.0:14550")]
    bind: SocketAddr,

    /// Vehicle address. Learned from the first datagram when omitted.
    #[arg(long)]
    remote: Option<SocketAddr>,

    #[arg(long, default_value_t = 1)]
    target_system: u8,

    /// TOML link configuration.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Upload a mission plan.
    Upload {
        #[arg(value_name = "PLAN")]
        plan: PathBuf,
    },
    /// Download and print the mission.
    Download,
    /// Clear the mission.
    Clear,
    /// Set the current mission item.
    SetCurrent { seq: i32 },
    Arm,
    Disarm,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log);

    let config = match &cli.config {
        Some(path) => LinkConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LinkConfig::default(),
    }
    .with_env_overrides();

    let link = Arc::new(UdpLink::bind(cli.bind, cli.remote, cli.target_system, &config)?);
    let engine = Arc::new(Engine::new(Arc::clone(&link) as Arc<dyn Sender>, config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = engine.spawn_driver(shutdown_rx.clone());
    let receiver = tokio::spawn(receive_loop(
        Arc::clone(&link),
        Arc::clone(&engine),
        shutdown_rx,
    ));

    let outcome = match wait_for_vehicle(&link).await {
        Ok(()) => run(&engine, cli.target_system, cli.action).await,
        Err(e) => Err(e),
    };

    let _ = shutdown_tx.send(true);
    driver.await?;
    receiver.await?;
    outcome
}

async fn receive_loop(link: Arc<UdpLink>, engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) {
    loop {
        for (header, message) in link.poll_incoming() {
            engine.process_message(&header, &message);
        }
        tokio::select! {
            _ = tokio::time::sleep(RECEIVE_POLL) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn wait_for_vehicle(link: &UdpLink) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + DISCOVERY_TIMEOUT;
    while !link.is_connected() {
        if tokio::time::Instant::now() >= deadline {
            bail!("no vehicle heard within {}s", DISCOVERY_TIMEOUT.as_secs());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}

fn progress_printer(label: &'static str) -> ProgressCallback {
    Arc::new(move |progress| info!("{label}: {:.0}%", progress * 100.0))
}

async fn run(engine: &Engine, target_system: u8, action: Action) -> anyhow::Result<()> {
    let mission_type = MavMissionType::MAV_MISSION_TYPE_MISSION;
    let client = engine.mission_client();

    match action {
        Action::Upload { plan } => {
            let text = std::fs::read_to_string(&plan)
                .with_context(|| format!("reading plan {}", plan.display()))?;
            let items = MissionPlan::from_toml_str(&text)?.to_items();
            let count = items.len();

            let (tx, rx) = oneshot::channel();
            client.upload_items_async(
                mission_type,
                target_system,
                items,
                Admission::Exclusive,
                Some(progress_printer("upload")),
                move |result| {
                    let _ = tx.send(result);
                },
            );
            rx.await??;
            println!("Uploaded {count} items");
        }
        Action::Download => {
            let (tx, rx) = oneshot::channel();
            client.download_items_async(
                mission_type,
                target_system,
                Admission::Exclusive,
                Some(progress_printer("download")),
                move |result| {
                    let _ = tx.send(result);
                },
            );
            let items = rx.await??;
            println!("{} items", items.len());
            for item in items {
                println!(
                    "{:>3} {:?} lat={:.7} lon={:.7} alt={:.1}{}",
                    item.seq,
                    item.command,
                    f64::from(item.x) / 1e7,
                    f64::from(item.y) / 1e7,
                    item.z,
                    if item.current { " (current)" } else { "" }
                );
            }
        }
        Action::Clear => {
            let (tx, rx) = oneshot::channel();
            client.clear_items_async(mission_type, target_system, Admission::Exclusive, move |result| {
                let _ = tx.send(result);
            });
            rx.await??;
            println!("Mission cleared");
        }
        Action::SetCurrent { seq } => {
            let (tx, rx) = oneshot::channel();
            client.set_current_item_async(seq, target_system, Admission::Exclusive, move |result| {
                let _ = tx.send(result);
            });
            rx.await??;
            println!("Current item set to {seq}");
        }
        Action::Arm | Action::Disarm => {
            let arm = matches!(action, Action::Arm);
            let (tx, rx) = oneshot::channel();
            engine
                .commands()
                .send_command_async(CommandLong::arm_disarm(target_system, arm), move |result| {
                    let _ = tx.send(result);
                });
            rx.await??;
            println!("{}", if arm { "Armed" } else { "Disarmed" });
        }
    }
    Ok(())
}
