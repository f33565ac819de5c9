//! Raffle node
//!
//! Runs a raffle end to end in one process: a local VRF oracle, an in-memory
//! ledger, the keeper loop and the fulfillment relay, with simulated players
//! entering every round.

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raffle::config::{generate_sample_config, ConfigLoader, RaffleConfig};
use raffle::keeper;
use raffle::{
    FulfillmentRelay, InMemoryLedger, Keeper, Participant, RaffleEvent, SettlementEngine, VrfOracle,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "raffle-node")]
#[command(about = "Self-settling raffle node", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Use the development preset (short rounds, debug logging)
    #[arg(long)]
    dev: bool,

    /// Write a sample configuration to this path and exit
    #[arg(long)]
    generate_config: Option<String>,

    /// Override the entry fee
    #[arg(long)]
    entry_fee: Option<u64>,

    /// Override the round interval in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Number of simulated players
    #[arg(long, default_value = "5")]
    players: usize,

    /// Stop after this many settled rounds (0 runs until Ctrl-C)
    #[arg(long, default_value = "3")]
    rounds: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(path) = args.generate_config.as_deref() {
        generate_sample_config(path)?;
        println!("Sample configuration written to {}", path);
        return Ok(());
    }

    let config = load_config(&args)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.monitoring.log_level.as_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if args.players == 0 {
        return Err("--players must be at least 1".into());
    }

    let players: Vec<Participant> = (0..args.players)
        .map(|i| Participant::new(format!("player-{}", i)))
        .collect();
    let starting_balance = config.raffle.entry_fee.saturating_mul(100);
    let ledger = Arc::new(InMemoryLedger::with_balances(
        players.iter().cloned().map(|p| (p, starting_balance)),
    ));

    let (oracle, oracle_requests) = VrfOracle::new_random();
    let oracle = Arc::new(oracle);
    tracing::info!("Local VRF oracle public key: {}", oracle.public_key_hex());

    let engine = Arc::new(SettlementEngine::new(
        &config,
        oracle.clone(),
        ledger.clone(),
        raffle::types::unix_now(),
    )?);
    let mut events = engine.subscribe();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();
    if config.keeper.enabled {
        handles.push(Keeper::new(engine.clone(), config.keeper_poll_interval()).spawn(shutdown_rx.clone()));
    } else {
        tracing::warn!("Keeper disabled; settlement must be triggered externally");
    }
    handles.push(FulfillmentRelay::new(engine.clone(), oracle, oracle_requests).spawn(shutdown_rx));

    let mut rng = StdRng::from_entropy();
    enter_players(&engine, &players, &mut rng).await;

    let mut settled = 0u64;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(RaffleEvent::WinnerPicked { winner, payout, round_number, .. }) => {
                    settled += 1;
                    tracing::info!(
                        "Round {} settled: {} won {} (balance now {})",
                        round_number,
                        winner,
                        payout,
                        ledger.balance_of(&winner)
                    );
                    if args.rounds > 0 && settled >= args.rounds {
                        break;
                    }
                    enter_players(&engine, &players, &mut rng).await;
                }
                Ok(RaffleEvent::SettlementFaulted { request_id, reason }) => {
                    tracing::error!("Request {} faulted: {}", request_id, reason);
                    break;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event listener lagged; skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    let failed = keeper::shutdown(&shutdown_tx, handles).await;
    if failed > 0 {
        tracing::warn!("{} background task(s) did not stop cleanly", failed);
    }

    let metrics = engine.metrics().snapshot();
    tracing::info!("Final metrics: {}", serde_json::to_string(&metrics)?);
    tracing::info!("Final round: {}", serde_json::to_string(&engine.snapshot().await)?);

    Ok(())
}

fn load_config(args: &Args) -> Result<RaffleConfig, Box<dyn std::error::Error>> {
    let mut config = match (&args.config, args.dev) {
        (Some(path), _) => ConfigLoader::new().with_path(path).load()?,
        (None, true) => RaffleConfig::development(),
        (None, false) => ConfigLoader::new().load()?,
    };

    if let Some(fee) = args.entry_fee {
        config.raffle.entry_fee = fee;
    }
    if let Some(interval) = args.interval {
        config.raffle.interval_secs = interval;
    }
    config.validate()?;

    Ok(config)
}

/// A random number of random players buy one slot each.
async fn enter_players(engine: &SettlementEngine, players: &[Participant], rng: &mut StdRng) {
    let entries = rng.gen_range(1..=players.len());
    for _ in 0..entries {
        let player = players[rng.gen_range(0..players.len())].clone();
        if let Err(e) = engine.enter(player.clone(), engine.entry_fee()).await {
            tracing::warn!("{} could not enter: {}", player, e);
        }
    }
}
