//! hazard-nav - headless proximity and navigation guidance engine
//!
//! Module structure:
//! - `domain/` - Core types (Position, Hazard, RouteResult, errors)
//! - `io/` - External interfaces (location, hazard feed, routing, geocoding, sinks)
//! - `services/` - Engine logic (HazardIndex, ProximityMonitor, RouteService, Guidance, MapSession)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use hazard_nav::domain::types::Position;
use hazard_nav::infra::{Config, Metrics};
use hazard_nav::io::hazard_feed::FeedBatch;
use hazard_nav::io::journal::spawn_journal_sink;
use hazard_nav::io::location::LocationSource;
use hazard_nav::io::{
    AlertSink, ChannelSource, FanoutSink, GeoClock, Geocoder, HazardFeedClient, LogSink,
    NominatimGeocoder, OsrmProvider, ReplaySource, SubscribeMode,
};
use hazard_nav::services::{HazardIndex, MapSession, SessionCommand};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Hazard proximity alerts and turn-by-turn narration
#[derive(Parser, Debug)]
#[command(name = "hazard-nav", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// JSONL fix replay file, overrides [location].replay_file
    #[arg(long)]
    replay: Option<String>,

    /// Route destination as "lat,lng"
    #[arg(short, long, conflicts_with = "search")]
    destination: Option<String>,

    /// Free-text destination, resolved through the geocoder
    #[arg(short, long)]
    search: Option<String>,

    /// Start with voice narration muted
    #[arg(long)]
    mute: bool,
}

fn parse_lat_lng(value: &str) -> anyhow::Result<Position> {
    let (lat, lng) = value.split_once(',').context("expected \"lat,lng\"")?;
    let lat: f64 = lat.trim().parse().context("latitude is not a number")?;
    let lng: f64 = lng.trim().parse().context("longitude is not a number")?;
    let position = Position::new(lat, lng);
    anyhow::ensure!(position.is_valid(), "coordinates out of range: {value}");
    Ok(position)
}

async fn open_source(replay: Option<&str>) -> anyhow::Result<Box<dyn LocationSource>> {
    match replay {
        Some(path) => Ok(Box::new(ReplaySource::open(path).await?)),
        None => {
            // No sensor: the source is exhausted from the start
            let (_tx, source) = ChannelSource::new(1);
            Ok(Box::new(source))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-fix visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);
    let replay = args.replay.as_deref().or(config.replay_file()).map(str::to_string);

    info!(
        version = %env!("CARGO_PKG_VERSION"),
        git = %env!("GIT_HASH"),
        config_file = %config.config_file(),
        hazard_feed = %config.hazard_feed_url().unwrap_or("-"),
        routing_url = %config.routing_url(),
        replay = %replay.as_deref().unwrap_or("-"),
        cooldown_secs = %config.cooldown().as_secs(),
        guidance_interval_ms = %config.guidance_interval().as_millis(),
        "hazard_nav_starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let index = Arc::new(HazardIndex::new(config.point_trigger_radius_m()));

    // Sinks
    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogSink)];
    if let Some(path) = config.journal_file() {
        sinks.push(Arc::new(spawn_journal_sink(path, 1000)));
    }
    let sink: Arc<dyn AlertSink> = Arc::new(FanoutSink::new(sinks));

    // "Where are you": one-shot locate on its own source
    let mut locate = GeoClock::new(open_source(replay.as_deref()).await?, config.one_shot_timeout());
    let here = match locate.subscribe(SubscribeMode::OneShot).recv().await {
        Some(Ok(position)) => {
            info!("Your location: {position}");
            Some(position)
        }
        Some(Err(e)) => {
            let [lat, lng] = config.default_center();
            warn!(error = %e, center = %format!("{lat:.4}, {lng:.4}"), "location_unavailable");
            None
        }
        None => None,
    };
    locate.unsubscribe();

    // Hazards: config entries now, feed on session start
    let static_hazards = FeedBatch::from_records(config.static_hazards()).hazards;
    let provider = Arc::new(OsrmProvider::new(
        config.routing_url(),
        config.routing_profile(),
        config.routing_timeout(),
    )?);

    let mut session = MapSession::new(&config, index.clone(), provider, sink, metrics.clone())
        .with_static_hazards(static_hazards);
    if let Some(url) = config.hazard_feed_url() {
        session = session.with_hazard_source(Arc::new(HazardFeedClient::new(url, config.hazard_feed_timeout())?));
    }
    if let Some(position) = here {
        session = session.with_initial_position(position);
    }

    // Destination from the command line
    let destination = match (&args.destination, &args.search) {
        (Some(value), _) => Some(parse_lat_lng(value).with_context(|| format!("Invalid --destination {value}"))?),
        (None, Some(query)) => {
            let geocoder = NominatimGeocoder::new(config.geocoding_url(), config.geocoding_timeout())?;
            match geocoder.search(query).await {
                Ok(place) => {
                    info!("Destination: {} ({})", place.name, place.position);
                    Some(place.position)
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "destination_search_failed");
                    None
                }
            }
        }
        (None, None) => None,
    };

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    if args.mute {
        cmd_tx.send(SessionCommand::SetVoice(false)).await?;
    }
    if let Some(destination) = destination {
        cmd_tx.send(SessionCommand::SetDestination(Some(destination))).await?;
        cmd_tx.send(SessionCommand::RequestRoute).await?;
    }

    // Metrics/status HTTP server (if port > 0)
    let http_port = config.metrics_http_port();
    if http_port > 0 {
        let http_metrics = metrics.clone();
        let http_index = index.clone();
        let http_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) =
                hazard_nav::io::prometheus::start_metrics_server(http_port, http_metrics, http_index, http_shutdown)
                    .await
            {
                error!(error = %e, "metrics_server_error");
            }
        });
    }

    // Metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Continuous tracking
    let started = Instant::now();
    let mut clock = GeoClock::new(open_source(replay.as_deref()).await?, config.one_shot_timeout());
    let fixes = clock.subscribe(SubscribeMode::Continuous);

    session.run(fixes, cmd_rx, shutdown_rx).await;
    clock.unsubscribe();
    drop(cmd_tx);

    metrics.report().log();
    info!(uptime_secs = %started.elapsed().as_secs(), "hazard-nav shutdown complete");
    Ok(())
}
