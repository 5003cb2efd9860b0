//! locast-dvr: HDHomeRun tuner emulator for Locast.
//!
//! Every configured location gets its own emulated tuner on its own port.
//! DVR clients discover the tuner, read its lineup and guide, and watch
//! channels either through a playlist redirect or as an MPEG-TS stream
//! remuxed by ffmpeg.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use locast_dvr_lineup::DeviceIdentity;
use log::{error, info, warn};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

mod config;
mod logging;
mod transcoder;
mod tuner;
mod upstream;
mod web;

use config::{load_config, Args, Config, ConfigFile, DEFAULT_CONFIG_FILE};
use transcoder::ProcessRunner;
use upstream::multiplexer::MULTIPLEXER_CITY;
use upstream::{CachedSource, LocastService, LocastSession, Multiplexer, StationSource};
use web::DvrState;

/// How long servers get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type ServerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// One tuner instance to start.
struct Instance {
    identity: DeviceIdentity,
    source: Arc<dyn StationSource>,
    multiplex: bool,
    location: String,
    dma: String,
    listening: bool,
}

fn identity(config: &Config, uid: String, friendly_name: String, port: u16) -> DeviceIdentity {
    DeviceIdentity {
        unique_id: uid,
        model: config.device_model.clone(),
        firmware_name: config.device_firmware.clone(),
        firmware_version: config.device_version.clone(),
        tuner_count: config.tuner_count,
        friendly_name,
        bind_host: config.bind_address.clone(),
        bind_port: port,
    }
}

fn port_at(config: &Config, offset: usize) -> Result<u16, String> {
    u16::try_from(offset)
        .ok()
        .and_then(|offset| config.port.checked_add(offset))
        .ok_or_else(|| format!("Port {} + {} is out of range", config.port, offset))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > defaults
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    });
    let file_config = match &config_path {
        Some(path) => match load_config(path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("{}", e);
                return Err(e.into());
            }
        },
        None => ConfigFile::default(),
    };

    let config = Config::merge(args, file_config)?;
    logging::init_logging(config.logfile.as_deref(), config.verbose)?;

    info!(
        "locast-dvr {} running on {}/{} starting",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    info!("Config: {}", serde_json::to_string(&config.redacted())?);

    check_ffmpeg(&config).await;

    let session = Arc::new(LocastSession::new(
        &config.username,
        &config.password,
        Duration::from_secs(config.upstream_timeout_secs),
    )?);
    if let Err(e) = session.login().await {
        error!("Login failed: {}", e);
        return Err(e.into());
    }

    let instances = build_instances(&config, &session).await?;
    report(&instances);

    let shutdown = CancellationToken::new();
    let mut servers: JoinSet<ServerResult> = JoinSet::new();
    for instance in instances.into_iter().filter(|i| i.listening) {
        let addr: SocketAddr = instance.identity.host_and_port().parse()?;
        let state = Arc::new(DvrState::new(
            instance.identity,
            instance.source,
            &config,
            instance.multiplex,
        ));
        servers.spawn(web::start_web_server(addr, state, shutdown.clone()));
    }

    tokio::select! {
        _ = shutdown_signal() => {}
        Some(result) = servers.join_next() => match result {
            Ok(Ok(())) => warn!("A tuner server stopped unexpectedly"),
            Ok(Err(e)) => error!("Tuner server failed: {}", e),
            Err(e) => error!("Tuner server task failed: {}", e),
        },
    }

    info!("Shutting down");
    shutdown.cancel();
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while servers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("Servers did not stop within {:?}, aborting", SHUTDOWN_GRACE);
        servers.abort_all();
    }

    Ok(())
}

/// Locate every configured geo and wrap the results in tuner instances.
async fn build_instances(
    config: &Config,
    session: &Arc<LocastSession>,
) -> Result<Vec<Instance>, Box<dyn std::error::Error>> {
    let geos = config.geos()?;
    let geo_count = geos.len();
    let ttl = Duration::from_secs(config.cache_timeout);
    // Per-location tuners listen unless only the multiplexer should.
    let instances_listen = !config.multiplex || config.multiplex_debug;

    let mut instances = Vec::with_capacity(geo_count + 1);
    for (i, geo) in geos.into_iter().enumerate() {
        let service = match LocastService::connect(Arc::clone(session), geo.clone(), config.days).await {
            Ok(service) => service,
            Err(e) => {
                error!("Failed to locate {}: {}", geo, e);
                return Err(e.into());
            }
        };
        let location = service.location().clone();
        let service_geo = service.geo().to_string();
        let source: Arc<dyn StationSource> = Arc::new(CachedSource::new(
            Arc::new(service),
            ttl,
            config.cache_stations,
        ));

        instances.push(Instance {
            identity: identity(
                config,
                format!("{}_{}", config.uid, i),
                location.city.clone(),
                port_at(config, i)?,
            ),
            source,
            multiplex: false,
            location: service_geo,
            dma: location.dma,
            listening: instances_listen,
        });
    }

    if config.multiplex {
        let port = if config.multiplex_debug {
            port_at(config, geo_count)?
        } else {
            config.port
        };
        let sources = instances.iter().map(|i| Arc::clone(&i.source)).collect();
        instances.push(Instance {
            identity: identity(
                config,
                format!("{}_MULTI", config.uid),
                MULTIPLEXER_CITY.to_string(),
                port,
            ),
            source: Arc::new(Multiplexer::new(sources, config.remap)),
            multiplex: true,
            location: "-".to_string(),
            dma: "-".to_string(),
            listening: true,
        });
    }

    Ok(instances)
}

async fn check_ffmpeg(config: &Config) {
    let runner = ProcessRunner::new(
        config.ffmpeg.clone(),
        Duration::from_millis(config.launch_grace_ms),
        Duration::from_millis(config.stop_timeout_ms),
    );
    match runner.probe().await {
        Ok(version) => info!("Using {} ({})", runner.binary(), version),
        Err(e) => warn!("ffmpeg check failed, direct streams will not work: {}", e),
    }
}

fn report(instances: &[Instance]) {
    info!("Tuners:");
    info!(
        "  {:<20} {:<24} {:<8} {:<20} {}",
        "City", "Location", "DMA", "UID", "URL"
    );
    for instance in instances {
        let url = if instance.listening {
            instance.identity.base_url()
        } else {
            "(not listening)".to_string()
        };
        info!(
            "  {:<20} {:<24} {:<8} {:<20} {}",
            instance.identity.friendly_name,
            instance.location,
            instance.dma,
            instance.identity.unique_id,
            url
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
