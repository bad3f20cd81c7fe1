use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tank_level::clock::{Clock, MonotonicClock};
use tank_level::level::LevelConfig;
use tank_level::sampling::SampleCache;
use tank_level::sensor::{self, OfflineSensor, RangeSensor};
use tank_level::state::{AppState, DeviceInfo, spawn_refresh_thread};
use tank_level::{alert, api, config};
use tracing::Level;

fn init_tracing(level: Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "tank-level starting"
    );

    let (bucket_height, threshold) = config.level_defaults();
    let level = LevelConfig::new(bucket_height, threshold)?;

    let sensor_settings = config.sensor_settings();
    let range_sensor: Box<dyn RangeSensor + Send> = match sensor::build_sensor(&sensor_settings) {
        Ok(range_sensor) => {
            tracing::info!(
                kind = %sensor_settings.kind,
                timeout_ms = sensor_settings.timeout.as_millis(),
                "Range sensor ready"
            );
            range_sensor
        }
        Err(err) => {
            tracing::error!(
                kind = %sensor_settings.kind,
                error = %err,
                "Failed to initialize range sensor, distance will report no reading"
            );
            Box::new(OfflineSensor::new(err.to_string()))
        }
    };

    let clock: Box<dyn Clock + Send> = Box::new(MonotonicClock);
    let sampler = SampleCache::new(range_sensor, clock, config.min_sample_interval());
    let state = Arc::new(AppState::new(
        sampler,
        level,
        DeviceInfo {
            name: config.app.name.clone(),
            sensor: sensor_settings.kind,
        },
    ));

    let alert_handle =
        alert::spawn_alert_watcher(state.subscribe_observations(), state.subscribe_level());

    let stop_flag = Arc::new(AtomicBool::new(false));
    let refresh_handle = config.poll_interval().map(|interval| {
        tracing::info!(
            interval_ms = interval.as_millis(),
            "Starting background sampling thread"
        );
        spawn_refresh_thread(Arc::clone(&state), interval, Arc::clone(&stop_flag))
    });

    let app = api::router(Arc::clone(&state));
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    stop_flag.store(true, Ordering::Relaxed);
    if let Some(handle) = refresh_handle
        && handle.join().is_err()
    {
        tracing::warn!("Background sampling thread panicked");
    }
    alert_handle.abort();
    tracing::info!("tank-level stopped");

    Ok(())
}
