use anyhow::Result;
use std::sync::Arc;

use flight_dash::api::ApiClient;
use flight_dash::app::App;
use flight_dash::config::parse_args;
use flight_dash::logging::init as init_logging;
use flight_dash::poller::{spawn_connectivity_probe, spawn_poller};
use flight_dash::runtime::{init_terminal, restore_terminal, run_app};
use tracing::{debug, info, warn};

fn main() -> Result<()> {
    let config = parse_args()?;
    let _log_guard = init_logging(&config);
    info!("flight-dash starting");
    debug!("config path: {}", config.config_path.display());
    debug!(
        base_url = %config.base_url,
        region = %config.region,
        refresh_ms = config.refresh.as_millis() as u64,
        auto_refresh = config.auto_refresh,
        "resolved config"
    );

    let source = Arc::new(ApiClient::new(
        &config.base_url,
        config.timeout,
        config.insecure,
    )?);
    let app = App::new(&config);
    let handle = spawn_poller(
        Arc::clone(&source),
        &config.region,
        app.feed(),
        config.poll_interval(),
    );
    spawn_connectivity_probe(Arc::clone(&source), config.health_probe, handle.sender());

    let mut terminal = init_terminal()?;
    let res = run_app(&mut terminal, app, handle, source);
    restore_terminal(&mut terminal)?;

    if let Err(err) = res {
        warn!("runtime error: {err}");
        eprintln!("{err}");
    }

    info!("flight-dash exited");
    Ok(())
}
