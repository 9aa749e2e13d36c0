//! area-peek daemon
//!
//! Attaches to the Area panel on the running X session and keeps its
//! visibility in line with fullscreen windows until SIGTERM or SIGINT.

use anyhow::{Context, Result};
use area_peek::config::Config;
use area_peek::host::PanelContainer;
use area_peek::service::{FULL_OPACITY, PanelVisibilityService};
use area_peek::timer::{LocalScheduler, Scheduler};
use area_peek::x11::{HostSignal, X11Host};
use area_peek::x11_async::X11EventSource;
use std::rc::Rc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::LocalSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn parse_window_id(value: &str) -> Result<u32> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.with_context(|| format!("Invalid window id {:?}", value))
}

async fn run(config: Config) -> Result<()> {
    let host = Rc::new(X11Host::connect(&config.panel)?);
    let mut events = X11EventSource::new(host.connection())?;
    let scheduler = Rc::new(LocalScheduler::new());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mut service = PanelVisibilityService::new(host.clone(), scheduler.clone(), config);
    service.enable();

    loop {
        let panel_alive = events.drain(|event| match host.dispatch(&event) {
            HostSignal::None => true,
            HostSignal::LayoutChanged => {
                service.handle_layout_changed();
                true
            }
            HostSignal::PanelGone => false,
        })?;
        if !panel_alive {
            break;
        }
        if let Err(e) = events.flush() {
            error!("X11 connection lost: {}", e);
            break;
        }

        tokio::select! {
            _ = events.ready() => {}
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                break;
            }
        }
    }

    service.disable();
    // Never leave the panel hidden or dimmed behind us.
    host.set_visible(true);
    host.set_opacity(FULL_OPACITY);

    let leftover = scheduler.active_sources();
    if leftover > 0 {
        warn!("{} timer sources still scheduled at shutdown", leftover);
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "area_peek=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting area-peek");

    let mut config = Config::load()?;

    let args: Vec<String> = std::env::args().collect();
    if let Some(position) = args.iter().position(|arg| arg == "--panel" || arg == "-p") {
        let value = args.get(position + 1).context("--panel needs a window id")?;
        config.panel.window = Some(parse_window_id(value)?);
    }

    LocalSet::new().run_until(run(config)).await
}
