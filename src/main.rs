use std::path::PathBuf;

use anyhow::Result;
use log::info;

use amghud_bridge::config::LinkConfig;
use amghud_bridge::core::ble::RealLink;
use amghud_bridge::core::machine::{link_channel, LinkStateMachine};
use amghud_bridge::core::permissions::GrantAll;
use amghud_bridge::core::sim::SimulatedLink;
use amghud_bridge::core::{BusEvent, EventBus};
use amghud_bridge::render::{LogRenderer, Renderer};
use amghud_bridge::state::AppState;

fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Logging initialized");
}

fn config_dir() -> PathBuf {
    std::env::var("AMGHUD_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let args: Vec<String> = std::env::args().collect();
    let use_sim = args.iter().any(|arg| arg == "--sim");
    let force_demo = args.iter().any(|arg| arg == "--demo");

    let config = LinkConfig::load(&config_dir()).await?;
    let bus = EventBus::new();
    let (tx, rx) = link_channel();

    let handle = if use_sim {
        info!("Using simulated link backend");
        let backend = SimulatedLink::new(tx.clone());
        LinkStateMachine::new(backend, Box::new(GrantAll), config.timing(), bus.clone(), rx)
            .spawn(tx.clone())
    } else {
        let backend = RealLink::new(tx.clone(), config.target_device_name.clone()).await?;
        LinkStateMachine::new(backend, Box::new(GrantAll), config.timing(), bus.clone(), rx)
            .spawn(tx.clone())
    };

    let state = AppState::new(handle.clone(), bus.clone(), config);

    if force_demo || state.config.demo_on_start {
        state.handle.run_demo().await?;
    } else if state.config.scan_on_start {
        state.handle.start_scan().await?;
    }

    let mut renderer = LogRenderer;
    let mut bus_rx = bus.subscribe();
    let mut render_tick = tokio::time::interval(tokio::time::Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                state.handle.reset().await?;
                break;
            }
            _ = render_tick.tick() => {
                let snapshot = state.snapshots.latest().await;
                renderer.render(&snapshot);
            }
            event = bus_rx.recv() => match event {
                Ok(BusEvent::StatusChanged { label, .. }) => info!("Status: {}", label),
                Ok(BusEvent::LinkAlive(alive)) => info!("Link alive: {}", alive),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    Ok(())
}
