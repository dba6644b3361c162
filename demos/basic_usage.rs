//! Basic session - announce on a socketcand relay and log bus traffic.
//!
//! This example demonstrates:
//! - Loading a [`SibConfig`] from JSON (path in `SIB_CONFIG`), or building
//!   one in code when the variable is unset
//! - Registering a device whose entity follows a topic
//! - Logging every session event through `tracing`
//!
//! # Running
//!
//! ```text
//! RUST_LOG=sib_client=debug cargo run --example basic_usage
//! ```

use std::time::Duration;

use sib_client::config::{InterfaceKind, SibConfig, TransportConfig};
use sib_client::{
    Device, DeviceType, Entity, PhysicalAddress, Priority, SessionBuilder, SessionEvent,
    TopicAddress,
};
use tracing_subscriber::EnvFilter;

fn load_config() -> Result<SibConfig, Box<dyn std::error::Error>> {
    if let Ok(path) = std::env::var("SIB_CONFIG") {
        return Ok(SibConfig::from_file(path)?);
    }

    let mut transport = TransportConfig::network_relay("can0", "192.168.20.103", "29536");
    transport.bitrate = Some(500_000);
    Ok(SibConfig {
        physical_address: PhysicalAddress::new('b', 50)?,
        device_type: DeviceType::Debugging,
        hw_revision: 1,
        sw_revision: 1,
        short_identifier: "ABCDE".to_string(),
        announce_interval_ms: 10_000,
        transport,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = load_config()?;
    if config.transport.interface == InterfaceKind::NetworkRelay {
        tracing::info!(
            "Using socketcand relay {:?}:{:?}",
            config.transport.host,
            config.transport.port
        );
    }

    let light_level = TopicAddress::new(3, 12)?;
    let mut session = SessionBuilder::from_config(&config)
        .device(
            Device::new(PhysicalAddress::new('a', 1)?)
                .with_entity(Entity::new("living_room_light", [light_level])),
        )
        .event_sink(|event: &SessionEvent| tracing::info!("{}", event))
        .build()?;

    session.start().await?;

    session
        .send_topic(Priority::High, light_level, vec![0x01])
        .await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let directory = session.directory();
                let directory = directory.lock();
                tracing::info!("{} devices known", directory.len());
                for device in directory.devices() {
                    if let Some(info) = device.info() {
                        tracing::info!("  {}: {}", device.address(), info);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.stop().await?;
    Ok(())
}
