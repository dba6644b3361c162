//! Periodic self-announcement.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::Identity;
use crate::protocol::UNSPECIFIED_PA;
use crate::writer::WriterHandle;

/// Spawn the beacon loop. The first beacon goes out one `period` after the
/// call, since the boot announcement is sent by `start()` itself.
///
/// Send failures are logged and the loop carries on; only aborting the
/// returned handle ends it.
pub(crate) fn spawn_announcer(
    writer: WriterHandle,
    identity: Identity,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let frame = identity.info_frame(UNSPECIFIED_PA);
            match writer.send(frame).await {
                Ok(()) => tracing::trace!("Periodic announcement sent for {}", identity.address),
                Err(e) => tracing::warn!("Periodic announcement failed: {}", e),
            }
        }
    })
}
