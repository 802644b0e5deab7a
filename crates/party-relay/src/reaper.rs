//! Reaper - background eviction of stale rooms and expired invitations
//!
//! Runs [`RelayHub::sweep`] on a fixed interval. The task holds only a weak
//! reference to the hub and exits once the hub is gone.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::hub::RelayHub;

/// Periodic sweeper for a [`RelayHub`]
pub struct Reaper {
    hub: Weak<RelayHub>,
    interval: Duration,
}

impl Reaper {
    /// Create a reaper using the hub's configured sweep interval
    pub fn new(hub: &Arc<RelayHub>) -> Self {
        Self::with_interval(hub, hub.config().sweep_interval)
    }

    /// Create with a custom interval
    pub fn with_interval(hub: &Arc<RelayHub>, interval: Duration) -> Self {
        Self {
            hub: Arc::downgrade(hub),
            interval,
        }
    }

    /// Spawn the sweep loop on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run_loop())
    }

    /// Run the sweep loop (call from a tokio task)
    pub async fn run_loop(self) {
        info!("Reaper started (interval {}s)", self.interval.as_secs());

        // First sweep one full interval after start
        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;

            let Some(hub) = self.hub.upgrade() else {
                break;
            };

            let report = hub.sweep(Instant::now());
            if report.rooms_removed > 0 || report.invitations_expired > 0 {
                info!(
                    "Sweep removed {} room(s) and {} invitation(s); {} room(s) remain",
                    report.rooms_removed,
                    report.invitations_expired,
                    hub.room_count()
                );
            } else {
                debug!("Sweep found nothing to remove");
            }
        }

        debug!("Reaper stopped: hub dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ConnectionHandle;
    use crate::hub::HubConfig;

    fn config() -> HubConfig {
        HubConfig {
            sweep_interval: Duration::from_secs(60),
            empty_room_max_age: Duration::from_secs(30),
            ..HubConfig::default()
        }
    }

    fn empty_room(hub: &RelayHub, session_id: &str) {
        let (conn, _rx) = ConnectionHandle::channel(8);
        let mut session = hub.open_session(conn);
        let frame = format!(r#"{{"type":"create","sessionId":"{}","peerId":"p1"}}"#, session_id);
        hub.handle_frame(&mut session, frame.as_bytes());
        hub.teardown(&mut session);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_sweeps_on_interval() {
        let hub = RelayHub::start(config());
        empty_room(&hub, "abc");
        assert_eq!(hub.room_count(), 1);

        // Stale after 30s, but nothing runs before the first tick
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(hub.room_count(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_exits_when_hub_dropped() {
        let hub = Arc::new(RelayHub::new(config()));
        let handle = Reaper::new(&hub).spawn();

        drop(hub);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(handle.is_finished());
    }
}
