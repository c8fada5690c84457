//! Periodic sweep of stale matches

use std::time::Duration;

use tracing::{debug, info};

use super::AppState;

/// Remove stale matches and the lobby records that created them.
/// Returns how many matches were reaped.
pub fn sweep(state: &AppState) -> usize {
    let reaped = state.coordinator.reap(
        state.config.idle_match_timeout,
        state.config.finished_match_ttl,
    );
    for id in &reaped {
        state.lobby.remove(id);
        info!(match_id = %id, "Reaped stale match");
    }
    reaped.len()
}

/// Run [`sweep`] forever at the configured interval
pub async fn run(state: AppState) {
    let period = state.config.reaper_interval.max(Duration::from_secs(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let reaped = sweep(&state);
        debug!(
            reaped,
            active_matches = state.registry.active_matches(),
            "Reaper sweep complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use uuid::Uuid;

    #[test]
    fn sweep_keeps_live_matches_when_idle_reaping_is_off() {
        let state = AppState::new(test_config());
        let alice = Uuid::new_v4();
        let record = state.lobby.create(alice, "live", None).unwrap();
        state.registry.create(record.id, alice, Uuid::new_v4());

        assert_eq!(sweep(&state), 0);
        assert_eq!(state.registry.active_matches(), 1);
        assert!(state.lobby.record_for(alice).is_some());
    }

    #[test]
    fn sweep_drops_idle_match_and_its_record() {
        let mut config = test_config();
        config.idle_match_timeout = Duration::from_millis(1);
        let state = AppState::new(config);

        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let record = state.lobby.create(alice, "stale", None).unwrap();
        state.lobby.join(bob, record.id, None).unwrap();
        state.registry.create(record.id, alice, bob);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(sweep(&state), 1);
        assert_eq!(state.registry.active_matches(), 0);
        assert!(state.lobby.record_for(alice).is_none());
        assert!(state.lobby.record_for(bob).is_none());
    }
}
