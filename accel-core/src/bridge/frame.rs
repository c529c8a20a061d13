//! Frame loop and stall recovery.
//!
//! The bridge does not own a timer: its host (a `requestAnimationFrame`
//! callback in the browser, a tokio interval in the harness) calls
//! [`NativeBridge::tick`] once per frame and [`NativeBridge::poll_watchdog`]
//! once per heartbeat.

use super::NativeBridge;
use crate::event::BridgeEvent;
use crate::module::StateSnapshot;
use crate::watchdog::Watchdog;

impl NativeBridge {
    /// Start ticking. Idempotent.
    pub fn start_frame_loop(&mut self) {
        if self.frame_running {
            return;
        }
        self.frame_running = true;
        self.last_frame_ms = self.clock.now_ms();
        tracing::debug!("Frame loop started");
    }

    /// Stop ticking. The watchdog is disarmed so a paused loop is not a stall.
    pub fn stop_frame_loop(&mut self) {
        self.frame_running = false;
        self.watchdog.disarm();
    }

    /// Whether the frame loop is running.
    #[must_use]
    pub fn is_frame_loop_running(&self) -> bool {
        self.frame_running
    }

    /// Run one frame. Returns whether the frame completed and pulsed the
    /// watchdog.
    ///
    /// The delta time is capped at `max_frame_dt` so resuming after a
    /// suspension does not jump animations.
    #[allow(clippy::cast_precision_loss)] // frame gaps are small
    pub fn tick(&mut self) -> bool {
        if !self.frame_running {
            return false;
        }
        let now = self.clock.now_ms();
        let elapsed = now.saturating_sub(self.last_frame_ms) as f32 / 1000.0;
        let dt = elapsed.min(self.config.max_frame_dt);
        self.last_frame_ms = now;

        let Some(module) = self.module().cloned() else {
            return false;
        };

        if self.animations
            && module
                .call("advance_animations", |m| m.advance_animations(dt))
                .is_none()
        {
            return false;
        }
        if let Some(transforms) = module.call("batch_transforms", |m| m.batch_transforms()) {
            self.transforms = transforms;
        }

        self.frames += 1;
        let event = BridgeEvent::Frame {
            dt,
            transforms: self.transforms.len(),
        };
        self.publish(&event);
        self.watchdog.pulse(now);
        true
    }

    /// Frames completed so far.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Transform buffer from the most recent frame.
    #[must_use]
    pub fn last_transforms(&self) -> &[f32] {
        &self.transforms
    }

    /// Register the document snapshot source used for stall recovery.
    pub fn register_snapshot_provider(&mut self, provider: impl Fn() -> StateSnapshot + 'static) {
        self.watchdog.set_provider(Box::new(provider));
    }

    /// Run due watchdog work. Returns whether a stall recovery ran.
    pub fn poll_watchdog(&mut self) -> bool {
        let Some(recovery) = self.watchdog.poll(self.clock.now_ms()) else {
            return false;
        };

        let restored = match &recovery.snapshot {
            Some(snapshot) => self.restore_snapshot(snapshot),
            None => {
                tracing::warn!("Stall detected but no snapshot has been captured");
                false
            }
        };
        self.publish(&BridgeEvent::StallRecovered { restored });
        true
    }

    /// Push a snapshot to the module, bypassing the sync throttle.
    fn restore_snapshot(&mut self, snapshot: &StateSnapshot) -> bool {
        let Some(module) = self.module() else {
            return false;
        };
        let restored = module
            .call("sync_state", |m| m.sync_state(snapshot))
            .is_some();
        if restored {
            self.last_sync_ms = Some(self.clock.now_ms());
            tracing::info!("Restored last document snapshot after stall");
        }
        restored
    }

    /// Whether the stall indicator should be visible now.
    #[must_use]
    pub fn fault_visible(&self) -> bool {
        self.watchdog.fault_visible(self.clock.now_ms())
    }

    /// The stall watchdog.
    #[must_use]
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::bridge::NativeBridge;
    use crate::clock::ManualClock;
    use crate::event::BridgeEvent;

    #[test]
    fn degraded_tick_does_not_pulse_or_notify() {
        let clock = ManualClock::default();
        let mut bridge = NativeBridge::builder().clock(Rc::new(clock.clone())).build();
        assert!(!bridge.tick(), "not started before init");

        futures::executor::block_on(bridge.init());
        assert!(bridge.is_frame_loop_running());

        let events = Rc::new(RefCell::new(Vec::<BridgeEvent>::new()));
        let sink = Rc::clone(&events);
        bridge.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        clock.advance(16);
        assert!(!bridge.tick());
        assert!(events.borrow().is_empty());
        assert!(!bridge.watchdog().is_armed());

        clock.advance(10_000);
        assert!(!bridge.poll_watchdog());
    }

    #[test]
    fn stop_disarms_and_halts() {
        let mut bridge = NativeBridge::builder()
            .clock(Rc::new(ManualClock::default()))
            .build();
        futures::executor::block_on(bridge.init());
        bridge.stop_frame_loop();
        assert!(!bridge.is_frame_loop_running());
        assert!(!bridge.tick());
    }
}
