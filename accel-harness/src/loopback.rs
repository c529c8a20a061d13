//! In-process compute module for soaking the frame loop without a built
//! module.

use accel_core::{
    Capability, ComputeModule, ElementId, ModuleError, ModuleResult, Rect, StateSnapshot,
    CONTRACT_VERSION,
};

/// Pixels per second the loopback transform slides along x.
const DRIFT_PER_SECOND: f32 = 60.0;

/// Animates a single transform and can be told to stop answering
/// animation steps after a number of frames.
#[derive(Debug, Default)]
pub struct LoopbackModule {
    frames: u64,
    stall_after: Option<u64>,
    elapsed: f32,
}

impl LoopbackModule {
    /// A module that stalls once `stall_after` frames have run, or never.
    #[must_use]
    pub fn new(stall_after: Option<u64>) -> Self {
        Self {
            stall_after,
            ..Self::default()
        }
    }
}

impl ComputeModule for LoopbackModule {
    fn contract_version(&self) -> u32 {
        CONTRACT_VERSION
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(capability, Capability::Animations)
    }

    fn sync_element(&mut self, _id: &ElementId, _rect: Rect) -> ModuleResult<()> {
        Ok(())
    }

    fn sync_state(&mut self, _state: &StateSnapshot) -> ModuleResult<()> {
        tracing::debug!(frames = self.frames, "Loopback module received document state");
        Ok(())
    }

    fn advance_animations(&mut self, dt: f32) -> ModuleResult<()> {
        if self.stall_after.is_some_and(|limit| self.frames >= limit) {
            return Err(ModuleError::Failed(format!(
                "loopback animations stalled after {} frames",
                self.frames
            )));
        }
        self.frames += 1;
        self.elapsed += dt;
        Ok(())
    }

    fn batch_transforms(&mut self) -> ModuleResult<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0, 1.0, self.elapsed * DRIFT_PER_SECOND, 0.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stalls_after_the_configured_frame() {
        let mut module = LoopbackModule::new(Some(2));
        assert!(module.advance_animations(0.5).is_ok());
        assert!(module.advance_animations(0.5).is_ok());
        assert!(matches!(
            module.advance_animations(0.5),
            Err(ModuleError::Failed(_))
        ));

        let transforms = module.batch_transforms().expect("transforms");
        assert_eq!(transforms, vec![1.0, 0.0, 0.0, 1.0, 60.0, 0.0]);
    }

    #[test]
    fn runs_forever_without_a_limit() {
        let mut module = LoopbackModule::new(None);
        for _ in 0..1_000 {
            assert!(module.advance_animations(0.016).is_ok());
        }
        assert!(module.supports(Capability::Animations));
        assert!(!module.supports(Capability::Classifier));
    }
}
