use ndarray::ArrayView2;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::geometry::WorldPose;
use crate::pipeline::Stage;

/// Receives intermediate frames of a registration attempt, for debugging and tests.
pub trait FrameInspector: Send + Sync {
    fn inspect(&self, stage: Stage, frame: ArrayView2<f64>);
}

/// Told about every pose a successful registration produces, so it can be persisted.
pub trait PoseSink: Send + Sync {
    fn pose_updated(&self, image_name: &str, pose: &WorldPose);
}

/// Shared flag asking a running registration to stop at the next iteration boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!handle.is_cancelled());
        token.cancel();
        assert!(handle.is_cancelled());
    }
}
