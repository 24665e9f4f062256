//! Process-wide model snapshot
//!
//! Searches read an immutable snapshot; training builds a new model off to
//! the side and publishes it as a whole. A search that took its snapshot
//! before the swap keeps using the old parameters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::model::HmmModel;

/// Snapshot cell holding the current model
#[derive(Debug)]
pub struct SharedModel {
    current: RwLock<Arc<HmmModel>>,
    version: AtomicU64,
}

impl SharedModel {
    pub fn new(model: HmmModel) -> Self {
        SharedModel {
            current: RwLock::new(Arc::new(model)),
            version: AtomicU64::new(0),
        }
    }

    /// The model as of now
    pub fn snapshot(&self) -> Arc<HmmModel> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the model; returns the new version number
    pub fn publish(&self, model: HmmModel) -> u64 {
        let model = Arc::new(model);
        match self.current.write() {
            Ok(mut guard) => *guard = model,
            Err(poisoned) => *poisoned.into_inner() = model,
        }
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of publications so far
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_survives_publish() {
        let shared = SharedModel::new(HmmModel::uniform(2, 3));
        let before = shared.snapshot();
        assert_eq!(shared.publish(HmmModel::seeded(2, 3, 5)), 1);
        assert_eq!(*before, HmmModel::uniform(2, 3));
        assert_eq!(*shared.snapshot(), HmmModel::seeded(2, 3, 5));
        assert_eq!(shared.version(), 1);
    }
}
