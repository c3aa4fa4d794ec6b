use crate::types::TrackletSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Holds the most recent tracklet set for readers outside the dispatch
/// loop. Replacement is atomic with respect to readers.
#[derive(Debug, Clone, Default)]
pub struct TrackletHolder {
    inner: Arc<RwLock<Option<Arc<TrackletSet>>>>,
}

impl TrackletHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, tracklets: TrackletSet) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(tracklets));
    }

    pub fn latest(&self) -> Option<Arc<TrackletSet>> {
        let slot = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        slot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Tracklet, TrackletStatus};

    #[test]
    fn test_replace_keeps_latest() {
        let holder = TrackletHolder::new();
        let reader = holder.clone();
        assert!(reader.latest().is_none());

        holder.replace(TrackletSet {
            sequence_num: 1,
            tracklets: vec![],
        });
        holder.replace(TrackletSet {
            sequence_num: 2,
            tracklets: vec![Tracklet {
                id: 7,
                label: 15,
                status: TrackletStatus::Tracked,
                roi: BoundingBox::default(),
            }],
        });

        let latest = reader.latest().unwrap();
        assert_eq!(latest.sequence_num, 2);
        assert_eq!(latest.len(), 1);
    }
}
