//! Spatio-temporal duplicate-plate filter.
//!
//! Deduplication is by screen-space proximity, not plate identity: two
//! different plates photographed at the same screen location within the
//! window are indistinguishable, and a plate drifting across the frame can
//! escape suppression. Known limitation; fixing it needs a track identity
//! the detector does not provide.

use crate::geometry::distance;

pub const DEFAULT_DISTANCE_PX: f32 = 50.0;
pub const DEFAULT_WINDOW_SECONDS: f64 = 3.0;

#[derive(Clone, Copy, Debug)]
struct DedupEntry {
    cx: f32,
    cy: f32,
    at: f64,
}

/// Sliding-window record of recently submitted plate centroids. Called only
/// from the frame-loop thread; the purge, the proximity check, and the
/// registration of a new entry happen inside one `accept` call, so no two
/// gate checks can both pass for overlapping centroids.
#[derive(Debug)]
pub struct DedupCache {
    entries: Vec<DedupEntry>,
    distance_px: f32,
    window_seconds: f64,
}

impl DedupCache {
    pub fn new(distance_px: f32, window_seconds: f64) -> Self {
        Self {
            entries: Vec::new(),
            distance_px,
            window_seconds,
        }
    }

    /// Decide whether a plate sighting at `point` is new. Entries at least
    /// `window_seconds` old are purged first; a surviving entry closer than
    /// `distance_px` rejects the sighting without mutation, otherwise the
    /// sighting is recorded and accepted.
    pub fn accept(&mut self, point: (f32, f32), now: f64) -> bool {
        self.entries
            .retain(|entry| now - entry.at < self.window_seconds);

        for entry in &self.entries {
            if distance(point, (entry.cx, entry.cy)) < self.distance_px {
                return false;
            }
        }

        self.entries.push(DedupEntry {
            cx: point.0,
            cy: point.1,
            at: now,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DISTANCE_PX, DEFAULT_WINDOW_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearby_sighting_within_window_is_rejected() {
        let mut cache = DedupCache::default();
        let t0 = 1_000_000.0;
        assert!(cache.accept((100.0, 100.0), t0));
        // distance ~11.2 px, still inside the 3 s window
        assert!(!cache.accept((110.0, 105.0), t0 + 1.0));
        // window elapsed, same location accepted again
        assert!(cache.accept((110.0, 105.0), t0 + 3.1));
    }

    #[test]
    fn rejection_does_not_register_an_entry() {
        let mut cache = DedupCache::default();
        let t0 = 0.0;
        assert!(cache.accept((0.0, 0.0), t0));
        assert!(!cache.accept((10.0, 0.0), t0 + 0.5));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distant_sighting_is_accepted() {
        let mut cache = DedupCache::default();
        assert!(cache.accept((100.0, 100.0), 0.0));
        assert!(cache.accept((200.0, 100.0), 0.1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn expired_entries_never_influence_later_accepts() {
        let mut cache = DedupCache::new(50.0, 3.0);
        assert!(cache.accept((100.0, 100.0), 0.0));
        // Many unrelated calls elsewhere in the frame
        for i in 0..20 {
            cache.accept((1000.0 + 100.0 * i as f32, 1000.0), 1.0);
        }
        // Exactly at the window boundary the original entry is purged
        assert!(cache.accept((100.0, 100.0), 3.0));
    }

    #[test]
    fn boundary_is_strict_within_window() {
        let mut cache = DedupCache::new(50.0, 3.0);
        assert!(cache.accept((0.0, 0.0), 0.0));
        // 2.999 s later the entry still suppresses
        assert!(!cache.accept((1.0, 0.0), 2.999));
    }
}
