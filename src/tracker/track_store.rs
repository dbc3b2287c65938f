//! Owner of the live tracks: creation, refresh, aging and eviction.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::tracker::matching::Detection;
use crate::tracker::track::{DEFAULT_PATH_CAPACITY, Track, TrackSnapshot};

/// Live tracks keyed by id. Iteration is in id (creation) order.
#[derive(Debug, Clone)]
pub struct TrackStore {
    tracks: BTreeMap<u64, Track>,
    next_id: u64,
    path_capacity: usize,
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(DEFAULT_PATH_CAPACITY)
    }
}

impl TrackStore {
    pub fn new(path_capacity: usize) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            path_capacity,
        }
    }

    /// Open a new track for `detection` and return its id. Ids are never reused.
    pub fn create(&mut self, detection: &Detection) -> u64 {
        let track_id = self.next_id;
        self.next_id += 1;
        self.tracks
            .insert(track_id, Track::new(track_id, detection, self.path_capacity));
        debug!(track_id, class_id = detection.class_id, "track created");
        track_id
    }

    /// Update a live track with its matched detection. Returns false if the
    /// id is not live.
    pub fn refresh(&mut self, track_id: u64, detection: &Detection) -> bool {
        match self.tracks.get_mut(&track_id) {
            Some(track) => {
                track.refresh(detection);
                true
            }
            None => false,
        }
    }

    /// Age every track not in `seen` by one frame, then drop tracks whose age
    /// exceeds `max_age`. Returns the evicted ids.
    pub fn advance_age_and_evict(&mut self, seen: &HashSet<u64>, max_age: u32) -> Vec<u64> {
        for (id, track) in self.tracks.iter_mut() {
            if !seen.contains(id) {
                track.age += 1;
            }
        }

        let stale: Vec<u64> = self
            .tracks
            .iter()
            .filter(|(_, t)| t.age > max_age)
            .map(|(&id, _)| id)
            .collect();
        for id in &stale {
            if let Some(track) = self.tracks.remove(id) {
                debug!(track_id = id, counted = track.is_counted(), "track evicted");
            }
        }
        stale
    }

    /// Copy of every live track, in id order.
    pub fn get_all(&self) -> Vec<TrackSnapshot> {
        self.tracks.values().map(Track::snapshot).collect()
    }

    pub fn get(&self, track_id: u64) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    pub(crate) fn get_mut(&mut self, track_id: u64) -> Option<&mut Track> {
        self.tracks.get_mut(&track_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.tracks.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.values_mut()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: i32) -> Detection {
        Detection::from_tlbr(x, 0, x + 40, 40, 2, 0.8)
    }

    #[test]
    fn test_ids_are_monotonic_and_never_reused() {
        let mut store = TrackStore::default();
        let a = store.create(&det(0));
        let b = store.create(&det(100));
        assert_eq!((a, b), (1, 2));

        let evicted = store.advance_age_and_evict(&HashSet::new(), 0);
        assert_eq!(evicted, vec![1, 2]);
        assert!(store.is_empty());

        assert_eq!(store.create(&det(0)), 3);
    }

    #[test]
    fn test_seen_tracks_do_not_age() {
        let mut store = TrackStore::default();
        let a = store.create(&det(0));
        let b = store.create(&det(100));
        let seen = HashSet::from([a]);
        for _ in 0..3 {
            store.advance_age_and_evict(&seen, 15);
        }
        assert_eq!(store.get(a).unwrap().age, 0);
        assert_eq!(store.get(b).unwrap().age, 3);
    }

    #[test]
    fn test_eviction_threshold_is_exclusive() {
        let mut store = TrackStore::default();
        let id = store.create(&det(0));
        for _ in 0..15 {
            assert!(store.advance_age_and_evict(&HashSet::new(), 15).is_empty());
        }
        assert_eq!(store.get(id).unwrap().age, 15);
        assert_eq!(store.advance_age_and_evict(&HashSet::new(), 15), vec![id]);
    }

    #[test]
    fn test_refresh_unknown_id() {
        let mut store = TrackStore::default();
        assert!(!store.refresh(42, &det(0)));
    }

    #[test]
    fn test_get_all_snapshots_in_id_order() {
        let mut store = TrackStore::default();
        store.create(&det(0));
        let id = store.create(&det(100));
        assert!(store.refresh(id, &det(110)));
        let snaps = store.get_all();
        assert_eq!(snaps.iter().map(|s| s.track_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(snaps[1].path.len(), 2);
    }
}
