use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tracker::crossing::Direction;
use crate::tracker::matching::ClassId;

/// Per-class crossing counts for both directions plus grand totals.
///
/// Counts only grow during a session; [`Counts::reset`] is the explicit reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub up: BTreeMap<ClassId, u64>,
    pub down: BTreeMap<ClassId, u64>,
    pub total_up: u64,
    pub total_down: u64,
}

impl Counts {
    /// Counters pre-seeded with zero for every class in `classes`.
    pub fn with_classes(classes: impl IntoIterator<Item = ClassId>) -> Self {
        let mut counts = Self::default();
        for class_id in classes {
            counts.up.insert(class_id, 0);
            counts.down.insert(class_id, 0);
        }
        counts
    }

    pub fn record(&mut self, class_id: ClassId, direction: Direction) {
        let (bucket, total) = match direction {
            Direction::Up => (&mut self.up, &mut self.total_up),
            Direction::Down => (&mut self.down, &mut self.total_down),
        };
        *bucket.entry(class_id).or_insert(0) += 1;
        *total += 1;
    }

    pub fn get(&self, class_id: ClassId, direction: Direction) -> u64 {
        let bucket = match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        };
        bucket.get(&class_id).copied().unwrap_or(0)
    }

    pub fn total(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Up => self.total_up,
            Direction::Down => self.total_down,
        }
    }

    /// Zero every counter, keeping the known class keys.
    pub fn reset(&mut self) {
        self.up.values_mut().for_each(|c| *c = 0);
        self.down.values_mut().for_each(|c| *c = 0);
        self.total_up = 0;
        self.total_down = 0;
    }

    /// Counts keyed by display label instead of class id.
    ///
    /// Classes that map to the same label are summed.
    pub fn labelled<'a>(&self, label: impl Fn(ClassId) -> &'a str) -> LabelledCounts {
        let relabel = |bucket: &BTreeMap<ClassId, u64>| {
            let mut out = BTreeMap::new();
            for (&class_id, &count) in bucket {
                *out.entry(label(class_id).to_string()).or_insert(0) += count;
            }
            out
        };
        LabelledCounts {
            up: relabel(&self.up),
            down: relabel(&self.down),
            total_up: self.total_up,
            total_down: self.total_down,
        }
    }
}

/// Counts as handed to persistence or display, keyed by class name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelledCounts {
    pub up: BTreeMap<String, u64>,
    pub down: BTreeMap<String, u64>,
    pub total_up: u64,
    pub total_down: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_totals() {
        let mut counts = Counts::with_classes([2, 3]);
        counts.record(2, Direction::Down);
        counts.record(2, Direction::Down);
        counts.record(9, Direction::Up);

        assert_eq!(counts.get(2, Direction::Down), 2);
        assert_eq!(counts.get(3, Direction::Up), 0);
        assert_eq!(counts.get(9, Direction::Up), 1);
        assert_eq!((counts.total_up, counts.total_down), (1, 2));
    }

    #[test]
    fn test_reset_keeps_classes() {
        let mut counts = Counts::with_classes([2]);
        counts.record(2, Direction::Up);
        counts.reset();
        assert_eq!(counts, Counts::with_classes([2]));
    }

    #[test]
    fn test_labelled() {
        let mut counts = Counts::with_classes([2, 5]);
        counts.record(5, Direction::Up);
        let labelled = counts.labelled(|id| if id == 5 { "bus" } else { "car" });
        assert_eq!(labelled.up.get("bus"), Some(&1));
        assert_eq!(labelled.down.get("car"), Some(&0));
        assert_eq!(labelled.total_up, 1);
    }
}
