//! Draw-result cache.
//!
//! An explicit, injected replacement for module-level globals: bounded
//! capacity with oldest-first eviction plus a per-entry TTL. Owned by the
//! settlement engine; tests construct isolated instances and drive time
//! through the `*_at` internals instead of sleeping.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use gridline_types::{DrawResult, PeriodId};

struct Entry {
    draw: DrawResult,
    inserted_at: Instant,
}

pub struct DrawCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<PeriodId, Entry>,
    order: VecDeque<PeriodId>,
}

impl DrawCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, draw: DrawResult) {
        self.insert_at(draw, Instant::now());
    }

    pub fn get(&mut self, period: &PeriodId) -> Option<&DrawResult> {
        self.get_at(period, Instant::now())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert_at(&mut self, draw: DrawResult, now: Instant) {
        let period = draw.period.clone();
        if self.entries.remove(&period).is_some() {
            self.order.retain(|p| p != &period);
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.entries.insert(
            period.clone(),
            Entry {
                draw,
                inserted_at: now,
            },
        );
        self.order.push_back(period);
    }

    fn get_at(&mut self, period: &PeriodId, now: Instant) -> Option<&DrawResult> {
        let expired = match self.entries.get(period) {
            Some(entry) => now.duration_since(entry.inserted_at) > self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(period);
            self.order.retain(|p| p != period);
            return None;
        }
        self.entries.get(period).map(|entry| &entry.draw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(period: &str) -> DrawResult {
        DrawResult::new(
            PeriodId::new(period).unwrap(),
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = DrawCache::new(4, Duration::from_secs(60));
        cache.insert(draw("100"));
        let period = PeriodId::new("100").unwrap();
        assert_eq!(cache.get(&period).unwrap().period, period);
        assert!(cache.get(&PeriodId::new("101").unwrap()).is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut cache = DrawCache::new(2, Duration::from_secs(60));
        cache.insert(draw("100"));
        cache.insert(draw("101"));
        cache.insert(draw("102"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&PeriodId::new("100").unwrap()).is_none());
        assert!(cache.get(&PeriodId::new("102").unwrap()).is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = DrawCache::new(4, Duration::from_secs(60));
        let start = Instant::now();
        cache.insert_at(draw("100"), start);
        let period = PeriodId::new("100").unwrap();
        assert!(cache.get_at(&period, start + Duration::from_secs(59)).is_some());
        assert!(cache.get_at(&period, start + Duration::from_secs(61)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reinsert_refreshes_entry() {
        let mut cache = DrawCache::new(2, Duration::from_secs(60));
        let start = Instant::now();
        cache.insert_at(draw("100"), start);
        cache.insert_at(draw("101"), start);
        // Re-inserting 100 makes 101 the oldest.
        cache.insert_at(draw("100"), start + Duration::from_secs(1));
        cache.insert_at(draw("102"), start + Duration::from_secs(2));
        assert!(cache.get_at(&PeriodId::new("100").unwrap(), start + Duration::from_secs(3)).is_some());
        assert!(cache.get_at(&PeriodId::new("101").unwrap(), start + Duration::from_secs(3)).is_none());
    }
}
