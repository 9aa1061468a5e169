use crate::core::{DbError, Result};
use chrono::Utc;
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};

/// How far past the current clock an explicit id may lie and still move
/// the floor.
const OBSERVE_HORIZON_MS: i64 = 24 * 60 * 60 * 1000;

/// Issues record identifiers for records that carry none.
///
/// Values are `unix_millis * 1000 + random(0..1000)`, bumped past the last
/// issued value so a burst within one millisecond never repeats.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> Result<i64> {
        let candidate =
            Utc::now().timestamp_millis() * 1000 + rand::thread_rng().gen_range(0..1000);

        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let floor = last.checked_add(1).ok_or_else(|| {
                DbError::ExecutionError("Record id space exhausted".into())
            })?;
            let next = candidate.max(floor);
            match self
                .last
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Ok(next),
                Err(current) => last = current,
            }
        }
    }

    /// Makes sure future ids land above `id`. Ids beyond the time-based
    /// range (more than a day ahead of the clock) are ignored.
    pub fn observe(&self, id: i64) {
        let ceiling = (Utc::now().timestamp_millis() + OBSERVE_HORIZON_MS).saturating_mul(1000);
        if id <= ceiling {
            self.last.fetch_max(id, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_batch_of_ids_is_unique_and_increasing() {
        let generator = IdGenerator::new();
        let ids: Vec<i64> = (0..1000).map(|_| generator.next_id().unwrap()).collect();

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 1000);
        assert!(ids[0] > 1_000_000_000_000_000);
    }

    #[test]
    fn test_observe_moves_floor() {
        let generator = IdGenerator::new();
        let ahead = generator.next_id().unwrap() + 60_000_000;
        generator.observe(ahead);
        assert_eq!(generator.next_id().unwrap(), ahead + 1);
    }

    #[test]
    fn test_observe_ignores_ids_past_the_clock() {
        let generator = IdGenerator::new();
        generator.observe(i64::MAX);
        generator.observe(i64::MAX / 2);

        let a = generator.next_id().unwrap();
        let b = generator.next_id().unwrap();
        assert!(a < b);
        assert!(b < i64::MAX / 2);
    }

    #[test]
    fn test_saturated_floor_is_an_error() {
        let generator = IdGenerator {
            last: AtomicI64::new(i64::MAX),
        };
        assert!(matches!(
            generator.next_id(),
            Err(DbError::ExecutionError(_))
        ));
    }

    #[test]
    fn test_unique_across_threads() {
        let generator = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..250)
                        .map(|_| generator.next_id().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 1000);
    }
}
