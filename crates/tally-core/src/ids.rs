use chrono::{DateTime, Utc};
use tracing::debug;

/// Observed ids at or above this are left out of priming. The clock never
/// gets near it and bumps from below cannot reach it, so generated ids
/// stay clear of such values without overflowing.
const PRIMING_CEILING: i64 = i64::MAX / 2;

/// Issues time-derived identifiers: decimal Unix milliseconds, bumped by
/// one whenever the clock has not moved past the last value handed out.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    last: i64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never issue anything at or below `floor`.
    pub fn observe(&mut self, floor: i64) {
        self.last = self.last.max(floor);
    }

    /// Feeds every numeric id in `ids` through [`IdGenerator::observe`].
    /// Non-numeric ids cannot collide with generated ones and are skipped.
    pub fn observe_all<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for id in ids {
            match id.parse::<i64>() {
                Ok(value) if value < PRIMING_CEILING => self.observe(value),
                Ok(_) => debug!(id, "id beyond generator range; not priming"),
                Err(_) => {}
            }
        }
    }

    pub fn next_at(&mut self, now: DateTime<Utc>) -> String {
        let candidate = now.timestamp_millis();
        self.last = if candidate > self.last {
            candidate
        } else {
            self.last.saturating_add(1)
        };
        self.last.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{TimeZone, Utc};

    use super::IdGenerator;

    #[test]
    fn same_instant_yields_distinct_increasing_ids() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let mut ids = IdGenerator::new();

        let issued: Vec<i64> = (0..100)
            .map(|_| ids.next_at(now).parse().unwrap())
            .collect();

        let unique: HashSet<_> = issued.iter().collect();
        assert_eq!(unique.len(), issued.len());
        assert!(issued.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(issued[0], now.timestamp_millis());
    }

    #[test]
    fn observed_ids_are_never_reissued() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let future = now.timestamp_millis() + 5_000;
        let mut ids = IdGenerator::new();
        let future_id = future.to_string();
        ids.observe_all(["personal", future_id.as_str()]);

        assert_eq!(ids.next_at(now), (future + 1).to_string());
    }

    #[test]
    fn huge_loaded_ids_do_not_stop_issuing() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let mut ids = IdGenerator::new();
        let max_id = i64::MAX.to_string();
        let near_max_id = (i64::MAX - 1).to_string();
        ids.observe_all([max_id.as_str(), near_max_id.as_str()]);

        let first = ids.next_at(now);
        let second = ids.next_at(now);

        assert_eq!(first, now.timestamp_millis().to_string());
        assert_eq!(second, (now.timestamp_millis() + 1).to_string());
        assert_ne!(first, max_id);
        assert_ne!(second, near_max_id);
    }
}
