//! Flood keyframes.
//!
//! A flood scenario is a set of depth grids keyed by minutes after scenario
//! start. The base height map (`-1`) is not a keyframe.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use crisis_geo::Grid;

use crate::error::CascadeError;

/// Minute key of the base height map, which is never published.
pub const BASE_HEIGHT_MAP: i64 = -1;

/// Depth grids by minute offset, plus publication progress.
#[derive(Debug, Clone, Default)]
pub struct FloodSchedule {
    keyframes: BTreeMap<i64, Grid>,
    last_published: Option<i64>,
}

impl FloodSchedule {
    /// An empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Minute offset encoded in a keyframe file name such as `120.asc`.
    ///
    /// Returns `Ok(None)` for files that are not keyframes.
    pub fn keyframe_minutes(file_name: &str) -> Result<Option<i64>, CascadeError> {
        let Some(stem) = file_name.strip_suffix(".asc") else {
            return Ok(None);
        };
        let minutes: i64 = stem.trim().parse().map_err(|_err| CascadeError::InvalidKeyframe {
            name: file_name.to_owned(),
        })?;
        Ok((minutes != BASE_HEIGHT_MAP).then_some(minutes))
    }

    /// Add or replace a keyframe.
    pub fn insert(&mut self, minutes: i64, grid: Grid) {
        self.keyframes.insert(minutes, grid);
    }

    /// Number of keyframes.
    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    /// Returns true when there are no keyframes.
    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Forget publication progress.
    pub fn rewind(&mut self) {
        self.last_published = None;
    }

    /// The latest keyframe due at `now` that has not been published yet.
    ///
    /// Marks it published; skipped intermediate keyframes are never returned.
    pub fn take_due(&mut self, start: DateTime<Utc>, now: DateTime<Utc>) -> Option<(i64, &Grid)> {
        let elapsed = (now - start).num_minutes();
        let (minutes, _) = self.keyframes.range(..=elapsed).next_back()?;
        let minutes = *minutes;
        if self.last_published.is_some_and(|last| last >= minutes) {
            return None;
        }
        self.last_published = Some(minutes);
        self.keyframes.get(&minutes).map(|grid| (minutes, grid))
    }

    /// Time of the next unpublished keyframe.
    pub fn next_event_at(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let next = match self.last_published {
            Some(last) => self.keyframes.range(last.saturating_add(1)..).next(),
            None => self.keyframes.iter().next(),
        };
        next.and_then(|(minutes, _)| {
            Duration::try_minutes(*minutes).and_then(|d| start.checked_add_signed(d))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crisis_geo::GridHeader;

    fn grid(depth: f64) -> Grid {
        Grid::from_values(GridHeader::new(0.0, 0.0, 1.0, 1.0, 1, 1), vec![depth]).unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn keyframe_names() {
        assert_eq!(FloodSchedule::keyframe_minutes("30.asc").unwrap(), Some(30));
        assert_eq!(FloodSchedule::keyframe_minutes("-1.asc").unwrap(), None);
        assert_eq!(FloodSchedule::keyframe_minutes("NAPscript.js").unwrap(), None);
        assert!(FloodSchedule::keyframe_minutes("max.asc").is_err());
    }

    #[test]
    fn publishes_latest_due_keyframe_once() {
        let mut s = FloodSchedule::new();
        s.insert(0, grid(0.0));
        s.insert(30, grid(0.5));
        s.insert(60, grid(1.0));

        assert_eq!(s.next_event_at(start()), Some(start()));
        assert_eq!(s.take_due(start(), start()).map(|(m, _)| m), Some(0));
        assert!(s.take_due(start(), start() + Duration::minutes(10)).is_none());
        assert_eq!(s.next_event_at(start()), Some(start() + Duration::minutes(30)));

        // Jumping past 30 straight to 75 publishes only the 60 minute frame.
        assert_eq!(
            s.take_due(start(), start() + Duration::minutes(75)).map(|(m, _)| m),
            Some(60)
        );
        assert_eq!(s.next_event_at(start()), None);

        s.rewind();
        assert_eq!(s.next_event_at(start()), Some(start()));
    }
}
