//! Hospital bed availability over time.

use chrono::{DateTime, Utc};
use crisis_types::{BedChart, ChartPoint, ChartSeries, InfrastructureState};

use crate::entity::Entity;

/// Chart key the series are published under.
pub const CHART_KEY: &str = "chart";

/// Bed counts by entity state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BedTotals {
    /// Beds in Ok entities.
    pub available: u64,
    /// Beds in Stressed entities.
    pub stressed: u64,
    /// Beds in Failed entities.
    pub failed: u64,
}

impl BedTotals {
    /// Sum bed counts over entities that declare them.
    pub fn count(entities: &[Entity]) -> Self {
        entities.iter().fold(Self::default(), |mut acc, e| {
            if let Some(beds) = e.beds {
                let slot = match e.state {
                    InfrastructureState::Ok => &mut acc.available,
                    InfrastructureState::Stressed => &mut acc.stressed,
                    InfrastructureState::Failed => &mut acc.failed,
                };
                *slot = slot.saturating_add(beds);
            }
            acc
        })
    }
}

/// Accumulates one sample per whole hour since scenario start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BedChartTracker {
    available: Vec<ChartPoint>,
    stressed: Vec<ChartPoint>,
    failed: Vec<ChartPoint>,
}

impl BedChartTracker {
    /// Record totals at `now`. A sample in the same hour replaces the last one.
    pub fn record(&mut self, start: DateTime<Utc>, now: DateTime<Utc>, totals: BedTotals) {
        let minutes = (now - start).num_minutes();
        let hours = minutes.saturating_add(30).div_euclid(60);
        for (series, y) in [
            (&mut self.available, totals.available),
            (&mut self.stressed, totals.stressed),
            (&mut self.failed, totals.failed),
        ] {
            if series.last().is_some_and(|p| p.x == hours) {
                series.pop();
            }
            series.push(ChartPoint { x: hours, y });
        }
    }

    /// Drop all samples.
    pub fn clear(&mut self) {
        self.available.clear();
        self.stressed.clear();
        self.failed.clear();
    }

    /// The chart payload.
    pub fn to_chart(&self) -> BedChart {
        let series = |name: &str, values: &[ChartPoint]| ChartSeries {
            name: name.to_owned(),
            values: values.to_vec(),
        };
        BedChart {
            id: CHART_KEY.to_owned(),
            title: "Aantal bedden".to_owned(),
            series: vec![
                series("available", &self.available),
                series("failed", &self.failed),
                series("stressed", &self.stressed),
            ],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crisis_types::{EntityId, Feature, Geometry, Position};

    fn hospital(beds: u64, state: InfrastructureState) -> Entity {
        let f = Feature::new("h", Geometry::Point(Position::new(0.0, 0.0)))
            .with_property("Aantal bedden", beds);
        let mut e = Entity::from_feature(EntityId::from("h"), f);
        e.state = state;
        e
    }

    #[test]
    fn totals_split_by_state() {
        let totals = BedTotals::count(&[
            hospital(100, InfrastructureState::Ok),
            hospital(40, InfrastructureState::Stressed),
            hospital(10, InfrastructureState::Failed),
            hospital(5, InfrastructureState::Ok),
        ]);
        assert_eq!(
            totals,
            BedTotals {
                available: 105,
                stressed: 40,
                failed: 10
            }
        );
    }

    #[test]
    fn same_hour_sample_replaces_previous() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut tracker = BedChartTracker::default();
        let t = |available| BedTotals {
            available,
            ..BedTotals::default()
        };
        tracker.record(start, start, t(10));
        tracker.record(start, start + Duration::minutes(10), t(8));
        tracker.record(start, start + Duration::minutes(70), t(5));
        let chart = tracker.to_chart();
        let available = &chart.series.first().unwrap().values;
        assert_eq!(
            available,
            &vec![ChartPoint { x: 0, y: 8 }, ChartPoint { x: 1, y: 5 }]
        );
    }
}
