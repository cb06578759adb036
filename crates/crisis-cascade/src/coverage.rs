//! Cell coverage derived from communication tower state.
//!
//! Each tower that is not Failed contributes a disc of `+1` to the coverage
//! grid. Tower transitions stamp the disc incrementally instead of
//! recomputing the grid.

use std::collections::HashMap;

use crisis_geo::{Grid, GridHeader, RadialKernel, apply_kernel, lon_lat_factor};
use crisis_types::{EntityId, Feature, Geometry, InfrastructureState, Layer, layer_ids};
use serde_json::Value;
use tracing::debug;

use crate::entity::keys;

/// Coverage grid plus the last known state of every tower.
#[derive(Debug, Clone)]
pub struct CoverageModel {
    grid: Grid,
    kernel: RadialKernel,
    towers: HashMap<EntityId, InfrastructureState>,
}

impl CoverageModel {
    /// Coverage over `header` with a disc radius of `radius_cells` longitude
    /// cells.
    pub fn new(header: GridHeader, radius_cells: f64) -> Self {
        let radius = radius_cells * header.delta_lon;
        let kernel = RadialKernel::new(
            radius,
            header.delta_lon,
            header.delta_lat,
            lon_lat_factor(header.start_lat),
        );
        debug!(rows = kernel.rows(), columns = kernel.columns(), "Coverage kernel built");
        Self {
            grid: Grid::zeros(header),
            kernel,
            towers: HashMap::new(),
        }
    }

    /// The coverage grid.
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Rebuild coverage from a full tower snapshot, replacing every earlier
    /// tower and stamp.
    pub fn load_towers(&mut self, towers: &[Feature]) {
        self.grid.clear();
        self.towers.clear();
        for tower in towers {
            let Some(id) = tower.id.clone().map(EntityId) else {
                continue;
            };
            let state = tower_state(tower);
            if !state.is_failed() {
                self.stamp(tower, 1.0);
            }
            self.towers.insert(id, state);
        }
    }

    /// Apply a single tower update. Returns true when the grid changed.
    pub fn update_tower(&mut self, tower: &Feature) -> bool {
        let Some(id) = tower.id.clone().map(EntityId) else {
            return false;
        };
        let Some(previous) = self.towers.get(&id).copied() else {
            debug!(tower = %id, "Unknown tower");
            return false;
        };
        let state = tower_state(tower);
        self.towers.insert(id, state);
        match (previous.is_failed(), state.is_failed()) {
            (true, false) => self.stamp(tower, 1.0),
            (false, true) => self.stamp(tower, -1.0),
            _ => false,
        }
    }

    /// Coverage as a grid layer.
    pub fn to_layer(&self) -> Layer {
        Layer::grid(layer_ids::COVERAGE, self.grid.to_esri_string())
    }

    fn stamp(&mut self, tower: &Feature, sign: f64) -> bool {
        let Geometry::Point(location) = tower.geometry else {
            return false;
        };
        let Some((row, col)) = self.grid.header().cell_of(location) else {
            return false;
        };
        apply_kernel(&mut self.grid, row, col, &self.kernel, sign);
        true
    }
}

fn tower_state(tower: &Feature) -> InfrastructureState {
    tower
        .properties
        .get(keys::STATE)
        .cloned()
        .and_then(|v: Value| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crisis_types::Position;

    fn header() -> GridHeader {
        // 20x20 cells of 0.01 degrees, north-west corner at (4.0, 52.2).
        GridHeader::new(4.0, 52.2, 0.01, -0.01, 20, 20)
    }

    fn tower(id: &str, state: u8) -> Feature {
        Feature::new(id, Geometry::Point(Position::new(4.105, 52.095))).with_property("state", state)
    }

    fn total(model: &CoverageModel) -> f64 {
        model.grid().values().iter().sum()
    }

    #[test]
    fn snapshot_stamps_live_towers_only() {
        let mut m = CoverageModel::new(header(), 3.0);
        m.load_towers(&[tower("a", 0), tower("b", 2)]);
        let one = total(&m);
        assert!(one > 0.0);

        m.load_towers(&[tower("a", 0), tower("b", 1)]);
        assert!((total(&m) - 2.0 * one).abs() < f64::EPSILON);
    }

    #[test]
    fn failure_and_recovery_round_trip() {
        let mut m = CoverageModel::new(header(), 3.0);
        m.load_towers(&[tower("a", 0)]);
        let before = m.grid().clone();

        assert!(m.update_tower(&tower("a", 2)));
        assert!(total(&m).abs() < f64::EPSILON);
        assert!(!m.update_tower(&tower("a", 2)));

        assert!(m.update_tower(&tower("a", 0)));
        assert_eq!(m.grid(), &before);
    }

    #[test]
    fn unknown_tower_is_ignored() {
        let mut m = CoverageModel::new(header(), 3.0);
        m.load_towers(&[tower("a", 0)]);
        assert!(!m.update_tower(&tower("zz", 2)));
    }

    #[test]
    fn layer_is_esri_grid() {
        let m = CoverageModel::new(header(), 3.0);
        let layer = m.to_layer();
        assert_eq!(layer.id, "cellcoverage");
        assert!(layer.data.unwrap().starts_with("ncols 20\nnrows 20\n"));
    }
}
