//! Radial kernels for incremental raster updates.
//!
//! A [`RadialKernel`] stores one quadrant of a disc. [`apply_kernel`] mirrors
//! it into all four quadrants around a centre cell, so stamping with `+1`
//! and later `-1` restores the grid exactly.

use crate::grid::Grid;

/// Length in metres of one degree of latitude and one degree of longitude
/// at the given latitude, as `(lat_len, lon_len)`.
pub fn meters_per_degree(lat_deg: f64) -> (f64, f64) {
    let phi = lat_deg.to_radians();
    let lat_len = 1.175f64.mul_add(
        (4.0 * phi).cos(),
        559.82f64.mul_add(-(2.0 * phi).cos(), 111_132.92),
    ) - 0.0023 * (6.0 * phi).cos();
    let lon_len = 0.118f64.mul_add(
        (5.0 * phi).cos(),
        111_412.84f64.mul_add(phi.cos(), -93.5 * (3.0 * phi).cos()),
    );
    (lat_len, lon_len)
}

/// Ratio of ground distance per degree longitude to per degree latitude.
pub fn lon_lat_factor(lat_deg: f64) -> f64 {
    let (lat_len, lon_len) = meters_per_degree(lat_deg);
    lon_len / lat_len
}

/// One quadrant of a disc mask. Cell `(i, j)` is `i` rows and `j` columns
/// away from the centre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadialKernel {
    rows: usize,
    columns: usize,
    mask: Vec<u8>,
}

impl RadialKernel {
    /// Build the quadrant for `max_radius` (in latitude degrees).
    ///
    /// Longitude distances are scaled by `lon_factor` so the footprint is a
    /// circle on the ground.
    pub fn new(max_radius: f64, delta_lon: f64, delta_lat: f64, lon_factor: f64) -> Self {
        let scaled_lon = delta_lon * lon_factor;
        let columns = cell_span(max_radius / scaled_lon);
        let rows = cell_span(max_radius / delta_lat);
        let mut mask = Vec::with_capacity(rows.saturating_mul(columns));
        for i in 0..rows {
            for j in 0..columns {
                let di = i as f64 * delta_lat;
                let dj = j as f64 * scaled_lon;
                mask.push(u8::from(di.hypot(dj) < max_radius));
            }
        }
        Self {
            rows,
            columns,
            mask,
        }
    }

    /// Quadrant height in cells.
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Quadrant width in cells.
    pub const fn columns(&self) -> usize {
        self.columns
    }

    /// Mask value at quadrant offset `(i, j)`; zero outside the quadrant.
    pub fn weight(&self, i: usize, j: usize) -> u8 {
        if i >= self.rows || j >= self.columns {
            return 0;
        }
        i.checked_mul(self.columns)
            .and_then(|r| r.checked_add(j))
            .and_then(|idx| self.mask.get(idx))
            .copied()
            .unwrap_or(0)
    }

    /// Number of grid cells the mirrored kernel covers.
    pub fn footprint(&self) -> usize {
        let mut total = 0usize;
        for i in 0..self.rows {
            for j in 0..self.columns {
                if self.weight(i, j) == 1 {
                    let mirrors = match (i, j) {
                        (0, 0) => 1usize,
                        (0, _) | (_, 0) => 2,
                        _ => 4,
                    };
                    total = total.saturating_add(mirrors);
                }
            }
        }
        total
    }
}

/// Add `sign * kernel[|di|][|dj|]` to every cell around `(row, col)`,
/// clipped at the grid edges.
pub fn apply_kernel(grid: &mut Grid, row: usize, col: usize, kernel: &RadialKernel, sign: f64) {
    let header = *grid.header();
    let row_span = signed(kernel.rows());
    let col_span = signed(kernel.columns());
    let centre_row = signed(row);
    let centre_col = signed(col);
    for di in (1 - row_span)..row_span {
        for dj in (1 - col_span)..col_span {
            let weight = kernel.weight(di.unsigned_abs(), dj.unsigned_abs());
            if weight == 0 {
                continue;
            }
            let (Some(r), Some(c)) = (
                in_range(centre_row.saturating_add(di), header.rows),
                in_range(centre_col.saturating_add(dj), header.columns),
            ) else {
                continue;
            };
            if let Some(cell) = grid.get_mut(r, c) {
                *cell += sign * f64::from(weight);
            }
        }
    }
}

fn cell_span(cells: f64) -> usize {
    let span = cells.floor().abs();
    if span.is_finite() {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let span = span as usize;
        span
    } else {
        0
    }
}

fn signed(n: usize) -> isize {
    isize::try_from(n).unwrap_or(isize::MAX)
}

fn in_range(idx: isize, len: usize) -> Option<usize> {
    usize::try_from(idx).ok().filter(|i| *i < len)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::grid::GridHeader;

    #[test]
    fn factor_is_about_point_six_in_the_netherlands() {
        let f = lon_lat_factor(52.0);
        assert!((0.60..0.63).contains(&f), "factor {f}");
        assert!((lon_lat_factor(0.0) - 1.0).abs() < 0.01);
    }

    #[test]
    fn quadrant_is_disc_shaped() {
        let k = RadialKernel::new(5.0, 1.0, 1.0, 1.0);
        assert_eq!((k.rows(), k.columns()), (5, 5));
        assert_eq!(k.weight(0, 0), 1);
        assert_eq!(k.weight(0, 4), 1);
        assert_eq!(k.weight(3, 3), 1);
        assert_eq!(k.weight(3, 4), 0);
        assert_eq!(k.weight(4, 3), 0);
        assert_eq!(k.weight(4, 4), 0);
        assert_eq!(k.weight(9, 0), 0);
    }

    #[test]
    fn stamp_and_unstamp_restores_grid() {
        let header = GridHeader::new(0.0, 0.0, 1.0, 1.0, 5, 5);
        let values: Vec<f64> = (0..25).map(f64::from).collect();
        let original = Grid::from_values(header, values).unwrap();
        let kernel = RadialKernel::new(2.5, 1.0, 1.0, 1.0);
        assert_eq!((kernel.rows(), kernel.columns()), (2, 2));

        let mut grid = original.clone();
        apply_kernel(&mut grid, 2, 2, &kernel, 1.0);
        let mut changed = 0;
        for r in 0..5 {
            for c in 0..5 {
                let delta = grid.get(r, c).unwrap() - original.get(r, c).unwrap();
                let expected = if (1..=3).contains(&r) && (1..=3).contains(&c) { 1.0 } else { 0.0 };
                assert!((delta - expected).abs() < f64::EPSILON, "cell ({r},{c})");
                if delta > 0.5 {
                    changed += 1;
                }
            }
        }
        assert_eq!(changed, kernel.footprint());

        apply_kernel(&mut grid, 2, 2, &kernel, -1.0);
        assert_eq!(grid, original);
    }

    #[test]
    fn stamp_is_clipped_at_edges() {
        let header = GridHeader::new(0.0, 0.0, 1.0, 1.0, 3, 3);
        let mut grid = Grid::zeros(header);
        let kernel = RadialKernel::new(2.5, 1.0, 1.0, 1.0);
        apply_kernel(&mut grid, 0, 0, &kernel, 1.0);
        let total: f64 = grid.values().iter().sum();
        assert!((total - 4.0).abs() < f64::EPSILON);
    }
}
