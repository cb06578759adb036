//! Geospatial utilities used by the cascade engine.
//!
//! All coordinates are `[lon, lat]` degrees. Nothing here allocates per
//! query except grid parsing and kernel construction.
//!
//! # Modules
//!
//! - [`polygon`] -- Ray-casting containment for points, lines and (multi)polygons.
//! - [`grid`] -- Regular lon/lat grids with ESRI ASCII parsing and sampling.
//! - [`kernel`] -- Radial quadrant kernels and incremental stamping onto grids.
//! - [`error`] -- Error types for grid parsing.

pub mod error;
pub mod grid;
pub mod kernel;
pub mod polygon;

pub use error::GeoError;
pub use grid::{Grid, GridHeader, NO_DATA};
pub use kernel::{RadialKernel, apply_kernel, lon_lat_factor, meters_per_degree};
pub use polygon::{
    geometry_in_area, line_in_polygon, multi_polygon_contains, point_in_polygon, point_in_ring,
};
