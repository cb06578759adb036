//! Error types for the `crisis-geo` crate.

/// Errors raised while reading or building grids.
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    /// A required ESRI header key is missing.
    #[error("grid header is missing '{key}'")]
    MissingHeader {
        /// The missing key, e.g. `ncols`.
        key: &'static str,
    },

    /// A header value or a cell value could not be parsed as a number.
    #[error("invalid number '{value}' at line {line}")]
    InvalidNumber {
        /// The offending token.
        value: String,
        /// One-based line number.
        line: usize,
    },

    /// The grid body holds a different number of cells than the header declares.
    #[error("grid declares {expected} cells but holds {actual}")]
    CellCountMismatch {
        /// `nrows * ncols`.
        expected: usize,
        /// Cells actually read.
        actual: usize,
    },

    /// Cell sizes must be finite and non-zero.
    #[error("invalid cell size {size}")]
    InvalidCellSize {
        /// The rejected size.
        size: f64,
    },
}
