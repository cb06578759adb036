//! Regular lon/lat grids.
//!
//! A [`Grid`] is row-major with row 0 at `start_lat`. Grids read from ESRI
//! ASCII text start at the north edge and carry a negative `delta_lat`, so
//! the same `floor((p - origin) / delta)` mapping works for both
//! orientations.

use core::fmt::Write as _;

use crisis_types::Position;

use crate::error::GeoError;

/// Value returned by [`Grid::sample`] for points outside the grid.
pub const NO_DATA: f64 = -1.0;

/// Placement and size of a grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridHeader {
    /// Longitude of the origin edge.
    pub start_lon: f64,
    /// Latitude of the origin edge.
    pub start_lat: f64,
    /// Cell width in degrees longitude.
    pub delta_lon: f64,
    /// Cell height in degrees latitude; negative when row 0 is the north edge.
    pub delta_lat: f64,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub columns: usize,
    /// Sentinel for cells without data, if declared.
    pub no_data_value: Option<f64>,
}

impl GridHeader {
    /// Create a header with no declared no-data sentinel.
    pub const fn new(
        start_lon: f64,
        start_lat: f64,
        delta_lon: f64,
        delta_lat: f64,
        rows: usize,
        columns: usize,
    ) -> Self {
        Self {
            start_lon,
            start_lat,
            delta_lon,
            delta_lat,
            rows,
            columns,
            no_data_value: None,
        }
    }

    /// Total number of cells.
    pub const fn cell_count(&self) -> usize {
        self.rows.saturating_mul(self.columns)
    }

    /// Row and column of the cell holding `point`, if inside the grid.
    pub fn cell_of(&self, point: Position) -> Option<(usize, usize)> {
        let col = axis_index((point.lon - self.start_lon) / self.delta_lon, self.columns)?;
        let row = axis_index((point.lat - self.start_lat) / self.delta_lat, self.rows)?;
        Some((row, col))
    }

    /// Parse the header lines of an ESRI ASCII grid.
    ///
    /// Returns the header and the number of lines it occupied.
    pub fn parse_esri(text: &str) -> Result<(Self, usize), GeoError> {
        let mut ncols = None;
        let mut nrows = None;
        let mut xll = None;
        let mut yll = None;
        let mut centered = false;
        let mut cellsize = None;
        let mut no_data = None;
        let mut consumed = 0usize;

        for (idx, line) in text.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else {
                consumed = idx.saturating_add(1);
                continue;
            };
            if !key.starts_with(|c: char| c.is_ascii_alphabetic()) {
                break;
            }
            let raw = tokens.next().unwrap_or_default();
            let line_no = idx.saturating_add(1);
            let value = parse_number(raw, line_no)?;
            match key.to_ascii_lowercase().as_str() {
                "ncols" => ncols = Some(value),
                "nrows" => nrows = Some(value),
                "xllcorner" => xll = Some(value),
                "yllcorner" => yll = Some(value),
                "xllcenter" => {
                    xll = Some(value);
                    centered = true;
                }
                "yllcenter" => {
                    yll = Some(value);
                    centered = true;
                }
                "cellsize" => cellsize = Some(value),
                "nodata_value" => no_data = Some(value),
                _ => {}
            }
            consumed = line_no;
        }

        let columns = count(ncols.ok_or(GeoError::MissingHeader { key: "ncols" })?);
        let rows = count(nrows.ok_or(GeoError::MissingHeader { key: "nrows" })?);
        let size = cellsize.ok_or(GeoError::MissingHeader { key: "cellsize" })?;
        if !size.is_finite() || size.abs() <= f64::EPSILON {
            return Err(GeoError::InvalidCellSize { size });
        }
        let mut xll = xll.ok_or(GeoError::MissingHeader { key: "xllcorner" })?;
        let mut yll = yll.ok_or(GeoError::MissingHeader { key: "yllcorner" })?;
        if centered {
            xll -= size / 2.0;
            yll -= size / 2.0;
        }

        let header = Self {
            start_lon: xll,
            start_lat: (rows as f64).mul_add(size, yll),
            delta_lon: size,
            delta_lat: -size,
            rows,
            columns,
            no_data_value: no_data,
        };
        Ok((header, consumed))
    }

    /// ESRI ASCII header text, one key per line.
    pub fn to_esri_header(&self) -> String {
        let south = self
            .start_lat
            .min((self.rows as f64).mul_add(self.delta_lat, self.start_lat));
        let mut out = String::new();
        let _ = writeln!(out, "ncols {}", self.columns);
        let _ = writeln!(out, "nrows {}", self.rows);
        let _ = writeln!(out, "xllcorner {}", self.start_lon);
        let _ = writeln!(out, "yllcorner {south}");
        let _ = writeln!(out, "cellsize {}", self.delta_lon.abs());
        if let Some(nd) = self.no_data_value {
            let _ = writeln!(out, "NODATA_value {nd}");
        }
        out
    }
}

/// A header plus row-major cell values.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    header: GridHeader,
    values: Vec<f64>,
}

impl Grid {
    /// A grid of zeros.
    pub fn zeros(header: GridHeader) -> Self {
        Self {
            values: vec![0.0; header.cell_count()],
            header,
        }
    }

    /// Build from row-major values.
    pub fn from_values(header: GridHeader, values: Vec<f64>) -> Result<Self, GeoError> {
        if values.len() != header.cell_count() {
            return Err(GeoError::CellCountMismatch {
                expected: header.cell_count(),
                actual: values.len(),
            });
        }
        Ok(Self { header, values })
    }

    /// Parse a complete ESRI ASCII grid.
    pub fn parse_esri(text: &str) -> Result<Self, GeoError> {
        let (header, consumed) = GridHeader::parse_esri(text)?;
        let mut values = Vec::with_capacity(header.cell_count());
        for (idx, line) in text.lines().enumerate().skip(consumed) {
            for token in line.split_whitespace() {
                values.push(parse_number(token, idx.saturating_add(1))?);
            }
        }
        Self::from_values(header, values)
    }

    /// The grid header.
    pub const fn header(&self) -> &GridHeader {
        &self.header
    }

    /// Row-major cell values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn offset(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.header.rows || col >= self.header.columns {
            return None;
        }
        row.checked_mul(self.header.columns)?.checked_add(col)
    }

    /// Value of a cell.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.offset(row, col)
            .and_then(|i| self.values.get(i))
            .copied()
    }

    /// Mutable access to a cell.
    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut f64> {
        self.offset(row, col).and_then(|i| self.values.get_mut(i))
    }

    /// Value at a geographic point, or [`NO_DATA`] outside the grid.
    pub fn sample(&self, point: Position) -> f64 {
        self.header
            .cell_of(point)
            .and_then(|(row, col)| self.get(row, col))
            .unwrap_or(NO_DATA)
    }

    /// Largest sampled value over several points, or [`NO_DATA`] for none.
    pub fn sample_max<'a>(&self, points: impl IntoIterator<Item = &'a Position>) -> f64 {
        points
            .into_iter()
            .map(|p| self.sample(*p))
            .fold(NO_DATA, f64::max)
    }

    /// Reset every cell to zero.
    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Serialize as ESRI ASCII text, north row first.
    pub fn to_esri_string(&self) -> String {
        let mut out = self.header.to_esri_header();
        let columns = self.header.columns.max(1);
        let rows: Vec<&[f64]> = self.values.chunks(columns).collect();
        let ordered: Box<dyn Iterator<Item = &&[f64]>> = if self.header.delta_lat > 0.0 {
            Box::new(rows.iter().rev())
        } else {
            Box::new(rows.iter())
        };
        let body: Vec<String> = ordered
            .map(|row| {
                row.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        out.push_str(&body.join("\n"));
        out
    }
}

/// Floor a fractional index into `[0, len)`.
fn axis_index(fraction: f64, len: usize) -> Option<usize> {
    let idx = fraction.floor();
    if !idx.is_finite() || idx < 0.0 || idx >= len as f64 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let idx = idx as usize;
    Some(idx)
}

fn count(value: f64) -> usize {
    if value.is_finite() && value > 0.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = value as usize;
        n
    } else {
        0
    }
}

fn parse_number(token: &str, line: usize) -> Result<f64, GeoError> {
    token.parse().map_err(|_err| GeoError::InvalidNumber {
        value: token.to_owned(),
        line,
    })
}
