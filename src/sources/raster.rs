use crate::error::{GraphError, Result};
use crate::geometry::euclidean_distance;
use geo::{Coord, Line};

/// One pixel hit while walking along a line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterSample {
    /// Pixel centroid
    pub coord: Coord,
    pub col: usize,
    pub row: usize,
    pub value: f64,
}

/// Pixel access to a north-up raster. Row 0 is the top row.
pub trait RasterSource {
    fn name(&self) -> &str;

    fn band_count(&self) -> usize;

    /// (columns, rows)
    fn dimensions(&self) -> (usize, usize);

    /// (width, height) of one pixel in map units
    fn pixel_size(&self) -> (f64, f64);

    /// Pixel containing `coord`, or `None` outside the extent.
    fn pixel_at(&self, coord: Coord) -> Option<(usize, usize)>;

    fn pixel_center(&self, col: usize, row: usize) -> Coord;

    /// Value of a pixel, `None` for nodata or out-of-range pixels.
    fn value(&self, band: usize, col: usize, row: usize) -> Option<f64>;

    /// Smallest non-negative pixel value of a band.
    fn min_non_negative(&self, band: usize) -> Option<f64> {
        let (cols, rows) = self.dimensions();
        (0..rows)
            .flat_map(|row| (0..cols).map(move |col| (col, row)))
            .filter_map(|(col, row)| self.value(band, col, row))
            .filter(|v| *v >= 0.0)
            .reduce(f64::min)
    }

    fn check_band(&self, band: usize) -> Result<()> {
        if band >= self.band_count() {
            return Err(GraphError::collaborator(
                "raster",
                format!(
                    "band {band} requested but '{}' has {} band(s)",
                    self.name(),
                    self.band_count()
                ),
            ));
        }
        Ok(())
    }

    /// Pixel values along `line`, one sample per distinct pixel crossed, in
    /// travel order. Nodata pixels and positions outside the raster are skipped.
    fn sample_line(&self, band: usize, line: &Line) -> Result<Vec<RasterSample>> {
        self.check_band(band)?;
        let (pw, ph) = self.pixel_size();
        let step = pw.min(ph);
        let length = euclidean_distance(line.start, line.end);
        let count = (length / step).ceil() as usize + 1;

        let mut samples = Vec::new();
        let mut last_pixel = None;
        for i in 0..count {
            let t = if count == 1 {
                0.0
            } else {
                i as f64 / (count - 1) as f64
            };
            let position = Coord {
                x: line.start.x + t * line.dx(),
                y: line.start.y + t * line.dy(),
            };
            let Some(pixel) = self.pixel_at(position) else {
                continue;
            };
            if last_pixel == Some(pixel) {
                continue;
            }
            last_pixel = Some(pixel);
            if let Some(value) = self.value(band, pixel.0, pixel.1) {
                samples.push(RasterSample {
                    coord: self.pixel_center(pixel.0, pixel.1),
                    col: pixel.0,
                    row: pixel.1,
                    value,
                });
            }
        }

        if samples.is_empty() {
            return Err(GraphError::collaborator(
                "raster",
                format!("no data along line in '{}'", self.name()),
            ));
        }
        Ok(samples)
    }

    fn sample_point(&self, band: usize, coord: Coord) -> Result<RasterSample> {
        self.check_band(band)?;
        let (col, row) = self.pixel_at(coord).ok_or_else(|| {
            GraphError::collaborator("raster", format!("point outside '{}'", self.name()))
        })?;
        let value = self.value(band, col, row).ok_or_else(|| {
            GraphError::collaborator("raster", format!("nodata at point in '{}'", self.name()))
        })?;
        Ok(RasterSample {
            coord: self.pixel_center(col, row),
            col,
            row,
            value,
        })
    }
}

/// In-memory raster with square or rectangular pixels.
#[derive(Debug, Clone)]
pub struct GridRaster {
    name: String,
    /// Upper left corner
    origin: Coord,
    pixel_width: f64,
    pixel_height: f64,
    cols: usize,
    rows: usize,
    nodata: Option<f64>,
    // row-major, top row first
    bands: Vec<Vec<f64>>,
}

impl GridRaster {
    pub fn new(
        name: impl Into<String>,
        origin: Coord,
        pixel_size: (f64, f64),
        cols: usize,
        rows: usize,
        bands: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if pixel_size.0 <= 0.0 || pixel_size.1 <= 0.0 {
            return Err(GraphError::config("pixel size must be positive"));
        }
        if bands.is_empty() {
            return Err(GraphError::config("raster needs at least one band"));
        }
        if let Some(band) = bands.iter().find(|b| b.len() != cols * rows) {
            return Err(GraphError::config(format!(
                "band has {} values, expected {}x{}",
                band.len(),
                cols,
                rows
            )));
        }
        Ok(Self {
            name: name.into(),
            origin,
            pixel_width: pixel_size.0,
            pixel_height: pixel_size.1,
            cols,
            rows,
            nodata: None,
            bands,
        })
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Parses an ESRI ASCII grid (`ncols`, `nrows`, `xllcorner`/`xllcenter`,
    /// `yllcorner`/`yllcenter`, `cellsize`, optional `NODATA_value`).
    pub fn from_ascii_grid(name: impl Into<String>, text: &str) -> Result<Self> {
        let mut ncols = None;
        let mut nrows = None;
        let mut xll = None;
        let mut yll = None;
        let mut centered = false;
        let mut cellsize = None;
        let mut nodata = None;
        let mut values = Vec::new();

        for line in text.lines() {
            let mut parts = line.split_whitespace().peekable();
            let Some(first) = parts.peek().copied() else {
                continue;
            };
            let is_header = first
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic());
            if is_header {
                parts.next();
                let value: f64 = parts
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| GraphError::config(format!("bad grid header line '{line}'")))?;
                match first.to_lowercase().as_str() {
                    "ncols" => ncols = Some(value as usize),
                    "nrows" => nrows = Some(value as usize),
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
                    "nodata_value" => nodata = Some(value),
                    other => {
                        return Err(GraphError::config(format!("unknown grid header '{other}'")));
                    }
                }
                continue;
            }
            for token in parts {
                let v: f64 = token
                    .parse()
                    .map_err(|_| GraphError::config(format!("bad grid value '{token}'")))?;
                values.push(v);
            }
        }

        let missing = |field: &str| GraphError::config(format!("grid header lacks {field}"));
        let cols = ncols.ok_or_else(|| missing("ncols"))?;
        let rows = nrows.ok_or_else(|| missing("nrows"))?;
        let mut x = xll.ok_or_else(|| missing("xllcorner"))?;
        let mut y = yll.ok_or_else(|| missing("yllcorner"))?;
        let size = cellsize.ok_or_else(|| missing("cellsize"))?;
        if centered {
            x -= size / 2.0;
            y -= size / 2.0;
        }

        let origin = Coord {
            x,
            y: y + rows as f64 * size,
        };
        let raster = Self::new(name, origin, (size, size), cols, rows, vec![values])?;
        Ok(match nodata {
            Some(nd) => raster.with_nodata(nd),
            None => raster,
        })
    }
}

impl RasterSource for GridRaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    fn pixel_size(&self) -> (f64, f64) {
        (self.pixel_width, self.pixel_height)
    }

    fn pixel_at(&self, coord: Coord) -> Option<(usize, usize)> {
        let col = ((coord.x - self.origin.x) / self.pixel_width).floor();
        let row = ((self.origin.y - coord.y) / self.pixel_height).floor();
        if col < 0.0 || row < 0.0 || col >= self.cols as f64 || row >= self.rows as f64 {
            return None;
        }
        Some((col as usize, row as usize))
    }

    fn pixel_center(&self, col: usize, row: usize) -> Coord {
        Coord {
            x: self.origin.x + (col as f64 + 0.5) * self.pixel_width,
            y: self.origin.y - (row as f64 + 0.5) * self.pixel_height,
        }
    }

    fn value(&self, band: usize, col: usize, row: usize) -> Option<f64> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        let v = *self.bands.get(band)?.get(row * self.cols + col)?;
        match self.nodata {
            Some(nd) if v == nd => None,
            _ if v.is_nan() => None,
            _ => Some(v),
        }
    }
}
