//! Grid layout arithmetic
//!
//! The grid is the most nearly square arrangement that fits every client:
//! `cols = ceil(sqrt(n))`, `rows = ceil(n / cols)`. Ties go to more columns,
//! so two clients sit side by side rather than stacked.

/// Rows and columns of a composite grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    /// Number of rows
    pub rows: u32,
    /// Number of columns
    pub cols: u32,
}

impl GridLayout {
    /// Layout for `n` clients
    ///
    /// Zero clients yields a single 1x1 cell.
    pub fn for_clients(n: usize) -> Self {
        if n == 0 {
            return Self { rows: 1, cols: 1 };
        }

        let cols = ceil_sqrt(n);
        let rows = n.div_ceil(cols);
        Self {
            rows: rows as u32,
            cols: cols as u32,
        }
    }

    /// Total number of cells
    pub fn cells(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Top-left pixel of cell `index`
    ///
    /// Only meaningful for layouts whose [`canvas_size`](Self::canvas_size)
    /// fits; out-of-range offsets saturate instead of wrapping.
    pub fn cell_offset(&self, index: usize, cell_width: u32, cell_height: u32) -> (u32, u32) {
        let cols = self.cols as usize;
        let col = u32::try_from(index % cols).unwrap_or(u32::MAX);
        let row = u32::try_from(index / cols).unwrap_or(u32::MAX);
        (col.saturating_mul(cell_width), row.saturating_mul(cell_height))
    }

    /// Canvas size in pixels as `(width, height)`
    ///
    /// `None` when either side does not fit in a `u32`.
    pub fn canvas_size(&self, cell_width: u32, cell_height: u32) -> Option<(u32, u32)> {
        Some((
            self.cols.checked_mul(cell_width)?,
            self.rows.checked_mul(cell_height)?,
        ))
    }
}

/// Smallest `c` with `c * c >= n`
fn ceil_sqrt(n: usize) -> usize {
    let mut c = (n as f64).sqrt() as usize;
    while c * c < n {
        c += 1;
    }
    while c > 1 && (c - 1) * (c - 1) >= n {
        c -= 1;
    }
    c.max(1)
}
