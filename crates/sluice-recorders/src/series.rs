//! Series storage
//!
//! Dense per-run buffers and the fixed-depth circular buffer backing the
//! rolling-window recorders.

/// Dense row-major `[rows × cols]` buffer of f64 samples.
///
/// Recorders use it as `[timesteps × scenarios]` (one row written per
/// step) and as `[percentiles × scenarios]` for computed curves.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Series {
    /// A zero-filled buffer.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from explicit rows. Returns `None` if the rows are ragged.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Option<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != n_cols) {
            return None;
        }
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            data.extend_from_slice(&row);
        }
        Some(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// One row as a contiguous slice.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// One column, gathered into a fresh vector in row order.
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    /// Overwrite every cell.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }
}

/// Fixed-depth circular buffer with one lane per scenario combination.
///
/// Writes wrap at the window length; reads reconstruct a lane's valid
/// history oldest to newest. During the first `window - 1` pushes the
/// valid history is the partial prefix, not a full window.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    window: usize,
    lanes: usize,
    data: Vec<f64>,
    cursor: usize,
    pushed: usize,
}

impl RingBuffer {
    pub fn new(window: usize, lanes: usize) -> Self {
        Self {
            window,
            lanes,
            data: vec![0.0; window * lanes],
            cursor: 0,
            pushed: 0,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Number of valid samples per lane, at most the window length.
    pub fn filled(&self) -> usize {
        self.pushed.min(self.window)
    }

    /// The value that the next push will overwrite in `lane`, if the
    /// buffer is already full.
    pub fn evicting(&self, lane: usize) -> Option<f64> {
        if self.pushed >= self.window {
            Some(self.data[self.cursor * self.lanes + lane])
        } else {
            None
        }
    }

    /// Write one sample per lane at the cursor and advance it.
    pub fn push_row(&mut self, row: &[f64]) {
        debug_assert_eq!(row.len(), self.lanes);
        let base = self.cursor * self.lanes;
        self.data[base..base + self.lanes].copy_from_slice(row);
        self.cursor = (self.cursor + 1) % self.window;
        self.pushed += 1;
    }

    /// Valid history of one lane, oldest to newest.
    pub fn lane(&self, lane: usize) -> Vec<f64> {
        let filled = self.filled();
        let mut out = Vec::with_capacity(filled);
        // Oldest sample sits at the cursor once the buffer has wrapped,
        // at row zero before that.
        let start = if self.pushed >= self.window {
            self.cursor
        } else {
            0
        };
        for i in 0..filled {
            let row = (start + i) % self.window;
            out.push(self.data[row * self.lanes + lane]);
        }
        out
    }

    /// Forget all samples and rewind the cursor.
    pub fn reset(&mut self) {
        self.data.fill(0.0);
        self.cursor = 0;
        self.pushed = 0;
    }
}
