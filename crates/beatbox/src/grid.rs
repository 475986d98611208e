//! Step grid
//!
//! A rows x cols activation matrix. Each row belongs to one registered sample,
//! each column is one step of the measure. A cell is either active or not.

use thiserror::Error;

use crate::primitives::SampleId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("cell ({row}, {col}) is outside the {rows}x{cols} grid")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
}

#[derive(Debug, Clone)]
pub struct StepGrid {
    rows: Vec<SampleId>,
    cols: usize,
    /// Row-major, `rows.len() * cols` cells
    cells: Vec<bool>,
}

impl StepGrid {
    /// Empty grid with a fixed column count
    pub fn new(cols: usize) -> Self {
        Self {
            rows: Vec::new(),
            cols,
            cells: Vec::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn sample_at(&self, row: usize) -> Option<SampleId> {
        self.rows.get(row).copied()
    }

    pub fn row_of(&self, sample: SampleId) -> Option<usize> {
        self.rows.iter().position(|&id| id == sample)
    }

    /// Append one all-inactive row for `sample`. Returns the new row index.
    pub fn append_row(&mut self, sample: SampleId) -> usize {
        self.rows.push(sample);
        self.cells.resize(self.cells.len() + self.cols, false);
        self.rows.len() - 1
    }

    /// Flip a cell. Out-of-range coordinates leave the grid unchanged.
    pub fn toggle(&mut self, row: usize, col: usize) -> Result<bool, GridError> {
        let idx = self.index(row, col)?;
        self.cells[idx] = !self.cells[idx];
        Ok(self.cells[idx])
    }

    /// Set a cell explicitly. Returns the previous value.
    pub fn set(&mut self, row: usize, col: usize, active: bool) -> Result<bool, GridError> {
        let idx = self.index(row, col)?;
        Ok(std::mem::replace(&mut self.cells[idx], active))
    }

    pub fn is_active(&self, row: usize, col: usize) -> Result<bool, GridError> {
        Ok(self.cells[self.index(row, col)?])
    }

    /// Rows active at `col`, in row order, with their sample ids.
    ///
    /// An out-of-range column yields nothing.
    pub fn active_at(&self, col: usize) -> impl Iterator<Item = (usize, SampleId)> + '_ {
        let cols = self.cols;
        self.rows
            .iter()
            .enumerate()
            .filter(move |(row, _)| col < cols && self.cells[row * cols + col])
            .map(|(row, id)| (row, *id))
    }

    fn index(&self, row: usize, col: usize) -> Result<usize, GridError> {
        if row >= self.rows.len() || col >= self.cols {
            return Err(GridError::OutOfBounds {
                row,
                col,
                rows: self.rows.len(),
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_with_rows(rows: usize, cols: usize) -> StepGrid {
        let mut grid = StepGrid::new(cols);
        for _ in 0..rows {
            grid.append_row(SampleId::new());
        }
        grid
    }

    #[test]
    fn test_double_toggle_restores_every_cell() {
        let mut grid = grid_with_rows(3, 8);
        grid.toggle(1, 5).unwrap();

        for row in 0..3 {
            for col in 0..8 {
                let before = grid.is_active(row, col).unwrap();
                grid.toggle(row, col).unwrap();
                assert_ne!(grid.is_active(row, col).unwrap(), before);
                grid.toggle(row, col).unwrap();
                assert_eq!(grid.is_active(row, col).unwrap(), before);
            }
        }
    }

    #[test]
    fn test_out_of_bounds_is_rejected() {
        let mut grid = grid_with_rows(2, 4);
        grid.toggle(0, 0).unwrap();

        assert_eq!(
            grid.toggle(2, 0),
            Err(GridError::OutOfBounds {
                row: 2,
                col: 0,
                rows: 2,
                cols: 4
            })
        );
        assert!(grid.toggle(0, 4).is_err());

        let active: Vec<_> = (0..4).flat_map(|c| grid.active_at(c).map(move |(r, _)| (r, c))).collect();
        assert_eq!(active, vec![(0, 0)]);
    }

    #[test]
    fn test_active_at_is_row_ordered() {
        let mut grid = grid_with_rows(4, 8);
        grid.toggle(3, 2).unwrap();
        grid.toggle(0, 2).unwrap();
        grid.toggle(2, 2).unwrap();
        grid.toggle(1, 3).unwrap();

        let rows: Vec<_> = grid.active_at(2).map(|(row, _)| row).collect();
        assert_eq!(rows, vec![0, 2, 3]);
        assert_eq!(grid.active_at(99).count(), 0);
    }

    #[test]
    fn test_append_row_preserves_existing_cells() {
        let mut grid = grid_with_rows(2, 4);
        grid.toggle(0, 1).unwrap();
        grid.toggle(1, 3).unwrap();

        let id = SampleId::new();
        let row = grid.append_row(id);

        assert_eq!(row, 2);
        assert_eq!(grid.sample_at(2), Some(id));
        assert!(grid.is_active(0, 1).unwrap());
        assert!(grid.is_active(1, 3).unwrap());
        assert!((0..4).all(|c| !grid.is_active(2, c).unwrap()));
        assert_eq!(grid.cols(), 4);
        assert_eq!(grid.row_of(id), Some(2));
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut grid = grid_with_rows(1, 4);
        assert!(!grid.set(0, 2, true).unwrap());
        assert!(grid.set(0, 2, true).unwrap());
        assert!(grid.is_active(0, 2).unwrap());
        assert!(grid.set(0, 9, true).is_err());
    }
}
