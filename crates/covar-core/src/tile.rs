use std::fmt;

use crate::{CovarError, Result};

/// A dense row-major block of `f64` values — the unit of scheduling.
///
/// Tiles are square for factorization targets and rectangular for
/// cross-covariance and right-hand-side blocks. A tile is never mutated
/// after it has been published as a version: kernel operations consume
/// tiles by reference and return freshly owned outputs.
#[derive(Clone, PartialEq)]
pub struct Tile {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl Tile {
    /// Wrap an existing row-major buffer.
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(CovarError::InvalidArgument(format!(
                "tile buffer holds {} values, shape {rows}x{cols} needs {}",
                data.len(),
                rows * cols
            )));
        }
        Ok(Self { data, rows, cols })
    }

    /// Square tile from a row-major buffer of `n * n` values.
    pub fn square(data: Vec<f64>, n: usize) -> Result<Self> {
        Self::from_vec(data, n, n)
    }

    /// Zero-filled tile.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Element at (i, j). Row-major, unchecked against negative but
    /// panics on out-of-range like slice indexing.
    pub fn at(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Copy with the strict upper triangle zeroed.
    ///
    /// After `potrf` only the lower triangle of a tile holds factor
    /// data; this materializes the factor for dense comparisons.
    pub fn lower_triangle(&self) -> Tile {
        let mut out = self.clone();
        for i in 0..self.rows {
            for j in (i + 1)..self.cols {
                out.data[i * self.cols + j] = 0.0;
            }
        }
        out
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tile({}x{})", self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_shape_check() {
        assert!(Tile::from_vec(vec![1.0, 2.0, 3.0], 2, 2).is_err());
        let t = Tile::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        assert_eq!(t.at(0, 1), 2.0);
        assert_eq!(t.at(1, 0), 3.0);
        assert!(t.is_square());
    }

    #[test]
    fn test_zeros() {
        let t = Tile::zeros(2, 3);
        assert_eq!(t.rows(), 2);
        assert_eq!(t.cols(), 3);
        assert!(t.as_slice().iter().all(|&v| v == 0.0));
        assert!(!t.is_square());
    }

    #[test]
    fn test_lower_triangle() {
        let t = Tile::square(vec![1.0, 9.0, 2.0, 3.0], 2).unwrap();
        let l = t.lower_triangle();
        assert_eq!(l.as_slice(), &[1.0, 0.0, 2.0, 3.0]);
    }
}
