//! Dense row-major matrices for the model parameters

use serde::{Deserialize, Serialize};

/// Rows must sum to one within this tolerance to count as stochastic
pub const STOCHASTIC_EPSILON: f64 = 1e-6;

/// Dense row-major `f64` matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// Serialized form, checked before it becomes a [`Matrix`]
#[derive(Deserialize)]
struct RawMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl TryFrom<RawMatrix> for Matrix {
    type Error = String;

    fn try_from(raw: RawMatrix) -> Result<Self, Self::Error> {
        if raw.rows.checked_mul(raw.cols) != Some(raw.data.len()) {
            return Err(format!(
                "matrix declares {}x{} but holds {} entries",
                raw.rows,
                raw.cols,
                raw.data.len()
            ));
        }
        Ok(Matrix { rows: raw.rows, cols: raw.cols, data: raw.data })
    }
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Every row the uniform distribution
    pub fn uniform(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, if cols == 0 { 0.0 } else { 1.0 / cols as f64 })
    }

    /// Build from row vectors; `None` if the rows are ragged
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        Some(Matrix {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    #[inline]
    pub fn add_to(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] += value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Scale each row to sum to one; all-zero rows become uniform
    pub fn normalize_rows(&mut self) {
        let cols = self.cols;
        for r in 0..self.rows {
            normalize(self.row_mut(r), cols);
        }
    }

    /// Non-negative entries and every row summing to one
    pub fn is_row_stochastic(&self) -> bool {
        (0..self.rows).all(|r| is_distribution(self.row(r)))
    }

    /// `(1 - weight) * self + weight * other`, elementwise
    pub fn blend(&self, other: &Matrix, weight: f64) -> Option<Matrix> {
        if self.rows != other.rows || self.cols != other.cols {
            return None;
        }
        Some(Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| (1.0 - weight) * a + weight * b)
                .collect(),
        })
    }
}

/// Scale `values` to sum to one; an all-zero slice becomes uniform
pub fn normalize(values: &mut [f64], len: usize) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        values.iter_mut().for_each(|v| *v /= sum);
    } else if len > 0 {
        values.iter_mut().for_each(|v| *v = 1.0 / len as f64);
    }
}

/// Non-negative finite entries summing to one
pub fn is_distribution(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite() && *v >= 0.0)
        && (values.iter().sum::<f64>() - 1.0).abs() < STOCHASTIC_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_is_stochastic() {
        let m = Matrix::uniform(3, 4);
        assert!(m.is_row_stochastic());
        assert_eq!(m.get(2, 3), 0.25);
    }

    #[test]
    fn test_normalize_rows() {
        let mut m = Matrix::from_rows(vec![vec![1.0, 3.0], vec![0.0, 0.0]]).unwrap();
        m.normalize_rows();
        assert_eq!(m.row(0), &[0.25, 0.75]);
        assert_eq!(m.row(1), &[0.5, 0.5]);
        assert!(m.is_row_stochastic());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(Matrix::from_rows(vec![vec![1.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn test_blend() {
        let a = Matrix::from_rows(vec![vec![1.0, 0.0]]).unwrap();
        let b = Matrix::from_rows(vec![vec![0.0, 1.0]]).unwrap();
        let m = a.blend(&b, 0.25).unwrap();
        assert_eq!(m.row(0), &[0.75, 0.25]);
        assert!(a.blend(&Matrix::zeros(2, 2), 0.5).is_none());
    }
}
