//! Two-dimensional scalar fields shared by the flux solvers.
//!
//! A [`GridField`] is an `nx × ny` array indexed `(i, j)`, `i` being the row
//! (x-like) index and `j` the column (y-like) index. The outermost ring of
//! cells is the vacuum boundary: solvers never write to it, so it keeps
//! whatever value it was created with (zero for every field the solvers build).

use crate::error::{invalid, Result, SimError};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Largest number of cells a solver grid may have.
pub const MAX_CELLS: usize = 1 << 24;

/// Rejects empty grids and grids above [`MAX_CELLS`].
pub fn check_shape(nx: usize, ny: usize) -> Result<()> {
    if nx == 0 || ny == 0 {
        return Err(invalid(format!(
            "grid dimensions must be positive, got {nx}×{ny}"
        )));
    }
    match nx.checked_mul(ny) {
        Some(cells) if cells <= MAX_CELLS => Ok(()),
        _ => Err(invalid(format!(
            "{nx}×{ny} grid exceeds the limit of {MAX_CELLS} cells"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "FieldData", try_from = "FieldData")]
pub struct GridField {
    values: DMatrix<f64>,
}

/// Serialized form of a [`GridField`]: row-major samples plus the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldData {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl GridField {
    /// All-zero field. Shape checks are the caller's job; see [`GridField::new`].
    pub fn zeros(nx: usize, ny: usize) -> Self {
        Self {
            values: DMatrix::zeros(nx, ny),
        }
    }

    pub fn new(nx: usize, ny: usize) -> Result<Self> {
        check_shape(nx, ny)?;
        Ok(Self::zeros(nx, ny))
    }

    pub fn from_fn(nx: usize, ny: usize, f: impl FnMut(usize, usize) -> f64) -> Self {
        Self {
            values: DMatrix::from_fn(nx, ny, f),
        }
    }

    pub fn from_row_major(nx: usize, ny: usize, data: &[f64]) -> Result<Self> {
        check_shape(nx, ny)?;
        if data.len() != nx * ny {
            return Err(invalid(format!(
                "expected {} samples for a {nx}×{ny} grid, got {}",
                nx * ny,
                data.len()
            )));
        }
        Ok(Self {
            values: DMatrix::from_row_slice(nx, ny, data),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[(i, j)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.values[(i, j)] = value;
    }

    pub fn is_boundary(&self, i: usize, j: usize) -> bool {
        let (nx, ny) = self.shape();
        i == 0 || j == 0 || i + 1 == nx || j + 1 == ny
    }

    /// Index of the center cell, `(⌊nx/2⌋, ⌊ny/2⌋)`.
    pub fn center(&self) -> (usize, usize) {
        let (nx, ny) = self.shape();
        (nx / 2, ny / 2)
    }

    /// Sum over every cell, boundary included.
    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    /// Euclidean (Frobenius) norm of `self - other`.
    pub fn distance(&self, other: &GridField) -> f64 {
        debug_assert_eq!(self.shape(), other.shape());
        (&self.values - &other.values).norm()
    }

    pub fn max_value(&self) -> f64 {
        self.values.max()
    }

    pub fn all_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Largest absolute value found on the boundary ring.
    pub fn boundary_max_abs(&self) -> f64 {
        let (nx, ny) = self.shape();
        let mut max = 0.0_f64;
        for i in 0..nx {
            for j in 0..ny {
                if self.is_boundary(i, j) {
                    max = max.max(self.values[(i, j)].abs());
                }
            }
        }
        max
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Samples flattened row by row, the layout the export layer expects.
    pub fn to_row_major(&self) -> Vec<f64> {
        self.values.transpose().as_slice().to_vec()
    }
}

impl From<GridField> for FieldData {
    fn from(field: GridField) -> Self {
        let (rows, cols) = field.shape();
        Self {
            rows,
            cols,
            data: field.to_row_major(),
        }
    }
}

impl TryFrom<FieldData> for GridField {
    type Error = SimError;

    fn try_from(value: FieldData) -> Result<Self> {
        GridField::from_row_major(value.rows, value.cols, &value.data)
    }
}

/// A material coefficient that is either uniform over the grid or given per cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coefficient {
    Uniform(f64),
    Field(GridField),
}

impl Coefficient {
    #[inline]
    pub fn at(&self, i: usize, j: usize) -> f64 {
        match self {
            Coefficient::Uniform(value) => *value,
            Coefficient::Field(field) => field.get(i, j),
        }
    }

    /// Checks shape agreement and finiteness; `non_negative` additionally
    /// rejects negative samples.
    pub(crate) fn validate(
        &self,
        name: &str,
        shape: (usize, usize),
        non_negative: bool,
    ) -> Result<()> {
        let check = |value: f64| -> Result<()> {
            if !value.is_finite() {
                return Err(invalid(format!("{name} must be finite, got {value}")));
            }
            if non_negative && value < 0.0 {
                return Err(invalid(format!("{name} must be non-negative, got {value}")));
            }
            Ok(())
        };

        match self {
            Coefficient::Uniform(value) => check(*value),
            Coefficient::Field(field) => {
                if field.shape() != shape {
                    return Err(invalid(format!(
                        "{name} field has shape {:?}, expected {:?}",
                        field.shape(),
                        shape
                    )));
                }
                field.as_matrix().iter().try_for_each(|v| check(*v))
            }
        }
    }
}

impl From<f64> for Coefficient {
    fn from(value: f64) -> Self {
        Coefficient::Uniform(value)
    }
}

impl From<GridField> for Coefficient {
    fn from(field: GridField) -> Self {
        Coefficient::Field(field)
    }
}

#[cfg(test)]
mod tests {
    use super::{check_shape, Coefficient, FieldData, GridField};

    #[test]
    fn boundary_ring_is_detected() {
        let field = GridField::zeros(4, 5);
        let boundary = (0..4)
            .flat_map(|i| (0..5).map(move |j| (i, j)))
            .filter(|&(i, j)| field.is_boundary(i, j))
            .count();
        // 4×5 grid has a 2×3 interior.
        assert_eq!(boundary, 20 - 6);
        assert!(!field.is_boundary(1, 1));
        assert!(field.is_boundary(3, 2));
        assert!(field.is_boundary(2, 4));
    }

    #[test]
    fn row_major_layout_round_trips_through_field_data() {
        let field = GridField::from_fn(2, 3, |i, j| (i * 10 + j) as f64);
        assert_eq!(field.to_row_major(), vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);

        let data = FieldData::from(field.clone());
        assert_eq!((data.rows, data.cols), (2, 3));
        let back = GridField::try_from(data).expect("valid field data");
        assert_eq!(back, field);
    }

    #[test]
    fn from_row_major_rejects_length_mismatch() {
        let err = GridField::from_row_major(2, 2, &[1.0, 2.0, 3.0]).expect_err("short data");
        assert!(err.to_string().contains("expected 4 samples"));
        assert!(GridField::new(0, 3).is_err());
    }

    #[test]
    fn oversized_grids_are_rejected_before_allocation() {
        let err = GridField::new(1 << 13, 1 << 12).expect_err("too many cells");
        assert!(err.to_string().contains("exceeds the limit"));
        assert!(check_shape(usize::MAX, 2).is_err());
        assert!(check_shape(1 << 12, 1 << 12).is_ok());
    }

    #[test]
    fn distance_is_euclidean_over_whole_grid() {
        let a = GridField::zeros(3, 3);
        let mut b = GridField::zeros(3, 3);
        b.set(1, 1, 3.0);
        b.set(0, 0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        assert_eq!(b.boundary_max_abs(), 4.0);
        assert_eq!(b.total(), 7.0);
        assert_eq!(b.center(), (1, 1));
    }

    #[test]
    fn coefficient_validation_checks_shape_and_sign() {
        let field = Coefficient::Field(GridField::zeros(3, 3));
        assert!(field.validate("sigma_a", (3, 3), true).is_ok());
        let err = field
            .validate("sigma_a", (4, 3), true)
            .expect_err("shape mismatch");
        assert!(err.to_string().contains("sigma_a field has shape"));

        let negative = Coefficient::Uniform(-0.1);
        assert!(negative.validate("D", (3, 3), false).is_ok());
        let err = negative.validate("D", (3, 3), true).expect_err("negative");
        assert!(err.to_string().contains("non-negative"));
    }
}
