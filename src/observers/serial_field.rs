use na::DMatrix;
use serde::{Deserialize, Serialize};

/// A dense field laid out row by row, with row 0 at the bottom of the mesh
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SerialField {
    pub nrows: usize,
    pub ncols: usize,
    pub data: Vec<f64>,
}

impl SerialField {
    pub fn from_matrix(field: &DMatrix<f64>) -> Self {
        let (nrows, ncols) = field.shape();

        Self {
            nrows,
            ncols,
            data: field.transpose().as_slice().to_vec(),
        }
    }

    pub fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.nrows, self.ncols, &self.data)
    }
}
