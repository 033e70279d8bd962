//! Compressed sparse row matrix.
//!
//! The matrix keeps the raw CSR triple exactly as it was given: construction validates
//! but never reorders. Operations that need sorted rows (`form_diag_ptr`, `add`) sort
//! first. The optional diagonal pointer gives O(1) access to `a_ii` for smoothers.
use crate::linalg::csr_utils::{
    check_csr, check_csr_with_diag, csr_from_sprs, csr_to_sprs, rows_are_sorted, sort_csr_rows,
};
use crate::linalg::errors::LinAlgError;
use crate::linalg::vector::Vector;
use nalgebra::DMatrix;
use rayon::prelude::*;
use sprs::CsMat;

/// Row count above which the matrix-vector product runs on the rayon pool.
pub const PAR_THRESHOLD: usize = 20_000;

#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    nrow: usize,
    mcol: usize,
    values: Vec<f64>,
    col_ind: Vec<usize>,
    row_ptr: Vec<usize>,
    diag_ptr: Option<Vec<usize>>,
}

impl CsrMatrix {
    pub fn new(
        nrow: usize,
        mcol: usize,
        nnz: usize,
        values: Vec<f64>,
        col_ind: Vec<usize>,
        row_ptr: Vec<usize>,
    ) -> Result<CsrMatrix, LinAlgError> {
        check_csr(nrow, mcol, nnz, &values, &col_ind, &row_ptr)?;
        Ok(CsrMatrix {
            nrow,
            mcol,
            values,
            col_ind,
            row_ptr,
            diag_ptr: None,
        })
    }

    /// Same as `new` with a caller supplied diagonal pointer, validated as well.
    pub fn new_with_diag(
        nrow: usize,
        mcol: usize,
        nnz: usize,
        values: Vec<f64>,
        col_ind: Vec<usize>,
        row_ptr: Vec<usize>,
        diag_ptr: Vec<usize>,
    ) -> Result<CsrMatrix, LinAlgError> {
        check_csr_with_diag(nrow, mcol, nnz, &values, &col_ind, &row_ptr, &diag_ptr)?;
        Ok(CsrMatrix {
            nrow,
            mcol,
            values,
            col_ind,
            row_ptr,
            diag_ptr: Some(diag_ptr),
        })
    }

    pub fn identity(n: usize) -> CsrMatrix {
        CsrMatrix::from_diagonal(&vec![1.0; n])
    }

    pub fn from_diagonal(diag: &[f64]) -> CsrMatrix {
        let n = diag.len();
        CsrMatrix {
            nrow: n,
            mcol: n,
            values: diag.to_vec(),
            col_ind: (0..n).collect(),
            row_ptr: (0..=n).collect(),
            diag_ptr: Some((0..n).collect()),
        }
    }

    /// Keeps entries with |a_ij| > drop_tol.
    pub fn from_dense(m: &DMatrix<f64>, drop_tol: f64) -> CsrMatrix {
        let (nrow, mcol) = m.shape();
        let mut values = Vec::new();
        let mut col_ind = Vec::new();
        let mut row_ptr = Vec::with_capacity(nrow + 1);
        row_ptr.push(0);
        for i in 0..nrow {
            for j in 0..mcol {
                let v = m[(i, j)];
                if v.abs() > drop_tol {
                    values.push(v);
                    col_ind.push(j);
                }
            }
            row_ptr.push(values.len());
        }
        CsrMatrix {
            nrow,
            mcol,
            values,
            col_ind,
            row_ptr,
            diag_ptr: None,
        }
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }
    pub fn mcol(&self) -> usize {
        self.mcol
    }
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
    pub fn values(&self) -> &[f64] {
        &self.values
    }
    pub fn col_ind(&self) -> &[usize] {
        &self.col_ind
    }
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }
    pub fn diag_ptr(&self) -> Option<&[usize]> {
        self.diag_ptr.as_deref()
    }
    pub fn is_square(&self) -> bool {
        self.nrow == self.mcol
    }

    /// (values, col_ind, row_ptr)
    pub fn into_parts(self) -> (Vec<f64>, Vec<usize>, Vec<usize>) {
        (self.values, self.col_ind, self.row_ptr)
    }

    /// column indices and values of row `i`
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
        (&self.col_ind[start..end], &self.values[start..end])
    }

    fn row_dot(&self, i: usize, x: &[f64]) -> f64 {
        let (cols, vals) = self.row(i);
        cols.iter().zip(vals.iter()).map(|(&j, &v)| v * x[j]).sum()
    }

    pub fn is_sorted(&self) -> bool {
        rows_are_sorted(&self.col_ind, &self.row_ptr)
    }

    /// Sorts column indices inside every row. A present diagonal pointer is rebuilt.
    pub fn sort_rows(&mut self) {
        if self.is_sorted() {
            return;
        }
        sort_csr_rows(&self.row_ptr, &mut self.col_ind, &mut self.values);
        if self.diag_ptr.is_some() {
            self.diag_ptr = self.locate_diagonal().ok();
        }
    }

    fn locate_diagonal(&self) -> Result<Vec<usize>, LinAlgError> {
        (0..self.nrow)
            .map(|i| {
                let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
                self.col_ind[start..end]
                    .binary_search(&i)
                    .map(|k| start + k)
                    .map_err(|_| {
                        LinAlgError::MatrixData(format!("row {} has no diagonal entry", i))
                    })
            })
            .collect()
    }

    /// Sorts the rows if needed and records the position of every diagonal entry.
    /// Fails if the matrix is not square or a row has no stored diagonal.
    pub fn form_diag_ptr(&mut self) -> Result<(), LinAlgError> {
        if !self.is_square() {
            return Err(LinAlgError::MatrixSize(format!(
                "diagonal of a {} x {} matrix",
                self.nrow, self.mcol
            )));
        }
        self.sort_rows();
        self.diag_ptr = Some(self.locate_diagonal()?);
        Ok(())
    }

    /// Diagonal entries; missing entries read as zero.
    pub fn get_diag(&self) -> Vector {
        let n = self.nrow.min(self.mcol);
        match &self.diag_ptr {
            Some(dp) => Vector::from_vec(dp.iter().map(|&k| self.values[k]).collect()),
            None => Vector::from_vec(
                (0..n)
                    .map(|i| {
                        let (cols, vals) = self.row(i);
                        cols.iter()
                            .zip(vals.iter())
                            .filter(|&(&j, _)| j == i)
                            .map(|(_, &v)| v)
                            .sum()
                    })
                    .collect(),
            ),
        }
    }

    fn check_index(&self, i: usize, j: usize) -> Result<(), LinAlgError> {
        if i >= self.nrow || j >= self.mcol {
            return Err(LinAlgError::MatrixSize(format!(
                "index ({}, {}) outside a {} x {} matrix",
                i, j, self.nrow, self.mcol
            )));
        }
        Ok(())
    }

    pub fn get_value(&self, i: usize, j: usize) -> Result<f64, LinAlgError> {
        self.check_index(i, j)?;
        let (cols, vals) = self.row(i);
        Ok(cols
            .iter()
            .zip(vals.iter())
            .filter(|&(&c, _)| c == j)
            .map(|(_, &v)| v)
            .sum())
    }

    /// Overwrites an entry that already exists in the sparsity pattern.
    pub fn set_value(&mut self, i: usize, j: usize, value: f64) -> Result<(), LinAlgError> {
        self.check_index(i, j)?;
        let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
        match (start..end).find(|&k| self.col_ind[k] == j) {
            Some(k) => {
                self.values[k] = value;
                Ok(())
            }
            None => Err(LinAlgError::MatrixData(format!(
                "entry ({}, {}) is not in the sparsity pattern",
                i, j
            ))),
        }
    }

    /// Row `i` as a dense vector of length `mcol`.
    pub fn get_row(&self, i: usize) -> Result<Vec<f64>, LinAlgError> {
        self.check_index(i, 0)?;
        let mut dense = vec![0.0; self.mcol];
        let (cols, vals) = self.row(i);
        for (&j, &v) in cols.iter().zip(vals.iter()) {
            dense[j] += v;
        }
        Ok(dense)
    }

    pub fn scale(&mut self, a: f64) {
        self.values.iter_mut().for_each(|v| *v *= a);
    }

    /// A = A + a I, all diagonal entries must be stored
    pub fn shift(&mut self, a: f64) -> Result<(), LinAlgError> {
        if self.diag_ptr.is_none() {
            self.form_diag_ptr()?;
        }
        if let Some(dp) = &self.diag_ptr {
            for &k in dp.iter() {
                self.values[k] += a;
            }
        }
        Ok(())
    }

    /// keeps the pattern, zeroes the values
    pub fn zero(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }

    /// y = A x
    pub fn apply(&self, x: &Vector, y: &mut Vector) -> Result<(), LinAlgError> {
        if x.len() != self.mcol {
            return Err(LinAlgError::size_mismatch("CsrMatrix::apply x", self.mcol, x.len()));
        }
        if y.len() != self.nrow {
            return Err(LinAlgError::size_mismatch("CsrMatrix::apply y", self.nrow, y.len()));
        }
        let xs = x.as_slice();
        let ys = y.as_mut_slice();
        if self.nrow >= PAR_THRESHOLD {
            ys.par_iter_mut()
                .enumerate()
                .for_each(|(i, yi)| *yi = self.row_dot(i, xs));
        } else {
            for (i, yi) in ys.iter_mut().enumerate() {
                *yi = self.row_dot(i, xs);
            }
        }
        Ok(())
    }

    /// y = a A x + b y
    pub fn mult_add(&self, a: f64, x: &Vector, b: f64, y: &mut Vector) -> Result<(), LinAlgError> {
        if x.len() != self.mcol {
            return Err(LinAlgError::size_mismatch("CsrMatrix::mult_add x", self.mcol, x.len()));
        }
        if y.len() != self.nrow {
            return Err(LinAlgError::size_mismatch("CsrMatrix::mult_add y", self.nrow, y.len()));
        }
        let xs = x.as_slice();
        for (i, yi) in y.as_mut_slice().iter_mut().enumerate() {
            *yi = a * self.row_dot(i, xs) + b * *yi;
        }
        Ok(())
    }

    /// r = b - A x
    pub fn residual(&self, b: &Vector, x: &Vector, r: &mut Vector) -> Result<(), LinAlgError> {
        if b.len() != self.nrow {
            return Err(LinAlgError::size_mismatch("CsrMatrix::residual b", self.nrow, b.len()));
        }
        r.copy_from(b)?;
        self.mult_add(-1.0, x, 1.0, r)
    }

    /// y = A^T x + y
    pub fn mult_transpose_add(&self, x: &Vector, y: &mut Vector) -> Result<(), LinAlgError> {
        if x.len() != self.nrow {
            return Err(LinAlgError::size_mismatch(
                "CsrMatrix::mult_transpose_add x",
                self.nrow,
                x.len(),
            ));
        }
        if y.len() != self.mcol {
            return Err(LinAlgError::size_mismatch(
                "CsrMatrix::mult_transpose_add y",
                self.mcol,
                y.len(),
            ));
        }
        let ys = y.as_mut_slice();
        for i in 0..self.nrow {
            let xi = x[i];
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals.iter()) {
                ys[j] += v * xi;
            }
        }
        Ok(())
    }

    /// Explicit transpose through `sprs`; rows of the result are sorted and duplicate
    /// entries are summed.
    pub fn transpose(&self) -> Result<CsrMatrix, LinAlgError> {
        csr_from_sprs(&csr_to_sprs(self).transpose_into())
    }

    /// C = A B, the `sprs` sparse product; rows of the result are sorted.
    pub fn mult(&self, other: &CsrMatrix) -> Result<CsrMatrix, LinAlgError> {
        if self.mcol != other.nrow {
            return Err(LinAlgError::size_mismatch(
                "CsrMatrix::mult inner dimension",
                self.mcol,
                other.nrow,
            ));
        }
        let product: CsMat<f64> = &csr_to_sprs(self) * &csr_to_sprs(other);
        csr_from_sprs(&product)
    }

    /// C = a A + b B over the union of both patterns.
    pub fn add(&self, a: f64, other: &CsrMatrix, b: f64) -> Result<CsrMatrix, LinAlgError> {
        if self.nrow != other.nrow || self.mcol != other.mcol {
            return Err(LinAlgError::MatrixSize(format!(
                "cannot add {} x {} and {} x {}",
                self.nrow, self.mcol, other.nrow, other.mcol
            )));
        }
        let mut marker = vec![usize::MAX; self.mcol];
        let mut acc = vec![0.0; self.mcol];
        let mut row_cols: Vec<usize> = Vec::new();
        let mut row_ptr = Vec::with_capacity(self.nrow + 1);
        let mut col_ind = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for i in 0..self.nrow {
            row_cols.clear();
            for (m, scale) in [(self, a), (other, b)] {
                let (cols, vals) = m.row(i);
                for (&j, &v) in cols.iter().zip(vals.iter()) {
                    if marker[j] != i {
                        marker[j] = i;
                        acc[j] = 0.0;
                        row_cols.push(j);
                    }
                    acc[j] += scale * v;
                }
            }
            row_cols.sort_unstable();
            for &j in &row_cols {
                col_ind.push(j);
                values.push(acc[j]);
            }
            row_ptr.push(col_ind.len());
        }
        Ok(CsrMatrix {
            nrow: self.nrow,
            mcol: self.mcol,
            values,
            col_ind,
            row_ptr,
            diag_ptr: None,
        })
    }

    /// max |a_ij - a_ji| <= tol * max |a_ij|
    pub fn is_symmetric(&self, tol: f64) -> bool {
        if !self.is_square() {
            return false;
        }
        let scale = self.values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        match self.transpose().and_then(|t| self.add(1.0, &t, -1.0)) {
            Ok(diff) => diff.values.iter().all(|v| v.abs() <= tol * scale.max(1.0)),
            Err(_) => false,
        }
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut m = DMatrix::<f64>::zeros(self.nrow, self.mcol);
        for i in 0..self.nrow {
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals.iter()) {
                m[(i, j)] += v;
            }
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::gallery::laplacian_1d;
    use approx::assert_relative_eq;

    fn small() -> CsrMatrix {
        // [ 4 0 1 ]
        // [ 0 3 0 ]
        // [ 2 0 5 ]
        CsrMatrix::new(
            3,
            3,
            5,
            vec![1.0, 4.0, 3.0, 2.0, 5.0],
            vec![2, 0, 1, 0, 2],
            vec![0, 2, 3, 5],
        )
        .unwrap()
    }

    #[test]
    fn test_construction_round_trip() {
        let values = vec![1.0, 4.0, 3.0, 2.0, 5.0];
        let col_ind = vec![2, 0, 1, 0, 2];
        let row_ptr = vec![0, 2, 3, 5];
        let a = CsrMatrix::new(3, 3, 5, values.clone(), col_ind.clone(), row_ptr.clone()).unwrap();
        assert_eq!(a.values(), values.as_slice());
        assert_eq!(a.col_ind(), col_ind.as_slice());
        assert_eq!(a.row_ptr(), row_ptr.as_slice());
        assert_eq!((a.nrow(), a.mcol(), a.nnz()), (3, 3, 5));
        assert!(!a.is_sorted());
    }

    #[test]
    fn test_malformed_input_rejected_at_construction() {
        assert!(CsrMatrix::new(2, 2, 2, vec![1.0, 1.0], vec![0, 3], vec![0, 1, 2]).is_err());
        assert!(CsrMatrix::new(2, 2, 2, vec![1.0, 1.0], vec![0, 1], vec![0, 1]).is_err());
        assert!(
            CsrMatrix::new_with_diag(2, 2, 2, vec![1.0, 1.0], vec![0, 1], vec![0, 1, 2], vec![0, 0])
                .is_err()
        );
    }

    #[test]
    fn test_diag_ptr_and_accessors() {
        let mut a = small();
        assert_eq!(a.get_diag().as_slice(), &[4.0, 3.0, 5.0]);
        a.form_diag_ptr().unwrap();
        assert!(a.is_sorted());
        assert_eq!(a.diag_ptr().unwrap(), &[0, 2, 4]);
        assert_eq!(a.get_diag().as_slice(), &[4.0, 3.0, 5.0]);
        assert_eq!(a.get_value(2, 0).unwrap(), 2.0);
        assert_eq!(a.get_value(1, 0).unwrap(), 0.0);
        assert!(a.get_value(3, 0).is_err());
        assert_eq!(a.get_row(0).unwrap(), vec![4.0, 0.0, 1.0]);
        a.set_value(1, 1, 7.0).unwrap();
        assert!(a.set_value(1, 0, 7.0).is_err());
        a.shift(1.0).unwrap();
        assert_eq!(a.get_diag().as_slice(), &[5.0, 8.0, 6.0]);
    }

    #[test]
    fn test_missing_diagonal() {
        let mut a = CsrMatrix::new(2, 2, 2, vec![1.0, 1.0], vec![1, 0], vec![0, 1, 2]).unwrap();
        assert!(a.form_diag_ptr().is_err());
    }

    #[test]
    fn test_spmv_and_residual() {
        let a = small();
        let x = Vector::from_slice(&[1.0, 2.0, 3.0]);
        let mut y = Vector::new(3);
        a.apply(&x, &mut y).unwrap();
        assert_eq!(y.as_slice(), &[7.0, 6.0, 17.0]);
        let b = Vector::from_slice(&[7.0, 6.0, 20.0]);
        let mut r = Vector::new(3);
        a.residual(&b, &x, &mut r).unwrap();
        assert_eq!(r.as_slice(), &[0.0, 0.0, 3.0]);
        let mut bad = Vector::new(2);
        assert!(a.apply(&x, &mut bad).is_err());
    }

    #[test]
    fn test_transpose_products_agree_with_dense() {
        let a = small();
        let at = a.transpose().unwrap();
        assert_eq!(at.to_dense(), a.to_dense().transpose());
        let x = Vector::from_slice(&[1.0, -1.0, 2.0]);
        let mut y = Vector::filled(3, 1.0);
        a.mult_transpose_add(&x, &mut y).unwrap();
        let mut y2 = Vector::new(3);
        at.apply(&x, &mut y2).unwrap();
        y2.shift(1.0);
        assert_eq!(y, y2);

        let c = a.mult(&at).unwrap();
        assert!(c.is_sorted());
        let dense = a.to_dense() * a.to_dense().transpose();
        assert_relative_eq!(c.to_dense(), dense, epsilon = 1e-14);
        assert!(c.is_symmetric(1e-14));
        assert!(!a.is_symmetric(1e-14));
    }

    #[test]
    fn test_products_of_rectangular_and_empty_rows() {
        // [ 1 0 ]
        // [ 0 0 ]
        // [ 2 3 ]
        let b = CsrMatrix::new(3, 2, 3, vec![1.0, 2.0, 3.0], vec![0, 0, 1], vec![0, 1, 1, 3])
            .unwrap();
        let bt = b.transpose().unwrap();
        assert_eq!((bt.nrow(), bt.mcol()), (2, 3));
        assert_eq!(bt.to_dense(), b.to_dense().transpose());
        let gram = bt.mult(&b).unwrap();
        let dense = b.to_dense().transpose() * b.to_dense();
        assert_relative_eq!(gram.to_dense(), dense, epsilon = 1e-14);
        let outer = b.mult(&bt).unwrap();
        assert_eq!(outer.nrow(), 3);
        assert_eq!(outer.row(1).0.len(), 0);
        assert!(b.mult(&b).is_err());
    }

    #[test]
    fn test_add() {
        let l = laplacian_1d(4).unwrap();
        let i = CsrMatrix::identity(4);
        let s = l.add(2.0, &i, -1.0).unwrap();
        assert_relative_eq!(
            s.to_dense(),
            l.to_dense() * 2.0 - DMatrix::<f64>::identity(4, 4),
            epsilon = 1e-14
        );
        assert!(l.add(1.0, &CsrMatrix::identity(3), 1.0).is_err());
    }
}
