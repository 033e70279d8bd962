//! Structural helpers for CSR storage: validators, in-row sorting and conversion
//! to and from the `sprs` triplet/compressed formats.
use crate::linalg::csr::CsrMatrix;
use crate::linalg::errors::LinAlgError;
use sprs::{CsMat, TriMat};

/// Checks the CSR invariants: `row_ptr` has `nrow + 1` entries, starts at zero, is
/// non-decreasing and ends at `nnz`; every column index is below `mcol`.
pub fn check_csr(
    nrow: usize,
    mcol: usize,
    nnz: usize,
    values: &[f64],
    col_ind: &[usize],
    row_ptr: &[usize],
) -> Result<(), LinAlgError> {
    if row_ptr.len() != nrow + 1 {
        return Err(LinAlgError::size_mismatch(
            "row_ptr length",
            nrow + 1,
            row_ptr.len(),
        ));
    }
    if values.len() != nnz {
        return Err(LinAlgError::size_mismatch("values length", nnz, values.len()));
    }
    if col_ind.len() != nnz {
        return Err(LinAlgError::size_mismatch(
            "col_ind length",
            nnz,
            col_ind.len(),
        ));
    }
    if row_ptr[0] != 0 {
        return Err(LinAlgError::MatrixData(format!(
            "row_ptr[0] = {}, must be 0",
            row_ptr[0]
        )));
    }
    if row_ptr[nrow] != nnz {
        return Err(LinAlgError::MatrixData(format!(
            "row_ptr[{}] = {}, must be nnz = {}",
            nrow, row_ptr[nrow], nnz
        )));
    }
    if let Some(i) = row_ptr.windows(2).position(|w| w[0] > w[1]) {
        return Err(LinAlgError::MatrixData(format!(
            "row_ptr decreases at row {}",
            i
        )));
    }
    if let Some(k) = col_ind.iter().position(|&j| j >= mcol) {
        return Err(LinAlgError::MatrixData(format!(
            "col_ind[{}] = {} is out of range [0, {})",
            k, col_ind[k], mcol
        )));
    }
    Ok(())
}

/// CSR check plus the diagonal pointer: one entry per row, each pointing inside its
/// own row at the diagonal column.
pub fn check_csr_with_diag(
    nrow: usize,
    mcol: usize,
    nnz: usize,
    values: &[f64],
    col_ind: &[usize],
    row_ptr: &[usize],
    diag_ptr: &[usize],
) -> Result<(), LinAlgError> {
    check_csr(nrow, mcol, nnz, values, col_ind, row_ptr)?;
    if nrow != mcol {
        return Err(LinAlgError::MatrixSize(format!(
            "diagonal pointer needs a square matrix, got {} x {}",
            nrow, mcol
        )));
    }
    if diag_ptr.len() != nrow {
        return Err(LinAlgError::size_mismatch(
            "diag_ptr length",
            nrow,
            diag_ptr.len(),
        ));
    }
    for (i, &d) in diag_ptr.iter().enumerate() {
        if d < row_ptr[i] || d >= row_ptr[i + 1] || col_ind[d] != i {
            return Err(LinAlgError::MatrixData(format!(
                "diag_ptr[{}] = {} does not point at the diagonal entry",
                i, d
            )));
        }
    }
    Ok(())
}

pub fn rows_are_sorted(col_ind: &[usize], row_ptr: &[usize]) -> bool {
    row_ptr
        .windows(2)
        .all(|w| col_ind[w[0]..w[1]].windows(2).all(|c| c[0] <= c[1]))
}

/// Re-sorts column indices within every row, carrying the values along.
pub fn sort_csr_rows(row_ptr: &[usize], col_ind: &mut [usize], values: &mut [f64]) {
    let mut pairs: Vec<(usize, f64)> = Vec::new();
    for w in row_ptr.windows(2) {
        let (start, end) = (w[0], w[1]);
        let cols = &col_ind[start..end];
        if cols.windows(2).all(|c| c[0] <= c[1]) {
            continue;
        }
        pairs.clear();
        pairs.extend(cols.iter().copied().zip(values[start..end].iter().copied()));
        pairs.sort_by_key(|&(j, _)| j);
        for (k, (j, v)) in pairs.iter().enumerate() {
            col_ind[start + k] = *j;
            values[start + k] = *v;
        }
    }
}

/// Builds a CSR matrix from coordinate triplets. Duplicate entries are summed and
/// rows come out sorted.
pub fn csr_from_triplets(
    nrow: usize,
    mcol: usize,
    rows: &[usize],
    cols: &[usize],
    vals: &[f64],
) -> Result<CsrMatrix, LinAlgError> {
    if rows.len() != cols.len() || rows.len() != vals.len() {
        return Err(LinAlgError::size_mismatch(
            "triplet arrays",
            rows.len(),
            cols.len().max(vals.len()),
        ));
    }
    if let Some(k) = rows.iter().position(|&i| i >= nrow) {
        return Err(LinAlgError::MatrixData(format!(
            "triplet row {} out of range [0, {})",
            rows[k], nrow
        )));
    }
    if let Some(k) = cols.iter().position(|&j| j >= mcol) {
        return Err(LinAlgError::MatrixData(format!(
            "triplet column {} out of range [0, {})",
            cols[k], mcol
        )));
    }
    let mut tri: TriMat<f64> = TriMat::new((nrow, mcol));
    for ((&i, &j), &v) in rows.iter().zip(cols.iter()).zip(vals.iter()) {
        tri.add_triplet(i, j, v);
    }
    let compressed: CsMat<f64> = tri.to_csr();
    csr_from_sprs(&compressed)
}

/// Copies a `sprs` matrix (CSR or CSC storage) into a `CsrMatrix`.
pub fn csr_from_sprs(m: &CsMat<f64>) -> Result<CsrMatrix, LinAlgError> {
    let csr = if m.is_csr() {
        m.clone()
    } else {
        m.to_other_storage()
    };
    let (nrow, mcol) = csr.shape();
    let row_ptr: Vec<usize> = csr.proper_indptr().to_vec();
    CsrMatrix::new(
        nrow,
        mcol,
        csr.nnz(),
        csr.data().to_vec(),
        csr.indices().to_vec(),
        row_ptr,
    )
}

/// Exports to `sprs` through a triplet matrix, so unsorted rows come out sorted and
/// duplicate entries are summed.
pub fn csr_to_sprs(a: &CsrMatrix) -> CsMat<f64> {
    let mut tri: TriMat<f64> = TriMat::with_capacity((a.nrow(), a.mcol()), a.nnz());
    for i in 0..a.nrow() {
        let (cols, vals) = a.row(i);
        for (&j, &v) in cols.iter().zip(vals.iter()) {
            tri.add_triplet(i, j, v);
        }
    }
    tri.to_csr()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_csr_rejects_malformed() {
        let vals = [1.0, 2.0, 3.0];
        // row_ptr does not end at nnz
        assert!(check_csr(2, 2, 3, &vals, &[0, 1, 1], &[0, 1, 2]).is_err());
        // column out of range
        assert!(check_csr(2, 2, 3, &vals, &[0, 2, 1], &[0, 1, 3]).is_err());
        // decreasing row_ptr
        assert!(check_csr(3, 3, 3, &vals, &[0, 1, 2], &[0, 2, 1, 3]).is_err());
        // wrong lengths
        assert!(check_csr(2, 2, 3, &vals[..2], &[0, 1, 1], &[0, 1, 3]).is_err());
        assert!(check_csr(2, 2, 3, &vals, &[0, 1, 1], &[0, 1, 3]).is_ok());
    }

    #[test]
    fn test_check_csr_with_diag() {
        let vals = [4.0, 1.0, 1.0, 4.0];
        let cols = [0, 1, 0, 1];
        let rows = [0, 2, 4];
        assert!(check_csr_with_diag(2, 2, 4, &vals, &cols, &rows, &[0, 3]).is_ok());
        assert!(check_csr_with_diag(2, 2, 4, &vals, &cols, &rows, &[0, 2]).is_err());
        assert!(check_csr_with_diag(2, 2, 4, &vals, &cols, &rows, &[0]).is_err());
    }

    #[test]
    fn test_sort_rows_carries_values() {
        let row_ptr = [0, 3, 5];
        let mut cols = [2, 0, 1, 1, 0];
        let mut vals = [3.0, 1.0, 2.0, 5.0, 4.0];
        assert!(!rows_are_sorted(&cols, &row_ptr));
        sort_csr_rows(&row_ptr, &mut cols, &mut vals);
        assert_eq!(cols, [0, 1, 2, 0, 1]);
        assert_eq!(vals, [1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(rows_are_sorted(&cols, &row_ptr));
    }

    #[test]
    fn test_triplets_sum_duplicates() {
        let a = csr_from_triplets(
            2,
            3,
            &[1, 0, 1, 1],
            &[2, 0, 0, 2],
            &[1.0, 5.0, 2.0, 3.0],
        )
        .unwrap();
        assert_eq!(a.nnz(), 3);
        assert_eq!(a.row_ptr(), &[0, 1, 3]);
        assert_eq!(a.col_ind(), &[0, 0, 2]);
        assert_eq!(a.values(), &[5.0, 2.0, 4.0]);
        assert!(csr_from_triplets(2, 2, &[2], &[0], &[1.0]).is_err());
    }

    #[test]
    fn test_sprs_round_trip() {
        let a = csr_from_triplets(3, 3, &[0, 1, 2, 0], &[0, 1, 2, 2], &[1.0, 2.0, 3.0, 4.0])
            .unwrap();
        let s = csr_to_sprs(&a);
        assert_eq!(s.nnz(), 4);
        let back = csr_from_sprs(&s).unwrap();
        assert_eq!(back, a);
        let csc = s.to_other_storage();
        assert_eq!(csr_from_sprs(&csc).unwrap(), a);
    }

    #[test]
    fn test_sprs_export_sorts_and_sums_duplicates() {
        // row 0 holds column 1 twice and is unsorted
        let a = CsrMatrix::new(2, 2, 4, vec![1.0, 2.0, 0.5, 3.0], vec![1, 0, 1, 1], vec![0, 3, 4])
            .unwrap();
        let s = csr_to_sprs(&a);
        assert_eq!(s.nnz(), 3);
        let back = csr_from_sprs(&s).unwrap();
        assert_eq!(back.col_ind(), &[0, 1, 1]);
        assert_eq!(back.values(), &[2.0, 1.5, 3.0]);
    }
}
