//! Direct factorizations exposed through the `Preconditioner` contract: the sparse LU of
//! faer for large operators and the dense LU of nalgebra for small ones. Both serve as
//! the coarsest-level solver of a multigrid hierarchy or as an exact preconditioner.
use crate::linalg::csr::CsrMatrix;
use crate::linalg::errors::LinAlgError;
use crate::linalg::vector::Vector;
use crate::operators::preconditioner::Preconditioner;
use faer::linalg::solvers::Solve;
use faer::mat::Mat;
use faer::sparse::linalg::solvers::Lu;
use faer::sparse::{SparseColMat, Triplet};
use log::info;
use nalgebra::{DVector, Dyn, linalg::LU};
use std::panic::{self, AssertUnwindSafe};

fn square_size(a: &CsrMatrix, who: &str) -> Result<usize, LinAlgError> {
    if !a.is_square() {
        return Err(LinAlgError::MatrixSize(format!(
            "{} needs a square matrix, got {} x {}",
            who,
            a.nrow(),
            a.mcol()
        )));
    }
    Ok(a.nrow())
}

/// Names the first row or column without a nonzero entry.
fn structurally_singular(a: &CsrMatrix) -> Option<String> {
    let mut col_used = vec![false; a.mcol()];
    for i in 0..a.nrow() {
        let (cols, vals) = a.row(i);
        let mut row_used = false;
        for (&j, &v) in cols.iter().zip(vals.iter()) {
            if v != 0.0 {
                row_used = true;
                col_used[j] = true;
            }
        }
        if !row_used {
            return Some(format!("row {} has no nonzero entry, matrix is singular", i));
        }
    }
    col_used
        .iter()
        .position(|&used| !used)
        .map(|j| format!("column {} has no nonzero entry, matrix is singular", j))
}

#[derive(Default)]
pub struct SparseLu {
    lu: Option<Lu<usize, f64>>,
    n: usize,
}

impl SparseLu {
    pub fn new() -> Self {
        SparseLu { lu: None, n: 0 }
    }

    fn solve_into(lu: &Lu<usize, f64>, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError> {
        let rhs = Mat::<f64>::from_fn(r.len(), 1, |i, _| r[i]);
        let res: Mat<f64> = lu.solve(rhs);
        for i in 0..z.len() {
            let v = res[(i, 0)];
            if !v.is_finite() {
                return Err(LinAlgError::DirectSolverSolve(format!(
                    "non-finite entry {} in sparse LU solution",
                    i
                )));
            }
            z[i] = v;
        }
        Ok(())
    }
}

impl Preconditioner for SparseLu {
    fn setup(&mut self, a: &CsrMatrix) -> Result<(), LinAlgError> {
        let n = square_size(a, "SparseLu")?;
        let mut triplets: Vec<Triplet<usize, usize, f64>> = Vec::with_capacity(a.nnz());
        for i in 0..n {
            let (cols, vals) = a.row(i);
            for (&j, &v) in cols.iter().zip(vals.iter()) {
                triplets.push(Triplet::new(i, j, v));
            }
        }
        if let Some(msg) = structurally_singular(a) {
            return Err(LinAlgError::DirectSolverSetup(msg));
        }
        let mat = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| LinAlgError::DirectSolverSetup(format!("{:?}", e)))?;
        // faer panics on an exactly zero pivot instead of returning an error
        let lu = panic::catch_unwind(AssertUnwindSafe(|| mat.sp_lu()))
            .map_err(|_| {
                LinAlgError::DirectSolverSetup(
                    "zero pivot in sparse LU, matrix is singular".to_string(),
                )
            })?
            .map_err(|e| LinAlgError::DirectSolverSetup(format!("{:?}", e)))?;
        // a singular factor that slipped through gives non-finite values
        let ones = Vector::filled(n, 1.0);
        let mut out = Vector::new(n);
        Self::solve_into(&lu, &ones, &mut out)
            .map_err(|_| LinAlgError::DirectSolverSetup("matrix is singular".to_string()))?;
        info!("sparse LU factorized, n = {}, nnz = {}", n, a.nnz());
        self.lu = Some(lu);
        self.n = n;
        Ok(())
    }

    fn solve(&mut self, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError> {
        let lu = self.lu.as_ref().ok_or(LinAlgError::NotSetup("SparseLu"))?;
        if r.len() != self.n || z.len() != self.n {
            return Err(LinAlgError::size_mismatch(
                "SparseLu::solve",
                self.n,
                if r.len() != self.n { r.len() } else { z.len() },
            ));
        }
        Self::solve_into(lu, r, z)
    }

    fn clean(&mut self) {
        self.lu = None;
        self.n = 0;
    }

    fn name(&self) -> &'static str {
        "SparseLU"
    }
}

#[derive(Default)]
pub struct DenseLu {
    lu: Option<LU<f64, Dyn, Dyn>>,
    n: usize,
}

impl DenseLu {
    pub fn new() -> Self {
        DenseLu { lu: None, n: 0 }
    }
}

impl Preconditioner for DenseLu {
    fn setup(&mut self, a: &CsrMatrix) -> Result<(), LinAlgError> {
        let n = square_size(a, "DenseLu")?;
        let lu = a.to_dense().lu();
        if !lu.is_invertible() {
            return Err(LinAlgError::DirectSolverSetup("matrix is singular".to_string()));
        }
        self.lu = Some(lu);
        self.n = n;
        Ok(())
    }

    fn solve(&mut self, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError> {
        let lu = self.lu.as_ref().ok_or(LinAlgError::NotSetup("DenseLu"))?;
        let n = self.n;
        if r.len() != n || z.len() != n {
            return Err(LinAlgError::size_mismatch("DenseLu::solve", n, r.len().max(z.len())));
        }
        let rhs = DVector::from_column_slice(r.as_slice());
        let sol = lu
            .solve(&rhs)
            .ok_or_else(|| LinAlgError::DirectSolverSolve("dense LU solve failed".to_string()))?;
        z.as_mut_slice().copy_from_slice(sol.as_slice());
        Ok(())
    }

    fn clean(&mut self) {
        self.lu = None;
        self.n = 0;
    }

    fn name(&self) -> &'static str {
        "DenseLU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::csr_utils::csr_from_triplets;
    use crate::linalg::gallery::{convection_diffusion_1d, laplacian_2d};
    use approx::assert_relative_eq;

    fn check_exact(pc: &mut dyn Preconditioner, a: &CsrMatrix) {
        pc.setup(a).unwrap();
        let n = a.nrow();
        let x_true = Vector::from_vec((0..n).map(|i| (i as f64).sin()).collect());
        let mut b = Vector::new(n);
        a.apply(&x_true, &mut b).unwrap();
        let mut x = Vector::new(n);
        pc.solve(&b, &mut x).unwrap();
        for i in 0..n {
            assert_relative_eq!(x[i], x_true[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_sparse_lu_solves_exactly() {
        check_exact(&mut SparseLu::new(), &laplacian_2d(5, 4).unwrap());
        check_exact(&mut SparseLu::new(), &convection_diffusion_1d(20, 50.0).unwrap());
    }

    #[test]
    fn test_dense_lu_solves_exactly() {
        check_exact(&mut DenseLu::new(), &laplacian_2d(3, 3).unwrap());
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let a = CsrMatrix::from_diagonal(&[1.0, 0.0, 2.0]);
        assert!(matches!(
            DenseLu::new().setup(&a),
            Err(LinAlgError::DirectSolverSetup(_))
        ));
        assert!(matches!(
            SparseLu::new().setup(&a),
            Err(LinAlgError::DirectSolverSetup(_))
        ));
    }

    #[test]
    fn test_rank_deficient_matrix_rejected_by_sparse_lu() {
        // every row and column is occupied, yet the rows sum to zero
        let a = csr_from_triplets(
            3,
            3,
            &[0, 0, 1, 1, 1, 2, 2],
            &[0, 1, 0, 1, 2, 1, 2],
            &[1.0, -1.0, -1.0, 2.0, -1.0, -1.0, 1.0],
        )
        .unwrap();
        let mut lu = SparseLu::new();
        assert!(matches!(lu.setup(&a), Err(LinAlgError::DirectSolverSetup(_))));
        let mut z = Vector::new(3);
        assert!(lu.solve(&Vector::filled(3, 1.0), &mut z).is_err());
    }

    #[test]
    fn test_structural_check_names_empty_column() {
        let a = csr_from_triplets(2, 2, &[0, 1], &[0, 0], &[1.0, 2.0]).unwrap();
        let msg = structurally_singular(&a).unwrap();
        assert!(msg.contains("column 1"), "{}", msg);
        assert!(structurally_singular(&CsrMatrix::from_diagonal(&[1.0, 2.0])).is_none());
    }

    #[test]
    fn test_solve_before_setup() {
        let mut z = Vector::new(2);
        assert!(SparseLu::new().solve(&Vector::new(2), &mut z).is_err());
        assert!(DenseLu::new().solve(&Vector::new(2), &mut z).is_err());
    }
}
