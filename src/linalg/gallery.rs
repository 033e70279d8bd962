//! Model matrices used by the examples, benches and tests.
use crate::linalg::csr::CsrMatrix;
use crate::linalg::csr_utils::csr_from_triplets;
use crate::linalg::errors::LinAlgError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tridiagonal matrix with constant bands.
pub fn tridiagonal(n: usize, lower: f64, diag: f64, upper: f64) -> Result<CsrMatrix, LinAlgError> {
    let mut values = Vec::with_capacity(3 * n);
    let mut col_ind = Vec::with_capacity(3 * n);
    let mut row_ptr = Vec::with_capacity(n + 1);
    row_ptr.push(0);
    for i in 0..n {
        if i > 0 {
            values.push(lower);
            col_ind.push(i - 1);
        }
        values.push(diag);
        col_ind.push(i);
        if i + 1 < n {
            values.push(upper);
            col_ind.push(i + 1);
        }
        row_ptr.push(values.len());
    }
    let nnz = values.len();
    CsrMatrix::new(n, n, nnz, values, col_ind, row_ptr)
}

/// 1-D Dirichlet Laplacian: tridiag(-1, 2, -1).
pub fn laplacian_1d(n: usize) -> Result<CsrMatrix, LinAlgError> {
    tridiagonal(n, -1.0, 2.0, -1.0)
}

/// Laplacian shifted by -sigma I: symmetric and indefinite once sigma exceeds the
/// smallest eigenvalue 2 - 2cos(pi/(n+1)).
pub fn shifted_laplacian_1d(n: usize, sigma: f64) -> Result<CsrMatrix, LinAlgError> {
    tridiagonal(n, -1.0, 2.0 - sigma, -1.0)
}

/// 5-point Laplacian on an nx x ny grid, lexicographic ordering.
pub fn laplacian_2d(nx: usize, ny: usize) -> Result<CsrMatrix, LinAlgError> {
    let n = nx * ny;
    let mut rows = Vec::with_capacity(5 * n);
    let mut cols = Vec::with_capacity(5 * n);
    let mut vals = Vec::with_capacity(5 * n);
    for j in 0..ny {
        for i in 0..nx {
            let k = j * nx + i;
            let mut push = |c: usize, v: f64| {
                rows.push(k);
                cols.push(c);
                vals.push(v);
            };
            push(k, 4.0);
            if i > 0 {
                push(k - 1, -1.0);
            }
            if i + 1 < nx {
                push(k + 1, -1.0);
            }
            if j > 0 {
                push(k - nx, -1.0);
            }
            if j + 1 < ny {
                push(k + nx, -1.0);
            }
        }
    }
    csr_from_triplets(n, n, &rows, &cols, &vals)
}

/// Upwind convection-diffusion on n interior points: -u'' + peclet u' , nonsymmetric.
pub fn convection_diffusion_1d(n: usize, peclet: f64) -> Result<CsrMatrix, LinAlgError> {
    let h = 1.0 / (n as f64 + 1.0);
    let c = peclet * h;
    tridiagonal(n, -1.0 - c, 2.0 + c, -1.0)
}

/// Cyclic shift: A e_i = e_{i+1 mod n}. Orthogonal, condition number 1, and the
/// classic case where restarted GMRES(m) with m < n makes no progress from b = e_0.
pub fn cyclic_shift(n: usize) -> Result<CsrMatrix, LinAlgError> {
    let values = vec![1.0; n];
    let col_ind: Vec<usize> = (0..n).map(|i| (i + n - 1) % n).collect();
    let row_ptr: Vec<usize> = (0..=n).collect();
    CsrMatrix::new(n, n, n, values, col_ind, row_ptr)
}

/// Linear interpolation from the (n - 1) / 2 odd points of a 1-D grid to all n points,
/// the standard geometric prolongation for `laplacian_1d` with odd n.
pub fn linear_interpolation_1d(n: usize) -> Result<CsrMatrix, LinAlgError> {
    let nc = n.saturating_sub(1) / 2;
    let mut rows = Vec::with_capacity(3 * nc);
    let mut cols = Vec::with_capacity(3 * nc);
    let mut vals = Vec::with_capacity(3 * nc);
    for c in 0..nc {
        let f = 2 * c + 1;
        rows.extend_from_slice(&[f - 1, f, f + 1]);
        cols.extend_from_slice(&[c, c, c]);
        vals.extend_from_slice(&[0.5, 1.0, 0.5]);
    }
    csr_from_triplets(n, nc, &rows, &cols, &vals)
}

/// Random sparse symmetric matrix made strictly diagonally dominant, hence SPD.
/// `per_row` off-diagonal entries are drawn for each row before symmetrisation.
pub fn random_spd(n: usize, per_row: usize, seed: u64) -> Result<CsrMatrix, LinAlgError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    let mut vals = Vec::new();
    let mut row_abs_sum = vec![0.0; n];
    for i in 0..n {
        for _ in 0..per_row {
            let j = rng.random_range(0..n);
            if j == i {
                continue;
            }
            let v: f64 = -rng.random_range(0.1..1.0);
            rows.extend_from_slice(&[i, j]);
            cols.extend_from_slice(&[j, i]);
            vals.extend_from_slice(&[v, v]);
            row_abs_sum[i] += v.abs();
            row_abs_sum[j] += v.abs();
        }
    }
    for (i, s) in row_abs_sum.iter().enumerate() {
        rows.push(i);
        cols.push(i);
        vals.push(s + 1.0);
    }
    csr_from_triplets(n, n, &rows, &cols, &vals)
}
