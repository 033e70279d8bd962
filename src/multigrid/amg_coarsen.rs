//! Classical (Ruge-Stüben) coarsening: strength of connection, C/F splitting and direct
//! interpolation.
use crate::linalg::csr::CsrMatrix;
use crate::linalg::errors::{CLOSE_ZERO, LinAlgError, SMALL_TOL};
use log::{debug, warn};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Undecided,
    Coarse,
    Fine,
}

/// Result of the C/F splitting of one level.
#[derive(Debug, Clone)]
pub struct CfSplitting {
    pub kinds: Vec<PointKind>,
    /// fine index -> coarse index for C points
    pub coarse_map: Vec<Option<usize>>,
    pub n_coarse: usize,
}

impl CfSplitting {
    fn from_kinds(kinds: Vec<PointKind>) -> Self {
        let mut coarse_map = vec![None; kinds.len()];
        let mut n_coarse = 0;
        for (i, k) in kinds.iter().enumerate() {
            if *k == PointKind::Coarse {
                coarse_map[i] = Some(n_coarse);
                n_coarse += 1;
            }
        }
        CfSplitting {
            kinds,
            coarse_map,
            n_coarse,
        }
    }

    pub fn is_coarse(&self, i: usize) -> bool {
        self.kinds[i] == PointKind::Coarse
    }
}

/// S_i = { j != i : |a_ij| >= theta * max_{k != i} |a_ik| }.
pub fn strength_of_connection(a: &CsrMatrix, theta: f64) -> Vec<Vec<usize>> {
    let n = a.nrow();
    let mut strong = vec![Vec::new(); n];
    for (i, s_i) in strong.iter_mut().enumerate() {
        let (cols, vals) = a.row(i);
        let max_off = cols
            .iter()
            .zip(vals.iter())
            .filter(|(j, _)| **j != i)
            .map(|(_, v)| v.abs())
            .fold(0.0_f64, f64::max);
        if max_off < CLOSE_ZERO {
            continue;
        }
        let threshold = theta * max_off;
        for (&j, &v) in cols.iter().zip(vals.iter()) {
            if j != i && v.abs() >= threshold && !s_i.contains(&j) {
                s_i.push(j);
            }
        }
    }
    strong
}

/// S^T: for every j the points i with j in S_i, i.e. the points j strongly influences.
pub fn transpose_strength(strong: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut st = vec![Vec::new(); strong.len()];
    for (i, s_i) in strong.iter().enumerate() {
        for &j in s_i {
            st[j].push(i);
        }
    }
    st
}

/// Ruge-Stüben splitting: the first pass picks C points by the measure lambda_i = |S_i^T|,
/// the second pass adds C points until every strong F-F pair shares a C point.
pub fn ruge_stuben_splitting(strong: &[Vec<usize>]) -> CfSplitting {
    let n = strong.len();
    let st = transpose_strength(strong);
    let mut kinds = vec![PointKind::Undecided; n];
    let mut lambda: Vec<usize> = st.iter().map(|s| s.len()).collect();
    let mut heap = BinaryHeap::with_capacity(n);

    for i in 0..n {
        if strong[i].is_empty() && st[i].is_empty() {
            kinds[i] = PointKind::Fine;
        } else {
            heap.push((lambda[i], Reverse(i)));
        }
    }

    // stale heap entries are skipped by comparing against the current lambda
    while let Some((lam, Reverse(i))) = heap.pop() {
        if kinds[i] != PointKind::Undecided || lam != lambda[i] {
            continue;
        }
        kinds[i] = PointKind::Coarse;
        for &j in &st[i] {
            if kinds[j] != PointKind::Undecided {
                continue;
            }
            kinds[j] = PointKind::Fine;
            for &k in &strong[j] {
                if kinds[k] == PointKind::Undecided {
                    lambda[k] += 1;
                    heap.push((lambda[k], Reverse(k)));
                }
            }
        }
        for &k in &strong[i] {
            if kinds[k] == PointKind::Undecided && lambda[k] > 0 {
                lambda[k] -= 1;
                heap.push((lambda[k], Reverse(k)));
            }
        }
    }
    let first_pass = kinds.iter().filter(|k| **k == PointKind::Coarse).count();

    let mut mark = vec![usize::MAX; n];
    for i in 0..n {
        if kinds[i] != PointKind::Fine {
            continue;
        }
        for &k in &strong[i] {
            if kinds[k] == PointKind::Coarse {
                mark[k] = i;
            }
        }
        for idx in 0..strong[i].len() {
            let j = strong[i][idx];
            if kinds[j] != PointKind::Fine {
                continue;
            }
            let shared = strong[j]
                .iter()
                .any(|&k| kinds[k] == PointKind::Coarse && mark[k] == i);
            if !shared {
                kinds[j] = PointKind::Coarse;
                mark[j] = i;
            }
        }
    }

    let splitting = CfSplitting::from_kinds(kinds);
    debug!(
        "RS splitting: n = {}, first pass C = {}, final C = {}",
        n, first_pass, splitting.n_coarse
    );
    splitting
}

/// Direct interpolation from the strong C neighbours of every F point. Negative and
/// positive couplings are scaled separately so that the weights of row i reproduce the
/// row sums of A:
///   w_ij = -alpha_i a_ij / a_ii   (a_ij < 0),   w_ij = -beta_i a_ij / a_ii   (a_ij > 0)
/// If no positive coupling goes to a C point, the positive sum is lumped into the diagonal.
pub fn direct_interpolation(
    a: &CsrMatrix,
    strong: &[Vec<usize>],
    splitting: &CfSplitting,
) -> Result<CsrMatrix, LinAlgError> {
    let n = a.nrow();
    if strong.len() != n || splitting.kinds.len() != n {
        return Err(LinAlgError::size_mismatch(
            "direct_interpolation",
            n,
            strong.len().min(splitting.kinds.len()),
        ));
    }
    let mut values = Vec::new();
    let mut col_ind = Vec::new();
    let mut row_ptr = Vec::with_capacity(n + 1);
    row_ptr.push(0);
    let mut in_ci = vec![usize::MAX; n];
    let mut row: Vec<(usize, f64)> = Vec::new();

    for i in 0..n {
        if let Some(c) = splitting.coarse_map[i] {
            values.push(1.0);
            col_ind.push(c);
            row_ptr.push(values.len());
            continue;
        }
        for &j in &strong[i] {
            if splitting.is_coarse(j) {
                in_ci[j] = i;
            }
        }
        let (cols, vals) = a.row(i);
        let mut diag = 0.0;
        let (mut neg_all, mut pos_all, mut neg_c, mut pos_c) = (0.0, 0.0, 0.0, 0.0);
        for (&j, &v) in cols.iter().zip(vals.iter()) {
            if j == i {
                diag += v;
                continue;
            }
            let coarse = in_ci[j] == i;
            if v < 0.0 {
                neg_all += v;
                if coarse {
                    neg_c += v;
                }
            } else {
                pos_all += v;
                if coarse {
                    pos_c += v;
                }
            }
        }
        let alpha = if neg_c.abs() > CLOSE_ZERO { neg_all / neg_c } else { 0.0 };
        let (beta, d) = if pos_c.abs() > CLOSE_ZERO {
            (pos_all / pos_c, diag)
        } else {
            (0.0, diag + pos_all)
        };
        if d.abs() < SMALL_TOL {
            warn!("interpolation: vanishing diagonal in F row {}, row left empty", i);
            row_ptr.push(values.len());
            continue;
        }

        row.clear();
        for (&j, &v) in cols.iter().zip(vals.iter()) {
            if j == i || in_ci[j] != i {
                continue;
            }
            let scale = if v < 0.0 { alpha } else { beta };
            if let Some(c) = splitting.coarse_map[j] {
                row.push((c, -scale * v / d));
            }
        }
        row.sort_by_key(|(c, _)| *c);
        for &(c, w) in &row {
            values.push(w);
            col_ind.push(c);
        }
        row_ptr.push(values.len());
    }
    let nnz = values.len();
    CsrMatrix::new(n, splitting.n_coarse, nnz, values, col_ind, row_ptr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::gallery::{laplacian_1d, laplacian_2d};
    use crate::linalg::vector::Vector;
    use approx::assert_relative_eq;

    #[test]
    fn test_strength_of_laplacian() {
        let a = laplacian_1d(4).unwrap();
        let s = strength_of_connection(&a, 0.25);
        assert_eq!(s[0], vec![1]);
        assert_eq!(s[1], vec![0, 2]);
        assert_eq!(s[3], vec![2]);
        let d = CsrMatrix::from_diagonal(&[1.0, 2.0]);
        assert!(strength_of_connection(&d, 0.25).iter().all(|s| s.is_empty()));
    }

    #[test]
    fn test_1d_splitting_alternates() {
        let a = laplacian_1d(9).unwrap();
        let s = strength_of_connection(&a, 0.25);
        let split = ruge_stuben_splitting(&s);
        let coarse: Vec<usize> = (0..9).filter(|&i| split.is_coarse(i)).collect();
        assert_eq!(coarse, vec![1, 3, 5, 7]);
        // every F point has a strong C neighbour
        for i in 0..9 {
            if !split.is_coarse(i) {
                assert!(s[i].iter().any(|&j| split.is_coarse(j)));
            }
        }
    }

    #[test]
    fn test_isolated_points_are_fine() {
        let d = CsrMatrix::from_diagonal(&[1.0, 2.0, 3.0]);
        let split = ruge_stuben_splitting(&strength_of_connection(&d, 0.25));
        assert_eq!(split.n_coarse, 0);
        assert!(split.kinds.iter().all(|k| *k == PointKind::Fine));
    }

    #[test]
    fn test_2d_splitting_covers_strong_ff_pairs() {
        let a = laplacian_2d(8, 8).unwrap();
        let s = strength_of_connection(&a, 0.25);
        let split = ruge_stuben_splitting(&s);
        assert!(split.n_coarse > 0 && split.n_coarse < 64);
        for i in 0..64 {
            if split.is_coarse(i) {
                continue;
            }
            for &j in &s[i] {
                if split.is_coarse(j) {
                    continue;
                }
                let shared = s[j].iter().any(|&k| split.is_coarse(k) && s[i].contains(&k));
                assert!(shared, "F-F pair ({}, {}) without common C point", i, j);
            }
        }
    }

    #[test]
    fn test_interpolation_preserves_constants_in_interior() {
        let a = laplacian_1d(9).unwrap();
        let s = strength_of_connection(&a, 0.25);
        let split = ruge_stuben_splitting(&s);
        let p = direct_interpolation(&a, &s, &split).unwrap();
        assert_eq!(p.nrow(), 9);
        assert_eq!(p.mcol(), split.n_coarse);
        let ones = Vector::filled(split.n_coarse, 1.0);
        let mut y = Vector::new(9);
        p.apply(&ones, &mut y).unwrap();
        // zero row sum rows interpolate constants exactly
        for i in 2..7 {
            assert_relative_eq!(y[i], 1.0, epsilon = 1e-14);
        }
        // C rows are injections
        assert_eq!(p.row(1), (&[0usize][..], &[1.0][..]));
    }
}
