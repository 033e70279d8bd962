//! Arnoldi building blocks shared by GMRES and FGMRES: modified Gram-Schmidt and the
//! incremental Givens QR of the Hessenberg matrix.
use crate::linalg::errors::{CLOSE_ZERO, LinAlgError};
use crate::linalg::vector::Vector;

/// (c, s, r) with [c s; -s c] [a; b] = [r; 0] and r >= 0.
#[inline]
pub fn givens_rotation(a: f64, b: f64) -> (f64, f64, f64) {
    if b == 0.0 {
        if a >= 0.0 { (1.0, 0.0, a) } else { (-1.0, 0.0, -a) }
    } else if a == 0.0 {
        (0.0, b.signum(), b.abs())
    } else {
        let r = a.hypot(b);
        (a / r, b / r, r)
    }
}

/// Orthogonalizes `w` against `basis` in place and returns the new Hessenberg column
/// h_{0..=j, j} followed by h_{j+1, j} = |w|.
pub fn modified_gram_schmidt(basis: &[Vector], w: &mut Vector) -> Result<Vec<f64>, LinAlgError> {
    let mut h = Vec::with_capacity(basis.len() + 1);
    for v in basis {
        let hij = w.dot(v)?;
        w.axpy(-hij, v)?;
        h.push(hij);
    }
    h.push(w.norm2());
    Ok(h)
}

/// Least-squares problem min |beta e_1 - H y| solved column by column.
#[derive(Debug, Clone, Default)]
pub struct HessenbergQr {
    /// rotated columns, column j has j + 1 entries
    r: Vec<Vec<f64>>,
    cs: Vec<f64>,
    sn: Vec<f64>,
    g: Vec<f64>,
}

impl HessenbergQr {
    pub fn with_capacity(m: usize) -> Self {
        HessenbergQr {
            r: Vec::with_capacity(m),
            cs: Vec::with_capacity(m),
            sn: Vec::with_capacity(m),
            g: Vec::with_capacity(m + 1),
        }
    }

    pub fn reset(&mut self, beta: f64) {
        self.r.clear();
        self.cs.clear();
        self.sn.clear();
        self.g.clear();
        self.g.push(beta);
    }

    pub fn len(&self) -> usize {
        self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    /// Adds the column h (length j + 2) and returns the least-squares residual |g_{j+1}|.
    pub fn push_column(&mut self, mut h: Vec<f64>) -> f64 {
        let j = self.r.len();
        debug_assert_eq!(h.len(), j + 2);
        for i in 0..j {
            let t = self.cs[i] * h[i] + self.sn[i] * h[i + 1];
            h[i + 1] = -self.sn[i] * h[i] + self.cs[i] * h[i + 1];
            h[i] = t;
        }
        let (c, s, r) = givens_rotation(h[j], h[j + 1]);
        h[j] = r;
        h.truncate(j + 1);
        self.cs.push(c);
        self.sn.push(s);
        let gj = self.g[j];
        self.g[j] = c * gj;
        self.g.push(-s * gj);
        self.r.push(h);
        self.residual()
    }

    pub fn residual(&self) -> f64 {
        self.g.last().map_or(0.0, |g| g.abs())
    }

    /// Back substitution R y = g_{0..k}.
    pub fn solve(&self) -> Result<Vec<f64>, LinAlgError> {
        let k = self.r.len();
        let mut y = vec![0.0; k];
        for i in (0..k).rev() {
            let mut s = self.g[i];
            for (jj, yj) in y.iter().enumerate().skip(i + 1) {
                s -= self.r[jj][i] * yj;
            }
            let rii = self.r[i][i];
            if rii.abs() < CLOSE_ZERO {
                return Err(LinAlgError::DivideByZero { index: i });
            }
            y[i] = s / rii;
        }
        Ok(y)
    }
}

/// u = sum_j y_j basis_j
pub fn combine(basis: &[Vector], y: &[f64], u: &mut Vector) -> Result<(), LinAlgError> {
    u.fill(0.0);
    for (v, &yj) in basis.iter().zip(y.iter()) {
        u.axpy(yj, v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    #[test]
    fn test_givens_zeroes_second_component() {
        for (a, b) in [(3.0, 4.0), (-1.0, 2.0), (0.0, -5.0), (-2.0, 0.0)] {
            let (c, s, r) = givens_rotation(a, b);
            assert_relative_eq!(c * c + s * s, 1.0, epsilon = 1e-15);
            assert_relative_eq!(c * a + s * b, r, epsilon = 1e-14);
            assert_relative_eq!(-s * a + c * b, 0.0, epsilon = 1e-14);
            assert!(r >= 0.0);
        }
    }

    #[test]
    fn test_gram_schmidt_orthogonality() {
        let mut e0 = Vector::from_slice(&[1.0, 1.0, 0.0]);
        e0.scale(1.0 / 2f64.sqrt());
        let mut w = Vector::from_slice(&[1.0, 2.0, 3.0]);
        let h = modified_gram_schmidt(&[e0.clone()], &mut w).unwrap();
        assert_eq!(h.len(), 2);
        assert_relative_eq!(w.dot(&e0).unwrap(), 0.0, epsilon = 1e-14);
        assert_relative_eq!(h[1], w.norm2(), epsilon = 1e-14);
    }

    #[test]
    fn test_qr_matches_dense_least_squares() {
        // 4 x 3 upper Hessenberg matrix
        let cols = vec![
            vec![2.0, 1.0],
            vec![-1.0, 3.0, 0.5],
            vec![0.5, 1.0, 2.0, 1.5],
        ];
        let beta = 2.0;
        let mut qr = HessenbergQr::with_capacity(3);
        qr.reset(beta);
        for c in &cols {
            qr.push_column(c.clone());
        }
        let y = qr.solve().unwrap();

        let mut h = DMatrix::<f64>::zeros(4, 3);
        for (j, c) in cols.iter().enumerate() {
            for (i, v) in c.iter().enumerate() {
                h[(i, j)] = *v;
            }
        }
        let mut rhs = DVector::<f64>::zeros(4);
        rhs[0] = beta;
        let ht = h.transpose();
        let y_ref = (&ht * &h).lu().solve(&(&ht * &rhs)).unwrap();
        for i in 0..3 {
            assert_relative_eq!(y[i], y_ref[i], epsilon = 1e-12);
        }
        let res = (&rhs - &h * DVector::from_vec(y)).norm();
        assert_relative_eq!(qr.residual(), res, epsilon = 1e-12);
    }
}
