//! Dense vector of `f64` and the BLAS-1 style kernels used by every solver.
//!
//! All binary kernels check the sizes of their arguments and return
//! `LinAlgError::SizeMismatch` instead of truncating to the shorter operand.
use crate::linalg::errors::{CLOSE_ZERO, LinAlgError};
use itertools::izip;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vector {
    values: Vec<f64>,
}

impl Vector {
    /// zero vector of the given size
    pub fn new(size: usize) -> Vector {
        Vector {
            values: vec![0.0; size],
        }
    }

    pub fn filled(size: usize, value: f64) -> Vector {
        Vector {
            values: vec![value; size],
        }
    }

    /// copies the buffer; the new vector never aliases `data`
    pub fn from_slice(data: &[f64]) -> Vector {
        Vector {
            values: data.to_vec(),
        }
    }

    pub fn from_vec(values: Vec<f64>) -> Vector {
        Vector { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.values.iter()
    }

    pub fn get(&self, i: usize) -> Result<f64, LinAlgError> {
        self.values
            .get(i)
            .copied()
            .ok_or_else(|| LinAlgError::size_mismatch("Vector::get", self.len(), i + 1))
    }

    /// resize and set every entry to `value`
    pub fn set_values(&mut self, size: usize, value: f64) {
        self.values.clear();
        self.values.resize(size, value);
    }

    pub fn fill(&mut self, value: f64) {
        self.values.iter_mut().for_each(|v| *v = value);
    }

    fn check_size(&self, other: &Vector, context: &str) -> Result<(), LinAlgError> {
        if self.len() != other.len() {
            return Err(LinAlgError::size_mismatch(context, self.len(), other.len()));
        }
        Ok(())
    }

    /// self = other, sizes must agree
    pub fn copy_from(&mut self, other: &Vector) -> Result<(), LinAlgError> {
        self.check_size(other, "Vector::copy_from")?;
        self.values.copy_from_slice(&other.values);
        Ok(())
    }

    /// self = a * self
    pub fn scale(&mut self, a: f64) {
        self.values.iter_mut().for_each(|v| *v *= a);
    }

    /// self = self + a (element-wise)
    pub fn shift(&mut self, a: f64) {
        self.values.iter_mut().for_each(|v| *v += a);
    }

    pub fn abs(&mut self) {
        self.values.iter_mut().for_each(|v| *v = v.abs());
    }

    /// self[i] = 1 / self[i]; fails on the first entry with |v| < CLOSE_ZERO
    pub fn reciprocal(&mut self) -> Result<(), LinAlgError> {
        if let Some(index) = self.values.iter().position(|v| v.abs() < CLOSE_ZERO) {
            return Err(LinAlgError::DivideByZero { index });
        }
        self.values.iter_mut().for_each(|v| *v = 1.0 / *v);
        Ok(())
    }

    /// Like `reciprocal`, but entries with |v| < tol become zero instead of failing.
    /// Returns the number of entries that were zeroed.
    pub fn reciprocal_tolerant(&mut self, tol: f64) -> usize {
        let mut zeroed = 0;
        for v in self.values.iter_mut() {
            if v.abs() < tol {
                *v = 0.0;
                zeroed += 1;
            } else {
                *v = 1.0 / *v;
            }
        }
        zeroed
    }

    /// self[i] *= other[i]
    pub fn pointwise_mult(&mut self, other: &Vector) -> Result<(), LinAlgError> {
        self.check_size(other, "Vector::pointwise_mult")?;
        for (s, &o) in self.values.iter_mut().zip(other.values.iter()) {
            *s *= o;
        }
        Ok(())
    }

    /// self[i] /= other[i]
    pub fn pointwise_divide(&mut self, other: &Vector) -> Result<(), LinAlgError> {
        self.check_size(other, "Vector::pointwise_divide")?;
        if let Some(index) = other.values.iter().position(|v| v.abs() < CLOSE_ZERO) {
            return Err(LinAlgError::DivideByZero { index });
        }
        for (s, &o) in self.values.iter_mut().zip(other.values.iter()) {
            *s /= o;
        }
        Ok(())
    }

    /// self = self + a * x
    pub fn axpy(&mut self, a: f64, x: &Vector) -> Result<(), LinAlgError> {
        self.check_size(x, "Vector::axpy")?;
        for (s, &xi) in self.values.iter_mut().zip(x.values.iter()) {
            *s += a * xi;
        }
        Ok(())
    }

    /// self = x + a * self
    pub fn xpay(&mut self, a: f64, x: &Vector) -> Result<(), LinAlgError> {
        self.check_size(x, "Vector::xpay")?;
        for (s, &xi) in self.values.iter_mut().zip(x.values.iter()) {
            *s = xi + a * *s;
        }
        Ok(())
    }

    /// self = a * self + b * x
    pub fn axpby(&mut self, a: f64, b: f64, x: &Vector) -> Result<(), LinAlgError> {
        self.check_size(x, "Vector::axpby")?;
        for (s, &xi) in self.values.iter_mut().zip(x.values.iter()) {
            *s = a * *s + b * xi;
        }
        Ok(())
    }

    /// self = a * x + b * y
    pub fn waxpby(&mut self, a: f64, x: &Vector, b: f64, y: &Vector) -> Result<(), LinAlgError> {
        self.check_size(x, "Vector::waxpby")?;
        self.check_size(y, "Vector::waxpby")?;
        for (w, &xi, &yi) in izip!(self.values.iter_mut(), x.values.iter(), y.values.iter()) {
            *w = a * xi + b * yi;
        }
        Ok(())
    }

    pub fn dot(&self, other: &Vector) -> Result<f64, LinAlgError> {
        self.check_size(other, "Vector::dot")?;
        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum())
    }

    pub fn norm2(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    pub fn norm1(&self) -> f64 {
        self.values.iter().map(|v| v.abs()).sum()
    }

    pub fn norm_inf(&self) -> f64 {
        self.values.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    /// largest entry; `None` for an empty vector
    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }
}

impl Index<usize> for Vector {
    type Output = f64;
    fn index(&self, i: usize) -> &f64 {
        &self.values[i]
    }
}

impl IndexMut<usize> for Vector {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.values[i]
    }
}

impl From<Vec<f64>> for Vector {
    fn from(values: Vec<f64>) -> Self {
        Vector { values }
    }
}

impl From<&nalgebra::DVector<f64>> for Vector {
    fn from(v: &nalgebra::DVector<f64>) -> Self {
        Vector::from_slice(v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_axpy_family() {
        let x = Vector::from_slice(&[1.0, 2.0, 3.0]);
        let mut y = Vector::filled(3, 1.0);
        y.axpy(2.0, &x).unwrap();
        assert_eq!(y.as_slice(), &[3.0, 5.0, 7.0]);
        y.xpay(0.5, &x).unwrap();
        assert_eq!(y.as_slice(), &[2.5, 4.5, 6.5]);
        y.axpby(2.0, -1.0, &x).unwrap();
        assert_eq!(y.as_slice(), &[4.0, 7.0, 10.0]);
        let mut w = Vector::new(3);
        w.waxpby(1.0, &x, -1.0, &y).unwrap();
        assert_eq!(w.as_slice(), &[-3.0, -5.0, -7.0]);
    }

    #[test]
    fn test_size_mismatch_is_an_error() {
        let x = Vector::new(3);
        let mut y = Vector::new(4);
        assert!(matches!(
            y.axpy(1.0, &x),
            Err(LinAlgError::SizeMismatch { .. })
        ));
        assert!(x.dot(&y).is_err());
        assert!(y.copy_from(&x).is_err());
    }

    #[test]
    fn test_norms_and_extrema() {
        let v = Vector::from_slice(&[3.0, -4.0, 0.0]);
        assert_relative_eq!(v.norm2(), 5.0);
        assert_relative_eq!(v.norm1(), 7.0);
        assert_relative_eq!(v.norm_inf(), 4.0);
        assert_eq!(v.max(), Some(3.0));
        assert_eq!(v.min(), Some(-4.0));
        assert_eq!(Vector::new(0).max(), None);
        assert_relative_eq!(v.dot(&v).unwrap(), 25.0);
    }

    #[test]
    fn test_reciprocal() {
        let mut v = Vector::from_slice(&[2.0, 4.0]);
        v.reciprocal().unwrap();
        assert_eq!(v.as_slice(), &[0.5, 0.25]);
        let mut z = Vector::from_slice(&[2.0, 0.0, 1.0]);
        assert_eq!(z.reciprocal(), Err(LinAlgError::DivideByZero { index: 1 }));
        assert_eq!(z.reciprocal_tolerant(1e-12), 1);
        assert_eq!(z.as_slice(), &[0.5, 0.0, 1.0]);
    }

    #[test]
    fn test_from_slice_copies() {
        let mut buffer = vec![1.0, 2.0];
        let v = Vector::from_slice(&buffer);
        buffer[0] = 10.0;
        assert_eq!(v[0], 1.0);
    }
}
