//! Array-valued coordinates for tracking many particles in one pass.
//!
//! Every arithmetic operation is element-wise. A length-1 ensemble
//! broadcasts against any other length, which is how literal constants
//! (`Coordinate::splat`) and the shared reference momentum mix with
//! per-particle coordinates.

use std::ops::{Add, Div, Index, Mul, Neg, Sub};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::traits::Coordinate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ensemble(pub DVector<f64>);

impl Ensemble {
    pub fn from_vec(values: Vec<f64>) -> Self {
        Self(DVector::from_vec(values))
    }

    pub fn from_slice(values: &[f64]) -> Self {
        Self(DVector::from_column_slice(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        self.0.as_slice()
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self(self.0.map(f))
    }

    /// Combines two ensembles element by element, broadcasting length 1.
    ///
    /// # Panics
    /// If both lengths differ and neither is 1.
    fn zip_with(&self, rhs: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        let (n, m) = (self.len(), rhs.len());
        check_broadcast(n, m);
        if n == m {
            Self(self.0.zip_map(&rhs.0, f))
        } else if n == 1 {
            let a = self.0[0];
            Self(rhs.0.map(|b| f(a, b)))
        } else {
            let b = rhs.0[0];
            Self(self.0.map(|a| f(a, b)))
        }
    }
}

fn check_broadcast(n: usize, m: usize) {
    if n != m && n != 1 && m != 1 {
        panic!("ensemble length mismatch: {} vs {}", n, m);
    }
}

impl Index<usize> for Ensemble {
    type Output = f64;
    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl From<Vec<f64>> for Ensemble {
    fn from(values: Vec<f64>) -> Self {
        Self::from_vec(values)
    }
}

impl Add for Ensemble {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.zip_with(&rhs, |a, b| a + b)
    }
}

impl Sub for Ensemble {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self.zip_with(&rhs, |a, b| a - b)
    }
}

impl Mul for Ensemble {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        self.zip_with(&rhs, |a, b| a * b)
    }
}

impl Div for Ensemble {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        self.zip_with(&rhs, |a, b| a / b)
    }
}

impl Neg for Ensemble {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Coordinate for Ensemble {
    fn splat(value: f64) -> Self {
        Self(DVector::from_element(1, value))
    }

    fn select_negative(&self, negative: Self, otherwise: Self) -> Self {
        check_broadcast(self.len(), negative.len());
        check_broadcast(self.len(), otherwise.len());
        check_broadcast(negative.len(), otherwise.len());
        let n = self.len().max(negative.len()).max(otherwise.len());
        let pick = |e: &Self, i: usize| if e.len() == 1 { e.0[0] } else { e.0[i] };
        Self(DVector::from_fn(n, |i, _| {
            if pick(self, i) < 0.0 {
                pick(&negative, i)
            } else {
                pick(&otherwise, i)
            }
        }))
    }
}
