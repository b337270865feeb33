//! Forward-mode automatic differentiation.
//!
//! A `Dual` carries a value and one directional derivative. Tracking a
//! particle whose coordinates are duals yields the derivative of the exit
//! state along the seeded direction, which is how [`transfer_matrix`]
//! builds the linear map of a lattice one column at a time.

use std::ops::{Add, Div, Mul, Neg, Sub};

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::DualMath;
use crate::error::TrackingError;
use crate::particle::{Particle, PHASE_SPACE_DIM};
use crate::tracking::track_lattice_with;
use crate::traits::{Coordinate, Trackable};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    /// A constant: zero derivative.
    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }

    /// An independent variable: unit derivative.
    pub fn variable(val: f64) -> Self {
        Self::new(val, 1.0)
    }

    pub fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        Self::new(s, self.eps / (2.0 * s))
    }

    pub fn sin(self) -> Self {
        Self::new(self.val.sin(), self.eps * self.val.cos())
    }

    pub fn cos(self) -> Self {
        Self::new(self.val.cos(), -self.eps * self.val.sin())
    }

    pub fn sinh(self) -> Self {
        Self::new(self.val.sinh(), self.eps * self.val.cosh())
    }

    pub fn cosh(self) -> Self {
        Self::new(self.val.cosh(), self.eps * self.val.sinh())
    }

    pub fn abs(self) -> Self {
        Self::new(
            self.val.abs(),
            if self.val >= 0.0 { self.eps } else { -self.eps },
        )
    }

    pub fn sinc(self) -> Self {
        if self.val == 0.0 {
            // sinc is even, so its slope at the origin vanishes.
            return Self::new(1.0, 0.0);
        }
        let arg = std::f64::consts::PI * self.val;
        let value = arg.sin() / arg;
        Self::new(value, self.eps * (arg.cos() - value) / self.val)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Coordinate for Dual {
    fn splat(value: f64) -> Self {
        Self::constant(value)
    }

    fn select_negative(&self, negative: Self, otherwise: Self) -> Self {
        if self.val < 0.0 {
            negative
        } else {
            otherwise
        }
    }
}

/// Linear transfer matrix of a whole lattice about `reference`.
///
/// Row `i`, column `j` is `d(out_i) / d(in_j)` with coordinates ordered
/// `x, px, y, py, z, pz`. Each column is one tracking pass with the `j`-th
/// input coordinate seeded with a unit tangent.
pub fn transfer_matrix<E: Trackable>(
    lattice: &[E],
    reference: &Particle<f64>,
) -> Result<SMatrix<f64, PHASE_SPACE_DIM, PHASE_SPACE_DIM>, TrackingError> {
    let math = DualMath;
    let mut matrix = SMatrix::<f64, PHASE_SPACE_DIM, PHASE_SPACE_DIM>::zeros();
    let coords = reference.coordinates();

    for j in 0..PHASE_SPACE_DIM {
        let mut seeded = [Dual::constant(0.0); PHASE_SPACE_DIM];
        for i in 0..PHASE_SPACE_DIM {
            seeded[i] = Dual::new(coords[i], if i == j { 1.0 } else { 0.0 });
        }
        let p_in = Particle {
            x: seeded[0],
            px: seeded[1],
            y: seeded[2],
            py: seeded[3],
            z: seeded[4],
            pz: seeded[5],
            s: Dual::constant(reference.s),
            p0c: Dual::constant(reference.p0c),
            mc2: Dual::constant(reference.mc2),
        };

        let trajectory = track_lattice_with(&math, &p_in, lattice)?;
        let out = trajectory.last().coordinates();
        for i in 0..PHASE_SPACE_DIM {
            matrix[(i, j)] = out[i].eps;
        }
    }

    debug!(elements = lattice.len(), "computed lattice transfer matrix");
    Ok(matrix)
}
