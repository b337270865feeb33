use serde::{Deserialize, Serialize};

use crate::particle::Particle;
use crate::traits::{Coordinate, MathBackend, Trackable};

/// Field-free region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Drift {
    #[serde(rename = "L")]
    pub length: f64,
}

impl Drift {
    pub fn new(length: f64) -> Self {
        Self { length }
    }
}

/// `sqrt(1 + x) - 1` without cancellation for small `x`.
pub fn sqrt_one<T: Coordinate>(math: &dyn MathBackend<T>, x: T) -> T {
    let one = T::splat(1.0);
    let rad = math.sqrt(&(one.clone() + x.clone())) + one;
    x / rad
}

/// Exact drift propagation (Bmad manual §24.9).
///
/// Requires `px² + py² < (1 + pz)²`; otherwise the longitudinal momentum is
/// not real and the result is NaN.
pub fn track_drift<T: Coordinate>(
    math: &dyn MathBackend<T>,
    p_in: &Particle<T>,
    drift: &Drift,
) -> Particle<T> {
    let l = T::splat(drift.length);
    let one = T::splat(1.0);
    let two = T::splat(2.0);
    let Particle {
        x,
        px,
        y,
        py,
        z,
        pz,
        s,
        p0c,
        mc2,
    } = p_in.clone();

    let p = one.clone() + pz.clone();
    let px_frac = px.clone() / p.clone();
    let py_frac = py.clone() / p.clone();
    let pxy2 = px_frac.clone() * px_frac.clone() + py_frac.clone() * py_frac.clone();
    let pl = math.sqrt(&(one - pxy2.clone()));

    let x = x + l.clone() * px_frac / pl.clone();
    let y = y + l.clone() * py_frac / pl.clone();

    // z + L * (beta / beta_ref - 1 / Pl), rewritten to stay accurate near the
    // reference energy and at small angles.
    let mc2_sq = mc2.clone() * mc2.clone();
    let p0c_p = p0c.clone() * p;
    let energy_term = mc2_sq.clone() * (two * pz.clone() + pz.clone() * pz.clone())
        / (p0c_p.clone() * p0c_p + mc2_sq);
    let dz = l.clone() * (sqrt_one(math, energy_term) + sqrt_one(math, -pxy2) / pl);

    Particle {
        x,
        px,
        y,
        py,
        z: z + dz,
        pz,
        s: s + l,
        p0c,
        mc2,
    }
}

impl Trackable for Drift {
    fn kind(&self) -> &'static str {
        "Drift"
    }

    fn length(&self) -> f64 {
        self.length
    }

    fn shortened(&self, n: usize) -> Self {
        Self::new(self.length / n as f64)
    }

    fn advance<T: Coordinate>(
        &self,
        math: &dyn MathBackend<T>,
        p_in: &Particle<T>,
    ) -> Particle<T> {
        track_drift(math, p_in, self)
    }
}
