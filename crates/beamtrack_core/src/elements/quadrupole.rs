//! Quadrupole transfer map (Bmad manual §24.15).
//!
//! The body is integrated in `num_steps` slices. Each slice applies the
//! linear 2x2 matrix in both transverse planes with the strength rescaled
//! by the particle's momentum, accumulates the second-order path-length
//! terms, and corrects `z` for particles slower than light.

use serde::{Deserialize, Serialize};

use crate::error::TrackingError;
use crate::particle::Particle;
use crate::traits::{Coordinate, MathBackend, Trackable};

/// Floor added under `sqrt(|k1|)` so that `k1 = 0` does not divide by zero.
pub const MACHINE_EPSILON: f64 = 2.220446049250313e-16;

/// Below `mass * (beta0 * pz)^2 < LOW_ENERGY_THRESHOLD * E_tot` the
/// low-energy `z` correction switches to its series form.
pub const LOW_ENERGY_THRESHOLD: f64 = 3e-7;

fn default_num_steps() -> usize {
    1
}

/// Linear focusing element. `k1 > 0` focuses horizontally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Quadrupole {
    #[serde(rename = "L")]
    pub length: f64,
    #[serde(rename = "K1", default)]
    pub k1: f64,
    #[serde(rename = "NUM_STEPS", default = "default_num_steps")]
    pub num_steps: usize,
    #[serde(rename = "X_OFFSET", default)]
    pub x_offset: f64,
    #[serde(rename = "Y_OFFSET", default)]
    pub y_offset: f64,
    #[serde(rename = "TILT", default)]
    pub tilt: f64,
}

impl Quadrupole {
    pub fn new(length: f64, k1: f64) -> Self {
        Self {
            length,
            k1,
            num_steps: 1,
            x_offset: 0.0,
            y_offset: 0.0,
            tilt: 0.0,
        }
    }

    pub fn with_num_steps(mut self, num_steps: usize) -> Self {
        self.num_steps = num_steps;
        self
    }

    pub fn with_offsets(mut self, x_offset: f64, y_offset: f64) -> Self {
        self.x_offset = x_offset;
        self.y_offset = y_offset;
        self
    }

    pub fn with_tilt(mut self, tilt: f64) -> Self {
        self.tilt = tilt;
        self
    }
}

/// One plane's slice map: `[a11 a12; a21 a22]` plus the coefficients of
/// `dz = c1 x0^2 + c2 x0 px0 + c3 px0^2`.
#[derive(Debug, Clone)]
pub struct QuadMatrix<T> {
    pub a11: T,
    pub a12: T,
    pub a21: T,
    pub a22: T,
    pub c1: T,
    pub c2: T,
    pub c3: T,
}

impl<T: Coordinate> QuadMatrix<T> {
    /// `k1 > 0` defocuses in this plane (hyperbolic branch).
    pub fn new(math: &dyn MathBackend<T>, k1: T, length: T, rel_p: T) -> Self {
        let two = T::splat(2.0);
        let four = T::splat(4.0);

        let sqrt_k = math.sqrt(&(math.abs(&k1) + T::splat(MACHINE_EPSILON)));
        let sk_l = sqrt_k.clone() * length.clone();

        let neg_k1 = -k1.clone();
        let cx = neg_k1.select_negative(math.cosh(&sk_l), math.cos(&sk_l));
        let sx = neg_k1.select_negative(math.sinh(&sk_l), math.sin(&sk_l)) / sqrt_k;

        let a12 = sx.clone() / rel_p.clone();
        let a21 = k1.clone() * sx.clone() * rel_p.clone();

        let c1 = k1.clone() * (length.clone() - cx.clone() * sx.clone()) / four.clone();
        let c2 = -k1 * sx.clone() * sx.clone() / (two * rel_p.clone());
        let c3 = -(cx.clone() * sx + length) / (four * rel_p.clone() * rel_p);

        Self {
            a11: cx.clone(),
            a12,
            a21,
            a22: cx,
            c1,
            c2,
            c3,
        }
    }

    /// Second-order path-length change for entrance coordinates `(u, pu)`.
    pub fn dz(&self, u: &T, pu: &T) -> T {
        self.c1.clone() * u.clone() * u.clone()
            + self.c2.clone() * u.clone() * pu.clone()
            + self.c3.clone() * pu.clone() * pu.clone()
    }

    /// Applies the 2x2 matrix to `(u, pu)`.
    pub fn apply(&self, u: &T, pu: &T) -> (T, T) {
        (
            self.a11.clone() * u.clone() + self.a12.clone() * pu.clone(),
            self.a21.clone() * u.clone() + self.a22.clone() * pu.clone(),
        )
    }
}

/// Path-length correction for a particle slower than light over `ds`.
///
/// Returns `ds * (beta - beta0) / beta0`, switching to a series in `pz` when
/// `beta` is so close to `beta0` that the direct difference cancels.
pub fn low_energy_z_correction<T: Coordinate>(
    math: &dyn MathBackend<T>,
    pz: &T,
    p0c: &T,
    mass: &T,
    ds: &T,
) -> T {
    let one = T::splat(1.0);
    let two = T::splat(2.0);
    let three_halves = T::splat(1.5);
    let half = T::splat(0.5);

    let p = (one.clone() + pz.clone()) * p0c.clone();
    let mass_sq = mass.clone() * mass.clone();
    let e_tot = math.sqrt(&(p0c.clone() * p0c.clone() + mass_sq.clone()));
    let beta = p.clone() / math.sqrt(&(p.clone() * p + mass_sq));
    let beta0 = p0c.clone() / e_tot.clone();
    let beta0_sq = beta0.clone() * beta0.clone();
    let mass_ratio_sq = (mass.clone() / e_tot.clone()) * (mass.clone() / e_tot.clone());

    let evaluation = mass.clone() * beta0_sq.clone() * pz.clone() * pz.clone();
    let below = evaluation - T::splat(LOW_ENERGY_THRESHOLD) * e_tot;

    let series = ds.clone()
        * pz.clone()
        * (one - three_halves * pz.clone() * beta0_sq.clone()
            + pz.clone()
                * pz.clone()
                * beta0_sq.clone()
                * (two * beta0_sq - half * mass_ratio_sq.clone()))
        * mass_ratio_sq;
    let direct = ds.clone() * (beta - beta0.clone()) / beta0;

    below.select_negative(series, direct)
}

/// Transverse coordinates in the order `(x, px, y, py)`.
type Transverse<T> = (T, T, T, T);

/// Laboratory frame to element entrance frame: shift by the offsets, then
/// rotate by `-tilt`.
pub fn offset_particle_entrance<T: Coordinate>(
    math: &dyn MathBackend<T>,
    quad: &Quadrupole,
    (x, px, y, py): Transverse<T>,
) -> Transverse<T> {
    let tilt = T::splat(quad.tilt);
    let s = math.sin(&tilt);
    let c = math.cos(&tilt);
    let x_int = x - T::splat(quad.x_offset);
    let y_int = y - T::splat(quad.y_offset);
    (
        x_int.clone() * c.clone() + y_int.clone() * s.clone(),
        px.clone() * c.clone() + py.clone() * s.clone(),
        -x_int * s.clone() + y_int * c.clone(),
        -px * s + py * c,
    )
}

/// Element exit frame back to the laboratory frame: rotate by `+tilt`, then
/// add the offsets back.
pub fn offset_particle_exit<T: Coordinate>(
    math: &dyn MathBackend<T>,
    quad: &Quadrupole,
    (x, px, y, py): Transverse<T>,
) -> Transverse<T> {
    let tilt = T::splat(quad.tilt);
    let s = math.sin(&tilt);
    let c = math.cos(&tilt);
    let x_int = x.clone() * c.clone() - y.clone() * s.clone();
    let y_int = x * s.clone() + y * c.clone();
    (
        x_int + T::splat(quad.x_offset),
        px.clone() * c.clone() - py.clone() * s.clone(),
        y_int + T::splat(quad.y_offset),
        px * s + py * c,
    )
}

/// Tracks `p_in` through `quad`.
///
/// `quad.num_steps` must be at least 1; the lattice driver checks this via
/// [`Trackable::validate`] before tracking starts.
pub fn track_quadrupole<T: Coordinate>(
    math: &dyn MathBackend<T>,
    p_in: &Particle<T>,
    quad: &Quadrupole,
) -> Particle<T> {
    let one = T::splat(1.0);
    let length = T::splat(quad.length);
    let step_len = T::splat(quad.length / quad.num_steps as f64);
    let k1_ref = T::splat(quad.k1);

    let Particle {
        x,
        px,
        y,
        py,
        mut z,
        pz,
        s,
        p0c,
        mc2,
    } = p_in.clone();

    let (mut x, mut px, mut y, mut py) = offset_particle_entrance(math, quad, (x, px, y, py));

    for _ in 0..quad.num_steps {
        let rel_p = one.clone() + pz.clone();
        // Off-momentum particles see K1 / (1 + pz).
        let k1 = k1_ref.clone() / rel_p.clone();

        let mx = QuadMatrix::new(math, -k1.clone(), step_len.clone(), rel_p.clone());
        let my = QuadMatrix::new(math, k1, step_len.clone(), rel_p);

        z = z + mx.dz(&x, &px) + my.dz(&y, &py);
        (x, px) = mx.apply(&x, &px);
        (y, py) = my.apply(&y, &py);

        z = z + low_energy_z_correction(math, &pz, &p0c, &mc2, &step_len);
    }

    let (x, px, y, py) = offset_particle_exit(math, quad, (x, px, y, py));

    Particle {
        x,
        px,
        y,
        py,
        z,
        pz,
        s: s + length,
        p0c,
        mc2,
    }
}

impl Trackable for Quadrupole {
    fn kind(&self) -> &'static str {
        "Quadrupole"
    }

    fn length(&self) -> f64 {
        self.length
    }

    fn validate(&self) -> Result<(), TrackingError> {
        if self.num_steps == 0 {
            return Err(TrackingError::InvalidSliceCount { value: 0.0 });
        }
        Ok(())
    }

    fn shortened(&self, n: usize) -> Self {
        Self {
            length: self.length / n as f64,
            ..*self
        }
    }

    fn advance<T: Coordinate>(
        &self,
        math: &dyn MathBackend<T>,
        p_in: &Particle<T>,
    ) -> Particle<T> {
        track_quadrupole(math, p_in, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EnsembleMath, FloatMath};
    use crate::elements::drift::{track_drift, Drift};
    use crate::ensemble::Ensemble;

    fn math() -> FloatMath<f64> {
        FloatMath::new()
    }

    fn sample_particle() -> Particle<f64> {
        Particle {
            x: 2e-3,
            px: 3e-3,
            y: -3e-3,
            py: -1e-3,
            z: 2e-3,
            pz: -2e-3,
            s: 0.0,
            p0c: 4e7,
            mc2: 0.511e6,
        }
    }

    #[test]
    fn slice_matrix_is_unimodular_in_both_regimes() {
        let math = math();
        for k1 in [-2.0, -0.3, 0.0, 0.3, 2.0] {
            let m = QuadMatrix::new(&math, k1, 0.4, 1.01);
            let det = m.a11 * m.a22 - m.a12 * m.a21;
            assert!((det - 1.0).abs() < 1e-12, "k1 = {k1}: det = {det}");
        }
    }

    #[test]
    fn slice_matrix_branches_on_strength_sign() {
        let math = math();
        let focusing = QuadMatrix::new(&math, -1.0, 0.5, 1.0);
        assert!((focusing.a11 - 0.5_f64.cos()).abs() < 1e-14);
        assert!((focusing.a21 + 0.5_f64.sin()).abs() < 1e-14);

        let defocusing = QuadMatrix::new(&math, 1.0, 0.5, 1.0);
        assert!((defocusing.a11 - 0.5_f64.cosh()).abs() < 1e-14);
        assert!((defocusing.a21 - 0.5_f64.sinh()).abs() < 1e-14);
    }

    #[test]
    fn zero_strength_slice_is_a_linear_drift() {
        let math = math();
        let m = QuadMatrix::new(&math, 0.0, 0.8, 1.0);
        assert!((m.a11 - 1.0).abs() < 1e-14);
        assert!((m.a12 - 0.8).abs() < 1e-14);
        assert_eq!(m.a21, 0.0);
        assert_eq!(m.c1, 0.0);
        assert_eq!(m.c2, 0.0);
        // -(L + L) / 4 = -L / 2: the paraxial drift path-length term.
        assert!((m.c3 + 0.4).abs() < 1e-14);
    }

    #[test]
    fn entrance_and_exit_frames_are_inverse() {
        let math = math();
        let quad = Quadrupole::new(1.0, 0.5)
            .with_offsets(1e-3, -2e-3)
            .with_tilt(0.3);
        let lab = (1e-3, 2e-4, -5e-4, 3e-4);
        let ele = offset_particle_entrance(&math, &quad, lab);
        let back = offset_particle_exit(&math, &quad, ele);
        assert!((back.0 - lab.0).abs() < 1e-17);
        assert!((back.1 - lab.1).abs() < 1e-17);
        assert!((back.2 - lab.2).abs() < 1e-17);
        assert!((back.3 - lab.3).abs() < 1e-17);
    }

    #[test]
    fn entrance_frame_rotates_by_negative_tilt() {
        let math = math();
        let quad = Quadrupole::new(1.0, 0.0).with_tilt(std::f64::consts::FRAC_PI_2);
        let (x, px, y, py) = offset_particle_entrance(&math, &quad, (1.0, 0.5, 0.0, 0.0));
        assert!(x.abs() < 1e-15);
        assert!((y + 1.0).abs() < 1e-15);
        assert!(px.abs() < 1e-15);
        assert!((py + 0.5).abs() < 1e-15);
    }

    #[test]
    fn low_energy_correction_branches_agree_near_threshold() {
        let math = math();
        let (p0c, mass, ds): (f64, f64, f64) = (4e7, 0.511e6, 1.0);
        let e_tot = (p0c * p0c + mass * mass).sqrt();
        let beta0 = p0c / e_tot;
        // pz right at the switch-over point.
        let pz = (LOW_ENERGY_THRESHOLD * e_tot / mass).sqrt() / beta0;

        let below = low_energy_z_correction(&math, &(pz * 0.999), &p0c, &mass, &ds);
        let above = low_energy_z_correction(&math, &(pz * 1.001), &p0c, &mass, &ds);
        assert!(below > 0.0 && above > 0.0);
        let rel = (above - below).abs() / below.abs();
        assert!(rel < 5e-3, "relative jump {rel}");
    }

    #[test]
    fn low_energy_series_matches_high_precision_value() {
        let math = math();
        let (p0c, mass, ds, pz) = (1e6, 0.511e6, 1.0, 1e-8);
        let dz = low_energy_z_correction(&math, &pz, &p0c, &mass, &ds);
        // d(beta)/beta0 ~ pz * (mass/E)^2 at first order.
        let e_tot = (p0c * p0c + mass * mass).sqrt();
        let first_order = pz * (mass / e_tot).powi(2);
        assert!((dz - first_order).abs() < 1e-6 * first_order);
    }

    #[test]
    fn ultra_relativistic_particle_gets_no_correction_at_zero_pz() {
        let math = math();
        let dz = low_energy_z_correction(&math, &0.0, &1e9, &0.511e6, &1.0);
        assert_eq!(dz, 0.0);
    }

    #[test]
    fn quadrupole_matches_single_slice_reference() {
        let math = math();
        let p_in = sample_particle();
        let quad = Quadrupole::new(0.1, 10.0);
        let p_out = track_quadrupole(&math, &p_in, &quad);

        let rel_p = 1.0 + p_in.pz;
        let k = 10.0 / rel_p;
        let sk = (k + MACHINE_EPSILON).sqrt();
        let (cx, sx) = ((sk * 0.1).cos(), (sk * 0.1).sin() / sk);
        let x = cx * p_in.x + sx / rel_p * p_in.px;
        let px = -k * sx * rel_p * p_in.x + cx * p_in.px;
        let (cy, sy) = ((sk * 0.1).cosh(), (sk * 0.1).sinh() / sk);
        let y = cy * p_in.y + sy / rel_p * p_in.py;
        let py = k * sy * rel_p * p_in.y + cy * p_in.py;

        assert!((p_out.x - x).abs() < 1e-15);
        assert!((p_out.px - px).abs() < 1e-15);
        assert!((p_out.y - y).abs() < 1e-15);
        assert!((p_out.py - py).abs() < 1e-15);
        assert_eq!(p_out.pz, p_in.pz);
        assert_eq!(p_out.s, 0.1);
    }

    #[test]
    fn positive_k1_focuses_horizontally_and_defocuses_vertically() {
        let math = math();
        let p_in = Particle {
            x: 1e-3,
            y: 1e-3,
            ..Particle::reference(1e9, 0.511e6)
        };
        let p_out = track_quadrupole(&math, &p_in, &Quadrupole::new(0.5, 1.0));
        assert!(p_out.px < 0.0);
        assert!(p_out.py > 0.0);
        assert!(p_out.x < p_in.x);
        assert!(p_out.y > p_in.y);
    }

    #[test]
    fn zero_strength_quadrupole_tracks_close_to_drift() {
        let math = math();
        let p_in = Particle {
            x: 1e-3,
            px: 1e-5,
            y: -1e-3,
            py: 2e-5,
            pz: 1e-5,
            ..Particle::reference(1e9, 0.511e6)
        };
        let quad = track_quadrupole(&math, &p_in, &Quadrupole::new(1.0, 0.0));
        let drift = track_drift(&math, &p_in, &Drift::new(1.0));
        assert!((quad.x - drift.x).abs() < 1e-12);
        assert!((quad.y - drift.y).abs() < 1e-12);
        assert!((quad.px - drift.px).abs() < 1e-12);
        assert!((quad.py - drift.py).abs() < 1e-12);
        assert_eq!(quad.s, drift.s);
    }

    #[test]
    fn offsets_without_strength_cancel() {
        let math = math();
        let p_in = sample_particle();
        let plain = track_quadrupole(&math, &p_in, &Quadrupole::new(0.3, 0.0));
        let shifted = track_quadrupole(
            &math,
            &p_in,
            &Quadrupole::new(0.3, 0.0).with_offsets(5e-3, -5e-3),
        );
        assert!((plain.x - shifted.x).abs() < 1e-15);
        assert!((plain.y - shifted.y).abs() < 1e-15);
    }

    #[test]
    fn refinement_error_is_bounded_by_single_slice_error() {
        let math = math();
        let p_in = Particle {
            x: 1e-3,
            px: 2e-3,
            y: -1e-3,
            py: 1e-3,
            pz: 5e-2,
            ..Particle::reference(1e7, 0.511e6)
        };
        let track = |n| track_quadrupole(&math, &p_in, &Quadrupole::new(1.0, 0.5).with_num_steps(n));
        let fine = track(400);
        let errors: Vec<[f64; 3]> = [1, 2, 5, 10, 50]
            .iter()
            .map(|&n| {
                let coarse = track(n);
                [
                    (coarse.x - fine.x).abs(),
                    (coarse.y - fine.y).abs(),
                    (coarse.z - fine.z).abs(),
                ]
            })
            .collect();
        // pz is constant through the body, so every slice count composes to
        // the same map and only rounding separates them.
        for error in &errors {
            for (k, e) in error.iter().enumerate() {
                assert!(*e < 1e-14, "errors not bounded: {errors:?}");
                assert!(*e <= errors[0][k] + 1e-15, "errors grew: {errors:?}");
            }
        }
        assert_eq!(track(50).s, fine.s);
    }

    #[test]
    fn ensemble_quadrupole_uses_per_particle_low_energy_branch() {
        let scalar = math();
        let pzs = vec![0.0, 1e-6, 0.2];
        let quad = Quadrupole::new(0.4, -1.5).with_num_steps(3).with_tilt(0.1);
        let p_in = Particle {
            x: Ensemble::splat(1e-3),
            px: Ensemble::splat(-2e-4),
            y: Ensemble::splat(5e-4),
            py: Ensemble::splat(1e-4),
            z: Ensemble::splat(0.0),
            pz: Ensemble::from_vec(pzs.clone()),
            s: Ensemble::splat(0.0),
            p0c: Ensemble::splat(2e6),
            mc2: Ensemble::splat(0.511e6),
        };
        let out = track_quadrupole(&EnsembleMath, &p_in, &quad);
        for (i, &pz) in pzs.iter().enumerate() {
            let single = Particle {
                x: 1e-3,
                px: -2e-4,
                y: 5e-4,
                py: 1e-4,
                pz,
                ..Particle::reference(2e6, 0.511e6)
            };
            let expected = track_quadrupole(&scalar, &single, &quad);
            assert_eq!(out.x[i], expected.x);
            assert_eq!(out.py[i], expected.py);
            assert_eq!(out.z[i], expected.z);
        }
    }

    #[test]
    fn zero_slices_fail_validation() {
        let quad = Quadrupole::new(1.0, 0.5).with_num_steps(0);
        assert_eq!(
            quad.validate(),
            Err(TrackingError::InvalidSliceCount { value: 0.0 })
        );
        assert!(Quadrupole::new(1.0, 0.5).validate().is_ok());
    }

    #[test]
    fn deserializes_with_defaults() {
        let quad: Quadrupole = serde_json::from_str(r#"{"L": 0.5, "K1": 1.2}"#).expect("quad");
        assert_eq!(quad, Quadrupole::new(0.5, 1.2));
    }
}
