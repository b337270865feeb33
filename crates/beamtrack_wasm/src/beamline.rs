//! Plain-Rust beamline state behind the WASM wrapper.

use anyhow::{bail, Context, Result};
use beamtrack_core::autodiff::transfer_matrix;
use beamtrack_core::backend::BackendRegistry;
use beamtrack_core::elements::{Element, ElementDescription, Lattice};
use beamtrack_core::ensemble::Ensemble;
use beamtrack_core::particle::{Particle, PHASE_SPACE_DIM};
use beamtrack_core::tracking::{Tracker, TrackingSettings};
use beamtrack_core::traits::Coordinate;
use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};

/// Many particles sharing one reference momentum and mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsemblePayload {
    pub x: Vec<f64>,
    pub px: Vec<f64>,
    pub y: Vec<f64>,
    pub py: Vec<f64>,
    pub z: Vec<f64>,
    pub pz: Vec<f64>,
    pub s: f64,
    pub p0c: f64,
    pub mc2: f64,
}

impl EnsemblePayload {
    fn into_particle(self) -> Result<Particle<Ensemble>> {
        let n = self.x.len();
        let columns = [&self.px, &self.y, &self.py, &self.z, &self.pz];
        if n == 0 {
            bail!("Ensemble must contain at least one particle.");
        }
        if columns.iter().any(|c| c.len() != n) {
            bail!("Ensemble coordinate arrays must all have length {}.", n);
        }
        Ok(Particle {
            x: Ensemble::from_vec(self.x),
            px: Ensemble::from_vec(self.px),
            y: Ensemble::from_vec(self.y),
            py: Ensemble::from_vec(self.py),
            z: Ensemble::from_vec(self.z),
            pz: Ensemble::from_vec(self.pz),
            s: Ensemble::splat(self.s),
            p0c: Ensemble::splat(self.p0c),
            mc2: Ensemble::splat(self.mc2),
        })
    }

    fn from_particle(p: &Particle<Ensemble>, n: usize) -> Self {
        let spread = |e: &Ensemble| -> Vec<f64> {
            if e.len() == 1 {
                vec![e[0]; n]
            } else {
                e.as_slice().to_vec()
            }
        };
        Self {
            x: spread(&p.x),
            px: spread(&p.px),
            y: spread(&p.y),
            py: spread(&p.py),
            z: spread(&p.z),
            pz: spread(&p.pz),
            s: p.s[0],
            p0c: p.p0c[0],
            mc2: p.mc2[0],
        }
    }
}

pub struct Beamline {
    lattice: Lattice,
    settings: TrackingSettings,
    registry: BackendRegistry,
}

impl Beamline {
    pub fn new(lattice: Lattice) -> Self {
        Self {
            lattice,
            settings: TrackingSettings::default(),
            registry: BackendRegistry::with_defaults(),
        }
    }

    pub fn from_descriptions(descriptions: &[ElementDescription]) -> Result<Self> {
        let lattice =
            Lattice::from_descriptions(descriptions).context("Invalid lattice description.")?;
        Ok(Self::new(lattice))
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn set_settings(&mut self, settings: TrackingSettings) -> Result<()> {
        if settings.subdivisions == 0 {
            bail!("subdivisions must be at least 1.");
        }
        self.settings = settings;
        Ok(())
    }

    pub fn track(&self, particle: &Particle<f64>) -> Result<Vec<Particle<f64>>> {
        let tracker = Tracker::<f64>::with_settings(&self.registry, self.settings)?;
        let trajectory = tracker
            .track(particle, &self.lattice)
            .context("Tracking failed.")?;
        Ok(trajectory.into_vec())
    }

    pub fn track_ensemble(&self, payload: EnsemblePayload) -> Result<Vec<EnsemblePayload>> {
        let n = payload.x.len();
        let particle = payload.into_particle()?;
        let tracker = Tracker::<Ensemble>::with_settings(&self.registry, self.settings)?;
        let trajectory = tracker
            .track(&particle, &self.lattice)
            .context("Ensemble tracking failed.")?;
        Ok(trajectory
            .iter()
            .map(|p| EnsemblePayload::from_particle(p, n))
            .collect())
    }

    /// 6x6 transfer matrix about `reference`, flattened row-major.
    pub fn transfer_matrix(&self, reference: &Particle<f64>) -> Result<Vec<f64>> {
        let matrix = if self.settings.subdivisions > 1 {
            transfer_matrix(&self.lattice.subdivided(self.settings.subdivisions)?, reference)?
        } else {
            transfer_matrix(&self.lattice, reference)?
        };
        Ok(row_major(&matrix))
    }
}

fn row_major(matrix: &SMatrix<f64, PHASE_SPACE_DIM, PHASE_SPACE_DIM>) -> Vec<f64> {
    let mut out = Vec::with_capacity(PHASE_SPACE_DIM * PHASE_SPACE_DIM);
    for i in 0..PHASE_SPACE_DIM {
        for j in 0..PHASE_SPACE_DIM {
            out.push(matrix[(i, j)]);
        }
    }
    out
}

impl From<Vec<Element>> for Beamline {
    fn from(elements: Vec<Element>) -> Self {
        Self::new(Lattice::new(elements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamtrack_core::elements::{Drift, Quadrupole};

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err:#}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn beamline() -> Beamline {
        Beamline::from(vec![
            Element::from(Drift::new(0.5)),
            Element::from(Quadrupole::new(0.2, 3.0).with_num_steps(2)),
            Element::from(Drift::new(0.5)),
        ])
    }

    #[test]
    fn track_returns_full_trajectory() {
        let particle = Particle {
            x: 1e-3,
            ..Particle::reference(1e9, 0.511e6)
        };
        let trajectory = beamline().track(&particle).expect("track");
        assert_eq!(trajectory.len(), 4);
        assert!((trajectory[3].s - 1.2).abs() < 1e-15);
    }

    #[test]
    fn subdivision_setting_multiplies_trajectory_length() {
        let mut line = beamline();
        line.set_settings(TrackingSettings { subdivisions: 3 })
            .expect("settings");
        let trajectory = line
            .track(&Particle::reference(1e9, 0.511e6))
            .expect("track");
        assert_eq!(trajectory.len(), 10);
        assert_err_contains(
            line.set_settings(TrackingSettings { subdivisions: 0 }),
            "at least 1",
        );
    }

    #[test]
    fn ensemble_tracking_matches_single_particles() {
        let line = beamline();
        let payload = EnsemblePayload {
            x: vec![1e-3, -1e-3],
            px: vec![0.0, 1e-4],
            y: vec![0.0, 2e-4],
            py: vec![0.0, 0.0],
            z: vec![0.0, 0.0],
            pz: vec![0.0, 1e-3],
            s: 0.0,
            p0c: 1e8,
            mc2: 0.511e6,
        };
        let out = line.track_ensemble(payload.clone()).expect("track");
        assert_eq!(out.len(), 4);
        for i in 0..2 {
            let single = Particle {
                x: payload.x[i],
                px: payload.px[i],
                y: payload.y[i],
                py: payload.py[i],
                z: payload.z[i],
                pz: payload.pz[i],
                s: payload.s,
                p0c: payload.p0c,
                mc2: payload.mc2,
            };
            let expected = line.track(&single).expect("track");
            assert_eq!(out[3].x[i], expected[3].x);
            assert_eq!(out[3].py[i], expected[3].py);
            assert_eq!(out[3].z[i], expected[3].z);
        }
    }

    #[test]
    fn ensemble_rejects_ragged_arrays() {
        let payload = EnsemblePayload {
            x: vec![1e-3, -1e-3],
            px: vec![0.0],
            y: vec![0.0, 0.0],
            py: vec![0.0, 0.0],
            z: vec![0.0, 0.0],
            pz: vec![0.0, 0.0],
            s: 0.0,
            p0c: 1e8,
            mc2: 0.511e6,
        };
        assert_err_contains(beamline().track_ensemble(payload), "length 2");
    }

    #[test]
    fn descriptions_surface_unknown_kinds() {
        let descriptions = vec![ElementDescription::new("Octupole").with("L", 1.0)];
        assert_err_contains(
            Beamline::from_descriptions(&descriptions).map(|_| ()),
            "unknown element kind",
        );
    }

    #[test]
    fn transfer_matrix_is_row_major() {
        let line = Beamline::from(vec![Element::from(Drift::new(2.0))]);
        let m = line
            .transfer_matrix(&Particle::reference(1e9, 0.511e6))
            .expect("matrix");
        assert_eq!(m.len(), 36);
        assert!((m[1] - 2.0).abs() < 1e-12);
        assert!(m[6].abs() < 1e-12);
    }
}
