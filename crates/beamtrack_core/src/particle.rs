//! Particle state and the trajectory recorded by the lattice driver.
//!
//! Phase-space coordinates follow the Bmad convention: `x, px, y, py` are the
//! transverse positions and momenta normalized by the reference momentum,
//! `z` is the longitudinal offset from the reference particle and `pz` the
//! relative momentum deviation.

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::traits::Coordinate;

/// Number of dynamical coordinates carried by a particle.
pub const PHASE_SPACE_DIM: usize = 6;

/// An immutable particle state.
///
/// `p0c` and `mc2` are reference-design constants in eV; every map passes
/// them through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle<T> {
    pub x: T,
    pub px: T,
    pub y: T,
    pub py: T,
    pub z: T,
    pub pz: T,
    pub s: T,
    pub p0c: T,
    pub mc2: T,
}

impl<T: Coordinate> Particle<T> {
    /// A particle sitting on the reference trajectory at `s = 0`.
    pub fn reference(p0c: f64, mc2: f64) -> Self {
        let zero = T::splat(0.0);
        Self {
            x: zero.clone(),
            px: zero.clone(),
            y: zero.clone(),
            py: zero.clone(),
            z: zero.clone(),
            pz: zero.clone(),
            s: zero,
            p0c: T::splat(p0c),
            mc2: T::splat(mc2),
        }
    }

    /// The six dynamical coordinates in `x, px, y, py, z, pz` order.
    pub fn coordinates(&self) -> [T; PHASE_SPACE_DIM] {
        [
            self.x.clone(),
            self.px.clone(),
            self.y.clone(),
            self.py.clone(),
            self.z.clone(),
            self.pz.clone(),
        ]
    }

    /// Replaces the six dynamical coordinates, keeping `s` and the reference.
    pub fn with_coordinates(&self, coords: [T; PHASE_SPACE_DIM]) -> Self {
        let [x, px, y, py, z, pz] = coords;
        Self {
            x,
            px,
            y,
            py,
            z,
            pz,
            s: self.s.clone(),
            p0c: self.p0c.clone(),
            mc2: self.mc2.clone(),
        }
    }
}

/// The particle before the first element followed by the particle after
/// each element, in lattice order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Trajectory<T> {
    particles: Vec<Particle<T>>,
}

impl<T> Trajectory<T> {
    pub(crate) fn with_capacity(initial: Particle<T>, elements: usize) -> Self {
        let mut particles = Vec::with_capacity(elements + 1);
        particles.push(initial);
        Self { particles }
    }

    pub(crate) fn push(&mut self, particle: Particle<T>) {
        self.particles.push(particle);
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Always false; a trajectory holds at least its input particle.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn initial(&self) -> &Particle<T> {
        &self.particles[0]
    }

    pub fn last(&self) -> &Particle<T> {
        &self.particles[self.particles.len() - 1]
    }

    pub fn get(&self, index: usize) -> Option<&Particle<T>> {
        self.particles.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle<T>> {
        self.particles.iter()
    }

    pub fn as_slice(&self) -> &[Particle<T>] {
        &self.particles
    }

    pub fn into_vec(self) -> Vec<Particle<T>> {
        self.particles
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Trajectory<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let particles = Vec::<Particle<T>>::deserialize(deserializer)?;
        if particles.is_empty() {
            return Err(de::Error::invalid_length(0, &"at least the initial particle"));
        }
        Ok(Self { particles })
    }
}

impl<'a, T> IntoIterator for &'a Trajectory<T> {
    type Item = &'a Particle<T>;
    type IntoIter = std::slice::Iter<'a, Particle<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.particles.iter()
    }
}
