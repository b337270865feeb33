//! The lattice driver: pushes a particle through every element in order
//! and records the state after each one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::backend::BackendRegistry;
use crate::error::TrackingError;
use crate::particle::{Particle, Trajectory};
use crate::subdivide::subdivide_lattice;
use crate::traits::{Coordinate, MathBackend, Trackable};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingSettings {
    /// Each element is split into this many equal pieces before tracking.
    pub subdivisions: usize,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self { subdivisions: 1 }
    }
}

/// Checks every element up front so a bad lattice fails before any
/// particle is moved.
pub fn validate_lattice<E: Trackable>(lattice: &[E]) -> Result<(), TrackingError> {
    for element in lattice {
        element.validate()?;
    }
    Ok(())
}

/// Tracks `p_in` through `lattice` with an already resolved backend.
///
/// The returned trajectory has `lattice.len() + 1` entries; entry 0 is
/// `p_in` itself.
pub fn track_lattice_with<T: Coordinate, E: Trackable>(
    math: &dyn MathBackend<T>,
    p_in: &Particle<T>,
    lattice: &[E],
) -> Result<Trajectory<T>, TrackingError> {
    validate_lattice(lattice)?;

    let mut trajectory = Trajectory::with_capacity(p_in.clone(), lattice.len());
    let mut current = p_in.clone();
    for (index, element) in lattice.iter().enumerate() {
        current = element.advance(math, &current);
        trace!(
            index,
            kind = element.kind(),
            length = element.length(),
            s = ?current.s,
            "advanced through element"
        );
        trajectory.push(current.clone());
    }
    Ok(trajectory)
}

/// Resolves the backend for `T` from the default registry and tracks.
pub fn track_lattice<T: Coordinate, E: Trackable + Clone>(
    p_in: &Particle<T>,
    lattice: &[E],
) -> Result<Trajectory<T>, TrackingError> {
    Tracker::new(&BackendRegistry::with_defaults())?.track(p_in, lattice)
}

/// A backend resolved once and reused for every lattice it tracks.
pub struct Tracker<T> {
    math: Arc<dyn MathBackend<T>>,
    settings: TrackingSettings,
}

impl<T: Coordinate> Tracker<T> {
    pub fn new(registry: &BackendRegistry) -> Result<Self, TrackingError> {
        Self::with_settings(registry, TrackingSettings::default())
    }

    pub fn with_settings(
        registry: &BackendRegistry,
        settings: TrackingSettings,
    ) -> Result<Self, TrackingError> {
        if settings.subdivisions == 0 {
            return Err(TrackingError::InvalidSubdivision {
                value: settings.subdivisions,
            });
        }
        Ok(Self {
            math: registry.resolve::<T>()?,
            settings,
        })
    }

    pub fn settings(&self) -> TrackingSettings {
        self.settings
    }

    pub fn backend(&self) -> &dyn MathBackend<T> {
        self.math.as_ref()
    }

    /// Tracks through `lattice`, subdividing it first if the settings ask.
    pub fn track<E: Trackable + Clone>(
        &self,
        p_in: &Particle<T>,
        lattice: &[E],
    ) -> Result<Trajectory<T>, TrackingError> {
        debug!(
            elements = lattice.len(),
            subdivisions = self.settings.subdivisions,
            backend = self.math.name(),
            "tracking lattice"
        );
        if self.settings.subdivisions > 1 {
            let pieces = subdivide_lattice(lattice, self.settings.subdivisions)?;
            track_lattice_with(self.backend(), p_in, &pieces)
        } else {
            track_lattice_with(self.backend(), p_in, lattice)
        }
    }
}
