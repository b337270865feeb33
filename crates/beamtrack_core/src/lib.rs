pub mod autodiff;
pub mod backend;
pub mod elements;
pub mod ensemble;
pub mod error;
pub mod particle;
pub mod subdivide;
pub mod tracking;
/// The `beamtrack_core` crate tracks charged particles through beamline
/// elements. Every transfer map is generic over the coordinate
/// representation, so the same code runs on plain floats (`f64`, `f32`),
/// forward-mode Dual numbers, and whole particle ensembles.
///
/// Key components:
/// - **Traits**: `Coordinate` (representation arithmetic), `MathBackend` (the seven elementary functions), `Trackable` (element maps).
/// - **Backend**: bindings per representation and the `BackendRegistry` that resolves them.
/// - **Elements**: exact `Drift` and sliced `Quadrupole` maps, structured element descriptions, `Lattice`.
/// - **Tracking**: the lattice driver producing a `Trajectory`, plus element subdivision.
/// - **Autodiff**: Dual numbers and the lattice transfer matrix.
pub mod traits;

pub use autodiff::{transfer_matrix, Dual};
pub use backend::{resolve_backend, BackendRegistry, DualMath, EnsembleMath, FloatMath};
pub use elements::{Drift, Element, ElementDescription, Lattice, Quadrupole};
pub use ensemble::Ensemble;
pub use error::TrackingError;
pub use particle::{Particle, Trajectory};
pub use subdivide::{subdivide_element, subdivide_lattice};
pub use tracking::{track_lattice, track_lattice_with, Tracker, TrackingSettings};
pub use traits::{Coordinate, MathBackend, Trackable};
