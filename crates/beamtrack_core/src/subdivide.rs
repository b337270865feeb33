//! Splitting elements into equal-length pieces.

use tracing::debug;

use crate::elements::Lattice;
use crate::error::TrackingError;
use crate::traits::Trackable;

fn check_count(n: usize) -> Result<(), TrackingError> {
    if n == 0 {
        return Err(TrackingError::InvalidSubdivision { value: n });
    }
    Ok(())
}

/// `n` copies of `element`, each `1/n` as long. Other attributes are kept.
pub fn subdivide_element<E: Trackable + Clone>(
    element: &E,
    n: usize,
) -> Result<Lattice<E>, TrackingError> {
    check_count(n)?;
    let short = element.shortened(n);
    Ok(Lattice::new(vec![short; n]))
}

/// Subdivides every element of `lattice` into `n` pieces, keeping order.
pub fn subdivide_lattice<E: Trackable + Clone>(
    lattice: &[E],
    n: usize,
) -> Result<Lattice<E>, TrackingError> {
    check_count(n)?;
    let subdivided: Lattice<E> = lattice
        .iter()
        .flat_map(|element| std::iter::repeat(element.shortened(n)).take(n))
        .collect();
    debug!(
        elements = lattice.len(),
        pieces = subdivided.len(),
        "subdivided lattice"
    );
    Ok(subdivided)
}

impl<E: Trackable + Clone> Lattice<E> {
    pub fn subdivided(&self, n: usize) -> Result<Self, TrackingError> {
        subdivide_lattice(self, n)
    }
}
