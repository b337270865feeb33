//! Beamline elements and lattices.
//!
//! This module contains the element kinds understood by the tracker, the
//! structured description an external lattice reader hands over, and the
//! ordered `Lattice` container.

pub mod drift;
pub mod quadrupole;

pub use drift::{sqrt_one, track_drift, Drift};
pub use quadrupole::{
    low_energy_z_correction, offset_particle_entrance, offset_particle_exit, track_quadrupole,
    QuadMatrix, Quadrupole, LOW_ENERGY_THRESHOLD, MACHINE_EPSILON,
};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TrackingError;
use crate::particle::Particle;
use crate::traits::{Coordinate, MathBackend, Trackable};

/// Every element kind this crate can track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Element {
    Drift(Drift),
    Quadrupole(Quadrupole),
}

impl Trackable for Element {
    fn kind(&self) -> &'static str {
        match self {
            Element::Drift(e) => e.kind(),
            Element::Quadrupole(e) => e.kind(),
        }
    }

    fn length(&self) -> f64 {
        match self {
            Element::Drift(e) => e.length(),
            Element::Quadrupole(e) => e.length(),
        }
    }

    fn validate(&self) -> Result<(), TrackingError> {
        match self {
            Element::Drift(e) => e.validate(),
            Element::Quadrupole(e) => e.validate(),
        }
    }

    fn shortened(&self, n: usize) -> Self {
        match self {
            Element::Drift(e) => Element::Drift(e.shortened(n)),
            Element::Quadrupole(e) => Element::Quadrupole(e.shortened(n)),
        }
    }

    fn advance<T: Coordinate>(
        &self,
        math: &dyn MathBackend<T>,
        p_in: &Particle<T>,
    ) -> Particle<T> {
        match self {
            Element::Drift(e) => e.advance(math, p_in),
            Element::Quadrupole(e) => e.advance(math, p_in),
        }
    }
}

impl From<Drift> for Element {
    fn from(value: Drift) -> Self {
        Element::Drift(value)
    }
}

impl From<Quadrupole> for Element {
    fn from(value: Quadrupole) -> Self {
        Element::Quadrupole(value)
    }
}

/// An element as produced by an external lattice reader: a kind name plus
/// named numeric attributes (`L`, `K1`, `NUM_STEPS`, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementDescription {
    pub kind: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

impl ElementDescription {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, attribute: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(attribute.into(), value);
        self
    }

    fn required(&self, kind: &'static str, attribute: &'static str) -> Result<f64, TrackingError> {
        self.attributes
            .get(attribute)
            .copied()
            .ok_or(TrackingError::MissingAttribute { kind, attribute })
    }

    fn reject_unknown(&self, allowed: &[&str]) -> Result<(), TrackingError> {
        match self
            .attributes
            .keys()
            .find(|name| !allowed.contains(&name.as_str()))
        {
            Some(name) => Err(TrackingError::UnknownAttribute {
                kind: self.kind.clone(),
                attribute: name.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn slice_count(value: f64) -> Result<usize, TrackingError> {
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
        return Err(TrackingError::InvalidSliceCount { value });
    }
    Ok(value as usize)
}

impl TryFrom<&ElementDescription> for Element {
    type Error = TrackingError;

    fn try_from(desc: &ElementDescription) -> Result<Self, Self::Error> {
        let attr = |name: &str, default: f64| desc.attributes.get(name).copied().unwrap_or(default);
        match desc.kind.as_str() {
            "Drift" => {
                desc.reject_unknown(&["L"])?;
                Ok(Element::Drift(Drift::new(desc.required("Drift", "L")?)))
            }
            "Quadrupole" => {
                desc.reject_unknown(&["L", "K1", "NUM_STEPS", "X_OFFSET", "Y_OFFSET", "TILT"])?;
                let quad = Quadrupole::new(desc.required("Quadrupole", "L")?, attr("K1", 0.0))
                    .with_num_steps(slice_count(attr("NUM_STEPS", 1.0))?)
                    .with_offsets(attr("X_OFFSET", 0.0), attr("Y_OFFSET", 0.0))
                    .with_tilt(attr("TILT", 0.0));
                Ok(Element::Quadrupole(quad))
            }
            other => Err(TrackingError::UnknownElementKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// An ordered sequence of elements. Order is the traversal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lattice<E = Element> {
    elements: Vec<E>,
}

impl<E> Lattice<E> {
    pub fn new(elements: Vec<E>) -> Self {
        Self { elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn as_slice(&self) -> &[E] {
        &self.elements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.elements.iter()
    }

    pub fn push(&mut self, element: E) {
        self.elements.push(element);
    }
}

impl<E: Trackable> Lattice<E> {
    /// Sum of element lengths.
    pub fn total_length(&self) -> f64 {
        self.elements.iter().map(Trackable::length).sum()
    }
}

impl Lattice<Element> {
    /// Converts a described lattice, stopping at the first element that
    /// cannot be built.
    pub fn from_descriptions(descriptions: &[ElementDescription]) -> Result<Self, TrackingError> {
        descriptions
            .iter()
            .map(Element::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

impl<E> Default for Lattice<E> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<E> std::ops::Deref for Lattice<E> {
    type Target = [E];

    fn deref(&self) -> &[E] {
        &self.elements
    }
}

impl<E> FromIterator<E> for Lattice<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<E> From<Vec<E>> for Lattice<E> {
    fn from(elements: Vec<E>) -> Self {
        Self::new(elements)
    }
}

impl<'a, E> IntoIterator for &'a Lattice<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
