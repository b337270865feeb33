use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::error::TrackingError;
use crate::particle::Particle;

/// A trait for types that can carry a phase-space coordinate.
///
/// Implementors are plain floats, dual numbers, or whole ensembles of
/// particles. Map code is written once against this trait and never asks
/// which of those it is holding.
pub trait Coordinate:
    Clone
    + Debug
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Lifts a literal constant into this representation.
    fn splat(value: f64) -> Self;

    /// Element-wise `if self < 0 { negative } else { otherwise }`.
    fn select_negative(&self, negative: Self, otherwise: Self) -> Self;
}

impl Coordinate for f64 {
    fn splat(value: f64) -> Self {
        value
    }

    fn select_negative(&self, negative: Self, otherwise: Self) -> Self {
        if *self < 0.0 {
            negative
        } else {
            otherwise
        }
    }
}

impl Coordinate for f32 {
    fn splat(value: f64) -> Self {
        value as f32
    }

    fn select_negative(&self, negative: Self, otherwise: Self) -> Self {
        if *self < 0.0 {
            negative
        } else {
            otherwise
        }
    }
}

/// The elementary functions a transfer map is allowed to call.
///
/// One binding is resolved per tracking run and handed to every map, so the
/// same formulas evaluate over whatever representation `T` is.
pub trait MathBackend<T>: Send + Sync {
    /// Short identifier used in diagnostics.
    fn name(&self) -> &'static str;

    fn sqrt(&self, x: &T) -> T;
    fn sin(&self, x: &T) -> T;
    fn cos(&self, x: &T) -> T;
    fn sinh(&self, x: &T) -> T;
    fn cosh(&self, x: &T) -> T;
    /// Normalized sinc, `sin(pi x) / (pi x)` with `sinc(0) = 1`.
    fn sinc(&self, x: &T) -> T;
    fn abs(&self, x: &T) -> T;
}

/// A beamline element that can push a particle from its entrance to its exit.
///
/// New element kinds implement this trait; the lattice driver only ever sees
/// `Trackable`.
pub trait Trackable {
    /// Kind name used in diagnostics and structured descriptions.
    fn kind(&self) -> &'static str;

    /// Physical length of the element.
    fn length(&self) -> f64;

    /// Checks the element's configuration before any tracking happens.
    fn validate(&self) -> Result<(), TrackingError> {
        Ok(())
    }

    /// Returns a copy of this element with its length divided by `n`.
    fn shortened(&self, n: usize) -> Self
    where
        Self: Sized;

    /// Maps the incoming particle to the outgoing particle.
    fn advance<T: Coordinate>(&self, math: &dyn MathBackend<T>, p_in: &Particle<T>)
        -> Particle<T>;
}
