//! Math backend bindings and their registry.
//!
//! A binding supplies the seven elementary functions for one coordinate
//! representation. The registry maps a representation's `TypeId` to its
//! binding; a representation with no entry is an error, never a silent
//! fallback to plain floats.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use num_traits::Float;
use tracing::debug;

use crate::autodiff::Dual;
use crate::ensemble::Ensemble;
use crate::error::TrackingError;
use crate::traits::MathBackend;

/// Binding for any `num_traits::Float` scalar.
pub struct FloatMath<F> {
    _marker: PhantomData<fn() -> F>,
}

impl<F> FloatMath<F> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<F> Default for FloatMath<F> {
    fn default() -> Self {
        Self::new()
    }
}

fn float_sinc<F: Float>(x: F) -> F {
    if x.is_zero() {
        return F::one();
    }
    let pi = F::from(std::f64::consts::PI).unwrap_or_else(F::nan);
    let arg = pi * x;
    arg.sin() / arg
}

impl<F: Float> MathBackend<F> for FloatMath<F> {
    fn name(&self) -> &'static str {
        "float"
    }
    fn sqrt(&self, x: &F) -> F {
        x.sqrt()
    }
    fn sin(&self, x: &F) -> F {
        x.sin()
    }
    fn cos(&self, x: &F) -> F {
        x.cos()
    }
    fn sinh(&self, x: &F) -> F {
        x.sinh()
    }
    fn cosh(&self, x: &F) -> F {
        x.cosh()
    }
    fn sinc(&self, x: &F) -> F {
        float_sinc(*x)
    }
    fn abs(&self, x: &F) -> F {
        x.abs()
    }
}

/// Binding for forward-mode dual numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DualMath;

impl MathBackend<Dual> for DualMath {
    fn name(&self) -> &'static str {
        "dual"
    }
    fn sqrt(&self, x: &Dual) -> Dual {
        x.sqrt()
    }
    fn sin(&self, x: &Dual) -> Dual {
        x.sin()
    }
    fn cos(&self, x: &Dual) -> Dual {
        x.cos()
    }
    fn sinh(&self, x: &Dual) -> Dual {
        x.sinh()
    }
    fn cosh(&self, x: &Dual) -> Dual {
        x.cosh()
    }
    fn sinc(&self, x: &Dual) -> Dual {
        x.sinc()
    }
    fn abs(&self, x: &Dual) -> Dual {
        x.abs()
    }
}

/// Binding for particle ensembles; applies the `f64` functions per element.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleMath;

impl MathBackend<Ensemble> for EnsembleMath {
    fn name(&self) -> &'static str {
        "ensemble"
    }
    fn sqrt(&self, x: &Ensemble) -> Ensemble {
        x.map(f64::sqrt)
    }
    fn sin(&self, x: &Ensemble) -> Ensemble {
        x.map(f64::sin)
    }
    fn cos(&self, x: &Ensemble) -> Ensemble {
        x.map(f64::cos)
    }
    fn sinh(&self, x: &Ensemble) -> Ensemble {
        x.map(f64::sinh)
    }
    fn cosh(&self, x: &Ensemble) -> Ensemble {
        x.map(f64::cosh)
    }
    fn sinc(&self, x: &Ensemble) -> Ensemble {
        x.map(float_sinc)
    }
    fn abs(&self, x: &Ensemble) -> Ensemble {
        x.map(f64::abs)
    }
}

/// Resolves a math binding from the concrete coordinate type.
pub struct BackendRegistry {
    bindings: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl BackendRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// `f64`, `f32`, [`Dual`] and [`Ensemble`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register::<f64>(Arc::new(FloatMath::<f64>::new()));
        registry.register::<f32>(Arc::new(FloatMath::<f32>::new()));
        registry.register::<Dual>(Arc::new(DualMath));
        registry.register::<Ensemble>(Arc::new(EnsembleMath));
        registry
    }

    /// Registers (or replaces) the binding for representation `T`.
    pub fn register<T: 'static>(&mut self, backend: Arc<dyn MathBackend<T>>) {
        self.bindings.insert(TypeId::of::<T>(), Box::new(backend));
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    pub fn resolve<T: 'static>(&self) -> Result<Arc<dyn MathBackend<T>>, TrackingError> {
        let backend = self
            .bindings
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn MathBackend<T>>>())
            .cloned()
            .ok_or(TrackingError::UnsupportedBackend {
                representation: type_name::<T>(),
            })?;
        debug!(
            representation = type_name::<T>(),
            backend = backend.name(),
            "resolved math backend"
        );
        Ok(backend)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Resolves `T` against the default registry.
pub fn resolve_backend<T: 'static>() -> Result<Arc<dyn MathBackend<T>>, TrackingError> {
    BackendRegistry::with_defaults().resolve::<T>()
}
