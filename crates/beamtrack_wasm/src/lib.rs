use beamtrack_core::elements::{ElementDescription, Lattice};
use beamtrack_core::particle::Particle;
use beamtrack_core::tracking::TrackingSettings;
use beamtrack_core::traits::Trackable;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

mod beamline;

pub use beamline::{Beamline, EnsemblePayload};

fn js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{:#}", err))
}

#[wasm_bindgen]
pub struct WasmBeamline {
    inner: Beamline,
}

#[wasm_bindgen]
impl WasmBeamline {
    /// `lattice` is an array of `{ kind: "Drift" | "Quadrupole", L, ... }`.
    #[wasm_bindgen(constructor)]
    pub fn new(lattice: JsValue) -> Result<WasmBeamline, JsValue> {
        console_error_panic_hook::set_once();

        let lattice: Lattice = from_value(lattice)
            .map_err(|e| JsValue::from_str(&format!("Invalid lattice: {}", e)))?;
        Ok(WasmBeamline {
            inner: Beamline::new(lattice),
        })
    }

    /// Builds from `{ kind, attributes: { L, K1, ... } }` descriptions.
    pub fn from_descriptions(descriptions: JsValue) -> Result<WasmBeamline, JsValue> {
        console_error_panic_hook::set_once();

        let descriptions: Vec<ElementDescription> = from_value(descriptions)
            .map_err(|e| JsValue::from_str(&format!("Invalid lattice description: {}", e)))?;
        let inner = Beamline::from_descriptions(&descriptions).map_err(js_error)?;
        Ok(WasmBeamline { inner })
    }

    pub fn set_subdivisions(&mut self, subdivisions: usize) -> Result<(), JsValue> {
        self.inner
            .set_settings(TrackingSettings { subdivisions })
            .map_err(js_error)
    }

    pub fn element_count(&self) -> usize {
        self.inner.lattice().len()
    }

    pub fn total_length(&self) -> f64 {
        self.inner.lattice().total_length()
    }

    pub fn element_kinds(&self) -> Vec<String> {
        self.inner
            .lattice()
            .iter()
            .map(|e| e.kind().to_string())
            .collect()
    }

    /// Returns the trajectory: the input particle followed by one particle
    /// per element.
    pub fn track(&self, particle: JsValue) -> Result<JsValue, JsValue> {
        let particle: Particle<f64> = from_value(particle)
            .map_err(|e| JsValue::from_str(&format!("Invalid particle: {}", e)))?;
        let trajectory = self.inner.track(&particle).map_err(js_error)?;
        to_value(&trajectory).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn track_ensemble(&self, ensemble: JsValue) -> Result<JsValue, JsValue> {
        let payload: EnsemblePayload = from_value(ensemble)
            .map_err(|e| JsValue::from_str(&format!("Invalid ensemble: {}", e)))?;
        let trajectory = self.inner.track_ensemble(payload).map_err(js_error)?;
        to_value(&trajectory).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// 6x6 transfer matrix about `reference`, row-major.
    pub fn transfer_matrix(&self, reference: JsValue) -> Result<js_sys::Float64Array, JsValue> {
        let reference: Particle<f64> = from_value(reference)
            .map_err(|e| JsValue::from_str(&format!("Invalid particle: {}", e)))?;
        let matrix = self.inner.transfer_matrix(&reference).map_err(js_error)?;
        Ok(js_sys::Float64Array::from(matrix.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    use beamtrack_core::elements::{Drift, Element, Quadrupole};

    fn lattice_value() -> JsValue {
        let lattice = Lattice::new(vec![
            Element::from(Drift::new(1.0)),
            Element::from(Quadrupole::new(0.1, 5.0)),
        ]);
        to_value(&lattice).expect("lattice")
    }

    #[wasm_bindgen_test]
    fn tracks_through_js_lattice() {
        let line = WasmBeamline::new(lattice_value()).expect("beamline");
        assert_eq!(line.element_count(), 2);
        assert_eq!(line.element_kinds(), vec!["Drift", "Quadrupole"]);

        let particle = to_value(&Particle::<f64>::reference(1e9, 0.511e6)).expect("particle");
        let trajectory: Vec<Particle<f64>> =
            from_value(line.track(particle).expect("track")).expect("trajectory");
        assert_eq!(trajectory.len(), 3);
        assert!((trajectory[2].s - 1.1).abs() < 1e-15);
    }

    #[wasm_bindgen_test]
    fn rejects_zero_subdivisions() {
        let mut line = WasmBeamline::new(lattice_value()).expect("beamline");
        let message = line
            .set_subdivisions(0)
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("at least 1"));
    }
}
