pub mod assembler;
pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod disasm;
pub mod dsp;
pub mod error;
pub mod isa;
pub mod lexer;
pub mod parser;
pub mod program;
pub mod token;

pub use assembler::{assemble, Assembly};
pub use config::{EmulatorConfig, IdleMode};
pub use dsp::machine::{LoadOutcome, Machine, Source, Status};
pub use program::Program;

use serde::Serialize;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the fv1-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: assemble SPN source and return the base64 program, or the
/// diagnostic lines if assembly failed or reported errors.
#[wasm_bindgen]
pub fn assemble_spn(name: &str, source: &str) -> Result<String, JsValue> {
    match assemble(name, source) {
        Ok(asm) if !asm.has_errors() => Ok(asm.program.to_encoded()),
        Ok(asm) => Err(JsValue::from_str(&asm.diagnostics.lines().join("\n"))),
        Err(diagnostics) => Err(JsValue::from_str(&diagnostics.lines().join("\n"))),
    }
}

/// Result of a load as seen from JavaScript.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadReport {
    loaded: bool,
    outcome: Option<LoadOutcome>,
    diagnostics: Vec<String>,
}

/// WASM-exposed wrapper around [`Machine`].
#[wasm_bindgen]
pub struct WasmMachine {
    inner: Machine,
}

#[wasm_bindgen]
impl WasmMachine {
    /// Create a machine; `config_json` may be empty for defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<WasmMachine, JsValue> {
        let config = if config_json.trim().is_empty() {
            EmulatorConfig::default()
        } else {
            EmulatorConfig::from_json(config_json).map_err(|e| JsValue::from_str(&format!("{e}")))?
        };
        Ok(WasmMachine { inner: Machine::with_config(config) })
    }

    #[wasm_bindgen(js_name = loadSpn)]
    pub fn load_spn(&mut self, name: &str, source: &str) -> Result<JsValue, JsValue> {
        let result = self.inner.load_spn(name, source);
        self.report(result)
    }

    #[wasm_bindgen(js_name = loadEncoded)]
    pub fn load_encoded(&mut self, name: &str, encoded: &str) -> Result<JsValue, JsValue> {
        let result = self.inner.load_encoded(name, encoded);
        self.report(result)
    }

    pub fn unload(&mut self) {
        self.inner.unload();
    }

    /// One tick; returns `[left, right]`.
    pub fn run(&mut self, left: f32, right: f32, pot0: f32, pot1: f32, pot2: f32) -> Vec<f32> {
        let (l, r) = self.inner.run(left, right, pot0, pot1, pot2);
        vec![l, r]
    }

    /// Process a block in place.
    #[wasm_bindgen(js_name = processBlock)]
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32], pot0: f32, pot1: f32, pot2: f32) {
        self.inner.process_block(left, right, [pot0, pot1, pot2]);
    }

    /// Base64 of the loaded program, for the host to persist.
    pub fn encoded(&self) -> Option<String> {
        self.inner.program().map(Program::to_encoded)
    }

    pub fn display(&self) -> String {
        self.inner.get_display()
    }

    #[wasm_bindgen(js_name = dumpState)]
    pub fn dump_state(&self, sep: &str) -> String {
        self.inner.dump_state(sep)
    }

    pub fn diagnostics(&self) -> Vec<String> {
        self.inner.diagnostics().lines()
    }
}

impl WasmMachine {
    fn report(&self, result: Result<LoadOutcome, error::LoadError>) -> Result<JsValue, JsValue> {
        let report = LoadReport {
            loaded: result.is_ok(),
            outcome: result.ok(),
            diagnostics: self.inner.diagnostics().lines(),
        };
        serde_wasm_bindgen::to_value(&report).map_err(|e| JsValue::from_str(&format!("{e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_assemble_spn_returns_encoded_program() {
        let encoded = assemble_spn("t", "rdax adcl, 1.0\nwrax dacl, 0\n").unwrap();
        assert_eq!(encoded, "QAAChAAAAsY=");
    }

    #[test]
    fn test_wasm_machine_runs() {
        let mut m = WasmMachine::new("").unwrap();
        assert!(m.encoded().is_none());
        assert_eq!(m.run(0.5, 0.5, 0.0, 0.0, 0.0), vec![0.0, 0.0]);
        m.inner.load_spn("t", "rdax adcl, 1.0\nwrax dacl, 0\n").unwrap();
        assert_eq!(m.run(0.5, 0.5, 0.0, 0.0, 0.0), vec![0.5, 0.0]);
        assert_eq!(m.encoded().as_deref(), Some("QAAChAAAAsY="));
        assert!(m.diagnostics().is_empty());
    }
}
