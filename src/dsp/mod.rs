//! DSP core: fixed-point numerics, delay memory, LFOs and the machine that
//! runs an assembled program once per sample.
//!
//! Nothing here allocates or logs on the per-sample path.

pub mod delay;
pub mod fixed;
pub mod lfo;
pub mod machine;
#[cfg(feature = "wav")]
pub mod renderer;
