//! Error types for the wave solver
//!
//! Every error is terminal for a run: setup errors, numerical divergence and
//! communication failures all abort the whole process group.

use thiserror::Error;

/// Errors raised by the Fourier transform layer
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("No transform plan for nr = {nr} (plans built up to {max_nr})")]
    NoPlan { nr: usize, max_nr: usize },
    #[error("Transform batch shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("FFT of {nr} samples failed: {reason}")]
    Fft { nr: usize, reason: String },
}

/// Errors raised by the communication service
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommError {
    #[error("Process group aborted (observed on rank {rank})")]
    Aborted { rank: usize },
    #[error("Rank {peer} is not part of a group of {size}")]
    InvalidPeer { peer: usize, size: usize },
    #[error("Message from rank {peer} has {actual} values, expected {expected}")]
    BufferSize {
        peer: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Channel to rank {peer} disconnected")]
    Disconnected { peer: usize },
}

/// Solver errors
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Malformed mesh data: {0}")]
    MalformedMesh(String),
    #[error("Incompatible solid-fluid pairing at point {tag}: solid nr = {solid_nr}, fluid nr = {fluid_nr}")]
    IncompatibleCoupling {
        tag: usize,
        solid_nr: usize,
        fluid_nr: usize,
    },
    #[error("Unsupported material in element {element}: {reason}")]
    UnsupportedMaterial { element: usize, reason: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Simulation diverged at step {step} (t = {time:.6e} s){}", .location.as_ref().map(|l| format!(", {l}")).unwrap_or_default())]
    Diverged {
        step: usize,
        time: f64,
        location: Option<String>,
    },
    #[error("Communication failure: {0}")]
    Comm(#[from] CommError),
    #[error("Transform failure: {0}")]
    Transform(#[from] TransformError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SolverError>;
