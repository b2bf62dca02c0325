// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for pair-engine initialization and device execution.
//!
//! Callers pattern-match on the failure mode (unsupported device, missing
//! f64, allocation) instead of parsing strings. [`EngineError::status`]
//! keeps the integer status convention host codes expect: `0` is success,
//! anything else is fatal for the device and the caller must fall back.

use thiserror::Error;

/// Errors arising from engine setup, device creation, or kernel dispatch.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller-provided tables, flags, or geometry are inconsistent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The device lacks a capability the engine needs.
    #[error("unsupported device: {0}")]
    Unsupported(String),

    /// No compatible GPU adapter was found by wgpu.
    #[error("No GPU adapter found")]
    NoAdapter,

    /// GPU lacks the `SHADER_F64` feature required for f64 compute.
    #[error("GPU does not support SHADER_F64, cannot run f64 pair kernels")]
    NoShaderF64,

    /// Device creation or shader compilation failed.
    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    /// Dispatch or readback failed after the device was created.
    #[error("GPU compute failed: {0}")]
    GpuCompute(String),

    /// A device buffer could not be allocated.
    #[error("out of device memory: requested {requested} bytes, limit {limit}")]
    OutOfMemory { requested: u64, limit: u64 },

    /// A compute call was made on a cleared or never-initialized engine.
    #[error("engine is not initialized")]
    NotInitialized,

    /// Engine configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Integer status code for host codes that poll a return value.
    ///
    /// Never returns `0`; success is represented by `Ok`.
    #[must_use]
    pub const fn status(&self) -> i32 {
        match self {
            Self::NoAdapter | Self::Unsupported(_) => -1,
            Self::NoShaderF64 => -2,
            Self::OutOfMemory { .. } => -3,
            Self::DeviceCreation(_) | Self::GpuCompute(_) => -4,
            Self::InvalidInput(_) | Self::Config(_) => -5,
            Self::NotInitialized => -6,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}
