// SPDX-License-Identifier: AGPL-3.0-only

//! wgpu `SHADER_F64` backend for the pair kernel (feature `gpu`).
//!
//! ## Adapter selection
//!
//! | `DSF_GPU_ADAPTER` | Behavior |
//! |-------------------|----------|
//! | *(unset)*, `auto` | first discrete adapter with `SHADER_F64`, else any with it |
//! | `0`, `1`, … | adapter by enumeration index |
//! | substring | case-insensitive name match (e.g. `"4070"`) |
//!
//! ## Module structure
//!
//! - `adapter`: discovery and selection
//! - `buffers`: storage buffers and readback
//! - `dispatch`: bind groups and single-submission dispatch
//! - `pair`: [`GpuPairDevice`], the [`crate::device::PairDevice`] impl

mod adapter;
mod buffers;
mod dispatch;
mod pair;

pub use adapter::{enumerate_adapters, AdapterInfo, ADAPTER_ENV, BACKEND_ENV};
pub use buffers::mapped_bytes_to_f64;
pub use dispatch::split_workgroups;
pub use pair::GpuPairDevice;

use std::collections::HashMap;

use crate::error::EngineError;

/// wgpu device and queue with `SHADER_F64` enabled.
#[must_use]
pub struct GpuF64 {
    pub adapter_name: String,
    limits: wgpu::Limits,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuF64 {
    /// Select an adapter and create a device with `SHADER_F64`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NoAdapter`] if wgpu finds no adapter
    /// - [`EngineError::NoShaderF64`] if the adapter lacks f64 shaders
    /// - [`EngineError::DeviceCreation`] if `request_device` fails
    pub async fn new() -> Result<Self, EngineError> {
        let selected = adapter::select_adapter()?;
        let info = selected.get_info();
        if !selected.features().contains(wgpu::Features::SHADER_F64) {
            return Err(EngineError::NoShaderF64);
        }

        let adapter_limits = selected.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_buffer_size: adapter_limits.max_buffer_size,
            ..wgpu::Limits::default()
        };

        let (device, queue) = selected
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("pair engine device"),
                    required_features: wgpu::Features::SHADER_F64,
                    required_limits: required_limits.clone(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| EngineError::DeviceCreation(e.to_string()))?;

        log::info!("GPU: {} ({:?}, {})", info.name, info.device_type, info.driver);
        Ok(Self {
            adapter_name: info.name,
            limits: required_limits,
            device,
            queue,
        })
    }

    #[must_use]
    pub const fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub const fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    #[must_use]
    pub const fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    /// Compile `wgsl` and build its `main` pipeline with override constants.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DeviceCreation`] on a validation error.
    pub async fn build_pipeline(
        &self,
        wgsl: &str,
        label: &str,
        constants: &HashMap<String, f64>,
    ) -> Result<wgpu::ComputePipeline, EngineError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &module,
                entry_point: "main",
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants,
                    ..Default::default()
                },
                cache: None,
            });
        match self.device.pop_error_scope().await {
            Some(e) => Err(EngineError::DeviceCreation(format!("{label}: {e}"))),
            None => Ok(pipeline),
        }
    }
}
