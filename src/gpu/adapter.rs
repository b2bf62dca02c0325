// SPDX-License-Identifier: AGPL-3.0-only

//! GPU adapter discovery and selection.
//!
//! The adapter is chosen by `DSF_GPU_ADAPTER` (index, name substring, or
//! `auto`) or auto-detected as the first discrete adapter with
//! `SHADER_F64`. `DSF_WGPU_BACKEND` restricts the backend.

use crate::error::EngineError;

/// Environment variable selecting the adapter.
pub const ADAPTER_ENV: &str = "DSF_GPU_ADAPTER";

/// Environment variable selecting the wgpu backend.
pub const BACKEND_ENV: &str = "DSF_WGPU_BACKEND";

/// Summary of a discovered GPU adapter.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub index: usize,
    pub name: String,
    /// Driver name (e.g. `"NVIDIA"`, `"NVK"`, `"radv"`).
    pub driver: String,
    pub has_f64: bool,
    pub device_type: wgpu::DeviceType,
}

impl std::fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let f64_tag = if self.has_f64 { "f64" } else { "f32" };
        let kind = match self.device_type {
            wgpu::DeviceType::DiscreteGpu => "discrete",
            wgpu::DeviceType::IntegratedGpu => "integrated",
            wgpu::DeviceType::VirtualGpu => "virtual",
            wgpu::DeviceType::Cpu => "cpu",
            wgpu::DeviceType::Other => "other",
        };
        write!(
            f,
            "[{}] {} ({}, {}, {})",
            self.index, self.name, self.driver, kind, f64_tag
        )
    }
}

fn backends_from(value: Option<&str>) -> wgpu::Backends {
    match value {
        Some("vulkan") => wgpu::Backends::VULKAN,
        Some("metal") => wgpu::Backends::METAL,
        Some("dx12") => wgpu::Backends::DX12,
        _ => wgpu::Backends::all(),
    }
}

/// Create a wgpu instance honoring [`BACKEND_ENV`].
#[must_use]
pub fn create_instance() -> wgpu::Instance {
    let backend = std::env::var(BACKEND_ENV).ok();
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: backends_from(backend.as_deref()),
        ..Default::default()
    })
}

/// Enumerate all adapters visible to the configured backends.
#[must_use]
pub fn enumerate_adapters() -> Vec<AdapterInfo> {
    create_instance()
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .enumerate()
        .map(|(index, adapter)| {
            let info = adapter.get_info();
            AdapterInfo {
                index,
                name: info.name,
                driver: info.driver,
                has_f64: adapter.features().contains(wgpu::Features::SHADER_F64),
                device_type: info.device_type,
            }
        })
        .collect()
}

/// Pick an adapter per [`ADAPTER_ENV`].
///
/// # Errors
///
/// Returns [`EngineError::NoAdapter`] if nothing suitable exists, or
/// [`EngineError::DeviceCreation`] if the selector matches nothing.
pub fn select_adapter() -> Result<wgpu::Adapter, EngineError> {
    let selector = std::env::var(ADAPTER_ENV)
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    let adapters = create_instance().enumerate_adapters(wgpu::Backends::all());
    if adapters.is_empty() {
        return Err(EngineError::NoAdapter);
    }

    if selector.is_empty() || selector == "auto" {
        auto_select(adapters)
    } else if let Ok(idx) = selector.parse::<usize>() {
        adapters
            .into_iter()
            .nth(idx)
            .ok_or_else(|| EngineError::DeviceCreation(format!("no adapter at index {idx}")))
    } else {
        adapters
            .into_iter()
            .find(|a| a.get_info().name.to_ascii_lowercase().contains(&selector))
            .ok_or_else(|| EngineError::DeviceCreation(format!("no adapter matching '{selector}'")))
    }
}

fn auto_select(adapters: Vec<wgpu::Adapter>) -> Result<wgpu::Adapter, EngineError> {
    let mut chosen = None;
    let mut fallback = None;
    for a in adapters {
        if !a.features().contains(wgpu::Features::SHADER_F64) {
            continue;
        }
        if a.get_info().device_type == wgpu::DeviceType::DiscreteGpu && chosen.is_none() {
            chosen = Some(a);
        } else if fallback.is_none() {
            fallback = Some(a);
        }
    }
    chosen.or(fallback).ok_or(EngineError::NoShaderF64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names() {
        assert_eq!(backends_from(Some("vulkan")), wgpu::Backends::VULKAN);
        assert_eq!(backends_from(Some("metal")), wgpu::Backends::METAL);
        assert_eq!(backends_from(None), wgpu::Backends::all());
        assert_eq!(backends_from(Some("opengl")), wgpu::Backends::all());
    }

    #[test]
    fn adapter_info_display() {
        let info = AdapterInfo {
            index: 1,
            name: "Test GPU".into(),
            driver: "radv".into(),
            has_f64: true,
            device_type: wgpu::DeviceType::DiscreteGpu,
        };
        assert_eq!(info.to_string(), "[1] Test GPU (radv, discrete, f64)");
    }
}
