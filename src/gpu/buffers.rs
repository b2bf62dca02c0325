// SPDX-License-Identifier: AGPL-3.0-only

//! Storage buffer creation and f64 readback.

use wgpu::util::DeviceExt;

use super::GpuF64;
use crate::error::EngineError;

impl GpuF64 {
    /// Read-only storage buffer from f64 data.
    ///
    /// Empty input gets one zero element; zero-sized bindings are invalid.
    #[must_use]
    pub fn create_f64_buffer(&self, data: &[f64], label: &str) -> wgpu::Buffer {
        let padded = [0.0_f64];
        let data = if data.is_empty() { &padded[..] } else { data };
        self.device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Read-only storage buffer from u32 data, padded like
    /// [`Self::create_f64_buffer`].
    #[must_use]
    pub fn create_u32_buffer(&self, data: &[u32], label: &str) -> wgpu::Buffer {
        let padded = [0_u32];
        let data = if data.is_empty() { &padded[..] } else { data };
        self.device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Uniform buffer from raw bytes.
    #[must_use]
    pub fn create_uniform_buffer(&self, data: &[u8], label: &str) -> wgpu::Buffer {
        self.device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    /// Writable storage buffer for `count` f64 outputs (at least one).
    #[must_use]
    pub fn create_f64_output_buffer(&self, count: usize, label: &str) -> wgpu::Buffer {
        self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (count.max(1) * 8) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Mappable buffer for copying results back to the host.
    #[must_use]
    pub fn create_staging_buffer(&self, size: usize, label: &str) -> wgpu::Buffer {
        self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Map a staging buffer after submit and read it as f64.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GpuCompute`] if mapping fails.
    pub fn read_staging_f64(&self, staging: &wgpu::Buffer) -> Result<Vec<f64>, EngineError> {
        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device().poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| EngineError::GpuCompute("map callback channel closed".into()))?
            .map_err(|e| EngineError::GpuCompute(format!("buffer mapping: {e}")))?;

        let data = slice.get_mapped_range();
        let result = mapped_bytes_to_f64(&data);
        drop(data);
        staging.unmap();
        Ok(result)
    }
}

/// Convert mapped bytes to f64, falling back to per-chunk decoding when
/// the mapping is misaligned.
#[must_use]
pub fn mapped_bytes_to_f64(data: &[u8]) -> Vec<f64> {
    bytemuck::try_cast_slice(data).map_or_else(
        |_| {
            data.chunks_exact(8)
                .map(|chunk| {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(chunk);
                    f64::from_le_bytes(b)
                })
                .collect()
        },
        <[f64]>::to_vec,
    )
}
