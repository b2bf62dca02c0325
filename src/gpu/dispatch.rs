// SPDX-License-Identifier: AGPL-3.0-only

//! Bind groups, dispatch, and readback in one submission.

use super::GpuF64;
use crate::error::EngineError;

/// Split a workgroup count into `(x, y, 1)` when it exceeds 65535.
///
/// Shaders linearize with `wg.x + wg.y * num_workgroups.x`.
#[must_use]
pub fn split_workgroups(total: u32) -> (u32, u32, u32) {
    if total <= 65535 {
        (total, 1, 1)
    } else {
        let y = total.div_ceil(65535);
        let x = total.div_ceil(y);
        (x, y, 1)
    }
}

impl GpuF64 {
    /// Bind `buffers` at bindings 0, 1, 2, ... of group 0.
    #[must_use]
    pub fn create_bind_group(
        &self,
        pipeline: &wgpu::ComputePipeline,
        buffers: &[&wgpu::Buffer],
    ) -> wgpu::BindGroup {
        let layout = pipeline.get_bind_group_layout(0);
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buf)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buf.as_entire_binding(),
            })
            .collect();
        self.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pair_bind_group"),
            layout: &layout,
            entries: &entries,
        })
    }

    /// Dispatch, copy `output_count` f64 to staging, submit once, read back.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GpuCompute`] if readback fails.
    pub fn dispatch_and_read(
        &self,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        workgroups: u32,
        output_buffer: &wgpu::Buffer,
        output_count: usize,
    ) -> Result<Vec<f64>, EngineError> {
        let bytes = (output_count * 8) as u64;
        let staging = self.create_staging_buffer(output_count * 8, "pair_staging");

        let mut encoder = self
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pair_step"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("pair_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            let (wx, wy, wz) = split_workgroups(workgroups);
            pass.dispatch_workgroups(wx, wy, wz);
        }
        encoder.copy_buffer_to_buffer(output_buffer, 0, &staging, 0, bytes);
        self.queue().submit(std::iter::once(encoder.finish()));

        self.read_staging_f64(&staging)
    }
}
