// SPDX-License-Identifier: AGPL-3.0-only

//! [`PairDevice`] on a wgpu f64 adapter.
//!
//! Both kernel variants are compiled up front for one launch geometry
//! (`BLOCK_SIZE`, `LANES`); the coefficient tables stay resident between
//! steps while per-step atom data is uploaded fresh each call.

use std::collections::HashMap;
use std::sync::Arc;

use super::GpuF64;
use crate::coeff::CoeffTables;
use crate::config::EngineConfig;
use crate::device::{DeviceCaps, PairDevice};
use crate::error::EngineError;
use crate::kernel::{AtomAnswer, EnergyFlags, StepInput};
use crate::launch::{KernelVariant, LaunchPlan};
use crate::neighbor::NeighborList;
use crate::shaders::{self, ANS_STRIDE, MAX_GPU_BLOCK, SHARED_TYPES};

/// Uniform block matching `Params` in the shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    inum: u32,
    lj_types: u32,
    eflag: u32,
    vflag: u32,
}

struct Resident {
    tables: Arc<CoeffTables>,
    coeffs: wgpu::Buffer,
    scalars: wgpu::Buffer,
}

/// GPU execution target for the pair kernel.
pub struct GpuPairDevice {
    gpu: GpuF64,
    name: String,
    block_size: usize,
    threads_per_atom: usize,
    fast: wgpu::ComputePipeline,
    general: wgpu::ComputePipeline,
    resident: Option<Resident>,
}

impl GpuPairDevice {
    /// Open the selected adapter and compile both variants for the launch
    /// geometry in `config`.
    ///
    /// # Errors
    ///
    /// Adapter/device errors from [`GpuF64::new`],
    /// [`EngineError::Unsupported`] for a block wider than the device
    /// supports, or [`EngineError::DeviceCreation`] if a shader fails to
    /// compile.
    pub async fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let gpu = GpuF64::new().await?;
        let max_block = max_block_size(gpu.limits());
        if config.block_size > max_block {
            return Err(EngineError::Unsupported(format!(
                "block size {} exceeds GPU maximum {max_block}",
                config.block_size
            )));
        }

        let constants = HashMap::from([
            ("BLOCK_SIZE".to_string(), config.block_size as f64),
            ("LANES".to_string(), config.threads_per_atom as f64),
        ]);
        let fast = gpu
            .build_pipeline(
                &shaders::pair_shader(KernelVariant::Fast),
                "pair_fast_f64",
                &constants,
            )
            .await?;
        let general = gpu
            .build_pipeline(
                &shaders::pair_shader(KernelVariant::General),
                "pair_general_f64",
                &constants,
            )
            .await?;

        Ok(Self {
            name: format!("GPU {}", gpu.adapter_name),
            gpu,
            block_size: config.block_size,
            threads_per_atom: config.threads_per_atom,
            fast,
            general,
            resident: None,
        })
    }
}

fn max_block_size(limits: &wgpu::Limits) -> usize {
    (limits.max_compute_workgroup_size_x as usize)
        .min(limits.max_compute_invocations_per_workgroup as usize)
        .min(MAX_GPU_BLOCK)
}

impl PairDevice for GpuPairDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> DeviceCaps {
        DeviceCaps {
            max_shared_types: SHARED_TYPES,
            max_block_size: max_block_size(self.gpu.limits()),
            max_table_bytes: u64::from(self.gpu.limits().max_storage_buffer_binding_size),
        }
    }

    fn load_tables(&mut self, tables: Arc<CoeffTables>) -> Result<(), EngineError> {
        let limit = u64::from(self.gpu.limits().max_storage_buffer_binding_size);
        let requested = tables.device_bytes() as u64;
        if requested > limit {
            return Err(EngineError::OutOfMemory { requested, limit });
        }
        let coeffs = self.gpu.create_f64_buffer(&tables.to_flat(), "pair_coeffs");
        let scalars = self
            .gpu
            .create_f64_buffer(&shaders::scalars(&tables), "pair_scalars");
        log::debug!("{}: uploaded {requested} bytes of pair tables", self.name);
        self.resident = Some(Resident {
            tables,
            coeffs,
            scalars,
        });
        Ok(())
    }

    fn release(&mut self) {
        self.resident = None;
    }

    fn run(
        &mut self,
        input: &StepInput<'_>,
        list: &NeighborList,
        flags: EnergyFlags,
        plan: &LaunchPlan,
    ) -> Result<Vec<AtomAnswer>, EngineError> {
        let resident = self.resident.as_ref().ok_or(EngineError::NotInitialized)?;
        if plan.block_size != self.block_size || plan.threads_per_atom != self.threads_per_atom {
            return Err(EngineError::InvalidInput(format!(
                "launch {}x{} does not match compiled {}x{}",
                plan.block_size, plan.threads_per_atom, self.block_size, self.threads_per_atom
            )));
        }
        if plan.inum == 0 {
            return Ok(Vec::new());
        }

        let gpu = &self.gpu;
        let params = Params {
            inum: plan.inum as u32,
            lj_types: resident.tables.lj_types() as u32,
            eflag: u32::from(flags.energy),
            vflag: u32::from(flags.virial),
        };
        let params_buf = gpu.create_uniform_buffer(bytemuck::bytes_of(&params), "pair_params");

        let pos_flat: Vec<f64> = input.positions.iter().flatten().copied().collect();
        let pos_buf = gpu.create_f64_buffer(&pos_flat, "pair_pos");
        let q_buf = gpu.create_f64_buffer(input.charges, "pair_charge");
        let type_buf = gpu.create_u32_buffer(input.types, "pair_types");

        let info: Vec<u32> = (0..plan.inum)
            .flat_map(|ii| [list.ilist()[ii], list.offsets()[ii], list.counts()[ii]])
            .collect();
        let info_buf = gpu.create_u32_buffer(&info, "pair_nbor_info");
        let nbor_buf = gpu.create_u32_buffer(list.entries(), "pair_nbor");

        let out_count = plan.inum * ANS_STRIDE;
        let out_buf = gpu.create_f64_output_buffer(out_count, "pair_answers");

        let pipeline = match plan.variant {
            KernelVariant::Fast => &self.fast,
            KernelVariant::General => &self.general,
        };
        let bind_group = gpu.create_bind_group(
            pipeline,
            &[
                &params_buf,
                &resident.scalars,
                &resident.coeffs,
                &pos_buf,
                &q_buf,
                &type_buf,
                &info_buf,
                &nbor_buf,
                &out_buf,
            ],
        );
        let raw = gpu.dispatch_and_read(pipeline, &bind_group, plan.grid as u32, &out_buf, out_count)?;

        Ok(raw
            .chunks_exact(ANS_STRIDE)
            .map(|a| AtomAnswer {
                force: [a[0], a[1], a[2]],
                e_vdwl: a[3],
                e_coul: a[4],
                virial: [a[5], a[6], a[7], a[8], a[9], a[10]],
            })
            .collect())
    }
}
