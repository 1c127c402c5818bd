//! wgpu compute-shader scaler

use super::{GpuError, GpuScaler};
use crate::config::Interpolation;
use image::RgbImage;
use std::borrow::Cow;
use tracing::{error, info};

const WORKGROUP: u32 = 8;

const SHADER: &str = r#"
struct Params {
    src_w: u32,
    src_h: u32,
    dst_w: u32,
    dst_h: u32,
    mode: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> src: array<u32>;
@group(0) @binding(2) var<storage, read_write> dst: array<u32>;

fn fetch(x: i32, y: i32) -> vec3<f32> {
    let cx = clamp(x, 0, i32(params.src_w) - 1);
    let cy = clamp(y, 0, i32(params.src_h) - 1);
    let p = src[u32(cy) * params.src_w + u32(cx)];
    return vec3<f32>(f32(p & 0xffu), f32((p >> 8u) & 0xffu), f32((p >> 16u) & 0xffu));
}

// Catmull-Rom, a = -0.5
fn cubic(x: f32) -> f32 {
    let ax = abs(x);
    if ax < 1.0 {
        return 1.5 * ax * ax * ax - 2.5 * ax * ax + 1.0;
    }
    if ax < 2.0 {
        return -0.5 * ax * ax * ax + 2.5 * ax * ax - 4.0 * ax + 2.0;
    }
    return 0.0;
}

fn sinc(x: f32) -> f32 {
    if abs(x) < 1e-5 {
        return 1.0;
    }
    let px = 3.14159265 * x;
    return sin(px) / px;
}

fn lanczos4(x: f32) -> f32 {
    if abs(x) >= 4.0 {
        return 0.0;
    }
    return sinc(x) * sinc(x / 4.0);
}

fn weight(d: f32) -> f32 {
    if params.mode == 2u {
        return cubic(d);
    }
    return lanczos4(d);
}

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if id.x >= params.dst_w || id.y >= params.dst_h {
        return;
    }
    let scale_x = f32(params.src_w) / f32(params.dst_w);
    let scale_y = f32(params.src_h) / f32(params.dst_h);
    let sx = (f32(id.x) + 0.5) * scale_x - 0.5;
    let sy = (f32(id.y) + 0.5) * scale_y - 0.5;

    var color = vec3<f32>(0.0);
    if params.mode == 0u {
        color = fetch(i32(floor((f32(id.x) + 0.5) * scale_x)), i32(floor((f32(id.y) + 0.5) * scale_y)));
    } else if params.mode == 1u {
        let x0 = floor(sx);
        let y0 = floor(sy);
        let fx = sx - x0;
        let fy = sy - y0;
        let ix = i32(x0);
        let iy = i32(y0);
        let top = mix(fetch(ix, iy), fetch(ix + 1, iy), fx);
        let bottom = mix(fetch(ix, iy + 1), fetch(ix + 1, iy + 1), fx);
        color = mix(top, bottom, fy);
    } else {
        let radius = select(4, 2, params.mode == 2u);
        let x0 = i32(floor(sx));
        let y0 = i32(floor(sy));
        var total = 0.0;
        for (var j = 1 - radius; j <= radius; j = j + 1) {
            let wy = weight(sy - f32(y0 + j));
            for (var i = 1 - radius; i <= radius; i = i + 1) {
                let w = wy * weight(sx - f32(x0 + i));
                color = color + fetch(x0 + i, y0 + j) * w;
                total = total + w;
            }
        }
        if total != 0.0 {
            color = color / total;
        }
    }

    let c = vec3<u32>(clamp(round(color), vec3<f32>(0.0), vec3<f32>(255.0)));
    dst[id.y * params.dst_w + id.x] = c.x | (c.y << 8u) | (c.z << 16u);
}
"#;

fn mode_index(interpolation: Interpolation) -> u32 {
    match interpolation {
        Interpolation::Nearest => 0,
        Interpolation::Linear => 1,
        Interpolation::Cubic => 2,
        Interpolation::Lanczos => 3,
    }
}

pub struct WgpuScaler {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    src: wgpu::Buffer,
    dst: wgpu::Buffer,
    readback: wgpu::Buffer,
    src_size: (u32, u32),
    dst_size: u32,
    staging: Vec<u8>,
}

impl WgpuScaler {
    pub fn new(
        src_size: (u32, u32),
        dst_size: u32,
        interpolation: Interpolation,
    ) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::Unavailable)?;

        let adapter_info = adapter.get_info();
        if adapter_info.device_type == wgpu::DeviceType::Cpu {
            return Err(GpuError::Unavailable);
        }

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("aimlens-scaler"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
            },
            None,
        ))
        .map_err(|e| GpuError::Device(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|e| {
            error!("Uncaptured GPU error: {}", e);
        }));

        info!(
            "GPU scaler on {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("aimlens-resize"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SHADER)),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("aimlens-resize"),
            layout: None,
            module: &module,
            entry_point: "main",
        });

        let src_bytes = src_size.0 as u64 * src_size.1 as u64 * 4;
        let dst_bytes = dst_size as u64 * dst_size as u64 * 4;

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("params"),
            size: 32,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let src = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("src"),
            size: src_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let dst = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("dst"),
            size: dst_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: dst_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let words = [
            src_size.0,
            src_size.1,
            dst_size,
            dst_size,
            mode_index(interpolation),
            0,
            0,
            0,
        ];
        let param_bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        queue.write_buffer(&params, 0, &param_bytes);

        let layout = pipeline.get_bind_group_layout(0);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("aimlens-resize"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: src.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: dst.as_entire_binding(),
                },
            ],
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group,
            src,
            dst,
            readback,
            src_size,
            dst_size,
            staging: Vec::with_capacity(src_bytes as usize),
        })
    }
}

impl GpuScaler for WgpuScaler {
    fn resize(&mut self, image: &RgbImage) -> Result<RgbImage, GpuError> {
        if image.dimensions() != self.src_size {
            return Err(GpuError::SizeMismatch {
                expected: self.src_size,
                actual: image.dimensions(),
            });
        }

        self.staging.clear();
        self.staging
            .extend(image.as_raw().chunks_exact(3).flat_map(|px| [px[0], px[1], px[2], 0]));
        self.queue.write_buffer(&self.src, 0, &self.staging);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            let groups = self.dst_size.div_ceil(WORKGROUP);
            pass.dispatch_workgroups(groups, groups, 1);
        }
        encoder.copy_buffer_to_buffer(&self.dst, 0, &self.readback, 0, self.readback.size());
        self.queue.submit(Some(encoder.finish()));

        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuError::Device(e.to_string()));
        }

        let slice = self.readback.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(GpuError::Readback(e.to_string())),
            Err(_) => return Err(GpuError::Readback("map callback dropped".to_string())),
        }

        let rgb: Vec<u8> = {
            let view = slice.get_mapped_range();
            view.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]).collect()
        };
        self.readback.unmap();

        RgbImage::from_raw(self.dst_size, self.dst_size, rgb)
            .ok_or_else(|| GpuError::Readback("readback size mismatch".to_string()))
    }
}
