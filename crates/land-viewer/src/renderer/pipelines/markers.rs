//! Instanced billboard glyphs: one quad, five per-instance attribute streams.

use glam::{Mat4, Vec3};
use marker_core::{AttributeMask, InstanceStaging};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MarkerUniforms {
    pub view_proj: Mat4,      // 64 B
    pub view: Mat4,           // +64 -> 128
    pub camera_pos: [f32; 3], // +12
    pub global_scale: f32,    // +4  -> 144
}

const _: [(); 144] = [(); core::mem::size_of::<MarkerUniforms>()];

impl MarkerUniforms {
    pub fn new(view_proj: Mat4, view: Mat4, camera_pos: Vec3, global_scale: f32) -> Self {
        Self {
            view_proj,
            view,
            camera_pos: camera_pos.to_array(),
            global_scale,
        }
    }
}

/// Attribute streams in shader-location order (location 0 is the quad).
const STREAMS: [(AttributeMask, wgpu::VertexFormat, &str); 5] = [
    (AttributeMask::POSITION, wgpu::VertexFormat::Float32x3, "Marker Positions"),
    (AttributeMask::COLOR, wgpu::VertexFormat::Float32x3, "Marker Colors"),
    (AttributeMask::SCALE, wgpu::VertexFormat::Float32, "Marker Scales"),
    (AttributeMask::STYLE, wgpu::VertexFormat::Float32, "Marker Styles"),
    (AttributeMask::STATE, wgpu::VertexFormat::Float32, "Marker States"),
];

/// Size of the largest per-instance stream for `max_points` instances.
pub fn largest_stream_bytes(max_points: usize) -> u64 {
    STREAMS
        .iter()
        .map(|(_, format, _)| format.size())
        .max()
        .unwrap_or(0)
        * max_points.max(1) as u64
}

/// GPU half of the point engine. Dropped (and its buffers destroyed) on
/// dispose.
pub struct GpuMarkerMesh {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    quad_vb: wgpu::Buffer,
    instance_buffers: Vec<(AttributeMask, wgpu::Buffer)>,
    instances: u32,
}

impl GpuMarkerMesh {
    pub fn new(
        device: &wgpu::Device,
        color_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
        max_points: usize,
    ) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Marker Uniform Buffer"),
            size: std::mem::size_of::<MarkerUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Marker UBO Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<MarkerUniforms>() as u64),
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Marker Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        // Billboard quad in local UV space [-1, 1].
        let quad_corners: [[f32; 2]; 6] = [
            [-1.0, -1.0],
            [1.0, -1.0],
            [1.0, 1.0],
            [-1.0, -1.0],
            [1.0, 1.0],
            [-1.0, 1.0],
        ];
        let quad_vb = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Marker Quad VB"),
            contents: bytemuck::cast_slice(&quad_corners),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let instance_buffers = STREAMS
            .iter()
            .map(|(attr, format, label)| {
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(*label),
                    size: format.size() * max_points.max(1) as u64,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                (*attr, buffer)
            })
            .collect();

        let instance_attrs: Vec<[wgpu::VertexAttribute; 1]> = STREAMS
            .iter()
            .enumerate()
            .map(|(i, (_, format, _))| {
                [wgpu::VertexAttribute {
                    shader_location: i as u32 + 1,
                    offset: 0,
                    format: *format,
                }]
            })
            .collect();

        let mut vbuf_layouts = vec![wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 2]>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                shader_location: 0,
                offset: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        }];
        vbuf_layouts.extend(STREAMS.iter().zip(&instance_attrs).map(|((_, format, _), attrs)| {
            wgpu::VertexBufferLayout {
                array_stride: format.size(),
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: attrs,
            }
        }));

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("markers.wgsl"),
            source: wgpu::ShaderSource::Wgsl(MARKERS_WGSL.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Marker PipelineLayout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Marker Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &vbuf_layouts,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_fmt,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_fmt,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self {
            pipeline,
            bind_group,
            uniform_buffer,
            quad_vb,
            instance_buffers,
            instances: 0,
        }
    }

    /// Uploads the staging buffers flagged dirty and sets the draw count.
    pub fn write<U: Clone>(&mut self, queue: &wgpu::Queue, staging: &InstanceStaging<U>, dirty: AttributeMask) {
        for (attr, buffer) in &self.instance_buffers {
            if dirty.contains(*attr) {
                let data = staging.attribute_bytes(*attr);
                if !data.is_empty() {
                    queue.write_buffer(buffer, 0, data);
                }
            }
        }
        self.instances = staging.count() as u32;
    }

    pub fn write_uniforms(&self, queue: &wgpu::Queue, uniforms: &MarkerUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    pub fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>) {
        if self.instances == 0 {
            return;
        }
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.bind_group, &[]);
        rpass.set_vertex_buffer(0, self.quad_vb.slice(..));
        for (slot, (_, buffer)) in self.instance_buffers.iter().enumerate() {
            rpass.set_vertex_buffer(slot as u32 + 1, buffer.slice(..));
        }
        rpass.draw(0..6, 0..self.instances);
    }

    /// Frees the GPU memory now rather than at drop.
    pub fn destroy(self) {
        for (_, buffer) in &self.instance_buffers {
            buffer.destroy();
        }
        self.quad_vb.destroy();
        self.uniform_buffer.destroy();
    }
}

pub const MARKERS_WGSL: &str = r#"
struct MarkerUniforms {
    view_proj: mat4x4<f32>,
    view: mat4x4<f32>,
    camera_pos: vec3<f32>,
    global_scale: f32,
};
@group(0) @binding(0) var<uniform> U: MarkerUniforms;

struct VSOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec3<f32>,
    @location(2) @interpolate(flat) style: f32,
    @location(3) @interpolate(flat) state: f32,
}

fn state_factor(state: f32) -> f32 {
    if (state > 2.5) { return 1.4; }
    if (state > 1.5) { return 1.3; }
    if (state > 0.5) { return 1.2; }
    return 1.0;
}

@vertex
fn vs_main(
    @location(0) corner: vec2<f32>,
    @location(1) position: vec3<f32>,
    @location(2) color: vec3<f32>,
    @location(3) scale: f32,
    @location(4) style: f32,
    @location(5) state: f32,
) -> VSOut {
    let view_pos = U.view * vec4<f32>(position, 1.0);
    let dist = length(view_pos.xyz);
    let size = clamp(scale * U.global_scale / (dist * 0.1 + 1.0), 0.5, 4.0) * state_factor(state);

    // Camera-facing: offset along the view basis.
    let right = vec3<f32>(U.view[0].x, U.view[1].x, U.view[2].x);
    let up    = vec3<f32>(U.view[0].y, U.view[1].y, U.view[2].y);
    let world = position + (right * corner.x + up * corner.y) * size;

    var out: VSOut;
    out.clip = U.view_proj * vec4<f32>(world, 1.0);
    out.uv = corner;
    out.color = color;
    out.style = style;
    out.state = state;
    return out;
}

fn band(d: f32, half_width: f32) -> f32 {
    let aa = max(fwidth(d), 1e-4);
    return 1.0 - smoothstep(half_width - aa, half_width + aa, abs(d));
}

fn bar(p: vec2<f32>, half_len: f32, half_width: f32) -> f32 {
    let q = abs(p);
    let aa = max(fwidth(q.y), 1e-4);
    let inside = 1.0 - smoothstep(half_len - aa, half_len + aa, q.x);
    return inside * band(q.y, half_width);
}

fn cross_mask(p: vec2<f32>, half_width: f32) -> f32 {
    return max(bar(p, 0.9, half_width), bar(p.yx, 0.9, half_width));
}

fn glyph(uv: vec2<f32>, style: f32) -> f32 {
    let s = i32(style + 0.5);
    // circle: ring plus center dot
    if (s == 1) {
        let r = length(uv);
        return max(band(r - 0.75, 0.12), band(r, 0.2));
    }
    // X: cross rotated 45 degrees
    if (s == 2) {
        let k = 0.70710678;
        let p = vec2<f32>(uv.x * k - uv.y * k, uv.x * k + uv.y * k);
        return cross_mask(p, 0.1);
    }
    // plus: heavier cross
    if (s == 3) {
        return cross_mask(uv, 0.18);
    }
    // square: ring
    if (s == 4) {
        let q = abs(uv);
        return band(max(q.x, q.y) - 0.72, 0.1);
    }
    if (s == 5) {
        let q = abs(uv);
        return band(q.x + q.y - 0.8, 0.11);
    }
    return cross_mask(uv, 0.08);
}

fn tint(color: vec3<f32>, state: f32) -> vec3<f32> {
    if (state > 2.5) { return mix(color, vec3<f32>(1.0, 0.2, 0.2), 0.5); }
    if (state > 1.5) { return mix(color, vec3<f32>(1.0, 0.9, 0.1), 0.5); }
    if (state > 0.5) { return mix(color, vec3<f32>(1.0, 1.0, 1.0), 0.35); }
    return color;
}

@fragment
fn fs_main(in: VSOut) -> @location(0) vec4<f32> {
    let coverage = glyph(in.uv, in.style);
    if (coverage < 0.1) {
        discard;
    }
    return vec4<f32>(tint(in.color, in.state), 0.9 * coverage);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_strides_match_staging_layout() {
        assert_eq!(STREAMS[0].1.size(), std::mem::size_of::<[f32; 3]>() as u64);
        assert_eq!(STREAMS[1].1.size(), std::mem::size_of::<[f32; 3]>() as u64);
        for (_, format, _) in &STREAMS[2..] {
            assert_eq!(format.size(), std::mem::size_of::<f32>() as u64);
        }
    }

    #[test]
    fn streams_cover_every_attribute_once() {
        let mut all = AttributeMask::NONE;
        for (attr, _, _) in &STREAMS {
            assert!(!all.contains(*attr));
            all |= *attr;
        }
        assert_eq!(all, AttributeMask::ALL);
    }

    #[test]
    fn shader_declares_entry_points() {
        assert!(MARKERS_WGSL.contains("fn vs_main"));
        assert!(MARKERS_WGSL.contains("fn fs_main"));
        assert!(MARKERS_WGSL.contains("discard"));
    }
}
