// Survey grid on the ground plane (y = 0), following the camera target.

use glam::{Mat4, Vec2, Vec3};
use wgpu::util::DeviceExt;

/// Minor line spacing in metres; major lines every 10 minor cells.
pub const MINOR_STEP_M: f32 = 5.0;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GridUniforms {
    pub view_proj: Mat4,       // 64 B
    pub camera_pos: [f32; 3],  // +12
    /// Half-extent (metres) from center to edge.
    pub plane_extent_m: f32,   // +4  -> 80
    /// Plane center on XZ, snapped to the major step.
    pub center: [f32; 2],      // +8
    /// 1.0 draws minor lines, 0.0 majors only.
    pub minor_lines: f32,      // +4
    /// 1.0 fades the plane with distance, 0.0 draws it flat.
    pub effects: f32,          // +4  -> 96
}

const _: [(); 96] = [(); core::mem::size_of::<GridUniforms>()];

impl GridUniforms {
    pub fn new(
        view_proj: Mat4,
        camera_pos: Vec3,
        focus: Vec3,
        extent: f32,
        minor_lines: bool,
        effects: bool,
    ) -> Self {
        // Snapping keeps the lines fixed in world space while the plane follows.
        let major = MINOR_STEP_M * 10.0;
        let center = (Vec2::new(focus.x, focus.z) / major).floor() * major;
        Self {
            view_proj,
            camera_pos: camera_pos.to_array(),
            plane_extent_m: extent,
            center: center.to_array(),
            minor_lines: if minor_lines { 1.0 } else { 0.0 },
            effects: if effects { 1.0 } else { 0.0 },
        }
    }
}

pub struct GroundGridPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    quad_vb: wgpu::Buffer,
}

impl GroundGridPipeline {
    pub fn new(device: &wgpu::Device, color_fmt: wgpu::TextureFormat, depth_fmt: wgpu::TextureFormat) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Grid Uniform Buffer"),
            size: std::mem::size_of::<GridUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Grid BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Grid Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let corners: [[f32; 2]; 6] = [
            [-1.0, -1.0], [1.0, -1.0], [1.0, 1.0],
            [-1.0, -1.0], [1.0, 1.0], [-1.0, 1.0],
        ];
        let quad_vb = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Grid Quad VB"),
            contents: bytemuck::cast_slice(&corners),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Grid WGSL"),
            source: wgpu::ShaderSource::Wgsl(GRID_WGSL.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Grid Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Ground Grid Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        shader_location: 0,
                        format: wgpu::VertexFormat::Float32x2,
                        offset: 0,
                    }],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
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
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_fmt,
                depth_write_enabled: false, // markers must stay visible
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self {
            pipeline,
            bind_group,
            uniform_buffer,
            quad_vb,
        }
    }

    pub fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>, queue: &wgpu::Queue, uniforms: &GridUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.bind_group, &[]);
        rpass.set_vertex_buffer(0, self.quad_vb.slice(..));
        rpass.draw(0..6, 0..1);
    }
}

pub const GRID_WGSL: &str = r#"
struct GridUniforms {
    view_proj: mat4x4<f32>,
    camera_pos: vec3<f32>,
    plane_extent_m: f32,
    center: vec2<f32>,
    minor_lines: f32,
    effects: f32,
};
@group(0) @binding(0) var<uniform> U: GridUniforms;

struct VSOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_xz: vec2<f32>,
}

@vertex
fn vs_main(@location(0) corner: vec2<f32>) -> VSOut {
    var out: VSOut;
    let xz = U.center + corner * U.plane_extent_m;
    out.clip = U.view_proj * vec4<f32>(xz.x, 0.0, xz.y, 1.0);
    out.world_xz = xz;
    return out;
}

// Anti-aliased line mask
fn line(coord: f32, step: f32) -> f32 {
    let t   = coord / step;
    let aaw = min(fwidth(t) * 1.5, 0.5);
    let f   = fract(t);
    let d   = min(f, 1.0 - f);
    return 1.0 - smoothstep(0.0, aaw, d);
}

@fragment
fn fs_main(in: VSOut) -> @location(0) vec4<f32> {
    let p = in.world_xz;
    let minor = max(line(p.x, 5.0), line(p.y, 5.0)) * U.minor_lines;
    let major = max(line(p.x, 50.0), line(p.y, 50.0));
    let grid  = max(minor * 0.35, major * 0.8);

    // Fade with ground distance so the plane edge never shows.
    let d = distance(vec3<f32>(p.x, 0.0, p.y), U.camera_pos);
    let fade = select(1.0, 1.0 - smoothstep(U.plane_extent_m * 0.4, U.plane_extent_m * 0.9, d), U.effects > 0.5);

    let color = vec3<f32>(0.55, 0.62, 0.58);
    return vec4<f32>(color, grid * fade * 0.5);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_snaps_to_major_lines() {
        let u = GridUniforms::new(Mat4::IDENTITY, Vec3::ZERO, Vec3::new(73.0, 4.0, -12.0), 1000.0, true, true);
        assert_eq!(u.center, [50.0, -50.0]);
        assert_eq!(u.minor_lines, 1.0);
    }

    #[test]
    fn minor_lines_flag() {
        let u = GridUniforms::new(Mat4::IDENTITY, Vec3::ZERO, Vec3::ZERO, 500.0, false, true);
        assert_eq!(u.minor_lines, 0.0);
        assert_eq!(u.plane_extent_m, 500.0);
    }

    #[test]
    fn effects_flag_controls_fade() {
        let on = GridUniforms::new(Mat4::IDENTITY, Vec3::ZERO, Vec3::ZERO, 500.0, true, true);
        let off = GridUniforms::new(Mat4::IDENTITY, Vec3::ZERO, Vec3::ZERO, 500.0, true, false);
        assert_eq!(on.effects, 1.0);
        assert_eq!(off.effects, 0.0);
        assert!(GRID_WGSL.contains("U.effects > 0.5"));
    }
}
