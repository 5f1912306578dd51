//! The rendering orchestrator. Owns the GPU context, the scene targets and
//! the fixed pipelines; the marker mesh belongs to the point engine.

pub mod context;
pub mod pipelines;
pub mod targets;

use self::{
    context::GfxContext,
    pipelines::{
        ground_grid::{GridUniforms, GroundGridPipeline},
        present::PresentPass,
    },
    targets::{Targets, COLOR_FMT, DEPTH_FMT},
};
use crate::{camera::Camera, engine::PointRenderingEngine};
use marker_core::QualitySettings;
use std::sync::Arc;
use winit::window::Window;

const CLEAR: wgpu::Color = wgpu::Color {
    r: 0.045,
    g: 0.055,
    b: 0.05,
    a: 1.0,
};

/// Owns all rendering-related state.
pub struct Renderer {
    pub gfx: GfxContext,
    pub targets: Targets,
    pub grid: GroundGridPipeline,
    pub present: PresentPass,
    present_bind: wgpu::BindGroup,
    pub egui_renderer: egui_wgpu::Renderer,
}

impl Renderer {
    pub async fn new(window: Arc<Window>, resolution_scale: f32) -> anyhow::Result<Self> {
        let gfx = GfxContext::new(window).await?;

        let targets = Targets::new(&gfx.device, gfx.size, resolution_scale);
        let grid = GroundGridPipeline::new(&gfx.device, COLOR_FMT, DEPTH_FMT);
        let present = PresentPass::new(&gfx.device, gfx.config.format);
        let present_bind = present.bind(&gfx.device, &targets.color, targets.scale);
        let egui_renderer = egui_wgpu::Renderer::new(&gfx.device, gfx.config.format, None, 1);

        Ok(Self {
            gfx,
            targets,
            grid,
            present,
            present_bind,
            egui_renderer,
        })
    }

    /// Formats the marker pipeline must target.
    pub fn scene_formats(&self) -> (wgpu::TextureFormat, wgpu::TextureFormat) {
        (COLOR_FMT, DEPTH_FMT)
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.gfx.resize(new_size);
            self.targets.resize(&self.gfx.device, new_size, self.targets.scale);
            self.rebind_scene();
        }
    }

    /// Applies a committed quality level's render-target scale.
    pub fn set_resolution_scale(&mut self, scale: f32) {
        self.targets.resize(&self.gfx.device, self.gfx.size, scale);
        self.rebind_scene();
    }

    fn rebind_scene(&mut self) {
        self.present_bind = self
            .present
            .bind(&self.gfx.device, &self.targets.color, self.targets.scale);
    }

    pub fn render<U: Clone>(
        &mut self,
        swap_view: &wgpu::TextureView,
        engine: &PointRenderingEngine<U>,
        camera: &Camera,
        settings: &QualitySettings,
    ) {
        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let grid_uniforms = GridUniforms::new(
            camera.proj() * camera.view(),
            camera.position(),
            camera.target,
            (camera.radius * 4.0).clamp(200.0, 4000.0),
            settings.grid_minor_lines,
            settings.effects,
        );

        // Pass 1: scene (grid + markers) at the scaled resolution
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            // Grid first, so it sits behind the markers.
            if settings.grid {
                self.grid.draw(&mut pass, &self.gfx.queue, &grid_uniforms);
            }
            engine.draw(&mut pass);
        }

        // Pass 2: upscale to the swapchain
        self.present.draw(&mut encoder, swap_view, &self.present_bind);

        self.gfx.queue.submit(std::iter::once(encoder.finish()));
    }
}
