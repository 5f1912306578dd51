use crate::{
    camera::{Camera, CameraController, PointerAction},
    config::{Cli, ViewerConfig},
    data::{demo_scene, load_layouts, HandleKind, LandScene, MarkerRef},
    engine::PointRenderingEngine,
    renderer::Renderer,
    ui::{self, HudStats, QualityAction},
};
use anyhow::Result;
use glam::Vec2;
use marker_core::{
    classify, Marker, MarkerKind, MarkerState, MemoryProbe, OptimizationStats, PerformanceMonitor, Ray, Raycaster,
    ScreenSpaceOptimizer, ViewportSize,
};
use std::sync::Arc;
use std::time::Instant;
use winit::{event::WindowEvent, window::Window};

/// Longest frame fed to telemetry; stalls (window drags, breakpoints) would
/// otherwise dominate the rolling averages.
const MAX_FRAME_SECONDS: f32 = 0.25;

pub struct App {
    pub renderer: Renderer,
    pub camera: Camera,
    pub camera_controller: CameraController,
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,

    pub scene: LandScene,
    pub engine: PointRenderingEngine<MarkerRef>,
    pub optimizer: ScreenSpaceOptimizer,
    pub monitor: PerformanceMonitor,

    hovered: Option<MarkerRef>,
    selected: Option<MarkerRef>,
    last_frame: Instant,
    last_stats: OptimizationStats,
}

impl App {
    pub async fn new(window: Arc<Window>, cli: &Cli, config: ViewerConfig) -> Result<Self> {
        let mut monitor = PerformanceMonitor::with_probe(config.monitor.clone(), memory_probe(&config))?;
        let now = Instant::now();
        if let Some(level) = cli.quality {
            monitor.manually_set_level(level, now);
        }

        let renderer = Renderer::new(window.clone(), monitor.settings().resolution_scale).await?;
        monitor.set_gpu(classify(Some(&renderer.gfx.gpu_descriptor())));

        let (color_fmt, depth_fmt) = renderer.scene_formats();
        let engine = PointRenderingEngine::new(&renderer.gfx.device, color_fmt, depth_fmt, &config.engine)?;
        let optimizer = ScreenSpaceOptimizer::new(config.optimizer.clone())?;

        let scene = load_scene(cli);
        let size = renderer.gfx.size;
        let camera = Camera::new(
            scene.center(),
            (scene.radius() * 1.5).clamp(20.0, 1500.0),
            size.width.max(1) as f32 / size.height.max(1) as f32,
        );

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(egui_ctx.clone(), egui_ctx.viewport_id(), &*window, None, None);

        Ok(Self {
            renderer,
            camera,
            camera_controller: CameraController::new(),
            egui_ctx,
            egui_state,
            scene,
            engine,
            optimizer,
            monitor,
            hovered: None,
            selected: None,
            last_frame: now,
            last_stats: OptimizationStats::default(),
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.renderer.resize(new_size);
            self.camera.set_aspect(new_size.width, new_size.height);
        }
    }

    fn viewport(&self) -> ViewportSize {
        let size = self.renderer.gfx.size;
        ViewportSize::new(size.width, size.height)
    }

    /// Nearest marker under the cursor, from last frame's instances.
    fn pick(&self, x: f64, y: f64) -> Option<MarkerRef> {
        let ray = Ray::from_viewport(Vec2::new(x as f32, y as f32), self.viewport(), &self.camera.camera_view());
        self.engine
            .get_intersections(&Raycaster::new(ray))
            .into_iter()
            .find_map(|hit| hit.user_data)
    }

    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(window, event);
        if response.consumed {
            return true;
        }

        match self.camera_controller.handle_event(event, &mut self.camera) {
            PointerAction::Moved(x, y) => self.hovered = self.pick(x, y),
            PointerAction::Click(x, y) => {
                let picked = self.pick(x, y);
                self.selected = toggle_selection(self.selected, picked);
                if let Some(r) = self.selected {
                    log::info!("Selected {}", describe(&self.scene, &r));
                }
            }
            PointerAction::None => {}
        }

        if let WindowEvent::Resized(physical_size) = event {
            self.resize(*physical_size);
        }

        false
    }

    /// Telemetry, quality, optimizer and instance staging for one frame.
    fn update(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        if dt > 0.0 {
            self.monitor.record_frame(dt.min(MAX_FRAME_SECONDS), now);
        }

        self.monitor.update(now);
        let scale = self.monitor.settings().resolution_scale;
        if scale != self.renderer.targets.scale {
            self.renderer.set_resolution_scale(scale);
        }

        // The optimizer's thin/enhance mode follows its own pass cost, not the
        // frame time recorded above; it only thins once optimization alone
        // overruns the frame budget.
        let markers = decorate_markers(&self.scene, self.hovered, self.selected);
        let optimized = self
            .optimizer
            .optimize_points(&markers, &self.camera.camera_view(), self.viewport());
        self.last_stats = self.optimizer.last_stats();

        let drawn = self.engine.update_points(&optimized);
        self.engine.clear_user_data();
        for (slot, p) in optimized.iter().take(drawn).enumerate() {
            if let Some(r) = self.scene.refs.get(p.source_index) {
                self.engine.set_point_user_data(slot, *r);
            }
        }
    }

    fn apply_quality_action(&mut self, action: QualityAction) {
        match action {
            QualityAction::SetLevel(level) => {
                self.monitor.manually_set_level(level, Instant::now());
            }
            QualityAction::EnableAuto => self.monitor.enable_auto_adjust(),
        }
    }

    /// Releases GPU resources ahead of window teardown.
    pub fn shutdown(&mut self) {
        self.engine.dispose();
    }

    pub fn render(&mut self, window: &Window) -> Result<(), wgpu::SurfaceError> {
        self.update(Instant::now());

        let frame = self.renderer.gfx.surface.get_current_texture()?;
        let swap_view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.engine.upload(&self.renderer.gfx.queue, &self.camera.camera_view());
        self.renderer
            .render(&swap_view, &self.engine, &self.camera, self.monitor.settings());

        let egui_input = self.egui_state.take_egui_input(window);
        self.egui_ctx.begin_frame(egui_input);

        let stats = HudStats {
            metrics: self.monitor.metrics(),
            gpu_label: self
                .monitor
                .gpu()
                .map(|g| format!("{} ({})", g.renderer, g.tier))
                .unwrap_or_else(|| "unresolved".to_string()),
            score: self.monitor.last_score(),
            level: self.monitor.current_level(),
            manual: self.monitor.is_manual(),
            pending: self.monitor.pending().map(|p| p.level),
            markers_in: self.scene.markers.len(),
            optimizer: self.last_stats,
            drawn: self.engine.count(),
            capacity: self.engine.max_points(),
            selected: self.selected.map(|r| describe(&self.scene, &r)),
        };
        ui::draw_hud(&self.egui_ctx, &stats);
        let action = ui::draw_quality_panel(&self.egui_ctx, stats.level, stats.manual);

        let egui_output = self.egui_ctx.end_frame();
        self.egui_state
            .handle_platform_output(window, egui_output.platform_output);
        let shapes = self
            .egui_ctx
            .tessellate(egui_output.shapes, self.egui_ctx.pixels_per_point());

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.renderer.gfx.config.width, self.renderer.gfx.config.height],
            pixels_per_point: self.egui_ctx.pixels_per_point(),
        };

        let mut encoder = self
            .renderer
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("UI Encoder"),
            });

        for (id, delta) in &egui_output.textures_delta.set {
            self.renderer
                .egui_renderer
                .update_texture(&self.renderer.gfx.device, &self.renderer.gfx.queue, *id, delta);
        }

        self.renderer.egui_renderer.update_buffers(
            &self.renderer.gfx.device,
            &self.renderer.gfx.queue,
            &mut encoder,
            &shapes,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("EGUI Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &swap_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.renderer
                .egui_renderer
                .render(&mut render_pass, &shapes, &screen_descriptor);
        }

        for id in &egui_output.textures_delta.free {
            self.renderer.egui_renderer.free_texture(id);
        }

        self.renderer.gfx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        if let Some(action) = action {
            self.apply_quality_action(action);
        }

        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn memory_probe(config: &ViewerConfig) -> Box<dyn MemoryProbe> {
    Box::new(marker_core::telemetry::ProcessMemoryProbe::with_budget_mb(
        config.monitor.memory_budget_mb,
    ))
}

#[cfg(not(target_os = "linux"))]
fn memory_probe(_config: &ViewerConfig) -> Box<dyn MemoryProbe> {
    Box::new(marker_core::NoMemoryProbe)
}

fn load_scene(cli: &Cli) -> LandScene {
    let layouts = load_layouts(&cli.layouts);
    let scene = LandScene::from_layouts(&layouts);
    if scene.is_empty() {
        log::info!("No layout markers; showing the demo block.");
        return demo_scene();
    }
    log::info!(
        "Scene: {} subdivisions, {} markers",
        scene.names.len(),
        scene.markers.len()
    );
    scene
}

/// Clicking the selected marker (or empty space) clears the selection.
fn toggle_selection(current: Option<MarkerRef>, picked: Option<MarkerRef>) -> Option<MarkerRef> {
    match (current, picked) {
        (Some(c), Some(p)) if c == p => None,
        (_, picked) => picked,
    }
}

/// Scene markers with interaction state applied. Selection wins over hover.
pub fn decorate_markers(scene: &LandScene, hovered: Option<MarkerRef>, selected: Option<MarkerRef>) -> Vec<Marker> {
    scene
        .markers
        .iter()
        .zip(&scene.refs)
        .map(|(m, r)| {
            if selected == Some(*r) {
                m.with_state(MarkerState::Selected).with_kind(MarkerKind::Selected)
            } else if hovered == Some(*r) {
                m.with_state(MarkerState::Hovered).with_kind(MarkerKind::Hovered)
            } else {
                *m
            }
        })
        .collect()
}

fn describe(scene: &LandScene, r: &MarkerRef) -> String {
    let what = match r.kind {
        HandleKind::Corner => "corner",
        HandleKind::EdgeMidpoint => "edge",
        HandleKind::Survey => "survey point",
    };
    match r.subdivision.and_then(|i| scene.names.get(i)) {
        Some(name) => format!("{name} {what} {}", r.vertex + 1),
        None => format!("{what} {}", r.vertex + 1),
    }
}
