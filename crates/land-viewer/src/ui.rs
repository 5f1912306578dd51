//! Stateless egui helpers for the HUD and the quality panel.

use egui::Context;
use marker_core::{FrameMetrics, MemoryPressure, OptimizationStats, QualityLevel, Trend};

/// Everything the HUD shows, gathered once per frame.
#[derive(Debug, Clone)]
pub struct HudStats {
    pub metrics: FrameMetrics,
    pub gpu_label: String,
    pub score: f32,
    pub level: QualityLevel,
    pub manual: bool,
    pub pending: Option<QualityLevel>,
    pub markers_in: usize,
    pub optimizer: OptimizationStats,
    pub drawn: usize,
    pub capacity: usize,
    pub selected: Option<String>,
}

/// What the user asked for in the quality panel this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityAction {
    SetLevel(QualityLevel),
    EnableAuto,
}

fn trend_label(trend: Trend) -> &'static str {
    match trend {
        Trend::Improving => "improving",
        Trend::Stable => "stable",
        Trend::Degrading => "degrading",
        Trend::Unknown => "-",
    }
}

fn pressure_label(p: MemoryPressure) -> &'static str {
    match p {
        MemoryPressure::Low => "low",
        MemoryPressure::Medium => "medium",
        MemoryPressure::High => "high",
    }
}

pub fn draw_hud(ctx: &Context, stats: &HudStats) {
    let m = &stats.metrics;

    egui::Area::new("perf".into())
        .anchor(egui::Align2::LEFT_TOP, egui::vec2(12.0, 12.0))
        .show(ctx, |ui| {
            ui.label(format!(
                "FPS {:.0} | avg60 {:.1} | avg300 {:.1} | {}",
                m.fps.current,
                m.fps.rolling60,
                m.fps.rolling300,
                trend_label(m.trend)
            ));
            ui.label(format!(
                "Frame {:.2} ms | p95 {:.2} ms | consistency {:.2}",
                m.frame_time.average_ms, m.frame_time.p95_ms, m.frame_time.consistency
            ));
            let used = m
                .memory
                .used_mb
                .map(|mb| format!("{mb:.0} MB"))
                .unwrap_or_else(|| "n/a".to_string());
            ui.label(format!(
                "Memory {} | {:+.1} MB/min | pressure {}",
                used,
                m.memory.growth_mb_per_min,
                pressure_label(m.memory.pressure)
            ));
        });

    egui::Area::new("quality".into())
        .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-12.0, 12.0))
        .show(ctx, |ui| {
            ui.label(format!("GPU {}", stats.gpu_label));
            let mode = if stats.manual { "manual" } else { "auto" };
            ui.label(format!("Score {:.0} | {} ({})", stats.score, stats.level, mode));
            if let Some(next) = stats.pending {
                ui.label(format!("Pending -> {next}"));
            }
        });

    egui::Area::new("markers".into())
        .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(12.0, -12.0))
        .show(ctx, |ui| {
            let o = &stats.optimizer;
            ui.label(format!(
                "Markers {} -> {} drawn ({} cap) | {:.2} ms",
                stats.markers_in, stats.drawn, stats.capacity, o.elapsed_ms
            ));
            ui.label(format!(
                "culled dist {} / frustum {} | density {} | small {} | thinned {} | enhanced {}",
                o.distance_culled, o.frustum_culled, o.density_skipped, o.too_small, o.thinned, o.enhanced
            ));
            if let Some(sel) = &stats.selected {
                ui.label(format!("Selected: {sel}"));
            }
        });
}

/// Manual override controls. Returns the action to apply, if any.
pub fn draw_quality_panel(ctx: &Context, current: QualityLevel, manual: bool) -> Option<QualityAction> {
    let mut action = None;
    egui::Window::new("Quality")
        .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-12.0, -12.0))
        .resizable(false)
        .collapsible(true)
        .show(ctx, |ui| {
            let mut chosen = current;
            egui::ComboBox::from_label("Level")
                .selected_text(current.as_str())
                .show_ui(ui, |ui| {
                    for level in QualityLevel::ALL {
                        ui.selectable_value(&mut chosen, level, level.as_str());
                    }
                });
            if chosen != current {
                action = Some(QualityAction::SetLevel(chosen));
            }

            ui.add_enabled_ui(manual, |ui| {
                if ui.button("Auto adjust").clicked() {
                    action = Some(QualityAction::EnableAuto);
                }
            });
        });
    action
}

#[cfg(test)]
mod tests {
    use super::*;
    use marker_core::FrameTelemetry;

    fn stats() -> HudStats {
        HudStats {
            metrics: FrameTelemetry::default().metrics(),
            gpu_label: "high-end".to_string(),
            score: 72.0,
            level: QualityLevel::Balanced,
            manual: false,
            pending: Some(QualityLevel::Full),
            markers_in: 100,
            optimizer: OptimizationStats::default(),
            drawn: 40,
            capacity: 10_000,
            selected: Some("Lot A1 corner 2".to_string()),
        }
    }

    #[test]
    fn panels_render_without_input() {
        let ctx = Context::default();
        let mut action = Some(QualityAction::EnableAuto);
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            draw_hud(ctx, &stats());
            action = draw_quality_panel(ctx, QualityLevel::Balanced, false);
        });
        assert_eq!(action, None);
    }

    #[test]
    fn labels() {
        assert_eq!(trend_label(Trend::Unknown), "-");
        assert_eq!(pressure_label(MemoryPressure::High), "high");
    }
}
