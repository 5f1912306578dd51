//! Land layouts on disk and the marker set derived from them.

use anyhow::{Context, Result};
use glam::Vec3;
use marker_core::{Marker, MarkerKind, MarkerStyle, Rgb};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Height of marker handles above the ground plane.
pub const MARKER_LIFT: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Layout {
    pub name: String,
    #[serde(default)]
    pub subdivisions: Vec<Subdivision>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subdivision {
    pub name: String,
    #[serde(default)]
    pub color: Rgb,
    /// Polygon vertices on the ground plane as `[x, z]` in metres.
    pub corners: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Corner,
    EdgeMidpoint,
    Survey,
}

/// What a marker stands for; stored as instance user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerRef {
    /// Global subdivision index; `None` for survey points.
    pub subdivision: Option<usize>,
    /// Corner index, or the index of the edge's first corner for midpoints.
    pub vertex: usize,
    pub kind: HandleKind,
}

/// Markers built once from the loaded layouts, with parallel identity refs.
#[derive(Debug, Clone, Default)]
pub struct LandScene {
    pub names: Vec<String>,
    pub markers: Vec<Marker>,
    pub refs: Vec<MarkerRef>,
    pub min: Vec3,
    pub max: Vec3,
}

impl LandScene {
    pub fn from_layouts(layouts: &[Layout]) -> Self {
        let mut scene = LandScene {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
            ..LandScene::default()
        };

        for sub in layouts.iter().flat_map(|l| l.subdivisions.iter()) {
            let index = scene.names.len();
            scene.names.push(sub.name.clone());
            let n = sub.corners.len();

            for (v, c) in sub.corners.iter().enumerate() {
                scene.push(
                    Marker::at(Vec3::new(c[0], MARKER_LIFT, c[1]))
                        .with_color(sub.color)
                        .with_style(MarkerStyle::Circle)
                        .with_kind(MarkerKind::Corner),
                    MarkerRef {
                        subdivision: Some(index),
                        vertex: v,
                        kind: HandleKind::Corner,
                    },
                );
            }

            if n < 2 {
                continue;
            }
            for v in 0..n {
                let (a, b) = (sub.corners[v], sub.corners[(v + 1) % n]);
                let mid = Vec3::new((a[0] + b[0]) * 0.5, MARKER_LIFT, (a[1] + b[1]) * 0.5);
                scene.push(
                    Marker::at(mid)
                        .with_color(sub.color)
                        .with_style(MarkerStyle::Plus)
                        .with_kind(MarkerKind::Control)
                        .with_scale(0.8),
                    MarkerRef {
                        subdivision: Some(index),
                        vertex: v,
                        kind: HandleKind::EdgeMidpoint,
                    },
                );
            }
        }

        scene
    }

    fn push(&mut self, marker: Marker, r: MarkerRef) {
        if let Some(p) = marker.valid_position() {
            self.min = self.min.min(p);
            self.max = self.max.max(p);
        }
        self.markers.push(marker);
        self.refs.push(r);
    }

    /// Adds a jittered lattice of survey points covering `[0, extent)²`.
    pub fn add_survey_field(&mut self, origin: Vec3, extent: f32, spacing: f32) {
        if !(spacing > 0.0) {
            return;
        }
        let steps = (extent / spacing).floor() as usize;
        let mut k = 0;
        for i in 0..steps {
            for j in 0..steps {
                // Golden-ratio jitter keeps the field irregular but reproducible.
                let jx = ((k as f32 * 0.618_034).fract() - 0.5) * spacing * 0.8;
                let jz = ((k as f32 * 0.414_214).fract() - 0.5) * spacing * 0.8;
                let p = origin + Vec3::new(i as f32 * spacing + jx, MARKER_LIFT, j as f32 * spacing + jz);
                self.push(
                    Marker::at(p).with_color(Rgb::from_hex(0x9aa5b1)).with_scale(0.6),
                    MarkerRef {
                        subdivision: None,
                        vertex: k,
                        kind: HandleKind::Survey,
                    },
                );
                k += 1;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.min + self.max) * 0.5
        }
    }

    /// Half-diagonal of the XZ bounds.
    pub fn radius(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            let d = self.max - self.min;
            (d.x * d.x + d.z * d.z).sqrt() * 0.5
        }
    }
}

fn layout_paths(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
        .map(|e| e.path().to_path_buf())
        .collect()
}

pub fn load_layout(path: &Path) -> Result<Layout> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing '{}'", path.display()))
}

/// Loads every layout under `root`. Unreadable files are logged and skipped.
pub fn load_layouts(root: &Path) -> Vec<Layout> {
    let paths = layout_paths(root);
    if paths.is_empty() {
        log::warn!("No .json layouts found in '{}'", root.display());
        return Vec::new();
    }

    let mut layouts = Vec::with_capacity(paths.len());
    for path in paths {
        match load_layout(&path) {
            Ok(layout) => layouts.push(layout),
            Err(e) => log::error!("Failed to load layout {}: {:#}", path.display(), e),
        }
    }

    let subdivisions: usize = layouts.iter().map(|l| l.subdivisions.len()).sum();
    log::info!("Loaded {} layouts | subdivisions={}", layouts.len(), subdivisions);
    layouts
}

/// A town block of lots plus a scattered survey field.
pub fn demo_scene() -> LandScene {
    const PALETTE: [u32; 6] = [0x4cc9f0, 0xf72585, 0x90be6d, 0xf9c74f, 0x577590, 0xf8961e];
    const LOT_W: f32 = 40.0;
    const LOT_D: f32 = 30.0;
    const ROAD: f32 = 8.0;

    let mut subdivisions = Vec::new();
    for row in 0..4 {
        for col in 0..6 {
            let x0 = col as f32 * (LOT_W + ROAD);
            let z0 = row as f32 * (LOT_D + ROAD);
            // Skew every other lot so the glyphs are not all axis-aligned.
            let skew = if (row + col) % 2 == 0 { 0.0 } else { 6.0 };
            subdivisions.push(Subdivision {
                name: format!("Lot {}{}", (b'A' + row as u8) as char, col + 1),
                color: Rgb::from_hex(PALETTE[(row * 6 + col) % PALETTE.len()]),
                corners: vec![
                    [x0, z0],
                    [x0 + LOT_W, z0 + skew],
                    [x0 + LOT_W, z0 + LOT_D],
                    [x0 + skew, z0 + LOT_D],
                ],
            });
        }
    }

    let layout = Layout {
        name: "Demo block".to_string(),
        subdivisions,
    };
    let mut scene = LandScene::from_layouts(std::slice::from_ref(&layout));
    scene.add_survey_field(Vec3::new(-150.0, 0.0, -350.0), 600.0, 8.0);
    scene
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SAMPLE: &str = r##"{
        "name": "North parcel",
        "subdivisions": [
            { "name": "Plot 1", "color": "#ff0000", "corners": [[0, 0], [10, 0], [10, 10], [0, 10]] },
            { "name": "Plot 2", "corners": [[20, 0], [30, 0], [25, 8]] }
        ]
    }"##;

    #[test]
    fn parses_layout_with_default_color() {
        let layout: Layout = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(layout.subdivisions.len(), 2);
        assert_eq!(layout.subdivisions[0].color, Rgb::from_hex(0xff0000));
        assert_eq!(layout.subdivisions[1].color, Rgb::WHITE);
    }

    #[test]
    fn corners_and_midpoints_become_markers() {
        let layout: Layout = serde_json::from_str(SAMPLE).unwrap();
        let scene = LandScene::from_layouts(&[layout]);
        // 4 + 4 for the square, 3 + 3 for the triangle.
        assert_eq!(scene.markers.len(), 14);
        assert_eq!(scene.refs.len(), scene.markers.len());

        let corner = scene.markers[0];
        assert_eq!(corner.kind, MarkerKind::Corner);
        assert_eq!(corner.style, MarkerStyle::Circle);

        let mid_idx = scene.refs.iter().position(|r| r.kind == HandleKind::EdgeMidpoint).unwrap();
        assert_eq!(scene.markers[mid_idx].kind, MarkerKind::Control);
        assert_eq!(scene.markers[mid_idx].position, Some(Vec3::new(5.0, MARKER_LIFT, 0.0)));

        assert_eq!(scene.refs.last().unwrap().subdivision, Some(1));
        assert_eq!(scene.names, vec!["Plot 1", "Plot 2"]);
    }

    #[test]
    fn bounds_cover_all_markers() {
        let layout: Layout = serde_json::from_str(SAMPLE).unwrap();
        let scene = LandScene::from_layouts(&[layout]);
        assert_eq!(scene.center(), Vec3::new(15.0, MARKER_LIFT, 5.0));
        assert!(scene.radius() > 15.0);
    }

    #[test]
    fn bad_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.json"), SAMPLE).unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/other.json"), SAMPLE).unwrap();

        let layouts = load_layouts(dir.path());
        assert_eq!(layouts.len(), 2);
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_layouts(dir.path()).is_empty());
        assert!(load_layouts(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn demo_scene_has_lots_and_survey_points() {
        let scene = demo_scene();
        assert_eq!(scene.names.len(), 24);
        let survey = scene.refs.iter().filter(|r| r.kind == HandleKind::Survey).count();
        assert_eq!(survey, 75 * 75);
        assert!(scene.markers.iter().all(|m| m.valid_position().is_some()));
    }
}
