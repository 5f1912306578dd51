use glam::{Vec2, Vec3};
use marker_core::{
    classify, CameraView, GpuDescriptor, GpuTier, InstanceStaging, Marker, MarkerKind, MonitorConfig,
    OptimizerConfig, PerformanceMonitor, QualityLevel, Ray, Raycaster, ScreenSpaceOptimizer, Trend, ViewportSize,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

fn scatter(n: usize, extent: f32, seed: u64) -> Vec<Marker> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let kind = match rng.gen_range(0..10) {
                0 => MarkerKind::Corner,
                1 => MarkerKind::Control,
                _ => MarkerKind::Normal,
            };
            Marker::at(Vec3::new(rng.gen_range(0.0..extent), 0.0, rng.gen_range(0.0..extent))).with_kind(kind)
        })
        .collect()
}

fn overview_camera() -> CameraView {
    CameraView::look_at(
        Vec3::new(250.0, 35.0, 285.0),
        Vec3::new(250.0, 0.0, 250.0),
        60f32.to_radians(),
        16.0 / 9.0,
        0.1,
        5000.0,
    )
}

#[test]
fn five_thousand_point_scatter() {
    let points = scatter(5000, 500.0, 7);
    let mut opt = ScreenSpaceOptimizer::new(OptimizerConfig::default()).unwrap();

    let started = Instant::now();
    let out = opt.optimize_points(&points, &overview_camera(), ViewportSize::new(1920, 1080));
    let elapsed = started.elapsed();

    assert!(!out.is_empty());
    assert!(out.len() < points.len());
    assert!(elapsed < Duration::from_millis(100), "took {:?}", elapsed);

    let stats = opt.last_stats();
    assert!(stats.frustum_culled > 0);
    assert!(stats.density_skipped > 0);
    assert!(out.windows(2).all(|w| w[0].priority >= w[1].priority));
}

#[test]
fn culling_distance_is_respected() {
    let points = scatter(2000, 3000.0, 11);
    let cfg = OptimizerConfig {
        frustum_culling: false,
        dynamic_lod: false,
        culling_distance: 400.0,
        ..OptimizerConfig::default()
    };
    let cam = overview_camera();
    let mut opt = ScreenSpaceOptimizer::new(cfg).unwrap();
    let out = opt.optimize_points(&points, &cam, ViewportSize::new(1280, 720));

    assert!(out.iter().all(|p| p.distance <= 400.0));
    let far = points
        .iter()
        .filter(|m| m.position.is_some_and(|p| p.distance(cam.position) > 400.0))
        .count();
    assert!(far > 0);
    assert!(out.len() <= points.len() - far);
}

#[test]
fn lod_is_monotonic_in_distance() {
    let points = scatter(3000, 500.0, 3);
    let mut opt = ScreenSpaceOptimizer::new(OptimizerConfig {
        dynamic_lod: false,
        ..OptimizerConfig::default()
    })
    .unwrap();
    let mut out = opt.optimize_points(&points, &overview_camera(), ViewportSize::new(1920, 1080));
    out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    assert!(out.windows(2).all(|w| w[0].lod_level <= w[1].lod_level));
}

#[test]
fn picked_instance_round_trips_through_the_viewport() {
    // Sparse lattice so no neighbour sphere sits on the pick ray.
    let markers: Vec<Marker> = (0..10)
        .flat_map(|x| (0..10).map(move |z| Marker::at(Vec3::new(x as f32 * 10.0, 0.0, z as f32 * 10.0))))
        .collect();
    let cam = CameraView::look_at(
        Vec3::new(45.0, 50.0, 110.0),
        Vec3::new(45.0, 0.0, 45.0),
        60f32.to_radians(),
        16.0 / 9.0,
        0.1,
        2000.0,
    );
    let viewport = ViewportSize::new(1600, 900);

    // A single LOD band disables density thinning.
    let mut opt = ScreenSpaceOptimizer::new(OptimizerConfig {
        dynamic_lod: false,
        lod_levels: 1,
        ..OptimizerConfig::default()
    })
    .unwrap();
    let optimized = opt.optimize_points(&markers, &cam, viewport);
    assert!(optimized.len() > 50);

    let mut staging = InstanceStaging::<usize>::new(256).unwrap();
    staging.update_points(&optimized);
    for (slot, p) in optimized.iter().enumerate() {
        staging.set_point_user_data(slot, p.source_index);
    }

    for (slot, p) in optimized.iter().enumerate().step_by(3) {
        let ndc = cam.view_proj().project_point3(p.position);
        let cursor = Vec2::new(
            (ndc.x + 1.0) * 0.5 * viewport.width as f32,
            (1.0 - ndc.y) * 0.5 * viewport.height as f32,
        );
        let ray = Ray::from_viewport(cursor, viewport, &cam);
        let hits = staging.get_intersections(&Raycaster::new(ray));

        assert!(!hits.is_empty());
        assert_eq!(hits[0].instance_id, slot);
        assert_eq!(hits[0].user_data, Some(p.source_index));
        assert!(hits[0].point.distance(p.position) <= 2.0 + 1e-3);
    }
}

#[test]
fn flipping_recommendations_do_not_thrash() {
    let mut monitor = PerformanceMonitor::new(MonitorConfig::default()).unwrap();
    let t0 = Instant::now();
    let frame = Duration::from_millis(16);

    // Flips every frame: the confirmation window never completes.
    let mut commits = 0;
    for i in 0..3000u32 {
        let level = if i % 2 == 0 {
            QualityLevel::Performance
        } else {
            QualityLevel::Emergency
        };
        if monitor.apply_recommendation(level, 50.0, t0 + frame * i).is_some() {
            commits += 1;
        }
    }
    assert_eq!(commits, 0);

    // Flips every two seconds: commits happen, but never closer than
    // delay + confirmation apart.
    let mut monitor = PerformanceMonitor::new(MonitorConfig::default()).unwrap();
    let mut commit_times = Vec::new();
    for i in 0..3750u32 {
        let now = t0 + frame * i;
        let level = if (i * 16 / 2000) % 2 == 0 {
            QualityLevel::Performance
        } else {
            QualityLevel::Emergency
        };
        if monitor.apply_recommendation(level, 50.0, now).is_some() {
            commit_times.push(now);
        }
    }
    assert!(commit_times.len() >= 2);
    for w in commit_times.windows(2) {
        assert!(w[1] - w[0] >= Duration::from_millis(6000));
    }
}

#[test]
fn thirty_fps_window_and_trend_gate() {
    let mut monitor = PerformanceMonitor::new(MonitorConfig::default()).unwrap();
    let t0 = Instant::now();
    let dt = 1.0 / 30.0;
    for i in 0..60u32 {
        monitor.record_frame(dt, t0 + Duration::from_secs_f32(dt * i as f32));
    }
    let m = monitor.metrics();
    approx::assert_relative_eq!(m.fps.rolling60, 30.0, epsilon = 1e-2);
    assert_eq!(m.trend, Trend::Unknown);

    for i in 60..120u32 {
        monitor.record_frame(dt, t0 + Duration::from_secs_f32(dt * i as f32));
    }
    assert_eq!(monitor.metrics().trend, Trend::Stable);
}

#[test]
fn gt_630_is_legacy_and_caps_quality() {
    let gpu = classify(Some(&GpuDescriptor::new(
        "ANGLE (NVIDIA, NVIDIA GeForce GT 630 Direct3D11 vs_5_0 ps_5_0, D3D11)",
        "Google Inc. (NVIDIA)",
    )));
    assert_eq!(gpu.tier, GpuTier::Legacy);
    assert_eq!(gpu.score, -15.0);

    let mut monitor = PerformanceMonitor::new(MonitorConfig::default()).unwrap();
    monitor.set_gpu(gpu);
    // 85 with no frames recorded: below the weak-tier BALANCED bar.
    assert_eq!(monitor.recommended_quality_level(), QualityLevel::Performance);
}
