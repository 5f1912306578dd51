use anyhow::{Context, Result};
use clap::Parser;
use marker_core::{EngineConfig, MonitorConfig, OptimizerConfig, QualityLevel};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// `land-viewer` - interactive 3D land layout viewer.
///
/// Renders subdivision corner markers over a terrain grid with screen-space
/// LOD and adaptive quality control.
#[derive(Parser, Debug, Clone)]
#[command(name = "land-viewer", version, about, long_about = None)]
pub struct Cli {
    /// Directory scanned recursively for `*.json` land layouts.
    ///
    /// A procedural demo layout is shown when nothing is found.
    #[arg(long, env = "LAND_LAYOUTS", default_value = "layouts")]
    pub layouts: PathBuf,

    /// Optional JSON file with optimizer, monitor and engine settings.
    #[arg(long, env = "LAND_VIEWER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Instance buffer capacity; overrides the config file.
    #[arg(long)]
    pub max_points: Option<usize>,

    /// Frame rate the optimizer budgets against; overrides the config file.
    #[arg(long)]
    pub target_fps: Option<f32>,

    /// Pin a quality level (full, balanced, performance, emergency) and
    /// disable automatic adjustment.
    #[arg(long)]
    pub quality: Option<QualityLevel>,

    /// Log a performance summary every 60 frames.
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub optimizer: OptimizerConfig,
    pub monitor: MonitorConfig,
    pub engine: EngineConfig,
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        let cfg: ViewerConfig =
            serde_json::from_str(&text).with_context(|| format!("parsing config '{}'", path.display()))?;
        Ok(cfg)
    }

    /// Config file (if any) with command-line overrides applied on top.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut cfg = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(n) = cli.max_points {
            cfg.engine.max_points = n;
        }
        if let Some(fps) = cli.target_fps {
            cfg.optimizer.target_fps = fps;
        }
        if cli.debug {
            cfg.monitor.debug_mode = true;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.optimizer.validate().context("optimizer config")?;
        self.monitor.validate().context("monitor config")?;
        self.engine.validate().context("engine config")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["land-viewer"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ViewerConfig = serde_json::from_str(
            r#"{ "optimizer": { "culling_distance": 250.0 }, "monitor": { "hysteresis_delay_ms": 2000 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.optimizer.culling_distance, 250.0);
        assert_eq!(cfg.optimizer.lod_levels, 4);
        assert_eq!(cfg.monitor.hysteresis_delay_ms, 2000);
        assert_eq!(cfg.monitor.confirmation_ms, 1000);
        assert_eq!(cfg.engine.max_points, 10_000);
    }

    #[test]
    fn command_line_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "engine": {{ "max_points": 500 }}, "optimizer": {{ "target_fps": 30 }} }}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cfg = ViewerConfig::from_cli(&cli(&["--config", &path, "--target-fps", "75", "--debug"])).unwrap();
        assert_eq!(cfg.engine.max_points, 500);
        assert_eq!(cfg.optimizer.target_fps, 75.0);
        assert!(cfg.monitor.debug_mode);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(ViewerConfig::from_cli(&cli(&["--max-points", "0"])).is_err());
        assert!(ViewerConfig::from_cli(&cli(&["--target-fps=-1"])).is_err());
    }

    #[test]
    fn quality_flag_parses_level_names() {
        let c = cli(&["--quality", "emergency"]);
        assert_eq!(c.quality, Some(QualityLevel::Emergency));
        assert!(Cli::try_parse_from(["land-viewer", "--quality", "ultra"]).is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ViewerConfig::load(Path::new("/nonexistent/land.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/land.json"));
    }
}
