use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// Where the generation service lives and how image-seeded requests are tuned.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceConfig {
    #[serde(default = "ServiceConfig::default_base_url")]
    pub base_url: String,
    /// Absent means the worker waits on the service indefinitely.
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    #[serde(default = "ServiceConfig::default_denoising_strength")]
    pub denoising_strength: f32,
    #[serde(default = "ServiceConfig::default_guidance_scale")]
    pub guidance_scale: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GenerationConfig {
    #[serde(default = "GenerationConfig::default_prompt")]
    pub prompt: String,
    #[serde(default = "GenerationConfig::default_steps")]
    pub steps: u32,
    #[serde(default = "GenerationConfig::default_size")]
    pub width: u32,
    #[serde(default = "GenerationConfig::default_size")]
    pub height: u32,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default = "default_true")]
    pub generate_on_start: bool,
    /// Re-open the admission gate after a failed generation.
    #[serde(default = "default_true")]
    pub rearm_on_failure: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ViewerConfig {
    #[serde(default = "ViewerConfig::default_window_width")]
    pub window_width: u32,
    #[serde(default = "ViewerConfig::default_window_height")]
    pub window_height: u32,
    #[serde(default = "ViewerConfig::default_title")]
    pub title: String,
    #[serde(default = "ViewerConfig::default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default = "ViewerConfig::default_mouse_sensitivity")]
    pub mouse_sensitivity: f32,
    #[serde(default = "ViewerConfig::default_zoom_step")]
    pub zoom_step: f32,
    #[serde(default = "ViewerConfig::default_min_zoom")]
    pub min_zoom: f32,
    #[serde(default = "ViewerConfig::default_max_zoom")]
    pub max_zoom: f32,
    /// Copies drawn on each side of the base tile; 1 gives the 3x3 grid.
    #[serde(default = "ViewerConfig::default_tile_radius")]
    pub tile_radius: u32,
    #[serde(default = "ViewerConfig::default_capture_jpeg_quality")]
    pub capture_jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArtifactsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "ArtifactsConfig::default_generated_image")]
    pub generated_image: PathBuf,
    #[serde(default = "ArtifactsConfig::default_seed_image")]
    pub seed_image: PathBuf,
}

fn default_true() -> bool {
    true
}

impl ServiceConfig {
    fn default_base_url() -> String {
        "http://127.0.0.1:7860".to_string()
    }

    fn default_denoising_strength() -> f32 {
        0.4
    }

    fn default_guidance_scale() -> f32 {
        3.0
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            request_timeout: None,
            denoising_strength: Self::default_denoising_strength(),
            guidance_scale: Self::default_guidance_scale(),
        }
    }
}

impl GenerationConfig {
    fn default_prompt() -> String {
        "Terrifying haunted house interior with scary monsters".to_string()
    }

    fn default_steps() -> u32 {
        10
    }

    fn default_size() -> u32 {
        512
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            prompt: Self::default_prompt(),
            steps: Self::default_steps(),
            width: Self::default_size(),
            height: Self::default_size(),
            seed: None,
            generate_on_start: true,
            rearm_on_failure: true,
        }
    }
}

impl ViewerConfig {
    fn default_window_width() -> u32 {
        1024
    }

    fn default_window_height() -> u32 {
        768
    }

    fn default_title() -> String {
        "Dream".to_string()
    }

    fn default_frame_rate() -> u32 {
        60
    }

    fn default_mouse_sensitivity() -> f32 {
        0.1
    }

    fn default_zoom_step() -> f32 {
        0.1
    }

    fn default_min_zoom() -> f32 {
        0.25
    }

    fn default_max_zoom() -> f32 {
        4.0
    }

    fn default_tile_radius() -> u32 {
        1
    }

    fn default_capture_jpeg_quality() -> u8 {
        90
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate.max(1)))
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_width: Self::default_window_width(),
            window_height: Self::default_window_height(),
            title: Self::default_title(),
            frame_rate: Self::default_frame_rate(),
            mouse_sensitivity: Self::default_mouse_sensitivity(),
            zoom_step: Self::default_zoom_step(),
            min_zoom: Self::default_min_zoom(),
            max_zoom: Self::default_max_zoom(),
            tile_radius: Self::default_tile_radius(),
            capture_jpeg_quality: Self::default_capture_jpeg_quality(),
        }
    }
}

impl ArtifactsConfig {
    fn default_generated_image() -> PathBuf {
        PathBuf::from("generated_image.png")
    }

    fn default_seed_image() -> PathBuf {
        PathBuf::from("init_image.jpg")
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            generated_image: Self::default_generated_image(),
            seed_image: Self::default_seed_image(),
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        serde_yaml::from_str(&s)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.service.base_url.trim().is_empty(),
            "service.base-url must not be empty"
        );
        ensure!(
            self.service.base_url.starts_with("http://")
                || self.service.base_url.starts_with("https://"),
            "service.base-url must be an http(s) URL"
        );
        ensure!(
            (0.0..=1.0).contains(&self.service.denoising_strength),
            "service.denoising-strength must be within [0, 1]"
        );
        ensure!(
            self.service.guidance_scale > 0.0,
            "service.guidance-scale must be positive"
        );
        ensure!(
            !self.generation.prompt.trim().is_empty(),
            "generation.prompt must not be empty"
        );
        ensure!(
            self.generation.steps > 0,
            "generation.steps must be greater than zero"
        );
        ensure!(
            self.generation.width > 0 && self.generation.height > 0,
            "generation.width and generation.height must be greater than zero"
        );
        ensure!(
            self.viewer.window_width > 0 && self.viewer.window_height > 0,
            "viewer window size must be greater than zero"
        );
        ensure!(
            self.viewer.frame_rate > 0,
            "viewer.frame-rate must be greater than zero"
        );
        ensure!(
            self.viewer.min_zoom > 0.0 && self.viewer.min_zoom <= self.viewer.max_zoom,
            "viewer.min-zoom must be positive and not exceed viewer.max-zoom"
        );
        ensure!(
            self.viewer.zoom_step >= 0.0,
            "viewer.zoom-step must not be negative"
        );
        ensure!(
            self.viewer.tile_radius >= 1,
            "viewer.tile-radius must be at least 1"
        );
        ensure!(
            (1..=100).contains(&self.viewer.capture_jpeg_quality),
            "viewer.capture-jpeg-quality must be within 1..=100"
        );
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: Configuration = serde_yaml::from_str("{}").expect("parse config");
        assert_eq!(cfg.service.base_url, "http://127.0.0.1:7860");
        assert_eq!(cfg.service.request_timeout, None);
        assert_eq!(cfg.generation.steps, 10);
        assert_eq!((cfg.generation.width, cfg.generation.height), (512, 512));
        assert!(cfg.generation.rearm_on_failure);
        assert_eq!(cfg.viewer.frame_rate, 60);
        assert!((cfg.viewer.mouse_sensitivity - 0.1).abs() < f32::EPSILON);
        assert_eq!(cfg.viewer.tile_radius, 1);
        assert_eq!(cfg.artifacts.seed_image, PathBuf::from("init_image.jpg"));
        cfg.validated().expect("defaults are valid");
    }

    #[test]
    fn parses_humantime_timeout() {
        let cfg: Configuration = serde_yaml::from_str(
            r#"
service:
  request-timeout: 90s
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.service.request_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn rejects_inverted_zoom_range() {
        let cfg: Configuration = serde_yaml::from_str(
            r#"
viewer:
  min-zoom: 2.0
  max-zoom: 1.0
"#,
        )
        .expect("parse config");
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn frame_interval_tracks_frame_rate() {
        let viewer = ViewerConfig {
            frame_rate: 50,
            ..ViewerConfig::default()
        };
        assert_eq!(viewer.frame_interval(), Duration::from_millis(20));
    }
}
