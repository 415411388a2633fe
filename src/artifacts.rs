use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use image::RgbaImage;
use tracing::debug;

use crate::config::ArtifactsConfig;

/// Writes the latest generation and seed capture to fixed paths, overwriting
/// the previous pair. Diagnostic only; callers log and ignore failures.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    cfg: ArtifactsConfig,
}

impl ArtifactWriter {
    pub fn new(cfg: ArtifactsConfig) -> Self {
        Self { cfg }
    }

    pub fn save_generated(&self, image: &RgbaImage) -> Result<()> {
        if !self.cfg.enabled {
            return Ok(());
        }
        let path = &self.cfg.generated_image;
        ensure_parent(path)?;
        image
            .save(path)
            .with_context(|| format!("failed to save generated image to {}", path.display()))?;
        debug!(path = %path.display(), "saved generated image");
        Ok(())
    }

    /// `encoded` is already a complete JPEG file.
    pub fn save_seed(&self, encoded: &[u8]) -> Result<()> {
        if !self.cfg.enabled {
            return Ok(());
        }
        let path = &self.cfg.seed_image;
        ensure_parent(path)?;
        fs::write(path, encoded)
            .with_context(|| format!("failed to save seed image to {}", path.display()))?;
        debug!(path = %path.display(), bytes = encoded.len(), "saved seed image");
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display())),
        _ => Ok(()),
    }
}
