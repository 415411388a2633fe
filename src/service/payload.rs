//! Wire format of the generation service.
//!
//! The service speaks the Stable Diffusion web UI API: `txt2img` for pure prompt
//! requests and `img2img` when a seed image is attached. Both answer with
//! `{"images": [<base64>, ...]}`; only the first image is consumed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::events::GeneratedImage;

/// Seed value the service interprets as "pick one at random".
pub const UNSPECIFIED_SEED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    TextToImage,
    ImageToImage,
}

impl EndpointKind {
    pub fn for_payload(payload: &GenerationPayload) -> Self {
        if payload.seed_image.is_some() {
            Self::ImageToImage
        } else {
            Self::TextToImage
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::TextToImage => "sdapi/v1/txt2img",
            Self::ImageToImage => "sdapi/v1/img2img",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextToImage => "text-to-image",
            Self::ImageToImage => "image-to-image",
        }
    }
}

/// Request parameters as the worker sees them, detached from the callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationPayload {
    pub prompt: String,
    pub seed: Option<i64>,
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    /// Compressed image bytes (JPEG) of the captured screen region.
    pub seed_image: Option<Vec<u8>>,
}

/// Client policy for image-seeded requests. Not exposed per request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageTuning {
    pub denoising_strength: f32,
    pub guidance_scale: f32,
}

impl Default for ImageTuning {
    fn default() -> Self {
        Self {
            denoising_strength: 0.4,
            guidance_scale: 3.0,
        }
    }
}

#[derive(Debug, Serialize)]
struct TextToImageBody<'a> {
    prompt: &'a str,
    seed: i64,
    steps: u32,
    width: u32,
    height: u32,
}

#[derive(Debug, Serialize)]
struct ImageToImageBody<'a> {
    init_images: Vec<String>,
    prompt: &'a str,
    seed: i64,
    steps: u32,
    width: u32,
    height: u32,
    denoising_strength: f32,
    cfg_scale: f32,
}

/// Build the JSON body for `kind`.
pub fn encode_body(
    kind: EndpointKind,
    payload: &GenerationPayload,
    tuning: ImageTuning,
) -> Result<serde_json::Value, GenerationError> {
    let seed = payload.seed.unwrap_or(UNSPECIFIED_SEED);
    let value = match kind {
        EndpointKind::TextToImage => serde_json::to_value(TextToImageBody {
            prompt: &payload.prompt,
            seed,
            steps: payload.steps,
            width: payload.width,
            height: payload.height,
        }),
        EndpointKind::ImageToImage => {
            let seed_image = payload.seed_image.as_deref().ok_or_else(|| {
                GenerationError::Decode("image-to-image request has no seed image".into())
            })?;
            serde_json::to_value(ImageToImageBody {
                init_images: vec![STANDARD.encode(seed_image)],
                prompt: &payload.prompt,
                seed,
                steps: payload.steps,
                width: payload.width,
                height: payload.height,
                denoising_strength: tuning.denoising_strength,
                cfg_scale: tuning.guidance_scale,
            })
        }
    };
    value.map_err(|err| GenerationError::Decode(format!("failed to encode request: {err}")))
}

/// Response envelope shared by both endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageResult {
    #[serde(default)]
    pub images: Vec<String>,
}

impl ImageResult {
    /// Base64-decode the first image of the set.
    pub fn first_image(&self) -> Result<GeneratedImage, GenerationError> {
        let encoded = self
            .images
            .first()
            .ok_or_else(|| GenerationError::Decode("response contained no images".into()))?;
        // Some front-ends hand back data URLs rather than bare base64.
        let encoded = match encoded.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
            None => encoded.as_str(),
        };
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| GenerationError::Decode(format!("invalid base64 image: {err}")))?;
        Ok(GeneratedImage { bytes })
    }
}
