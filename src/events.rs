use std::fmt;

use image::RgbaImage;

use crate::error::GenerationError;
use crate::service::payload::GenerationPayload;

pub const DEFAULT_STEPS: u32 = 20;
pub const DEFAULT_SIZE: u32 = 512;

pub type CompletionFn = Box<dyn FnOnce(GeneratedImage) + Send + 'static>;
pub type FailureFn = Box<dyn FnOnce(&GenerationError) + Send + 'static>;

/// Identifier handed out by the generator in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Encoded image bytes returned by the service (the first image of a result set,
/// already base64-decoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
}

impl GeneratedImage {
    /// Decode into a displayable RGBA buffer.
    pub fn decode_rgba(&self) -> Result<RgbaImage, GenerationError> {
        let img = image::load_from_memory(&self.bytes)
            .map_err(|err| GenerationError::Decode(format!("unreadable image bytes: {err}")))?;
        Ok(img.to_rgba8())
    }
}

/// What the worker hands back to the interactive loop.
#[derive(Debug)]
pub enum GenerationOutcome {
    Ready(RgbaImage),
    Failed(GenerationError),
}

/// One unit of work for the generator. Immutable once built; the worker consumes
/// it through [`GenerationRequest::into_parts`].
pub struct GenerationRequest {
    prompt: String,
    seed: Option<i64>,
    steps: u32,
    width: u32,
    height: u32,
    seed_image: Option<Vec<u8>>,
    on_complete: Option<CompletionFn>,
    on_failure: Option<FailureFn>,
}

impl GenerationRequest {
    pub fn builder(prompt: impl Into<String>) -> GenerationRequestBuilder {
        GenerationRequestBuilder {
            inner: GenerationRequest {
                prompt: prompt.into(),
                seed: None,
                steps: DEFAULT_STEPS,
                width: DEFAULT_SIZE,
                height: DEFAULT_SIZE,
                seed_image: None,
                on_complete: None,
                on_failure: None,
            },
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn seed(&self) -> Option<i64> {
        self.seed
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn seed_image(&self) -> Option<&[u8]> {
        self.seed_image.as_deref()
    }

    pub fn has_seed_image(&self) -> bool {
        self.seed_image.is_some()
    }

    pub(crate) fn into_parts(self) -> (GenerationPayload, Callbacks) {
        let payload = GenerationPayload {
            prompt: self.prompt,
            seed: self.seed,
            steps: self.steps,
            width: self.width,
            height: self.height,
            seed_image: self.seed_image,
        };
        let callbacks = Callbacks {
            on_complete: self.on_complete,
            on_failure: self.on_failure,
        };
        (payload, callbacks)
    }
}

impl fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("prompt", &self.prompt)
            .field("seed", &self.seed)
            .field("steps", &self.steps)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("seed_image_len", &self.seed_image.as_ref().map(Vec::len))
            .field("on_complete", &self.on_complete.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

pub struct GenerationRequestBuilder {
    inner: GenerationRequest,
}

impl GenerationRequestBuilder {
    pub fn seed(mut self, seed: i64) -> Self {
        self.inner.seed = Some(seed);
        self
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.inner.steps = steps;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.inner.width = width;
        self.inner.height = height;
        self
    }

    pub fn seed_image(mut self, encoded: Option<Vec<u8>>) -> Self {
        self.inner.seed_image = encoded;
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce(GeneratedImage) + Send + 'static) -> Self {
        self.inner.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl FnOnce(&GenerationError) + Send + 'static) -> Self {
        self.inner.on_failure = Some(Box::new(f));
        self
    }

    pub fn build(self) -> GenerationRequest {
        self.inner
    }
}

pub(crate) struct Callbacks {
    pub on_complete: Option<CompletionFn>,
    pub on_failure: Option<FailureFn>,
}

impl Callbacks {
    pub fn complete(self, image: GeneratedImage) {
        if let Some(f) = self.on_complete {
            f(image);
        }
    }

    pub fn fail(self, err: &GenerationError) {
        if let Some(f) = self.on_failure {
            f(err);
        }
    }
}
