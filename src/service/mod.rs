pub mod client;
pub mod payload;

pub use client::{ImageService, StableDiffusionClient};
pub use payload::{EndpointKind, GenerationPayload, ImageResult, ImageTuning};
