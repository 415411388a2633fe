pub mod artifacts;
pub mod config;
pub mod error;
pub mod events;
pub mod service;
pub mod render {
    pub mod capture;
    pub mod state;
    pub mod tiling;
}
pub mod tasks {
    pub mod generator;
    pub mod session;
    pub mod viewer;
}

pub use error::GenerationError;
pub use events::{GeneratedImage, GenerationRequest, RequestId};
pub use tasks::generator::{Generator, RequestSink};
