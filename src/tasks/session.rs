//! Window-independent half of the viewer: admission, seed capture, request
//! construction and the hand-off of finished generations back to the loop.

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactWriter;
use crate::config::{Configuration, GenerationConfig, ViewerConfig};
use crate::events::{GenerationOutcome, GenerationRequest, RequestId};
use crate::render::capture::{capture_center_region, encode_jpeg};
use crate::render::state::RenderState;
use crate::tasks::generator::RequestSink;

/// Borrowed view of the last presented frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameRef<'a> {
    pub pixels: &'a [u32],
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Generate,
    TogglePause,
    QuitIfPaused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Exit,
}

pub struct Session<S: RequestSink> {
    state: RenderState,
    sink: S,
    outcome_tx: Sender<GenerationOutcome>,
    outcome_rx: Receiver<GenerationOutcome>,
    generation: GenerationConfig,
    viewer: ViewerConfig,
    artifacts: ArtifactWriter,
}

impl<S: RequestSink> Session<S> {
    pub fn new(sink: S, cfg: &Configuration) -> Self {
        let (outcome_tx, outcome_rx) = unbounded();
        Self {
            state: RenderState::new(cfg.generation.rearm_on_failure),
            sink,
            outcome_tx,
            outcome_rx,
            generation: cfg.generation.clone(),
            viewer: cfg.viewer.clone(),
            artifacts: ArtifactWriter::new(cfg.artifacts.clone()),
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Submit a request if the admission gate is open. Attempts while a request
    /// is outstanding are dropped.
    pub fn request_generation(&mut self, frame: Option<FrameRef<'_>>) -> Option<RequestId> {
        let Some(admission) = self.state.begin_request() else {
            debug!("generation already in progress; ignoring trigger");
            return None;
        };

        let seed_image = if admission.capture_seed {
            frame.and_then(|frame| self.capture_seed(frame))
        } else {
            None
        };
        let seeded = seed_image.is_some();
        let request = self.build_request(seed_image);

        match self.sink.submit(request) {
            Ok(id) => {
                info!(request = %id, seeded, "generation requested");
                Some(id)
            }
            Err(err) => {
                warn!(error = %err, "failed to queue generation");
                self.state.abort_request();
                None
            }
        }
    }

    fn capture_seed(&self, frame: FrameRef<'_>) -> Option<Vec<u8>> {
        let region = capture_center_region(
            frame.pixels,
            (frame.width, frame.height),
            (self.generation.width, self.generation.height),
        );
        match encode_jpeg(&region, self.viewer.capture_jpeg_quality) {
            Ok(bytes) => {
                if let Err(err) = self.artifacts.save_seed(&bytes) {
                    warn!(error = ?err, "failed to persist seed image");
                }
                Some(bytes)
            }
            Err(err) => {
                warn!(error = ?err, "seed capture failed; falling back to text-to-image");
                None
            }
        }
    }

    fn build_request(&self, seed_image: Option<Vec<u8>>) -> GenerationRequest {
        let ready_tx = self.outcome_tx.clone();
        let failed_tx = self.outcome_tx.clone();
        let artifacts = self.artifacts.clone();

        let mut builder = GenerationRequest::builder(self.generation.prompt.clone())
            .steps(self.generation.steps)
            .size(self.generation.width, self.generation.height)
            .seed_image(seed_image)
            .on_complete(move |generated| {
                let outcome = match generated.decode_rgba() {
                    Ok(image) => {
                        if let Err(err) = artifacts.save_generated(&image) {
                            warn!(error = ?err, "failed to persist generated image");
                        }
                        GenerationOutcome::Ready(image)
                    }
                    Err(err) => {
                        warn!(error = %err, "generated image could not be decoded");
                        GenerationOutcome::Failed(err)
                    }
                };
                let _ = ready_tx.send(outcome);
            })
            .on_failure(move |err| {
                let _ = failed_tx.send(GenerationOutcome::Failed(err.clone()));
            });
        if let Some(seed) = self.generation.seed {
            builder = builder.seed(seed);
        }
        builder.build()
    }

    /// Apply everything the worker published since the last tick.
    pub fn drain_outcomes(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            applied += 1;
            match outcome {
                GenerationOutcome::Ready(image) => {
                    debug!(
                        width = image.width(),
                        height = image.height(),
                        "new image ready"
                    );
                    self.state.image_arrived(image);
                }
                GenerationOutcome::Failed(err) => {
                    let rearmed = self.state.generation_failed();
                    info!(error = %err, rearmed, "generation did not produce an image");
                }
            }
        }
        applied
    }

    /// Relative mouse motion in raw device units.
    pub fn pan(&mut self, raw_dx: f64, raw_dy: f64) {
        if self.state.flags().paused {
            return;
        }
        let s = self.viewer.mouse_sensitivity;
        self.state.pan(raw_dx as f32 * s, raw_dy as f32 * s);
    }

    /// Wheel motion in lines; positive zooms in.
    pub fn zoom(&mut self, lines: f32) {
        if self.state.flags().paused || lines == 0.0 {
            return;
        }
        let factor = (1.0 + self.viewer.zoom_step).powf(lines);
        self.state
            .zoom_by(factor, self.viewer.min_zoom, self.viewer.max_zoom);
    }

    pub fn apply(&mut self, action: InputAction, frame: Option<FrameRef<'_>>) -> Control {
        match action {
            InputAction::Generate => {
                self.request_generation(frame);
                Control::Continue
            }
            InputAction::TogglePause => {
                let paused = self.state.toggle_pause();
                info!(paused, "pause toggled");
                Control::Continue
            }
            InputAction::QuitIfPaused if self.state.flags().paused => Control::Exit,
            InputAction::QuitIfPaused => Control::Continue,
        }
    }
}
