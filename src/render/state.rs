use image::RgbaImage;

/// Pan/zoom applied when drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl CameraState {
    pub const ORIGIN: Self = Self {
        x: 0.0,
        y: 0.0,
        zoom: 1.0,
    };

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }

    pub fn zoom_by(&mut self, factor: f32, min: f32, max: f32) {
        self.zoom = (self.zoom * factor).clamp(min, max);
    }
}

impl Default for CameraState {
    fn default() -> Self {
        Self::ORIGIN
    }
}

/// The camera drawn this frame and the one that will replace it when the next
/// image arrives. Always swapped as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraPair {
    pub active: CameraState,
    pub pending: CameraState,
}

impl CameraPair {
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.active.pan(dx, dy);
        self.pending.pan(dx, dy);
    }

    pub fn zoom_by(&mut self, factor: f32, min: f32, max: f32) {
        self.active.zoom_by(factor, min, max);
        self.pending.zoom_by(factor, min, max);
    }

    /// Pending becomes active; a fresh pending starts at the origin.
    pub fn promote(&mut self) {
        *self = Self {
            active: self.pending,
            pending: CameraState::ORIGIN,
        };
    }

    pub fn restart_pending(&mut self) {
        self.pending = CameraState::ORIGIN;
    }
}

/// Deferred action run once at the top of the next drawn frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OneShot {
    #[default]
    Nothing,
    ResetCamera,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Ready,
    AwaitingGeneration,
    /// An image landed but has not been drawn yet.
    ImageArrived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderFlags {
    pub ready_for_request: bool,
    pub first_image_rendered: bool,
    pub paused: bool,
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self {
            ready_for_request: true,
            first_image_rendered: false,
            paused: false,
        }
    }
}

/// Returned when the admission gate lets a request through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// An image has been on screen, so the request should be seeded from it.
    pub capture_seed: bool,
}

/// Owns everything the interactive loop draws from: flags, the camera pair,
/// the pending one-shot and the current image.
#[derive(Debug)]
pub struct RenderState {
    flags: RenderFlags,
    cameras: CameraPair,
    one_shot: OneShot,
    current_image: Option<RgbaImage>,
    image_serial: u64,
    rearm_on_failure: bool,
}

impl RenderState {
    pub fn new(rearm_on_failure: bool) -> Self {
        Self {
            flags: RenderFlags::default(),
            cameras: CameraPair::default(),
            one_shot: OneShot::Nothing,
            current_image: None,
            image_serial: 0,
            rearm_on_failure,
        }
    }

    pub fn flags(&self) -> RenderFlags {
        self.flags
    }

    pub fn cameras(&self) -> CameraPair {
        self.cameras
    }

    pub fn active_camera(&self) -> CameraState {
        self.cameras.active
    }

    pub fn current_image(&self) -> Option<&RgbaImage> {
        self.current_image.as_ref()
    }

    /// Bumped every time the current image is replaced.
    pub fn image_serial(&self) -> u64 {
        self.image_serial
    }

    pub fn phase(&self) -> RenderPhase {
        if self.one_shot == OneShot::ResetCamera {
            RenderPhase::ImageArrived
        } else if self.flags.ready_for_request {
            RenderPhase::Ready
        } else {
            RenderPhase::AwaitingGeneration
        }
    }

    /// Close the admission gate for a new request. `None` when a request is
    /// already outstanding; the attempt is dropped, not remembered.
    pub fn begin_request(&mut self) -> Option<Admission> {
        if !self.flags.ready_for_request {
            return None;
        }
        self.flags.ready_for_request = false;
        let capture_seed = self.flags.first_image_rendered;
        if capture_seed {
            // The new image is generated from the current screen center, so
            // only movement from here on should offset it.
            self.cameras.restart_pending();
        }
        Some(Admission { capture_seed })
    }

    /// The request could not be handed to the worker; reopen the gate.
    pub fn abort_request(&mut self) {
        self.flags.ready_for_request = true;
    }

    pub fn image_arrived(&mut self, image: RgbaImage) {
        self.current_image = Some(image);
        self.image_serial += 1;
        self.one_shot = OneShot::ResetCamera;
        self.flags.ready_for_request = true;
    }

    /// Returns whether the gate was reopened.
    pub fn generation_failed(&mut self) -> bool {
        if self.rearm_on_failure {
            self.flags.ready_for_request = true;
        }
        self.rearm_on_failure
    }

    /// Consume the pending one-shot. Call once per drawn frame, before drawing.
    pub fn begin_frame(&mut self) -> OneShot {
        let action = std::mem::take(&mut self.one_shot);
        if action == OneShot::ResetCamera {
            self.cameras.promote();
        }
        action
    }

    pub fn mark_image_rendered(&mut self) {
        if self.current_image.is_some() {
            self.flags.first_image_rendered = true;
        }
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.cameras.pan(dx, dy);
    }

    pub fn zoom_by(&mut self, factor: f32, min: f32, max: f32) {
        self.cameras.zoom_by(factor, min, max);
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.flags.paused = !self.flags.paused;
        self.flags.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel_image() -> RgbaImage {
        RgbaImage::new(2, 2)
    }

    #[test]
    fn starts_ready_without_image() {
        let state = RenderState::new(true);
        assert_eq!(state.phase(), RenderPhase::Ready);
        assert!(state.current_image().is_none());
        assert_eq!(state.active_camera(), CameraState::ORIGIN);
    }

    #[test]
    fn second_request_is_refused_until_an_image_arrives() {
        let mut state = RenderState::new(true);
        assert_eq!(
            state.begin_request(),
            Some(Admission {
                capture_seed: false
            })
        );
        assert_eq!(state.phase(), RenderPhase::AwaitingGeneration);
        assert_eq!(state.begin_request(), None);

        state.image_arrived(pixel_image());
        assert_eq!(state.phase(), RenderPhase::ImageArrived);
        assert!(state.flags().ready_for_request);
    }

    #[test]
    fn reset_camera_fires_exactly_once() {
        let mut state = RenderState::new(true);
        state.begin_request();
        state.pan(5.0, -3.0);
        state.image_arrived(pixel_image());
        state.pan(1.0, 1.0);

        assert_eq!(state.begin_frame(), OneShot::ResetCamera);
        let active = state.active_camera();
        assert_eq!((active.x, active.y), (6.0, -2.0));
        assert_eq!(state.cameras().pending, CameraState::ORIGIN);
        assert_eq!(state.phase(), RenderPhase::Ready);

        state.pan(2.0, 0.0);
        assert_eq!(state.begin_frame(), OneShot::Nothing);
        assert_eq!(state.active_camera().x, 8.0);
    }

    #[test]
    fn seeded_request_restarts_pending_camera() {
        let mut state = RenderState::new(true);
        state.begin_request();
        state.image_arrived(pixel_image());
        state.begin_frame();
        state.mark_image_rendered();

        state.pan(10.0, 10.0);
        let admission = state.begin_request().expect("gate open");
        assert!(admission.capture_seed);
        assert_eq!(state.cameras().pending, CameraState::ORIGIN);
        assert_eq!(state.active_camera().x, 10.0);
    }

    #[test]
    fn failure_rearm_follows_policy() {
        let mut rearm = RenderState::new(true);
        rearm.begin_request();
        assert!(rearm.generation_failed());
        assert_eq!(rearm.phase(), RenderPhase::Ready);

        let mut stall = RenderState::new(false);
        stall.begin_request();
        assert!(!stall.generation_failed());
        assert_eq!(stall.phase(), RenderPhase::AwaitingGeneration);
        assert_eq!(stall.begin_request(), None);
    }

    #[test]
    fn zoom_is_clamped_on_both_cameras() {
        let mut state = RenderState::new(true);
        state.zoom_by(10.0, 0.5, 2.0);
        assert_eq!(state.cameras().active.zoom, 2.0);
        assert_eq!(state.cameras().pending.zoom, 2.0);
        state.zoom_by(0.01, 0.5, 2.0);
        assert_eq!(state.active_camera().zoom, 0.5);
    }

    #[test]
    fn first_image_rendered_requires_an_image() {
        let mut state = RenderState::new(true);
        state.mark_image_rendered();
        assert!(!state.flags().first_image_rendered);
        state.image_arrived(pixel_image());
        state.mark_image_rendered();
        assert!(state.flags().first_image_rendered);
        assert_eq!(state.image_serial(), 1);
    }
}
