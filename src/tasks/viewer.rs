use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use softbuffer::{Context as SoftContext, Surface};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowId},
};

use crate::{
    config::Configuration,
    render::tiling::TiledRenderer,
    tasks::{
        generator::Generator,
        session::{Control, FrameRef, InputAction, Session},
    },
};

/// Pixel-precise wheels report roughly this many pixels per line.
const PIXELS_PER_LINE: f64 = 40.0;

#[derive(Debug)]
enum ViewerEvent {
    Cancelled,
}

type WindowHandle = Arc<Window>;

/// CPU copy of the presented frame; seed captures read from here.
#[derive(Debug, Default)]
struct Framebuffer {
    pixels: Vec<u32>,
    width: u32,
    height: u32,
    /// False from a resize until the next draw fills the new buffer.
    drawn: bool,
}

impl Framebuffer {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; (width as usize) * (height as usize)];
        self.drawn = false;
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The last drawn frame, or `None` while the buffer holds nothing shown.
    fn seed_source(&self) -> Option<FrameRef<'_>> {
        self.drawn.then_some(FrameRef {
            pixels: &self.pixels,
            width: self.width,
            height: self.height,
        })
    }
}

struct ViewerApp {
    cfg: Configuration,
    cancel: CancellationToken,
    session: Session<Arc<Generator>>,
    renderer: TiledRenderer,
    window: Option<WindowHandle>,
    context: Option<SoftContext<WindowHandle>>,
    surface: Option<Surface<WindowHandle, WindowHandle>>,
    frame: Framebuffer,
    next_tick: Instant,
    shown_ready: Option<bool>,
    started: bool,
}

impl ViewerApp {
    fn new(cfg: Configuration, cancel: CancellationToken, generator: Arc<Generator>) -> Self {
        let session = Session::new(generator, &cfg);
        let renderer = TiledRenderer::new(cfg.viewer.tile_radius);
        Self {
            cfg,
            cancel,
            session,
            renderer,
            window: None,
            context: None,
            surface: None,
            frame: Framebuffer::default(),
            next_tick: Instant::now(),
            shown_ready: None,
            started: false,
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<WindowHandle> {
        if let Some(window) = self.window.as_ref() {
            return Ok(window.clone());
        }

        let attrs = Window::default_attributes()
            .with_title(self.cfg.viewer.title.clone())
            .with_inner_size(PhysicalSize::new(
                self.cfg.viewer.window_width,
                self.cfg.viewer.window_height,
            ));
        let window = WindowHandle::new(
            event_loop
                .create_window(attrs)
                .context("failed to create viewer window")?,
        );
        let context = SoftContext::new(window.clone())
            .map_err(|err| anyhow::anyhow!("failed to create softbuffer context: {err}"))?;
        let surface = Surface::new(&context, window.clone())
            .map_err(|err| anyhow::anyhow!("failed to create softbuffer surface: {err}"))?;

        self.context = Some(context);
        self.surface = Some(surface);
        self.window = Some(window.clone());
        self.handle_resize(window.inner_size());
        self.grab_cursor(true);
        Ok(window)
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        let width = size.width.max(1);
        let height = size.height.max(1);
        if let Some(surface) = self.surface.as_mut()
            && let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height))
            && let Err(err) = surface.resize(w, h)
        {
            warn!(error = %err, width, height, "failed to resize surface");
        }
        self.frame.resize(width, height);
        debug!(width, height, "viewer resized");
    }

    fn grab_cursor(&self, grab: bool) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let result = if grab {
            window
                .set_cursor_grab(CursorGrabMode::Confined)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked))
        } else {
            window.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(err) = result {
            debug!(error = %err, grab, "cursor grab not supported");
        }
        window.set_cursor_visible(!grab);
    }

    fn apply(&mut self, event_loop: &ActiveEventLoop, action: InputAction) {
        let control = self.session.apply(action, self.frame.seed_source());
        if action == InputAction::TogglePause {
            self.grab_cursor(!self.session.state().flags().paused);
        }
        if control == Control::Exit {
            info!("quit requested while paused");
            event_loop.exit();
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let action = match event.physical_key {
            PhysicalKey::Code(KeyCode::Space) => InputAction::Generate,
            PhysicalKey::Code(KeyCode::Escape) => InputAction::TogglePause,
            PhysicalKey::Code(KeyCode::KeyQ) => InputAction::QuitIfPaused,
            _ => return,
        };
        self.apply(event_loop, action);
    }

    /// One fixed-rate tick: apply finished generations, then redraw unless paused.
    fn tick(&mut self) {
        self.session.drain_outcomes();
        self.update_title();
        if self.session.state().flags().paused {
            return;
        }
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn update_title(&mut self) {
        let ready = self.session.state().flags().ready_for_request;
        if self.shown_ready == Some(ready) {
            return;
        }
        self.shown_ready = Some(ready);
        if let Some(window) = self.window.as_ref() {
            let title = if ready {
                self.cfg.viewer.title.clone()
            } else {
                format!("{} (generating)", self.cfg.viewer.title)
            };
            window.set_title(&title);
        }
    }

    fn draw(&mut self) {
        let state = self.session.state_mut();
        state.begin_frame();
        let camera = state.active_camera();
        let serial = state.image_serial();

        let size = self.frame.size();
        self.frame.pixels.fill(0);
        if let Some(image) = self.session.state().current_image() {
            self.renderer
                .draw(&mut self.frame.pixels, size, image, serial, &camera);
        }
        self.frame.drawn = true;
        self.session.state_mut().mark_image_rendered();

        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        match surface.buffer_mut() {
            Ok(mut buffer) if buffer.len() == self.frame.pixels.len() => {
                buffer.copy_from_slice(&self.frame.pixels);
                if let Err(err) = buffer.present() {
                    error!(error = %err, "failed to present frame");
                }
            }
            Ok(buffer) => {
                debug!(
                    buffer = buffer.len(),
                    frame = self.frame.pixels.len(),
                    "surface size changed under us; skipping frame"
                );
            }
            Err(err) => error!(error = %err, "failed to acquire frame buffer"),
        }
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        if let Err(err) = self.ensure_window(event_loop) {
            error!(error = ?err, "failed to initialize viewer window");
            event_loop.exit();
            return;
        }

        if !self.started {
            self.started = true;
            if self.cfg.generation.generate_on_start {
                self.session.request_generation(None);
            }
        }
        self.next_tick = Instant::now();
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_tick));
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("viewer window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resize(new_size);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.handle_key(event_loop, event);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => (pos.y / PIXELS_PER_LINE) as f32,
                };
                self.session.zoom(lines);
            }
            WindowEvent::RedrawRequested => {
                if !self.session.state().flags().paused {
                    self.draw();
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.session.pan(dx, dy);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }
        let now = Instant::now();
        if now >= self.next_tick {
            self.tick();
            self.next_tick = now + self.cfg.viewer.frame_interval();
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_tick));
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Cancelled => {
                info!("viewer received cancellation event");
                event_loop.exit();
            }
        }
    }
}

/// Run the interactive viewer on the calling (main) thread until the window
/// closes, the user quits, or `cancel` fires.
pub fn run_windowed(
    cfg: Configuration,
    generator: Arc<Generator>,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Cancelled);
        })
    };

    let mut app = ViewerApp::new(cfg, cancel, generator);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();

    run_result.context("viewer event loop failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resized_buffer_is_not_a_seed_source_until_drawn() {
        let mut frame = Framebuffer::default();
        assert!(frame.seed_source().is_none());

        frame.resize(4, 2);
        assert!(frame.seed_source().is_none());

        frame.pixels.fill(0x00ff_00ff);
        frame.drawn = true;
        let seed = frame.seed_source().expect("drawn frame");
        assert_eq!((seed.width, seed.height), (4, 2));
        assert_eq!(seed.pixels.len(), 8);

        frame.resize(8, 8);
        assert!(frame.seed_source().is_none());
        assert_eq!(frame.size(), (8, 8));
    }
}
