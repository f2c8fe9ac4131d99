// SPDX-License-Identifier: CEPL-1.0
//! The viewer window. Events are pumped by the render loop itself instead of
//! handing control to `EventLoop::run_app`, so the frame lifecycle can block on
//! platform events while the window is minimized.
#![deny(unsafe_op_in_unsafe_fn)]
use std::cell::RefCell;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info};
use viewer_math::Movement;
use viewer_render::{PresentationSurface, RenderSize};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    raw_window_handle::{
        DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
    },
    window::{Window, WindowAttributes, WindowId},
};

pub use winit;

#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "viewer".into(),
            width: 800,
            height: 600,
        }
    }
}

/// Movement flag bound to a physical key, if any.
pub fn movement_for_key(code: KeyCode) -> Option<Movement> {
    let m = match code {
        KeyCode::KeyA => Movement::MOVE_LEFT,
        KeyCode::KeyD => Movement::MOVE_RIGHT,
        KeyCode::KeyW => Movement::MOVE_FORWARD,
        KeyCode::KeyS => Movement::MOVE_BACKWARD,
        KeyCode::KeyE => Movement::MOVE_UP,
        KeyCode::KeyQ => Movement::MOVE_DOWN,
        KeyCode::ArrowLeft => Movement::LOOK_LEFT,
        KeyCode::ArrowRight => Movement::LOOK_RIGHT,
        KeyCode::ArrowUp => Movement::LOOK_UP,
        KeyCode::ArrowDown => Movement::LOOK_DOWN,
        _ => return None,
    };
    Some(m)
}

#[derive(Debug, Default)]
struct InputState {
    size: RenderSize,
    resized: bool,
    close_requested: bool,
    held: Movement,
}

impl InputState {
    fn apply_resize(&mut self, size: RenderSize) {
        if size != self.size {
            self.size = size;
            self.resized = true;
        }
    }

    fn apply_key(&mut self, code: KeyCode, pressed: bool) {
        if code == KeyCode::Escape && pressed {
            self.close_requested = true;
        } else if let Some(m) = movement_for_key(code) {
            self.held.set(m, pressed);
        }
    }

    fn apply(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                self.apply_resize(to_render_size(size));
                debug!("Resized → {}", self.size);
            }
            WindowEvent::Focused(false) => self.held = Movement::empty(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => self.apply_key(code, state == ElementState::Pressed),
            _ => {}
        }
    }
}

fn to_render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize::new(size.width, size.height)
}

/// Handler for a single `pump_app_events` call.
struct Pump<'a> {
    input: &'a mut InputState,
    window_id: Option<WindowId>,
    create: Option<WindowAttributes>,
    created: Option<Result<Window>>,
}

impl ApplicationHandler for Pump<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(attributes) = self.create.take() {
            let window = event_loop
                .create_window(attributes)
                .map_err(|e| anyhow!("create_window: {e}"));
            self.created = Some(window);
        }
    }

    fn window_event(&mut self, _: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self.window_id.is_some_and(|id| id != window_id) {
            return;
        }
        self.input.apply(event);
    }
}

pub struct ViewerWindow {
    window: Window,
    input: RefCell<InputState>,
    event_loop: RefCell<EventLoop<()>>,
}

impl ViewerWindow {
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new().context("creating event loop")?;
        let mut input = InputState::default();
        let mut pump = Pump {
            input: &mut input,
            window_id: None,
            create: Some(
                Window::default_attributes()
                    .with_title(config.title.as_str())
                    .with_inner_size(PhysicalSize::new(config.width, config.height)),
            ),
            created: None,
        };

        let window = loop {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut pump);
            if let Some(created) = pump.created.take() {
                break created?;
            }
            if let PumpStatus::Exit(code) = status {
                bail!("event loop exited ({code}) before the window was created");
            }
        };

        input.size = to_render_size(window.inner_size());
        input.resized = false;
        info!("window created: {} \"{}\"", input.size, config.title);

        Ok(Self {
            window,
            input: RefCell::new(input),
            event_loop: RefCell::new(event_loop),
        })
    }

    fn pump(&self, timeout: Option<Duration>) -> bool {
        let mut input = self.input.borrow_mut();
        let mut pump = Pump {
            input: &mut input,
            window_id: Some(self.window.id()),
            create: None,
            created: None,
        };
        let status = self
            .event_loop
            .borrow_mut()
            .pump_app_events(timeout, &mut pump);
        if let PumpStatus::Exit(code) = status {
            debug!("event loop exit ({code})");
            input.close_requested = true;
        }
        !input.close_requested
    }

    /// Handles pending events without blocking. `false` once the window should close.
    pub fn poll_events(&self) -> bool {
        self.pump(Some(Duration::ZERO))
    }

    pub fn movement(&self) -> Movement {
        self.input.borrow().held
    }

    pub fn should_close(&self) -> bool {
        self.input.borrow().close_requested
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl PresentationSurface for ViewerWindow {
    fn drawable_size(&self) -> RenderSize {
        to_render_size(self.window.inner_size())
    }

    fn was_resized(&self) -> bool {
        self.input.borrow().resized
    }

    fn reset_resized_flag(&self) {
        self.input.borrow_mut().resized = false;
    }

    fn wait_events(&self) {
        self.pump(None);
    }

    fn is_closing(&self) -> bool {
        self.should_close()
    }
}

impl HasWindowHandle for ViewerWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for ViewerWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}
