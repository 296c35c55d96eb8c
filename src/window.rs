use std::{
    sync::{mpsc::Receiver, Arc},
    time::{Duration, Instant},
};

use anyhow::Context;
use glam::Vec2;
use sceneview::{
    demo::SyntheticPlayer,
    error::RenderError,
    extensions::{PublishEvent, ToolKind},
    rendering::{GpuOptions, SceneRenderer},
    Renderer, RendererConfig,
};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

const PLAYER_INTERVAL: Duration = Duration::from_millis(100);
// Cursor travel in pixels below which a press and release count as a click
const CLICK_SLOP: f32 = 3.0;

struct App {
    config_path: Option<String>,
    window: Option<Arc<Window>>,
    renderer: Renderer,
    publish: Receiver<PublishEvent>,
    player: SyntheticPlayer,
    start: Instant,
    last_batch: Option<Instant>,
    mouse_pos: Vec2,
    press_pos: Option<Vec2>,
    dragged: bool,
}

impl App {
    fn new(config: RendererConfig, config_path: Option<String>) -> Self {
        let mut renderer = Renderer::new(config);
        renderer.set_topics(SyntheticPlayer::topics());
        let publish = renderer.subscribe_publish();
        Self {
            config_path,
            window: None,
            renderer,
            publish,
            player: SyntheticPlayer::new(0x5eed),
            start: Instant::now(),
            last_batch: None,
            mouse_pos: Vec2::ZERO,
            press_pos: None,
            dragged: false,
        }
    }

    fn save_config(&mut self) {
        let Some(path) = &self.config_path else {
            return;
        };
        let result = self
            .renderer
            .config_json()
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(path, json).map_err(anyhow::Error::from));
        match result {
            Ok(()) => log::info!("Saved config to {path}"),
            Err(err) => log::error!("Failed to save config to {path}: {err:#}"),
        }
    }

    fn tick(&mut self, event_loop: &ActiveEventLoop) {
        let now = self.start.elapsed().as_nanos() as u64;
        self.renderer.set_current_time(now);
        if self
            .last_batch
            .is_none_or(|last| last.elapsed() >= PLAYER_INTERVAL)
        {
            self.renderer.add_message_events(self.player.batch(now));
            self.last_batch = Some(Instant::now());
        }

        match self.renderer.animation_frame() {
            Ok(()) => {}
            Err(RenderError::Surface(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                if let Some(gpu) = self.renderer.gpu_mut() {
                    gpu.reconfigure();
                }
            }
            Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                log::error!("Out of memory");
                event_loop.exit();
            }
            Err(RenderError::Surface(wgpu::SurfaceError::Timeout)) => {
                log::warn!("Timeout");
            }
            Err(other) => {
                log::error!("Unexpected error: {other}");
            }
        }

        for event in self.publish.try_iter() {
            log::info!("Published {event:?}");
        }
    }

    fn click(&mut self) {
        match self.renderer.handle_click(self.mouse_pos) {
            Ok(Some(picked)) => log::info!(
                "Picked {} ({}) instance {:?}: {}",
                picked.name,
                picked.extension_id,
                picked.instance_index,
                picked.details
            ),
            Ok(None) => log::debug!("Nothing picked at {}", self.mouse_pos),
            Err(err) => log::error!("Picking failed: {err}"),
        }
    }

    fn key(&mut self, event: KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        match event.logical_key.as_ref() {
            Key::Character("d") => {
                let enabled = !self.renderer.debug_picking();
                log::info!("Debug picking {}", if enabled { "on" } else { "off" });
                self.renderer.set_debug_picking(enabled);
            }
            Key::Character("m") => self.renderer.set_active_tool(Some(ToolKind::Measure)),
            Key::Character("p") => self.renderer.set_active_tool(Some(ToolKind::Publish)),
            Key::Named(NamedKey::Escape) => self.renderer.set_active_tool(None),
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes().with_title("sceneview");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(SceneRenderer::for_window(window.clone(), &GpuOptions::default())) {
            Ok(gpu) => self.renderer.attach_gpu(gpu),
            Err(err) => {
                log::error!("Failed to initialize GPU: {err}");
                event_loop.exit();
                return;
            }
        }
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.save_config();
                self.renderer.dispose();
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                self.renderer.resize(new_size.width, new_size.height);
            }
            WindowEvent::RedrawRequested => {
                self.tick(event_loop);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = Vec2::new(position.x as f32, position.y as f32);
                if let Some(press) = self.press_pos {
                    if self.dragged || press.distance(position) > CLICK_SLOP {
                        self.dragged = true;
                        let delta = position - self.mouse_pos;
                        self.renderer.camera_mut().state.orbit(delta);
                    }
                }
                self.mouse_pos = position;
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    self.press_pos = Some(self.mouse_pos);
                    self.dragged = false;
                }
                ElementState::Released => {
                    if self.press_pos.take().is_some() && !self.dragged {
                        self.click();
                    }
                }
            },
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y as f64,
                    MouseScrollDelta::PixelDelta(position) => position.y / 40.0,
                };
                self.renderer.camera_mut().state.zoom(0.9f64.powf(lines));
            }
            WindowEvent::KeyboardInput { event, .. } => self.key(event),
            _ => (),
        }
    }
}

pub async fn run(config_path: Option<String>) -> anyhow::Result<()> {
    let config = match &config_path {
        Some(path) if std::path::Path::new(path).exists() => {
            RendererConfig::load(path).with_context(|| format!("Failed to load config {path}"))?
        }
        _ => RendererConfig::default(),
    };
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config, config_path);
    event_loop.run_app(&mut app)?;

    Ok(())
}
