use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::keyboard::KeyCode;
use winit::window::{CursorGrabMode, Fullscreen, Window};

use super::Args;
use super::hud::Hud;
use crate::camera::Camera;
use crate::compositor::{FrameCompositor, SceneConfig};
use crate::controls::{self, ControlAction, Controls};
use crate::gfx::{GfxError, ShaderLibrary, WgpuDevice};
use crate::input::InputContext;
use crate::settings::SceneSettings;

/// Scroll lines to degrees of field of view
const ZOOM_PER_LINE: f32 = 2.0;

pub struct State {
    pub window: Arc<Window>,
    device: WgpuDevice,
    scene: FrameCompositor<WgpuDevice>,
    camera: Camera,
    input: InputContext,
    controls: Controls,
    hud: Hud,
    rng: StdRng,
    settings_path: PathBuf,

    start_time: Instant,
    last_update: Instant,
    pub frame_count: u32,
    pub last_fps_update: Instant,
    pub current_fps: f32,
}

impl State {
    pub async fn new(window: Arc<Window>, args: &Args) -> Result<Self, GfxError> {
        let mut device = WgpuDevice::new(window.clone(), args.vsync).await?;
        let (width, height) = device.size();
        let shaders = ShaderLibrary::new(args.shader_dir.clone());

        let mut scene = FrameCompositor::new(
            &mut device,
            &shaders,
            SceneConfig {
                width,
                height,
                seed: args.seed,
                ..Default::default()
            },
        );
        let mut camera = Camera::default();

        let settings_path = args.settings.clone().unwrap_or_else(crate::settings::default_path);
        if settings_path.exists() {
            match SceneSettings::load(&settings_path) {
                Ok(settings) => settings.apply(&mut device, &mut scene, &mut camera),
                Err(e) => tracing::warn!("Ignoring settings at {}: {}", settings_path.display(), e),
            }
        }

        let hud = Hud::new(&device);
        let rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        let now = Instant::now();

        Ok(Self {
            window,
            device,
            scene,
            camera,
            input: InputContext::default(),
            controls: Controls::default(),
            hud,
            rng,
            settings_path,
            start_time: now,
            last_update: now,
            frame_count: 0,
            last_fps_update: now,
            current_fps: 0.0,
        })
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.device.resize(size.width, size.height);
        self.scene.resize(&mut self.device, size.width, size.height);
        self.hud.resize(self.device.queue(), size.width, size.height);
    }

    pub fn mouse_captured(&self) -> bool {
        self.input.mouse_captured()
    }

    pub fn capture_mouse(&mut self) {
        self.input.set_mouse_captured(true);
        let _ = self
            .window
            .set_cursor_grab(CursorGrabMode::Confined)
            .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Locked));
        self.window.set_cursor_visible(false);
        let (width, height) = self.device.size();
        let _ = self
            .window
            .set_cursor_position(PhysicalPosition::new(width / 2, height / 2));
    }

    pub fn release_mouse(&mut self) {
        self.input.set_mouse_captured(false);
        let _ = self.window.set_cursor_grab(CursorGrabMode::None);
        self.window.set_cursor_visible(true);
    }

    pub fn mouse_motion(&mut self, dx: f64, dy: f64) {
        self.input.mouse_motion(dx, dy);
    }

    pub fn scroll(&mut self, lines: f32) {
        self.input.scroll(lines);
    }

    pub fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        if self.input.keys.handle_key(key, pressed) || !pressed {
            return;
        }

        match key {
            KeyCode::Escape if self.mouse_captured() => self.release_mouse(),
            KeyCode::F11 => {
                if self.window.fullscreen().is_some() {
                    self.window.set_fullscreen(None);
                } else {
                    self.window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                }
            }
            _ => {
                if let Some(action) = ControlAction::from_key(key) {
                    self.apply(action);
                }
            }
        }
    }

    fn apply(&mut self, action: ControlAction) {
        match action {
            ControlAction::SaveSettings => {
                let settings = SceneSettings::capture(&self.scene, &self.camera);
                if let Err(e) = settings.save(&self.settings_path) {
                    tracing::error!("Failed to save settings: {}", e);
                }
            }
            ControlAction::LoadSettings => match SceneSettings::load(&self.settings_path) {
                Ok(settings) => settings.apply(&mut self.device, &mut self.scene, &mut self.camera),
                Err(e) => tracing::error!("Failed to load settings: {}", e),
            },
            action => self.controls.apply(
                action,
                &mut self.device,
                &mut self.scene,
                &mut self.camera,
                &mut self.rng,
            ),
        }
    }

    pub fn update(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;

        let (dx, dy) = self.input.take_look();
        self.camera.rotate(dx, dy);
        self.camera.zoom_by(self.input.take_scroll() * ZOOM_PER_LINE);
        self.camera.update(dt, &self.input.keys);
        self.scene.clouds.update(dt);
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        self.device.begin_frame()?;

        let (width, height) = self.device.size();
        let camera = self.camera.snapshot(width, height);
        let time = self.start_time.elapsed().as_secs_f32();
        self.scene.render_frame(&mut self.device, &camera, time);

        if self.controls.hud_visible {
            let lines = controls::status_lines(&self.scene, self.current_fps);
            self.hud.draw(&mut self.device, &lines);
        }

        self.device.end_frame();
        self.hud.trim();
        Ok(())
    }
}
