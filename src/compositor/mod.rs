//! Layer ownership and the fixed per-frame draw order.

pub mod target;

pub use target::{OffscreenTarget, TargetBinding};

use crate::camera::CameraState;
use crate::clouds::CloudLayer;
use crate::environment::{Environment, EnvironmentLayer};
use crate::gfx::{GraphicsDevice, ShaderLibrary};
use crate::terrain::{TerrainLayer, TerrainParameters};

/// Screen clear color, also the alpha the cloud composite sees where no
/// layer wrote anything.
const SCREEN_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Everything needed to build a compositor.
pub struct SceneConfig {
    pub width: u32,
    pub height: u32,
    pub environment: Environment,
    pub terrain: TerrainParameters,
    pub seed: Option<u64>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: crate::constants::WINDOW_WIDTH,
            height: crate::constants::WINDOW_HEIGHT,
            environment: Environment::default(),
            terrain: TerrainParameters::default(),
            seed: None,
        }
    }
}

/// Draws environment, terrain and clouds in that order. The environment
/// renders first into its own target, which the clouds then sample.
pub struct FrameCompositor<D: GraphicsDevice> {
    pub environment: EnvironmentLayer<D>,
    pub terrain: TerrainLayer<D>,
    pub clouds: CloudLayer<D>,
    /// When false the cloud layer renders with no environment bound.
    pub bind_environment: bool,
    size: (u32, u32),
}

impl<D: GraphicsDevice> FrameCompositor<D> {
    pub fn new(device: &mut D, shaders: &ShaderLibrary, config: SceneConfig) -> Self {
        let SceneConfig {
            width,
            height,
            environment,
            terrain,
            seed,
        } = config;

        let environment = EnvironmentLayer::new(device, shaders, environment, width, height);
        let terrain = TerrainLayer::new(device, shaders, terrain);
        let clouds = CloudLayer::new(device, shaders, width, height, seed);
        tracing::info!("Scene layers created at {}x{}", width, height);

        Self {
            environment,
            terrain,
            clouds,
            bind_environment: true,
            size: (width, height),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Recreates every offscreen target. Zero-sized viewports (minimised
    /// windows) are ignored.
    pub fn resize(&mut self, device: &mut D, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.environment.resize(device, width, height);
        self.clouds.resize(device, width, height);
        self.size = (width, height);
    }

    /// Renders one frame onto the default framebuffer.
    pub fn render_frame(&self, device: &mut D, camera: &CameraState, time: f32) {
        device.unbind_target();
        device.clear(SCREEN_CLEAR);

        self.environment.render(device, camera);
        self.terrain.render(device, camera);

        let environment = self.bind_environment.then_some(&self.environment);
        self.clouds.render(device, camera, environment, time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::diagnostics::{self, DiagnosticKind};
    use crate::gfx::{Command, RasterState, RecordingDevice};

    fn compositor(device: &mut RecordingDevice) -> FrameCompositor<RecordingDevice> {
        let shaders = ShaderLibrary::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/shaders"));
        FrameCompositor::new(
            device,
            &shaders,
            SceneConfig {
                width: 320,
                height: 180,
                seed: Some(5),
                ..Default::default()
            },
        )
    }

    fn draw_labels(device: &RecordingDevice) -> Vec<String> {
        device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawFullscreen { program, .. } | Command::DrawMesh { program, .. } => {
                    Some(program.clone())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn layers_draw_in_fixed_order() {
        let mut device = RecordingDevice::new();
        let scene = compositor(&mut device);
        let camera = Camera::default().snapshot(320, 180);
        device.take_commands();

        scene.render_frame(&mut device, &camera, 0.0);
        assert_eq!(
            draw_labels(&device),
            ["Sky", "Environment Blit", "Terrain", "Clouds Raymarch", "Clouds Composite"]
        );
    }

    #[test]
    fn frame_starts_by_clearing_the_screen() {
        let mut device = RecordingDevice::new();
        let scene = compositor(&mut device);
        let camera = Camera::default().snapshot(320, 180);
        device.take_commands();

        scene.render_frame(&mut device, &camera, 0.0);
        assert_eq!(
            &device.commands()[..2],
            &[Command::UnbindTarget, Command::Clear { target: None }]
        );
    }

    #[test]
    fn frame_ends_on_screen_with_default_state() {
        let mut device = RecordingDevice::new();
        let scene = compositor(&mut device);
        let camera = Camera::default().snapshot(320, 180);

        scene.render_frame(&mut device, &camera, 0.0);
        let binds = device.count(|c| matches!(c, Command::BindTarget { .. }));
        let unbinds = device.count(|c| matches!(c, Command::UnbindTarget));
        assert!(unbinds > binds);
        assert_eq!(device.raster_state(), RasterState::default());
    }

    #[test]
    fn unbound_environment_degrades_without_panicking() {
        let mut device = RecordingDevice::new();
        let mut scene = compositor(&mut device);
        let camera = Camera::default().snapshot(320, 180);
        scene.bind_environment = false;
        diagnostics::drain();

        scene.render_frame(&mut device, &camera, 0.0);
        assert_eq!(diagnostics::count(DiagnosticKind::Binding), 1);
        assert!(draw_labels(&device).contains(&"Clouds Composite".to_string()));
    }

    #[test]
    fn resize_ignores_zero_and_tracks_size() {
        let mut device = RecordingDevice::new();
        let mut scene = compositor(&mut device);

        scene.resize(&mut device, 0, 100);
        assert_eq!(scene.size(), (320, 180));
        scene.resize(&mut device, 640, 360);
        assert_eq!(scene.size(), (640, 360));
    }
}
