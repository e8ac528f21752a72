//! Volumetric cloud layer: noise generation, preset logic and raymarching.

pub mod noise;
pub mod params;
pub mod raymarcher;

pub use noise::{NoiseKind, NoiseVolumeGenerator, NoiseVolumes, WeatherUniforms};
pub use params::{CloudParameters, CloudType};
pub use raymarcher::{CLOUD_BLEND, CloudFrame, CloudRaymarcher, CloudUniforms};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::camera::CameraState;
use crate::compositor::OffscreenTarget;
use crate::constants::CLOUD_TYPE_POPUP_SECONDS;
use crate::diagnostics::{self, DiagnosticKind};
use crate::environment::{Environment, EnvironmentLayer};
use crate::gfx::{GraphicsDevice, ShaderLibrary, TexelFormat};

/// Owns everything the clouds need on the GPU. The noise volumes and the
/// offscreen target are written by this layer only; the environment texture
/// is borrowed read-only at render time.
pub struct CloudLayer<D: GraphicsDevice> {
    params: CloudParameters,
    generator: NoiseVolumeGenerator<D>,
    volumes: NoiseVolumes<D>,
    raymarcher: CloudRaymarcher<D>,
    target: OffscreenTarget<D>,
    rng: StdRng,
    popup_remaining: f32,
}

impl<D: GraphicsDevice> CloudLayer<D> {
    /// Builds the programs, allocates the textures and fills them. `seed`
    /// fixes the preset draws; `None` seeds from the OS.
    pub fn new(
        device: &mut D,
        shaders: &ShaderLibrary,
        width: u32,
        height: u32,
        seed: Option<u64>,
    ) -> Self {
        let params = CloudParameters::default();
        let generator = NoiseVolumeGenerator::new(device, shaders);
        let volumes = NoiseVolumes::allocate(device);

        generator.generate_volumes(device, &volumes);
        generator.regenerate_weather_map(device, &volumes, params.cloud_type());

        Self {
            raymarcher: CloudRaymarcher::new(device, shaders),
            target: OffscreenTarget::new(device, "Clouds", width, height, TexelFormat::Rgba16Float),
            rng: StdRng::seed_from_u64(seed.unwrap_or_else(rand::random)),
            popup_remaining: 0.0,
            params,
            generator,
            volumes,
        }
    }

    pub fn params(&self) -> &CloudParameters {
        &self.params
    }

    /// Continuous knobs. The cloud type is not reachable from here; use
    /// [`CloudLayer::set_cloud_type`].
    pub fn params_mut(&mut self) -> &mut CloudParameters {
        &mut self.params
    }

    pub fn volumes(&self) -> &NoiseVolumes<D> {
        &self.volumes
    }

    /// Applies a preset and regenerates the weather map when it changed.
    pub fn set_cloud_type(&mut self, device: &mut D, cloud_type: CloudType) -> bool {
        if !self.params.set_cloud_type(cloud_type, &mut self.rng) {
            return false;
        }
        self.generator
            .regenerate_weather_map(device, &self.volumes, cloud_type);
        true
    }

    /// Keyboard path: same change detection, plus the on-screen notice.
    pub fn select_cloud_type(&mut self, device: &mut D, cloud_type: CloudType) -> bool {
        let changed = self.set_cloud_type(device, cloud_type);
        if changed {
            self.popup_remaining = CLOUD_TYPE_POPUP_SECONDS;
        }
        changed
    }

    /// Replaces every parameter at once, as when restoring saved settings.
    /// The stored type skips the preset draw but still needs a fresh map.
    pub fn apply_parameters(&mut self, device: &mut D, params: CloudParameters) {
        let stale = params.cloud_type() != self.params.cloud_type();
        self.params = params;
        if stale {
            self.generator
                .regenerate_weather_map(device, &self.volumes, self.params.cloud_type());
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.popup_remaining = (self.popup_remaining - dt).max(0.0);
    }

    /// The type to announce on screen, while the notice is showing.
    pub fn popup(&self) -> Option<CloudType> {
        (self.popup_remaining > 0.0).then(|| self.params.cloud_type())
    }

    pub fn resize(&mut self, device: &mut D, width: u32, height: u32) {
        self.target.resize(device, width, height);
    }

    /// Lighting comes from the environment's sky. Without a skybox the
    /// clouds still draw, unlit, and the problem is reported.
    pub fn render(
        &self,
        device: &mut D,
        camera: &CameraState,
        environment: Option<&EnvironmentLayer<D>>,
        time: f32,
    ) {
        let sky = match environment.map(EnvironmentLayer::environment) {
            Some(Environment::Skybox(sky)) => Some(sky),
            Some(other) => {
                diagnostics::report(
                    DiagnosticKind::Mismatch,
                    format!("clouds need a Skybox environment to light them, found {}", other.name()),
                );
                None
            }
            None => {
                diagnostics::report(DiagnosticKind::Binding, "clouds rendered with no environment bound");
                None
            }
        };

        let frame = CloudFrame {
            camera,
            sky,
            environment_texture: environment.map(|layer| layer.texture(&*device)),
            time,
        };
        self.raymarcher
            .render(device, &self.target, &self.volumes, &self.params, &frame);
    }
}
