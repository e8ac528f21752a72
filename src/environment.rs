//! The scene background and the sun that lights it.
//!
//! Exactly one [`Environment`] is active per scene. Its sky variant carries
//! the [`SkyParameters`] that both the sky shader and the cloud shader read,
//! so the two stay lit by the same sun.

use std::f32::consts::{FRAC_PI_2, PI};

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::CameraState;
use crate::compositor::OffscreenTarget;
use crate::constants::*;
use crate::gfx::{GraphicsDevice, ProgramDesc, ProgramKind, ShaderLibrary, TexelFormat, TextureDimension};

/// Sun and atmosphere state.
///
/// Accessors accept any value: the documented ranges (altitude [0,1],
/// azimuth [-1,1], intensity [10,30]) are what the controls offer, not
/// something enforced here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyParameters {
    sun_altitude: f32,
    sun_azimuth: f32,
    sun_intensity: f32,
    sun_color_day: Vec3,
    sun_color_sunset: Vec3,
    pub gamma_contrast: bool,
    pub vignette: bool,

    pub earth_radius: f32,
    pub atmosphere_radius: f32,
    pub rayleigh_scale_height: f32,
    pub mie_scale_height: f32,
    pub rayleigh_scattering: Vec3,
    pub mie_scattering: f32,
}

impl Default for SkyParameters {
    fn default() -> Self {
        Self {
            sun_altitude: 0.5,
            sun_azimuth: 0.0,
            sun_intensity: 22.0,
            sun_color_day: Vec3::new(1.0, 0.96, 0.9),
            sun_color_sunset: Vec3::new(1.0, 0.45, 0.2),
            gamma_contrast: true,
            vignette: false,
            earth_radius: EARTH_RADIUS,
            atmosphere_radius: ATMOSPHERE_RADIUS,
            rayleigh_scale_height: RAYLEIGH_SCALE_HEIGHT,
            mie_scale_height: MIE_SCALE_HEIGHT,
            rayleigh_scattering: Vec3::from_array(RAYLEIGH_SCATTERING),
            mie_scattering: MIE_SCATTERING,
        }
    }
}

impl SkyParameters {
    pub fn sun_altitude(&self) -> f32 {
        self.sun_altitude
    }

    pub fn set_sun_altitude(&mut self, altitude: f32) {
        self.sun_altitude = altitude;
    }

    pub fn sun_azimuth(&self) -> f32 {
        self.sun_azimuth
    }

    pub fn set_sun_azimuth(&mut self, azimuth: f32) {
        self.sun_azimuth = azimuth;
    }

    pub fn sun_intensity(&self) -> f32 {
        self.sun_intensity
    }

    pub fn set_sun_intensity(&mut self, intensity: f32) {
        self.sun_intensity = intensity;
    }

    pub fn sun_color_day(&self) -> Vec3 {
        self.sun_color_day
    }

    pub fn set_sun_color_day(&mut self, color: Vec3) {
        self.sun_color_day = color;
    }

    pub fn sun_color_sunset(&self) -> Vec3 {
        self.sun_color_sunset
    }

    pub fn set_sun_color_sunset(&mut self, color: Vec3) {
        self.sun_color_sunset = color;
    }

    /// Unit vector towards the sun. Altitude 0 is the horizon and 1 the
    /// zenith; azimuth ±1 is half a turn either way. Must agree with
    /// `sun_direction` in `sky/sun.wgsl`.
    pub fn sun_direction(&self) -> Vec3 {
        let elevation = self.sun_altitude * FRAC_PI_2;
        let azimuth = self.sun_azimuth * PI;
        Vec3::new(
            elevation.cos() * azimuth.sin(),
            elevation.sin(),
            -elevation.cos() * azimuth.cos(),
        )
    }
}

/// Active scene background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Environment {
    /// Flat clear color
    Color { color: Vec3 },
    /// Vertical blend from `bottom` at the horizon line to `top`
    Gradient { top: Vec3, bottom: Vec3 },
    /// Raymarched single-scattering atmosphere
    Skybox(SkyParameters),
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Skybox(SkyParameters::default())
    }
}

impl Environment {
    pub fn name(&self) -> &'static str {
        match self {
            Environment::Color { .. } => "Color",
            Environment::Gradient { .. } => "Gradient",
            Environment::Skybox(_) => "Skybox",
        }
    }

    pub fn sky(&self) -> Option<&SkyParameters> {
        match self {
            Environment::Skybox(sky) => Some(sky),
            _ => None,
        }
    }

    pub fn sky_mut(&mut self) -> Option<&mut SkyParameters> {
        match self {
            Environment::Skybox(sky) => Some(sky),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SkyUniforms {
    pub inverse_projection: [[f32; 4]; 4],
    pub inverse_view: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub sun_intensity: f32,
    pub sun_color_day: [f32; 3],
    pub earth_radius: f32,
    pub sun_color_sunset: [f32; 3],
    pub atmosphere_radius: f32,
    pub rayleigh_scattering: [f32; 3],
    pub rayleigh_scale_height: f32,
    pub resolution: [f32; 2],
    pub sun_altitude: f32,
    pub sun_azimuth: f32,
    pub mie_scattering: f32,
    pub mie_scale_height: f32,
    pub gamma_contrast: u32,
    pub vignette: u32,
}

impl SkyUniforms {
    pub fn new(camera: &CameraState, sky: &SkyParameters) -> Self {
        Self {
            inverse_projection: camera.inverse_projection().to_cols_array_2d(),
            inverse_view: camera.inverse_view().to_cols_array_2d(),
            camera_position: camera.position.to_array(),
            sun_intensity: sky.sun_intensity,
            sun_color_day: sky.sun_color_day.to_array(),
            earth_radius: sky.earth_radius,
            sun_color_sunset: sky.sun_color_sunset.to_array(),
            atmosphere_radius: sky.atmosphere_radius,
            rayleigh_scattering: sky.rayleigh_scattering.to_array(),
            rayleigh_scale_height: sky.rayleigh_scale_height,
            resolution: camera.resolution(),
            sun_altitude: sky.sun_altitude,
            sun_azimuth: sky.sun_azimuth,
            mie_scattering: sky.mie_scattering,
            mie_scale_height: sky.mie_scale_height,
            gamma_contrast: sky.gamma_contrast as u32,
            vignette: sky.vignette as u32,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GradientUniforms {
    pub inverse_projection: [[f32; 4]; 4],
    pub inverse_view: [[f32; 4]; 4],
    pub top: [f32; 3],
    pub _pad0: f32,
    pub bottom: [f32; 3],
    pub _pad1: f32,
}

/// Renders the environment into its own target, then shows it on screen.
/// The target's color attachment is what later layers sample as the
/// environment texture.
pub struct EnvironmentLayer<D: GraphicsDevice> {
    environment: Environment,
    target: OffscreenTarget<D>,
    sky_program: Option<D::Program>,
    gradient_program: Option<D::Program>,
    blit_program: Option<D::Program>,
}

impl<D: GraphicsDevice> EnvironmentLayer<D> {
    pub fn new(
        device: &mut D,
        shaders: &ShaderLibrary,
        environment: Environment,
        width: u32,
        height: u32,
    ) -> Self {
        let sky_desc =
            ProgramDesc::new("Sky", "sky/sky.wgsl", ProgramKind::Screen).with_uniforms::<SkyUniforms>();
        let gradient_desc = ProgramDesc::new("Gradient", "sky/gradient.wgsl", ProgramKind::Screen)
            .with_uniforms::<GradientUniforms>();
        let blit_desc = ProgramDesc::new("Environment Blit", "screen/blit.wgsl", ProgramKind::Screen)
            .sampled(SCREEN_UNIT, TextureDimension::D2);

        Self {
            environment,
            target: OffscreenTarget::new(device, "Environment", width, height, TexelFormat::Rgba16Float),
            sky_program: shaders.build(device, &sky_desc),
            gradient_program: shaders.build(device, &gradient_desc),
            blit_program: shaders.build(device, &blit_desc),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn set_environment(&mut self, environment: Environment) {
        tracing::info!("Environment switched to {}", environment.name());
        self.environment = environment;
    }

    pub fn texture(&self, device: &D) -> &D::Texture {
        self.target.color(device)
    }

    pub fn resize(&mut self, device: &mut D, width: u32, height: u32) {
        self.target.resize(device, width, height);
    }

    pub fn render(&self, device: &mut D, camera: &CameraState) {
        {
            let mut bound = self.target.bind(device);
            let device = &mut *bound;
            device.set_depth_test(false);

            match &self.environment {
                Environment::Color { color } => {
                    device.clear([color.x, color.y, color.z, 1.0]);
                }
                Environment::Gradient { top, bottom } => {
                    device.clear([bottom.x, bottom.y, bottom.z, 1.0]);
                    if let Some(program) = &self.gradient_program {
                        let uniforms = GradientUniforms {
                            inverse_projection: camera.inverse_projection().to_cols_array_2d(),
                            inverse_view: camera.inverse_view().to_cols_array_2d(),
                            top: top.to_array(),
                            _pad0: 0.0,
                            bottom: bottom.to_array(),
                            _pad1: 0.0,
                        };
                        device.use_program(program);
                        device.set_uniforms(bytemuck::bytes_of(&uniforms));
                        device.draw_fullscreen(None);
                    }
                }
                Environment::Skybox(sky) => {
                    device.clear([0.0, 0.0, 0.0, 1.0]);
                    if let Some(program) = &self.sky_program {
                        device.use_program(program);
                        device.set_uniforms(bytemuck::bytes_of(&SkyUniforms::new(camera, sky)));
                        device.draw_fullscreen(None);
                    }
                }
            }
            device.set_depth_test(true);
        }

        // back on the default framebuffer
        if let Some(program) = &self.blit_program {
            device.set_depth_test(false);
            device.use_program(program);
            let color = self.target.color(device);
            device.draw_fullscreen(Some(color));
            device.set_depth_test(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::gfx::{Command, RecordingDevice};

    fn library() -> ShaderLibrary {
        ShaderLibrary::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/shaders"))
    }

    #[test]
    fn accessors_accept_out_of_range_values() {
        let mut sky = SkyParameters::default();
        sky.set_sun_altitude(3.0);
        sky.set_sun_azimuth(-7.5);
        sky.set_sun_intensity(1000.0);
        assert_eq!(sky.sun_altitude(), 3.0);
        assert_eq!(sky.sun_azimuth(), -7.5);
        assert_eq!(sky.sun_intensity(), 1000.0);
    }

    #[test]
    fn sun_direction_spans_horizon_to_zenith() {
        let mut sky = SkyParameters::default();
        sky.set_sun_altitude(1.0);
        assert!((sky.sun_direction() - Vec3::Y).length() < 1e-5);

        sky.set_sun_altitude(0.0);
        sky.set_sun_azimuth(0.0);
        assert!((sky.sun_direction() - Vec3::NEG_Z).length() < 1e-5);

        sky.set_sun_altitude(0.37);
        sky.set_sun_azimuth(0.61);
        assert!((sky.sun_direction().length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn only_skybox_exposes_sky_parameters() {
        assert!(Environment::default().sky().is_some());
        assert!(Environment::Color { color: Vec3::ONE }.sky().is_none());
        assert!(
            Environment::Gradient {
                top: Vec3::Z,
                bottom: Vec3::ONE
            }
            .sky()
            .is_none()
        );
    }

    #[test]
    fn environment_renders_offscreen_then_blits() {
        let mut device = RecordingDevice::new();
        let layer = EnvironmentLayer::new(&mut device, &library(), Environment::default(), 320, 180);
        let camera = Camera::default().snapshot(320, 180);
        device.take_commands();

        layer.render(&mut device, &camera);
        let draws: Vec<_> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawFullscreen {
                    program, target, ..
                } => Some((program.clone(), target.is_some())),
                _ => None,
            })
            .collect();
        assert_eq!(
            draws,
            vec![("Sky".to_string(), true), ("Environment Blit".to_string(), false)]
        );
        assert_eq!(device.raster_state(), crate::gfx::RasterState::default());
    }

    #[test]
    fn color_environment_only_clears() {
        let mut device = RecordingDevice::new();
        let layer = EnvironmentLayer::new(
            &mut device,
            &library(),
            Environment::Color {
                color: Vec3::new(0.2, 0.3, 0.4),
            },
            64,
            64,
        );
        let camera = Camera::default().snapshot(64, 64);
        device.take_commands();

        layer.render(&mut device, &camera);
        assert_eq!(
            device.count(|c| matches!(c, Command::DrawFullscreen { program, .. } if program == "Sky")),
            0
        );
        assert_eq!(device.count(|c| matches!(c, Command::Clear { target: Some(_) })), 1);
    }
}
