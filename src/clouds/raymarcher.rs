use bytemuck::{Pod, Zeroable};

use super::noise::NoiseVolumes;
use super::params::CloudParameters;
use crate::camera::CameraState;
use crate::compositor::OffscreenTarget;
use crate::constants::*;
use crate::environment::SkyParameters;
use crate::gfx::{
    BlendFactor, BlendFunc, GraphicsDevice, MemoryBarrier, ProgramDesc, ProgramKind,
    ShaderLibrary, TextureDimension,
};

/// `result = src * dst_alpha + dst * src_alpha`. The cloud pass writes
/// transmittance to alpha, and whatever is already on screen decides through
/// its own alpha how much cloud light it lets through: the sky writes 1,
/// terrain writes 0.
pub const CLOUD_BLEND: BlendFunc = BlendFunc::new(BlendFactor::DstAlpha, BlendFactor::SrcAlpha);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CloudUniforms {
    // Camera
    pub inverse_projection: [[f32; 4]; 4],
    pub inverse_view: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub time: f32,
    pub resolution: [f32; 2],
    pub sun_altitude: f32,
    pub sun_azimuth: f32,

    // Sun
    pub sun_color_day: [f32; 3],
    pub sun_intensity: f32,
    pub sun_color_sunset: [f32; 3],
    pub global_coverage: f32,

    // Shape and animation
    pub wind_direction: [f32; 3],
    pub global_density: f32,
    pub clouds_color: [f32; 3],
    pub anvil_amount: f32,
    pub cloud_speed: f32,
    pub edges_speed_multiplier: f32,

    // Lighting
    pub beer_coefficient: f32,
    pub powder_coefficient: f32,
    pub extra_scatter_intensity: f32,
    pub powder_enabled: u32,
    pub base_shape_only: u32,
    pub _padding: f32,
}

impl CloudUniforms {
    /// A missing sky leaves the sun fields zeroed: the clouds render unlit
    /// rather than not at all.
    pub fn new(
        camera: &CameraState,
        sky: Option<&SkyParameters>,
        params: &CloudParameters,
        time: f32,
    ) -> Self {
        let mut uniforms = Self {
            inverse_projection: camera.inverse_projection().to_cols_array_2d(),
            inverse_view: camera.inverse_view().to_cols_array_2d(),
            camera_position: camera.position.to_array(),
            time,
            resolution: camera.resolution(),
            global_coverage: params.global_coverage,
            wind_direction: params.wind_direction.to_array(),
            global_density: params.global_density,
            clouds_color: params.color.to_array(),
            anvil_amount: params.anvil_amount,
            cloud_speed: params.cloud_speed,
            edges_speed_multiplier: params.edge_speed_multiplier,
            beer_coefficient: params.beer_coefficient,
            powder_coefficient: params.powder_coefficient,
            extra_scatter_intensity: params.extra_scatter_intensity,
            powder_enabled: params.powder_enabled as u32,
            base_shape_only: params.base_shape_only as u32,
            ..Zeroable::zeroed()
        };

        if let Some(sky) = sky {
            uniforms.sun_altitude = sky.sun_altitude();
            uniforms.sun_azimuth = sky.sun_azimuth();
            uniforms.sun_intensity = sky.sun_intensity();
            uniforms.sun_color_day = sky.sun_color_day().to_array();
            uniforms.sun_color_sunset = sky.sun_color_sunset().to_array();
        }
        uniforms
    }
}

/// Inputs of one cloud frame besides the device.
pub struct CloudFrame<'a, D: GraphicsDevice> {
    pub camera: &'a CameraState,
    pub sky: Option<&'a SkyParameters>,
    pub environment_texture: Option<&'a D::Texture>,
    pub time: f32,
}

/// Raymarches the cloud layer into an offscreen target and composites it
/// onto the default framebuffer.
pub struct CloudRaymarcher<D: GraphicsDevice> {
    raymarch: Option<D::Program>,
    composite: Option<D::Program>,
}

impl<D: GraphicsDevice> CloudRaymarcher<D> {
    pub fn new(device: &mut D, shaders: &ShaderLibrary) -> Self {
        let raymarch_desc = ProgramDesc::new("Clouds Raymarch", "clouds/clouds.wgsl", ProgramKind::Screen)
            .with_uniforms::<CloudUniforms>()
            .sampled(WEATHER_MAP_UNIT, TextureDimension::D2)
            .sampled(PERLIN_WORLEY_UNIT, TextureDimension::D3)
            .sampled(WORLEY_UNIT, TextureDimension::D3)
            .sampled(ENVIRONMENT_UNIT, TextureDimension::D2);
        let composite_desc =
            ProgramDesc::new("Clouds Composite", "clouds/composite.wgsl", ProgramKind::Screen)
                .sampled(SCREEN_UNIT, TextureDimension::D2);

        Self {
            raymarch: shaders.build(device, &raymarch_desc),
            composite: shaders.build(device, &composite_desc),
        }
    }

    pub fn render(
        &self,
        device: &mut D,
        target: &OffscreenTarget<D>,
        volumes: &NoiseVolumes<D>,
        params: &CloudParameters,
        frame: &CloudFrame<'_, D>,
    ) {
        // noise writes must land before any sampling below
        device.memory_barrier(MemoryBarrier::ImageAccess);

        {
            let mut bound = target.bind(device);
            let device = &mut *bound;
            device.clear([0.0, 0.0, 0.0, 1.0]);

            if let Some(program) = &self.raymarch {
                let uniforms = CloudUniforms::new(frame.camera, frame.sky, params, frame.time);
                device.use_program(program);
                device.set_uniforms(bytemuck::bytes_of(&uniforms));

                device.bind_texture(WEATHER_MAP_UNIT, &volumes.weather_map);
                device.bind_texture(PERLIN_WORLEY_UNIT, &volumes.perlin_worley);
                device.bind_texture(WORLEY_UNIT, &volumes.worley);
                if let Some(environment) = frame.environment_texture {
                    device.bind_texture(ENVIRONMENT_UNIT, environment);
                }

                device.set_depth_test(false);
                device.set_blend(None);
                device.draw_fullscreen(None);
            }
        }

        device.set_depth_test(false);
        device.set_blend(Some(CLOUD_BLEND));
        if let Some(program) = &self.composite {
            device.use_program(program);
            let color = target.color(device);
            device.draw_fullscreen(Some(color));
        }
        device.set_depth_test(true);
        device.set_blend(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_std140_sized() {
        assert_eq!(std::mem::size_of::<CloudUniforms>(), 256);
        assert_eq!(std::mem::size_of::<CloudUniforms>() % 16, 0);
    }

    #[test]
    fn missing_sky_zeroes_sun_terms() {
        let camera = crate::camera::Camera::default().snapshot(640, 480);
        let params = CloudParameters::default();

        let unlit = CloudUniforms::new(&camera, None, &params, 1.0);
        assert_eq!(unlit.sun_intensity, 0.0);
        assert_eq!(unlit.sun_color_day, [0.0; 3]);
        assert_eq!(unlit.global_coverage, params.global_coverage);

        let sky = SkyParameters::default();
        let lit = CloudUniforms::new(&camera, Some(&sky), &params, 1.0);
        assert_eq!(lit.sun_intensity, sky.sun_intensity());
        assert_eq!(lit.sun_altitude, sky.sun_altitude());
    }

    #[test]
    fn wind_and_density_pass_through_unchanged() {
        let camera = crate::camera::Camera::default().snapshot(640, 480);
        let mut params = CloudParameters::default();
        params.wind_direction = glam::Vec3::new(30.0, -4.0, 0.0);
        params.global_density = 250.0;

        let uniforms = CloudUniforms::new(&camera, None, &params, 0.0);
        assert_eq!(uniforms.wind_direction, [30.0, -4.0, 0.0]);
        assert_eq!(uniforms.global_density, 250.0);
    }

    #[test]
    fn raymarch_drifts_with_the_raw_wind_vector() {
        let shaders =
            crate::gfx::ShaderLibrary::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/shaders"));
        let source = shaders.load("clouds/clouds.wgsl").unwrap();

        assert!(source.contains("clouds.wind_direction * clouds.time * clouds.cloud_speed"));
        assert!(!source.contains("normalize(clouds.wind_direction"));
        assert!(!source.contains("fn wind()"));
    }
}
