//! GPU generation of the noise volumes and the weather map.
//!
//! Channel layout of the generated textures:
//! - Perlin-Worley (128³): R = Perlin-Worley, G/B/A = Worley fBm at
//!   increasing frequencies. Sampled for the base cloud shape.
//! - Worley (32³): R/G/B = Worley fBm at increasing frequencies. Sampled
//!   for edge erosion detail.
//! - Weather map (1024²): R = coverage, G = precipitation/density,
//!   B = cloud type blend, A = anvil bias.

use bytemuck::{Pod, Zeroable};

use super::params::CloudType;
use crate::constants::*;
use crate::gfx::{
    Extent, GraphicsDevice, MemoryBarrier, ProgramDesc, ProgramKind, ShaderLibrary, TexelFormat,
    TextureDesc, dispatch_size,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseKind {
    PerlinWorley,
    Worley,
    WeatherMap,
}

impl NoiseKind {
    pub fn extent(self) -> Extent {
        match self {
            NoiseKind::PerlinWorley => Extent::cube(PERLIN_WORLEY_SIZE),
            NoiseKind::Worley => Extent::cube(WORLEY_SIZE),
            NoiseKind::WeatherMap => Extent::square(WEATHER_MAP_SIZE),
        }
    }

    pub fn local_group_size(self) -> u32 {
        match self {
            NoiseKind::PerlinWorley | NoiseKind::Worley => VOLUME_LOCAL_GROUP_SIZE,
            NoiseKind::WeatherMap => WEATHER_LOCAL_GROUP_SIZE,
        }
    }

    fn label(self) -> &'static str {
        match self {
            NoiseKind::PerlinWorley => "Perlin-Worley Noise",
            NoiseKind::Worley => "Worley Noise",
            NoiseKind::WeatherMap => "Weather Map",
        }
    }

    fn shader_path(self) -> &'static str {
        match self {
            NoiseKind::PerlinWorley => "noise/perlin_worley.wgsl",
            NoiseKind::Worley => "noise/worley.wgsl",
            NoiseKind::WeatherMap => "clouds/weather_map.wgsl",
        }
    }

    fn program_desc(self) -> ProgramDesc {
        let desc = ProgramDesc::new(self.label(), self.shader_path(), ProgramKind::Compute).image(
            IMAGE_UNIT,
            self.extent().dimension(),
            TexelFormat::Rgba8Unorm,
        );
        match self {
            NoiseKind::WeatherMap => desc.with_uniforms::<WeatherUniforms>(),
            _ => desc,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct WeatherUniforms {
    pub cloud_type: u32,
    pub _padding: [u32; 3],
}

/// The three textures owned by a cloud layer.
pub struct NoiseVolumes<D: GraphicsDevice> {
    pub perlin_worley: D::Texture,
    pub worley: D::Texture,
    pub weather_map: D::Texture,
}

impl<D: GraphicsDevice> NoiseVolumes<D> {
    pub fn allocate(device: &mut D) -> Self {
        let mut texture =
            |kind: NoiseKind| device.create_texture(&TextureDesc::noise(kind.label(), kind.extent()));
        Self {
            perlin_worley: texture(NoiseKind::PerlinWorley),
            worley: texture(NoiseKind::Worley),
            weather_map: texture(NoiseKind::WeatherMap),
        }
    }
}

/// Compute programs that fill the noise textures. A program that failed to
/// build leaves its texture unwritten.
pub struct NoiseVolumeGenerator<D: GraphicsDevice> {
    perlin_worley: Option<D::Program>,
    worley: Option<D::Program>,
    weather_map: Option<D::Program>,
}

impl<D: GraphicsDevice> NoiseVolumeGenerator<D> {
    pub fn new(device: &mut D, shaders: &ShaderLibrary) -> Self {
        Self {
            perlin_worley: shaders.build(device, &NoiseKind::PerlinWorley.program_desc()),
            worley: shaders.build(device, &NoiseKind::Worley.program_desc()),
            weather_map: shaders.build(device, &NoiseKind::WeatherMap.program_desc()),
        }
    }

    fn program(&self, kind: NoiseKind) -> Option<&D::Program> {
        match kind {
            NoiseKind::PerlinWorley => self.perlin_worley.as_ref(),
            NoiseKind::Worley => self.worley.as_ref(),
            NoiseKind::WeatherMap => self.weather_map.as_ref(),
        }
    }

    /// Fills `texture` with `kind` noise and issues an image-access barrier
    /// so later stages sample the finished data.
    pub fn generate(
        &self,
        device: &mut D,
        texture: &D::Texture,
        kind: NoiseKind,
        uniforms: Option<&[u8]>,
    ) {
        let Some(program) = self.program(kind) else {
            tracing::warn!("Skipping {} generation, program unavailable", kind.label());
            return;
        };

        let groups = dispatch_size(kind.extent(), kind.local_group_size());
        device.use_program(program);
        if let Some(bytes) = uniforms {
            device.set_uniforms(bytes);
        }
        device.bind_image(IMAGE_UNIT, texture);
        device.dispatch_compute(groups);
        device.memory_barrier(MemoryBarrier::ImageAccess);

        tracing::debug!("Generated {} with {:?} work groups", kind.label(), groups);
    }

    /// Base noise is generated once per layer lifetime.
    pub fn generate_volumes(&self, device: &mut D, volumes: &NoiseVolumes<D>) {
        self.generate(device, &volumes.perlin_worley, NoiseKind::PerlinWorley, None);
        self.generate(device, &volumes.worley, NoiseKind::Worley, None);
    }

    pub fn regenerate_weather_map(
        &self,
        device: &mut D,
        volumes: &NoiseVolumes<D>,
        cloud_type: CloudType,
    ) {
        let uniforms = WeatherUniforms {
            cloud_type: cloud_type as u32,
            _padding: [0; 3],
        };
        self.generate(
            device,
            &volumes.weather_map,
            NoiseKind::WeatherMap,
            Some(bytemuck::bytes_of(&uniforms)),
        );
        tracing::info!("Weather map regenerated for {}", cloud_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{Command, RecordingDevice};

    fn library() -> ShaderLibrary {
        ShaderLibrary::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/shaders"))
    }

    #[test]
    fn dispatch_counts_follow_local_group_sizes() {
        let mut device = RecordingDevice::new();
        let volumes = NoiseVolumes::allocate(&mut device);
        let generator = NoiseVolumeGenerator::new(&mut device, &library());

        generator.generate_volumes(&mut device, &volumes);
        generator.regenerate_weather_map(&mut device, &volumes, CloudType::Cumulus);

        let dispatches = device.dispatches();
        assert_eq!(
            dispatches,
            vec![
                ("Perlin-Worley Noise".to_string(), [32, 32, 32]),
                ("Worley Noise".to_string(), [8, 8, 8]),
                ("Weather Map".to_string(), [128, 128, 1]),
            ]
        );
    }

    #[test]
    fn every_dispatch_is_followed_by_a_barrier() {
        let mut device = RecordingDevice::new();
        let volumes = NoiseVolumes::allocate(&mut device);
        let generator = NoiseVolumeGenerator::new(&mut device, &library());

        generator.generate_volumes(&mut device, &volumes);
        generator.regenerate_weather_map(&mut device, &volumes, CloudType::Stratus);

        let commands = device.commands();
        for (i, command) in commands.iter().enumerate() {
            if let Command::Dispatch { .. } = command {
                assert_eq!(
                    commands.get(i + 1),
                    Some(&Command::Barrier(MemoryBarrier::ImageAccess)),
                    "dispatch at {} not followed by a barrier",
                    i
                );
            }
        }
    }

    #[test]
    fn weather_map_receives_cloud_type() {
        let mut device = RecordingDevice::new();
        let volumes = NoiseVolumes::allocate(&mut device);
        let generator = NoiseVolumeGenerator::new(&mut device, &library());
        device.take_commands();

        generator.regenerate_weather_map(&mut device, &volumes, CloudType::Cumulonimbus);
        let commands = device.take_commands();
        assert!(commands.contains(&Command::SetUniforms {
            size: std::mem::size_of::<WeatherUniforms>()
        }));
        assert!(commands.contains(&Command::BindImage {
            unit: IMAGE_UNIT,
            texture: volumes.weather_map.id,
        }));
    }

    #[test]
    fn missing_program_skips_generation() {
        let mut device = RecordingDevice::new();
        device.fail_programs_matching("Worley");
        let volumes = NoiseVolumes::allocate(&mut device);
        let generator = NoiseVolumeGenerator::new(&mut device, &library());

        generator.generate_volumes(&mut device, &volumes);
        assert!(device.dispatches().is_empty());
    }
}
