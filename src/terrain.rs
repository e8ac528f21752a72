//! Instanced terrain patches displaced in the vertex stage.
//!
//! One flat patch is built on the CPU and drawn once per tile of a square
//! grid. Heights come from fBm noise evaluated on world-space positions, so
//! neighbouring tiles join without seams.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::camera::CameraState;
use crate::constants::*;
use crate::gfx::{GraphicsDevice, MeshData, ProgramDesc, ProgramKind, ShaderLibrary, VertexAttribute};

/// Floats per vertex: position, normal, uv
const VERTEX_STRIDE: usize = 8;
/// Floats per instance: xz offset
const INSTANCE_STRIDE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainNoise {
    pub amplitude: f32,
    pub frequency: f32,
    pub octaves: u32,
    pub lacunarity: f32,
    pub gain: f32,
    pub seed: Vec2,
    pub power: f32,
    pub frequency_multiplier: f32,
}

impl Default for TerrainNoise {
    fn default() -> Self {
        Self {
            amplitude: 14.0,
            frequency: 5e-5,
            octaves: 13,
            lacunarity: 2.0,
            gain: 0.5,
            seed: Vec2::ZERO,
            power: 3.0,
            frequency_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainParameters {
    pub subdivision: u32,
    /// Side length of one patch in metres
    pub scale: f32,
    pub noise: TerrainNoise,
    pub wireframe: bool,
    /// Patches per side of the tile grid
    pub tile_count: u32,
}

impl Default for TerrainParameters {
    fn default() -> Self {
        Self {
            subdivision: TERRAIN_SUBDIVISION,
            scale: TERRAIN_SCALE,
            noise: TerrainNoise::default(),
            wireframe: true,
            tile_count: TERRAIN_TILE_COUNT,
        }
    }
}

impl TerrainParameters {
    /// Vertices per patch side. Never below 2 so a patch always has a cell.
    pub fn resolution(&self) -> u32 {
        (self.subdivision * 2 * PATCH_TESSELLATION).max(2)
    }

    fn geometry(&self) -> (u32, u32, u32) {
        (self.subdivision, self.scale.to_bits(), self.tile_count)
    }
}

/// Bounds the control surface keeps patch geometry inside. Outside them a
/// patch either collapses or mirrors (scale) or grows without limit
/// (subdivision).
pub mod ranges {
    use std::ops::RangeInclusive;

    pub const SCALE: RangeInclusive<f32> = 100.0..=2000.0;
    pub const SUBDIVISION: RangeInclusive<u32> = 1..=10;
}

/// Flat `scale`-wide patch centred on the origin, rows running towards -Z,
/// plus one xz offset per tile.
pub fn patch_mesh(params: &TerrainParameters) -> MeshData {
    let resolution = params.resolution() as usize;
    let scale = params.scale;
    let step = 1.0 / (resolution - 1) as f32;

    let mut vertices = Vec::with_capacity(resolution * resolution * VERTEX_STRIDE);
    for row in 0..resolution {
        for col in 0..resolution {
            let (u, v) = (col as f32 * step, row as f32 * step);
            vertices.extend_from_slice(&[
                u * scale - scale / 2.0,
                0.0,
                -v * scale + scale / 2.0,
                0.0,
                1.0,
                0.0,
                u,
                1.0 - v,
            ]);
        }
    }

    let r = resolution as u32;
    let mut indices = Vec::with_capacity((resolution - 1) * (resolution - 1) * 6);
    for row in 0..r - 1 {
        for col in 0..r - 1 {
            let bottom_left = row * r + col;
            let bottom_right = bottom_left + 1;
            let top_left = bottom_left + r;
            let top_right = top_left + 1;
            // counter-clockwise seen from above
            indices.extend_from_slice(&[bottom_left, bottom_right, top_left]);
            indices.extend_from_slice(&[bottom_right, top_right, top_left]);
        }
    }

    MeshData {
        vertices,
        vertex_stride: VERTEX_STRIDE,
        indices,
        instances: tile_offsets(params.tile_count, scale),
        instance_stride: INSTANCE_STRIDE,
    }
}

fn tile_offsets(tile_count: u32, scale: f32) -> Vec<f32> {
    let half = tile_count as f32 / 2.0;
    let mut offsets = Vec::with_capacity((tile_count * tile_count) as usize * INSTANCE_STRIDE);
    for i in 0..tile_count {
        for j in 0..tile_count {
            offsets.push((j as f32 - half) * scale);
            offsets.push((i as f32 - half) * scale);
        }
    }
    offsets
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TerrainUniforms {
    pub view_projection: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub amplitude: f32,
    pub frequency: f32,
    pub octaves: u32,
    pub lacunarity: f32,
    pub gain: f32,
    pub seed: [f32; 2],
    pub power: f32,
    pub _padding: f32,
}

impl TerrainUniforms {
    pub fn new(camera: &CameraState, noise: &TerrainNoise) -> Self {
        Self {
            view_projection: camera.view_projection().to_cols_array_2d(),
            camera_position: camera.position.to_array(),
            amplitude: noise.amplitude,
            frequency: noise.frequency * noise.frequency_multiplier,
            octaves: noise.octaves,
            lacunarity: noise.lacunarity,
            gain: noise.gain,
            seed: noise.seed.to_array(),
            power: noise.power,
            _padding: 0.0,
        }
    }
}

pub struct TerrainLayer<D: GraphicsDevice> {
    params: TerrainParameters,
    program: Option<D::Program>,
    mesh: D::Mesh,
    geometry: (u32, u32, u32),
}

impl<D: GraphicsDevice> TerrainLayer<D> {
    pub fn new(device: &mut D, shaders: &ShaderLibrary, params: TerrainParameters) -> Self {
        let desc = ProgramDesc::new(
            "Terrain",
            "terrain/terrain.wgsl",
            ProgramKind::Mesh {
                vertex_attributes: vec![
                    VertexAttribute::Float32x3,
                    VertexAttribute::Float32x3,
                    VertexAttribute::Float32x2,
                ],
                instance_attributes: vec![VertexAttribute::Float32x2],
            },
        )
        .with_uniforms::<TerrainUniforms>();

        Self {
            program: shaders.build(device, &desc),
            mesh: device.create_mesh("Terrain Patch", &patch_mesh(&params)),
            geometry: params.geometry(),
            params,
        }
    }

    pub fn params(&self) -> &TerrainParameters {
        &self.params
    }

    /// Geometry edits (scale, subdivision, tile count) take effect on the
    /// next [`TerrainLayer::sync`].
    pub fn params_mut(&mut self) -> &mut TerrainParameters {
        &mut self.params
    }

    /// Rebuilds the patch if its geometry changed. Returns whether it did.
    pub fn sync(&mut self, device: &mut D) -> bool {
        let geometry = self.params.geometry();
        if geometry == self.geometry {
            return false;
        }
        self.mesh = device.create_mesh("Terrain Patch", &patch_mesh(&self.params));
        self.geometry = geometry;
        tracing::debug!(
            "Terrain patch rebuilt: resolution {}, scale {}",
            self.params.resolution(),
            self.params.scale
        );
        true
    }

    pub fn apply_parameters(&mut self, device: &mut D, params: TerrainParameters) {
        self.params = params;
        self.sync(device);
    }

    pub fn new_seed<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.params.noise.seed = Vec2::new(rng.random(), rng.random());
    }

    pub fn default_seed(&mut self) {
        self.params.noise.seed = Vec2::ZERO;
    }

    pub fn toggle_wireframe(&mut self) {
        self.params.wireframe = !self.params.wireframe;
    }

    /// Draws straight into whatever framebuffer is bound.
    pub fn render(&self, device: &mut D, camera: &CameraState) {
        let Some(program) = &self.program else {
            return;
        };

        device.use_program(program);
        device.set_uniforms(bytemuck::bytes_of(&TerrainUniforms::new(camera, &self.params.noise)));
        device.set_wireframe(self.params.wireframe);
        device.draw_mesh(&self.mesh);
        device.set_wireframe(false);
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::camera::Camera;
    use crate::gfx::{Command, RecordingDevice};

    fn library() -> ShaderLibrary {
        ShaderLibrary::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/shaders"))
    }

    #[test]
    fn patch_covers_scale_centred_on_origin() {
        let params = TerrainParameters::default();
        let mesh = patch_mesh(&params);
        let r = params.resolution() as usize;

        assert_eq!(mesh.vertex_count(), r * r);
        assert_eq!(mesh.indices.len(), (r - 1) * (r - 1) * 6);

        let xs: Vec<f32> = mesh.vertices.chunks(VERTEX_STRIDE).map(|v| v[0]).collect();
        let min = xs.iter().cloned().fold(f32::MAX, f32::min);
        let max = xs.iter().cloned().fold(f32::MIN, f32::max);
        assert!((min + params.scale / 2.0).abs() < 1e-3);
        assert!((max - params.scale / 2.0).abs() < 1e-3);
    }

    #[test]
    fn every_triangle_faces_up() {
        let mesh = patch_mesh(&TerrainParameters {
            subdivision: 1,
            ..Default::default()
        });
        let position = |i: u32| {
            let v = &mesh.vertices[i as usize * VERTEX_STRIDE..];
            glam::Vec3::new(v[0], v[1], v[2])
        };
        for triangle in mesh.indices.chunks(3) {
            let (a, b, c) = (position(triangle[0]), position(triangle[1]), position(triangle[2]));
            assert!((b - a).cross(c - a).y > 0.0);
        }
    }

    #[test]
    fn indices_stay_in_bounds() {
        let mesh = patch_mesh(&TerrainParameters {
            subdivision: 3,
            ..Default::default()
        });
        let count = mesh.vertex_count() as u32;
        assert!(mesh.indices.iter().all(|&i| i < count));
    }

    #[test]
    fn tiles_form_a_centred_grid() {
        let offsets = tile_offsets(4, 100.0);
        assert_eq!(offsets.len(), 16 * INSTANCE_STRIDE);
        assert_eq!(&offsets[..2], &[-200.0, -200.0]);
        assert_eq!(&offsets[offsets.len() - 2..], &[100.0, 100.0]);
    }

    #[test]
    fn frequency_multiplier_scales_the_uniform() {
        let camera = Camera::default().snapshot(100, 100);
        let noise = TerrainNoise {
            frequency_multiplier: 4.0,
            ..Default::default()
        };
        let uniforms = TerrainUniforms::new(&camera, &noise);
        assert_eq!(uniforms.frequency, 2e-4);
        assert_eq!(std::mem::size_of::<TerrainUniforms>(), 112);
    }

    #[test]
    fn geometry_changes_rebuild_the_mesh_once() {
        let mut device = RecordingDevice::new();
        let mut terrain = TerrainLayer::new(&mut device, &library(), TerrainParameters::default());
        device.take_commands();

        terrain.params_mut().noise.amplitude = 20.0;
        assert!(!terrain.sync(&mut device));

        terrain.params_mut().scale = 1500.0;
        assert!(terrain.sync(&mut device));
        assert!(!terrain.sync(&mut device));

        terrain.params_mut().subdivision = 4;
        assert!(terrain.sync(&mut device));
        assert_eq!(device.count(|c| matches!(c, Command::CreateMesh { .. })), 2);
    }

    #[test]
    fn wireframe_is_bracketed_around_the_draw() {
        let mut device = RecordingDevice::new();
        let terrain = TerrainLayer::new(&mut device, &library(), TerrainParameters::default());
        let camera = Camera::default().snapshot(100, 100);

        terrain.render(&mut device, &camera);
        let draw = device
            .commands()
            .iter()
            .find_map(|c| match c {
                Command::DrawMesh { state, .. } => Some(*state),
                _ => None,
            })
            .expect("terrain draw");
        assert!(draw.wireframe);
        assert!(!device.raster_state().wireframe);
    }

    #[test]
    fn seeds_can_be_randomised_and_reset() {
        let mut device = RecordingDevice::new();
        let mut terrain = TerrainLayer::new(&mut device, &library(), TerrainParameters::default());
        let mut rng = StdRng::seed_from_u64(11);

        terrain.new_seed(&mut rng);
        assert_ne!(terrain.params().noise.seed, Vec2::ZERO);
        terrain.default_seed();
        assert_eq!(terrain.params().noise.seed, Vec2::ZERO);
    }
}
