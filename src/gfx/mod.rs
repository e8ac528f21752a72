//! Graphics device capability consumed by the rendering layers.
//!
//! The layers never talk to a GPU API directly. They drive a small,
//! state-machine style [`GraphicsDevice`]: create textures and programs,
//! bind them to numbered units, dispatch compute work, issue memory barriers,
//! bind offscreen targets and draw. [`WgpuDevice`] maps this onto wgpu and
//! [`RecordingDevice`] records the command stream without a GPU.
//!
//! Binding convention shared by every program (bind group 0):
//! - binding 0: the uniform block, when the program declares one
//! - binding `1 + 2u`: the texture or storage image on unit `u`
//! - binding `2 + 2u`: the sampler for a sampled texture on unit `u`

pub mod recording;
pub mod shader;
pub mod wgpu_device;

pub use recording::{Command, RecordingDevice};
pub use shader::ShaderLibrary;
pub use wgpu_device::WgpuDevice;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GfxError {
    #[error("shader source not found: {0}")]
    ShaderNotFound(String),

    #[error("shader include cycle or depth limit reached in {0}")]
    IncludeDepth(String),

    #[error("shader compilation failed for {label}: {message}")]
    Compile { label: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to open device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Texel format of a texture or render target attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    /// 8-bit normalized RGBA, usable as a storage image
    Rgba8Unorm,
    /// Half float RGBA for render targets that carry HDR values
    Rgba16Float,
    Depth32Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extent {
    D2 { width: u32, height: u32 },
    D3 { width: u32, height: u32, depth: u32 },
}

impl Extent {
    pub fn cube(size: u32) -> Self {
        Extent::D3 {
            width: size,
            height: size,
            depth: size,
        }
    }

    pub fn square(size: u32) -> Self {
        Extent::D2 {
            width: size,
            height: size,
        }
    }

    /// Size per axis, with 1 for the missing axis of a 2D extent.
    pub fn size(&self) -> [u32; 3] {
        match *self {
            Extent::D2 { width, height } => [width, height, 1],
            Extent::D3 {
                width,
                height,
                depth,
            } => [width, height, depth],
        }
    }

    pub fn dimension(&self) -> TextureDimension {
        match self {
            Extent::D2 { .. } => TextureDimension::D2,
            Extent::D3 { .. } => TextureDimension::D3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    D3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub extent: Extent,
    pub format: TexelFormat,
    pub wrap: WrapMode,
    /// The texture is written by compute programs as an image
    pub storage: bool,
    /// The texture is a render target attachment
    pub render_target: bool,
}

impl TextureDesc {
    /// A tileable RGBA8 texture filled by a compute program.
    pub fn noise(label: &str, extent: Extent) -> Self {
        Self {
            label: label.to_string(),
            extent,
            format: TexelFormat::Rgba8Unorm,
            wrap: WrapMode::Repeat,
            storage: true,
            render_target: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub color_format: TexelFormat,
}

impl TargetDesc {
    /// Completeness of a target with these dimensions on a device whose
    /// largest 2D texture side is `max_dimension`.
    pub fn validate(&self, max_dimension: u32) -> TargetStatus {
        if self.width == 0 || self.height == 0 {
            TargetStatus::Incomplete(IncompleteReason::ZeroSize)
        } else if self.width > max_dimension || self.height > max_dimension {
            TargetStatus::Incomplete(IncompleteReason::ExceedsLimit(max_dimension))
        } else if self.color_format == TexelFormat::Depth32Float {
            TargetStatus::Incomplete(IncompleteReason::ColorFormat)
        } else {
            TargetStatus::Complete
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Complete,
    Incomplete(IncompleteReason),
}

impl TargetStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, TargetStatus::Complete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteReason {
    ZeroSize,
    ExceedsLimit(u32),
    ColorFormat,
}

/// Which pipeline stage a program is built for.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgramKind {
    /// Compute program with entry point `main`
    Compute,
    /// Fullscreen triangle: `vs_main` / `fs_main`, no vertex buffers
    Screen,
    /// Indexed, instanced mesh: `vs_main` / `fs_main`
    Mesh {
        vertex_attributes: Vec<VertexAttribute>,
        instance_attributes: Vec<VertexAttribute>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    Float32x2,
    Float32x3,
}

impl VertexAttribute {
    pub fn floats(self) -> usize {
        match self {
            VertexAttribute::Float32x2 => 2,
            VertexAttribute::Float32x3 => 3,
        }
    }
}

/// What a program expects on a texture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Sampled(TextureDimension),
    Image(TextureDimension, TexelFormat),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSlot {
    pub unit: u32,
    pub kind: SlotKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDesc {
    pub label: String,
    /// Path of the WGSL source, relative to the shader library root
    pub path: String,
    pub kind: ProgramKind,
    /// Size in bytes of the uniform block, 0 when the program has none
    pub uniform_size: usize,
    pub slots: Vec<TextureSlot>,
}

impl ProgramDesc {
    pub fn new(label: &str, path: &str, kind: ProgramKind) -> Self {
        Self {
            label: label.to_string(),
            path: path.to_string(),
            kind,
            uniform_size: 0,
            slots: Vec::new(),
        }
    }

    pub fn with_uniforms<T: bytemuck::Pod>(mut self) -> Self {
        self.uniform_size = std::mem::size_of::<T>();
        self
    }

    pub fn sampled(mut self, unit: u32, dimension: TextureDimension) -> Self {
        self.slots.push(TextureSlot {
            unit,
            kind: SlotKind::Sampled(dimension),
        });
        self
    }

    pub fn image(mut self, unit: u32, dimension: TextureDimension, format: TexelFormat) -> Self {
        self.slots.push(TextureSlot {
            unit,
            kind: SlotKind::Image(dimension, format),
        });
        self
    }
}

/// CPU-side geometry for an indexed, instanced mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub vertex_stride: usize,
    pub indices: Vec<u32>,
    pub instances: Vec<f32>,
    pub instance_stride: usize,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        if self.vertex_stride == 0 {
            0
        } else {
            self.vertices.len() / self.vertex_stride
        }
    }

    pub fn instance_count(&self) -> usize {
        if self.instance_stride == 0 {
            0
        } else {
            self.instances.len() / self.instance_stride
        }
    }
}

/// Memory barrier classes. Only image access is needed: compute programs
/// write noise through storage images that later stages sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryBarrier {
    ImageAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// `result = src * src_factor + dst * dst_factor`, applied to all channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

impl BlendFunc {
    pub const fn new(src_factor: BlendFactor, dst_factor: BlendFactor) -> Self {
        Self {
            src_factor,
            dst_factor,
        }
    }
}

/// Fixed-function state that applies to the next draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub depth_test: bool,
    pub blend: Option<BlendFunc>,
    pub wireframe: bool,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            depth_test: true,
            blend: None,
            wireframe: false,
        }
    }
}

/// Number of work groups needed to cover `dimension` with groups of `local_size`.
pub fn group_count(dimension: u32, local_size: u32) -> u32 {
    dimension.div_ceil(local_size)
}

/// Work groups per axis for an extent; the third axis of a 2D extent is 1.
pub fn dispatch_size(extent: Extent, local_size: u32) -> [u32; 3] {
    match extent {
        Extent::D2 { width, height } => [
            group_count(width, local_size),
            group_count(height, local_size),
            1,
        ],
        Extent::D3 {
            width,
            height,
            depth,
        } => [
            group_count(width, local_size),
            group_count(height, local_size),
            group_count(depth, local_size),
        ],
    }
}

/// The capability every rendering layer is written against.
///
/// Handles are owned values: dropping a texture, target, program or mesh
/// releases the underlying GPU object.
pub trait GraphicsDevice {
    type Texture;
    type Target;
    type Program;
    type Mesh;

    fn create_texture(&mut self, desc: &TextureDesc) -> Self::Texture;
    fn create_target(&mut self, desc: &TargetDesc) -> Self::Target;
    fn target_status(&self, target: &Self::Target) -> TargetStatus;
    fn target_color<'t>(&self, target: &'t Self::Target) -> &'t Self::Texture;
    fn create_program(&mut self, desc: &ProgramDesc, source: &str)
    -> Result<Self::Program, GfxError>;
    fn create_mesh(&mut self, label: &str, data: &MeshData) -> Self::Mesh;

    fn use_program(&mut self, program: &Self::Program);
    /// Sets the uniform block of the current program.
    fn set_uniforms(&mut self, bytes: &[u8]);
    fn bind_texture(&mut self, unit: u32, texture: &Self::Texture);
    fn bind_image(&mut self, unit: u32, texture: &Self::Texture);

    fn dispatch_compute(&mut self, groups: [u32; 3]);
    fn memory_barrier(&mut self, barrier: MemoryBarrier);

    fn bind_target(&mut self, target: &Self::Target);
    /// Returns to the default framebuffer.
    fn unbind_target(&mut self);
    /// Clears color and depth of the bound framebuffer.
    fn clear(&mut self, color: [f32; 4]);

    fn raster_state(&self) -> RasterState;
    fn set_depth_test(&mut self, enabled: bool);
    fn set_blend(&mut self, blend: Option<BlendFunc>);
    fn set_wireframe(&mut self, enabled: bool);

    /// Draws a fullscreen triangle with the current program. `source`, when
    /// given, is bound to [`crate::constants::SCREEN_UNIT`] first.
    fn draw_fullscreen(&mut self, source: Option<&Self::Texture>);
    fn draw_mesh(&mut self, mesh: &Self::Mesh);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_count_covers_dimension() {
        assert_eq!(group_count(128, 4), 32);
        assert_eq!(group_count(32, 4), 8);
        assert_eq!(group_count(1024, 8), 128);
        assert_eq!(group_count(130, 4), 33);
        assert_eq!(group_count(1, 8), 1);
        assert_eq!(group_count(0, 8), 0);
    }

    #[test]
    fn group_count_matches_ceil_for_all_small_inputs() {
        for d in 1..300u32 {
            for g in [1u32, 2, 4, 8, 16] {
                let expected = (d as f64 / g as f64).ceil() as u32;
                assert_eq!(group_count(d, g), expected, "d={} g={}", d, g);
            }
        }
    }

    #[test]
    fn dispatch_size_of_2d_extent_has_single_depth_group() {
        assert_eq!(dispatch_size(Extent::square(1024), 8), [128, 128, 1]);
        assert_eq!(dispatch_size(Extent::cube(128), 4), [32, 32, 32]);
    }

    #[test]
    fn zero_sized_target_is_incomplete() {
        let desc = TargetDesc {
            label: "clouds".into(),
            width: 0,
            height: 0,
            color_format: TexelFormat::Rgba16Float,
        };
        assert_eq!(
            desc.validate(8192),
            TargetStatus::Incomplete(IncompleteReason::ZeroSize)
        );

        let huge = TargetDesc {
            width: 10_000,
            height: 10,
            ..desc.clone()
        };
        assert_eq!(
            huge.validate(8192),
            TargetStatus::Incomplete(IncompleteReason::ExceedsLimit(8192))
        );

        let ok = TargetDesc {
            width: 800,
            height: 600,
            ..desc
        };
        assert!(ok.validate(8192).is_complete());
    }
}
