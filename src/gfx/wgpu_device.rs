//! [`GraphicsDevice`] on top of wgpu.
//!
//! wgpu has no global bind state, so this device keeps the "current"
//! program, uniforms, texture units, framebuffer and raster state itself
//! and turns every draw or dispatch into its own pass with a freshly built
//! bind group. Render pipelines are created lazily per
//! (program, attachment format, raster state) and cached.

use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{
    BlendFactor, BlendFunc, Extent, GfxError, GraphicsDevice, MemoryBarrier, MeshData,
    ProgramDesc, ProgramKind, RasterState, SlotKind, TargetDesc, TargetStatus, TexelFormat,
    TextureDesc, TextureDimension, VertexAttribute, WrapMode,
};
use crate::constants::SCREEN_UNIT;
use crate::diagnostics::{self, DiagnosticKind};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

fn texture_binding(unit: u32) -> u32 {
    1 + 2 * unit
}

fn sampler_binding(unit: u32) -> u32 {
    2 + 2 * unit
}

fn texel_format(format: TexelFormat) -> wgpu::TextureFormat {
    match format {
        TexelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TexelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TexelFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn view_dimension(dimension: TextureDimension) -> wgpu::TextureViewDimension {
    match dimension {
        TextureDimension::D2 => wgpu::TextureViewDimension::D2,
        TextureDimension::D3 => wgpu::TextureViewDimension::D3,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
    }
}

fn blend_state(blend: BlendFunc) -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: blend_factor(blend.src_factor),
        dst_factor: blend_factor(blend.dst_factor),
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

fn vertex_format(attribute: VertexAttribute) -> wgpu::VertexFormat {
    match attribute {
        VertexAttribute::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexAttribute::Float32x3 => wgpu::VertexFormat::Float32x3,
    }
}

/// Attributes packed back to back, starting at `location`. Returns the stride in bytes.
fn packed_attributes(
    attributes: &[VertexAttribute],
    location: &mut u32,
) -> (Vec<wgpu::VertexAttribute>, u64) {
    let mut offset = 0u64;
    let packed = attributes
        .iter()
        .map(|&attribute| {
            let packed = wgpu::VertexAttribute {
                format: vertex_format(attribute),
                offset,
                shader_location: *location,
            };
            offset += (attribute.floats() * std::mem::size_of::<f32>()) as u64;
            *location += 1;
            packed
        })
        .collect();
    (packed, offset)
}

pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    desc: TextureDesc,
}

impl WgpuTexture {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }
}

pub struct WgpuTarget {
    color: WgpuTexture,
    depth: WgpuTexture,
    status: TargetStatus,
}

struct ProgramInner {
    id: u32,
    desc: ProgramDesc,
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    compute: Option<wgpu::ComputePipeline>,
    render_layout: Option<wgpu::PipelineLayout>,
}

#[derive(Clone)]
pub struct WgpuProgram(Rc<ProgramInner>);

pub struct WgpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    instance_buffer: Option<wgpu::Buffer>,
    index_count: u32,
    instance_count: u32,
}

struct BoundUnit {
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    dimension: TextureDimension,
    format: TexelFormat,
}

struct BoundTarget {
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
    format: wgpu::TextureFormat,
}

struct Frame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u32,
    format: wgpu::TextureFormat,
    state: RasterState,
}

/// Resources a draw needs once its state has been validated.
struct DrawSetup {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
    label: String,
}

pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    screen_depth: WgpuTexture,
    max_dimension: u32,
    wireframe_supported: bool,

    encoder: Option<wgpu::CommandEncoder>,
    frame: Option<Frame>,
    program: Option<WgpuProgram>,
    uniforms: Vec<u8>,
    units: FxHashMap<u32, BoundUnit>,
    target: Option<BoundTarget>,
    pending_clear: Option<[f32; 4]>,
    state: RasterState,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    next_id: u32,
}

impl WgpuDevice {
    pub async fn new(window: Arc<Window>, vsync: bool) -> Result<Self, GfxError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        tracing::info!("WGPU Instance created successfully");

        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        let info = adapter.get_info();
        tracing::info!(
            "Selected adapter: {} on {:?} backend",
            info.name,
            info.backend
        );
        if info.device_type == wgpu::DeviceType::Cpu {
            tracing::warn!("Running on a software renderer, raymarching will be slow");
        }

        let wireframe_supported = adapter
            .features()
            .contains(wgpu::Features::POLYGON_MODE_LINE);
        if !wireframe_supported {
            tracing::warn!("Adapter lacks POLYGON_MODE_LINE, wireframe draws fall back to fill");
        }
        let required_features = if wireframe_supported {
            wgpu::Features::POLYGON_MODE_LINE
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Cloudscapes Device"),
                required_features,
                required_limits: adapter.limits(),
                memory_hints: Default::default(),
                experimental_features: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        device.on_uncaptured_error(Arc::new(|error: wgpu::Error| {
            tracing::error!(target: "cloudscapes::resource", "wgpu: {}", error);
        }));

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let max_dimension = device.limits().max_texture_dimension_2d;
        let screen_depth = Self::depth_texture(&device, "Screen Depth", config.width, config.height);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            screen_depth,
            max_dimension,
            wireframe_supported,
            encoder: None,
            frame: None,
            program: None,
            uniforms: Vec::new(),
            units: FxHashMap::default(),
            target: None,
            pending_clear: None,
            state: RasterState::default(),
            pipelines: FxHashMap::default(),
            next_id: 0,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.screen_depth = Self::depth_texture(&self.device, "Screen Depth", width, height);
    }

    /// Acquires the next swapchain image. Draws with no target bound go to it.
    pub fn begin_frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(Frame { output, view });
        Ok(())
    }

    /// Submits the recorded work and presents the frame.
    pub fn end_frame(&mut self) {
        self.flush_clear();
        self.submit();
        if let Some(frame) = self.frame.take() {
            frame.output.present();
        }
    }

    /// Lets a caller record its own passes onto the swapchain image, e.g. text.
    pub fn draw_overlay(
        &mut self,
        draw: impl FnOnce(&wgpu::Device, &wgpu::Queue, &mut wgpu::CommandEncoder, &wgpu::TextureView),
    ) {
        self.flush_clear();
        let Some(view) = self.frame.as_ref().map(|f| f.view.clone()) else {
            return;
        };
        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            })
        });
        draw(&self.device, &self.queue, encoder, &view);
    }

    fn depth_texture(device: &wgpu::Device, label: &str, width: u32, height: u32) -> WgpuTexture {
        Self::texture_from_desc(
            device,
            TextureDesc {
                label: label.to_string(),
                extent: Extent::D2 { width, height },
                format: TexelFormat::Depth32Float,
                wrap: WrapMode::ClampToEdge,
                storage: false,
                render_target: true,
            },
        )
    }

    fn texture_from_desc(device: &wgpu::Device, desc: TextureDesc) -> WgpuTexture {
        let [width, height, depth] = desc.extent.size();
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if desc.storage {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        if desc.render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: depth,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: match desc.extent.dimension() {
                TextureDimension::D2 => wgpu::TextureDimension::D2,
                TextureDimension::D3 => wgpu::TextureDimension::D3,
            },
            format: texel_format(desc.format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let address_mode = match desc.wrap {
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
            WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&desc.label),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            anisotropy_clamp: 1,
            ..Default::default()
        });

        WgpuTexture {
            texture,
            view,
            sampler,
            desc,
        }
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            })
        })
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Color view, depth view and color format of the bound framebuffer.
    fn attachments(&self) -> Option<(wgpu::TextureView, wgpu::TextureView, wgpu::TextureFormat)> {
        match &self.target {
            Some(target) => Some((target.color.clone(), target.depth.clone(), target.format)),
            None => self.frame.as_ref().map(|frame| {
                (
                    frame.view.clone(),
                    self.screen_depth.view.clone(),
                    self.config.format,
                )
            }),
        }
    }

    /// Applies a clear that no draw picked up.
    fn flush_clear(&mut self) {
        if self.pending_clear.is_none() {
            return;
        }
        let Some((color, depth, _)) = self.attachments() else {
            self.pending_clear = None;
            return;
        };
        let (color_load, depth_load) = self.load_ops();
        let encoder = self.encoder();
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &color,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
    }

    /// Load operations for the next pass, consuming a pending clear.
    fn load_ops(&mut self) -> (wgpu::LoadOp<wgpu::Color>, wgpu::LoadOp<f32>) {
        match self.pending_clear.take() {
            Some([r, g, b, a]) => (
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                wgpu::LoadOp::Clear(1.0),
            ),
            None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        }
    }

    fn bind_group(&self, program: &ProgramInner) -> Option<wgpu::BindGroup> {
        let uniform_buffer = if program.desc.uniform_size > 0 {
            if self.uniforms.is_empty() {
                diagnostics::report(
                    DiagnosticKind::Binding,
                    format!("program '{}' used without uniforms", program.desc.label),
                );
                return None;
            }
            let mut contents = self.uniforms.clone();
            contents.resize(program.desc.uniform_size, 0);
            Some(
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Program Uniforms"),
                        contents: &contents,
                        usage: wgpu::BufferUsages::UNIFORM,
                    }),
            )
        } else {
            None
        };

        let mut entries = Vec::with_capacity(1 + 2 * program.desc.slots.len());
        if let Some(buffer) = &uniform_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            });
        }

        for slot in &program.desc.slots {
            let Some(bound) = self.units.get(&slot.unit) else {
                diagnostics::report(
                    DiagnosticKind::Binding,
                    format!(
                        "program '{}' expects a texture on unit {}",
                        program.desc.label, slot.unit
                    ),
                );
                return None;
            };
            let matches = match slot.kind {
                SlotKind::Sampled(dimension) => bound.dimension == dimension,
                SlotKind::Image(dimension, format) => {
                    bound.dimension == dimension && bound.format == format
                }
            };
            if !matches {
                diagnostics::report(
                    DiagnosticKind::Binding,
                    format!(
                        "texture on unit {} does not match what program '{}' declares",
                        slot.unit, program.desc.label
                    ),
                );
                return None;
            }

            entries.push(wgpu::BindGroupEntry {
                binding: texture_binding(slot.unit),
                resource: wgpu::BindingResource::TextureView(&bound.view),
            });
            if let SlotKind::Sampled(_) = slot.kind {
                entries.push(wgpu::BindGroupEntry {
                    binding: sampler_binding(slot.unit),
                    resource: wgpu::BindingResource::Sampler(&bound.sampler),
                });
            }
        }

        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.desc.label),
            layout: &program.bind_group_layout,
            entries: &entries,
        }))
    }

    fn effective_state(&self, program: &ProgramInner) -> RasterState {
        let mesh = matches!(program.desc.kind, ProgramKind::Mesh { .. });
        RasterState {
            wireframe: self.state.wireframe && mesh && self.wireframe_supported,
            ..self.state
        }
    }

    fn render_pipeline(
        &mut self,
        program: &ProgramInner,
        format: wgpu::TextureFormat,
    ) -> Option<wgpu::RenderPipeline> {
        let layout = program.render_layout.as_ref()?;
        let state = self.effective_state(program);
        let key = PipelineKey {
            program: program.id,
            format,
            state,
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Some(pipeline.clone());
        }

        let mut location = 0;
        let (vertex_attributes, vertex_stride, instance_attributes, instance_stride) =
            match &program.desc.kind {
                ProgramKind::Mesh {
                    vertex_attributes,
                    instance_attributes,
                } => {
                    let (vertex, vertex_stride) =
                        packed_attributes(vertex_attributes, &mut location);
                    let (instance, instance_stride) =
                        packed_attributes(instance_attributes, &mut location);
                    (vertex, vertex_stride, instance, instance_stride)
                }
                _ => (Vec::new(), 0, Vec::new(), 0),
            };

        let mut buffers = Vec::new();
        if !vertex_attributes.is_empty() {
            buffers.push(wgpu::VertexBufferLayout {
                array_stride: vertex_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &vertex_attributes,
            });
        }
        if !instance_attributes.is_empty() {
            buffers.push(wgpu::VertexBufferLayout {
                array_stride: instance_stride,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &instance_attributes,
            });
        }

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&program.desc.label),
                layout: Some(layout),
                cache: None,
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: state.blend.map(blend_state),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: if state.wireframe {
                        wgpu::PolygonMode::Line
                    } else {
                        wgpu::PolygonMode::Fill
                    },
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: state.depth_test,
                    depth_compare: if state.depth_test {
                        wgpu::CompareFunction::Less
                    } else {
                        wgpu::CompareFunction::Always
                    },
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
            });

        tracing::debug!(
            "Created pipeline for '{}' ({:?}, {:?})",
            program.desc.label,
            format,
            state
        );
        self.pipelines.insert(key, pipeline.clone());
        Some(pipeline)
    }

    fn prepare_draw(&mut self) -> Option<DrawSetup> {
        let Some(program) = self.program.clone() else {
            diagnostics::report(DiagnosticKind::Binding, "draw issued with no program in use");
            return None;
        };
        let program = &program.0;
        if program.render_layout.is_none() {
            diagnostics::report(
                DiagnosticKind::Binding,
                format!("compute program '{}' used for a draw", program.desc.label),
            );
            return None;
        }
        let Some((color, depth, format)) = self.attachments() else {
            diagnostics::report(
                DiagnosticKind::Binding,
                format!("'{}' drawn with no framebuffer available", program.desc.label),
            );
            return None;
        };
        let bind_group = self.bind_group(program)?;
        let pipeline = self.render_pipeline(program, format)?;

        Some(DrawSetup {
            pipeline,
            bind_group,
            color,
            depth,
            label: program.desc.label.clone(),
        })
    }

    fn run_pass(&mut self, setup: DrawSetup, draw: impl FnOnce(&mut wgpu::RenderPass<'_>)) {
        let (color_load, depth_load) = self.load_ops();
        let encoder = self.encoder();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&setup.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &setup.color,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &setup.depth,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        pass.set_pipeline(&setup.pipeline);
        pass.set_bind_group(0, &setup.bind_group, &[]);
        draw(&mut pass);
    }
}

impl GraphicsDevice for WgpuDevice {
    type Texture = WgpuTexture;
    type Target = WgpuTarget;
    type Program = WgpuProgram;
    type Mesh = WgpuMesh;

    fn create_texture(&mut self, desc: &TextureDesc) -> WgpuTexture {
        Self::texture_from_desc(&self.device, desc.clone())
    }

    fn create_target(&mut self, desc: &TargetDesc) -> WgpuTarget {
        let status = desc.validate(self.max_dimension);
        let (width, height, format) = if status.is_complete() {
            (desc.width, desc.height, desc.color_format)
        } else {
            (1, 1, TexelFormat::Rgba8Unorm)
        };

        let color = Self::texture_from_desc(
            &self.device,
            TextureDesc {
                label: format!("{} Color", desc.label),
                extent: Extent::D2 { width, height },
                format,
                wrap: WrapMode::ClampToEdge,
                storage: false,
                render_target: true,
            },
        );
        let depth = Self::depth_texture(
            &self.device,
            &format!("{} Depth", desc.label),
            width,
            height,
        );

        WgpuTarget {
            color,
            depth,
            status,
        }
    }

    fn target_status(&self, target: &WgpuTarget) -> TargetStatus {
        target.status
    }

    fn target_color<'t>(&self, target: &'t WgpuTarget) -> &'t WgpuTexture {
        &target.color
    }

    fn create_program(&mut self, desc: &ProgramDesc, source: &str) -> Result<WgpuProgram, GfxError> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| m.message_type == wgpu::CompilationMessageType::Error)
            .map(|m| m.message.clone())
            .collect();
        if !errors.is_empty() {
            return Err(GfxError::Compile {
                label: desc.label.clone(),
                message: errors.join("\n"),
            });
        }

        let visibility = match desc.kind {
            ProgramKind::Compute => wgpu::ShaderStages::COMPUTE,
            _ => wgpu::ShaderStages::VERTEX_FRAGMENT,
        };

        let mut entries = Vec::new();
        if desc.uniform_size > 0 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        for slot in &desc.slots {
            match slot.kind {
                SlotKind::Sampled(dimension) => {
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: texture_binding(slot.unit),
                        visibility,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: view_dimension(dimension),
                            multisampled: false,
                        },
                        count: None,
                    });
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: sampler_binding(slot.unit),
                        visibility,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    });
                }
                SlotKind::Image(dimension, format) => {
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: texture_binding(slot.unit),
                        visibility,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: texel_format(format),
                            view_dimension: view_dimension(dimension),
                        },
                        count: None,
                    });
                }
            }
        }

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&desc.label),
                    entries: &entries,
                });
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let (compute, render_layout) = match desc.kind {
            ProgramKind::Compute => {
                let pipeline =
                    self.device
                        .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                            label: Some(&desc.label),
                            layout: Some(&layout),
                            module: &module,
                            entry_point: Some("main"),
                            compilation_options: Default::default(),
                            cache: None,
                        });
                (Some(pipeline), None)
            }
            _ => (None, Some(layout)),
        };

        self.next_id += 1;
        Ok(WgpuProgram(Rc::new(ProgramInner {
            id: self.next_id,
            desc: desc.clone(),
            module,
            bind_group_layout,
            compute,
            render_layout,
        })))
    }

    fn create_mesh(&mut self, label: &str, data: &MeshData) -> WgpuMesh {
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&data.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&data.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let instance_buffer = (!data.instances.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(&data.instances),
                    usage: wgpu::BufferUsages::VERTEX,
                })
        });

        WgpuMesh {
            vertex_buffer,
            index_buffer,
            instance_count: if instance_buffer.is_some() {
                data.instance_count() as u32
            } else {
                1
            },
            instance_buffer,
            index_count: data.indices.len() as u32,
        }
    }

    fn use_program(&mut self, program: &WgpuProgram) {
        self.program = Some(program.clone());
        self.uniforms.clear();
    }

    fn set_uniforms(&mut self, bytes: &[u8]) {
        self.uniforms.clear();
        self.uniforms.extend_from_slice(bytes);
    }

    fn bind_texture(&mut self, unit: u32, texture: &WgpuTexture) {
        self.units.insert(
            unit,
            BoundUnit {
                view: texture.view.clone(),
                sampler: texture.sampler.clone(),
                dimension: texture.desc.extent.dimension(),
                format: texture.desc.format,
            },
        );
    }

    fn bind_image(&mut self, unit: u32, texture: &WgpuTexture) {
        if !texture.desc.storage {
            diagnostics::report(
                DiagnosticKind::Binding,
                format!("'{}' bound as an image but is not a storage texture", texture.desc.label),
            );
            return;
        }
        self.bind_texture(unit, texture);
    }

    fn dispatch_compute(&mut self, groups: [u32; 3]) {
        let Some(program) = self.program.clone() else {
            diagnostics::report(DiagnosticKind::Binding, "dispatch issued with no program in use");
            return;
        };
        let program = &program.0;
        let Some(pipeline) = program.compute.clone() else {
            diagnostics::report(
                DiagnosticKind::Binding,
                format!("render program '{}' dispatched as compute", program.desc.label),
            );
            return;
        };
        let Some(bind_group) = self.bind_group(program) else {
            return;
        };

        let encoder = self.encoder();
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&program.desc.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
    }

    fn memory_barrier(&mut self, barrier: MemoryBarrier) {
        // wgpu orders passes itself; submitting makes the writes visible to
        // anything recorded afterwards, including work from other encoders.
        match barrier {
            MemoryBarrier::ImageAccess => self.submit(),
        }
    }

    fn bind_target(&mut self, target: &WgpuTarget) {
        self.flush_clear();
        self.target = Some(BoundTarget {
            color: target.color.view.clone(),
            depth: target.depth.view.clone(),
            format: texel_format(target.color.desc.format),
        });
    }

    fn unbind_target(&mut self) {
        self.flush_clear();
        self.target = None;
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.pending_clear = Some(color);
    }

    fn raster_state(&self) -> RasterState {
        self.state
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
    }

    fn set_blend(&mut self, blend: Option<BlendFunc>) {
        self.state.blend = blend;
    }

    fn set_wireframe(&mut self, enabled: bool) {
        self.state.wireframe = enabled;
    }

    fn draw_fullscreen(&mut self, source: Option<&WgpuTexture>) {
        if let Some(source) = source {
            self.bind_texture(SCREEN_UNIT, source);
        }
        let Some(setup) = self.prepare_draw() else {
            return;
        };
        self.run_pass(setup, |pass| pass.draw(0..3, 0..1));
    }

    fn draw_mesh(&mut self, mesh: &WgpuMesh) {
        let Some(setup) = self.prepare_draw() else {
            return;
        };
        self.run_pass(setup, |pass| {
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            if let Some(instances) = &mesh.instance_buffer {
                pass.set_vertex_buffer(1, instances.slice(..));
            }
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..mesh.instance_count);
        });
    }
}
