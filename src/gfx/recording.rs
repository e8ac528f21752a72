//! A GPU-less device that records every call.
//!
//! Used by the tests to check ordering contracts (barriers before sampling,
//! blend state restored after compositing) and by `--dry-run` to print the
//! command stream of a few frames.

use super::{
    BlendFunc, GfxError, GraphicsDevice, MemoryBarrier, MeshData, ProgramDesc, RasterState,
    SlotKind, TargetDesc, TargetStatus, TexelFormat, TextureDesc,
};

/// Largest 2D texture side the recorder accepts, matching common hardware.
pub const MAX_TEXTURE_DIMENSION: u32 = 8192;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTexture {
    pub id: u32,
    pub desc: TextureDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTarget {
    pub id: u32,
    pub color: RecordedTexture,
    pub depth: RecordedTexture,
    pub status: TargetStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedProgram {
    pub id: u32,
    pub desc: ProgramDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMesh {
    pub id: u32,
    pub index_count: usize,
    pub instance_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTexture { id: u32, label: String },
    CreateTarget { id: u32, status: TargetStatus },
    CreateProgram { id: u32, label: String },
    CreateMesh { id: u32, label: String },
    UseProgram { label: String },
    SetUniforms { size: usize },
    BindTexture { unit: u32, texture: u32 },
    BindImage { unit: u32, texture: u32 },
    Dispatch { program: String, groups: [u32; 3] },
    Barrier(MemoryBarrier),
    BindTarget { target: u32 },
    UnbindTarget,
    Clear { target: Option<u32> },
    SetDepthTest(bool),
    SetBlend(Option<BlendFunc>),
    SetWireframe(bool),
    DrawFullscreen {
        program: String,
        source: Option<u32>,
        target: Option<u32>,
        state: RasterState,
    },
    DrawMesh {
        program: String,
        mesh: u32,
        target: Option<u32>,
        state: RasterState,
    },
}

impl Command {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Command::DrawFullscreen { .. } | Command::DrawMesh { .. }
        )
    }
}

#[derive(Debug, Default)]
pub struct RecordingDevice {
    commands: Vec<Command>,
    next_id: u32,
    program: Option<RecordedProgram>,
    target: Option<u32>,
    state: RasterState,
    failing_programs: Vec<String>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create_program` fail for every program whose label contains `pattern`.
    pub fn fail_programs_matching(&mut self, pattern: &str) {
        self.failing_programs.push(pattern.to_string());
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Labels of every program dispatched, in order.
    pub fn dispatches(&self) -> Vec<(String, [u32; 3])> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Dispatch { program, groups } => Some((program.clone(), *groups)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn texture(&mut self, desc: TextureDesc) -> RecordedTexture {
        let id = self.next_id();
        self.commands.push(Command::CreateTexture {
            id,
            label: desc.label.clone(),
        });
        RecordedTexture { id, desc }
    }

    fn program_label(&self) -> String {
        self.program
            .as_ref()
            .map(|p| p.desc.label.clone())
            .unwrap_or_default()
    }
}

impl GraphicsDevice for RecordingDevice {
    type Texture = RecordedTexture;
    type Target = RecordedTarget;
    type Program = RecordedProgram;
    type Mesh = RecordedMesh;

    fn create_texture(&mut self, desc: &TextureDesc) -> RecordedTexture {
        self.texture(desc.clone())
    }

    fn create_target(&mut self, desc: &TargetDesc) -> RecordedTarget {
        let status = desc.validate(MAX_TEXTURE_DIMENSION);
        let (width, height) = if status.is_complete() {
            (desc.width, desc.height)
        } else {
            (1, 1)
        };
        let extent = super::Extent::D2 { width, height };

        let color = self.texture(TextureDesc {
            label: format!("{} Color", desc.label),
            extent,
            format: if status.is_complete() {
                desc.color_format
            } else {
                TexelFormat::Rgba8Unorm
            },
            wrap: super::WrapMode::ClampToEdge,
            storage: false,
            render_target: true,
        });
        let depth = self.texture(TextureDesc {
            label: format!("{} Depth", desc.label),
            extent,
            format: TexelFormat::Depth32Float,
            wrap: super::WrapMode::ClampToEdge,
            storage: false,
            render_target: true,
        });

        let id = self.next_id();
        self.commands.push(Command::CreateTarget { id, status });
        RecordedTarget {
            id,
            color,
            depth,
            status,
        }
    }

    fn target_status(&self, target: &RecordedTarget) -> TargetStatus {
        target.status
    }

    fn target_color<'t>(&self, target: &'t RecordedTarget) -> &'t RecordedTexture {
        &target.color
    }

    fn create_program(
        &mut self,
        desc: &ProgramDesc,
        source: &str,
    ) -> Result<RecordedProgram, GfxError> {
        if self
            .failing_programs
            .iter()
            .any(|pattern| desc.label.contains(pattern.as_str()))
            || source.trim().is_empty()
        {
            return Err(GfxError::Compile {
                label: desc.label.clone(),
                message: "rejected by recording device".to_string(),
            });
        }

        let id = self.next_id();
        self.commands.push(Command::CreateProgram {
            id,
            label: desc.label.clone(),
        });
        Ok(RecordedProgram {
            id,
            desc: desc.clone(),
        })
    }

    fn create_mesh(&mut self, label: &str, data: &MeshData) -> RecordedMesh {
        let id = self.next_id();
        self.commands.push(Command::CreateMesh {
            id,
            label: label.to_string(),
        });
        RecordedMesh {
            id,
            index_count: data.indices.len(),
            instance_count: data.instance_count(),
        }
    }

    fn use_program(&mut self, program: &RecordedProgram) {
        self.commands.push(Command::UseProgram {
            label: program.desc.label.clone(),
        });
        self.program = Some(program.clone());
    }

    fn set_uniforms(&mut self, bytes: &[u8]) {
        self.commands.push(Command::SetUniforms { size: bytes.len() });
    }

    fn bind_texture(&mut self, unit: u32, texture: &RecordedTexture) {
        self.commands.push(Command::BindTexture {
            unit,
            texture: texture.id,
        });
    }

    fn bind_image(&mut self, unit: u32, texture: &RecordedTexture) {
        let declared = self.program.as_ref().is_some_and(|p| {
            p.desc
                .slots
                .iter()
                .any(|s| s.unit == unit && matches!(s.kind, SlotKind::Image(..)))
        });
        if !declared {
            tracing::warn!("Image bound on unit {} not declared by the program", unit);
        }
        self.commands.push(Command::BindImage {
            unit,
            texture: texture.id,
        });
    }

    fn dispatch_compute(&mut self, groups: [u32; 3]) {
        let program = self.program_label();
        self.commands.push(Command::Dispatch { program, groups });
    }

    fn memory_barrier(&mut self, barrier: MemoryBarrier) {
        self.commands.push(Command::Barrier(barrier));
    }

    fn bind_target(&mut self, target: &RecordedTarget) {
        self.target = Some(target.id);
        self.commands.push(Command::BindTarget { target: target.id });
    }

    fn unbind_target(&mut self) {
        self.target = None;
        self.commands.push(Command::UnbindTarget);
    }

    fn clear(&mut self, _color: [f32; 4]) {
        self.commands.push(Command::Clear {
            target: self.target,
        });
    }

    fn raster_state(&self) -> RasterState {
        self.state
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
        self.commands.push(Command::SetDepthTest(enabled));
    }

    fn set_blend(&mut self, blend: Option<BlendFunc>) {
        self.state.blend = blend;
        self.commands.push(Command::SetBlend(blend));
    }

    fn set_wireframe(&mut self, enabled: bool) {
        self.state.wireframe = enabled;
        self.commands.push(Command::SetWireframe(enabled));
    }

    fn draw_fullscreen(&mut self, source: Option<&RecordedTexture>) {
        let program = self.program_label();
        self.commands.push(Command::DrawFullscreen {
            program,
            source: source.map(|t| t.id),
            target: self.target,
            state: self.state,
        });
    }

    fn draw_mesh(&mut self, mesh: &RecordedMesh) {
        let program = self.program_label();
        self.commands.push(Command::DrawMesh {
            program,
            mesh: mesh.id,
            target: self.target,
            state: self.state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{BlendFactor, ProgramKind};

    #[test]
    fn draws_capture_raster_state_and_target() {
        let mut device = RecordingDevice::new();
        let target = device.create_target(&TargetDesc {
            label: "Offscreen".into(),
            width: 64,
            height: 32,
            color_format: TexelFormat::Rgba8Unorm,
        });
        let program = device
            .create_program(
                &ProgramDesc::new("Blit", "screen/blit.wgsl", ProgramKind::Screen),
                "fn fs_main() {}",
            )
            .unwrap();

        device.use_program(&program);
        device.bind_target(&target);
        device.set_blend(Some(BlendFunc::new(
            BlendFactor::DstAlpha,
            BlendFactor::SrcAlpha,
        )));
        device.draw_fullscreen(Some(&target.color));

        let draw = device.commands().iter().rev().find(|c| c.is_draw()).unwrap();
        match draw {
            Command::DrawFullscreen {
                program,
                target: bound,
                state,
                ..
            } => {
                assert_eq!(program, "Blit");
                assert_eq!(*bound, Some(target.id));
                assert!(state.blend.is_some());
                assert!(state.depth_test);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn invalid_target_becomes_placeholder() {
        let mut device = RecordingDevice::new();
        let target = device.create_target(&TargetDesc {
            label: "Broken".into(),
            width: 0,
            height: 0,
            color_format: TexelFormat::Rgba16Float,
        });
        assert!(!device.target_status(&target).is_complete());
        assert_eq!(
            device.target_color(&target).desc.extent,
            crate::gfx::Extent::D2 {
                width: 1,
                height: 1
            }
        );
    }

    #[test]
    fn programs_can_be_forced_to_fail() {
        let mut device = RecordingDevice::new();
        device.fail_programs_matching("Clouds");
        let desc = ProgramDesc::new("Clouds Raymarch", "clouds/clouds.wgsl", ProgramKind::Screen);
        assert!(device.create_program(&desc, "fn fs_main() {}").is_err());
    }
}
