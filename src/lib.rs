//! Procedural cloudscapes: GPU-generated noise volumes, raymarched clouds,
//! a physically based sky and instanced terrain, composited per frame.

// Graphics device capability and its backends
pub mod gfx;

// Scene layers, in draw order
pub mod environment;
pub mod terrain;
pub mod clouds;
pub mod compositor;

// Viewer and control surface
pub mod app;
pub mod camera;
pub mod controls;
pub mod input;

// Other modules
pub mod constants;
pub mod diagnostics;
pub mod settings;

// Re-exports
pub use camera::{Camera, CameraState};
pub use clouds::{CloudLayer, CloudParameters, CloudType};
pub use compositor::{FrameCompositor, OffscreenTarget, SceneConfig};
pub use diagnostics::DiagnosticKind;
pub use environment::{Environment, EnvironmentLayer, SkyParameters};
pub use gfx::{GraphicsDevice, RecordingDevice, ShaderLibrary, WgpuDevice};
pub use settings::SceneSettings;
pub use terrain::{TerrainLayer, TerrainParameters};
