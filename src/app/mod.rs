//! Windowed application: CLI, event loop and HUD.

mod hud;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use thiserror::Error;
use winit::{
    event::{DeviceEvent, ElementState, Event, KeyEvent, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::PhysicalKey,
    window::WindowBuilder,
};

use crate::camera::Camera;
use crate::compositor::{FrameCompositor, SceneConfig};
use crate::constants::*;
use crate::diagnostics;
use crate::gfx::{GfxError, RecordingDevice, ShaderLibrary};
use state::State;

/// Real-time volumetric clouds over procedural terrain
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Window width in pixels
    #[arg(long, default_value_t = WINDOW_WIDTH)]
    pub width: u32,

    /// Window height in pixels
    #[arg(long, default_value_t = WINDOW_HEIGHT)]
    pub height: u32,

    /// Directory holding the WGSL shaders
    #[arg(long, default_value = "assets/shaders")]
    pub shader_dir: PathBuf,

    /// Settings file used by F5/F9 (defaults to the user config directory)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Seed for cloud presets and terrain seeds
    #[arg(long)]
    pub seed: Option<u64>,

    /// Synchronise presentation with the display
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub vsync: bool,

    /// Record this many frames without a GPU and log the command stream
    #[arg(long)]
    pub dry_run: Option<u32>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Gfx(#[from] GfxError),
}

pub fn run(args: Args) -> Result<(), AppError> {
    if let Some(frames) = args.dry_run {
        dry_run(&args, frames);
        return Ok(());
    }

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(WINDOW_TITLE)
            .with_inner_size(winit::dpi::LogicalSize::new(args.width, args.height))
            .build(&event_loop)?,
    );

    let mut state = pollster::block_on(State::new(window, &args))?;

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent {
                event: WindowEvent::Resized(size),
                ..
            } => {
                state.resize(size);
                state.window.request_redraw();
            }
            Event::WindowEvent {
                event: WindowEvent::RedrawRequested,
                ..
            } => {
                state.frame_count += 1;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_fps_update).as_secs_f32();

                if elapsed >= 0.5 {
                    state.current_fps = state.frame_count as f32 / elapsed;
                    state.frame_count = 0;
                    state.last_fps_update = now;
                }

                state.update();

                match state.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => state.resize(state.window.inner_size()),
                    Err(wgpu::SurfaceError::OutOfMemory) => elwt.exit(),
                    Err(e) => tracing::error!("Render error: {:?}", e),
                }

                state.window.request_redraw();
            }
            Event::WindowEvent {
                event:
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                physical_key: PhysicalKey::Code(key),
                                state: key_state,
                                repeat,
                                ..
                            },
                        ..
                    },
                ..
            } => {
                let pressed = key_state == ElementState::Pressed;
                // held keys would otherwise re-trigger presets and toggles
                if !(pressed && repeat) || is_nudge(key) {
                    state.handle_key(key, pressed);
                }
            }
            Event::WindowEvent {
                event: WindowEvent::MouseInput {
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                if !state.mouse_captured() {
                    state.capture_mouse();
                }
            }
            Event::WindowEvent {
                event: WindowEvent::MouseWheel { delta, .. },
                ..
            } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / 40.0,
                };
                state.scroll(lines);
            }
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } => state.mouse_motion(delta.0, delta.1),
            Event::AboutToWait => state.window.request_redraw(),
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => elwt.exit(),
            _ => {}
        }
    })?;

    Ok(())
}

/// Keys whose auto-repeat is useful: the continuous parameter nudges.
fn is_nudge(key: winit::keyboard::KeyCode) -> bool {
    use crate::controls::ControlAction::*;

    matches!(
        crate::controls::ControlAction::from_key(key),
        Some(
            AdjustCoverage(_)
                | AdjustDensity(_)
                | AdjustAnvil(_)
                | AdjustSunAltitude(_)
                | AdjustSunAzimuth(_)
                | AdjustSunIntensity(_)
        )
    )
}

/// Builds the scene on a [`RecordingDevice`] and logs what a few frames
/// would send to the GPU. Useful for checking shaders load and the frame
/// order without a window.
fn dry_run(args: &Args, frames: u32) {
    let mut device = RecordingDevice::new();
    let shaders = ShaderLibrary::new(args.shader_dir.clone());
    let scene = FrameCompositor::new(
        &mut device,
        &shaders,
        SceneConfig {
            width: args.width,
            height: args.height,
            seed: args.seed,
            ..Default::default()
        },
    );
    let camera = Camera::default().snapshot(args.width, args.height);

    let setup = device.take_commands();
    tracing::info!("Setup recorded {} commands", setup.len());
    for command in &setup {
        tracing::debug!("{:?}", command);
    }

    for frame in 0..frames {
        scene.render_frame(&mut device, &camera, frame as f32 / 60.0);
        let commands = device.take_commands();
        let draws = commands.iter().filter(|c| c.is_draw()).count();
        tracing::info!(
            "Frame {}: {} commands, {} draws",
            frame,
            commands.len(),
            draws
        );
        for command in &commands {
            tracing::debug!("{:?}", command);
        }
    }

    let reports = diagnostics::drain();
    if reports.is_empty() {
        tracing::info!("Dry run finished cleanly");
    } else {
        tracing::warn!("Dry run finished with {} diagnostics", reports.len());
    }
}
