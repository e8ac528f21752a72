//! Keyboard knobs over the scene parameters.
//!
//! Every action maps to one parameter edit. Cloud type selection goes through
//! [`CloudLayer::select_cloud_type`](crate::clouds::CloudLayer::select_cloud_type),
//! the same change-detecting path any other caller uses.

use glam::Vec3;
use rand::Rng;
use winit::keyboard::KeyCode;

use crate::camera::Camera;
use crate::clouds::CloudType;
use crate::compositor::FrameCompositor;
use crate::environment::{Environment, SkyParameters};
use crate::gfx::GraphicsDevice;
use crate::terrain;

const COVERAGE_STEP: f32 = 0.05;
const DENSITY_STEP: f32 = 0.05;
const ANVIL_STEP: f32 = 0.05;
const SUN_ANGLE_STEP: f32 = 0.02;
const SUN_INTENSITY_STEP: f32 = 1.0;
const TERRAIN_SCALE_STEP: f32 = 100.0;

const DEFAULT_CLEAR_COLOR: Vec3 = Vec3::new(0.53, 0.68, 0.85);
const DEFAULT_GRADIENT_TOP: Vec3 = Vec3::new(0.16, 0.33, 0.66);
const DEFAULT_GRADIENT_BOTTOM: Vec3 = Vec3::new(0.78, 0.86, 0.95);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlAction {
    SelectCloudType(CloudType),
    AdjustCoverage(f32),
    AdjustDensity(f32),
    AdjustAnvil(f32),
    TogglePowder,
    ToggleBaseShape,
    AdjustSunAltitude(f32),
    AdjustSunAzimuth(f32),
    AdjustSunIntensity(f32),
    CycleEnvironment,
    ToggleWireframe,
    NewTerrainSeed,
    DefaultTerrainSeed,
    AdjustTerrainScale(f32),
    AdjustTerrainSubdivision(i32),
    ToggleHud,
    ResetCamera,
    SaveSettings,
    LoadSettings,
}

impl ControlAction {
    pub fn from_key(key: KeyCode) -> Option<Self> {
        use ControlAction::*;

        let action = match key {
            KeyCode::Digit1 => SelectCloudType(CloudType::Cumulus),
            KeyCode::Digit2 => SelectCloudType(CloudType::Stratus),
            KeyCode::Digit3 => SelectCloudType(CloudType::Stratocumulus),
            KeyCode::Digit4 => SelectCloudType(CloudType::Cumulonimbus),
            KeyCode::Digit5 => SelectCloudType(CloudType::Mix),
            KeyCode::KeyZ => AdjustCoverage(-COVERAGE_STEP),
            KeyCode::KeyX => AdjustCoverage(COVERAGE_STEP),
            KeyCode::KeyC => AdjustDensity(-DENSITY_STEP),
            KeyCode::KeyV => AdjustDensity(DENSITY_STEP),
            KeyCode::KeyB => AdjustAnvil(-ANVIL_STEP),
            KeyCode::KeyN => AdjustAnvil(ANVIL_STEP),
            KeyCode::KeyP => TogglePowder,
            KeyCode::KeyO => ToggleBaseShape,
            KeyCode::ArrowUp => AdjustSunAltitude(SUN_ANGLE_STEP),
            KeyCode::ArrowDown => AdjustSunAltitude(-SUN_ANGLE_STEP),
            KeyCode::ArrowRight => AdjustSunAzimuth(SUN_ANGLE_STEP),
            KeyCode::ArrowLeft => AdjustSunAzimuth(-SUN_ANGLE_STEP),
            KeyCode::PageUp => AdjustSunIntensity(SUN_INTENSITY_STEP),
            KeyCode::PageDown => AdjustSunIntensity(-SUN_INTENSITY_STEP),
            KeyCode::KeyE => CycleEnvironment,
            KeyCode::KeyT => ToggleWireframe,
            KeyCode::KeyR => NewTerrainSeed,
            KeyCode::KeyG => DefaultTerrainSeed,
            KeyCode::Period => AdjustTerrainScale(TERRAIN_SCALE_STEP),
            KeyCode::Comma => AdjustTerrainScale(-TERRAIN_SCALE_STEP),
            KeyCode::Equal => AdjustTerrainSubdivision(1),
            KeyCode::Minus => AdjustTerrainSubdivision(-1),
            KeyCode::KeyH => ToggleHud,
            KeyCode::Home => ResetCamera,
            KeyCode::F5 => SaveSettings,
            KeyCode::F9 => LoadSettings,
            _ => return None,
        };
        Some(action)
    }
}

/// State of the control surface that outlives single key presses.
#[derive(Debug, Clone)]
pub struct Controls {
    pub hud_visible: bool,
    /// Sky restored when cycling back to the Skybox environment
    stashed_sky: SkyParameters,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            hud_visible: true,
            stashed_sky: SkyParameters::default(),
        }
    }
}

impl Controls {
    /// Applies a scene edit. HUD visibility is handled here too; settings
    /// persistence needs the file system and is left to the caller.
    pub fn apply<D: GraphicsDevice, R: Rng + ?Sized>(
        &mut self,
        action: ControlAction,
        device: &mut D,
        scene: &mut FrameCompositor<D>,
        camera: &mut Camera,
        rng: &mut R,
    ) {
        use ControlAction::*;

        match action {
            SelectCloudType(cloud_type) => {
                scene.clouds.select_cloud_type(device, cloud_type);
            }
            AdjustCoverage(step) => scene.clouds.params_mut().global_coverage += step,
            AdjustDensity(step) => scene.clouds.params_mut().global_density += step,
            AdjustAnvil(step) => scene.clouds.params_mut().anvil_amount += step,
            TogglePowder => {
                let params = scene.clouds.params_mut();
                params.powder_enabled = !params.powder_enabled;
            }
            ToggleBaseShape => {
                let params = scene.clouds.params_mut();
                params.base_shape_only = !params.base_shape_only;
            }
            AdjustSunAltitude(step) => {
                if let Some(sky) = scene.environment.environment_mut().sky_mut() {
                    sky.set_sun_altitude(sky.sun_altitude() + step);
                }
            }
            AdjustSunAzimuth(step) => {
                if let Some(sky) = scene.environment.environment_mut().sky_mut() {
                    sky.set_sun_azimuth(sky.sun_azimuth() + step);
                }
            }
            AdjustSunIntensity(step) => {
                if let Some(sky) = scene.environment.environment_mut().sky_mut() {
                    sky.set_sun_intensity(sky.sun_intensity() + step);
                }
            }
            CycleEnvironment => {
                let next = self.next_environment(scene.environment.environment());
                scene.environment.set_environment(next);
            }
            ToggleWireframe => scene.terrain.toggle_wireframe(),
            NewTerrainSeed => scene.terrain.new_seed(rng),
            DefaultTerrainSeed => scene.terrain.default_seed(),
            AdjustTerrainScale(step) => {
                let params = scene.terrain.params_mut();
                params.scale = (params.scale + step)
                    .clamp(*terrain::ranges::SCALE.start(), *terrain::ranges::SCALE.end());
                scene.terrain.sync(device);
            }
            AdjustTerrainSubdivision(step) => {
                let params = scene.terrain.params_mut();
                params.subdivision = params.subdivision.saturating_add_signed(step).clamp(
                    *terrain::ranges::SUBDIVISION.start(),
                    *terrain::ranges::SUBDIVISION.end(),
                );
                scene.terrain.sync(device);
            }
            ToggleHud => self.hud_visible = !self.hud_visible,
            ResetCamera => camera.reset(),
            SaveSettings | LoadSettings => {}
        }
    }

    /// Skybox, then flat color, then gradient, then back to the sky that
    /// was active before.
    fn next_environment(&mut self, current: &Environment) -> Environment {
        match current {
            Environment::Skybox(sky) => {
                self.stashed_sky = sky.clone();
                Environment::Color {
                    color: DEFAULT_CLEAR_COLOR,
                }
            }
            Environment::Color { .. } => Environment::Gradient {
                top: DEFAULT_GRADIENT_TOP,
                bottom: DEFAULT_GRADIENT_BOTTOM,
            },
            Environment::Gradient { .. } => Environment::Skybox(self.stashed_sky.clone()),
        }
    }
}

/// Text shown by the HUD, one entry per line.
pub fn status_lines<D: GraphicsDevice>(scene: &FrameCompositor<D>, fps: f32) -> Vec<String> {
    let clouds = scene.clouds.params();
    let terrain = scene.terrain.params();

    let mut lines = vec![
        format!("FPS: {:.0}", fps),
        format!(
            "Clouds [1-5]: {}  coverage {:.2} [Z/X]  density {:.2} [C/V]  anvil {:.2} [B/N]",
            clouds.cloud_type(),
            clouds.global_coverage,
            clouds.global_density,
            clouds.anvil_amount
        ),
        format!(
            "Powder [P]: {}  base shape only [O]: {}",
            on_off(clouds.powder_enabled),
            on_off(clouds.base_shape_only)
        ),
    ];

    let environment = scene.environment.environment();
    match environment.sky() {
        Some(sky) => lines.push(format!(
            "Environment [E]: {}  sun altitude {:.2} [Up/Down]  azimuth {:.2} [Left/Right]  intensity {:.1} [PgUp/PgDn]",
            environment.name(),
            sky.sun_altitude(),
            sky.sun_azimuth(),
            sky.sun_intensity()
        )),
        None => lines.push(format!("Environment [E]: {}", environment.name())),
    }

    lines.push(format!(
        "Terrain: wireframe [T] {}  scale {:.0} [,/.]  subdivision {} [-/=]  seed ({:.3}, {:.3}) [R/G]",
        on_off(terrain.wireframe),
        terrain.scale,
        terrain.subdivision,
        terrain.noise.seed.x,
        terrain.noise.seed.y
    ));
    lines.push("F5 save  F9 load  Home reset camera  H hide".to_string());

    if let Some(cloud_type) = scene.clouds.popup() {
        lines.push(String::new());
        lines.push(format!("Cloud type: {}", cloud_type));
    }
    lines
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::compositor::SceneConfig;
    use crate::gfx::{Command, RecordingDevice, ShaderLibrary};

    fn scene(device: &mut RecordingDevice) -> FrameCompositor<RecordingDevice> {
        let shaders = ShaderLibrary::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/shaders"));
        FrameCompositor::new(
            device,
            &shaders,
            SceneConfig {
                width: 64,
                height: 64,
                seed: Some(9),
                ..Default::default()
            },
        )
    }

    #[test]
    fn digits_map_to_presets() {
        assert_eq!(
            ControlAction::from_key(KeyCode::Digit4),
            Some(ControlAction::SelectCloudType(CloudType::Cumulonimbus))
        );
        assert_eq!(ControlAction::from_key(KeyCode::KeyW), None);
    }

    #[test]
    fn digit_press_routes_through_change_detection() {
        let mut device = RecordingDevice::new();
        let mut scene = scene(&mut device);
        let mut camera = Camera::default();
        let mut controls = Controls::default();
        let mut rng = StdRng::seed_from_u64(1);
        device.take_commands();

        let press = ControlAction::from_key(KeyCode::Digit2).expect("mapped");
        controls.apply(press, &mut device, &mut scene, &mut camera, &mut rng);
        controls.apply(press, &mut device, &mut scene, &mut camera, &mut rng);

        assert_eq!(scene.clouds.params().cloud_type(), CloudType::Stratus);
        assert_eq!(
            device.count(|c| matches!(c, Command::Dispatch { program, .. } if program == "Weather Map")),
            1
        );
        assert_eq!(scene.clouds.popup(), Some(CloudType::Stratus));
    }

    #[test]
    fn nudges_are_not_clamped() {
        let mut device = RecordingDevice::new();
        let mut scene = scene(&mut device);
        let mut camera = Camera::default();
        let mut controls = Controls::default();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..40 {
            controls.apply(
                ControlAction::AdjustCoverage(COVERAGE_STEP),
                &mut device,
                &mut scene,
                &mut camera,
                &mut rng,
            );
        }
        assert!(scene.clouds.params().global_coverage > 1.0);
    }

    #[test]
    fn environment_cycle_returns_to_the_same_sky() {
        let mut device = RecordingDevice::new();
        let mut scene = scene(&mut device);
        let mut camera = Camera::default();
        let mut controls = Controls::default();
        let mut rng = StdRng::seed_from_u64(1);

        controls.apply(
            ControlAction::AdjustSunAltitude(0.2),
            &mut device,
            &mut scene,
            &mut camera,
            &mut rng,
        );
        let sky = scene.environment.environment().clone();

        let names: Vec<_> = (0..3)
            .map(|_| {
                controls.apply(
                    ControlAction::CycleEnvironment,
                    &mut device,
                    &mut scene,
                    &mut camera,
                    &mut rng,
                );
                scene.environment.environment().name()
            })
            .collect();
        assert_eq!(names, ["Color", "Gradient", "Skybox"]);
        assert_eq!(scene.environment.environment(), &sky);
    }

    #[test]
    fn sun_keys_do_nothing_without_a_sky() {
        let mut device = RecordingDevice::new();
        let mut scene = scene(&mut device);
        let mut camera = Camera::default();
        let mut controls = Controls::default();
        let mut rng = StdRng::seed_from_u64(1);

        scene.environment.set_environment(Environment::Color { color: Vec3::ZERO });
        controls.apply(
            ControlAction::AdjustSunIntensity(5.0),
            &mut device,
            &mut scene,
            &mut camera,
            &mut rng,
        );
        assert_eq!(
            scene.environment.environment(),
            &Environment::Color { color: Vec3::ZERO }
        );
    }

    #[test]
    fn terrain_nudges_stop_at_their_bounds() {
        let mut device = RecordingDevice::new();
        let mut scene = scene(&mut device);
        let mut camera = Camera::default();
        let mut controls = Controls::default();
        let mut rng = StdRng::seed_from_u64(1);

        let mut press = |action: ControlAction, scene: &mut FrameCompositor<RecordingDevice>, times: u32| {
            for _ in 0..times {
                controls.apply(action, &mut device, scene, &mut camera, &mut rng);
            }
        };

        press(ControlAction::AdjustTerrainScale(-TERRAIN_SCALE_STEP), &mut scene, 15);
        assert_eq!(scene.terrain.params().scale, 100.0);
        press(ControlAction::AdjustTerrainScale(TERRAIN_SCALE_STEP), &mut scene, 30);
        assert_eq!(scene.terrain.params().scale, 2000.0);

        press(ControlAction::AdjustTerrainSubdivision(-1), &mut scene, 5);
        assert_eq!(scene.terrain.params().subdivision, 1);
        press(ControlAction::AdjustTerrainSubdivision(1), &mut scene, 15);
        assert_eq!(scene.terrain.params().subdivision, 10);
    }

    #[test]
    fn status_mentions_popup_while_visible() {
        let mut device = RecordingDevice::new();
        let mut scene = scene(&mut device);

        assert!(!status_lines(&scene, 60.0).iter().any(|l| l.starts_with("Cloud type:")));
        scene.clouds.select_cloud_type(&mut device, CloudType::Mix);
        let lines = status_lines(&scene, 60.0);
        assert_eq!(lines[0], "FPS: 60");
        assert!(lines.iter().any(|l| l == "Cloud type: Mix"));
    }
}
