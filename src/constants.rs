// Window defaults
pub const WINDOW_WIDTH: u32 = 1280;
pub const WINDOW_HEIGHT: u32 = 720;
pub const WINDOW_TITLE: &str = "Procedural Cloudscapes";

// Noise volumes
pub const PERLIN_WORLEY_SIZE: u32 = 128;
pub const WORLEY_SIZE: u32 = 32;
pub const WEATHER_MAP_SIZE: u32 = 1024;
pub const VOLUME_LOCAL_GROUP_SIZE: u32 = 4;
pub const WEATHER_LOCAL_GROUP_SIZE: u32 = 8;

// Texture units used by the cloud raymarcher
pub const WEATHER_MAP_UNIT: u32 = 0;
pub const PERLIN_WORLEY_UNIT: u32 = 1;
pub const WORLEY_UNIT: u32 = 2;
pub const ENVIRONMENT_UNIT: u32 = 3;
/// Unit that receives the source texture of every fullscreen draw.
pub const SCREEN_UNIT: u32 = 4;
/// Unit compute programs write their output image to.
pub const IMAGE_UNIT: u32 = 0;

// Cloud defaults
pub const DEFAULT_GLOBAL_COVERAGE: f32 = 0.3;
pub const DEFAULT_GLOBAL_DENSITY: f32 = 0.5;
pub const DEFAULT_WIND_DIRECTION: [f32; 3] = [0.5, 1.0, 0.1];
pub const DEFAULT_CLOUD_SPEED: f32 = 350.0;
pub const DEFAULT_EDGE_SPEED_MULTIPLIER: f32 = 1.0;
pub const DEFAULT_BEER_COEFFICIENT: f32 = 1.0;
pub const DEFAULT_POWDER_COEFFICIENT: f32 = 10.0;
pub const DEFAULT_EXTRA_SCATTER_INTENSITY: f32 = 2.5;
/// How long the cloud type notification stays on screen after a key press.
pub const CLOUD_TYPE_POPUP_SECONDS: f32 = 0.5;

// Sky defaults
pub const EARTH_RADIUS: f32 = 6371e3;
pub const ATMOSPHERE_RADIUS: f32 = 6420e3;
pub const RAYLEIGH_SCALE_HEIGHT: f32 = 7994.0;
pub const MIE_SCALE_HEIGHT: f32 = 1200.0;
pub const RAYLEIGH_SCATTERING: [f32; 3] = [3.8e-6, 13.5e-6, 33.1e-6];
pub const MIE_SCATTERING: f32 = 21e-6;

// Terrain defaults
pub const TERRAIN_SUBDIVISION: u32 = 2;
pub const TERRAIN_SCALE: f32 = 1000.0;
pub const TERRAIN_TILE_COUNT: u32 = 40;
/// Extra vertices per patch edge standing in for hardware tessellation.
pub const PATCH_TESSELLATION: u32 = 8;

// Camera defaults
pub const CAMERA_YAW: f32 = -90.0;
pub const CAMERA_PITCH: f32 = 0.0;
pub const CAMERA_SPEED: f32 = 5000.0;
pub const CAMERA_SENSITIVITY: f32 = 0.1;
pub const CAMERA_ZOOM: f32 = 60.0;
pub const CAMERA_START: [f32; 3] = [0.0, 600.0, 0.0];
pub const CAMERA_NEAR: f32 = 1.0;
pub const CAMERA_FAR: f32 = 200_000.0;
