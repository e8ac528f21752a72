//! Scene settings persistence.
//!
//! File layout: 4-byte magic, little-endian `u32` version, little-endian
//! `u64` payload length, then the bincode payload.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::Camera;
use crate::clouds::CloudParameters;
use crate::compositor::FrameCompositor;
use crate::environment::Environment;
use crate::gfx::GraphicsDevice;
use crate::terrain::TerrainParameters;

const MAGIC_HEADER: &[u8; 4] = b"PCSS";
const VERSION: u32 = 1;
const FILE_NAME: &str = "scene.settings";
/// Payloads above this are treated as corrupt rather than allocated.
const MAX_PAYLOAD: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("not a settings file")]
    BadMagic,
    #[error("unsupported settings version {0}")]
    UnsupportedVersion(u32),
    #[error("settings payload of {0} bytes is too large")]
    PayloadTooLarge(u64),
    #[error("settings encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Everything the user can tune, in one serializable bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSettings {
    pub clouds: CloudParameters,
    pub environment: Environment,
    pub terrain: TerrainParameters,
    pub camera_speed: f32,
}

impl SceneSettings {
    pub fn capture<D: GraphicsDevice>(scene: &FrameCompositor<D>, camera: &Camera) -> Self {
        Self {
            clouds: scene.clouds.params().clone(),
            environment: scene.environment.environment().clone(),
            terrain: *scene.terrain.params(),
            camera_speed: camera.speed,
        }
    }

    /// Pushes the settings into a live scene, regenerating whatever GPU
    /// data they invalidate.
    pub fn apply<D: GraphicsDevice>(
        self,
        device: &mut D,
        scene: &mut FrameCompositor<D>,
        camera: &mut Camera,
    ) {
        scene.clouds.apply_parameters(device, self.clouds);
        scene.environment.set_environment(self.environment);
        scene.terrain.apply_parameters(device, self.terrain);
        camera.speed = self.camera_speed;
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), SettingsError> {
        let data = bincode::serialize(self)?;

        writer.write_all(MAGIC_HEADER)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(data.len() as u64).to_le_bytes())?;
        writer.write_all(&data)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, SettingsError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC_HEADER {
            return Err(SettingsError::BadMagic);
        }

        let mut version_bytes = [0u8; 4];
        reader.read_exact(&mut version_bytes)?;
        let version = u32::from_le_bytes(version_bytes);
        if version != VERSION {
            return Err(SettingsError::UnsupportedVersion(version));
        }

        let mut size_bytes = [0u8; 8];
        reader.read_exact(&mut size_bytes)?;
        let size = u64::from_le_bytes(size_bytes);
        if size > MAX_PAYLOAD {
            return Err(SettingsError::PayloadTooLarge(size));
        }

        let mut data = vec![0u8; size as usize];
        reader.read_exact(&mut data)?;
        Ok(bincode::deserialize(&data)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.write_to(BufWriter::new(File::create(path)?))?;
        tracing::info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let settings = Self::read_from(BufReader::new(File::open(path)?))?;
        tracing::info!("Settings loaded from {}", path.display());
        Ok(settings)
    }
}

/// Per-user config location, or the working directory when the platform
/// has none.
pub fn default_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "cloudscapes")
        .map(|dirs| dirs.config_dir().join(FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(FILE_NAME))
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::clouds::CloudType;

    fn sample() -> SceneSettings {
        let mut clouds = CloudParameters::default();
        clouds.set_cloud_type(CloudType::Stratus, &mut StdRng::seed_from_u64(4));
        clouds.wind_direction = Vec3::new(2.0, 0.0, -1.0);

        SceneSettings {
            clouds,
            environment: Environment::Gradient {
                top: Vec3::Z,
                bottom: Vec3::ONE,
            },
            terrain: TerrainParameters {
                subdivision: 5,
                ..Default::default()
            },
            camera_speed: 1234.0,
        }
    }

    #[test]
    fn settings_survive_a_file() {
        let path = std::env::temp_dir()
            .join(format!("cloudscapes-settings-{}", std::process::id()))
            .join(FILE_NAME);
        let settings = sample();

        settings.save(&path).unwrap();
        let loaded = SceneSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.clouds.cloud_type(), CloudType::Stratus);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn foreign_files_are_rejected() {
        let result = SceneSettings::read_from(&b"R3DW\x01\x00\x00\x00"[..]);
        assert!(matches!(result, Err(SettingsError::BadMagic)));
    }

    #[test]
    fn newer_versions_are_rejected() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes).unwrap();
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());

        let result = SceneSettings::read_from(bytes.as_slice());
        assert!(matches!(result, Err(SettingsError::UnsupportedVersion(2))));
    }

    #[test]
    fn truncated_payload_is_an_io_error() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);

        let result = SceneSettings::read_from(bytes.as_slice());
        assert!(matches!(result, Err(SettingsError::Io(_))));
    }

    #[test]
    fn absurd_lengths_are_not_allocated() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC_HEADER);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());

        let result = SceneSettings::read_from(bytes.as_slice());
        assert!(matches!(result, Err(SettingsError::PayloadTooLarge(_))));
    }

    #[test]
    fn default_path_ends_with_file_name() {
        assert!(default_path().ends_with(FILE_NAME));
    }
}
