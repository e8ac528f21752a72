use std::fmt;

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Cloud genus presets. The discriminant is what the weather map shader
/// receives as `cloud_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum CloudType {
    Cumulus = 0,
    Stratus = 1,
    Stratocumulus = 2,
    Cumulonimbus = 3,
    Mix = 4,
}

impl CloudType {
    pub const ALL: [CloudType; 5] = [
        CloudType::Cumulus,
        CloudType::Stratus,
        CloudType::Stratocumulus,
        CloudType::Cumulonimbus,
        CloudType::Mix,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CloudType::Cumulus => "Cumulus",
            CloudType::Stratus => "Stratus",
            CloudType::Stratocumulus => "Stratocumulus",
            CloudType::Cumulonimbus => "Cumulonimbus",
            CloudType::Mix => "Mix",
        }
    }

    /// Preset selected by the digit keys, `1` being Cumulus.
    pub fn from_digit(digit: u32) -> Option<CloudType> {
        CloudType::ALL.get(digit.checked_sub(1)? as usize).copied()
    }
}

impl fmt::Display for CloudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunable state of the cloud layer.
///
/// Every continuous field is a plain pass-through to the shaders: nothing is
/// clamped or normalized here, so artist-directed extremes survive. The only
/// coupled field is the cloud type, which can only change through
/// [`CloudParameters::set_cloud_type`].
///
/// Useful knob ranges: coverage, density and anvil in [0, 1], cloud speed
/// [0, 1000], edge speed multiplier [0, 100], Beer [0, 5], powder [1, 10],
/// extra scatter [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudParameters {
    // Shape
    pub global_coverage: f32,
    pub global_density: f32,
    pub anvil_amount: f32,
    cloud_type: CloudType,
    pub base_shape_only: bool,

    // Animation
    pub wind_direction: Vec3,
    pub cloud_speed: f32,
    pub edge_speed_multiplier: f32,

    // Lighting
    pub beer_coefficient: f32,
    pub powder_enabled: bool,
    pub powder_coefficient: f32,
    pub extra_scatter_intensity: f32,
    pub color: Vec3,
}

impl Default for CloudParameters {
    fn default() -> Self {
        Self {
            global_coverage: DEFAULT_GLOBAL_COVERAGE,
            global_density: DEFAULT_GLOBAL_DENSITY,
            anvil_amount: 0.0,
            cloud_type: CloudType::Cumulus,
            base_shape_only: false,
            wind_direction: Vec3::from_array(DEFAULT_WIND_DIRECTION),
            cloud_speed: DEFAULT_CLOUD_SPEED,
            edge_speed_multiplier: DEFAULT_EDGE_SPEED_MULTIPLIER,
            beer_coefficient: DEFAULT_BEER_COEFFICIENT,
            powder_enabled: true,
            powder_coefficient: DEFAULT_POWDER_COEFFICIENT,
            extra_scatter_intensity: DEFAULT_EXTRA_SCATTER_INTENSITY,
            color: Vec3::ONE,
        }
    }
}

impl CloudParameters {
    pub fn cloud_type(&self) -> CloudType {
        self.cloud_type
    }

    /// Switches to the `new` preset and redraws coverage, density and anvil
    /// from its ranges. Returns `false`, touching nothing, when `new` is
    /// already active; `true` means the weather map is now stale.
    pub fn set_cloud_type<R: Rng + ?Sized>(&mut self, new: CloudType, rng: &mut R) -> bool {
        if new == self.cloud_type {
            return false;
        }

        self.global_coverage = match new {
            CloudType::Cumulus => rng.random_range(0.1..=0.3),
            CloudType::Stratus => rng.random_range(0.7..=1.0),
            CloudType::Stratocumulus => rng.random_range(0.6..=0.8),
            CloudType::Cumulonimbus => 0.5,
            CloudType::Mix => 0.3,
        };
        self.global_density = match new {
            CloudType::Stratus => rng.random_range(0.1..=0.3),
            CloudType::Stratocumulus => rng.random_range(0.2..=0.5),
            _ => DEFAULT_GLOBAL_DENSITY,
        };
        self.anvil_amount = match new {
            CloudType::Cumulonimbus => rng.random_range(0.0..=1.0),
            CloudType::Mix => rng.random_range(0.0..=0.5),
            _ => 0.0,
        };

        // committed last so the comparison above saw the previous type
        self.cloud_type = new;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0x5EED)
    }

    #[test]
    fn defaults_match_the_initial_scene() {
        let params = CloudParameters::default();
        assert_eq!(params.cloud_type(), CloudType::Cumulus);
        assert_eq!(params.global_coverage, 0.3);
        assert_eq!(params.global_density, 0.5);
        assert_eq!(params.anvil_amount, 0.0);
        assert_eq!(params.wind_direction, Vec3::new(0.5, 1.0, 0.1));
        assert_eq!(params.cloud_speed, 350.0);
        assert!(params.powder_enabled);
        assert_eq!(params.extra_scatter_intensity, 2.5);
    }

    #[test]
    fn same_type_twice_changes_nothing() {
        let mut rng = rng();
        let mut params = CloudParameters::default();

        assert!(params.set_cloud_type(CloudType::Stratus, &mut rng));
        let after_first = params.clone();

        assert!(!params.set_cloud_type(CloudType::Stratus, &mut rng));
        assert_eq!(params, after_first);
    }

    #[test]
    fn cumulus_coverage_stays_in_range() {
        let mut rng = rng();
        let mut params = CloudParameters::default();
        for _ in 0..1000 {
            params.set_cloud_type(CloudType::Stratus, &mut rng);
            assert!(params.set_cloud_type(CloudType::Cumulus, &mut rng));
            assert!(
                (0.1..=0.3).contains(&params.global_coverage),
                "coverage {}",
                params.global_coverage
            );
            assert_eq!(params.global_density, 0.5);
            assert_eq!(params.anvil_amount, 0.0);
        }
    }

    #[test]
    fn stratus_coverage_and_density_stay_in_range() {
        let mut rng = rng();
        let mut params = CloudParameters::default();
        for _ in 0..1000 {
            assert!(params.set_cloud_type(CloudType::Stratus, &mut rng));
            assert!((0.7..=1.0).contains(&params.global_coverage));
            assert!((0.1..=0.3).contains(&params.global_density));
            params.set_cloud_type(CloudType::Mix, &mut rng);
        }
    }

    #[test]
    fn every_preset_uses_its_own_ranges() {
        let mut rng = rng();
        let mut params = CloudParameters::default();
        for _ in 0..200 {
            params.set_cloud_type(CloudType::Stratocumulus, &mut rng);
            assert!((0.6..=0.8).contains(&params.global_coverage));
            assert!((0.2..=0.5).contains(&params.global_density));
            assert_eq!(params.anvil_amount, 0.0);

            params.set_cloud_type(CloudType::Cumulonimbus, &mut rng);
            assert_eq!(params.global_coverage, 0.5);
            assert_eq!(params.global_density, 0.5);
            assert!((0.0..=1.0).contains(&params.anvil_amount));

            params.set_cloud_type(CloudType::Mix, &mut rng);
            assert_eq!(params.global_coverage, 0.3);
            assert!((0.0..=0.5).contains(&params.anvil_amount));
        }
    }

    #[test]
    fn editing_continuous_values_keeps_the_type() {
        let mut params = CloudParameters::default();
        params.global_coverage = 0.95;
        params.global_density = 40.0;
        params.anvil_amount = 1.0;
        assert_eq!(params.cloud_type(), CloudType::Cumulus);
    }

    #[test]
    fn digits_select_presets() {
        assert_eq!(CloudType::from_digit(1), Some(CloudType::Cumulus));
        assert_eq!(CloudType::from_digit(4), Some(CloudType::Cumulonimbus));
        assert_eq!(CloudType::from_digit(5), Some(CloudType::Mix));
        assert_eq!(CloudType::from_digit(0), None);
        assert_eq!(CloudType::from_digit(6), None);
    }
}
