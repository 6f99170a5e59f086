//! Simulation parameter vector.
//!
//! Serialized as flat camelCase JSON (`gridSize`, `rainAmount`, …) so capture
//! documents and the defaults file share one shape.

use serde::{Deserialize, Serialize};

/// Inputs of the field generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationParams {
    /// Grid edge length; power of two.
    pub grid_size: usize,
    pub octaves: u32,
    /// Per-octave amplitude factor.
    pub persistence: f32,
    /// Per-octave frequency factor.
    pub lacunarity: f32,
    /// Roughness control; normalized heights are raised to `1 / hurst`.
    pub hurst: f32,
    /// World-space feature size in cells (base wavelength).
    pub scale: f32,
    pub seed: u32,
    /// World-space offset applied before sampling, in cells.
    pub pan_offset: [f32; 2],
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            grid_size: 256,
            octaves: 6,
            persistence: 0.5,
            lacunarity: 2.0,
            hurst: 0.7,
            scale: 128.0,
            seed: 42,
            pan_offset: [0.0, 0.0],
        }
    }
}

impl GenerationParams {
    /// True when a change from `other` invalidates accumulated normalization
    /// bounds (octaves, persistence, lacunarity, hurst, seed).
    ///
    /// Scale and pan are deliberately excluded: camera-driven changes keep the
    /// running bounds so the field does not flicker.
    pub fn world_shape_differs(&self, other: &GenerationParams) -> bool {
        self.octaves != other.octaves
            || self.persistence != other.persistence
            || self.lacunarity != other.lacunarity
            || self.hurst != other.hurst
            || self.seed != other.seed
    }
}

/// Inputs of the erosion models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErosionParams {
    /// Water added per cell per iteration when `add_rain` is set.
    pub rain_amount: f32,
    pub evap_rate: f32,
    /// Fraction of the capacity deficit picked up per iteration.
    pub solubility: f32,
    /// Fraction of the capacity excess dropped per iteration.
    pub deposition_rate: f32,
    pub capacity_factor: f32,
    /// Normalized height below which cells act as sediment sinks.
    pub sea_level: f32,
    pub dt: f32,
    pub cell_size: f32,
    /// World-space height of a normalized height of 1.
    pub height_multiplier: f32,
    /// Gradient magnitude below which flow is suppressed; also the capacity
    /// velocity floor and the thermal talus threshold.
    pub min_slope: f32,
    pub velocity_damping: f32,
    /// Flow acceleration coefficient applied to the surface gradient.
    pub gravity: f32,
    pub add_rain: bool,
}

impl Default for ErosionParams {
    fn default() -> Self {
        Self {
            rain_amount: 0.01,
            evap_rate: 0.1,
            solubility: 0.5,
            deposition_rate: 0.3,
            capacity_factor: 8.0,
            sea_level: 0.15,
            dt: 0.1,
            cell_size: 1.0,
            height_multiplier: 10.0,
            min_slope: 0.01,
            velocity_damping: 0.99,
            gravity: 9.81,
            add_rain: true,
        }
    }
}

/// Full parameter set handed to every operation. Never mutated in place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationParameters {
    #[serde(flatten)]
    pub generation: GenerationParams,
    #[serde(flatten)]
    pub erosion: ErosionParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_flat_camel_case() {
        let json = serde_json::to_value(SimulationParameters::default()).unwrap();
        let obj = json.as_object().unwrap();
        for key in ["gridSize", "octaves", "panOffset", "rainAmount", "evapRate", "heightMultiplier", "addRain"] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        assert!(!obj.contains_key("generation"), "sub-structs must be flattened");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let p: SimulationParameters =
            serde_json::from_str(r#"{"gridSize": 64, "seed": 7, "solubility": 0.2}"#).unwrap();
        assert_eq!(p.generation.grid_size, 64);
        assert_eq!(p.generation.seed, 7);
        assert_eq!(p.generation.octaves, GenerationParams::default().octaves);
        assert_eq!(p.erosion.solubility, 0.2);
        assert_eq!(p.erosion.dt, ErosionParams::default().dt);
    }

    #[test]
    fn pan_and_scale_are_not_world_shaping() {
        let a = GenerationParams::default();
        let b = GenerationParams { pan_offset: [30.0, -4.0], scale: 12.0, ..a.clone() };
        assert!(!a.world_shape_differs(&b));
        let c = GenerationParams { seed: a.seed + 1, ..a.clone() };
        assert!(a.world_shape_differs(&c));
        let d = GenerationParams { hurst: 0.3, ..a.clone() };
        assert!(a.world_shape_differs(&d));
    }
}
