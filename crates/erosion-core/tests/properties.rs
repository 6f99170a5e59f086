//! End-to-end behaviour of the generation + erosion engine.

use approx::assert_abs_diff_eq;
use erosion_core::erosion::{CancelToken, ErosionModel, HydraulicErosionModel, SimpleErosionModel};
use erosion_core::generator::{FieldGenerator, FixtureShape, FractalGenerator, NoiseStyle};
use erosion_core::instrument::StageRecorder;
use erosion_core::{ErosionMetrics, ErosionParams, SimulationConfig, SimulationOrchestrator, SimulationParameters};

fn orchestrator(generator: &str) -> SimulationOrchestrator {
    let config = SimulationConfig { default_generator: generator.to_string(), ..SimulationConfig::default() };
    SimulationOrchestrator::new(config).expect("built-in strategies")
}

fn params(grid_size: usize) -> SimulationParameters {
    let mut p = SimulationParameters::default();
    p.generation.grid_size = grid_size;
    p.generation.octaves = 4;
    p.generation.scale = 32.0;
    p
}

fn fixture(shape: FixtureShape, n: usize) -> Vec<f32> {
    (0..n * n).map(|i| shape.height(i / n, i % n, n)).collect()
}

fn hydraulic_on(terrain: &[f32], n: usize) -> HydraulicErosionModel {
    let mut m = HydraulicErosionModel::new();
    m.create_resources(n).unwrap();
    m.upload_terrain(terrain).unwrap();
    m
}

#[test]
fn generation_is_deterministic() {
    let p = params(64).generation;
    let mut g = FractalGenerator::new(NoiseStyle::Fbm, 64);
    let a = g.generate(&p).heights;
    let b = g.generate(&p).heights;
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_abs_diff_eq!(x, y, epsilon = 1e-6);
    }

    let mut o = orchestrator("fbm");
    o.regenerate(&params(64)).unwrap();
    let first = o.terrain().to_vec();
    o.regenerate(&params(64)).unwrap();
    assert_eq!(o.terrain(), &first[..]);
}

#[test]
fn normalization_carries_forward_until_seed_changes() {
    let mut o = orchestrator("fbm");
    let p = params(32);
    o.regenerate(&p).unwrap();
    let first = o.generator("fbm").unwrap().normalization().unwrap();

    let mut panned = p.clone();
    panned.generation.pan_offset = [300.0, -120.0];
    let summary = o.regenerate(&panned).unwrap();
    assert!(!summary.normalization_reset);
    let carried = o.generator("fbm").unwrap().normalization().unwrap();
    assert!(carried.global_min <= first.global_min && carried.global_max >= first.global_max);

    let mut reseeded = panned.clone();
    reseeded.generation.seed = 7;
    let summary = o.regenerate(&reseeded).unwrap();
    assert!(summary.normalization_reset);
    let fresh = {
        let mut g = FractalGenerator::new(NoiseStyle::Fbm, 32);
        g.generate(&reseeded.generation);
        g.normalization().unwrap()
    };
    assert_eq!(o.generator("fbm").unwrap().normalization().unwrap(), fresh);
}

#[test]
fn debug_iteration_matches_batched_iteration() {
    let n = 32;
    let mut terrain = fixture(FixtureShape::Bowl, n);
    terrain.iter_mut().enumerate().for_each(|(i, h)| *h += 0.1 * (i % n) as f32 / n as f32);
    let p = ErosionParams::default();

    let mut batched = hydraulic_on(&terrain, n);
    let mut debug = hydraulic_on(&terrain, n);
    // Warm both up so water, sediment and velocity are non-trivial.
    batched.run(3, &p, &CancelToken::default()).unwrap();
    debug.run(3, &p, &CancelToken::default()).unwrap();

    batched.run(1, &p, &CancelToken::default()).unwrap();
    let mut recorder = StageRecorder::new(3);
    debug.run_instrumented(&p, &mut recorder).unwrap();

    for (a, b) in batched.terrain().iter().zip(debug.terrain()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
    for (a, b) in batched.sediment().iter().zip(debug.sediment()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
    assert_eq!(recorder.finish().stages.len(), 9);
}

#[test]
fn slot_a_is_authoritative_for_any_iteration_count() {
    let n = 16;
    let terrain = fixture(FixtureShape::Pyramid, n);
    let p = ErosionParams::default();
    for iterations in 0..=5u32 {
        let mut whole = hydraulic_on(&terrain, n);
        let mut stepped = hydraulic_on(&terrain, n);
        whole.run(iterations, &p, &CancelToken::default()).unwrap();
        for _ in 0..iterations {
            stepped.run(1, &p, &CancelToken::default()).unwrap();
        }
        assert_eq!(whole.terrain(), stepped.terrain(), "terrain after {iterations}");
        assert_eq!(whole.water(), stepped.water(), "water after {iterations}");
        assert_eq!(whole.sediment(), stepped.sediment(), "sediment after {iterations}");
        assert_eq!(whole.velocity(), stepped.velocity(), "velocity after {iterations}");

        let mut simple = SimpleErosionModel::new();
        simple.create_resources(n).unwrap();
        simple.upload_terrain(&terrain).unwrap();
        let mut simple_stepped = SimpleErosionModel::new();
        simple_stepped.create_resources(n).unwrap();
        simple_stepped.upload_terrain(&terrain).unwrap();
        simple.run(iterations, &p, &CancelToken::default()).unwrap();
        for _ in 0..iterations {
            simple_stepped.run(1, &p, &CancelToken::default()).unwrap();
        }
        assert_eq!(simple.terrain(), simple_stepped.terrain(), "thermal after {iterations}");
    }
}

#[test]
fn metrics_are_measured_against_the_baseline() {
    let p = params(32);
    let mut once = orchestrator("fbm");
    once.regenerate(&p).unwrap();
    once.erode(5, &p).unwrap();

    let mut split = orchestrator("fbm");
    split.regenerate(&p).unwrap();
    split.erode(2, &p).unwrap();
    split.erode(3, &p).unwrap();

    assert_eq!(once.total_iterations(), split.total_iterations());
    assert_eq!(once.metrics(), split.metrics());
    assert_eq!(once.metrics(), ErosionMetrics::compute(split.terrain(), split.baseline()));
}

#[test]
fn flat_plane_reaches_equilibrium() {
    let mut o = orchestrator("flat");
    let mut p = params(64);
    p.erosion.evap_rate = 0.5;
    p.erosion.dt = 0.2;
    o.regenerate(&p).unwrap();

    let reached = (1..=500).find(|_| o.erode(1, &p).unwrap().equilibrium);
    assert!(reached.is_some(), "no equilibrium within 500 iterations");
    assert!(o.at_equilibrium());
}

#[test]
fn resize_resets_every_engine() {
    let mut o = orchestrator("pyramid");
    o.register_erosion_model("thermal-copy", Box::new(SimpleErosionModel::new())).unwrap();
    let small = params(16);
    o.regenerate(&small).unwrap();
    o.erode(4, &small).unwrap();
    assert!(o.erosion_model("hydraulic").unwrap().auxiliary_sum() > 0.0);

    let summary = o.regenerate(&params(32)).unwrap();
    assert!(summary.resized);
    assert_eq!(o.grid_size(), 32);
    assert_eq!(o.total_iterations(), 0);
    assert_eq!(o.metrics(), ErosionMetrics::default());
    for name in o.erosion_model_names() {
        let model = o.erosion_model(name).unwrap();
        assert_eq!(model.grid_size(), 32, "{name} not resized");
        assert_eq!(model.auxiliary_sum(), 0.0, "{name} kept auxiliary state");
    }
    for name in o.generator_names() {
        assert_eq!(o.generator(name).unwrap().grid_size(), 32, "{name} not resized");
    }
}

#[test]
fn example_scenario_erodes_and_deposits() {
    let mut p = SimulationParameters::default();
    p.generation.grid_size = 64;
    p.generation.octaves = 4;
    p.generation.seed = 42;
    p.generation.persistence = 0.5;
    p.generation.lacunarity = 2.0;
    p.generation.scale = 64.0;
    p.generation.hurst = 0.6;
    p.erosion = ErosionParams {
        rain_amount: 0.01,
        evap_rate: 0.1,
        solubility: 0.5,
        deposition_rate: 0.3,
        capacity_factor: 8.0,
        sea_level: 0.15,
        height_multiplier: 10.0,
        add_rain: true,
        ..ErosionParams::default()
    };

    let mut o = orchestrator("fbm");
    o.regenerate(&p).unwrap();
    let before = o.metrics();
    assert_eq!(before, ErosionMetrics::default());

    let outcome = o.erode(10, &p).unwrap();
    let after = o.metrics();
    assert_eq!(outcome.metrics, after);
    assert!(after.erosion_amount >= 0.0 && after.deposition_amount >= 0.0);
    assert!(after.erosion_amount > before.erosion_amount, "no erosion: {after:?}");
    assert!(after.deposition_amount > before.deposition_amount, "no deposition: {after:?}");
}
