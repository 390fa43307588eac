//! End-to-end guided sampling on a tiny model

use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use burn_crystal::net::{CspNet, CspNetConfig, PropertyHead};
use burn_crystal::samplers::{BetaSchedule, BetaSchedulerConfig};
use burn_crystal::{
    CrystalBatch, CrystalDiffusion, DiffusionConfig, SampleOptions, StructureIndex,
    MAX_ATOMIC_NUM,
};

type Inner = NdArray<f32>;
type TestBackend = Autodiff<Inner>;

const TIMESTEPS: usize = 10;
const TIME_DIM: usize = 8;

fn guided_model(device: &<Inner as Backend>::Device) -> CrystalDiffusion<TestBackend> {
    let config = DiffusionConfig::default()
        .with_timesteps(TIMESTEPS)
        .with_model(
            CspNetConfig::default()
                .with_hidden_dim(16)
                .with_num_layers(2)
                .with_smooth(true)
                .with_property(PropertyHead::GraphLevel(1)),
        )
        .with_time_dim(TIME_DIM);
    let config = DiffusionConfig {
        beta_scheduler: BetaSchedulerConfig::default().with_schedule(BetaSchedule::Linear),
        ..config
    };
    CrystalDiffusion::new(config, device).unwrap()
}

fn uncond_model(device: &<Inner as Backend>::Device) -> CspNet<Inner> {
    CspNetConfig::default()
        .with_hidden_dim(16)
        .with_latent_dim(TIME_DIM)
        .with_num_layers(2)
        .with_smooth(true)
        .with_pred_type(true)
        .init(device)
        .unwrap()
}

/// Two single-atom structures in cubic cells with target property 1.0
fn batch(device: &<Inner as Backend>::Device) -> CrystalBatch<Inner> {
    let index = StructureIndex::from_num_atoms(&[1, 1]).unwrap();
    let frac = Tensor::from_data(
        TensorData::new(vec![0.0f32, 0.0, 0.0, 0.5, 0.5, 0.5], [2, 3]),
        device,
    );
    let mut cells = vec![0.0f32; 18];
    for s in 0..2 {
        for i in 0..3 {
            cells[s * 9 + i * 4] = 3.5;
        }
    }
    let lattices = Tensor::from_data(TensorData::new(cells, [2, 3, 3]), device);
    let types = Tensor::from_data(TensorData::new(vec![11i64, 17], [2]), device);

    CrystalBatch::new(index, frac, lattices, types)
        .unwrap()
        .with_target(Tensor::ones([2, 1], device))
        .unwrap()
}

#[test]
fn sample_records_every_timestep() {
    let device = Default::default();
    let model = guided_model(&device);
    let uncond = uncond_model(&device);
    let batch = batch(&device);

    let output = model
        .sample(&batch, &uncond, &SampleOptions::default().with_aug(0.0))
        .unwrap();

    let trajectory = &output.trajectory;
    assert_eq!(trajectory.len(), TIMESTEPS + 1);
    assert_eq!(
        trajectory.timesteps(),
        (0..=TIMESTEPS).rev().collect::<Vec<_>>()
    );

    let species = output.structure.species();
    assert_eq!(species.len(), 2);
    assert!(species.iter().all(|&id| (1..=MAX_ATOMIC_NUM).contains(&id)));
    assert_eq!(output.structure.num_atoms, vec![1, 1]);
    assert_eq!(output.structure.lattices.dims(), [2, 3, 3]);

    let coords: Vec<f32> = output.structure.frac_coords.into_data().iter::<f32>().collect();
    assert!(coords.iter().all(|&x| (0.0..1.0).contains(&x)));

    let stack = trajectory.stack().unwrap();
    assert_eq!(stack.atom_types.dims(), [TIMESTEPS + 1, 2]);
    assert_eq!(stack.all_frac_coords.dims(), [TIMESTEPS + 1, 2, 3]);
    assert_eq!(stack.all_lattices.dims(), [TIMESTEPS + 1, 2, 3, 3]);
}

#[test]
fn guided_sample_stays_finite() {
    let device = Default::default();
    let model = guided_model(&device);
    let uncond = uncond_model(&device);
    let batch = batch(&device);

    let mut options = SampleOptions::default().with_aug(1.0);
    options.debug.nan = true;
    options.debug.sampler = true;

    let output = model.sample(&batch, &uncond, &options).unwrap();
    assert_eq!(output.trajectory.len(), TIMESTEPS + 1);
}

#[test]
fn partial_schedule_starts_from_corrupted_batch() {
    let device = Default::default();
    let model = guided_model(&device);
    let uncond = uncond_model(&device);
    let batch = batch(&device);

    let output = model
        .sample(
            &batch,
            &uncond,
            &SampleOptions::default().with_diffusion_ratio(0.5),
        )
        .unwrap();
    assert_eq!(output.trajectory.timesteps(), vec![5, 4, 3, 2, 1, 0]);
}

#[test]
fn masked_sample_runs_with_partial_mask() {
    let device = Default::default();
    let model = guided_model(&device);
    let uncond = uncond_model(&device);
    let batch = batch(&device);

    let output = model
        .masked_sample(&batch, &uncond, &SampleOptions::default(), &[1.0, 0.0])
        .unwrap();
    assert_eq!(output.trajectory.len(), TIMESTEPS + 1);
    assert_eq!(output.structure.species().len(), 2);
}

#[test]
fn diffusion_model_scores_as_uncond() {
    use burn_crystal::ScoreModel;

    let device = Default::default();
    let config = DiffusionConfig::default()
        .with_timesteps(TIMESTEPS)
        .with_model(
            CspNetConfig::default()
                .with_hidden_dim(16)
                .with_num_layers(1)
                .with_smooth(true)
                .with_pred_type(true)
                .with_property(PropertyHead::GraphLevel(1)),
        )
        .with_time_dim(TIME_DIM);
    let auxiliary = CrystalDiffusion::<Inner>::new(config, &device).unwrap();
    assert!(auxiliary.predicts_types());

    let model = guided_model(&device);
    let output = model
        .sample(&batch(&device), &auxiliary, &SampleOptions::default().with_aug(0.5))
        .unwrap();
    assert_eq!(output.trajectory.len(), TIMESTEPS + 1);
}

#[test]
fn node_level_property_guides_per_atom() {
    let device = Default::default();
    let config = DiffusionConfig::default()
        .with_timesteps(TIMESTEPS)
        .with_model(
            CspNetConfig::default()
                .with_hidden_dim(16)
                .with_num_layers(1)
                .with_smooth(true)
                .with_property(PropertyHead::NodeLevel(2)),
        )
        .with_time_dim(TIME_DIM);
    let model = CrystalDiffusion::<TestBackend>::new(config, &device).unwrap();
    let uncond = uncond_model(&device);

    // One three-atom structure, so a per-atom target has more rows than structures
    let index = StructureIndex::from_num_atoms(&[3]).unwrap();
    let frac = Tensor::from_data(
        TensorData::new(vec![0.0f32, 0.0, 0.0, 0.5, 0.5, 0.0, 0.25, 0.5, 0.75], [3, 3]),
        &device,
    );
    let lattices = Tensor::from_data(
        TensorData::new(vec![4.0f32, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 4.0], [1, 3, 3]),
        &device,
    );
    let types = Tensor::from_data(TensorData::new(vec![8i64, 22, 38], [3]), &device);
    let batch = CrystalBatch::new(index, frac, lattices, types)
        .unwrap()
        .with_target(Tensor::from_data(
            TensorData::new(vec![0.5f32, -0.5, 1.0, 2.0, 0.0, 0.0], [3, 2]),
            &device,
        ))
        .unwrap();

    let mut options = SampleOptions::default().with_aug(1.0);
    options.debug.nan = true;
    let output = model.sample(&batch, &uncond, &options).unwrap();

    assert_eq!(output.trajectory.len(), TIMESTEPS + 1);
    assert_eq!(output.structure.species().len(), 3);
    let coords: Vec<f32> = output.structure.frac_coords.into_data().iter::<f32>().collect();
    assert!(coords.iter().all(|&x| (0.0..1.0).contains(&x)));
}
