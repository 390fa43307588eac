//! Property-guided predictor-corrector sampling
//!
//! The reverse process is driven by an auxiliary unconditional score model.
//! At each step the main model's property prediction is differentiated with
//! respect to the corrector-refined state, and the gradient of
//! `Σ ‖pred − y‖₂` is subtracted from the predictor update, scaled by the
//! predictor's noise variance and the guidance strength `aug`.
//!
//! The sampler state lives on the inner (non-autodiff) backend. Each guidance
//! step lifts it into the autodiff graph for a single backward pass.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Distribution;
use burn_crystal_core::{
    sinusoidal_time_embedding, wrap_unit, CrystalBatch, StructureIndex, Tracked, MAX_ATOMIC_NUM,
};
use burn_crystal_net::{AtomTypes, CspNetInput, GuidanceMode, ScoreModel};
use burn_crystal_samplers::{CorrectorStep, PredictorStep};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::config::SampleOptions;
use crate::debug::{check_finite_if, tensor_stats};
use crate::diffusion::{check_target, corrupt, CrystalDiffusion};
use crate::error::{DiffusionError, Result};
use crate::trajectory::{Snapshot, Structure, Trajectory};

/// Generated structures and the full reverse trajectory
#[derive(Debug, Clone)]
pub struct SampleOutput<B: Backend> {
    /// Final state with hard atom types
    pub structure: Structure<B>,
    pub trajectory: Trajectory<B>,
}

/// Guidance gradients at one state
struct Guidance<B: Backend> {
    coords: Tensor<B, 2>,
    lattice: Tensor<B, 3>,
    types: Tensor<B, 2>,
}

/// Reverse state carried between steps
struct State<B: Backend> {
    frac_coords: Tensor<B, 2>,
    lattices: Tensor<B, 3>,
    atom_types: Tensor<B, 2>,
}

impl<B: Backend> State<B> {
    fn snapshot(&self, index: &StructureIndex) -> Snapshot<B> {
        Snapshot {
            num_atoms: index.num_atoms().to_vec(),
            atom_types: self.atom_types.clone(),
            frac_coords: wrap_unit(self.frac_coords.clone()),
            lattices: self.lattices.clone(),
        }
    }
}

impl<B: AutodiffBackend> CrystalDiffusion<B> {
    /// Guided sampling of structures with the batch's composition sizes and targets
    ///
    /// `batch.y` holds the property values to steer towards. With
    /// `diffusion_ratio < 1` the batch itself is corrupted to
    /// `floor(T · ratio)` and denoised from there.
    pub fn sample<U>(
        &self,
        batch: &CrystalBatch<B::InnerBackend>,
        uncond: &U,
        options: &SampleOptions,
    ) -> Result<SampleOutput<B::InnerBackend>>
    where
        U: ScoreModel<B::InnerBackend> + ?Sized,
    {
        self.run_sampler(batch, uncond, options, None)
    }

    /// Guided sampling where only atoms with a nonzero mask entry receive
    /// coordinate and type guidance
    ///
    /// The lattice update carries no guidance term in this variant.
    pub fn masked_sample<U>(
        &self,
        batch: &CrystalBatch<B::InnerBackend>,
        uncond: &U,
        options: &SampleOptions,
        mask: &[f32],
    ) -> Result<SampleOutput<B::InnerBackend>>
    where
        U: ScoreModel<B::InnerBackend> + ?Sized,
    {
        self.run_sampler(batch, uncond, options, Some(mask))
    }

    fn check_preconditions<U>(
        &self,
        batch: &CrystalBatch<B::InnerBackend>,
        uncond: &U,
        options: &SampleOptions,
        mask: Option<&[f32]>,
    ) -> Result<()>
    where
        U: ScoreModel<B::InnerBackend> + ?Sized,
    {
        if self.config.time_independent {
            return Err(DiffusionError::TimeIndependentSampling);
        }
        if self.config.latent_dim != 0 {
            return Err(DiffusionError::LatentSampling {
                latent_dim: self.config.latent_dim,
            });
        }
        if batch.y.is_none() {
            return Err(DiffusionError::MissingTarget);
        }
        if !uncond.predicts_types() {
            return Err(DiffusionError::MissingTypeScores);
        }
        let ratio = options.diffusion_ratio;
        if !(ratio.is_finite() && ratio > 0.0 && ratio <= 1.0) {
            return Err(DiffusionError::InvalidRatio(ratio));
        }
        if let Some(mask) = mask {
            if mask.len() != batch.num_nodes() {
                return Err(DiffusionError::MaskLength {
                    expected: batch.num_nodes(),
                    got: mask.len(),
                });
            }
        }
        Ok(())
    }

    fn run_sampler<U>(
        &self,
        batch: &CrystalBatch<B::InnerBackend>,
        uncond: &U,
        options: &SampleOptions,
        mask: Option<&[f32]>,
    ) -> Result<SampleOutput<B::InnerBackend>>
    where
        U: ScoreModel<B::InnerBackend> + ?Sized,
    {
        self.check_preconditions(batch, uncond, options, mask)?;

        let device = batch.device();
        let index = &batch.index;
        let s = index.num_structures();
        let n = index.num_nodes();
        let timesteps = self.config.timesteps;
        let target = batch.y.clone().ok_or(DiffusionError::MissingTarget)?;
        let mask = mask.map(|m| {
            Tensor::<B::InnerBackend, 2>::from_data(TensorData::new(m.to_vec(), [n, 1]), &device)
        });

        let (t_start, mut state) = if options.diffusion_ratio < 1.0 {
            let t_start = (timesteps as f64 * options.diffusion_ratio).floor() as usize;
            let noised = corrupt(
                &self.beta_scheduler,
                &self.sigma_scheduler,
                self.config.time_dim,
                batch,
                &vec![t_start; s],
            )?;
            (
                t_start,
                State {
                    frac_coords: noised.frac_coords,
                    lattices: noised.lattices,
                    atom_types: noised.atom_types,
                },
            )
        } else {
            (
                timesteps,
                State {
                    frac_coords: Tensor::random([n, 3], Distribution::Uniform(0.0, 1.0), &device),
                    lattices: Tensor::random([s, 3, 3], Distribution::Normal(0.0, 1.0), &device),
                    atom_types: Tensor::random(
                        [n, MAX_ATOMIC_NUM],
                        Distribution::Normal(0.0, 1.0),
                        &device,
                    ),
                },
            )
        };

        info!(
            structures = s,
            atoms = n,
            t_start,
            aug = options.aug,
            masked = mask.is_some(),
            "starting guided sampling"
        );

        let mut trajectory = Trajectory::new();
        trajectory.record(t_start, state.snapshot(index))?;

        let progress = if options.show_progress {
            let pb = ProgressBar::new(t_start as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        for t in (1..=t_start).rev() {
            state = self.reverse_step(state, t, uncond, &target, index, options, mask.as_ref())?;

            check_finite_if(&state.frac_coords, "frac_coords", t - 1, options.debug.nan)?;
            check_finite_if(&state.lattices, "lattices", t - 1, options.debug.nan)?;
            check_finite_if(&state.atom_types, "atom_types", t - 1, options.debug.nan)?;
            if options.debug.sampler {
                debug!(
                    t,
                    frac_coords = %tensor_stats(&state.frac_coords),
                    lattices = %tensor_stats(&state.lattices),
                    atom_types = %tensor_stats(&state.atom_types),
                    "reverse step"
                );
            }

            trajectory.record(t - 1, state.snapshot(index))?;

            if let Some(pb) = &progress {
                pb.set_message(format!("t={}", t - 1));
                pb.inc(1);
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("done");
        }

        let last = trajectory
            .get(0)
            .cloned()
            .ok_or(DiffusionError::EmptyTrajectory)?;
        info!(steps = t_start, "guided sampling finished");

        Ok(SampleOutput {
            structure: Structure::from(last),
            trajectory,
        })
    }

    /// One corrector and one predictor update from `t` to `t - 1`
    #[allow(clippy::too_many_arguments)]
    fn reverse_step<U>(
        &self,
        state: State<B::InnerBackend>,
        t: usize,
        uncond: &U,
        target: &Tensor<B::InnerBackend, 2>,
        index: &StructureIndex,
        options: &SampleOptions,
        mask: Option<&Tensor<B::InnerBackend, 2>>,
    ) -> Result<State<B::InnerBackend>>
    where
        U: ScoreModel<B::InnerBackend> + ?Sized,
    {
        let s = index.num_structures();
        let device = state.frac_coords.device();
        let steps = vec![t as f32; s];
        let time_emb = sinusoidal_time_embedding(
            Tensor::<B::InnerBackend, 1>::from_data(TensorData::new(steps, [s]), &device),
            self.config.time_dim,
        );

        // Corrector on the coordinates
        let corrector = CorrectorStep::new(&self.sigma_scheduler, t, options.step_lr);
        let scores = uncond.scores(
            time_emb.clone(),
            state.atom_types.clone(),
            state.frac_coords.clone(),
            state.lattices.clone(),
            index,
        )?;
        let x_05 = corrector.coords(state.frac_coords, scores.coords);
        let l_05 = state.lattices;
        let a_05 = state.atom_types;

        // Predictor
        let predictor = PredictorStep::new(&self.beta_scheduler, &self.sigma_scheduler, t);
        let scores = uncond.scores(
            time_emb.clone(),
            a_05.clone(),
            x_05.clone(),
            l_05.clone(),
            index,
        )?;
        let type_scores = scores.types.ok_or(DiffusionError::MissingTypeScores)?;

        let guidance = self.guidance(
            time_emb,
            a_05.clone(),
            x_05.clone(),
            l_05.clone(),
            target.clone(),
            index,
        )?;
        let (g_x, g_l, g_a) = match mask {
            Some(mask) => (
                guidance.coords * mask.clone(),
                None,
                guidance.types * mask.clone(),
            ),
            None => (guidance.coords, Some(guidance.lattice), guidance.types),
        };

        let x = predictor.coords(x_05, scores.coords, g_x, options.aug);
        let l = predictor.variance_preserving(l_05, scores.lattice, g_l, options.aug);
        let a = predictor.variance_preserving(a_05, type_scores, Some(g_a), options.aug);

        Ok(State {
            frac_coords: wrap_unit(x),
            lattices: l,
            atom_types: a,
        })
    }

    /// Gradient of `Σ_rows ‖pred − y‖₂` with respect to the state
    fn guidance(
        &self,
        time_emb: Tensor<B::InnerBackend, 2>,
        atom_types: Tensor<B::InnerBackend, 2>,
        frac_coords: Tensor<B::InnerBackend, 2>,
        lattices: Tensor<B::InnerBackend, 3>,
        target: Tensor<B::InnerBackend, 2>,
        index: &StructureIndex,
    ) -> Result<Guidance<B::InnerBackend>> {
        let x = Tracked::<B, 2>::lift(frac_coords);
        let l = Tracked::<B, 3>::lift(lattices);
        let a = Tracked::<B, 2>::lift(atom_types);

        let out = self.decoder.forward(
            CspNetInput {
                time_emb: Tensor::from_inner(time_emb),
                atom_types: AtomTypes::Probs(a.tensor()),
                frac_coords: x.tensor(),
                lattices: l.tensor(),
                index,
                y: None,
            },
            GuidanceMode::Unconditional,
        )?;
        let prediction = out
            .property()
            .ok_or_else(|| DiffusionError::Config("network has no property head".into()))?;
        let target = Tensor::<B, 2>::from_inner(target);
        check_target(&prediction, &target)?;

        let grads = row_distance(prediction - target).sum().backward();

        let guidance = Guidance {
            coords: x.grad_or_zeros(&grads),
            lattice: l.grad_or_zeros(&grads),
            types: a.grad_or_zeros(&grads),
        };
        x.release();
        l.release();
        a.release();
        Ok(guidance)
    }
}

/// Euclidean norm of each row of `diff`, `[R, D] -> [R, 1]`
///
/// Rows that are exactly zero get a zero norm with a zero gradient instead
/// of the NaN the derivative of `sqrt` produces at the origin.
fn row_distance<B: Backend>(diff: Tensor<B, 2>) -> Tensor<B, 2> {
    let squared = diff.powf_scalar(2.0).sum_dim(1);
    let nonzero = squared.clone().greater_elem(0.0).float();
    squared.clamp_min(1e-12).sqrt() * nonzero
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiffusionConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn_crystal_net::{CspNet, CspNetConfig, PropertyHead};

    type Inner = NdArray<f32>;
    type TestBackend = Autodiff<Inner>;

    const TIME_DIM: usize = 4;

    fn model(device: &<Inner as Backend>::Device) -> CrystalDiffusion<TestBackend> {
        let config = DiffusionConfig::default()
            .with_timesteps(10)
            .with_model(
                CspNetConfig::default()
                    .with_hidden_dim(8)
                    .with_num_layers(1)
                    .with_smooth(true)
                    .with_property(PropertyHead::GraphLevel(1)),
            )
            .with_time_dim(TIME_DIM);
        CrystalDiffusion::new(config, device).unwrap()
    }

    fn uncond(device: &<Inner as Backend>::Device) -> CspNet<Inner> {
        CspNetConfig::default()
            .with_hidden_dim(8)
            .with_latent_dim(TIME_DIM)
            .with_num_layers(1)
            .with_smooth(true)
            .with_pred_type(true)
            .init(device)
            .unwrap()
    }

    fn state(device: &<Inner as Backend>::Device) -> State<Inner> {
        State {
            frac_coords: Tensor::from_data(
                TensorData::new(vec![0.1f32, 0.2, 0.3, 0.6, 0.7, 0.8], [2, 3]),
                device,
            ),
            lattices: Tensor::from_data(
                TensorData::new(vec![3.0f32, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 3.0], [1, 3, 3]),
                device,
            ),
            atom_types: Tensor::random([2, MAX_ATOMIC_NUM], Distribution::Normal(0.0, 1.0), device),
        }
    }

    fn values<const D: usize>(tensor: Tensor<Inner, D>) -> Vec<f32> {
        tensor.into_data().iter::<f32>().collect()
    }

    fn assert_all_close(actual: Vec<f32>, expected: Vec<f32>) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(&expected).enumerate() {
            assert!((a - e).abs() < 1e-5, "[{i}]: expected {e}, got {a}");
        }
    }

    #[test]
    fn test_zero_mask_removes_guidance() {
        let device = Default::default();
        let model = model(&device);
        let uncond = uncond(&device);
        let index = StructureIndex::from_num_atoms(&[2]).unwrap();
        let target = Tensor::<Inner, 2>::from_data(TensorData::new(vec![5.0f32], [1, 1]), &device);
        let start = state(&device);
        let copy = || State {
            frac_coords: start.frac_coords.clone(),
            lattices: start.lattices.clone(),
            atom_types: start.atom_types.clone(),
        };

        // No noise is injected at t = 1, so both updates are deterministic
        let unguided = model
            .reverse_step(copy(), 1, &uncond, &target, &index, &SampleOptions::default().with_aug(0.0), None)
            .unwrap();
        let mask = Tensor::<Inner, 2>::zeros([2, 1], &device);
        let masked = model
            .reverse_step(
                copy(),
                1,
                &uncond,
                &target,
                &index,
                &SampleOptions::default().with_aug(1000.0),
                Some(&mask),
            )
            .unwrap();

        assert_all_close(values(masked.frac_coords), values(unguided.frac_coords));
        assert_all_close(values(masked.lattices), values(unguided.lattices));
        assert_all_close(values(masked.atom_types), values(unguided.atom_types));
    }

    #[test]
    fn test_guidance_gradients_have_state_shapes() {
        let device = Default::default();
        let model = model(&device);
        let index = StructureIndex::from_num_atoms(&[2]).unwrap();
        let start = state(&device);

        let guidance = model
            .guidance(
                Tensor::zeros([1, TIME_DIM], &device),
                start.atom_types,
                start.frac_coords,
                start.lattices,
                Tensor::from_data(TensorData::new(vec![5.0f32], [1, 1]), &device),
                &index,
            )
            .unwrap();
        assert_eq!(guidance.coords.dims(), [2, 3]);
        assert_eq!(guidance.lattice.dims(), [1, 3, 3]);
        assert_eq!(guidance.types.dims(), [2, MAX_ATOMIC_NUM]);
        assert!(values(guidance.types).iter().any(|g| *g != 0.0));
    }

    #[test]
    fn test_row_distance_is_differentiable_at_zero() {
        let device = Default::default();
        let diff = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.0f32, 0.0, 3.0, 4.0], [2, 2]),
            &device,
        )
        .require_grad();
        let distance = row_distance(diff.clone());
        assert_all_close(values(distance.clone().inner()), vec![0.0, 5.0]);

        let grads = distance.sum().backward();
        let grad = values(diff.grad(&grads).unwrap());
        assert_all_close(grad, vec![0.0, 0.0, 0.6, 0.8]);
    }

    #[test]
    fn test_guidance_finite_when_target_is_reached() {
        let device = Default::default();
        let model = model(&device);
        let index = StructureIndex::from_num_atoms(&[2]).unwrap();
        let start = state(&device);
        let time_emb = Tensor::<Inner, 2>::zeros([1, TIME_DIM], &device);

        let prediction = model
            .decoder
            .forward(
                CspNetInput {
                    time_emb: Tensor::from_inner(time_emb.clone()),
                    atom_types: AtomTypes::Probs(Tensor::from_inner(start.atom_types.clone())),
                    frac_coords: Tensor::from_inner(start.frac_coords.clone()),
                    lattices: Tensor::from_inner(start.lattices.clone()),
                    index: &index,
                    y: None,
                },
                GuidanceMode::Unconditional,
            )
            .unwrap()
            .property()
            .unwrap()
            .inner();

        let guidance = model
            .guidance(
                time_emb,
                start.atom_types,
                start.frac_coords,
                start.lattices,
                prediction,
                &index,
            )
            .unwrap();
        for grad in [
            values(guidance.coords),
            values(guidance.lattice),
            values(guidance.types),
        ] {
            assert!(grad.iter().all(|g| g.is_finite()));
        }
    }

    #[test]
    fn test_preconditions() {
        let device = Default::default();
        let model = model(&device);
        let uncond = uncond(&device);
        let index = StructureIndex::from_num_atoms(&[2]).unwrap();
        let start = state(&device);
        let types = Tensor::from_data(TensorData::new(vec![6i64, 8], [2]), &device);
        let unlabeled =
            CrystalBatch::new(index, start.frac_coords, start.lattices, types).unwrap();
        let batch = unlabeled
            .clone()
            .with_target(Tensor::ones([1, 1], &device))
            .unwrap();
        let options = SampleOptions::default();

        assert_eq!(
            model.sample(&unlabeled, &uncond, &options).unwrap_err(),
            DiffusionError::MissingTarget
        );
        assert_eq!(
            model
                .masked_sample(&batch, &uncond, &options, &[1.0])
                .unwrap_err(),
            DiffusionError::MaskLength { expected: 2, got: 1 }
        );
        assert_eq!(
            model
                .sample(&batch, &uncond, &options.clone().with_diffusion_ratio(1.5))
                .unwrap_err(),
            DiffusionError::InvalidRatio(1.5)
        );

        let no_types = CspNetConfig::default()
            .with_hidden_dim(8)
            .with_latent_dim(TIME_DIM)
            .with_num_layers(1)
            .with_smooth(true)
            .init::<Inner>(&device)
            .unwrap();
        assert_eq!(
            model.sample(&batch, &no_types, &options).unwrap_err(),
            DiffusionError::MissingTypeScores
        );

        let mut latent = model.clone();
        latent.config.latent_dim = 8;
        assert_eq!(
            latent.sample(&batch, &uncond, &options).unwrap_err(),
            DiffusionError::LatentSampling { latent_dim: 8 }
        );

        let mut time_independent = model;
        time_independent.config.time_independent = true;
        assert_eq!(
            time_independent.sample(&batch, &uncond, &options).unwrap_err(),
            DiffusionError::TimeIndependentSampling
        );
    }
}
