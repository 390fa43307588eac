//! Property-guided crystal diffusion module
//!
//! Wraps a [`CspNet`] with a property head and the VP/VE noise schedules. The
//! network is trained to predict a structure's property from a noised state;
//! at sampling time the gradient of its prediction error steers the reverse
//! process of an auxiliary unconditional score model (see [`crate::sampling`]).

use burn::prelude::*;
use burn::tensor::Distribution;
use burn_crystal_core::{
    sinusoidal_time_embedding, solve_assignment, species_one_hot, wrap_unit, CrystalBatch,
    CrystalError, StructureIndex, MAX_ATOMIC_NUM,
};
use burn_crystal_net::{
    AtomTypes, CspNet, CspNetInput, GuidanceMode, PropertyHead, ScoreModel, Scores,
};
use burn_crystal_samplers::{
    categorical_kl, categorical_posterior, posterior_from_logits, BetaScheduler, SigmaScheduler,
};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::DiffusionConfig;
use crate::error::{DiffusionError, Result};

/// A batch corrupted to per-structure timesteps
#[derive(Debug, Clone)]
pub struct NoisedState<B: Backend> {
    /// `[S, time_dim]`
    pub time_emb: Tensor<B, 2>,
    /// Soft type vectors `[N, MAX_ATOMIC_NUM]`
    pub atom_types: Tensor<B, 2>,
    /// `[N, 3]`, wrapped to `[0, 1)`
    pub frac_coords: Tensor<B, 2>,
    /// `[S, 3, 3]`
    pub lattices: Tensor<B, 3>,
}

/// Result of a training forward
#[derive(Debug, Clone)]
pub struct DiffusionOutput<B: Backend> {
    /// Mean absolute error of the property prediction
    pub loss: Tensor<B, 1>,
    pub prediction: Tensor<B, 2>,
    pub target: Tensor<B, 2>,
    /// Timestep drawn for each structure
    pub times: Vec<usize>,
}

/// A logged evaluation loss
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStats {
    /// `"val"` or `"test"`
    pub prefix: &'static str,
    pub loss: f64,
}

impl StepStats {
    /// Metric name, e.g. `val_loss`
    pub fn name(&self) -> String {
        format!("{}_loss", self.prefix)
    }
}

/// Property predictor trained on noised crystals, used as a guidance signal
#[derive(Module, Debug)]
pub struct CrystalDiffusion<B: Backend> {
    pub decoder: CspNet<B>,
    #[module(skip)]
    pub beta_scheduler: BetaScheduler,
    #[module(skip)]
    pub sigma_scheduler: SigmaScheduler,
    #[module(skip)]
    pub config: DiffusionConfig,
}

impl<B: Backend> CrystalDiffusion<B> {
    pub fn new(config: DiffusionConfig, device: &B::Device) -> Result<Self> {
        if config.model.property == PropertyHead::None {
            return Err(DiffusionError::Config(
                "the network needs a graph- or node-level property head".into(),
            ));
        }
        if !config.model.smooth {
            return Err(DiffusionError::Config(
                "the network must embed soft atom types (smooth = true)".into(),
            ));
        }
        if config.time_dim == 0 || config.time_dim % 2 != 0 {
            return Err(DiffusionError::Config(format!(
                "time_dim must be even and positive, got {}",
                config.time_dim
            )));
        }
        if config.model.latent_dim != config.time_dim {
            return Err(DiffusionError::Config(format!(
                "network latent_dim ({}) must equal time_dim ({})",
                config.model.latent_dim, config.time_dim
            )));
        }

        let beta_scheduler = BetaScheduler::new(config.timesteps, &config.beta_scheduler)?;
        let sigma_scheduler = SigmaScheduler::new(config.timesteps, &config.sigma_scheduler)?;
        let decoder = config.model.init(device)?;

        info!(
            timesteps = config.timesteps,
            time_dim = config.time_dim,
            property = ?config.model.property,
            time_independent = config.time_independent,
            "initialized crystal diffusion"
        );

        Ok(Self {
            decoder,
            beta_scheduler,
            sigma_scheduler,
            config,
        })
    }

    pub fn config(&self) -> &DiffusionConfig {
        &self.config
    }

    /// Corrupts `batch` to one timestep per structure
    ///
    /// At `t = 0` the clean batch is returned unchanged.
    pub fn q_sample(&self, batch: &CrystalBatch<B>, times: &[usize]) -> Result<NoisedState<B>> {
        corrupt(
            &self.beta_scheduler,
            &self.sigma_scheduler,
            self.config.time_dim,
            batch,
            times,
        )
    }

    /// Clean batch with a zero time embedding
    fn clean_state(&self, batch: &CrystalBatch<B>) -> NoisedState<B> {
        let device = batch.device();
        NoisedState {
            time_emb: Tensor::zeros([batch.num_structures(), self.config.time_dim], &device),
            atom_types: batch.atom_types_one_hot(),
            frac_coords: batch.frac_coords.clone(),
            lattices: batch.lattices.clone(),
        }
    }

    /// Training forward with timesteps drawn from the thread RNG
    pub fn forward(&self, batch: &CrystalBatch<B>) -> Result<DiffusionOutput<B>> {
        self.forward_with_rng(batch, &mut rand::rng())
    }

    pub fn forward_with_rng<R: Rng + ?Sized>(
        &self,
        batch: &CrystalBatch<B>,
        rng: &mut R,
    ) -> Result<DiffusionOutput<B>> {
        let target = batch.y.clone().ok_or(DiffusionError::MissingTarget)?;

        let (state, times) = if self.config.time_independent {
            (self.clean_state(batch), vec![0; batch.num_structures()])
        } else {
            let times = self
                .beta_scheduler
                .uniform_sample_t(batch.num_structures(), rng);
            (self.q_sample(batch, &times)?, times)
        };

        let prediction = self.predict(state, &batch.index, Some(target.clone()))?;
        check_target(&prediction, &target)?;
        let loss = (prediction.clone() - target.clone()).abs().mean();

        Ok(DiffusionOutput {
            loss,
            prediction,
            target,
            times,
        })
    }

    /// Property prediction on the clean batch, paired with its target
    pub fn infer(&self, batch: &CrystalBatch<B>) -> Result<(Tensor<B, 2>, Tensor<B, 2>)> {
        let target = batch.y.clone().ok_or(DiffusionError::MissingTarget)?;
        let prediction = self.predict(self.clean_state(batch), &batch.index, None)?;
        check_target(&prediction, &target)?;
        Ok((prediction, target))
    }

    fn predict(
        &self,
        state: NoisedState<B>,
        index: &StructureIndex,
        y: Option<Tensor<B, 2>>,
    ) -> Result<Tensor<B, 2>> {
        let out = self.decoder.forward(
            CspNetInput {
                time_emb: state.time_emb,
                atom_types: AtomTypes::Probs(state.atom_types),
                frac_coords: state.frac_coords,
                lattices: state.lattices,
                index,
                y,
            },
            GuidanceMode::None,
        )?;
        out.property()
            .ok_or_else(|| DiffusionError::Config("network has no property head".into()))
    }

    /// Forward plus loss logging; `None` when the loss is NaN and the step should be skipped
    pub fn training_step(&self, batch: &CrystalBatch<B>) -> Result<Option<Tensor<B, 1>>> {
        let output = self.forward(batch)?;
        let loss = scalar(&output.loss);
        if loss.is_nan() {
            warn!(structures = batch.num_structures(), "NaN training loss, skipping batch");
            return Ok(None);
        }
        debug!(train_loss = loss, times = ?output.times, "training step");
        Ok(Some(output.loss))
    }

    pub fn validation_step(&self, batch: &CrystalBatch<B>) -> Result<StepStats> {
        self.eval_step(batch, "val")
    }

    pub fn test_step(&self, batch: &CrystalBatch<B>) -> Result<StepStats> {
        self.eval_step(batch, "test")
    }

    fn eval_step(&self, batch: &CrystalBatch<B>, prefix: &'static str) -> Result<StepStats> {
        let output = self.forward(batch)?;
        let stats = StepStats {
            prefix,
            loss: scalar(&output.loss),
        };
        info!(metric = %stats.name(), loss = stats.loss, "evaluation step");
        Ok(stats)
    }

    /// Categorical posterior over types given the noised state and predicted logits
    pub fn multinomial_sample(
        &self,
        noised: Tensor<B, 2>,
        logits: Tensor<B, 2>,
        index: &StructureIndex,
        times: &[usize],
    ) -> Result<Tensor<B, 2>> {
        let (alpha, alpha_bar_prev) = self.posterior_columns(index, times, &noised.device())?;
        Ok(posterior_from_logits(noised, logits, alpha, alpha_bar_prev))
    }

    /// KL between the true and predicted type posteriors, averaged over atoms
    pub fn type_loss(
        &self,
        logits: Tensor<B, 2>,
        target_types: Tensor<B, 1, Int>,
        noised: Tensor<B, 2>,
        index: &StructureIndex,
        times: &[usize],
    ) -> Result<Tensor<B, 1>> {
        let device = noised.device();
        let species = checked_species(target_types, index.num_nodes())?;
        let (alpha, alpha_bar_prev) = self.posterior_columns(index, times, &device)?;

        let theta = categorical_posterior(
            noised.clone(),
            species_one_hot(&species, &device),
            alpha.clone(),
            alpha_bar_prev.clone(),
        );
        let theta_hat = posterior_from_logits(noised, logits, alpha, alpha_bar_prev);
        Ok(categorical_kl(theta, theta_hat))
    }

    /// Reassigns each structure's species to its atoms by maximum predicted probability
    ///
    /// Columns of `logits` are restricted to the structure's current labels, so
    /// the result is a permutation of those labels within each structure.
    pub fn lap(
        &self,
        logits: Tensor<B, 2>,
        types: Tensor<B, 1, Int>,
        index: &StructureIndex,
    ) -> Result<Tensor<B, 1, Int>> {
        let n = index.num_nodes();
        let [rows, k] = logits.dims();
        if rows != n {
            return Err(DiffusionError::Shape(format!(
                "logits have {rows} rows for {n} atoms"
            )));
        }
        let device = types.device();
        let species = checked_species(types, n)?;
        if let Some(&id) = species.iter().find(|&&id| id > k) {
            return Err(CrystalError::InvalidSpecies { id: id as i64, max: k }.into());
        }

        let logits: Vec<f32> = logits.into_data().iter::<f32>().collect();
        let mut assigned = Vec::with_capacity(n);

        for range in index.ranges() {
            let labels = &species[range.clone()];
            let size = labels.len();
            let mut cost = Vec::with_capacity(size * size);

            for row in range {
                let selected: Vec<f64> = labels
                    .iter()
                    .map(|&id| logits[row * k + id - 1] as f64)
                    .collect();
                let max = selected.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let total: f64 = selected.iter().map(|v| (v - max).exp()).sum();
                cost.extend(selected.iter().map(|v| -(v - max).exp() / total));
            }

            let columns = solve_assignment(&cost, size, size)?;
            assigned.extend(columns.into_iter().map(|col| labels[col] as i64));
        }

        Ok(Tensor::from_data(TensorData::new(assigned, [n]), &device))
    }

    /// Per-atom `α_t` and `ᾱ_{t−1}` columns
    fn posterior_columns(
        &self,
        index: &StructureIndex,
        times: &[usize],
        device: &B::Device,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 2>)> {
        check_times(times, index.num_structures(), self.config.timesteps)?;
        if let Some(&t) = times.iter().find(|&&t| t == 0) {
            return Err(DiffusionError::Shape(format!(
                "posterior requires t >= 1, got {t}"
            )));
        }
        let alpha: Vec<f64> = times.iter().map(|&t| self.beta_scheduler.alphas[t]).collect();
        let alpha_bar_prev: Vec<f64> = times
            .iter()
            .map(|&t| self.beta_scheduler.alphas_cumprod[t - 1])
            .collect();
        Ok((
            index.repeat_scalars(&alpha, device),
            index.repeat_scalars(&alpha_bar_prev, device),
        ))
    }
}

impl<B: Backend> ScoreModel<B> for CrystalDiffusion<B> {
    fn scores(
        &self,
        time_emb: Tensor<B, 2>,
        atom_types: Tensor<B, 2>,
        frac_coords: Tensor<B, 2>,
        lattices: Tensor<B, 3>,
        index: &StructureIndex,
    ) -> burn_crystal_net::error::Result<Scores<B>> {
        self.decoder
            .scores(time_emb, atom_types, frac_coords, lattices, index)
    }

    fn predicts_types(&self) -> bool {
        self.decoder.predicts_types()
    }
}

/// Forward corruption shared by training and partial-schedule sampling
pub(crate) fn corrupt<B: Backend>(
    beta: &BetaScheduler,
    sigma: &SigmaScheduler,
    time_dim: usize,
    batch: &CrystalBatch<B>,
    times: &[usize],
) -> Result<NoisedState<B>> {
    let s = batch.num_structures();
    let n = batch.num_nodes();
    check_times(times, s, beta.timesteps)?;
    let device = batch.device();
    let index = &batch.index;

    let signal: Vec<f64> = times.iter().map(|&t| beta.alphas_cumprod[t].sqrt()).collect();
    let spread: Vec<f64> = times
        .iter()
        .map(|&t| (1.0 - beta.alphas_cumprod[t]).sqrt())
        .collect();
    let sigmas: Vec<f64> = times.iter().map(|&t| sigma.sigmas[t]).collect();

    let c0 = column::<B>(&signal, &device);
    let c1 = column::<B>(&spread, &device);
    let lattices = batch.lattices.clone() * c0.reshape([s, 1, 1])
        + Tensor::random([s, 3, 3], Distribution::Normal(0.0, 1.0), &device) * c1.reshape([s, 1, 1]);

    let sigmas_per_atom = index.repeat_scalars(&sigmas, &device);
    let frac_coords = wrap_unit(
        batch.frac_coords.clone()
            + Tensor::random([n, 3], Distribution::Normal(0.0, 1.0), &device) * sigmas_per_atom,
    );

    let atom_types = batch.atom_types_one_hot() * index.repeat_scalars(&signal, &device)
        + Tensor::random([n, MAX_ATOMIC_NUM], Distribution::Normal(0.0, 1.0), &device)
            * index.repeat_scalars(&spread, &device);

    let steps: Vec<f32> = times.iter().map(|&t| t as f32).collect();
    let time_emb = sinusoidal_time_embedding(
        Tensor::<B, 1>::from_data(TensorData::new(steps, [s]), &device),
        time_dim,
    );

    Ok(NoisedState {
        time_emb,
        atom_types,
        frac_coords,
        lattices,
    })
}

fn column<B: Backend>(values: &[f64], device: &B::Device) -> Tensor<B, 2> {
    let data: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    Tensor::from_data(TensorData::new(data, [values.len(), 1]), device)
}

fn check_times(times: &[usize], structures: usize, timesteps: usize) -> Result<()> {
    if times.len() != structures {
        return Err(DiffusionError::Shape(format!(
            "{} timesteps for {structures} structures",
            times.len()
        )));
    }
    if let Some(&t) = times.iter().find(|&&t| t > timesteps) {
        return Err(DiffusionError::Shape(format!(
            "timestep {t} exceeds the schedule length {timesteps}"
        )));
    }
    Ok(())
}

pub(crate) fn check_target<B: Backend>(prediction: &Tensor<B, 2>, target: &Tensor<B, 2>) -> Result<()> {
    if prediction.dims() != target.dims() {
        return Err(DiffusionError::Shape(format!(
            "property target {:?} does not match the prediction {:?}",
            target.dims(),
            prediction.dims()
        )));
    }
    Ok(())
}

fn checked_species<B: Backend>(types: Tensor<B, 1, Int>, n: usize) -> Result<Vec<usize>> {
    let ids: Vec<i64> = types.into_data().iter::<i64>().collect();
    if ids.len() != n {
        return Err(DiffusionError::Shape(format!(
            "{} atom types for {n} atoms",
            ids.len()
        )));
    }
    ids.into_iter()
        .map(|id| {
            if id < 1 || id as usize > MAX_ATOMIC_NUM {
                Err(CrystalError::InvalidSpecies {
                    id,
                    max: MAX_ATOMIC_NUM,
                }
                .into())
            } else {
                Ok(id as usize)
            }
        })
        .collect()
}

fn scalar<B: Backend>(loss: &Tensor<B, 1>) -> f64 {
    loss.to_data()
        .iter::<f32>()
        .next()
        .map_or(f64::NAN, f64::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn_crystal_net::CspNetConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type TestBackend = NdArray<f32>;

    fn small_config(timesteps: usize) -> DiffusionConfig {
        DiffusionConfig::default()
            .with_timesteps(timesteps)
            .with_model(
                CspNetConfig::default()
                    .with_hidden_dim(8)
                    .with_num_layers(1)
                    .with_smooth(true)
                    .with_property(PropertyHead::GraphLevel(2)),
            )
            .with_time_dim(4)
    }

    fn batch(device: &<TestBackend as Backend>::Device) -> CrystalBatch<TestBackend> {
        let index = StructureIndex::from_num_atoms(&[1, 2]).unwrap();
        let frac = Tensor::from_data(
            TensorData::new(vec![0.1f32, 0.2, 0.3, 0.5, 0.5, 0.5, 0.0, 0.9, 0.25], [3, 3]),
            device,
        );
        let mut lattice = vec![0.0f32; 18];
        for s in 0..2 {
            for i in 0..3 {
                lattice[s * 9 + i * 4] = 4.0;
            }
        }
        let lattices = Tensor::from_data(TensorData::new(lattice, [2, 3, 3]), device);
        let types = Tensor::from_data(TensorData::new(vec![8i64, 26, 14], [3]), device);
        CrystalBatch::new(index, frac, lattices, types)
            .unwrap()
            .with_target(Tensor::ones([2, 2], device))
            .unwrap()
    }

    fn assert_close<const D: usize>(actual: Tensor<TestBackend, D>, expected: Tensor<TestBackend, D>) {
        assert_eq!(actual.dims(), expected.dims());
        let actual: Vec<f32> = actual.into_data().iter::<f32>().collect();
        let expected: Vec<f32> = expected.into_data().iter::<f32>().collect();
        for (i, (a, e)) in actual.iter().zip(&expected).enumerate() {
            assert!((a - e).abs() < 1e-5, "[{i}]: expected {e}, got {a}");
        }
    }

    #[test]
    fn test_new_validates_network() {
        let device = Default::default();
        let no_head = small_config(10).with_model(
            CspNetConfig::default().with_smooth(true).with_latent_dim(4),
        );
        assert!(matches!(
            CrystalDiffusion::<TestBackend>::new(no_head, &device),
            Err(DiffusionError::Config(_))
        ));

        let mut hard_types = small_config(10);
        hard_types.model.smooth = false;
        assert!(matches!(
            CrystalDiffusion::<TestBackend>::new(hard_types, &device),
            Err(DiffusionError::Config(_))
        ));

        let mut mismatched = small_config(10);
        mismatched.model.latent_dim = 6;
        assert!(CrystalDiffusion::<TestBackend>::new(mismatched, &device).is_err());

        assert!(matches!(
            CrystalDiffusion::<TestBackend>::new(small_config(0), &device),
            Err(DiffusionError::Schedule(_))
        ));
    }

    #[test]
    fn test_q_sample_at_zero_reconstructs() {
        let device = Default::default();
        let model = CrystalDiffusion::<TestBackend>::new(small_config(10), &device).unwrap();
        let batch = batch(&device);

        let state = model.q_sample(&batch, &[0, 0]).unwrap();
        assert_close(state.frac_coords, batch.frac_coords.clone());
        assert_close(state.lattices, batch.lattices.clone());
        assert_close(state.atom_types, batch.atom_types_one_hot());

        assert!(model.q_sample(&batch, &[1]).is_err());
        assert!(model.q_sample(&batch, &[1, 11]).is_err());
    }

    #[test]
    fn test_forward_loss_and_infer() {
        let device = Default::default();
        let model = CrystalDiffusion::<TestBackend>::new(small_config(10), &device).unwrap();
        let batch = batch(&device);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let output = model.forward_with_rng(&batch, &mut rng).unwrap();
        assert_eq!(output.prediction.dims(), [2, 2]);
        assert_eq!(output.times.len(), 2);
        assert!(output.times.iter().all(|&t| (1..=10).contains(&t)));
        let loss = scalar(&output.loss);
        assert!(loss.is_finite() && loss >= 0.0);

        let (prediction, target) = model.infer(&batch).unwrap();
        assert_eq!(prediction.dims(), target.dims());

        let stats = model.validation_step(&batch).unwrap();
        assert_eq!(stats.name(), "val_loss");
        assert_eq!(model.test_step(&batch).unwrap().prefix, "test");
        assert!(model.training_step(&batch).unwrap().is_some());
    }

    #[test]
    fn test_forward_requires_matching_target() {
        let device = Default::default();
        let model = CrystalDiffusion::<TestBackend>::new(small_config(10), &device).unwrap();
        let mut unlabeled = batch(&device);
        unlabeled.y = None;
        assert_eq!(
            model.forward(&unlabeled).unwrap_err(),
            DiffusionError::MissingTarget
        );

        let mut wrong = batch(&device);
        wrong.y = Some(Tensor::ones([2, 3], &device));
        assert!(model.forward(&wrong).is_err());
    }

    #[test]
    fn test_time_independent_uses_clean_state() {
        let device = Default::default();
        let model = CrystalDiffusion::<TestBackend>::new(
            small_config(10).with_time_independent(true),
            &device,
        )
        .unwrap();
        let batch = batch(&device);
        let output = model.forward(&batch).unwrap();
        assert_eq!(output.times, vec![0, 0]);
        let (prediction, _) = model.infer(&batch).unwrap();
        assert_close(output.prediction, prediction);
    }

    #[test]
    fn test_lap_permutes_labels() {
        let device = Default::default();
        let model = CrystalDiffusion::<TestBackend>::new(small_config(10), &device).unwrap();
        let index = StructureIndex::from_num_atoms(&[3]).unwrap();
        let logits = Tensor::<TestBackend, 2>::random(
            [3, MAX_ATOMIC_NUM],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let types = Tensor::from_data(TensorData::new(vec![3i64, 3, 5], [3]), &device);

        let assigned = model.lap(logits, types, &index).unwrap();
        let mut ids: Vec<i64> = assigned.into_data().iter::<i64>().collect();
        ids.sort();
        assert_eq!(ids, vec![3, 3, 5]);
    }

    #[test]
    fn test_lap_follows_logits() {
        let device = Default::default();
        let model = CrystalDiffusion::<TestBackend>::new(small_config(10), &device).unwrap();
        let index = StructureIndex::from_num_atoms(&[2]).unwrap();
        let mut data = vec![0.0f32; 2 * MAX_ATOMIC_NUM];
        // Row 0 prefers species 6, row 1 prefers species 1
        data[5] = 10.0;
        data[MAX_ATOMIC_NUM] = 10.0;
        let logits = Tensor::from_data(TensorData::new(data, [2, MAX_ATOMIC_NUM]), &device);
        let types = Tensor::from_data(TensorData::new(vec![1i64, 6], [2]), &device);

        let assigned: Vec<i64> = model
            .lap(logits, types, &index)
            .unwrap()
            .into_data()
            .iter::<i64>()
            .collect();
        assert_eq!(assigned, vec![6, 1]);
    }

    #[test]
    fn test_multinomial_and_type_loss() {
        let device = Default::default();
        let model = CrystalDiffusion::<TestBackend>::new(small_config(10), &device).unwrap();
        let batch = batch(&device);
        let noised = batch.atom_types_one_hot();
        let logits = Tensor::<TestBackend, 2>::zeros([3, MAX_ATOMIC_NUM], &device);

        let theta = model
            .multinomial_sample(noised.clone(), logits.clone(), &batch.index, &[3, 5])
            .unwrap();
        let sums: Vec<f32> = theta.sum_dim(1).into_data().iter::<f32>().collect();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-4));

        let loss = model
            .type_loss(logits, batch.atom_types.clone(), noised, &batch.index, &[3, 5])
            .unwrap();
        assert!(scalar(&loss) >= -1e-6);

        assert!(model
            .multinomial_sample(
                batch.atom_types_one_hot(),
                Tensor::zeros([3, MAX_ATOMIC_NUM], &device),
                &batch.index,
                &[0, 5]
            )
            .is_err());
    }
}
