//! Noise schedules and reverse-step update rules for crystal diffusion
//!
//! - [`scheduler`] - beta (VP) and sigma (VE) tables, wrapped-normal score norms
//! - [`predictor_corrector`] - Langevin corrector and predictor updates with guidance
//! - [`categorical`] - categorical posterior and KL over atom types

pub mod categorical;
pub mod predictor_corrector;
pub mod scheduler;

pub use categorical::{categorical_kl, categorical_posterior, posterior_from_logits};
pub use predictor_corrector::{CorrectorStep, PredictorStep};
pub use scheduler::{
    d_log_p_wrapped_normal, p_wrapped_normal, wrapped_normal_score_norm, BetaSchedule,
    BetaScheduler, BetaSchedulerConfig, ScheduleError, SigmaScheduler, SigmaSchedulerConfig,
};
