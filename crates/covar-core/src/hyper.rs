//! Gaussian-process hyperparameters and their Adam update machinery.
//!
//! The three kernel hyperparameters are held in constrained (positive)
//! form. Gradient steps happen in an unconstrained domain reached via a
//! softplus map, so positivity survives arbitrary Adam steps. The noise
//! variance carries a small jitter floor to keep the covariance matrix
//! numerically positive definite.

use serde::{Deserialize, Serialize};

use crate::{CovarError, Result};

/// Jitter floor added to the constrained noise variance.
const NOISE_JITTER: f64 = 1e-6;

/// Selector for which hyperparameter a gradient step updates.
///
/// Replaces the raw index into a flat parameter array; the fallible
/// [`HyperParam::from_index`] is the only place integer selectors are
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HyperParam {
    Lengthscale,
    VerticalLengthscale,
    NoiseVariance,
}

impl HyperParam {
    /// Map a legacy integer selector. Out-of-range values report
    /// `InvalidArgument` and callers must not mutate any state.
    pub fn from_index(idx: usize) -> Result<Self> {
        match idx {
            0 => Ok(HyperParam::Lengthscale),
            1 => Ok(HyperParam::VerticalLengthscale),
            2 => Ok(HyperParam::NoiseVariance),
            _ => Err(CovarError::InvalidArgument(format!(
                "hyperparameter selector {idx} out of range (0..=2)"
            ))),
        }
    }

    pub fn index(self) -> usize {
        match self {
            HyperParam::Lengthscale => 0,
            HyperParam::VerticalLengthscale => 1,
            HyperParam::NoiseVariance => 2,
        }
    }

    fn is_noise(self) -> bool {
        matches!(self, HyperParam::NoiseVariance)
    }
}

/// Adam step configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdamParams {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdamParams {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Constrained hyperparameters plus Adam bookkeeping.
///
/// `m`/`v` are raw first/second moment estimates per parameter;
/// `beta1_pow`/`beta2_pow` hold the running decay powers β₁ᵗ, β₂ᵗ used
/// for bias correction, advanced once per training iteration by
/// [`HyperparameterState::begin_step`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperparameterState {
    pub lengthscale: f64,
    pub vertical_lengthscale: f64,
    pub noise_variance: f64,
    pub adam: AdamParams,
    m: [f64; 3],
    v: [f64; 3],
    beta1_pow: f64,
    beta2_pow: f64,
    t: usize,
}

impl HyperparameterState {
    pub fn new(
        lengthscale: f64,
        vertical_lengthscale: f64,
        noise_variance: f64,
        adam: AdamParams,
    ) -> Self {
        Self {
            lengthscale,
            vertical_lengthscale,
            noise_variance,
            adam,
            m: [0.0; 3],
            v: [0.0; 3],
            beta1_pow: 1.0,
            beta2_pow: 1.0,
            t: 0,
        }
    }

    pub fn get(&self, param: HyperParam) -> f64 {
        match param {
            HyperParam::Lengthscale => self.lengthscale,
            HyperParam::VerticalLengthscale => self.vertical_lengthscale,
            HyperParam::NoiseVariance => self.noise_variance,
        }
    }

    fn set(&mut self, param: HyperParam, value: f64) {
        match param {
            HyperParam::Lengthscale => self.lengthscale = value,
            HyperParam::VerticalLengthscale => self.vertical_lengthscale = value,
            HyperParam::NoiseVariance => self.noise_variance = value,
        }
    }

    /// Iteration counter.
    pub fn step_count(&self) -> usize {
        self.t
    }

    /// Advance the iteration counter and decay powers. Call once per
    /// training iteration, before the per-parameter gradient updates.
    pub fn begin_step(&mut self) {
        self.t += 1;
        self.beta1_pow *= self.adam.beta1;
        self.beta2_pow *= self.adam.beta2;
    }

    /// One Adam descent step on the selected parameter.
    ///
    /// Updates the moment estimates from `grad`, applies the
    /// bias-corrected step in the unconstrained domain and maps the
    /// result back to the constrained domain.
    pub fn apply_gradient(&mut self, param: HyperParam, grad: f64) -> Result<f64> {
        if self.t == 0 {
            return Err(CovarError::InvalidArgument(
                "apply_gradient called before begin_step".into(),
            ));
        }
        let i = param.index();
        let a = self.adam;

        self.m[i] = a.beta1 * self.m[i] + (1.0 - a.beta1) * grad;
        self.v[i] = a.beta2 * self.v[i] + (1.0 - a.beta2) * grad * grad;

        let m_hat = self.m[i] / (1.0 - self.beta1_pow);
        let v_hat = self.v[i] / (1.0 - self.beta2_pow);

        let noise = param.is_noise();
        let theta = to_unconstrained(self.get(param), noise);
        let theta = theta - a.learning_rate * m_hat / (v_hat.sqrt() + a.epsilon);
        let constrained = to_constrained(theta, noise);

        self.set(param, constrained);
        Ok(constrained)
    }
}

/// Softplus map from the unconstrained domain to the positive domain.
pub fn to_constrained(theta: f64, noise: bool) -> f64 {
    let positive = theta.exp().ln_1p();
    if noise {
        positive + NOISE_JITTER
    } else {
        positive
    }
}

/// Inverse softplus. Requires a value strictly above the jitter floor
/// for the noise variance.
pub fn to_unconstrained(value: f64, noise: bool) -> f64 {
    let positive = if noise { value - NOISE_JITTER } else { value };
    (positive.exp() - 1.0).ln()
}

/// d(softplus)/dθ — the chain-rule factor for gradients taken w.r.t.
/// the constrained parameter.
pub fn softplus_derivative(theta: f64) -> f64 {
    1.0 / (1.0 + (-theta).exp())
}
