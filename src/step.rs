//! Step-size families.
//!
//! Each family turns the sampled residual `r` and gradient `g` into a
//! per-coordinate step `t` and a descent direction `d`. The scalar family
//! broadcasts one value; ADAGRAD and ADAM keep running statistics.

/// Which step-size family a solver uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepRule {
    /// `t = ||r||^2 / ||g||^2` from the current sample, direction `g`.
    Scalar,
    /// `t_j = eta / sqrt(s_j + epsilon)` with `s` the running sum of `g^2`.
    Adagrad,
    /// Bias-corrected moment estimates, direction `m_hat`.
    Adam,
}

/// Constants the adaptive families read from [`Params`](crate::Params).
#[derive(Debug, Clone, Copy)]
pub struct StepConfig {
    pub eta: f64,
    pub epsilon: f64,
    pub beta_1: f64,
    pub beta_2: f64,
}

/// Running statistics for one step family.
#[derive(Debug, Clone, PartialEq)]
pub enum StepState {
    Scalar,
    Adagrad {
        /// Sum of squared gradients.
        s: Vec<f64>,
    },
    Adam {
        /// First-moment estimate.
        m: Vec<f64>,
        /// Second-moment estimate.
        v: Vec<f64>,
        /// Bias-corrected first moment of the latest iteration.
        m_hat: Vec<f64>,
    },
}

impl StepState {
    pub fn new(rule: StepRule, n: usize) -> Self {
        match rule {
            StepRule::Scalar => Self::Scalar,
            StepRule::Adagrad => Self::Adagrad { s: vec![0.0; n] },
            StepRule::Adam => Self::Adam {
                m: vec![0.0; n],
                v: vec![0.0; n],
                m_hat: vec![0.0; n],
            },
        }
    }

    pub fn rule(&self) -> StepRule {
        match self {
            Self::Scalar => StepRule::Scalar,
            Self::Adagrad { .. } => StepRule::Adagrad,
            Self::Adam { .. } => StepRule::Adam,
        }
    }

    /// Squared-gradient accumulator (ADAGRAD only).
    pub fn squared_gradient_sum(&self) -> Option<&[f64]> {
        match self {
            Self::Adagrad { s } => Some(s),
            _ => None,
        }
    }

    /// `(m, v)` moment estimates (ADAM only).
    pub fn moments(&self) -> Option<(&[f64], &[f64])> {
        match self {
            Self::Adam { m, v, .. } => Some((m, v)),
            _ => None,
        }
    }

    /// Bias-corrected first moment of the latest update (ADAM only).
    pub fn m_hat(&self) -> Option<&[f64]> {
        match self {
            Self::Adam { m_hat, .. } => Some(m_hat),
            _ => None,
        }
    }

    /// Advances the statistics for iteration `iteration` (1-based), writes
    /// the per-coordinate step into `t` and returns the descent direction.
    ///
    /// A zero gradient gives a zero scalar step; the adaptive families stay
    /// finite through `epsilon`.
    pub fn update<'a>(
        &'a mut self,
        iteration: usize,
        residual: &[f64],
        gradient: &'a [f64],
        config: &StepConfig,
        t: &mut [f64],
    ) -> &'a [f64] {
        debug_assert_eq!(gradient.len(), t.len());
        match self {
            Self::Scalar => {
                t.fill(scalar_step(residual, gradient));
                gradient
            }
            Self::Adagrad { s } => {
                for ((sj, tj), &g) in s.iter_mut().zip(t.iter_mut()).zip(gradient) {
                    *sj += g * g;
                    *tj = config.eta / (*sj + config.epsilon).sqrt();
                }
                gradient
            }
            Self::Adam { m, v, m_hat } => {
                let exp = i32::try_from(iteration).unwrap_or(i32::MAX);
                let bc1 = 1.0 - config.beta_1.powi(exp);
                let bc2 = 1.0 - config.beta_2.powi(exp);
                for j in 0..gradient.len() {
                    let g = gradient[j];
                    m[j] = config.beta_1 * m[j] + (1.0 - config.beta_1) * g;
                    v[j] = config.beta_2 * v[j] + (1.0 - config.beta_2) * g * g;
                    m_hat[j] = m[j] / bc1;
                    let v_hat = v[j] / bc2;
                    t[j] = config.eta / (v_hat.sqrt() + config.epsilon);
                }
                m_hat.as_slice()
            }
        }
    }
}

/// Barzilai-Borwein-like scalar step `||r||^2 / ||g||^2`, zero when `g == 0`.
pub fn scalar_step(residual: &[f64], gradient: &[f64]) -> f64 {
    let gg = dot(gradient, gradient);
    if gg == 0.0 || !gg.is_finite() {
        return 0.0;
    }
    let step = dot(residual, residual) / gg;
    if step.is_finite() {
        step
    } else {
        0.0
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}
