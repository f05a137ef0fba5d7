//! Linear policy/value model
//!
//! Policy logits are `W·x + b` over the observation vector, softmaxed over
//! the legal actions only. The value head is `tanh(v·x + c)`. Parameters are
//! trained with SGD plus momentum on policy cross-entropy and value MSE, and
//! stored as JSON.

use std::path::Path;
use std::sync::Arc;

use actor::TrainingRecord;
use anyhow::Context;
use engine_core::Game;
use mcts::{EvalResult, Evaluator, EvaluatorError};
use serde::{Deserialize, Serialize};

use crate::model::{ModelError, StepLoss, TrainableModel};

const LOG_EPS: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    pub obs_size: usize,
    pub num_actions: usize,
    /// Row-major `num_actions x obs_size`
    pub w_policy: Vec<f32>,
    pub b_policy: Vec<f32>,
    pub w_value: Vec<f32>,
    pub b_value: f32,
}

impl LinearParams {
    /// All-zero parameters: uniform policy, neutral value.
    pub fn zeros(obs_size: usize, num_actions: usize) -> Self {
        Self {
            obs_size,
            num_actions,
            w_policy: vec![0.0; obs_size * num_actions],
            b_policy: vec![0.0; num_actions],
            w_value: vec![0.0; obs_size],
            b_value: 0.0,
        }
    }

    fn check_shape(&self) -> Result<(), ModelError> {
        let ok = self.w_policy.len() == self.obs_size * self.num_actions
            && self.b_policy.len() == self.num_actions
            && self.w_value.len() == self.obs_size;
        if ok {
            Ok(())
        } else {
            Err(ModelError::Parameters(format!(
                "tensor lengths do not match {} x {}",
                self.num_actions, self.obs_size
            )))
        }
    }

    fn is_finite(&self) -> bool {
        self.b_value.is_finite()
            && self
                .w_policy
                .iter()
                .chain(&self.b_policy)
                .chain(&self.w_value)
                .all(|w| w.is_finite())
    }

    fn logit(&self, obs: &[f32], action: usize) -> f32 {
        let row = &self.w_policy[action * self.obs_size..(action + 1) * self.obs_size];
        self.b_policy[action] + dot(row, obs)
    }

    fn value_logit(&self, obs: &[f32]) -> f32 {
        self.b_value + dot(&self.w_value, obs)
    }

    /// Softmax over `legal`; zero elsewhere.
    fn masked_softmax(&self, obs: &[f32], legal: &[usize]) -> Vec<f32> {
        let mut policy = vec![0.0; self.num_actions];
        if legal.is_empty() {
            return policy;
        }
        let logits: Vec<f32> = legal.iter().map(|&a| self.logit(obs, a)).collect();
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        for (&a, e) in legal.iter().zip(exps) {
            policy[a] = e / sum;
        }
        policy
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sgd_momentum(params: &mut [f32], velocity: &mut [f32], grads: &[f32], lr: f32, momentum: f32) {
    for ((p, v), g) in params.iter_mut().zip(velocity.iter_mut()).zip(grads) {
        *v = momentum * *v + g;
        *p -= lr * *v;
    }
}

/// Observation and legal action indices for `state`, checked against the
/// parameter shapes.
fn features<G: Game>(
    params: &LinearParams,
    game: &G,
    state: &G::State,
) -> Result<(Vec<f32>, Vec<usize>), ModelError> {
    let mut obs = Vec::with_capacity(params.obs_size);
    game.encode_obs(state, &mut obs);
    if obs.len() != params.obs_size {
        return Err(ModelError::ObservationSize {
            expected: params.obs_size,
            got: obs.len(),
        });
    }
    let legal = game
        .legal_actions(state)
        .into_iter()
        .map(|a| game.action_index(a))
        .filter(|&i| i < params.num_actions)
        .collect();
    Ok((obs, legal))
}

/// Frozen parameters used by the search.
#[derive(Debug, Clone)]
pub struct LinearEvaluator {
    params: Arc<LinearParams>,
}

impl LinearEvaluator {
    pub fn new(params: LinearParams) -> Self {
        Self {
            params: Arc::new(params),
        }
    }

    pub fn params(&self) -> &LinearParams {
        &self.params
    }
}

impl<G: Game> Evaluator<G> for LinearEvaluator {
    fn evaluate(&self, game: &G, state: &G::State) -> Result<EvalResult, EvaluatorError> {
        if game.num_actions() != self.params.num_actions {
            return Err(EvaluatorError::ModelError(format!(
                "model has {} actions, game has {}",
                self.params.num_actions,
                game.num_actions()
            )));
        }
        let (obs, legal) =
            features(&self.params, game, state).map_err(|e| EvaluatorError::ModelError(e.to_string()))?;
        Ok(EvalResult {
            policy: self.params.masked_softmax(&obs, &legal),
            value: self.params.value_logit(&obs).tanh(),
        })
    }
}

/// Read a checkpoint file written by [`LinearModel::save_parameters`].
pub fn load_evaluator<G: Game>(path: &Path) -> anyhow::Result<Arc<dyn Evaluator<G>>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let params: LinearParams = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing parameters in {}", path.display()))?;
    params.check_shape()?;
    Ok(Arc::new(LinearEvaluator::new(params)))
}

#[derive(Debug, Clone)]
pub struct LinearModel {
    params: LinearParams,
    velocity: LinearParams,
}

impl LinearModel {
    pub fn new(obs_size: usize, num_actions: usize) -> Self {
        Self {
            params: LinearParams::zeros(obs_size, num_actions),
            velocity: LinearParams::zeros(obs_size, num_actions),
        }
    }

    pub fn for_game<G: Game>(game: &G) -> Self {
        Self::new(game.obs_size(), game.num_actions())
    }

    pub fn params(&self) -> &LinearParams {
        &self.params
    }
}

impl<G: Game> TrainableModel<G> for LinearModel {
    fn train_step(
        &mut self,
        game: &G,
        batch: &[Arc<TrainingRecord<G::State>>],
        learning_rate: f64,
        momentum: f64,
    ) -> Result<StepLoss, ModelError> {
        if batch.is_empty() {
            return Err(ModelError::EmptyBatch);
        }
        let p = &self.params;
        let mut grads = LinearParams::zeros(p.obs_size, p.num_actions);
        let mut policy_loss = 0.0f64;
        let mut value_loss = 0.0f64;

        for record in batch {
            if record.policy.len() != p.num_actions {
                return Err(ModelError::TargetSize {
                    expected: p.num_actions,
                    got: record.policy.len(),
                });
            }
            let (obs, legal) = features(p, game, &record.state)?;

            let probs = p.masked_softmax(&obs, &legal);
            let target_mass: f32 = legal.iter().map(|&a| record.policy[a]).sum();
            for &a in &legal {
                let target = record.policy[a];
                if target > 0.0 {
                    policy_loss -= target as f64 * (probs[a] as f64).max(LOG_EPS).ln();
                }
                let g = probs[a] * target_mass - target;
                grads.b_policy[a] += g;
                let row = &mut grads.w_policy[a * p.obs_size..(a + 1) * p.obs_size];
                for (w, x) in row.iter_mut().zip(&obs) {
                    *w += g * x;
                }
            }

            let v = p.value_logit(&obs).tanh();
            let err = v - record.outcome;
            value_loss += (err as f64).powi(2);
            let g = 2.0 * err * (1.0 - v * v);
            grads.b_value += g;
            for (w, x) in grads.w_value.iter_mut().zip(&obs) {
                *w += g * x;
            }
        }

        let scale = 1.0 / batch.len() as f32;
        for g in grads
            .w_policy
            .iter_mut()
            .chain(grads.b_policy.iter_mut())
            .chain(grads.w_value.iter_mut())
        {
            *g *= scale;
        }
        grads.b_value *= scale;

        let mut params = self.params.clone();
        let mut velocity = self.velocity.clone();
        let (lr, m) = (learning_rate as f32, momentum as f32);
        sgd_momentum(&mut params.w_policy, &mut velocity.w_policy, &grads.w_policy, lr, m);
        sgd_momentum(&mut params.b_policy, &mut velocity.b_policy, &grads.b_policy, lr, m);
        sgd_momentum(&mut params.w_value, &mut velocity.w_value, &grads.w_value, lr, m);
        velocity.b_value = m * velocity.b_value + grads.b_value;
        params.b_value -= lr * velocity.b_value;

        if !params.is_finite() {
            return Err(ModelError::Diverged);
        }
        self.params = params;
        self.velocity = velocity;

        let n = batch.len() as f64;
        let (policy_loss, value_loss) = (policy_loss / n, value_loss / n);
        Ok(StepLoss {
            policy_loss,
            value_loss,
            total: policy_loss + value_loss,
        })
    }

    fn policies(&self, game: &G, states: &[&G::State]) -> Result<Vec<Vec<f32>>, ModelError> {
        states
            .iter()
            .map(|state| {
                let (obs, legal) = features(&self.params, game, state)?;
                Ok(self.params.masked_softmax(&obs, &legal))
            })
            .collect()
    }

    fn snapshot(&self) -> Arc<dyn Evaluator<G>> {
        Arc::new(LinearEvaluator::new(self.params.clone()))
    }

    fn save_parameters(&self) -> Result<Vec<u8>, ModelError> {
        Ok(serde_json::to_vec(&self.params)?)
    }

    /// Replace the parameters. Momentum restarts from zero.
    fn load_parameters(&mut self, bytes: &[u8]) -> Result<(), ModelError> {
        let params: LinearParams = serde_json::from_slice(bytes)?;
        params.check_shape()?;
        if params.obs_size != self.params.obs_size || params.num_actions != self.params.num_actions
        {
            return Err(ModelError::Parameters(format!(
                "checkpoint is {} x {}, model is {} x {}",
                params.num_actions, params.obs_size, self.params.num_actions, self.params.obs_size
            )));
        }
        self.velocity = LinearParams::zeros(params.obs_size, params.num_actions);
        self.params = params;
        Ok(())
    }
}
