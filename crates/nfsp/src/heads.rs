//! Value head (best response) and policy head (average strategy).
//!
//! Both heads read a situation embedding from a [`SharedTrunk`] fed by a
//! [`CardFeaturizer`]. Featurizer and trunk are held through `Rc`: when two
//! heads hold the same trunk, an optimizer step from either head moves the
//! parameters the other one reads. Each head's optimizer covers featurizer,
//! trunk and its own two output layers.
//!
//! Heads are `!Send`. Learn calls on heads sharing a trunk are serialized by
//! construction.

use std::rc::Rc;

use candle_core::backprop::GradStore;
use candle_core::{D, Device, Tensor, Var};
use candle_nn::{AdamW, Linear, Module, Optimizer, ParamsAdamW, VarMap, linear};

use crate::NfspError;
use crate::bucket::Bucket;
use crate::config::NfspConfig;
use crate::featurizer::CardFeaturizer;
use crate::history::{OutputKind, Recorder};
use crate::layers::{fresh_varmap, named_vars, selu};
use crate::state::EncodedState;
use crate::trunk::SharedTrunk;

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// Featurizer and trunk a head reads its situation embedding from.
#[derive(Clone)]
pub(crate) struct Backbone {
    pub(crate) featurizer: Rc<CardFeaturizer>,
    pub(crate) trunk: Rc<SharedTrunk>,
}

impl Backbone {
    pub(crate) fn situation(&self, state: &EncodedState, train: bool) -> Result<Tensor, NfspError> {
        let cards = self.featurizer.forward(state, train)?;
        self.trunk.forward(&cards, state)
    }

    fn vars(&self) -> Vec<Var> {
        let mut vars = self.featurizer.vars();
        vars.extend(self.trunk.vars());
        vars
    }

    fn named_vars(&self) -> Result<Vec<(String, Var)>, NfspError> {
        let mut vars = self.featurizer.named_vars()?;
        vars.extend(self.trunk.named_vars()?);
        Ok(vars)
    }
}

/// The two projection layers private to one head.
pub(crate) struct HeadLayers {
    varmap: VarMap,
    hidden: Linear,
    output: Linear,
}

impl HeadLayers {
    pub(crate) fn new(config: &NfspConfig, device: &Device) -> Result<Self, NfspError> {
        let (varmap, vs) = fresh_varmap(device);
        Ok(Self {
            hidden: linear(config.hidden_dim, config.hidden_dim, vs.pp("hidden"))?,
            output: linear(config.hidden_dim, config.num_actions, vs.pp("output"))?,
            varmap,
        })
    }

    /// Unnormalized `[B, num_actions]` outputs.
    pub(crate) fn forward(&self, situation: &Tensor) -> Result<Tensor, candle_core::Error> {
        let h = selu(&self.hidden.forward(situation)?)?;
        self.output.forward(&h)
    }

    fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    fn named_vars(&self) -> Result<Vec<(String, Var)>, NfspError> {
        named_vars(&self.varmap, "head")
    }
}

/// All parameters a value network is made of, in a stable order.
pub(crate) fn value_named_vars(
    backbone: &Backbone,
    head: &HeadLayers,
) -> Result<Vec<(String, Var)>, NfspError> {
    let mut vars = backbone.named_vars()?;
    vars.extend(head.named_vars()?);
    Ok(vars)
}

/// Adam (AdamW without weight decay) over the given parameters.
fn adam(vars: Vec<Var>, learning_rate: f64) -> Result<AdamW, NfspError> {
    let params = ParamsAdamW {
        lr: learning_rate,
        weight_decay: 0.0,
        ..Default::default()
    };
    Ok(AdamW::new(vars, params)?)
}

/// Convert taken buckets to a `[B]` u32 index tensor.
fn action_indices(
    actions: &[Bucket],
    num_actions: usize,
    device: &Device,
) -> Result<Tensor, NfspError> {
    let indices = actions
        .iter()
        .map(|a| a.index_in(num_actions).map(|i| i as u32))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Tensor::from_vec(indices, actions.len(), device)?)
}

fn expect_batch(what: &str, len: usize, batch: usize) -> Result<(), NfspError> {
    if len != batch {
        return Err(NfspError::Shape(format!(
            "{what}: expected {batch} entries, got {len}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Anything holding a trunk another head can pair with.
pub trait TrunkHolder {
    fn trunk(&self) -> &Rc<SharedTrunk>;
}

/// Constructs value and policy heads.
///
/// By default a head owns a private trunk. [`shared_trunk`](Self::shared_trunk)
/// and [`paired_with`](Self::paired_with) make it read an existing trunk
/// instead; supplying both is rejected at build time.
pub struct HeadBuilder<'a> {
    config: &'a NfspConfig,
    featurizer: Rc<CardFeaturizer>,
    device: &'a Device,
    shared_trunk: Option<Rc<SharedTrunk>>,
    partner_trunk: Option<Rc<SharedTrunk>>,
    recorder: Recorder,
}

impl<'a> HeadBuilder<'a> {
    pub fn new(config: &'a NfspConfig, featurizer: Rc<CardFeaturizer>, device: &'a Device) -> Self {
        Self {
            config,
            featurizer,
            device,
            shared_trunk: None,
            partner_trunk: None,
            recorder: Recorder::disabled(),
        }
    }

    /// Read from an existing trunk.
    pub fn shared_trunk(mut self, trunk: Rc<SharedTrunk>) -> Self {
        self.shared_trunk = Some(trunk);
        self
    }

    /// Read from the trunk of an already built head.
    pub fn paired_with(mut self, partner: &impl TrunkHolder) -> Self {
        self.partner_trunk = Some(Rc::clone(partner.trunk()));
        self
    }

    /// Report every forward pass to `recorder`.
    pub fn recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn build_value(self) -> Result<QNetwork, NfspError> {
        let grad_clip = self.config.grad_clip;
        let (backbone, head, recorder, config) = self.parts()?;
        let vars = [backbone.vars(), head.vars()].concat();
        let optimizer = adam(vars.clone(), config.learning_rate)?;
        Ok(QNetwork {
            backbone,
            head,
            optimizer,
            vars,
            recorder,
            num_actions: config.num_actions,
            grad_clip,
            generation: 0,
        })
    }

    pub fn build_policy(self) -> Result<PiNetwork, NfspError> {
        let (backbone, head, recorder, config) = self.parts()?;
        let vars = [backbone.vars(), head.vars()].concat();
        let optimizer = adam(vars, config.learning_rate)?;
        Ok(PiNetwork {
            backbone,
            head,
            optimizer,
            recorder,
            num_actions: config.num_actions,
        })
    }

    fn parts(self) -> Result<(Backbone, HeadLayers, Recorder, &'a NfspConfig), NfspError> {
        self.config.validate()?;
        let trunk = match (self.shared_trunk, self.partner_trunk) {
            (Some(_), Some(_)) => return Err(NfspError::ConflictingTrunk),
            (Some(trunk), None) | (None, Some(trunk)) => trunk,
            (None, None) => Rc::new(SharedTrunk::new(self.config, self.device)?),
        };
        if trunk.hidden_dim() != self.config.hidden_dim
            || self.featurizer.hidden_dim() != self.config.hidden_dim
        {
            return Err(NfspError::Shape(format!(
                "featurizer width {} and trunk width {} must both equal hidden_dim {}",
                self.featurizer.hidden_dim(),
                trunk.hidden_dim(),
                self.config.hidden_dim
            )));
        }
        let head = HeadLayers::new(self.config, self.device)?;
        let backbone = Backbone {
            featurizer: self.featurizer,
            trunk,
        };
        Ok((backbone, head, self.recorder, self.config))
    }
}

// ---------------------------------------------------------------------------
// Value head
// ---------------------------------------------------------------------------

/// Best-response network: per-action value estimates.
pub struct QNetwork {
    backbone: Backbone,
    head: HeadLayers,
    optimizer: AdamW,
    vars: Vec<Var>,
    recorder: Recorder,
    num_actions: usize,
    grad_clip: f64,
    generation: u64,
}

impl QNetwork {
    /// `[B, num_actions]` Q-values.
    pub fn forward(&self, state: &EncodedState) -> Result<Tensor, NfspError> {
        self.forward_t(state, false)
    }

    /// Q-values of the first (usually only) state in the batch.
    pub fn action_values(&self, state: &EncodedState) -> Result<Vec<f32>, NfspError> {
        Ok(self.forward(state)?.get(0)?.to_vec1::<f32>()?)
    }

    /// Regress the values of the taken actions towards `targets`.
    ///
    /// Loss is the importance-weighted squared error. Gradients are clamped
    /// element-wise to the configured bound before one optimizer step.
    /// Returns the per-sample `prediction - target` computed before the step.
    pub fn learn(
        &mut self,
        states: &EncodedState,
        actions: &[Bucket],
        targets: &[f32],
        weights: &[f32],
    ) -> Result<Vec<f32>, NfspError> {
        let (td_deltas, _) = self.learn_step(states, actions, targets, weights)?;
        Ok(td_deltas)
    }

    /// One update; also hands back the clamped gradients the optimizer applied.
    pub(crate) fn learn_step(
        &mut self,
        states: &EncodedState,
        actions: &[Bucket],
        targets: &[f32],
        weights: &[f32],
    ) -> Result<(Vec<f32>, GradStore), NfspError> {
        let (loss, td_deltas) = self.loss(states, actions, targets, weights)?;
        let mut grads = loss.backward()?;
        clamp_gradients(&mut grads, &self.vars, self.grad_clip)?;
        self.optimizer.step(&grads)?;
        self.generation += 1;

        log::debug!(
            "value head update {}: loss {:.6}",
            self.generation,
            loss.to_scalar::<f32>()?
        );
        Ok((td_deltas.to_vec1::<f32>()?, grads))
    }

    /// Weighted MSE loss and the signed per-sample errors.
    pub(crate) fn loss(
        &self,
        states: &EncodedState,
        actions: &[Bucket],
        targets: &[f32],
        weights: &[f32],
    ) -> Result<(Tensor, Tensor), NfspError> {
        let b = states.batch_size();
        expect_batch("actions", actions.len(), b)?;
        expect_batch("targets", targets.len(), b)?;
        expect_batch("importance weights", weights.len(), b)?;

        let device = states.device();
        let indices = action_indices(actions, self.num_actions, device)?;
        let predictions = self
            .forward_t(states, true)?
            .gather(&indices.unsqueeze(1)?, 1)?
            .squeeze(1)?;
        let targets = Tensor::from_slice(targets, b, device)?;
        let weights = Tensor::from_slice(weights, b, device)?;
        weighted_mse(&predictions, &targets, &weights)
    }

    /// Trainable parameters seen by this head's optimizer.
    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    /// Number of optimizer steps taken so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn featurizer(&self) -> &Rc<CardFeaturizer> {
        &self.backbone.featurizer
    }

    pub(crate) fn named_vars(&self) -> Result<Vec<(String, Var)>, NfspError> {
        value_named_vars(&self.backbone, &self.head)
    }

    fn forward_t(&self, state: &EncodedState, train: bool) -> Result<Tensor, NfspError> {
        let situation = self.backbone.situation(state, train)?;
        let q_values = self.head.forward(&situation)?;
        self.recorder.record(OutputKind::QValues, &q_values)?;
        Ok(q_values)
    }
}

impl TrunkHolder for QNetwork {
    fn trunk(&self) -> &Rc<SharedTrunk> {
        &self.backbone.trunk
    }
}

// ---------------------------------------------------------------------------
// Policy head
// ---------------------------------------------------------------------------

/// Average-policy network: a distribution over actions.
pub struct PiNetwork {
    backbone: Backbone,
    head: HeadLayers,
    optimizer: AdamW,
    recorder: Recorder,
    num_actions: usize,
}

impl PiNetwork {
    /// `[B, num_actions]` action probabilities.
    pub fn forward(&self, state: &EncodedState) -> Result<Tensor, NfspError> {
        self.recorded_probabilities(&self.logits(state, false)?)
    }

    /// Action probabilities of the first state in the batch.
    pub fn action_probabilities(&self, state: &EncodedState) -> Result<Vec<f32>, NfspError> {
        Ok(self.forward(state)?.get(0)?.to_vec1::<f32>()?)
    }

    /// One classification step towards the actions that were taken.
    pub fn learn(&mut self, states: &EncodedState, actions: &[Bucket]) -> Result<(), NfspError> {
        let loss = self.loss(states, actions)?;
        self.optimizer.backward_step(&loss)?;
        log::debug!("policy head update: loss {:.6}", loss.to_scalar::<f32>()?);
        Ok(())
    }

    /// Cross-entropy of the logits against `bucket + 1` class labels.
    pub(crate) fn loss(&self, states: &EncodedState, actions: &[Bucket]) -> Result<Tensor, NfspError> {
        expect_batch("actions", actions.len(), states.batch_size())?;
        let labels = action_indices(actions, self.num_actions, states.device())?;
        let logits = self.logits(states, true)?;
        self.recorded_probabilities(&logits.detach())?;
        Ok(candle_nn::loss::cross_entropy(&logits, &labels)?)
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn featurizer(&self) -> &Rc<CardFeaturizer> {
        &self.backbone.featurizer
    }

    fn logits(&self, state: &EncodedState, train: bool) -> Result<Tensor, NfspError> {
        let situation = self.backbone.situation(state, train)?;
        Ok(self.head.forward(&situation)?)
    }

    fn recorded_probabilities(&self, logits: &Tensor) -> Result<Tensor, NfspError> {
        let probs = candle_nn::ops::softmax(logits, D::Minus1)?;
        self.recorder.record(OutputKind::Policy, &probs)?;
        Ok(probs)
    }
}

impl TrunkHolder for PiNetwork {
    fn trunk(&self) -> &Rc<SharedTrunk> {
        &self.backbone.trunk
    }
}

// ---------------------------------------------------------------------------
// Loss and gradient helpers
// ---------------------------------------------------------------------------

/// `mean(w * (pred - target)^2)` together with `pred - target`.
fn weighted_mse(
    predictions: &Tensor,
    targets: &Tensor,
    weights: &Tensor,
) -> Result<(Tensor, Tensor), NfspError> {
    let td_deltas = predictions.sub(targets)?;
    let loss = weights.mul(&td_deltas.sqr()?)?.mean_all()?;
    Ok((loss, td_deltas.detach()))
}

/// Clamp every gradient element into `[-bound, bound]`.
pub(crate) fn clamp_gradients(
    grads: &mut GradStore,
    vars: &[Var],
    bound: f64,
) -> Result<(), NfspError> {
    for var in vars {
        if let Some(grad) = grads.remove(var.as_tensor()) {
            grads.insert(var.as_tensor(), grad.clamp(-bound, bound)?);
        }
    }
    Ok(())
}

/// Build a standalone value network with private featurizer and trunk.
pub(crate) fn standalone_value_parts(
    config: &NfspConfig,
    device: &Device,
) -> Result<(Backbone, HeadLayers), NfspError> {
    let featurizer = Rc::new(CardFeaturizer::new(config, device)?);
    let trunk = Rc::new(SharedTrunk::new(config, device)?);
    let head = HeadLayers::new(config, device)?;
    Ok((Backbone { featurizer, trunk }, head))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{EpisodeCounter, NetworkHistory};
    use crate::state::RawState;

    fn small_config() -> NfspConfig {
        NfspConfig {
            hidden_dim: 16,
            n_filters: 4,
            num_actions: 16,
            dropout: 0.0,
            ..NfspConfig::default()
        }
    }

    fn featurizer(config: &NfspConfig) -> Rc<CardFeaturizer> {
        Rc::new(CardFeaturizer::new(config, &Device::Cpu).unwrap())
    }

    fn batch(n: usize) -> EncodedState {
        let raw: Vec<RawState> = (0..n)
            .map(|i| {
                let mut s = RawState::empty();
                s.hand[i % 13][0] = 1.0;
                s.hand[(i + 5) % 13][2] = 1.0;
                s.pot = 3.0 + i as f32;
                s.stack = 100.0 - i as f32;
                s.opponent_stack = 100.0;
                s.big_blind = 2.0;
                s.dealer = (i % 2) as f32;
                s.plays[0][i] = 1.0;
                s
            })
            .collect();
        EncodedState::from_raw(&raw, &Device::Cpu).unwrap()
    }

    #[test]
    fn value_head_outputs_one_value_per_action() {
        let config = small_config();
        let q = HeadBuilder::new(&config, featurizer(&config), &Device::Cpu)
            .build_value()
            .unwrap();
        assert_eq!(q.forward(&batch(3)).unwrap().dims(), &[3, 16]);
        assert_eq!(q.action_values(&batch(1)).unwrap().len(), 16);
    }

    #[test]
    fn policy_head_outputs_distribution() {
        let config = small_config();
        let pi = HeadBuilder::new(&config, featurizer(&config), &Device::Cpu)
            .build_policy()
            .unwrap();
        let probs = pi.forward(&batch(4)).unwrap().to_vec2::<f32>().unwrap();
        for row in probs {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "row sums to {sum}");
            assert!(row.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn both_trunk_sources_are_rejected() {
        let config = small_config();
        let f = featurizer(&config);
        let pi = HeadBuilder::new(&config, f.clone(), &Device::Cpu)
            .build_policy()
            .unwrap();
        let trunk = Rc::new(SharedTrunk::new(&config, &Device::Cpu).unwrap());
        let result = HeadBuilder::new(&config, f, &Device::Cpu)
            .shared_trunk(trunk)
            .paired_with(&pi)
            .build_value();
        assert!(matches!(result, Err(NfspError::ConflictingTrunk)));
    }

    #[test]
    fn paired_heads_share_one_trunk() {
        let config = small_config();
        let f = featurizer(&config);
        let pi = HeadBuilder::new(&config, f.clone(), &Device::Cpu)
            .build_policy()
            .unwrap();
        let q = HeadBuilder::new(&config, f, &Device::Cpu)
            .paired_with(&pi)
            .build_value()
            .unwrap();
        assert!(Rc::ptr_eq(q.trunk(), pi.trunk()));

        let private = HeadBuilder::new(&config, featurizer(&config), &Device::Cpu)
            .build_value()
            .unwrap();
        assert!(!Rc::ptr_eq(private.trunk(), pi.trunk()));
    }

    #[test]
    fn mismatched_trunk_width_is_rejected() {
        let config = small_config();
        let wide = NfspConfig {
            hidden_dim: 32,
            ..small_config()
        };
        let trunk = Rc::new(SharedTrunk::new(&wide, &Device::Cpu).unwrap());
        let result = HeadBuilder::new(&config, featurizer(&config), &Device::Cpu)
            .shared_trunk(trunk)
            .build_policy();
        assert!(matches!(result, Err(NfspError::Shape(_))));
    }

    #[test]
    fn td_deltas_are_predictions_minus_targets() {
        let config = small_config();
        let mut q = HeadBuilder::new(&config, featurizer(&config), &Device::Cpu)
            .build_value()
            .unwrap();
        let states = batch(4);
        let actions = [Bucket::FOLD, Bucket::CHECK, Bucket::new(3), Bucket::new(14)];
        let targets = [0.2f32, -0.1, 0.5, 0.0];
        let weights = [1.0f32; 4];

        let q_values = q.forward(&states).unwrap().to_vec2::<f32>().unwrap();
        let expected: Vec<f32> = actions
            .iter()
            .zip(&targets)
            .enumerate()
            .map(|(i, (a, t))| q_values[i][a.index_in(16).unwrap()] - t)
            .collect();

        let td_deltas = q.learn(&states, &actions, &targets, &weights).unwrap();
        assert_eq!(td_deltas.len(), 4);
        for (got, want) in td_deltas.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-5, "td delta {got}, expected {want}");
        }
        assert_eq!(q.generation(), 1);

        let after = q.forward(&states).unwrap().to_vec2::<f32>().unwrap();
        assert_ne!(q_values, after, "optimizer step should move the parameters");
    }

    #[test]
    fn weighted_mse_computation() {
        let pred = Tensor::new(&[1.0f32, 2.0, 4.0], &Device::Cpu).unwrap();
        let target = Tensor::new(&[1.0f32, 3.0, 2.0], &Device::Cpu).unwrap();
        let weights = Tensor::new(&[1.0f32, 2.0, 0.5], &Device::Cpu).unwrap();

        let (loss, deltas) = weighted_mse(&pred, &target, &weights).unwrap();
        // (1*0 + 2*1 + 0.5*4) / 3
        let loss = loss.to_scalar::<f32>().unwrap();
        assert!((loss - 4.0 / 3.0).abs() < 1e-5, "loss {loss}");
        assert_eq!(deltas.to_vec1::<f32>().unwrap(), vec![0.0, -1.0, 2.0]);
    }

    #[test]
    fn zero_weights_produce_zero_loss() {
        let config = small_config();
        let q = HeadBuilder::new(&config, featurizer(&config), &Device::Cpu)
            .build_value()
            .unwrap();
        let (loss, _) = q
            .loss(&batch(2), &[Bucket::CHECK, Bucket::CHECK], &[5.0, -5.0], &[0.0, 0.0])
            .unwrap();
        assert_eq!(loss.to_scalar::<f32>().unwrap(), 0.0);
    }

    #[test]
    fn gradients_are_clamped_to_bound() {
        let config = small_config();
        let mut q = HeadBuilder::new(&config, featurizer(&config), &Device::Cpu)
            .build_value()
            .unwrap();
        let states = batch(4);
        let actions = [Bucket::CHECK; 4];
        // Huge targets blow the raw gradients far past the bound.
        let targets = [1e5f32, -1e5, 1e5, -1e5];
        let weights = [1.0f32; 4];

        let max_abs = |vars: &[Var], grads: &GradStore| {
            vars.iter()
                .filter_map(|v| grads.get(v.as_tensor()))
                .map(|g| {
                    g.abs()
                        .unwrap()
                        .flatten_all()
                        .unwrap()
                        .max(0)
                        .unwrap()
                        .to_scalar::<f32>()
                        .unwrap()
                })
                .fold(0.0f32, f32::max)
        };

        let (loss, _) = q.loss(&states, &actions, &targets, &weights).unwrap();
        let raw = max_abs(q.vars(), &loss.backward().unwrap());
        assert!(raw > 10.0, "test needs gradients above the bound, got {raw}");

        let (_, applied) = q.learn_step(&states, &actions, &targets, &weights).unwrap();
        let clamped = max_abs(q.vars(), &applied);
        assert!(clamped <= 10.0, "gradient magnitude {clamped} exceeds bound");
        assert!(clamped > 0.0);
        assert_eq!(q.generation(), 1);
    }

    #[test]
    fn both_heads_record_training_passes() {
        let config = small_config();
        let history = Rc::new(NetworkHistory::new());
        let recorder = Recorder::new(history.clone(), EpisodeCounter::new(), 1);
        let f = featurizer(&config);
        let mut pi = HeadBuilder::new(&config, f.clone(), &Device::Cpu)
            .recorder(recorder.clone())
            .build_policy()
            .unwrap();
        let mut q = HeadBuilder::new(&config, f, &Device::Cpu)
            .paired_with(&pi)
            .recorder(recorder)
            .build_value()
            .unwrap();

        let states = batch(3);
        pi.learn(&states, &[Bucket::CHECK; 3]).unwrap();
        q.learn(&states, &[Bucket::CHECK; 3], &[0.0; 3], &[1.0; 3])
            .unwrap();

        let outputs = history.get(0, 1).unwrap();
        let pi_rows = outputs.pi.unwrap();
        assert_eq!(pi_rows.len(), 3, "policy training batch not recorded");
        for row in pi_rows {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
        assert_eq!(outputs.q.unwrap().len(), 3, "value training batch not recorded");
    }

    #[test]
    fn mismatched_batch_lengths_are_rejected() {
        let config = small_config();
        let mut q = HeadBuilder::new(&config, featurizer(&config), &Device::Cpu)
            .build_value()
            .unwrap();
        let result = q.learn(&batch(2), &[Bucket::CHECK], &[0.0, 0.0], &[1.0, 1.0]);
        assert!(matches!(result, Err(NfspError::Shape(_))));
        assert_eq!(q.generation(), 0);
    }

    #[test]
    fn out_of_range_action_is_rejected() {
        let config = small_config();
        let mut pi = HeadBuilder::new(&config, featurizer(&config), &Device::Cpu)
            .build_policy()
            .unwrap();
        let result = pi.learn(&batch(1), &[Bucket::new(20)]);
        assert!(matches!(result, Err(NfspError::BucketOutOfRange { .. })));
    }

    #[test]
    fn policy_learning_raises_probability_of_taken_action() {
        let config = NfspConfig {
            learning_rate: 1e-2,
            ..small_config()
        };
        let mut pi = HeadBuilder::new(&config, featurizer(&config), &Device::Cpu)
            .build_policy()
            .unwrap();
        let states = batch(4);
        let actions = [Bucket::new(5); 4];
        let target = Bucket::new(5).index_in(16).unwrap();

        let before = pi.forward(&states).unwrap().to_vec2::<f32>().unwrap();
        for _ in 0..20 {
            pi.learn(&states, &actions).unwrap();
        }
        let after = pi.forward(&states).unwrap().to_vec2::<f32>().unwrap();
        for (b, a) in before.iter().zip(&after) {
            assert!(a[target] > b[target], "p(a) went from {} to {}", b[target], a[target]);
        }
    }
}
