//! Target value network: a frozen copy of a live value network.

use candle_core::{D, Device, Tensor, Var};

use crate::NfspError;
use crate::config::NfspConfig;
use crate::heads::{Backbone, HeadLayers, QNetwork, standalone_value_parts, value_named_vars};
use crate::state::EncodedState;

/// Whether the target still matches the live network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Never synced, or the live network has stepped since the last sync.
    Stale,
    Synced,
}

/// Value network whose parameters only change through [`sync_from`](Self::sync_from).
///
/// Owns private featurizer, trunk and head parameters; nothing it computes
/// is tracked for gradients.
pub struct TargetQNetwork {
    backbone: Backbone,
    head: HeadLayers,
    synced_generation: Option<u64>,
}

impl TargetQNetwork {
    pub fn new(config: &NfspConfig, device: &Device) -> Result<Self, NfspError> {
        config.validate()?;
        let (backbone, head) = standalone_value_parts(config, device)?;
        Ok(Self {
            backbone,
            head,
            synced_generation: None,
        })
    }

    /// Copy every parameter of `live` into this network.
    ///
    /// All names and shapes are checked before anything is written, so a
    /// failed sync leaves the target untouched.
    pub fn sync_from(&mut self, live: &QNetwork) -> Result<(), NfspError> {
        let source = live.named_vars()?;
        let target = self.named_vars()?;
        check_compatible(&source, &target)?;

        for ((_, src), (_, dst)) in source.iter().zip(&target) {
            dst.set(&src.as_tensor().detach())?;
        }
        self.synced_generation = Some(live.generation());
        log::debug!(
            "target network synced at value head update {} ({} tensors)",
            live.generation(),
            target.len()
        );
        Ok(())
    }

    pub fn status(&self, live: &QNetwork) -> SyncStatus {
        match self.synced_generation {
            Some(generation) if generation == live.generation() => SyncStatus::Synced,
            _ => SyncStatus::Stale,
        }
    }

    /// `[B, num_actions]` target Q-values.
    pub fn forward(&self, state: &EncodedState) -> Result<Tensor, NfspError> {
        let situation = self.backbone.situation(state, false)?;
        Ok(self.head.forward(&situation)?.detach())
    }

    /// One-step TD targets `r + gamma * max_a Q'(s', a)`, with the bootstrap
    /// term dropped for terminal transitions.
    pub fn td_targets(
        &self,
        rewards: &[f32],
        next_states: &EncodedState,
        terminal: &[bool],
        gamma: f64,
    ) -> Result<Vec<f32>, NfspError> {
        let b = next_states.batch_size();
        if rewards.len() != b || terminal.len() != b {
            return Err(NfspError::Shape(format!(
                "td targets: {} rewards and {} terminal flags for {b} next states",
                rewards.len(),
                terminal.len()
            )));
        }
        let best_next = self.forward(next_states)?.max(D::Minus1)?.to_vec1::<f32>()?;
        Ok(rewards
            .iter()
            .zip(terminal)
            .zip(best_next)
            .map(|((&r, &done), q)| if done { r } else { r + gamma as f32 * q })
            .collect())
    }

    pub(crate) fn named_vars(&self) -> Result<Vec<(String, Var)>, NfspError> {
        value_named_vars(&self.backbone, &self.head)
    }
}

fn check_compatible(source: &[(String, Var)], target: &[(String, Var)]) -> Result<(), NfspError> {
    if source.len() != target.len() {
        return Err(NfspError::SyncFailed(format!(
            "live network has {} parameter tensors, target has {}",
            source.len(),
            target.len()
        )));
    }
    for ((src_name, src), (dst_name, dst)) in source.iter().zip(target) {
        if src_name != dst_name {
            return Err(NfspError::SyncFailed(format!(
                "parameter name mismatch: live {src_name}, target {dst_name}"
            )));
        }
        if src.shape() != dst.shape() {
            return Err(NfspError::SyncFailed(format!(
                "{src_name}: live shape {:?}, target shape {:?}",
                src.dims(),
                dst.dims()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::bucket::Bucket;
    use crate::featurizer::CardFeaturizer;
    use crate::heads::HeadBuilder;
    use crate::state::RawState;

    fn small_config() -> NfspConfig {
        NfspConfig {
            hidden_dim: 16,
            n_filters: 4,
            num_actions: 8,
            dropout: 0.0,
            ..NfspConfig::default()
        }
    }

    fn value_net(config: &NfspConfig) -> QNetwork {
        let featurizer = Rc::new(CardFeaturizer::new(config, &Device::Cpu).unwrap());
        HeadBuilder::new(config, featurizer, &Device::Cpu)
            .build_value()
            .unwrap()
    }

    fn states() -> EncodedState {
        let mut a = RawState::empty();
        a.hand[12][0] = 1.0;
        a.hand[11][0] = 1.0;
        a.pot = 4.0;
        let mut b = RawState::empty();
        b.hand[0][1] = 1.0;
        b.hand[5][2] = 1.0;
        b.stack = 50.0;
        EncodedState::from_raw(&[a, b], &Device::Cpu).unwrap()
    }

    fn snapshot(target: &TargetQNetwork) -> Vec<Vec<f32>> {
        target
            .named_vars()
            .unwrap()
            .iter()
            .map(|(_, v)| v.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap())
            .collect()
    }

    #[test]
    fn synced_target_reproduces_live_outputs() {
        let config = small_config();
        let live = value_net(&config);
        let mut target = TargetQNetwork::new(&config, &Device::Cpu).unwrap();
        let s = states();

        assert_ne!(
            live.forward(&s).unwrap().to_vec2::<f32>().unwrap(),
            target.forward(&s).unwrap().to_vec2::<f32>().unwrap()
        );
        target.sync_from(&live).unwrap();
        assert_eq!(
            live.forward(&s).unwrap().to_vec2::<f32>().unwrap(),
            target.forward(&s).unwrap().to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn sync_is_idempotent() {
        let config = small_config();
        let live = value_net(&config);
        let mut target = TargetQNetwork::new(&config, &Device::Cpu).unwrap();

        target.sync_from(&live).unwrap();
        let once = snapshot(&target);
        target.sync_from(&live).unwrap();
        assert_eq!(once, snapshot(&target));
    }

    #[test]
    fn target_is_frozen_between_syncs() {
        let config = small_config();
        let mut live = value_net(&config);
        let mut target = TargetQNetwork::new(&config, &Device::Cpu).unwrap();
        assert_eq!(target.status(&live), SyncStatus::Stale);

        target.sync_from(&live).unwrap();
        assert_eq!(target.status(&live), SyncStatus::Synced);
        let synced = snapshot(&target);

        let s = states();
        live.learn(&s, &[Bucket::CHECK, Bucket::FOLD], &[1.0, -1.0], &[1.0, 1.0])
            .unwrap();
        assert_eq!(target.status(&live), SyncStatus::Stale);
        assert_eq!(synced, snapshot(&target), "target moved without a sync");
    }

    #[test]
    fn mismatched_shapes_fail_without_partial_copy() {
        let live = value_net(&small_config());
        let wider = NfspConfig {
            hidden_dim: 24,
            ..small_config()
        };
        let mut target = TargetQNetwork::new(&wider, &Device::Cpu).unwrap();
        let before = snapshot(&target);

        let err = target.sync_from(&live).unwrap_err();
        assert!(matches!(err, NfspError::SyncFailed(_)), "got {err}");
        assert_eq!(before, snapshot(&target));
        assert_eq!(target.status(&live), SyncStatus::Stale);
    }

    #[test]
    fn td_targets_bootstrap_non_terminal_transitions() {
        let config = small_config();
        let target = TargetQNetwork::new(&config, &Device::Cpu).unwrap();
        let s = states();
        let q = target.forward(&s).unwrap().to_vec2::<f32>().unwrap();
        let max0 = q[0].iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let y = target.td_targets(&[1.0, -2.0], &s, &[false, true], 0.9).unwrap();
        assert!((y[0] - (1.0 + 0.9 * max0)).abs() < 1e-5);
        assert_eq!(y[1], -2.0);
    }

    #[test]
    fn td_targets_reject_length_mismatch() {
        let target = TargetQNetwork::new(&small_config(), &Device::Cpu).unwrap();
        let result = target.td_targets(&[1.0], &states(), &[false, false], 0.9);
        assert!(matches!(result, Err(NfspError::Shape(_))));
    }
}
