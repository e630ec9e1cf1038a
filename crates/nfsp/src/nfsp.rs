//! NFSP strategy controller.
//!
//! Mixes the value head (best response) and the policy head (average
//! strategy) with the anticipatory parameter `eta`, and owns the target
//! network used to build value-learning targets.

use std::rc::Rc;

use candle_core::Device;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::NfspError;
use crate::bucket::Bucket;
use crate::config::{NfspConfig, check_probability};
use crate::decision::{Choice, Decision, PlayerId};
use crate::featurizer::CardFeaturizer;
use crate::heads::{HeadBuilder, PiNetwork, QNetwork};
use crate::history::{EpisodeCounter, HistorySink, Recorder};
use crate::policy::{legal_distribution, sample_bucket};
use crate::state::EncodedState;
use crate::strategy::{Strategy, best_response};
use crate::target::{SyncStatus, TargetQNetwork};

/// Mutable selection flags read by the training loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyState {
    /// Whether the last decision came from the value head.
    pub is_q_used: bool,
    pub eps: f64,
    pub eta: f64,
}

/// One NFSP agent: value head, policy head, target network.
///
/// Both heads read one shared featurizer and one shared trunk, so a step of
/// either optimizer moves the representation the other head sees. The
/// target network keeps private copies of everything.
pub struct NfspStrategy {
    q: QNetwork,
    pi: PiNetwork,
    target: TargetQNetwork,
    state: StrategyState,
    greedy: bool,
    gamma: f64,
    target_sync_period: u64,
    player: PlayerId,
    rng: StdRng,
}

impl NfspStrategy {
    /// Build the networks for `player`.
    ///
    /// Every forward pass of either head is reported to `history` under the
    /// current value of `episodes`. The target starts as a copy of the value
    /// head.
    pub fn new(
        config: &NfspConfig,
        player: PlayerId,
        history: Rc<dyn HistorySink>,
        episodes: EpisodeCounter,
        device: &Device,
    ) -> Result<Self, NfspError> {
        config.validate()?;
        let featurizer = Rc::new(CardFeaturizer::new(config, device)?);
        let recorder = Recorder::new(history, episodes, player);

        let pi = HeadBuilder::new(config, Rc::clone(&featurizer), device)
            .recorder(recorder.clone())
            .build_policy()?;
        let q = HeadBuilder::new(config, featurizer, device)
            .paired_with(&pi)
            .recorder(recorder)
            .build_value()?;
        let mut target = TargetQNetwork::new(config, device)?;
        target.sync_from(&q)?;

        log::debug!(
            "NFSP player {player}: {} actions, eta {}, eps {}, target sync every {} episodes",
            config.num_actions,
            config.eta,
            config.eps,
            config.target_sync_period
        );

        Ok(Self {
            q,
            pi,
            target,
            state: StrategyState {
                is_q_used: false,
                eps: config.eps,
                eta: config.eta,
            },
            greedy: config.greedy,
            gamma: config.gamma,
            target_sync_period: config.target_sync_period,
            player,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(u64::from(player))),
        })
    }

    /// Regress the value head; returns per-sample `prediction - target`.
    pub fn learn_value(
        &mut self,
        states: &EncodedState,
        actions: &[Bucket],
        targets: &[f32],
        weights: &[f32],
    ) -> Result<Vec<f32>, NfspError> {
        self.q.learn(states, actions, targets, weights)
    }

    /// Fit the policy head to the actions taken by the best response.
    pub fn learn_policy(&mut self, states: &EncodedState, actions: &[Bucket]) -> Result<(), NfspError> {
        self.pi.learn(states, actions)
    }

    /// Copy the value head into the target network.
    pub fn sync_target_network(&mut self) -> Result<(), NfspError> {
        self.target.sync_from(&self.q)
    }

    /// Called by the training loop after `episode` finished. Syncs the target
    /// every `target_sync_period` episodes and reports whether it did.
    pub fn end_episode(&mut self, episode: u64) -> Result<bool, NfspError> {
        if episode == 0 || episode % self.target_sync_period != 0 {
            return Ok(false);
        }
        self.sync_target_network()?;
        log::info!("player {}: target network synced after episode {episode}", self.player);
        Ok(true)
    }

    /// Value targets for a batch of transitions, bootstrapped from the target network.
    pub fn td_targets(
        &self,
        rewards: &[f32],
        next_states: &EncodedState,
        terminal: &[bool],
    ) -> Result<Vec<f32>, NfspError> {
        self.target.td_targets(rewards, next_states, terminal, self.gamma)
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    /// Anneal the exploration rate. Rejects values outside `[0, 1]`.
    pub fn set_eps(&mut self, eps: f64) -> Result<(), NfspError> {
        check_probability("eps", eps)?;
        self.state.eps = eps;
        Ok(())
    }

    /// Change the anticipatory parameter. Rejects values outside `[0, 1]`.
    pub fn set_eta(&mut self, eta: f64) -> Result<(), NfspError> {
        check_probability("eta", eta)?;
        self.state.eta = eta;
        Ok(())
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn q(&self) -> &QNetwork {
        &self.q
    }

    pub fn pi(&self) -> &PiNetwork {
        &self.pi
    }

    pub fn target(&self) -> &TargetQNetwork {
        &self.target
    }

    pub fn target_status(&self) -> SyncStatus {
        self.target.status(&self.q)
    }

    fn average_policy(&mut self, decision: &Decision) -> Result<Bucket, NfspError> {
        let probs = self.pi.action_probabilities(decision.state)?;
        let dist = legal_distribution(&probs, decision.legal)?;
        Ok(sample_bucket(&dist, &mut self.rng))
    }
}

impl Strategy for NfspStrategy {
    fn choose_action(&mut self, decision: &Decision) -> Result<Choice, NfspError> {
        if decision.is_all_in()? {
            return Ok(Choice::NULL);
        }

        let action = if self.rng.random::<f64>() < self.state.eta {
            let q_values = self.q.action_values(decision.state)?;
            let action = best_response(
                &q_values,
                decision.legal,
                self.greedy,
                self.state.eps,
                &mut self.rng,
            )?;
            self.state.is_q_used = true;
            action
        } else {
            let action = self.average_policy(decision)?;
            self.state.is_q_used = false;
            action
        };

        Ok(Choice {
            action: Some(action),
            is_q_used: self.state.is_q_used,
        })
    }
}
