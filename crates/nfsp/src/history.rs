//! Diagnostic record of raw network outputs.
//!
//! Heads report every forward pass to a [`HistorySink`] through a
//! [`Recorder`], keyed by the externally advanced episode counter and the
//! owning player. Recording is optional: [`NoHistory`] discards everything.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use candle_core::Tensor;
use rustc_hash::FxHashMap;

use crate::NfspError;
use crate::decision::PlayerId;

/// Which head produced a recorded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    QValues,
    Policy,
}

/// Receiver of per-step network outputs.
pub trait HistorySink {
    fn record(&self, episode: u64, player: PlayerId, kind: OutputKind, rows: Vec<Vec<f32>>);

    /// Sinks that drop everything return `false` so heads can skip the
    /// device-to-host copy.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Sink that discards all outputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

impl HistorySink for NoHistory {
    fn record(&self, _: u64, _: PlayerId, _: OutputKind, _: Vec<Vec<f32>>) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Latest outputs of each head for one player in one episode.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StepOutputs {
    pub q: Option<Vec<Vec<f32>>>,
    pub pi: Option<Vec<Vec<f32>>>,
}

/// In-memory history: episode -> player -> latest outputs.
#[derive(Debug, Default)]
pub struct NetworkHistory {
    episodes: RefCell<BTreeMap<u64, FxHashMap<PlayerId, StepOutputs>>>,
}

impl NetworkHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest outputs recorded for `player` during `episode`.
    pub fn get(&self, episode: u64, player: PlayerId) -> Option<StepOutputs> {
        self.episodes
            .borrow()
            .get(&episode)
            .and_then(|players| players.get(&player))
            .cloned()
    }

    /// Number of episodes with at least one record.
    pub fn len(&self) -> usize {
        self.episodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.borrow().is_empty()
    }

    /// Hand the collected history to a logging collaborator and start over.
    pub fn take(&self) -> BTreeMap<u64, FxHashMap<PlayerId, StepOutputs>> {
        std::mem::take(&mut *self.episodes.borrow_mut())
    }
}

impl HistorySink for NetworkHistory {
    fn record(&self, episode: u64, player: PlayerId, kind: OutputKind, rows: Vec<Vec<f32>>) {
        let mut episodes = self.episodes.borrow_mut();
        let outputs = episodes
            .entry(episode)
            .or_default()
            .entry(player)
            .or_default();
        match kind {
            OutputKind::QValues => outputs.q = Some(rows),
            OutputKind::Policy => outputs.pi = Some(rows),
        }
    }
}

/// Episode clock shared between the training loop and the heads.
#[derive(Debug, Default, Clone)]
pub struct EpisodeCounter(Rc<Cell<u64>>);

impl EpisodeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.get()
    }

    pub fn set(&self, episode: u64) {
        self.0.set(episode);
    }

    /// Move to the next episode and return its number.
    pub fn advance(&self) -> u64 {
        let next = self.0.get() + 1;
        self.0.set(next);
        next
    }
}

/// A sink bound to an episode clock and the player owning a head.
#[derive(Clone)]
pub struct Recorder {
    sink: Rc<dyn HistorySink>,
    episodes: EpisodeCounter,
    player: PlayerId,
}

impl Recorder {
    pub fn new(sink: Rc<dyn HistorySink>, episodes: EpisodeCounter, player: PlayerId) -> Self {
        Self {
            sink,
            episodes,
            player,
        }
    }

    /// Recorder that drops every output.
    pub fn disabled() -> Self {
        Self::new(Rc::new(NoHistory), EpisodeCounter::new(), 0)
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Report a `[B, num_actions]` output tensor.
    pub(crate) fn record(&self, kind: OutputKind, output: &Tensor) -> Result<(), NfspError> {
        if !self.sink.is_enabled() {
            return Ok(());
        }
        let rows = output.to_vec2::<f32>()?;
        self.sink
            .record(self.episodes.current(), self.player, kind, rows);
        Ok(())
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn recorder_keys_by_current_episode() {
        let history = Rc::new(NetworkHistory::new());
        let episodes = EpisodeCounter::new();
        let recorder = Recorder::new(history.clone(), episodes.clone(), 1);

        let q = Tensor::new(&[[0.5f32, -0.5]], &Device::Cpu).unwrap();
        recorder.record(OutputKind::QValues, &q).unwrap();
        episodes.advance();
        let pi = Tensor::new(&[[0.25f32, 0.75]], &Device::Cpu).unwrap();
        recorder.record(OutputKind::Policy, &pi).unwrap();

        let first = history.get(0, 1).unwrap();
        assert_eq!(first.q, Some(vec![vec![0.5, -0.5]]));
        assert_eq!(first.pi, None);

        let second = history.get(1, 1).unwrap();
        assert_eq!(second.pi, Some(vec![vec![0.25, 0.75]]));
        assert!(history.get(1, 0).is_none());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn later_outputs_replace_earlier_ones() {
        let history = NetworkHistory::new();
        history.record(3, 0, OutputKind::QValues, vec![vec![1.0]]);
        history.record(3, 0, OutputKind::QValues, vec![vec![2.0]]);
        history.record(3, 0, OutputKind::Policy, vec![vec![1.0]]);

        let outputs = history.get(3, 0).unwrap();
        assert_eq!(outputs.q, Some(vec![vec![2.0]]));
        assert_eq!(outputs.pi, Some(vec![vec![1.0]]));
    }

    #[test]
    fn take_drains_history() {
        let history = NetworkHistory::new();
        history.record(0, 0, OutputKind::Policy, vec![vec![1.0]]);
        let drained = history.take();
        assert_eq!(drained.len(), 1);
        assert!(history.is_empty());
    }

    #[test]
    fn disabled_recorder_is_silent() {
        let recorder = Recorder::disabled();
        let q = Tensor::new(&[[1.0f32]], &Device::Cpu).unwrap();
        recorder.record(OutputKind::QValues, &q).unwrap();
    }
}
