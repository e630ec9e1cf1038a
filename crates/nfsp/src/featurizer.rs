//! Card featurizer: hand and board indicator grids to card embeddings.
//!
//! Hand and board are aggregated by rank and by suit. The rank aggregates go
//! through a stack of convolutions over the rank axis (kernel 5, 3 and a
//! dilated 3) to pick up straights and gaps, and through dense layers to pick
//! up pairs, trips and quads. The suit aggregates go through a 1-wide
//! convolution to pick up flushes. The board is also read street by street
//! (flop, flop+turn, flop+turn+river). Everything is fused with the raw hand
//! into one card embedding, from which a hand-strength estimate is read off.

use candle_core::{D, DType, Device, Tensor, Var};
use candle_nn::{Conv1d, Conv1dConfig, Linear, Module, VarBuilder, VarMap};

use crate::NfspError;
use crate::config::NfspConfig;
use crate::layers::{alpha_dropout, fresh_varmap, lecun_conv1d, lecun_linear, named_vars, selu};
use crate::state::{EncodedState, RANKS, SUITS};

/// Cards per grid (13 ranks x 4 suits).
const GRID: usize = RANKS * SUITS;

/// Hand and board rows stacked as convolution input channels.
const CHANNELS: usize = 2;

/// Outputs of one featurizer pass. All embeddings are `[B, hidden_dim]`.
#[derive(Debug, Clone)]
pub struct CardFeatures {
    /// `[B, 1]` in `[0, 1]`.
    pub hand_strength: Tensor,
    pub cards: Tensor,
    pub flop: Tensor,
    pub turn: Tensor,
    pub river: Tensor,
}

/// Two dense layers applied in order, each followed by SELU.
struct DenseStack([Linear; 2]);

impl DenseStack {
    fn new(in_dim: usize, hidden_dim: usize, vb: VarBuilder) -> Result<Self, candle_core::Error> {
        Ok(Self([
            lecun_linear(in_dim, hidden_dim, vb.pp("0"))?,
            lecun_linear(hidden_dim, hidden_dim, vb.pp("1"))?,
        ]))
    }

    fn forward(&self, x: &Tensor, rate: f64, train: bool) -> Result<Tensor, candle_core::Error> {
        self.0.iter().try_fold(x.clone(), |h, layer| {
            alpha_dropout(&selu(&layer.forward(&h)?)?, rate, train)
        })
    }
}

/// Convolutional straight detector over the rank axis.
struct StraightDetector {
    spread: Conv1d,
    wide: Conv1d,
    narrow: Conv1d,
    dilated: Conv1d,
    project: Linear,
}

/// Card featurizer network. Owns its parameters in a private `VarMap`.
pub struct CardFeaturizer {
    varmap: VarMap,
    straights: StraightDetector,
    multiples: DenseStack,
    flush_conv: Conv1d,
    flush_project: Linear,
    flop: DenseStack,
    turn: DenseStack,
    river: DenseStack,
    board: Linear,
    hand: DenseStack,
    fuse: DenseStack,
    strength: Linear,
    dropout: f64,
    hidden_dim: usize,
}

impl CardFeaturizer {
    /// Create a featurizer with freshly initialized weights.
    pub fn new(config: &NfspConfig, device: &Device) -> Result<Self, NfspError> {
        config.validate()?;
        let (varmap, vs) = fresh_varmap(device);
        let h = config.hidden_dim;
        let f = config.n_filters;

        let straights = StraightDetector {
            spread: lecun_conv1d(CHANNELS, f, 1, Conv1dConfig::default(), vs.pp("straight_spread"))?,
            wide: lecun_conv1d(
                f,
                f,
                5,
                Conv1dConfig {
                    padding: 2,
                    ..Default::default()
                },
                vs.pp("straight_wide"),
            )?,
            narrow: lecun_conv1d(
                f,
                f,
                3,
                Conv1dConfig {
                    padding: 1,
                    ..Default::default()
                },
                vs.pp("straight_narrow"),
            )?,
            dilated: lecun_conv1d(
                f,
                f,
                3,
                Conv1dConfig {
                    padding: 2,
                    dilation: 2,
                    ..Default::default()
                },
                vs.pp("straight_dilated"),
            )?,
            project: lecun_linear(3 * f * RANKS, h, vs.pp("straight_project"))?,
        };

        Ok(Self {
            straights,
            multiples: DenseStack::new(CHANNELS * RANKS, h, vs.pp("multiples"))?,
            flush_conv: lecun_conv1d(CHANNELS, f, 1, Conv1dConfig::default(), vs.pp("flush_conv"))?,
            flush_project: lecun_linear(SUITS * f, h, vs.pp("flush_project"))?,
            flop: DenseStack::new(GRID, h, vs.pp("flop"))?,
            turn: DenseStack::new(GRID, h, vs.pp("turn"))?,
            river: DenseStack::new(GRID, h, vs.pp("river"))?,
            board: lecun_linear(3 * h, h, vs.pp("board"))?,
            hand: DenseStack::new(GRID, h, vs.pp("hand"))?,
            fuse: DenseStack::new(5 * h, h, vs.pp("fuse"))?,
            strength: lecun_linear(h, 1, vs.pp("strength"))?,
            varmap,
            dropout: config.dropout,
            hidden_dim: h,
        })
    }

    /// Featurize the cards of a batch. Alpha dropout is active when `train`.
    pub fn forward(&self, state: &EncodedState, train: bool) -> Result<CardFeatures, NfspError> {
        let (hand, board) = (&state.hand, &state.board);
        let rate = self.dropout;
        let act = |x: Tensor| -> Result<Tensor, candle_core::Error> {
            alpha_dropout(&selu(&x)?, rate, train)
        };

        // [B, 2, 4] suit counts and [B, 2, 13] rank counts of hand and board.
        let suits = Tensor::cat(
            &[hand.sum(1)?.unsqueeze(1)?, board.sum(2)?.sum(1)?.unsqueeze(1)?],
            1,
        )?;
        let ranks = Tensor::cat(
            &[
                hand.sum(D::Minus1)?.unsqueeze(1)?,
                board.sum(D::Minus1)?.sum(1)?.unsqueeze(1)?,
            ],
            1,
        )?;

        let present = ranks.gt(0f32)?.to_dtype(DType::F32)?;
        let spread = act(self.straights.spread.forward(&present)?)?;
        let runs = Tensor::cat(
            &[
                act(self.straights.wide.forward(&spread)?)?,
                act(self.straights.narrow.forward(&spread)?)?,
                act(self.straights.dilated.forward(&spread)?)?,
            ],
            1,
        )?;
        let straights = act(self.straights.project.forward(&runs.flatten_from(1)?)?)?;

        let multiples = self.multiples.forward(&ranks.flatten_from(1)?, rate, train)?;

        let flushes = act(self.flush_conv.forward(&suits)?)?;
        let flushes = act(self.flush_project.forward(&flushes.flatten_from(1)?)?)?;

        let flop = self.flop.forward(&board_prefix(board, 1)?, rate, train)?;
        let turn = self.turn.forward(&board_prefix(board, 2)?, rate, train)?;
        let river = self.river.forward(&board_prefix(board, 3)?, rate, train)?;
        let board_features = act(self.board.forward(&Tensor::cat(&[&flop, &turn, &river], 1)?)?)?;

        let hand_features = self.hand.forward(&hand.flatten_from(1)?, rate, train)?;
        let fused = Tensor::cat(
            &[&hand_features, &board_features, &flushes, &multiples, &straights],
            1,
        )?;
        let cards = self.fuse.forward(&fused, rate, train)?;

        let hand_strength = candle_nn::ops::sigmoid(&self.strength.forward(&cards)?)?;
        Ok(CardFeatures {
            hand_strength,
            cards,
            flop,
            turn,
            river,
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Trainable parameters, for optimizers of every head reading from this featurizer.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub(crate) fn named_vars(&self) -> Result<Vec<(String, Var)>, NfspError> {
        named_vars(&self.varmap, "featurizer")
    }
}

/// Union of the first `streets` board grids, flattened to `[B, 52]`.
fn board_prefix(board: &Tensor, streets: usize) -> Result<Tensor, candle_core::Error> {
    board.narrow(1, 0, streets)?.sum(1)?.flatten_from(1)
}
