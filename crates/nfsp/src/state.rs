//! Encoded game states as batched tensors.
//!
//! The numeric encoding of cards and betting history is produced outside this
//! crate as a [`RawState`]. [`EncodedState::from_raw`] is the one canonical way
//! to turn such encodings into network inputs.

use candle_core::{DType, Device, Tensor};

use crate::NfspError;

pub const RANKS: usize = 13;
pub const SUITS: usize = 4;
/// Board grids: flop, turn, river.
pub const BOARD_STREETS: usize = 3;
/// Betting rounds: preflop, flop, turn, river.
pub const STREETS: usize = 4;
/// Shape of one street's action-history grid.
pub const PLAYS_SHAPE: [usize; 3] = [5, 6, 2];
/// Flattened size of one street's action-history grid.
pub const PLAYS_FEATURES: usize = PLAYS_SHAPE[0] * PLAYS_SHAPE[1] * PLAYS_SHAPE[2];
/// Pot, own stack, opponent stack, big blind, dealer flag.
pub const TABLE_SCALARS: usize = 5;

/// One decision's numeric encoding, before batching.
#[derive(Debug, Clone, PartialEq)]
pub struct RawState {
    /// Rank x suit indicator grid of the hole cards.
    pub hand: [[f32; SUITS]; RANKS],
    /// Rank x suit indicator grids of the cards dealt on flop, turn and river.
    pub board: [[[f32; SUITS]; RANKS]; BOARD_STREETS],
    pub pot: f32,
    pub stack: f32,
    pub opponent_stack: f32,
    pub big_blind: f32,
    pub dealer: f32,
    /// Flattened action-history grids, preflop first.
    pub plays: [[f32; PLAYS_FEATURES]; STREETS],
}

impl RawState {
    /// A state with no cards and no betting history.
    pub fn empty() -> Self {
        Self {
            hand: [[0.0; SUITS]; RANKS],
            board: [[[0.0; SUITS]; RANKS]; BOARD_STREETS],
            pot: 0.0,
            stack: 0.0,
            opponent_stack: 0.0,
            big_blind: 0.0,
            dealer: 0.0,
            plays: [[0.0; PLAYS_FEATURES]; STREETS],
        }
    }

    fn table_scalars(&self) -> [f32; TABLE_SCALARS] {
        [
            self.pot,
            self.stack,
            self.opponent_stack,
            self.big_blind,
            self.dealer,
        ]
    }
}

/// Batched network inputs. Every tensor shares the leading batch dimension.
#[derive(Debug, Clone)]
pub struct EncodedState {
    /// `[B, 13, 4]`
    pub(crate) hand: Tensor,
    /// `[B, 3, 13, 4]`
    pub(crate) board: Tensor,
    /// `[B, 5]`: pot, stack, opponent stack, big blind, dealer.
    pub(crate) table: Tensor,
    /// `[B, 5, 6, 2]` each, preflop first.
    pub(crate) plays: [Tensor; STREETS],
}

/// Pre-built tensors handed to [`EncodedState::from_tensors`].
pub struct StateTensors {
    pub hand: Tensor,
    pub board: Tensor,
    pub pot: Tensor,
    pub stack: Tensor,
    pub opponent_stack: Tensor,
    pub big_blind: Tensor,
    pub dealer: Tensor,
    pub plays: [Tensor; STREETS],
}

impl EncodedState {
    /// Stack `batch` raw states into batch-N tensors.
    pub fn from_raw(batch: &[RawState], device: &Device) -> Result<Self, NfspError> {
        let b = batch.len();
        if b == 0 {
            return Err(NfspError::Shape("cannot encode an empty batch".into()));
        }
        let hand: Vec<f32> = batch
            .iter()
            .flat_map(|s| s.hand.iter().flatten().copied())
            .collect();
        let board: Vec<f32> = batch
            .iter()
            .flat_map(|s| s.board.iter().flatten().flatten().copied())
            .collect();
        let table: Vec<f32> = batch.iter().flat_map(|s| s.table_scalars()).collect();

        let street_grid = |street: usize| {
            let data: Vec<f32> = batch
                .iter()
                .flat_map(|s| s.plays[street].iter().copied())
                .collect();
            Tensor::from_vec(
                data,
                (b, PLAYS_SHAPE[0], PLAYS_SHAPE[1], PLAYS_SHAPE[2]),
                device,
            )
        };
        let plays = [
            street_grid(0)?,
            street_grid(1)?,
            street_grid(2)?,
            street_grid(3)?,
        ];

        Ok(Self {
            hand: Tensor::from_vec(hand, (b, RANKS, SUITS), device)?,
            board: Tensor::from_vec(board, (b, BOARD_STREETS, RANKS, SUITS), device)?,
            table: Tensor::from_vec(table, (b, TABLE_SCALARS), device)?,
            plays,
        })
    }

    /// Validate pre-built tensors and assemble them into a state.
    ///
    /// Scalars may be given as `[B]` or `[B, 1]`; action histories as
    /// `[B, 5, 6, 2]` or already flattened to `[B, 60]`.
    pub fn from_tensors(parts: StateTensors) -> Result<Self, NfspError> {
        let b = parts.hand.dims().first().copied().unwrap_or(0);
        if b == 0 {
            return Err(NfspError::Shape("hand tensor has no batch dimension".into()));
        }
        expect_dims("hand", &parts.hand, &[b, RANKS, SUITS])?;
        expect_dims("board", &parts.board, &[b, BOARD_STREETS, RANKS, SUITS])?;

        let scalars = [
            ("pot", &parts.pot),
            ("stack", &parts.stack),
            ("opponent_stack", &parts.opponent_stack),
            ("big_blind", &parts.big_blind),
            ("dealer", &parts.dealer),
        ]
        .into_iter()
        .map(|(name, t)| scalar_column(name, t, b))
        .collect::<Result<Vec<_>, _>>()?;
        let table = Tensor::cat(&scalars, 1)?;

        let [preflop, flop, turn, river] = parts.plays;
        let plays = [
            plays_grid("preflop_plays", preflop, b)?,
            plays_grid("flop_plays", flop, b)?,
            plays_grid("turn_plays", turn, b)?,
            plays_grid("river_plays", river, b)?,
        ];

        Ok(Self {
            hand: parts.hand.to_dtype(DType::F32)?,
            board: parts.board.to_dtype(DType::F32)?,
            table,
            plays,
        })
    }

    /// Leading batch dimension shared by every tensor.
    pub fn batch_size(&self) -> usize {
        self.hand.dims()[0]
    }

    pub fn device(&self) -> &Device {
        self.hand.device()
    }

    /// Own stack column, `[B]`.
    pub fn stacks(&self) -> Result<Vec<f32>, NfspError> {
        Ok(self.table.narrow(1, 1, 1)?.squeeze(1)?.to_vec1::<f32>()?)
    }
}

fn expect_dims(name: &str, t: &Tensor, expected: &[usize]) -> Result<(), NfspError> {
    if t.dims() != expected {
        return Err(NfspError::Shape(format!(
            "{name}: expected {expected:?}, got {:?}",
            t.dims()
        )));
    }
    Ok(())
}

fn scalar_column(name: &str, t: &Tensor, b: usize) -> Result<Tensor, NfspError> {
    match t.dims() {
        [n] if *n == b => Ok(t.unsqueeze(1)?.to_dtype(DType::F32)?),
        [n, 1] if *n == b => Ok(t.to_dtype(DType::F32)?),
        dims => Err(NfspError::Shape(format!(
            "{name}: expected [{b}] or [{b}, 1], got {dims:?}"
        ))),
    }
}

fn plays_grid(name: &str, t: Tensor, b: usize) -> Result<Tensor, NfspError> {
    let grid = [b, PLAYS_SHAPE[0], PLAYS_SHAPE[1], PLAYS_SHAPE[2]];
    let dims = t.dims().to_vec();
    let t = match dims.as_slice() {
        [n, f] if *n == b && *f == PLAYS_FEATURES => {
            t.reshape((b, PLAYS_SHAPE[0], PLAYS_SHAPE[1], PLAYS_SHAPE[2]))?
        }
        dims if dims == grid.as_slice() => t,
        dims => {
            return Err(NfspError::Shape(format!(
                "{name}: expected {grid:?} or [{b}, {PLAYS_FEATURES}], got {dims:?}"
            )));
        }
    };
    Ok(t.to_dtype(DType::F32)?)
}
