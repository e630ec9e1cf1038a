//! Per-decision inputs and outputs of a strategy.

use crate::NfspError;
use crate::bucket::Bucket;
use crate::state::EncodedState;

/// Seat index at a heads-up table.
pub type PlayerId = u8;

/// Betting round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
}

/// The acting player as seen by a strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seat {
    pub id: PlayerId,
    pub stack: f32,
    pub is_all_in: bool,
}

/// Kind of the opponent's most recent action on the current street.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpponentAction {
    Check,
    Bet,
    Call,
    AllIn,
}

/// Betting context precomputed by the bucket/legality collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BettingView {
    pub street: Street,
    /// `None` when the opponent has not acted yet on this street.
    pub opponent_last: Option<OpponentAction>,
    /// Bucket that matches the opponent's outstanding bet.
    pub call_bucket: Bucket,
    /// Largest bucket the acting player's stack can cover.
    pub max_bet_bucket: Bucket,
}

/// Everything a strategy may look at for one decision.
#[derive(Debug, Clone, Copy)]
pub struct Decision<'a> {
    pub seat: Seat,
    /// Batch-1 encoding of the decision point.
    pub state: &'a EncodedState,
    pub legal: &'a [Bucket],
    pub betting: Option<BettingView>,
}

impl Decision<'_> {
    /// Whether the acting player has nothing left to wager.
    ///
    /// An all-in flag on a seat that still holds chips is a caller bug.
    pub fn is_all_in(&self) -> Result<bool, NfspError> {
        if self.seat.is_all_in && self.seat.stack != 0.0 {
            return Err(NfspError::AllInWithChips(self.seat.stack));
        }
        Ok(self.seat.is_all_in)
    }
}

/// A strategy's answer: the chosen bucket (`None` is the null action) and
/// which head produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub action: Option<Bucket>,
    pub is_q_used: bool,
}

impl Choice {
    pub const NULL: Choice = Choice {
        action: None,
        is_q_used: false,
    };
}
