//! Shared trunk: card features, betting history and table scalars to a
//! situation embedding.

use candle_core::{Device, Tensor, Var};
use candle_nn::{Linear, Module, VarMap, linear};

use crate::NfspError;
use crate::config::NfspConfig;
use crate::featurizer::CardFeatures;
use crate::layers::{fresh_varmap, named_vars, selu};
use crate::state::{EncodedState, PLAYS_FEATURES, TABLE_SCALARS};

/// Trunk layers read by both heads.
///
/// Every street's action history is projected on its own; postflop streets
/// are projected together with that street's card embedding. The four
/// projections are summed, so streets that were never reached contribute a
/// constant and the aggregate keeps a fixed size.
pub struct SharedTrunk {
    varmap: VarMap,
    preflop: Linear,
    /// Flop, turn, river.
    streets: [Linear; 3],
    plays: Linear,
    table: Linear,
    fuse: [Linear; 2],
    hidden_dim: usize,
}

impl SharedTrunk {
    /// Create a trunk with freshly initialized weights.
    pub fn new(config: &NfspConfig, device: &Device) -> Result<Self, NfspError> {
        config.validate()?;
        let (varmap, vs) = fresh_varmap(device);
        let h = config.hidden_dim;
        let street_in = PLAYS_FEATURES + h;

        Ok(Self {
            preflop: linear(PLAYS_FEATURES, h, vs.pp("preflop"))?,
            streets: [
                linear(street_in, h, vs.pp("flop"))?,
                linear(street_in, h, vs.pp("turn"))?,
                linear(street_in, h, vs.pp("river"))?,
            ],
            plays: linear(h, h, vs.pp("plays"))?,
            table: linear(TABLE_SCALARS, h, vs.pp("table"))?,
            fuse: [
                linear(3 * h, h, vs.pp("fuse0"))?,
                linear(h, h, vs.pp("fuse1"))?,
            ],
            varmap,
            hidden_dim: h,
        })
    }

    /// Produce the `[B, hidden_dim]` situation embedding.
    pub fn forward(&self, cards: &CardFeatures, state: &EncodedState) -> Result<Tensor, NfspError> {
        let [preflop_plays, street_plays @ ..] = &state.plays;
        let street_cards = [&cards.flop, &cards.turn, &cards.river];

        let mut plays = selu(&self.preflop.forward(&preflop_plays.flatten_from(1)?)?)?;
        for ((layer, history), features) in self.streets.iter().zip(street_plays).zip(street_cards) {
            let input = Tensor::cat(&[&history.flatten_from(1)?, features], 1)?;
            plays = plays.add(&selu(&layer.forward(&input)?)?)?;
        }
        let plays = selu(&self.plays.forward(&plays)?)?;

        let table = selu(&self.table.forward(&state.table)?)?;

        let situation = Tensor::cat(&[&plays, &table, &cards.cards], 1)?;
        let situation = self
            .fuse
            .iter()
            .try_fold(situation, |h, layer| selu(&layer.forward(&h)?))?;
        Ok(situation)
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Trainable parameters, for optimizers of every head sharing this trunk.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub(crate) fn named_vars(&self) -> Result<Vec<(String, Var)>, NfspError> {
        named_vars(&self.varmap, "trunk")
    }
}
