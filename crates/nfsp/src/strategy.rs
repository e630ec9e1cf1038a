//! Action-selection strategies.
//!
//! Every strategy answers a [`Decision`] with a [`Choice`]. Seats that are
//! already all-in get [`Choice::NULL`] without any network being evaluated.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::NfspError;
use crate::bucket::Bucket;
use crate::decision::{Choice, Decision, OpponentAction, Street};
use crate::heads::QNetwork;
use crate::policy::{legal_argmax, legal_softmax, sample_bucket, uniform_bucket};

/// Something that picks a bucket for a decision.
pub trait Strategy {
    fn choose_action(&mut self, decision: &Decision) -> Result<Choice, NfspError>;
}

/// Best-response selection from per-action values.
///
/// Greedy picks the highest legal value, otherwise a bucket is sampled from
/// the softmax of the legal values. With probability `eps` the result is
/// replaced by a uniformly random legal bucket.
pub(crate) fn best_response(
    q_values: &[f32],
    legal: &[Bucket],
    greedy: bool,
    eps: f64,
    rng: &mut impl Rng,
) -> Result<Bucket, NfspError> {
    let action = if greedy {
        legal_argmax(q_values, legal)?
    } else {
        sample_bucket(&legal_softmax(q_values, legal)?, rng)
    };
    if rng.random::<f64>() < eps {
        return uniform_bucket(legal, rng);
    }
    Ok(action)
}

// ---------------------------------------------------------------------------
// Random
// ---------------------------------------------------------------------------

/// Uniform over the legal buckets.
pub struct RandomStrategy {
    rng: StdRng,
}

impl RandomStrategy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Strategy for RandomStrategy {
    fn choose_action(&mut self, decision: &Decision) -> Result<Choice, NfspError> {
        if decision.is_all_in()? {
            return Ok(Choice::NULL);
        }
        Ok(Choice {
            action: Some(uniform_bucket(decision.legal, &mut self.rng)?),
            is_q_used: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Value network only
// ---------------------------------------------------------------------------

/// Plays from a value network alone, e.g. to evaluate a trained best response.
pub struct QStrategy<'a> {
    q: &'a QNetwork,
    greedy: bool,
    eps: f64,
    rng: StdRng,
}

impl<'a> QStrategy<'a> {
    pub fn new(q: &'a QNetwork, greedy: bool, eps: f64, seed: u64) -> Self {
        Self {
            q,
            greedy,
            eps,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Strategy for QStrategy<'_> {
    fn choose_action(&mut self, decision: &Decision) -> Result<Choice, NfspError> {
        if decision.is_all_in()? {
            return Ok(Choice::NULL);
        }
        let q_values = self.q.action_values(decision.state)?;
        let action = best_response(&q_values, decision.legal, self.greedy, self.eps, &mut self.rng)?;
        Ok(Choice {
            action: Some(action),
            is_q_used: true,
        })
    }
}

// ---------------------------------------------------------------------------
// Mirror
// ---------------------------------------------------------------------------

/// Scripted opponent that levels the pot.
///
/// Checks after a check, calls a bet, calls an all-in (or shoves when the
/// call exceeds its stack). As first preflop actor it completes the small
/// blind, or shoves when it cannot.
pub struct MirrorStrategy {
    all_in: Bucket,
}

impl MirrorStrategy {
    pub fn new(num_actions: usize) -> Self {
        Self {
            all_in: Bucket::all_in(num_actions),
        }
    }
}

impl Strategy for MirrorStrategy {
    fn choose_action(&mut self, decision: &Decision) -> Result<Choice, NfspError> {
        if decision.is_all_in()? {
            return Ok(Choice::NULL);
        }
        let betting = decision
            .betting
            .ok_or(NfspError::MirrorUndefined("decision carries no betting view"))?;

        let action = match (betting.opponent_last, betting.street) {
            (Some(OpponentAction::Check), _) => Bucket::CHECK,
            (Some(OpponentAction::Bet), _) => betting.call_bucket,
            (Some(OpponentAction::Call), Street::Preflop) => {
                return Err(NfspError::MirrorUndefined("opponent completed the small blind"));
            }
            (Some(OpponentAction::Call), _) => {
                return Err(NfspError::MirrorUndefined("opponent call did not close the round"));
            }
            (Some(OpponentAction::AllIn), _) => {
                if betting.max_bet_bucket < betting.call_bucket {
                    self.all_in
                } else {
                    betting.call_bucket
                }
            }
            (None, Street::Preflop) => {
                if betting.max_bet_bucket == Bucket::new(1) {
                    self.all_in
                } else {
                    Bucket::new(1)
                }
            }
            (None, _) => {
                return Err(NfspError::MirrorUndefined("acting first after preflop"));
            }
        };
        Ok(Choice {
            action: Some(action),
            is_q_used: false,
        })
    }
}
