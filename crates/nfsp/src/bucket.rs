//! Discrete action buckets.
//!
//! A bucket is the legality-filtered label for fold, check/call or a bet size.
//! Bucket `-1` is fold, `0` is check, and the highest bucket of an action
//! space is all-in. Network outputs are indexed by `bucket + 1`, which also
//! gives the contiguous class labels used to train the policy head.

use std::fmt;

use crate::NfspError;

/// Opaque action identifier drawn from a fixed, enumerable action space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bucket(i8);

impl Bucket {
    pub const FOLD: Bucket = Bucket(-1);
    pub const CHECK: Bucket = Bucket(0);

    pub const fn new(raw: i8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i8 {
        self.0
    }

    /// Bucket stored at network output `index`.
    pub fn from_index(index: usize) -> Self {
        Self(index as i8 - 1)
    }

    /// The all-in bucket of an action space with `num_actions` outputs.
    pub fn all_in(num_actions: usize) -> Self {
        Self::from_index(num_actions - 1)
    }

    /// Network output index of this bucket, checked against the action space.
    pub fn index_in(self, num_actions: usize) -> Result<usize, NfspError> {
        let index = i16::from(self.0) + 1;
        if index < 0 || index as usize >= num_actions {
            return Err(NfspError::BucketOutOfRange {
                bucket: self.0,
                num_actions,
            });
        }
        Ok(index as usize)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Bucket::FOLD => write!(f, "fold"),
            Bucket::CHECK => write!(f, "check"),
            Bucket(raw) => write!(f, "bucket {raw}"),
        }
    }
}

/// Map a set of buckets to a membership mask over network outputs.
///
/// Fails on an empty set or on any bucket outside the action space.
pub(crate) fn legal_mask(legal: &[Bucket], num_actions: usize) -> Result<Vec<bool>, NfspError> {
    if legal.is_empty() {
        return Err(NfspError::NoLegalActions);
    }
    let mut mask = vec![false; num_actions];
    for bucket in legal {
        mask[bucket.index_in(num_actions)?] = true;
    }
    Ok(mask)
}
