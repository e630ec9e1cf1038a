//! Action distributions restricted to the legal buckets of a decision.
//!
//! All helpers work on full-width vectors (one entry per network output) and
//! return full-width vectors, with exactly zero mass on illegal outputs.

use rand::Rng;

use crate::NfspError;
use crate::bucket::{Bucket, legal_mask};

/// Allowed deviation of a restricted distribution's total mass from 1.
pub const MASS_TOLERANCE: f64 = 1e-6;

/// Restrict `probs` to the legal buckets and renormalize.
pub fn legal_distribution(probs: &[f32], legal: &[Bucket]) -> Result<Vec<f32>, NfspError> {
    let mask = legal_mask(legal, probs.len())?;
    let mass: f64 = probs
        .iter()
        .zip(&mask)
        .filter(|&(_, &ok)| ok)
        .map(|(&p, _)| f64::from(p))
        .sum();
    if !mass.is_finite() || mass <= 0.0 || probs.iter().any(|p| *p < 0.0) {
        log::warn!("legal probability mass {mass} cannot be renormalized");
        return Err(NfspError::DegenerateDistribution(format!(
            "legal mass {mass} over {} legal buckets",
            legal.len()
        )));
    }
    let dist = probs
        .iter()
        .zip(&mask)
        .map(|(&p, &ok)| if ok { (f64::from(p) / mass) as f32 } else { 0.0 })
        .collect();
    check_mass(dist)
}

/// Softmax over the legal entries of `values`.
pub fn legal_softmax(values: &[f32], legal: &[Bucket]) -> Result<Vec<f32>, NfspError> {
    let mask = legal_mask(legal, values.len())?;
    check_finite(values, &mask)?;
    let max = values
        .iter()
        .zip(&mask)
        .filter(|&(_, &ok)| ok)
        .map(|(&v, _)| f64::from(v))
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = values
        .iter()
        .zip(&mask)
        .map(|(&v, &ok)| if ok { (f64::from(v) - max).exp() } else { 0.0 })
        .collect();
    let total: f64 = weights.iter().sum();
    let dist = weights.iter().map(|w| (w / total) as f32).collect();
    check_mass(dist)
}

/// Legal bucket with the highest value; ties go to the lowest output index.
pub fn legal_argmax(values: &[f32], legal: &[Bucket]) -> Result<Bucket, NfspError> {
    let mask = legal_mask(legal, values.len())?;
    check_finite(values, &mask)?;
    let mut best: Option<(usize, f32)> = None;
    for (i, (&v, &ok)) in values.iter().zip(&mask).enumerate() {
        if !ok {
            continue;
        }
        if best.is_none_or(|(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| Bucket::from_index(i))
        .ok_or(NfspError::NoLegalActions)
}

/// Draw an output index from a full-width distribution and map it to a bucket.
pub fn sample_bucket(dist: &[f32], rng: &mut impl Rng) -> Bucket {
    let r: f32 = rng.random();
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (i, &p) in dist.iter().enumerate() {
        if p.is_nan() || p <= 0.0 {
            continue;
        }
        cumulative += p;
        last_positive = i;
        if r < cumulative {
            return Bucket::from_index(i);
        }
    }
    // Rounding left the cumulative mass just under r.
    Bucket::from_index(last_positive)
}

/// Uniform choice among the legal buckets.
pub fn uniform_bucket(legal: &[Bucket], rng: &mut impl Rng) -> Result<Bucket, NfspError> {
    if legal.is_empty() {
        return Err(NfspError::NoLegalActions);
    }
    Ok(legal[rng.random_range(0..legal.len())])
}

/// Every legal value must be a finite number.
fn check_finite(values: &[f32], mask: &[bool]) -> Result<(), NfspError> {
    let bad = values
        .iter()
        .zip(mask)
        .enumerate()
        .find(|&(_, (v, &ok))| ok && !v.is_finite());
    if let Some((i, (v, _))) = bad {
        log::warn!("legal value at output {i} is {v}");
        return Err(NfspError::DegenerateDistribution(format!(
            "legal value at output {i} is {v}"
        )));
    }
    Ok(())
}

fn check_mass(dist: Vec<f32>) -> Result<Vec<f32>, NfspError> {
    let total: f64 = dist.iter().map(|&p| f64::from(p)).sum();
    if !total.is_finite() || (total - 1.0).abs() > MASS_TOLERANCE {
        log::warn!("restricted distribution sums to {total}");
        return Err(NfspError::DegenerateDistribution(format!(
            "restricted distribution sums to {total}"
        )));
    }
    Ok(dist)
}
