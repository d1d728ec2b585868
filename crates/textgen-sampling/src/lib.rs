//! # textgen-sampling
//!
//! Next-token selection for textgen.
//!
//! The decode loop asks a [`TokenSampler`] for one token id per step, given the
//! logits of the most recent position. Only greedy selection ([`Greedy`]) is
//! provided: temperature and top-k are carried on requests but have no
//! sampler that consumes them yet.

/// Sampling error type.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingError {
    /// The logits slice was empty.
    InvalidLogits,
}

impl std::fmt::Display for SamplingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingError::InvalidLogits => write!(f, "Invalid logits array"),
        }
    }
}

impl std::error::Error for SamplingError {}

pub type SamplingResult<T> = std::result::Result<T, SamplingError>;

/// Picks the next token index from a logits vector.
///
/// Samplers are driven from inside the engine lock, one call per decode step,
/// so `&mut self` state (an RNG, a history window) is never shared between
/// concurrent requests.
pub trait TokenSampler: Send {
    fn sample(&mut self, logits: &[f32]) -> SamplingResult<usize>;
}

/// Deterministic argmax selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Greedy;

impl Greedy {
    pub fn new() -> Self {
        Self
    }
}

impl TokenSampler for Greedy {
    fn sample(&mut self, logits: &[f32]) -> SamplingResult<usize> {
        argmax(logits)
    }
}

/// Index of the largest logit.
///
/// Scans left to right and only moves on a strictly greater value, so ties
/// resolve to the lowest index. A NaN never compares greater, so it is
/// skipped anywhere after index 0, and a NaN at index 0 is always selected.
pub fn argmax(logits: &[f32]) -> SamplingResult<usize> {
    let (first, rest) = logits.split_first().ok_or(SamplingError::InvalidLogits)?;

    let mut best = 0;
    let mut best_val = *first;
    for (i, &v) in rest.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i + 1;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_largest() {
        assert_eq!(argmax(&[0.1, 3.0, -2.0, 2.9]).unwrap(), 1);
    }

    #[test]
    fn argmax_single_element() {
        assert_eq!(argmax(&[-7.5]).unwrap(), 0);
    }

    #[test]
    fn argmax_empty_is_error() {
        assert_eq!(argmax(&[]), Err(SamplingError::InvalidLogits));
    }

    #[test]
    fn greedy_is_stateless() {
        let mut sampler = Greedy::new();
        let logits = [1.0, 5.0, 5.0];
        assert_eq!(sampler.sample(&logits).unwrap(), 1);
        assert_eq!(sampler.sample(&logits).unwrap(), 1);
    }

    #[test]
    fn sampling_error_display() {
        assert_eq!(SamplingError::InvalidLogits.to_string(), "Invalid logits array");
    }
}
