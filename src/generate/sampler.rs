//! Token sampling: temperature scaling, nucleus filtering, categorical draw

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::GenerationConfig;
use crate::error::{Result, SomniaError};

/// Index of the largest finite logit
///
/// # Errors
///
/// Returns [`SomniaError::InferenceError`] when no logit is finite.
pub fn sample_greedy(logits: &[f32]) -> Result<u32> {
    logits
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i as u32)
        .ok_or_else(|| SomniaError::InferenceError("Logits contain no finite values".to_string()))
}

/// Divide every logit by `temperature` in place
pub fn apply_temperature(logits: &mut [f32], temperature: f32) {
    if temperature > 0.0 && (temperature - 1.0).abs() > f32::EPSILON {
        for v in logits.iter_mut() {
            *v /= temperature;
        }
    }
}

/// Numerically stable softmax; non-finite logits get probability zero
#[must_use]
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits
        .iter()
        .map(|&v| if v.is_finite() { (v - max).exp() } else { 0.0 })
        .collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Smallest set of most probable tokens whose mass reaches `top_p`
///
/// Returned in descending probability order and renormalised to sum to 1.
/// Always keeps at least the single most probable token.
#[must_use]
pub fn nucleus_candidates(probs: &[f32], top_p: f32) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = probs
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| *p > 0.0)
        .collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut cumsum = 0.0;
    let mut cutoff = indexed.len();
    for (i, (_, p)) in indexed.iter().enumerate() {
        cumsum += p;
        if cumsum >= top_p {
            cutoff = i + 1;
            break;
        }
    }
    indexed.truncate(cutoff.max(1));

    let kept: f32 = indexed.iter().map(|(_, p)| p).sum();
    if kept > 0.0 {
        for (_, p) in &mut indexed {
            *p /= kept;
        }
    }
    indexed
}

/// Temperature + nucleus sampling driven by a uniform draw in `[0, 1)`
///
/// # Errors
///
/// Returns [`SomniaError::InferenceError`] when no logit is finite.
pub fn sample_top_p(logits: &[f32], temperature: f32, top_p: f32, rng_value: f32) -> Result<u32> {
    if temperature <= 0.0 {
        return sample_greedy(logits);
    }
    let mut scaled = logits.to_vec();
    apply_temperature(&mut scaled, temperature);
    let candidates = nucleus_candidates(&softmax(&scaled), top_p);
    if candidates.is_empty() {
        return Err(SomniaError::InferenceError(
            "Logits contain no finite values".to_string(),
        ));
    }

    let mut cumulative = 0.0;
    for &(idx, prob) in &candidates {
        cumulative += prob;
        if rng_value < cumulative {
            return Ok(idx as u32);
        }
    }
    Ok(candidates.last().map_or(0, |(idx, _)| *idx as u32))
}

/// Stateful sampler owning the RNG for one generation call
#[derive(Debug)]
pub struct TokenSampler {
    temperature: f32,
    top_p: f32,
    do_sample: bool,
    rng: StdRng,
}

impl TokenSampler {
    /// Create a sampler; seeded when the config carries a seed
    #[must_use]
    pub fn new(config: &GenerationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            do_sample: config.do_sample,
            rng,
        }
    }

    /// Pick the next token id
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::InferenceError`] when no logit is finite.
    pub fn sample(&mut self, logits: &[f32]) -> Result<u32> {
        if !self.do_sample || self.temperature <= 0.0 {
            return sample_greedy(logits);
        }
        let r: f32 = self.rng.gen();
        sample_top_p(logits, self.temperature, self.top_p, r)
    }
}
