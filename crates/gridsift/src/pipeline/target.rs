//! Target parsing and the arithmetic that turns a target into pass rates
//! and a final count.

use thiserror::Error;

/// Slack for float error in `total * pct / 100` (e.g. 20% of 15 = 2.9999...).
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TargetError {
    #[error("Target is empty")]
    Empty,

    #[error("Target '{0}' is not a number or percentage")]
    NotANumber(String),

    #[error("Target '{0}' must be greater than zero")]
    NotPositive(String),

    #[error("Target percentage '{0}' exceeds 100%")]
    AboveHundred(String),
}

/// Normalizes a target to a percentage of `total`.
///
/// `"10%"` is a percentage and must lie in (0, 100]. A bare number is an
/// absolute count and is converted against `total`, capped at 100.
pub fn parse_target(target: &str, total: usize) -> Result<f64, TargetError> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(TargetError::Empty);
    }

    if let Some(pct) = trimmed.strip_suffix('%') {
        let pct: f64 = pct
            .trim()
            .parse()
            .map_err(|_| TargetError::NotANumber(trimmed.to_string()))?;
        if !pct.is_finite() {
            return Err(TargetError::NotANumber(trimmed.to_string()));
        }
        if pct <= 0.0 {
            return Err(TargetError::NotPositive(trimmed.to_string()));
        }
        if pct > 100.0 {
            return Err(TargetError::AboveHundred(trimmed.to_string()));
        }
        return Ok(pct);
    }

    let count: f64 = trimmed
        .parse()
        .map_err(|_| TargetError::NotANumber(trimmed.to_string()))?;
    if !count.is_finite() {
        return Err(TargetError::NotANumber(trimmed.to_string()));
    }
    if count <= 0.0 {
        return Err(TargetError::NotPositive(trimmed.to_string()));
    }
    if total == 0 {
        return Ok(100.0);
    }
    Ok((count / total as f64 * 100.0).min(100.0))
}

/// Over-selection rate for the coarse pass.
pub fn coarse_target_pct(target_pct: f64, multiplier: f64, cap_pct: f64) -> f64 {
    (target_pct * multiplier).min(cap_pct)
}

/// Fine-pass rate rescaled so the overall rate still approximates the
/// target over the original input.
pub fn fine_target_pct(target_pct: f64, total_input: usize, survivors: usize) -> f64 {
    if survivors == 0 {
        return 100.0;
    }
    (target_pct * total_input as f64 / survivors as f64).min(100.0)
}

/// `max(1, floor(total * pct / 100))`.
pub fn target_count(total: usize, target_pct: f64) -> usize {
    let raw = (total as f64 * target_pct / 100.0 + EPSILON).floor();
    (raw.max(0.0) as usize).max(1)
}

/// Keeps a deterministic prefix of at most `target_count` items.
pub fn trim_to_target<T>(mut selection: Vec<T>, target_pct: f64, total: usize) -> Vec<T> {
    selection.truncate(target_count(total, target_pct));
    selection
}
