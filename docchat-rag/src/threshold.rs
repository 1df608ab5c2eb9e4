//! Similarity threshold policies applied to ranked search candidates.
//!
//! A [`ThresholdPolicy::Static`] policy drops every candidate below a fixed
//! score. A [`ThresholdPolicy::Dynamic`] policy derives the cutoff from the
//! candidates themselves: everything within `relative_margin` of the top
//! score is kept, and the cutoff is lowered as needed so at least
//! `min_results` candidates survive. A dynamic query against a non-empty
//! index therefore never comes back empty.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Relative distance from the top score kept by the default dynamic policy.
pub const DEFAULT_RELATIVE_MARGIN: f32 = 0.15;

/// How candidates are filtered by similarity score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Keep candidates scoring at least `min_score`.
    Static { min_score: f32 },
    /// Keep candidates scoring at least `top - relative_margin * |top|`,
    /// and never fewer than `min_results` of them.
    Dynamic { relative_margin: f32, min_results: usize },
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::Dynamic { relative_margin: DEFAULT_RELATIVE_MARGIN, min_results: 1 }
    }
}

impl ThresholdPolicy {
    /// Check that the policy parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for a non-finite static score, a
    /// margin outside `[0, 1]`, or `min_results == 0`.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Static { min_score } if !min_score.is_finite() => Err(RagError::ConfigError(
                format!("static threshold must be finite, got {min_score}"),
            )),
            Self::Static { .. } => Ok(()),
            Self::Dynamic { relative_margin, .. }
                if !(0.0..=1.0).contains(&relative_margin) =>
            {
                Err(RagError::ConfigError(format!(
                    "relative_margin must be within [0, 1], got {relative_margin}"
                )))
            }
            Self::Dynamic { min_results: 0, .. } => {
                Err(RagError::ConfigError("min_results must be greater than zero".to_string()))
            }
            Self::Dynamic { .. } => Ok(()),
        }
    }

    /// Compute the cutoff for candidate scores sorted in descending order.
    ///
    /// Returns `None` when there are no candidates and the policy is dynamic,
    /// since there is no distribution to derive a cutoff from.
    pub fn cutoff(&self, sorted_scores: &[f32]) -> Option<f32> {
        match *self {
            Self::Static { min_score } => Some(min_score),
            Self::Dynamic { relative_margin, min_results } => {
                let top = *sorted_scores.first()?;
                let mut cutoff = top - relative_margin * top.abs();
                let kept = sorted_scores.iter().take_while(|s| **s >= cutoff).count();
                let wanted = min_results.min(sorted_scores.len());
                if kept < wanted {
                    cutoff = sorted_scores[wanted - 1];
                }
                Some(cutoff)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_cutoff_is_the_configured_score() {
        let policy = ThresholdPolicy::Static { min_score: 0.4 };
        assert_eq!(policy.cutoff(&[0.9, 0.1]), Some(0.4));
        assert_eq!(policy.cutoff(&[]), Some(0.4));
    }

    #[test]
    fn dynamic_cutoff_keeps_candidates_near_the_top() {
        let policy = ThresholdPolicy::default();
        let scores = [0.9, 0.85, 0.5, 0.1];
        let cutoff = policy.cutoff(&scores).unwrap();
        let kept: Vec<_> = scores.iter().filter(|s| **s >= cutoff).collect();
        assert_eq!(kept, vec![&0.9, &0.85]);
    }

    #[test]
    fn dynamic_cutoff_keeps_weak_best_match() {
        let policy = ThresholdPolicy::default();
        let scores = [0.05, 0.01];
        let cutoff = policy.cutoff(&scores).unwrap();
        assert!(scores[0] >= cutoff);
    }

    #[test]
    fn dynamic_cutoff_handles_negative_top_score() {
        let policy = ThresholdPolicy::default();
        let scores = [-0.2, -0.21, -0.9];
        let cutoff = policy.cutoff(&scores).unwrap();
        assert!(cutoff <= -0.2);
        assert!(-0.9 < cutoff);
    }

    #[test]
    fn dynamic_cutoff_lowers_to_satisfy_min_results() {
        let policy = ThresholdPolicy::Dynamic { relative_margin: 0.0, min_results: 3 };
        let scores = [0.9, 0.5, 0.3, 0.2];
        assert_eq!(policy.cutoff(&scores), Some(0.3));
    }

    #[test]
    fn dynamic_cutoff_without_candidates_is_none() {
        assert_eq!(ThresholdPolicy::default().cutoff(&[]), None);
    }

    #[test]
    fn policy_serializes_with_mode_tag() {
        let json = serde_json::to_value(ThresholdPolicy::Static { min_score: 0.3 }).unwrap();
        assert_eq!(json["mode"], "static");
    }
}
