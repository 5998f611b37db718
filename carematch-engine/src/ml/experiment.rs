//! A/B experiments for the learned-scoring path
//!
//! An experiment assigns each shift to a variant whose overrides tune
//! the blend. Assignments are written once and never change; outcomes
//! are attached later as they become known.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::ids::{ExperimentId, OrganizationId, ShiftId};

/// How shifts are split across variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// Deterministic: hash of the shift id modulo total weight
    HashModulo,
    /// Random draw by configured weight distribution
    Random,
}

/// Blend overrides carried by a variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantOverrides {
    pub ml_enabled: Option<bool>,
    pub ml_weight: Option<f64>,
    pub model_preference: Option<String>,
    pub min_ml_confidence: Option<f64>,
}

/// One arm of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentVariant {
    pub name: String,
    /// Relative share of shifts routed to this variant
    pub weight: u32,
    pub overrides: VariantOverrides,
}

/// An experiment over the ML blend, one active per organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub strategy: AssignmentStrategy,
    pub variants: Vec<ExperimentVariant>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl Experiment {
    /// Pick the variant for a shift
    ///
    /// HashModulo is deterministic per shift id; Random draws once and
    /// relies on the persisted assignment for stability.
    pub fn pick_variant(&self, shift_id: ShiftId) -> Option<&ExperimentVariant> {
        let total: u32 = self.variants.iter().map(|v| v.weight).sum();
        if total == 0 {
            return None;
        }
        let point = match self.strategy {
            AssignmentStrategy::HashModulo => {
                let mut hasher = DefaultHasher::new();
                shift_id.0.hash(&mut hasher);
                (hasher.finish() % total as u64) as u32
            }
            AssignmentStrategy::Random => fastrand::u32(0..total),
        };
        let mut cumulative = 0;
        for variant in &self.variants {
            cumulative += variant.weight;
            if point < cumulative {
                return Some(variant);
            }
        }
        self.variants.last()
    }
}

/// Outcomes attached to an assignment once known
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantOutcome {
    pub matched: bool,
    pub accepted: bool,
    pub completed: bool,
    pub match_score: Option<u8>,
    pub satisfaction: Option<f64>,
}

/// Immutable variant assignment for one shift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub shift_id: ShiftId,
    pub experiment_id: ExperimentId,
    pub variant: String,
    pub assigned_at: DateTime<Utc>,
    pub outcome: Option<VariantOutcome>,
}

/// Aggregated outcomes for one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStats {
    pub variant: String,
    pub assignments: u32,
    pub matched: u32,
    pub accepted: u32,
    pub completed: u32,
    pub match_rate: f64,
    pub acceptance_rate: f64,
    pub completion_rate: f64,
    pub avg_match_score: Option<f64>,
}

/// Compute per-variant stats from a set of assignments
pub fn variant_stats(experiment: &Experiment, assignments: &[ExperimentAssignment]) -> Vec<VariantStats> {
    experiment
        .variants
        .iter()
        .map(|variant| {
            let rows: Vec<&ExperimentAssignment> = assignments
                .iter()
                .filter(|a| a.variant == variant.name)
                .collect();
            let n = rows.len() as u32;
            let matched = rows
                .iter()
                .filter(|a| a.outcome.as_ref().is_some_and(|o| o.matched))
                .count() as u32;
            let accepted = rows
                .iter()
                .filter(|a| a.outcome.as_ref().is_some_and(|o| o.accepted))
                .count() as u32;
            let completed = rows
                .iter()
                .filter(|a| a.outcome.as_ref().is_some_and(|o| o.completed))
                .count() as u32;
            let scores: Vec<f64> = rows
                .iter()
                .filter_map(|a| a.outcome.as_ref().and_then(|o| o.match_score))
                .map(f64::from)
                .collect();
            let rate = |num: u32| if n > 0 { num as f64 / n as f64 } else { 0.0 };
            VariantStats {
                variant: variant.name.clone(),
                assignments: n,
                matched,
                accepted,
                completed,
                match_rate: rate(matched),
                acceptance_rate: rate(accepted),
                completion_rate: rate(completed),
                avg_match_score: if scores.is_empty() {
                    None
                } else {
                    Some(scores.iter().sum::<f64>() / scores.len() as f64)
                },
            }
        })
        .collect()
}

/// Two-sample z-test on proportions
///
/// Returns None when either sample is empty or the pooled proportion
/// is degenerate (all successes or all failures).
pub fn two_proportion_z(successes_a: u32, n_a: u32, successes_b: u32, n_b: u32) -> Option<f64> {
    if n_a == 0 || n_b == 0 {
        return None;
    }
    let p_a = successes_a as f64 / n_a as f64;
    let p_b = successes_b as f64 / n_b as f64;
    let pooled = (successes_a + successes_b) as f64 / (n_a + n_b) as f64;
    let variance = pooled * (1.0 - pooled) * (1.0 / n_a as f64 + 1.0 / n_b as f64);
    if variance <= 0.0 {
        return None;
    }
    Some((p_a - p_b) / variance.sqrt())
}

/// Conventional 95% two-tailed significance threshold
pub fn is_significant(z: f64) -> bool {
    z.abs() >= 1.96
}
