//! Multi-dimensional similarity scoring for candidate batches.
//!
//! Every score is computed from order-independent aggregates (sets, counts,
//! sorted samples), so a report never depends on task order.

use std::collections::BTreeSet;

use docbatch_core::{BatchStrategy, Task};
use serde::{Deserialize, Serialize};

/// Document types that batch well together even when not identical.
const RELATED_TYPES: &[&[&str]] = &[
    &["W-2", "W-2c", "W-2G"],
    &["1099-NEC", "1099-MISC", "1099-INT", "1099-DIV"],
    &["1040", "Schedule C", "K-1"],
    &["Receipt", "Invoice"],
];

const TYPE_WEIGHT: f64 = 0.4;
const QUALITY_WEIGHT: f64 = 0.25;
const CLIENT_WEIGHT: f64 = 0.2;
const REQUIREMENTS_WEIGHT: f64 = 0.15;

/// Dimension score above which a dedicated strategy is recommended.
const STRONG_SIMILARITY: f64 = 0.8;

/// Per-dimension similarity, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub document_type: f64,
    pub quality: f64,
    pub client: f64,
    pub requirements: f64,
}

impl DimensionScores {
    fn uniform(score: f64) -> Self {
        Self {
            document_type: score,
            quality: score,
            client: score,
            requirements: score,
        }
    }

    fn weighted(&self) -> f64 {
        self.document_type * TYPE_WEIGHT
            + self.quality * QUALITY_WEIGHT
            + self.client * CLIENT_WEIGHT
            + self.requirements * REQUIREMENTS_WEIGHT
    }
}

/// Estimated benefit of running a candidate set as one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationPotential {
    /// Fraction of stand-alone cost expected to be saved.
    pub cost_savings: f64,
    /// Fraction of stand-alone time expected to be saved.
    pub time_savings: f64,
    /// Overall similarity scaled by batch size over ten.
    pub batch_efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub scores: DimensionScores,
    pub overall: f64,
    pub recommended_strategy: BatchStrategy,
    pub potential: OptimizationPotential,
}

/// Score how alike a set of tasks is.
///
/// Fewer than two tasks yields a degenerate report: every score 1.0,
/// `MixedOptimization`, and zero potential.
pub fn analyze(tasks: &[Task]) -> SimilarityReport {
    if tasks.len() < 2 {
        return SimilarityReport {
            scores: DimensionScores::uniform(1.0),
            overall: 1.0,
            recommended_strategy: BatchStrategy::MixedOptimization,
            potential: OptimizationPotential::default(),
        };
    }

    let scores = DimensionScores {
        document_type: type_similarity(tasks),
        quality: quality_similarity(tasks),
        client: client_similarity(tasks),
        requirements: requirement_similarity(tasks),
    };
    let overall = scores.weighted();
    let n = tasks.len() as f64;

    SimilarityReport {
        scores,
        overall,
        recommended_strategy: recommend(&scores),
        potential: OptimizationPotential {
            cost_savings: ((n - 1.0) * 0.05).min(0.3) * overall,
            time_savings: ((n - 1.0) * 0.08).min(0.4) * overall,
            batch_efficiency: overall * (n / 10.0),
        },
    }
}

fn type_similarity(tasks: &[Task]) -> f64 {
    let types: BTreeSet<&str> = tasks
        .iter()
        .filter_map(|t| t.document_type.as_deref())
        .collect();

    if types.is_empty() {
        return 0.5;
    }
    if types.len() == 1 {
        return 1.0;
    }
    let related = RELATED_TYPES
        .iter()
        .any(|cluster| types.iter().all(|t| cluster.contains(t)));
    if related {
        0.8
    } else {
        0.2
    }
}

fn quality_similarity(tasks: &[Task]) -> f64 {
    let mut scores: Vec<f64> = tasks.iter().filter_map(|t| t.quality_score).collect();
    if scores.is_empty() {
        return 0.5;
    }
    scores.sort_by(f64::total_cmp);

    let spread = sample_stdev(&scores);
    if spread < 0.1 {
        1.0
    } else if spread < 0.2 {
        0.8
    } else if spread < 0.3 {
        0.6
    } else {
        0.3
    }
}

fn client_similarity(tasks: &[Task]) -> f64 {
    let clients: BTreeSet<&str> = tasks
        .iter()
        .filter_map(|t| t.client_key.as_deref())
        .collect();
    match clients.len() {
        0 | 1 => 1.0,
        2 | 3 => 0.7,
        _ => 0.3,
    }
}

fn requirement_similarity(tasks: &[Task]) -> f64 {
    let n = tasks.len() as f64;
    let preprocessing = tasks.iter().filter(|t| t.preprocessing_required).count() as f64 / n;
    let validation = tasks.iter().filter(|t| t.validation_recommended).count() as f64 / n;

    let score = |fraction: f64| 1.0 - 2.0 * (fraction - 0.5).abs();
    (score(preprocessing) + score(validation)) / 2.0
}

/// Highest-scoring dimension if it is strong enough. Ties resolve in
/// declaration order: type, quality, client, requirements.
fn recommend(scores: &DimensionScores) -> BatchStrategy {
    let candidates = [
        (scores.document_type, BatchStrategy::TypeGrouping),
        (scores.quality, BatchStrategy::QualityGrouping),
        (scores.client, BatchStrategy::ClientGrouping),
        (scores.requirements, BatchStrategy::RequirementGrouping),
    ];

    let mut best = candidates[0];
    for candidate in &candidates[1..] {
        if candidate.0 > best.0 {
            best = *candidate;
        }
    }

    if best.0 > STRONG_SIMILARITY {
        best.1
    } else {
        BatchStrategy::MixedOptimization
    }
}

fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}
