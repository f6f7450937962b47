// Node health from composite rules.

use indexmap::IndexMap;

use crate::models::{Comparator, HealthRule, HealthState, Node};

pub const OK_THRESHOLD: f64 = 0.70;
pub const WARNING_THRESHOLD: f64 = 0.40;
/// Tolerance for `==` comparisons.
pub const EQ_EPSILON: f64 = 0.001;
const NO_DATA_SCORE: f64 = 0.5;
/// Score for nodes without rules that still resolved a metric.
const UNRULED_SCORE: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthScore {
    pub state: HealthState,
    pub score: f64,
    pub has_data: bool,
}

pub fn compare(value: f64, op: Comparator, threshold: f64) -> bool {
    match op {
        Comparator::Lt => value < threshold,
        Comparator::Gt => value > threshold,
        Comparator::Le => value <= threshold,
        Comparator::Ge => value >= threshold,
        Comparator::Eq => (value - threshold).abs() < EQ_EPSILON,
    }
}

pub fn bucket(score: f64) -> HealthState {
    if score >= OK_THRESHOLD {
        HealthState::Ok
    } else if score >= WARNING_THRESHOLD {
        HealthState::Warning
    } else {
        HealthState::Critical
    }
}

/// Weighted share of passing rules among rules whose metric has a value.
pub fn evaluate<'a>(
    rules: impl IntoIterator<Item = &'a HealthRule>,
    value_of: impl Fn(&str) -> Option<f64>,
) -> HealthScore {
    let mut passing = 0.0;
    let mut total = 0.0;
    for rule in rules {
        let Some(value) = value_of(&rule.metric) else {
            continue;
        };
        let weight = rule.weight.max(0.0);
        total += weight;
        if compare(value, rule.op, rule.threshold) {
            passing += weight;
        }
    }
    if total <= 0.0 {
        return HealthScore {
            state: HealthState::Unknown,
            score: NO_DATA_SCORE,
            has_data: false,
        };
    }
    let score = (passing / total).clamp(0.0, 1.0);
    HealthScore {
        state: bucket(score),
        score,
        has_data: true,
    }
}

/// Scores a node from the rules of all its composite bindings.
pub fn score_node(node: &Node, metrics: &IndexMap<String, Option<f64>>) -> HealthScore {
    let value_of = |name: &str| metrics.get(name).copied().flatten();
    let has_rules = node.bindings.values().any(|b| b.is_composite());
    if has_rules {
        return evaluate(node.bindings.values().flat_map(|b| b.rules()), value_of);
    }
    if metrics.values().any(Option::is_some) {
        HealthScore {
            state: HealthState::Ok,
            score: UNRULED_SCORE,
            has_data: true,
        }
    } else {
        HealthScore {
            state: HealthState::Unknown,
            score: NO_DATA_SCORE,
            has_data: false,
        }
    }
}
