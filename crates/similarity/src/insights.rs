//! Insight aggregation over similar-task matches.

use std::collections::{HashMap, HashSet};
use taskwise_core::{AggregatedInsights, Outcome, SimilarTaskMatch};

/// Number of common stall points and added subtasks kept.
pub const MAX_COMMON_ITEMS: usize = 5;

/// Reduce matches into population-level statistics.
///
/// Zero matches yields the neutral default so missing history never biases
/// an estimate downward.
pub fn aggregate(matches: &[SimilarTaskMatch]) -> AggregatedInsights {
    if matches.is_empty() {
        return AggregatedInsights::default();
    }

    let ratios: Vec<f64> = matches
        .iter()
        .filter_map(|m| m.insights.estimated_vs_actual)
        .filter(|r| r.is_finite())
        .collect();
    let avg_estimation_accuracy = if ratios.is_empty() {
        1.0
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    };

    let outcomes: Vec<Outcome> = matches.iter().filter_map(|m| m.insights.outcome).collect();
    let success_rate = if outcomes.is_empty() {
        100
    } else {
        let completed = outcomes.iter().filter(|o| **o == Outcome::Completed).count();
        ((completed as f64 / outcomes.len() as f64) * 100.0).round() as u8
    };

    AggregatedInsights {
        avg_estimation_accuracy,
        common_stall_points: recurring(matches.iter().map(|m| &m.insights.stall_points)),
        common_subtasks_added: recurring(matches.iter().map(|m| &m.insights.added_subtasks)),
        success_rate,
    }
}

/// Items present in more than one match, most frequent first.
///
/// Each match counts an item once. Ties keep first-seen order.
fn recurring<'a>(per_match: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for items in per_match {
        let mut seen = HashSet::new();
        for item in items {
            let key = item.trim().to_lowercase();
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }
            let count = counts.entry(key).or_insert(0);
            if *count == 0 {
                order.push(item.trim().to_string());
            }
            *count += 1;
        }
    }

    let mut ranked: Vec<(usize, usize, String)> = order
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let count = counts.get(&item.to_lowercase()).copied().unwrap_or(0);
            (count > 1).then_some((count, position, item))
        })
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    ranked
        .into_iter()
        .take(MAX_COMMON_ITEMS)
        .map(|(_, _, item)| item)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwise_core::{ExecutionInsights, TaskId};

    fn matched(ratio: Option<f64>, outcome: Option<Outcome>, stalls: &[&str], added: &[&str]) -> SimilarTaskMatch {
        SimilarTaskMatch {
            task_id: TaskId::new(),
            title: "Past task".to_string(),
            score: 70,
            reasons: vec![],
            insights: ExecutionInsights {
                estimated_vs_actual: ratio,
                subtasks_added: added.len() as u32,
                added_subtasks: added.iter().map(|s| s.to_string()).collect(),
                stall_points: stalls.iter().map(|s| s.to_string()).collect(),
                outcome,
            },
        }
    }

    #[test]
    fn test_zero_matches_is_neutral() {
        let insights = aggregate(&[]);
        assert_eq!(insights.avg_estimation_accuracy, 1.0);
        assert_eq!(insights.success_rate, 100);
        assert!(insights.common_stall_points.is_empty());
        assert!(insights.common_subtasks_added.is_empty());
    }

    #[test]
    fn test_single_completed_match() {
        let insights = aggregate(&[matched(Some(1.2), Some(Outcome::Completed), &[], &[])]);
        assert_eq!(insights.success_rate, 100);
        assert!((insights.avg_estimation_accuracy - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_success_rate_and_average() {
        let insights = aggregate(&[
            matched(Some(1.0), Some(Outcome::Completed), &[], &[]),
            matched(Some(2.0), Some(Outcome::CompletedLate), &[], &[]),
            matched(None, None, &[], &[]),
        ]);
        assert_eq!(insights.success_rate, 50);
        assert!((insights.avg_estimation_accuracy - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_common_items_need_more_than_one_match() {
        let insights = aggregate(&[
            matched(None, None, &["Waiting on venue", "Budget approval"], &["Book catering"]),
            matched(None, None, &["waiting on venue", "Waiting on venue"], &["Book catering"]),
            matched(None, None, &["Budget approval"], &["Send invites"]),
        ]);
        assert_eq!(
            insights.common_stall_points,
            vec!["Waiting on venue".to_string(), "Budget approval".to_string()]
        );
        assert_eq!(insights.common_subtasks_added, vec!["Book catering".to_string()]);
    }

    #[test]
    fn test_common_items_capped() {
        let stalls = ["a1", "b2", "c3", "d4", "e5", "f6"];
        let insights = aggregate(&[
            matched(None, None, &stalls, &[]),
            matched(None, None, &stalls, &[]),
        ]);
        assert_eq!(insights.common_stall_points.len(), MAX_COMMON_ITEMS);
        assert_eq!(insights.common_stall_points[0], "a1");
    }
}
