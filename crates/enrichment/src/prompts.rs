//! Prompt text for the enrichment calls.

use std::fmt::Write as _;
use taskwise_core::{AggregatedInsights, ExecutionHistoryRecord, SimilarTaskMatch, TaskDescriptor};

pub(crate) const ENRICHMENT_SYSTEM_PROMPT: &str = "You are a planning assistant for a personal task \
manager. Turn a rough task into a complete, actionable definition. Use the user's history of similar \
tasks to calibrate the estimate: if similar tasks ran over their estimates, estimate higher. \
Respond with a single JSON object and nothing else, with these keys: \
\"title\" (string), \"description\" (string), \"estimated_minutes\" (integer), \
\"due_date\" (ISO 8601 string or null), \"priority\" (\"none\", \"low\", \"medium\" or \"high\"), \
\"confidence\" (\"low\", \"medium\" or \"high\"), \"risk_factors\" (array of strings), and \
\"subtasks\" (array of objects with \"title\", \"estimated_minutes\", \
\"type\" (\"action\", \"research\", \"draft\", \"plan\" or \"review\"), \"ai_can_do\" (boolean) and \
\"order\" (integer starting at 1)).";

pub(crate) const SUBTASKS_SYSTEM_PROMPT: &str = "You break personal tasks into concrete steps. \
Respond with JSON only: {\"subtasks\": [{\"title\": string, \"estimated_minutes\": integer, \
\"type\": \"action\"|\"research\"|\"draft\"|\"plan\"|\"review\", \"ai_can_do\": boolean, \
\"order\": integer}]}.";

pub(crate) const ESTIMATE_SYSTEM_PROMPT: &str = "You estimate how long personal tasks take. \
Respond with JSON only: {\"estimated_minutes\": integer, \"confidence\": \"low\"|\"medium\"|\"high\"}.";

fn describe_task(prompt: &mut String, descriptor: &TaskDescriptor) {
    let _ = writeln!(prompt, "Task: {}", descriptor.title);
    if let Some(description) = &descriptor.description {
        let _ = writeln!(prompt, "Details: {}", description);
    }
    if !descriptor.tags.is_empty() {
        let _ = writeln!(prompt, "Tags: {}", descriptor.tags.join(", "));
    }
}

/// Context block for the full enrichment call.
pub(crate) fn enrichment_prompt(
    descriptor: &TaskDescriptor,
    matches: &[SimilarTaskMatch],
    aggregated: &AggregatedInsights,
    history: &[ExecutionHistoryRecord],
    subtask_bounds: (usize, usize),
) -> String {
    let mut prompt = String::new();
    describe_task(&mut prompt, descriptor);

    if matches.is_empty() {
        prompt.push_str("\nNo similar completed tasks were found.\n");
    } else {
        prompt.push_str("\nSimilar completed tasks:\n");
        for m in matches {
            let _ = write!(prompt, "- {} (similarity {}%)", m.title, m.score);
            if let Some(ratio) = m.insights.estimated_vs_actual {
                let _ = write!(prompt, ", took {:.1}x the estimate", ratio);
            }
            if m.insights.subtasks_added > 0 {
                let _ = write!(prompt, ", {} subtasks added mid-way", m.insights.subtasks_added);
            }
            prompt.push('\n');
        }

        prompt.push_str("\nHistory across similar tasks:\n");
        let _ = writeln!(
            prompt,
            "- Average actual/estimate ratio: {:.2}",
            aggregated.avg_estimation_accuracy
        );
        let _ = writeln!(prompt, "- Success rate: {}%", aggregated.success_rate);
        if !aggregated.common_stall_points.is_empty() {
            let _ = writeln!(
                prompt,
                "- Common stall points: {}",
                aggregated.common_stall_points.join("; ")
            );
        }
        if !aggregated.common_subtasks_added.is_empty() {
            let _ = writeln!(
                prompt,
                "- Steps often added later: {}",
                aggregated.common_subtasks_added.join("; ")
            );
        }
    }

    if !history.is_empty() {
        prompt.push_str("\nRecorded estimates:\n");
        for record in history {
            match (record.estimated_minutes, record.actual_minutes) {
                (Some(estimate), Some(actual)) => {
                    let _ = writeln!(
                        prompt,
                        "- {}: estimated {} min, actual {} min ({})",
                        record.title, estimate, actual, record.outcome
                    );
                }
                _ => {
                    let _ = writeln!(prompt, "- {}: {}", record.title, record.outcome);
                }
            }
        }
    }

    let _ = write!(
        prompt,
        "\nPropose between {} and {} subtasks.",
        subtask_bounds.0, subtask_bounds.1
    );
    prompt
}

/// Prompt for decomposition only.
pub(crate) fn subtasks_prompt(descriptor: &TaskDescriptor, subtask_bounds: (usize, usize)) -> String {
    let mut prompt = String::new();
    describe_task(&mut prompt, descriptor);
    let _ = write!(
        prompt,
        "\nBreak this task into {} to {} ordered subtasks.",
        subtask_bounds.0, subtask_bounds.1
    );
    prompt
}

/// Prompt for a duration estimate grounded on a baseline and past ratios.
pub(crate) fn estimate_prompt(
    descriptor: &TaskDescriptor,
    subtask_minutes: u32,
    historical_ratios: &[f64],
) -> String {
    let mut prompt = String::new();
    describe_task(&mut prompt, descriptor);
    if subtask_minutes > 0 {
        let _ = writeln!(prompt, "\nSubtask estimates add up to {} minutes.", subtask_minutes);
    }
    if !historical_ratios.is_empty() {
        let ratios: Vec<String> = historical_ratios.iter().map(|r| format!("{:.2}", r)).collect();
        let _ = writeln!(
            prompt,
            "Actual/estimate ratios of similar past tasks: {}",
            ratios.join(", ")
        );
    }
    prompt.push_str("\nHow many minutes will this task take?");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwise_core::{ExecutionInsights, TaskId};

    #[test]
    fn test_enrichment_prompt_includes_history() {
        let descriptor = TaskDescriptor::new("Plan quarterly offsite").with_description("For 12 people");
        let matches = vec![SimilarTaskMatch {
            task_id: TaskId::new(),
            title: "Plan team offsite".to_string(),
            score: 85,
            reasons: vec![],
            insights: ExecutionInsights {
                estimated_vs_actual: Some(1.2),
                ..Default::default()
            },
        }];
        let aggregated = AggregatedInsights {
            avg_estimation_accuracy: 1.2,
            ..Default::default()
        };

        let prompt = enrichment_prompt(&descriptor, &matches, &aggregated, &[], (3, 7));

        assert!(prompt.contains("Task: Plan quarterly offsite"));
        assert!(prompt.contains("Plan team offsite (similarity 85%), took 1.2x the estimate"));
        assert!(prompt.contains("Average actual/estimate ratio: 1.20"));
        assert!(prompt.ends_with("Propose between 3 and 7 subtasks."));
    }

    #[test]
    fn test_estimate_prompt_baseline() {
        let prompt = estimate_prompt(&TaskDescriptor::new("Write report"), 150, &[1.5, 1.1]);
        assert!(prompt.contains("add up to 150 minutes"));
        assert!(prompt.contains("1.50, 1.10"));
    }
}
