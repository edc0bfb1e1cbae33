//! Folding step outcomes into a single task result.

use serde_json::Value;

use crate::error::FailureReason;
use crate::task::{Classification, StepOutcome, TaskResult};

pub fn classify(outcomes: &[StepOutcome]) -> Classification {
    let succeeded = outcomes.iter().filter(|o| o.success).count();
    match succeeded {
        0 => Classification::Failure,
        n if n == outcomes.len() => Classification::Success,
        _ => Classification::Partial,
    }
}

/// Last successful value; otherwise the first failure's reason.
pub fn synthesize(outcomes: &[StepOutcome], abort: Option<&FailureReason>) -> Value {
    if let Some(value) = outcomes
        .iter()
        .rev()
        .filter(|o| o.success)
        .find_map(|o| o.value.clone())
    {
        return value;
    }
    outcomes
        .iter()
        .find_map(|o| o.error.as_ref())
        .or(abort)
        .map(|reason| Value::String(reason.to_string()))
        .unwrap_or(Value::Null)
}

/// Build the terminal result. `abort` is the reason the plan was cut short,
/// if it was; a run in which no step succeeded falls back to the first step
/// failure as its error.
pub fn aggregate(
    outcomes: Vec<StepOutcome>,
    abort: Option<FailureReason>,
    elapsed_ms: u64,
) -> TaskResult {
    let classification = classify(&outcomes);
    let response = synthesize(&outcomes, abort.as_ref());
    let error = match (abort, classification) {
        (Some(reason), _) => Some(reason),
        (None, Classification::Failure) => outcomes.iter().find_map(|o| o.error.clone()),
        (None, _) => None,
    };
    TaskResult {
        classification,
        outcomes,
        response,
        error,
        elapsed_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Step, TaskStatus};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ok(index: usize, value: Value) -> StepOutcome {
        StepOutcome::succeeded(index, &Step::new("speech", "say"), value, 1)
    }

    fn busy(index: usize) -> StepOutcome {
        StepOutcome::failed(
            index,
            &Step::new("vision", "scan"),
            FailureReason::AgentBusy {
                kind: "vision".into(),
                capacity: 1,
            },
            0,
        )
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify(&[ok(0, json!(1)), ok(1, json!(2))]), Classification::Success);
        assert_eq!(classify(&[ok(0, json!(1)), busy(1)]), Classification::Partial);
        assert_eq!(classify(&[busy(0), busy(1)]), Classification::Failure);
        assert_eq!(classify(&[]), Classification::Failure);
    }

    #[test]
    fn test_response_prefers_last_success() {
        let outcomes = vec![ok(0, json!("first")), busy(1), ok(2, json!("last"))];
        let result = aggregate(outcomes, None, 12);

        assert_eq!(result.classification, Classification::Partial);
        assert_eq!(result.response, json!("last"));
        assert_eq!(result.error, None);
        assert_eq!(result.terminal_status(), TaskStatus::Completed);
        assert_eq!(result.succeeded_steps(), 2);
    }

    #[test]
    fn test_failure_surfaces_first_reason() {
        let result = aggregate(vec![busy(0), busy(1)], None, 3);
        assert_eq!(result.classification, Classification::Failure);
        assert_eq!(
            result.response,
            json!("agent 'vision' is at capacity (1 concurrent steps)")
        );
        assert!(matches!(result.error, Some(FailureReason::AgentBusy { .. })));
        assert_eq!(result.terminal_status(), TaskStatus::Failed);
    }

    #[test]
    fn test_abort_marks_failed_even_with_successes() {
        let result = aggregate(
            vec![ok(0, json!("lights on"))],
            Some(FailureReason::TaskTimeout { timeout_ms: 50 }),
            50,
        );
        assert_eq!(result.classification, Classification::Partial);
        assert_eq!(result.terminal_status(), TaskStatus::Failed);
        assert_eq!(result.response, json!("lights on"));
    }

    #[test]
    fn test_abort_without_outcomes() {
        let result = aggregate(Vec::new(), Some(FailureReason::Cancelled), 0);
        assert_eq!(result.response, json!("task cancelled"));
        assert_eq!(result.error, Some(FailureReason::Cancelled));
    }
}
