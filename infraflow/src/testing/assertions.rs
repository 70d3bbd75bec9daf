//! Assertions over workflow results.

use crate::core::{StageStatus, WorkflowResult, WorkflowStatus};

/// Asserts the workflow's overall status.
pub fn assert_workflow_status(result: &WorkflowResult, expected: WorkflowStatus) {
    assert_eq!(
        result.status, expected,
        "Expected workflow status {:?}, got {:?} (failure: {:?})",
        expected, result.status, result.failure
    );
}

/// Asserts the exact executed stage names, in order.
pub fn assert_stages(result: &WorkflowResult, expected: &[&str]) {
    assert_eq!(
        result.stage_names(),
        expected,
        "Unexpected stages for workflow '{}'",
        result.workflow_id
    );
}

/// Asserts a stage was executed with the given status.
pub fn assert_stage_status(result: &WorkflowResult, stage: &str, expected: StageStatus) {
    let Some(actual) = result.stage(stage) else {
        panic!(
            "Stage '{}' was not executed. Executed: {:?}",
            stage,
            result.stage_names()
        );
    };
    assert_eq!(
        actual.status, expected,
        "Expected stage '{}' to be {:?}, got {:?} (error: {:?})",
        stage, expected, actual.status, actual.error
    );
}

/// Asserts a stage never ran.
pub fn assert_stage_absent(result: &WorkflowResult, stage: &str) {
    assert!(
        result.stage(stage).is_none(),
        "Expected stage '{}' to be absent. Executed: {:?}",
        stage,
        result.stage_names()
    );
}
