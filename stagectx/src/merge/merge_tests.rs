//! End-to-end tests for the merge layer.

#[cfg(test)]
mod tests {
    use crate::context::ExecutionSnapshot;
    use crate::core::{ContextMap, StageStatus};
    use crate::evaluation::{
        EvaluateVariablesHandler, EvaluatorVersion, HandlerRegistry, MockExpressionEvaluator,
    };
    use crate::merge::{BestEffort, ExpressionAware};
    use crate::testing::{StageFixture, TemplateEvaluator};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    }

    fn service() -> ExpressionAware {
        init_tracing();
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(EvaluateVariablesHandler::new()));
        ExpressionAware::new(Arc::new(TemplateEvaluator::new()), Arc::new(registry))
    }

    fn records(summary: Option<Value>) -> ContextMap {
        summary
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default()
    }

    #[test]
    fn scenario_a_expression_resolves_on_read() {
        let service = service();
        let (_execution, stage) = StageFixture::new("wait")
            .with_context(json!({"x": "${1+1}"}))
            .build();

        service.with_merged_context(&stage);

        assert_eq!(stage.context().get("x"), Some(json!(2)));
        assert!(records(stage.context().get("summary")).is_empty());
        assert!(!service.has_failures(&stage));
    }

    #[test]
    fn scenario_b_resolved_key_loses_its_failure_record() {
        let service = service();
        let (_execution, stage) = StageFixture::new("wait")
            .with_trigger(json!({"ref": "main"}))
            .with_context(json!({
                "y": "${trigger.ref}",
                "summary": {"y": [{"description": "unresolved reference"}]},
            }))
            .build();

        let report = service.merge(&stage);

        assert!(report.generic_pass);
        assert!(report.reconciliation.is_applied());
        assert_eq!(stage.context().get("summary"), Some(json!({})));
        assert_eq!(stage.context().get("y"), Some(json!("main")));
        assert!(!service.has_failures(&stage));
    }

    #[test]
    fn scenario_c_unattempted_key_keeps_its_failure_record() {
        let service = service();
        let prior = json!({"y": [{"description": "unresolved reference"}]});
        let (_execution, stage) = StageFixture::new("wait")
            .with_context(json!({"y": 5, "summary": prior}))
            .build();

        service.with_merged_context(&stage);

        assert_eq!(stage.context().get("summary"), Some(prior));
        assert!(service.has_failures(&stage));
    }

    #[test]
    fn scenario_d_new_failures_append_to_existing_errors() {
        let service = service();
        let (_execution, stage) = StageFixture::new("wait")
            .with_context(json!({
                "summary": {"y": [{"description": "bad ref"}]},
                "exception": {"details": {"errors": ["prior error"]}},
            }))
            .build();

        let outcome = service.include_evaluation_summary(&stage);

        assert!(outcome.is_applied());
        assert_eq!(
            stage.context().get("exception"),
            Some(json!({"details": {"errors": ["prior error", "bad ref"]}}))
        );
    }

    #[test]
    fn scenario_e_strict_flag_is_opt_in() {
        let service = service();
        let failing = json!({"y": [{"description": "bad ref"}]});

        let (_execution, lenient) = StageFixture::new("wait")
            .with_context(json!({"summary": failing}))
            .build();
        assert!(service.has_failures(&lenient));
        assert!(!service.should_fail_stage(&lenient));

        let (_execution, strict) = StageFixture::new("wait")
            .with_context(json!({"summary": failing, "failOnFailedExpressions": true}))
            .build();
        assert!(service.should_fail_stage(&strict));
    }

    #[test]
    fn reserved_keys_resolve_to_the_execution() {
        let service = service();
        let (execution, stage) = StageFixture::new("wait")
            .with_trigger(json!({"type": "git", "branch": "main"}))
            .with_context(json!({"trigger": "stored", "execution": {"id": "fake"}}))
            .build();

        service.with_merged_context(&stage);

        assert_eq!(
            stage.context().get("trigger"),
            Some(json!({"type": "git", "branch": "main"}))
        );
        let view = stage.context().get("execution").unwrap();
        assert_eq!(view["id"], json!(execution.id()));
        assert_eq!(stage.context().to_map()["trigger"], json!("stored"));
    }

    #[test]
    fn reads_see_upstream_data_that_arrives_after_the_pass() {
        let service = service();
        let (execution, stage) = StageFixture::new("deploy")
            .with_upstream("bake", json!({}), StageStatus::Running)
            .with_context(json!({"image": "${bakedImage}"}))
            .build();

        let report = service.merge(&stage);
        assert!(report.summary.has_failed("image"));
        assert_eq!(stage.context().get("image"), Some(json!("${bakedImage}")));
        assert!(service.has_failures(&stage));

        let bake = execution.stage_by_ref_id("bake").unwrap();
        bake.set_output("bakedImage", json!("ami-123"));
        bake.set_status(StageStatus::Succeeded);

        assert_eq!(stage.context().get("image"), Some(json!("ami-123")));

        let report = service.merge(&stage);
        assert!(report.summary.succeeded("image"));
        assert!(report.reconciliation.is_applied());
        assert!(!service.has_failures(&stage));
        assert_eq!(stage.context().to_map()["image"], json!("ami-123"));
    }

    #[test]
    fn writes_through_the_overlay_reach_the_stage_storage() {
        let service = service();
        let (_execution, stage) = StageFixture::new("wait")
            .with_context(json!({"x": "${1+1}"}))
            .build();
        service.with_merged_context(&stage);

        let context = stage.context();
        context.insert("y", json!("${x}"));

        assert!(context.is_merged());
        assert_eq!(stage.context().len(), 2);
        assert_eq!(stage.context().get("y"), Some(json!(2)));
        assert_eq!(context.remove("y"), Some(json!("${x}")));
        assert_eq!(stage.context().keys(), vec!["x"]);
    }

    #[test]
    fn every_read_reevaluates() {
        init_tracing();
        let (_execution, stage) = StageFixture::new("wait")
            .with_context(json!({"x": "${anything}", "plain": 1}))
            .build();

        let mut evaluator = MockExpressionEvaluator::new();
        evaluator
            .expect_effective_version()
            .returning(|_| EvaluatorVersion::V3);
        evaluator
            .expect_contains_expression()
            .returning(|value| value.contains("${"));
        evaluator
            .expect_build_execution_context()
            .times(3)
            .returning(|_| ExecutionSnapshot::default());
        evaluator
            .expect_process()
            .times(3)
            .returning(|source, _, _, _| source.clone());
        let service = ExpressionAware::new(Arc::new(evaluator), Arc::new(HandlerRegistry::new()));

        service.with_merged_context(&stage);
        let _ = stage.context().get("x");
        let _ = stage.context().get("x");
        assert_eq!(stage.context().get("plain"), Some(json!(1)));
    }

    #[test]
    fn repeated_passes_are_idempotent() {
        let service = service();
        let (_execution, stage) = StageFixture::new("wait")
            .with_context(json!({
                "ok": "${1+1}",
                "bad": "${missing}",
                "stale": 3,
                "summary": {"stale": [{"description": "old failure"}]},
            }))
            .build();

        service.with_merged_context(&stage);
        assert!(service.include_evaluation_summary(&stage).is_applied());
        let first = stage.context().to_map();

        service.with_merged_context(&stage);
        assert!(service.include_evaluation_summary(&stage).is_skipped());
        let second = stage.context().to_map();

        assert_eq!(records(first.get("summary").cloned()).len(), 2);
        assert_eq!(first["exception"], second["exception"]);
        assert_eq!(
            records(first.get("summary").cloned()).keys().collect::<Vec<_>>(),
            records(second.get("summary").cloned()).keys().collect::<Vec<_>>()
        );
        assert_eq!(
            second["exception"]["details"]["errors"].as_array().unwrap().len(),
            2
        );
    }

    #[test]
    fn reconciliation_failure_never_aborts_the_pass() {
        let service = service();
        let (_execution, stage) = StageFixture::new("wait")
            .with_context(json!({"x": "${1+1}", "summary": "corrupted"}))
            .build();

        let report = service.merge(&stage);

        assert!(matches!(report.reconciliation, BestEffort::Failed(_)));
        assert_eq!(stage.context().get("x"), Some(json!(2)));
        assert_eq!(stage.context().get("summary"), Some(json!("corrupted")));
        assert!(service.include_evaluation_summary(&stage).is_failed());
        assert!(!stage.context().contains_key("exception"));
    }

    #[test]
    fn evaluate_variables_stage_owns_its_evaluation() {
        let service = service();
        let (_execution, stage) = StageFixture::new("evaluateVariables")
            .with_context(json!({
                "variables": [
                    {"key": "a", "value": "${1+1}"},
                    {"key": "b", "value": "${a+1}"},
                ],
                "note": "${a}",
            }))
            .build();

        let report = service.merge(&stage);

        assert!(!report.generic_pass);
        assert_eq!(
            stage.context().to_map()["variables"],
            json!([{"key": "a", "value": 2}, {"key": "b", "value": 3}])
        );
        assert_eq!(stage.context().to_map()["note"], json!("${a}"));
    }

    #[test]
    fn v3_executions_evaluate_variables_generically() {
        let service = service();
        let (_execution, stage) = StageFixture::new("evaluateVariables")
            .with_evaluator_version(EvaluatorVersion::V3)
            .with_context(json!({
                "variables": [
                    {"key": "a", "value": "${1+1}"},
                    {"key": "b", "value": "${a+1}"},
                ],
            }))
            .build();

        let report = service.merge(&stage);

        assert!(report.generic_pass);
        assert!(report.summary.has_failed("variables"));
        assert_eq!(
            stage.context().to_map()["variables"],
            json!([{"key": "a", "value": 2}, {"key": "b", "value": "${a+1}"}])
        );
        assert_eq!(
            records(stage.context().get("summary"))["variables"][0]["exceptionType"],
            json!("UnresolvedReference")
        );
    }
}
