//! Integration tests for the generation pipeline with in-memory fakes.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use autogen_core::fakes::{ScriptedBackend, ScriptedReply};
use autogen_core::{
    AutogenConfig, BackendError, DocumentKind, GenerationError, ItemRef, PromptRequest,
    RequestKind,
};
use autogen_pipeline::{
    AttemptOutcome, Confirmation, GenerationPipeline, HandoffGate, HandoffRefusal, LoopState,
    ReviewCategory, ReviewSeverity,
};
use autogen_registry::fakes::StaticRegistryProvider;
use autogen_registry::{AreaEntry, EntityEntry, RegistryData, SnapshotStore};
use serde_json::json;

const KITCHEN_REQUEST: &str = "turn on kitchen light when temp exceeds 25";

const KITCHEN_DOC: &str = r#"alias: Kitchen light when warm
description: Turn on the kitchen light when the temperature exceeds 25
mode: single
trigger:
  - platform: numeric_state
    entity_id: sensor.temp
    above: 25
action:
  - service: light.turn_on
    target:
      entity_id: light.kitchen
"#;

const LOCK_DOC: &str = r#"alias: Lock the front door at night
trigger:
  - platform: time
    at: "23:00:00"
action:
  - service: lock.lock
    target:
      entity_id: lock.front_door
"#;

fn kitchen_data() -> RegistryData {
    RegistryData {
        entities: vec![
            EntityEntry::new("light.kitchen")
                .with_name("Kitchen Light")
                .with_area("kitchen"),
            EntityEntry::new("lock.front_door")
                .with_name("Front Door")
                .with_area("entrance"),
            EntityEntry::new("sensor.temp")
                .with_name("Temperature")
                .with_area("kitchen")
                .with_attribute("device_class", json!("temperature")),
        ],
        areas: vec![
            AreaEntry::new("kitchen", "Kitchen"),
            AreaEntry::new("entrance", "Entrance"),
        ],
        ..Default::default()
    }
}

fn fenced(doc: &str) -> String {
    format!("Here is the automation:\n\n```yaml\n{doc}```\n")
}

fn pipeline_with(
    backend: &Arc<ScriptedBackend>,
    provider: Arc<StaticRegistryProvider>,
    config: AutogenConfig,
) -> GenerationPipeline {
    let store = Arc::new(SnapshotStore::new(provider));
    GenerationPipeline::new(config, store, backend.clone())
}

fn pipeline(backend: &Arc<ScriptedBackend>) -> GenerationPipeline {
    pipeline_with(
        backend,
        Arc::new(StaticRegistryProvider::new(kitchen_data())),
        AutogenConfig::default(),
    )
}

fn automation(text: &str) -> PromptRequest {
    PromptRequest::generate(DocumentKind::Automation, text)
}

// ---- Scenarios ----

#[tokio::test]
async fn kitchen_scenario_produces_clean_document() {
    let backend = Arc::new(ScriptedBackend::with_texts("llama3.2", [fenced(KITCHEN_DOC)]));
    let report = pipeline(&backend).generate(&automation(KITCHEN_REQUEST)).await;

    let context = report.context.as_ref().expect("context");
    let ids: Vec<&str> = context.candidates.iter().map(|c| c.item.id()).collect();
    assert_eq!(ids, vec!["light.kitchen", "sensor.temp"]);
    assert_eq!(context.packed.full_detail_items.len(), 2);
    assert!(!context.packed.truncated);
    assert!(context.packed.estimated_size <= context.plan.ceiling);

    let document = report.result.expect("document");
    assert!(document.findings.is_empty(), "{:?}", document.findings);
    assert!(!document.sensitive);
    assert_eq!(document.attempt_number, 1);
    assert_eq!(backend.call_count(), 1);

    let prompt = &backend.prompts()[0];
    assert!(prompt.system.contains("`light.kitchen`"));
    assert!(!prompt.system.contains("lock.front_door"));
}

#[tokio::test]
async fn lock_document_is_sensitive_and_held_at_gate() {
    let backend = Arc::new(ScriptedBackend::with_texts("llama3.2", [fenced(LOCK_DOC)]));
    let report = pipeline(&backend)
        .generate(&automation("lock the front door every night"))
        .await;

    let document = report.result.expect("document");
    assert!(document.sensitive);
    assert_eq!(document.sensitivity.domains, vec!["lock"]);

    let refusal = HandoffGate::release(document.clone(), None).expect_err("held");
    assert!(matches!(refusal, HandoffRefusal::ConfirmationRequired { .. }));

    let confirmation = Confirmation::for_document(&document, "owner");
    let released = HandoffGate::release(document, Some(confirmation)).expect("released");
    assert!(released.confirmation.is_some());
}

#[tokio::test]
async fn dashboard_uses_whole_inventory() {
    let dashboard = "views:\n  - title: Home\n    cards:\n      - type: entities\n        entities:\n          - light.kitchen\n          - sensor.temp\n          - lock.front_door\n";
    let backend = Arc::new(ScriptedBackend::with_texts("llama3.2", [fenced(dashboard)]));
    let request = PromptRequest::generate(DocumentKind::Dashboard, "a simple overview dashboard");
    let report = pipeline(&backend).generate(&request).await;

    let context = report.context.as_ref().expect("context");
    assert_eq!(context.candidates.len(), 3);
    let document = report.result.expect("document");
    assert_eq!(document.kind, DocumentKind::Dashboard);
    assert!(document.sensitive);
}

#[tokio::test]
async fn unmatched_request_falls_back_to_inventory() {
    let backend = Arc::new(ScriptedBackend::with_texts("llama3.2", [fenced(KITCHEN_DOC)]));
    let report = pipeline(&backend)
        .generate(&automation("do something clever please"))
        .await;
    let context = report.context.expect("context");
    assert!(context.inventory_fallback);
    assert_eq!(context.candidates.len(), 3);
    assert!(context
        .candidates
        .iter()
        .all(|c| matches!(c.item, ItemRef::Entity(_))));
}

// ---- Repair loop ----

#[tokio::test]
async fn malformed_first_attempt_repaired_on_second() {
    let backend = Arc::new(ScriptedBackend::with_texts(
        "llama3.2",
        ["I would suggest a numeric state trigger.".to_string(), fenced(KITCHEN_DOC)],
    ));
    let report = pipeline(&backend).generate(&automation(KITCHEN_REQUEST)).await;

    let log = report.log.clone().expect("log");
    let document = report.result.expect("document");
    assert_eq!(document.attempt_number, 2);
    assert_eq!(log.accepted_attempt(), Some(2));
    assert_eq!(log.attempts_used, 2);
    assert_eq!(log.final_state, LoopState::Done);
    assert_eq!(
        log.transitions,
        vec![
            LoopState::Generating,
            LoopState::Parsing,
            LoopState::Repairing,
            LoopState::Generating,
            LoopState::Parsing,
            LoopState::Validating,
            LoopState::Done,
        ]
    );
    assert!(matches!(log.attempts[0].outcome, AttemptOutcome::ParseFailed { .. }));
    assert!(!log.attempts[0].repair);
    assert!(log.attempts[1].repair);

    let prompts = backend.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].user.contains("Previous Attempt Failed"));
    assert!(prompts[1].user.contains("Previous Attempt Failed"));
    assert!(!prompts[1].user.contains("numeric state trigger"));
}

#[tokio::test]
async fn blocking_schema_findings_drive_repair() {
    let missing_trigger = "alias: Kitchen light\naction:\n  - service: light.turn_on\n    target:\n      entity_id: light.kitchen\n";
    let backend = Arc::new(ScriptedBackend::with_texts(
        "llama3.2",
        [fenced(missing_trigger), fenced(KITCHEN_DOC)],
    ));
    let report = pipeline(&backend).generate(&automation(KITCHEN_REQUEST)).await;

    let log = report.log.clone().expect("log");
    assert!(matches!(
        log.attempts[0].outcome,
        AttemptOutcome::Blocked { blocking: 1, .. }
    ));
    assert!(report.result.is_ok());
    assert!(backend.prompts()[1]
        .user
        .contains("automation is missing required key 'trigger'"));
}

#[tokio::test]
async fn three_malformed_attempts_exhaust_without_raw_text() {
    let prose = "Unfortunately I am unable to write that automation for you.";
    let backend = Arc::new(ScriptedBackend::with_texts(
        "llama3.2",
        [prose, prose, prose, prose],
    ));
    let report = pipeline(&backend).generate(&automation(KITCHEN_REQUEST)).await;

    assert_eq!(backend.call_count(), 3);
    let log = report.log.clone().expect("log");
    assert_eq!(log.attempts_used, 3);
    assert_eq!(log.final_state, LoopState::Failed);

    let err = report.result.expect_err("exhausted");
    match &err {
        GenerationError::RepairExhausted {
            attempts,
            findings,
            last_failure,
        } => {
            assert_eq!(*attempts, 3);
            assert!(findings.is_empty());
            assert!(!last_failure.contains("unable"));
        }
        other => panic!("expected RepairExhausted, got {other:?}"),
    }
    assert!(!err.user_message().contains("Unfortunately"));
    assert!(!err.to_string().contains("Unfortunately"));
}

#[tokio::test]
async fn exhausted_loop_reports_last_findings() {
    let bad = fenced("alias: Broken\naction: []\n");
    let backend = Arc::new(ScriptedBackend::with_texts(
        "llama3.2",
        [bad.clone(), bad.clone(), bad],
    ));
    let err = pipeline(&backend)
        .generate(&automation(KITCHEN_REQUEST))
        .await
        .into_result()
        .expect_err("exhausted");
    let GenerationError::RepairExhausted { findings, .. } = &err else {
        panic!("expected RepairExhausted, got {err:?}");
    };
    assert!(findings.iter().any(|f| f.is_blocking()));
    assert!(err.user_message().contains("missing required key 'trigger'"));
}

#[tokio::test]
async fn zero_ceiling_surfaces_first_failure() {
    let backend = Arc::new(ScriptedBackend::with_texts("llama3.2", ["no document here"]));
    let config = AutogenConfig {
        repair_ceiling: 0,
        ..AutogenConfig::default()
    };
    let provider = Arc::new(StaticRegistryProvider::new(kitchen_data()));
    let err = pipeline_with(&backend, provider, config)
        .generate(&automation(KITCHEN_REQUEST))
        .await
        .into_result()
        .expect_err("parse failure");
    assert!(matches!(err, GenerationError::ParseFailure { .. }));
    assert_eq!(backend.call_count(), 1);
}

// ---- Backend failures ----

#[tokio::test(start_paused = true)]
async fn timeout_is_retried_as_repair() {
    let backend = Arc::new(ScriptedBackend::new("llama3.2"));
    backend.push(ScriptedReply::Delayed(Duration::from_secs(30), fenced(KITCHEN_DOC)));
    backend.push(ScriptedReply::Text(fenced(KITCHEN_DOC)));
    let config = AutogenConfig {
        backend_timeout_secs: 5,
        ..AutogenConfig::default()
    };
    let provider = Arc::new(StaticRegistryProvider::new(kitchen_data()));
    let report = pipeline_with(&backend, provider, config)
        .generate(&automation(KITCHEN_REQUEST))
        .await;

    let log = report.log.clone().expect("log");
    assert_eq!(log.attempts[0].outcome, AttemptOutcome::TimedOut);
    let document = report.result.expect("document");
    assert_eq!(document.attempt_number, 2);
}

#[tokio::test(start_paused = true)]
async fn repeated_timeouts_surface_backend_timeout() {
    let backend = Arc::new(ScriptedBackend::new("llama3.2"));
    for _ in 0..3 {
        backend.push(ScriptedReply::Delayed(Duration::from_secs(30), fenced(KITCHEN_DOC)));
    }
    let config = AutogenConfig {
        backend_timeout_secs: 5,
        ..AutogenConfig::default()
    };
    let provider = Arc::new(StaticRegistryProvider::new(kitchen_data()));
    let err = pipeline_with(&backend, provider, config)
        .generate(&automation(KITCHEN_REQUEST))
        .await
        .into_result()
        .expect_err("timeout");
    assert!(matches!(err, GenerationError::BackendTimeout { attempts: 3 }));
}

#[tokio::test]
async fn backend_error_is_not_retried() {
    let backend = Arc::new(ScriptedBackend::new("llama3.2"));
    backend.push(ScriptedReply::Error(BackendError::Status {
        status: 500,
        message: "model crashed: out of memory".to_string(),
    }));
    backend.push(ScriptedReply::Text(fenced(KITCHEN_DOC)));

    let pipeline = pipeline(&backend);
    let counter = pipeline.attempt_counter();
    let report = pipeline.generate(&automation(KITCHEN_REQUEST)).await;

    assert_eq!(backend.call_count(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    let err = report.result.expect_err("backend error");
    assert_eq!(err.kind(), "backend_error");
    assert!(!err.user_message().contains("out of memory"));
}

// ---- Snapshot ----

#[tokio::test]
async fn unavailable_registry_fails_before_backend_call() {
    let backend = Arc::new(ScriptedBackend::with_texts("llama3.2", [fenced(KITCHEN_DOC)]));
    let provider = Arc::new(StaticRegistryProvider::new(kitchen_data()));
    provider.set_failing(true);
    let err = pipeline_with(&backend, provider, AutogenConfig::default())
        .generate(&automation(KITCHEN_REQUEST))
        .await
        .into_result()
        .expect_err("no inventory");
    assert_eq!(err.kind(), "snapshot_unavailable");
    assert!(err.user_message().contains("Refresh"));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn all_attempts_use_the_pinned_snapshot_version() {
    let bad = fenced("alias: Broken\naction: []\n");
    let backend = Arc::new(ScriptedBackend::with_texts(
        "llama3.2",
        [bad, fenced(KITCHEN_DOC)],
    ));
    let provider = Arc::new(StaticRegistryProvider::new(kitchen_data()));
    let store = Arc::new(SnapshotStore::new(provider.clone()));
    store.refresh().await.expect("v1");
    store.refresh().await.expect("v2");
    let pipeline = GenerationPipeline::new(AutogenConfig::default(), store, backend.clone());

    let report = pipeline.generate(&automation(KITCHEN_REQUEST)).await;
    let log = report.log.clone().expect("log");
    let document = report.result.expect("document");
    assert_eq!(log.snapshot_version, 2);
    assert_eq!(document.snapshot_version, 2);
}

#[tokio::test]
async fn review_request_reports_rule_findings_on_existing_document() {
    let backend = Arc::new(ScriptedBackend::with_texts("llama3.2", [fenced(KITCHEN_DOC)]));
    let request = automation("").with_existing(RequestKind::Review, LOCK_DOC);
    let report = pipeline(&backend).generate(&request).await;

    let categories: Vec<(ReviewCategory, ReviewSeverity)> =
        report.review.iter().map(|f| (f.category, f.severity)).collect();
    assert_eq!(
        categories,
        vec![
            (ReviewCategory::MissingGuards, ReviewSeverity::Suggestion),
            (ReviewCategory::Security, ReviewSeverity::Critical),
        ]
    );
    assert!(report.review.iter().all(|f| f.subject == "Lock the front door at night"));
    assert!(report.result.is_ok());

    let fresh = Arc::new(ScriptedBackend::with_texts("llama3.2", [fenced(KITCHEN_DOC)]));
    let plain = pipeline(&fresh).generate(&automation(KITCHEN_REQUEST)).await;
    assert!(plain.review.is_empty());
}
