//! End-to-end dispatch scenarios through the public API.
//!
//! Every test registers models under names unique to that test, so the
//! process-wide registry never aliases across tests.

use fookie::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Adapter wrapper that counts calls, logs events, and remembers the last
/// operation descriptor it saw.
struct RecordingDatabase {
    inner: MemoryDatabase,
    calls: AtomicUsize,
    log: Arc<Mutex<Vec<String>>>,
    last_operation: Mutex<Option<Operation>>,
}

impl RecordingDatabase {
    fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            inner: MemoryDatabase::new(),
            calls: AtomicUsize::new(0),
            log,
            last_operation: Mutex::new(None),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_operation(&self) -> Option<Operation> {
        self.last_operation.lock().unwrap().clone()
    }
}

#[async_trait]
impl Database for RecordingDatabase {
    fn pk(&self) -> &str {
        self.inner.pk()
    }

    fn pk_type(&self) -> Validator {
        self.inner.pk_type()
    }

    async fn connect(&self) -> OrmResult<()> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> OrmResult<()> {
        self.inner.disconnect().await
    }

    async fn modify(&self, model: &Model, operation: Operation) -> OrmResult<OperationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("modify".to_string());
        *self.last_operation.lock().unwrap() = Some(operation.clone());
        self.inner.modify(model, operation).await
    }
}

fn marker(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> LifecycleHook {
    let log = log.clone();
    hook(move |_| {
        log.lock().unwrap().push(name.to_string());
        Ok(true)
    })
}

#[tokio::test]
async fn unique_email_create_succeeds_once() {
    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_user_unique", db)
        .field("email", Field::new(types::text()).required().unique())
        .bind(Method::Create, Stage::Role, everybody())
        .build()
        .unwrap();

    let payload = Payload::new("it_user_unique", Method::Create).body(json!({"email": "a@x.com"}));

    let first = run(payload.clone()).await;
    assert!(first.status);
    assert_eq!(first.data["email"], json!("a@x.com"));
    assert!(first.data["id"].is_string());

    let second = run(payload).await;
    assert!(!second.status);
    assert!(second.error.unwrap().contains("unique"));
}

#[tokio::test]
async fn multi_row_update_cannot_duplicate_a_unique_value() {
    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_user_broad_update", db)
        .field("email", Field::new(types::text()).required().unique())
        .field("kind", Field::new(types::text()))
        .expose(Method::Create)
        .expose(Method::Read)
        .expose(Method::Update)
        .build()
        .unwrap();

    for email in ["a@x.com", "b@x.com"] {
        assert!(run(Payload::new("it_user_broad_update", Method::Create)
            .body(json!({"email": email, "kind": "staff"})))
        .await
        .status);
    }

    // The filter matches both rows, so writing one email to all of them
    // would mint duplicates.
    let update = run(Payload::new("it_user_broad_update", Method::Update)
        .filter_eq("kind", json!("staff"))
        .body(json!({"email": "same@x.com"})))
    .await;
    assert!(!update.status);
    assert!(update.error.unwrap().contains("more than one row"));

    let rows = run(Payload::new("it_user_broad_update", Method::Read)
        .filter_eq("email", json!("same@x.com")))
    .await;
    assert_eq!(rows.data.as_array().unwrap().len(), 0);

    // Narrowed to a single row, the same write goes through.
    let narrow = run(Payload::new("it_user_broad_update", Method::Update)
        .filter_eq("email", json!("a@x.com"))
        .body(json!({"email": "same@x.com"})))
    .await;
    assert!(narrow.status);
}

#[tokio::test]
async fn create_without_a_body_uses_schema_defaults() {
    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_defaulted", db)
        .field("status", Field::new(types::text()).default(json!("draft")))
        .field("retries", Field::new(types::integer()).default(json!(0)))
        .expose(Method::Create)
        .build()
        .unwrap();

    let response = run(Payload::new("it_defaulted", Method::Create)).await;

    assert!(response.status);
    assert_eq!(response.data["status"], json!("draft"));
    assert_eq!(response.data["retries"], json!(0));
    assert!(response.data["id"].is_string());
}

#[tokio::test]
async fn out_of_bounds_update_never_reaches_the_adapter() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let db = Arc::new(RecordingDatabase::new(log));
    Model::builder("it_user_bounds", db.clone())
        .field(
            "age",
            Field::new(types::integer()).minimum(0.0).maximum(120.0),
        )
        .expose(Method::Update)
        .build()
        .unwrap();

    let response = run(Payload::new("it_user_bounds", Method::Update).body(json!({"age": 200}))).await;

    assert!(!response.status);
    assert!(response.error.unwrap().contains("at most 120"));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn failing_pre_rule_short_circuits_everything() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let db = Arc::new(RecordingDatabase::new(log.clone()));
    Model::builder("it_prerule", db.clone())
        .field("name", Field::new(types::text()))
        .bind(Method::Create, Stage::PreRule, hook(|_| Ok(false)))
        .bind(Method::Create, Stage::Modify, marker(&log, "modify"))
        .build()
        .unwrap();

    let response = run(Payload::new("it_prerule", Method::Create).body(json!({"name": "x"}))).await;

    assert!(!response.status);
    assert!(response.error.unwrap().starts_with("Precondition failed"));
    assert_eq!(db.calls(), 0);
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn happy_path_makes_one_adapter_call_with_effects_after() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let db = Arc::new(RecordingDatabase::new(log.clone()));
    Model::builder("it_one_call", db.clone())
        .field("name", Field::new(types::text()).required())
        .bind(Method::Create, Stage::PreRule, marker(&log, "preRule"))
        .bind(Method::Create, Stage::Role, everybody())
        .bind(Method::Create, Stage::Rule, marker(&log, "rule"))
        .bind(Method::Create, Stage::Effect, marker(&log, "effect"))
        .build()
        .unwrap();

    let response = run(Payload::new("it_one_call", Method::Create).body(json!({"name": "x"}))).await;

    assert!(response.status);
    assert_eq!(db.calls(), 1);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["preRule", "rule", "modify", "effect"]
    );
}

#[tokio::test]
async fn filter_stage_always_injects_tenant_scope() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let db = Arc::new(RecordingDatabase::new(log));
    Model::builder("it_tenant", db.clone())
        .field("title", Field::new(types::text()))
        .field("tenant_id", Field::new(types::text()))
        .bind(
            Method::Read,
            Stage::Filter,
            hook(|cx: &mut Context| {
                cx.payload
                    .query
                    .get_or_insert_with(Query::default)
                    .filter
                    .insert(
                        "tenant_id".to_string(),
                        FilterField::default().eq(json!("acme")),
                    );
                Ok(true)
            }),
        )
        .build()
        .unwrap();

    // With a caller-supplied filter.
    let scoped = Payload::new("it_tenant", Method::Read).filter_eq("title", json!("report"));
    assert!(run(scoped).await.status);
    let op = db.last_operation().unwrap();
    assert!(op.filter.contains_key("tenant_id"));
    assert!(op.filter.contains_key("title"));

    // And without one.
    assert!(run(Payload::new("it_tenant", Method::Read)).await.status);
    let op = db.last_operation().unwrap();
    assert!(op.filter["tenant_id"].matches(&json!("acme")));
}

#[tokio::test]
async fn todo_payloads_dispatch_in_fifo_order() {
    let audit_db = Arc::new(MemoryDatabase::new());
    Model::builder("it_audit_log", audit_db)
        .field("seq", Field::new(types::integer()))
        .expose(Method::Create)
        .expose(Method::Read)
        .build()
        .unwrap();

    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_fifo_source", db)
        .field("name", Field::new(types::text()))
        .bind(
            Method::Create,
            Stage::Effect,
            hook(|cx: &mut Context| {
                for seq in [1, 2] {
                    cx.state.enqueue(
                        Payload::new("it_audit_log", Method::Create).body(json!({"seq": seq})),
                    );
                }
                Ok(true)
            }),
        )
        .build()
        .unwrap();

    assert!(
        run(Payload::new("it_fifo_source", Method::Create).body(json!({"name": "x"})))
            .await
            .status
    );

    let rows = run(Payload::new("it_audit_log", Method::Read)).await;
    let seqs: Vec<i64> = rows.data.as_array().unwrap().iter()
        .map(|row| row["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, vec![1, 2]);
}

#[tokio::test]
async fn reads_are_idempotent_without_intervening_writes() {
    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_idempotent", db)
        .field("n", Field::new(types::integer()))
        .expose(Method::Create)
        .expose(Method::Read)
        .expose(Method::Count)
        .build()
        .unwrap();

    for n in [1, 2, 3] {
        assert!(
            run(Payload::new("it_idempotent", Method::Create).body(json!({"n": n})))
                .await
                .status
        );
    }

    let query = Payload::new("it_idempotent", Method::Read)
        .filter_eq("n", json!(2));
    let first = run(query.clone()).await;
    let second = run(query).await;
    assert_eq!(first.data, second.data);

    let count = Payload::new("it_idempotent", Method::Count);
    assert_eq!(run(count.clone()).await.data, run(count).await.data);
}

#[tokio::test]
async fn mixin_hooks_bracket_the_models_own_stage() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let db = Arc::new(MemoryDatabase::new());

    let before = mixin("audit", MixinPosition::Before)
        .field("trace", Field::new(types::text()).default(json!("mixin")))
        .bind(Method::Create, Stage::Modify, marker(&log, "before-mixin"));
    let after = mixin("notify", MixinPosition::After)
        .bind(Method::Create, Stage::Modify, marker(&log, "after-mixin"));

    Model::builder("it_mixed", db)
        .mixin(before)
        .mixin(after)
        .field("name", Field::new(types::text()))
        .bind(Method::Create, Stage::Modify, marker(&log, "own"))
        .build()
        .unwrap();

    let response = run(Payload::new("it_mixed", Method::Create).body(json!({"name": "x"}))).await;

    assert!(response.status);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["before-mixin", "own", "after-mixin"]
    );
    // Schema picked up the mixin field and its default.
    assert_eq!(response.data["trace"], json!("mixin"));
}

#[tokio::test]
async fn cascade_delete_and_reactive_delete_follow_relations() {
    let user_db = Arc::new(MemoryDatabase::new());
    Model::builder("it_rel_user", user_db)
        .field("name", Field::new(types::text()))
        .expose(Method::Create)
        .expose(Method::Delete)
        .build()
        .unwrap();

    let post_db = Arc::new(MemoryDatabase::new());
    Model::builder("it_rel_post", post_db)
        .field(
            "author",
            Field::new(types::text()).relation("it_rel_user").cascade_delete(),
        )
        .field("title", Field::new(types::text()))
        .expose(Method::Create)
        .expose(Method::Read)
        .expose(Method::Delete)
        .build()
        .unwrap();

    let review_db = Arc::new(MemoryDatabase::new());
    Model::builder("it_rel_review", review_db)
        .field(
            "reviewer",
            Field::new(types::text()).relation("it_rel_user").reactive_delete(),
        )
        .field("stars", Field::new(types::integer()))
        .expose(Method::Create)
        .expose(Method::Read)
        .expose(Method::Update)
        .build()
        .unwrap();

    let user = run(Payload::new("it_rel_user", Method::Create).body(json!({"name": "ada"}))).await;
    let user_id = user.data["id"].clone();

    assert!(run(Payload::new("it_rel_post", Method::Create)
        .body(json!({"author": user_id, "title": "t"})))
    .await
    .status);
    assert!(run(Payload::new("it_rel_review", Method::Create)
        .body(json!({"reviewer": user_id, "stars": 5})))
    .await
    .status);

    let deleted = run(Payload::new("it_rel_user", Method::Delete).filter_eq("id", user_id.clone())).await;
    assert!(deleted.status);
    assert_eq!(deleted.data, json!(1));

    // Cascade removed the post.
    let posts = run(Payload::new("it_rel_post", Method::Read)).await;
    assert_eq!(posts.data.as_array().unwrap().len(), 0);

    // Reactive delete kept the review but nulled the reference.
    let reviews = run(Payload::new("it_rel_review", Method::Read)).await;
    let rows = reviews.data.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["reviewer"], json!(null));
    assert_eq!(rows[0]["stars"], json!(5));
}

#[tokio::test]
async fn accept_and_reject_subpipelines_key_on_the_resolved_value() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_moderation", db)
        .field("status", Field::new(types::text()))
        .expose(Method::Create)
        .accept(
            Method::Create,
            "approved",
            SubPipeline::new().modify(marker(&log, "accept-modify")),
        )
        .reject(Method::Create, "banned", SubPipeline::new())
        .build()
        .unwrap();

    let approved = Payload::new("it_moderation", Method::Create)
        .body(json!({"status": "approved"}))
        .field("status");
    assert!(run(approved).await.status);
    assert_eq!(*log.lock().unwrap(), vec!["accept-modify"]);

    let banned = Payload::new("it_moderation", Method::Create)
        .body(json!({"status": "banned"}))
        .field("status");
    let response = run(banned).await;
    assert!(!response.status);
    assert!(response.error.unwrap().contains("banned"));
}

#[tokio::test]
async fn reject_subpipeline_rule_can_override() {
    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_override", db)
        .field("status", Field::new(types::text()))
        .expose(Method::Create)
        .reject(
            Method::Create,
            "banned",
            SubPipeline::new().rule(hook(|cx: &mut Context| Ok(cx.payload.token.is_some()))),
        )
        .build()
        .unwrap();

    let banned = Payload::new("it_override", Method::Create)
        .body(json!({"status": "banned"}))
        .field("status");

    assert!(!run(banned.clone()).await.status);
    // An operator token overrides the rejection.
    assert!(run(banned.token("ops")).await.status);
}

#[tokio::test]
async fn custom_method_replaces_the_adapter_operation() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let db = Arc::new(RecordingDatabase::new(log));
    Model::builder("it_custom", db.clone())
        .field("name", Field::new(types::text()))
        .method(
            Method::Read,
            hook(|cx: &mut Context| {
                cx.payload.response = Some(Response::success(json!("handled elsewhere")));
                Ok(true)
            }),
        )
        .build()
        .unwrap();

    let response = run(Payload::new("it_custom", Method::Read)).await;

    assert!(response.status);
    assert_eq!(response.data, json!("handled elsewhere"));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn sum_and_count_aggregate_matching_rows() {
    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_aggregate", db)
        .field("amount", Field::new(types::float()))
        .field("kind", Field::new(types::text()))
        .expose(Method::Create)
        .expose(Method::Count)
        .expose(Method::Sum)
        .build()
        .unwrap();

    for (amount, kind) in [(10.0, "in"), (5.5, "in"), (99.0, "out")] {
        assert!(run(Payload::new("it_aggregate", Method::Create)
            .body(json!({"amount": amount, "kind": kind})))
        .await
        .status);
    }

    let count = run(Payload::new("it_aggregate", Method::Count).filter_eq("kind", json!("in"))).await;
    assert_eq!(count.data, json!(2));

    let sum = Payload::new("it_aggregate", Method::Sum)
        .filter_eq("kind", json!("in"))
        .field("amount");
    let first = run(sum.clone()).await;
    assert_eq!(first.data, json!(15.5));
    // Summing is read-only, so repeating it changes nothing.
    assert_eq!(run(sum).await.data, first.data);

    let missing_field = run(Payload::new("it_aggregate", Method::Sum)).await;
    assert!(!missing_field.status);
}

#[tokio::test]
async fn field_write_hooks_transform_and_visibility_flags_hide() {
    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_visibility", db.clone())
        .field(
            "password",
            Field::new(types::text()).only_server().on_write(hook(|cx: &mut Context| {
                let field = cx.payload.options.field.clone().unwrap_or_default();
                if let Some(body) = cx.body_object_mut() {
                    if let Some(raw) = body.get(&field).and_then(|v| v.as_str()) {
                        let hashed = format!("#{}", raw.to_uppercase());
                        body.insert(field, json!(hashed));
                    }
                }
                Ok(true)
            })),
        )
        .field("password_confirmation", Field::new(types::text()).only_client())
        .field("email", Field::new(types::text()))
        .expose(Method::Create)
        .expose(Method::Read)
        .build()
        .unwrap();

    let created = run(Payload::new("it_visibility", Method::Create).body(json!({
        "email": "a@x.com",
        "password": "hunter2",
        "password_confirmation": "hunter2"
    })))
    .await;

    assert!(created.status);
    // only_server is redacted from the response.
    assert!(created.data.get("password").is_none());

    // only_client never reached storage; the write hook's transform did.
    let mut probe = Operation::new(Method::Read);
    probe.filter.insert("email".into(), FilterField::default().eq(json!("a@x.com")));
    let model = fookie::orm::registry::get("it_visibility").unwrap();
    match db.modify(&model, probe).await.unwrap() {
        OperationResult::Rows(rows) => {
            assert_eq!(rows[0]["password"], json!("#HUNTER2"));
            assert!(rows[0].get("password_confirmation").is_none());
        }
        other => panic!("expected rows, got {:?}", other),
    }

    // Reads redact too.
    let read = run(Payload::new("it_visibility", Method::Read)).await;
    assert!(read.data[0].get("password").is_none());
    assert_eq!(read.data[0]["email"], json!("a@x.com"));
}

#[tokio::test]
async fn test_method_is_a_dry_run() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let db = Arc::new(RecordingDatabase::new(log));
    Model::builder("it_dry_run", db.clone())
        .field("email", Field::new(types::text()).required())
        .expose(Method::Test)
        .build()
        .unwrap();

    let ok = run(Payload::new("it_dry_run", Method::Test).body(json!({"email": "a@x.com"}))).await;
    assert!(ok.status);
    assert_eq!(ok.data, json!(true));

    let missing = run(Payload::new("it_dry_run", Method::Test).body(json!({}))).await;
    assert!(!missing.status);

    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn cancellation_and_timeout_abort_between_stages() {
    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_controls", db)
        .field("name", Field::new(types::text()))
        .expose(Method::Create)
        .build()
        .unwrap();

    let cancelled = Arc::new(AtomicBool::new(true));
    let response = run_with(
        Payload::new("it_controls", Method::Create).body(json!({"name": "x"})),
        RunOptions {
            cancel: Some(cancelled),
            ..Default::default()
        },
    )
    .await;
    assert!(!response.status);
    assert!(response.error.unwrap().contains("cancelled"));

    let response = run_with(
        Payload::new("it_controls", Method::Create).body(json!({"name": "x"})),
        RunOptions {
            timeout: Some(Duration::ZERO),
            ..Default::default()
        },
    )
    .await;
    assert!(!response.status);
    assert!(response.error.unwrap().starts_with("Timed out"));
}

#[tokio::test]
async fn self_enqueueing_payloads_stop_at_the_depth_guard() {
    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_recursive", db.clone())
        .field("n", Field::new(types::integer()))
        .bind(
            Method::Create,
            Stage::Effect,
            hook(|cx: &mut Context| {
                cx.state
                    .enqueue(Payload::new("it_recursive", Method::Create).body(json!({"n": 0})));
                Ok(true)
            }),
        )
        .build()
        .unwrap();

    let response = run_with(
        Payload::new("it_recursive", Method::Create).body(json!({"n": 0})),
        RunOptions {
            max_depth: Some(2),
            ..Default::default()
        },
    )
    .await;

    assert!(response.status);
    // Depths 0, 1 and 2 each created a row; depth 3 was dropped.
    assert_eq!(db.len("it_recursive"), 3);
}

#[tokio::test]
async fn configuration_errors_fail_fast() {
    let response = run(Payload::new("it_never_registered", Method::Read)).await;
    assert!(!response.status);
    assert!(response.error.unwrap().contains("unknown model"));

    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_read_only", db)
        .field("name", Field::new(types::text()))
        .expose(Method::Read)
        .build()
        .unwrap();

    let response = run(Payload::new("it_read_only", Method::Delete)).await;
    assert!(!response.status);
    assert!(response.error.unwrap().contains("not bound"));
}

#[tokio::test]
async fn async_pre_rule_hooks_gate_on_tokens() {
    struct RequireToken;

    #[async_trait]
    impl LifecycleFunction for RequireToken {
        async fn call(&self, cx: &mut Context) -> OrmResult<bool> {
            Ok(cx.payload.token.as_deref() == Some("valid"))
        }
    }

    let db = Arc::new(MemoryDatabase::new());
    Model::builder("it_sessions", db)
        .field("name", Field::new(types::text()))
        .bind(Method::Create, Stage::PreRule, Arc::new(RequireToken))
        .build()
        .unwrap();

    let body = json!({"name": "x"});
    let anonymous = run(Payload::new("it_sessions", Method::Create).body(body.clone())).await;
    assert!(!anonymous.status);

    let authed = run(Payload::new("it_sessions", Method::Create)
        .token("valid")
        .body(body))
    .await;
    assert!(authed.status);
}
