//! The lifecycle dispatcher
//!
//! [`run`] drives one payload through its model's bound pipeline:
//! preRule → modify → role → rule → accept/reject sub-pipelines →
//! field-constraint validation → per-field write hooks → filter →
//! one adapter call → response assembly and per-field read hooks →
//! effects → the todo queue. Stage functions run sequentially in binding
//! order; every invocation is timed into the run metrics.

use crate::database::{Operation, OperationResult};
use crate::error::{OrmError, OrmResult};
use crate::filter::FilterField;
use crate::lifecycle::{Context, LifecycleHook, MethodBindings, Stage, SubPipeline};
use crate::model::Model;
use crate::payload::{Method, Payload, Response};
use crate::registry;
use crate::validation;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caller-side controls for one run and everything it cascades.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Aborts with a timeout error once exceeded; checked between stages
    /// and before the adapter call, never mid-operation.
    pub timeout: Option<Duration>,
    /// Cooperative cancellation flag, checked between stages.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Depth guard for payloads that enqueue further payloads.
    pub max_depth: Option<usize>,
}

const DEFAULT_MAX_DEPTH: usize = 8;

/// Dispatch one payload through its model's lifecycle pipeline.
pub async fn run(payload: Payload) -> Response {
    run_with(payload, RunOptions::default()).await
}

/// [`run`] with explicit timeout/cancellation/depth controls.
pub async fn run_with(payload: Payload, options: RunOptions) -> Response {
    dispatch(payload, &options, 0).await
}

fn dispatch<'a>(
    payload: Payload,
    options: &'a RunOptions,
    depth: usize,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send + 'a>> {
    Box::pin(async move {
        let started = Instant::now();
        let model = payload.model.clone();
        let method = payload.method;
        let mut cx = Context::new(payload);

        let response = match execute(&mut cx, options, started).await {
            Ok(()) => cx
                .payload
                .response
                .take()
                .unwrap_or_else(|| Response::success(Value::Bool(true))),
            Err(err) => Response::failure(err.to_string()),
        };

        cx.state.metrics.finish();
        tracing::debug!(
            %model,
            %method,
            status = response.status,
            stages = cx.state.metrics.lifecycle.len(),
            "dispatch complete"
        );

        // Already-queued follow-up payloads survive a failing parent; they
        // were enqueued before the failure and run independently, FIFO.
        while let Some(next) = cx.state.todo.pop_front() {
            let max_depth = options.max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
            if depth >= max_depth {
                tracing::warn!(
                    model = %next.model,
                    method = %next.method,
                    "dropping cascading payload: {}",
                    OrmError::DepthExceeded(max_depth)
                );
                continue;
            }
            let sub = dispatch(next, options, depth + 1).await;
            if !sub.status {
                tracing::warn!(error = ?sub.error, "cascading payload failed");
            }
        }

        response
    })
}

async fn execute(cx: &mut Context, options: &RunOptions, started: Instant) -> OrmResult<()> {
    let model = registry::get(&cx.payload.model).ok_or_else(|| {
        OrmError::Configuration(format!("unknown model '{}'", cx.payload.model))
    })?;
    let method = cx.payload.method;
    let bindings = model
        .bindings(method)
        .cloned()
        .ok_or_else(|| {
            OrmError::Configuration(format!(
                "method '{}' is not bound on model '{}'",
                method, model.name
            ))
        })?;

    if method == Method::Sum && cx.payload.options.field.is_none() {
        return Err(OrmError::Configuration(
            "sum requires options.field to name the summed field".into(),
        ));
    }

    checkpoint(options, started)?;
    if !run_stage(Stage::PreRule.name(), &bindings.pre_rule, cx).await? {
        return Err(OrmError::Precondition("rejected by preRule stage".into()));
    }

    checkpoint(options, started)?;
    if !run_stage(Stage::Modify.name(), &bindings.modify, cx).await? {
        return Err(OrmError::Validation("aborted by modify stage".into()));
    }

    if matches!(method, Method::Create | Method::Test) {
        apply_defaults(&model, cx);
    }
    if matches!(method, Method::Create | Method::Update | Method::Test) {
        apply_reactives(&model, cx);
    }

    checkpoint(options, started)?;
    if !run_stage(Stage::Role.name(), &bindings.role, cx).await? {
        return Err(OrmError::Forbidden("rejected by role stage".into()));
    }

    checkpoint(options, started)?;
    if !run_stage(Stage::Rule.name(), &bindings.rule, cx).await? {
        return Err(OrmError::Rule("rejected by rule stage".into()));
    }

    run_decision_pipelines(&bindings, cx).await?;

    if matches!(method, Method::Create | Method::Update | Method::Test) {
        validate_body(&model, cx, options, started).await?;
        run_field_hooks("write", &model, cx, |f| &f.write).await?;
    }

    checkpoint(options, started)?;
    if !run_stage(Stage::Filter.name(), &bindings.filter, cx).await? {
        return Err(OrmError::Validation("aborted by filter stage".into()));
    }

    if method == Method::Test {
        // A dry run: the payload would have been accepted. No adapter
        // call, no effects.
        cx.payload.response = Some(Response::success(Value::Bool(true)));
        return Ok(());
    }

    checkpoint(options, started)?;
    if let Some(custom) = model.methods.get(&method).cloned() {
        if !run_stage("method", std::slice::from_ref(&custom), cx).await? {
            return Err(OrmError::Rule(format!(
                "custom {} method rejected the payload",
                method
            )));
        }
        if cx.payload.response.is_none() {
            cx.payload.response = Some(Response::success(Value::Bool(true)));
        }
    } else {
        let cascades = if method == Method::Delete {
            collect_cascades(&model, cx).await?
        } else {
            Vec::new()
        };

        let operation = build_operation(&model, cx);
        let result = model.database.modify(&model, operation).await?;
        let data = redact(&model, result.into_value());
        cx.payload.response = Some(Response::success(data));

        for payload in cascades {
            cx.state.enqueue(payload);
        }
    }

    if matches!(method, Method::Read | Method::Count | Method::Sum) {
        run_field_hooks("read", &model, cx, |f| &f.read).await?;
    }

    run_effects(&bindings, cx).await;
    Ok(())
}

/// Run one ordered stage list. `Ok(false)` as soon as a hook declines;
/// every invocation lands in the metrics log under the stage name.
async fn run_stage(name: &str, hooks: &[LifecycleHook], cx: &mut Context) -> OrmResult<bool> {
    for hook in hooks {
        let started = Instant::now();
        let result = hook.call(cx).await;
        let elapsed = started.elapsed();
        cx.state.metrics.record(name, elapsed);
        tracing::debug!(
            stage = name,
            ms = elapsed.as_secs_f64() * 1000.0,
            "lifecycle function finished"
        );
        if !result? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Effects run after the committed operation; a failing effect is
/// reported, never rolled back, and later effects still run.
async fn run_effects(bindings: &MethodBindings, cx: &mut Context) {
    for hook in &bindings.effect {
        let started = Instant::now();
        let result = hook.call(cx).await;
        cx.state.metrics.record(Stage::Effect.name(), started.elapsed());
        match result {
            Ok(true) => {}
            Ok(false) => tracing::warn!("effect declined after commit"),
            Err(err) => tracing::warn!(error = %err, "effect failed after commit"),
        }
    }
}

/// Accept/reject sub-pipelines, keyed by the resolved body value of
/// `options.field`. An accept match runs its modify/rule sub-stages and
/// continues; a reject match aborts unless every sub-rule overrides.
async fn run_decision_pipelines(bindings: &MethodBindings, cx: &mut Context) -> OrmResult<()> {
    let key = match decision_key(&cx.payload) {
        Some(key) => key,
        None => return Ok(()),
    };

    if let Some(sub) = bindings.accept.get(&key).cloned() {
        run_sub_pipeline("accept", &sub, cx, &key).await?;
    }

    if let Some(sub) = bindings.reject.get(&key).cloned() {
        if !run_stage("reject.modify", &sub.modify, cx).await? {
            return Err(OrmError::Rule(format!("value '{}' rejected", key)));
        }
        let overridden =
            !sub.rule.is_empty() && run_stage("reject.rule", &sub.rule, cx).await?;
        if !overridden {
            return Err(OrmError::Rule(format!("value '{}' rejected", key)));
        }
    }
    Ok(())
}

async fn run_sub_pipeline(
    label: &str,
    sub: &SubPipeline,
    cx: &mut Context,
    key: &str,
) -> OrmResult<()> {
    if !run_stage(&format!("{}.modify", label), &sub.modify, cx).await? {
        return Err(OrmError::Validation(format!(
            "value '{}' aborted by {} modify sub-stage",
            key, label
        )));
    }
    if !run_stage(&format!("{}.rule", label), &sub.rule, cx).await? {
        return Err(OrmError::Rule(format!(
            "value '{}' rejected by {} rule sub-stage",
            key, label
        )));
    }
    Ok(())
}

fn decision_key(payload: &Payload) -> Option<String> {
    let field = payload.options.field.as_deref()?;
    let value = payload.body.as_ref()?.get(field)?;
    Some(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Fill missing create-body fields from `default`, then `selection`.
/// A body-less create starts from an empty object so a fully defaulted
/// schema still produces a row.
fn apply_defaults(model: &Model, cx: &mut Context) {
    if cx.payload.body.is_none() {
        cx.payload.body = Some(Value::Object(Map::new()));
    }
    let body = match cx.body_object_mut() {
        Some(body) => body,
        None => return,
    };
    // Borrow dance: collect the fills first, then apply.
    let mut fills: Vec<(String, Value)> = Vec::new();
    for (name, field) in &model.schema {
        if body.contains_key(name) {
            continue;
        }
        if let Some(default) = &field.default {
            fills.push((name.clone(), default.clone()));
        } else if let Some(pick) = &field.selection {
            fills.push((name.clone(), pick(model, name)));
        }
    }
    for (name, value) in fills {
        body.insert(name, value);
    }
}

/// Recompute declared derived-field edges for sources present in the body.
fn apply_reactives(model: &Model, cx: &mut Context) {
    let body = match cx.body_object_mut() {
        Some(body) => body,
        None => return,
    };
    for field in model.schema.values() {
        for edge in &field.reactives {
            if let Some(source) = body.get(&edge.from) {
                let derived = (edge.compute)(source);
                body.insert(edge.to.clone(), derived);
            }
        }
    }
}

async fn validate_body(
    model: &Model,
    cx: &mut Context,
    options: &RunOptions,
    started: Instant,
) -> OrmResult<()> {
    let method = cx.payload.method;
    let body = cx
        .payload
        .body
        .as_ref()
        .and_then(|b| b.as_object())
        .ok_or_else(|| OrmError::Validation("body must be a JSON object".into()))?;

    let partial = method == Method::Update;
    validation::check_fields(model, body, partial)?;

    // Uniqueness probes reach the adapter, so a dry run never makes them.
    if method != Method::Test {
        checkpoint(options, started)?;
        let exclude = if method == Method::Update {
            cx.payload.query.as_ref().map(|q| q.filter.clone())
        } else {
            None
        };
        let body = body.clone();
        validation::check_unique(model, &body, exclude.as_ref()).await?;
    }
    Ok(())
}

/// Run per-field read or write hooks under the metric name `kind`, with
/// `options.field` pointing at the current field for the hook's benefit.
async fn run_field_hooks<F>(
    kind: &str,
    model: &Model,
    cx: &mut Context,
    select: F,
) -> OrmResult<()>
where
    F: Fn(&crate::field::Field) -> &Vec<LifecycleHook>,
{
    let hooks: Vec<(String, Vec<LifecycleHook>)> = model
        .schema
        .iter()
        .filter(|(_, field)| !select(field).is_empty())
        .map(|(name, field)| (name.clone(), select(field).clone()))
        .collect();
    if hooks.is_empty() {
        return Ok(());
    }

    let original = cx.payload.options.field.clone();
    for (name, field_hooks) in hooks {
        if kind == "write" {
            let in_body = cx
                .payload
                .body
                .as_ref()
                .and_then(|b| b.get(&name))
                .is_some();
            if !in_body {
                continue;
            }
        }
        cx.payload.options.field = Some(name);
        let passed = run_stage(kind, &field_hooks, cx).await;
        cx.payload.options.field = original.clone();
        if !passed? {
            return Err(OrmError::Validation(format!(
                "aborted by field {} hook",
                kind
            )));
        }
    }
    cx.payload.options.field = original;
    Ok(())
}

/// Assemble the finalized descriptor for the single adapter call.
/// `only_client` fields never leave the pipeline.
fn build_operation(model: &Model, cx: &Context) -> Operation {
    let mut operation = Operation::new(cx.payload.method);
    if let Some(query) = &cx.payload.query {
        operation.filter = query.filter.clone();
        operation.attributes = query.attributes.clone();
        operation.limit = query.limit;
        operation.offset = query.offset;
    }
    operation.field = cx.payload.options.field.clone();
    operation.body = cx.payload.body.as_ref().map(|body| match body.as_object() {
        Some(obj) => {
            let stripped: Map<String, Value> = obj
                .iter()
                .filter(|(name, _)| {
                    model.field(name).map(|f| !f.only_client).unwrap_or(true)
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(stripped)
        }
        None => body.clone(),
    });
    operation
}

/// Strip `only_server` fields from response rows.
fn redact(model: &Model, data: Value) -> Value {
    let hidden: Vec<&String> = model
        .schema
        .iter()
        .filter(|(_, field)| field.only_server)
        .map(|(name, _)| name)
        .collect();
    if hidden.is_empty() {
        return data;
    }

    let redact_row = |row: Value| -> Value {
        match row {
            Value::Object(mut obj) => {
                for name in &hidden {
                    obj.remove(*name);
                }
                Value::Object(obj)
            }
            other => other,
        }
    };

    match data {
        Value::Array(rows) => Value::Array(rows.into_iter().map(redact_row).collect()),
        other => redact_row(other),
    }
}

/// Before deleting, look up which rows are going away and which models
/// relate to this one, and turn the edges into follow-up payloads.
async fn collect_cascades(model: &Model, cx: &mut Context) -> OrmResult<Vec<Payload>> {
    let related: Vec<(String, String, bool)> = registry::snapshot()
        .iter()
        .flat_map(|other| {
            other
                .schema
                .iter()
                .filter(|(_, field)| {
                    field.relation.as_deref() == Some(model.name.as_str())
                        && (field.cascade_delete || field.reactive_delete)
                })
                .map(|(field_name, field)| {
                    (other.name.clone(), field_name.clone(), field.cascade_delete)
                })
                .collect::<Vec<_>>()
        })
        .collect();
    if related.is_empty() {
        return Ok(Vec::new());
    }

    let pk = model.database.pk().to_string();
    let mut probe = Operation::new(Method::Read);
    if let Some(query) = &cx.payload.query {
        probe.filter = query.filter.clone();
    }
    probe.attributes = vec![pk.clone()];
    let doomed = match model.database.modify(model, probe).await? {
        OperationResult::Rows(rows) => rows,
        other => {
            return Err(OrmError::Adapter(format!(
                "cascade probe expected rows, got {:?}",
                other
            )))
        }
    };

    let mut payloads = Vec::new();
    for row in &doomed {
        let Some(pk_value) = row.get(&pk) else { continue };
        for (other_model, field_name, cascades) in &related {
            let mut filter = HashMap::new();
            filter.insert(
                field_name.clone(),
                FilterField::default().eq(pk_value.clone()),
            );
            let mut payload = if *cascades {
                Payload::new(other_model.clone(), Method::Delete)
            } else {
                let mut patch = Map::new();
                patch.insert(field_name.clone(), Value::Null);
                Payload::new(other_model.clone(), Method::Update).body(Value::Object(patch))
            };
            payload.query = Some(crate::payload::Query {
                filter,
                ..Default::default()
            });
            payloads.push(payload);
        }
    }
    Ok(payloads)
}

fn checkpoint(options: &RunOptions, started: Instant) -> OrmResult<()> {
    if let Some(flag) = &options.cancel {
        if flag.load(Ordering::Relaxed) {
            return Err(OrmError::Cancelled);
        }
    }
    if let Some(timeout) = options.timeout {
        if started.elapsed() >= timeout {
            return Err(OrmError::Timeout(format!(
                "exceeded {}ms before the adapter call",
                timeout.as_millis()
            )));
        }
    }
    Ok(())
}
