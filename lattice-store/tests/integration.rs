//! Integration Tests for Reactive Stores
//!
//! These tests verify that models, computed properties, subscribers, and
//! effects work together across frames.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use lattice_store::{
    Class, Config, Error, Frame, Lifecycle, Model, Reactive, Selector, Subscriber, TaskQueue, Value,
};

fn timer() -> Class {
    Class::build("Timer")
        .value("seconds", 0)
        .value("hours", 0)
        .computed("minutes", |this| {
            let seconds = this.get("seconds")?.as_f64().unwrap_or(0.0);
            Ok((seconds / 60.0).floor())
        })
        .build()
}

fn values() -> Class {
    Class::build("TestValues")
        .value("value1", 1)
        .value("value2", 2)
        .value("value3", 3)
        .computed("value4", |this| {
            let value3 = this.get("value3")?.as_f64().unwrap_or(0.0);
            Ok(value3 + 1.0)
        })
        .build()
}

fn with_queue(class: &Class) -> (Model, TaskQueue) {
    let queue = TaskQueue::new();
    let model = class
        .create_with(Config::with_scheduler(queue.clone()))
        .unwrap();
    (model, queue)
}

fn frame_log(model: &Model, target: impl Into<Selector>) -> Arc<Mutex<Vec<Vec<String>>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();

    let _cancel = model
        .watch_squashed(target, move |keys| log_clone.lock().push(keys.to_vec()))
        .unwrap();

    log
}

fn keys(frame: &[&str]) -> Vec<String> {
    frame.iter().map(|k| k.to_string()).collect()
}

/// Setting a plain value recomputes its dependents into the same frame.
#[tokio::test]
async fn computed_joins_the_frame_of_its_input() {
    let model = timer().create().unwrap();

    // Read once so the computed is live.
    assert_eq!(model.get("minutes").unwrap(), Value::from(0));

    model.set("seconds", 60).unwrap();
    let frame = model.request_update().await.unwrap();

    assert_eq!(frame.keys(), ["seconds", "minutes"]);
    assert_eq!(model.get("minutes").unwrap(), Value::from(1));
}

/// Synchronous mutations to distinct keys arrive as one frame.
#[test]
fn simultaneous_mutations_share_one_frame() {
    let (model, queue) = with_queue(&values());
    let log = frame_log(&model, ["value1", "value2", "value3"]);

    model.set("value1", 10).unwrap();
    model.set("value2", 20).unwrap();
    model.set("value3", 30).unwrap();
    queue.run_until_idle();

    assert_eq!(*log.lock(), [keys(&["value1", "value2", "value3"])]);
}

/// Keys requested together through a probe still trigger independently.
#[test]
fn probe_keys_trigger_independently() {
    let (model, queue) = with_queue(&timer());
    let log = frame_log(&model, Selector::probe(|x| &x["seconds"]["hours"]));

    model.set("seconds", 30).unwrap();
    queue.run_until_idle();

    model.set("hours", 2).unwrap();
    queue.run_until_idle();

    assert_eq!(*log.lock(), [keys(&["seconds"]), keys(&["hours"])]);
}

/// `watch` reports the value and key of each changed key.
#[test]
fn watch_reports_every_key_of_the_frame() {
    let (model, queue) = with_queue(&timer());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_clone = seen.clone();
    let _cancel = model
        .watch(Selector::probe(|x| &x["minutes"]["seconds"]), move |value, key| {
            seen_clone.lock().push((key.to_string(), value.clone()));
        })
        .unwrap();

    model.set("seconds", 60).unwrap();
    queue.run_until_idle();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&("seconds".to_string(), Value::from(60))));
    assert!(seen.contains(&("minutes".to_string(), Value::from(1))));
}

/// An effect without explicit keys follows exactly what it read.
#[test]
fn effect_discovers_its_dependencies() {
    let (model, queue) = with_queue(&values());
    let runs = Arc::new(AtomicI32::new(0));

    let runs_clone = runs.clone();
    let _cancel = model
        .effect(move |this: &Subscriber| -> lattice_store::Result<()> {
            this.get("value1")?;
            this.get("value3")?;
            runs_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);

    model.set("value1", 2).unwrap();
    queue.run_until_idle();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    model.set("value2", 3).unwrap();
    queue.run_until_idle();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    model.set("value3", 4).unwrap();
    model.set("value1", 5).unwrap();
    queue.run_until_idle();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// An effect with explicit keys runs once per frame, not once per key.
#[test]
fn explicit_effect_runs_once_per_frame() {
    let (model, queue) = with_queue(&values());
    let runs = Arc::new(AtomicI32::new(0));

    let runs_clone = runs.clone();
    let _cancel = model
        .effect_on(["value1", "value2", "value3", "value4"], move |_: &Subscriber| {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    model.set("value1", 2).unwrap();
    queue.run_until_idle();

    model.set("value2", 3).unwrap();
    model.set("value3", 4).unwrap();
    queue.run_until_idle();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// A listener that mutates state during a flush starts the next frame.
#[test]
fn listener_mutation_opens_a_second_frame() {
    let (model, queue) = with_queue(&values());
    let log = frame_log(&model, ["value1", "value2"]);

    let target = model.clone();
    let _cancel = model
        .watch("value1", move |value, _| {
            let doubled = value.as_f64().unwrap_or(0.0) * 2.0;
            target.set("value2", doubled).unwrap();
        })
        .unwrap();

    model.set("value1", 5).unwrap();
    queue.run_until_idle();

    assert_eq!(*log.lock(), [keys(&["value1"]), keys(&["value2"])]);
    assert_eq!(model.get("value2").unwrap(), Value::from(10));
}

/// An effect that writes a key it does not read is not re-triggered by it.
#[test]
fn effect_mutation_opens_a_second_frame() {
    let (model, queue) = with_queue(&values());
    let runs = Arc::new(AtomicI32::new(0));

    let target = model.clone();
    let runs_clone = runs.clone();
    let _cancel = model
        .effect(move |this: &Subscriber| -> lattice_store::Result<()> {
            let value1 = this.get("value1")?.as_f64().unwrap_or(0.0);
            runs_clone.fetch_add(1, Ordering::SeqCst);
            target.set("value3", value1 + 1.0)
        })
        .unwrap();
    queue.run_until_idle();

    let log = frame_log(&model, ["value1", "value3"]);
    model.set("value1", 7).unwrap();
    queue.run_until_idle();

    assert_eq!(*log.lock(), [keys(&["value1"]), keys(&["value3"])]);
    assert_eq!(model.get("value3").unwrap(), Value::from(8));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// On a multi-thread runtime no worker flushes mid-turn; the frame waits
/// for an explicit flush and holds every mutation of the turn.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multi_thread_runtime_keeps_one_frame_per_turn() {
    let model = timer().create().unwrap();
    let log = frame_log(&model, ["seconds", "hours"]);

    model.set("seconds", 5).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(50));
    model.set("hours", 1).unwrap();
    assert!(log.lock().is_empty());

    lattice_store::flush();
    assert_eq!(*log.lock(), [keys(&["seconds", "hours"])]);
}

/// Returning anything but nothing or a cleanup from an effect is an error.
#[test]
fn effect_returning_a_value_fails_registration() {
    let (model, _queue) = with_queue(&values());

    let result = model.effect(|_: &Subscriber| Value::from("oops"));
    assert!(matches!(result, Err(Error::BadEffectCallback)));
}

/// `expect_update(true)` rejects while idle and resolves once batching.
#[tokio::test]
async fn expect_update_checks_pending_state() {
    let model = timer().create().unwrap();

    let early = model.expect_update(true).await;
    assert!(matches!(early, Err(Error::StrictUpdate { expected: true })));

    model.set("seconds", 30).unwrap();
    assert!(matches!(
        model.expect_update(false).await,
        Err(Error::StrictUpdate { expected: false })
    ));

    let frame = model.expect_update(true).await.unwrap();
    assert_eq!(frame.keys(), ["seconds"]);
}

/// `next` resolves with the first matching frame only.
#[tokio::test]
async fn next_resolves_with_matching_frame() {
    let model = timer().create().unwrap();
    let pending = model.next("seconds");

    model.set("hours", 1).unwrap();
    model.request_update().await.unwrap();

    model.set("seconds", 30).unwrap();
    let frame: Frame = pending.await.unwrap();

    assert_eq!(frame.keys(), ["seconds"]);
}

/// `once` handlers fire for one frame, then never again.
#[test]
fn once_fires_for_one_frame() {
    let (model, queue) = with_queue(&timer());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_clone = seen.clone();
    let _cancel = model
        .once(Selector::probe(|x| &x["seconds"]["minutes"]), move |value, key| {
            seen_clone.lock().push((key.to_string(), value.clone()));
        })
        .unwrap();

    model.set("seconds", 60).unwrap();
    queue.run_until_idle();

    model.set("seconds", 61).unwrap();
    queue.run_until_idle();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(!seen.contains(&("seconds".to_string(), Value::from(61))));
}

/// A computed recomputes only after every computed it reads.
#[test]
fn recompute_respects_priority() {
    let chain = Class::build("Chain")
        .value("a", 1)
        .computed("c", |this| {
            let a = this.get("a")?.as_f64().unwrap_or(0.0);
            let b = this.get("b")?.as_f64().unwrap_or(0.0);
            Ok(a + b)
        })
        .computed("b", |this| {
            let a = this.get("a")?.as_f64().unwrap_or(0.0);
            Ok(a * 2.0)
        })
        .build();

    let (model, queue) = with_queue(&chain);
    let log = frame_log(&model, ["a", "b", "c"]);

    assert_eq!(model.get("c").unwrap(), Value::from(3));
    assert_eq!(model.computed_info("b").unwrap().priority(), 1);
    assert_eq!(model.computed_info("c").unwrap().priority(), 2);

    model.set("a", 2).unwrap();
    queue.run_until_idle();

    assert_eq!(model.get("b").unwrap(), Value::from(4));
    assert_eq!(model.get("c").unwrap(), Value::from(6));
    assert_eq!(*log.lock(), [keys(&["a", "b", "c"])]);
}

/// A computed whose value does not change stays out of the frame.
#[test]
fn unchanged_computed_is_not_emitted() {
    let (model, queue) = with_queue(&timer());
    let log = frame_log(&model, ["seconds", "minutes"]);

    model.set("seconds", 30).unwrap();
    queue.run_until_idle();

    assert_eq!(*log.lock(), [keys(&["seconds"])]);
}

/// Listening to a computed that was never read evaluates it immediately.
#[test]
fn listening_forces_early_evaluation() {
    let (model, _queue) = with_queue(&timer());

    assert!(model.observer().peek("minutes").is_undefined());

    let _cancel = model.watch("minutes", |_, _| {}).unwrap();
    assert_eq!(model.observer().peek("minutes"), Value::from(0));
}

/// Listeners registered before start see the computed evaluated at start,
/// and keys emitted while inert are flushed as the first frame.
#[test]
fn inert_models_queue_until_started() {
    let queue = TaskQueue::new();
    let model = timer().instantiate(Config::with_scheduler(queue.clone()));
    let log = frame_log(&model, ["seconds", "minutes"]);

    model.update("seconds");
    assert!(queue.is_empty());

    model.lifecycle(Lifecycle::DidMount).unwrap();
    assert!(model.is_active());
    assert_eq!(model.observer().peek("minutes"), Value::from(0));

    queue.run_until_idle();
    assert_eq!(*log.lock(), [keys(&["seconds"])]);
}

/// Subscriptions follow nested models by identity.
#[test]
fn replaced_child_is_tracked_by_identity() {
    let inner = Class::build("Inner").value("value", 1).build();
    let outer = Class::build("Outer").child("inner", &inner).build();
    let (model, queue) = with_queue(&outer);

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let _cancel = model
        .effect(move |this: &Subscriber| -> lattice_store::Result<()> {
            if let Some(child) = this.child("inner")? {
                child.get("value")?;
            }
            runs_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let original = model.get("inner").unwrap().as_model().cloned().unwrap();

    original.set("value", 2).unwrap();
    queue.run_until_idle();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let replacement = inner.create_with(Config::with_scheduler(queue.clone())).unwrap();
    model.set("inner", replacement.clone()).unwrap();
    queue.run_until_idle();
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    original.set("value", 3).unwrap();
    queue.run_until_idle();
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    replacement.set("value", 4).unwrap();
    queue.run_until_idle();
    assert_eq!(runs.load(Ordering::SeqCst), 4);
}

/// A failing getter surfaces its error to whoever read it.
#[test]
fn compute_failure_reaches_the_reader() {
    let class = Class::build("Fragile")
        .value("divisor", 0)
        .computed("ratio", |this| {
            let divisor = this.get("divisor")?.as_f64().unwrap_or(0.0);
            if divisor == 0.0 {
                return Err(Error::failed("division by zero"));
            }
            Ok(1.0 / divisor)
        })
        .build();

    let (model, queue) = with_queue(&class);

    let error = model.get("ratio").unwrap_err();
    assert_eq!(error.to_string(), "division by zero");

    model.set("divisor", 4).unwrap();
    queue.run_until_idle();
    assert_eq!(model.get("ratio").unwrap(), Value::from(0.25));
}

/// Exported snapshots serialize nested models as plain objects.
#[test]
fn snapshots_serialize_to_json() {
    let inner = Class::build("Inner").value("value", 1).build();
    let outer = Class::build("Outer")
        .value("label", "outer")
        .child("inner", &inner)
        .build();
    let (model, _queue) = with_queue(&outer);

    let json = serde_json::to_value(model.export().unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "label": "outer", "inner": { "value": 1.0 } })
    );
}
