//! Integration tests for the deferred-task scheduler.
//!
//! Every test here drains the process-wide queue, so they serialize on one
//! mutex: `update()` is single-threaded by contract, and a concurrent
//! test's drain would otherwise swallow this test's tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use apiary_core::{Future, InvokeMode, Invocable, ObjectPtr, Property, ReturnValue, Uid, Value};
use apiary_runtime::{classes, instance, make, make_function, read};

static UPDATE_LOCK: Mutex<()> = Mutex::new(());

fn serialize() -> MutexGuard<'static, ()> {
	UPDATE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn counting_handler(hits: &Arc<AtomicUsize>) -> ObjectPtr {
	let observed = hits.clone();
	make_function(move |_args| {
		observed.fetch_add(1, Ordering::SeqCst);
		ReturnValue::Success
	})
	.unwrap()
}

#[test]
fn test_deferred_invoke_runs_on_update() {
	let _guard = serialize();

	let hits = Arc::new(AtomicUsize::new(0));
	let fun = counting_handler(&hits);

	let rv = fun.as_invocable().unwrap().invoke(&[], InvokeMode::Deferred);
	assert_eq!(rv, ReturnValue::Success);
	assert_eq!(hits.load(Ordering::SeqCst), 0);

	instance().update();
	assert_eq!(hits.load(Ordering::SeqCst), 1);

	// The batch was consumed; a second tick runs nothing.
	instance().update();
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_deferred_handler_suffix() {
	let _guard = serialize();

	let primary_hits = Arc::new(AtomicUsize::new(0));
	let observed = primary_hits.clone();
	let fun = make_function(move |_| {
		observed.fetch_add(1, Ordering::SeqCst);
		ReturnValue::Success
	})
	.unwrap();

	let immediate_hits = Arc::new(AtomicUsize::new(0));
	let deferred_hits = Arc::new(AtomicUsize::new(0));
	let a = counting_handler(&immediate_hits);
	let b = counting_handler(&immediate_hits);
	let d = counting_handler(&deferred_hits);

	let invocable = fun.as_invocable().unwrap();
	invocable.add_handler(&a, InvokeMode::Immediate);
	invocable.add_handler(&b, InvokeMode::Immediate);
	invocable.add_handler(&d, InvokeMode::Deferred);

	let rv = invocable.invoke(&[], InvokeMode::Immediate);
	assert_eq!(rv, ReturnValue::Success);
	assert_eq!(primary_hits.load(Ordering::SeqCst), 1);
	assert_eq!(immediate_hits.load(Ordering::SeqCst), 2);
	assert_eq!(deferred_hits.load(Ordering::SeqCst), 0);

	instance().update();
	assert_eq!(deferred_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_deferred_writes_coalesce() {
	let _guard = serialize();

	let prop = instance().create_property(Uid::of::<i32>(), None).unwrap();
	let property = prop.as_property().unwrap();

	let hits = Arc::new(AtomicUsize::new(0));
	let last = Arc::new(AtomicUsize::new(0));
	let observed_hits = hits.clone();
	let observed_last = last.clone();
	let handler = make_function(move |args| {
		observed_hits.fetch_add(1, Ordering::SeqCst);
		if let Some(value) = args.first().and_then(|a| a.clone_value())
			&& let Some(v) = read::<i32>(&value)
		{
			observed_last.store(v as usize, Ordering::SeqCst);
		}
		ReturnValue::Success
	})
	.unwrap();
	let event = property.on_changed().unwrap();
	event
		.as_invocable()
		.unwrap()
		.add_handler(&handler, InvokeMode::Immediate);

	for v in [1i32, 2, 3] {
		let value = make(v).unwrap();
		assert_eq!(
			property.set_value(value.as_value().unwrap(), InvokeMode::Deferred),
			ReturnValue::Success
		);
	}
	assert_eq!(hits.load(Ordering::SeqCst), 0);

	instance().update();

	// All writes applied, final value visible, one notification.
	let backing = property.value().unwrap();
	assert_eq!(read::<i32>(&backing), Some(3));
	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert_eq!(last.load(Ordering::SeqCst), 3);
}

#[test]
fn test_deferred_write_to_dropped_property_is_skipped() {
	let _guard = serialize();

	let prop = instance().create_property(Uid::of::<i32>(), None).unwrap();
	let value = make(42i32).unwrap();
	assert_eq!(
		prop.as_property()
			.unwrap()
			.set_value(value.as_value().unwrap(), InvokeMode::Deferred),
		ReturnValue::Success
	);

	drop(prop);
	// The queued task's weak target expired; the drain must skip it.
	instance().update();
}

#[test]
fn test_tasks_queued_during_update_wait_for_next_tick() {
	let _guard = serialize();

	let inner_hits = Arc::new(AtomicUsize::new(0));
	let inner = counting_handler(&inner_hits);

	let outer_hits = Arc::new(AtomicUsize::new(0));
	let observed = outer_hits.clone();
	let inner_for_outer = inner.clone();
	let outer = make_function(move |_| {
		observed.fetch_add(1, Ordering::SeqCst);
		inner_for_outer
			.as_invocable()
			.unwrap()
			.invoke(&[], InvokeMode::Deferred);
		ReturnValue::Success
	})
	.unwrap();

	outer.as_invocable().unwrap().invoke(&[], InvokeMode::Deferred);

	instance().update();
	assert_eq!(outer_hits.load(Ordering::SeqCst), 1);
	assert_eq!(inner_hits.load(Ordering::SeqCst), 0);

	instance().update();
	assert_eq!(inner_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_deferred_args_snapshot_is_isolated() {
	let _guard = serialize();

	let seen = Arc::new(AtomicUsize::new(0));
	let observed = seen.clone();
	let fun = make_function(move |args| {
		if let Some(value) = args.first().and_then(|a| a.clone_value())
			&& let Some(v) = read::<u32>(&value)
		{
			observed.store(v as usize, Ordering::SeqCst);
		}
		ReturnValue::Success
	})
	.unwrap();

	let arg = make(10u32).unwrap();
	fun.as_invocable()
		.unwrap()
		.invoke(&[arg.as_value().unwrap()], InvokeMode::Deferred);

	// Mutating the caller's cell after the call must not affect the queued
	// snapshot.
	apiary_runtime::set(arg.as_value().unwrap(), 77u32);

	instance().update();
	assert_eq!(seen.load(Ordering::SeqCst), 10);
}

#[test]
fn test_deferred_continuation_runs_on_update() {
	let _guard = serialize();

	let promise = instance().create(classes::PROMISE).unwrap();
	let future = promise.as_future().unwrap();

	let hits = Arc::new(AtomicUsize::new(0));
	let handler = counting_handler(&hits);
	future.then(&handler, InvokeMode::Deferred);

	let value = make(5i32).unwrap();
	future.set_result(value.as_value().unwrap());
	assert_eq!(hits.load(Ordering::SeqCst), 0);

	instance().update();
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}
