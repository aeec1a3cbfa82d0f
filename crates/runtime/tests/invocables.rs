//! Integration tests for events, functions, properties, and promises:
//! immediate dispatch only (deferred behavior lives in `deferred.rs`).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use apiary_core::{
	AccessMode, Future, InvokeMode, Invocable, ObjectPtr, Property, ReturnValue, Uid, Value,
};
use apiary_runtime::{classes, instance, make, make_function, read};

fn counter_handler(hits: &Arc<AtomicUsize>) -> ObjectPtr {
	let observed = hits.clone();
	make_function(move |_args| {
		observed.fetch_add(1, Ordering::SeqCst);
		ReturnValue::Success
	})
	.unwrap()
}

#[test]
fn test_function_primary_callback() {
	let hits = Arc::new(AtomicUsize::new(0));
	let observed = hits.clone();
	let fun = make_function(move |_args| {
		observed.fetch_add(1, Ordering::SeqCst);
		ReturnValue::Success
	})
	.unwrap();

	let rv = fun.as_invocable().unwrap().invoke(&[], InvokeMode::Immediate);
	assert_eq!(rv, ReturnValue::Success);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_function_receives_typed_args() {
	let seen = Arc::new(AtomicUsize::new(0));
	let observed = seen.clone();
	let fun = make_function(move |args| {
		let value = read::<u32>(&args[0].clone_value().unwrap()).unwrap();
		observed.store(value as usize, Ordering::SeqCst);
		ReturnValue::Success
	})
	.unwrap();

	let arg = make(314u32).unwrap();
	fun.as_invocable()
		.unwrap()
		.invoke(&[arg.as_value().unwrap()], InvokeMode::Immediate);
	assert_eq!(seen.load(Ordering::SeqCst), 314);
}

#[test]
fn test_function_without_target_or_handlers_is_noop() {
	let fun = instance().create(classes::FUNCTION).unwrap();
	let rv = fun.as_invocable().unwrap().invoke(&[], InvokeMode::Immediate);
	assert_eq!(rv, ReturnValue::NothingToDo);
}

#[test]
fn test_immediate_handlers_run_with_primary() {
	let primary_hits = Arc::new(AtomicUsize::new(0));
	let observed = primary_hits.clone();
	let fun = make_function(move |_| {
		observed.fetch_add(1, Ordering::SeqCst);
		ReturnValue::Success
	})
	.unwrap();

	let handler_hits = Arc::new(AtomicUsize::new(0));
	let a = counter_handler(&handler_hits);
	let b = counter_handler(&handler_hits);
	let invocable = fun.as_invocable().unwrap();
	assert_eq!(invocable.add_handler(&a, InvokeMode::Immediate), ReturnValue::Success);
	assert_eq!(invocable.add_handler(&b, InvokeMode::Immediate), ReturnValue::Success);

	let rv = invocable.invoke(&[], InvokeMode::Immediate);
	assert_eq!(rv, ReturnValue::Success);
	assert_eq!(primary_hits.load(Ordering::SeqCst), 1);
	assert_eq!(handler_hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_duplicate_handler_is_nothing_to_do() {
	let event = instance().create(classes::EVENT).unwrap();
	let hits = Arc::new(AtomicUsize::new(0));
	let handler = counter_handler(&hits);

	let invocable = event.as_invocable().unwrap();
	assert_eq!(invocable.add_handler(&handler, InvokeMode::Immediate), ReturnValue::Success);
	assert_eq!(
		invocable.add_handler(&handler, InvokeMode::Immediate),
		ReturnValue::NothingToDo
	);

	invocable.invoke(&[], InvokeMode::Immediate);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_event_handler_add_remove() {
	let event = instance().create(classes::EVENT).unwrap();
	let hits = Arc::new(AtomicUsize::new(0));
	let handler = counter_handler(&hits);

	let invocable = event.as_invocable().unwrap();
	invocable.add_handler(&handler, InvokeMode::Immediate);
	assert!(invocable.has_handlers());

	assert_eq!(invocable.invoke(&[], InvokeMode::Immediate), ReturnValue::Success);
	assert_eq!(hits.load(Ordering::SeqCst), 1);

	assert_eq!(invocable.remove_handler(&handler), ReturnValue::Success);
	assert!(!invocable.has_handlers());
	assert_eq!(invocable.remove_handler(&handler), ReturnValue::NothingToDo);

	assert_eq!(invocable.invoke(&[], InvokeMode::Immediate), ReturnValue::NothingToDo);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_event_refuses_primary_target() {
	let event = instance().create(classes::EVENT).unwrap();
	let rv = event
		.as_invocable()
		.unwrap()
		.set_callback(Arc::new(|_| ReturnValue::Success));
	assert_eq!(rv, ReturnValue::Fail);
}

#[test]
fn test_property_set_and_notify_once() {
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

	let five = make(5i32).unwrap();
	assert_eq!(
		property.set_value(five.as_value().unwrap(), InvokeMode::Immediate),
		ReturnValue::Success
	);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert_eq!(last.load(Ordering::SeqCst), 5);

	// Idempotent write: no state change, no event.
	assert_eq!(
		property.set_value(five.as_value().unwrap(), InvokeMode::Immediate),
		ReturnValue::NothingToDo
	);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_property_rejects_incompatible_type() {
	let prop = instance().create_property(Uid::of::<i32>(), None).unwrap();
	let wrong = make(1.0f32).unwrap();
	assert_eq!(
		prop.as_property()
			.unwrap()
			.set_value(wrong.as_value().unwrap(), InvokeMode::Immediate),
		ReturnValue::Fail
	);
}

#[test]
fn test_property_read_only_mode() {
	let prop = instance().create_property(Uid::of::<i32>(), None).unwrap();
	let property = prop.as_property().unwrap();
	property.set_access_mode(AccessMode::ReadOnly);

	let value = make(9i32).unwrap();
	assert_eq!(
		property.set_value(value.as_value().unwrap(), InvokeMode::Immediate),
		ReturnValue::ReadOnly
	);

	property.set_access_mode(AccessMode::ReadWrite);
	assert_eq!(
		property.set_value(value.as_value().unwrap(), InvokeMode::Immediate),
		ReturnValue::Success
	);
}

#[test]
fn test_promise_set_and_get() {
	let promise = instance().create(classes::PROMISE).unwrap();
	let future = promise.as_future().unwrap();
	assert!(!future.is_ready());
	assert!(future.try_result().is_none());

	let value = make(42i32).unwrap();
	assert_eq!(future.set_result(value.as_value().unwrap()), ReturnValue::Success);
	assert!(future.is_ready());
	assert_eq!(read::<i32>(&future.result()), Some(42));

	// First write wins.
	let other = make(7i32).unwrap();
	assert_eq!(future.set_result(other.as_value().unwrap()), ReturnValue::NothingToDo);
	assert_eq!(read::<i32>(&future.result()), Some(42));
}

#[test]
fn test_promise_blocking_result() {
	let promise = instance().create(classes::PROMISE).unwrap();
	let writer = promise.clone();

	let thread = std::thread::spawn(move || {
		std::thread::sleep(std::time::Duration::from_millis(50));
		let value = make(99i32).unwrap();
		writer.as_future().unwrap().set_result(value.as_value().unwrap());
	});

	let result = promise.as_future().unwrap().result();
	assert_eq!(read::<i32>(&result), Some(99));
	thread.join().unwrap();
}

#[test]
fn test_promise_continuation_fires_on_set() {
	let promise = instance().create(classes::PROMISE).unwrap();
	let future = promise.as_future().unwrap();

	let hits = Arc::new(AtomicUsize::new(0));
	let handler = counter_handler(&hits);
	assert_eq!(future.then(&handler, InvokeMode::Immediate), ReturnValue::Success);
	assert_eq!(hits.load(Ordering::SeqCst), 0);

	let value = make(1i32).unwrap();
	future.set_result(value.as_value().unwrap());
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_promise_continuation_fires_when_already_ready() {
	let promise = instance().create(classes::PROMISE).unwrap();
	let future = promise.as_future().unwrap();

	let value = make(1i32).unwrap();
	future.set_result(value.as_value().unwrap());

	let hits = Arc::new(AtomicUsize::new(0));
	let handler = counter_handler(&hits);
	assert_eq!(future.then(&handler, InvokeMode::Immediate), ReturnValue::Success);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}
