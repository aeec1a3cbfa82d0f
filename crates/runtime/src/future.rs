//! The promise class: a write-once result with continuations.
//!
//! A continuation is just a handler on the promise's internal event: a
//! handle-plus-args record, not a language-level coroutine. Continuations
//! added after completion fire immediately (or queue, when deferred).

use std::sync::Arc;
use std::sync::OnceLock;

use apiary_core::{
	Construct, Facet, Future, InvokeMode, Invocable, Object, ObjectCore, ObjectPtr, ReturnValue,
	Uid, Value, iface,
};
use parking_lot::{Condvar, Mutex};

use crate::scheduler::DeferredTask;
use crate::{classes, instance};

pub struct PromiseImpl {
	core: ObjectCore,
	result: Mutex<Option<ObjectPtr>>,
	ready: Condvar,
	on_complete: OnceLock<ObjectPtr>,
}

impl PromiseImpl {
	fn event_handle(&self) -> Option<ObjectPtr> {
		if let Some(event) = self.on_complete.get() {
			return Some(event.clone());
		}
		let created = instance().create(classes::EVENT)?;
		let _ = self.on_complete.set(created);
		self.on_complete.get().cloned()
	}
}

impl Construct for PromiseImpl {
	const CLASS_NAME: &'static str = "apiary.promise";

	fn construct(core: ObjectCore) -> PromiseImpl {
		PromiseImpl {
			core,
			result: Mutex::new(None),
			ready: Condvar::new(),
			on_complete: OnceLock::new(),
		}
	}
}

impl Object for PromiseImpl {
	fn class_uid(&self) -> Uid {
		Self::CLASS_UID
	}

	fn core(&self) -> &ObjectCore {
		&self.core
	}

	fn query(&self, uid: Uid) -> Option<Facet<'_>> {
		match uid {
			iface::FUTURE => Some(Facet::Future(self)),
			_ => None,
		}
	}

	fn as_any(&self) -> &dyn std::any::Any {
		self
	}
}

impl Future for PromiseImpl {
	fn is_ready(&self) -> bool {
		self.result.lock().is_some()
	}

	fn try_result(&self) -> Option<ObjectPtr> {
		self.result.lock().clone()
	}

	fn result(&self) -> ObjectPtr {
		let mut guard = self.result.lock();
		loop {
			if let Some(value) = guard.as_ref() {
				return value.clone();
			}
			self.ready.wait(&mut guard);
		}
	}

	fn set_result(&self, value: &dyn Value) -> ReturnValue {
		let Some(snapshot) = value.clone_value() else {
			return ReturnValue::Fail;
		};
		{
			let mut guard = self.result.lock();
			if guard.is_some() {
				return ReturnValue::NothingToDo;
			}
			*guard = Some(snapshot.clone());
			self.ready.notify_all();
		}
		// Continuations fire after the result is visible to waiters.
		if let Some(event) = self.on_complete.get()
			&& let Some(invocable) = event.as_invocable()
			&& let Some(v) = snapshot.as_value()
		{
			invocable.invoke(&[v], InvokeMode::Immediate);
		}
		ReturnValue::Success
	}

	fn then(&self, handler: &ObjectPtr, mode: InvokeMode) -> ReturnValue {
		if handler.as_invocable().is_none() {
			return ReturnValue::InvalidArgument;
		}

		// The result lock is held across handler registration so a racing
		// set_result either sees the handler or we see the result.
		let guard = self.result.lock();
		match guard.as_ref() {
			Some(value) => {
				let value = value.clone();
				drop(guard);
				match mode {
					InvokeMode::Immediate => {
						let Some(invocable) = handler.as_invocable() else {
							return ReturnValue::InvalidArgument;
						};
						let Some(v) = value.as_value() else {
							return ReturnValue::Fail;
						};
						invocable.invoke(&[v], InvokeMode::Immediate);
					}
					InvokeMode::Deferred => {
						let args: Arc<[ObjectPtr]> = Arc::from(vec![value]);
						instance()
							.queue_deferred_tasks([DeferredTask::invoke(handler.downgrade(), args)]);
					}
				}
				ReturnValue::Success
			}
			None => {
				let Some(event) = self.event_handle() else {
					return ReturnValue::Fail;
				};
				let Some(invocable) = event.as_invocable() else {
					return ReturnValue::Fail;
				};
				invocable.add_handler(handler, mode)
			}
		}
	}
}
