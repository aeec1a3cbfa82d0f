//! Handler-list machinery shared by events and functions.
//!
//! Handlers are invocable objects held by strong handle; identity is their
//! control block. The list keeps an immediate prefix and a deferred suffix
//! partitioned by `deferred_begin`. Invocation snapshots the relevant
//! partition under the lock and calls outside it, so a handler may add or
//! remove handlers without deadlocking.

use std::sync::Arc;

use apiary_core::{Args, InvokeMode, Invocable, ObjectPtr, ReturnValue, Value};
use parking_lot::Mutex;
use smallvec::SmallVec;

#[derive(Default)]
struct Handlers {
	list: SmallVec<[ObjectPtr; 2]>,
	deferred_begin: usize,
}

#[derive(Default)]
pub(crate) struct HandlerList {
	inner: Mutex<Handlers>,
}

impl HandlerList {
	pub(crate) fn new() -> HandlerList {
		HandlerList::default()
	}

	pub(crate) fn add(&self, handler: &ObjectPtr, mode: InvokeMode) -> ReturnValue {
		if handler.as_invocable().is_none() {
			return ReturnValue::InvalidArgument;
		}
		let mut h = self.inner.lock();
		if h.list.iter().any(|x| x.ptr_eq(handler)) {
			return ReturnValue::NothingToDo;
		}
		match mode {
			InvokeMode::Immediate => {
				let at = h.deferred_begin;
				h.list.insert(at, handler.clone());
				h.deferred_begin += 1;
			}
			InvokeMode::Deferred => h.list.push(handler.clone()),
		}
		ReturnValue::Success
	}

	pub(crate) fn remove(&self, handler: &ObjectPtr) -> ReturnValue {
		let mut h = self.inner.lock();
		let Some(pos) = h.list.iter().position(|x| x.ptr_eq(handler)) else {
			return ReturnValue::NothingToDo;
		};
		if pos < h.deferred_begin {
			h.deferred_begin -= 1;
		}
		h.list.remove(pos);
		ReturnValue::Success
	}

	pub(crate) fn has_any(&self) -> bool {
		!self.inner.lock().list.is_empty()
	}

	pub(crate) fn immediate_snapshot(&self) -> SmallVec<[ObjectPtr; 2]> {
		let h = self.inner.lock();
		h.list[..h.deferred_begin].iter().cloned().collect()
	}

	pub(crate) fn deferred_snapshot(&self) -> SmallVec<[ObjectPtr; 2]> {
		let h = self.inner.lock();
		h.list[h.deferred_begin..].iter().cloned().collect()
	}
}

/// Calls each handler synchronously; results are ignored. Returns whether
/// any handler was called.
pub(crate) fn invoke_handlers(handlers: &[ObjectPtr], args: Args<'_>) -> bool {
	let mut ran = false;
	for handler in handlers {
		if let Some(invocable) = handler.as_invocable() {
			invocable.invoke(args, InvokeMode::Immediate);
			ran = true;
		}
	}
	ran
}

/// Clones each argument once into an owned snapshot shared by all deferred
/// tasks spawned from this invocation. `None` if any argument cannot be
/// cloned (unregistered cell class).
pub(crate) fn clone_args(args: Args<'_>) -> Option<Arc<[ObjectPtr]>> {
	let mut snapshot = Vec::with_capacity(args.len());
	for arg in args {
		snapshot.push(arg.clone_value()?);
	}
	Some(snapshot.into())
}
