//! Process-wide deferred-task queue.
//!
//! Every deferred invocation and deferred property write lands here as a
//! `(weak target, owned snapshot)` record. `update()` swaps the queue out
//! under the lock, then works through the captured batch only; tasks
//! queued while draining wait for the next tick. An expired weak target
//! silently drops its task; that is the designed cancellation path, not an
//! error.

use std::mem;
use std::sync::Arc;

use apiary_core::{InvokeMode, Invocable, Object, ObjectPtr, ReturnValue, Value, WeakObjectPtr};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::property::PropertyImpl;

/// One queued unit of deferred work.
pub enum DeferredTask {
	/// Invoke an event or function with a cloned argument snapshot. The
	/// snapshot is shared between all tasks spawned by one invocation.
	Invoke { target: WeakObjectPtr, args: Arc<[ObjectPtr]> },

	/// Apply a property write. Writes to the same property coalesce within
	/// one drain: values are applied in queue order and the change event
	/// fires at most once, after all writes, with the final value.
	PropertyWrite { target: WeakObjectPtr, value: ObjectPtr },
}

impl DeferredTask {
	pub fn invoke(target: WeakObjectPtr, args: Arc<[ObjectPtr]>) -> DeferredTask {
		DeferredTask::Invoke { target, args }
	}

	pub fn property_write(target: WeakObjectPtr, value: ObjectPtr) -> DeferredTask {
		DeferredTask::PropertyWrite { target, value }
	}
}

#[derive(Default)]
pub(crate) struct DeferredQueue {
	tasks: Mutex<Vec<DeferredTask>>,
}

impl DeferredQueue {
	pub(crate) fn enqueue<I: IntoIterator<Item = DeferredTask>>(&self, tasks: I) {
		self.tasks.lock().extend(tasks);
	}

	pub(crate) fn pending(&self) -> usize {
		self.tasks.lock().len()
	}

	/// Drains the captured batch in FIFO order. Single-threaded by
	/// contract; the caller serializes `update()`.
	pub(crate) fn drain(&self) {
		let batch = mem::take(&mut *self.tasks.lock());
		if batch.is_empty() {
			return;
		}
		tracing::trace!(tasks = batch.len(), "deferred.drain");

		// Properties whose value actually changed; notified once after the
		// whole batch has been applied.
		let mut dirty: Vec<ObjectPtr> = Vec::new();

		for task in batch {
			match task {
				DeferredTask::PropertyWrite { target, value } => {
					let Some(obj) = target.upgrade() else {
						tracing::trace!("deferred.drop_expired");
						continue;
					};
					let Some(v) = value.as_value() else { continue };
					let applied = match obj.as_any().downcast_ref::<PropertyImpl>() {
						Some(prop) => prop.apply_silent(v),
						None => continue,
					};
					if applied == ReturnValue::Success && !dirty.iter().any(|d| d.ptr_eq(&obj)) {
						dirty.push(obj);
					}
				}
				DeferredTask::Invoke { target, args } => {
					let Some(obj) = target.upgrade() else {
						tracing::trace!("deferred.drop_expired");
						continue;
					};
					let views: SmallVec<[&dyn Value; 4]> =
						args.iter().filter_map(|a| a.as_value()).collect();
					if let Some(invocable) = obj.as_invocable() {
						invocable.invoke(&views, InvokeMode::Immediate);
					}
				}
			}
		}

		for prop in dirty {
			if let Some(p) = prop.as_any().downcast_ref::<PropertyImpl>() {
				p.fire_changed();
			}
		}
	}
}
