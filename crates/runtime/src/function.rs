//! The function class: one primary target plus a handler list.

use std::sync::Arc;

use apiary_core::{
	Args, Callback, Construct, Facet, InvokeMode, Invocable, Object, ObjectCore, ObjectPtr,
	ReturnValue, Uid, iface,
};
use parking_lot::RwLock;

use crate::invocable::{HandlerList, clone_args, invoke_handlers};
use crate::scheduler::DeferredTask;
use crate::instance;

/// Creates a function object wired to `callback` as its primary target.
pub fn make_function(
	callback: impl Fn(Args<'_>) -> ReturnValue + Send + Sync + 'static,
) -> Option<ObjectPtr> {
	let handle = instance().create(crate::classes::FUNCTION)?;
	handle.as_invocable()?.set_callback(Arc::new(callback));
	Some(handle)
}

/// Multicast dispatch point with a primary target.
pub struct FunctionImpl {
	core: ObjectCore,
	primary: RwLock<Option<Callback>>,
	handlers: HandlerList,
}

impl FunctionImpl {
	fn invoke_now(&self, args: Args<'_>) -> ReturnValue {
		let primary = self.primary.read().clone();
		let has_primary = primary.is_some();
		let mut result = ReturnValue::NothingToDo;
		if let Some(callback) = primary {
			result = callback(args);
		}

		let immediates = self.handlers.immediate_snapshot();
		let ran = invoke_handlers(&immediates, args);

		let deferred = self.handlers.deferred_snapshot();
		if !deferred.is_empty() {
			match clone_args(args) {
				Some(snapshot) => {
					let tasks: Vec<_> = deferred
						.iter()
						.map(|h| DeferredTask::invoke(h.downgrade(), snapshot.clone()))
						.collect();
					instance().queue_deferred_tasks(tasks);
				}
				None => {
					tracing::warn!("deferred handlers skipped: argument snapshot failed");
				}
			}
		}

		if has_primary {
			result
		} else if ran || !deferred.is_empty() {
			ReturnValue::Success
		} else {
			ReturnValue::NothingToDo
		}
	}

	fn invoke_later(&self, args: Args<'_>) -> ReturnValue {
		let Some(weak) = self.core.self_weak().cloned() else {
			return ReturnValue::Fail;
		};
		let Some(snapshot) = clone_args(args) else {
			tracing::warn!("deferred invoke dropped: argument snapshot failed");
			return ReturnValue::Fail;
		};
		instance().queue_deferred_tasks([DeferredTask::invoke(weak, snapshot)]);
		ReturnValue::Success
	}
}

impl Construct for FunctionImpl {
	const CLASS_NAME: &'static str = "apiary.function";

	fn construct(core: ObjectCore) -> FunctionImpl {
		FunctionImpl { core, primary: RwLock::new(None), handlers: HandlerList::new() }
	}
}

impl Object for FunctionImpl {
	fn class_uid(&self) -> Uid {
		Self::CLASS_UID
	}

	fn core(&self) -> &ObjectCore {
		&self.core
	}

	fn query(&self, uid: Uid) -> Option<Facet<'_>> {
		match uid {
			iface::FUNCTION => Some(Facet::Function(self)),
			_ => None,
		}
	}

	fn as_any(&self) -> &dyn std::any::Any {
		self
	}
}

impl Invocable for FunctionImpl {
	fn invoke(&self, args: Args<'_>, mode: InvokeMode) -> ReturnValue {
		match mode {
			InvokeMode::Immediate => self.invoke_now(args),
			InvokeMode::Deferred => self.invoke_later(args),
		}
	}

	fn add_handler(&self, handler: &ObjectPtr, mode: InvokeMode) -> ReturnValue {
		self.handlers.add(handler, mode)
	}

	fn remove_handler(&self, handler: &ObjectPtr) -> ReturnValue {
		self.handlers.remove(handler)
	}

	fn has_handlers(&self) -> bool {
		self.handlers.has_any()
	}

	fn set_callback(&self, callback: Callback) -> ReturnValue {
		*self.primary.write() = Some(callback);
		ReturnValue::Success
	}
}
