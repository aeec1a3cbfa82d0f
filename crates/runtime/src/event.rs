//! The event class: a function without a primary target.

use apiary_core::{
	Args, Callback, Construct, Facet, InvokeMode, Invocable, Object, ObjectCore, ObjectPtr,
	ReturnValue, Uid, iface,
};

use crate::invocable::{HandlerList, clone_args, invoke_handlers};
use crate::scheduler::DeferredTask;
use crate::instance;

/// Multicast dispatch point with no primary target.
pub struct EventImpl {
	core: ObjectCore,
	handlers: HandlerList,
}

impl Construct for EventImpl {
	const CLASS_NAME: &'static str = "apiary.event";

	fn construct(core: ObjectCore) -> EventImpl {
		EventImpl { core, handlers: HandlerList::new() }
	}
}

impl Object for EventImpl {
	fn class_uid(&self) -> Uid {
		Self::CLASS_UID
	}

	fn core(&self) -> &ObjectCore {
		&self.core
	}

	fn query(&self, uid: Uid) -> Option<Facet<'_>> {
		match uid {
			iface::EVENT => Some(Facet::Event(self)),
			_ => None,
		}
	}

	fn as_any(&self) -> &dyn std::any::Any {
		self
	}
}

impl Invocable for EventImpl {
	fn invoke(&self, args: Args<'_>, mode: InvokeMode) -> ReturnValue {
		match mode {
			InvokeMode::Immediate => {
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
							tracing::warn!(
								"deferred handlers skipped: argument snapshot failed"
							);
						}
					}
				}

				if ran || !deferred.is_empty() {
					ReturnValue::Success
				} else {
					ReturnValue::NothingToDo
				}
			}
			InvokeMode::Deferred => {
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

	/// Events have no primary target.
	fn set_callback(&self, _callback: Callback) -> ReturnValue {
		ReturnValue::Fail
	}
}
