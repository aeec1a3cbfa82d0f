//! The property class: a backing value cell plus a change event.
//!
//! Writes short-circuit on equality: setting the current bit pattern is a
//! no-op and fires nothing. The change event is created on first access, so
//! a property nobody listens to never allocates one.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use apiary_core::{
	AccessMode, Construct, Facet, InvokeMode, Invocable, Object, ObjectCore, ObjectPtr, Property,
	ReturnValue, Uid, Value, iface,
};
use parking_lot::RwLock;

use crate::scheduler::DeferredTask;
use crate::{classes, instance};

pub struct PropertyImpl {
	core: ObjectCore,
	data: RwLock<Option<ObjectPtr>>,
	on_changed: OnceLock<ObjectPtr>,
	read_only: AtomicBool,
}

impl PropertyImpl {
	/// Installs the backing cell. Called once by the runtime right after
	/// construction; a second call is refused.
	pub(crate) fn set_backing(&self, any: ObjectPtr) -> bool {
		let mut data = self.data.write();
		if data.is_some() {
			return false;
		}
		*data = Some(any);
		true
	}

	/// Applies a write without firing the change event. The deferred drain
	/// uses this to coalesce notifications.
	pub(crate) fn apply_silent(&self, value: &dyn Value) -> ReturnValue {
		let Some(data) = self.data.read().clone() else {
			return ReturnValue::Fail;
		};
		let Some(cell) = data.as_value() else {
			return ReturnValue::Fail;
		};
		cell.copy_from(value)
	}

	/// Fires the change event with the backing cell as the single argument.
	/// A property whose event was never requested has no listeners and
	/// fires nothing.
	pub(crate) fn fire_changed(&self) {
		let Some(event) = self.on_changed.get() else {
			return;
		};
		let Some(data) = self.data.read().clone() else {
			return;
		};
		let Some(value) = data.as_value() else {
			return;
		};
		if let Some(invocable) = event.as_invocable() {
			invocable.invoke(&[value], InvokeMode::Immediate);
		}
	}

	fn event_handle(&self) -> Option<ObjectPtr> {
		if let Some(event) = self.on_changed.get() {
			return Some(event.clone());
		}
		let created = instance().create(classes::EVENT)?;
		// A racing creator may have won; the stored handle is canonical.
		let _ = self.on_changed.set(created);
		self.on_changed.get().cloned()
	}
}

impl Construct for PropertyImpl {
	const CLASS_NAME: &'static str = "apiary.property";

	fn construct(core: ObjectCore) -> PropertyImpl {
		PropertyImpl {
			core,
			data: RwLock::new(None),
			on_changed: OnceLock::new(),
			read_only: AtomicBool::new(false),
		}
	}
}

impl Object for PropertyImpl {
	fn class_uid(&self) -> Uid {
		Self::CLASS_UID
	}

	fn core(&self) -> &ObjectCore {
		&self.core
	}

	fn query(&self, uid: Uid) -> Option<Facet<'_>> {
		match uid {
			iface::PROPERTY => Some(Facet::Property(self)),
			_ => None,
		}
	}

	fn as_any(&self) -> &dyn std::any::Any {
		self
	}
}

impl Property for PropertyImpl {
	fn set_value(&self, value: &dyn Value, mode: InvokeMode) -> ReturnValue {
		if self.access_mode() == AccessMode::ReadOnly {
			return ReturnValue::ReadOnly;
		}
		match mode {
			InvokeMode::Immediate => {
				let rv = self.apply_silent(value);
				if rv == ReturnValue::Success {
					self.fire_changed();
				}
				rv
			}
			InvokeMode::Deferred => {
				let Some(weak) = self.core.self_weak().cloned() else {
					return ReturnValue::Fail;
				};
				let Some(snapshot) = value.clone_value() else {
					return ReturnValue::Fail;
				};
				instance().queue_deferred_tasks([DeferredTask::property_write(weak, snapshot)]);
				ReturnValue::Success
			}
		}
	}

	fn value(&self) -> Option<ObjectPtr> {
		self.data.read().clone()
	}

	fn on_changed(&self) -> Option<ObjectPtr> {
		self.event_handle()
	}

	fn access_mode(&self) -> AccessMode {
		if self.read_only.load(Ordering::Relaxed) {
			AccessMode::ReadOnly
		} else {
			AccessMode::ReadWrite
		}
	}

	fn set_access_mode(&self, mode: AccessMode) {
		self.read_only.store(mode == AccessMode::ReadOnly, Ordering::Relaxed);
	}
}
