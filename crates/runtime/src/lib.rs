//! Process runtime.
//!
//! One [`Runtime`] per process, initialized on first access and never torn
//! down. It owns the UID-keyed factory registry and the deferred-task
//! queue, and registers the built-in classes in a fixed order at boot:
//! property, event, function, the primitive value cells, promise, then
//! every statically submitted [`FactoryReg`].

mod any;
mod event;
mod function;
mod future;
mod invocable;
mod metadata;
mod property;
mod registry;
mod scheduler;

use std::sync::LazyLock;

use apiary_core::{
	ClassFactory, ClassInfo, Object, ObjectFactory, ObjectPtr, ReturnValue, Uid, Value,
};

pub use any::{ValueCell, get, make, read, set};
pub use event::EventImpl;
pub use function::{FunctionImpl, make_function};
pub use future::PromiseImpl;
pub use metadata::MetadataContainer;
pub use property::PropertyImpl;
pub use registry::{FactoryReg, RegistryError};
pub use scheduler::DeferredTask;

/// Well-known class UIDs the runtime registers at boot.
pub mod classes {
	use apiary_core::{Construct, Uid};

	pub const PROPERTY: Uid = <crate::PropertyImpl as Construct>::CLASS_UID;
	pub const EVENT: Uid = <crate::EventImpl as Construct>::CLASS_UID;
	pub const FUNCTION: Uid = <crate::FunctionImpl as Construct>::CLASS_UID;
	pub const PROMISE: Uid = <crate::PromiseImpl as Construct>::CLASS_UID;
}

static PROPERTY_FACTORY: ClassFactory<PropertyImpl> = ClassFactory::new();
static EVENT_FACTORY: ClassFactory<EventImpl> = ClassFactory::new();
static FUNCTION_FACTORY: ClassFactory<FunctionImpl> = ClassFactory::new();
static PROMISE_FACTORY: ClassFactory<PromiseImpl> = ClassFactory::new();

static INSTANCE: LazyLock<Runtime> = LazyLock::new(Runtime::boot);

/// The process-wide runtime singleton.
pub fn instance() -> &'static Runtime {
	&INSTANCE
}

/// Type registry plus deferred-task scheduler.
pub struct Runtime {
	registry: registry::TypeRegistry,
	queue: scheduler::DeferredQueue,
}

impl Runtime {
	fn boot() -> Runtime {
		let runtime = Runtime {
			registry: registry::TypeRegistry::new(),
			queue: scheduler::DeferredQueue::default(),
		};

		// Fixed init order; the metadata and property paths depend on it.
		runtime.register_builtin(&PROPERTY_FACTORY);
		runtime.register_builtin(&EVENT_FACTORY);
		runtime.register_builtin(&FUNCTION_FACTORY);
		any::register_cells(&runtime);
		runtime.register_builtin(&PROMISE_FACTORY);

		for reg in inventory::iter::<FactoryReg> {
			if let Err(err) = runtime.register_type(reg.0) {
				tracing::warn!(%err, "static registration skipped");
			}
		}

		tracing::debug!(classes = runtime.registry.len(), "runtime.boot");
		runtime
	}

	pub(crate) fn register_builtin(&self, factory: &'static dyn ObjectFactory) {
		// A duplicate builtin is a broken boot invariant, not a recoverable
		// condition.
		self.register_type(factory).expect("builtin class registration");
	}

	/// Registers a factory under its class UID.
	pub fn register_type(
		&self,
		factory: &'static dyn ObjectFactory,
	) -> Result<(), RegistryError> {
		self.registry.register(factory)
	}

	/// Removes a factory. Existing instances are unaffected.
	pub fn unregister_type(&self, factory: &'static dyn ObjectFactory) -> ReturnValue {
		self.registry.unregister(factory)
	}

	/// Looks up the factory for a class UID.
	pub fn factory(&self, class_uid: Uid) -> Result<&'static dyn ObjectFactory, RegistryError> {
		self.registry.find(class_uid).ok_or(RegistryError::UnknownClass(class_uid))
	}

	/// Creates an object by class UID. A missing factory yields `None`;
	/// that is a queryable property of the registry, not an error.
	pub fn create(&self, class_uid: Uid) -> Option<ObjectPtr> {
		let Some(factory) = self.registry.find(class_uid) else {
			tracing::trace!(class = %class_uid, "registry.create_miss");
			return None;
		};
		let handle = factory.create()?;
		self.finish_construct(&handle, factory.class_info());
		Some(handle)
	}

	/// Post-construction fixup shared by the heap path and placement
	/// containers: seeds the self weak-reference and attaches the metadata
	/// container when the class declares members.
	pub fn finish_construct(&self, handle: &ObjectPtr, info: &ClassInfo) {
		handle.core().set_self(handle);
		if !info.members.is_empty() {
			let container = Box::new(MetadataContainer::new(info.members));
			if !handle.attach_metadata(container) {
				tracing::warn!(
					class = %info.uid,
					"class declares members but object has no metadata slot"
				);
			}
		}
		tracing::trace!(class = %info.uid, "registry.create");
	}

	/// Creates a value cell by type UID.
	pub fn create_any(&self, type_uid: Uid) -> Option<ObjectPtr> {
		self.create(type_uid)
	}

	/// Creates a property of the given value type. A compatible `initial`
	/// value is cloned into the backing cell; otherwise the backing cell is
	/// default-valued.
	pub fn create_property(
		&self,
		type_uid: Uid,
		initial: Option<&dyn Value>,
	) -> Option<ObjectPtr> {
		let handle = self.create(classes::PROPERTY)?;
		let backing = match initial {
			Some(value) if value.type_uid() == type_uid => value.clone_value()?,
			other => {
				if other.is_some() {
					tracing::warn!(
						wanted = %type_uid,
						"initial value of incompatible type ignored"
					);
				}
				self.create_any(type_uid)?
			}
		};
		let property = handle.as_any().downcast_ref::<PropertyImpl>()?;
		if !property.set_backing(backing) {
			return None;
		}
		Some(handle)
	}

	/// Member descriptors of a registered class, or `None`.
	pub fn get_class_info(&self, class_uid: Uid) -> Option<&'static ClassInfo> {
		Some(self.registry.find(class_uid)?.class_info())
	}

	/// Appends tasks to the process-wide deferred queue.
	pub fn queue_deferred_tasks<I: IntoIterator<Item = DeferredTask>>(&self, tasks: I) {
		self.queue.enqueue(tasks);
	}

	/// Number of queued deferred tasks.
	pub fn pending_deferred(&self) -> usize {
		self.queue.pending()
	}

	/// Drains the deferred queue in FIFO order. Single-threaded by
	/// contract: the caller serializes update ticks.
	pub fn update(&self) {
		self.queue.drain();
	}
}
