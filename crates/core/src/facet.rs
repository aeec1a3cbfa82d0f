//! The fixed capability set objects answer [`query`] over.
//!
//! Dynamic dispatch over UIDs replaces compile-time inheritance: an object
//! lists its facets at construction and `query(uid)` returns a borrowed
//! capability, or `None`, which is a queryable property of the object, not
//! an error. The set is closed; a [`Facet`] variant per capability keeps the
//! dispatch a plain enum match instead of a vtable tower.
//!
//! [`query`]: crate::object::Object::query

use std::alloc::Layout;
use std::sync::Arc;

use crate::descriptor::{MemberDesc, MemberKind, Notification};
use crate::handle::ObjectPtr;
use crate::object::Object;
use crate::types::{AccessMode, InvokeMode, ReturnValue};
use crate::uid::Uid;

/// Interface UIDs for the capability set. These are what `query` matches on.
pub mod iface {
	use crate::uid::Uid;

	pub const VALUE: Uid = Uid::from_name("apiary.iface.value");
	pub const PROPERTY: Uid = Uid::from_name("apiary.iface.property");
	pub const EVENT: Uid = Uid::from_name("apiary.iface.event");
	pub const FUNCTION: Uid = Uid::from_name("apiary.iface.function");
	pub const METADATA: Uid = Uid::from_name("apiary.iface.metadata");
	pub const HIVE: Uid = Uid::from_name("apiary.iface.hive");
	pub const RAW_HIVE: Uid = Uid::from_name("apiary.iface.raw_hive");
	pub const HIVE_STORE: Uid = Uid::from_name("apiary.iface.hive_store");
	pub const FUTURE: Uid = Uid::from_name("apiary.iface.future");
}

/// Borrowed argument list passed to invocables.
pub type Args<'a> = &'a [&'a dyn Value];

/// Primary target of a function.
pub type Callback = Arc<dyn Fn(Args<'_>) -> ReturnValue + Send + Sync>;

/// A borrowed capability returned by `query`.
pub enum Facet<'a> {
	Value(&'a dyn Value),
	Property(&'a dyn Property),
	Event(&'a dyn Invocable),
	Function(&'a dyn Invocable),
	Metadata(&'a dyn Metadata),
	Hive(&'a dyn Hive),
	RawHive(&'a dyn RawHive),
	HiveStore(&'a dyn HiveStore),
	Future(&'a dyn Future),
}

/// Type-erased, UID-tagged value cell.
///
/// Byte-level access succeeds iff the UID matches and the buffer length
/// equals the cell's data size; a mismatch fails without mutation.
pub trait Value: Send + Sync {
	/// UID of the stored type.
	fn type_uid(&self) -> Uid;

	/// UIDs this cell accepts. Compatibility is symmetric UID equality
	/// against any entry.
	fn compatible_types(&self) -> &[Uid];

	/// Byte size of the payload for `uid`, or 0 if incompatible.
	fn data_size(&self, uid: Uid) -> usize;

	/// Copies the payload into `dst`.
	fn get_data(&self, dst: &mut [u8], uid: Uid) -> ReturnValue;

	/// Replaces the payload from `src`. Writing the identical bit pattern
	/// returns [`ReturnValue::NothingToDo`].
	fn set_data(&self, src: &[u8], uid: Uid) -> ReturnValue;

	/// `set_data` sourced from another compatible cell.
	fn copy_from(&self, other: &dyn Value) -> ReturnValue;

	/// Creates a fresh cell of the same UID and value through the registry.
	fn clone_value(&self) -> Option<ObjectPtr>;
}

/// Value with change notification and an equality short-circuit on writes.
pub trait Property: Send + Sync {
	/// Writes the property. Deferred writes queue for the next `update()`
	/// and coalesce per property within one drain.
	fn set_value(&self, value: &dyn Value, mode: InvokeMode) -> ReturnValue;

	/// The backing value cell.
	fn value(&self) -> Option<ObjectPtr>;

	/// The change event, created on first access.
	fn on_changed(&self) -> Option<ObjectPtr>;

	fn access_mode(&self) -> AccessMode;

	fn set_access_mode(&self, mode: AccessMode);
}

/// Multicast dispatch point. Functions carry a primary target; events are
/// the degenerate case without one.
pub trait Invocable: Send + Sync {
	/// Invokes the primary target (if any) and the handler list.
	fn invoke(&self, args: Args<'_>, mode: InvokeMode) -> ReturnValue;

	/// Registers a handler. Identity is the handler's control block; a
	/// duplicate registration returns [`ReturnValue::NothingToDo`].
	fn add_handler(&self, handler: &ObjectPtr, mode: InvokeMode) -> ReturnValue;

	fn remove_handler(&self, handler: &ObjectPtr) -> ReturnValue;

	fn has_handlers(&self) -> bool;

	/// Installs the primary target. Events refuse this.
	fn set_callback(&self, callback: Callback) -> ReturnValue;
}

/// Per-instance member table: static descriptors plus lazily-created
/// property/event/function satellites.
pub trait Metadata: Send + Sync {
	/// The class's descriptor table, verbatim.
	fn static_metadata(&self) -> &'static [MemberDesc];

	/// Returns (creating on first access) the property satellite for `name`.
	fn property(&self, name: &str) -> Option<ObjectPtr>;

	/// Returns (creating on first access) the event satellite for `name`.
	fn event(&self, name: &str) -> Option<ObjectPtr>;

	/// Returns (creating on first access) the function satellite for `name`.
	fn function(&self, name: &str) -> Option<ObjectPtr>;

	/// Fires the named member's notification (property change).
	fn notify(&self, kind: MemberKind, name: &str, note: Notification) -> ReturnValue;
}

/// Paged object container with zombie and orphan lifecycles.
pub trait Hive: Send + Sync {
	/// Binds the hive to an element class. Must happen before `add`.
	fn init(&self, element_class: Uid) -> ReturnValue;

	/// UID of the element class, or [`Uid::NIL`] before `init`.
	fn element_class_uid(&self) -> Uid;

	/// Number of live (Active) objects. Lock-free.
	fn len(&self) -> usize;

	/// Lock-free emptiness check.
	fn is_empty(&self) -> bool;

	/// Places a new object into a slot and returns a strong handle. The
	/// hive itself keeps a second strong reference.
	fn add(&self) -> Option<ObjectPtr>;

	/// Removes an object from the hive. The object survives as a zombie
	/// while external strong references remain.
	fn remove(&self, object: &dyn Object) -> ReturnValue;

	/// True iff `object` occupies an Active slot of this hive.
	fn contains(&self, object: &dyn Object) -> bool;

	/// Visits every Active object under the shared lock; stops early when
	/// the visitor returns false. Mutating this hive from the visitor
	/// deadlocks.
	fn for_each(&self, visitor: &mut dyn FnMut(&dyn Object) -> bool);
}

/// Element drop routine for a raw hive slot.
pub type RawDropFn = unsafe fn(*mut u8);

/// Simplified hive: raw slots, no control blocks, no zombies.
pub trait RawHive: Send + Sync {
	/// Configures the slot layout and an optional per-slot drop routine.
	fn init_layout(&self, layout: Layout, drop_fn: Option<RawDropFn>) -> ReturnValue;

	/// Configures the slot layout from a registered class; `deallocate`
	/// runs the class's in-place destructor.
	fn init_class(&self, element_class: Uid) -> ReturnValue;

	/// Pops a slot off the freelist, growing by a page when needed.
	fn allocate(&self) -> Option<std::ptr::NonNull<u8>>;

	/// Runs the configured drop routine and returns the slot.
	///
	/// # Safety
	///
	/// `ptr` must be a pointer previously returned by `allocate` on this
	/// hive and not yet deallocated.
	unsafe fn deallocate(&self, ptr: std::ptr::NonNull<u8>) -> ReturnValue;

	fn len(&self) -> usize;

	fn is_empty(&self) -> bool;
}

/// One hive per element class, created on demand.
pub trait HiveStore: Send + Sync {
	fn hive_for(&self, element_class: Uid) -> Option<ObjectPtr>;
}

/// Write-once result with continuations.
pub trait Future: Send + Sync {
	fn is_ready(&self) -> bool;

	/// The result cell if already set.
	fn try_result(&self) -> Option<ObjectPtr>;

	/// Blocks until the result is set, then returns it.
	fn result(&self) -> ObjectPtr;

	/// Sets the result. The first write wins; later writes return
	/// [`ReturnValue::NothingToDo`].
	fn set_result(&self, value: &dyn Value) -> ReturnValue;

	/// Adds a continuation. If the result is already set, an immediate
	/// continuation fires right away and a deferred one queues.
	fn then(&self, handler: &ObjectPtr, mode: InvokeMode) -> ReturnValue;
}
