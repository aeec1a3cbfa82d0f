//! The object trait and the per-object header.
//!
//! Every object owns an [`ObjectCore`]: a stable back-pointer to its control
//! block plus the self weak-reference seeded once at construction. The
//! interface set an object answers through [`Object::query`] is fixed for
//! its entire lifetime.

use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::block::ControlBlock;
use crate::facet::{Facet, Hive, HiveStore, Invocable, Metadata, Property, RawHive, Value, iface};
use crate::handle::{ObjectPtr, WeakObjectPtr};
use crate::uid::Uid;

/// An entity addressable through UID-keyed facets.
pub trait Object: Send + Sync + 'static {
	/// UID of the class this object was created from.
	fn class_uid(&self) -> Uid;

	/// The object's header.
	fn core(&self) -> &ObjectCore;

	/// Returns the facet for `uid`, or `None` if this object does not
	/// expose it.
	fn query(&self, uid: Uid) -> Option<Facet<'_>>;

	/// Concrete-type downcast seam.
	fn as_any(&self) -> &dyn std::any::Any;

	/// Accepts the runtime metadata container built from the class's
	/// member descriptors. Objects without a metadata slot refuse it.
	fn attach_metadata(&self, metadata: Box<dyn Metadata>) -> bool {
		let _ = metadata;
		false
	}
}

impl dyn Object {
	pub fn as_value(&self) -> Option<&dyn Value> {
		match self.query(iface::VALUE)? {
			Facet::Value(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_property(&self) -> Option<&dyn Property> {
		match self.query(iface::PROPERTY)? {
			Facet::Property(p) => Some(p),
			_ => None,
		}
	}

	/// The invocable facet, whether the object is an event or a function.
	pub fn as_invocable(&self) -> Option<&dyn Invocable> {
		match self.query(iface::FUNCTION).or_else(|| self.query(iface::EVENT))? {
			Facet::Function(f) | Facet::Event(f) => Some(f),
			_ => None,
		}
	}

	pub fn as_metadata(&self) -> Option<&dyn Metadata> {
		match self.query(iface::METADATA)? {
			Facet::Metadata(m) => Some(m),
			_ => None,
		}
	}

	pub fn as_hive(&self) -> Option<&dyn Hive> {
		match self.query(iface::HIVE)? {
			Facet::Hive(h) => Some(h),
			_ => None,
		}
	}

	pub fn as_raw_hive(&self) -> Option<&dyn RawHive> {
		match self.query(iface::RAW_HIVE)? {
			Facet::RawHive(h) => Some(h),
			_ => None,
		}
	}

	pub fn as_hive_store(&self) -> Option<&dyn HiveStore> {
		match self.query(iface::HIVE_STORE)? {
			Facet::HiveStore(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_future(&self) -> Option<&dyn crate::facet::Future> {
		match self.query(iface::FUTURE)? {
			Facet::Future(f) => Some(f),
			_ => None,
		}
	}
}

/// Per-object header: control block back-pointer and self weak-reference.
pub struct ObjectCore {
	block: NonNull<ControlBlock>,
	self_weak: OnceLock<WeakObjectPtr>,
}

// The header is only reachable through the object, which is Send + Sync;
// the block pointer is stable for the object's lifetime.
unsafe impl Send for ObjectCore {}
unsafe impl Sync for ObjectCore {}

impl ObjectCore {
	/// Binds the header to its control block. Called by factories only.
	pub fn new(block: NonNull<ControlBlock>) -> ObjectCore {
		ObjectCore { block, self_weak: OnceLock::new() }
	}

	/// The object's control block.
	pub fn block(&self) -> &ControlBlock {
		unsafe { self.block.as_ref() }
	}

	/// Seeds the self weak-reference from the freshly constructed handle.
	/// Called exactly once by the runtime after construction; later calls
	/// are ignored.
	pub fn set_self(&self, handle: &ObjectPtr) {
		debug_assert!(
			std::ptr::eq(handle.block(), self.block()),
			"set_self with a foreign handle"
		);
		let _ = self.self_weak.set(handle.downgrade());
	}

	/// Upgrades the self weak-reference into a strong handle. `None` before
	/// `set_self` or while the object is being destroyed.
	pub fn self_object(&self) -> Option<ObjectPtr> {
		self.self_weak.get()?.upgrade()
	}

	/// Weak self-reference, if seeded.
	pub fn self_weak(&self) -> Option<&WeakObjectPtr> {
		self.self_weak.get()
	}
}

/// Write-once holder for the runtime metadata container.
///
/// Objects whose class declares members embed one of these and route both
/// [`Object::attach_metadata`] and the metadata facet through it.
#[derive(Default)]
pub struct MetaSlot(OnceLock<Box<dyn Metadata>>);

impl MetaSlot {
	pub fn new() -> MetaSlot {
		MetaSlot(OnceLock::new())
	}

	/// Stores the container; refuses a second attachment.
	pub fn attach(&self, metadata: Box<dyn Metadata>) -> bool {
		self.0.set(metadata).is_ok()
	}

	pub fn get(&self) -> Option<&dyn Metadata> {
		self.0.get().map(|m| m.as_ref())
	}
}
