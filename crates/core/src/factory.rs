//! Class factories: heap construction and placement construction.
//!
//! A factory is the unit of registration: it owns the class's [`ClassInfo`]
//! and knows how to build instances either on the heap (`create`) or into
//! caller-provided storage with a caller-prepared control block
//! (`construct_in_place`, the path containers use, so the object is born
//! with its final block and no post-construction swap is needed).

use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::block::ControlBlock;
use crate::block_pool;
use crate::descriptor::MemberDesc;
use crate::handle::ObjectPtr;
use crate::object::{Object, ObjectCore};
use crate::uid::Uid;

/// Static description of a registered class.
#[derive(Debug)]
pub struct ClassInfo {
	pub uid: Uid,
	pub name: &'static str,
	pub members: &'static [MemberDesc],
}

/// Builds instances of one class.
pub trait ObjectFactory: Send + Sync {
	fn class_info(&self) -> &ClassInfo;

	/// Heap-allocates a new instance with a pooled control block. The
	/// returned handle owns one strong reference.
	fn create(&self) -> Option<ObjectPtr>;

	/// Memory layout of one instance, for slot-based containers.
	fn slot_layout(&self) -> Layout;

	/// Placement-constructs an instance into `slot`, born with `block`.
	///
	/// # Safety
	///
	/// `slot` must be valid, writable, and satisfy [`Self::slot_layout`];
	/// `block` must stay valid for the object's lifetime and already count
	/// the strong reference the caller will adopt.
	unsafe fn construct_in_place(
		&self,
		slot: NonNull<u8>,
		block: NonNull<ControlBlock>,
	) -> NonNull<dyn Object>;

	/// Runs the in-place destructor of the instance at `slot`.
	///
	/// # Safety
	///
	/// `slot` must hold a live instance previously built by
	/// [`Self::construct_in_place`] on this factory.
	unsafe fn destroy_in_place(&self, slot: NonNull<u8>);
}

/// Implemented by concrete object types so [`ClassFactory`] can build them.
pub trait Construct: Object + Sized {
	/// Textual class name; the class UID is derived from it.
	const CLASS_NAME: &'static str;

	/// The class UID.
	const CLASS_UID: Uid = Uid::from_name(Self::CLASS_NAME);

	/// Static member descriptors, empty unless the class declares members.
	const MEMBERS: &'static [MemberDesc] = &[];

	/// Builds an instance around its header.
	fn construct(core: ObjectCore) -> Self;
}

/// The standard factory for a [`Construct`] type. Stateless; registered as
/// a `static`.
pub struct ClassFactory<T: Construct>(PhantomData<fn() -> T>);

impl<T: Construct> ClassFactory<T> {
	pub const INFO: ClassInfo =
		ClassInfo { uid: T::CLASS_UID, name: T::CLASS_NAME, members: T::MEMBERS };

	pub const fn new() -> ClassFactory<T> {
		ClassFactory(PhantomData)
	}
}

impl<T: Construct> Default for ClassFactory<T> {
	fn default() -> Self {
		ClassFactory::new()
	}
}

impl<T: Construct> ObjectFactory for ClassFactory<T> {
	fn class_info(&self) -> &ClassInfo {
		&Self::INFO
	}

	fn create(&self) -> Option<ObjectPtr> {
		let block = block_pool::alloc();
		let boxed = Box::new(T::construct(ObjectCore::new(block)));
		let obj: NonNull<dyn Object> = NonNull::from(Box::leak(boxed));
		unsafe { block.as_ref() }.publish_object(obj.as_ptr() as *mut u8 as usize);
		Some(unsafe { ObjectPtr::from_raw(obj, block) })
	}

	fn slot_layout(&self) -> Layout {
		Layout::new::<T>()
	}

	unsafe fn construct_in_place(
		&self,
		slot: NonNull<u8>,
		block: NonNull<ControlBlock>,
	) -> NonNull<dyn Object> {
		let slot = slot.cast::<T>();
		unsafe { slot.as_ptr().write(T::construct(ObjectCore::new(block))) };
		slot
	}

	unsafe fn destroy_in_place(&self, slot: NonNull<u8>) {
		unsafe { std::ptr::drop_in_place(slot.cast::<T>().as_ptr()) };
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::facet::Facet;

	struct Probe {
		core: ObjectCore,
	}

	impl Construct for Probe {
		const CLASS_NAME: &'static str = "apiary.test.probe";

		fn construct(core: ObjectCore) -> Probe {
			Probe { core }
		}
	}

	impl Object for Probe {
		fn class_uid(&self) -> Uid {
			Self::CLASS_UID
		}

		fn core(&self) -> &ObjectCore {
			&self.core
		}

		fn query(&self, _uid: Uid) -> Option<Facet<'_>> {
			None
		}

		fn as_any(&self) -> &dyn std::any::Any {
			self
		}
	}

	static PROBE_FACTORY: ClassFactory<Probe> = ClassFactory::new();

	#[test]
	fn test_create_and_release() {
		let handle = PROBE_FACTORY.create().unwrap();
		assert_eq!(handle.class_uid(), Probe::CLASS_UID);
		assert_eq!(handle.block().strong_count(), 1);

		let second = handle.clone();
		assert_eq!(handle.block().strong_count(), 2);
		drop(second);
		assert_eq!(handle.block().strong_count(), 1);
	}

	#[test]
	fn test_weak_expires_after_last_strong() {
		let handle = PROBE_FACTORY.create().unwrap();
		let weak = handle.downgrade();
		assert!(weak.upgrade().is_some());
		drop(handle);
		assert!(weak.is_expired());
		assert!(weak.upgrade().is_none());
	}

	#[test]
	fn test_self_reference() {
		let handle = PROBE_FACTORY.create().unwrap();
		handle.core().set_self(&handle);
		let me = handle.core().self_object().unwrap();
		assert!(me.ptr_eq(&handle));
		drop(me);
		drop(handle);
	}

	#[test]
	fn test_class_info() {
		let info = PROBE_FACTORY.class_info();
		assert_eq!(info.uid, Uid::from_name("apiary.test.probe"));
		assert!(info.members.is_empty());
	}
}
