//! Intrusive control blocks: the refcount protocol behind every handle.
//!
//! One [`ControlBlock`] exists per object. Strong references keep the object
//! alive; the block itself stays alive while any weak reference (plus the
//! collective weak contributed by the strong set) remains. Blocks come in two
//! flavors distinguished by a high-bit tag on the object-address word:
//!
//! - **Inline** (untagged): the object was heap-allocated by a factory; the
//!   last strong release drops it in place and frees the allocation.
//! - **External** (tagged): a container owns the object's storage and has
//!   installed a destroy callback. The last strong release calls the callback
//!   instead; the callback clears the tag exactly once, bumps the weak count
//!   to survive the object's own self-weak release, and reclaims the slot.
//!
//! Plain blocks are recycled through a thread-local pool ([`block_pool`]);
//! extended blocks carry their own deallocation routine.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering, fence};

use crate::object::Object;

/// Destroy callback for external-mode blocks.
///
/// Called with the block pointer when the last strong reference drops. The
/// callback owns the full external destruction protocol (tag clear, weak
/// bump, in-place drop, slot reclamation).
pub type DestroyFn = unsafe fn(*mut ControlBlock);

/// Deallocation routine for blocks not owned by the plain-block pool.
///
/// Extended blocks (a container's block embedding [`ControlBlock`] as its
/// first field) install this so the final weak release frees the right
/// allocation.
pub type DeallocFn = unsafe fn(*mut ControlBlock);

const EXTERNAL_TAG: usize = 1 << (usize::BITS - 1);

/// Refcount metadata for one object.
pub struct ControlBlock {
	strong: AtomicUsize,
	weak: AtomicUsize,
	/// Object address, high bit = external tag. Reused as the freelist link
	/// while the block sits in the thread-local pool.
	ptr: AtomicUsize,
	/// External destroy callback ([`DestroyFn`] as usize, 0 = none).
	destroy: AtomicUsize,
	/// Block deallocation routine ([`DeallocFn`] as usize, 0 = pool).
	dealloc: AtomicUsize,
}

impl ControlBlock {
	/// A fresh block: one strong (the handle about to be returned) and one
	/// weak (the collective weak held by the strong set).
	pub fn new() -> ControlBlock {
		ControlBlock {
			strong: AtomicUsize::new(1),
			weak: AtomicUsize::new(1),
			ptr: AtomicUsize::new(0),
			destroy: AtomicUsize::new(0),
			dealloc: AtomicUsize::new(0),
		}
	}

	pub(crate) fn reset(&self) {
		self.strong.store(1, Ordering::Relaxed);
		self.weak.store(1, Ordering::Relaxed);
		self.ptr.store(0, Ordering::Relaxed);
		self.destroy.store(0, Ordering::Relaxed);
		self.dealloc.store(0, Ordering::Relaxed);
	}

	/// Current strong count. Diagnostic only; racy by nature.
	pub fn strong_count(&self) -> usize {
		self.strong.load(Ordering::Relaxed)
	}

	/// Current weak count. Diagnostic only; racy by nature.
	pub fn weak_count(&self) -> usize {
		self.weak.load(Ordering::Relaxed)
	}

	/// Increments the strong count. Only valid while the caller already
	/// holds a strong reference.
	pub fn acquire_strong(&self) {
		let prev = self.strong.fetch_add(1, Ordering::Relaxed);
		debug_assert!(prev > 0, "acquire_strong on a dead object");
	}

	/// Attempts to upgrade a weak reference: increments `strong` iff it is
	/// still positive.
	pub fn try_upgrade(&self) -> bool {
		let mut cur = self.strong.load(Ordering::Relaxed);
		loop {
			if cur == 0 {
				return false;
			}
			match self.strong.compare_exchange_weak(
				cur,
				cur + 1,
				Ordering::Acquire,
				Ordering::Relaxed,
			) {
				Ok(_) => return true,
				Err(actual) => cur = actual,
			}
		}
	}

	/// Increments the weak count.
	pub fn acquire_weak(&self) {
		self.weak.fetch_add(1, Ordering::Relaxed);
	}

	/// Decrements the strong count; returns true if this was the last strong.
	pub(crate) fn dec_strong(&self) -> bool {
		let prev = self.strong.fetch_sub(1, Ordering::Release);
		assert!(prev != 0, "strong refcount underflow");
		if prev == 1 {
			fence(Ordering::Acquire);
			true
		} else {
			false
		}
	}

	/// Decrements the weak count; returns true if this was the last weak and
	/// the caller must recycle the block.
	pub(crate) fn dec_weak(&self) -> bool {
		let prev = self.weak.fetch_sub(1, Ordering::Release);
		assert!(prev != 0, "weak refcount underflow");
		if prev == 1 {
			fence(Ordering::Acquire);
			true
		} else {
			false
		}
	}

	/// Publishes the object address (untagged). Release-ordered so readers
	/// that acquire the block see a fully-constructed object.
	pub fn publish_object(&self, addr: usize) {
		debug_assert!(addr & EXTERNAL_TAG == 0);
		self.ptr.store(addr, Ordering::Release);
	}

	/// Object address with the tag masked off.
	pub fn object_addr(&self) -> usize {
		self.ptr.load(Ordering::Acquire) & !EXTERNAL_TAG
	}

	/// Switches the block into external mode: installs the destroy callback
	/// and sets the tag. Must happen before the block is shared.
	pub fn set_external(&self, destroy: DestroyFn) {
		self.destroy.store(destroy as usize, Ordering::Release);
		self.ptr.fetch_or(EXTERNAL_TAG, Ordering::Release);
	}

	/// True while the external tag is set.
	pub fn is_external(&self) -> bool {
		self.ptr.load(Ordering::Acquire) & EXTERNAL_TAG != 0
	}

	/// Clears the external tag; returns whether it was set. The external
	/// destroy path calls this exactly once at entry so any weak references
	/// released after the object is gone take the regular recycle path.
	pub fn clear_external_tag(&self) -> bool {
		self.ptr.fetch_and(!EXTERNAL_TAG, Ordering::AcqRel) & EXTERNAL_TAG != 0
	}

	/// Replaces the destroy callback. Used when a container hands its
	/// remaining zombies over to orphan reclamation.
	pub fn set_destroy(&self, destroy: DestroyFn) {
		self.destroy.store(destroy as usize, Ordering::Release);
	}

	fn destroy_fn(&self) -> Option<DestroyFn> {
		let raw = self.destroy.load(Ordering::Acquire);
		if raw == 0 {
			None
		} else {
			// Round-trips through usize; fn pointers are address-sized on
			// every supported target.
			Some(unsafe { std::mem::transmute::<usize, DestroyFn>(raw) })
		}
	}

	/// Installs the deallocation routine for an extended block.
	pub fn set_dealloc(&self, dealloc: DeallocFn) {
		self.dealloc.store(dealloc as usize, Ordering::Release);
	}

	pub(crate) fn dealloc_fn(&self) -> Option<DeallocFn> {
		let raw = self.dealloc.load(Ordering::Acquire);
		if raw == 0 {
			None
		} else {
			Some(unsafe { std::mem::transmute::<usize, DeallocFn>(raw) })
		}
	}

	pub(crate) fn pool_link(&self) -> usize {
		self.ptr.load(Ordering::Relaxed)
	}

	pub(crate) fn set_pool_link(&self, link: usize) {
		self.ptr.store(link, Ordering::Relaxed);
	}
}

impl Default for ControlBlock {
	fn default() -> Self {
		ControlBlock::new()
	}
}

/// Releases one strong reference.
///
/// If it was the last, destroys the object (through the destroy callback in
/// external mode, through an in-place drop plus heap free otherwise), then
/// releases the strong set's collective weak.
///
/// # Safety
///
/// `block` must be the control block of the live object at `obj`, and the
/// caller must own the strong reference being released.
pub unsafe fn release_strong(block: NonNull<ControlBlock>, obj: NonNull<dyn Object>) {
	let b = unsafe { block.as_ref() };
	if b.dec_strong() {
		if b.is_external() {
			let destroy = b.destroy_fn().expect("external block without destroy callback");
			unsafe { destroy(block.as_ptr()) };
		} else {
			unsafe { drop_heap_object(obj) };
		}
		unsafe { release_weak(block) };
	}
}

/// Releases one weak reference, recycling the block if it was the last.
///
/// # Safety
///
/// The caller must own the weak reference being released.
pub unsafe fn release_weak(block: NonNull<ControlBlock>) {
	if unsafe { block.as_ref() }.dec_weak() {
		unsafe { crate::block_pool::recycle(block) };
	}
}

unsafe fn drop_heap_object(obj: NonNull<dyn Object>) {
	let layout = Layout::for_value(unsafe { obj.as_ref() });
	unsafe { std::ptr::drop_in_place(obj.as_ptr()) };
	if layout.size() != 0 {
		unsafe { std::alloc::dealloc(obj.as_ptr().cast(), layout) };
	}
}
