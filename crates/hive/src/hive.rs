//! The object hive: placement-new storage with zombie and orphan
//! lifecycles.
//!
//! Objects are born in page slots with an extended control block prepared
//! before construction, so no post-construction block swap exists. The hive
//! owns one strong reference per Active slot; `remove` drops that reference
//! after zombifying the slot, and the slot is reclaimed by whichever thread
//! releases the last external strong: through `zombie_destroy` while the
//! hive lives, or `orphan_destroy` once the hive has handed its pages over.
//!
//! The hive's lock lives in an `Arc`-shared core so reclamation can still
//! acquire it from any thread after arbitrary handle shuffling; orphan
//! reclamation deliberately takes no lock at all; each orphan slot is
//! reached by exactly one last-reference release, and the page dies with
//! the last of them.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use apiary_core::{
	ClassFactory, Construct, ControlBlock, Facet, Hive, Object, ObjectCore, ObjectFactory,
	ObjectPtr, ReturnValue, Uid, iface, release_strong, release_weak,
};
use apiary_runtime::instance;
use parking_lot::RwLock;

use crate::page::{Page, SlotState, align_up, capacity_for_page};

pub(crate) struct ElementClass {
	pub class_uid: Uid,
	pub factory: &'static dyn ObjectFactory,
	pub slot_size: usize,
	pub slot_align: usize,
}

/// State shared between the hive object and every slot's control block.
/// Keeps the lock reachable (and valid) from reclamation callbacks no
/// matter which thread drops the last reference.
pub(crate) struct HiveShared {
	pub lock: RwLock<Vec<NonNull<Page>>>,
	/// Active slots across all pages. Lock-free reads back `len()`.
	pub live: AtomicUsize,
	pub element: OnceLock<ElementClass>,
}

unsafe impl Send for HiveShared {}
unsafe impl Sync for HiveShared {}

/// Extended control block for hive-managed objects: the base block plus the
/// slot context the destroy callbacks need.
#[repr(C)]
pub(crate) struct HiveBlock {
	pub base: ControlBlock,
	pub shared: Arc<HiveShared>,
	pub page: NonNull<Page>,
	pub slot: usize,
}

unsafe impl Send for HiveBlock {}
unsafe impl Sync for HiveBlock {}

/// Frees an extended block once its last weak reference drops. Installed as
/// the block's deallocation routine; `repr(C)` makes the base-pointer cast
/// valid.
unsafe fn hive_block_dealloc(raw: *mut ControlBlock) {
	drop(unsafe { Box::from_raw(raw as *mut HiveBlock) });
}

/// Reclaims a slot whose last strong reference dropped while the hive is
/// alive. Runs under the hive's exclusive lock; if the hive died while this
/// call waited for the lock, the slot is handled orphan-style instead.
unsafe fn zombie_destroy(raw: *mut ControlBlock) {
	let hb = unsafe { &*(raw as *mut HiveBlock) };
	let shared = Arc::clone(&hb.shared);
	let page_ptr = hb.page;
	let slot = hb.slot;

	// Keep the block alive through the destructor chain: the object's own
	// self-weak release must not be the one that frees it.
	hb.base.acquire_weak();
	let was_external = hb.base.clear_external_tag();
	debug_assert!(was_external, "zombie destroy on a non-external block");

	let element = shared.element.get().expect("hive block without element class");
	let mut free_page = false;
	{
		let _guard = shared.lock.write();
		let page = unsafe { page_ptr.as_ref() };
		unsafe {
			element
				.factory
				.destroy_in_place(NonNull::new_unchecked(page.slot_ptr(slot)));
		}
		if page.orphaned.load(Ordering::Acquire) {
			free_page = page.live.fetch_sub(1, Ordering::AcqRel) == 1;
		} else {
			let meta = unsafe { page.meta_mut() };
			meta.state[slot] = SlotState::Free;
			meta.blocks[slot] = std::ptr::null_mut();
			meta.objs[slot] = None;
			unsafe { page.push_free(slot) };
			page.live.fetch_sub(1, Ordering::AcqRel);
		}
	}
	if free_page {
		drop(unsafe { Box::from_raw(page_ptr.as_ptr()) });
	}

	unsafe { release_weak(NonNull::new_unchecked(raw)) };
}

/// Reclaims a slot on an orphaned page. No lock: the hive is gone and this
/// slot is reached by exactly one last-reference release. The last orphan
/// on the page frees it.
unsafe fn orphan_destroy(raw: *mut ControlBlock) {
	let hb = unsafe { &*(raw as *mut HiveBlock) };
	let shared = Arc::clone(&hb.shared);
	let page_ptr = hb.page;
	let slot = hb.slot;

	hb.base.acquire_weak();
	hb.base.clear_external_tag();

	let element = shared.element.get().expect("hive block without element class");
	let page = unsafe { page_ptr.as_ref() };
	unsafe {
		element
			.factory
			.destroy_in_place(NonNull::new_unchecked(page.slot_ptr(slot)));
	}
	if page.live.fetch_sub(1, Ordering::AcqRel) == 1 {
		tracing::trace!("hive.orphan_page_freed");
		drop(unsafe { Box::from_raw(page_ptr.as_ptr()) });
	}

	unsafe { release_weak(NonNull::new_unchecked(raw)) };
}

fn find_active_slot(
	pages: &[NonNull<Page>],
	addr: usize,
) -> Option<(NonNull<Page>, usize)> {
	for &page_ptr in pages {
		let page = unsafe { page_ptr.as_ref() };
		if let Some(slot) = page.slot_index_of(addr) {
			let meta = unsafe { page.meta() };
			if meta.state[slot] == SlotState::Active {
				return Some((page_ptr, slot));
			}
			return None;
		}
	}
	None
}

/// Paged container of one element class.
pub struct HiveImpl {
	core: ObjectCore,
	shared: Arc<HiveShared>,
}

impl Construct for HiveImpl {
	const CLASS_NAME: &'static str = "apiary.hive";

	fn construct(core: ObjectCore) -> HiveImpl {
		HiveImpl {
			core,
			shared: Arc::new(HiveShared {
				lock: RwLock::new(Vec::new()),
				live: AtomicUsize::new(0),
				element: OnceLock::new(),
			}),
		}
	}
}

impl Object for HiveImpl {
	fn class_uid(&self) -> Uid {
		Self::CLASS_UID
	}

	fn core(&self) -> &ObjectCore {
		&self.core
	}

	fn query(&self, uid: Uid) -> Option<Facet<'_>> {
		match uid {
			iface::HIVE => Some(Facet::Hive(self)),
			_ => None,
		}
	}

	fn as_any(&self) -> &dyn std::any::Any {
		self
	}
}

impl Hive for HiveImpl {
	fn init(&self, element_class: Uid) -> ReturnValue {
		let factory = match instance().factory(element_class) {
			Ok(factory) => factory,
			Err(err) => {
				tracing::warn!(%err, "hive.init");
				return ReturnValue::Fail;
			}
		};
		let layout = factory.slot_layout();
		// Free slots carry the next-free index in their first bytes, so a
		// slot is never smaller than one index.
		let slot_align = layout.align().max(align_of::<usize>());
		let slot_size = align_up(layout.size().max(size_of::<usize>()), slot_align);
		let element = ElementClass { class_uid: element_class, factory, slot_size, slot_align };

		match self.shared.element.set(element) {
			Ok(()) => ReturnValue::Success,
			Err(_) => {
				let bound = self.shared.element.get().map(|e| e.class_uid);
				if bound == Some(element_class) {
					ReturnValue::NothingToDo
				} else {
					ReturnValue::Fail
				}
			}
		}
	}

	fn element_class_uid(&self) -> Uid {
		self.shared.element.get().map(|e| e.class_uid).unwrap_or(Uid::NIL)
	}

	fn len(&self) -> usize {
		self.shared.live.load(Ordering::Relaxed)
	}

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn add(&self) -> Option<ObjectPtr> {
		let Some(element) = self.shared.element.get() else {
			tracing::warn!("hive.add before init");
			return None;
		};

		let mut pages = self.shared.lock.write();

		let page_ptr = match pages
			.iter()
			.copied()
			.find(|p| unsafe { !p.as_ref().is_full() })
		{
			Some(page) => page,
			None => {
				let capacity = capacity_for_page(pages.len());
				let page = Page::new(capacity, element.slot_size, element.slot_align, true);
				let page = NonNull::from(Box::leak(page));
				pages.push(page);
				tracing::debug!(capacity, pages = pages.len(), "hive.page_alloc");
				page
			}
		};
		let page = unsafe { page_ptr.as_ref() };
		let slot = unsafe { page.pop_free() }.expect("freelist on a non-full page");

		// The extended block is prepared first so the object is born with
		// its final control block.
		let block = Box::new(HiveBlock {
			base: ControlBlock::new(),
			shared: Arc::clone(&self.shared),
			page: page_ptr,
			slot,
		});
		let block = Box::into_raw(block);
		let base = unsafe { NonNull::new_unchecked(block as *mut ControlBlock) };
		unsafe { base.as_ref() }.set_dealloc(hive_block_dealloc);

		let slot_ptr = unsafe { NonNull::new_unchecked(page.slot_ptr(slot)) };
		let obj = unsafe { element.factory.construct_in_place(slot_ptr, base) };
		{
			let base = unsafe { base.as_ref() };
			base.publish_object(obj.as_ptr() as *mut u8 as usize);
			base.set_external(zombie_destroy);
		}

		let meta = unsafe { page.meta_mut() };
		meta.state[slot] = SlotState::Active;
		meta.blocks[slot] = base.as_ptr();
		meta.objs[slot] = Some(obj);
		meta.set_active_bit(slot);
		page.live.fetch_add(1, Ordering::Relaxed);
		self.shared.live.fetch_add(1, Ordering::Relaxed);

		// The returned handle adopts the block's initial strong; the hive
		// itself owns a second one.
		let handle = unsafe { ObjectPtr::from_raw(obj, base) };
		handle.block().acquire_strong();
		drop(pages);

		instance().finish_construct(&handle, element.factory.class_info());
		tracing::trace!(class = %element.class_uid, slot, "hive.add");
		Some(handle)
	}

	fn remove(&self, object: &dyn Object) -> ReturnValue {
		let addr = object as *const dyn Object as *const u8 as usize;
		let (slot, block) = {
			let pages = self.shared.lock.write();
			let Some((page_ptr, slot)) = find_active_slot(&pages, addr) else {
				return ReturnValue::Fail;
			};
			let page = unsafe { page_ptr.as_ref() };
			let meta = unsafe { page.meta_mut() };
			meta.state[slot] = SlotState::Zombie;
			meta.clear_active_bit(slot);
			self.shared.live.fetch_sub(1, Ordering::Relaxed);
			(slot, meta.blocks[slot])
		};
		tracing::trace!(slot, "hive.remove");

		// Release the hive's strong reference outside the lock: if it is the
		// last, reclamation runs synchronously and takes the lock itself.
		unsafe {
			release_strong(NonNull::new_unchecked(block), NonNull::from(object));
		}
		ReturnValue::Success
	}

	fn contains(&self, object: &dyn Object) -> bool {
		let addr = object as *const dyn Object as *const u8 as usize;
		let pages = self.shared.lock.read();
		find_active_slot(&pages, addr).is_some()
	}

	fn for_each(&self, visitor: &mut dyn FnMut(&dyn Object) -> bool) {
		let pages = self.shared.lock.read();
		for &page_ptr in pages.iter() {
			let page = unsafe { page_ptr.as_ref() };
			let meta = unsafe { page.meta() };
			for (word_index, &word) in meta.bits.iter().enumerate() {
				let mut bits = word;
				while bits != 0 {
					let slot = word_index * 64 + bits.trailing_zeros() as usize;
					bits &= bits - 1;
					if let Some(obj) = meta.objs[slot]
						&& !visitor(unsafe { obj.as_ref() })
					{
						return;
					}
				}
			}
		}
	}
}

impl Drop for HiveImpl {
	fn drop(&mut self) {
		// Zombify every Active slot, hand pages with survivors over to
		// orphan reclamation, then release the hive's strong references
		// outside the lock.
		let mut doomed: Vec<(NonNull<dyn Object>, *mut ControlBlock)> = Vec::new();
		{
			let mut pages = self.shared.lock.write();
			for page_ptr in pages.drain(..) {
				let page = unsafe { page_ptr.as_ref() };
				let meta = unsafe { page.meta_mut() };
				for slot in 0..page.capacity {
					if meta.state[slot] == SlotState::Active {
						meta.state[slot] = SlotState::Zombie;
						meta.clear_active_bit(slot);
						let obj = meta.objs[slot].expect("active slot without object");
						doomed.push((obj, meta.blocks[slot]));
					}
				}

				if page.live.load(Ordering::Acquire) == 0 {
					drop(unsafe { Box::from_raw(page_ptr.as_ptr()) });
					continue;
				}

				// Survivors: swap every zombie's destroy callback before any
				// of the strong releases below can run it.
				page.orphaned.store(true, Ordering::Release);
				let zombies = meta
					.state
					.iter()
					.filter(|s| **s == SlotState::Zombie)
					.count();
				for slot in 0..page.capacity {
					if meta.state[slot] == SlotState::Zombie {
						unsafe { (*meta.blocks[slot]).set_destroy(orphan_destroy) };
					}
				}
				tracing::debug!(zombies, "hive.page_orphaned");
			}
			self.shared.live.store(0, Ordering::Relaxed);
		}

		for (obj, block) in doomed {
			unsafe { release_strong(NonNull::new_unchecked(block), obj) };
		}
	}
}

pub(crate) static HIVE_FACTORY: ClassFactory<HiveImpl> = ClassFactory::new();
