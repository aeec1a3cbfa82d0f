//! The raw hive: same pages and freelist, no control blocks, no zombies.
//!
//! `allocate` hands out bare slot pointers; `deallocate` runs the
//! configured drop routine and returns the slot. Lifetime tracking is the
//! caller's problem; that is the point of this variant.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use apiary_core::{
	ClassFactory, Construct, Facet, Object, ObjectCore, ObjectFactory, RawDropFn, RawHive,
	ReturnValue, Uid, iface,
};
use apiary_runtime::instance;
use parking_lot::RwLock;

use crate::page::{Page, SlotState, align_up, capacity_for_page};

enum SlotDrop {
	None,
	Fn(RawDropFn),
	Class(&'static dyn ObjectFactory),
}

struct RawConfig {
	slot_size: usize,
	slot_align: usize,
	drop: SlotDrop,
}

/// Paged raw-slot allocator.
pub struct RawHiveImpl {
	core: ObjectCore,
	config: OnceLock<RawConfig>,
	lock: RwLock<Vec<NonNull<Page>>>,
	live: AtomicUsize,
}

unsafe impl Send for RawHiveImpl {}
unsafe impl Sync for RawHiveImpl {}

impl RawHiveImpl {
	fn configure(&self, layout: Layout, drop: SlotDrop) -> ReturnValue {
		if layout.size() == 0 {
			return ReturnValue::InvalidArgument;
		}
		let slot_align = layout.align().max(align_of::<usize>());
		let slot_size = align_up(layout.size().max(size_of::<usize>()), slot_align);
		match self.config.set(RawConfig { slot_size, slot_align, drop }) {
			Ok(()) => ReturnValue::Success,
			Err(_) => ReturnValue::Fail,
		}
	}

	fn drop_slot(config: &RawConfig, ptr: NonNull<u8>) {
		match config.drop {
			SlotDrop::None => {}
			SlotDrop::Fn(drop_fn) => unsafe { drop_fn(ptr.as_ptr()) },
			SlotDrop::Class(factory) => unsafe { factory.destroy_in_place(ptr) },
		}
	}
}

impl Construct for RawHiveImpl {
	const CLASS_NAME: &'static str = "apiary.raw_hive";

	fn construct(core: ObjectCore) -> RawHiveImpl {
		RawHiveImpl {
			core,
			config: OnceLock::new(),
			lock: RwLock::new(Vec::new()),
			live: AtomicUsize::new(0),
		}
	}
}

impl Object for RawHiveImpl {
	fn class_uid(&self) -> Uid {
		Self::CLASS_UID
	}

	fn core(&self) -> &ObjectCore {
		&self.core
	}

	fn query(&self, uid: Uid) -> Option<Facet<'_>> {
		match uid {
			iface::RAW_HIVE => Some(Facet::RawHive(self)),
			_ => None,
		}
	}

	fn as_any(&self) -> &dyn std::any::Any {
		self
	}
}

impl RawHive for RawHiveImpl {
	fn init_layout(&self, layout: Layout, drop_fn: Option<RawDropFn>) -> ReturnValue {
		let drop = match drop_fn {
			Some(f) => SlotDrop::Fn(f),
			None => SlotDrop::None,
		};
		self.configure(layout, drop)
	}

	fn init_class(&self, element_class: Uid) -> ReturnValue {
		match instance().factory(element_class) {
			Ok(factory) => self.configure(factory.slot_layout(), SlotDrop::Class(factory)),
			Err(err) => {
				tracing::warn!(%err, "raw_hive.init_class");
				ReturnValue::Fail
			}
		}
	}

	fn allocate(&self) -> Option<NonNull<u8>> {
		let config = self.config.get()?;
		let mut pages = self.lock.write();

		let page_ptr = match pages
			.iter()
			.copied()
			.find(|p| unsafe { !p.as_ref().is_full() })
		{
			Some(page) => page,
			None => {
				let capacity = capacity_for_page(pages.len());
				let page = Page::new(capacity, config.slot_size, config.slot_align, false);
				let page = NonNull::from(Box::leak(page));
				pages.push(page);
				tracing::debug!(capacity, pages = pages.len(), "raw_hive.page_alloc");
				page
			}
		};
		let page = unsafe { page_ptr.as_ref() };
		let slot = unsafe { page.pop_free() }.expect("freelist on a non-full page");
		unsafe { page.meta_mut() }.state[slot] = SlotState::Active;
		page.live.fetch_add(1, Ordering::Relaxed);
		self.live.fetch_add(1, Ordering::Relaxed);

		Some(unsafe { NonNull::new_unchecked(page.slot_ptr(slot)) })
	}

	unsafe fn deallocate(&self, ptr: NonNull<u8>) -> ReturnValue {
		let Some(config) = self.config.get() else {
			return ReturnValue::Fail;
		};
		let pages = self.lock.write();
		let addr = ptr.as_ptr() as usize;
		for &page_ptr in pages.iter() {
			let page = unsafe { page_ptr.as_ref() };
			let Some(slot) = page.slot_index_of(addr) else { continue };
			let meta = unsafe { page.meta_mut() };
			if meta.state[slot] != SlotState::Active {
				return ReturnValue::InvalidArgument;
			}
			Self::drop_slot(config, ptr);
			meta.state[slot] = SlotState::Free;
			unsafe { page.push_free(slot) };
			page.live.fetch_sub(1, Ordering::Relaxed);
			self.live.fetch_sub(1, Ordering::Relaxed);
			return ReturnValue::Success;
		}
		ReturnValue::InvalidArgument
	}

	fn len(&self) -> usize {
		self.live.load(Ordering::Relaxed)
	}

	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Drop for RawHiveImpl {
	fn drop(&mut self) {
		// Outstanding slots are raw memory as far as the container knows;
		// the caller may never have constructed anything in them, so no
		// drop routine runs here. The pages go back to the allocator.
		let mut pages = self.lock.write();
		let leaked = self.live.load(Ordering::Relaxed);
		for page_ptr in pages.drain(..) {
			drop(unsafe { Box::from_raw(page_ptr.as_ptr()) });
		}
		if leaked > 0 {
			tracing::debug!(slots = leaked, "raw_hive dropped with live slots");
		}
	}
}

pub(crate) static RAW_HIVE_FACTORY: ClassFactory<RawHiveImpl> = ClassFactory::new();
