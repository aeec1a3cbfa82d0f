//! Thread-local recycling pool for plain control blocks.
//!
//! Object churn allocates one control block per object; the pool keeps a
//! bounded per-thread free list chained through each block's pointer word so
//! hot create/destroy loops avoid the allocator. The thread that frees a
//! block need not be the thread that allocated it.

use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::block::ControlBlock;

const DEFAULT_CAPACITY: usize = 256;

static CAPACITY: AtomicUsize = AtomicUsize::new(DEFAULT_CAPACITY);

/// Sets the per-thread pool capacity. Zero disables pooling. Applies to
/// blocks recycled after the call; already-pooled blocks are unaffected.
pub fn set_capacity(capacity: usize) {
	CAPACITY.store(capacity, Ordering::Relaxed);
}

/// Current per-thread pool capacity.
pub fn capacity() -> usize {
	CAPACITY.load(Ordering::Relaxed)
}

struct Pool {
	head: *mut ControlBlock,
	len: usize,
}

impl Pool {
	const fn new() -> Pool {
		Pool { head: std::ptr::null_mut(), len: 0 }
	}
}

impl Drop for Pool {
	fn drop(&mut self) {
		let mut cur = self.head;
		while !cur.is_null() {
			let next = unsafe { (*cur).pool_link() } as *mut ControlBlock;
			drop(unsafe { Box::from_raw(cur) });
			cur = next;
		}
	}
}

thread_local! {
	static POOL: RefCell<Pool> = const { RefCell::new(Pool::new()) };
}

/// Allocates a fresh block (strong = 1, weak = 1), reusing a pooled one when
/// available.
pub fn alloc() -> NonNull<ControlBlock> {
	let recycled = POOL
		.try_with(|pool| {
			let mut pool = pool.borrow_mut();
			if pool.head.is_null() {
				return None;
			}
			let block = pool.head;
			pool.head = unsafe { (*block).pool_link() } as *mut ControlBlock;
			pool.len -= 1;
			unsafe { (*block).reset() };
			NonNull::new(block)
		})
		.unwrap_or(None);

	match recycled {
		Some(block) => block,
		None => {
			let block = Box::into_raw(Box::new(ControlBlock::new()));
			unsafe { NonNull::new_unchecked(block) }
		}
	}
}

/// Returns a block whose last weak reference dropped.
///
/// Extended blocks free themselves through their installed deallocation
/// routine; plain blocks go back to the pool (or to the allocator once the
/// pool is full).
///
/// # Safety
///
/// `block` must have a weak count of zero and must not be referenced again.
pub unsafe fn recycle(block: NonNull<ControlBlock>) {
	if let Some(dealloc) = unsafe { block.as_ref() }.dealloc_fn() {
		unsafe { dealloc(block.as_ptr()) };
		return;
	}

	let pooled = POOL
		.try_with(|pool| {
			let mut pool = pool.borrow_mut();
			if pool.len >= capacity() {
				return false;
			}
			unsafe { block.as_ref() }.set_pool_link(pool.head as usize);
			pool.head = block.as_ptr();
			pool.len += 1;
			true
		})
		.unwrap_or(false);

	if !pooled {
		drop(unsafe { Box::from_raw(block.as_ptr()) });
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn drop_counts(block: NonNull<ControlBlock>) {
		let b = unsafe { block.as_ref() };
		assert!(b.dec_strong());
		assert!(b.dec_weak());
	}

	// The pool is per-thread; running both halves on one spawned thread keeps
	// the capacity knob from racing other tests in the binary.
	#[test]
	fn test_pool_reuse_and_capacity() {
		std::thread::spawn(|| {
			let first = alloc();
			let first_addr = first.as_ptr() as usize;
			drop_counts(first);
			unsafe { recycle(first) };

			let second = alloc();
			assert_eq!(second.as_ptr() as usize, first_addr);
			let b = unsafe { second.as_ref() };
			assert_eq!(b.strong_count(), 1);
			assert_eq!(b.weak_count(), 1);
			drop_counts(second);
			unsafe { recycle(second) };

			set_capacity(0);
			assert_eq!(capacity(), 0);
			let block = alloc();
			drop_counts(block);
			unsafe { recycle(block) };
			set_capacity(DEFAULT_CAPACITY);
		})
		.join()
		.unwrap();
	}
}
