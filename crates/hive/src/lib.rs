//! Paged object containers.
//!
//! Three classes, registered statically so the runtime knows them at boot:
//!
//! - **Hive**: places objects of one class into cache-dense page slots
//!   with placement construction; removed objects survive as zombies while
//!   external references remain, and pages survive the hive itself as
//!   orphans until the last reference drops.
//! - **RawHive**: the same pages and freelist for bare slots, with no
//!   reference counting.
//! - **HiveStore**: one hive per element class, created on demand.

mod hive;
mod page;
mod raw;
mod store;

use apiary_core::{Hive, ObjectPtr, ReturnValue, Uid};
use apiary_runtime::FactoryReg;

pub use hive::HiveImpl;
pub use raw::RawHiveImpl;
pub use store::HiveStoreImpl;

/// Well-known class UIDs provided by this crate.
pub mod classes {
	use apiary_core::{Construct, Uid};

	pub const HIVE: Uid = <crate::HiveImpl as Construct>::CLASS_UID;
	pub const RAW_HIVE: Uid = <crate::RawHiveImpl as Construct>::CLASS_UID;
	pub const HIVE_STORE: Uid = <crate::HiveStoreImpl as Construct>::CLASS_UID;
}

inventory::submit! { FactoryReg(&hive::HIVE_FACTORY) }
inventory::submit! { FactoryReg(&raw::RAW_HIVE_FACTORY) }
inventory::submit! { FactoryReg(&store::HIVE_STORE_FACTORY) }

/// Creates an initialized hive for `element_class`.
pub fn create_hive(element_class: Uid) -> Option<ObjectPtr> {
	let hive = apiary_runtime::instance().create(classes::HIVE)?;
	if hive.as_hive()?.init(element_class) != ReturnValue::Success {
		return None;
	}
	Some(hive)
}
