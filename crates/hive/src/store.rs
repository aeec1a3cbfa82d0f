//! The hive store: one hive per element class, created on demand.

use std::collections::HashMap;

use apiary_core::{
	ClassFactory, Construct, Facet, Hive, HiveStore, Object, ObjectCore, ObjectPtr, ReturnValue,
	Uid, iface,
};
use apiary_runtime::instance;
use parking_lot::Mutex;

pub struct HiveStoreImpl {
	core: ObjectCore,
	hives: Mutex<HashMap<Uid, ObjectPtr>>,
}

impl Construct for HiveStoreImpl {
	const CLASS_NAME: &'static str = "apiary.hive_store";

	fn construct(core: ObjectCore) -> HiveStoreImpl {
		HiveStoreImpl { core, hives: Mutex::new(HashMap::new()) }
	}
}

impl Object for HiveStoreImpl {
	fn class_uid(&self) -> Uid {
		Self::CLASS_UID
	}

	fn core(&self) -> &ObjectCore {
		&self.core
	}

	fn query(&self, uid: Uid) -> Option<Facet<'_>> {
		match uid {
			iface::HIVE_STORE => Some(Facet::HiveStore(self)),
			_ => None,
		}
	}

	fn as_any(&self) -> &dyn std::any::Any {
		self
	}
}

impl HiveStore for HiveStoreImpl {
	fn hive_for(&self, element_class: Uid) -> Option<ObjectPtr> {
		let mut hives = self.hives.lock();
		if let Some(hive) = hives.get(&element_class) {
			return Some(hive.clone());
		}

		let hive = instance().create(crate::classes::HIVE)?;
		let rv = hive.as_hive()?.init(element_class);
		if rv != ReturnValue::Success {
			return None;
		}
		hives.insert(element_class, hive.clone());
		tracing::debug!(class = %element_class, "hive_store.create");
		Some(hive)
	}
}

pub(crate) static HIVE_STORE_FACTORY: ClassFactory<HiveStoreImpl> = ClassFactory::new();
