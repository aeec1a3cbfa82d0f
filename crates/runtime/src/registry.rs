//! UID-keyed factory registry.
//!
//! Built-in classes are registered in a fixed order at boot; everything else
//! arrives through [`FactoryReg`] inventory submissions collected at the
//! same time (static registration; there is no plugin loading). Runtime
//! registration remains available on top for test harnesses and late-bound
//! classes.

use std::collections::HashMap;

use apiary_core::{ObjectFactory, ReturnValue, Uid};
use parking_lot::RwLock;
use thiserror::Error;

/// Inventory wrapper for statically registered factories.
///
/// ```ignore
/// static SPRITE_FACTORY: ClassFactory<Sprite> = ClassFactory::new();
/// inventory::submit! { FactoryReg(&SPRITE_FACTORY) }
/// ```
pub struct FactoryReg(pub &'static dyn ObjectFactory);

inventory::collect!(FactoryReg);

/// Errors from factory registration and lookup.
#[derive(Debug, Error)]
pub enum RegistryError {
	/// A factory for this class UID is already registered.
	#[error("class {name} ({uid}) is already registered")]
	Duplicate { uid: Uid, name: &'static str },

	/// No factory is registered for this class UID.
	#[error("no factory registered for class {0}")]
	UnknownClass(Uid),
}

pub(crate) struct TypeRegistry {
	types: RwLock<HashMap<Uid, &'static dyn ObjectFactory>>,
}

impl TypeRegistry {
	pub(crate) fn new() -> TypeRegistry {
		TypeRegistry { types: RwLock::new(HashMap::new()) }
	}

	pub(crate) fn register(&self, factory: &'static dyn ObjectFactory) -> Result<(), RegistryError> {
		let info = factory.class_info();
		let mut types = self.types.write();
		if types.contains_key(&info.uid) {
			return Err(RegistryError::Duplicate { uid: info.uid, name: info.name });
		}
		types.insert(info.uid, factory);
		tracing::debug!(class = %info.uid, name = info.name, "registry.register");
		Ok(())
	}

	pub(crate) fn unregister(&self, factory: &'static dyn ObjectFactory) -> ReturnValue {
		let uid = factory.class_info().uid;
		if self.types.write().remove(&uid).is_some() {
			tracing::debug!(class = %uid, "registry.unregister");
			ReturnValue::Success
		} else {
			ReturnValue::NothingToDo
		}
	}

	pub(crate) fn find(&self, class_uid: Uid) -> Option<&'static dyn ObjectFactory> {
		self.types.read().get(&class_uid).copied()
	}

	pub(crate) fn len(&self) -> usize {
		self.types.read().len()
	}
}
