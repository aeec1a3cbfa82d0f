//! Single-type value cells and typed access helpers.
//!
//! A [`ValueCell<T>`] is the standard implementation of the value facet:
//! one plain-data payload behind a lock, addressable only through its type
//! UID. The primitive cells are registered at boot under their type UIDs,
//! so `create_any(type_uid)` works for any of them.

use apiary_core::{
	AnyData, ClassFactory, Construct, Facet, Object, ObjectCore, ObjectPtr, ReturnValue, Uid,
	Value, iface,
};
use parking_lot::RwLock;

use crate::{Runtime, instance};

/// Value cell holding a single `T`.
pub struct ValueCell<T: AnyData> {
	core: ObjectCore,
	cell: RwLock<T>,
	types: [Uid; 1],
}

impl<T: AnyData> ValueCell<T> {
	/// The UID cells of this type are keyed on.
	pub const TYPE_UID: Uid = Uid::from_name(T::NAME);

	fn set(&self, incoming: T) -> ReturnValue {
		let mut cur = self.cell.write();
		if *cur == incoming {
			ReturnValue::NothingToDo
		} else {
			*cur = incoming;
			ReturnValue::Success
		}
	}
}

impl<T: AnyData> Construct for ValueCell<T> {
	const CLASS_NAME: &'static str = T::NAME;

	fn construct(core: ObjectCore) -> ValueCell<T> {
		ValueCell { core, cell: RwLock::new(T::default()), types: [Self::TYPE_UID] }
	}
}

impl<T: AnyData> Object for ValueCell<T> {
	fn class_uid(&self) -> Uid {
		Self::TYPE_UID
	}

	fn core(&self) -> &ObjectCore {
		&self.core
	}

	fn query(&self, uid: Uid) -> Option<Facet<'_>> {
		match uid {
			iface::VALUE => Some(Facet::Value(self)),
			_ => None,
		}
	}

	fn as_any(&self) -> &dyn std::any::Any {
		self
	}
}

impl<T: AnyData> Value for ValueCell<T> {
	fn type_uid(&self) -> Uid {
		Self::TYPE_UID
	}

	fn compatible_types(&self) -> &[Uid] {
		&self.types
	}

	fn data_size(&self, uid: Uid) -> usize {
		if uid == Self::TYPE_UID { size_of::<T>() } else { 0 }
	}

	fn get_data(&self, dst: &mut [u8], uid: Uid) -> ReturnValue {
		if uid != Self::TYPE_UID || dst.len() != size_of::<T>() {
			return ReturnValue::Fail;
		}
		let guard = self.cell.read();
		unsafe {
			std::ptr::copy_nonoverlapping(
				&*guard as *const T as *const u8,
				dst.as_mut_ptr(),
				size_of::<T>(),
			);
		}
		ReturnValue::Success
	}

	fn set_data(&self, src: &[u8], uid: Uid) -> ReturnValue {
		if uid != Self::TYPE_UID || src.len() != size_of::<T>() {
			return ReturnValue::Fail;
		}
		let incoming = unsafe { std::ptr::read_unaligned(src.as_ptr() as *const T) };
		self.set(incoming)
	}

	fn copy_from(&self, other: &dyn Value) -> ReturnValue {
		if other.data_size(Self::TYPE_UID) != size_of::<T>() {
			return ReturnValue::Fail;
		}
		let mut tmp = T::default();
		let buf = unsafe {
			std::slice::from_raw_parts_mut(&mut tmp as *mut T as *mut u8, size_of::<T>())
		};
		if other.get_data(buf, Self::TYPE_UID) != ReturnValue::Success {
			return ReturnValue::Fail;
		}
		self.set(tmp)
	}

	fn clone_value(&self) -> Option<ObjectPtr> {
		let clone = instance().create_any(Self::TYPE_UID)?;
		let cell = clone.as_value()?;
		if !cell.copy_from(self).succeeded() {
			return None;
		}
		Some(clone)
	}
}

/// Reads a typed value out of any compatible cell.
pub fn get<T: AnyData>(value: &dyn Value) -> Option<T> {
	let mut tmp = T::default();
	let buf = unsafe {
		std::slice::from_raw_parts_mut(&mut tmp as *mut T as *mut u8, size_of::<T>())
	};
	if value.get_data(buf, Uid::of::<T>()) != ReturnValue::Success {
		return None;
	}
	Some(tmp)
}

/// Writes a typed value into any compatible cell.
pub fn set<T: AnyData>(value: &dyn Value, v: T) -> ReturnValue {
	let bytes =
		unsafe { std::slice::from_raw_parts(&v as *const T as *const u8, size_of::<T>()) };
	value.set_data(bytes, Uid::of::<T>())
}

/// Creates a fresh cell holding `v`. Requires the cell class for `T` to be
/// registered.
pub fn make<T: AnyData>(v: T) -> Option<ObjectPtr> {
	let handle = instance().create_any(Uid::of::<T>())?;
	if !set(handle.as_value()?, v).succeeded() {
		return None;
	}
	Some(handle)
}

/// Reads a typed value out of a value-cell handle.
pub fn read<T: AnyData>(handle: &ObjectPtr) -> Option<T> {
	get(handle.as_value()?)
}

macro_rules! cell_factories {
	($(($ty:ty, $factory:ident)),* $(,)?) => {
		$(static $factory: ClassFactory<ValueCell<$ty>> = ClassFactory::new();)*

		pub(crate) fn register_cells(runtime: &Runtime) {
			$(runtime.register_builtin(&$factory);)*
		}
	};
}

cell_factories! {
	(bool, BOOL_CELL),
	(u8, U8_CELL),
	(u16, U16_CELL),
	(u32, U32_CELL),
	(u64, U64_CELL),
	(i8, I8_CELL),
	(i16, I16_CELL),
	(i32, I32_CELL),
	(i64, I64_CELL),
	(f32, F32_CELL),
	(f64, F64_CELL),
}
