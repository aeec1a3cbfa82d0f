//! Static member descriptors attached to classes.
//!
//! A class that declares properties, events, or functions carries a static
//! [`MemberDesc`] table in its [`ClassInfo`]. Descriptors are read-only
//! after registration; the runtime instantiates satellites from them lazily.
//!
//! [`ClassInfo`]: crate::factory::ClassInfo

use crate::uid::{AnyData, Uid};

/// Kind of a declared member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
	Property,
	Event,
	Function,
}

/// Member notification kinds. `Added`/`Removed` are reserved for
/// collection-valued properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notification {
	Changed,
}

/// One declared member of a class.
#[derive(Clone, Copy, Debug)]
pub struct MemberDesc {
	pub name: &'static str,
	pub kind: MemberKind,
	/// UID of the member's value type (nil for events and functions).
	pub type_uid: Uid,
	/// Default value blob, sized to the value type (empty for events and
	/// functions). Native-endian.
	pub default: &'static [u8],
}

/// Reinterprets a descriptor's default blob as `T`.
///
/// Returns `None` when the descriptor's type UID or blob size does not
/// match `T`.
pub fn default_value<T: AnyData>(desc: &MemberDesc) -> Option<T> {
	if desc.type_uid != Uid::of::<T>() || desc.default.len() != size_of::<T>() {
		return None;
	}
	Some(unsafe { std::ptr::read_unaligned(desc.default.as_ptr() as *const T) })
}

/// Declares a static member table.
///
/// ```ignore
/// const MEMBERS: &[MemberDesc] = members! {
/// 	prop width: f32 = 100.0,
/// 	prop height: f32 = 50.0,
/// 	event on_clicked,
/// 	func reset,
/// };
/// ```
///
/// Property defaults use the type's `to_ne_bytes`, so `prop` members are
/// limited to the numeric primitives; other kinds carry no payload.
#[macro_export]
macro_rules! members {
	(@one prop $name:ident : $ty:ty = $default:expr) => {
		$crate::MemberDesc {
			name: stringify!($name),
			kind: $crate::MemberKind::Property,
			type_uid: $crate::Uid::of::<$ty>(),
			default: &<$ty>::to_ne_bytes($default),
		}
	};
	(@one event $name:ident) => {
		$crate::MemberDesc {
			name: stringify!($name),
			kind: $crate::MemberKind::Event,
			type_uid: $crate::Uid::NIL,
			default: &[],
		}
	};
	(@one func $name:ident) => {
		$crate::MemberDesc {
			name: stringify!($name),
			kind: $crate::MemberKind::Function,
			type_uid: $crate::Uid::NIL,
			default: &[],
		}
	};
	($($kind:ident $name:ident $(: $ty:ty = $default:expr)?),* $(,)?) => {
		&[$($crate::members!(@one $kind $name $(: $ty = $default)?)),*]
	};
}

#[cfg(test)]
mod tests {
	use super::*;

	const MEMBERS: &[MemberDesc] = members! {
		prop width: f32 = 100.0,
		prop count: i32 = 7,
		event on_clicked,
		func reset,
	};

	#[test]
	fn test_member_table_shape() {
		assert_eq!(MEMBERS.len(), 4);
		assert_eq!(MEMBERS[0].name, "width");
		assert_eq!(MEMBERS[0].kind, MemberKind::Property);
		assert_eq!(MEMBERS[2].kind, MemberKind::Event);
		assert_eq!(MEMBERS[3].kind, MemberKind::Function);
		assert!(MEMBERS[2].type_uid.is_nil());
	}

	#[test]
	fn test_default_value_round_trip() {
		assert_eq!(default_value::<f32>(&MEMBERS[0]), Some(100.0));
		assert_eq!(default_value::<i32>(&MEMBERS[1]), Some(7));
	}

	#[test]
	fn test_default_value_type_mismatch() {
		assert_eq!(default_value::<i32>(&MEMBERS[0]), None);
		assert_eq!(default_value::<f32>(&MEMBERS[2]), None);
	}
}
