//! Per-instance metadata container.
//!
//! Attached by the runtime to objects whose class declares members. The
//! static descriptor table stays shared; property/event/function satellites
//! are created through the registry on first access and cached for the
//! lifetime of the object; their identities never change afterwards.

use apiary_core::{
	MemberDesc, MemberKind, Metadata, Notification, Object, ObjectPtr, ReturnValue, Value,
};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::property::PropertyImpl;
use crate::{classes, instance};

pub struct MetadataContainer {
	members: &'static [MemberDesc],
	cache: Mutex<SmallVec<[(MemberKind, &'static str, ObjectPtr); 4]>>,
}

impl MetadataContainer {
	pub fn new(members: &'static [MemberDesc]) -> MetadataContainer {
		MetadataContainer { members, cache: Mutex::new(SmallVec::new()) }
	}

	fn get_or_create(&self, kind: MemberKind, name: &str) -> Option<ObjectPtr> {
		let mut cache = self.cache.lock();
		if let Some((_, _, handle)) =
			cache.iter().find(|(k, n, _)| *k == kind && *n == name)
		{
			return Some(handle.clone());
		}

		let desc = self
			.members
			.iter()
			.find(|d| d.kind == kind && d.name == name)?;

		let satellite = match kind {
			MemberKind::Property => self.create_property(desc)?,
			MemberKind::Event => instance().create(classes::EVENT)?,
			MemberKind::Function => instance().create(classes::FUNCTION)?,
		};

		cache.push((kind, desc.name, satellite.clone()));
		Some(satellite)
	}

	fn create_property(&self, desc: &MemberDesc) -> Option<ObjectPtr> {
		// Default-initialized backing cell from the descriptor blob.
		let initial = instance().create_any(desc.type_uid)?;
		if !desc.default.is_empty() {
			let cell = initial.as_value()?;
			if !cell.set_data(desc.default, desc.type_uid).succeeded() {
				tracing::warn!(member = desc.name, "default blob rejected by value cell");
			}
		}
		instance().create_property(desc.type_uid, initial.as_value())
	}
}

impl Metadata for MetadataContainer {
	fn static_metadata(&self) -> &'static [MemberDesc] {
		self.members
	}

	fn property(&self, name: &str) -> Option<ObjectPtr> {
		self.get_or_create(MemberKind::Property, name)
	}

	fn event(&self, name: &str) -> Option<ObjectPtr> {
		self.get_or_create(MemberKind::Event, name)
	}

	fn function(&self, name: &str) -> Option<ObjectPtr> {
		self.get_or_create(MemberKind::Function, name)
	}

	fn notify(&self, kind: MemberKind, name: &str, note: Notification) -> ReturnValue {
		let Notification::Changed = note;
		if kind != MemberKind::Property {
			return ReturnValue::InvalidArgument;
		}

		let cached = {
			let cache = self.cache.lock();
			cache
				.iter()
				.find(|(k, n, _)| *k == kind && *n == name)
				.map(|(_, _, handle)| handle.clone())
		};

		match cached {
			Some(handle) => match handle.as_any().downcast_ref::<PropertyImpl>() {
				Some(property) => {
					property.fire_changed();
					ReturnValue::Success
				}
				None => ReturnValue::Fail,
			},
			// No satellite yet means nobody can be listening.
			None if self.members.iter().any(|d| d.kind == kind && d.name == name) => {
				ReturnValue::NothingToDo
			}
			None => ReturnValue::InvalidArgument,
		}
	}
}
