//! Object-model core.
//!
//! The pointer-level machinery everything else builds on: 128-bit type
//! UIDs, the control-block refcount protocol with external destroy
//! callbacks, strong/weak handles, the object trait with UID-keyed facet
//! dispatch, static member descriptors, and class factories.
//!
//! This crate is deliberately policy-free: the process singleton, the
//! deferred scheduler, and the concrete property/event/function classes
//! live in `apiary-runtime`; the paged containers live in `apiary-hive`.

mod block;
pub mod block_pool;
mod descriptor;
mod facet;
mod factory;
mod handle;
mod object;
mod types;
mod uid;

pub use block::{ControlBlock, DeallocFn, DestroyFn, release_strong, release_weak};
pub use descriptor::{MemberDesc, MemberKind, Notification, default_value};
pub use facet::{
	Args, Callback, Facet, Future, Hive, HiveStore, Invocable, Metadata, Property, RawDropFn,
	RawHive, Value, iface,
};
pub use factory::{ClassFactory, ClassInfo, Construct, ObjectFactory};
pub use handle::{ObjectPtr, WeakObjectPtr};
pub use object::{MetaSlot, Object, ObjectCore};
pub use types::{AccessMode, InvokeMode, ReturnValue};
pub use uid::{AnyData, TypeKey, Uid};
