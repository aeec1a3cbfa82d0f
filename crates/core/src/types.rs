//! Shared enums used across the whole API surface.

/// Result code returned by every operation in the object model.
///
/// Operations report outcomes in-band rather than through `Result`: a failed
/// write, an idempotent write, and a refused write are all ordinary answers a
/// caller may want to branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnValue {
	/// State changed.
	Success,
	/// Idempotent or no-op; no state changed, no events fired.
	NothingToDo,
	/// Generic refusal; no state changed.
	Fail,
	/// Null/shape violation in the arguments.
	InvalidArgument,
	/// Write refused because the target is read-only.
	ReadOnly,
}

impl ReturnValue {
	/// Returns true for outcomes that left the system in the requested state.
	pub const fn succeeded(self) -> bool {
		matches!(self, ReturnValue::Success | ReturnValue::NothingToDo)
	}
}

/// Execution mode for invocations and property writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeMode {
	/// Execute synchronously on the calling thread.
	Immediate,
	/// Queue for the next `update()` drain.
	Deferred,
}

/// Write access mode of a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
	ReadWrite,
	ReadOnly,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_succeeded() {
		assert!(ReturnValue::Success.succeeded());
		assert!(ReturnValue::NothingToDo.succeeded());
		assert!(!ReturnValue::Fail.succeeded());
		assert!(!ReturnValue::InvalidArgument.succeeded());
		assert!(!ReturnValue::ReadOnly.succeeded());
	}
}
