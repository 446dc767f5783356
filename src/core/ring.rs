use serde::{Serialize, Deserialize};
use super::error::{DhtResult, DhtError::OutOfRange};

pub type Id = u32;
// size of the identifier space
pub const MAX_ID: Id = 1024;

/// Next id clockwise
pub fn next_id(id: Id) -> Id {
	(id + 1) % MAX_ID
}

/// Inclusive on both ends: index in [start, end].
/// start > end means the range wraps through 0.
pub fn between_range(index: Id, start: Id, end: Id) -> DhtResult<bool> {
	if index >= MAX_ID {
		return Err(OutOfRange(index));
	}

	if start <= end {
		Ok(index >= start && index <= end)
	}
	else {
		Ok(index >= start || index <= end)
	}
}

/// Inclusive, possibly wrapping range of keys owned by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
	pub start: Id,
	pub end: Id
}

impl KeyRange {
	pub fn new(start: Id, end: Id) -> Self {
		KeyRange { start, end }
	}

	/// The whole ring, anchored so that `id` is the last key
	pub fn full(id: Id) -> Self {
		KeyRange {
			start: next_id(id),
			end: id
		}
	}

	pub fn is_full(&self) -> bool {
		next_id(self.end) == self.start
	}

	pub fn contains(&self, index: Id) -> DhtResult<bool> {
		between_range(index, self.start, self.end)
	}

	/// Number of keys in the range
	pub fn len(&self) -> u32 {
		if self.start <= self.end {
			self.end - self.start + 1
		} else {
			MAX_ID - self.start + self.end + 1
		}
	}
}

impl std::fmt::Display for KeyRange {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}-{}", self.start, self.end)
	}
}
