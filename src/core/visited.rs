use serde::{Serialize, Deserialize};
use super::ring::Id;

/// Ordered trace of the nodes a request passed through
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visited(Vec<Id>);

impl Visited {
	pub fn new() -> Self {
		Visited(Vec::new())
	}

	/// Start a trace at the originating node
	pub fn seeded(id: Id) -> Self {
		Visited(vec![id])
	}

	pub fn push(&mut self, id: Id) {
		self.0.push(id);
	}

	pub fn contains(&self, id: Id) -> bool {
		self.0.contains(&id)
	}

	pub fn first(&self) -> Option<Id> {
		self.0.first().copied()
	}

	pub fn last(&self) -> Option<Id> {
		self.0.last().copied()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn as_slice(&self) -> &[Id] {
		&self.0
	}
}

impl From<Vec<Id>> for Visited {
	fn from(ids: Vec<Id>) -> Self {
		Visited(ids)
	}
}

impl std::fmt::Display for Visited {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let ids: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
		write!(f, "{}", ids.join(" "))
	}
}
