use super::{
	ring::{Id, KeyRange},
	visited::Visited,
	data_store::{Key, Value}
};

/// Result of a public node operation, rendered for the console
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
	Lookup { key: Key, value: Option<Value>, visited: Visited },
	Insert { key: Key, value: Value, visited: Visited },
	// insert went around the whole ring without an owner
	InsertFailed { key: Key, visited: Visited },
	Delete { key: Key, deleted: bool, visited: Visited },
	Entered { range: KeyRange, predecessor: Id, successor: Id, visited: Visited },
	Exited { range: KeyRange, predecessor: Id, successor: Id }
}

impl Outcome {
	pub fn key(&self) -> Option<Key> {
		match self {
			Outcome::Lookup { key, .. }
				| Outcome::Insert { key, .. }
				| Outcome::InsertFailed { key, .. }
				| Outcome::Delete { key, .. } => Some(*key),
			_ => None
		}
	}

	pub fn visited(&self) -> Option<&Visited> {
		match self {
			Outcome::Lookup { visited, .. }
				| Outcome::Insert { visited, .. }
				| Outcome::InsertFailed { visited, .. }
				| Outcome::Delete { visited, .. }
				| Outcome::Entered { visited, .. } => Some(visited),
			Outcome::Exited { .. } => None
		}
	}
}

impl std::fmt::Display for Outcome {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Outcome::Lookup { key, value, visited } => {
				writeln!(f, "Key: {}", key)?;
				match value {
					Some(v) => writeln!(f, "Value: {}", v)?,
					None => writeln!(f, "Key not found")?
				};
				write!(f, "Visited Servers: {}", visited)
			},
			Outcome::Insert { key, visited, .. } => {
				writeln!(f, "Key: {}", key)?;
				writeln!(f, "Inserted on Server: {}", visited.last().unwrap_or_default())?;
				write!(f, "Visited Servers: {}", visited)
			},
			Outcome::InsertFailed { key, .. } => {
				writeln!(f, "Key: {}", key)?;
				write!(f, "Insert failed, message reached back to bootstrap server.")
			},
			Outcome::Delete { key, deleted, visited } => {
				writeln!(f, "Key: {}", key)?;
				if *deleted {
					writeln!(f, "Successful deletion")?;
				} else {
					writeln!(f, "Key not found")?;
				}
				write!(f, "Visited Servers: {}", visited)
			},
			Outcome::Entered { range, predecessor, successor, visited } => {
				writeln!(f, "Successful entry.")?;
				writeln!(f, "Key Range: {}", range)?;
				writeln!(f, "Predecessor: {}", predecessor)?;
				writeln!(f, "Successor: {}", successor)?;
				write!(f, "Visited Servers: {}", visited)
			},
			Outcome::Exited { range, predecessor, successor } => {
				writeln!(f, "Successful exit.")?;
				writeln!(f, "Key Range: {} handed to Server: {}", range, predecessor)?;
				write!(f, "Successor: {}", successor)
			}
		}
	}
}
