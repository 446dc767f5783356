use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use crate::core::{
	ring::{Id, KeyRange},
	visited::Visited,
	data_store::{Key, Value},
	Node
};

/// Where a joining node lands in the ring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
	// both neighbours are the placing node of a singleton ring
	pub first_entry: bool,
	pub range: KeyRange,
	pub predecessor: Node,
	pub successor: Node,
	// the node that split its range
	pub placed_by: Id,
	pub bootstrap_id: Id,
	pub visited: Visited,
	pub migrated: BTreeMap<Key, Value>
}

/// One frame sent from a node to another.
/// Every connection carries exactly one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
	// Routed requests and their outcomes
	Lookup { key: Key, visited: Visited },
	LookupFound { key: Key, value: Value, visited: Visited },
	Insert { key: Key, value: Value, visited: Visited },
	InsertFound { key: Key, value: Value, visited: Visited },
	Delete { key: Key, visited: Visited },
	DeleteFound { key: Key, visited: Visited },

	// Join protocol
	Enter { node: Node },
	Entry { node: Node, visited: Visited },
	EnterComplete(Placement),
	EnterRejected { id: Id },
	// the entry went nowhere, the joining node may enter again
	EnterFailed { id: Id },
	NewSuccessor { node: Node },
	NewPredecessor { node: Node },

	// Leave protocol
	Exit { node: Node, range: KeyRange, migrated: BTreeMap<Key, Value> },
	Shutdown { origin: Id }
}

impl Message {
	pub fn tag(&self) -> &'static str {
		match self {
			Message::Lookup { .. } => "lookup",
			Message::LookupFound { .. } => "lookup_found",
			Message::Insert { .. } => "insert",
			Message::InsertFound { .. } => "insert_found",
			Message::Delete { .. } => "delete",
			Message::DeleteFound { .. } => "delete_found",
			Message::Enter { .. } => "enter",
			Message::Entry { .. } => "entry",
			Message::EnterComplete(_) => "enter_complete",
			Message::EnterRejected { .. } => "enter_rejected",
			Message::EnterFailed { .. } => "enter_failed",
			Message::NewSuccessor { .. } => "new_successor",
			Message::NewPredecessor { .. } => "new_predecessor",
			Message::Exit { .. } => "exit",
			Message::Shutdown { .. } => "shutdown"
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EnterReply {
	// id equals the bootstrap's, its successor's or predecessor's
	Collision,
	// passed on to the successor; placement arrives as EnterComplete
	Forwarded,
	Accepted(Placement)
}

/// Response frame, only for messages that need one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Reply {
	Enter(EnterReply),
	Ack(bool)
}
