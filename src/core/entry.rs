use std::{collections::BTreeMap, time::Duration};
use log::{info, warn, debug, error};
use super::{
	node::{NodeServer, Node, Role, EntryState, reply},
	ring::{Id, KeyRange, between_range, next_id},
	data_store::{Key, Value},
	visited::Visited,
	outcome::Outcome,
	error::{*, DhtError::*}
};
use crate::{
	client::{self, ServerTransport},
	rpc::{Message, Reply, EnterReply, Placement}
};

// State of the placement node before it split its range
struct Undo {
	range: KeyRange,
	predecessor: Node,
	successor: Node
}

/// Which pointer a neighbour update replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
	Predecessor,
	Successor
}

enum Decision {
	Collision,
	Placed(Placement, Undo),
	// joining id is outside of this node's range
	NotOwner(Node)
}

impl NodeServer {
	/**
	 * Join the ring through the bootstrap.
	 * Returns the outcome if the bootstrap placed this node itself;
	 * Ok(None) means the entry was forwarded and completes later
	 * (see `wait_connected` and `subscribe`).
	 */
	pub async fn enter(&self) -> DhtResult<Option<Outcome>> {
		let bootstrap_addr = match &self.role {
			Role::Bootstrap => return Err(AlreadyConnected),
			Role::Member { bootstrap_addr } => bootstrap_addr
		};
		match self.entry_state() {
			EntryState::Connected => return Err(AlreadyConnected),
			EntryState::Pending => return Err(EntryPending),
			EntryState::Disconnected | EntryState::Rejected => ()
		};

		{
			let mut state = self.state.write();
			state.early_predecessor = None;
			state.early_successor = None;
		}
		self.entry.send_replace(EntryState::Pending);
		info!("{}: entering through {}", self.node, bootstrap_addr);

		let message = Message::Enter { node: self.node.clone() };
		let result = match client::call(bootstrap_addr, message, &self.config).await {
			Ok(r) => r,
			Err(e) => {
				error!("{}: entry failed: {}", self.node, e);
				self.entry.send_replace(EntryState::Disconnected);
				return Err(e);
			}
		};

		match result {
			Reply::Enter(EnterReply::Accepted(placement)) => {
				self.accept_placement(placement).await.map(Some)
			},
			Reply::Enter(EnterReply::Forwarded) => {
				debug!("{}: entry forwarded, waiting for placement", self.node);
				Ok(None)
			},
			Reply::Enter(EnterReply::Collision) => {
				error!("{}: ID {} is already in use", self.node, self.node.id);
				self.entry.send_replace(EntryState::Rejected);
				Err(IdInUse(self.node.id))
			},
			Reply::Ack(_) => {
				self.entry.send_replace(EntryState::Disconnected);
				Err(UnexpectedReply(bootstrap_addr.clone()))
			}
		}
	}

	// Take over the placement computed by another node
	async fn accept_placement(&self, placement: Placement) -> DhtResult<Outcome> {
		let Placement {
			range,
			predecessor,
			successor,
			placed_by,
			bootstrap_id,
			visited,
			migrated,
			..
		} = placement;

		let count = migrated.len();
		// Connected is published under the state lock,
		// so a neighbour update is either held back or applied afterwards
		let (early_predecessor, early_successor, final_predecessor, final_successor) = {
			let mut guard = self.state.write();
			let state = &mut *guard;
			let early_predecessor = state.early_predecessor.take();
			let early_successor = state.early_successor.take();
			state.range = Some(range);
			state.predecessor = early_predecessor.clone().unwrap_or_else(|| predecessor.clone());
			state.successor = early_successor.clone().unwrap_or_else(|| successor.clone());
			state.bootstrap_id = bootstrap_id;
			state.store.merge(migrated);
			self.entry.send_replace(EntryState::Connected);
			(early_predecessor, early_successor, state.predecessor.id, state.successor.id)
		};
		info!("{}: entered with range {}, {} keys migrated", self.node, range, count);

		// the placement node already points to us; fix the other side
		// unless a node placed after us has already taken it
		if predecessor.id != placed_by {
			if early_predecessor.is_none() {
				self.notify(&predecessor, Message::NewSuccessor { node: self.node.clone() }).await;
			}
		}
		else if successor.id != placed_by && early_successor.is_none() {
			self.notify(&successor, Message::NewPredecessor { node: self.node.clone() }).await;
		}

		Ok(Outcome::Entered {
			range,
			predecessor: final_predecessor,
			successor: final_successor,
			visited
		})
	}

	/// Enter request from a joining node, answered on the same connection
	pub(crate) async fn handle_enter(&self, node: Node, transport: &mut ServerTransport) -> DhtResult<()> {
		if !self.is_bootstrap() {
			warn!("{}: {} entered through a node that is not the bootstrap", self.node, node);
		}

		let visited = Visited::seeded(self.node.id);
		match self.place(&node, &visited)? {
			Decision::Collision => {
				warn!("{}: rejecting {}, ID in use", self.node, node);
				reply(transport, Reply::Enter(EnterReply::Collision)).await
			},
			Decision::Placed(placement, undo) => {
				let migrated = placement.migrated.clone();
				let range = placement.range;
				if let Err(e) = reply(transport, Reply::Enter(EnterReply::Accepted(placement))).await {
					error!("{}: failed to answer {}: {}", self.node, node, e);
					self.rollback(undo, migrated);
					return Err(e);
				}
				info!("{}: placed {} with range {}", self.node, node, range);
				Ok(())
			},
			Decision::NotOwner(successor) => {
				self.forward(Message::Entry { node, visited }, &successor).await?;
				reply(transport, Reply::Enter(EnterReply::Forwarded)).await
			}
		}
	}

	/// Entry request passed along the ring
	pub(crate) async fn handle_entry(&self, node: Node, mut visited: Visited) -> DhtResult<()> {
		if visited.contains(self.node.id) {
			self.drop_entry(&node, format!("full lap {}", visited)).await;
			return Ok(());
		}
		visited.push(self.node.id);

		// our own placement may still be on its way
		if self.entry_state() == EntryState::Pending {
			debug!("{}: holding entry of {} until this node is placed", self.node, node);
			let timeout = Duration::from_millis(self.config.reply_timeout);
			if let Err(e) = self.await_entry(timeout).await {
				self.drop_entry(&node, e).await;
				return Ok(());
			}
		}

		let decision = match self.place(&node, &visited) {
			Ok(d) => d,
			Err(e) => {
				self.drop_entry(&node, e).await;
				return Ok(());
			}
		};
		match decision {
			Decision::Collision => {
				warn!("{}: rejecting {}, ID in use", self.node, node);
				self.notify(&node, Message::EnterRejected { id: node.id }).await;
				Ok(())
			},
			Decision::Placed(placement, undo) => {
				let migrated = placement.migrated.clone();
				let range = placement.range;
				if let Err(e) = self.forward(Message::EnterComplete(placement), &node).await {
					self.rollback(undo, migrated);
					return Err(e);
				}
				info!("{}: placed {} with range {}", self.node, node, range);
				Ok(())
			},
			Decision::NotOwner(successor) => {
				debug!("{}: entry of {} not in range, forwarding to {}", self.node, node, successor.id);
				if let Err(e) = self.forward(Message::Entry { node: node.clone(), visited }, &successor).await {
					self.drop_entry(&node, &e).await;
					return Err(e);
				}
				Ok(())
			}
		}
	}

	// Tell the joining node that its entry went nowhere
	async fn drop_entry(&self, node: &Node, reason: impl std::fmt::Display) {
		warn!("{}: dropping entry of {}: {}", self.node, node, reason);
		self.notify(node, Message::EnterFailed { id: node.id }).await;
	}

	/**
	 * Split this node's range if it contains the joining id.
	 * The joining node lands right before this node,
	 * or right after it when the range extends past this node's id.
	 * Ranges, pointers and keys are updated atomically.
	 */
	fn place(&self, node: &Node, visited: &Visited) -> DhtResult<Decision> {
		let mut guard = self.state.write();
		let state = &mut *guard;

		if node.id == self.node.id || node.id == state.successor.id || node.id == state.predecessor.id {
			return Ok(Decision::Collision);
		}
		let range = state.range.ok_or(NotConnected)?;
		if !range.contains(node.id)? {
			return Ok(Decision::NotOwner(state.successor.clone()));
		}

		let undo = Undo {
			range,
			predecessor: state.predecessor.clone(),
			successor: state.successor.clone()
		};
		let first_entry = state.successor.id == self.node.id;

		let (new_range, predecessor, successor) = if between_range(node.id, range.start, self.node.id)? {
			let new_range = KeyRange::new(range.start, node.id);
			let predecessor = state.predecessor.clone();
			state.range = Some(KeyRange::new(next_id(node.id), range.end));
			state.predecessor = node.clone();
			if first_entry {
				state.successor = node.clone();
			}
			(new_range, predecessor, self.node.clone())
		}
		else {
			let new_range = KeyRange::new(next_id(self.node.id), range.end);
			let successor = state.successor.clone();
			state.range = Some(KeyRange::new(range.start, self.node.id));
			state.successor = node.clone();
			if first_entry {
				state.predecessor = node.clone();
			}
			(new_range, self.node.clone(), successor)
		};

		let migrated = state.store.extract_range(new_range);
		debug!("{}: migrating {} keys in {} to {}", self.node, migrated.len(), new_range, node);

		Ok(Decision::Placed(Placement {
			first_entry,
			range: new_range,
			predecessor,
			successor,
			placed_by: self.node.id,
			bootstrap_id: state.bootstrap_id,
			visited: visited.clone(),
			migrated
		}, undo))
	}

	fn rollback(&self, undo: Undo, migrated: BTreeMap<Key, Value>) {
		warn!("{}: placement not delivered, restoring range {}", self.node, undo.range);
		let mut state = self.state.write();
		state.range = Some(undo.range);
		state.predecessor = undo.predecessor;
		state.successor = undo.successor;
		state.store.merge(migrated);
	}

	/// Placement computed by a node other than the bootstrap.
	/// One that arrives after the entry was given up is still taken,
	/// since the placement node already points to this node.
	pub(crate) async fn handle_enter_complete(&self, placement: Placement) -> DhtResult<()> {
		let expected = match self.entry_state() {
			EntryState::Pending => true,
			EntryState::Disconnected => self.range().is_none(),
			EntryState::Connected | EntryState::Rejected => false
		};
		if self.is_bootstrap() || !expected {
			warn!("{}: ignoring placement by {}, no entry pending", self.node, placement.placed_by);
			return Ok(());
		}
		let outcome = self.accept_placement(placement).await?;
		self.emit(outcome);
		Ok(())
	}

	pub(crate) fn handle_enter_rejected(&self, id: Id) {
		if id != self.node.id || self.entry_state() != EntryState::Pending {
			warn!("{}: ignoring rejection of ID {}", self.node, id);
			return;
		}
		error!("{}: ID {} is already in use", self.node, id);
		self.entry.send_replace(EntryState::Rejected);
	}

	pub(crate) fn handle_enter_failed(&self, id: Id) {
		if id != self.node.id || self.entry_state() != EntryState::Pending {
			warn!("{}: ignoring failed entry of ID {}", self.node, id);
			return;
		}
		warn!("{}: entry was dropped, enter again", self.node);
		self.entry.send_replace(EntryState::Disconnected);
	}

	/**
	 * NewSuccessor/NewPredecessor from a node that just entered.
	 * While our own entry is pending the update is held back
	 * and applied on top of the placement.
	 */
	pub(crate) fn handle_new_neighbour(&self, side: Side, node: Node) {
		let mut guard = self.state.write();
		let state = &mut *guard;
		match self.entry_state() {
			EntryState::Connected => {
				debug!("{}: new {:?} {}", self.node, side, node);
				match side {
					Side::Predecessor => state.predecessor = node,
					Side::Successor => state.successor = node
				};
			},
			EntryState::Pending => {
				debug!("{}: holding {:?} {} until this node is placed", self.node, side, node);
				match side {
					Side::Predecessor => state.early_predecessor = Some(node),
					Side::Successor => state.early_successor = Some(node)
				};
			},
			EntryState::Disconnected | EntryState::Rejected => {
				warn!("{}: ignoring {:?} {}, not in the ring", self.node, side, node);
			}
		};
	}
}
