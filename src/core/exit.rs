use std::collections::BTreeMap;
use log::{info, warn, error};
use super::{
	node::{NodeServer, Node, EntryState},
	ring::{KeyRange, next_id},
	data_store::{Key, Value},
	outcome::Outcome,
	error::{*, DhtError::*}
};
use crate::{
	client,
	rpc::{Message, Reply}
};

impl NodeServer {
	/**
	 * Leave the ring.
	 *
	 * The whole range and its keys are handed to the predecessor,
	 * which must accept them before any pointer changes.
	 * Afterwards the predecessor and successor are linked to each other
	 * and the listener of this node is closed.
	 *
	 * This hand-off is a new protocol: nodes of the ring only ever
	 * learnt about joins before.
	 */
	pub async fn exit(&self) -> DhtResult<Outcome> {
		if self.is_bootstrap() {
			return Err(BootstrapCannotExit);
		}
		if self.entry_state() != EntryState::Connected {
			return Err(NotConnected);
		}

		let (range, migrated, predecessor, successor) = {
			let mut state = self.state.write();
			let range = state.range.take().ok_or(NotConnected)?;
			let migrated = state.store.take_all();
			(range, migrated, state.predecessor.clone(), state.successor.clone())
		};
		info!("{}: handing range {} with {} keys to {}", self.node, range, migrated.len(), predecessor);

		let message = Message::Exit {
			node: self.node.clone(),
			range,
			migrated: migrated.clone()
		};
		match client::call(&predecessor.addr, message, &self.config).await {
			Ok(Reply::Ack(true)) => (),
			Ok(Reply::Ack(false)) => {
				self.restore(range, migrated);
				return Err(ExitRefused(predecessor.id));
			},
			Ok(Reply::Enter(_)) => {
				self.restore(range, migrated);
				return Err(UnexpectedReply(predecessor.addr));
			},
			Err(e) => {
				error!("{}: exit failed: {}", self.node, e);
				self.restore(range, migrated);
				return Err(e);
			}
		};

		self.notify(&predecessor, Message::NewSuccessor { node: successor.clone() }).await;
		self.notify(&successor, Message::NewPredecessor { node: predecessor.clone() }).await;

		{
			let mut state = self.state.write();
			state.predecessor = self.node.clone();
			state.successor = self.node.clone();
		}
		self.entry.send_replace(EntryState::Disconnected);
		self.shutdown();

		Ok(Outcome::Exited {
			range,
			predecessor: predecessor.id,
			successor: successor.id
		})
	}

	fn restore(&self, range: KeyRange, migrated: BTreeMap<Key, Value>) {
		warn!("{}: keeping range {}", self.node, range);
		let mut state = self.state.write();
		state.range = Some(range);
		state.store.merge(migrated);
	}

	/// Take over the range of a leaving successor.
	/// Returns whether the hand-off was accepted.
	pub(crate) fn handle_exit(&self, node: &Node, range: KeyRange, migrated: BTreeMap<Key, Value>) -> bool {
		let mut state = self.state.write();
		let own = match state.range {
			Some(r) => r,
			None => {
				warn!("{}: refusing range {} of {}, not in the ring", self.node, range, node);
				return false;
			}
		};
		if state.successor.id != node.id || next_id(own.end) != range.start {
			warn!("{}: refusing range {} of {}, not adjacent to {}", self.node, range, node, own);
			return false;
		}

		let count = migrated.len();
		state.range = Some(KeyRange::new(own.start, range.end));
		state.store.merge(migrated);
		info!("{}: took over range {} with {} keys from {}", self.node, range, count, node);
		true
	}
}
