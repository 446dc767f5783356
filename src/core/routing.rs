use log::{debug, error};
use super::{
	node::{NodeServer, Role},
	ring::MAX_ID,
	data_store::{KVStore, Key, Value},
	visited::Visited,
	outcome::Outcome,
	trace::{Trace, Hop},
	error::{*, DhtError::*}
};
use crate::{client, rpc::Message};

/// A key operation routed around the ring
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
	Lookup { key: Key },
	Insert { key: Key, value: Value },
	Delete { key: Key }
}

impl Request {
	pub fn key(&self) -> Key {
		match self {
			Request::Lookup { key } | Request::Insert { key, .. } | Request::Delete { key } => *key
		}
	}

	fn into_message(self, visited: Visited) -> Message {
		match self {
			Request::Lookup { key } => Message::Lookup { key, visited },
			Request::Insert { key, value } => Message::Insert { key, value, visited },
			Request::Delete { key } => Message::Delete { key, visited }
		}
	}

	/// Outcome when no node claimed the key
	fn miss(self, visited: Visited) -> Outcome {
		match self {
			Request::Lookup { key } => Outcome::Lookup { key, value: None, visited },
			Request::Insert { key, .. } => Outcome::InsertFailed { key, visited },
			Request::Delete { key } => Outcome::Delete { key, deleted: false, visited }
		}
	}
}

impl std::fmt::Display for Request {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Request::Lookup { key } => write!(f, "lookup\t{}", key),
			Request::Insert { key, value } => write!(f, "insert\t{}\t{}", key, value),
			Request::Delete { key } => write!(f, "delete\t{}", key)
		}
	}
}

fn found_message(outcome: Outcome) -> Option<Message> {
	match outcome {
		Outcome::Lookup { key, value: Some(value), visited } => Some(Message::LookupFound { key, value, visited }),
		Outcome::Insert { key, value, visited } => Some(Message::InsertFound { key, value, visited }),
		Outcome::Delete { key, deleted: true, visited } => Some(Message::DeleteFound { key, visited }),
		_ => None
	}
}

fn check_key(key: Key) -> DhtResult<()> {
	if key >= MAX_ID {
		return Err(OutOfRange(key));
	}
	Ok(())
}

impl NodeServer {
	/// Look a key up on the ring.
	/// Returns the outcome if it is known right away;
	/// otherwise it is delivered to the bootstrap's subscribers.
	pub async fn lookup(&self, key: Key) -> DhtResult<Option<Outcome>> {
		self.originate(Request::Lookup { key }).await
	}

	pub async fn insert(&self, key: Key, value: Value) -> DhtResult<Option<Outcome>> {
		self.originate(Request::Insert { key, value }).await
	}

	pub async fn delete(&self, key: Key) -> DhtResult<Option<Outcome>> {
		self.originate(Request::Delete { key }).await
	}

	// Requests always start at the bootstrap
	async fn originate(&self, request: Request) -> DhtResult<Option<Outcome>> {
		check_key(request.key())?;
		match &self.role {
			Role::Bootstrap => self.route(request, Visited::seeded(self.node.id)).await,
			Role::Member { bootstrap_addr } => {
				debug!("{}: passing {} to the bootstrap", self.node, request);
				client::send_message(bootstrap_addr, request.into_message(Visited::new()), &self.config).await?;
				Ok(None)
			}
		}
	}

	/// A routed request received from another node
	pub(crate) async fn handle_request(&self, request: Request, mut visited: Visited) -> DhtResult<()> {
		check_key(request.key())?;

		if self.is_bootstrap() {
			if visited.is_empty() {
				// passed on by a member
				if let Some(outcome) = self.route(request, Visited::seeded(self.node.id)).await? {
					self.emit(outcome);
				}
			}
			else {
				// went around the whole ring
				self.emit(request.miss(visited));
			}
			return Ok(());
		}

		if visited.contains(self.node.id) {
			error!("{}: {} came back without reaching the bootstrap", self.node, request);
			self.trace(Trace { request: request.clone(), visited: visited.clone(), hop: Hop::Returned });
			return self.send_to_bootstrap(request.into_message(visited)).await;
		}

		visited.push(self.node.id);
		self.route(request, visited).await.map(|_| ())
	}

	/**
	 * Handle a request locally if this node owns the key,
	 * otherwise forward it to the successor.
	 * `visited` already ends with this node.
	 */
	async fn route(&self, request: Request, visited: Visited) -> DhtResult<Option<Outcome>> {
		let key = request.key();
		let (local, successor) = {
			let mut state = self.state.write();
			let owned = match state.range {
				Some(range) => range.contains(key)?,
				None => false
			};

			let local = if owned {
				match &request {
					Request::Lookup { key } => state.store.get(*key).map(|value| Outcome::Lookup {
						key: *key,
						value: Some(value),
						visited: visited.clone()
					}),
					Request::Insert { key, value } => {
						state.store.put(*key, value.clone());
						Some(Outcome::Insert {
							key: *key,
							value: value.clone(),
							visited: visited.clone()
						})
					},
					Request::Delete { key } => state.store.delete(*key).then(|| Outcome::Delete {
						key: *key,
						deleted: true,
						visited: visited.clone()
					})
				}
			} else {
				None
			};
			(local, state.successor.clone())
		};

		if let Some(outcome) = local {
			self.trace(Trace { request, visited, hop: Hop::Handled });
			if self.is_bootstrap() {
				return Ok(Some(outcome));
			}
			if let Some(message) = found_message(outcome) {
				self.send_to_bootstrap(message).await?;
			}
			return Ok(None);
		}

		if successor.id == self.node.id {
			// nobody else to ask
			self.trace(Trace { request: request.clone(), visited: visited.clone(), hop: Hop::Missed });
			if self.is_bootstrap() {
				return Ok(Some(request.miss(visited)));
			}
			self.send_to_bootstrap(request.into_message(visited)).await?;
			return Ok(None);
		}

		self.trace(Trace {
			request: request.clone(),
			visited: visited.clone(),
			hop: Hop::Forwarded { successor: successor.id }
		});
		self.forward(request.into_message(visited), &successor).await?;
		Ok(None)
	}

	async fn send_to_bootstrap(&self, message: Message) -> DhtResult<()> {
		match &self.role {
			Role::Member { bootstrap_addr } => {
				debug!("{}: sending {} to the bootstrap", self.node, message.tag());
				client::send_message(bootstrap_addr, message, &self.config)
					.await
					.map_err(|e| {
						error!("{}: failed to reach the bootstrap: {}", self.node, e);
						e
					})
			},
			Role::Bootstrap => Ok(())
		}
	}
}
