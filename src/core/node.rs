use std::{
	collections::BTreeMap,
	sync::Arc,
	time::Duration
};
use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use futures::{future, prelude::*};
use log::{info, warn, debug, error};
use tarpc::{
	serde_transport::tcp,
	tokio_serde::formats::Bincode
};
use tokio::sync::{broadcast, watch};
use super::{
	ring::*,
	config::Config,
	data_store::*,
	outcome::Outcome,
	routing::Request,
	trace::Trace,
	entry::Side,
	error::{
		*,
		DhtError::*
	}
};
use crate::{
	client::{self, ServerTransport},
	rpc::{Message, Reply},
	server::ServerManager
};

// Data part of the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
	pub id: Id,
	pub addr: String
}

impl std::fmt::Display for Node {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Node({}, {})", self.id, self.addr)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
	Bootstrap,
	Member {
		bootstrap_addr: String
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
	Disconnected,
	// enter sent, waiting for the placement
	Pending,
	Connected,
	// id already in use
	Rejected
}

/// Everything that changes while the node is part of the ring
pub(crate) struct RingState {
	// None while a member is outside the ring
	pub range: Option<KeyRange>,
	pub predecessor: Node,
	pub successor: Node,
	pub bootstrap_id: Id,
	pub store: DataStore,
	// neighbour updates that arrived before our own placement
	pub early_predecessor: Option<Node>,
	pub early_successor: Option<Node>
}

#[derive(Clone)]
pub struct NodeServer {
	pub(crate) node: Node,
	pub(crate) role: Role,
	pub(crate) config: Config,
	pub(crate) state: Arc<RwLock<RingState>>,
	pub(crate) entry: Arc<watch::Sender<EntryState>>,
	pub(crate) outcomes: broadcast::Sender<Outcome>,
	pub(crate) traces: broadcast::Sender<Trace>,
	pub(crate) shutdown_tx: Arc<watch::Sender<bool>>
}

fn server_codec() -> Bincode<Message, Reply> {
	Bincode::default()
}

impl NodeServer {
	fn new(node: Node, role: Role, config: Config, range: Option<KeyRange>, store: DataStore) -> DhtResult<Self> {
		if node.id >= MAX_ID {
			return Err(OutOfRange(node.id));
		}

		let entry_state = match role {
			Role::Bootstrap => EntryState::Connected,
			Role::Member { .. } => EntryState::Disconnected
		};
		let (entry, _) = watch::channel(entry_state);
		let (shutdown_tx, _) = watch::channel(false);
		let (outcomes, _) = broadcast::channel(config.outcome_capacity.max(1));
		let (traces, _) = broadcast::channel(config.outcome_capacity.max(1));

		// a node outside the ring is its own predecessor and successor
		let state = RingState {
			range,
			predecessor: node.clone(),
			successor: node.clone(),
			bootstrap_id: node.id,
			store,
			early_predecessor: None,
			early_successor: None
		};

		Ok(NodeServer {
			node,
			role,
			config,
			state: Arc::new(RwLock::new(state)),
			entry: Arc::new(entry),
			outcomes,
			traces,
			shutdown_tx: Arc::new(shutdown_tx)
		})
	}

	/// The rendezvous node: owns the whole ring until others enter
	pub fn bootstrap(node: Node, config: Config, objects: BTreeMap<Key, Value>) -> DhtResult<Self> {
		if let Some(key) = objects.keys().find(|k| **k >= MAX_ID) {
			return Err(OutOfRange(*key));
		}
		let range = KeyRange::full(node.id);
		Self::new(node, Role::Bootstrap, config, Some(range), DataStore::from_map(objects))
	}

	/// A node that joins the ring through the bootstrap at `bootstrap_addr`
	pub fn member(node: Node, bootstrap_addr: &str, config: Config) -> DhtResult<Self> {
		let role = Role::Member {
			bootstrap_addr: bootstrap_addr.to_string()
		};
		Self::new(node, role, config, None, DataStore::new())
	}

	pub fn node(&self) -> &Node {
		&self.node
	}

	pub fn is_bootstrap(&self) -> bool {
		self.role == Role::Bootstrap
	}

	pub fn range(&self) -> Option<KeyRange> {
		self.state.read().range
	}

	pub fn predecessor(&self) -> Node {
		self.state.read().predecessor.clone()
	}

	pub fn successor(&self) -> Node {
		self.state.read().successor.clone()
	}

	pub fn bootstrap_id(&self) -> Option<Id> {
		match self.entry_state() {
			EntryState::Connected => Some(self.state.read().bootstrap_id),
			_ => None
		}
	}

	pub fn store_snapshot(&self) -> BTreeMap<Key, Value> {
		self.state.read().store.snapshot()
	}

	pub fn entry_state(&self) -> EntryState {
		*self.entry.borrow()
	}

	/// Outcomes that arrive asynchronously:
	/// routed results at the bootstrap, forwarded entries at members
	pub fn subscribe(&self) -> broadcast::Receiver<Outcome> {
		self.outcomes.subscribe()
	}

	/// Per-hop trace of the routed requests this node handles
	pub fn subscribe_trace(&self) -> broadcast::Receiver<Trace> {
		self.traces.subscribe()
	}

	/**
	 * Wait until a pending entry completes.
	 * On timeout the entry is given up, so that `enter` can be issued again.
	 */
	pub async fn wait_connected(&self, timeout: Duration) -> DhtResult<()> {
		let result = self.await_entry(timeout).await;
		if let Err(Timeout(_)) = result {
			let gave_up = self.entry.send_if_modified(|state| {
				let pending = *state == EntryState::Pending;
				if pending {
					*state = EntryState::Disconnected;
				}
				pending
			});
			if gave_up {
				warn!("{}: no placement arrived, giving up the entry", self.node);
			}
		}
		result
	}

	pub(crate) async fn await_entry(&self, timeout: Duration) -> DhtResult<()> {
		let mut rx = self.entry.subscribe();
		let wait = async {
			loop {
				let state = *rx.borrow_and_update();
				match state {
					EntryState::Connected => return Ok(()),
					EntryState::Rejected => return Err(IdInUse(self.node.id)),
					EntryState::Disconnected => return Err(EntryDropped(self.node.id)),
					EntryState::Pending => ()
				};
				if rx.changed().await.is_err() {
					return Err(NotConnected);
				}
			}
		};
		match tokio::time::timeout(timeout, wait).await {
			Ok(result) => result,
			Err(_) => Err(Timeout(format!("entry of {}", self.node)))
		}
	}

	/// Start the server
	/// Returns once the listener is bound
	pub async fn start(&mut self) -> DhtResult<ServerManager> {
		let mut listener = tcp::listen(self.node.addr.as_str(), server_codec).await?;
		listener.config_mut().max_frame_length(usize::MAX);
		self.advertise(listener.local_addr().port());

		// a node that left the ring may listen again
		self.shutdown_tx.send_replace(false);
		let server = self.clone();
		let mut shutdown_rx = self.shutdown_tx.subscribe();
		// Listen for messages
		let listener_handle = tokio::spawn(async move {
			let max_connections = server.config.max_connections.max(1) as usize;
			let mut fatal = Box::pin(listener
				.filter_map(|r| future::ready(r.ok()))
				// Each connection runs in its own task so that shutdown does not cancel it
				.map(|transport| tokio::spawn(server.clone().serve(transport)))
				.buffer_unordered(max_connections)
				.filter_map(|r| future::ready(match r {
					Ok(Ok(())) => None,
					Ok(Err(e)) if e.is_fatal() => Some(e),
					Ok(Err(e)) => {
						error!("{}: connection failed: {}", server.node, e);
						None
					},
					Err(e) => {
						error!("{}: connection task failed: {}", server.node, e);
						None
					}
				})));

			debug!("{}: listening", server.node);

			let stopped = async {
				loop {
					let stop = *shutdown_rx.borrow_and_update();
					if stop || shutdown_rx.changed().await.is_err() {
						break;
					}
				}
			};

			tokio::select! {
				e = fatal.next() => match e {
					Some(e) => {
						error!("{}: fatal error, stopping: {}", server.node, e);
						Err(e)
					},
					None => {
						warn!("{}: listener terminated", server.node);
						Ok(())
					}
				},
				_ = stopped => {
					debug!("{}: listener stopped gracefully", server.node);
					Ok(())
				}
			}
		});

		info!("{}: listening at {}", self.node, self.node.addr);
		Ok(ServerManager {
			handle: listener_handle,
			tx: self.shutdown_tx.clone()
		})
	}

	// Port 0 binds to any free port; advertise the real one
	fn advertise(&mut self, port: u16) {
		let host = match self.node.addr.rsplit_once(':') {
			Some((host, _)) => host.to_string(),
			None => self.node.addr.clone()
		};
		let addr = format!("{}:{}", host, port);
		if addr == self.node.addr {
			return;
		}

		let mut guard = self.state.write();
		let state = &mut *guard;
		for n in [&mut state.predecessor, &mut state.successor] {
			if n.id == self.node.id {
				n.addr = addr.clone();
			}
		}
		self.node.addr = addr;
	}

	/// Stop accepting connections. Connections in flight still complete.
	pub fn shutdown(&self) {
		info!("{}: shutting down", self.node);
		self.shutdown_tx.send_replace(true);
	}

	/// Shut down every node of the ring, starting from the successor
	pub async fn shutdown_ring(&self) {
		let successor = self.successor();
		if successor.id != self.node.id {
			self.notify(&successor, Message::Shutdown { origin: self.node.id }).await;
		}
		self.shutdown();
	}

	async fn handle_shutdown(&self, origin: Id) {
		let successor = self.successor();
		if successor.id != origin && successor.id != self.node.id {
			self.notify(&successor, Message::Shutdown { origin }).await;
		}
		self.shutdown();
	}

	/// Send a message to a peer, logging failures
	pub(crate) async fn forward(&self, message: Message, node: &Node) -> DhtResult<()> {
		debug!("{}: sending {} to {}", self.node, message.tag(), node);
		client::send_message(&node.addr, message, &self.config)
			.await
			.map_err(|e| {
				error!("{}: failed to send to {}: {}", self.node, node, e);
				e
			})
	}

	/// Like forward, when nothing can be done about a failure
	pub(crate) async fn notify(&self, node: &Node, message: Message) {
		self.forward(message, node).await.unwrap_or(());
	}

	/// Deliver an outcome to subscribers
	pub(crate) fn emit(&self, outcome: Outcome) {
		info!("{}: {}", self.node, outcome.to_string().replace('\n', " | "));
		// no subscriber is fine
		self.outcomes.send(outcome).unwrap_or(0);
	}

	pub(crate) fn trace(&self, trace: Trace) {
		debug!("{}: {}", self.node, trace.to_string().replace('\n', " "));
		self.traces.send(trace).unwrap_or(0);
	}

	// Handle a single inbound connection: one frame in, at most one frame out
	async fn serve(self, mut transport: ServerTransport) -> DhtResult<()> {
		let timeout = Duration::from_millis(self.config.reply_timeout);
		let message = match tokio::time::timeout(timeout, transport.next()).await {
			Ok(Some(Ok(m))) => m,
			Ok(Some(Err(e))) => return Err(client::read_error("inbound connection", e)),
			// closed without a frame
			Ok(None) => return Ok(()),
			Err(_) => return Err(Timeout("inbound connection".to_string()))
		};
		debug!("{}: received {}", self.node, message.tag());

		match message {
			Message::Lookup { key, visited } => {
				self.handle_request(Request::Lookup { key }, visited).await
			},
			Message::Insert { key, value, visited } => {
				self.handle_request(Request::Insert { key, value }, visited).await
			},
			Message::Delete { key, visited } => {
				self.handle_request(Request::Delete { key }, visited).await
			},
			Message::LookupFound { key, value, visited } => {
				self.handle_found(Outcome::Lookup { key, value: Some(value), visited });
				Ok(())
			},
			Message::InsertFound { key, value, visited } => {
				self.handle_found(Outcome::Insert { key, value, visited });
				Ok(())
			},
			Message::DeleteFound { key, visited } => {
				self.handle_found(Outcome::Delete { key, deleted: true, visited });
				Ok(())
			},
			Message::Enter { node } => self.handle_enter(node, &mut transport).await,
			Message::Entry { node, visited } => self.handle_entry(node, visited).await,
			Message::EnterComplete(placement) => self.handle_enter_complete(placement).await,
			Message::EnterRejected { id } => {
				self.handle_enter_rejected(id);
				Ok(())
			},
			Message::EnterFailed { id } => {
				self.handle_enter_failed(id);
				Ok(())
			},
			Message::NewSuccessor { node } => {
				self.handle_new_neighbour(Side::Successor, node);
				Ok(())
			},
			Message::NewPredecessor { node } => {
				self.handle_new_neighbour(Side::Predecessor, node);
				Ok(())
			},
			Message::Exit { node, range, migrated } => {
				let accepted = self.handle_exit(&node, range, migrated);
				reply(&mut transport, Reply::Ack(accepted)).await
			},
			Message::Shutdown { origin } => {
				self.handle_shutdown(origin).await;
				Ok(())
			}
		}
	}

	// *_found messages only mean something to the bootstrap
	fn handle_found(&self, outcome: Outcome) {
		if !self.is_bootstrap() {
			warn!("{}: ignoring result for key {:?}, not the bootstrap", self.node, outcome.key());
			return;
		}
		self.emit(outcome);
	}
}

pub(crate) async fn reply(transport: &mut ServerTransport, reply: Reply) -> DhtResult<()> {
	transport.send(reply).await?;
	Ok(())
}
