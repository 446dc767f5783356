#![allow(dead_code)]

use std::{
	collections::BTreeMap,
	time::Duration
};
use chord_kv::{
	core::{
		ring::{Id, MAX_ID, next_id},
		data_store::{Key, Value},
		Config,
		DhtError,
		DhtResult,
		Node,
		NodeServer,
		Outcome
	},
	server::ServerManager
};
use anyhow::anyhow;
use rand::Rng;
use tokio::sync::broadcast::Receiver;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_logger() {
	// several tests share one process
	env_logger::builder().is_test(true).try_init().unwrap_or(());
}

// Port 0 so that tests can run in parallel
pub fn local(id: Id) -> Node {
	Node {
		id,
		addr: "127.0.0.1:0".to_string()
	}
}

pub async fn start_bootstrap(id: Id, objects: BTreeMap<Key, Value>) -> DhtResult<(NodeServer, ServerManager)> {
	let mut server = NodeServer::bootstrap(local(id), Config::default(), objects)?;
	let manager = server.start().await?;
	Ok((server, manager))
}

pub async fn start_member(id: Id, bootstrap: &NodeServer) -> DhtResult<(NodeServer, ServerManager)> {
	let mut server = NodeServer::member(local(id), &bootstrap.node().addr, Config::default())?;
	let manager = server.start().await?;
	Ok((server, manager))
}

pub async fn next_outcome(rx: &mut Receiver<Outcome>) -> anyhow::Result<Outcome> {
	Ok(tokio::time::timeout(TIMEOUT, rx.recv()).await??)
}

/// Outcome of an operation, whether returned directly or delivered later
pub async fn resolve(rx: &mut Receiver<Outcome>, result: DhtResult<Option<Outcome>>) -> anyhow::Result<Outcome> {
	match result? {
		Some(outcome) => Ok(outcome),
		None => next_outcome(rx).await
	}
}

/// Enter the ring and wait until the entry completes
pub async fn join(member: &NodeServer) -> anyhow::Result<Outcome> {
	let mut rx = member.subscribe();
	let result = member.enter().await;
	resolve(&mut rx, result).await
}

/// Enter until the entry sticks.
/// Entries racing with other joins may be dropped and have to be issued again.
pub async fn join_retrying(member: &NodeServer) -> anyhow::Result<()> {
	for _ in 0..10 {
		let result = match member.enter().await {
			Ok(Some(_)) => return Ok(()),
			Ok(None) => member.wait_connected(TIMEOUT).await,
			Err(e) => Err(e)
		};
		match result {
			Ok(()) => return Ok(()),
			// a placement that arrived after the watch gave up
			Err(DhtError::AlreadyConnected) => return Ok(()),
			Err(e @ DhtError::IdInUse(_)) => return Err(e.into()),
			Err(_) => tokio::time::sleep(Duration::from_millis(20)).await
		};
	}
	Err(anyhow!("{} did not enter", member.node()))
}

/// Start members one by one and join them in the given order
pub async fn join_all(ids: &[Id], bootstrap: &NodeServer) -> anyhow::Result<Vec<(NodeServer, ServerManager)>> {
	let mut members = Vec::new();
	for id in ids {
		let (member, manager) = start_member(*id, bootstrap).await?;
		join(&member).await?;
		members.push((member, manager));
	}
	Ok(members)
}

/// Poll until the condition holds
pub async fn eventually<F: Fn() -> bool>(f: F) -> bool {
	let deadline = tokio::time::Instant::now() + TIMEOUT;
	while tokio::time::Instant::now() < deadline {
		if f() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	f()
}

/// Ids met when walking successors from the first server
pub fn ring_walk(servers: &[&NodeServer]) -> anyhow::Result<Vec<Id>> {
	let start = servers.first().ok_or_else(|| anyhow!("empty ring"))?;
	let mut ids = vec![start.node().id];
	let mut current = start.successor().id;
	while current != start.node().id {
		if ids.len() > servers.len() {
			return Err(anyhow!("ring does not close: {:?}", ids));
		}
		ids.push(current);
		let server = servers.iter()
			.find(|s| s.node().id == current)
			.ok_or_else(|| anyhow!("unknown node {}", current))?;
		current = server.successor().id;
	}
	Ok(ids)
}

/// Pointers agree both ways and ranges partition the id space
pub fn converged(servers: &[&NodeServer]) -> bool {
	let mut total = 0;
	for s in servers {
		let range = match s.range() {
			Some(r) => r,
			None => return false
		};
		let successor = match servers.iter().find(|n| n.node().id == s.successor().id) {
			Some(n) => n,
			None => return false
		};
		if successor.predecessor().id != s.node().id {
			return false;
		}
		match successor.range() {
			Some(r) if r.start == next_id(range.end) => (),
			_ => return false
		};
		total += range.len();
	}
	total == MAX_ID
}

// Generate distinct keys in [0, MAX_ID)
pub fn generate_keys<T: Rng>(rng: &mut T, count: usize) -> Vec<Key> {
	let mut keys = Vec::new();
	while keys.len() < count {
		let key = rng.gen_range(0..MAX_ID);
		if !keys.contains(&key) {
			keys.push(key);
		}
	}
	keys
}
