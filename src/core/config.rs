use std::{
	collections::BTreeMap,
	default::Default,
	path::Path,
	str::FromStr
};
use super::{
	ring::{Id, MAX_ID},
	error::{DhtResult, DhtError}
};

#[derive(Clone, Debug)]
pub struct Config {
	/// max number of inbound connections handled concurrently
	pub max_connections: u64,
	/// timeout in ms for connecting and writing to a peer
	pub connect_timeout: u64,
	/// timeout in ms for waiting on a reply frame
	pub reply_timeout: u64,
	/// buffered outcomes and trace lines per subscriber
	pub outcome_capacity: usize
}

impl Default for Config {
	fn default() -> Self {
		Self {
			max_connections: 16,
			connect_timeout: 2000,
			reply_timeout: 5000,
			outcome_capacity: 64
		}
	}
}

fn parse_field<T: FromStr>(field: Option<&str>, name: &str) -> DhtResult<T> {
	let field = field
		.map(str::trim)
		.filter(|f| !f.is_empty())
		.ok_or_else(|| DhtError::Config(format!("missing {}", name)))?;
	field.parse()
		.map_err(|_| DhtError::Config(format!("invalid {}: {}", name, field)))
}

fn parse_id(field: Option<&str>, name: &str) -> DhtResult<Id> {
	let id: Id = parse_field(field, name)?;
	if id >= MAX_ID {
		return Err(DhtError::OutOfRange(id));
	}
	Ok(id)
}

fn read_file(path: &Path) -> DhtResult<String> {
	std::fs::read_to_string(path)
		.map_err(|e| DhtError::Config(format!("cannot read {}: {}", path.display(), e)))
}

/// Bootstrap config file:
/// id, port, then one `<key> <value>` pair per line
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapFile {
	pub id: Id,
	pub port: u16,
	pub objects: BTreeMap<Id, String>
}

impl BootstrapFile {
	pub fn load(path: impl AsRef<Path>) -> DhtResult<Self> {
		read_file(path.as_ref())?.parse()
	}
}

impl FromStr for BootstrapFile {
	type Err = DhtError;

	fn from_str(s: &str) -> DhtResult<Self> {
		let mut lines = s.lines();
		let id = parse_id(lines.next(), "id")?;
		let port = parse_field(lines.next(), "port")?;

		let mut objects = BTreeMap::new();
		for line in lines.filter(|l| !l.trim().is_empty()) {
			let mut words = line.split_whitespace();
			let key = parse_id(words.next(), "key")?;
			let value: String = parse_field(words.next(), "value")?;
			objects.insert(key, value);
		}

		Ok(BootstrapFile { id, port, objects })
	}
}

/// Member config file:
/// id, port, then `<bootstrap host> <bootstrap port>`
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFile {
	pub id: Id,
	pub port: u16,
	pub bootstrap_host: String,
	pub bootstrap_port: u16
}

impl NodeFile {
	pub fn load(path: impl AsRef<Path>) -> DhtResult<Self> {
		read_file(path.as_ref())?.parse()
	}

	pub fn bootstrap_addr(&self) -> String {
		format!("{}:{}", self.bootstrap_host, self.bootstrap_port)
	}
}

impl FromStr for NodeFile {
	type Err = DhtError;

	fn from_str(s: &str) -> DhtResult<Self> {
		let mut lines = s.lines();
		let id = parse_id(lines.next(), "id")?;
		let port = parse_field(lines.next(), "port")?;
		// the bootstrap address may span one or two lines
		let rest = lines.collect::<Vec<_>>().join(" ");
		let mut words = rest.split_whitespace();
		let bootstrap_host = parse_field(words.next(), "bootstrap host")?;
		let bootstrap_port = parse_field(words.next(), "bootstrap port")?;

		Ok(NodeFile { id, port, bootstrap_host, bootstrap_port })
	}
}
