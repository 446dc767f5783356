use super::{
	ring::Id,
	visited::Visited,
	routing::Request
};

/// What a node did with a routed request
#[derive(Debug, Clone, PartialEq)]
pub enum Hop {
	// owner handled the key and told the bootstrap
	Handled,
	// owner without the key, or no one left to ask
	Missed,
	Forwarded { successor: Id },
	// came back to this node without reaching the bootstrap
	Returned
}

/// One line of the per-hop log a node prints for routed requests
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
	pub request: Request,
	pub visited: Visited,
	pub hop: Hop
}

impl Trace {
	fn action(&self) -> &'static str {
		match (&self.hop, &self.request) {
			(Hop::Handled, Request::Lookup { .. }) => "Key found, messaging bootstrap server.",
			(Hop::Handled, Request::Insert { .. }) => "Key is within this name server's range, inserting value.",
			(Hop::Handled, Request::Delete { .. }) => "Key is within this name server's range, deleting key.",
			(Hop::Missed, _) => "Key not found, messaging bootstrap server.",
			(Hop::Forwarded { .. }, Request::Lookup { .. }) => "Key not found, forwarding message to successor.",
			(Hop::Forwarded { .. }, _) => "Key is not within this name server's range, forwarding message to successor.",
			(Hop::Returned, _) => "Message came back to this name server, messaging bootstrap server."
		}
	}
}

impl std::fmt::Display for Trace {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		writeln!(f, "[LOG]: \t{}\t{}", self.request, self.visited)?;
		write!(f, "{}", self.action())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_trace_text() {
		let forwarded = Trace {
			request: Request::Insert { key: 42, value: "x".to_string() },
			visited: vec![0, 20].into(),
			hop: Hop::Forwarded { successor: 50 }
		};
		assert_eq!(
			forwarded.to_string(),
			"[LOG]: \tinsert\t42\tx\t0 20\nKey is not within this name server's range, forwarding message to successor."
		);

		let found = Trace {
			request: Request::Lookup { key: 42 },
			visited: vec![0, 20, 50].into(),
			hop: Hop::Handled
		};
		assert_eq!(found.to_string(), "[LOG]: \tlookup\t42\t0 20 50\nKey found, messaging bootstrap server.");

		let missed = Trace { hop: Hop::Missed, ..found };
		assert!(missed.to_string().ends_with("Key not found, messaging bootstrap server."));
	}
}
