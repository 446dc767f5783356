use thiserror::Error;
use std::result::Result;
use super::ring::Id;

#[derive(Error, Debug)]
pub enum DhtError {
	#[error("id {0} is outside of the identifier space")]
	OutOfRange(Id),
	#[error("ID {0} is already in use")]
	IdInUse(Id),
	#[error("failed to reach {peer}: {source}")]
	ForwardingFailed {
		peer: String,
		#[source]
		source: std::io::Error
	},
	#[error("timed out talking to {0}")]
	Timeout(String),
	#[error("connection to {0} closed before a reply arrived")]
	ConnectionClosed(String),
	#[error("protocol violation: {0}")]
	Protocol(String),
	#[error("unexpected reply from {0}")]
	UnexpectedReply(String),
	#[error("Already connected.")]
	AlreadyConnected,
	#[error("Entry already in progress.")]
	EntryPending,
	#[error("entry of ID {0} was dropped, enter again")]
	EntryDropped(Id),
	#[error("Already disconnected.")]
	NotConnected,
	#[error("the bootstrap node cannot leave the ring")]
	BootstrapCannotExit,
	#[error("predecessor {0} refused to take over the key range")]
	ExitRefused(Id),
	#[error("invalid config: {0}")]
	Config(String),
	#[error("IO error")]
	IoError(#[from] std::io::Error),
	#[error("task error")]
	TaskError(#[from] tokio::task::JoinError)
}

impl DhtError {
	/// Errors that must terminate the node instead of just the connection
	pub fn is_fatal(&self) -> bool {
		matches!(self, DhtError::Protocol(_))
	}

	/// Errors after which a member process cannot go on
	pub fn ends_member(&self) -> bool {
		self.is_fatal() || matches!(self, DhtError::IdInUse(_))
	}
}

pub type DhtResult<T> = Result<T, DhtError>;
