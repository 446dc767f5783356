use std::{error::Error, io, time::Duration};
use futures::{SinkExt, StreamExt};
use tarpc::{
	serde_transport::{tcp, Transport},
	tokio_serde::formats::Bincode
};
use tokio::net::TcpStream;
use crate::{
	core::{config::Config, error::{*, DhtError::*}},
	rpc::{Message, Reply}
};

/// Outbound side of a connection: writes a Message, may read a Reply
pub type ClientTransport = Transport<TcpStream, Reply, Message, Bincode<Reply, Message>>;
/// Inbound side of a connection: reads a Message, may write a Reply
pub type ServerTransport = Transport<TcpStream, Message, Reply, Bincode<Message, Reply>>;

/// Map a failed frame read.
/// Frames that do not decode mean the peer speaks another protocol.
/// Anything else, a frame cut short included, is a transport failure.
pub fn read_error(peer: &str, e: io::Error) -> DhtError {
	if is_decode_error(&e) {
		Protocol(format!("undecodable frame from {}: {}", peer, e))
	}
	else {
		ForwardingFailed {
			peer: peer.to_string(),
			source: e
		}
	}
}

// The bincode error sits below one or more io::Error layers
fn is_decode_error(e: &io::Error) -> bool {
	let mut inner: Option<&(dyn Error + 'static)> = e.get_ref().map(|i| i as &(dyn Error + 'static));
	while let Some(err) = inner {
		if err.is::<bincode::ErrorKind>() || err.is::<bincode::Error>() {
			return true;
		}
		inner = match err.downcast_ref::<io::Error>() {
			Some(io_err) => io_err.get_ref().map(|i| i as &(dyn Error + 'static)),
			None => err.source()
		};
	}
	false
}

pub async fn setup_client(addr: &str, config: &Config) -> DhtResult<ClientTransport> {
	let timeout = Duration::from_millis(config.connect_timeout);
	match tokio::time::timeout(timeout, tcp::connect(addr, Bincode::default)).await {
		Ok(Ok(transport)) => Ok(transport),
		Ok(Err(e)) => Err(ForwardingFailed {
			peer: addr.to_string(),
			source: e
		}),
		Err(_) => Err(Timeout(addr.to_string()))
	}
}

async fn write_message(transport: &mut ClientTransport, addr: &str, message: Message, config: &Config) -> DhtResult<()> {
	let timeout = Duration::from_millis(config.connect_timeout);
	match tokio::time::timeout(timeout, transport.send(message)).await {
		Ok(result) => result.map_err(|e| ForwardingFailed {
			peer: addr.to_string(),
			source: e
		}),
		Err(_) => Err(Timeout(addr.to_string()))
	}
}

/// Fire-and-forget: connect, write one frame, close
pub async fn send_message(addr: &str, message: Message, config: &Config) -> DhtResult<()> {
	let mut transport = setup_client(addr, config).await?;
	write_message(&mut transport, addr, message, config).await
}

/// Connect, write one frame and wait for the single reply frame
pub async fn call(addr: &str, message: Message, config: &Config) -> DhtResult<Reply> {
	let mut transport = setup_client(addr, config).await?;
	write_message(&mut transport, addr, message, config).await?;

	let timeout = Duration::from_millis(config.reply_timeout);
	match tokio::time::timeout(timeout, transport.next()).await {
		Ok(Some(Ok(reply))) => Ok(reply),
		Ok(Some(Err(e))) => Err(read_error(addr, e)),
		Ok(None) => Err(ConnectionClosed(addr.to_string())),
		Err(_) => Err(Timeout(addr.to_string()))
	}
}
