use std::sync::Arc;
use crate::core::error::*;

pub struct ServerManager {
	pub handle: tokio::task::JoinHandle<DhtResult<()>>,
	pub tx: Arc<tokio::sync::watch::Sender<bool>>
}

impl ServerManager {
	/// Wait for the listener to terminate.
	/// Returns the fatal error if a protocol violation stopped it.
	pub async fn wait(self) -> DhtResult<()> {
		self.handle.await?
	}

	/// Stop the listener gracefully
	pub async fn stop(self) -> DhtResult<()> {
		self.tx.send_replace(true);
		self.wait().await
	}
}
