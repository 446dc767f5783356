use std::{collections::BTreeMap, time::Duration};
use chord_kv::core::DhtError;
use tokio::{io::AsyncWriteExt, net::TcpStream};

mod common;
use common::*;

/// Quitting the bootstrap stops every node of the ring
#[tokio::test]
async fn test_shutdown_ring() -> anyhow::Result<()> {
	init_logger();
	let (b, bm) = start_bootstrap(0, BTreeMap::new()).await?;
	let members = join_all(&[100, 400, 700], &b).await?;
	let servers: Vec<_> = members.iter().map(|(s, _)| s).collect();
	assert!(eventually(|| converged(&[&b, servers[0], servers[1], servers[2]])).await);

	b.shutdown_ring().await;
	tokio::time::timeout(TIMEOUT, bm.wait()).await??;
	for (_, manager) in members {
		tokio::time::timeout(TIMEOUT, manager.wait()).await??;
	}
	Ok(())
}

/// A frame that does not decode stops the node
#[tokio::test]
async fn test_undecodable_frame() -> anyhow::Result<()> {
	init_logger();
	let (b, bm) = start_bootstrap(0, BTreeMap::new()).await?;

	let mut stream = TcpStream::connect(&b.node().addr).await?;
	// length prefix, then an enum tag no message has
	stream.write_all(&[0, 0, 0, 4, 0xff, 0xff, 0xff, 0xff]).await?;
	stream.flush().await?;

	let result = tokio::time::timeout(TIMEOUT, bm.wait()).await?;
	assert!(matches!(result, Err(DhtError::Protocol(_))));
	Ok(())
}

/// A frame cut short by a dying peer only drops that connection
#[tokio::test]
async fn test_truncated_frame() -> anyhow::Result<()> {
	init_logger();
	let (b, bm) = start_bootstrap(0, BTreeMap::new()).await?;

	let mut stream = TcpStream::connect(&b.node().addr).await?;
	// announces 100 bytes, sends 3
	stream.write_all(&[0, 0, 0, 100, 1, 2, 3]).await?;
	stream.shutdown().await?;
	drop(stream);
	tokio::time::sleep(Duration::from_millis(200)).await;
	assert!(!bm.handle.is_finished());

	let (m, _mm) = start_member(500, &b).await?;
	join(&m).await?;
	assert!(eventually(|| converged(&[&b, &m])).await);

	// stopped by us, not by a protocol error
	bm.stop().await?;
	Ok(())
}

/// Connections that close without a frame are harmless
#[tokio::test]
async fn test_empty_connection() -> anyhow::Result<()> {
	init_logger();
	let (b, bm) = start_bootstrap(0, BTreeMap::new()).await?;

	let stream = TcpStream::connect(&b.node().addr).await?;
	drop(stream);

	let mut rx = b.subscribe();
	let (m, _mm) = start_member(10, &b).await?;
	assert!(m.insert(10, "still up".to_string()).await?.is_none());
	let outcome = next_outcome(&mut rx).await?;
	assert_eq!(outcome.key(), Some(10));

	bm.stop().await?;
	Ok(())
}
