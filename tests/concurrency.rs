use std::collections::BTreeMap;
use anyhow::anyhow;
use chord_kv::core::{DhtError, Outcome};
use futures::future;
use rand::prelude::*;

mod common;
use common::*;

/// Members enter at the same time instead of one by one
#[tokio::test]
async fn test_concurrent_entries() -> anyhow::Result<()> {
	init_logger();
	let (b, _bm) = start_bootstrap(0, BTreeMap::new()).await?;
	let mut members = Vec::new();
	for id in [500, 300, 128, 896, 640, 250] {
		members.push(start_member(id, &b).await?);
	}

	let joins = members.iter().map(|(m, _)| join_retrying(m));
	for result in future::join_all(joins).await {
		result?;
	}

	let mut servers = vec![&b];
	servers.extend(members.iter().map(|(s, _)| s));
	assert!(eventually(|| converged(&servers)).await);
	assert_eq!(ring_walk(&servers)?, vec![0, 128, 250, 300, 500, 640, 896]);
	Ok(())
}

/// Two members enter while the bootstrap keeps inserting.
/// Every insert either lands on the owner or is reported as failed.
#[tokio::test]
async fn test_inserts_during_entries() -> anyhow::Result<()> {
	init_logger();
	let mut rng = StdRng::seed_from_u64(7);
	let (b, _bm) = start_bootstrap(0, BTreeMap::new()).await?;
	let members = join_all(&[512], &b).await?;
	let (n256, _m256) = start_member(256, &b).await?;
	let (n768, _m768) = start_member(768, &b).await?;

	let mut rx = b.subscribe();
	let keys = generate_keys(&mut rng, 30);
	let inserts = async {
		let mut outcomes = Vec::new();
		let mut later = 0;
		for key in keys.iter() {
			match b.insert(*key, format!("v{}", key)).await? {
				Some(outcome) => outcomes.push(outcome),
				None => later += 1
			};
		}
		Ok::<_, DhtError>((outcomes, later))
	};
	let (inserted, first, second) = tokio::join!(inserts, join_retrying(&n256), join_retrying(&n768));
	first?;
	second?;
	let (mut outcomes, later) = inserted?;
	for _ in 0..later {
		outcomes.push(next_outcome(&mut rx).await?);
	}
	assert_eq!(outcomes.len(), keys.len());

	let servers = [&b, &members[0].0, &n256, &n768];
	assert!(eventually(|| converged(&servers)).await);
	assert_eq!(ring_walk(&servers)?, vec![0, 256, 512, 768]);

	let mut stored = 0;
	for outcome in outcomes {
		let key = outcome.key().ok_or_else(|| anyhow!("no key in {:?}", outcome))?;
		let holders: Vec<_> = servers.iter()
			.filter(|s| s.store_snapshot().contains_key(&key))
			.collect();
		match outcome {
			Outcome::Insert { .. } => {
				assert_eq!(holders.len(), 1);
				assert!(holders[0].range().unwrap().contains(key)?);
				stored += 1;
			},
			Outcome::InsertFailed { .. } => assert!(holders.is_empty()),
			o => panic!("unexpected outcome {:?}", o)
		};
	}
	let total: usize = servers.iter().map(|s| s.store_snapshot().len()).sum();
	assert_eq!(total, stored);
	Ok(())
}
