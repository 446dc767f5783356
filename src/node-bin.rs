use std::time::Duration;
use chord_kv::{
	core::{Config, NodeFile, NodeServer, Node, DhtError, DhtResult, EntryState},
	console::{Console, Command}
};
use clap::Parser;
use futures::future::{self, BoxFuture, FutureExt};
use log::warn;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
struct Args {
	/// Config file: ID, port, then `<bootstrap host> <bootstrap port>`
	config: String,

	/// Host to bind and advertise
	#[clap(long, default_value = "127.0.0.1")]
	host: String
}

// how long a forwarded entry may take before the console stops watching it
const ENTRY_TIMEOUT: Duration = Duration::from_secs(30);

fn fatal(console: &Console, e: &DhtError) -> ! {
	console.print(&format!("Error: {}", e));
	std::process::exit(1);
}

async fn listen(server: &mut NodeServer) -> DhtResult<BoxFuture<'static, DhtResult<()>>> {
	let manager = server.start().await?;
	Ok(manager.wait().boxed())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();
	let args = Args::parse();
	let file = NodeFile::load(&args.config)?;

	let node = Node {
		id: file.id,
		addr: format!("{}:{}", args.host, file.port)
	};
	let mut server = NodeServer::member(node, &file.bootstrap_addr(), Config::default())?;
	let console = Console::member(file.id);
	let mut listener = Some(listen(&mut server).await?);

	// entries completed by a node other than the bootstrap
	let mut outcomes = server.subscribe();
	let printer = console.clone();
	tokio::spawn(async move {
		loop {
			match outcomes.recv().await {
				Ok(outcome) => printer.print(&outcome.to_string()),
				Err(RecvError::Lagged(n)) => warn!("{} outcomes dropped", n),
				Err(RecvError::Closed) => break
			}
		}
	});

	// per-hop log of routed requests
	let mut traces = server.subscribe_trace();
	let printer = console.clone();
	tokio::spawn(async move {
		loop {
			match traces.recv().await {
				Ok(trace) => printer.print(&trace.to_string()),
				Err(RecvError::Lagged(n)) => warn!("{} trace lines dropped", n),
				Err(RecvError::Closed) => break
			}
		}
	});

	loop {
		let reader = console.clone();
		let line = tokio::task::spawn_blocking(move || reader.read_line());
		let stopped = async {
			match listener.as_mut() {
				Some(l) => l.await,
				None => future::pending().await
			}
		};

		let line = tokio::select! {
			r = stopped => match r {
				Ok(()) => std::process::exit(0),
				Err(e) => fatal(&console, &e)
			},
			line = line => line??
		};

		let command = match console.parse(&line) {
			Ok(c) => c,
			Err(e) => {
				console.print(&e.to_string());
				continue;
			}
		};

		match command {
			Command::Enter => {
				// the listener closes on exit
				if listener.is_none() {
					listener = Some(listen(&mut server).await?);
				}
				match server.enter().await {
					Ok(Some(outcome)) => console.print(&outcome.to_string()),
					Ok(None) => {
						let pending = server.clone();
						let watcher = console.clone();
						tokio::spawn(async move {
							match pending.wait_connected(ENTRY_TIMEOUT).await {
								Err(e) if e.ends_member() => fatal(&watcher, &e),
								Err(e) => watcher.print(&format!("Error: {}", e)),
								Ok(()) => ()
							}
						});
					},
					Err(e) if e.ends_member() => fatal(&console, &e),
					Err(e) => console.print(&format!("Error: {}", e))
				};
			},
			Command::Exit => match server.exit().await {
				Ok(outcome) => {
					console.print(&outcome.to_string());
					if let Some(l) = listener.take() {
						l.await?;
					}
				},
				Err(e) if e.ends_member() => fatal(&console, &e),
				Err(e) => console.print(&format!("Error: {}", e))
			},
			Command::Quit => break,
			_ => ()
		};
	}

	if server.entry_state() == EntryState::Connected {
		match server.exit().await {
			Ok(outcome) => console.print(&outcome.to_string()),
			Err(e) => console.print(&format!("Error: {}", e))
		};
	}
	server.shutdown();
	if let Some(l) = listener.take() {
		l.await?;
	}
	Ok(())
}
