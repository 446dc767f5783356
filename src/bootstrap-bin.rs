use chord_kv::{
	core::{Config, BootstrapFile, NodeServer, Node, Outcome, DhtResult},
	console::{Console, Command}
};
use clap::Parser;
use log::warn;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
struct Args {
	/// Config file: ID, port, then one `<key> <value>` pair per line
	config: String,

	/// Host to bind and advertise
	#[clap(long, default_value = "127.0.0.1")]
	host: String
}

async fn execute_command(server: &NodeServer, command: Command) -> DhtResult<Option<Outcome>> {
	match command {
		Command::Lookup(key) => server.lookup(key).await,
		Command::Insert(key, value) => server.insert(key, value).await,
		Command::Delete(key) => server.delete(key).await,
		_ => Ok(None)
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();
	let args = Args::parse();
	let file = BootstrapFile::load(&args.config)?;

	let node = Node {
		id: file.id,
		addr: format!("{}:{}", args.host, file.port)
	};
	let mut server = NodeServer::bootstrap(node, Config::default(), file.objects)?;
	let manager = server.start().await?;
	let console = Console::bootstrap();

	// outcomes of requests that went around the ring
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

	let mut listener = Box::pin(manager.wait());
	loop {
		let reader = console.clone();
		let line = tokio::task::spawn_blocking(move || reader.read_line());

		let line = tokio::select! {
			// the console thread is still blocked on stdin
			r = &mut listener => match r {
				Ok(()) => std::process::exit(0),
				Err(e) => {
					console.print(&format!("Error: {}", e));
					std::process::exit(1);
				}
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
		if command == Command::Quit {
			break;
		}

		match execute_command(&server, command).await {
			Ok(Some(outcome)) => console.print(&outcome.to_string()),
			Ok(None) => (),
			Err(e) => console.print(&format!("Error: {}", e))
		};
	}

	server.shutdown_ring().await;
	listener.await?;
	Ok(())
}
