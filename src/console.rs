use std::io::Write;
use anyhow::anyhow;
use inquire::{Text, CustomUserError};
use parking_lot::{Mutex, const_mutex};
use crate::core::{
	ring::Id,
	data_store::{Key, Value}
};

// keeps outcome lines from interleaving with each other
static PRINT_LOCK: Mutex<()> = const_mutex(());

const BOOTSTRAP_COMMANDS: [&str; 4] = [
	"lookup",
	"insert",
	"delete",
	"quit"
];

const MEMBER_COMMANDS: [&str; 3] = [
	"enter",
	"exit",
	"quit"
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	Lookup(Key),
	Insert(Key, Value),
	Delete(Key),
	Enter,
	Exit,
	Quit
}

#[derive(Debug, Clone)]
pub struct Console {
	prompt: String,
	commands: &'static [&'static str]
}

fn parse_key(command: &str, word: Option<&&str>) -> anyhow::Result<Key> {
	let word = word.ok_or_else(|| anyhow!("{}: missing key", command))?;
	word.parse().map_err(|_| anyhow!("{}: invalid key {}", command, word))
}

impl Console {
	pub fn bootstrap() -> Self {
		Console {
			prompt: ">_ ".to_string(),
			commands: &BOOTSTRAP_COMMANDS
		}
	}

	pub fn member(id: Id) -> Self {
		Console {
			prompt: format!("name server [{}] >_ ", id),
			commands: &MEMBER_COMMANDS
		}
	}

	pub fn prompt(&self) -> &str {
		&self.prompt
	}

	pub fn parse(&self, line: &str) -> anyhow::Result<Command> {
		let words: Vec<_> = line.split_whitespace().collect();
		let command = match words.first() {
			Some(w) => w.to_lowercase(),
			None => return Err(anyhow!("empty command"))
		};
		if !self.commands.iter().any(|c| *c == command) {
			return Err(anyhow!("[ERROR] Unknown command."));
		}

		let parsed = match command.as_str() {
			"lookup" => Command::Lookup(parse_key(&command, words.get(1))?),
			"delete" => Command::Delete(parse_key(&command, words.get(1))?),
			"insert" => {
				let key = parse_key(&command, words.get(1))?;
				if words.len() < 3 {
					return Err(anyhow!("insert: missing value"));
				}
				Command::Insert(key, words[2..].join(" "))
			},
			"enter" => Command::Enter,
			"exit" => Command::Exit,
			_ => Command::Quit
		};
		Ok(parsed)
	}

	pub fn suggest(&self, v: &str) -> Vec<String> {
		let mut result = Vec::new();
		for command in self.commands {
			if !v.is_empty() && command.starts_with(v) {
				result.push(command.to_string());
			}
		}
		result
	}

	pub fn complete(&self, v: &str) -> Option<String> {
		self.suggest(v)
			.into_iter()
			.next()
			.map(|c| c + " ")
	}

	/// Blocks until a line is entered
	pub fn read_line(&self) -> anyhow::Result<String> {
		let suggester = |v: &str| -> Result<Vec<String>, CustomUserError> {
			Ok(self.suggest(v))
		};
		let completer = |v: &str| -> Result<Option<String>, CustomUserError> {
			Ok(self.complete(v))
		};
		let line = Text::new(self.prompt.trim_end())
			.with_suggester(&suggester)
			.with_completer(&completer)
			.prompt()?;
		Ok(line)
	}

	/// Print a response block
	pub fn print(&self, text: &str) {
		let _guard = PRINT_LOCK.lock();
		let mut out = std::io::stdout().lock();
		// stdout gone means nobody is reading anyway
		writeln!(out, "{}", text).unwrap_or(());
		out.flush().unwrap_or(());
	}
}
