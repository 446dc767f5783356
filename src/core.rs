pub mod node;
pub mod ring;
pub mod config;
pub mod data_store;
pub mod error;
pub mod visited;
pub mod outcome;
pub mod trace;
pub mod routing;
pub mod entry;
pub mod exit;

pub use node::*;
pub use config::*;
pub use error::*;
pub use outcome::Outcome;
pub use trace::Trace;
pub use routing::Request;
