pub mod cli;
pub mod error;
pub mod ingest;
pub mod manifest;
pub mod parser;
pub mod query;
pub mod report;
pub mod schema;
pub mod store;

pub use cli::{Cli, Commands};
pub use error::{Error, Result};
pub use store::Store;
