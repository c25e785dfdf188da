pub mod catalog;
pub mod dependencies;
pub mod types;

pub use catalog::*;
pub use dependencies::*;
pub use types::*;
