pub mod coerce;
pub mod dates;
pub mod record;
pub mod source;

pub use coerce::*;
pub use dates::*;
pub use record::*;
pub use source::*;
