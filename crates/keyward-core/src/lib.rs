pub mod config;
pub mod domain;
pub mod entry;
pub mod error;
pub mod template;
pub mod timestamp;
pub mod types;

pub use entry::{DomainEntry, EntrySettings};
pub use error::{KeywardError, KeywardResult};
pub use template::{CharClass, ClassSelection, Template};
