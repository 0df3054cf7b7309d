//! Pull regional COVID-19 counts from a public source and write them into the
//! matching rows of an existing spreadsheet.

pub mod aggregate;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod sheets;
pub mod source;
pub mod table;

pub use error::{PullError, Result};
