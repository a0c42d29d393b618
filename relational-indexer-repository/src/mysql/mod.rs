//! MySQL implementation of the relational source.

mod decode;
mod source;

pub use source::MySqlSource;
