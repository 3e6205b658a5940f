pub mod bootstrap;

pub use bootstrap::{open_cache, open_store, Relay};
