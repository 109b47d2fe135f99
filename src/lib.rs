pub mod availability;
pub mod catalog;
pub mod collab;
pub mod compactor;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod session;
pub mod store;
pub mod wal;
pub mod wire;

#[cfg(test)]
mod testing;
