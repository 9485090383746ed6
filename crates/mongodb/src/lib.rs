//! MongoDB document store for mongo-backup
//!
//! Implements the `DocumentStore` capability over the official MongoDB
//! driver. Connection handles are explicit values created by the caller;
//! there is no process-wide connection.

mod connect;
mod store;

pub use connect::{connect, ConnectOpts};
pub use store::MongoStore;
