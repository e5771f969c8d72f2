//! Couchlink Core Library
//!
//! This crate provides the session layer for talking to a CouchDB server:
//! - Session connection and authentication state machine
//! - Idempotent database lifecycle operations
//! - User administration
//! - Server version and capability detection
//! - Cluster and node upgrade handles
//!
//! The HTTP mechanics live behind the [`Transport`] trait; see `couchlink-rs`
//! for the reqwest-backed implementation.

pub mod auth;
pub mod cluster;
pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod models;
pub mod transport;

#[cfg(test)]
mod mock;

// Re-export commonly used types
pub use auth::{AuthMode, User};
pub use cluster::{ClusterConnection, NodeConnection, LOCAL_CLUSTER_NODE_PORT};
pub use config::Config;
pub use connection::{Connection, UNKNOWN_MAJOR_VERSION};
pub use database::Database;
pub use error::{Error, ErrorKind, Result};
pub use transport::{Method, RawResponse, SharedTransport, Transport, TransportFactory};
