//! Couchlink Client Library
//!
//! reqwest-backed transport for CouchDB sessions, plus helpers that build a
//! [`Connection`] around it.

mod client;

pub use client::{HttpTransport, HttpTransportFactory};
pub use couchlink_core::{
    AuthMode, ClusterConnection, Config, Connection, Database, Error, ErrorKind, NodeConnection,
    Result, User, LOCAL_CLUSTER_NODE_PORT,
};

use std::sync::Arc;

/// Connect to `url` without authentication
pub fn connect(url: &str) -> Result<Connection> {
    connect_with(url, User::default(), AuthMode::None)
}

/// Connect to `url` with the given credentials and auth mode
pub fn connect_with(url: &str, user: User, mode: AuthMode) -> Result<Connection> {
    Connection::with_factory(&HttpTransportFactory::default(), url, user, mode)
}

/// Connect using every transport setting from `config`
pub fn connect_with_config(config: &Config) -> Result<Connection> {
    let transport = HttpTransport::builder()
        .timeout(config.timeout())
        .insecure_skip_verify(config.insecure_skip_verify)
        .open(&config.server_url, config.user(), config.auth_mode()?)?;
    Ok(Connection::new(Arc::new(transport)))
}
