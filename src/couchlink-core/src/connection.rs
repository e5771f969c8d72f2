use parking_lot::RwLock;
use serde_json::Value;
use std::time::Duration;

use crate::auth::{AuthMode, User};
use crate::cluster::{ClusterConnection, NodeConnection};
use crate::database::{self, db_path, Database};
use crate::error::{Error, ErrorKind, Result};
use crate::models::{
    is_reserved_db_name, user_name_from_doc_id, ServerVersion, SessionRequest, UserDocument,
    USER_DOC_PREFIX,
};
use crate::transport::{fetch, url_encode, Method, SharedTransport, Transport, TransportFactory};

/// Major version reported when the server version is unknown or unparseable
pub const UNKNOWN_MAJOR_VERSION: i32 = -1;

/// Logical session with one server.
///
/// Every handle produced here (databases, cluster and node connections)
/// shares the same transport, and with it the authenticated session.
pub struct Connection {
    transport: SharedTransport,
    version: RwLock<ServerVersion>,
}

/// Puts the transport back into `mode` when dropped
struct AuthModeGuard<'a> {
    transport: &'a dyn Transport,
    mode: AuthMode,
}

impl Drop for AuthModeGuard<'_> {
    fn drop(&mut self) {
        self.transport.set_auth_mode(self.mode);
    }
}

impl Connection {
    /// Wrap an existing transport
    pub fn new(transport: SharedTransport) -> Self {
        Self {
            transport,
            version: RwLock::new(ServerVersion::unknown()),
        }
    }

    /// Wrap an existing transport and point it at `url`
    pub fn with_url(transport: SharedTransport, url: &str) -> Result<Self> {
        transport.set_server_url(url)?;
        Ok(Self::new(transport))
    }

    /// Build a new transport from `factory`
    pub fn with_factory<F: TransportFactory + ?Sized>(
        factory: &F,
        url: &str,
        user: User,
        mode: AuthMode,
    ) -> Result<Self> {
        Ok(Self::new(factory.build(url, user, mode)?))
    }

    /// The shared transport backing this connection
    pub fn lowest_level(&self) -> &SharedTransport {
        &self.transport
    }

    pub fn timeout(&self) -> Duration {
        self.transport.timeout()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.transport.set_timeout(timeout);
    }

    pub fn server_url(&self) -> String {
        self.transport.server_url()
    }

    /// Does not invalidate the cached version; keep the URL and server consistent.
    pub fn set_server_url(&self, url: &str) -> Result<()> {
        self.transport.set_server_url(url)
    }

    pub fn user(&self) -> User {
        self.transport.user()
    }

    pub fn set_user(&self, user: User) {
        self.transport.set_user(user);
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.transport.auth_mode()
    }

    pub fn auth_mode_readable(&self) -> &'static str {
        self.transport.auth_mode().as_str()
    }

    pub fn set_auth_mode(&self, mode: AuthMode) {
        self.transport.set_auth_mode(mode);
    }

    /// Set the auth mode by name ("none", "basic" or "auth", case-insensitive)
    pub fn set_auth_mode_str(&self, mode: &str) -> Result<()> {
        self.transport.set_auth_mode(mode.parse()?);
        Ok(())
    }

    async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        server_root: bool,
    ) -> Result<Value> {
        fetch(self.transport.as_ref(), path, method, body, server_root).await
    }

    // ---- Server metadata ----

    /// Fetch the root endpoint and refresh the version cache
    #[tracing::instrument(skip(self))]
    pub async fn get_couchdb_info(&self) -> Result<Value> {
        let response = self.request("", Method::Get, None, true).await?;
        if !response.is_object() {
            return Err(Error::BadResponse);
        }

        let version = ServerVersion::from_info(&response);
        if !version.is_known() {
            tracing::warn!("Unrecognised server version {:?}", version.version);
        }
        *self.version.write() = version;

        Ok(response)
    }

    pub async fn get_couchdb_version(&self) -> Result<String> {
        self.get_couchdb_info().await?;
        Ok(self.version.read().version.clone())
    }

    /// Leading integer of the server version, or [`UNKNOWN_MAJOR_VERSION`]
    pub async fn get_major_version(&self) -> Result<i32> {
        self.get_couchdb_info().await?;
        Ok(self.version.read().major)
    }

    /// Version from the last fetch, without a request
    pub fn cached_couchdb_version(&self) -> Option<String> {
        let version = self.version.read();
        version.is_known().then(|| version.version.clone())
    }

    pub fn cached_major_version(&self) -> i32 {
        self.version.read().major
    }

    pub async fn get_supports_clusters(&self) -> Result<bool> {
        Ok(self.get_major_version().await? >= 2)
    }

    /// `count` server-generated UUIDs
    pub async fn get_uuids(&self, count: usize) -> Result<Vec<String>> {
        let path = format!("/_uuids?count={}", count);
        let response = self.request(&path, Method::Get, None, false).await?;

        response
            .get("uuids")
            .and_then(Value::as_array)
            .ok_or(Error::BadResponse)?
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or(Error::BadResponse))
            .collect()
    }

    pub async fn get_active_tasks(&self) -> Result<Value> {
        let response = self.request("/_active_tasks", Method::Get, None, false).await?;
        if !response.is_array() {
            return Err(Error::BadResponse);
        }
        Ok(response)
    }

    // ---- Databases ----

    async fn all_db_names(&self) -> Result<Vec<String>> {
        let response = self.request("/_all_dbs", Method::Get, None, false).await?;

        let items = response.as_array().ok_or(Error::DatabaseUnavailable)?;
        items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or(Error::DatabaseUnavailable))
            .collect()
    }

    /// Names of all databases except reserved ones (`_*`, `shards/*`)
    pub async fn list_db_names(&self) -> Result<Vec<String>> {
        let mut names = self.all_db_names().await?;
        names.retain(|name| !is_reserved_db_name(name));
        Ok(names)
    }

    pub async fn list_all_db_names(&self) -> Result<Vec<String>> {
        self.all_db_names().await
    }

    pub async fn list_dbs(&self) -> Result<Vec<Database>> {
        Ok(self
            .list_db_names()
            .await?
            .into_iter()
            .map(|name| Database::new(self.transport.clone(), name))
            .collect())
    }

    pub async fn list_all_dbs(&self) -> Result<Vec<Database>> {
        Ok(self
            .list_all_db_names()
            .await?
            .into_iter()
            .map(|name| Database::new(self.transport.clone(), name))
            .collect())
    }

    /// Handle to an existing database
    #[tracing::instrument(skip(self))]
    pub async fn get_db(&self, name: &str) -> Result<Database> {
        database::head(&self.transport, &db_path(name)).await?;
        Ok(Database::new(self.transport.clone(), name))
    }

    pub async fn db_exists(&self, name: &str) -> Result<bool> {
        match self.get_db(name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_db(&self, name: &str) -> Result<Database> {
        let response = match self.request(&db_path(name), Method::Put, None, false).await {
            Ok(response) => response,
            Err(Error::Server { reason, .. }) => {
                tracing::warn!("Unable to create database {:?}: {:?}", name, reason);
                return Err(Error::DatabaseNotCreatable(reason));
            }
            Err(e) => return Err(e),
        };
        if !response.is_object() {
            return Err(Error::DatabaseUnavailable);
        }

        if response.get("ok") != Some(&Value::Bool(true)) {
            return Err(Error::DatabaseNotCreatable(None));
        }

        tracing::info!("Created database {:?}", name);
        Ok(Database::new(self.transport.clone(), name))
    }

    /// Delete a database. This cannot be undone.
    #[tracing::instrument(skip(self))]
    pub async fn remove_db(&self, name: &str) -> Result<()> {
        let response = match self.request(&db_path(name), Method::Delete, None, false).await {
            Ok(response) => response,
            Err(Error::Server { reason, .. }) => {
                tracing::warn!("Unable to delete database {:?}: {:?}", name, reason);
                return Err(Error::DatabaseNotDeletable(reason));
            }
            Err(e) => return Err(e),
        };
        if !response.is_object() {
            return Err(Error::DatabaseNotDeletable(None));
        }

        if response.get("ok") != Some(&Value::Bool(true)) {
            return Err(Error::DatabaseNotDeletable(None));
        }

        tracing::info!("Deleted database {:?}", name);
        Ok(())
    }

    /// Return the database, creating it only when the server reports it missing
    pub async fn ensure_db_exists(&self, name: &str) -> Result<Database> {
        match self.get_db(name).await {
            Ok(db) => Ok(db),
            Err(e) if e.is_not_found() => {
                tracing::debug!("Database {:?} not found, creating it", name);
                self.create_db(name).await
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the database, treating "not found" and "not deletable" as done.
    ///
    /// Note that a permission failure reported as not deletable is swallowed too.
    pub async fn ensure_db_is_deleted(&self, name: &str) -> Result<()> {
        match self.remove_db(name).await {
            Ok(()) => Ok(()),
            Err(e) => match e.kind() {
                ErrorKind::ContentNotFound | ErrorKind::DatabaseNotDeletable => {
                    tracing::debug!("Treating database {:?} as deleted: {}", name, e);
                    Ok(())
                }
                _ => Err(e),
            },
        }
    }

    // ---- Session ----

    /// Negotiate a session for the configured user.
    ///
    /// Does nothing without auth. In basic mode the session cookie obtained by
    /// the POST is logged out again right away. The transport always ends in the
    /// mode it started in, whether or not a step fails.
    #[tracing::instrument(skip(self))]
    pub async fn login(&self) -> Result<()> {
        let original = self.transport.auth_mode();
        if original == AuthMode::None {
            return Ok(());
        }

        let user = self.transport.user();
        let body = serde_json::to_value(SessionRequest {
            name: user.username(),
            password: user.password(),
        })?;

        let _restore = AuthModeGuard {
            transport: self.transport.as_ref(),
            mode: original,
        };

        // A stale cookie must not be used to authenticate the login itself
        self.transport.set_auth_mode(AuthMode::Basic);
        self.request("/_session", Method::Post, Some(&body), false).await?;

        if original == AuthMode::Basic {
            self.transport.set_auth_mode(AuthMode::Cookie);
            self.logout().await?;
        }

        tracing::info!("Logged in as {:?} ({})", user.username(), original);
        Ok(())
    }

    /// Current session info; `null` unless using cookie auth
    pub async fn get_login_info(&self) -> Result<Value> {
        match self.transport.auth_mode() {
            AuthMode::Cookie => {
                self.request("/_session", Method::Get, None, false).await
            }
            _ => Ok(Value::Null),
        }
    }

    pub async fn logout(&self) -> Result<()> {
        if self.transport.auth_mode() == AuthMode::Cookie {
            self.request("/_session", Method::Delete, None, false).await?;
            tracing::debug!("Session cookie released");
        }
        Ok(())
    }

    // ---- Users ----

    fn user_path(name: &str) -> String {
        format!("/_users/{}{}", USER_DOC_PREFIX, url_encode(name))
    }

    /// Create a user; an empty password is stored as `null`
    #[tracing::instrument(skip(self, password))]
    pub async fn create_user(
        &self,
        name: &str,
        password: &str,
        roles: Option<Vec<String>>,
    ) -> Result<Value> {
        let doc = serde_json::to_value(UserDocument::new(name, password, roles))?;
        self.request(&Self::user_path(name), Method::Put, Some(&doc), false)
            .await
    }

    pub async fn create_user_from(&self, user: &User, roles: Option<Vec<String>>) -> Result<Value> {
        self.create_user(user.username(), user.password(), roles)
            .await
    }

    pub async fn get_user_info(&self, name: &str) -> Result<Value> {
        self.request(&Self::user_path(name), Method::Get, None, false).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, name: &str) -> Result<Value> {
        self.request(&Self::user_path(name), Method::Delete, None, false).await
    }

    pub async fn list_user_names(&self) -> Result<Vec<String>> {
        let response = self.request("/_users/_all_docs", Method::Get, None, false).await?;

        let rows = response
            .get("rows")
            .and_then(Value::as_array)
            .ok_or(Error::BadResponse)?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_str))
            .filter_map(user_name_from_doc_id)
            .map(str::to_string)
            .collect())
    }

    // ---- Topology ----

    /// Cluster handle on 2.0+ servers, `None` otherwise
    pub async fn upgrade_to_cluster_connection(
        &self,
        node_local_port: u16,
    ) -> Result<Option<ClusterConnection>> {
        if !self.get_supports_clusters().await? {
            return Ok(None);
        }
        let cluster = ClusterConnection::connect(node_local_port, self.transport.clone()).await?;
        Ok(Some(cluster))
    }

    /// Node handle regardless of topology: the server itself on single-node
    /// deployments, the first cluster node otherwise
    pub async fn upgrade_to_node_connection(&self, node_local_port: u16) -> Result<NodeConnection> {
        if !self.get_supports_clusters().await? {
            return Ok(NodeConnection::new(
                node_local_port,
                None,
                self.transport.clone(),
            ));
        }

        ClusterConnection::connect(node_local_port, self.transport.clone())
            .await?
            .into_iter()
            .next()
            .ok_or(Error::BadResponse)
    }
}
