use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};
use crate::transport::{fetch, url_encode, Method, SharedTransport};

/// Handle to a named database on the server.
///
/// A handle is only a name plus the shared transport. Deleting the database
/// through the connection leaves existing handles stale; calls on them then
/// fail with whatever the server reports (usually not found).
#[derive(Clone)]
pub struct Database {
    transport: SharedTransport,
    name: String,
}

impl Database {
    pub fn new(transport: SharedTransport, name: impl Into<String>) -> Self {
        Self {
            transport,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encoded request path, e.g. `/my%2Fdb`
    pub fn path(&self) -> String {
        db_path(&self.name)
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// HEAD the database; `false` only when the server reports it missing
    pub async fn exists(&self) -> Result<bool> {
        match head(&self.transport, &self.path()).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Database metadata (document count, sizes, ...)
    pub async fn info(&self) -> Result<Value> {
        let response = fetch(self.transport.as_ref(), &self.path(), Method::Get, None, false).await?;
        if !response.is_object() {
            return Err(Error::BadResponse);
        }
        Ok(response)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("name", &self.name).finish()
    }
}

pub(crate) fn db_path(name: &str) -> String {
    format!("/{}", url_encode(name))
}

/// HEAD a path, classifying any non-success status
pub(crate) async fn head(transport: &SharedTransport, path: &str) -> Result<()> {
    let raw = transport.get_raw_data(path, Method::Head).await?;
    if raw.is_success() {
        Ok(())
    } else {
        Err(Error::from_status(raw.status, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mock::MockTransport;
    use serde_json::json;

    #[test]
    fn test_path_is_encoded() {
        let db = Database::new(MockTransport::new(), "team/alpha");
        assert_eq!(db.path(), "/team%2Falpha");
        assert_eq!(db.name(), "team/alpha");
    }

    #[tokio::test]
    async fn test_exists_maps_not_found_to_false() {
        let mock = MockTransport::new();
        mock.respond_status(Method::Head, "/alpha", 200);
        mock.respond_status(Method::Head, "/alpha", 404);
        mock.respond_status(Method::Head, "/alpha", 401);

        let db = Database::new(mock.clone(), "alpha");
        assert!(db.exists().await.unwrap());
        assert!(!db.exists().await.unwrap());
        assert_eq!(db.exists().await.unwrap_err().kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_info_requires_object() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/alpha", Ok(json!({"db_name": "alpha", "doc_count": 3})));
        mock.respond(Method::Get, "/alpha", Ok(json!([])));

        let db = Database::new(mock.clone(), "alpha");
        assert_eq!(db.info().await.unwrap()["doc_count"], 3);
        assert_eq!(db.info().await.unwrap_err().kind(), ErrorKind::BadResponse);
    }
}
