use serde::Serialize;
use serde_json::Value;

/// Prefix of every document id in the `_users` database
pub const USER_DOC_PREFIX: &str = "org.couchdb.user:";

/// Credentials posted to `/_session`
#[derive(Debug, Serialize)]
pub struct SessionRequest<'a> {
    pub name: &'a str,
    pub password: &'a str,
}

/// Body of a user document written to `/_users`
#[derive(Debug, Clone, Serialize)]
pub struct UserDocument {
    pub name: String,
    /// `null` when no password is set
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(rename = "type")]
    pub doc_type: String,
}

impl UserDocument {
    pub fn new(name: &str, password: &str, roles: Option<Vec<String>>) -> Self {
        Self {
            name: name.to_string(),
            password: (!password.is_empty()).then(|| password.to_string()),
            roles,
            doc_type: "user".to_string(),
        }
    }
}

/// Server version as reported by the root endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerVersion {
    pub version: String,
    /// -1 when unknown or unparseable
    pub major: i32,
}

impl ServerVersion {
    pub fn unknown() -> Self {
        Self {
            version: String::new(),
            major: -1,
        }
    }

    /// Extract the version from a root-endpoint object. A missing `version`
    /// field gives an empty string and an unknown major version.
    pub fn from_info(info: &Value) -> Self {
        let version = info
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let major = parse_major_version(&version);
        Self { version, major }
    }

    pub fn is_known(&self) -> bool {
        self.major >= 0
    }
}

/// Leading integer of a dotted version string, or -1
pub fn parse_major_version(version: &str) -> i32 {
    let head = version.trim_start();
    let head = head.split('.').next().unwrap_or_default();
    let digits: String = head.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(-1)
}

/// Database names that are reserved by the server (`_users`, `shards/...`)
pub fn is_reserved_db_name(name: &str) -> bool {
    name.starts_with('_') || name.starts_with("shards/")
}

/// Turn a `_users` row id into a plain user name, skipping design and system docs
pub fn user_name_from_doc_id(id: &str) -> Option<&str> {
    if id.starts_with('_') {
        return None;
    }
    let name = id.strip_prefix(USER_DOC_PREFIX).unwrap_or(id);
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_major_version() {
        assert_eq!(parse_major_version("2.3.1"), 2);
        assert_eq!(parse_major_version("1.6"), 1);
        assert_eq!(parse_major_version("10"), 10);
        assert_eq!(parse_major_version(" 3.1.0"), 3);
        assert_eq!(parse_major_version("vNext"), -1);
        assert_eq!(parse_major_version(""), -1);
        assert_eq!(parse_major_version(".5"), -1);
    }

    #[test]
    fn test_server_version_missing_field() {
        let version = ServerVersion::from_info(&json!({"couchdb": "Welcome"}));
        assert_eq!(version.version, "");
        assert_eq!(version.major, -1);
        assert!(!version.is_known());
    }

    #[test]
    fn test_reserved_db_names() {
        assert!(is_reserved_db_name("_replicator"));
        assert!(is_reserved_db_name("shards/00000000-1fffffff/x"));
        assert!(!is_reserved_db_name("alpha"));
        assert!(!is_reserved_db_name("my_shards/x"));
    }

    #[test]
    fn test_user_name_from_doc_id() {
        assert_eq!(user_name_from_doc_id("org.couchdb.user:alice"), Some("alice"));
        assert_eq!(user_name_from_doc_id("bob"), Some("bob"));
        assert_eq!(user_name_from_doc_id("_design/_auth"), None);
        assert_eq!(user_name_from_doc_id("org.couchdb.user:"), None);
    }

    #[test]
    fn test_user_document_empty_password_is_null() {
        let doc = UserDocument::new("alice", "", None);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value, json!({"name": "alice", "password": null, "type": "user"}));

        let doc = UserDocument::new("bob", "pw", Some(vec!["admin".into()]));
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["roles"], json!(["admin"]));
        assert_eq!(value["password"], json!("pw"));
    }
}
