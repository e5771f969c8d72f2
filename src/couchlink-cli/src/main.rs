use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use couchlink_rs::{connect_with_config, Config, Connection};
use serde_json::{json, Value};

mod telemetry;

#[derive(Parser)]
#[command(name = "couchlink", version, about = "CouchDB session and database administration")]
struct Cli {
    /// JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: String,

    /// Server URL, overrides the configuration file
    #[arg(long, env = "COUCHLINK_URL")]
    url: Option<String>,

    #[arg(long, env = "COUCHLINK_USER")]
    user: Option<String>,

    #[arg(long, env = "COUCHLINK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// none, basic or cookie
    #[arg(long)]
    auth: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Server welcome info and version
    Info,
    /// List databases
    Dbs {
        /// Include reserved databases (`_*`, `shards/*`)
        #[arg(long)]
        all: bool,
    },
    Exists { db: String },
    Create { db: String },
    Delete { db: String },
    /// Create the database unless it already exists
    Ensure { db: String },
    /// Delete the database if it is there
    EnsureDeleted { db: String },
    /// List user names
    Users,
    AddUser {
        name: String,
        #[arg(default_value = "")]
        password: String,
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Log in and print the session info
    Session,
    Uuids {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// Active server tasks
    Tasks,
    /// Node handles for the deployment
    Nodes {
        #[arg(long)]
        port: Option<u16>,
    },
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.server_url = url.clone();
        }
        if let Some(user) = &self.user {
            config.username = user.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        if let Some(auth) = &self.auth {
            config.auth_mode = auth.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The subscriber needs log_dir from the file, so report load errors after init
    let (mut config, load_error) = match Config::load(&cli.config) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    cli.apply_overrides(&mut config);

    let _guard = telemetry::init_telemetry(config.log_dir.as_deref())?;

    if let Some(e) = load_error {
        tracing::warn!("Failed to load {}, using defaults: {:#}", cli.config, e);
    }

    tracing::debug!(
        "Connecting to {} (auth={})",
        config.server_url,
        config.auth_mode
    );

    let conn = connect_with_config(&config).context("Failed to set up connection")?;
    conn.login().await.context("Login failed")?;

    let output = run(&conn, &config, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn run(conn: &Connection, config: &Config, command: Command) -> Result<Value> {
    let output = match command {
        Command::Info => {
            let info = conn.get_couchdb_info().await?;
            json!({
                "info": info,
                "major_version": conn.cached_major_version(),
            })
        }
        Command::Dbs { all } => {
            let names = if all {
                conn.list_all_db_names().await?
            } else {
                conn.list_db_names().await?
            };
            json!(names)
        }
        Command::Exists { db } => json!({ "db": db, "exists": conn.db_exists(&db).await? }),
        Command::Create { db } => {
            conn.create_db(&db).await?;
            json!({ "ok": true, "db": db })
        }
        Command::Delete { db } => {
            conn.remove_db(&db).await?;
            json!({ "ok": true, "db": db })
        }
        Command::Ensure { db } => {
            let db = conn.ensure_db_exists(&db).await?;
            json!({ "ok": true, "db": db.name() })
        }
        Command::EnsureDeleted { db } => {
            conn.ensure_db_is_deleted(&db).await?;
            json!({ "ok": true, "db": db })
        }
        Command::Users => json!(conn.list_user_names().await?),
        Command::AddUser {
            name,
            password,
            roles,
        } => {
            let roles = (!roles.is_empty()).then_some(roles);
            conn.create_user(&name, &password, roles).await?
        }
        Command::Session => conn.get_login_info().await?,
        Command::Uuids { count } => json!(conn.get_uuids(count).await?),
        Command::Tasks => conn.get_active_tasks().await?,
        Command::Nodes { port } => {
            let port = port.unwrap_or(config.node_local_port);
            match conn.upgrade_to_cluster_connection(port).await? {
                Some(cluster) => {
                    let names: Vec<_> = cluster.iter().filter_map(|n| n.node_name()).collect();
                    json!({ "clustered": true, "port": port, "nodes": names })
                }
                None => {
                    let node = conn.upgrade_to_node_connection(port).await?;
                    json!({ "clustered": false, "port": node.port(), "nodes": [] })
                }
            }
        }
    };

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "couchlink",
            "--url",
            "http://db.local:5984",
            "--auth",
            "cookie",
            "dbs",
            "--all",
        ]);

        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.server_url, "http://db.local:5984");
        assert_eq!(config.auth_mode, "cookie");
        assert!(matches!(cli.command, Command::Dbs { all: true }));
    }

    #[test]
    fn test_add_user_roles() {
        let cli = Cli::parse_from(["couchlink", "add-user", "alice", "pw", "--role", "reader"]);
        match cli.command {
            Command::AddUser { name, roles, .. } => {
                assert_eq!(name, "alice");
                assert_eq!(roles, vec!["reader"]);
            }
            _ => panic!("expected add-user"),
        }
    }
}
