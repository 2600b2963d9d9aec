use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Library catalog backend with reading progress and an admin panel.
#[derive(Parser, Debug, Clone)]
#[command(name = "library-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "LIBRARY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// User management commands.
    User {
        /// User subcommand action.
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Book catalog commands.
    Book {
        /// Book subcommand action.
        #[command(subcommand)]
        action: BookCommand,
    },

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// User management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Add a new user.
    Add {
        /// Username.
        username: String,
        /// Email address.
        #[arg(short, long)]
        email: String,
        /// Password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
        /// User role (admin or user).
        #[arg(short, long, default_value = "user")]
        role: String,
    },

    /// List all users.
    List,

    /// Change the role of a user.
    Role {
        /// Username.
        username: String,
        /// New role (admin or user).
        role: String,
    },
}

/// Book catalog subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum BookCommand {
    /// Add a book to the catalog.
    Add {
        /// Book title.
        title: String,
        /// Author name.
        #[arg(short, long)]
        author: String,
        /// ISBN.
        #[arg(long)]
        isbn: Option<String>,
        /// Cover image path as served to the front-end (e.g. /photo/cover.jpg).
        #[arg(long)]
        cover: Option<String>,
        /// Category, may be repeated.
        #[arg(long = "category")]
        categories: Vec<String>,
    },

    /// List all books.
    List,
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        3000,
    )
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a request waits for a free connection, in seconds.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/library.db")
}

fn default_pool_size() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

impl DatabaseConfig {
    /// Connection checkout timeout, at least one second.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs.max(1))
    }
}

/// Where sessions are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Process-local map.
    #[default]
    Memory,
    /// `sessions` table, shared by every process using the database.
    Database,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Registration mode: "open", "disabled".
    #[serde(default = "default_registration")]
    pub registration: String,

    /// Session lifetime in hours.
    #[serde(default = "default_session_hours")]
    pub session_hours: u32,

    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Session storage backend.
    #[serde(default)]
    pub session_backend: SessionBackend,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            registration: default_registration(),
            session_hours: default_session_hours(),
            cookie_name: default_cookie_name(),
            session_backend: SessionBackend::default(),
        }
    }
}

fn default_registration() -> String {
    "open".to_string()
}

fn default_session_hours() -> u32 {
    24
}

fn default_cookie_name() -> String {
    "library.sid".to_string()
}

impl AuthConfig {
    /// Check if registration is enabled.
    pub fn registration_enabled(&self) -> bool {
        self.registration == "open"
    }

    /// Session lifetime in seconds.
    pub fn session_ttl_secs(&self) -> i64 {
        self.session_hours as i64 * 60 * 60
    }
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("library-rs.toml"),
            dirs::config_dir()
                .map(|p| p.join("library-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/library-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# library-rs configuration

[server]
bind = "0.0.0.0:3000"

[database]
# path = "/var/lib/library-rs/library.db"
pool_size = 10
# Seconds a request waits for a free connection
acquire_timeout_secs = 30

[auth]
# Registration mode: "open" or "disabled"
registration = "open"
# Session lifetime in hours
session_hours = 24
cookie_name = "library.sid"
# "memory" (single process) or "database" (shared by every instance)
session_backend = "memory"
"#
        .to_string()
    }
}
