//! library-rs server entry point.

use clap::Parser;
use library_rs::{
    auth::AuthService,
    config::{BookCommand, Cli, Command, Config, UserCommand},
    db::{Database, NewBook, Role, timestamp_to_datetime},
    server,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired sessions are swept.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force).await,
        Some(Command::User { action }) => cmd_user(action, &config).await,
        Some(Command::Book { action }) => cmd_book(action, &config).await,
        Some(Command::Serve { bind }) => cmd_serve(config, bind).await,
        None => cmd_serve(config, None).await,
    }
}

/// Initialize config and database.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nEdit config.toml to configure your server.");
    println!("Then run: library-rs user add <username> --email <email> --role admin");
    println!("And: library-rs book add <title> --author <author> --category <name>");

    Ok(())
}

/// User management commands.
async fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;

    match action {
        UserCommand::Add {
            username,
            email,
            password,
            role,
        } => {
            let Some(role) = Role::parse(&role) else {
                anyhow::bail!("Invalid role: {} (expected admin or user)", role);
            };

            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };

            let auth = AuthService::new(db, true);
            let user = auth.create_user(&username, &email, &password, role)?;
            println!(
                "Created user: {} (role: {}, id: {})",
                user.username, user.role, user.id
            );
        }

        UserCommand::List => {
            let users = db.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!(
                    "{:<6} {:<20} {:<30} {:<8} CREATED",
                    "ID", "USERNAME", "EMAIL", "ROLE"
                );
                println!("{}", "-".repeat(80));
                for user in users {
                    println!(
                        "{:<6} {:<20} {:<30} {:<8} {}",
                        user.id,
                        user.username,
                        user.email,
                        user.role,
                        timestamp_to_datetime(user.created_at).format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        UserCommand::Role { username, role } => {
            let Some(parsed) = Role::parse(&role) else {
                anyhow::bail!("Invalid role: {} (expected admin or user)", role);
            };

            if db.update_user_role_by_username(&username, parsed)? {
                println!("Role of {} set to {}", username, parsed.as_str());
            } else {
                println!("User not found: {}", username);
            }
        }
    }

    Ok(())
}

/// Book catalog commands.
async fn cmd_book(action: BookCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;

    match action {
        BookCommand::Add {
            title,
            author,
            isbn,
            cover,
            categories,
        } => {
            let id = db.create_book(&NewBook {
                title: title.clone(),
                author,
                isbn,
                cover_image: cover,
                categories,
            })?;
            println!("Added book: {} (id: {})", title, id);
        }

        BookCommand::List => {
            let books = db.list_books()?;
            if books.is_empty() {
                println!("No books found.");
            } else {
                println!("{:<6} {:<36} {:<24} CATEGORIES", "ID", "TITLE", "AUTHOR");
                println!("{}", "-".repeat(80));
                for book in books {
                    println!(
                        "{:<6} {:<36} {:<24} {}",
                        book.id,
                        book.title,
                        book.author,
                        book.categories.join(", ")
                    );
                }
            }
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(mut config: Config, bind: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = Database::open_with(
        &config.database.path,
        config.database.pool_size,
        config.database.acquire_timeout(),
    )?;

    // Fail fast when the database is unusable
    db.ping()?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        pool_size = db.pool_size(),
        sessions = ?config.auth.session_backend,
        "Starting library-rs server"
    );

    let state = server::AppState::new(&config, db);

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        ticker.tick().await; // Skip first immediate tick

        loop {
            ticker.tick().await;

            match sessions.purge_expired() {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session purge failed"),
            }
        }
    });

    let app = server::create_router(state);

    let listener = TcpListener::bind(config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Prompt for password input.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    Ok(password.trim().to_string())
}
