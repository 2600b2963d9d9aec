use crate::db::*;
use crate::error::{AppError, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::time::Duration;

/// Connection checked out of the pool.
pub(crate) type DbConn = PooledConnection<SqliteConnectionManager>;

/// Database wrapper over a pool of SQLite connections.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create database at the given path with default pool settings.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, 10, Duration::from_secs(30))
    }

    /// Open or create database at the given path with `pool_size` connections.
    ///
    /// Requests that find every connection checked out wait up to
    /// `acquire_timeout` for one to come back.
    pub fn open_with(path: &Path, pool_size: u32, acquire_timeout: Duration) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            Self::configure(conn)?;
            // WAL lets readers proceed while one pooled connection writes.
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(acquire_timeout)
            .build(manager)?;

        let db = Self { pool };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    ///
    /// Every in-memory connection is its own database, so the pool holds
    /// exactly one connection and never recycles it.
    pub fn open_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(Self::configure);

        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .build(manager)?;

        let db = Self { pool };
        db.initialize_schema()?;
        Ok(db)
    }

    fn configure(conn: &mut Connection) -> rusqlite::Result<()> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    }

    /// Check out a pooled connection.
    pub(crate) fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Number of pooled connections.
    pub fn pool_size(&self) -> u32 {
        self.pool.max_size()
    }

    /// Connectivity check run before the server starts accepting requests.
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| AppError::Internal(format!("Database check failed: {}", e)))?;
        Ok(())
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
                books_read INTEGER NOT NULL DEFAULT 0,
                reading_time INTEGER NOT NULL DEFAULT 0,
                reading_preferences TEXT,
                last_active INTEGER,
                created_at INTEGER NOT NULL
            );

            -- Books table (seeded by the catalog CLI)
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                isbn TEXT,
                cover_image TEXT,
                categories TEXT,
                created_at INTEGER NOT NULL
            );

            -- Feedback table
            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                issue_type TEXT NOT NULL,
                subject TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new'
                    CHECK (status IN ('new', 'in_progress', 'resolved')),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Books a user is reading right now
            CREATE TABLE IF NOT EXISTS current_reading (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                current_page INTEGER NOT NULL DEFAULT 0,
                total_pages INTEGER NOT NULL DEFAULT 0,
                progress_percent REAL NOT NULL DEFAULT 0,
                reading_session_time INTEGER NOT NULL DEFAULT 0,
                start_date INTEGER NOT NULL,
                last_read INTEGER NOT NULL,
                UNIQUE (user_id, book_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Reading attempts
            CREATE TABLE IF NOT EXISTS reading_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'reading'
                    CHECK (status IN ('reading', 'paused', 'completed')),
                reading_time INTEGER NOT NULL DEFAULT 0,
                start_date INTEGER NOT NULL,
                end_date INTEGER,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Saved and finished books
            CREATE TABLE IF NOT EXISTS user_bookshelf (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                shelf_type TEXT NOT NULL DEFAULT 'read',
                added_date INTEGER NOT NULL,
                UNIQUE (user_id, book_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Sessions table (database session backend)
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_created ON books(created_at);
            CREATE INDEX IF NOT EXISTS idx_feedback_created ON feedback(created_at);
            CREATE INDEX IF NOT EXISTS idx_history_user_book ON reading_history(user_id, book_id);
            CREATE INDEX IF NOT EXISTS idx_users_reading_time ON users(reading_time);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user, returning its ID.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<i64> {
        let conn = self.conn()?;

        let exists = conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1 OR email = ?2",
                params![username, email],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to check user: {}", e)))?;

        if exists.is_some() {
            return Err(AppError::Conflict(
                "Username or email already exists".to_string(),
            ));
        }

        conn.execute(
            "INSERT INTO users (username, email, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, email, password_hash, role.as_str(), now_timestamp()],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Conflict("Username or email already exists".to_string())
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;

        Ok(conn.last_insert_rowid())
    }

    /// Get user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, username, email, password_hash, role, books_read, reading_time,
                    reading_preferences, last_active, created_at
             FROM users WHERE username = ?1",
            params![username],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, username, email, password_hash, role, books_read, reading_time,
                    reading_preferences, last_active, created_at
             FROM users WHERE id = ?1",
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: row.get(4)?,
            books_read: row.get(5)?,
            reading_time: row.get(6)?,
            reading_preferences: row.get(7)?,
            last_active: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    /// List all users, newest first.
    pub fn list_users(&self) -> Result<Vec<UserSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, username, email, role, created_at
                 FROM users ORDER BY created_at DESC, id DESC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], |row| {
                Ok(UserSummary {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    email: row.get(2)?,
                    role: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Set the role of a user by ID.
    pub fn update_user_role(&self, id: i64, role: Role) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                params![role.as_str(), id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update role: {}", e)))?;
        Ok(rows > 0)
    }

    /// Set the role of a user by username.
    pub fn update_user_role_by_username(&self, username: &str, role: Role) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE users SET role = ?1 WHERE username = ?2",
                params![role.as_str(), username],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update role: {}", e)))?;
        Ok(rows > 0)
    }

    /// Change username and email of a user.
    ///
    /// Fails with `Conflict` when either value belongs to another account.
    pub fn update_profile(&self, id: i64, username: &str, email: &str) -> Result<()> {
        let conn = self.conn()?;

        let email_taken = conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1 AND id != ?2",
                params![email, id],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to check email: {}", e)))?;

        if email_taken.is_some() {
            return Err(AppError::Conflict(
                "Email is already used by another account".to_string(),
            ));
        }

        conn.execute(
            "UPDATE users SET username = ?1, email = ?2 WHERE id = ?3",
            params![username, email, id],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Conflict("Username is already taken".to_string())
            } else {
                AppError::Internal(format!("Failed to update profile: {}", e))
            }
        })?;

        Ok(())
    }

    // ========== BOOK OPERATIONS ==========

    /// Add a book to the catalog.
    pub fn create_book(&self, book: &NewBook) -> Result<i64> {
        let categories = serde_json::to_string(&book.categories)
            .map_err(|e| AppError::Internal(format!("Failed to encode categories: {}", e)))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO books (title, author, isbn, cover_image, categories, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                book.title,
                book.author,
                book.isbn,
                book.cover_image,
                categories,
                now_timestamp(),
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create book: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Get book by ID.
    pub fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, title, author, isbn, cover_image, categories, created_at
             FROM books WHERE id = ?1",
            params![id],
            |row| {
                Ok(Book {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    author: row.get(2)?,
                    isbn: row.get(3)?,
                    cover_image: row.get(4)?,
                    categories: parse_categories(5, row.get(5)?)?,
                    created_at: row.get(6)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// List every book, newest first.
    pub fn list_books(&self) -> Result<Vec<BookListing>> {
        self.query_books(
            "SELECT id, title, author, cover_image, categories
             FROM books ORDER BY created_at DESC, id DESC",
            None,
        )
    }

    /// List books whose stored categories contain `category` as a substring.
    pub fn list_books_by_category(&self, category: &str) -> Result<Vec<BookListing>> {
        self.query_books(
            "SELECT id, title, author, cover_image, categories
             FROM books WHERE categories LIKE ?1 ORDER BY created_at DESC, id DESC",
            Some(format!("%{}%", category)),
        )
    }

    fn query_books(&self, sql: &str, pattern: Option<String>) -> Result<Vec<BookListing>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<BookListing> {
            Ok(BookListing {
                id: row.get(0)?,
                title: row.get(1)?,
                author: row.get(2)?,
                cover_image: row.get(3)?,
                categories: parse_categories(4, row.get(4)?)?,
            })
        };

        let rows = match pattern {
            Some(pattern) => stmt.query_map(params![pattern], map),
            None => stmt.query_map([], map),
        };

        let books = rows
            .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    // ========== FEEDBACK OPERATIONS ==========

    /// Store a feedback ticket with status "new", returning its ID.
    pub fn create_feedback(&self, feedback: &NewFeedback) -> Result<i64> {
        let conn = self.conn()?;
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO feedback (name, email, issue_type, subject, description, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                feedback.name,
                feedback.email,
                feedback.issue_type,
                feedback.subject,
                feedback.description,
                FeedbackStatus::New.as_str(),
                now,
                now,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save feedback: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// List all feedback, newest first.
    pub fn list_feedback(&self) -> Result<Vec<Feedback>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, email, issue_type, subject, description, status, created_at, updated_at
                 FROM feedback ORDER BY created_at DESC, id DESC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let feedback = stmt
            .query_map([], |row| {
                Ok(Feedback {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    issue_type: row.get(3)?,
                    subject: row.get(4)?,
                    description: row.get(5)?,
                    status: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list feedback: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect feedback: {}", e)))?;

        Ok(feedback)
    }

    /// Change the status of a ticket and bump `updated_at`.
    pub fn update_feedback_status(&self, id: i64, status: FeedbackStatus) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE feedback SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now_timestamp(), id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update feedback: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== STATS ==========

    /// Admin dashboard counters, read in a single statement.
    pub fn stats(&self) -> Result<Stats> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM books),
                    (SELECT COUNT(*) FROM feedback),
                    (SELECT COUNT(*) FROM users WHERE role = 'admin')",
            [],
            |row| {
                Ok(Stats {
                    total_users: row.get(0)?,
                    total_books: row.get(1)?,
                    total_feedback: row.get(2)?,
                    admin_users: row.get(3)?,
                })
            },
        )
        .map_err(|e| AppError::Internal(format!("Failed to read stats: {}", e)))
    }

    // ========== SESSION OPERATIONS ==========

    /// Insert or replace a session payload.
    pub fn save_session(&self, token: &str, data: &str, expires_at: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (token, data, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (token) DO UPDATE SET
                data = excluded.data,
                expires_at = excluded.expires_at",
            params![token, data, expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save session: {}", e)))?;
        Ok(())
    }

    /// Get session payload and expiry by token.
    pub fn get_session(&self, token: &str) -> Result<Option<(String, i64)>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT data, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to cleanup sessions: {}", e)))?;
        Ok(rows)
    }
}

/// Decode the JSON array kept in `books.categories`.
fn parse_categories(idx: usize, raw: Option<String>) -> rusqlite::Result<Vec<String>> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
    }
}
