use crate::auth::AuthService;
use crate::config::{Config, SessionBackend};
use crate::db::{
    Database, FeedbackStatus, HistoryStatus, NewBook, NewFeedback, ProgressUpdate, RemoveTarget,
    Role, NO_PREFERENCES,
};
use crate::error::AppError;
use std::time::Duration;

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn test_auth(db: &Database) -> AuthService {
    AuthService::new(db.clone(), true)
}

fn create_user(db: &Database, username: &str) -> i64 {
    let email = format!("{}@example.com", username);
    db.create_user(username, &email, "hash", Role::User).unwrap()
}

fn create_book(db: &Database, title: &str, categories: &[&str]) -> i64 {
    db.create_book(&NewBook {
        title: title.to_string(),
        author: "Author".to_string(),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    })
    .unwrap()
}

fn progress(current_page: i64, total_pages: i64, reading_time: i64) -> ProgressUpdate {
    ProgressUpdate {
        current_page,
        total_pages,
        reading_time,
    }
}

fn feedback(subject: &str) -> NewFeedback {
    NewFeedback {
        name: "Bob".to_string(),
        email: "bob@example.com".to_string(),
        issue_type: "bug".to_string(),
        subject: subject.to_string(),
        description: "Something broke".to_string(),
    }
}

// ========== USERS ==========

#[test]
fn db_create_and_get_user() {
    let db = test_db();
    let id = db
        .create_user("alice", "a@x.com", "hash", Role::User)
        .unwrap();

    let found = db.get_user_by_username("alice").unwrap().unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.email, "a@x.com");
    assert_eq!(found.role, "user");
    assert_eq!(found.books_read, 0);
    assert_eq!(found.reading_time, 0);

    let found_by_id = db.get_user_by_id(id).unwrap().unwrap();
    assert_eq!(found_by_id.username, "alice");
}

#[test]
fn db_duplicate_username_or_email_conflicts() {
    let db = test_db();
    db.create_user("alice", "a@x.com", "hash", Role::User)
        .unwrap();

    let same_name = db.create_user("alice", "other@x.com", "hash", Role::User);
    assert!(matches!(same_name, Err(AppError::Conflict(_))));

    let same_email = db.create_user("bob", "a@x.com", "hash", Role::User);
    assert!(matches!(same_email, Err(AppError::Conflict(_))));
}

#[test]
fn db_update_user_role() {
    let db = test_db();
    let id = create_user(&db, "alice");

    assert!(db.update_user_role(id, Role::Admin).unwrap());
    assert_eq!(db.get_user_by_id(id).unwrap().unwrap().role, "admin");
    assert!(!db.update_user_role(id + 100, Role::Admin).unwrap());

    assert!(db.update_user_role_by_username("alice", Role::User).unwrap());
    assert!(!db.update_user_role_by_username("ghost", Role::User).unwrap());
}

#[test]
fn db_update_profile_rejects_foreign_email() {
    let db = test_db();
    let alice = create_user(&db, "alice");
    create_user(&db, "bob");

    let taken = db.update_profile(alice, "alice", "bob@example.com");
    assert!(matches!(taken, Err(AppError::Conflict(_))));

    let name_taken = db.update_profile(alice, "bob", "alice2@example.com");
    assert!(matches!(name_taken, Err(AppError::Conflict(_))));

    // Keeping one's own email is fine
    db.update_profile(alice, "alice2", "alice@example.com")
        .unwrap();
    assert_eq!(db.get_user_by_id(alice).unwrap().unwrap().username, "alice2");
}

// ========== BOOKS ==========

#[test]
fn db_list_books_newest_first() {
    let db = test_db();
    let first = create_book(&db, "First", &["Fiction"]);
    let second = create_book(&db, "Second", &["History"]);

    let books = db.list_books().unwrap();
    assert_eq!(books.len(), 2);
    assert_eq!(books[0].id, second);
    assert_eq!(books[1].id, first);
    assert_eq!(books[0].categories, vec!["History".to_string()]);
}

#[test]
fn db_list_books_by_category_is_substring_match() {
    let db = test_db();
    create_book(&db, "Dune", &["Science Fiction"]);
    create_book(&db, "Emma", &["Fiction", "Romance"]);
    create_book(&db, "SPQR", &["History"]);

    let fiction = db.list_books_by_category("Fiction").unwrap();
    assert_eq!(fiction.len(), 2);

    let romance = db.list_books_by_category("Romance").unwrap();
    assert_eq!(romance.len(), 1);
    assert_eq!(romance[0].title, "Emma");

    assert!(db.list_books_by_category("Poetry").unwrap().is_empty());
}

#[test]
fn db_get_book_keeps_category_order() {
    let db = test_db();
    let id = db
        .create_book(&NewBook {
            title: "Emma".to_string(),
            author: "Jane Austen".to_string(),
            isbn: Some("9780141439587".to_string()),
            cover_image: Some("/photo/emma.jpg".to_string()),
            categories: vec!["Romance".to_string(), "Fiction".to_string()],
        })
        .unwrap();

    let book = db.get_book(id).unwrap().unwrap();
    assert_eq!(book.categories, vec!["Romance", "Fiction"]);
    assert_eq!(book.isbn.as_deref(), Some("9780141439587"));
    assert!(db.get_book(id + 1).unwrap().is_none());
}

// ========== FEEDBACK ==========

#[test]
fn db_feedback_starts_new_and_status_changes() {
    let db = test_db();
    let id = db.create_feedback(&feedback("Broken link")).unwrap();

    let list = db.list_feedback().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].status, "new");

    assert!(db
        .update_feedback_status(id, FeedbackStatus::InProgress)
        .unwrap());
    assert_eq!(db.list_feedback().unwrap()[0].status, "in_progress");

    assert!(!db
        .update_feedback_status(id + 1, FeedbackStatus::Resolved)
        .unwrap());
}

#[test]
fn db_feedback_listed_newest_first() {
    let db = test_db();
    db.create_feedback(&feedback("one")).unwrap();
    db.create_feedback(&feedback("two")).unwrap();

    let list = db.list_feedback().unwrap();
    assert_eq!(list[0].subject, "two");
    assert_eq!(list[1].subject, "one");
}

#[test]
fn db_stats_counts() {
    let db = test_db();
    let alice = create_user(&db, "alice");
    create_user(&db, "bob");
    db.update_user_role(alice, Role::Admin).unwrap();
    create_book(&db, "Dune", &[]);
    db.create_feedback(&feedback("hi")).unwrap();

    let stats = db.stats().unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.total_books, 1);
    assert_eq!(stats.total_feedback, 1);
    assert_eq!(stats.admin_users, 1);
}

// ========== SESSIONS ==========

#[test]
fn db_expired_sessions_cleanup() {
    let db = test_db();
    let now = crate::db::now_timestamp();

    db.save_session("old", "{}", now - 10).unwrap();
    db.save_session("live", "{}", now + 3600).unwrap();

    assert_eq!(db.cleanup_expired_sessions().unwrap(), 1);
    assert!(db.get_session("old").unwrap().is_none());
    assert!(db.get_session("live").unwrap().is_some());
}

// ========== READING LIFECYCLE ==========

#[test]
fn reading_start_creates_current_and_history() {
    let db = test_db();
    let user = create_user(&db, "alice");
    let book = create_book(&db, "Dune", &[]);

    db.start_reading(user, book).unwrap();

    let current = db.get_current_reading(user, book).unwrap().unwrap();
    assert_eq!(current.current_page, 0);

    let history = db.get_reading_history(user, book).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, HistoryStatus::Reading.as_str());

    // Starting again does not open a second entry
    db.start_reading(user, book).unwrap();
    assert_eq!(db.get_reading_history(user, book).unwrap().len(), 1);
}

#[test]
fn reading_start_unknown_book_is_not_found() {
    let db = test_db();
    let user = create_user(&db, "alice");

    let result = db.start_reading(user, 42);
    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(db.get_current_reading(user, 42).unwrap().is_none());
}

#[test]
fn reading_progress_updates_three_tables() {
    let db = test_db();
    let user = create_user(&db, "alice");
    let book = create_book(&db, "Dune", &[]);
    db.start_reading(user, book).unwrap();

    let percent = db.update_progress(user, book, progress(50, 100, 30)).unwrap();
    assert_eq!(percent, 50.0);
    db.update_progress(user, book, progress(60, 100, 15)).unwrap();

    let current = db.get_current_reading(user, book).unwrap().unwrap();
    assert_eq!(current.current_page, 60);
    assert_eq!(current.progress_percent, 60.0);
    assert_eq!(current.reading_session_time, 45);

    let history = db.get_reading_history(user, book).unwrap();
    assert_eq!(history[0].reading_time, 45);

    let account = db.get_user_by_id(user).unwrap().unwrap();
    assert_eq!(account.reading_time, 45);
    assert!(account.last_active.is_some());
}

#[test]
fn reading_progress_zero_pages_is_zero_percent() {
    let db = test_db();
    let user = create_user(&db, "alice");
    let book = create_book(&db, "Dune", &[]);
    db.start_reading(user, book).unwrap();

    let percent = db.update_progress(user, book, progress(10, 0, 5)).unwrap();
    assert_eq!(percent, 0.0);
}

#[test]
fn reading_pause_keeps_progress_and_restart_opens_new_entry() {
    let db = test_db();
    let user = create_user(&db, "alice");
    let book = create_book(&db, "Dune", &[]);
    db.start_reading(user, book).unwrap();
    db.update_progress(user, book, progress(20, 100, 10)).unwrap();

    assert!(db.pause_reading(user, book).unwrap());
    assert!(!db.pause_reading(user, book).unwrap());

    let current = db.get_current_reading(user, book).unwrap().unwrap();
    assert_eq!(current.current_page, 20);

    db.start_reading(user, book).unwrap();
    let statuses: Vec<String> = db
        .get_reading_history(user, book)
        .unwrap()
        .into_iter()
        .map(|h| h.status)
        .collect();
    assert_eq!(statuses, vec!["paused", "reading"]);
}

#[test]
fn reading_complete_moves_book_to_shelf() {
    let db = test_db();
    let user = create_user(&db, "alice");
    let book = create_book(&db, "Dune", &[]);
    db.start_reading(user, book).unwrap();

    db.complete_reading(user, book).unwrap();

    assert!(db.get_current_reading(user, book).unwrap().is_none());

    let history = db.get_reading_history(user, book).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "completed");
    assert!(history[0].end_date.is_some());

    assert_eq!(db.get_user_by_id(user).unwrap().unwrap().books_read, 1);
    assert_eq!(
        db.get_shelf_type(user, book).unwrap().as_deref(),
        Some("read")
    );
}

#[test]
fn reading_complete_twice_keeps_single_shelf_row() {
    let db = test_db();
    let user = create_user(&db, "alice");
    let book = create_book(&db, "Dune", &[]);
    db.start_reading(user, book).unwrap();

    db.complete_reading(user, book).unwrap();
    db.complete_reading(user, book).unwrap();

    let profile = db.profile_data(user).unwrap().unwrap();
    assert_eq!(profile.my_bookshelf.len(), 1);
    assert_eq!(profile.user.books_read, 2);
}

#[test]
fn reading_remove_reports_missing_rows() {
    let db = test_db();
    let user = create_user(&db, "alice");
    let book = create_book(&db, "Dune", &[]);
    db.start_reading(user, book).unwrap();

    assert!(db
        .remove_entry(user, RemoveTarget::CurrentReading, book)
        .unwrap());
    assert!(!db
        .remove_entry(user, RemoveTarget::CurrentReading, book)
        .unwrap());
    assert!(!db.remove_entry(user, RemoveTarget::Bookshelf, book).unwrap());
    assert!(db
        .remove_entry(user, RemoveTarget::ReadingHistory, book)
        .unwrap());
}

#[test]
fn reading_is_scoped_per_user() {
    let db = test_db();
    let alice = create_user(&db, "alice");
    let bob = create_user(&db, "bob");
    let book = create_book(&db, "Dune", &[]);

    db.start_reading(alice, book).unwrap();
    assert!(db.get_current_reading(bob, book).unwrap().is_none());
    assert!(!db.remove_entry(bob, RemoveTarget::CurrentReading, book).unwrap());
    assert!(db.get_current_reading(alice, book).unwrap().is_some());
}

#[test]
fn reading_concurrent_writers_on_file_database() {
    const READERS: usize = 8;
    const ROUNDS: i64 = 25;

    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_with(
        &dir.path().join("library.db"),
        READERS as u32,
        Duration::from_secs(30),
    )
    .unwrap();
    let book = create_book(&db, "Dune", &[]);
    let users: Vec<i64> = (0..READERS)
        .map(|i| create_user(&db, &format!("reader{}", i)))
        .collect();

    let handles: Vec<_> = users
        .iter()
        .map(|&user| {
            let db = db.clone();
            std::thread::spawn(move || -> Result<(), AppError> {
                for _ in 0..ROUNDS {
                    db.start_reading(user, book)?;
                    db.complete_reading(user, book)?;
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    for user in users {
        assert_eq!(db.get_user_by_id(user).unwrap().unwrap().books_read, ROUNDS);
        assert!(db.get_current_reading(user, book).unwrap().is_none());
        assert_eq!(
            db.get_reading_history(user, book).unwrap().len(),
            ROUNDS as usize
        );
    }
}

// ========== PROFILE & RANKING ==========

#[test]
fn profile_data_defaults_and_limits() {
    let db = test_db();
    let user = create_user(&db, "alice");

    let empty = db.profile_data(user).unwrap().unwrap();
    assert_eq!(empty.user.reading_preferences, NO_PREFERENCES);
    assert_eq!(empty.user.books_read, 0);
    assert!(empty.current_reading.is_empty());

    for i in 0..7 {
        let book = create_book(&db, &format!("Book {}", i), &[]);
        db.start_reading(user, book).unwrap();
        db.update_progress(user, book, progress(25, 100, 1)).unwrap();
    }

    let profile = db.profile_data(user).unwrap().unwrap();
    assert_eq!(profile.current_reading.len(), 5);
    assert_eq!(profile.current_reading[0].progress, 25);
    assert_eq!(profile.reading_history.len(), 7);
    assert_eq!(profile.user.reading_time, 7);

    assert!(db.profile_data(user + 100).unwrap().is_none());
}

#[test]
fn ranking_orders_by_reading_time_and_skips_idle_users() {
    let db = test_db();
    let alice = create_user(&db, "alice");
    let bob = create_user(&db, "bob");
    create_user(&db, "carol");
    let book = create_book(&db, "Dune", &[]);

    for (user, minutes) in [(alice, 10), (bob, 30)] {
        db.start_reading(user, book).unwrap();
        db.update_progress(user, book, progress(1, 10, minutes)).unwrap();
    }

    let ranking = db.reading_time_ranking().unwrap();
    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0].username, "bob");
    assert_eq!(ranking[0].rank, 1);
    assert_eq!(ranking[1].username, "alice");
    assert_eq!(ranking[1].rank, 2);
}

// ========== AUTH SERVICE ==========

#[test]
fn auth_register_and_login() {
    let db = test_db();
    let auth = test_auth(&db);

    auth.register(Some("alice"), Some("a@x.com"), Some("pw1"))
        .unwrap();

    let user = auth.login(Some("alice"), Some("pw1")).unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.role, "user");
    assert_ne!(user.password_hash, "pw1");
}

#[test]
fn auth_register_twice_conflicts() {
    let db = test_db();
    let auth = test_auth(&db);

    auth.register(Some("alice"), Some("a@x.com"), Some("pw1"))
        .unwrap();
    let again = auth.register(Some("alice"), Some("b@x.com"), Some("pw2"));
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[test]
fn auth_register_missing_field() {
    let db = test_db();
    let auth = test_auth(&db);

    let result = auth.register(Some("alice"), None, Some("pw1"));
    assert!(matches!(result, Err(AppError::BadRequest(_))));
    let result = auth.register(Some(""), Some("a@x.com"), Some("pw1"));
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[test]
fn auth_registration_disabled() {
    let db = test_db();
    let auth = AuthService::new(db, false);

    let result = auth.register(Some("alice"), Some("a@x.com"), Some("pw1"));
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[test]
fn auth_login_failures_share_message() {
    let db = test_db();
    let auth = test_auth(&db);
    auth.register(Some("alice"), Some("a@x.com"), Some("pw1"))
        .unwrap();

    let wrong_password = auth.login(Some("alice"), Some("nope")).unwrap_err();
    let unknown_user = auth.login(Some("ghost"), Some("pw1")).unwrap_err();

    assert!(matches!(wrong_password, AppError::Unauthorized(_)));
    assert!(matches!(unknown_user, AppError::Unauthorized(_)));
    assert_eq!(wrong_password.to_string(), unknown_user.to_string());
}

#[test]
fn auth_set_role_validates() {
    let db = test_db();
    let auth = test_auth(&db);
    let user = auth
        .create_user("alice", "a@x.com", "pw1", Role::User)
        .unwrap();

    assert!(matches!(
        auth.set_role(user.id, Some("superuser")),
        Err(AppError::BadRequest(_))
    ));
    assert!(matches!(
        auth.set_role(user.id, None),
        Err(AppError::BadRequest(_))
    ));
    assert!(matches!(
        auth.set_role(user.id + 1, Some("admin")),
        Err(AppError::NotFound(_))
    ));

    assert_eq!(auth.set_role(user.id, Some("admin")).unwrap(), Role::Admin);
    assert_eq!(auth.login(Some("alice"), Some("pw1")).unwrap().role, "admin");
}

#[test]
fn auth_update_profile_requires_both_fields() {
    let db = test_db();
    let auth = test_auth(&db);
    let user = auth
        .create_user("alice", "a@x.com", "pw1", Role::User)
        .unwrap();

    assert!(matches!(
        auth.update_profile(user.id, Some("alice"), None),
        Err(AppError::BadRequest(_))
    ));

    let (username, email) = auth
        .update_profile(user.id, Some("alice2"), Some("a2@x.com"))
        .unwrap();
    assert_eq!(username, "alice2");
    assert_eq!(email, "a2@x.com");
}

// ========== CONFIG ==========

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "127.0.0.1:9090"

[database]
path = "/tmp/test.db"
pool_size = 4
acquire_timeout_secs = 0

[auth]
registration = "disabled"
session_hours = 2
cookie_name = "sid"
session_backend = "database"
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.bind.port(), 9090);
    assert_eq!(config.database.pool_size, 4);
    // Zero is raised to the one-second minimum
    assert_eq!(config.database.acquire_timeout(), Duration::from_secs(1));
    assert!(!config.auth.registration_enabled());
    assert_eq!(config.auth.session_ttl_secs(), 2 * 60 * 60);
    assert_eq!(config.auth.cookie_name, "sid");
    assert_eq!(config.auth.session_backend, SessionBackend::Database);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 3000);
    assert_eq!(config.database.pool_size, 10);
    assert!(config.auth.registration_enabled());
    assert_eq!(config.auth.session_ttl_secs(), 24 * 60 * 60);
    assert_eq!(config.auth.cookie_name, "library.sid");
    assert_eq!(config.auth.session_backend, SessionBackend::Memory);
}

#[test]
fn config_generated_default_parses() {
    let config: Config = toml::from_str(&Config::generate_default()).unwrap();
    assert_eq!(config.server.bind.port(), 3000);
    assert_eq!(config.auth.session_backend, SessionBackend::Memory);
}

#[test]
fn config_open_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("library.db");

    let db = Database::open_with(&path, 2, Duration::from_secs(5)).unwrap();
    db.ping().unwrap();
    assert_eq!(db.pool_size(), 2);
    assert!(path.exists());
}
