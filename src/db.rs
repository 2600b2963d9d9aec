mod reading;
mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular reader.
    User,
    /// May manage users and feedback.
    Admin,
}

impl Role {
    /// Column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Parse a column or request value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Feedback triage status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    /// Not looked at yet.
    New,
    /// Being handled by an admin.
    InProgress,
    /// Closed.
    Resolved,
}

impl FeedbackStatus {
    /// Column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::New => "new",
            FeedbackStatus::InProgress => "in_progress",
            FeedbackStatus::Resolved => "resolved",
        }
    }

    /// Parse a column or request value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(FeedbackStatus::New),
            "in_progress" => Some(FeedbackStatus::InProgress),
            "resolved" => Some(FeedbackStatus::Resolved),
            _ => None,
        }
    }
}

/// Status of a reading-history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    /// Currently being read.
    Reading,
    /// Put aside, resumable with another start.
    Paused,
    /// Finished.
    Completed,
}

impl HistoryStatus {
    /// Column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Reading => "reading",
            HistoryStatus::Paused => "paused",
            HistoryStatus::Completed => "completed",
        }
    }
}

/// Collection a user may remove a book from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveTarget {
    /// `current_reading`.
    CurrentReading,
    /// `reading_history`.
    ReadingHistory,
    /// `user_bookshelf`.
    Bookshelf,
}

impl RemoveTarget {
    /// Parse the `type` field of a removal request.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "current" | "current_reading" => Some(RemoveTarget::CurrentReading),
            "history" | "reading_history" => Some(RemoveTarget::ReadingHistory),
            "bookshelf" | "user_bookshelf" => Some(RemoveTarget::Bookshelf),
            _ => None,
        }
    }

    /// Backing table.
    pub fn table(&self) -> &'static str {
        match self {
            RemoveTarget::CurrentReading => "current_reading",
            RemoveTarget::ReadingHistory => "reading_history",
            RemoveTarget::Bookshelf => "user_bookshelf",
        }
    }
}

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Username for login.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// User role: "admin" or "user".
    pub role: String,
    /// Number of completed books.
    pub books_read: i64,
    /// Accumulated reading time.
    pub reading_time: i64,
    /// Free-form reading preferences.
    pub reading_preferences: Option<String>,
    /// Last reading activity timestamp.
    pub last_active: Option<i64>,
    /// Account creation timestamp.
    pub created_at: i64,
}

/// User row as shown in the admin panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    /// User ID.
    pub id: i64,
    /// Username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Role.
    pub role: String,
    /// Account creation timestamp.
    pub created_at: i64,
}

/// Catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Book ID.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// ISBN.
    pub isbn: Option<String>,
    /// Cover image path.
    pub cover_image: Option<String>,
    /// Ordered category names.
    pub categories: Vec<String>,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Book projection returned by the listing routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookListing {
    /// Book ID.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Cover image path.
    pub cover_image: Option<String>,
    /// Ordered category names.
    pub categories: Vec<String>,
}

/// New catalog entry.
#[derive(Debug, Clone, Default)]
pub struct NewBook {
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// ISBN.
    pub isbn: Option<String>,
    /// Cover image path.
    pub cover_image: Option<String>,
    /// Ordered category names.
    pub categories: Vec<String>,
}

/// Feedback ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    /// Feedback ID.
    pub id: i64,
    /// Reporter name.
    pub name: String,
    /// Reporter email.
    pub email: String,
    /// Issue category.
    pub issue_type: String,
    /// Subject line.
    pub subject: String,
    /// Body.
    pub description: String,
    /// Triage status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Feedback submission.
#[derive(Debug, Clone)]
pub struct NewFeedback {
    /// Reporter name.
    pub name: String,
    /// Reporter email.
    pub email: String,
    /// Issue category.
    pub issue_type: String,
    /// Subject line.
    pub subject: String,
    /// Body.
    pub description: String,
}

/// In-progress read of one book by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentReading {
    /// User ID.
    pub user_id: i64,
    /// Book ID.
    pub book_id: i64,
    /// Current page.
    pub current_page: i64,
    /// Total pages.
    pub total_pages: i64,
    /// Progress in percent.
    pub progress_percent: f64,
    /// Accumulated time for this read.
    pub reading_session_time: i64,
    /// When the read started.
    pub start_date: i64,
    /// Last activity.
    pub last_read: i64,
}

/// One reading attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingHistory {
    /// Entry ID.
    pub id: i64,
    /// User ID.
    pub user_id: i64,
    /// Book ID.
    pub book_id: i64,
    /// "reading", "paused" or "completed".
    pub status: String,
    /// Accumulated time.
    pub reading_time: i64,
    /// Start timestamp.
    pub start_date: i64,
    /// Completion timestamp.
    pub end_date: Option<i64>,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Progress report for one book.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressUpdate {
    /// Page the reader is on.
    pub current_page: i64,
    /// Page count of the book.
    pub total_pages: i64,
    /// Time spent since the last report.
    pub reading_time: i64,
}

/// Currently-read book on the profile page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentReadingEntry {
    /// Book ID.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Cover image path.
    pub cover_image: Option<String>,
    /// Current page.
    pub current_page: i64,
    /// Total pages.
    pub total_pages: i64,
    /// Last activity.
    pub last_read: i64,
    /// Rounded progress in percent.
    pub progress: i64,
}

/// Reading-history entry on the profile page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Book ID.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Cover image path.
    pub cover_image: Option<String>,
    /// Status.
    pub status: String,
    /// Start timestamp.
    pub start_date: i64,
    /// Completion timestamp.
    pub end_date: Option<i64>,
}

/// Bookshelf entry on the profile page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelfEntry {
    /// Book ID.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Cover image path.
    pub cover_image: Option<String>,
    /// Shelf name.
    pub shelf_type: String,
    /// When the book was shelved.
    pub added_date: i64,
}

/// User block of the profile page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUser {
    /// Username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Role.
    pub role: String,
    /// Completed books.
    pub books_read: i64,
    /// Total reading time.
    pub reading_time: i64,
    /// Reading preferences, or a placeholder.
    pub reading_preferences: String,
    /// Last activity.
    pub last_active: Option<i64>,
}

/// Profile page read-model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    /// Account summary.
    pub user: ProfileUser,
    /// Up to 5 most recently touched current reads.
    pub current_reading: Vec<CurrentReadingEntry>,
    /// Up to 10 most recent history entries.
    pub reading_history: Vec<HistoryEntry>,
    /// Up to 12 most recently shelved books.
    pub my_bookshelf: Vec<ShelfEntry>,
}

/// Reading-time leaderboard entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    /// 1-based position.
    pub rank: usize,
    /// Username.
    pub username: String,
    /// Total reading time.
    pub reading_time: i64,
    /// Completed books.
    pub books_read: i64,
    /// Last activity.
    pub last_active: Option<i64>,
}

/// Admin dashboard counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Registered users.
    pub total_users: i64,
    /// Catalog size.
    pub total_books: i64,
    /// Feedback tickets.
    pub total_feedback: i64,
    /// Users with the admin role.
    pub admin_users: i64,
}

/// Placeholder for users without reading preferences.
pub const NO_PREFERENCES: &str = "No preferences yet";

/// Progress in percent, 0 when the page count is unknown.
pub fn progress_percent(current_page: i64, total_pages: i64) -> f64 {
    if total_pages > 0 {
        current_page as f64 / total_pages as f64 * 100.0
    } else {
        0.0
    }
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_guards_zero_pages() {
        assert_eq!(progress_percent(10, 0), 0.0);
        assert_eq!(progress_percent(10, -3), 0.0);
        assert_eq!(progress_percent(50, 100), 50.0);
    }

    #[test]
    fn remove_target_accepts_wire_and_table_names() {
        assert_eq!(
            RemoveTarget::parse("current"),
            Some(RemoveTarget::CurrentReading)
        );
        assert_eq!(
            RemoveTarget::parse("user_bookshelf"),
            Some(RemoveTarget::Bookshelf)
        );
        assert_eq!(RemoveTarget::parse("favorites"), None);
    }

    #[test]
    fn enums_round_trip_column_values() {
        for role in [Role::User, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(FeedbackStatus::parse("in_progress"), Some(FeedbackStatus::InProgress));
        assert_eq!(FeedbackStatus::parse("closed"), None);
    }
}
