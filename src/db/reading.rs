//! Reading lifecycle, per-user collections and the read-models built on them.
//!
//! Lifecycle per (user, book): start → progress* → pause | complete.
//! A paused book is resumed by starting it again. Each multi-table step
//! runs in one transaction, taken IMMEDIATE so the write lock is held
//! before the first read.

use crate::db::*;
use crate::error::{AppError, Result};
use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};

/// Longest current-reading list on the profile page.
const PROFILE_CURRENT_LIMIT: i64 = 5;
/// Longest history list on the profile page.
const PROFILE_HISTORY_LIMIT: i64 = 10;
/// Longest bookshelf list on the profile page.
const PROFILE_SHELF_LIMIT: i64 = 12;
/// Leaderboard length.
const RANKING_LIMIT: i64 = 50;

fn ensure_book(tx: &Transaction<'_>, book_id: i64) -> Result<()> {
    let found = tx
        .query_row("SELECT 1 FROM books WHERE id = ?1", params![book_id], |_| Ok(()))
        .optional()?;

    match found {
        Some(()) => Ok(()),
        None => Err(AppError::NotFound(format!("Book not found: {}", book_id))),
    }
}

impl Database {
    /// Begin or resume reading a book.
    ///
    /// The current-reading row and the "reading" history row are checked
    /// independently: restarting a paused book keeps its current-reading row
    /// and opens a fresh history entry.
    pub fn start_reading(&self, user_id: i64, book_id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_book(&tx, book_id)?;

        let now = now_timestamp();

        let refreshed = tx.execute(
            "UPDATE current_reading SET last_read = ?1 WHERE user_id = ?2 AND book_id = ?3",
            params![now, user_id, book_id],
        )?;
        if refreshed == 0 {
            tx.execute(
                "INSERT INTO current_reading (user_id, book_id, start_date, last_read)
                 VALUES (?1, ?2, ?3, ?3)",
                params![user_id, book_id, now],
            )?;
        }

        let open_entry = tx
            .query_row(
                "SELECT id FROM reading_history
                 WHERE user_id = ?1 AND book_id = ?2 AND status = ?3",
                params![user_id, book_id, HistoryStatus::Reading.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if open_entry.is_none() {
            tx.execute(
                "INSERT INTO reading_history (user_id, book_id, status, start_date, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![user_id, book_id, HistoryStatus::Reading.as_str(), now],
            )?;
        }

        tx.commit()?;
        tracing::debug!(user_id, book_id, "Reading started");
        Ok(())
    }

    /// Record a progress report, returning the stored percentage.
    ///
    /// Updates the current-reading row, the open history entry and the user's
    /// reading-time total.
    pub fn update_progress(
        &self,
        user_id: i64,
        book_id: i64,
        update: ProgressUpdate,
    ) -> Result<f64> {
        let percent = progress_percent(update.current_page, update.total_pages);
        let now = now_timestamp();

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "UPDATE current_reading
             SET current_page = ?1, total_pages = ?2,
                 reading_session_time = reading_session_time + ?3,
                 progress_percent = ?4, last_read = ?5
             WHERE user_id = ?6 AND book_id = ?7",
            params![
                update.current_page,
                update.total_pages,
                update.reading_time,
                percent,
                now,
                user_id,
                book_id,
            ],
        )?;

        tx.execute(
            "UPDATE reading_history
             SET reading_time = reading_time + ?1, updated_at = ?2
             WHERE user_id = ?3 AND book_id = ?4 AND status = ?5",
            params![
                update.reading_time,
                now,
                user_id,
                book_id,
                HistoryStatus::Reading.as_str(),
            ],
        )?;

        tx.execute(
            "UPDATE users SET reading_time = reading_time + ?1, last_active = ?2 WHERE id = ?3",
            params![update.reading_time, now, user_id],
        )?;

        tx.commit()?;
        Ok(percent)
    }

    /// Pause the open history entry. Current progress is kept.
    pub fn pause_reading(&self, user_id: i64, book_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE reading_history SET status = ?1, updated_at = ?2
             WHERE user_id = ?3 AND book_id = ?4 AND status = ?5",
            params![
                HistoryStatus::Paused.as_str(),
                now_timestamp(),
                user_id,
                book_id,
                HistoryStatus::Reading.as_str(),
            ],
        )?;
        Ok(rows > 0)
    }

    /// Finish a book: close its history, drop it from current reading,
    /// count it and put it on the "read" shelf.
    pub fn complete_reading(&self, user_id: i64, book_id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_book(&tx, book_id)?;

        let now = now_timestamp();

        tx.execute(
            "UPDATE reading_history SET status = ?1, end_date = ?2, updated_at = ?2
             WHERE user_id = ?3 AND book_id = ?4 AND status != ?1",
            params![HistoryStatus::Completed.as_str(), now, user_id, book_id],
        )?;

        tx.execute(
            "DELETE FROM current_reading WHERE user_id = ?1 AND book_id = ?2",
            params![user_id, book_id],
        )?;

        tx.execute(
            "UPDATE users SET books_read = books_read + 1 WHERE id = ?1",
            params![user_id],
        )?;

        tx.execute(
            "INSERT INTO user_bookshelf (user_id, book_id, shelf_type, added_date)
             VALUES (?1, ?2, 'read', ?3)
             ON CONFLICT (user_id, book_id) DO NOTHING",
            params![user_id, book_id, now],
        )?;

        tx.commit()?;
        tracing::debug!(user_id, book_id, "Reading completed");
        Ok(())
    }

    /// Delete a book from one of the user's collections.
    pub fn remove_entry(&self, user_id: i64, target: RemoveTarget, book_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let sql = format!(
            "DELETE FROM {} WHERE user_id = ?1 AND book_id = ?2",
            target.table()
        );
        let rows = conn.execute(&sql, params![user_id, book_id])?;
        Ok(rows > 0)
    }

    /// Current-reading row for (user, book).
    pub fn get_current_reading(&self, user_id: i64, book_id: i64) -> Result<Option<CurrentReading>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT user_id, book_id, current_page, total_pages, progress_percent,
                        reading_session_time, start_date, last_read
                 FROM current_reading WHERE user_id = ?1 AND book_id = ?2",
                params![user_id, book_id],
                |row| {
                    Ok(CurrentReading {
                        user_id: row.get(0)?,
                        book_id: row.get(1)?,
                        current_page: row.get(2)?,
                        total_pages: row.get(3)?,
                        progress_percent: row.get(4)?,
                        reading_session_time: row.get(5)?,
                        start_date: row.get(6)?,
                        last_read: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// History entries for (user, book), oldest first.
    pub fn get_reading_history(&self, user_id: i64, book_id: i64) -> Result<Vec<ReadingHistory>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, book_id, status, reading_time, start_date, end_date, updated_at
             FROM reading_history WHERE user_id = ?1 AND book_id = ?2
             ORDER BY id",
        )?;

        let entries = stmt
            .query_map(params![user_id, book_id], |row| {
                Ok(ReadingHistory {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    book_id: row.get(2)?,
                    status: row.get(3)?,
                    reading_time: row.get(4)?,
                    start_date: row.get(5)?,
                    end_date: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Shelf a book sits on for this user, if any.
    pub fn get_shelf_type(&self, user_id: i64, book_id: i64) -> Result<Option<String>> {
        let conn = self.conn()?;
        let shelf = conn
            .query_row(
                "SELECT shelf_type FROM user_bookshelf WHERE user_id = ?1 AND book_id = ?2",
                params![user_id, book_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(shelf)
    }

    /// Assemble the profile page for a user. `None` if the user is gone.
    pub fn profile_data(&self, user_id: i64) -> Result<Option<ProfileData>> {
        let conn = self.conn()?;

        let user = conn
            .query_row(
                "SELECT username, email, role, books_read, reading_time, reading_preferences, last_active
                 FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(ProfileUser {
                        username: row.get(0)?,
                        email: row.get(1)?,
                        role: row.get(2)?,
                        books_read: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                        reading_time: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                        reading_preferences: row
                            .get::<_, Option<String>>(5)?
                            .filter(|p| !p.is_empty())
                            .unwrap_or_else(|| NO_PREFERENCES.to_string()),
                        last_active: row.get(6)?,
                    })
                },
            )
            .optional()?;

        let Some(user) = user else {
            return Ok(None);
        };

        let current_reading = conn
            .prepare(
                "SELECT b.id, b.title, b.author, b.cover_image, cr.current_page, cr.total_pages, cr.last_read
                 FROM current_reading cr
                 JOIN books b ON cr.book_id = b.id
                 WHERE cr.user_id = ?1
                 ORDER BY cr.last_read DESC, cr.id DESC
                 LIMIT ?2",
            )?
            .query_map(params![user_id, PROFILE_CURRENT_LIMIT], |row| {
                let current_page: i64 = row.get(4)?;
                let total_pages: i64 = row.get(5)?;
                Ok(CurrentReadingEntry {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    author: row.get(2)?,
                    cover_image: row.get(3)?,
                    current_page,
                    total_pages,
                    last_read: row.get(6)?,
                    progress: progress_percent(current_page, total_pages).round() as i64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let reading_history = conn
            .prepare(
                "SELECT b.id, b.title, b.author, b.cover_image, rh.status, rh.start_date, rh.end_date
                 FROM reading_history rh
                 JOIN books b ON rh.book_id = b.id
                 WHERE rh.user_id = ?1
                 ORDER BY rh.start_date DESC, rh.id DESC
                 LIMIT ?2",
            )?
            .query_map(params![user_id, PROFILE_HISTORY_LIMIT], |row| {
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    author: row.get(2)?,
                    cover_image: row.get(3)?,
                    status: row.get(4)?,
                    start_date: row.get(5)?,
                    end_date: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let my_bookshelf = conn
            .prepare(
                "SELECT b.id, b.title, b.author, b.cover_image, ub.shelf_type, ub.added_date
                 FROM user_bookshelf ub
                 JOIN books b ON ub.book_id = b.id
                 WHERE ub.user_id = ?1
                 ORDER BY ub.added_date DESC, ub.id DESC
                 LIMIT ?2",
            )?
            .query_map(params![user_id, PROFILE_SHELF_LIMIT], |row| {
                Ok(ShelfEntry {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    author: row.get(2)?,
                    cover_image: row.get(3)?,
                    shelf_type: row.get(4)?,
                    added_date: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(ProfileData {
            user,
            current_reading,
            reading_history,
            my_bookshelf,
        }))
    }

    /// Top readers by total reading time. Users who never read are left out.
    pub fn reading_time_ranking(&self) -> Result<Vec<RankingEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT username, reading_time, books_read, last_active
             FROM users
             WHERE reading_time > 0
             ORDER BY reading_time DESC
             LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![RANKING_LIMIT], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(
                |(index, (username, reading_time, books_read, last_active))| RankingEntry {
                    rank: index + 1,
                    username,
                    reading_time,
                    books_read: books_read.unwrap_or(0),
                    last_active,
                },
            )
            .collect())
    }
}
