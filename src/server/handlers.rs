//! HTTP request handlers.

use super::extract::{ApiJson, ApiPath};
use super::guard::{MaybeSession, RequireAdmin, RequireAuth};
use super::state::AppState;
use crate::auth::is_valid_email;
use crate::db::{
    BookListing, Feedback, FeedbackStatus, NewFeedback, ProfileData, ProgressUpdate,
    RankingEntry, RemoveTarget, Stats, UserSummary,
};
use crate::error::{AppError, Result};
use crate::session::SessionUser;
use axum::{Json, extract::State, http::header, response::IntoResponse};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// RESPONSE ENVELOPES
// ============================================================================

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    success: bool,
    message: String,
}

fn ok(message: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        success: true,
        message: message.to_string(),
    })
}

/// Successful response carrying a payload.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    success: bool,
    data: T,
}

fn data<T: Serialize>(data: T) -> Json<DataResponse<T>> {
    Json(DataResponse {
        success: true,
        data,
    })
}

/// Treat absent and empty strings alike.
fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Book IDs arrive as numbers or numeric strings depending on the page.
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientId {
    Number(i64),
    Text(String),
}

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<LenientId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(LenientId::Number(id)) => Ok(Some(id)),
        Some(LenientId::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn require_book_id(book_id: Option<i64>) -> Result<i64> {
    book_id.ok_or_else(|| AppError::BadRequest("bookId is required".to_string()))
}

// ============================================================================
// AUTH API
// ============================================================================

/// Register request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

/// Register a new account. Does not log in.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Json<MessageResponse>> {
    state.auth.register(
        req.username.as_deref(),
        req.email.as_deref(),
        req.password.as_deref(),
    )?;

    Ok(ok("Registration successful"))
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    success: bool,
    message: String,
    user: SessionUser,
}

/// Log in and set the session cookie.
pub async fn login(
    State(state): State<AppState>,
    MaybeSession(previous): MaybeSession,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    let user = state
        .auth
        .login(req.username.as_deref(), req.password.as_deref())?;

    if let Some(previous) = previous {
        state.sessions.destroy(&previous.token)?;
    }

    let snapshot = SessionUser::from(&user);
    let token = state.sessions.start(snapshot.clone())?;

    Ok((
        [(header::SET_COOKIE, state.sessions.set_cookie(&token))],
        Json(LoginResponse {
            success: true,
            message: "Login successful".to_string(),
            user: snapshot,
        }),
    ))
}

/// Destroy the session and clear the cookie.
pub async fn logout(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
) -> Result<impl IntoResponse> {
    if let Some(session) = session {
        state.sessions.destroy(&session.token)?;
        tracing::info!(user_id = session.data.user.id, "User logged out");
    }

    Ok((
        [(header::SET_COOKIE, state.sessions.clear_cookie())],
        ok("Logged out"),
    ))
}

/// Whoami response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoamiResponse {
    success: bool,
    user: Option<SessionUser>,
    is_login: bool,
}

/// Current session snapshot, or nulls. Never an auth failure.
pub async fn whoami(session: MaybeSession) -> Json<WhoamiResponse> {
    let data = session.data();

    Json(WhoamiResponse {
        success: true,
        user: data.map(|d| d.user.clone()),
        is_login: data.is_some_and(|d| d.is_login),
    })
}

// ============================================================================
// FEEDBACK API
// ============================================================================

/// Feedback submission.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    name: Option<String>,
    email: Option<String>,
    issue_type: Option<String>,
    subject: Option<String>,
    description: Option<String>,
}

/// Feedback creation response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackCreated {
    success: bool,
    message: String,
    feedback_id: i64,
}

/// Submit feedback.
pub async fn submit_feedback(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<FeedbackRequest>,
) -> Result<Json<FeedbackCreated>> {
    let (Some(name), Some(email), Some(issue_type), Some(subject), Some(description)) = (
        required(req.name),
        required(req.email),
        required(req.issue_type),
        required(req.subject),
        required(req.description),
    ) else {
        return Err(AppError::BadRequest("All fields are required".to_string()));
    };

    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }

    let feedback = NewFeedback {
        name,
        email,
        issue_type,
        subject,
        description,
    };
    let feedback_id = state.db.create_feedback(&feedback)?;

    tracing::info!(
        feedback_id,
        subject = %feedback.subject,
        email = %feedback.email,
        "New feedback submitted"
    );

    Ok(Json(FeedbackCreated {
        success: true,
        message: "Feedback submitted".to_string(),
        feedback_id,
    }))
}

/// List feedback (public view).
pub async fn list_feedback(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<Feedback>>>> {
    Ok(data(state.db.list_feedback()?))
}

/// List feedback (admin view).
pub async fn admin_list_feedback(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<Feedback>>>> {
    Ok(data(state.db.list_feedback()?))
}

/// Status change request.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    status: Option<String>,
}

/// Change the status of a feedback ticket.
pub async fn admin_update_feedback_status(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> Result<Json<MessageResponse>> {
    let status = req
        .status
        .as_deref()
        .and_then(FeedbackStatus::parse)
        .ok_or_else(|| AppError::BadRequest("Invalid feedback status".to_string()))?;

    if !state.db.update_feedback_status(id, status)? {
        return Err(AppError::NotFound(format!("Feedback not found: {}", id)));
    }

    tracing::info!(
        feedback_id = id,
        status = status.as_str(),
        admin_id = admin.data.user.id,
        "Feedback status updated"
    );

    Ok(ok("Feedback status updated"))
}

// ============================================================================
// CATALOG API
// ============================================================================

/// All books, newest first.
pub async fn list_books(State(state): State<AppState>) -> Result<Json<Vec<BookListing>>> {
    Ok(Json(state.db.list_books()?))
}

/// Books whose categories contain the given text.
pub async fn list_books_by_category(
    State(state): State<AppState>,
    ApiPath(category): ApiPath<String>,
) -> Result<Json<Vec<BookListing>>> {
    Ok(Json(state.db.list_books_by_category(&category)?))
}

// ============================================================================
// ADMIN API
// ============================================================================

/// All users.
pub async fn admin_list_users(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<UserSummary>>>> {
    Ok(data(state.auth.list_users()?))
}

/// Role change request.
#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    role: Option<String>,
}

/// Change the role of a user.
pub async fn admin_update_user_role(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<RoleRequest>,
) -> Result<Json<MessageResponse>> {
    state.auth.set_role(id, req.role.as_deref())?;
    Ok(ok("User role updated"))
}

/// Dashboard counters.
pub async fn admin_stats(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Stats>>> {
    Ok(data(state.db.stats()?))
}

// ============================================================================
// PROFILE API
// ============================================================================

/// Profile page data for the logged-in user.
pub async fn profile_data(
    RequireAuth(session): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<DataResponse<ProfileData>>> {
    let profile = state
        .db
        .profile_data(session.data.user.id)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(data(profile))
}

/// Profile update request.
#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    username: Option<String>,
    email: Option<String>,
}

/// Change username and email, refreshing the session snapshot.
pub async fn update_profile(
    RequireAuth(session): RequireAuth,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ProfileRequest>,
) -> Result<Json<MessageResponse>> {
    let (username, email) = state.auth.update_profile(
        session.data.user.id,
        req.username.as_deref(),
        req.email.as_deref(),
    )?;

    state
        .sessions
        .refresh_identity(&session.token, session.data, &username, &email)?;

    Ok(ok("Profile updated"))
}

/// Reading-time leaderboard.
pub async fn reading_ranking(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<RankingEntry>>>> {
    Ok(data(state.db.reading_time_ranking()?))
}

// ============================================================================
// READING API
// ============================================================================

/// Request naming a single book.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRequest {
    #[serde(default, deserialize_with = "lenient_id")]
    book_id: Option<i64>,
}

/// Begin or resume reading.
pub async fn reading_start(
    RequireAuth(session): RequireAuth,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BookRequest>,
) -> Result<Json<MessageResponse>> {
    let book_id = require_book_id(req.book_id)?;
    state.db.start_reading(session.data.user.id, book_id)?;
    Ok(ok("Reading session started"))
}

/// Progress report.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    #[serde(default, deserialize_with = "lenient_id")]
    book_id: Option<i64>,
    current_page: Option<i64>,
    total_pages: Option<i64>,
    reading_time: Option<i64>,
}

/// Progress response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    success: bool,
    message: String,
    progress_percent: f64,
}

/// Record reading progress.
pub async fn reading_progress(
    RequireAuth(session): RequireAuth,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ProgressRequest>,
) -> Result<Json<ProgressResponse>> {
    let book_id = require_book_id(req.book_id)?;
    let update = ProgressUpdate {
        current_page: req.current_page.unwrap_or(0),
        total_pages: req.total_pages.unwrap_or(0),
        reading_time: req.reading_time.unwrap_or(0),
    };

    let progress_percent = state
        .db
        .update_progress(session.data.user.id, book_id, update)?;

    Ok(Json(ProgressResponse {
        success: true,
        message: "Reading progress updated".to_string(),
        progress_percent,
    }))
}

/// Pause reading.
pub async fn reading_pause(
    RequireAuth(session): RequireAuth,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BookRequest>,
) -> Result<Json<MessageResponse>> {
    let book_id = require_book_id(req.book_id)?;
    state.db.pause_reading(session.data.user.id, book_id)?;
    Ok(ok("Reading paused"))
}

/// Finish a book.
pub async fn reading_complete(
    RequireAuth(session): RequireAuth,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BookRequest>,
) -> Result<Json<MessageResponse>> {
    let book_id = require_book_id(req.book_id)?;
    state.db.complete_reading(session.data.user.id, book_id)?;
    Ok(ok("Reading completed"))
}

/// Removal request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRequest {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    book_id: Option<i64>,
}

/// Remove a book from current reading, history or the bookshelf.
pub async fn remove_entry(
    RequireAuth(session): RequireAuth,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RemoveRequest>,
) -> Result<Json<MessageResponse>> {
    let target = req
        .kind
        .as_deref()
        .and_then(RemoveTarget::parse)
        .ok_or_else(|| AppError::BadRequest("Invalid removal type".to_string()))?;
    let book_id = require_book_id(req.book_id)?;

    if !state
        .db
        .remove_entry(session.data.user.id, target, book_id)?
    {
        return Err(AppError::NotFound("No matching record found".to_string()));
    }

    Ok(ok(match target {
        RemoveTarget::CurrentReading => "Removed from current reading",
        RemoveTarget::ReadingHistory => "Removed from reading history",
        RemoveTarget::Bookshelf => "Removed from bookshelf",
    }))
}
