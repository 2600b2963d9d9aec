//! Body and path extractors whose rejections use the JSON error envelope.

use crate::error::AppError;
use axum::extract::{FromRequest, FromRequestParts};

/// `axum::Json` answering bad bodies with a 400 envelope.
///
/// Covers a missing `Content-Type`, unparsable JSON and fields of the
/// wrong type.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Path` answering bad segments with a 400 envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);
