//! Conversions from this crate's I/O errors into [`portfolio_core::Error`].
//!
//! Every trait method here returns `portfolio_core::Result`, so there's no local error enum;
//! `sqlx::Error` (and anything else fallible) is mapped to [`portfolio_core::Error::Backend`] at
//! the point it's produced.
use portfolio_core::Error;

pub(crate) fn backend(e: impl std::fmt::Display) -> Error {
    Error::Backend(e.to_string())
}
