//! API handlers.

pub mod admin;
pub mod alerts;
pub mod health;
pub mod jobs;
pub mod notifications;
pub mod outfits;
pub mod products;

/// Clamp a caller-supplied page size to `1..=max`.
pub(crate) fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max)
}
