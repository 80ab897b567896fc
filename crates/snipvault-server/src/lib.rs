pub mod clock;
pub mod dirs;
pub mod handlers;
pub mod server;
pub mod service;
pub mod store;
pub mod sweeper;

use chrono::DateTime;
use chrono_tz::Tz;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: service::SnippetService,
    /// Lifetime applied when a create request omits `expiration_seconds`.
    pub default_ttl_secs: i64,
    pub display: DisplayZone,
}

/// IANA zone used when rendering expiry times back to clients, plus the
/// label reported next to them. Storage and comparisons always stay in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayZone {
    pub tz: Tz,
    pub label: String,
}

impl DisplayZone {
    pub fn new(tz: Tz, label: impl Into<String>) -> Self {
        Self {
            tz,
            label: label.into(),
        }
    }

    pub fn utc() -> Self {
        Self::new(Tz::UTC, "UTC")
    }

    /// Render a Unix timestamp as RFC 3339 with the zone's offset at that
    /// instant, so daylight saving is applied.
    pub fn render(&self, unix_secs: i64) -> String {
        match DateTime::from_timestamp(unix_secs, 0) {
            Some(utc) => utc.with_timezone(&self.tz).to_rfc3339(),
            None => unix_secs.to_string(),
        }
    }
}

impl Default for DisplayZone {
    /// America/New_York, labelled "EST" year-round.
    fn default() -> Self {
        Self::new(chrono_tz::America::New_York, "EST")
    }
}

pub use server::{resolve_data_dir, router, run, ServerConfig};
pub use service::{SnippetError, SnippetService};
