use chrono::{DateTime, Utc};

use crate::models::MiningSession;

/// Interpolates the displayed token balance between two authoritative server
/// updates. Never persisted anywhere; the next reconcile snaps the display
/// back to the server total.
pub fn compute_display_value(session: &MiningSession, now: DateTime<Utc>) -> f64 {
    if !session.is_mining || session.current_rate_per_minute <= 0.0 {
        return session.accumulated_tokens;
    }

    // A missing heartbeat timestamp means we have no reference point yet, so
    // elapsed time is zero. A reference in the future (clock skew) is clamped
    // the same way to keep the display monotone.
    let reference = session.last_heartbeat.unwrap_or(now);
    let elapsed_ms = now.signed_duration_since(reference).num_milliseconds().max(0);

    let rate_per_second = session.current_rate_per_minute / 60.0;
    session.accumulated_tokens + (elapsed_ms as f64 / 1000.0) * rate_per_second
}
