//! Service request negotiation constants, validation and state machine.
//!
//! This module lives in `core` (zero internal deps) so it can be used by the
//! repository layer, the negotiation engine and the API handlers.

use crate::types::Amount;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How long a freshly posted request stays open when the client does not
/// specify a validity window.
pub const DEFAULT_VALID_MINUTES: i64 = 5;

/// Upper bound for a request validity window (one week).
pub const MAX_VALID_MINUTES: i64 = 7 * 24 * 60;

/// Maximum length of a request description.
pub const MAX_DESCRIPTION_LEN: usize = 2000;

/// Maximum length of an offer, schedule or proposal comment.
pub const MAX_COMMENT_LEN: usize = 1000;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A client asking price may be zero ("make me an offer") but never negative.
pub fn validate_client_price(price: Amount) -> Result<(), String> {
    if price < 0 {
        return Err(format!("Client price must be >= 0, got {price}"));
    }
    Ok(())
}

/// Offers always carry a strictly positive price.
pub fn validate_offer_price(price: Amount) -> Result<(), String> {
    if price <= 0 {
        return Err(format!("Offer price must be > 0, got {price}"));
    }
    Ok(())
}

/// Validate the validity window of a new request.
pub fn validate_valid_minutes(minutes: i64) -> Result<(), String> {
    if !(1..=MAX_VALID_MINUTES).contains(&minutes) {
        return Err(format!(
            "valid_minutes must be between 1 and {MAX_VALID_MINUTES}, got {minutes}"
        ));
    }
    Ok(())
}

/// Validate a request description: non-blank and bounded.
pub fn validate_description(description: &str) -> Result<(), String> {
    if description.trim().is_empty() {
        return Err("Description must not be empty".to_string());
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(format!(
            "Description must be at most {MAX_DESCRIPTION_LEN} characters"
        ));
    }
    Ok(())
}

/// Validate an optional free-text comment.
pub fn validate_comment(comment: Option<&str>) -> Result<(), String> {
    match comment {
        Some(c) if c.chars().count() > MAX_COMMENT_LEN => Err(format!(
            "Comment must be at most {MAX_COMMENT_LEN} characters"
        )),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Service request status IDs matching `service_request_statuses` seed data
/// (1-based SMALLSERIAL).
///
/// Duplicated from the `db` crate's `RequestStatus` enum because `core` must
/// have zero internal deps.
pub mod state_machine {
    pub const PENDING: i16 = 1;
    pub const OFFERED: i16 = 2;
    pub const ACCEPTED: i16 = 3;
    pub const SCHEDULED: i16 = 4;
    pub const IN_PROGRESS: i16 = 5;
    pub const COMPLETED: i16 = 6;
    pub const CANCELLED: i16 = 7;
    pub const EXPIRED: i16 = 8;

    /// Returns the set of valid target status IDs reachable from `from_status`.
    ///
    /// Terminal states (Completed, Cancelled, Expired) return an empty slice.
    pub fn valid_transitions(from_status: i16) -> &'static [i16] {
        match from_status {
            // Pending -> Offered, Accepted (counter-offer), Scheduled (direct take),
            // Cancelled, Expired
            PENDING => &[OFFERED, ACCEPTED, SCHEDULED, CANCELLED, EXPIRED],
            // Offered -> Pending (last offer rejected), Accepted, Cancelled
            OFFERED => &[PENDING, ACCEPTED, CANCELLED],
            // Accepted -> Scheduled, Cancelled
            ACCEPTED => &[SCHEDULED, CANCELLED],
            // Scheduled -> InProgress, Completed, Cancelled
            SCHEDULED => &[IN_PROGRESS, COMPLETED, CANCELLED],
            // InProgress -> Completed, Cancelled
            IN_PROGRESS => &[COMPLETED, CANCELLED],
            COMPLETED | CANCELLED | EXPIRED => &[],
            _ => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: i16, to: i16) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Whether no further transition is permitted from `status`.
    pub fn is_terminal(status: i16) -> bool {
        matches!(status, COMPLETED | CANCELLED | EXPIRED)
    }

    /// Validate a state transition, returning an error message for invalid ones.
    pub fn validate_transition(from: i16, to: i16) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!(
                "Invalid transition: {} -> {}",
                status_name(from),
                status_name(to)
            ))
        }
    }

    /// Human-readable name for a status ID (for error messages).
    pub fn status_name(id: i16) -> &'static str {
        match id {
            PENDING => "pending",
            OFFERED => "offered",
            ACCEPTED => "accepted",
            SCHEDULED => "scheduled",
            IN_PROGRESS => "in_progress",
            COMPLETED => "completed",
            CANCELLED => "cancelled",
            EXPIRED => "expired",
            _ => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::state_machine::*;
    use super::*;

    #[test]
    fn pending_can_be_offered_taken_or_expired() {
        assert!(can_transition(PENDING, OFFERED));
        assert!(can_transition(PENDING, SCHEDULED));
        assert!(can_transition(PENDING, EXPIRED));
        assert!(can_transition(PENDING, CANCELLED));
    }

    #[test]
    fn offered_falls_back_to_pending() {
        assert!(can_transition(OFFERED, PENDING));
        assert!(!can_transition(OFFERED, EXPIRED));
    }

    #[test]
    fn accepted_must_be_scheduled_before_completion() {
        assert!(can_transition(ACCEPTED, SCHEDULED));
        assert!(!can_transition(ACCEPTED, COMPLETED));
    }

    #[test]
    fn scheduled_and_in_progress_complete() {
        assert!(can_transition(SCHEDULED, COMPLETED));
        assert!(can_transition(IN_PROGRESS, COMPLETED));
        assert!(can_transition(SCHEDULED, IN_PROGRESS));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for status in [COMPLETED, CANCELLED, EXPIRED] {
            assert!(is_terminal(status));
            assert!(valid_transitions(status).is_empty());
        }
    }

    #[test]
    fn every_live_state_can_be_cancelled() {
        for status in [PENDING, OFFERED, ACCEPTED, SCHEDULED, IN_PROGRESS] {
            assert!(can_transition(status, CANCELLED), "{}", status_name(status));
        }
    }

    #[test]
    fn unknown_status_has_no_transitions() {
        assert!(valid_transitions(99).is_empty());
        assert_eq!(status_name(99), "unknown");
    }

    #[test]
    fn invalid_transition_message_names_both_states() {
        let err = validate_transition(COMPLETED, PENDING).unwrap_err();
        assert_eq!(err, "Invalid transition: completed -> pending");
    }

    #[test]
    fn client_price_allows_zero() {
        assert!(validate_client_price(0).is_ok());
        assert!(validate_client_price(50_000).is_ok());
        assert!(validate_client_price(-1).is_err());
    }

    #[test]
    fn offer_price_must_be_positive() {
        assert!(validate_offer_price(1).is_ok());
        assert!(validate_offer_price(0).is_err());
        assert!(validate_offer_price(-10).is_err());
    }

    #[test]
    fn valid_minutes_bounds() {
        assert!(validate_valid_minutes(DEFAULT_VALID_MINUTES).is_ok());
        assert!(validate_valid_minutes(MAX_VALID_MINUTES).is_ok());
        assert!(validate_valid_minutes(0).is_err());
        assert!(validate_valid_minutes(MAX_VALID_MINUTES + 1).is_err());
    }

    #[test]
    fn blank_description_rejected() {
        assert!(validate_description("   ").is_err());
        assert!(validate_description("Washer leaks").is_ok());
        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        assert!(validate_description(&long).is_err());
    }

    #[test]
    fn comment_length_bounded() {
        assert!(validate_comment(None).is_ok());
        assert!(validate_comment(Some("tomorrow works")).is_ok());
        let long = "y".repeat(MAX_COMMENT_LEN + 1);
        assert!(validate_comment(Some(&long)).is_err());
    }
}
