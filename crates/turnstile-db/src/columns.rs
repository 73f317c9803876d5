//! Mapping between domain enums and integers and their column values.
//!
//! Enums are stored as the same snake_case strings they serialize to, and
//! constrained by `CHECK` clauses in the schema.

use turnstile_types::{AgentStatus, CheckinOutcome, DenialReason, SalesChannel};

use crate::error::DbError;

pub(crate) const fn channel_str(channel: SalesChannel) -> &'static str {
    match channel {
        SalesChannel::Online => "online",
        SalesChannel::Pos => "pos",
    }
}

pub(crate) fn parse_channel(value: &str) -> Result<SalesChannel, DbError> {
    match value {
        "online" => Ok(SalesChannel::Online),
        "pos" => Ok(SalesChannel::Pos),
        other => Err(DbError::Corrupt(format!("unknown sales channel '{other}'"))),
    }
}

pub(crate) const fn status_str(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Active => "active",
        AgentStatus::Blocked => "blocked",
    }
}

pub(crate) fn parse_status(value: &str) -> Result<AgentStatus, DbError> {
    match value {
        "active" => Ok(AgentStatus::Active),
        "blocked" => Ok(AgentStatus::Blocked),
        other => Err(DbError::Corrupt(format!("unknown agent status '{other}'"))),
    }
}

pub(crate) const fn outcome_str(outcome: CheckinOutcome) -> &'static str {
    match outcome {
        CheckinOutcome::Success => "success",
        CheckinOutcome::Already => "already",
        CheckinOutcome::Denied => "denied",
        CheckinOutcome::NotFound => "not_found",
        CheckinOutcome::Reversed => "reversed",
    }
}

pub(crate) fn parse_outcome(value: &str) -> Result<CheckinOutcome, DbError> {
    match value {
        "success" => Ok(CheckinOutcome::Success),
        "already" => Ok(CheckinOutcome::Already),
        "denied" => Ok(CheckinOutcome::Denied),
        "not_found" => Ok(CheckinOutcome::NotFound),
        "reversed" => Ok(CheckinOutcome::Reversed),
        other => Err(DbError::Corrupt(format!("unknown check-in outcome '{other}'"))),
    }
}

pub(crate) const fn reason_str(reason: DenialReason) -> &'static str {
    match reason {
        DenialReason::Unauthorized => "unauthorized",
        DenialReason::WrongEvent => "wrong_event",
        DenialReason::Voided => "voided",
    }
}

pub(crate) fn parse_reason(value: &str) -> Result<DenialReason, DbError> {
    match value {
        "unauthorized" => Ok(DenialReason::Unauthorized),
        "wrong_event" => Ok(DenialReason::WrongEvent),
        "voided" => Ok(DenialReason::Voided),
        other => Err(DbError::Corrupt(format!("unknown denial reason '{other}'"))),
    }
}

/// Domain counts are `u32`; the schema uses `INTEGER`.
pub(crate) fn to_db_int(value: u32, field: &str) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|_overflow| {
        DbError::Ticket(turnstile_core::TicketError::InvalidInput(format!(
            "{field} {value} exceeds the storable range"
        )))
    })
}

pub(crate) fn from_db_int(value: i32, field: &str) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|_negative| DbError::Corrupt(format!("negative {field} {value}")))
}

pub(crate) fn from_db_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_columns_match_serde_names() {
        for channel in [SalesChannel::Online, SalesChannel::Pos] {
            assert_eq!(parse_channel(channel_str(channel)).ok(), Some(channel));
        }
        for outcome in [
            CheckinOutcome::Success,
            CheckinOutcome::Already,
            CheckinOutcome::Denied,
            CheckinOutcome::NotFound,
            CheckinOutcome::Reversed,
        ] {
            assert_eq!(parse_outcome(outcome_str(outcome)).ok(), Some(outcome));
        }
        assert_eq!(reason_str(DenialReason::WrongEvent), "wrong_event");
        assert_eq!(status_str(AgentStatus::Blocked), "blocked");
    }

    #[test]
    fn unknown_values_are_corrupt() {
        assert!(matches!(parse_status("paused"), Err(DbError::Corrupt(_))));
        assert!(matches!(parse_reason(""), Err(DbError::Corrupt(_))));
    }

    #[test]
    fn integer_ranges_are_checked() {
        assert_eq!(to_db_int(7, "quantity").ok(), Some(7));
        assert!(to_db_int(u32::MAX, "quantity").is_err());
        assert!(matches!(from_db_int(-1, "capacity"), Err(DbError::Corrupt(_))));
        assert_eq!(from_db_count(-5), 0);
    }
}
