//! The check-in engine.
//!
//! A scan is classified in a fixed order:
//!
//! 1. authorize the device's access code for the selected event,
//! 2. resolve the code to a unit,
//! 3. reject units of another event,
//! 4. flip `checked_in_at` from null to now in one conditional update.
//!
//! Step 4 is the only write on the unit and is what makes concurrent scans of
//! one code resolve to exactly one admission. Every classification is then
//! handed to the [`AuditRecorder`], whose write is outside that step.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use turnstile_types::{
    AgentId, AgentRef, AttemptId, Booking, CheckinAttempt, CheckinOutcome, DenialReason, EventId,
    EventStats, TicketUnit, UnitCode,
};

use crate::access::AgentAccess;
use crate::audit::AuditRecorder;
use crate::error::{TicketError, TicketResult};
use crate::principal::Organizer;
use crate::store::{BookingStore, EventStore, MarkOutcome, Stores};

/// A unit together with the booking it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedUnit {
    /// The unit as stored after the scan.
    pub unit: TicketUnit,
    /// Its parent booking.
    pub booking: Booking,
}

/// Classification of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinResult {
    /// This scan admitted the holder.
    Admitted(Box<ScannedUnit>),
    /// The unit had already been used; it carries who and when.
    AlreadyCheckedIn(Box<ScannedUnit>),
    /// Hard stop with a reason.
    Denied(DenialReason),
    /// The code does not resolve to any unit.
    NotFound,
}

impl CheckinResult {
    /// The audit outcome of this classification.
    pub const fn outcome(&self) -> CheckinOutcome {
        match self {
            Self::Admitted(_) => CheckinOutcome::Success,
            Self::AlreadyCheckedIn(_) => CheckinOutcome::Already,
            Self::Denied(_) => CheckinOutcome::Denied,
            Self::NotFound => CheckinOutcome::NotFound,
        }
    }

    const fn reason(&self) -> Option<DenialReason> {
        match self {
            Self::Denied(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Validates scanned codes and records first use.
#[derive(Clone)]
pub struct CheckinEngine {
    access: AgentAccess,
    bookings: Arc<dyn BookingStore>,
    events: Arc<dyn EventStore>,
    audit: AuditRecorder,
}

impl CheckinEngine {
    /// Build the engine over the given stores.
    pub fn new(stores: &Stores, access: AgentAccess, audit: AuditRecorder) -> Self {
        Self {
            access,
            bookings: Arc::clone(&stores.bookings),
            events: Arc::clone(&stores.events),
            audit,
        }
    }

    /// Classify a scan of `input` by the device holding `access_code`, which
    /// has `event_id` selected.
    ///
    /// Only storage faults are returned as errors; every business outcome,
    /// including a denial, is a [`CheckinResult`].
    pub async fn checkin(
        &self,
        input: &str,
        access_code: &str,
        event_id: EventId,
    ) -> TicketResult<CheckinResult> {
        let (result, agent) = self.classify(input, access_code, event_id).await?;
        let agent_id = agent.as_ref().map(|a| a.id);

        match &result {
            CheckinResult::Admitted(scanned) => info!(
                code = %scanned.unit.code,
                booking_id = %scanned.booking.id,
                ?agent_id,
                %event_id,
                "Unit admitted"
            ),
            CheckinResult::AlreadyCheckedIn(scanned) => info!(
                code = %scanned.unit.code,
                first_at = ?scanned.unit.checked_in_at,
                first_by = ?scanned.unit.checked_in_by,
                ?agent_id,
                "Unit already checked in"
            ),
            CheckinResult::Denied(reason) => {
                warn!(?reason, ?agent_id, %event_id, "Scan denied");
            }
            CheckinResult::NotFound => warn!(?agent_id, %event_id, "Scanned code not found"),
        }

        self.audit
            .record(CheckinAttempt {
                id: AttemptId::new(),
                code: audit_code(input),
                agent_id,
                organizer_id: agent.map(|a| a.organizer_id),
                event_id,
                outcome: result.outcome(),
                reason: result.reason(),
                recorded_at: Utc::now(),
            })
            .await;
        Ok(result)
    }

    async fn classify(
        &self,
        input: &str,
        access_code: &str,
        event_id: EventId,
    ) -> TicketResult<(CheckinResult, Option<AgentRef>)> {
        match self.access.authorize(access_code, event_id).await {
            Ok(agent) => {
                let result = self.scan(input, agent.id, event_id).await?;
                Ok((result, Some(agent)))
            }
            Err(TicketError::Unauthorized) => {
                Ok((CheckinResult::Denied(DenialReason::Unauthorized), None))
            }
            Err(err) => Err(err),
        }
    }

    async fn scan(
        &self,
        input: &str,
        agent_id: AgentId,
        event_id: EventId,
    ) -> TicketResult<CheckinResult> {
        let Ok(code) = UnitCode::parse(input) else {
            return Ok(CheckinResult::NotFound);
        };
        let Some((unit, booking)) = self.bookings.find_unit(&code).await? else {
            return Ok(CheckinResult::NotFound);
        };
        if booking.event_id != event_id {
            return Ok(CheckinResult::Denied(DenialReason::WrongEvent));
        }
        if unit.is_voided() {
            return Ok(CheckinResult::Denied(DenialReason::Voided));
        }

        let result = match self
            .bookings
            .mark_checked_in(&code, agent_id, Utc::now())
            .await?
        {
            MarkOutcome::Admitted(unit) => {
                CheckinResult::Admitted(Box::new(ScannedUnit { unit, booking }))
            }
            MarkOutcome::AlreadyCheckedIn(unit) => {
                CheckinResult::AlreadyCheckedIn(Box::new(ScannedUnit { unit, booking }))
            }
            // Cancelled between the lookup and the update.
            MarkOutcome::Voided(_) => CheckinResult::Denied(DenialReason::Voided),
            MarkOutcome::Missing => CheckinResult::NotFound,
        };
        Ok(result)
    }

    /// Undo a recorded check-in.
    ///
    /// Requires an owner or manager of the unit's event and always writes a
    /// `reversed` audit row naming the organizer.
    pub async fn reverse(&self, organizer: &Organizer, input: &str) -> TicketResult<ScannedUnit> {
        if !organizer.is_elevated() {
            warn!(organizer_id = %organizer.organizer_id, role = ?organizer.role, "Reversal denied");
            return Err(TicketError::ReversalDenied);
        }
        let code = UnitCode::parse(input).map_err(|_invalid| TicketError::NotFound)?;
        let (_, booking) = self
            .bookings
            .find_unit(&code)
            .await?
            .ok_or(TicketError::NotFound)?;
        if organizer
            .owned_event(self.events.as_ref(), booking.event_id)
            .await
            .is_err()
        {
            warn!(organizer_id = %organizer.organizer_id, %code, "Reversal on foreign event denied");
            return Err(TicketError::ReversalDenied);
        }

        let before = self
            .bookings
            .reverse_checkin(&code)
            .await?
            .ok_or(TicketError::NotCheckedIn)?;
        info!(
            %code,
            organizer_id = %organizer.organizer_id,
            was_checked_in_at = ?before.checked_in_at,
            was_checked_in_by = ?before.checked_in_by,
            "Check-in reversed"
        );

        self.audit
            .record(CheckinAttempt {
                id: AttemptId::new(),
                code: code.to_string(),
                agent_id: before.checked_in_by,
                organizer_id: Some(organizer.organizer_id),
                event_id: booking.event_id,
                outcome: CheckinOutcome::Reversed,
                reason: None,
                recorded_at: Utc::now(),
            })
            .await;

        let unit = TicketUnit {
            checked_in_at: None,
            checked_in_by: None,
            ..before
        };
        Ok(ScannedUnit { unit, booking })
    }

    /// Dashboard counters for one of the organizer's events.
    pub async fn stats(&self, organizer: &Organizer, event_id: EventId) -> TicketResult<EventStats> {
        organizer.owned_event(self.events.as_ref(), event_id).await?;
        self.bookings.event_stats(event_id).await
    }

    /// Audit rows of a unit on one of the organizer's events, oldest first.
    ///
    /// Only rows recorded against the unit's own event are returned.
    pub async fn attempts_for_code(
        &self,
        organizer: &Organizer,
        input: &str,
    ) -> TicketResult<Vec<CheckinAttempt>> {
        let code = UnitCode::parse(input).map_err(|_invalid| TicketError::NotFound)?;
        let (_, booking) = self
            .bookings
            .find_unit(&code)
            .await?
            .ok_or(TicketError::NotFound)?;
        organizer
            .owned_event(self.events.as_ref(), booking.event_id)
            .await
            .map_err(|_foreign| TicketError::NotFound)?;
        let mut attempts = self.audit.attempts_for_code(code.as_str()).await?;
        // Scans of this code at other organizers' events stay with them.
        attempts.retain(|attempt| attempt.event_id == booking.event_id);
        Ok(attempts)
    }

    /// Subscribe to the live feed of classified scans and reversals.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CheckinAttempt> {
        self.audit.subscribe()
    }
}

/// The code as it goes into the audit trail: normalized when it parses,
/// otherwise the trimmed raw input, capped so junk cannot bloat the log.
fn audit_code(input: &str) -> String {
    UnitCode::parse(input).map_or_else(
        |_invalid| input.trim().chars().take(64).collect(),
        UnitCode::into_inner,
    )
}
