//! The booking ledger: sales, their unit codes and cancellation.
//!
//! A booking is only ever persisted together with its capacity reservation
//! and its units. Code collisions are resolved here by drawing a fresh set
//! of codes and trying again, so a caller never sees a collision unless the
//! code space is effectively exhausted.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use turnstile_types::{
    Booking, BookingId, Buyer, EventId, SalesChannel, TicketUnit, TierId, UnitCode,
};

use crate::codes::CodeGenerator;
use crate::config::TurnstileConfig;
use crate::error::{TicketError, TicketResult};
use crate::store::{BookingStore, Stores, TierStore};

/// A sale as requested by a sales channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    /// Event the buyer is attending.
    pub event_id: EventId,
    /// Tier being bought.
    pub tier_id: TierId,
    /// Number of admissions.
    pub quantity: u32,
    /// Buyer details.
    pub buyer: Buyer,
    /// Where the sale happened.
    pub channel: SalesChannel,
}

/// Records sales and resolves unit codes.
#[derive(Clone)]
pub struct BookingLedger {
    tiers: Arc<dyn TierStore>,
    bookings: Arc<dyn BookingStore>,
    codes: Arc<dyn CodeGenerator>,
    max_units_per_booking: u32,
    max_generation_attempts: u32,
}

impl BookingLedger {
    /// Build the ledger over the given stores.
    pub fn new(stores: &Stores, codes: Arc<dyn CodeGenerator>, config: &TurnstileConfig) -> Self {
        Self {
            tiers: Arc::clone(&stores.tiers),
            bookings: Arc::clone(&stores.bookings),
            codes,
            max_units_per_booking: config.sales.max_units_per_booking,
            max_generation_attempts: config.codes.max_generation_attempts.max(1),
        }
    }

    /// Reserve capacity and persist a booking with one fresh code per unit.
    ///
    /// `InsufficientStock` is passed through untouched and leaves nothing
    /// behind.
    pub async fn create_booking(&self, request: NewBooking) -> TicketResult<Booking> {
        let quantity = request.quantity;
        if quantity == 0 || quantity > self.max_units_per_booking {
            return Err(TicketError::InvalidQuantity {
                quantity,
                max: self.max_units_per_booking,
            });
        }
        let buyer = Buyer {
            name: crate::catalog::validate_name("buyer name", &request.buyer.name)?,
            contact: request.buyer.contact.trim().to_owned(),
        };

        match self.tiers.get_tier(request.tier_id).await? {
            Some(tier) if tier.event_id == request.event_id => {}
            _ => return Err(TicketError::TierNotFound(request.tier_id)),
        }

        let mut booking = Booking {
            id: BookingId::new(),
            event_id: request.event_id,
            tier_id: request.tier_id,
            quantity,
            buyer,
            channel: request.channel,
            created_at: Utc::now(),
            unit_codes: Vec::new(),
            cancelled_at: None,
        };

        for attempt in 1..=self.max_generation_attempts {
            booking.unit_codes = self.draw_codes(quantity)?;
            match self.bookings.insert_booking(&booking).await {
                Ok(()) => {
                    info!(
                        booking_id = %booking.id,
                        tier_id = %booking.tier_id,
                        quantity,
                        channel = ?booking.channel,
                        "Booking created"
                    );
                    return Ok(booking);
                }
                Err(TicketError::CodeCollision) => {
                    warn!(booking_id = %booking.id, attempt, "Unit code collision, drawing again");
                }
                Err(err @ TicketError::InsufficientStock { .. }) => {
                    info!(tier_id = %booking.tier_id, quantity, %err, "Booking refused");
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }

        error!(
            booking_id = %booking.id,
            attempts = self.max_generation_attempts,
            "Unit code space exhausted"
        );
        Err(TicketError::CodeSpaceExhausted(self.max_generation_attempts))
    }

    /// Void a booking's units and release its capacity.
    ///
    /// Refused with `AlreadyCheckedIn` once any unit has been used.
    pub async fn cancel_booking(&self, booking_id: BookingId) -> TicketResult<Booking> {
        match self.bookings.cancel_booking(booking_id, Utc::now()).await {
            Ok(booking) => {
                info!(%booking_id, quantity = booking.quantity, "Booking cancelled");
                Ok(booking)
            }
            Err(err @ TicketError::CapacityUnderflow { .. }) => {
                error!(%booking_id, %err, "Cancellation would underflow tier capacity");
                Err(err)
            }
            Err(err) => {
                debug!(%booking_id, %err, "Cancellation refused");
                Err(err)
            }
        }
    }

    /// Resolve scanned input to its unit and booking.
    ///
    /// Input that cannot be a unit code is reported as `NotFound`.
    pub async fn find_by_code(&self, input: &str) -> TicketResult<(TicketUnit, Booking)> {
        let code = UnitCode::parse(input).map_err(|_invalid| TicketError::NotFound)?;
        self.find_unit(&code).await
    }

    /// Resolve an already normalized code.
    pub async fn find_unit(&self, code: &UnitCode) -> TicketResult<(TicketUnit, Booking)> {
        self.bookings
            .find_unit(code)
            .await?
            .ok_or(TicketError::NotFound)
    }

    /// Look up a booking.
    pub async fn get_booking(&self, booking_id: BookingId) -> TicketResult<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or(TicketError::BookingNotFound(booking_id))
    }

    fn draw_codes(&self, quantity: u32) -> TicketResult<Vec<UnitCode>> {
        (0..quantity)
            .map(|_| {
                UnitCode::parse(&self.codes.unit_code())
                    .map_err(|err| TicketError::InvalidInput(format!("generated code: {err}")))
            })
            .collect()
    }
}
