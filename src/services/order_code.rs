//! Order-code encoding.
//!
//! The external processor treats the order code as an opaque integer; this
//! module packs the target entity reference into it so a webhook can be routed
//! back without a lookup table. The arithmetic is a wire-format contract shared
//! with every webhook the processor will ever replay, so it must not change.

use chrono::{DateTime, Utc};

use crate::models::PaymentTarget;

const SCOPE_BASE: i64 = 1_000_000;
const UPGRADE_MARKER: i64 = 500_000;
const UPGRADE_SUFFIX_MOD: i64 = 100_000;

/// Entity scope recovered from an order code. The upgrade kind (Agency/Host)
/// is not part of the wire format; the reconciler reads it from the matched
/// payment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderScope {
    Booking(i64),
    Upgrade(i64),
}

/// Encode a target reference into an order code using the current time bucket.
pub fn encode(target: &PaymentTarget) -> i64 {
    encode_at(target, Utc::now())
}

/// Encode against an explicit timestamp. The time-derived suffix only reduces
/// accidental collisions between repeated checkout attempts; it carries no
/// meaning and collisions are resolved at lookup time by the reconciler.
pub fn encode_at(target: &PaymentTarget, at: DateTime<Utc>) -> i64 {
    let seconds = at.timestamp();
    match target {
        PaymentTarget::Booking { booking_id } => booking_id * SCOPE_BASE + seconds % SCOPE_BASE,
        PaymentTarget::Upgrade { user_id, .. } => {
            user_id * SCOPE_BASE + UPGRADE_MARKER + seconds % UPGRADE_SUFFIX_MOD
        }
    }
}

/// Decode an order code back into its entity scope.
pub fn decode(order_code: i64) -> OrderScope {
    let remainder = order_code % SCOPE_BASE;
    if remainder >= UPGRADE_MARKER {
        OrderScope::Upgrade(order_code / SCOPE_BASE)
    } else {
        OrderScope::Booking(order_code / SCOPE_BASE)
    }
}
