//! Read-receipt policy.
//!
//! A receipt is published only when a live peer message lands in a room
//! currently open in some view, so read events stay bounded to rooms the
//! user is actually looking at. History loads and the user's own echoed
//! sends never publish. Inbound receipts only matter when the peer is the
//! reader: our own receipt echoed back must not flip anything.

use patte_shared::types::UserId;

/// Whether observing a live message should publish a read event.
pub fn should_publish_receipt(current_user: &UserId, sender: &UserId, room_open: bool) -> bool {
    room_open && sender != current_user
}

/// Whether an inbound read event should flip sent messages to read.
pub fn should_apply_receipt(current_user: &UserId, reader: &UserId) -> bool {
    reader != current_user
}
