//! In-process mirrors of scheduling state
//!
//! - `ReservationCache`: reservations by application, refreshed from the store
//! - `SoftReservationStore`: elastic executor placements, memory only
//! - `DemandTracker`: unmet requests, written through to the demand store

mod demand;
mod reservation;
mod soft;

pub use demand::DemandTracker;
pub use reservation::{ClaimedSlot, ReservationCache};
pub use soft::SoftReservationStore;
