//! Reliable, ordered, flow-controlled byte streams over an unreliable
//! datagram substrate, with a BBR-style congestion controller.
//!
//! A [`Session`] holds one peer's sliding-window state and is driven by
//! three externally-sourced events: the application has data to send
//! ([`Session::on_readable`]), a segment arrived ([`Session::on_segment`]),
//! and the periodic timer fired ([`Session::tick`]). The
//! [`SessionRegistry`] fans those events out across peers. All calls are
//! run-to-completion; no locking happens inside a session.

pub mod bbr;
pub mod channel;
pub mod error;
pub mod registry;
pub mod segment;
pub mod session;

pub use bbr::{Bbr, Mode};
pub use channel::{Channel, Input};
pub use error::{Result, TransportError};
pub use registry::SessionRegistry;
pub use segment::Segment;
pub use session::{Config, Session, TickOutcome};

/// Largest payload carried by one segment.
pub const MAX_SEG_DATA: usize = 1440;
