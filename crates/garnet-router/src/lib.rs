//! IPv4 software router: Ethernet frame classification, IP forwarding with
//! ICMP error synthesis, ARP resolution with request coalescing, and a
//! longest-prefix-match routing table.
//!
//! The router is driven from the outside: the frame substrate calls
//! [`Router::handle_frame`] for every inbound frame, and a dedicated 1 Hz
//! thread (see [`Router::start_ticker`]) drives ARP retransmission and
//! timeout. Outbound frames leave through the [`FrameSink`] trait.

pub mod arp_cache;
pub mod error;
pub mod iface;
pub mod rib;
pub mod router;
pub mod substrate;
pub mod wire;

pub use error::{Result, RouterError};
pub use iface::Interface;
pub use rib::{RouteEntry, RoutingTable};
pub use router::{ArpTicker, Router};
pub use substrate::FrameSink;

/// Link MTU. Fixed for every interface.
pub const MTU: usize = 1500;
