use std::io;

/// Outbound side of the frame substrate.
///
/// The send is non-blocking by contract; the ARP engine may call it while
/// holding the cache lock.
pub trait FrameSink {
    /// Transmits a complete Ethernet frame on the named interface.
    fn send_frame(&self, frame: &[u8], iface: &str) -> io::Result<()>;
}
