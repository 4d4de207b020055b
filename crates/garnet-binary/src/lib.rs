//! Byte-level wire I/O shared by the router and the transport.
//!
//! Everything on the wire here is network byte order; the extension traits
//! in [`io`] convert at the accessor boundary so the rest of the workspace
//! only ever sees host integers.

pub mod checksum;
pub mod error;
pub mod io;
pub mod mac;

pub use checksum::{internet_checksum, verify_checksum};
pub use error::{BinaryError, Result};
pub use io::{BinaryReader, BinaryWriter};
pub use mac::MacAddr;
