use crate::error::{BinaryError, Result};
use crate::mac::MacAddr;
use bytes::{Buf, BufMut, Bytes};
use std::net::Ipv4Addr;

/// Checks if the buffer has enough remaining bytes and returns an error if not.
macro_rules! check_remaining {
    ($buf:expr, $len:expr) => {
        let needed = $len;
        let remaining = $buf.remaining();
        if remaining < needed {
            return Err(BinaryError::UnexpectedEof { needed, remaining });
        }
    };
}

/// Extension trait for `bytes::Buf` reading network-byte-order fields.
pub trait BinaryReader: Buf {
    /// Reads a single `u8` byte.
    #[inline]
    fn read_u8(&mut self) -> Result<u8> {
        check_remaining!(self, 1);
        Ok(self.get_u8())
    }

    /// Reads a `u16` in network (big-endian) byte order.
    #[inline]
    fn read_u16_be(&mut self) -> Result<u16> {
        check_remaining!(self, 2);
        Ok(self.get_u16())
    }

    /// Reads a `u32` in network (big-endian) byte order.
    #[inline]
    fn read_u32_be(&mut self) -> Result<u32> {
        check_remaining!(self, 4);
        Ok(self.get_u32())
    }

    /// Reads a fixed-length byte slice. Avoids copying when possible.
    #[inline]
    fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        check_remaining!(self, len);
        Ok(self.copy_to_bytes(len))
    }

    /// Reads exactly `dst.len()` bytes into `dst`.
    #[inline]
    fn read_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        check_remaining!(self, dst.len());
        self.copy_to_slice(dst);
        Ok(())
    }

    /// Reads the remaining bytes in the buffer.
    #[inline]
    fn read_remaining_bytes(&mut self) -> Bytes {
        self.copy_to_bytes(self.remaining())
    }

    /// Reads an IPv4 address (4 bytes, network order).
    #[inline]
    fn read_ipv4(&mut self) -> Result<Ipv4Addr> {
        check_remaining!(self, 4);
        Ok(Ipv4Addr::from(self.get_u32()))
    }

    /// Reads an Ethernet address (6 bytes).
    #[inline]
    fn read_mac(&mut self) -> Result<MacAddr> {
        let mut octets = [0u8; 6];
        self.read_exact(&mut octets)?;
        Ok(MacAddr(octets))
    }
}

impl<T: Buf> BinaryReader for T {}

/// Extension trait for `bytes::BufMut` writing network-byte-order fields.
pub trait BinaryWriter: BufMut {
    /// Writes a single `u8` byte.
    #[inline]
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.put_u8(value);
        Ok(())
    }

    /// Writes a `u16` in network (big-endian) byte order.
    #[inline]
    fn write_u16_be(&mut self, value: u16) -> Result<()> {
        self.put_u16(value);
        Ok(())
    }

    /// Writes a `u32` in network (big-endian) byte order.
    #[inline]
    fn write_u32_be(&mut self, value: u32) -> Result<()> {
        self.put_u32(value);
        Ok(())
    }

    /// Writes a raw byte slice (without length prefix).
    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_slice(bytes);
        Ok(())
    }

    /// Writes an IPv4 address (4 bytes, network order).
    #[inline]
    fn write_ipv4(&mut self, addr: Ipv4Addr) -> Result<()> {
        self.put_u32(u32::from(addr));
        Ok(())
    }

    /// Writes an Ethernet address (6 bytes).
    #[inline]
    fn write_mac(&mut self, mac: MacAddr) -> Result<()> {
        self.put_slice(&mac.0);
        Ok(())
    }
}

impl<T: BufMut> BinaryWriter for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_network_order_ints() {
        let mut writer = BytesMut::new();
        writer.write_u8(0xAB).unwrap();
        writer.write_u16_be(0x0800).unwrap();
        writer.write_u32_be(0xC0A80101).unwrap();
        assert_eq!(
            writer.as_ref(),
            &[0xAB, 0x08, 0x00, 0xC0, 0xA8, 0x01, 0x01]
        );

        let mut reader = writer.freeze();
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert_eq!(reader.read_u16_be().unwrap(), 0x0800);
        assert_eq!(reader.read_u32_be().unwrap(), 0xC0A80101);
        assert!(matches!(
            reader.read_u8(),
            Err(BinaryError::UnexpectedEof {
                needed: 1,
                remaining: 0
            })
        ));
    }

    #[test]
    fn test_addresses() {
        let ip = Ipv4Addr::new(10, 0, 1, 2);
        let mac = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);

        let mut writer = BytesMut::new();
        writer.write_ipv4(ip).unwrap();
        writer.write_mac(mac).unwrap();
        assert_eq!(
            writer.as_ref(),
            &[10, 0, 1, 2, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]
        );

        let mut reader = writer.freeze();
        assert_eq!(reader.read_ipv4().unwrap(), ip);
        assert_eq!(reader.read_mac().unwrap(), mac);
    }

    #[test]
    fn test_read_bytes_eof() {
        let mut reader = Bytes::from_static(&[1, 2, 3]);
        assert!(matches!(
            reader.read_bytes(4),
            Err(BinaryError::UnexpectedEof {
                needed: 4,
                remaining: 3
            })
        ));
        assert_eq!(reader.read_bytes(3).unwrap().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_remaining_bytes() {
        let mut reader = Bytes::from_static(&[9, 8, 7, 6]);
        assert_eq!(reader.read_u8().unwrap(), 9);
        assert_eq!(reader.read_remaining_bytes().as_ref(), &[8, 7, 6]);
        assert!(reader.is_empty());
    }
}
