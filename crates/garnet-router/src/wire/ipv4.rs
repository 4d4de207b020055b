use bytes::{Bytes, BytesMut};
use garnet_binary::io::{BinaryReader, BinaryWriter};
use garnet_binary::{internet_checksum, verify_checksum, BinaryError, Result};
use std::net::Ipv4Addr;

pub const IP_PROTO_ICMP: u8 = 1;

/// Don't-fragment bit in the flags/fragment-offset word.
pub const IP_FLAG_DF: u16 = 0x4000;

/// IPv4 header without options (IHL is always 5 here; packets with options
/// are rejected at decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub tos: u8,
    /// Total packet length in bytes, header included.
    pub total_len: u16,
    pub id: u16,
    /// Flags in the top 3 bits, fragment offset below.
    pub flags_frag: u16,
    pub ttl: u8,
    pub protocol: u8,
    /// Stored header checksum, as found on the wire or filled by
    /// [`Ipv4Header::fill_checksum`].
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    pub const LEN: usize = 20;

    pub fn decode(reader: &mut Bytes) -> Result<Self> {
        if reader.len() < Self::LEN {
            return Err(BinaryError::UnexpectedEof {
                needed: Self::LEN,
                remaining: reader.len(),
            });
        }
        let version_ihl = reader.read_u8()?;
        if version_ihl != 0x45 {
            return Err(BinaryError::InvalidData(format!(
                "Unsupported IP version/IHL byte: {:#04x}",
                version_ihl
            )));
        }
        Ok(Self {
            tos: reader.read_u8()?,
            total_len: reader.read_u16_be()?,
            id: reader.read_u16_be()?,
            flags_frag: reader.read_u16_be()?,
            ttl: reader.read_u8()?,
            protocol: reader.read_u8()?,
            checksum: reader.read_u16_be()?,
            src: reader.read_ipv4()?,
            dst: reader.read_ipv4()?,
        })
    }

    pub fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.write_u8(0x45)?;
        writer.write_u8(self.tos)?;
        writer.write_u16_be(self.total_len)?;
        writer.write_u16_be(self.id)?;
        writer.write_u16_be(self.flags_frag)?;
        writer.write_u8(self.ttl)?;
        writer.write_u8(self.protocol)?;
        writer.write_u16_be(self.checksum)?;
        writer.write_ipv4(self.src)?;
        writer.write_ipv4(self.dst)?;
        Ok(())
    }

    /// Checksum over the header with the checksum field zeroed.
    pub fn compute_checksum(&self) -> u16 {
        let mut scratch = *self;
        scratch.checksum = 0;
        let mut buf = BytesMut::with_capacity(Self::LEN);
        // Encoding a fixed header into a fresh buffer cannot fail.
        scratch.encode(&mut buf).expect("encode ipv4 header");
        internet_checksum(&buf)
    }

    /// True when the stored checksum matches the header content.
    pub fn checksum_ok(&self) -> bool {
        let mut buf = BytesMut::with_capacity(Self::LEN);
        self.encode(&mut buf).expect("encode ipv4 header");
        verify_checksum(&buf)
    }

    /// Recomputes and stores the checksum.
    pub fn fill_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Ipv4Header {
        let mut header = Ipv4Header {
            tos: 0,
            total_len: 84,
            id: 0x1C46,
            flags_frag: IP_FLAG_DF,
            ttl: 64,
            protocol: IP_PROTO_ICMP,
            checksum: 0,
            src: Ipv4Addr::new(10, 0, 1, 2),
            dst: Ipv4Addr::new(192, 168, 2, 5),
        };
        header.fill_checksum();
        header
    }

    #[test]
    fn test_encode_decode_identity() {
        let header = sample_header();
        let mut writer = BytesMut::new();
        header.encode(&mut writer).unwrap();
        assert_eq!(writer.len(), Ipv4Header::LEN);

        let mut reader = writer.freeze();
        let decoded = Ipv4Header::decode(&mut reader).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.checksum_ok());
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut header = sample_header();
        assert!(header.checksum_ok());
        header.ttl -= 1;
        assert!(!header.checksum_ok());
        header.fill_checksum();
        assert!(header.checksum_ok());
    }

    #[test]
    fn test_decode_rejects_options() {
        // IHL = 6 (header with options).
        let mut raw = BytesMut::new();
        sample_header().encode(&mut raw).unwrap();
        let mut bytes = raw.to_vec();
        bytes[0] = 0x46;
        let mut reader = Bytes::from(bytes);
        assert!(matches!(
            Ipv4Header::decode(&mut reader),
            Err(BinaryError::InvalidData(_))
        ));
    }

    #[test]
    fn test_decode_short_buffer() {
        let mut reader = Bytes::from_static(&[0x45, 0x00, 0x00]);
        assert!(matches!(
            Ipv4Header::decode(&mut reader),
            Err(BinaryError::UnexpectedEof { needed: 20, .. })
        ));
    }
}
