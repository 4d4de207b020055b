use bytes::{Bytes, BytesMut};
use garnet_binary::io::{BinaryReader, BinaryWriter};
use garnet_binary::{internet_checksum, verify_checksum, BinaryError, Result};

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

pub const ICMP_CODE_NET_UNREACHABLE: u8 = 0;
pub const ICMP_CODE_HOST_UNREACHABLE: u8 = 1;
pub const ICMP_CODE_PORT_UNREACHABLE: u8 = 3;

/// Bytes of the offending packet carried in an ICMP error: the original IP
/// header plus the first 8 payload bytes.
pub const ICMP_DATA_LEN: usize = 28;

/// ICMP echo request/reply. Identifier, sequence and payload ride along
/// unchanged when a reply is synthesized from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpEcho {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub ident: u16,
    pub seq: u16,
    pub payload: Bytes,
}

impl IcmpEcho {
    pub const HEADER_LEN: usize = 8;

    pub fn decode(reader: &mut Bytes) -> Result<Self> {
        if reader.len() < Self::HEADER_LEN {
            return Err(BinaryError::UnexpectedEof {
                needed: Self::HEADER_LEN,
                remaining: reader.len(),
            });
        }
        Ok(Self {
            icmp_type: reader.read_u8()?,
            code: reader.read_u8()?,
            checksum: reader.read_u16_be()?,
            ident: reader.read_u16_be()?,
            seq: reader.read_u16_be()?,
            payload: reader.read_remaining_bytes(),
        })
    }

    pub fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.write_u8(self.icmp_type)?;
        writer.write_u8(self.code)?;
        writer.write_u16_be(self.checksum)?;
        writer.write_u16_be(self.ident)?;
        writer.write_u16_be(self.seq)?;
        writer.write_bytes(&self.payload)?;
        Ok(())
    }

    /// Checksum over the whole message with the checksum field zeroed.
    pub fn compute_checksum(&self) -> u16 {
        let mut scratch = self.clone();
        scratch.checksum = 0;
        let mut buf = BytesMut::with_capacity(Self::HEADER_LEN + self.payload.len());
        scratch.encode(&mut buf).expect("encode icmp echo");
        internet_checksum(&buf)
    }

    pub fn checksum_ok(&self) -> bool {
        let mut buf = BytesMut::with_capacity(Self::HEADER_LEN + self.payload.len());
        self.encode(&mut buf).expect("encode icmp echo");
        verify_checksum(&buf)
    }

    pub fn fill_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }
}

/// ICMP destination-unreachable / time-exceeded message. Carries the
/// original IP header and first 8 payload bytes in `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpError {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub unused: u16,
    pub next_mtu: u16,
    pub data: [u8; ICMP_DATA_LEN],
}

impl IcmpError {
    pub const LEN: usize = 8 + ICMP_DATA_LEN;

    /// Builds an error message quoting the offending packet. `original` is
    /// the IP packet starting at its IP header; shorter packets are
    /// zero-padded in the quote.
    pub fn quoting(icmp_type: u8, code: u8, next_mtu: u16, original: &[u8]) -> Self {
        let mut data = [0u8; ICMP_DATA_LEN];
        let take = original.len().min(ICMP_DATA_LEN);
        data[..take].copy_from_slice(&original[..take]);
        let mut message = Self {
            icmp_type,
            code,
            checksum: 0,
            unused: 0,
            next_mtu,
            data,
        };
        message.fill_checksum();
        message
    }

    pub fn decode(reader: &mut Bytes) -> Result<Self> {
        if reader.len() < Self::LEN {
            return Err(BinaryError::UnexpectedEof {
                needed: Self::LEN,
                remaining: reader.len(),
            });
        }
        let icmp_type = reader.read_u8()?;
        let code = reader.read_u8()?;
        let checksum = reader.read_u16_be()?;
        let unused = reader.read_u16_be()?;
        let next_mtu = reader.read_u16_be()?;
        let mut data = [0u8; ICMP_DATA_LEN];
        reader.read_exact(&mut data)?;
        Ok(Self {
            icmp_type,
            code,
            checksum,
            unused,
            next_mtu,
            data,
        })
    }

    pub fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.write_u8(self.icmp_type)?;
        writer.write_u8(self.code)?;
        writer.write_u16_be(self.checksum)?;
        writer.write_u16_be(self.unused)?;
        writer.write_u16_be(self.next_mtu)?;
        writer.write_bytes(&self.data)?;
        Ok(())
    }

    pub fn compute_checksum(&self) -> u16 {
        let mut scratch = self.clone();
        scratch.checksum = 0;
        let mut buf = BytesMut::with_capacity(Self::LEN);
        scratch.encode(&mut buf).expect("encode icmp error");
        internet_checksum(&buf)
    }

    pub fn checksum_ok(&self) -> bool {
        let mut buf = BytesMut::with_capacity(Self::LEN);
        self.encode(&mut buf).expect("encode icmp error");
        verify_checksum(&buf)
    }

    pub fn fill_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }
}
