use bytes::{Bytes, BytesMut};
use garnet_binary::io::{BinaryReader, BinaryWriter};
use garnet_binary::{internet_checksum, verify_checksum, BinaryError, Result};

/// FIN flag bit, TCP layout.
pub const FLAG_FIN: u32 = 0x01;
/// ACK flag bit, TCP layout.
pub const FLAG_ACK: u32 = 0x10;

/// A transport segment. On the wire: seqno(4), ackno(4), len(2), two
/// reserved bytes, flags(4), window(2), checksum(2), then payload — 20
/// header bytes total, all fields network byte order. The checksum covers
/// the whole segment with the checksum field zeroed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub seqno: u32,
    pub ackno: u32,
    pub flags: u32,
    pub window: u16,
    /// Stored checksum, as found on the wire or filled by
    /// [`Segment::fill_checksum`].
    pub checksum: u16,
    pub payload: Bytes,
}

impl Segment {
    pub const HEADER_LEN: usize = 20;

    /// A data-bearing segment. Data segments always carry an ACK.
    pub fn data(seqno: u32, ackno: u32, window: u16, payload: Bytes) -> Self {
        let mut segment = Self {
            seqno,
            ackno,
            flags: FLAG_ACK,
            window,
            checksum: 0,
            payload,
        };
        segment.fill_checksum();
        segment
    }

    /// A pure cumulative acknowledgement.
    pub fn ack(seqno: u32, ackno: u32, window: u16) -> Self {
        Self::control(seqno, ackno, window, FLAG_ACK)
    }

    /// A FIN, header only. Consumes exactly one sequence number.
    pub fn fin(seqno: u32, ackno: u32, window: u16) -> Self {
        Self::control(seqno, ackno, window, FLAG_FIN)
    }

    fn control(seqno: u32, ackno: u32, window: u16, flags: u32) -> Self {
        let mut segment = Self {
            seqno,
            ackno,
            flags,
            window,
            checksum: 0,
            payload: Bytes::new(),
        };
        segment.fill_checksum();
        segment
    }

    /// Total wire length in bytes, header included.
    pub fn total_len(&self) -> usize {
        Self::HEADER_LEN + self.payload.len()
    }

    /// Payload bytes carried.
    pub fn data_len(&self) -> usize {
        self.payload.len()
    }

    pub fn has_ack(&self) -> bool {
        self.flags & FLAG_ACK != 0
    }

    pub fn has_fin(&self) -> bool {
        self.flags & FLAG_FIN != 0
    }

    pub fn decode(reader: &mut Bytes) -> Result<Self> {
        if reader.len() < Self::HEADER_LEN {
            return Err(BinaryError::UnexpectedEof {
                needed: Self::HEADER_LEN,
                remaining: reader.len(),
            });
        }
        let seqno = reader.read_u32_be()?;
        let ackno = reader.read_u32_be()?;
        let len = reader.read_u16_be()? as usize;
        let _reserved = reader.read_u16_be()?;
        let flags = reader.read_u32_be()?;
        let window = reader.read_u16_be()?;
        let checksum = reader.read_u16_be()?;

        if len < Self::HEADER_LEN {
            return Err(BinaryError::InvalidData(format!(
                "Segment length field {} shorter than header",
                len
            )));
        }
        let payload = reader.read_bytes(len - Self::HEADER_LEN)?;

        Ok(Self {
            seqno,
            ackno,
            flags,
            window,
            checksum,
            payload,
        })
    }

    pub fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.write_u32_be(self.seqno)?;
        writer.write_u32_be(self.ackno)?;
        writer.write_u16_be(self.total_len() as u16)?;
        writer.write_u16_be(0)?;
        writer.write_u32_be(self.flags)?;
        writer.write_u16_be(self.window)?;
        writer.write_u16_be(self.checksum)?;
        writer.write_bytes(&self.payload)?;
        Ok(())
    }

    /// Encodes into a fresh buffer, checksum as stored.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.total_len());
        // Encoding into a fresh buffer cannot fail.
        self.encode(&mut buf).expect("encode segment");
        buf.to_vec()
    }

    /// Checksum over the entire segment with the checksum field zeroed.
    pub fn compute_checksum(&self) -> u16 {
        let mut scratch = self.clone();
        scratch.checksum = 0;
        internet_checksum(&scratch.to_bytes())
    }

    pub fn checksum_ok(&self) -> bool {
        verify_checksum(&self.to_bytes())
    }

    pub fn fill_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }
}
