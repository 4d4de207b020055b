use bytes::{Bytes, BytesMut};
use garnet_binary::io::{BinaryReader, BinaryWriter};
use garnet_binary::{BinaryError, MacAddr, Result};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// Ethernet II header: destination, source, ethertype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
}

impl EthernetHeader {
    pub const LEN: usize = 14;

    pub fn decode(reader: &mut Bytes) -> Result<Self> {
        if reader.len() < Self::LEN {
            return Err(BinaryError::UnexpectedEof {
                needed: Self::LEN,
                remaining: reader.len(),
            });
        }
        let dst = reader.read_mac()?;
        let src = reader.read_mac()?;
        let ethertype = reader.read_u16_be()?;
        Ok(Self {
            dst,
            src,
            ethertype,
        })
    }

    pub fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.write_mac(self.dst)?;
        writer.write_mac(self.src)?;
        writer.write_u16_be(self.ethertype)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_identity() {
        let header = EthernetHeader {
            dst: MacAddr([0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xFE]),
            src: MacAddr([0xBB, 0xBB, 0xBB, 0xBB, 0xBB, 0x01]),
            ethertype: ETHERTYPE_IPV4,
        };

        let mut writer = BytesMut::new();
        header.encode(&mut writer).unwrap();

        let expected: &[u8] = &[
            0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xFE, // dst
            0xBB, 0xBB, 0xBB, 0xBB, 0xBB, 0x01, // src
            0x08, 0x00, // ethertype
        ];
        assert_eq!(writer.as_ref(), expected);

        let mut reader = writer.freeze();
        assert_eq!(EthernetHeader::decode(&mut reader).unwrap(), header);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_decode_short_frame() {
        let mut reader = Bytes::from_static(&[0x00; 13]);
        assert!(matches!(
            EthernetHeader::decode(&mut reader),
            Err(BinaryError::UnexpectedEof { needed: 14, .. })
        ));
    }
}
