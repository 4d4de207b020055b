use bytes::{Bytes, BytesMut};
use garnet_binary::io::{BinaryReader, BinaryWriter};
use garnet_binary::{BinaryError, MacAddr, Result};
use std::net::Ipv4Addr;

pub const ARP_HW_ETHERNET: u16 = 1;
pub const ARP_PROTO_IPV4: u16 = 0x0800;
pub const ARP_OP_REQUEST: u16 = 1;
pub const ARP_OP_REPLY: u16 = 2;

/// An ARP packet for Ethernet/IPv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub opcode: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub const LEN: usize = 28;

    /// Builds a broadcast request asking for `target_ip`, sourced from the
    /// given interface addresses.
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            hardware_type: ARP_HW_ETHERNET,
            protocol_type: ARP_PROTO_IPV4,
            opcode: ARP_OP_REQUEST,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    /// Builds the reply to `request`, answering with our addresses. The
    /// hardware and protocol fields are echoed from the request.
    pub fn reply_to(request: &ArpPacket, our_mac: MacAddr, our_ip: Ipv4Addr) -> Self {
        Self {
            hardware_type: request.hardware_type,
            protocol_type: request.protocol_type,
            opcode: ARP_OP_REPLY,
            sender_mac: our_mac,
            sender_ip: our_ip,
            target_mac: request.sender_mac,
            target_ip: request.sender_ip,
        }
    }

    pub fn decode(reader: &mut Bytes) -> Result<Self> {
        if reader.len() < Self::LEN {
            return Err(BinaryError::UnexpectedEof {
                needed: Self::LEN,
                remaining: reader.len(),
            });
        }
        let hardware_type = reader.read_u16_be()?;
        let protocol_type = reader.read_u16_be()?;
        let hardware_len = reader.read_u8()?;
        let protocol_len = reader.read_u8()?;
        if hardware_len != 6 || protocol_len != 4 {
            return Err(BinaryError::InvalidData(format!(
                "Unsupported ARP address lengths: hw={}, proto={}",
                hardware_len, protocol_len
            )));
        }
        Ok(Self {
            hardware_type,
            protocol_type,
            opcode: reader.read_u16_be()?,
            sender_mac: reader.read_mac()?,
            sender_ip: reader.read_ipv4()?,
            target_mac: reader.read_mac()?,
            target_ip: reader.read_ipv4()?,
        })
    }

    pub fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.write_u16_be(self.hardware_type)?;
        writer.write_u16_be(self.protocol_type)?;
        writer.write_u8(6)?;
        writer.write_u8(4)?;
        writer.write_u16_be(self.opcode)?;
        writer.write_mac(self.sender_mac)?;
        writer.write_ipv4(self.sender_ip)?;
        writer.write_mac(self.target_mac)?;
        writer.write_ipv4(self.target_ip)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_encoding() {
        let request = ArpPacket::request(
            MacAddr([0xBB, 0xBB, 0xBB, 0xBB, 0xBB, 0x02]),
            Ipv4Addr::new(10, 0, 2, 1),
            Ipv4Addr::new(10, 0, 2, 254),
        );

        let mut writer = BytesMut::new();
        request.encode(&mut writer).unwrap();

        let expected: &[u8] = &[
            0x00, 0x01, // hardware type: Ethernet
            0x08, 0x00, // protocol type: IPv4
            0x06, 0x04, // address lengths
            0x00, 0x01, // opcode: request
            0xBB, 0xBB, 0xBB, 0xBB, 0xBB, 0x02, // sender MAC
            10, 0, 2, 1, // sender IP
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // target MAC: unknown
            10, 0, 2, 254, // target IP
        ];
        assert_eq!(writer.as_ref(), expected);

        let mut reader = writer.freeze();
        assert_eq!(ArpPacket::decode(&mut reader).unwrap(), request);
    }

    #[test]
    fn test_reply_echoes_request_fields() {
        let request = ArpPacket::request(
            MacAddr([0xAA; 6]),
            Ipv4Addr::new(10, 0, 1, 2),
            Ipv4Addr::new(10, 0, 1, 1),
        );
        let reply = ArpPacket::reply_to(
            &request,
            MacAddr([0xBB; 6]),
            Ipv4Addr::new(10, 0, 1, 1),
        );

        assert_eq!(reply.opcode, ARP_OP_REPLY);
        assert_eq!(reply.sender_mac, MacAddr([0xBB; 6]));
        assert_eq!(reply.sender_ip, Ipv4Addr::new(10, 0, 1, 1));
        assert_eq!(reply.target_mac, request.sender_mac);
        assert_eq!(reply.target_ip, request.sender_ip);
    }

    #[test]
    fn test_decode_bad_lengths() {
        let mut raw = BytesMut::new();
        ArpPacket::request(MacAddr::ZERO, Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED)
            .encode(&mut raw)
            .unwrap();
        let mut bytes = raw.to_vec();
        bytes[4] = 8; // hardware address length
        let mut reader = Bytes::from(bytes);
        assert!(matches!(
            ArpPacket::decode(&mut reader),
            Err(BinaryError::InvalidData(_))
        ));
    }
}
