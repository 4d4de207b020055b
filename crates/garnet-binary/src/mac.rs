use crate::error::BinaryError;
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The all-ones broadcast address.
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    /// The all-zero address, used as the unknown target in ARP requests.
    pub const ZERO: MacAddr = MacAddr([0x00; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| hex::encode([*b])).collect();
        write!(f, "{}", parts.join(":"))
    }
}

impl FromStr for MacAddr {
    type Err = BinaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for (i, part) in s.split(':').enumerate() {
            if i >= 6 {
                return Err(BinaryError::InvalidData(format!(
                    "Ethernet address has too many octets: '{}'",
                    s
                )));
            }
            let decoded = hex::decode(part).map_err(|e| {
                BinaryError::InvalidData(format!("Bad octet '{}' in '{}': {}", part, s, e))
            })?;
            if decoded.len() != 1 {
                return Err(BinaryError::InvalidData(format!(
                    "Bad octet '{}' in '{}'",
                    part, s
                )));
            }
            octets[i] = decoded[0];
            count += 1;
        }
        if count != 6 {
            return Err(BinaryError::InvalidData(format!(
                "Ethernet address has {} octets, expected 6: '{}'",
                count, s
            )));
        }
        Ok(MacAddr(octets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let mac = MacAddr([0xAA, 0x00, 0x5B, 0xCC, 0xDD, 0x01]);
        assert_eq!(mac.to_string(), "aa:00:5b:cc:dd:01");
        assert_eq!("aa:00:5b:cc:dd:01".parse::<MacAddr>().unwrap(), mac);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("aa:bb:cc".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:dd:ee:ff:00".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:dd:ee:zz".parse::<MacAddr>().is_err());
        assert!("aabb:cc:dd:ee:ff".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_broadcast() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(!MacAddr::ZERO.is_broadcast());
        assert_eq!(MacAddr::BROADCAST.to_string(), "ff:ff:ff:ff:ff:ff");
    }
}
