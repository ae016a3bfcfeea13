//! Internet layer addresses, as far as a TCP core needs them.
//!
//! The surrounding stack owns routing and framing; this module only carries
//! what the segment pipeline itself consumes: the endpoint addresses of a
//! connection tuple and the pseudo-header checksum they enter into.
use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

enum_with_unknown! {
    /// IP protocol numbers, of which exactly one interests us.
    pub enum Protocol(u8) {
        Tcp = 0x06,
    }
}

/// A four-octet IPv4 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Ipv4Address(pub [u8; 4]);

/// A sixteen-octet IPv6 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Ipv6Address(pub [u8; 16]);

/// An internet address of either family.
///
/// The `Unspecified` state occurs on listening connections whose remote half
/// has not been filled in yet.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Address {
    /// No address, not even a family.
    Unspecified,
    /// An IPv4 address.
    Ipv4(Ipv4Address),
    /// An IPv6 address.
    Ipv6(Ipv6Address),
}

impl Ipv4Address {
    /// Construct an address from a sequence of four octets, in big-endian.
    pub const fn new(a0: u8, a1: u8, a2: u8, a3: u8) -> Ipv4Address {
        Ipv4Address([a0, a1, a2, a3])
    }

    /// View the address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The address as a host-order integer of the network-order octets.
    pub fn to_network_integer(&self) -> u32 {
        NetworkEndian::read_u32(&self.0)
    }
}

impl Ipv6Address {
    /// View the address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Address {
    /// Query whether the address is concrete.
    pub fn is_specified(&self) -> bool {
        match self {
            Address::Unspecified => false,
            _ => true,
        }
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::Unspecified
    }
}

impl From<Ipv4Address> for Address {
    fn from(addr: Ipv4Address) -> Self {
        Address::Ipv4(addr)
    }
}

impl From<Ipv6Address> for Address {
    fn from(addr: Ipv6Address) -> Self {
        Address::Ipv6(addr)
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Ipv4Address([a, b, c, d]) = self;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

impl fmt::Display for Ipv6Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, group) in self.0.chunks(2).enumerate() {
            if i != 0 {
                write!(f, ":")?;
            }
            write!(f, "{:x}", NetworkEndian::read_u16(group))?;
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Address::Unspecified => write!(f, "*"),
            Address::Ipv4(addr) => addr.fmt(f),
            Address::Ipv6(addr) => addr.fmt(f),
        }
    }
}

pub(crate) mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::{Address, Protocol};

    fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub(crate) fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0;

        while data.len() >= 2 {
            accum += u32::from(NetworkEndian::read_u16(data));
            data = &data[2..];
        }

        // The last remaining odd byte, if any.
        if let Some(&value) = data.first() {
            accum += u32::from(value) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub(crate) fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += u32::from(word);
        }
        propagate_carries(accum)
    }

    /// Compute the IP pseudo header checksum.
    ///
    /// Both addresses must be concrete and of the same family.
    pub(crate) fn pseudo_header(src_addr: &Address, dst_addr: &Address,
                         protocol: Protocol, length: u32) -> u16 {
        match (src_addr, dst_addr) {
            (Address::Ipv4(src_addr), Address::Ipv4(dst_addr)) => {
                let mut proto_len = [0u8; 4];
                proto_len[1] = protocol.into();
                NetworkEndian::write_u16(&mut proto_len[2..4], length as u16);

                combine(&[
                    data(src_addr.as_bytes()),
                    data(dst_addr.as_bytes()),
                    data(&proto_len[..])
                ])
            },

            (Address::Ipv6(src_addr), Address::Ipv6(dst_addr)) => {
                let mut proto_len = [0u8; 8];
                proto_len[7] = protocol.into();
                NetworkEndian::write_u32(&mut proto_len[0..4], length);

                combine(&[
                    data(src_addr.as_bytes()),
                    data(dst_addr.as_bytes()),
                    data(&proto_len[..])
                ])
            }

            _ => panic!("unexpected pseudo header addresses: {}, {}",
                        src_addr, dst_addr)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(format!("{}", Ipv4Address::new(192, 168, 1, 1)), "192.168.1.1");
        assert_eq!(format!("{}", Address::Unspecified), "*");
    }

    #[test]
    fn rfc1071_example() {
        // The worked example from RFC 1071 §3.
        let bytes = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum::data(&bytes), 0xddf2);
    }

    #[test]
    fn odd_length_tail() {
        let even = checksum::data(&[0x12, 0x34, 0x56, 0x00]);
        let odd = checksum::data(&[0x12, 0x34, 0x56]);
        assert_eq!(even, odd);
    }
}
