use std::{
    fmt::{Display, Formatter},
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use bytes::{Buf, BufMut, Bytes};

use super::AddressParseError;
use crate::{
    packet::{DecodeError, InadequateBufferSize},
    wire_encoding::{WireDecodeWithContext, WireEncode},
};

/// The host part of a legacy SCION address.
///
/// Hosts are identified by IPv4 or IPv6 addresses. Addresses of any other
/// length are kept in their encoded form, so that a parsed header re-encodes
/// byte-for-byte even when the host's address family is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostAddr {
    /// An IPv4 host address.
    V4(Ipv4Addr),
    /// An IPv6 host address.
    V6(Ipv6Addr),
    /// A host address of an unrecognised family, in its encoded form.
    Raw(Bytes),
}

impl HostAddr {
    /// The length of the encoded host address in bytes.
    pub fn length(&self) -> usize {
        match self {
            Self::V4(_) => 4,
            Self::V6(_) => 16,
            Self::Raw(bytes) => bytes.len(),
        }
    }
}

impl<T: Buf> WireDecodeWithContext<T> for HostAddr {
    type Error = DecodeError;
    type Context = usize;

    fn decode_with_context(data: &mut T, length: usize) -> Result<Self, Self::Error> {
        if data.remaining() < length {
            return Err(DecodeError::HeaderEmptyOrTruncated);
        }

        Ok(match length {
            4 => Self::V4(Ipv4Addr::from(data.get_u32())),
            16 => Self::V6(Ipv6Addr::from(data.get_u128())),
            other => Self::Raw(data.copy_to_bytes(other)),
        })
    }
}

impl WireEncode for HostAddr {
    type Error = InadequateBufferSize;

    #[inline]
    fn encoded_length(&self) -> usize {
        self.length()
    }

    fn encode_to_unchecked<T: BufMut>(&self, buffer: &mut T) {
        match self {
            Self::V4(address) => buffer.put_slice(&address.octets()),
            Self::V6(address) => buffer.put_slice(&address.octets()),
            Self::Raw(bytes) => buffer.put_slice(bytes),
        }
    }
}

impl From<Ipv4Addr> for HostAddr {
    fn from(value: Ipv4Addr) -> Self {
        Self::V4(value)
    }
}

impl From<Ipv6Addr> for HostAddr {
    fn from(value: Ipv6Addr) -> Self {
        Self::V6(value)
    }
}

impl From<IpAddr> for HostAddr {
    fn from(value: IpAddr) -> Self {
        match value {
            IpAddr::V4(address) => Self::V4(address),
            IpAddr::V6(address) => Self::V6(address),
        }
    }
}

impl Display for HostAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4(address) => Display::fmt(address, f),
            Self::V6(address) => Display::fmt(address, f),
            Self::Raw(bytes) => {
                f.write_str("0x")?;
                for byte in bytes.as_ref() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for HostAddr {
    type Err = AddressParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        string
            .parse::<IpAddr>()
            .map(Self::from)
            .map_err(|_| AddressParseError::InvalidHost)
    }
}
