//! Addresses of legacy SCION endpoints.
//!
//! A full endpoint address is the pair of a routing-domain prefix (isolation
//! domain and administrative domain identifiers) and a host address. Its
//! encoded length is carried in the common header's 6-bit length fields, not
//! in the address itself.

mod host;
pub use host::HostAddr;

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use bytes::{Buf, BufMut};
use serde::Deserialize;
use tracing::warn;

use crate::{
    packet::{AddressLength, DecodeError, InadequateBufferSize},
    wire_encoding::{WireDecodeWithContext, WireEncode},
};

/// The 16-bit identifier of an isolation domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Isd(pub u16);

impl Isd {
    /// The identifier used for addresses that are local to the current domain,
    /// such as the reserved service addresses.
    pub const LOCAL: Self = Self(0);

    /// Returns the identifier as a 16-bit integer.
    pub const fn to_u16(&self) -> u16 {
        self.0
    }
}

impl Display for Isd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for Isd {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl FromStr for Isd {
    type Err = AddressParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        string
            .parse()
            .map(Self)
            .map_err(|_| AddressParseError::InvalidIsd)
    }
}

/// The 64-bit identifier of an administrative domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Ad(pub u64);

impl Ad {
    /// The identifier used for addresses that are local to the current domain.
    pub const LOCAL: Self = Self(0);

    /// Returns the identifier as a 64-bit integer.
    pub const fn to_u64(&self) -> u64 {
        self.0
    }
}

impl Display for Ad {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Ad {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for Ad {
    type Err = AddressParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        string
            .parse()
            .map(Self)
            .map_err(|_| AddressParseError::InvalidAd)
    }
}

/// A legacy SCION endpoint address.
///
/// On the wire an address is the 16-bit ISD identifier, the 64-bit AD
/// identifier, and the host address, in that order and big-endian. The
/// host part's length is whatever remains of the length signalled in the
/// common header.
///
/// The string form is `"{isd}-{ad},{host}"`, e.g. `"1-13,10.0.0.1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct ScionAddr {
    /// The isolation domain of the endpoint.
    pub isd: Isd,
    /// The administrative domain of the endpoint.
    pub ad: Ad,
    /// The host address within its administrative domain.
    pub host: HostAddr,
}

impl ScionAddr {
    /// The length in bytes of the ISD and AD prefix of an encoded address.
    pub const PREFIX_LENGTH: usize = 10;

    /// Creates a new address from its components.
    pub const fn new(isd: Isd, ad: Ad, host: HostAddr) -> Self {
        Self { isd, ad, host }
    }

    /// Creates the address of a local service host.
    ///
    /// Service addresses always carry the local ISD and AD identifiers.
    pub const fn for_service(host: HostAddr) -> Self {
        Self {
            isd: Isd::LOCAL,
            ad: Ad::LOCAL,
            host,
        }
    }

    /// The length of the encoded address in bytes.
    pub fn length(&self) -> usize {
        Self::PREFIX_LENGTH + self.host.length()
    }

    /// The encoded length as a 6-bit common header field, if it fits.
    pub fn address_length(&self) -> Option<AddressLength> {
        u8::try_from(self.length()).ok().and_then(AddressLength::new)
    }
}

impl<T: Buf> WireDecodeWithContext<T> for ScionAddr {
    type Error = DecodeError;
    type Context = AddressLength;

    fn decode_with_context(data: &mut T, length: AddressLength) -> Result<Self, Self::Error> {
        let total = length.length();
        if total < Self::PREFIX_LENGTH {
            warn!(
                length = total,
                "address length too short for the ISD-AD prefix"
            );
            return Err(DecodeError::InvalidAddressLength(length.get()));
        }
        if data.remaining() < total {
            warn!(
                available = data.remaining(),
                length = total,
                "data too short to decode an address"
            );
            return Err(DecodeError::HeaderEmptyOrTruncated);
        }

        let isd = Isd(data.get_u16());
        let ad = Ad(data.get_u64());
        let host = HostAddr::decode_with_context(data, total - Self::PREFIX_LENGTH)?;

        Ok(Self { isd, ad, host })
    }
}

impl WireEncode for ScionAddr {
    type Error = InadequateBufferSize;

    #[inline]
    fn encoded_length(&self) -> usize {
        self.length()
    }

    fn encode_to_unchecked<T: BufMut>(&self, buffer: &mut T) {
        buffer.put_u16(self.isd.to_u16());
        buffer.put_u64(self.ad.to_u64());
        self.host.encode_to_unchecked(buffer);
    }
}

impl Display for ScionAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{},{}", self.isd, self.ad, self.host)
    }
}

impl FromStr for ScionAddr {
    type Err = AddressParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let (prefix, host) = string
            .split_once(',')
            .ok_or(AddressParseError::InvalidFormat)?;
        let (isd, ad) = prefix
            .split_once('-')
            .ok_or(AddressParseError::InvalidFormat)?;

        Ok(Self {
            isd: isd.parse()?,
            ad: ad.parse()?,
            host: host.parse()?,
        })
    }
}

impl TryFrom<String> for ScionAddr {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Errors raised when parsing an address from its string form.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum AddressParseError {
    /// The string is not of the form `isd-ad,host`.
    #[error("expected an address of the form isd-ad,host")]
    InvalidFormat,
    /// The ISD component is not a valid 16-bit identifier.
    #[error("invalid ISD identifier")]
    InvalidIsd,
    /// The AD component is not a valid 64-bit identifier.
    #[error("invalid AD identifier")]
    InvalidAd,
    /// The host component is neither an IPv4 nor an IPv6 address.
    #[error("invalid host address")]
    InvalidHost,
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use test_utils::param_test;

    use super::*;

    fn sample_v4() -> ScionAddr {
        ScionAddr::new(Isd(1), Ad(13), HostAddr::V4("10.0.0.1".parse().unwrap()))
    }

    mod wire {
        use super::*;

        #[test]
        fn encode_v4() {
            let encoded = sample_v4().encode_to_bytes();
            assert_eq!(
                encoded.as_ref(),
                &[0, 1, 0, 0, 0, 0, 0, 0, 0, 13, 10, 0, 0, 1]
            );
        }

        #[test]
        fn decode_v4() {
            let data = [0u8, 1, 0, 0, 0, 0, 0, 0, 0, 13, 10, 0, 0, 1];
            let decoded = ScionAddr::decode_with_context(
                &mut data.as_slice(),
                AddressLength::new_unchecked(14),
            )
            .expect("must decode");
            assert_eq!(decoded, sample_v4());
        }

        #[test]
        fn round_trip_v6() {
            let address = ScionAddr::new(
                Isd(3),
                Ad(0xff00_0000_0310),
                HostAddr::V6("2001:db8::1".parse().unwrap()),
            );
            assert_eq!(address.length(), 26);

            let mut encoded = address.encode_to_bytes();
            let decoded = ScionAddr::decode_with_context(
                &mut encoded,
                address.address_length().expect("fits in 6 bits"),
            )
            .expect("must decode");
            assert_eq!(decoded, address);
        }

        #[test]
        fn round_trip_unknown_family() {
            let address = ScionAddr::new(
                Isd(7),
                Ad(9),
                HostAddr::Raw(Bytes::from_static(&[0xde, 0xad, 0xbe])),
            );

            let mut encoded = address.encode_to_bytes();
            assert_eq!(encoded.len(), 13);
            let decoded =
                ScionAddr::decode_with_context(&mut encoded, AddressLength::new_unchecked(13))
                    .expect("must decode");
            assert_eq!(decoded, address);
        }

        #[test]
        fn length_below_prefix() {
            let data = [0u8; 16];
            let result = ScionAddr::decode_with_context(
                &mut data.as_slice(),
                AddressLength::new_unchecked(9),
            );
            assert_eq!(result, Err(DecodeError::InvalidAddressLength(9)));
        }

        #[test]
        fn truncated() {
            let data = [0u8; 12];
            let result = ScionAddr::decode_with_context(
                &mut data.as_slice(),
                AddressLength::new_unchecked(14),
            );
            assert_eq!(result, Err(DecodeError::HeaderEmptyOrTruncated));
        }
    }

    mod strings {
        use super::*;

        param_test! {
            parses_and_displays: [
                v4: ("1-13,10.0.0.1"),
                v6: ("3-281474976710655,2001:db8::1"),
                zero: ("0-0,0.0.0.0"),
            ]
        }
        fn parses_and_displays(string: &str) {
            let address: ScionAddr = string.parse().expect("must parse");
            assert_eq!(address.to_string(), string);
        }

        param_test! {
            rejects: [
                no_host: ("1-13", AddressParseError::InvalidFormat),
                no_ad: ("1,10.0.0.1", AddressParseError::InvalidFormat),
                bad_isd: ("x-13,10.0.0.1", AddressParseError::InvalidIsd),
                isd_overflow: ("65536-13,10.0.0.1", AddressParseError::InvalidIsd),
                bad_ad: ("1-y,10.0.0.1", AddressParseError::InvalidAd),
                bad_host: ("1-13,not-an-ip", AddressParseError::InvalidHost),
            ]
        }
        fn rejects(string: &str, expected: AddressParseError) {
            assert_eq!(string.parse::<ScionAddr>(), Err(expected));
        }
    }
}
