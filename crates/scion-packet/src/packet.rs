//! Representation of legacy SCION packets and their wire format.
//!
//! The packet envelope pairs a [`ScionHeader`] with a [`Payload`] and keeps
//! the common header's total-length field consistent across payload changes.
//! For the paths carried inside a packet, see the [path module][`crate::path`].

use bytes::{Buf, BufMut, Bytes};
use tracing::warn;

use crate::{
    address::ScionAddr,
    path::DataplanePath,
    wire_encoding::{WireDecode, WireEncode},
};

mod common_header;
pub use common_header::{AddressLength, CommonHeader, PacketType};

mod extension;
pub use extension::{ExtensionHeader, IcnExtension, RawExtension};

mod header;
pub use header::ScionHeader;

/// Instances of an object associated with both a source and destination endpoint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ByEndpoint<T> {
    /// The value for the source.
    pub source: T,
    /// The value for the destination.
    pub destination: T,
}

impl<T> ByEndpoint<T> {
    /// Swaps source and destination in place.
    pub fn reverse(&mut self) -> &mut Self {
        std::mem::swap(&mut self.source, &mut self.destination);
        self
    }

    /// Applies the `function` to both source and destination.
    pub fn map<U, F>(&self, function: F) -> ByEndpoint<U>
    where
        F: Fn(&T) -> U,
    {
        ByEndpoint {
            source: function(&self.source),
            destination: function(&self.destination),
        }
    }
}

impl<T: Clone> ByEndpoint<T> {
    /// Create a new instance where both the source and destination have the same value.
    pub fn with_cloned(source_and_destination: T) -> Self {
        Self {
            destination: source_and_destination.clone(),
            source: source_and_destination,
        }
    }
}

/// The payload of a legacy SCION packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Opaque payload bytes.
    Bytes(Bytes),
    /// A nested, structured packet.
    Packet(Box<ScionPacket>),
}

impl Payload {
    /// The length of the encoded payload in bytes.
    pub fn length(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Packet(packet) => packet.encoded_length(),
        }
    }

    /// The payload as raw bytes, when it is not a nested packet.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Packet(_) => None,
        }
    }

    fn encode_to_unchecked<T: BufMut>(&self, buffer: &mut T) {
        match self {
            Self::Bytes(bytes) => buffer.put_slice(bytes),
            Self::Packet(packet) => packet.encode_to_unchecked(buffer),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<ScionPacket> for Payload {
    fn from(value: ScionPacket) -> Self {
        Self::Packet(Box::new(value))
    }
}

/// A legacy SCION network packet.
///
/// The payload is kept private: [`Self::set_payload`] is the only way to
/// replace it, so that the total length recorded in the common header always
/// satisfies `total_length == header length + payload length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScionPacket {
    /// The packet header.
    pub header: ScionHeader,
    payload: Payload,
}

impl ScionPacket {
    /// The minimum length of a buffer holding an encoded packet.
    pub const MIN_LENGTH: usize = 8;

    /// Creates a packet from its constituent parts.
    ///
    /// `next_header` must be the type of the first record in `extensions`,
    /// or 0 when there are none.
    pub fn new(
        addresses: ByEndpoint<ScionAddr>,
        packet_type: PacketType,
        path: Option<DataplanePath>,
        extensions: Vec<ExtensionHeader>,
        next_header: u8,
        payload: Payload,
    ) -> Result<Self, EncodeError> {
        let header = ScionHeader::new(addresses, packet_type, path, extensions, next_header)?;
        let mut packet = Self {
            header,
            payload: Payload::Bytes(Bytes::new()),
        };
        packet.set_payload(payload)?;
        Ok(packet)
    }

    /// Returns the packet payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The length of the payload in bytes.
    pub fn payload_length(&self) -> usize {
        self.payload.length()
    }

    /// Replaces the payload, adjusting the total length in the common header.
    pub fn set_payload(&mut self, payload: Payload) -> Result<(), EncodeError> {
        let previous = self.payload.length();
        let new_total = usize::from(self.header.common.total_length)
            .saturating_sub(previous)
            .checked_add(payload.length())
            .ok_or(EncodeError::PayloadTooLarge)?;
        self.header.common.total_length =
            u16::try_from(new_total).map_err(|_| EncodeError::PayloadTooLarge)?;
        self.payload = payload;
        Ok(())
    }
}

impl WireDecode<Bytes> for ScionPacket {
    type Error = DecodeError;

    fn decode(data: &mut Bytes) -> Result<Self, Self::Error> {
        if data.remaining() < Self::MIN_LENGTH {
            warn!(length = data.remaining(), "data too short to decode a packet");
            return Err(DecodeError::PacketEmptyOrTruncated);
        }

        let header = ScionHeader::decode(data)?;
        let payload = data.copy_to_bytes(data.remaining());

        Ok(Self {
            header,
            payload: Payload::Bytes(payload),
        })
    }
}

impl WireEncode for ScionPacket {
    type Error = InadequateBufferSize;

    #[inline]
    fn encoded_length(&self) -> usize {
        self.header.encoded_length() + self.payload.length()
    }

    fn encode_to_unchecked<T: BufMut>(&self, buffer: &mut T) {
        self.header.encode_to_unchecked(buffer);
        self.payload.encode_to_unchecked(buffer);
    }
}

/// Errors raised when failing to decode a [`ScionPacket`] or its constituents.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum DecodeError {
    /// The data does not contain the full header.
    #[error("the provided bytes did not include the full header")]
    HeaderEmptyOrTruncated,
    /// The data is shorter than the minimum packet length.
    #[error("the provided bytes did not include the full packet")]
    PacketEmptyOrTruncated,
    /// The signalled address length cannot hold the ISD-AD prefix.
    #[error("address length {0} cannot hold the ISD-AD prefix")]
    InvalidAddressLength(u8),
    /// The header length is smaller than the common header and address section.
    #[error("header length {0} is inconsistent with the address section")]
    InvalidHeaderLength(u8),
    /// The path structure does not tile the signalled path byte range.
    #[error("the path structure and length do not correspond")]
    InconsistentPathLength,
    /// The extension chain does not terminate within the packet bounds.
    #[error("the extension chain does not terminate within the packet bounds")]
    MalformedExtensionChain,
}

/// Errors raised when constructing a packet whose lengths cannot be encoded.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum EncodeError {
    /// The common header, addresses, and path exceed the 8-bit header length.
    #[error("the header and path are too large to be encoded")]
    HeaderTooLarge,
    /// The payload pushes the total length beyond its 16-bit field.
    #[error("the payload is too large to be encoded")]
    PayloadTooLarge,
    /// An extension record's content exceeds the 8-bit record length.
    #[error("the extension record is too large to be encoded")]
    ExtensionTooLarge,
}

/// Raised if there is not enough space in the buffer for encoding the packet.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
#[error("the provided buffer did not have sufficient size")]
pub struct InadequateBufferSize;

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    use super::*;
    use crate::{
        address::{Ad, HostAddr, Isd, ScionAddr},
        path::{CorePath, DataplanePath, OpaqueField, PathKind, PathSegment},
    };

    fn endpoints() -> ByEndpoint<ScionAddr> {
        ByEndpoint {
            source: ScionAddr::new(Isd(1), Ad(10), HostAddr::V4("10.0.0.1".parse().unwrap())),
            destination: ScionAddr::new(Isd(2), Ad(20), HostAddr::V4("10.0.0.2".parse().unwrap())),
        }
    }

    fn two_segment_path() -> DataplanePath {
        DataplanePath::Core(CorePath {
            up: PathSegment::new(
                OpaqueField::info(PathKind::Core, true, 1000, Isd(1), 0),
                vec![OpaqueField::hop(0, 2, 0x111111), OpaqueField::hop(2, 0, 0x222222)],
            ),
            down: Some(PathSegment::new(
                OpaqueField::info(PathKind::Core, false, 1000, Isd(2), 0),
                vec![OpaqueField::hop(0, 5, 0x333333), OpaqueField::hop(5, 0, 0x444444)],
            )),
        })
    }

    #[test]
    fn new_maintains_length_invariant() {
        let packet = ScionPacket::new(
            endpoints(),
            PacketType::Data,
            Some(two_segment_path()),
            Vec::new(),
            0,
            Payload::Bytes(Bytes::from_static(b"hello")),
        )
        .expect("must construct");

        // 8 common + 14 + 14 addresses + 6 * 8 path
        assert_eq!(packet.header.common.header_length, 84);
        assert_eq!(usize::from(packet.header.common.total_length), 84 + 5);
        assert_eq!(packet.payload_length(), 5);
    }

    #[test]
    fn set_payload_adjusts_total_length() {
        let mut packet = ScionPacket::new(
            endpoints(),
            PacketType::Data,
            None,
            Vec::new(),
            0,
            Payload::Bytes(Bytes::from_static(b"four")),
        )
        .expect("must construct");
        let header_length = usize::from(packet.header.common.total_length) - 4;

        packet
            .set_payload(Payload::Bytes(Bytes::from_static(b"a longer payload")))
            .expect("must fit");

        assert_eq!(
            usize::from(packet.header.common.total_length),
            header_length + 16
        );
        assert_eq!(packet.payload_length(), 16);
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let mut packet = ScionPacket::new(
            endpoints(),
            PacketType::Data,
            None,
            Vec::new(),
            0,
            Payload::Bytes(Bytes::new()),
        )
        .expect("must construct");

        let result = packet.set_payload(Payload::Bytes(Bytes::from(vec![0u8; 70_000])));
        assert_eq!(result, Err(EncodeError::PayloadTooLarge));
    }

    #[test]
    fn decode_round_trip() {
        let packet = ScionPacket::new(
            endpoints(),
            PacketType::Data,
            Some(two_segment_path()),
            Vec::new(),
            0,
            Payload::Bytes(Bytes::from_static(b"payload")),
        )
        .expect("must construct");

        let mut encoded = packet.encode_to_bytes();
        assert_eq!(encoded.len(), usize::from(packet.header.common.total_length));

        let decoded = ScionPacket::decode(&mut encoded).expect("must decode");
        assert_eq!(decoded, packet);
    }

    #[test]
    fn nested_packet_payload() {
        let inner = ScionPacket::new(
            endpoints(),
            PacketType::Data,
            None,
            Vec::new(),
            0,
            Payload::Bytes(Bytes::from_static(b"inner")),
        )
        .expect("must construct");
        let inner_encoded = inner.encode_to_bytes();

        let outer = ScionPacket::new(
            endpoints(),
            PacketType::Data,
            None,
            Vec::new(),
            0,
            Payload::from(inner),
        )
        .expect("must construct");

        assert_eq!(outer.payload_length(), inner_encoded.len());

        let mut encoded = outer.encode_to_bytes();
        let decoded = ScionPacket::decode(&mut encoded).expect("must decode");
        assert_eq!(
            decoded.payload().as_bytes().expect("flat after decoding"),
            &inner_encoded
        );
    }

    #[test]
    fn randomized_round_trip() {
        let mut rng = XorShiftRng::seed_from_u64(0x5c10);

        for _ in 0..32 {
            let payload_length = rng.gen_range(0..512);
            let mut payload = vec![0u8; payload_length];
            rng.fill(payload.as_mut_slice());

            let packet = ScionPacket::new(
                endpoints(),
                PacketType::Data,
                Some(two_segment_path()),
                Vec::new(),
                0,
                Payload::Bytes(Bytes::from(payload)),
            )
            .expect("must construct");

            let mut encoded = packet.encode_to_bytes();
            let decoded = ScionPacket::decode(&mut encoded).expect("must decode");
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn decode_too_short() {
        let mut data = Bytes::from_static(&[0u8; 7]);
        assert_eq!(
            ScionPacket::decode(&mut data),
            Err(DecodeError::PacketEmptyOrTruncated)
        );
    }
}
