use bytes::{Buf, BufMut};
use tracing::warn;

use super::{ByEndpoint, DecodeError, InadequateBufferSize};
use crate::{
    utils::encoded_type,
    wire_encoding::{self, WireDecode, WireEncode},
};

encoded_type!(
    /// The type of a legacy SCION packet.
    ///
    /// Data traffic uses [`PacketType::Data`]; the remaining assigned values
    /// identify the control messages exchanged with infrastructure services.
    /// The type is carried in the upper 4 bits of the common header's first
    /// word, so every assigned constant fits in 4 bits.
    pub enum PacketType(u8) {
        /// A regular data packet.
        Data = 0,
        /// Interface-ID request to the peer border router.
        IfidRequest = 1,
        /// Interface-ID reply from the peer border router.
        IfidReply = 2,
        /// Certificate-chain request to the certificate service.
        CertChainRequest = 3,
        /// Certificate-chain reply from the certificate service.
        CertChainReply = 4,
        /// Trust-root-configuration request to the TRC service.
        TrcRequest = 5,
        /// Trust-root-configuration reply from the TRC service.
        TrcReply = 6;
        /// Unassigned packet types.
        Other = _,
    }
);

wire_encoding::bounded_uint! {
    /// A 6-bit address length in bytes, as carried in the common header.
    #[derive(Default)]
    pub struct AddressLength(u8 : 6);
}

impl AddressLength {
    /// Gets the length as a usize.
    pub const fn length(&self) -> usize {
        self.0 as usize
    }
}

/// The fixed 8-byte header at the start of every legacy SCION packet.
///
/// Besides the packet type and the packet's overall lengths, the common
/// header carries the two navigation pointers with which routers walk the
/// opaque-field path. Both pointers are byte offsets relative to the end of
/// the common header (the start of the address section), so a pointer value
/// of `src_addr_len + dst_addr_len` designates the first opaque field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonHeader {
    /// The type of the packet.
    pub packet_type: PacketType,
    /// The lengths of the source and destination addresses in bytes.
    pub address_lengths: ByEndpoint<AddressLength>,
    /// The total length of the packet in bytes, including all headers,
    /// extension records, and the payload.
    pub total_length: u16,
    /// Byte offset of the active info opaque field, relative to the end of
    /// the common header.
    pub current_info_offset: u8,
    /// Byte offset of the active opaque field, relative to the end of the
    /// common header.
    pub current_field_offset: u8,
    /// The type of the first extension record, or 0 when there is none.
    pub next_header: u8,
    /// The length of the common header, addresses, and path in bytes.
    pub header_length: u8,
}

impl CommonHeader {
    /// The length of an encoded common header in bytes.
    pub const LENGTH: usize = 8;

    /// Creates a common header for the given type and address lengths.
    ///
    /// Both navigation pointers are initialised to the path start, and the
    /// length fields cover the common header and addresses only; adding a
    /// path, extension records, or a payload adjusts them afterwards.
    pub fn from_values(
        packet_type: PacketType,
        address_lengths: ByEndpoint<AddressLength>,
        next_header: u8,
    ) -> Self {
        let path_start =
            (address_lengths.source.length() + address_lengths.destination.length()) as u8;
        let header_length = Self::LENGTH as u8 + path_start;

        Self {
            packet_type,
            address_lengths,
            total_length: u16::from(header_length),
            current_info_offset: path_start,
            current_field_offset: path_start,
            next_header,
            header_length,
        }
    }

    /// The byte offset of the path start, relative to the end of the common
    /// header.
    pub fn path_start(&self) -> usize {
        self.address_lengths.source.length() + self.address_lengths.destination.length()
    }

    /// The header length as a usize.
    pub fn header_size(&self) -> usize {
        usize::from(self.header_length)
    }
}

impl<T: Buf> WireDecode<T> for CommonHeader {
    type Error = DecodeError;

    fn decode(data: &mut T) -> Result<Self, Self::Error> {
        if data.remaining() < Self::LENGTH {
            warn!(
                length = data.remaining(),
                "data too short to decode a common header"
            );
            return Err(DecodeError::HeaderEmptyOrTruncated);
        }

        let first_word = data.get_u16();
        let packet_type = PacketType::from((first_word >> 12) as u8);
        let address_lengths = ByEndpoint {
            destination: AddressLength::new_unchecked(((first_word >> 6) & 0x3f) as u8),
            source: AddressLength::new_unchecked((first_word & 0x3f) as u8),
        };

        Ok(Self {
            packet_type,
            address_lengths,
            total_length: data.get_u16(),
            current_info_offset: data.get_u8(),
            current_field_offset: data.get_u8(),
            next_header: data.get_u8(),
            header_length: data.get_u8(),
        })
    }
}

impl WireEncode for CommonHeader {
    type Error = InadequateBufferSize;

    #[inline]
    fn encoded_length(&self) -> usize {
        Self::LENGTH
    }

    fn encode_to_unchecked<T: BufMut>(&self, buffer: &mut T) {
        let type_value = u8::from(self.packet_type);
        debug_assert!(type_value <= 0xf, "packet type must fit in 4 bits");

        buffer.put_u16(
            u16::from(type_value & 0x0f) << 12
                | u16::from(self.address_lengths.destination.get()) << 6
                | u16::from(self.address_lengths.source.get()),
        );
        buffer.put_u16(self.total_length);
        buffer.put_u8(self.current_info_offset);
        buffer.put_u8(self.current_field_offset);
        buffer.put_u8(self.next_header);
        buffer.put_u8(self.header_length);
    }
}

#[cfg(test)]
mod tests {
    use test_utils::param_test;

    use super::*;

    fn lengths(source: u8, destination: u8) -> ByEndpoint<AddressLength> {
        ByEndpoint {
            source: AddressLength::new_unchecked(source),
            destination: AddressLength::new_unchecked(destination),
        }
    }

    #[test]
    fn from_values_initialises_pointers_and_lengths() {
        let header = CommonHeader::from_values(PacketType::Data, lengths(8, 8), 0);

        assert_eq!(header.current_field_offset, 16);
        assert_eq!(header.current_info_offset, 16);
        assert_eq!(header.header_length, 24);
        assert_eq!(header.total_length, 24);

        let encoded = header.encode_to_bytes();
        assert_eq!(
            encoded.as_ref(),
            &[0x02, 0x08, 0x00, 0x18, 0x10, 0x10, 0x00, 0x18]
        );
    }

    param_test! {
        first_word_layout: [
            symmetric: (PacketType::Data, 8, 8, 0x0208),
            asymmetric: (PacketType::Data, 14, 18, 0x048e),
            typed: (PacketType::TrcReply, 14, 14, 0x638e),
            max_lengths: (PacketType::Data, 63, 63, 0x0fff),
        ]
    }
    fn first_word_layout(packet_type: PacketType, source: u8, destination: u8, expected: u16) {
        let header = CommonHeader::from_values(packet_type, lengths(source, destination), 0);
        let encoded = header.encode_to_bytes();
        let word = u16::from_be_bytes([encoded[0], encoded[1]]);
        assert_eq!(word, expected);

        let decoded = CommonHeader::decode(&mut encoded.clone()).expect("must decode");
        assert_eq!(decoded.packet_type, packet_type);
        assert_eq!(decoded.address_lengths.source.get(), source);
        assert_eq!(decoded.address_lengths.destination.get(), destination);
    }

    #[test]
    fn decode_sample() {
        let data: &[u8] = &[0x35, 0xce, 0x01, 0x00, 0x1c, 0x24, 0xdc, 0x54];
        let decoded = CommonHeader::decode(&mut &data[..]).expect("must decode");

        assert_eq!(
            decoded,
            CommonHeader {
                packet_type: PacketType::CertChainRequest,
                address_lengths: lengths(0x0e, 0x17),
                total_length: 0x100,
                current_info_offset: 0x1c,
                current_field_offset: 0x24,
                next_header: 0xdc,
                header_length: 0x54,
            }
        );
    }

    #[test]
    fn round_trip() {
        let header = CommonHeader {
            packet_type: PacketType::IfidReply,
            address_lengths: lengths(14, 26),
            total_length: 321,
            current_info_offset: 40,
            current_field_offset: 56,
            next_header: 17,
            header_length: 120,
        };

        let encoded = header.encode_to_bytes();
        assert_eq!(encoded.len(), CommonHeader::LENGTH);
        assert_eq!(
            CommonHeader::decode(&mut encoded.clone()).expect("must decode"),
            header
        );
    }

    #[test]
    fn decode_truncated() {
        let data = [0u8; CommonHeader::LENGTH - 1];
        assert_eq!(
            CommonHeader::decode(&mut data.as_slice()),
            Err(DecodeError::HeaderEmptyOrTruncated)
        );
    }

    #[test]
    fn unassigned_type_round_trips() {
        let data: &[u8] = &[0x90, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x08];
        let decoded = CommonHeader::decode(&mut &data[..]).expect("must decode");
        assert_eq!(decoded.packet_type, PacketType::Other(9));
        assert_eq!(decoded.encode_to_bytes().as_ref(), data);
    }
}
