use bytes::{Buf, BufMut, Bytes};
use tracing::warn;

use super::{
    ByEndpoint, CommonHeader, DecodeError, EncodeError, ExtensionHeader, InadequateBufferSize,
    PacketType,
};
use crate::{
    address::ScionAddr,
    path::{DataplanePath, OpaqueField},
    wire_encoding::{WireDecode, WireDecodeWithContext, WireEncode},
};

/// The full header of a legacy SCION packet.
///
/// Composes the [`CommonHeader`], the endpoint addresses, the forwarding
/// path, and the extension chain, and owns the pointer navigation used by
/// every forwarding hop: the common header's two pointers always designate
/// elements of the path by their byte offset, and the accessors below
/// translate between the offsets and path element indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScionHeader {
    /// The fixed common header.
    pub common: CommonHeader,
    /// The source and destination addresses.
    pub addresses: ByEndpoint<ScionAddr>,
    /// The forwarding path. Absent only when the header was built without
    /// path data; parsing always produces a path, the empty variant when the
    /// path byte range is empty.
    pub path: Option<DataplanePath>,
    /// The extension records following the path, in chain order.
    pub extensions: Vec<ExtensionHeader>,
}

impl ScionHeader {
    /// The minimum length of a buffer holding an encoded header.
    pub const MIN_LENGTH: usize = 16;

    /// Creates a header from its constituent parts.
    ///
    /// The common header is derived from the arguments: pointers at the path
    /// start, the header length covering the path, and the total length
    /// additionally covering the extension records. `next_header` must be
    /// the type of the first record in `extensions`, or 0 when empty.
    pub fn new(
        addresses: ByEndpoint<ScionAddr>,
        packet_type: PacketType,
        path: Option<DataplanePath>,
        extensions: Vec<ExtensionHeader>,
        next_header: u8,
    ) -> Result<Self, EncodeError> {
        let address_lengths = ByEndpoint {
            source: addresses
                .source
                .address_length()
                .ok_or(EncodeError::HeaderTooLarge)?,
            destination: addresses
                .destination
                .address_length()
                .ok_or(EncodeError::HeaderTooLarge)?,
        };
        let mut common = CommonHeader::from_values(packet_type, address_lengths, next_header);

        if let Some(path) = &path {
            common.header_length = common
                .header_size()
                .checked_add(path.encoded_length())
                .and_then(|length| u8::try_from(length).ok())
                .ok_or(EncodeError::HeaderTooLarge)?;
            common.total_length = u16::from(common.header_length);
        }
        for extension in &extensions {
            let record_length =
                u16::try_from(extension.encoded_length()).map_err(|_| EncodeError::HeaderTooLarge)?;
            common.total_length = common
                .total_length
                .checked_add(record_length)
                .ok_or(EncodeError::HeaderTooLarge)?;
        }

        Ok(Self {
            common,
            addresses,
            path,
            extensions,
        })
    }

    /// The byte offset of the path start, relative to the end of the common
    /// header.
    fn path_start(&self) -> usize {
        self.common.path_start()
    }

    /// Translates a pointer offset into a path element index.
    fn field_index(&self, offset: u8) -> Option<usize> {
        usize::from(offset)
            .checked_sub(self.path_start())
            .map(|path_offset| path_offset / OpaqueField::LENGTH)
    }

    /// The opaque field designated by the common header's field pointer.
    pub fn current_of(&self) -> Option<&OpaqueField> {
        let index = self.field_index(self.common.current_field_offset)?;
        self.path.as_ref()?.get_of(index)
    }

    /// The info opaque field designated by the common header's info pointer.
    pub fn current_iof(&self) -> Option<&OpaqueField> {
        let index = self.field_index(self.common.current_info_offset)?;
        self.path.as_ref()?.get_of(index)
    }

    fn current_iof_mut(&mut self) -> Option<&mut OpaqueField> {
        let index = self.field_index(self.common.current_info_offset)?;
        self.path.as_mut()?.get_of_mut(index)
    }

    /// The opaque field `offset` positions away from the current one.
    ///
    /// `offset` may be negative. Out-of-range indices yield `None`.
    pub fn relative_of(&self, offset: isize) -> Option<&OpaqueField> {
        let index = self
            .field_index(self.common.current_field_offset)?
            .checked_add_signed(offset)?;
        self.path.as_ref()?.get_of(index)
    }

    /// The opaque field after the current one.
    pub fn next_of(&self) -> Option<&OpaqueField> {
        self.relative_of(1)
    }

    /// Advances the field pointer by `count` opaque fields.
    ///
    /// No bounds check is applied: walking past the path end stays
    /// representable and is visible through [`Self::is_last_of`].
    pub fn advance_of(&mut self, count: u8) {
        let offset = u16::from(self.common.current_field_offset)
            .saturating_add(u16::from(count) * OpaqueField::LENGTH as u16);
        self.common.current_field_offset = u8::try_from(offset).unwrap_or(u8::MAX);
    }

    /// Returns true when the field pointer sits on the final opaque-field
    /// slot before the header end.
    pub fn is_last_of(&self) -> bool {
        usize::from(self.common.current_field_offset) + OpaqueField::LENGTH + CommonHeader::LENGTH
            == self.common.header_size()
    }

    /// Whether the active segment runs towards the core.
    ///
    /// A header without a current info field — in particular one without a
    /// path — is treated as a trivial single-hop up-path.
    pub fn is_on_up_path(&self) -> bool {
        self.current_iof().map_or(true, OpaqueField::is_up)
    }

    /// Clears the direction flag of the active info opaque field, if any.
    pub fn set_down_path(&mut self) {
        if let Some(info) = self.current_iof_mut() {
            info.set_up(false);
        }
    }

    /// Reverses the header for the return direction.
    ///
    /// Source and destination swap (together with their length fields in the
    /// common header), the path reverses per its variant's rules, and both
    /// pointers reset to the path start.
    pub fn reverse(&mut self) {
        self.addresses.reverse();
        self.common.address_lengths.reverse();
        if let Some(path) = &mut self.path {
            path.reverse();
        }
        let path_start = self.path_start() as u8;
        self.common.current_field_offset = path_start;
        self.common.current_info_offset = path_start;
    }
}

impl WireDecode<Bytes> for ScionHeader {
    type Error = DecodeError;

    fn decode(data: &mut Bytes) -> Result<Self, Self::Error> {
        if data.remaining() < Self::MIN_LENGTH {
            warn!(length = data.remaining(), "data too short to decode a header");
            return Err(DecodeError::HeaderEmptyOrTruncated);
        }

        let common = CommonHeader::decode(data)?;
        let source = ScionAddr::decode_with_context(data, common.address_lengths.source)?;
        let destination = ScionAddr::decode_with_context(data, common.address_lengths.destination)?;

        let consumed = CommonHeader::LENGTH + common.path_start();
        let path_length = common
            .header_size()
            .checked_sub(consumed)
            .ok_or(DecodeError::InvalidHeaderLength(common.header_length))?;
        let path = DataplanePath::decode_with_context(data, path_length)?;

        let extensions = decode_extension_chain(data, &common)?;

        Ok(Self {
            common,
            addresses: ByEndpoint {
                source,
                destination,
            },
            path: Some(path),
            extensions,
        })
    }
}

/// Walks the self-terminating extension chain starting at the header end.
///
/// The cumulative record bytes are bounded by `total_length − header_length`
/// so that a chain never reaching the 0 terminator cannot walk beyond the
/// packet.
fn decode_extension_chain(
    data: &mut Bytes,
    common: &CommonHeader,
) -> Result<Vec<ExtensionHeader>, DecodeError> {
    let mut extensions = Vec::new();
    let mut cursor_type = common.next_header;
    let mut budget = usize::from(common.total_length).saturating_sub(common.header_size());

    while cursor_type != 0 {
        if data.remaining() < ExtensionHeader::PREFIX_LENGTH {
            warn!("extension chain runs past the end of the buffer");
            return Err(DecodeError::HeaderEmptyOrTruncated);
        }
        let next_type = data.chunk()[0];
        let record_length = usize::from(data.chunk()[1]);

        if record_length < ExtensionHeader::PREFIX_LENGTH || record_length > budget {
            warn!(record_length, budget, "malformed extension chain");
            return Err(DecodeError::MalformedExtensionChain);
        }
        if data.remaining() < record_length {
            warn!(record_length, "truncated extension record");
            return Err(DecodeError::HeaderEmptyOrTruncated);
        }

        budget -= record_length;
        extensions.push(ExtensionHeader::from_record(
            cursor_type,
            data.split_to(record_length),
        ));
        cursor_type = next_type;
    }

    Ok(extensions)
}

impl WireEncode for ScionHeader {
    type Error = InadequateBufferSize;

    fn encoded_length(&self) -> usize {
        CommonHeader::LENGTH
            + self.addresses.source.length()
            + self.addresses.destination.length()
            + self.path.as_ref().map_or(0, |path| path.encoded_length())
            + self
                .extensions
                .iter()
                .map(|extension| extension.encoded_length())
                .sum::<usize>()
    }

    fn encode_to_unchecked<T: BufMut>(&self, buffer: &mut T) {
        self.common.encode_to_unchecked(buffer);
        self.addresses.source.encode_to_unchecked(buffer);
        self.addresses.destination.encode_to_unchecked(buffer);
        if let Some(path) = &self.path {
            path.encode_to_unchecked(buffer);
        }
        for extension in &self.extensions {
            extension.encode_to_unchecked(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::{
        address::{Ad, HostAddr, Isd},
        packet::{IcnExtension, RawExtension},
        path::{CorePath, PathKind, PathSegment},
    };

    fn endpoints() -> ByEndpoint<ScionAddr> {
        ByEndpoint {
            source: ScionAddr::new(Isd(1), Ad(10), HostAddr::V4("10.0.0.1".parse().unwrap())),
            destination: ScionAddr::new(
                Isd(2),
                Ad(20),
                HostAddr::V6("2001:db8::2".parse().unwrap()),
            ),
        }
    }

    fn segment(up: bool, isd: u16, hop_count: usize) -> PathSegment {
        PathSegment::new(
            OpaqueField::info(PathKind::Core, up, 1000, Isd(isd), 0),
            (0..hop_count)
                .map(|hop| OpaqueField::hop(hop as u16, hop as u16 + 1, 0x0a0b0c))
                .collect(),
        )
    }

    fn core_path() -> DataplanePath {
        DataplanePath::Core(CorePath {
            up: segment(true, 1, 2),
            down: Some(segment(false, 2, 2)),
        })
    }

    fn chained_extensions() -> (u8, Vec<ExtensionHeader>) {
        let raw = RawExtension::new(42, 0, Bytes::from_static(&[1, 2, 3])).unwrap();
        let extensions = vec![
            ExtensionHeader::Icn(IcnExtension::new(42, 1)),
            ExtensionHeader::Raw(raw),
        ];
        (IcnExtension::TYPE, extensions)
    }

    fn sample_header() -> ScionHeader {
        let (next_header, extensions) = chained_extensions();
        ScionHeader::new(
            endpoints(),
            PacketType::Data,
            Some(core_path()),
            extensions,
            next_header,
        )
        .expect("must construct")
    }

    #[test]
    fn new_derives_lengths() {
        let header = sample_header();

        // 8 common + 14 + 26 addresses + 6 * 8 path
        assert_eq!(header.common.header_length, 96);
        // plus the 8-byte ICN record and the 5-byte raw record
        assert_eq!(header.common.total_length, 96 + 8 + 5);
        assert_eq!(header.common.current_field_offset, 40);
        assert_eq!(header.encoded_length(), 96 + 13);
    }

    #[test]
    fn round_trip_with_path_and_extensions() {
        let header = sample_header();

        let mut encoded = header.encode_to_bytes();
        assert_eq!(encoded.len(), header.encoded_length());

        let decoded = ScionHeader::decode(&mut encoded).expect("must decode");
        assert_eq!(decoded, header);
    }

    #[test]
    fn round_trip_without_path() {
        let header =
            ScionHeader::new(endpoints(), PacketType::Data, None, Vec::new(), 0).unwrap();

        let mut encoded = header.encode_to_bytes();
        let decoded = ScionHeader::decode(&mut encoded).expect("must decode");

        assert_eq!(decoded.path, Some(DataplanePath::Empty));
        assert_eq!(decoded.common, header.common);
        assert_eq!(decoded.addresses, header.addresses);
    }

    #[test]
    fn decode_too_short() {
        let mut data = Bytes::from_static(&[0u8; 15]);
        assert_eq!(
            ScionHeader::decode(&mut data),
            Err(DecodeError::HeaderEmptyOrTruncated)
        );
    }

    #[test]
    fn decode_header_length_below_address_section() {
        let mut encoded = BytesMut::from(sample_header().encode_to_bytes().as_ref());
        encoded[7] = 24; // below the 48 bytes of common header and addresses
        let mut data = encoded.freeze();

        assert_eq!(
            ScionHeader::decode(&mut data),
            Err(DecodeError::InvalidHeaderLength(24))
        );
    }

    mod pointers {
        use super::*;

        #[test]
        fn current_fields_start_at_path_start() {
            let header = sample_header();

            assert_eq!(header.current_of(), header.path.as_ref().unwrap().get_of(0));
            assert_eq!(header.current_iof(), header.current_of());
            assert!(header.current_of().unwrap().is_up());
        }

        #[test]
        fn advance_and_relative_access() {
            let mut header = sample_header();
            header.advance_of(1);

            let path = header.path.as_ref().unwrap();
            assert_eq!(header.current_of(), path.get_of(1));
            assert_eq!(header.next_of(), path.get_of(2));
            assert_eq!(header.relative_of(-1), path.get_of(0));
            assert_eq!(header.relative_of(2), path.get_of(3));
            assert_eq!(header.relative_of(-2), None);
        }

        #[test]
        fn pointer_invariant_holds_while_advancing() {
            let mut header = sample_header();
            let path_start = header.common.path_start();

            for index in 0..header.path.as_ref().unwrap().field_count() {
                assert_eq!(
                    (usize::from(header.common.current_field_offset) - path_start)
                        / OpaqueField::LENGTH,
                    index
                );
                header.advance_of(1);
            }
        }

        #[test]
        fn is_last_of_boundary() {
            let mut header = sample_header();

            // 6 path elements: the last slot is reached after 5 advances.
            for _ in 0..5 {
                assert!(!header.is_last_of());
                header.advance_of(1);
            }
            assert!(header.is_last_of());

            header.advance_of(1);
            assert!(!header.is_last_of());
            assert_eq!(header.current_of(), None);
        }

        #[test]
        fn without_path_all_accessors_are_absent() {
            let header =
                ScionHeader::new(endpoints(), PacketType::Data, None, Vec::new(), 0).unwrap();

            assert_eq!(header.current_of(), None);
            assert_eq!(header.current_iof(), None);
            assert_eq!(header.next_of(), None);
            assert!(header.is_on_up_path());
        }

        #[test]
        fn down_path_marking() {
            let mut header = sample_header();
            assert!(header.is_on_up_path());

            header.set_down_path();
            assert!(!header.is_on_up_path());
            assert!(!header.current_iof().unwrap().is_up());
        }
    }

    mod reverse {
        use super::*;

        #[test]
        fn swaps_addresses_and_resets_pointers() {
            let mut header = sample_header();
            let original = header.clone();
            header.advance_of(3);

            header.reverse();

            assert_eq!(header.addresses.source, original.addresses.destination);
            assert_eq!(header.addresses.destination, original.addresses.source);
            assert_eq!(
                header.common.address_lengths.source,
                original.common.address_lengths.destination
            );
            assert_eq!(
                usize::from(header.common.current_field_offset),
                header.common.path_start()
            );
            assert_eq!(
                header.common.current_info_offset,
                header.common.current_field_offset
            );
            assert_eq!(header.common.header_length, original.common.header_length);
        }

        #[test]
        fn twice_restores_the_header() {
            let mut header = sample_header();
            let original = header.clone();

            header.reverse();
            assert_ne!(header, original);
            header.reverse();
            assert_eq!(header, original);
        }

        #[test]
        fn reversed_header_re_encodes_consistently() {
            let mut header = sample_header();
            header.reverse();

            let mut encoded = header.encode_to_bytes();
            let decoded = ScionHeader::decode(&mut encoded).expect("must decode");
            assert_eq!(decoded, header);
        }
    }

    mod extension_chain {
        use super::*;

        fn encode_with_patched_records(
            header: &ScionHeader,
            patch: impl FnOnce(&mut BytesMut),
        ) -> Bytes {
            let mut encoded = BytesMut::from(header.encode_to_bytes().as_ref());
            patch(&mut encoded);
            encoded.freeze()
        }

        #[test]
        fn parses_all_records_in_order() {
            let header = sample_header();
            let mut encoded = header.encode_to_bytes();
            let decoded = ScionHeader::decode(&mut encoded).expect("must decode");

            assert_eq!(decoded.extensions.len(), 2);
            assert_eq!(decoded.extensions[0].extension_type(), IcnExtension::TYPE);
            assert_eq!(decoded.extensions[0].next_header(), 42);
            assert_eq!(decoded.extensions[1].extension_type(), 42);
            assert_eq!(decoded.extensions[1].next_header(), 0);
        }

        #[test]
        fn three_record_chain_terminates() {
            let raw1 = RawExtension::new(7, 9, Bytes::from_static(&[0xaa])).unwrap();
            let raw2 = RawExtension::new(9, 0, Bytes::from_static(&[0xbb, 0xcc])).unwrap();
            let extensions = vec![
                ExtensionHeader::Icn(IcnExtension::new(7, 0)),
                ExtensionHeader::Raw(raw1),
                ExtensionHeader::Raw(raw2),
            ];
            let header = ScionHeader::new(
                endpoints(),
                PacketType::Data,
                None,
                extensions.clone(),
                IcnExtension::TYPE,
            )
            .unwrap();

            let mut encoded = header.encode_to_bytes();
            let decoded = ScionHeader::decode(&mut encoded).expect("must decode");
            assert_eq!(decoded.extensions, extensions);
        }

        #[test]
        fn zero_advance_record_is_malformed() {
            let header = sample_header();
            let record_start = header.common.header_size();
            let encoded = encode_with_patched_records(&header, |bytes| {
                bytes[record_start + 1] = 1; // record length below the prefix
            });

            assert_eq!(
                ScionHeader::decode(&mut encoded.clone()),
                Err(DecodeError::MalformedExtensionChain)
            );
        }

        #[test]
        fn chain_beyond_total_length_is_malformed() {
            let header = sample_header();
            let encoded = encode_with_patched_records(&header, |bytes| {
                // Shrink the advertised total length below the record bytes.
                let total = u16::from(bytes[7]) + 4;
                bytes[2..4].copy_from_slice(&total.to_be_bytes());
            });

            assert_eq!(
                ScionHeader::decode(&mut encoded.clone()),
                Err(DecodeError::MalformedExtensionChain)
            );
        }

        #[test]
        fn chain_past_buffer_end_is_truncated() {
            let header = sample_header();
            let mut encoded = header.encode_to_bytes();
            let truncated_length = encoded.len() - 4;
            let mut truncated = encoded.split_to(truncated_length);

            assert_eq!(
                ScionHeader::decode(&mut truncated),
                Err(DecodeError::HeaderEmptyOrTruncated)
            );
        }
    }
}
