use bytes::{Buf, BufMut, Bytes};
use tracing::info;

use super::{EncodeError, InadequateBufferSize};
use crate::wire_encoding::WireEncode;

/// A typed record in a packet's extension chain.
///
/// Every record starts with the 2-byte prefix `(next_type, record_len)` and
/// the chain terminates at the record whose `next_type` is 0. A record's own
/// type is carried by the preceding link (or by the common header's
/// next-header field for the first record), so decoding a record requires
/// that cursor type as context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionHeader {
    /// The ICN forwarding-hint extension.
    Icn(IcnExtension),
    /// A record of an unrecognised type, kept in its encoded form.
    Raw(RawExtension),
}

impl ExtensionHeader {
    /// The length of the `(next_type, record_len)` record prefix in bytes.
    pub const PREFIX_LENGTH: usize = 2;

    /// The type of this record, as referenced by the preceding chain link.
    pub fn extension_type(&self) -> u8 {
        match self {
            Self::Icn(_) => IcnExtension::TYPE,
            Self::Raw(extension) => extension.extension_type,
        }
    }

    /// The type of the next record, or 0 when this record ends the chain.
    pub fn next_header(&self) -> u8 {
        match self {
            Self::Icn(extension) => extension.next_header,
            Self::Raw(extension) => extension.next_header,
        }
    }

    /// Sets the type of the next record in the chain.
    pub fn set_next_header(&mut self, next_header: u8) {
        match self {
            Self::Icn(extension) => extension.next_header = next_header,
            Self::Raw(extension) => extension.next_header = next_header,
        }
    }

    /// Builds a record from its full encoded form, including the prefix.
    ///
    /// `extension_type` is the cursor type under which the record was reached.
    /// Records of unrecognised types, and ICN records of the wrong length,
    /// fall back to the raw representation.
    pub(crate) fn from_record(extension_type: u8, mut record: Bytes) -> Self {
        debug_assert!(record.len() >= Self::PREFIX_LENGTH);

        if extension_type == IcnExtension::TYPE {
            if record.len() == IcnExtension::LENGTH {
                let next_header = record.get_u8();
                let _record_length = record.get_u8();
                let fwd_flag = record.get_u8();
                return Self::Icn(IcnExtension {
                    next_header,
                    fwd_flag,
                });
            }
            info!(
                length = record.len(),
                "ICN extension record of unexpected length, keeping it raw"
            );
        } else {
            info!(extension_type, "unrecognised extension type");
        }

        let next_header = record[0];
        Self::Raw(RawExtension {
            extension_type,
            next_header,
            content: record.slice(Self::PREFIX_LENGTH..),
        })
    }
}

impl WireEncode for ExtensionHeader {
    type Error = InadequateBufferSize;

    #[inline]
    fn encoded_length(&self) -> usize {
        match self {
            Self::Icn(_) => IcnExtension::LENGTH,
            Self::Raw(extension) => Self::PREFIX_LENGTH + extension.content.len(),
        }
    }

    fn encode_to_unchecked<T: BufMut>(&self, buffer: &mut T) {
        debug_assert!(self.encoded_length() <= usize::from(u8::MAX));

        buffer.put_u8(self.next_header());
        buffer.put_u8(self.encoded_length() as u8);
        match self {
            Self::Icn(extension) => {
                buffer.put_u8(extension.fwd_flag);
                buffer.put_slice(&[0u8; IcnExtension::LENGTH - 3]);
            }
            Self::Raw(extension) => buffer.put_slice(&extension.content),
        }
    }
}

impl From<IcnExtension> for ExtensionHeader {
    fn from(value: IcnExtension) -> Self {
        Self::Icn(value)
    }
}

impl From<RawExtension> for ExtensionHeader {
    fn from(value: RawExtension) -> Self {
        Self::Raw(value)
    }
}

/// The ICN forwarding-hint extension.
///
/// A fixed 8-byte record: the chain prefix, the forwarding flag with which
/// interest packets are steered towards content caches, and 5 reserved
/// bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IcnExtension {
    /// The type of the next record in the chain, or 0.
    pub next_header: u8,
    /// The ICN forwarding flag.
    pub fwd_flag: u8,
}

impl IcnExtension {
    /// The extension type identifying ICN records.
    pub const TYPE: u8 = 220;
    /// The length of an encoded ICN record, including the prefix.
    pub const LENGTH: usize = 8;

    /// Creates an ICN record.
    pub const fn new(next_header: u8, fwd_flag: u8) -> Self {
        Self {
            next_header,
            fwd_flag,
        }
    }
}

/// An extension record of an unrecognised type, kept in its encoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtension {
    /// The type of this record.
    pub extension_type: u8,
    /// The type of the next record in the chain, or 0.
    pub next_header: u8,
    /// The record content following the 2-byte prefix.
    pub content: Bytes,
}

impl RawExtension {
    /// Creates a raw record, failing if the content cannot be framed by the
    /// 8-bit record length.
    pub fn new(extension_type: u8, next_header: u8, content: Bytes) -> Result<Self, EncodeError> {
        if ExtensionHeader::PREFIX_LENGTH + content.len() > usize::from(u8::MAX) {
            return Err(EncodeError::ExtensionTooLarge);
        }
        Ok(Self {
            extension_type,
            next_header,
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icn_round_trip() {
        let extension = ExtensionHeader::from(IcnExtension::new(0, 1));
        let encoded = extension.encode_to_bytes();

        assert_eq!(encoded.as_ref(), &[0, 8, 1, 0, 0, 0, 0, 0]);
        assert_eq!(
            ExtensionHeader::from_record(IcnExtension::TYPE, encoded),
            extension
        );
    }

    #[test]
    fn unrecognised_type_falls_back_to_raw() {
        let record = Bytes::from_static(&[7, 5, 0xaa, 0xbb, 0xcc]);
        let extension = ExtensionHeader::from_record(42, record);

        assert_eq!(
            extension,
            ExtensionHeader::Raw(RawExtension {
                extension_type: 42,
                next_header: 7,
                content: Bytes::from_static(&[0xaa, 0xbb, 0xcc]),
            })
        );
        assert_eq!(extension.encoded_length(), 5);
        assert_eq!(
            extension.encode_to_bytes().as_ref(),
            &[7, 5, 0xaa, 0xbb, 0xcc]
        );
    }

    #[test]
    fn icn_of_wrong_length_stays_raw() {
        let record = Bytes::from_static(&[0, 4, 1, 2]);
        let extension = ExtensionHeader::from_record(IcnExtension::TYPE, record);

        assert!(matches!(extension, ExtensionHeader::Raw(_)));
        assert_eq!(extension.extension_type(), IcnExtension::TYPE);
    }

    #[test]
    fn oversized_raw_content_is_rejected() {
        let result = RawExtension::new(1, 0, Bytes::from(vec![0u8; 254]));
        assert_eq!(result.unwrap_err(), EncodeError::ExtensionTooLarge);
    }
}
