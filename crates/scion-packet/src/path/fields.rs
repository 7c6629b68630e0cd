use std::fmt::{Debug, Formatter};

use bytes::BufMut;
use chrono::{DateTime, Utc};

use crate::{
    address::Isd,
    packet::InadequateBufferSize,
    path::PathKind,
    wire_encoding::WireEncode,
};

/// A single 8-byte opaque field of a path.
///
/// The interpretation of an opaque field depends on its position. The field
/// opening a segment is an info opaque field carrying the segment kind, the
/// direction flag, the segment creation timestamp, the originating ISD, and
/// the segment's hop count. Every other field is a hop opaque field carrying
/// per-hop interface identifiers and a MAC. Both views are exposed here and
/// callers pick the one matching the field's position.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpaqueField {
    raw: [u8; Self::LENGTH],
}

impl OpaqueField {
    /// The length of an encoded opaque field in bytes.
    pub const LENGTH: usize = 8;

    /// Bitmask of the direction flag in the first byte of an info field.
    pub const UP_FLAG: u8 = 0b0000_0001;

    /// Creates an info opaque field.
    pub fn info(kind: PathKind, up: bool, timestamp: u32, isd: Isd, hop_count: u8) -> Self {
        let mut raw = [0u8; Self::LENGTH];
        raw[0] = (u8::from(kind) << 1) | u8::from(up);
        raw[1..5].copy_from_slice(&timestamp.to_be_bytes());
        raw[5..7].copy_from_slice(&isd.to_u16().to_be_bytes());
        raw[7] = hop_count;
        Self { raw }
    }

    /// Creates a hop opaque field.
    ///
    /// Only the low 24 bits of `mac` are representable.
    pub fn hop(ingress_interface: u16, egress_interface: u16, mac: u32) -> Self {
        debug_assert!(mac <= 0x00ff_ffff, "MACs are 24-bit");
        let mut raw = [0u8; Self::LENGTH];
        raw[1..3].copy_from_slice(&ingress_interface.to_be_bytes());
        raw[3..5].copy_from_slice(&egress_interface.to_be_bytes());
        raw[5..8].copy_from_slice(&mac.to_be_bytes()[1..]);
        Self { raw }
    }

    /// Creates an opaque field from its encoded form.
    pub const fn from_bytes(raw: [u8; Self::LENGTH]) -> Self {
        Self { raw }
    }

    /// The encoded bytes of the field.
    pub const fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.raw
    }

    /// The segment kind in the field's discriminant bits.
    ///
    /// Only meaningful on info fields; the first field of a path selects the
    /// path variant through this value.
    pub fn kind(&self) -> PathKind {
        PathKind::from(self.raw[0] >> 1)
    }

    /// Returns true when the direction flag marks the segment as an
    /// up-segment.
    pub fn is_up(&self) -> bool {
        self.raw[0] & Self::UP_FLAG != 0
    }

    /// Sets or clears the direction flag.
    pub fn set_up(&mut self, up: bool) {
        if up {
            self.raw[0] |= Self::UP_FLAG;
        } else {
            self.raw[0] &= !Self::UP_FLAG;
        }
    }

    /// Flips the direction flag.
    pub(crate) fn toggle_up(&mut self) {
        self.raw[0] ^= Self::UP_FLAG;
    }

    /// The raw 32-bit creation timestamp of the segment.
    pub fn timestamp_raw(&self) -> u32 {
        u32::from_be_bytes([self.raw[1], self.raw[2], self.raw[3], self.raw[4]])
    }

    /// The creation timestamp of the segment set by the beacon originator.
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp_raw().into(), 0).expect("never out of range")
    }

    /// The ISD in which the segment originates.
    pub fn isd(&self) -> Isd {
        Isd(u16::from_be_bytes([self.raw[5], self.raw[6]]))
    }

    /// The number of hop fields in the segment.
    pub fn hop_count(&self) -> u8 {
        self.raw[7]
    }

    pub(crate) fn set_hop_count(&mut self, hop_count: u8) {
        self.raw[7] = hop_count;
    }

    /// The ingress interface identifier of the hop.
    pub fn ingress_interface(&self) -> u16 {
        u16::from_be_bytes([self.raw[1], self.raw[2]])
    }

    /// The egress interface identifier of the hop.
    pub fn egress_interface(&self) -> u16 {
        u16::from_be_bytes([self.raw[3], self.raw[4]])
    }

    /// The 24-bit message authentication code over the hop field.
    ///
    /// Generating and validating the MAC is the router's concern; this layer
    /// only carries it.
    pub fn mac(&self) -> u32 {
        u32::from_be_bytes([0, self.raw[5], self.raw[6], self.raw[7]])
    }
}

impl Debug for OpaqueField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "OpaqueField({:02x?})", self.raw)
    }
}

impl WireEncode for OpaqueField {
    type Error = InadequateBufferSize;

    #[inline]
    fn encoded_length(&self) -> usize {
        Self::LENGTH
    }

    fn encode_to_unchecked<T: BufMut>(&self, buffer: &mut T) {
        buffer.put_slice(&self.raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_view() {
        let field = OpaqueField::info(PathKind::Core, true, 0x1122_3344, Isd(7), 3);

        assert_eq!(field.as_bytes(), &[0x03, 0x11, 0x22, 0x33, 0x44, 0, 7, 3]);
        assert_eq!(field.kind(), PathKind::Core);
        assert!(field.is_up());
        assert_eq!(field.timestamp_raw(), 0x1122_3344);
        assert_eq!(field.isd(), Isd(7));
        assert_eq!(field.hop_count(), 3);
    }

    #[test]
    fn hop_view() {
        let field = OpaqueField::hop(0xfeed, 0xabcd, 0x123456);

        assert_eq!(
            field.as_bytes(),
            &[0x00, 0xfe, 0xed, 0xab, 0xcd, 0x12, 0x34, 0x56]
        );
        assert_eq!(field.ingress_interface(), 0xfeed);
        assert_eq!(field.egress_interface(), 0xabcd);
        assert_eq!(field.mac(), 0x123456);
    }

    #[test]
    fn direction_flag() {
        let mut field = OpaqueField::info(PathKind::Peer, false, 0, Isd(1), 0);
        assert!(!field.is_up());

        field.set_up(true);
        assert!(field.is_up());
        assert_eq!(field.kind(), PathKind::Peer);

        field.toggle_up();
        assert!(!field.is_up());
        field.set_up(false);
        assert!(!field.is_up());
    }

    #[test]
    fn timestamp_as_datetime() {
        let field = OpaqueField::info(PathKind::Core, true, 1_703_462_400, Isd(1), 0);
        assert_eq!(
            field.timestamp(),
            DateTime::from_timestamp(1_703_462_400, 0).unwrap()
        );
    }

    #[test]
    fn round_trip_bytes() {
        let raw = [0x07, 0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03];
        let field = OpaqueField::from_bytes(raw);
        assert_eq!(field.encode_to_bytes().as_ref(), &raw);
    }
}
