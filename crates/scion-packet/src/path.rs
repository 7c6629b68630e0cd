//! Forwarding paths of legacy SCION packets.
//!
//! A path is a sequence of 8-byte [`OpaqueField`]s grouped into segments,
//! each opened by an info opaque field whose discriminant bits select the
//! path variant and whose hop-count byte delimits the segment. The path's
//! byte range inside a packet is known from the common header; its variant
//! is only known once the first field has been read.

mod fields;
pub use fields::OpaqueField;

use bytes::{Buf, BufMut, Bytes};
use tracing::info;

use crate::{
    packet::{DecodeError, InadequateBufferSize},
    utils::encoded_type,
    wire_encoding::{WireDecodeWithContext, WireEncode},
};

encoded_type!(
    /// The kind of a path, as carried in the discriminant bits of the info
    /// opaque field that opens it.
    pub enum PathKind(u8) {
        /// No path; used for intra-domain traffic.
        Empty = 0,
        /// A path over backbone segments.
        Core = 1,
        /// A path crossing over between segments at a domain boundary.
        CrossOver = 2,
        /// A path using a peering shortcut between domains.
        Peer = 3;
        /// Unassigned path kinds.
        Other = _,
    }
);

/// One path segment: an info opaque field followed by its hop fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// The info opaque field opening the segment.
    pub info: OpaqueField,
    /// The hop opaque fields of the segment, in traversal order.
    pub hops: Vec<OpaqueField>,
}

impl PathSegment {
    /// Creates a segment, stamping the hop count into the info field.
    pub fn new(info: OpaqueField, hops: Vec<OpaqueField>) -> Self {
        debug_assert!(hops.len() <= usize::from(u8::MAX));
        let mut info = info;
        info.set_hop_count(hops.len() as u8);
        Self { info, hops }
    }

    fn decode(data: &mut Bytes) -> Result<Self, DecodeError> {
        let info = take_field(data)?;
        let mut hops = Vec::with_capacity(info.hop_count().into());
        for _ in 0..info.hop_count() {
            hops.push(take_field(data)?);
        }
        Ok(Self { info, hops })
    }

    fn reverse(&mut self) {
        self.info.toggle_up();
        self.hops.reverse();
    }

    fn field_count(&self) -> usize {
        1 + self.hops.len()
    }

    fn iter(&self) -> impl Iterator<Item = &OpaqueField> {
        std::iter::once(&self.info).chain(self.hops.iter())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut OpaqueField> {
        std::iter::once(&mut self.info).chain(self.hops.iter_mut())
    }
}

fn take_field(data: &mut Bytes) -> Result<OpaqueField, DecodeError> {
    if data.remaining() < OpaqueField::LENGTH {
        return Err(DecodeError::InconsistentPathLength);
    }
    let mut raw = [0u8; OpaqueField::LENGTH];
    data.copy_to_slice(&mut raw);
    Ok(OpaqueField::from_bytes(raw))
}

/// A path over one or two backbone segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorePath {
    /// The segment towards the core.
    pub up: PathSegment,
    /// The segment away from the core, absent for destinations within it.
    pub down: Option<PathSegment>,
}

impl CorePath {
    fn decode(data: &mut Bytes) -> Result<Self, DecodeError> {
        let up = PathSegment::decode(data)?;
        let down = if data.has_remaining() {
            Some(PathSegment::decode(data)?)
        } else {
            None
        };
        Ok(Self { up, down })
    }

    fn reverse(&mut self) {
        if let Some(down) = &mut self.down {
            std::mem::swap(&mut self.up, down);
            down.reverse();
        }
        self.up.reverse();
    }

    fn field_count(&self) -> usize {
        self.up.field_count() + self.down.as_ref().map_or(0, PathSegment::field_count)
    }

    fn iter(&self) -> impl Iterator<Item = &OpaqueField> {
        self.up
            .iter()
            .chain(self.down.iter().flat_map(PathSegment::iter))
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut OpaqueField> {
        self.up
            .iter_mut()
            .chain(self.down.iter_mut().flat_map(PathSegment::iter_mut))
    }
}

/// A path that crosses over between its up and down segments at the boundary
/// of their shared domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossOverPath {
    /// The up segment.
    pub up: PathSegment,
    /// The hop field of the up segment's upstream domain, validating the
    /// crossover on the way up.
    pub up_upstream: OpaqueField,
    /// The hop field of the down segment's upstream domain.
    pub down_upstream: OpaqueField,
    /// The down segment.
    pub down: PathSegment,
}

impl CrossOverPath {
    fn decode(data: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            up: PathSegment::decode(data)?,
            up_upstream: take_field(data)?,
            down_upstream: take_field(data)?,
            down: PathSegment::decode(data)?,
        })
    }

    fn reverse(&mut self) {
        std::mem::swap(&mut self.up, &mut self.down);
        std::mem::swap(&mut self.up_upstream, &mut self.down_upstream);
        self.up.reverse();
        self.down.reverse();
    }

    fn field_count(&self) -> usize {
        self.up.field_count() + 2 + self.down.field_count()
    }

    fn iter(&self) -> impl Iterator<Item = &OpaqueField> {
        self.up
            .iter()
            .chain(std::iter::once(&self.up_upstream))
            .chain(std::iter::once(&self.down_upstream))
            .chain(self.down.iter())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut OpaqueField> {
        self.up
            .iter_mut()
            .chain(std::iter::once(&mut self.up_upstream))
            .chain(std::iter::once(&mut self.down_upstream))
            .chain(self.down.iter_mut())
    }
}

/// A path taking a peering shortcut between the domains of its two segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPath {
    /// The up segment.
    pub up: PathSegment,
    /// The peering-link hop field on the up side.
    pub up_peering: OpaqueField,
    /// The hop field of the up segment's upstream domain.
    pub up_upstream: OpaqueField,
    /// The hop field of the down segment's upstream domain.
    pub down_upstream: OpaqueField,
    /// The peering-link hop field on the down side.
    pub down_peering: OpaqueField,
    /// The down segment.
    pub down: PathSegment,
}

impl PeerPath {
    fn decode(data: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            up: PathSegment::decode(data)?,
            up_peering: take_field(data)?,
            up_upstream: take_field(data)?,
            down_upstream: take_field(data)?,
            down_peering: take_field(data)?,
            down: PathSegment::decode(data)?,
        })
    }

    fn reverse(&mut self) {
        std::mem::swap(&mut self.up, &mut self.down);
        std::mem::swap(&mut self.up_peering, &mut self.down_peering);
        std::mem::swap(&mut self.up_upstream, &mut self.down_upstream);
        self.up.reverse();
        self.down.reverse();
    }

    fn field_count(&self) -> usize {
        self.up.field_count() + 4 + self.down.field_count()
    }

    fn iter(&self) -> impl Iterator<Item = &OpaqueField> {
        self.up
            .iter()
            .chain(std::iter::once(&self.up_peering))
            .chain(std::iter::once(&self.up_upstream))
            .chain(std::iter::once(&self.down_upstream))
            .chain(std::iter::once(&self.down_peering))
            .chain(self.down.iter())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut OpaqueField> {
        self.up
            .iter_mut()
            .chain(std::iter::once(&mut self.up_peering))
            .chain(std::iter::once(&mut self.up_upstream))
            .chain(std::iter::once(&mut self.down_upstream))
            .chain(std::iter::once(&mut self.down_peering))
            .chain(self.down.iter_mut())
    }
}

/// The forwarding path found in a legacy SCION packet.
///
/// The variant is fixed once parsed; reversal reorders elements within the
/// variant but never changes its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataplanePath {
    /// The empty path, used for intra-domain traffic.
    Empty,
    /// A path over backbone segments.
    Core(CorePath),
    /// A path crossing over at a domain boundary.
    CrossOver(CrossOverPath),
    /// A path using a peering shortcut.
    Peer(PeerPath),
    /// A path of an unrecognised kind, kept in its encoded form.
    Unsupported {
        /// The first byte of the path, from which dispatch failed.
        info: u8,
        /// The undecoded bytes of the path.
        bytes: Bytes,
    },
}

impl DataplanePath {
    /// The kind of this path.
    pub fn kind(&self) -> PathKind {
        match self {
            Self::Empty => PathKind::Empty,
            Self::Core(_) => PathKind::Core,
            Self::CrossOver(_) => PathKind::CrossOver,
            Self::Peer(_) => PathKind::Peer,
            Self::Unsupported { info, .. } => PathKind::from(*info >> 1),
        }
    }

    /// The number of opaque fields in the path.
    ///
    /// Unsupported paths report 0 since their structure is unknown.
    pub fn field_count(&self) -> usize {
        match self {
            Self::Empty | Self::Unsupported { .. } => 0,
            Self::Core(path) => path.field_count(),
            Self::CrossOver(path) => path.field_count(),
            Self::Peer(path) => path.field_count(),
        }
    }

    /// The opaque field at `index` over the path's concatenated element
    /// sequence, or `None` when out of range or the path has no elements.
    pub fn get_of(&self, index: usize) -> Option<&OpaqueField> {
        match self {
            Self::Empty | Self::Unsupported { .. } => None,
            Self::Core(path) => path.iter().nth(index),
            Self::CrossOver(path) => path.iter().nth(index),
            Self::Peer(path) => path.iter().nth(index),
        }
    }

    /// Mutable access to the opaque field at `index`.
    pub fn get_of_mut(&mut self, index: usize) -> Option<&mut OpaqueField> {
        match self {
            Self::Empty | Self::Unsupported { .. } => None,
            Self::Core(path) => path.iter_mut().nth(index),
            Self::CrossOver(path) => path.iter_mut().nth(index),
            Self::Peer(path) => path.iter_mut().nth(index),
        }
    }

    /// Reverses the path in place for the return direction.
    ///
    /// Up and down structures swap pairwise, hop order within each segment is
    /// reversed, and every info field's direction flag is flipped, making the
    /// operation self-inverse. Empty and unsupported paths are unchanged.
    pub fn reverse(&mut self) {
        match self {
            Self::Empty | Self::Unsupported { .. } => {}
            Self::Core(path) => path.reverse(),
            Self::CrossOver(path) => path.reverse(),
            Self::Peer(path) => path.reverse(),
        }
    }
}

impl WireEncode for DataplanePath {
    type Error = InadequateBufferSize;

    #[inline]
    fn encoded_length(&self) -> usize {
        match self {
            Self::Unsupported { bytes, .. } => bytes.len(),
            _ => self.field_count() * OpaqueField::LENGTH,
        }
    }

    fn encode_to_unchecked<T: BufMut>(&self, buffer: &mut T) {
        match self {
            Self::Empty => {}
            Self::Core(path) => path.iter().for_each(|of| of.encode_to_unchecked(buffer)),
            Self::CrossOver(path) => path.iter().for_each(|of| of.encode_to_unchecked(buffer)),
            Self::Peer(path) => path.iter().for_each(|of| of.encode_to_unchecked(buffer)),
            Self::Unsupported { bytes, .. } => buffer.put_slice(bytes),
        }
    }
}

impl WireDecodeWithContext<Bytes> for DataplanePath {
    type Error = DecodeError;
    type Context = usize;

    fn decode_with_context(data: &mut Bytes, length: usize) -> Result<Self, Self::Error> {
        if length == 0 {
            return Ok(Self::Empty);
        }
        if data.remaining() < length {
            return Err(DecodeError::HeaderEmptyOrTruncated);
        }

        let mut path_bytes = data.split_to(length);
        let first = path_bytes.chunk()[0];

        let path = match PathKind::from(first >> 1) {
            PathKind::Core => Self::Core(CorePath::decode(&mut path_bytes)?),
            PathKind::CrossOver => Self::CrossOver(CrossOverPath::decode(&mut path_bytes)?),
            PathKind::Peer => Self::Peer(PeerPath::decode(&mut path_bytes)?),
            PathKind::Empty | PathKind::Other(_) => {
                info!(discriminant = first, "cannot decode path: unrecognised kind");
                return Ok(Self::Unsupported {
                    info: first,
                    bytes: path_bytes,
                });
            }
        };

        if path_bytes.has_remaining() {
            return Err(DecodeError::InconsistentPathLength);
        }
        Ok(path)
    }
}
