//! Control packet codecs.
//!
//! Control packets are ordinary packets whose payload is a fixed-layout,
//! big-endian record and whose peer is one of the reserved service addresses
//! held by the [`ServiceRegistry`]: requests carry the service address as
//! their destination, replies as their source. Each codec serialises its
//! typed fields into the payload at construction time and exposes them as
//! read-only views after parsing.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    address::{Ad, Isd, ScionAddr},
    packet::{
        ByEndpoint, DecodeError, EncodeError, InadequateBufferSize, PacketType, Payload,
        ScionPacket,
    },
    registry::{ServiceRegistry, UnknownPacketType},
    wire_encoding::{WireDecode, WireEncode},
};

/// Errors raised when decoding a control packet.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum ControlDecodeError {
    /// The payload is shorter than the fixed fields of the control packet.
    #[error("control payload is shorter than its fixed fields")]
    PayloadTruncated,
    /// The payload is a nested packet rather than a flat record.
    #[error("control payload must be raw bytes")]
    StructuredPayload,
    /// The encapsulating packet failed to decode.
    #[error(transparent)]
    Packet(#[from] DecodeError),
}

/// Errors raised when building a control packet.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum ControlEncodeError {
    /// No service address is registered for the packet type.
    #[error(transparent)]
    UnknownType(#[from] UnknownPacketType),
    /// The packet could not be assembled.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

fn build_packet(
    addresses: ByEndpoint<ScionAddr>,
    packet_type: PacketType,
    payload: Bytes,
) -> Result<ScionPacket, EncodeError> {
    ScionPacket::new(
        addresses,
        packet_type,
        None,
        Vec::new(),
        0,
        Payload::Bytes(payload),
    )
}

fn payload_bytes(packet: &ScionPacket) -> Result<Bytes, ControlDecodeError> {
    packet
        .payload()
        .as_bytes()
        .cloned()
        .ok_or(ControlDecodeError::StructuredPayload)
}

macro_rules! impl_control_packet {
    ($name:ident, $fixed_length:expr) => {
        impl $name {
            /// The packet type stamped into the header of these packets.
            pub const PACKET_TYPE: PacketType = PacketType::$name;
            /// The length of the fixed payload fields in bytes.
            pub const FIXED_PAYLOAD_LENGTH: usize = $fixed_length;

            /// The encapsulating packet.
            pub fn packet(&self) -> &ScionPacket {
                &self.packet
            }

            /// Consumes the control packet, returning its envelope.
            pub fn into_packet(self) -> ScionPacket {
                self.packet
            }
        }

        impl WireEncode for $name {
            type Error = InadequateBufferSize;

            #[inline]
            fn encoded_length(&self) -> usize {
                self.packet.encoded_length()
            }

            fn encode_to_unchecked<T: BufMut>(&self, buffer: &mut T) {
                self.packet.encode_to_unchecked(buffer);
            }
        }

        impl WireDecode<Bytes> for $name {
            type Error = ControlDecodeError;

            fn decode(data: &mut Bytes) -> Result<Self, Self::Error> {
                Self::from_packet(ScionPacket::decode(data)?)
            }
        }

        impl From<$name> for ScionPacket {
            fn from(value: $name) -> Self {
                value.packet
            }
        }
    };
}

/// Interface-ID request sent to the border router of the neighbouring domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfidRequest {
    packet: ScionPacket,
    request_id: u16,
}

impl IfidRequest {
    /// Creates a request advertising the sender's interface number.
    pub fn new(
        registry: &ServiceRegistry,
        source: ScionAddr,
        request_id: u16,
    ) -> Result<Self, ControlEncodeError> {
        let destination = registry.address_for(Self::PACKET_TYPE)?;

        let mut payload = BytesMut::with_capacity(Self::FIXED_PAYLOAD_LENGTH);
        payload.put_u16(0); // reserved
        payload.put_u16(request_id);

        let packet = build_packet(
            ByEndpoint {
                source,
                destination,
            },
            Self::PACKET_TYPE,
            payload.freeze(),
        )?;
        Ok(Self { packet, request_id })
    }

    /// The interface number of the requesting router.
    pub fn request_id(&self) -> u16 {
        self.request_id
    }

    fn from_packet(packet: ScionPacket) -> Result<Self, ControlDecodeError> {
        let mut payload = payload_bytes(&packet)?;
        if payload.remaining() < Self::FIXED_PAYLOAD_LENGTH {
            return Err(ControlDecodeError::PayloadTruncated);
        }
        let _reserved = payload.get_u16();
        let request_id = payload.get_u16();
        Ok(Self { packet, request_id })
    }
}
impl_control_packet!(IfidRequest, 4);

/// Interface-ID reply returned to the requesting border router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfidReply {
    packet: ScionPacket,
    reply_id: u16,
    request_id: u16,
}

impl IfidReply {
    /// Creates a reply pairing the local interface number with the one from
    /// the request.
    pub fn new(
        registry: &ServiceRegistry,
        destination: ScionAddr,
        reply_id: u16,
        request_id: u16,
    ) -> Result<Self, ControlEncodeError> {
        let source = registry.address_for(Self::PACKET_TYPE)?;

        let mut payload = BytesMut::with_capacity(Self::FIXED_PAYLOAD_LENGTH);
        payload.put_u16(reply_id);
        payload.put_u16(request_id);

        let packet = build_packet(
            ByEndpoint {
                source,
                destination,
            },
            Self::PACKET_TYPE,
            payload.freeze(),
        )?;
        Ok(Self {
            packet,
            reply_id,
            request_id,
        })
    }

    /// The interface number of the replying router.
    pub fn reply_id(&self) -> u16 {
        self.reply_id
    }

    /// The interface number echoed from the request.
    pub fn request_id(&self) -> u16 {
        self.request_id
    }

    fn from_packet(packet: ScionPacket) -> Result<Self, ControlDecodeError> {
        let mut payload = payload_bytes(&packet)?;
        if payload.remaining() < Self::FIXED_PAYLOAD_LENGTH {
            return Err(ControlDecodeError::PayloadTruncated);
        }
        let reply_id = payload.get_u16();
        let request_id = payload.get_u16();
        Ok(Self {
            packet,
            reply_id,
            request_id,
        })
    }
}
impl_control_packet!(IfidReply, 4);

/// Certificate-chain request sent towards the certificate service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertChainRequest {
    packet: ScionPacket,
    ingress_interface: u16,
    source_isd: Isd,
    source_ad: Ad,
    isd: Isd,
    ad: Ad,
    version: u32,
}

impl CertChainRequest {
    /// Creates a request for the certificate chain of `isd`/`ad` at `version`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: &ServiceRegistry,
        source: ScionAddr,
        ingress_interface: u16,
        source_isd: Isd,
        source_ad: Ad,
        isd: Isd,
        ad: Ad,
        version: u32,
    ) -> Result<Self, ControlEncodeError> {
        let destination = registry.address_for(Self::PACKET_TYPE)?;

        let mut payload = BytesMut::with_capacity(Self::FIXED_PAYLOAD_LENGTH);
        payload.put_u16(ingress_interface);
        payload.put_u16(source_isd.to_u16());
        payload.put_u64(source_ad.to_u64());
        payload.put_u16(isd.to_u16());
        payload.put_u64(ad.to_u64());
        payload.put_u32(version);

        let packet = build_packet(
            ByEndpoint {
                source,
                destination,
            },
            Self::PACKET_TYPE,
            payload.freeze(),
        )?;
        Ok(Self {
            packet,
            ingress_interface,
            source_isd,
            source_ad,
            isd,
            ad,
            version,
        })
    }

    /// The ingress interface on which the triggering beacon arrived.
    pub fn ingress_interface(&self) -> u16 {
        self.ingress_interface
    }

    /// The ISD of the requester.
    pub fn source_isd(&self) -> Isd {
        self.source_isd
    }

    /// The AD of the requester.
    pub fn source_ad(&self) -> Ad {
        self.source_ad
    }

    /// The ISD of the requested certificate chain.
    pub fn isd(&self) -> Isd {
        self.isd
    }

    /// The AD of the requested certificate chain.
    pub fn ad(&self) -> Ad {
        self.ad
    }

    /// The version of the requested certificate chain.
    pub fn version(&self) -> u32 {
        self.version
    }

    fn from_packet(packet: ScionPacket) -> Result<Self, ControlDecodeError> {
        let mut payload = payload_bytes(&packet)?;
        if payload.remaining() < Self::FIXED_PAYLOAD_LENGTH {
            return Err(ControlDecodeError::PayloadTruncated);
        }
        Ok(Self {
            ingress_interface: payload.get_u16(),
            source_isd: Isd(payload.get_u16()),
            source_ad: Ad(payload.get_u64()),
            isd: Isd(payload.get_u16()),
            ad: Ad(payload.get_u64()),
            version: payload.get_u32(),
            packet,
        })
    }
}
impl_control_packet!(CertChainRequest, 22);

/// Certificate-chain reply from the certificate service.
///
/// The chain itself is an opaque blob occupying the payload after the fixed
/// fields; interpreting it is the certificate service's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertChainReply {
    packet: ScionPacket,
    isd: Isd,
    ad: Ad,
    version: u32,
    chain: Bytes,
}

impl CertChainReply {
    /// Creates a reply carrying the requested certificate chain.
    pub fn new(
        registry: &ServiceRegistry,
        destination: ScionAddr,
        isd: Isd,
        ad: Ad,
        version: u32,
        chain: Bytes,
    ) -> Result<Self, ControlEncodeError> {
        let source = registry.address_for(Self::PACKET_TYPE)?;

        let mut payload = BytesMut::with_capacity(Self::FIXED_PAYLOAD_LENGTH + chain.len());
        payload.put_u16(isd.to_u16());
        payload.put_u64(ad.to_u64());
        payload.put_u32(version);
        payload.put_slice(&chain);

        let packet = build_packet(
            ByEndpoint {
                source,
                destination,
            },
            Self::PACKET_TYPE,
            payload.freeze(),
        )?;
        Ok(Self {
            packet,
            isd,
            ad,
            version,
            chain,
        })
    }

    /// The ISD of the carried certificate chain.
    pub fn isd(&self) -> Isd {
        self.isd
    }

    /// The AD of the carried certificate chain.
    pub fn ad(&self) -> Ad {
        self.ad
    }

    /// The version of the carried certificate chain.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The certificate chain blob.
    pub fn chain(&self) -> &Bytes {
        &self.chain
    }

    fn from_packet(packet: ScionPacket) -> Result<Self, ControlDecodeError> {
        let mut payload = payload_bytes(&packet)?;
        if payload.remaining() < Self::FIXED_PAYLOAD_LENGTH {
            return Err(ControlDecodeError::PayloadTruncated);
        }
        Ok(Self {
            isd: Isd(payload.get_u16()),
            ad: Ad(payload.get_u64()),
            version: payload.get_u32(),
            chain: payload,
            packet,
        })
    }
}
impl_control_packet!(CertChainReply, 14);

/// Trust-root-configuration request sent towards the TRC service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrcRequest {
    packet: ScionPacket,
    ingress_interface: u16,
    source_isd: Isd,
    source_ad: Ad,
    isd: Isd,
    version: u32,
}

impl TrcRequest {
    /// Creates a request for the TRC of `isd` at `version`.
    pub fn new(
        registry: &ServiceRegistry,
        source: ScionAddr,
        ingress_interface: u16,
        source_isd: Isd,
        source_ad: Ad,
        isd: Isd,
        version: u32,
    ) -> Result<Self, ControlEncodeError> {
        let destination = registry.address_for(Self::PACKET_TYPE)?;

        let mut payload = BytesMut::with_capacity(Self::FIXED_PAYLOAD_LENGTH);
        payload.put_u16(ingress_interface);
        payload.put_u16(source_isd.to_u16());
        payload.put_u64(source_ad.to_u64());
        payload.put_u16(isd.to_u16());
        payload.put_u32(version);

        let packet = build_packet(
            ByEndpoint {
                source,
                destination,
            },
            Self::PACKET_TYPE,
            payload.freeze(),
        )?;
        Ok(Self {
            packet,
            ingress_interface,
            source_isd,
            source_ad,
            isd,
            version,
        })
    }

    /// The ingress interface on which the triggering beacon arrived.
    pub fn ingress_interface(&self) -> u16 {
        self.ingress_interface
    }

    /// The ISD of the requester.
    pub fn source_isd(&self) -> Isd {
        self.source_isd
    }

    /// The AD of the requester.
    pub fn source_ad(&self) -> Ad {
        self.source_ad
    }

    /// The ISD of the requested TRC.
    pub fn isd(&self) -> Isd {
        self.isd
    }

    /// The version of the requested TRC.
    pub fn version(&self) -> u32 {
        self.version
    }

    fn from_packet(packet: ScionPacket) -> Result<Self, ControlDecodeError> {
        let mut payload = payload_bytes(&packet)?;
        if payload.remaining() < Self::FIXED_PAYLOAD_LENGTH {
            return Err(ControlDecodeError::PayloadTruncated);
        }
        Ok(Self {
            ingress_interface: payload.get_u16(),
            source_isd: Isd(payload.get_u16()),
            source_ad: Ad(payload.get_u64()),
            isd: Isd(payload.get_u16()),
            version: payload.get_u32(),
            packet,
        })
    }
}
impl_control_packet!(TrcRequest, 18);

/// Trust-root-configuration reply from the TRC service.
///
/// The TRC document is an opaque blob occupying the payload after the fixed
/// fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrcReply {
    packet: ScionPacket,
    isd: Isd,
    version: u32,
    trc: Bytes,
}

impl TrcReply {
    /// Creates a reply carrying the requested TRC.
    pub fn new(
        registry: &ServiceRegistry,
        destination: ScionAddr,
        isd: Isd,
        version: u32,
        trc: Bytes,
    ) -> Result<Self, ControlEncodeError> {
        let source = registry.address_for(Self::PACKET_TYPE)?;

        let mut payload = BytesMut::with_capacity(Self::FIXED_PAYLOAD_LENGTH + trc.len());
        payload.put_u16(isd.to_u16());
        payload.put_u32(version);
        payload.put_slice(&trc);

        let packet = build_packet(
            ByEndpoint {
                source,
                destination,
            },
            Self::PACKET_TYPE,
            payload.freeze(),
        )?;
        Ok(Self {
            packet,
            isd,
            version,
            trc,
        })
    }

    /// The ISD of the carried TRC.
    pub fn isd(&self) -> Isd {
        self.isd
    }

    /// The version of the carried TRC.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The TRC blob.
    pub fn trc(&self) -> &Bytes {
        &self.trc
    }

    fn from_packet(packet: ScionPacket) -> Result<Self, ControlDecodeError> {
        let mut payload = payload_bytes(&packet)?;
        if payload.remaining() < Self::FIXED_PAYLOAD_LENGTH {
            return Err(ControlDecodeError::PayloadTruncated);
        }
        Ok(Self {
            isd: Isd(payload.get_u16()),
            version: payload.get_u32(),
            trc: payload,
            packet,
        })
    }
}
impl_control_packet!(TrcReply, 6);
