//! Dispatch registry mapping control packet types to reserved service
//! addresses.
//!
//! Control traffic is routed to local service processes through reserved
//! host addresses rather than real network addresses. Requests carry the
//! service address as their destination and replies carry it as their
//! source, so the registry keeps one table per direction. Build it once at
//! process start and pass it by reference to the components that resolve or
//! classify control packets; it is never mutated afterwards, so shared reads
//! need no synchronisation.

use std::{collections::HashMap, net::Ipv4Addr};

use crate::{
    address::{HostAddr, ScionAddr},
    packet::{PacketType, ScionPacket},
};

/// Reserved host address of the certificate service.
const CERT_CHAIN_SERVICE: Ipv4Addr = Ipv4Addr::new(10, 224, 0, 2);
/// Reserved host address of the trust-root-configuration service.
const TRC_SERVICE: Ipv4Addr = Ipv4Addr::new(10, 224, 0, 8);
/// Reserved host address for the interface-ID exchange between routers.
const IFID_EXCHANGE: Ipv4Addr = Ipv4Addr::new(10, 224, 0, 10);

/// Raised when no service address is registered for a packet type.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
#[error("no service address is registered for packet type {0:?}")]
pub struct UnknownPacketType(pub PacketType);

/// Read-only, bidirectional mapping between control packet types and the
/// reserved pseudo-addresses that route them.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    source_addresses: HashMap<PacketType, HostAddr>,
    destination_addresses: HashMap<PacketType, HostAddr>,
    source_types: HashMap<HostAddr, PacketType>,
    destination_types: HashMap<HostAddr, PacketType>,
}

impl ServiceRegistry {
    /// Builds the registry over the reserved service addresses.
    pub fn new() -> Self {
        let sources = [
            (PacketType::IfidReply, HostAddr::from(IFID_EXCHANGE)),
            (PacketType::CertChainReply, HostAddr::from(CERT_CHAIN_SERVICE)),
            (PacketType::TrcReply, HostAddr::from(TRC_SERVICE)),
        ];
        let destinations = [
            (PacketType::IfidRequest, HostAddr::from(IFID_EXCHANGE)),
            (PacketType::CertChainRequest, HostAddr::from(CERT_CHAIN_SERVICE)),
            (PacketType::TrcRequest, HostAddr::from(TRC_SERVICE)),
        ];

        Self {
            source_types: sources
                .iter()
                .map(|(packet_type, address)| (address.clone(), *packet_type))
                .collect(),
            destination_types: destinations
                .iter()
                .map(|(packet_type, address)| (address.clone(), *packet_type))
                .collect(),
            source_addresses: sources.into_iter().collect(),
            destination_addresses: destinations.into_iter().collect(),
        }
    }

    /// The service address associated with the given control packet type.
    ///
    /// Reply types resolve through the source-direction table, request types
    /// through the destination-direction table.
    pub fn address_for(&self, packet_type: PacketType) -> Result<ScionAddr, UnknownPacketType> {
        self.source_addresses
            .get(&packet_type)
            .or_else(|| self.destination_addresses.get(&packet_type))
            .cloned()
            .map(ScionAddr::for_service)
            .ok_or(UnknownPacketType(packet_type))
    }

    /// Classifies a packet by the service addresses in its header.
    ///
    /// The source address is consulted first (reply direction), then the
    /// destination (request direction); packets matching neither are data.
    pub fn packet_type_of(&self, packet: &ScionPacket) -> PacketType {
        let addresses = &packet.header.addresses;
        if let Some(packet_type) = self.source_types.get(&addresses.source.host) {
            return *packet_type;
        }
        if let Some(packet_type) = self.destination_types.get(&addresses.destination.host) {
            return *packet_type;
        }
        PacketType::Data
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
