//! Wire format and in-memory representation of legacy SCION packets.
//!
//! This crate implements the first-generation, path-in-header packet layout:
//! the bit-packed 8-byte common header, variable-length endpoint addresses,
//! the pointer-navigated opaque-field path, the self-terminating extension
//! chain, and the fixed-layout control messages carried on top of the packet
//! envelope.
//!
//! All codecs are pure, synchronous transformations over in-memory byte
//! buffers. Cryptographic validation of opaque-field MACs, path discovery,
//! and socket I/O are out of scope and live in other components.

pub mod address;
pub mod ctrl;
pub mod packet;
pub mod path;
pub mod registry;
pub(crate) mod utils;
pub mod wire_encoding;
