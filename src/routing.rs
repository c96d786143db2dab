//! Request routing
//!
//! Classifies a caller-supplied route into the wire descriptor the engine
//! understands, computes hash slots for keyed commands, and folds multi-node
//! replies into a per-address map.
//!
//! A route serializes as its own distinct message, separate from the command
//! arguments; the encoder attaches it only when present.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::value::WireValue;

/// Total hash slots in a cluster keyspace
pub const SLOT_COUNT: u16 = 16384;

/// Whether a slot-addressed route targets the owner or a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    Primary,
    Replica,
}

/// Target node(s) for a request or batch.
///
/// Single-node variants expect exactly one reply; multi-node variants fan out
/// and produce one reply per contacted address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    /// Any node, chosen by the engine
    Random,

    /// Every node, primaries and replicas
    AllNodes,

    /// Every primary
    AllPrimaries,

    /// The node owning a numeric slot
    SlotId { slot_id: u16, slot_kind: SlotKind },

    /// The node owning the slot this key hashes to
    SlotKey { key: Vec<u8>, slot_kind: SlotKind },

    /// A specific node by address
    ByAddress { host: String, port: u16 },
}

impl Route {
    /// True when the route targets exactly one node.
    pub fn is_single_node(&self) -> bool {
        !matches!(self, Route::AllNodes | Route::AllPrimaries)
    }

    /// Serializes the route as its distinct wire message.
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|err| BridgeError::Encoding(format!("route: {}", err)))
    }

    /// Engine-side counterpart of [`to_wire_bytes`](Self::to_wire_bytes).
    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|err| BridgeError::Protocol(format!("route: {}", err)))
    }
}

/// Computes the hash slot for a key, honoring `{hash tag}` sections.
///
/// When the key contains a non-empty brace-delimited tag, only the tag is
/// hashed, so callers can pin related keys to one slot.
pub fn hash_slot(key: &[u8]) -> u16 {
    let hashed = match find_hash_tag(key) {
        Some((start, end)) => &key[start..end],
        None => key,
    };
    crc16_xmodem(hashed) % SLOT_COUNT
}

/// Returns the byte range of the first non-empty `{...}` tag, if any.
fn find_hash_tag(key: &[u8]) -> Option<(usize, usize)> {
    let open = key.iter().position(|&b| b == b'{')?;
    let close = key[open + 1..].iter().position(|&b| b == b'}')? + open + 1;
    if close > open + 1 {
        Some((open + 1, close))
    } else {
        None
    }
}

/// CRC16/XMODEM, the cluster keyspace hash. Bitwise form, no table.
fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Stateless routing helpers shared by the client and engine sides.
pub struct Router;

impl Router {
    /// Picks the effective route for a command: the caller's explicit route
    /// when given, otherwise the keyed-command default (slot of the first
    /// key) or a random node for keyless commands.
    pub fn effective_route(explicit: Option<Route>, key: Option<&[u8]>) -> Route {
        if let Some(route) = explicit {
            return route;
        }
        match key {
            Some(key) => Route::SlotKey {
                key: key.to_vec(),
                slot_kind: SlotKind::Primary,
            },
            None => Route::Random,
        }
    }

    /// Folds the engine's `[(node_address, value)]` fan-out replies into a
    /// per-address map, preserving the engine's reply order.
    pub fn merge_node_replies(replies: Vec<(String, WireValue)>) -> WireValue {
        WireValue::Map(
            replies
                .into_iter()
                .map(|(address, value)| (WireValue::Bytes(address.into_bytes()), value))
                .collect(),
        )
    }
}
