//! GATT layout constants and address helpers

use blipchat_core::PeerAddress;
use btleplug::api::BDAddr;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// Service UUID used when none is configured
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0xB11C_0001_5C4A_4E2B_9D3A_6A4B1E0C7F21);

/// Characteristic UUID used when none is configured
///
/// Read, write and notify, carrying whole payloads.
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xB11C_0002_5C4A_4E2B_9D3A_6A4B1E0C7F21);

// ----------------------------------------------------------------------------
// Advertising
// ----------------------------------------------------------------------------

/// Room left for the complete local name in a scan response
pub const MAX_ADVERTISED_NAME_LEN: usize = 29;

/// Cut `name` to what fits in a scan response, on a character boundary
pub fn advertised_name(name: &str) -> &str {
    if name.len() <= MAX_ADVERTISED_NAME_LEN {
        return name;
    }
    let mut end = MAX_ADVERTISED_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

// ----------------------------------------------------------------------------
// Addresses
// ----------------------------------------------------------------------------

/// Peer address for a device seen through btleplug
pub fn peer_address(addr: BDAddr) -> PeerAddress {
    PeerAddress::new(addr.to_string())
}
