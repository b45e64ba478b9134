//! Utility functions for id generation

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::LeaveError;

// construct a unique, time-ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, LeaveError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| LeaveError::Encoding(e.to_string()))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| LeaveError::Encoding(e.to_string()))?;
    Ok(encode)
}

/// Plain hyphenated uuid7. Sorts by creation time, used as key suffixes.
pub fn new_sortable_id() -> String {
    uuid7().to_string()
}
