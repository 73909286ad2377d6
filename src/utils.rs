//! Utility functions for identifiers and text handling

use crate::error::{MarketResult, MarketplaceError};
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique, time-ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> MarketResult<String> {
    let hrp = bech32::Hrp::parse(hrp)
        .map_err(|e| MarketplaceError::Internal(format!("invalid id prefix '{hrp}': {e}")))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| MarketplaceError::Internal(e.to_string()))?;
    Ok(encode)
}

/// Shortens `content` to `max_chars` characters, appending `...` when cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
