//! Provider Name Translation
//!
//! Converts libfabric provider lists into the names the engine's transport
//! layer expects. Known core providers are moved under the `ofi+` namespace;
//! utility providers layered on top (`;ofi_rxm`) are kept verbatim.

use crate::error::{Error, Result};

/// Namespace prefix for libfabric providers
pub const OFI_PREFIX: &str = "ofi+";

/// Separator between layered providers
pub const PROVIDER_SEPARATOR: char = ';';

/// Core providers the engine knows how to address
pub const KNOWN_PROVIDERS: &[&str] = &["sockets", "tcp", "verbs", "psm2", "gni", "cxi"];

/// Check whether a provider token is one of the known core providers
pub fn is_known_provider(token: &str) -> bool {
    KNOWN_PROVIDERS.contains(&token)
}

/// Translate a raw libfabric provider list into its external form.
///
/// `"verbs;ofi_rxm"` becomes `"ofi+verbs;ofi_rxm"`. An unrecognized leading
/// provider returns the input unchanged.
pub fn lib_fabric_provider_list_to_ext(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyInput);
    }

    let mut segments = trimmed.split(PROVIDER_SEPARATOR);
    let first = segments.next().unwrap_or_default().trim();
    if first.is_empty() {
        return Err(Error::MalformedInput {
            input: raw.to_string(),
        });
    }

    if !is_known_provider(first) {
        return Ok(raw.to_string());
    }

    let mut out = format!("{}{}", OFI_PREFIX, first);
    for rest in segments {
        out.push(PROVIDER_SEPARATOR);
        out.push_str(rest);
    }
    Ok(out)
}
