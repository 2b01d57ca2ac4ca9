//! PCI Address Lists
//!
//! Helpers for the comma separated PCI address lists handed to the setup
//! script.

/// Split a PCI address list on commas and whitespace, dropping empty items
pub fn parse_pci_list(list: &str) -> Vec<String> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Append addresses from `extra` that `base` does not already contain.
///
/// Order of `base` is kept, new addresses follow in their own order.
pub fn merge_pci_lists(base: &[String], extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(base.len() + extra.len());
    for addr in base.iter().chain(extra) {
        if !merged.contains(addr) {
            merged.push(addr.clone());
        }
    }
    merged
}

/// Check for a `dddd:bb:dd.f` address (domain may be wider, as used behind VMD)
pub fn is_pci_address(s: &str) -> bool {
    let Some((head, func)) = s.rsplit_once('.') else {
        return false;
    };
    let parts: Vec<&str> = head.split(':').collect();
    if parts.len() != 3 {
        return false;
    }

    let hex = |p: &str, min: usize, max: usize| {
        (min..=max).contains(&p.len()) && p.chars().all(|c| c.is_ascii_hexdigit())
    };
    hex(parts[0], 4, 8) && hex(parts[1], 2, 2) && hex(parts[2], 2, 2) && hex(func, 1, 1)
}
