// src/ipc/mac.rs
//! Hardware address lookup used to name the producer segment.

use std::fs;
use std::path::Path;

const SYSFS_NET: &str = "/sys/class/net";

/// Lower-case colon-separated MAC of the first usable interface.
///
/// Interfaces that are up win over ones that are not; ties go by name so the
/// choice is stable across runs.
pub fn hardware_address(interface: Option<&str>) -> Option<String> {
    hardware_address_in(Path::new(SYSFS_NET), interface)
}

pub(crate) fn hardware_address_in(root: &Path, interface: Option<&str>) -> Option<String> {
    let mut candidates: Vec<(bool, String, String)> = fs::read_dir(root)
        .ok()?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "lo" || interface.is_some_and(|want| want != name) {
                return None;
            }
            let address = fs::read_to_string(entry.path().join("address")).ok()?;
            let address = address.trim().to_ascii_lowercase();
            if !is_usable_address(&address) {
                return None;
            }
            let up = fs::read_to_string(entry.path().join("operstate"))
                .map(|s| s.trim() == "up")
                .unwrap_or(false);
            Some((up, name, address))
        })
        .collect();

    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    candidates.into_iter().next().map(|(_, _, address)| address)
}

/// Six colon-separated hex octets, not all zero.
pub fn is_usable_address(address: &str) -> bool {
    let octets: Vec<&str> = address.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
        && octets.iter().any(|o| *o != "00")
}
