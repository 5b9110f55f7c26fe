//! Policy parameters embedded in resource tags
//!
//! A parameter blob is a single tag value of the form `K1=V1;K2=V2`. It may be
//! set on the resource group, on the VM, or both; VM keys win.

use std::collections::BTreeMap;

use crate::error::TagParseError;
use crate::models::TagSet;

/// Tag holding the parameter blob
pub const DEFAULT_PARAMETER_TAG: &str = "VM_AUTO_STOP";

/// Tag holding the unresolved warning timestamp
pub const DEFAULT_WARNING_TAG: &str = "VM_AUTO_STOP_WARNING_TS";

pub const AUTO_STOP: &str = "AUTO_STOP";
pub const WARN_EMAIL_TO: &str = "WARN_EMAIL_TO";
pub const INACTIVITY_TH_MIN: &str = "INACTIVITY_TH_MIN";
pub const POST_WARN_TH_MINS: &str = "POST_WARN_TH_MINS";
pub const CPU_STDEV_BAS_PCT: &str = "CPU_STDEV_BAS_PCT";
pub const NETW_STDEV_BAS_PCT: &str = "NETW_STDEV_BAS_PCT";

/// Decoded parameter blob
pub type TagParams = BTreeMap<String, String>;

/// Decode `k=v;k=v`
///
/// Keys and values are trimmed. The value is everything after the first `=`.
/// Blank entries (a trailing `;`) are ignored; an entry without `=` fails the
/// whole blob.
pub fn parse_params(blob: &str) -> Result<TagParams, TagParseError> {
    let mut params = TagParams::new();

    for entry in blob.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| TagParseError::MissingSeparator {
                entry: entry.to_string(),
            })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(TagParseError::EmptyKey {
                entry: entry.to_string(),
            });
        }

        params.insert(key.to_string(), value.trim().to_string());
    }

    Ok(params)
}

/// Overlay VM-level parameters on resource-group-level ones
pub fn merge_params(group: TagParams, vm: TagParams) -> TagParams {
    let mut merged = group;
    merged.extend(vm);
    merged
}

/// Parse and merge the parameter blob from both tag sources
///
/// A source without the tag contributes nothing.
pub fn collect_params(
    group_tags: &TagSet,
    vm_tags: &TagSet,
    parameter_tag: &str,
) -> Result<TagParams, TagParseError> {
    let group = match group_tags.get(parameter_tag) {
        Some(blob) => parse_params(blob)?,
        None => TagParams::new(),
    };
    let vm = match vm_tags.get(parameter_tag) {
        Some(blob) => parse_params(blob)?,
        None => TagParams::new(),
    };

    Ok(merge_params(group, vm))
}

/// A VM is in scope only when `AUTO_STOP` is exactly `Y` or `YES`
pub fn is_opted_in(params: &TagParams) -> bool {
    matches!(params.get(AUTO_STOP).map(String::as_str), Some("Y") | Some("YES"))
}
