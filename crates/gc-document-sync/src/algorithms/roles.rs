//! # Role Classifier
//!
//! Maps a viewer to its capability set. Addresses are compared as parsed
//! bytes, so hex spelling and case do not matter.

use shared_types::Address;

use crate::domain::{RegistryError, RoleSet};

/// Classify `viewer` against the configured privileged addresses.
///
/// An unset role address matches nobody.
pub fn classify(
    viewer: &Address,
    authority: Option<&Address>,
    government: Option<&Address>,
) -> RoleSet {
    RoleSet {
        authority: authority == Some(viewer),
        government: government == Some(viewer),
    }
}

/// Classify hex address strings, parsing them case-insensitively.
///
/// Empty role strings count as unset.
pub fn classify_str(
    viewer: &str,
    authority: Option<&str>,
    government: Option<&str>,
) -> Result<RoleSet, RegistryError> {
    let viewer: Address = viewer.parse()?;
    let parse_role = |value: Option<&str>| -> Result<Option<Address>, RegistryError> {
        match value.map(str::trim) {
            Some(value) if !value.is_empty() => Ok(Some(value.parse()?)),
            _ => Ok(None),
        }
    };
    let authority = parse_role(authority)?;
    let government = parse_role(government)?;
    Ok(classify(&viewer, authority.as_ref(), government.as_ref()))
}
