//! Matching current playground parameters against known major versions.
//!
//! Two parameter sets match when the temperature is exactly equal and the
//! messages, stripped of client ids, serialize identically.

use crate::types::{strip_internal_ids, MajorVersion, Message, VersionId};

/// How a slot obtains the version it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionChoice {
    /// A matching major already has a minor pinned to the slot's model.
    Reuse(VersionId),
    /// No usable version exists; one must be created.
    Create,
}

/// Serialized messages, client ids stripped. `None` only for absent
/// messages; an empty list keys as `[]`.
fn messages_key(messages: Option<&[Message]>) -> Option<String> {
    serde_json::to_string(&strip_internal_ids(messages?)).ok()
}

/// Find the major version whose parameters equal the current ones.
///
/// Candidates are ranked by descending major. `preferred_major` wins when it
/// is among the matches; otherwise the most recent match is returned.
pub fn match_version<'a>(
    major_versions: &'a [MajorVersion],
    temperature: Option<f64>,
    messages: &[Message],
    preferred_major: Option<u32>,
) -> Option<&'a MajorVersion> {
    let wanted = messages_key(Some(messages));
    let mut matching: Vec<&MajorVersion> = major_versions
        .iter()
        .filter(|version| {
            version.properties.temperature == temperature
                && messages_key(version.properties.messages.as_deref()) == wanted
        })
        .collect();
    matching.sort_by(|a, b| b.major.cmp(&a.major));

    preferred_major
        .and_then(|major| matching.iter().copied().find(|v| v.major == major))
        .or_else(|| matching.first().copied())
}

/// Decide whether `model` can reuse an existing version of the matched major.
pub fn resolve_version(
    major_versions: &[MajorVersion],
    model: &str,
    temperature: Option<f64>,
    messages: &[Message],
    preferred_major: Option<u32>,
) -> VersionChoice {
    let Some(major) = match_version(major_versions, temperature, messages, preferred_major) else {
        return VersionChoice::Create;
    };
    major
        .minors
        .iter()
        .filter(|minor| minor.model.as_deref() == Some(model))
        .max_by_key(|minor| minor.minor)
        .map(|minor| VersionChoice::Reuse(minor.id.clone()))
        .unwrap_or(VersionChoice::Create)
}
