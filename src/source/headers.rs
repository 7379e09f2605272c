//! Header normalization and the canonical-header synonym table.

/// Canonical header concepts that accept several display spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalHeader {
    ReplyTo,
    NoReply,
    FromName,
    FromEmail,
}

/// Accepted normalized spellings per canonical concept.
///
/// Within a group, earlier spellings win when more than one is present.
pub const SYNONYMS: &[(CanonicalHeader, &[&str])] = &[
    (
        CanonicalHeader::ReplyTo,
        &["reply to", "reply-to", "reply_to", "replyto"],
    ),
    (
        CanonicalHeader::NoReply,
        &["no reply", "no-reply", "no_reply", "noreply"],
    ),
    (
        CanonicalHeader::FromName,
        &["from name", "from-name", "from_name", "fromname", "sender name"],
    ),
    (
        CanonicalHeader::FromEmail,
        &["from email", "from-email", "from_email", "fromemail", "sender email"],
    ),
];

/// Normalize a header label for lookup: trim and lowercase.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Find the synonym group a normalized name belongs to, if any.
pub fn synonym_group(normalized: &str) -> Option<&'static [&'static str]> {
    SYNONYMS
        .iter()
        .find(|(_, spellings)| spellings.contains(&normalized))
        .map(|(_, spellings)| *spellings)
}

/// All synonym spellings, flattened. Used to seed the reserved-header set.
pub fn all_synonym_spellings() -> impl Iterator<Item = &'static str> {
    SYNONYMS.iter().flat_map(|(_, spellings)| spellings.iter().copied())
}
