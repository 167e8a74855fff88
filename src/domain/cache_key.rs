use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::ticket::TicketId;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactNamespace {
    Validations,
    TestCases,
    GeneratedCode,
    Recordings,
}

impl ArtifactNamespace {
    pub const ALL: [ArtifactNamespace; 4] = [
        ArtifactNamespace::Validations,
        ArtifactNamespace::TestCases,
        ArtifactNamespace::GeneratedCode,
        ArtifactNamespace::Recordings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactNamespace::Validations => "validations",
            ArtifactNamespace::TestCases => "test-cases",
            ArtifactNamespace::GeneratedCode => "generated-code",
            ArtifactNamespace::Recordings => "recordings",
        }
    }
}

impl fmt::Display for ArtifactNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Verdict for one version of a ticket description.
    Validation {
        ticket_id: TicketId,
        description_digest: String,
    },
    TestCases {
        ticket_id: TicketId,
    },
    GeneratedCode {
        ticket_id: TicketId,
        test_case_id: String,
    },
    Recording {
        ticket_id: TicketId,
        test_case_id: String,
        recording_id: String,
    },
}

impl CacheKey {
    pub fn validation(ticket_id: &TicketId, description: &str) -> Self {
        CacheKey::Validation {
            ticket_id: ticket_id.clone(),
            description_digest: sha256_hex(description),
        }
    }

    pub fn test_cases(ticket_id: &TicketId) -> Self {
        CacheKey::TestCases {
            ticket_id: ticket_id.clone(),
        }
    }

    /// Code is keyed by recording when one was supplied, otherwise by test case.
    pub fn code(ticket_id: &TicketId, test_case_id: &str, recording_id: Option<&str>) -> Self {
        match recording_id {
            Some(recording_id) => CacheKey::Recording {
                ticket_id: ticket_id.clone(),
                test_case_id: test_case_id.to_string(),
                recording_id: recording_id.to_string(),
            },
            None => CacheKey::GeneratedCode {
                ticket_id: ticket_id.clone(),
                test_case_id: test_case_id.to_string(),
            },
        }
    }

    pub fn namespace(&self) -> ArtifactNamespace {
        match self {
            CacheKey::Validation { .. } => ArtifactNamespace::Validations,
            CacheKey::TestCases { .. } => ArtifactNamespace::TestCases,
            CacheKey::GeneratedCode { .. } => ArtifactNamespace::GeneratedCode,
            CacheKey::Recording { .. } => ArtifactNamespace::Recordings,
        }
    }

    /// Content address used by storage backends for file names and row ids.
    pub fn digest(&self) -> String {
        sha256_hex(&self.to_string())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Validation {
                ticket_id,
                description_digest,
            } => write!(f, "{}:{}:{}", self.namespace(), ticket_id, description_digest),
            CacheKey::TestCases { ticket_id } => write!(f, "{}:{}", self.namespace(), ticket_id),
            CacheKey::GeneratedCode {
                ticket_id,
                test_case_id,
            } => write!(f, "{}:{}:{}", self.namespace(), ticket_id, test_case_id),
            CacheKey::Recording {
                ticket_id,
                test_case_id,
                recording_id,
            } => write!(
                f,
                "{}:{}:{}:{}",
                self.namespace(),
                ticket_id,
                test_case_id,
                recording_id
            ),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCacheEntry {
    pub key: String,
    pub namespace: ArtifactNamespace,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stable recording id for a transcript that arrived without one.
pub fn recording_id_for(transcript: &str) -> String {
    format!("rec-{}", &sha256_hex(transcript)[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> TicketId {
        TicketId::parse("PROJ-2").unwrap()
    }

    #[test]
    fn test_namespaces_are_disjoint() {
        let keys = [
            CacheKey::validation(&ticket(), "text"),
            CacheKey::test_cases(&ticket()),
            CacheKey::code(&ticket(), "TC-03", None),
            CacheKey::code(&ticket(), "TC-03", Some("rec-1")),
        ];
        let rendered: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        assert_eq!(rendered[1], "test-cases:PROJ-2");
        assert_eq!(rendered[2], "generated-code:PROJ-2:TC-03");
        assert_eq!(rendered[3], "recordings:PROJ-2:TC-03:rec-1");
        assert!(rendered[0].starts_with("validations:PROJ-2:"));
        let digests: std::collections::HashSet<String> =
            keys.iter().map(|key| key.digest()).collect();
        assert_eq!(digests.len(), 4);
    }

    #[test]
    fn test_validation_key_tracks_description() {
        let a = CacheKey::validation(&ticket(), "first version");
        let b = CacheKey::validation(&ticket(), "second version");
        assert_ne!(a, b);
        assert_eq!(a, CacheKey::validation(&ticket(), "first version"));
    }

    #[test]
    fn test_recording_id_is_content_addressed() {
        let a = recording_id_for("page.goto('x')");
        assert_eq!(a, recording_id_for("page.goto('x')"));
        assert_ne!(a, recording_id_for("page.goto('y')"));
        assert_eq!(a.len(), "rec-".len() + 12);
    }
}
