//! A single roster row.

use serde::{Deserialize, Deserializer, Serialize};

/// One registered participant, as stored in the roster file.
///
/// Field values round-trip through save/load untouched; in particular the
/// email keeps the casing the registration import produced. Lookups
/// normalize on the fly (see [`crate::Roster::find_by_email`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    #[serde(rename = "First Name")]
    pub first_name: String,

    #[serde(rename = "Last Name")]
    pub last_name: String,

    #[serde(rename = "Email")]
    pub email: String,

    #[serde(rename = "Reimbursement")]
    pub reimbursement: String,

    /// Flipped false→true exactly once, by a successful verification
    /// completion. Never reverts automatically.
    #[serde(rename = "Verified", deserialize_with = "flag_from_text")]
    pub verified: bool,
}

impl ParticipantRecord {
    /// "First Last", as applied to the member's display name.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// The `Verified` column is boolean-as-text. Registration tooling has
/// produced `True`/`False` as well as `true`/`false`, so parse leniently.
/// An empty cell counts as unverified.
fn flag_from_text<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid Verified value: {other:?}"
        ))),
    }
}
