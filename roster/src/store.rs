//! Roster file access: load, schema migration, lookup, atomic save.

use crate::{ParticipantRecord, RosterError};
use gatehouse_types::Email;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Column order written on every save. Loads match headers by name, not
/// position, so externally reordered files still parse.
pub const HEADERS: [&str; 5] = ["First Name", "Last Name", "Email", "Reimbursement", "Verified"];

/// The in-memory roster table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Roster {
    rows: Vec<ParticipantRecord>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[ParticipantRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, record: ParticipantRecord) {
        self.rows.push(record);
    }

    /// Case-insensitive exact match on the email column.
    ///
    /// Returns the first matching row and its position. Email uniqueness is
    /// an invariant of the registration import; if it is violated the first
    /// match wins and a warning is logged so operators can fix the data.
    pub fn find_by_email(&self, email: &Email) -> Option<(usize, &ParticipantRecord)> {
        let mut matches = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| Email::normalized(&row.email) == *email);

        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            tracing::warn!(email = %email, "multiple roster rows match one email, using the first");
        }
        first
    }

    /// Set `verified = true` at the given position. In-memory only; the
    /// caller must [`RosterStore::save`] to persist.
    pub fn mark_verified(&mut self, row: usize) -> Result<(), RosterError> {
        match self.rows.get_mut(row) {
            Some(record) => {
                record.verified = true;
                Ok(())
            }
            None => Err(RosterError::RowOutOfRange(row)),
        }
    }
}

/// Handle on the roster file. Stateless: every `load` reads the file fresh
/// and every `save` rewrites it whole.
pub struct RosterStore {
    path: PathBuf,
}

/// Rows from an export that predates the `Verified` column.
#[derive(Deserialize)]
struct LegacyRecord {
    #[serde(rename = "First Name")]
    first_name: String,
    #[serde(rename = "Last Name")]
    last_name: String,
    #[serde(rename = "Email")]
    email: String,
    #[serde(rename = "Reimbursement")]
    reimbursement: String,
}

impl From<LegacyRecord> for ParticipantRecord {
    fn from(legacy: LegacyRecord) -> Self {
        Self {
            first_name: legacy.first_name,
            last_name: legacy.last_name,
            email: legacy.email,
            reimbursement: legacy.reimbursement,
            verified: false,
        }
    }
}

impl RosterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the roster from disk.
    ///
    /// An absent file is created empty (with the canonical header). A file
    /// missing the `Verified` column is migrated — every row defaults to
    /// unverified and the file is rewritten before this returns.
    pub fn load(&self) -> Result<Roster, RosterError> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "roster file missing, creating it empty");
            let roster = Roster::new();
            self.save(&roster)?;
            return Ok(roster);
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let has_verified_column = reader.headers()?.iter().any(|header| header == "Verified");

        if !has_verified_column {
            let mut rows = Vec::new();
            for record in reader.deserialize::<LegacyRecord>() {
                rows.push(record?.into());
            }
            let roster = Roster { rows };
            tracing::info!(
                path = %self.path.display(),
                rows = roster.len(),
                "adding Verified column to roster schema"
            );
            self.save(&roster)?;
            return Ok(roster);
        }

        let mut rows = Vec::new();
        for record in reader.deserialize::<ParticipantRecord>() {
            rows.push(record?);
        }
        Ok(Roster { rows })
    }

    /// Load, degrading to an empty in-memory roster on failure so the
    /// process can keep operating without persistence. Used at startup;
    /// user-facing flows call [`load`](Self::load) and surface the error.
    pub fn load_or_empty(&self) -> Roster {
        match self.load() {
            Ok(roster) => roster,
            Err(err) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to load roster, continuing with an empty table"
                );
                Roster::new()
            }
        }
    }

    /// Rewrite the roster file.
    ///
    /// Writes to a temp file in the same directory and renames it over the
    /// target, so a concurrent `load` sees either the old or the new
    /// contents, never a partial write.
    pub fn save(&self, roster: &Roster) -> Result<(), RosterError> {
        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))?;

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            writer.write_record(HEADERS)?;
            for row in roster.rows() {
                writer.serialize(row)?;
            }
            writer.flush().map_err(RosterError::Io)?;
        }

        tmp.persist(&self.path)
            .map_err(|err| RosterError::Persist(err.to_string()))?;
        Ok(())
    }
}
