use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::error::StoreError;
use super::types::{JournalFilter, JournalRecord, NONE};

const CSV_HEADERS: [&str; 7] = [
    "name",
    "issn",
    "vak_category",
    "white_level",
    "rsci",
    "second_registry_url",
    "primary_registry_url",
];

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn comparable_issn(issn: &str) -> String {
    issn.trim().replace('-', "")
}

/// JSON array of journals on disk plus the copy loaded from it.
#[derive(Debug)]
pub struct JournalStore {
    path: PathBuf,
    journals: Vec<JournalRecord>,
}

impl JournalStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            journals: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn journals(&self) -> &[JournalRecord] {
        &self.journals
    }

    /// Reads the file; a missing or blank file is an empty store.
    pub fn load(&mut self) -> Result<&[JournalRecord], StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(io_error(&self.path, err)),
        };
        self.journals = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content).map_err(|source| StoreError::Json {
                path: self.path.display().to_string(),
                source,
            })?
        };
        Ok(&self.journals)
    }

    /// Overwrites the whole file through a sibling temp file; a failed save
    /// leaves no temp file behind.
    pub fn save(&mut self, journals: Vec<JournalRecord>) -> Result<(), StoreError> {
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let written = write_json(&tmp_path, &journals).and_then(|()| {
            fs::rename(&tmp_path, &self.path).map_err(|err| io_error(&self.path, err))
        });
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        self.journals = journals;
        Ok(())
    }

    pub fn find_by_issn(&self, issn: &str) -> Option<&JournalRecord> {
        let wanted = comparable_issn(issn);
        if wanted.is_empty() {
            return None;
        }
        self.journals
            .iter()
            .find(|journal| comparable_issn(&journal.issn) == wanted)
    }

    pub fn vak_categories(&self) -> Vec<String> {
        distinct_resolved(self.journals.iter().map(|j| j.vak_category.as_str()))
    }

    pub fn white_levels(&self) -> Vec<String> {
        distinct_resolved(self.journals.iter().map(|j| j.white_level.as_str()))
    }

    pub fn filter(&self, filter: &JournalFilter) -> Vec<&JournalRecord> {
        self.journals
            .iter()
            .filter(|journal| filter.matches(journal))
            .collect()
    }
}

fn write_json(path: &Path, journals: &[JournalRecord]) -> Result<(), StoreError> {
    let file = File::create(path).map_err(|err| io_error(path, err))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, journals).map_err(|source| StoreError::Json {
        path: path.display().to_string(),
        source,
    })?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|err| io_error(path, err))
}

fn distinct_resolved<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|value| !value.is_empty() && *value != NONE)
        .map(ToString::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Writes the journals as a CSV sheet.
pub fn export_csv(journals: &[&JournalRecord], path: impl AsRef<Path>) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADERS)?;
    for journal in journals {
        writer.write_record([
            journal.name.as_str(),
            journal.issn.as_str(),
            journal.vak_category.as_str(),
            journal.white_level.as_str(),
            if journal.in_second_registry { "yes" } else { "no" },
            journal.second_registry_url.as_str(),
            journal.primary_registry_url.as_str(),
        ])?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}
