//! File-based progress storage for Arbor.
//!
//! Each student's record is one JSON file in `<data_dir>/students/`.
//! Writes go to a temp file which is synced and renamed into place, so a
//! reader never sees a partially written record. Records hold the whole
//! ledger and are read without a size cap: whatever `put` wrote, `get`
//! reads back.

use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::config::students_dir;
use crate::core::StudentRecord;
use crate::error::{ArborError, Result};
use crate::storage::ProgressStore;
use crate::util::is_safe_id;

/// File-based progress store.
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    /// Open the store under a data directory, creating `students/` if needed.
    pub fn open(data_dir: &Path) -> Result<Self> {
        Self::with_dir(students_dir(data_dir))
    }

    /// Open the store in exactly this directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| ArborError::storage(&dir, e))?;
        }
        Ok(Self { dir })
    }

    /// Directory holding the record files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, student_id: &str) -> Result<PathBuf> {
        if !is_safe_id(student_id) {
            return Err(ArborError::invalid_id(student_id));
        }
        Ok(self.dir.join(format!("{}.json", student_id)))
    }

    fn temp_path(&self, student_id: &str) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", student_id))
    }

    fn atomic_write(&self, record: &StudentRecord) -> Result<()> {
        let final_path = self.record_path(record.student_id())?;
        let temp_path = self.temp_path(record.student_id());

        let json = serde_json::to_string_pretty(record)?;

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| ArborError::storage(&temp_path, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| ArborError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| ArborError::storage(&temp_path, e))?;
        }

        fs::rename(&temp_path, &final_path).map_err(|e| ArborError::storage(&final_path, e))?;
        Ok(())
    }
}

impl ProgressStore for FileProgressStore {
    fn get(&self, student_id: &str) -> Result<Option<StudentRecord>> {
        let path = self.record_path(student_id)?;
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ArborError::storage(&path, e)),
        };

        let record: StudentRecord = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(record))
    }

    fn put(&self, record: &StudentRecord) -> Result<()> {
        self.atomic_write(record)
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| ArborError::storage(&self.dir, e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ArborError::storage(&self.dir, e))?;
            let path = entry.path();

            // Skip non-JSON files and temp files
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_safe_id(stem) {
                    ids.push(stem.to_string());
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}
