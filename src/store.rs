//! Persistence store (C3): one self-describing JSON document per dataset,
//! under a single configurable root directory.

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::idcodec;
use crate::model::Dataset;

#[derive(Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Store { root: root.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", idcodec::encode(id)))
    }

    /// Writes `dataset` to `<encode(id)>.json`, creating the store root if
    /// needed. Writes to a sibling `.tmp` file first and renames over the
    /// final path, so a crash mid-write never leaves a truncated dataset
    /// file in place. Overwriting an existing dataset is a programmer
    /// error — callers must confirm non-existence first (the facade does).
    pub fn save(&self, dataset: &Dataset) -> Result<(), Error> {
        std::fs::create_dir_all(&self.root)?;
        let final_path = self.path_for(&dataset.id);
        let tmp_path = final_path.with_extension("json.tmp");
        let body = serde_json::to_vec(dataset)
            .map_err(|e| Error::Internal(format!("failed to serialize dataset: {e}")))?;
        std::fs::write(&tmp_path, &body)?;
        std::fs::rename(&tmp_path, &final_path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            Error::Internal(e.to_string())
        })?;
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Dataset, Error> {
        let path = self.path_for(id);
        let body = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(id.to_string())
            } else {
                Error::Internal(e.to_string())
            }
        })?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::Internal(format!("corrupt dataset file for '{id}': {e}")))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).is_file()
    }

    pub fn list_ids(&self) -> Result<Vec<String>, Error> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Internal(e.to_string())),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            let fname = entry.file_name();
            let fname = fname.to_string_lossy();
            let Some(basename) = fname.strip_suffix(".json") else {
                continue;
            };
            let id = idcodec::decode(basename)
                .map_err(|e| Error::Internal(format!("corrupt filename '{fname}': {e}")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn list_all(&self) -> Result<Vec<Dataset>, Error> {
        self.list_ids()?.into_iter().map(|id| self.load(&id)).collect()
    }

    pub fn delete(&self, id: &str) -> Result<(), Error> {
        let path = self.path_for(id);
        std::fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(id.to_string())
            } else {
                Error::Internal(e.to_string())
            }
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
