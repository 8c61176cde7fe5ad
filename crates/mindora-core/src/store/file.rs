use super::{Snapshot, SnapshotStore, StoreError};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Pretty JSON snapshot on disk, replaced atomically via a sibling temp file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Snapshot::default()),
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Snapshot::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let dir = self.parent_dir();
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), snapshot)?;
        tmp.as_file_mut().write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerValue, Entity, Question};

    #[test]
    fn missing_file_loads_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load().unwrap(), Snapshot::default());
    }

    #[test]
    fn save_then_load_preserves_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("db.json"));
        let snapshot = Snapshot {
            entities: vec![Entity::new("e1", "Eagle", "cat_animals").with_feature("can_fly", AnswerValue::Yes)],
            questions: vec![Question::new("q1", "Can it fly?", "can_fly")],
            ..Snapshot::default()
        };
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), snapshot);
    }

    #[test]
    fn reads_legacy_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        fs::write(
            &path,
            r#"{"entities":[{"id":"e1","name":"Eagle","category_id":"cat_animals","features":{"can_fly":"Probably Not"}}],
                "questions":[{"id":"q1","text":"Can it fly?","featureKey":"can_fly","quality_score":0.9}]}"#,
        )
        .unwrap();
        let snapshot = JsonFileStore::new(&path).load().unwrap();
        assert_eq!(snapshot.entities[0].category, "cat_animals");
        assert_eq!(snapshot.entities[0].feature("can_fly"), Some(AnswerValue::ProbablyNot));
        assert_eq!(snapshot.questions[0].quality, 0.9);
    }

    #[test]
    fn corrupt_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonFileStore::new(&path).load(), Err(StoreError::Json(_))));
    }
}
