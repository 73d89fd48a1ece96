use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::error::SessionError;
use crate::model::SessionDocument;
use crate::util::write_atomic;

const SESSION_EXTENSION: &str = "json";

/// One row of a detailed listing.
/// 詳細列表中的一筆工作階段摘要。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub name: String,
    pub tab_scoped: bool,
    pub cwd: PathBuf,
    pub tab_count: usize,
}

/// Name-addressed session files inside one directory.
/// 以名稱定址、每個工作階段一個檔案的存放區。
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolves the file backing `name`. Path separators and `:` are replaced by `_` so
    /// a name can never escape the directory.
    /// 取得名稱對應的檔案路徑。
    pub fn path_for(&self, name: &str) -> Result<PathBuf, SessionError> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
            return Err(SessionError::InvalidName(name.to_string()));
        }
        let escaped: String = trimmed
            .chars()
            .map(|ch| match ch {
                '/' | '\\' | ':' => '_',
                other => other,
            })
            .collect();
        Ok(self.dir.join(format!("{escaped}.{SESSION_EXTENSION}")))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|path| path.is_file()).unwrap_or(false)
    }

    /// Reads and validates a session.
    /// 讀取並驗證工作階段。
    pub fn read(&self, name: &str) -> Result<SessionDocument, SessionError> {
        let path = self.path_for(name)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SessionError::NotFound {
                    name: name.to_string(),
                    path,
                })
            }
            Err(source) => return Err(SessionError::Io { path, source }),
        };
        let document: SessionDocument = serde_json::from_str(&contents)
            .map_err(|source| SessionError::InvalidPayload {
                path: path.clone(),
                source,
            })?;
        document.validate()?;
        debug!("read session {name} from {}", path.display());
        Ok(document)
    }

    /// Persists `document` with an atomic write, stamping the creation time when unset.
    /// 以原子寫入方式儲存工作階段。
    pub fn write(&self, name: &str, document: &SessionDocument) -> Result<PathBuf, SessionError> {
        let path = self.path_for(name)?;
        let mut payload = document.clone();
        if payload.metadata.created_at_unix.is_none() {
            payload.metadata.created_at_unix = Some(current_timestamp());
        }
        let json = serde_json::to_vec_pretty(&payload).map_err(|source| {
            SessionError::InvalidPayload {
                path: path.clone(),
                source,
            }
        })?;
        write_atomic(&path, &json).map_err(|source| SessionError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("wrote session {name} to {}", path.display());
        Ok(path)
    }

    pub fn remove(&self, name: &str) -> Result<PathBuf, SessionError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(path),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(SessionError::NotFound {
                name: name.to_string(),
                path,
            }),
            Err(source) => Err(SessionError::Io { path, source }),
        }
    }

    /// Sorted names of every stored session. A missing directory lists nothing.
    /// 列出所有工作階段名稱（已排序）。
    pub fn list(&self) -> Result<Vec<String>, SessionError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SessionError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(SESSION_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Lists sessions with a short summary each; unreadable files are skipped.
    pub fn list_detailed(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let mut summaries = Vec::new();
        for name in self.list()? {
            match self.read(&name) {
                Ok(document) => summaries.push(SessionSummary {
                    tab_count: document.tabs.len(),
                    tab_scoped: document.tab_scoped,
                    cwd: document.cwd,
                    name,
                }),
                Err(err) => warn!("skipping unreadable session {name}: {err}"),
            }
        }
        Ok(summaries)
    }
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentRef, LayoutNode, LeafState, TabRecord};
    use sessionkit_core::{Geometry, OptionMap};
    use tempfile::tempdir;

    fn sample(cwd: &Path) -> SessionDocument {
        let mut document = SessionDocument::new(cwd.to_path_buf(), Geometry::new(100, 30));
        document.tabs.push(TabRecord {
            cwd: None,
            options: OptionMap::new(),
            current: true,
            layout: LayoutNode::Leaf(LeafState {
                document: DocumentRef::Document(cwd.join("a.txt").to_string_lossy().into()),
                current: true,
                ..LeafState::default()
            }),
        });
        document
    }

    #[test]
    fn write_then_read_stamps_creation_time() {
        let tmp = tempdir().unwrap();
        let store = SessionStore::new(tmp.path().join("session"));
        let document = sample(tmp.path());

        let path = store.write("work", &document).unwrap();
        assert!(path.ends_with("work.json"));
        assert!(!path.with_extension("tmp").exists());

        let loaded = store.read("work").unwrap();
        assert!(loaded.metadata.created_at_unix.is_some());
        assert_eq!(loaded.tabs, document.tabs);
        assert_eq!(loaded.cwd, document.cwd);
    }

    #[test]
    fn names_are_escaped_and_empty_names_rejected() {
        let store = SessionStore::new("/sessions");
        assert_eq!(
            store.path_for("a/b\\c:d").unwrap(),
            PathBuf::from("/sessions/a_b_c_d.json")
        );
        assert!(matches!(
            store.path_for("  "),
            Err(SessionError::InvalidName(_))
        ));
    }

    #[test]
    fn missing_session_is_not_found() {
        let tmp = tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        assert!(store.read("foo").unwrap_err().is_not_found());
        assert!(store.remove("foo").unwrap_err().is_not_found());
        assert!(!store.exists("foo"));
    }

    #[test]
    fn corrupt_payload_is_reported() {
        let tmp = tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        fs::write(tmp.path().join("bad.json"), "{ not json").unwrap();
        assert!(matches!(
            store.read("bad"),
            Err(SessionError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn list_is_sorted_and_detailed_skips_unreadable() {
        let tmp = tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        assert!(SessionStore::new(tmp.path().join("absent")).list().unwrap().is_empty());

        store.write("zeta", &sample(tmp.path())).unwrap();
        store.write("alpha", &sample(tmp.path())).unwrap();
        fs::write(tmp.path().join("broken.json"), "[]").unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.list().unwrap(), vec!["alpha", "broken", "zeta"]);
        let detailed = store.list_detailed().unwrap();
        let names: Vec<_> = detailed.iter().map(|summary| summary.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(detailed[0].tab_count, 1);
        assert!(!detailed[0].tab_scoped);
    }

    #[test]
    fn remove_deletes_file() {
        let tmp = tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        store.write("gone", &sample(tmp.path())).unwrap();
        assert!(store.exists("gone"));
        store.remove("gone").unwrap();
        assert!(!store.exists("gone"));
    }
}
