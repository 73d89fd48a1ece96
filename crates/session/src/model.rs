use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sessionkit_core::{Geometry, Mark, OptionMap, Orientation};

use crate::error::SessionError;

/// Current session format version.
pub const SESSION_FORMAT_VERSION: u32 = 1;

/// The complete persisted session.
/// 描述一份完整的工作階段文件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub format_version: u32,
    #[serde(default)]
    pub metadata: SessionMetadata,
    #[serde(with = "crate::serde_path")]
    pub cwd: PathBuf,
    pub geometry: Geometry,
    #[serde(default)]
    pub options: OptionMap,
    pub tabs: Vec<TabRecord>,
    #[serde(default)]
    pub documents: Vec<DocumentRecord>,
    #[serde(default)]
    pub tab_scoped: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl SessionDocument {
    /// Creates a document with the current format version and empty contents.
    /// 建立採用最新格式版本的空白文件。
    pub fn new(cwd: PathBuf, geometry: Geometry) -> Self {
        Self {
            format_version: SESSION_FORMAT_VERSION,
            metadata: SessionMetadata::default(),
            cwd,
            geometry,
            options: OptionMap::new(),
            tabs: Vec::new(),
            documents: Vec::new(),
            tab_scoped: false,
            extensions: BTreeMap::new(),
        }
    }

    /// Checks the structural invariants the restore algorithm depends on.
    /// 檢查還原演算法所依賴的結構不變量。
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.format_version == 0 || self.format_version > SESSION_FORMAT_VERSION {
            return Err(SessionError::Structural(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.tabs.is_empty() {
            return Err(SessionError::Structural("session has no tabs".into()));
        }
        if self.tab_scoped {
            if self.tabs.len() != 1 {
                return Err(SessionError::Structural(format!(
                    "tab-scoped session holds {} tabs",
                    self.tabs.len()
                )));
            }
            if !self.options.is_empty() {
                return Err(SessionError::Structural(
                    "tab-scoped session carries global options".into(),
                ));
            }
        }
        for (index, tab) in self.tabs.iter().enumerate() {
            tab.layout
                .validate()
                .map_err(|reason| SessionError::Structural(format!("tab {}: {reason}", index + 1)))?;
        }
        Ok(())
    }

    /// Index of the tab that was focused at capture time.
    pub fn current_tab_index(&self) -> usize {
        self.tabs.iter().position(|tab| tab.current).unwrap_or(0)
    }

    /// Names of every document referenced by a leaf in any tab.
    pub fn referenced_documents(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for tab in &self.tabs {
            tab.layout.collect_documents(&mut names);
        }
        names
    }
}

/// Session-level metadata for diagnostics and compatibility checks.
/// 工作階段元資料，用於除錯與相容性檢測。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionMetadata {
    #[serde(default)]
    pub created_at_unix: Option<i64>,
    #[serde(default)]
    pub application_version: Option<String>,
}

/// A tab page: optional cwd override, tab options and the window layout.
/// 單一分頁：工作目錄、分頁選項與視窗配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabRecord {
    #[serde(
        default,
        with = "crate::serde_path::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub options: OptionMap,
    #[serde(default)]
    pub current: bool,
    pub layout: LayoutNode,
}

/// Saved state of one document.
/// 單一文件的保存狀態。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub name: String,
    #[serde(default)]
    pub loaded: bool,
    #[serde(default)]
    pub options: OptionMap,
    #[serde(default)]
    pub last_edit: Mark,
}

/// A node of the serialisable window layout.
/// 可序列化的視窗配置節點。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayoutNode {
    Split {
        orientation: Orientation,
        children: Vec<LayoutNode>,
        /// Extent of each child along `orientation`, in cells at capture time.
        sizes: Vec<u32>,
    },
    Leaf(LeafState),
}

impl LayoutNode {
    fn validate(&self) -> Result<(), String> {
        match self {
            LayoutNode::Leaf(_) => Ok(()),
            LayoutNode::Split {
                children, sizes, ..
            } => {
                if children.is_empty() {
                    return Err("split without children".into());
                }
                if sizes.len() != children.len() {
                    return Err(format!(
                        "split has {} children but {} sizes",
                        children.len(),
                        sizes.len()
                    ));
                }
                children.iter().try_for_each(LayoutNode::validate)
            }
        }
    }

    fn collect_documents(&self, names: &mut BTreeSet<String>) {
        match self {
            LayoutNode::Leaf(leaf) => {
                if let Some(name) = leaf.document.name() {
                    names.insert(name.to_string());
                }
            }
            LayoutNode::Split { children, .. } => {
                for child in children {
                    child.collect_documents(names);
                }
            }
        }
    }

    /// Leaves in depth-first order.
    pub fn leaves(&self) -> Vec<&LeafState> {
        match self {
            LayoutNode::Leaf(leaf) => vec![leaf],
            LayoutNode::Split { children, .. } => {
                children.iter().flat_map(LayoutNode::leaves).collect()
            }
        }
    }
}

/// Per-window view state stored in a layout leaf.
/// 視窗葉節點的檢視狀態。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LeafState {
    pub document: DocumentRef,
    #[serde(default)]
    pub cursor: Mark,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folds: Vec<usize>,
    #[serde(default)]
    pub current: bool,
    #[serde(default, skip_serializing_if = "OptionMap::is_empty")]
    pub options: OptionMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<ExtensionWindow>,
}

/// Reference from a leaf to a document, by identifier.
///
/// Serialised as the document name; the empty string marks a window whose document was
/// not eligible for capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum DocumentRef {
    Document(String),
    #[default]
    Unsupported,
}

impl DocumentRef {
    pub fn name(&self) -> Option<&str> {
        match self {
            DocumentRef::Document(name) => Some(name),
            DocumentRef::Unsupported => None,
        }
    }
}

impl From<String> for DocumentRef {
    fn from(value: String) -> Self {
        if value.is_empty() {
            DocumentRef::Unsupported
        } else {
            DocumentRef::Document(value)
        }
    }
}

impl From<DocumentRef> for String {
    fn from(value: DocumentRef) -> Self {
        match value {
            DocumentRef::Document(name) => name,
            DocumentRef::Unsupported => String::new(),
        }
    }
}

/// Window state owned by an extension rather than a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionWindow {
    pub extension: String,
    pub data: serde_json::Value,
}
