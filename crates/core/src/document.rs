use std::fs;
use std::io;
use std::path::Path;

use crate::host::{BufferId, BufferInfo, BufferKind, Mark, OptionMap, OptionValue};

/// 記憶體中的緩衝區。 / In-memory buffer held by [`crate::MemoryHost`].
#[derive(Debug, Clone)]
pub struct Buffer {
    id: BufferId,
    name: String,
    kind: BufferKind,
    listed: bool,
    loaded: bool,
    initialized: bool,
    lines: Vec<String>,
    options: OptionMap,
    last_edit: Mark,
}

impl Buffer {
    /// 建立尚未載入的具名緩衝區。 / Creates an unloaded buffer for `name`.
    pub fn named(id: BufferId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: BufferKind::Normal,
            listed: true,
            loaded: false,
            initialized: false,
            lines: Vec::new(),
            options: OptionMap::new(),
            last_edit: Mark::default(),
        }
    }

    /// 建立未命名的一般緩衝區。 / Creates an empty, listed, unnamed buffer.
    pub fn unnamed(id: BufferId) -> Self {
        Self {
            kind: BufferKind::Normal,
            listed: true,
            ..Self::scratch(id)
        }
    }

    /// 建立未命名的暫存緩衝區。 / Creates an empty, unlisted scratch buffer.
    pub fn scratch(id: BufferId) -> Self {
        Self {
            id,
            name: String::new(),
            kind: BufferKind::Scratch,
            listed: false,
            loaded: true,
            initialized: true,
            lines: vec![String::new()],
            options: OptionMap::new(),
            last_edit: Mark::default(),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: BufferKind) {
        self.kind = kind;
    }

    pub fn is_listed(&self) -> bool {
        self.listed
    }

    pub fn set_listed(&mut self, listed: bool) {
        self.listed = listed;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether full initialisation (filetype detection) has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn info(&self) -> BufferInfo {
        BufferInfo {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            listed: self.listed,
            loaded: self.loaded,
        }
    }

    /// 從磁碟讀入內容。 / Reads the backing file, normalising line endings.
    pub fn load(&mut self) -> io::Result<()> {
        let bytes = fs::read(Path::new(&self.name))?;
        let decoded = String::from_utf8_lossy(&bytes);
        let text = decoded.strip_prefix('\u{feff}').unwrap_or(decoded.as_ref());
        self.lines = split_lines(text);
        self.loaded = true;
        self.clamp_last_edit();
        Ok(())
    }

    /// 直接設定內容。 / Replaces the buffer contents and marks it loaded.
    pub fn set_lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines = lines.into_iter().map(Into::into).collect();
        if self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.loaded = true;
        self.clamp_last_edit();
    }

    /// Pulls a mark recorded before loading back inside the contents.
    fn clamp_last_edit(&mut self) {
        let line = self.last_edit.line.clamp(1, self.lines.len().max(1));
        let len = self.line_len(line).unwrap_or(0);
        self.last_edit = Mark::new(line, self.last_edit.column.min(len));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// True for an unnamed buffer holding nothing but one empty line.
    pub fn is_blank(&self) -> bool {
        self.name.is_empty() && self.lines.iter().all(|line| line.is_empty()) && self.lines.len() <= 1
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line_len(&self, line: usize) -> Option<usize> {
        line.checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(|text| text.chars().count())
    }

    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name)
    }

    pub fn set_option(&mut self, name: impl Into<String>, value: OptionValue) {
        self.options.insert(name.into(), value);
    }

    pub fn last_edit(&self) -> Mark {
        self.last_edit
    }

    pub fn set_last_edit(&mut self, mark: Mark) {
        self.last_edit = mark;
    }

    /// 完整初始化：偵測檔案類型。 / Full initialisation: detects the filetype unless one
    /// was already set.
    pub fn initialize(&mut self) {
        self.initialized = true;
        let has_filetype = matches!(
            self.options.get("filetype"),
            Some(OptionValue::String(value)) if !value.is_empty()
        );
        if !has_filetype {
            if let Some(filetype) = detect_filetype(&self.name) {
                self.options
                    .insert("filetype".into(), OptionValue::String(filetype.into()));
            }
        }
    }
}

/// 依副檔名判斷檔案類型。 / Maps a file extension to a filetype name.
pub fn detect_filetype(name: &str) -> Option<&'static str> {
    let extension = Path::new(name).extension()?.to_str()?;
    let filetype = match extension.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "md" | "markdown" => "markdown",
        "txt" => "text",
        "toml" => "toml",
        "json" => "json",
        "py" => "python",
        "lua" => "lua",
        "js" => "javascript",
        "ts" => "typescript",
        "c" | "h" => "c",
        _ => return None,
    };
    Some(filetype)
}

fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            }
            '\n' => lines.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
