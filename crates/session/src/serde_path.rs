//! Path fields in session files.
//!
//! UTF-8 paths are stored as plain strings. Anything else is stored as `b64:` followed by
//! the base64 of the platform's raw path bytes (UTF-16LE code units on Windows).
//! 路徑欄位：UTF-8 以字串保存，其餘以 base64 保存。

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

const B64_PREFIX: &str = "b64:";

pub fn serialize<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&to_text(path))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
    let text = String::deserialize(deserializer)?;
    from_text(&text).map_err(serde::de::Error::custom)
}

/// Same encoding for optional paths; `None` stays `null`.
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<PathBuf>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(path) => serializer.serialize_some(&to_text(path)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<PathBuf>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| from_text(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

fn to_text(path: &Path) -> String {
    match path.to_str() {
        Some(text) if !text.starts_with(B64_PREFIX) => text.to_string(),
        _ => format!("{B64_PREFIX}{}", BASE64.encode(raw::to_bytes(path))),
    }
}

fn from_text(text: &str) -> Result<PathBuf, String> {
    let Some(encoded) = text.strip_prefix(B64_PREFIX) else {
        return Ok(PathBuf::from(text));
    };
    let bytes = BASE64
        .decode(encoded)
        .map_err(|err| format!("invalid base64 path {text:?}: {err}"))?;
    raw::from_bytes(bytes)
}

#[cfg(unix)]
mod raw {
    use std::ffi::OsString;
    use std::os::unix::ffi::{OsStrExt, OsStringExt};
    use std::path::{Path, PathBuf};

    pub fn to_bytes(path: &Path) -> Vec<u8> {
        path.as_os_str().as_bytes().to_vec()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<PathBuf, String> {
        Ok(PathBuf::from(OsString::from_vec(bytes)))
    }
}

#[cfg(windows)]
mod raw {
    use std::ffi::OsString;
    use std::os::windows::ffi::{OsStrExt, OsStringExt};
    use std::path::{Path, PathBuf};

    pub fn to_bytes(path: &Path) -> Vec<u8> {
        path.as_os_str()
            .encode_wide()
            .flat_map(u16::to_le_bytes)
            .collect()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<PathBuf, String> {
        if bytes.len() % 2 != 0 {
            return Err("odd byte count in encoded path".to_string());
        }
        let wide: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(PathBuf::from(OsString::from_wide(&wide)))
    }
}
