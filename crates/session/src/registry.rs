//! Document capture and re-materialisation.
//! 文件登錄：擷取與重新建立文件。

use std::collections::HashMap;

use log::{debug, warn};
use sessionkit_core::{clamp_mark, BufferId, BufferKind, Host, HostError, NotifyLevel, OptionTarget};

use crate::error::SessionError;
use crate::model::DocumentRecord;
use crate::options::{apply_options, capture_options};

/// Decides which documents take part in a session.
pub type BufferFilter = Box<dyn Fn(&dyn Host, BufferId) -> bool>;

/// 預設文件篩選。 / Help documents are kept; other special kinds and unnamed documents
/// are dropped; everything else is kept when listed.
pub fn default_buffer_filter(host: &dyn Host, buf: BufferId) -> bool {
    let Ok(info) = host.buffer_info(buf) else {
        return false;
    };
    match info.kind {
        BufferKind::Help => true,
        BufferKind::Normal => !info.name.is_empty() && info.listed,
        BufferKind::Scratch | BufferKind::Terminal => false,
    }
}

/// Snapshots every document `filter` accepts, in host order.
/// 依主機順序擷取所有通過篩選的文件。
pub fn capture_documents(
    host: &dyn Host,
    filter: &dyn Fn(&dyn Host, BufferId) -> bool,
    options: &[String],
) -> Result<Vec<DocumentRecord>, SessionError> {
    let mut records = Vec::new();
    for buf in host.list_buffers() {
        if !filter(host, buf) {
            continue;
        }
        let info = host.buffer_info(buf)?;
        records.push(DocumentRecord {
            name: info.name,
            loaded: info.loaded,
            options: capture_options(host, options, OptionTarget::Buffer(buf)),
            last_edit: host.last_edit_mark(buf)?,
        });
    }
    Ok(records)
}

/// Result of [`materialize_documents`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Materialized {
    /// Identifier to live handle, for leaf binding.
    pub documents: HashMap<String, BufferId>,
    /// Identifiers that could not be opened.
    pub skipped: Vec<String>,
}

/// 重新建立文件。 / Recreates or attaches every recorded document.
///
/// Loaded documents are read eagerly but their full initialisation is deferred until they
/// are first displayed. Options and the last-edit mark are applied right away; the mark of
/// an unloaded document is kept as recorded until the document is read. A document
/// that cannot be read is dropped again and listed in [`Materialized::skipped`].
pub fn materialize_documents(
    host: &mut dyn Host,
    records: &[DocumentRecord],
) -> Result<Materialized, SessionError> {
    let known = host.list_buffers();
    let mut result = Materialized::default();
    for record in records {
        if record.name.is_empty() {
            debug!("skipping unnamed document record");
            continue;
        }
        let buf = host.find_or_create_buffer(&record.name)?;
        if record.loaded && !host.buffer_info(buf)?.loaded {
            match host.load_buffer(buf) {
                Ok(()) => {}
                Err(err @ HostError::Unreadable { .. }) => {
                    let message = format!("skipping session document {}: {err}", record.name);
                    warn!("{message}");
                    host.notify(NotifyLevel::Warn, &message);
                    if !known.contains(&buf) {
                        if let Err(err) = host.delete_buffer(buf) {
                            debug!("could not drop {buf}: {err}");
                        }
                    }
                    result.skipped.push(record.name.clone());
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
        if record.loaded {
            host.defer_until_displayed(buf)?;
        }
        apply_options(host, OptionTarget::Buffer(buf), &record.options);
        // an unloaded buffer has no contents to clamp against yet; the host clamps on load
        let mark = if host.buffer_info(buf)?.loaded {
            clamp_mark(&*host, buf, record.last_edit)?
        } else {
            record.last_edit
        };
        host.set_last_edit_mark(buf, mark)?;
        result.documents.insert(record.name.clone(), buf);
    }
    Ok(result)
}
