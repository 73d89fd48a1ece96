//! Layout codec: converts a tab's live window tree to a [`LayoutNode`] and back.
//! 視窗配置編解碼。

use std::collections::HashMap;

use log::{debug, warn};
use serde_json::Value;
use sessionkit_core::{
    clamp_mark, BufferId, Geometry, Host, HostError, NotifyLevel, OptionTarget, Orientation,
    TabId, WindowId, WindowLayout,
};

use crate::error::SessionError;
use crate::extension::ExtensionRegistry;
use crate::model::{DocumentRef, LayoutNode, LeafState};
use crate::options::{apply_options, capture_options};

/// Ratio between the current display and the recorded one.
/// 目前顯示區與紀錄尺寸之比例。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub width: f64,
    pub height: f64,
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ScaleFactors {
    pub const IDENTITY: ScaleFactors = ScaleFactors {
        width: 1.0,
        height: 1.0,
    };

    /// A zero recorded dimension yields a factor of 1 for that axis.
    pub fn between(recorded: Geometry, current: Geometry) -> Self {
        fn ratio(recorded: u32, current: u32) -> f64 {
            if recorded == 0 {
                1.0
            } else {
                f64::from(current) / f64::from(recorded)
            }
        }
        Self {
            width: ratio(recorded.width, current.width),
            height: ratio(recorded.height, current.height),
        }
    }

    /// Scales a recorded extent along `orientation`, rounding and never going below 1.
    pub fn scale(&self, size: u32, orientation: Orientation) -> u32 {
        let factor = match orientation {
            Orientation::Horizontal => self.width,
            Orientation::Vertical => self.height,
        };
        let scaled = (f64::from(size) * factor).round();
        if scaled < 1.0 {
            1
        } else if scaled >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            scaled as u32
        }
    }
}

/// Inputs for [`capture_layout`].
pub struct CaptureContext<'a> {
    pub filter: &'a dyn Fn(&dyn Host, BufferId) -> bool,
    /// Option names to snapshot; only window-scoped ones are kept per leaf.
    pub options: &'a [String],
    pub extensions: &'a mut ExtensionRegistry,
}

/// Inputs for [`restore_layout`].
pub struct RestoreContext<'a> {
    pub documents: &'a HashMap<String, BufferId>,
    pub scale: ScaleFactors,
    pub extensions: &'a mut ExtensionRegistry,
}

/// 擷取分頁配置。 / Captures the window tree of `tab`.
///
/// Rows become horizontal splits and columns vertical ones; each child's recorded size is
/// its extent along the split axis. A single window produces a bare leaf.
pub fn capture_layout(
    host: &dyn Host,
    tab: TabId,
    current_window: WindowId,
    ctx: &mut CaptureContext<'_>,
) -> Result<LayoutNode, SessionError> {
    let layout = host.window_layout(tab)?;
    capture_node(host, &layout, current_window, ctx)
}

fn capture_node(
    host: &dyn Host,
    layout: &WindowLayout,
    current_window: WindowId,
    ctx: &mut CaptureContext<'_>,
) -> Result<LayoutNode, SessionError> {
    let (orientation, children) = match layout {
        WindowLayout::Leaf(win) => return capture_leaf(host, *win, current_window, ctx),
        WindowLayout::Row(children) => (Orientation::Horizontal, children),
        WindowLayout::Col(children) => (Orientation::Vertical, children),
    };
    let mut nodes = Vec::with_capacity(children.len());
    let mut sizes = Vec::with_capacity(children.len());
    for child in children {
        sizes.push(extent(host, child, orientation)?);
        nodes.push(capture_node(host, child, current_window, ctx)?);
    }
    Ok(LayoutNode::Split {
        orientation,
        children: nodes,
        sizes,
    })
}

/// Extent of a subtree along `orientation`.
fn extent(host: &dyn Host, layout: &WindowLayout, orientation: Orientation) -> Result<u32, HostError> {
    let (along, children) = match layout {
        WindowLayout::Leaf(win) => return Ok(host.window_size(*win)?.extent(orientation)),
        WindowLayout::Row(children) => (Orientation::Horizontal, children),
        WindowLayout::Col(children) => (Orientation::Vertical, children),
    };
    if along == orientation {
        let mut total = 0u32;
        for child in children {
            total = total.saturating_add(extent(host, child, orientation)?);
        }
        Ok(total)
    } else {
        match children.first() {
            Some(first) => extent(host, first, orientation),
            None => Ok(0),
        }
    }
}

fn capture_leaf(
    host: &dyn Host,
    win: WindowId,
    current_window: WindowId,
    ctx: &mut CaptureContext<'_>,
) -> Result<LayoutNode, SessionError> {
    let buf = host.window_buffer(win)?;
    let info = host.buffer_info(buf)?;
    let mut leaf = LeafState {
        document: DocumentRef::Unsupported,
        cursor: host.cursor(win)?,
        folds: host.window_folds(win)?,
        current: win == current_window,
        options: capture_options(host, ctx.options, OptionTarget::Window(win)),
        extension: None,
    };
    if !info.name.is_empty() && (ctx.filter)(host, buf) {
        leaf.document = DocumentRef::Document(info.name);
    } else if let Some(window) = ctx.extensions.save_window(host, win) {
        debug!("{win} claimed by extension {}", window.extension);
        leaf.extension = Some(window);
    }
    Ok(LayoutNode::Leaf(leaf))
}

/// 還原分頁配置。 / Rebuilds `root` starting from `window`, which becomes the first
/// leaf.
///
/// Split children are created in order by splitting the previously created window, which
/// is then resized to its scaled recorded size before the next split. The last child keeps
/// whatever space remains. When the host runs out of room the remaining siblings are dropped.
/// Returns the window whose leaf was recorded as current, first found wins.
pub fn restore_layout(
    host: &mut dyn Host,
    root: &LayoutNode,
    window: WindowId,
    ctx: &mut RestoreContext<'_>,
) -> Result<Option<WindowId>, SessionError> {
    let (orientation, children, sizes) = match root {
        LayoutNode::Leaf(leaf) => return restore_leaf(host, leaf, window, ctx),
        LayoutNode::Split {
            orientation,
            children,
            sizes,
        } => (*orientation, children, sizes),
    };

    let mut windows = Vec::with_capacity(children.len());
    windows.push(window);
    for size in sizes.iter().take(children.len().saturating_sub(1)) {
        let previous = windows[windows.len() - 1];
        match host.split_window(previous, orientation) {
            Ok(created) => windows.push(created),
            Err(HostError::NoRoom { .. }) => {
                let message = format!(
                    "no room to restore {} of {} {} windows",
                    children.len() - windows.len(),
                    children.len(),
                    orientation.as_str()
                );
                warn!("{message}");
                host.notify(NotifyLevel::Warn, &message);
                break;
            }
            Err(err) => return Err(err.into()),
        }
        // size the previous window now so the rest of the space stays with the new one
        host.resize_window(previous, orientation, ctx.scale.scale(*size, orientation))?;
    }

    let mut current = None;
    for (child, win) in children.iter().zip(windows) {
        let found = restore_layout(host, child, win, ctx)?;
        current = current.or(found);
    }
    Ok(current)
}

fn restore_leaf(
    host: &mut dyn Host,
    leaf: &LeafState,
    win: WindowId,
    ctx: &mut RestoreContext<'_>,
) -> Result<Option<WindowId>, SessionError> {
    let bound = match &leaf.extension {
        Some(window) => ctx.extensions.load_window(host, win, window),
        None => bind_document(host, leaf, win, ctx.documents)?,
    };
    if !bound {
        show_placeholder(host, win)?;
    }
    apply_options(host, OptionTarget::Window(win), &leaf.options);
    Ok(leaf.current.then_some(win))
}

/// Binds the leaf's document to `win`. Returns `false` when there is nothing to bind.
fn bind_document(
    host: &mut dyn Host,
    leaf: &LeafState,
    win: WindowId,
    documents: &HashMap<String, BufferId>,
) -> Result<bool, SessionError> {
    let Some(name) = leaf.document.name() else {
        return Ok(false);
    };
    let Some(&buf) = documents.get(name) else {
        warn!("document {name} was not restored; leaving {win} empty");
        return Ok(false);
    };
    if !host.buffer_info(buf)?.loaded {
        if let Err(err) = host.load_buffer(buf) {
            warn!("cannot show {name} in {win}: {err}");
            return Ok(false);
        }
        host.defer_until_displayed(buf)?;
    }
    host.set_window_buffer(win, buf)?;
    let cursor = clamp_mark(&*host, buf, leaf.cursor)?;
    host.set_cursor(win, cursor)?;
    host.set_window_folds(win, leaf.folds.clone())?;
    Ok(true)
}

fn show_placeholder(host: &mut dyn Host, win: WindowId) -> Result<(), SessionError> {
    let placeholder = host.find_or_create_buffer("")?;
    if let Err(err) = host.set_option(
        OptionTarget::Buffer(placeholder),
        "bufhidden",
        Value::from("wipe"),
    ) {
        debug!("placeholder keeps default bufhidden: {err}");
    }
    host.set_window_buffer(win, placeholder)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionkit_core::{DocumentHost, Mark, MemoryHost, WindowHost};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn capture(host: &MemoryHost, extensions: &mut ExtensionRegistry) -> LayoutNode {
        let options = vec!["wrap".to_string()];
        let mut ctx = CaptureContext {
            filter: &crate::registry::default_buffer_filter,
            options: &options,
            extensions,
        };
        let tab = host.current_tab();
        capture_layout(host, tab, host.current_window(), &mut ctx).unwrap()
    }

    fn write(dir: &Path, name: &str, text: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn scale_factors_handle_zero_and_rounding() {
        let factors = ScaleFactors::between(Geometry::new(100, 0), Geometry::new(200, 40));
        assert_eq!(factors.width, 2.0);
        assert_eq!(factors.height, 1.0);
        assert_eq!(factors.scale(60, Orientation::Horizontal), 120);
        assert_eq!(factors.scale(7, Orientation::Vertical), 7);

        let shrink = ScaleFactors::between(Geometry::new(100, 30), Geometry::new(10, 30));
        assert_eq!(shrink.scale(4, Orientation::Horizontal), 1);
        assert_eq!(shrink.scale(25, Orientation::Horizontal), 3);
    }

    #[test]
    fn capture_records_extents_along_each_axis() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "alpha\n");
        let b = write(dir.path(), "b.txt", "beta\n");
        let mut host = MemoryHost::new(Geometry::new(100, 30), dir.path());
        let left = host.current_window();
        host.edit(left, &a).unwrap();
        let right = host.split_window(left, Orientation::Horizontal).unwrap();
        host.edit(right, &b).unwrap();
        host.resize_window(left, Orientation::Horizontal, 60).unwrap();
        let lower = host.split_window(right, Orientation::Vertical).unwrap();
        host.set_current_window(lower).unwrap();

        let node = capture(&host, &mut ExtensionRegistry::default());
        let LayoutNode::Split {
            orientation,
            children,
            sizes,
        } = &node
        else {
            panic!("expected split, got {node:?}");
        };
        assert_eq!(*orientation, Orientation::Horizontal);
        assert_eq!(sizes, &vec![60, 40]);
        match &children[1] {
            LayoutNode::Split {
                orientation, sizes, ..
            } => {
                assert_eq!(*orientation, Orientation::Vertical);
                assert_eq!(sizes, &vec![15, 15]);
            }
            other => panic!("expected nested split, got {other:?}"),
        }
        let leaves = node.leaves();
        assert_eq!(leaves[0].document, DocumentRef::Document(a));
        assert_eq!(leaves[1].document, DocumentRef::Document(b.clone()));
        assert_eq!(leaves[2].document, DocumentRef::Document(b));
        assert!(leaves[2].current);
        assert!(!leaves[0].current);
    }

    #[test]
    fn unnamed_window_captures_as_unsupported_leaf() {
        let host = MemoryHost::new(Geometry::new(80, 24), "/work");
        let node = capture(&host, &mut ExtensionRegistry::default());
        match node {
            LayoutNode::Leaf(leaf) => {
                assert_eq!(leaf.document, DocumentRef::Unsupported);
                assert!(leaf.current);
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn restore_applies_sizes_sequentially_and_finds_current() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "one\ntwo\nthree\n");
        let mut host = MemoryHost::new(Geometry::new(200, 30), dir.path());
        let buf = host.find_or_create_buffer(&a).unwrap();
        host.load_buffer(buf).unwrap();
        let mut documents = HashMap::new();
        documents.insert(a.clone(), buf);

        let leaf = |current: bool, cursor: Mark| {
            LayoutNode::Leaf(LeafState {
                document: DocumentRef::Document(a.clone()),
                cursor,
                current,
                ..LeafState::default()
            })
        };
        let root = LayoutNode::Split {
            orientation: Orientation::Horizontal,
            children: vec![
                leaf(false, Mark::new(2, 1)),
                leaf(true, Mark::new(99, 99)),
                LayoutNode::Leaf(LeafState::default()),
            ],
            sizes: vec![50, 30, 20],
        };
        let mut extensions = ExtensionRegistry::default();
        let mut ctx = RestoreContext {
            documents: &documents,
            scale: ScaleFactors::between(Geometry::new(100, 30), Geometry::new(200, 30)),
            extensions: &mut extensions,
        };
        let start = host.current_window();
        let current = restore_layout(&mut host, &root, start, &mut ctx).unwrap();

        let windows = host.window_layout(host.current_tab()).unwrap().windows();
        assert_eq!(windows.len(), 3);
        let widths: Vec<u32> = windows
            .iter()
            .map(|win| host.window_size(*win).unwrap().width)
            .collect();
        assert_eq!(widths, vec![100, 60, 40]);
        assert_eq!(current, Some(windows[1]));
        assert_eq!(host.cursor(windows[0]).unwrap(), Mark::new(2, 1));
        assert_eq!(host.cursor(windows[1]).unwrap(), Mark::new(3, 5));
        let placeholder = host.window_buffer(windows[2]).unwrap();
        assert!(host.buffer(placeholder).unwrap().is_blank());
    }

    #[test]
    fn restore_without_room_keeps_created_windows() {
        let mut host = MemoryHost::new(Geometry::new(3, 10), "/work");
        let documents = HashMap::new();
        let mut extensions = ExtensionRegistry::default();
        let mut ctx = RestoreContext {
            documents: &documents,
            scale: ScaleFactors::IDENTITY,
            extensions: &mut extensions,
        };
        let root = LayoutNode::Split {
            orientation: Orientation::Horizontal,
            children: vec![LayoutNode::Leaf(LeafState::default()); 5],
            sizes: vec![1; 5],
        };
        let start = host.current_window();
        restore_layout(&mut host, &root, start, &mut ctx).unwrap();
        let windows = host.window_layout(host.current_tab()).unwrap().windows();
        assert!(windows.len() < 5);
        assert!(!host.notifications().is_empty());
    }
}
