use crate::host::{Geometry, HostError, Orientation, WindowId, WindowLayout};

/// 分割框架節點。 / One node of a tab's frame tree, sized in whole cells.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    width: u32,
    height: u32,
    kind: FrameKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FrameKind {
    Leaf(WindowId),
    Split(Orientation, Vec<Frame>),
}

impl Frame {
    fn leaf(win: WindowId, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            kind: FrameKind::Leaf(win),
        }
    }

    fn extent(&self, orientation: Orientation) -> u32 {
        match orientation {
            Orientation::Horizontal => self.width,
            Orientation::Vertical => self.height,
        }
    }

    fn set_extent(&mut self, orientation: Orientation, value: u32) {
        match orientation {
            Orientation::Horizontal => self.width = value,
            Orientation::Vertical => self.height = value,
        }
    }

    /// Smallest extent this frame can shrink to: one cell per window along the axis.
    fn min_extent(&self, orientation: Orientation) -> u32 {
        match &self.kind {
            FrameKind::Leaf(_) => 1,
            FrameKind::Split(split, children) if *split == orientation => {
                children.iter().map(|child| child.min_extent(orientation)).sum()
            }
            FrameKind::Split(_, children) => children
                .iter()
                .map(|child| child.min_extent(orientation))
                .max()
                .unwrap_or(1),
        }
    }

    /// Sets this frame's extent and propagates the change to its children. Growth goes to
    /// the last child; shrinking takes from the last children first.
    fn resize_to(&mut self, orientation: Orientation, value: u32) {
        let value = value.max(self.min_extent(orientation));
        let old = self.extent(orientation);
        self.set_extent(orientation, value);
        let FrameKind::Split(split, children) = &mut self.kind else {
            return;
        };
        if *split != orientation {
            for child in children.iter_mut() {
                child.resize_to(orientation, value);
            }
            return;
        }
        if value >= old {
            if let Some(last) = children.last_mut() {
                let extent = last.extent(orientation);
                last.resize_to(orientation, extent + (value - old));
            }
            return;
        }
        let mut excess = old - value;
        for child in children.iter_mut().rev() {
            if excess == 0 {
                break;
            }
            let extent = child.extent(orientation);
            let take = extent
                .saturating_sub(child.min_extent(orientation))
                .min(excess);
            if take > 0 {
                child.resize_to(orientation, extent - take);
                excess -= take;
            }
        }
    }

    fn to_layout(&self) -> WindowLayout {
        match &self.kind {
            FrameKind::Leaf(win) => WindowLayout::Leaf(*win),
            FrameKind::Split(Orientation::Horizontal, children) => {
                WindowLayout::Row(children.iter().map(Frame::to_layout).collect())
            }
            FrameKind::Split(Orientation::Vertical, children) => {
                WindowLayout::Col(children.iter().map(Frame::to_layout).collect())
            }
        }
    }

    fn find(&self, win: WindowId, path: &mut Vec<usize>) -> bool {
        match &self.kind {
            FrameKind::Leaf(id) => *id == win,
            FrameKind::Split(_, children) => {
                for (index, child) in children.iter().enumerate() {
                    path.push(index);
                    if child.find(win, path) {
                        return true;
                    }
                    path.pop();
                }
                false
            }
        }
    }
}

fn frame_at<'a>(mut frame: &'a Frame, path: &[usize]) -> Option<&'a Frame> {
    for &index in path {
        frame = match &frame.kind {
            FrameKind::Split(_, children) => children.get(index)?,
            FrameKind::Leaf(_) => return None,
        };
    }
    Some(frame)
}

fn frame_at_mut<'a>(mut frame: &'a mut Frame, path: &[usize]) -> Option<&'a mut Frame> {
    for &index in path {
        let current = frame;
        frame = match current.kind {
            FrameKind::Split(_, ref mut children) => children.get_mut(index)?,
            FrameKind::Leaf(_) => return None,
        };
    }
    Some(frame)
}

/// 單一分頁的分割視窗樹。 / Window split tree for a single tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SplitView {
    root: Frame,
}

impl SplitView {
    /// 以單一視窗建立。 / Creates a tree holding one window that fills `geometry`.
    pub(crate) fn new(win: WindowId, geometry: Geometry) -> Self {
        Self {
            root: Frame::leaf(win, geometry.width, geometry.height),
        }
    }

    pub(crate) fn layout(&self) -> WindowLayout {
        self.root.to_layout()
    }

    pub(crate) fn windows(&self) -> Vec<WindowId> {
        self.layout().windows()
    }

    pub(crate) fn contains(&self, win: WindowId) -> bool {
        self.path_to(win).is_some()
    }

    pub(crate) fn size_of(&self, win: WindowId) -> Option<Geometry> {
        let path = self.path_to(win)?;
        let frame = frame_at(&self.root, &path)?;
        Some(Geometry::new(frame.width, frame.height))
    }

    fn path_to(&self, win: WindowId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        self.root.find(win, &mut path).then_some(path)
    }

    /// 分割視窗，新視窗位於其後。 / Splits `win`, placing `new_win` right after it.
    ///
    /// When the parent already splits along `orientation` the new window joins it as a
    /// sibling; otherwise `win` is replaced by a new two-child split.
    pub(crate) fn split(
        &mut self,
        win: WindowId,
        orientation: Orientation,
        new_win: WindowId,
    ) -> Result<(), HostError> {
        let path = self.path_to(win).ok_or(HostError::NoSuchWindow(win))?;
        if let Some((&index, parent_path)) = path.split_last() {
            let parent =
                frame_at_mut(&mut self.root, parent_path).ok_or(HostError::NoSuchWindow(win))?;
            if let FrameKind::Split(split, children) = &mut parent.kind {
                if *split == orientation {
                    let leaf = children
                        .get_mut(index)
                        .ok_or(HostError::NoSuchWindow(win))?;
                    let extent = leaf.extent(orientation);
                    if extent < 2 {
                        return Err(HostError::NoRoom { window: win });
                    }
                    let half = extent / 2;
                    leaf.set_extent(orientation, extent - half);
                    let mut sibling = Frame::leaf(new_win, leaf.width, leaf.height);
                    sibling.set_extent(orientation, half);
                    children.insert(index + 1, sibling);
                    return Ok(());
                }
            }
        }

        let leaf = frame_at_mut(&mut self.root, &path).ok_or(HostError::NoSuchWindow(win))?;
        let extent = leaf.extent(orientation);
        if extent < 2 {
            return Err(HostError::NoRoom { window: win });
        }
        let half = extent / 2;
        let mut first = Frame::leaf(win, leaf.width, leaf.height);
        first.set_extent(orientation, extent - half);
        let mut second = Frame::leaf(new_win, leaf.width, leaf.height);
        second.set_extent(orientation, half);
        leaf.kind = FrameKind::Split(orientation, vec![first, second]);
        Ok(())
    }

    /// 調整視窗尺寸。 / Resizes the frame holding `win` along `orientation`.
    ///
    /// The frame resized is the child of the nearest ancestor splitting along
    /// `orientation`. Extra space is taken from the following siblings first, then the
    /// preceding ones; freed space goes to the next sibling (or the previous one for the
    /// last child). Requests are clamped to what the siblings can give up. A window with
    /// no such ancestor spans the whole axis and is left alone.
    pub(crate) fn resize(
        &mut self,
        win: WindowId,
        orientation: Orientation,
        size: u32,
    ) -> Result<(), HostError> {
        let path = self.path_to(win).ok_or(HostError::NoSuchWindow(win))?;
        let mut depth = path.len();
        let container_depth = loop {
            if depth == 0 {
                return Ok(());
            }
            depth -= 1;
            let ancestor = frame_at(&self.root, &path[..depth]).ok_or(HostError::NoSuchWindow(win))?;
            if matches!(&ancestor.kind, FrameKind::Split(split, _) if *split == orientation) {
                break depth;
            }
        };
        let index = path[container_depth];
        let container = frame_at_mut(&mut self.root, &path[..container_depth])
            .ok_or(HostError::NoSuchWindow(win))?;
        if let FrameKind::Split(_, children) = &mut container.kind {
            redistribute(children, index, orientation, size);
        }
        Ok(())
    }

    /// 只保留指定視窗。 / Keeps only `win`, returning the windows that were closed.
    pub(crate) fn only(&mut self, win: WindowId) -> Result<Vec<WindowId>, HostError> {
        if !self.contains(win) {
            return Err(HostError::NoSuchWindow(win));
        }
        let closed = self
            .windows()
            .into_iter()
            .filter(|id| *id != win)
            .collect();
        self.root = Frame::leaf(win, self.root.width, self.root.height);
        Ok(closed)
    }

    /// 配合顯示區尺寸調整。 / Fits the whole tree to a new display geometry.
    pub(crate) fn set_geometry(&mut self, geometry: Geometry) {
        self.root.resize_to(Orientation::Horizontal, geometry.width);
        self.root.resize_to(Orientation::Vertical, geometry.height);
    }
}

fn redistribute(children: &mut [Frame], index: usize, orientation: Orientation, size: u32) {
    let count = children.len();
    if index >= count {
        return;
    }
    let mut extents: Vec<u32> = children.iter().map(|c| c.extent(orientation)).collect();
    let mins: Vec<u32> = children.iter().map(|c| c.min_extent(orientation)).collect();
    let total: u32 = extents.iter().sum();
    let others_min: u32 = mins
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, min)| *min)
        .sum();
    let ceiling = total.saturating_sub(others_min).max(mins[index]);
    let target = size.clamp(mins[index], ceiling);
    let current = extents[index];

    if target > current {
        let mut need = target - current;
        let donors = (index + 1..count).chain((0..index).rev());
        for donor in donors {
            if need == 0 {
                break;
            }
            let take = (extents[donor] - mins[donor]).min(need);
            extents[donor] -= take;
            need -= take;
        }
        extents[index] = target - need;
    } else if target < current {
        let receiver = if index + 1 < count {
            index + 1
        } else if index > 0 {
            index - 1
        } else {
            return;
        };
        extents[receiver] += current - target;
        extents[index] = target;
    } else {
        return;
    }

    for (child, extent) in children.iter_mut().zip(extents) {
        child.resize_to(orientation, extent);
    }
}
