//! # Frame Filters
//!
//! Selects the frames a link endpoint cares about.

use shared_types::entities::{LinkHandle, Role};
use shared_types::frames::Frame;

/// Filter applied to every frame a subscription sees.
///
/// Link-scoped frames match on handle. Dispositions carry no handle, so an
/// endpoint opts in to them by naming the role of the remote endpoint that
/// settles its deliveries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameFilter {
    /// Handles to include. Empty means every link.
    pub handles: Vec<LinkHandle>,
    /// Dispositions emitted with this role. `None` excludes dispositions
    /// unless `handles` is empty.
    pub dispositions: Option<Role>,
}

impl FrameFilter {
    /// Accept every frame.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Frames of a single link, no dispositions.
    #[must_use]
    pub fn link(handle: LinkHandle) -> Self {
        Self {
            handles: vec![handle],
            dispositions: None,
        }
    }

    /// Frames of a single link plus dispositions sent by the given role.
    #[must_use]
    pub fn link_with_dispositions(handle: LinkHandle, role: Role) -> Self {
        Self {
            handles: vec![handle],
            dispositions: Some(role),
        }
    }

    /// Check if a frame matches this filter.
    #[must_use]
    pub fn matches(&self, frame: &Frame) -> bool {
        match frame {
            Frame::Disposition(disposition) => match self.dispositions {
                Some(role) => disposition.role == role,
                None => self.handles.is_empty(),
            },
            other => match other.handle() {
                Some(handle) => self.handles.is_empty() || self.handles.contains(&handle),
                None => false,
            },
        }
    }
}
