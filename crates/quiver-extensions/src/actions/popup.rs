//! Action popups
//!
//! Geometry, popup page resolution, navigation rules and the tracker that
//! decides which popups a close request may dismiss.

use crate::host::{HostResult, WindowId};
use async_trait::async_trait;
use quiver_core::types::Manifest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path};
use std::time::{Duration, Instant};
use url::Url;
use walkdir::WalkDir;

pub const MIN_POPUP_WIDTH: i32 = 25;
pub const MIN_POPUP_HEIGHT: i32 = 25;
pub const MAX_POPUP_WIDTH: i32 = 800;
pub const MAX_POPUP_HEIGHT: i32 = 600;

/// Size used until the popup page reports its own
pub const DEFAULT_POPUP_SIZE: (i32, i32) = (320, 480);

/// Non-forced close requests leave younger popups open
pub const STABILIZATION_WINDOW: Duration = Duration::from_secs(2);

/// Popup pages tried when the manifest does not name an existing one
pub const POPUP_CANDIDATES: &[&str] = &[
    "popup.html",
    "popup/index.html",
    "popup/popup.html",
    "html/popup.html",
    "ui/popup.html",
    "src/popup.html",
    "index.html",
];

const POPUP_SEARCH_DEPTH: usize = 2;

/// Rectangle in window coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

/// Places a popup under its toolbar anchor
///
/// The popup hangs below the anchor, right-aligned to it, and is kept inside
/// the window. Size requests are clamped; the origin always follows the
/// anchor, so page-driven resizes cannot move the popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupGeometry {
    anchor: Rect,
    window: Rect,
}

impl PopupGeometry {
    pub fn new(anchor: Rect, window: Rect) -> Self {
        Self { anchor, window }
    }

    pub fn clamp_size(width: i32, height: i32) -> (i32, i32) {
        (
            width.clamp(MIN_POPUP_WIDTH, MAX_POPUP_WIDTH),
            height.clamp(MIN_POPUP_HEIGHT, MAX_POPUP_HEIGHT),
        )
    }

    /// Bounds for a popup of the requested size
    pub fn place(&self, width: i32, height: i32) -> Rect {
        let (width, height) = Self::clamp_size(width, height);

        let mut x = self.anchor.right() - width;
        let max_x = self.window.right() - width;
        if x > max_x {
            x = max_x;
        }
        if x < self.window.x {
            x = self.window.x;
        }

        let mut y = self.anchor.bottom();
        let max_y = self.window.bottom() - height;
        if y > max_y {
            y = max_y;
        }
        if y < self.window.y {
            y = self.window.y;
        }

        Rect::new(x, y, width, height)
    }

    /// Bounds override applied to every resize the popup asks for
    pub fn override_bounds(&self, requested: Rect) -> Rect {
        self.place(requested.width, requested.height)
    }
}

/// Strip `./` and leading slashes; reject anything escaping the package
fn normalize_relative(raw: &str) -> Option<String> {
    let trimmed = raw.trim().split(['?', '#']).next().unwrap_or_default();
    let trimmed = trimmed.trim_start_matches("./").trim_start_matches('/');
    if trimmed.is_empty() || trimmed.contains("://") || trimmed.contains('\\') {
        return None;
    }
    let path = Path::new(trimmed);
    if !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Relative path of the popup page to open, if any
///
/// Order: the manifest's `default_popup`, the well-known candidates, then
/// any `*popup*.html` within two directory levels.
pub fn resolve_popup_path(root: &Path, manifest: &Manifest) -> Option<String> {
    if let Some(declared) = manifest.default_popup().and_then(normalize_relative) {
        if root.join(&declared).is_file() {
            return Some(declared);
        }
    }

    if let Some(candidate) = POPUP_CANDIDATES
        .iter()
        .find(|candidate| root.join(candidate).is_file())
    {
        return Some((*candidate).to_string());
    }

    WalkDir::new(root)
        .max_depth(POPUP_SEARCH_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| {
            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            name.contains("popup") && name.ends_with(".html")
        })
        .and_then(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
}

/// Where a navigation from inside a popup may go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Stay in the popup (same extension origin)
    Allow,
    /// Open in a regular browser tab instead
    OpenInTab(Url),
    Deny,
}

/// Keeps popup contents on their extension origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationGuard {
    origin: String,
}

impl NavigationGuard {
    pub fn new(scheme: &str, host_id: &str) -> Self {
        Self {
            origin: format!("{}://{}", scheme, host_id),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn decide(&self, target: &str) -> NavigationDecision {
        let Ok(url) = Url::parse(target) else {
            return NavigationDecision::Deny;
        };
        match url.scheme() {
            "http" | "https" => NavigationDecision::OpenInTab(url),
            _ if target.starts_with(&format!("{}/", self.origin)) => NavigationDecision::Allow,
            _ => NavigationDecision::Deny,
        }
    }
}

/// Identifier handed out by the popup window implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopupId(pub u64);

/// Everything needed to open one popup
#[derive(Debug, Clone)]
pub struct PopupRequest {
    pub window: WindowId,
    pub extension_id: String,
    pub url: Url,
    pub bounds: Rect,
    /// Apply to every resize the page requests
    pub geometry: PopupGeometry,
    /// Apply to every navigation and window-open from the page
    pub guard: NavigationGuard,
}

/// An open popup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupHandle {
    pub id: PopupId,
    pub window: WindowId,
    pub url: String,
    pub bounds: Rect,
}

/// Creates and closes popup windows
#[async_trait]
pub trait PopupWindows: Send + Sync {
    /// Content bounds of a browser window
    async fn window_bounds(&self, window: WindowId) -> HostResult<Rect>;

    async fn open(&self, request: PopupRequest) -> HostResult<PopupId>;

    async fn close(&self, popup: PopupId) -> HostResult<()>;
}

#[derive(Debug, Clone, Copy)]
struct TrackedPopup {
    window: WindowId,
    opened_at: Instant,
}

/// Open popups and their creation time
#[derive(Debug, Default)]
pub struct PopupTracker {
    popups: HashMap<PopupId, TrackedPopup>,
}

impl PopupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, popup: PopupId, window: WindowId, opened_at: Instant) {
        self.popups.insert(popup, TrackedPopup { window, opened_at });
    }

    pub fn forget(&mut self, popup: PopupId) -> bool {
        self.popups.remove(&popup).is_some()
    }

    pub fn len(&self) -> usize {
        self.popups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.popups.is_empty()
    }

    /// Remove and return the popups a close request may dismiss
    ///
    /// `window` limits the request to one window. Without `force`, popups
    /// younger than [`STABILIZATION_WINDOW`] are kept.
    pub fn take_closable(
        &mut self,
        window: Option<WindowId>,
        now: Instant,
        force: bool,
    ) -> Vec<PopupId> {
        let closable: Vec<PopupId> = self
            .popups
            .iter()
            .filter(|(_, p)| window.map_or(true, |w| p.window == w))
            .filter(|(_, p)| {
                force || now.saturating_duration_since(p.opened_at) >= STABILIZATION_WINDOW
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &closable {
            self.popups.remove(id);
        }
        closable
    }
}
