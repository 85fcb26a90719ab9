//! Toolbar actions and their popups
//!
//! Lists the toolbar entries of enabled extensions and turns a click into
//! whatever the host supports. Host capabilities are tried in a fixed order
//! ([`ClickRoute::ORDER`]); an unsupported capability moves on to the next,
//! and the engine's own popup window is the last resort.

pub mod popup;
pub mod tabs;

pub use popup::{
    resolve_popup_path, NavigationDecision, NavigationGuard, PopupGeometry, PopupHandle, PopupId,
    PopupRequest, PopupTracker, PopupWindows, Rect, STABILIZATION_WINDOW,
};
pub use tabs::{TabRegistry, WindowView};

use crate::host::{ActiveTab, HostError, HostExtensions, WindowId};
use crate::registry::Registry;
use quiver_core::types::ExtensionRecord;
use quiver_core::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// Scheme of extension pages
pub const EXTENSION_SCHEME: &str = "chrome-extension";

/// One toolbar entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserActionRow {
    pub id: String,
    pub host_id: Option<String>,
    pub title: String,
    pub icon: Option<String>,
    pub popup: Option<String>,
    pub badge: Option<String>,
    pub has_action: bool,
}

/// Ways a click can reach an extension, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClickRoute {
    ActivateExtension,
    BrowserActionPopup,
    ActionPopup,
    ActionClick,
    DirectPopup,
}

impl ClickRoute {
    pub const ORDER: [ClickRoute; 5] = [
        ClickRoute::ActivateExtension,
        ClickRoute::BrowserActionPopup,
        ClickRoute::ActionPopup,
        ClickRoute::ActionClick,
        ClickRoute::DirectPopup,
    ];
}

/// How a click was delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickOutcome {
    pub route: ClickRoute,
    pub active_tab: Option<ActiveTab>,
    pub popup: Option<PopupHandle>,
}

#[derive(Default)]
struct ActionState {
    tracker: PopupTracker,
    tabs: TabRegistry,
    // (extension id, window) -> text; `None` window is the global badge
    badges: HashMap<(String, Option<WindowId>), String>,
}

/// Toolbar action service for one browser session
pub struct BrowserActionService {
    registry: Arc<Registry>,
    host: Arc<dyn HostExtensions>,
    view: Arc<dyn WindowView>,
    popups: Arc<dyn PopupWindows>,
    state: Mutex<ActionState>,
}

impl BrowserActionService {
    pub fn new(
        registry: Arc<Registry>,
        host: Arc<dyn HostExtensions>,
        view: Arc<dyn WindowView>,
        popups: Arc<dyn PopupWindows>,
    ) -> Self {
        Self {
            registry,
            host,
            view,
            popups,
            state: Mutex::new(ActionState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ActionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Toolbar rows for `window`
    pub async fn list(&self, window: WindowId) -> Vec<BrowserActionRow> {
        let records = self.registry.list().await;
        let state = self.state();
        records
            .into_iter()
            .filter(|r| r.enabled && r.has_action())
            .map(|r| {
                let badge = state
                    .badges
                    .get(&(r.id.clone(), Some(window)))
                    .or_else(|| state.badges.get(&(r.id.clone(), None)))
                    .cloned();
                BrowserActionRow {
                    title: r
                        .manifest
                        .action_title()
                        .map(str::to_string)
                        .unwrap_or_else(|| r.label().to_string()),
                    popup: resolve_popup_path(&r.installed_path, &r.manifest),
                    icon: r.icon_path.clone(),
                    host_id: r.host_id.clone(),
                    has_action: true,
                    badge,
                    id: r.id,
                }
            })
            .collect()
    }

    /// Set or clear (`None`) a badge; `window = None` sets the global badge
    pub fn set_badge(&self, id: &str, window: Option<WindowId>, text: Option<String>) {
        let mut state = self.state();
        let key = (id.to_string(), window);
        match text.filter(|t| !t.is_empty()) {
            Some(text) => {
                state.badges.insert(key, text);
            }
            None => {
                state.badges.remove(&key);
            }
        }
    }

    async fn loaded_record(&self, id: &str) -> Result<(ExtensionRecord, String)> {
        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| Error::invalid_id(id))?;
        if !record.enabled || !record.has_action() {
            return Err(Error::invalid_state(format!(
                "{} has no active toolbar action",
                record.label()
            )));
        }
        let host_id = record
            .host_id
            .clone()
            .ok_or_else(|| Error::invalid_state(format!("{} is not loaded", record.label())))?;
        Ok((record, host_id))
    }

    async fn active_tab(&self, window: WindowId) -> Option<ActiveTab> {
        match self.view.query_active_tab(window).await {
            Ok(tab) => tab,
            Err(e) => {
                debug!("Could not read the active tab of window {}: {}", window.0, e);
                None
            }
        }
    }

    /// Deliver a toolbar click
    pub async fn click(
        &self,
        id: &str,
        window: WindowId,
        anchor: Option<Rect>,
    ) -> Result<ClickOutcome> {
        let (_, host_id) = self.loaded_record(id).await?;

        let active_tab = self.active_tab(window).await;
        if let Some(tab) = &active_tab {
            if let Err(e) = self.host.set_active_tab(tab).await {
                if !e.is_unsupported() {
                    warn!("Host rejected active tab {}: {}", tab.tab_id, e);
                }
            }
        }

        let mut last_error = None;
        for route in ClickRoute::ORDER {
            let attempt = match route {
                ClickRoute::ActivateExtension => match &active_tab {
                    Some(tab) => self.host.activate_extension(&host_id, tab).await,
                    None => Err(HostError::Unsupported("activate_extension")),
                },
                ClickRoute::BrowserActionPopup => {
                    self.host.open_browser_action_popup(&host_id, window).await
                }
                ClickRoute::ActionPopup => self.host.open_action_popup(&host_id, window).await,
                ClickRoute::ActionClick => match &active_tab {
                    Some(tab) => self.host.click_action(&host_id, tab).await,
                    None => Err(HostError::Unsupported("click_action")),
                },
                ClickRoute::DirectPopup => {
                    let popup = self
                        .open_popup(id, window, anchor.unwrap_or_default())
                        .await?;
                    return Ok(ClickOutcome {
                        route,
                        active_tab,
                        popup: Some(popup),
                    });
                }
            };

            match attempt {
                Ok(()) => {
                    debug!("Delivered click on {} via {:?}", id, route);
                    return Ok(ClickOutcome {
                        route,
                        active_tab,
                        popup: None,
                    });
                }
                Err(HostError::Unsupported(_)) => continue,
                Err(e) => {
                    warn!("Click route {:?} failed for {}: {}", route, id, e);
                    last_error = Some(e);
                }
            }
        }

        Err(Error::not_available(match last_error {
            Some(e) => format!("No way to deliver the click: {}", e),
            None => "No way to deliver the click".to_string(),
        }))
    }

    /// Open the extension's popup page under `anchor`
    pub async fn open_popup(&self, id: &str, window: WindowId, anchor: Rect) -> Result<PopupHandle> {
        let (record, host_id) = self.loaded_record(id).await?;
        let page = resolve_popup_path(&record.installed_path, &record.manifest)
            .ok_or_else(|| Error::not_available(format!("{} has no popup page", record.label())))?;

        let url = Url::parse(&format!("{}://{}/{}", EXTENSION_SCHEME, host_id, page))
            .map_err(|e| Error::invalid_url(format!("Bad popup URL for {}: {}", id, e)))?;

        let window_bounds = self
            .popups
            .window_bounds(window)
            .await
            .map_err(|e| Error::not_available(format!("Window {} unavailable: {}", window.0, e)))?;
        let geometry = PopupGeometry::new(anchor, window_bounds);
        let (width, height) = popup::DEFAULT_POPUP_SIZE;
        let bounds = geometry.place(width, height);

        let request = PopupRequest {
            window,
            extension_id: id.to_string(),
            url: url.clone(),
            bounds,
            geometry,
            guard: NavigationGuard::new(EXTENSION_SCHEME, &host_id),
        };
        let popup_id = self
            .popups
            .open(request)
            .await
            .map_err(|e| Error::load_failed(id, format!("Failed to open popup: {}", e)))?;

        self.state().tracker.track(popup_id, window, Instant::now());
        debug!("Opened popup {} for {}", url, id);
        Ok(PopupHandle {
            id: popup_id,
            window,
            url: url.to_string(),
            bounds,
        })
    }

    /// The popup window reports it closed on its own
    pub fn popup_closed(&self, popup: PopupId) {
        self.state().tracker.forget(popup);
    }

    /// Close every popup; without `force`, freshly opened ones survive
    pub async fn close_all_popups(&self, force: bool) -> usize {
        let closable = self.state().tracker.take_closable(None, Instant::now(), force);
        self.close_each(closable).await
    }

    /// Close the popups of one window
    pub async fn close_window_popups(&self, window: WindowId, force: bool) -> usize {
        let closable = self
            .state()
            .tracker
            .take_closable(Some(window), Instant::now(), force);
        self.close_each(closable).await
    }

    async fn close_each(&self, popups: Vec<PopupId>) -> usize {
        let mut closed = 0;
        for popup in popups {
            match self.popups.close(popup).await {
                Ok(()) => closed += 1,
                Err(e) => debug!("Popup {} already gone: {}", popup.0, e),
            }
        }
        closed
    }

    pub fn register_tab(&self, window: WindowId, tab_web_contents_id: i64) {
        self.state().tabs.register(window, tab_web_contents_id);
    }

    pub fn unregister_tab(&self, tab_web_contents_id: i64) -> Option<WindowId> {
        self.state().tabs.unregister(tab_web_contents_id)
    }

    /// A tab became active: close its window's settled popups
    pub async fn tab_switched(&self, tab_web_contents_id: i64) -> usize {
        let owner = self.state().tabs.owner_of(tab_web_contents_id);
        match owner {
            Some(window) => self.close_window_popups(window, false).await,
            None => 0,
        }
    }

    /// A browser window closed: forget its tabs and close its popups
    pub async fn window_closed(&self, window: WindowId) -> usize {
        self.state().tabs.forget_window(window);
        self.close_window_popups(window, true).await
    }

    pub fn open_popup_count(&self) -> usize {
        self.state().tracker.len()
    }
}
