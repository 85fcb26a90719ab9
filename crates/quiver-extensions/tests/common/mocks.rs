//! Mock implementations for testing
//!
//! Hand-written stand-ins for the host runtime, the store client and the
//! browser window UI. Each records its calls for later assertions.

#![allow(dead_code)]

use super::builders::PackageBuilder;
use async_trait::async_trait;
use quiver_core::types::{Manifest, VersionTuple};
use quiver_extensions::actions::{PopupId, PopupRequest, PopupWindows, Rect, WindowView};
use quiver_extensions::host::{
    ActiveTab, HostError, HostExtensions, HostLoaded, HostResult, LoadOptions, WindowId,
};
use quiver_extensions::store::{StoreClient, StoreInstall};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Toolbar capabilities a [`MockHost`] can be configured to offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCapability {
    SetActiveTab,
    Activate,
    BrowserActionPopup,
    ActionPopup,
    ClickAction,
}

#[derive(Default)]
struct MockHostState {
    loaded: HashMap<String, PathBuf>,
    load_calls: Vec<PathBuf>,
    load_options: Vec<LoadOptions>,
    remove_calls: Vec<String>,
    fail_loads: bool,
    fail_removes: bool,
    // manifest name -> host id to hand out
    assigned_ids: HashMap<String, String>,
    capabilities: HashSet<HostCapability>,
    calls: Vec<String>,
}

/// Host runtime mock
///
/// Host ids default to the id directory name, like a runtime keyed by the
/// directory it was given.
#[derive(Default)]
pub struct MockHost {
    state: Mutex<MockHostState>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_loads(&self, fail: bool) {
        self.state.lock().unwrap().fail_loads = fail;
    }

    pub fn fail_removes(&self, fail: bool) {
        self.state.lock().unwrap().fail_removes = fail;
    }

    /// Hand out `host_id` when a package named `name` is loaded
    pub fn assign_host_id(&self, name: &str, host_id: &str) {
        self.state
            .lock()
            .unwrap()
            .assigned_ids
            .insert(name.to_string(), host_id.to_string());
    }

    pub fn support(&self, capability: HostCapability) {
        self.state.lock().unwrap().capabilities.insert(capability);
    }

    pub fn is_loaded(&self, host_id: &str) -> bool {
        self.state.lock().unwrap().loaded.contains_key(host_id)
    }

    pub fn loaded_path(&self, host_id: &str) -> Option<PathBuf> {
        self.state.lock().unwrap().loaded.get(host_id).cloned()
    }

    pub fn loaded_count(&self) -> usize {
        self.state.lock().unwrap().loaded.len()
    }

    pub fn load_calls(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().load_calls.clone()
    }

    pub fn load_options(&self) -> Vec<LoadOptions> {
        self.state.lock().unwrap().load_options.clone()
    }

    pub fn remove_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().remove_calls.clone()
    }

    /// Toolbar capability calls as `"<capability>:<host id>"`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn capability(&self, capability: HostCapability, host_id: &str, name: &'static str) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.capabilities.contains(&capability) {
            return Err(HostError::Unsupported(name));
        }
        state.calls.push(format!("{}:{}", name, host_id));
        Ok(())
    }
}

#[async_trait]
impl HostExtensions for MockHost {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn load(&self, path: &Path, options: LoadOptions) -> HostResult<HostLoaded> {
        let mut state = self.state.lock().unwrap();
        state.load_calls.push(path.to_path_buf());
        state.load_options.push(options);
        if state.fail_loads {
            return Err(HostError::Failed("mock load failure".into()));
        }

        let bytes = std::fs::read(path.join("manifest.json"))
            .map_err(|e| HostError::Failed(e.to_string()))?;
        let manifest =
            Manifest::from_slice(&bytes).map_err(|e| HostError::Failed(e.to_string()))?;
        let name = manifest.name().unwrap_or_default().to_string();

        let host_id = match state.assigned_ids.get(&name) {
            Some(id) => id.clone(),
            None => path
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| HostError::Failed("no id directory".into()))?,
        };
        state.loaded.insert(host_id.clone(), path.to_path_buf());

        Ok(HostLoaded {
            host_id,
            name,
            version: VersionTuple::normalize(manifest.version()),
        })
    }

    async fn remove(&self, host_id: &str) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state.remove_calls.push(host_id.to_string());
        if state.fail_removes {
            return Err(HostError::Failed("mock remove failure".into()));
        }
        state.loaded.remove(host_id);
        Ok(())
    }

    async fn set_active_tab(&self, tab: &ActiveTab) -> HostResult<()> {
        self.capability(HostCapability::SetActiveTab, &tab.tab_id.to_string(), "set_active_tab")
    }

    async fn activate_extension(&self, host_id: &str, _tab: &ActiveTab) -> HostResult<()> {
        self.capability(HostCapability::Activate, host_id, "activate_extension")
    }

    async fn open_browser_action_popup(&self, host_id: &str, _window: WindowId) -> HostResult<()> {
        self.capability(HostCapability::BrowserActionPopup, host_id, "open_browser_action_popup")
    }

    async fn open_action_popup(&self, host_id: &str, _window: WindowId) -> HostResult<()> {
        self.capability(HostCapability::ActionPopup, host_id, "open_action_popup")
    }

    async fn click_action(&self, host_id: &str, _tab: &ActiveTab) -> HostResult<()> {
        self.capability(HostCapability::ClickAction, host_id, "click_action")
    }
}

#[derive(Default)]
struct MockStoreState {
    catalog: HashMap<String, PackageBuilder>,
    pending_updates: HashMap<String, PackageBuilder>,
    fail_installs: bool,
    // install into this directory instead of the engine base
    outside_dir: Option<PathBuf>,
    install_calls: Vec<String>,
    update_calls: usize,
    uninstall_calls: Vec<String>,
}

/// Store client mock writing packages straight into the engine layout
pub struct MockStore {
    base: PathBuf,
    state: Mutex<MockStoreState>,
}

impl MockStore {
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
            state: Mutex::new(MockStoreState::default()),
        }
    }

    pub fn publish(&self, id: &str, package: PackageBuilder) {
        self.state
            .lock()
            .unwrap()
            .catalog
            .insert(id.to_string(), package);
    }

    /// Make `update_all` write `package` as a new version of `id`
    pub fn publish_update(&self, id: &str, package: PackageBuilder) {
        self.state
            .lock()
            .unwrap()
            .pending_updates
            .insert(id.to_string(), package);
    }

    pub fn fail_installs(&self, fail: bool) {
        self.state.lock().unwrap().fail_installs = fail;
    }

    pub fn install_outside(&self, dir: &Path) {
        self.state.lock().unwrap().outside_dir = Some(dir.to_path_buf());
    }

    pub fn install_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().install_calls.clone()
    }

    pub fn update_calls(&self) -> usize {
        self.state.lock().unwrap().update_calls
    }

    pub fn uninstall_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().uninstall_calls.clone()
    }

    fn version_of(package: &PackageBuilder) -> String {
        VersionTuple::normalize(package.manifest()["version"].as_str())
    }
}

#[async_trait]
impl StoreClient for MockStore {
    async fn install_by_id(&self, id: &str) -> anyhow::Result<StoreInstall> {
        let mut state = self.state.lock().unwrap();
        state.install_calls.push(id.to_string());
        if state.fail_installs {
            anyhow::bail!("network unreachable");
        }
        let package = state
            .catalog
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} is not in the catalog", id))?;

        let version = Self::version_of(&package);
        let root = state.outside_dir.clone().unwrap_or_else(|| self.base.clone());
        let path = package.write_dir(&root.join(id).join(format!("{}_0", version)));
        let manifest = Manifest::from_value(package.manifest());
        Ok(StoreInstall {
            id: id.to_string(),
            name: manifest.name().unwrap_or_default().to_string(),
            version,
            path,
            manifest,
        })
    }

    async fn update_all(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.update_calls += 1;
        for (id, package) in state.pending_updates.drain() {
            let version = Self::version_of(&package);
            package.write_dir(&self.base.join(&id).join(format!("{}_0", version)));
        }
        Ok(())
    }

    async fn uninstall_by_id(&self, id: &str) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .uninstall_calls
            .push(id.to_string());
        Ok(())
    }
}

/// Window UI mock answering active-tab queries
#[derive(Default)]
pub struct MockWindowView {
    tabs: Mutex<HashMap<WindowId, ActiveTab>>,
}

impl MockWindowView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active_tab(&self, window: WindowId, tab_id: i64, url: &str) {
        self.tabs.lock().unwrap().insert(
            window,
            ActiveTab {
                tab_id,
                web_contents_id: tab_id + 100,
                url: url.to_string(),
            },
        );
    }
}

#[async_trait]
impl WindowView for MockWindowView {
    async fn query_active_tab(&self, window: WindowId) -> HostResult<Option<ActiveTab>> {
        Ok(self.tabs.lock().unwrap().get(&window).cloned())
    }
}

#[derive(Default)]
struct MockPopupState {
    next_id: u64,
    opened: Vec<PopupRequest>,
    closed: Vec<PopupId>,
}

/// Popup window mock
pub struct MockPopupWindows {
    window_bounds: Rect,
    state: Mutex<MockPopupState>,
}

impl Default for MockPopupWindows {
    fn default() -> Self {
        Self::new(Rect::new(0, 0, 1280, 800))
    }
}

impl MockPopupWindows {
    pub fn new(window_bounds: Rect) -> Self {
        Self {
            window_bounds,
            state: Mutex::new(MockPopupState::default()),
        }
    }

    pub fn opened(&self) -> Vec<PopupRequest> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn closed(&self) -> Vec<PopupId> {
        self.state.lock().unwrap().closed.clone()
    }
}

#[async_trait]
impl PopupWindows for MockPopupWindows {
    async fn window_bounds(&self, _window: WindowId) -> HostResult<Rect> {
        Ok(self.window_bounds)
    }

    async fn open(&self, request: PopupRequest) -> HostResult<PopupId> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.opened.push(request);
        Ok(PopupId(state.next_id))
    }

    async fn close(&self, popup: PopupId) -> HostResult<()> {
        self.state.lock().unwrap().closed.push(popup);
        Ok(())
    }
}
