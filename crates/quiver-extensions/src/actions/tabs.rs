//! Tabs and the windows that own them

use crate::host::{ActiveTab, HostResult, WindowId};
use async_trait::async_trait;
use std::collections::HashMap;

/// A browser window's UI, queried for its tab strip state
#[async_trait]
pub trait WindowView: Send + Sync {
    /// The active tab, or `None` when the window shows no tab
    async fn query_active_tab(&self, window: WindowId) -> HostResult<Option<ActiveTab>>;
}

/// Maps tab web contents to the window hosting them
#[derive(Debug, Default)]
pub struct TabRegistry {
    owners: HashMap<i64, WindowId>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, window: WindowId, tab_web_contents_id: i64) {
        self.owners.insert(tab_web_contents_id, window);
    }

    pub fn unregister(&mut self, tab_web_contents_id: i64) -> Option<WindowId> {
        self.owners.remove(&tab_web_contents_id)
    }

    pub fn owner_of(&self, tab_web_contents_id: i64) -> Option<WindowId> {
        self.owners.get(&tab_web_contents_id).copied()
    }

    /// Drop every tab of a closed window
    pub fn forget_window(&mut self, window: WindowId) -> usize {
        let before = self.owners.len();
        self.owners.retain(|_, owner| *owner != window);
        before - self.owners.len()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
