//! Toolbar action and popup tests
//!
//! Covers the toolbar rows, the click route fallbacks, popup placement and
//! the popup close rules for tab switches and window closes.

mod common;

use common::*;
use quiver_core::ErrorCode;
use quiver_extensions::actions::{NavigationDecision, Rect, STABILIZATION_WINDOW};
use quiver_extensions::{
    BrowserActionService, ClickRoute, InstallOptions, LifecycleCoordinator, WindowId,
};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod browser_actions {
    use super::*;

    const WINDOW: WindowId = WindowId(1);
    const ANCHOR: Rect = Rect {
        x: 1000,
        y: 10,
        width: 24,
        height: 24,
    };

    struct Harness {
        env: TestEnv,
        host: Arc<MockHost>,
        engine: LifecycleCoordinator,
        view: Arc<MockWindowView>,
        popups: Arc<MockPopupWindows>,
        service: BrowserActionService,
    }

    async fn harness() -> Harness {
        let env = TestEnv::new();
        let (host, _store, engine) = env.start().await;
        let view = Arc::new(MockWindowView::new());
        let popups = Arc::new(MockPopupWindows::default());
        let service = BrowserActionService::new(
            engine.registry(),
            host.clone(),
            view.clone(),
            popups.clone(),
        );
        Harness {
            env,
            host,
            engine,
            view,
            popups,
            service,
        }
    }

    impl Harness {
        async fn install(&self, name: &str, package: PackageBuilder) -> String {
            let dir = self.env.package_dir(name, &package);
            self.engine
                .install(&src(&dir), InstallOptions::default())
                .await
                .unwrap()
                .record
                .id
        }
    }

    #[tokio::test]
    async fn test_list_shows_enabled_actions_only() {
        let h = harness().await;
        let popup = h.install("popup", PackageBuilder::with_popup("Popup")).await;
        let plain = h.install("plain", PackageBuilder::plain("Plain")).await;
        let off = h.install("off", PackageBuilder::with_popup("Off")).await;
        h.engine.toggle(&off, false).await.unwrap();

        let rows = h.service.list(WINDOW).await;

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, popup);
        assert_eq!(row.title, "Open");
        assert_eq!(row.popup.as_deref(), Some("popup.html"));
        assert_eq!(row.host_id.as_deref(), Some(popup.as_str()));
        assert!(row.icon.as_deref().unwrap().starts_with("proto://extension-icon/"));
        assert!(rows.iter().all(|r| r.id != plain));
    }

    #[tokio::test]
    async fn test_click_prefers_host_routes_in_order() {
        let h = harness().await;
        let id = h.install("popup", PackageBuilder::with_popup("Popup")).await;
        h.view.set_active_tab(WINDOW, 7, "https://example.com/");
        h.host.support(HostCapability::SetActiveTab);
        h.host.support(HostCapability::ActionPopup);
        h.host.support(HostCapability::ClickAction);

        let outcome = h.service.click(&id, WINDOW, Some(ANCHOR)).await.unwrap();

        assert_eq!(outcome.route, ClickRoute::ActionPopup);
        assert_eq!(outcome.active_tab.as_ref().map(|t| t.tab_id), Some(7));
        assert!(outcome.popup.is_none());
        assert_eq!(
            h.host.calls(),
            vec!["set_active_tab:7".to_string(), format!("open_action_popup:{}", id)]
        );
        assert!(h.popups.opened().is_empty());
    }

    #[tokio::test]
    async fn test_activate_needs_an_active_tab() {
        let h = harness().await;
        let id = h.install("popup", PackageBuilder::with_popup("Popup")).await;
        h.host.support(HostCapability::Activate);
        h.host.support(HostCapability::BrowserActionPopup);

        let without_tab = h.service.click(&id, WINDOW, None).await.unwrap();
        assert_eq!(without_tab.route, ClickRoute::BrowserActionPopup);

        h.view.set_active_tab(WINDOW, 3, "https://example.com/");
        let with_tab = h.service.click(&id, WINDOW, None).await.unwrap();
        assert_eq!(with_tab.route, ClickRoute::ActivateExtension);
    }

    #[tokio::test]
    async fn test_click_falls_back_to_direct_popup() {
        let h = harness().await;
        let id = h.install("popup", PackageBuilder::with_popup("Popup")).await;

        let outcome = h.service.click(&id, WINDOW, Some(ANCHOR)).await.unwrap();

        assert_eq!(outcome.route, ClickRoute::DirectPopup);
        let handle = outcome.popup.unwrap();
        assert_eq!(handle.url, format!("chrome-extension://{}/popup.html", id));
        // right-aligned under the anchor
        assert_eq!(handle.bounds, Rect::new(1024 - 320, 34, 320, 480));

        let opened = h.popups.opened();
        assert_eq!(opened.len(), 1);
        let request = &opened[0];
        assert_eq!(request.extension_id, id);
        assert_eq!(
            request.geometry.override_bounds(Rect::new(0, 0, 2000, 10)),
            Rect::new(1024 - 800, 34, 800, 25)
        );
        assert_eq!(
            request.guard.decide(&format!("chrome-extension://{}/options.html", id)),
            NavigationDecision::Allow
        );
        assert!(matches!(
            request.guard.decide("https://example.com/help"),
            NavigationDecision::OpenInTab(_)
        ));
        assert_eq!(
            request.guard.decide("file:///etc/passwd"),
            NavigationDecision::Deny
        );
        assert_eq!(h.service.open_popup_count(), 1);
    }

    #[tokio::test]
    async fn test_popup_stays_inside_small_window() {
        let h = harness().await;
        let id = h.install("popup", PackageBuilder::with_popup("Popup")).await;
        let small = Rect::new(0, 0, 300, 400);
        let service = BrowserActionService::new(
            h.engine.registry(),
            h.host.clone(),
            h.view.clone(),
            Arc::new(MockPopupWindows::new(small)),
        );

        let handle = service
            .open_popup(&id, WINDOW, Rect::new(280, 380, 20, 20))
            .await
            .unwrap();
        assert_eq!(handle.bounds, Rect::new(0, 0, 320, 480));
    }

    #[tokio::test]
    async fn test_click_without_popup_or_route_is_unavailable() {
        let h = harness().await;
        let package = PackageBuilder::plain("Bare").map_manifest(|m| m.with_action(None));
        let id = h.install("bare", package).await;

        let result = h.service.click(&id, WINDOW, None).await;
        assert_code(&result, ErrorCode::NotAvailable);
    }

    #[tokio::test]
    async fn test_click_on_inactive_records() {
        let h = harness().await;
        let off = h.install("off", PackageBuilder::with_popup("Off")).await;
        let plain = h.install("plain", PackageBuilder::plain("Plain")).await;
        h.engine.toggle(&off, false).await.unwrap();

        assert_code(&h.service.click(&off, WINDOW, None).await, ErrorCode::InvalidState);
        assert_code(&h.service.click(&plain, WINDOW, None).await, ErrorCode::InvalidState);
        assert_code(&h.service.click(STORE_ID, WINDOW, None).await, ErrorCode::InvalidId);
    }

    #[tokio::test]
    async fn test_fresh_popups_survive_unforced_close() {
        let h = harness().await;
        let id = h.install("popup", PackageBuilder::with_popup("Popup")).await;
        h.service.open_popup(&id, WINDOW, ANCHOR).await.unwrap();

        assert_eq!(h.service.close_all_popups(false).await, 0);
        assert_eq!(h.service.open_popup_count(), 1);

        assert_eq!(h.service.close_all_popups(true).await, 1);
        assert_eq!(h.service.open_popup_count(), 0);
        assert_eq!(h.popups.closed().len(), 1);
    }

    #[tokio::test]
    async fn test_tab_switch_closes_settled_popups_of_its_window() {
        let h = harness().await;
        let id = h.install("popup", PackageBuilder::with_popup("Popup")).await;
        let other = WindowId(2);
        h.service.register_tab(WINDOW, 501);
        h.service.register_tab(other, 502);
        h.service.open_popup(&id, WINDOW, ANCHOR).await.unwrap();
        h.service.open_popup(&id, other, ANCHOR).await.unwrap();

        assert_eq!(h.service.tab_switched(501).await, 0);
        tokio::time::sleep(STABILIZATION_WINDOW + Duration::from_millis(100)).await;

        assert_eq!(h.service.tab_switched(501).await, 1);
        assert_eq!(h.service.open_popup_count(), 1);
        assert_eq!(h.service.tab_switched(999).await, 0);

        assert_eq!(h.service.unregister_tab(502), Some(other));
        assert_eq!(h.service.tab_switched(502).await, 0);
    }

    #[tokio::test]
    async fn test_window_close_forces_its_popups_shut() {
        let h = harness().await;
        let id = h.install("popup", PackageBuilder::with_popup("Popup")).await;
        h.service.register_tab(WINDOW, 501);
        let handle = h.service.open_popup(&id, WINDOW, ANCHOR).await.unwrap();

        assert_eq!(h.service.window_closed(WINDOW).await, 1);
        assert_eq!(h.popups.closed(), vec![handle.id]);
        assert_eq!(h.service.tab_switched(501).await, 0);
    }

    #[tokio::test]
    async fn test_popup_closed_by_itself_is_forgotten() {
        let h = harness().await;
        let id = h.install("popup", PackageBuilder::with_popup("Popup")).await;
        let handle = h.service.open_popup(&id, WINDOW, ANCHOR).await.unwrap();

        h.service.popup_closed(handle.id);
        assert_eq!(h.service.close_all_popups(true).await, 0);
        assert!(h.popups.closed().is_empty());
    }

    #[tokio::test]
    async fn test_badges_per_window_with_global_fallback() {
        let h = harness().await;
        let id = h.install("popup", PackageBuilder::with_popup("Popup")).await;
        let other = WindowId(2);

        h.service.set_badge(&id, None, Some("3".into()));
        h.service.set_badge(&id, Some(WINDOW), Some("9".into()));

        assert_eq!(h.service.list(WINDOW).await[0].badge.as_deref(), Some("9"));
        assert_eq!(h.service.list(other).await[0].badge.as_deref(), Some("3"));

        h.service.set_badge(&id, Some(WINDOW), None);
        assert_eq!(h.service.list(WINDOW).await[0].badge.as_deref(), Some("3"));
        h.service.set_badge(&id, None, Some(String::new()));
        assert!(h.service.list(WINDOW).await[0].badge.is_none());
    }
}
