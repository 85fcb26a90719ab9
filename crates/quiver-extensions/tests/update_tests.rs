//! Web store update sweep tests

mod common;

use common::*;
use quiver_core::types::UpdateOutcome;
use quiver_core::ErrorCode;
use quiver_extensions::lifecycle::SkipReason;
use quiver_extensions::InstallOptions;
use std::sync::Arc;

#[cfg(test)]
mod update_sweep {
    use super::*;

    fn store_package(version: &str) -> PackageBuilder {
        PackageBuilder::with_popup("Store Demo").map_manifest(|m| m.with_version(version))
    }

    #[tokio::test]
    async fn test_update_switches_to_newer_version() {
        let env = TestEnv::new();
        let (host, store, engine) = env.start().await;
        store.publish(STORE_ID, store_package("1.0.0"));
        let before = engine.install_from_store(STORE_ID).await.unwrap().record;
        let old_dir = before.installed_path.clone();

        store.publish_update(STORE_ID, store_package("1.1.0"));
        let summary = engine.update().await.unwrap();

        assert_eq!(summary.updated.len(), 1);
        assert_eq!(summary.updated[0].id, STORE_ID);
        assert_eq!(summary.updated[0].from, "1.0.0");
        assert_eq!(summary.updated[0].to, "1.1.0");
        assert!(summary.updated[0].loaded);
        assert!(summary.errors.is_empty());

        let record = engine.get_info(STORE_ID).await.unwrap();
        assert_eq!(record.version, "1.1.0");
        assert_record_layout(&env.base(), &record);
        assert!(!old_dir.exists());
        assert!(record.icon_path.as_deref().unwrap().ends_with("?v=1.1.0"));
        assert_eq!(host.loaded_path(STORE_ID), Some(record.installed_path.clone()));
        assert_eq!(record.update.last_result, Some(UpdateOutcome::Updated));
        assert!(record.update.last_checked.is_some());
        assert_eq!(store.update_calls(), 1);

        let history = engine.ledger().history(STORE_ID, None).unwrap();
        assert!(history.iter().any(|e| e.event.type_name() == "updated"));
    }

    #[tokio::test]
    async fn test_sweep_without_updates_skips_everything() {
        let env = TestEnv::new();
        let (_host, store, engine) = env.start().await;
        store.publish(STORE_ID, store_package("1.0.0"));
        store.publish(OTHER_STORE_ID, PackageBuilder::plain("Other"));
        engine.install_from_store(STORE_ID).await.unwrap();
        engine.install_from_store(OTHER_STORE_ID).await.unwrap();
        let local = env.package_dir("local", &PackageBuilder::plain("Local"));
        let local = engine
            .install(&src(&local), InstallOptions::default())
            .await
            .unwrap()
            .record;
        let before: Vec<_> = engine
            .list()
            .await
            .into_iter()
            .map(|r| (r.id, r.version, r.installed_path))
            .collect();

        let summary = engine.update().await.unwrap();

        assert!(summary.updated.is_empty());
        assert!(summary.errors.is_empty());
        assert_eq!(summary.skipped.len(), 3);
        for skip in &summary.skipped {
            let expected = if skip.id == local.id {
                SkipReason::NotWebstore
            } else {
                SkipReason::AlreadyLatest
            };
            assert_eq!(skip.reason, expected, "{}", skip.id);
        }
        let after: Vec<_> = engine
            .list()
            .await
            .into_iter()
            .map(|r| (r.id, r.version, r.installed_path))
            .collect();
        assert_eq!(before, after);
        assert_eq!(
            engine.get_info(STORE_ID).await.unwrap().update.last_result,
            Some(UpdateOutcome::AlreadyLatest)
        );
    }

    #[tokio::test]
    async fn test_disabled_record_is_updated_but_not_loaded() {
        let env = TestEnv::new();
        let (host, store, engine) = env.start().await;
        store.publish(STORE_ID, store_package("1.0.0"));
        engine.install_from_store(STORE_ID).await.unwrap();
        engine.toggle(STORE_ID, false).await.unwrap();
        let loads_before = host.load_calls().len();

        store.publish_update(STORE_ID, store_package("2.0.0"));
        let summary = engine.update().await.unwrap();

        assert_eq!(summary.updated.len(), 1);
        let record = engine.get_info(STORE_ID).await.unwrap();
        assert_eq!(record.version, "2.0.0");
        assert!(!record.enabled);
        assert!(record.host_id.is_none());
        assert_eq!(host.load_calls().len(), loads_before);
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_current_version() {
        let env = TestEnv::new();
        let (host, store, engine) = env.start().await;
        store.publish(STORE_ID, store_package("1.0.0"));
        let before = engine.install_from_store(STORE_ID).await.unwrap().record;

        store.publish_update(
            STORE_ID,
            store_package("1.5.0").map_manifest(|m| m.with_manifest_version(2)),
        );
        let summary = engine.update().await.unwrap();

        assert!(summary.updated.is_empty());
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].id, STORE_ID);
        assert!(summary.errors[0].error.contains("Manifest V3"));

        let record = engine.get_info(STORE_ID).await.unwrap();
        assert_eq!(record.version, "1.0.0");
        assert_eq!(record.installed_path, before.installed_path);
        assert_eq!(record.update.last_result, Some(UpdateOutcome::Failed));
        assert!(host.is_loaded(STORE_ID));
    }

    #[tokio::test]
    async fn test_update_requires_store() {
        let env = TestEnv::new();
        let engine = env.coordinator(Arc::new(MockHost::new()), None);
        engine.start().await.unwrap();

        assert_code(&engine.update().await, ErrorCode::NotAvailable);
    }

    #[tokio::test]
    async fn test_pinned_record_stays_pinned_after_update() {
        let env = TestEnv::new();
        let (_host, store, engine) = env.start().await;
        store.publish(STORE_ID, store_package("1.0.0"));
        engine.install_from_store(STORE_ID).await.unwrap();
        assert_eq!(engine.get_pinned().await, vec![STORE_ID.to_string()]);

        store.publish_update(STORE_ID, store_package("1.0.1"));
        engine.update().await.unwrap();

        assert_eq!(engine.get_pinned().await, vec![STORE_ID.to_string()]);
    }

    #[tokio::test]
    async fn test_update_dropping_action_unpins() {
        let env = TestEnv::new();
        let (_host, store, engine) = env.start().await;
        store.publish(STORE_ID, store_package("1.0.0"));
        engine.install_from_store(STORE_ID).await.unwrap();
        assert_eq!(engine.get_pinned().await, vec![STORE_ID.to_string()]);

        store.publish_update(
            STORE_ID,
            PackageBuilder::plain("Store Demo").map_manifest(|m| m.with_version("1.1.0")),
        );
        let summary = engine.update().await.unwrap();

        assert_eq!(summary.updated.len(), 1);
        let record = engine.get_info(STORE_ID).await.unwrap();
        assert_eq!(record.version, "1.1.0");
        assert!(!record.has_action());
        assert!(engine.get_pinned().await.is_empty());
        assert_pins_eligible(&engine.get_pinned().await, &engine.list().await);

        // the unpin is persisted
        let (_host, _store, restarted) = env.start().await;
        assert!(restarted.get_pinned().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_with_failed_reload_is_applied_unloaded() {
        let env = TestEnv::new();
        let (host, store, engine) = env.start().await;
        store.publish(STORE_ID, store_package("1.0.0"));
        let before = engine.install_from_store(STORE_ID).await.unwrap().record;

        store.publish_update(STORE_ID, store_package("1.2.0"));
        host.fail_loads(true);
        let summary = engine.update().await.unwrap();

        assert!(summary.errors.is_empty());
        assert_eq!(summary.updated.len(), 1);
        assert!(!summary.updated[0].loaded);

        let record = engine.get_info(STORE_ID).await.unwrap();
        assert_eq!(record.version, "1.2.0");
        assert!(record.enabled);
        assert!(record.host_id.is_none());
        assert_eq!(record.update.last_result, Some(UpdateOutcome::Updated));
        assert_record_layout(&env.base(), &record);
        assert!(!before.installed_path.exists());
        assert!(!host.is_loaded(STORE_ID));

        let history = engine.ledger().history(STORE_ID, None).unwrap();
        assert!(history.iter().any(|e| e.event.type_name() == "load_failed"));

        // a later toggle retries the load
        host.fail_loads(false);
        let record = engine.toggle(STORE_ID, true).await.unwrap();
        assert!(record.is_loaded());
        assert_eq!(host.loaded_path(STORE_ID), Some(record.installed_path));
    }
}
