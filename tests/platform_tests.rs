//! Platform layer tests
//!
//! The PATH contract is checked against every implementation available on
//! the host. On unix, full sessions run against a platform layer rooted in a
//! temporary directory, with payloads loaded from a JSON description.

use setupflow::platform::NoopPlatform;
use setupflow::Platform;
use std::path::Path;

/// Adding twice keeps one entry; removal matches whole entries only.
fn check_path_contract(platform: &dyn Platform) {
    let bin = Path::new("/opt/acme/bin");
    let sibling = Path::new("/opt/acme/bin2");

    assert!(!platform.is_in_path(bin).unwrap());
    platform.add_to_path(bin).unwrap();
    platform.add_to_path(bin).unwrap();
    platform.add_to_path(sibling).unwrap();
    assert!(platform.is_in_path(bin).unwrap());

    platform.remove_from_path(bin).unwrap();
    assert!(!platform.is_in_path(bin).unwrap());
    assert!(platform.is_in_path(sibling).unwrap());

    // Removing an absent entry is not an error
    platform.remove_from_path(bin).unwrap();
}

// =============================================================================
// PATH contract
// =============================================================================

#[test]
fn noop_platform_honours_path_contract() {
    let platform = NoopPlatform::new();
    check_path_contract(&platform);
    assert_eq!(platform.path_entries().len(), 1);
}

#[cfg(unix)]
mod unix {
    use super::check_path_contract;
    use setupflow::platform::{InstallScope, UnixLayout, UnixPlatform, UNINSTALL_MANIFEST};
    use setupflow::view::{Answers, UnattendedView};
    use setupflow::{payload, Config, Orchestrator, OrchestrationStage, Platform, SetupError};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn rooted(root: &Path, scope: InstallScope) -> UnixPlatform {
        UnixPlatform::with_layout("Acme", UnixLayout::rooted(&root.join("sys"), "acme"), scope)
    }

    #[test]
    fn user_scope_honours_path_contract() {
        let root = tempfile::tempdir().unwrap();
        let platform = rooted(root.path(), InstallScope::User);
        check_path_contract(&platform);

        let profile = fs::read_to_string(platform.layout().user_profile.path()).unwrap();
        assert_eq!(profile.lines().count(), 1);
        assert!(profile.contains("/opt/acme/bin2"));
    }

    #[test]
    fn system_scope_honours_path_contract() {
        let root = tempfile::tempdir().unwrap();
        let platform = rooted(root.path(), InstallScope::System);
        check_path_contract(&platform);
        assert!(!platform.layout().user_profile.path().exists());
    }

    // =========================================================================
    // Payload sessions
    // =========================================================================

    /// `<root>/payload/{bin/acme, README}` plus `<root>/setup.json`
    /// describing it. Returns the description path and the install dir.
    fn fixture(root: &TempDir, extra_components: serde_json::Value) -> (PathBuf, PathBuf) {
        let payload = root.path().join("payload");
        fs::create_dir_all(payload.join("bin")).unwrap();
        fs::write(payload.join("bin/acme"), "#!/bin/sh\n").unwrap();
        fs::write(payload.join("README"), "hello").unwrap();

        let install_dir = root.path().join("apps/acme");
        let mut components = vec![serde_json::json!({
            "id": "core",
            "name": "Core",
            "required": true,
            "source": "payload"
        })];
        if let serde_json::Value::Array(extra) = extra_components {
            components.extend(extra);
        }

        let description = serde_json::json!({
            "app_name": "Acme",
            "app_version": "2.1.0",
            "publisher": "Acme Corp",
            "install_dir": install_dir,
            "elevation": "never",
            "bin_dir": "bin",
            "max_retries": 0,
            "components": components
        });
        let file = root.path().join("setup.json");
        fs::write(&file, serde_json::to_string_pretty(&description).unwrap()).unwrap();
        (file, install_dir)
    }

    fn load(file: &Path) -> Config {
        let mut config = Config::load_from_file(file).unwrap();
        config.validate().unwrap();
        payload::attach_hooks(&mut config, file.parent().unwrap());
        config
    }

    #[test]
    fn payload_session_installs_and_registers() {
        let root = tempfile::tempdir().unwrap();
        let (file, install_dir) = fixture(&root, serde_json::json!([]));
        let platform = rooted(root.path(), InstallScope::User);
        let probe = platform.clone();

        let config = load(&file);
        assert_eq!(config.component("core").unwrap().size, 15);

        let mut view = UnattendedView::new(Answers::default());
        let report = Orchestrator::with_platform(config, Box::new(platform))
            .run_unattended(&mut view)
            .unwrap();

        assert!(report.succeeded());
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert!(install_dir.join("bin/acme").is_file());
        assert_eq!(fs::read_to_string(install_dir.join("README")).unwrap(), "hello");

        let bin = install_dir.join("bin");
        assert!(probe.is_in_path(&bin).unwrap());
        assert!(probe.receipt_file().is_file());

        let manifest = fs::read_to_string(install_dir.join(UNINSTALL_MANIFEST)).unwrap();
        assert!(manifest.contains("Acme Corp"));
        assert!(manifest.contains(&probe.receipt_file().display().to_string()));
    }

    #[test]
    fn second_session_keeps_single_path_entry() {
        let root = tempfile::tempdir().unwrap();
        let (file, install_dir) = fixture(&root, serde_json::json!([]));
        let probe = rooted(root.path(), InstallScope::User);

        for _ in 0..2 {
            let platform = rooted(root.path(), InstallScope::User);
            Orchestrator::with_platform(load(&file), Box::new(platform))
                .run_unattended(&mut UnattendedView::new(Answers::default()))
                .unwrap();
        }

        let profile = fs::read_to_string(probe.layout().user_profile.path()).unwrap();
        let bin = install_dir.join("bin").display().to_string();
        assert_eq!(profile.lines().filter(|l| l.contains(&bin)).count(), 1);
    }

    #[test]
    fn failed_payload_is_rolled_back() {
        let root = tempfile::tempdir().unwrap();
        let (file, install_dir) = fixture(
            &root,
            serde_json::json!([{ "id": "extras", "name": "Extras", "source": "not-there" }]),
        );
        let probe = rooted(root.path(), InstallScope::User);
        let mut orch = Orchestrator::with_platform(
            load(&file),
            Box::new(rooted(root.path(), InstallScope::User)),
        );

        let err = orch
            .run_unattended(&mut UnattendedView::new(Answers::default()))
            .unwrap_err();
        let SetupError::Install(install) = err else {
            panic!("expected an install error");
        };
        assert_eq!(install.component, "extras");
        assert!(install.message.contains("not-there"));

        // core was copied, then removed again
        assert!(!install_dir.join("bin/acme").exists());
        assert!(!install_dir.join("README").exists());
        assert_eq!(orch.stage(), OrchestrationStage::RolledBack);

        // Post-install never ran
        assert!(!probe.is_in_path(&install_dir.join("bin")).unwrap());
        assert!(!probe.receipt_file().exists());
    }
}
