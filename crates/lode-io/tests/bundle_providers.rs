// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use lode_core::{OperationRuntime, OperationStatus, ResourceLocation, ResourceManager};
use lode_io::{
    default_bundle_provider, AssetBundle, BundleMode, VirtualBundleSettings,
    ASSET_BUNDLE_PROVIDER_ID,
};

fn location(id: &str) -> ResourceLocation {
    ResourceLocation::new(id, id, ASSET_BUNDLE_PROVIDER_ID, Vec::new()).unwrap()
}

#[test]
fn settings_round_trip_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("virtual_bundles.ron");
    std::fs::write(
        &path,
        r#"(
            local_load_speed: 2048,
            bundles: [
                (name: "{Platform}/ui", size: 512),
                (name: "{Platform}/music", size: 4096, mode: Remote),
            ],
        )"#,
    )
    .unwrap();

    let settings = VirtualBundleSettings::load_from_path(&path)
        .unwrap()
        .expect("settings file exists");
    assert_eq!(settings.local_load_speed, 2048);
    assert_eq!(
        settings.remote_load_speed,
        VirtualBundleSettings::DEFAULT_REMOTE_LOAD_SPEED
    );
    assert_eq!(settings.bundles[1].mode, BundleMode::Remote);

    let copy = dir.path().join("copy.ron");
    settings.save_to_path(&copy).unwrap();
    assert_eq!(
        VirtualBundleSettings::load_from_path(&copy).unwrap(),
        Some(settings)
    );
}

#[test]
fn missing_settings_file_disables_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let settings = VirtualBundleSettings::load_from_path(dir.path().join("absent.ron")).unwrap();
    assert!(settings.is_none());
}

#[test]
fn malformed_settings_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ron");
    std::fs::write(&path, "(bundles: [").unwrap();
    assert!(VirtualBundleSettings::load_from_path(&path).is_err());
}

#[test]
fn file_provider_is_used_without_settings() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ui.bundle"), b"bytes").unwrap();
    let runtime = OperationRuntime::new();
    let manager = ResourceManager::new(runtime.clone());
    manager.register_provider(default_bundle_provider(&runtime, dir.path(), None));

    let op = manager.load::<AssetBundle>(&location("ui.bundle")).retain();
    manager.update(0.0);
    runtime.run_until_idle();
    assert_eq!(op.status(), OperationStatus::Succeeded);
    let bundle = op.result().unwrap();
    assert!(!bundle.simulated);
    assert_eq!(bundle.bytes, b"bytes");
    op.release();
}

#[cfg(feature = "simulation")]
#[test]
fn simulated_bundles_load_through_the_resource_manager() {
    use ahash::AHashMap;
    use lode_io::{expand_name_variables, VirtualBundleManager, VirtualBundleProvider};
    use std::rc::Rc;

    let mut variables = AHashMap::new();
    variables.insert("Platform".to_string(), "linux".to_string());
    let settings = VirtualBundleSettings::from_ron_str(
        r#"(local_load_speed: 100, bundles: [(name: "{Platform}/ui", size: 250)])"#,
    )
    .unwrap();

    let runtime = OperationRuntime::new();
    let simulator = VirtualBundleManager::create(Some(settings), runtime.clone(), |name| {
        expand_name_variables(name, &variables)
    })
    .unwrap();
    let manager = ResourceManager::new(runtime.clone());
    let provider = Rc::new(VirtualBundleProvider::new(simulator));
    manager.register_provider(provider.clone());

    let op = manager.load::<AssetBundle>(&location("linux/ui")).retain();
    runtime.run_until_idle();
    let mut ticks = 0;
    while !op.is_done() {
        manager.update(1.0);
        runtime.run_until_idle();
        ticks += 1;
        assert!(ticks < 10, "simulated load never finished");
    }

    assert_eq!(ticks, 3);
    assert_eq!(op.status(), OperationStatus::Succeeded);
    let bundle = op.result().unwrap();
    assert!(bundle.simulated);
    assert_eq!(bundle.name, "linux/ui");
    assert_eq!(bundle.size, 250);
    assert!(manager.release(&location("linux/ui")));
    assert_eq!(provider.manager().active_count(), 0);
    op.release();
}
