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

use ahash::AHashMap;
use anyhow::Result;
use lode_core::{
    AsyncOperation, OperationRuntime, OperationStatus, PoolSettings, ResourceLocation,
    ResourceManager,
};
use lode_io::{
    default_bundle_provider, expand_name_variables, AssetBundle, BundleMode, VirtualBundleDesc,
    VirtualBundleManager, VirtualBundleProvider, VirtualBundleSettings, ASSET_BUNDLE_PROVIDER_ID,
};
use std::rc::Rc;

const TICK_SECONDS: f32 = 1.0 / 30.0;
const MAX_TICKS: u32 = 30 * 120;

fn demo_settings() -> VirtualBundleSettings {
    let bundle = |name: &str, size: u64, mode: BundleMode| VirtualBundleDesc {
        name: name.to_string(),
        size,
        mode,
    };
    VirtualBundleSettings {
        bundles: vec![
            bundle("{Platform}/textures", 24 * 1024 * 1024, BundleMode::Local),
            bundle("{Platform}/audio", 8 * 1024 * 1024, BundleMode::Local),
            bundle("{Platform}/dlc", 512 * 1024, BundleMode::Remote),
            bundle("{Platform}/level", 2 * 1024 * 1024, BundleMode::Local),
        ],
        ..Default::default()
    }
}

fn bundle_location(name: &str, dependencies: Vec<ResourceLocation>) -> Result<ResourceLocation> {
    let id = format!("{}/{}", std::env::consts::OS, name);
    Ok(ResourceLocation::new(name, id, ASSET_BUNDLE_PROVIDER_ID, dependencies)?)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "virtual_bundles.ron".to_string());
    let settings = VirtualBundleSettings::load_from_path(&settings_path)?.unwrap_or_else(|| {
        log::info!("Using built-in demo bundles");
        demo_settings()
    });

    let mut variables = AHashMap::new();
    variables.insert("Platform".to_string(), std::env::consts::OS.to_string());

    let runtime = OperationRuntime::with_settings(PoolSettings::default());
    let manager = ResourceManager::new(runtime.clone());
    match VirtualBundleManager::create(Some(settings), runtime.clone(), |name| {
        expand_name_variables(name, &variables)
    }) {
        Some(simulator) => {
            manager.register_provider(Rc::new(VirtualBundleProvider::new(simulator)));
        }
        None => manager.register_provider(default_bundle_provider(&runtime, "bundles", None)),
    }

    let level = bundle_location(
        "level",
        vec![
            bundle_location("textures", Vec::new())?,
            bundle_location("audio", Vec::new())?,
        ],
    )?;
    let dlc = bundle_location("dlc", Vec::new())?;

    let loads: Vec<AsyncOperation<Rc<AssetBundle>>> = [&level, &dlc]
        .into_iter()
        .map(|location| {
            let operation = manager.load::<AssetBundle>(location).retain();
            operation.on_completed(|operation| {
                match operation.result() {
                    Some(bundle) => log::info!(
                        "{} ready: '{}' ({} bytes)",
                        operation,
                        bundle.name,
                        bundle.size
                    ),
                    None => log::warn!("{} failed: {:?}", operation, operation.error()),
                }
                Ok(())
            });
            operation
        })
        .collect();

    let mut ticks = 0;
    while !loads.iter().all(AsyncOperation::is_done) && ticks < MAX_TICKS {
        manager.update(TICK_SECONDS);
        ticks += 1;
        if ticks % 30 == 0 {
            let progress: Vec<String> = loads
                .iter()
                .map(|op| format!("{:.0}%", op.percent_complete() * 100.0))
                .collect();
            log::info!("t={:>3}s progress {}", ticks / 30, progress.join(" / "));
        }
    }
    runtime.run_until_idle();

    let succeeded = loads
        .iter()
        .filter(|op| op.status() == OperationStatus::Succeeded)
        .count();
    log::info!(
        "{succeeded}/{} loads succeeded after {ticks} ticks, {} operations recycled",
        loads.len(),
        runtime.recycled_total()
    );
    for operation in loads {
        operation.release();
    }
    manager.release(&dlc);
    Ok(())
}
