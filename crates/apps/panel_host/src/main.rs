use std::env;
use std::thread;

use catalog::{CatalogError, CatalogTree, ServiceType, parse_catalog};
use layers::{ActiveLayerStore, Tier};
use reconcile::{AutoActivateOutcome, AutoActivator, MemoryRenderSurface, Reconciler, work_area};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Used when no catalog path is given on the command line.
const SAMPLE_CATALOG: &str = r#"[
  {
    "id": "base", "title": "Base maps", "children": [
      {"id": "base.osm", "title": "OpenStreetMap", "is_leaf": true,
       "service_type": "rest_tile", "service_url": "https://tile.example/osm",
       "checked": true},
      {"id": "base.aerial", "title": "Aerial imagery", "is_leaf": true,
       "service_type": "web_map_service", "service_url": "https://wms.example/aerial"}
    ]
  },
  {
    "id": "census", "title": "Census", "children": [
      {"id": "census.pop", "title": "Population", "children": [
        {"id": "census.pop.density", "title": "Population density", "is_leaf": true,
         "service_type": "web_map_service", "service_url": "https://wms.example/census"}
      ]},
      {"id": "census.pop", "title": "Population", "children": [
        {"id": "census.pop.density", "title": "Population density", "is_leaf": true,
         "service_type": "web_map_service", "service_url": "https://wms.example/census"}
      ]}
    ]
  }
]"#;

fn main() -> Result<(), CatalogError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let raw = match env::args().nth(1) {
        Some(path) => {
            std::fs::read_to_string(&path).map_err(|e| CatalogError::Io(e.to_string()))?
        }
        None => SAMPLE_CATALOG.to_string(),
    };

    let tree = CatalogTree::from_raw(&parse_catalog(&raw)?);
    info!(roots = tree.roots().len(), nodes = tree.len(), "catalog loaded");

    let mut store = ActiveLayerStore::new();
    let mut reconciler = Reconciler::attach(&mut store);
    let mut surface = MemoryRenderSurface::new();

    // Seed the active list from pre-checked leaves, retrying on the
    // activator's spacing until the surface is up or the budget runs out.
    let checked: Vec<_> = tree.checked_leaves().into_iter().cloned().collect();
    let mut activator = AutoActivator::new(checked);
    let spacing = activator.policy().spacing;
    loop {
        match activator.poll(&mut store, surface.is_ready()) {
            AutoActivateOutcome::Activated(n) => {
                info!(activated = n, "auto-activation done");
                break;
            }
            AutoActivateOutcome::Waiting { attempts_left } => {
                info!(attempts_left, "surface not ready, retrying");
                thread::sleep(spacing);
            }
            AutoActivateOutcome::GaveUp => break,
        }
    }
    reconciler.drain(&mut surface);
    print_tiers("after auto-activation", &surface);

    // A short scripted session standing in for layer-panel interaction.
    if let Some(aerial) = tree.get("base.aerial") {
        match store.activate(aerial.clone(), Tier::Intermediate) {
            Ok(()) => {}
            Err(err) => warn!(%err, "activation rejected"),
        }
    }
    if let Some(density) = tree.get("census.pop.density") {
        if let Err(err) = store.activate(density.clone(), Tier::Upper) {
            warn!(%err, "activation rejected");
        }
    }
    store.set_transparency("base.aerial", 40);
    store.set_visibility("base.osm", false);
    reconciler.drain(&mut surface);
    print_tiers("after activations", &surface);

    store.reorder(&["base.osm", "base.aerial"]);
    reconciler.drain(&mut surface);
    print_tiers("after reorder", &surface);

    // Immediate single-layer delete from the work area; the store
    // catches up and the next pass reconciles any drift.
    work_area::remove_rendered(&mut surface, "census.pop.density", Tier::Upper);
    store.remove("census.pop.density");
    reconciler.drain(&mut surface);
    print_tiers("after delete", &surface);

    let wms_count = store
        .records()
        .iter()
        .filter(|r| r.definition.service_type == ServiceType::WebMapService)
        .count();
    info!(active = store.len(), wms = wms_count, "session finished");
    Ok(())
}

fn print_tiers(label: &str, surface: &MemoryRenderSurface) {
    for tier in Tier::ALL {
        println!(
            "{label}: {} = [{}]",
            tier.name(),
            surface.tier_ids(tier).join(", ")
        );
    }
}
