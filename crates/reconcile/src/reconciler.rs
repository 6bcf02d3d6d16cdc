use std::sync::mpsc::Receiver;

use layers::{ActiveLayerRecord, ActiveLayerStore, StoreEmission, Tier};
use tracing::{debug, warn};

use crate::surface::{RenderSurface, RenderedLayerHandle};

/// Lifecycle of one tier's reconciliation pass.
///
/// A pass never starts unless every tier is `Idle`, which makes the
/// no-concurrent-pass invariant structural rather than an accident of
/// single-threaded execution.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PassPhase {
    Idle,
    Diffing,
    Applying,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Applied,
    /// A tier named by the snapshot had no layer group. Nothing was
    /// applied, not even partially; the pass is retried on the next
    /// emission.
    SurfaceNotReady,
    /// A pass was already in flight.
    Busy,
}

#[derive(Debug, Default)]
struct TierPlan {
    removals: Vec<String>,
    /// Successive whole-collection orders, one per moved layer; the
    /// surface cannot move a single child without a rebuild.
    order_fixes: Vec<Vec<String>>,
    restyles: Vec<Restyle>,
    /// Oldest-first, so that prepending each keeps the newest on top.
    /// Full records, not just definitions: visuals mutated before the
    /// layer materialized (a skipped pass) must be pushed after the add.
    additions: Vec<ActiveLayerRecord>,
}

impl TierPlan {
    fn is_empty(&self) -> bool {
        self.removals.is_empty()
            && self.order_fixes.is_empty()
            && self.restyles.is_empty()
            && self.additions.is_empty()
    }
}

#[derive(Debug)]
struct Restyle {
    id: String,
    opacity: Option<u8>,
    visible: Option<bool>,
}

#[derive(Debug)]
struct TierState {
    phase: PassPhase,
}

/// Keeps each tier of the render surface in 1:1 correspondence with the
/// active-layer list: same id set, physical order matching the
/// newest-first declarative order, fewest possible adapter calls.
///
/// The reconciler is the single subscriber to the store's emission
/// stream and processes emissions strictly in order; each pass runs to
/// completion against the snapshot it received. Failures inside a pass
/// never propagate: they become skipped passes or warnings, because a
/// partially-applied render state is worse than a stale one that
/// self-corrects on the next emission.
#[derive(Debug)]
pub struct Reconciler {
    emissions: Receiver<StoreEmission>,
    /// Previous applied snapshot, for visual-parameter deltas.
    last_records: Vec<ActiveLayerRecord>,
    intermediate: TierState,
    upper: TierState,
}

impl Reconciler {
    pub fn new(emissions: Receiver<StoreEmission>) -> Self {
        Self {
            emissions,
            last_records: Vec::new(),
            intermediate: TierState { phase: PassPhase::Idle },
            upper: TierState { phase: PassPhase::Idle },
        }
    }

    /// Subscribes to `store` and starts observing. The reconciler is
    /// constructed once and lives for the application's lifetime; all
    /// interaction happens through the store.
    pub fn attach(store: &mut ActiveLayerStore) -> Self {
        Self::new(store.subscribe())
    }

    pub fn phase(&self, tier: Tier) -> PassPhase {
        self.tier_state(tier).phase
    }

    /// Processes every pending emission in order. Returns the number of
    /// passes that applied (skipped not-ready passes are retried when
    /// the store emits next).
    pub fn drain<S: RenderSurface>(&mut self, surface: &mut S) -> usize {
        let mut applied = 0;
        while let Ok(emission) = self.emissions.try_recv() {
            if self.apply(surface, &emission) == PassOutcome::Applied {
                applied += 1;
            }
        }
        applied
    }

    /// One reconciliation pass: diff `emission` against the surface's
    /// current collections and converge them.
    pub fn apply<S: RenderSurface>(
        &mut self,
        surface: &mut S,
        emission: &StoreEmission,
    ) -> PassOutcome {
        if self.intermediate.phase != PassPhase::Idle || self.upper.phase != PassPhase::Idle {
            warn!(revision = emission.revision, "pass already in flight, dropping emission");
            return PassOutcome::Busy;
        }

        // Readiness gate before any mutation: a pass is all-or-nothing.
        for tier in Tier::ALL {
            let tier_wanted = emission.records.iter().any(|r| r.tier == tier);
            if tier_wanted && surface.layer_group(tier).is_none() {
                debug!(
                    tier = tier.name(),
                    revision = emission.revision,
                    "tier group unavailable, skipping pass"
                );
                return PassOutcome::SurfaceNotReady;
            }
        }

        for tier in Tier::ALL {
            self.reconcile_tier(surface, emission, tier);
        }
        self.last_records = emission.records.clone();
        PassOutcome::Applied
    }

    fn reconcile_tier<S: RenderSurface>(
        &mut self,
        surface: &mut S,
        emission: &StoreEmission,
        tier: Tier,
    ) {
        self.tier_state_mut(tier).phase = PassPhase::Diffing;

        let Some(group) = surface.layer_group(tier) else {
            // Nothing wanted here (gated above) and nothing rendered.
            self.tier_state_mut(tier).phase = PassPhase::Idle;
            return;
        };

        let wanted: Vec<&ActiveLayerRecord> =
            emission.records.iter().filter(|r| r.tier == tier).collect();
        let current: Vec<String> = group.ids().map(str::to_string).collect();
        let plan = self.plan_tier(&wanted, current);

        self.tier_state_mut(tier).phase = PassPhase::Applying;
        if !plan.is_empty() {
            debug!(
                tier = tier.name(),
                revision = emission.revision,
                removals = plan.removals.len(),
                order_fixes = plan.order_fixes.len(),
                restyles = plan.restyles.len(),
                additions = plan.additions.len(),
                "applying pass"
            );
        }

        // Removals run before additions and order correction so removed
        // ids never collide with reused slots.
        for id in &plan.removals {
            surface.remove_layer(id, tier);
        }
        for order in plan.order_fixes {
            surface.set_ordered_layers(
                tier,
                order.into_iter().map(RenderedLayerHandle::new).collect(),
            );
        }
        for restyle in &plan.restyles {
            if let Some(transparency) = restyle.opacity {
                surface.set_opacity(&restyle.id, tier, transparency);
            }
            if let Some(visible) = restyle.visible {
                surface.set_visible(&restyle.id, tier, visible);
            }
        }
        for record in &plan.additions {
            if let Err(err) = surface.add_layer(&record.definition, tier) {
                warn!(layer = %record.definition.id, %err, "layer not added");
                continue;
            }
            // A fresh layer materializes visible and opaque; anything the
            // record accumulated before it could render must be pushed now.
            if record.transparency > 0 {
                surface.set_opacity(record.id(), tier, record.transparency);
            }
            if !record.visible {
                surface.set_visible(record.id(), tier, record.visible);
            }
        }

        // Additions land at the head of the group, but a record retried
        // after a skipped pass may belong mid-list by now. Settle the
        // final order against the snapshot once everything materialized.
        if !plan.additions.is_empty() {
            if let Some(group) = surface.layer_group(tier) {
                let desired: Vec<RenderedLayerHandle> = wanted
                    .iter()
                    .filter(|r| group.position_of(r.id()).is_some())
                    .map(|r| RenderedLayerHandle::new(r.id()))
                    .collect();
                if group.ordered_layers() != desired.as_slice() {
                    surface.set_ordered_layers(tier, desired);
                }
            }
        }

        self.tier_state_mut(tier).phase = PassPhase::Idle;
    }

    /// Pure diff of one tier. `current` is the physical topmost-first id
    /// list; `wanted` is the newest-first declarative list for the tier.
    /// Both sides use the same reversed orientation, so equal indices
    /// mean no drift.
    fn plan_tier(&self, wanted: &[&ActiveLayerRecord], mut current: Vec<String>) -> TierPlan {
        let mut plan = TierPlan::default();

        current.retain(|id| {
            let stale = !wanted.iter().any(|r| r.id() == id);
            if stale {
                plan.removals.push(id.clone());
            }
            !stale
        });

        // Still-present records, newest-first. Target index counts only
        // materialized layers; additions prepend afterwards and land on
        // top by themselves.
        let still: Vec<&ActiveLayerRecord> = wanted
            .iter()
            .copied()
            .filter(|r| current.iter().any(|id| id == r.id()))
            .collect();
        for (target, record) in still.iter().enumerate() {
            let Some(physical) = current.iter().position(|id| id == record.id()) else {
                continue;
            };
            if physical != target {
                let id = current.remove(physical);
                current.insert(target, id);
                plan.order_fixes.push(current.clone());
            }
            // A single emission can carry both a move and a restyle (the
            // store coalesces nothing, but a skipped pass does): check
            // visuals for every still-present record, drifted or not.
            if let Some(restyle) = self.visual_delta(record) {
                plan.restyles.push(restyle);
            }
        }

        for record in wanted.iter().rev() {
            if !current.iter().any(|id| id == record.id()) {
                plan.additions.push((*record).clone());
            }
        }

        plan
    }

    /// Visual-parameter delta against the previously applied snapshot.
    /// An unchanged record produces no adapter call at all; a changed
    /// record always gets its visibility pushed (covers both show and
    /// hide) and its opacity pushed when transparency moved, including
    /// back to 0 to restore a fully opaque layer.
    fn visual_delta(&self, record: &ActiveLayerRecord) -> Option<Restyle> {
        let prev = self.last_records.iter().find(|p| p.id() == record.id());
        match prev {
            Some(p) if p.visible == record.visible && p.transparency == record.transparency => {
                None
            }
            Some(p) => Some(Restyle {
                id: record.id().to_string(),
                opacity: (p.transparency != record.transparency).then_some(record.transparency),
                visible: Some(record.visible),
            }),
            // First sighting of an already-materialized layer (e.g. the
            // reconciler was attached after startup): push everything
            // that deviates from activation defaults.
            None => Some(Restyle {
                id: record.id().to_string(),
                opacity: (record.transparency > 0).then_some(record.transparency),
                visible: Some(record.visible),
            }),
        }
    }

    fn tier_state(&self, tier: Tier) -> &TierState {
        match tier {
            Tier::Intermediate => &self.intermediate,
            Tier::Upper => &self.upper,
        }
    }

    fn tier_state_mut(&mut self, tier: Tier) -> &mut TierState {
        match tier {
            Tier::Intermediate => &mut self.intermediate,
            Tier::Upper => &mut self.upper,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{MemoryRenderSurface, SurfaceOp};
    use catalog::{LayerDefinition, ServiceType};
    use pretty_assertions::assert_eq;

    fn leaf(id: &str) -> LayerDefinition {
        LayerDefinition::leaf(id, id.to_uppercase())
    }

    fn wired() -> (ActiveLayerStore, Reconciler, MemoryRenderSurface) {
        let mut store = ActiveLayerStore::new();
        let reconciler = Reconciler::attach(&mut store);
        (store, reconciler, MemoryRenderSurface::new())
    }

    #[test]
    fn order_preserving_add() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("b"), Tier::Intermediate).unwrap();
        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        reconciler.drain(&mut surface);
        assert_eq!(surface.tier_ids(Tier::Intermediate), ["a", "b"]);

        store.activate(leaf("c"), Tier::Intermediate).unwrap();
        assert_eq!(
            store.records().iter().map(|r| r.id()).collect::<Vec<_>>(),
            ["c", "a", "b"]
        );
        assert_eq!(reconciler.drain(&mut surface), 1);
        assert_eq!(surface.tier_ids(Tier::Intermediate), ["c", "a", "b"]);
    }

    #[test]
    fn converges_over_a_sequence_of_emissions() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        store.activate(leaf("u"), Tier::Upper).unwrap();
        store.activate(leaf("b"), Tier::Intermediate).unwrap();
        store.activate(leaf("c"), Tier::Intermediate).unwrap();
        store.remove("a");
        store.reorder(&["b", "c", "u"]);
        reconciler.drain(&mut surface);

        assert_eq!(surface.tier_ids(Tier::Intermediate), ["b", "c"]);
        assert_eq!(surface.tier_ids(Tier::Upper), ["u"]);
    }

    #[test]
    fn duplicate_activation_never_renders_twice() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        reconciler.drain(&mut surface);
        surface.take_ops();

        assert!(store.activate(leaf("a"), Tier::Intermediate).is_err());
        reconciler.drain(&mut surface);
        assert_eq!(surface.tier_ids(Tier::Intermediate), ["a"]);
        assert!(surface.take_ops().is_empty());
    }

    #[test]
    fn stale_layers_are_removed_before_additions() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        reconciler.drain(&mut surface);
        surface.take_ops();

        store.remove("a");
        store.activate(leaf("b"), Tier::Intermediate).unwrap();
        // Both emissions pending; each pass removes before adding.
        reconciler.drain(&mut surface);
        let ops = surface.take_ops();
        assert_eq!(
            ops,
            [
                SurfaceOp::Remove { id: "a".into(), tier: Tier::Intermediate },
                SurfaceOp::Add { id: "b".into(), tier: Tier::Intermediate },
            ]
        );
    }

    #[test]
    fn unchanged_pass_makes_zero_adapter_calls() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        store.activate(leaf("b"), Tier::Upper).unwrap();
        store.set_transparency("a", 30);
        reconciler.drain(&mut surface);
        surface.take_ops();

        // Re-apply the exact same snapshot: order and visuals unchanged.
        let snapshot = StoreEmission {
            revision: store.revision(),
            records: store.snapshot(),
        };
        assert_eq!(reconciler.apply(&mut surface, &snapshot), PassOutcome::Applied);
        assert!(surface.take_ops().is_empty());
    }

    #[test]
    fn transparency_change_restyles_in_place() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        reconciler.drain(&mut surface);
        surface.take_ops();

        store.set_transparency("a", 50);
        reconciler.drain(&mut surface);
        assert_eq!(
            surface.take_ops(),
            [
                SurfaceOp::SetOpacity { id: "a".into(), tier: Tier::Intermediate, transparency: 50 },
                SurfaceOp::SetVisible { id: "a".into(), tier: Tier::Intermediate, visible: true },
            ]
        );

        // Back to opaque still pushes the opacity so the layer recovers.
        store.set_transparency("a", 0);
        reconciler.drain(&mut surface);
        assert_eq!(
            surface.take_ops(),
            [
                SurfaceOp::SetOpacity { id: "a".into(), tier: Tier::Intermediate, transparency: 0 },
                SurfaceOp::SetVisible { id: "a".into(), tier: Tier::Intermediate, visible: true },
            ]
        );
    }

    #[test]
    fn visibility_change_does_not_touch_opacity() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        reconciler.drain(&mut surface);
        surface.take_ops();

        store.set_visibility("a", false);
        reconciler.drain(&mut surface);
        assert_eq!(
            surface.take_ops(),
            [SurfaceOp::SetVisible { id: "a".into(), tier: Tier::Intermediate, visible: false }]
        );
    }

    #[test]
    fn bulk_toggle_is_applied_by_the_normal_diff_pass() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        store.activate(leaf("b"), Tier::Upper).unwrap();
        reconciler.drain(&mut surface);
        surface.take_ops();

        store.toggle_all(false);
        reconciler.drain(&mut surface);
        let mut ops = surface.take_ops();
        ops.sort_by_key(|op| match op {
            SurfaceOp::SetVisible { id, .. } => id.clone(),
            _ => String::new(),
        });
        assert_eq!(
            ops,
            [
                SurfaceOp::SetVisible { id: "a".into(), tier: Tier::Intermediate, visible: false },
                SurfaceOp::SetVisible { id: "b".into(), tier: Tier::Upper, visible: false },
            ]
        );
    }

    #[test]
    fn drag_reorder_rebuilds_the_collection_once() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        store.activate(leaf("b"), Tier::Intermediate).unwrap();
        store.activate(leaf("c"), Tier::Intermediate).unwrap();
        reconciler.drain(&mut surface);
        surface.take_ops();
        assert_eq!(surface.tier_ids(Tier::Intermediate), ["c", "b", "a"]);

        store.reorder(&["a", "c", "b"]);
        reconciler.drain(&mut surface);
        let ops = surface.take_ops();
        assert_eq!(
            ops,
            [SurfaceOp::ReplaceOrder {
                tier: Tier::Intermediate,
                ids: vec!["a".into(), "c".into(), "b".into()]
            }]
        );
        assert_eq!(surface.tier_ids(Tier::Intermediate), ["a", "c", "b"]);
    }

    #[test]
    fn not_ready_surface_skips_the_whole_pass() {
        let mut store = ActiveLayerStore::new();
        let mut reconciler = Reconciler::attach(&mut store);
        let mut surface = MemoryRenderSurface::not_ready();

        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        assert_eq!(reconciler.drain(&mut surface), 0);
        assert!(surface.take_ops().is_empty());

        // Retried transparently on the next emission once the surface is up.
        surface.make_ready();
        store.activate(leaf("b"), Tier::Intermediate).unwrap();
        assert_eq!(reconciler.drain(&mut surface), 1);
        assert_eq!(surface.tier_ids(Tier::Intermediate), ["b", "a"]);
    }

    // Visual intents dispatched while the surface was down must survive
    // the skipped passes and reach the layer when it finally materializes.
    #[test]
    fn visuals_set_while_surface_down_reach_the_added_layer() {
        let mut store = ActiveLayerStore::new();
        let mut reconciler = Reconciler::attach(&mut store);
        let mut surface = MemoryRenderSurface::not_ready();

        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        store.set_transparency("a", 50);
        assert_eq!(reconciler.drain(&mut surface), 0);
        assert!(surface.take_ops().is_empty());

        surface.make_ready();
        store.set_visibility("a", false);
        assert_eq!(reconciler.drain(&mut surface), 1);
        assert_eq!(
            surface.take_ops(),
            [
                SurfaceOp::Add { id: "a".into(), tier: Tier::Intermediate },
                SurfaceOp::SetOpacity { id: "a".into(), tier: Tier::Intermediate, transparency: 50 },
                SurfaceOp::SetVisible { id: "a".into(), tier: Tier::Intermediate, visible: false },
            ]
        );

        // Converged: re-applying the same snapshot has nothing to do.
        let snapshot = StoreEmission {
            revision: store.revision(),
            records: store.snapshot(),
        };
        assert_eq!(reconciler.apply(&mut surface, &snapshot), PassOutcome::Applied);
        assert!(surface.take_ops().is_empty());
    }

    // One emission carrying both a position change and a visual change
    // (the shape a retried pass sees) applies both.
    #[test]
    fn move_and_restyle_in_one_emission_apply_both() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        store.activate(leaf("b"), Tier::Intermediate).unwrap();
        reconciler.drain(&mut surface);
        surface.take_ops();

        store.set_transparency("b", 60);
        store.reorder(&["a", "b"]);
        let snapshot = StoreEmission {
            revision: store.revision(),
            records: store.snapshot(),
        };
        assert_eq!(reconciler.apply(&mut surface, &snapshot), PassOutcome::Applied);
        assert_eq!(
            surface.take_ops(),
            [
                SurfaceOp::ReplaceOrder {
                    tier: Tier::Intermediate,
                    ids: vec!["a".into(), "b".into()]
                },
                SurfaceOp::SetOpacity { id: "b".into(), tier: Tier::Intermediate, transparency: 60 },
                SurfaceOp::SetVisible { id: "b".into(), tier: Tier::Intermediate, visible: true },
            ]
        );
    }

    // A record activated during a skipped pass and reordered before the
    // retry belongs mid-list; the pass must converge on the snapshot
    // order, not leave the late addition at the head.
    #[test]
    fn retried_addition_lands_at_its_snapshot_position() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("a"), Tier::Intermediate).unwrap();
        store.activate(leaf("b"), Tier::Intermediate).unwrap();
        reconciler.drain(&mut surface);
        surface.take_ops();
        assert_eq!(surface.tier_ids(Tier::Intermediate), ["b", "a"]);

        store.activate(leaf("c"), Tier::Intermediate).unwrap();
        store.reorder(&["b", "c", "a"]);
        let snapshot = StoreEmission {
            revision: store.revision(),
            records: store.snapshot(),
        };
        assert_eq!(reconciler.apply(&mut surface, &snapshot), PassOutcome::Applied);
        assert_eq!(surface.tier_ids(Tier::Intermediate), ["b", "c", "a"]);
        assert_eq!(
            surface.take_ops(),
            [
                SurfaceOp::Add { id: "c".into(), tier: Tier::Intermediate },
                SurfaceOp::ReplaceOrder {
                    tier: Tier::Intermediate,
                    ids: vec!["b".into(), "c".into(), "a".into()]
                },
            ]
        );
    }

    #[test]
    fn unsupported_service_only_skips_that_layer() {
        let mut store = ActiveLayerStore::new();
        let mut reconciler = Reconciler::attach(&mut store);
        let mut surface =
            MemoryRenderSurface::with_supported_services(&[ServiceType::WebMapService]);

        let tiles = leaf("tiles").with_service(ServiceType::RestTile, "https://tiles");
        store.activate(tiles, Tier::Intermediate).unwrap();
        store.activate(leaf("wms"), Tier::Intermediate).unwrap();
        assert_eq!(reconciler.drain(&mut surface), 2);
        assert_eq!(surface.tier_ids(Tier::Intermediate), ["wms"]);
    }

    // Startup path end to end: raw catalog with a duplicated branch,
    // dedup, auto-activation of the pre-checked leaf, one pass.
    #[test]
    fn checked_catalog_leaf_ends_up_rendered() {
        use crate::bootstrap::{AutoActivateOutcome, AutoActivator};
        use catalog::{build_unique_tree, collect_checked_leaves};

        let branch = LayerDefinition::branch(
            "1",
            "Root",
            vec![LayerDefinition::leaf("1.1", "Leaf").with_checked(true)],
        );
        let tree = build_unique_tree(&[branch.clone(), branch]);
        assert_eq!(tree.len(), 1);

        let mut store = ActiveLayerStore::new();
        let mut reconciler = Reconciler::attach(&mut store);
        let mut surface = MemoryRenderSurface::new();

        let mut activator = AutoActivator::new(collect_checked_leaves(&tree));
        assert_eq!(activator.poll(&mut store, surface.is_ready()), AutoActivateOutcome::Activated(1));
        reconciler.drain(&mut surface);

        assert_eq!(surface.tier_ids(Tier::Intermediate), ["1.1"]);
        assert!(surface.tier_ids(Tier::Upper).is_empty());
    }

    #[test]
    fn phases_return_to_idle_after_a_pass() {
        let (mut store, mut reconciler, mut surface) = wired();
        store.activate(leaf("a"), Tier::Upper).unwrap();
        reconciler.drain(&mut surface);
        assert_eq!(reconciler.phase(Tier::Intermediate), PassPhase::Idle);
        assert_eq!(reconciler.phase(Tier::Upper), PassPhase::Idle);
    }
}
