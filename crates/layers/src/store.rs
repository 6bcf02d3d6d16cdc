use std::sync::mpsc::{self, Receiver, Sender};

use catalog::LayerDefinition;

use crate::record::{ActiveLayerRecord, MAX_TRANSPARENCY, Tier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The layer is already active; surfaced to the user as a transient
    /// notice, the list is left unchanged.
    DuplicateActivation { id: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DuplicateActivation { id } => {
                write!(f, "layer \"{id}\" is already active")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// One snapshot of the active-layer list, sent to every subscriber after
/// each successful mutation. The list is newest-first: index 0 draws on
/// top of its tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEmission {
    pub revision: u64,
    pub records: Vec<ActiveLayerRecord>,
}

/// The single source of truth for which layers are meant to be rendered.
///
/// All UI actions (check a box, drag a row, move a slider) are expressed
/// as intents against this list, never as direct renderer calls. Each
/// successful intent renumbers `order_in_group` per tier, bumps the
/// revision and emits one full snapshot per subscriber; rejected or no-op
/// intents emit nothing.
#[derive(Debug, Default)]
pub struct ActiveLayerStore {
    records: Vec<ActiveLayerRecord>,
    revision: u64,
    subscribers: Vec<Sender<StoreEmission>>,
}

impl ActiveLayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ActiveLayerRecord] {
        &self.records
    }

    pub fn snapshot(&self) -> Vec<ActiveLayerRecord> {
        self.records.clone()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id() == id)
    }

    /// Registers a subscriber. Emissions are snapshots: later mutations
    /// never alter a list a subscriber already received.
    pub fn subscribe(&mut self) -> Receiver<StoreEmission> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Activates a layer at the top of its tier.
    pub fn activate(&mut self, definition: LayerDefinition, tier: Tier) -> Result<(), StoreError> {
        if self.is_active(&definition.id) {
            return Err(StoreError::DuplicateActivation { id: definition.id });
        }
        self.records.insert(0, ActiveLayerRecord::new(definition, tier));
        self.commit();
        Ok(())
    }

    /// Removes a layer. Returns `false` (and emits nothing) if absent.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id() != id);
        if self.records.len() == before {
            return false;
        }
        self.commit();
        true
    }

    /// Whole-list reorder, e.g. after a drag-and-drop in the work area.
    ///
    /// `ids` is the desired newest-first order; ids that are not active
    /// are ignored, and active records not named keep their relative
    /// order after the named ones. Returns `true` if the order changed.
    pub fn reorder(&mut self, ids: &[&str]) -> bool {
        let current: Vec<String> = self.records.iter().map(|r| r.id().to_string()).collect();

        let mut remaining = std::mem::take(&mut self.records);
        let mut reordered: Vec<ActiveLayerRecord> = Vec::with_capacity(remaining.len());
        for id in ids {
            if let Some(pos) = remaining.iter().position(|r| r.id() == *id) {
                reordered.push(remaining.remove(pos));
            }
        }
        reordered.append(&mut remaining);

        let changed = !current.iter().eq(reordered.iter().map(|r| r.id()));
        self.records = reordered;
        if !changed {
            return false;
        }
        self.commit();
        true
    }

    /// Sets a layer's transparency (clamped to 0–100).
    pub fn set_transparency(&mut self, id: &str, transparency: u8) -> bool {
        let transparency = transparency.min(MAX_TRANSPARENCY);
        let Some(record) = self.records.iter_mut().find(|r| r.id() == id) else {
            return false;
        };
        if record.transparency == transparency {
            return false;
        }
        record.transparency = transparency;
        self.commit();
        true
    }

    pub fn set_visibility(&mut self, id: &str, visible: bool) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| r.id() == id) else {
            return false;
        };
        if record.visible == visible {
            return false;
        }
        record.visible = visible;
        self.commit();
        true
    }

    /// Flips every record in one action and one emission. Applying the
    /// resulting visibility to the renderer is entirely the reconciler's
    /// job; this never calls the render surface.
    pub fn toggle_all(&mut self, visible: bool) -> bool {
        let mut changed = false;
        for record in &mut self.records {
            if record.visible != visible {
                record.visible = visible;
                changed = true;
            }
        }
        if changed {
            self.commit();
        }
        changed
    }

    /// Bulk-clears the list.
    pub fn clear(&mut self) -> bool {
        if self.records.is_empty() {
            return false;
        }
        self.records.clear();
        self.commit();
        true
    }

    fn commit(&mut self) {
        self.renumber();
        self.revision += 1;
        let emission = StoreEmission {
            revision: self.revision,
            records: self.records.clone(),
        };
        self.subscribers.retain(|tx| tx.send(emission.clone()).is_ok());
    }

    fn renumber(&mut self) {
        for tier in Tier::ALL {
            let mut next = 0usize;
            for record in self.records.iter_mut().filter(|r| r.tier == tier) {
                record.order_in_group = next;
                next += 1;
            }
        }
    }
}
