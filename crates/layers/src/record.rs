use catalog::LayerDefinition;
use serde::{Deserialize, Serialize};

/// A named z-band of the render surface's stacking order.
///
/// Every layer in `Upper` draws above every layer in `Intermediate`;
/// ordering *within* a tier is governed by the active-layer list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Intermediate,
    Upper,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Tier::Intermediate, Tier::Upper];

    pub fn name(self) -> &'static str {
        match self {
            Tier::Intermediate => "intermediate",
            Tier::Upper => "upper",
        }
    }
}

/// Transparency values are percentages; 0 is fully opaque.
pub const MAX_TRANSPARENCY: u8 = 100;

/// One entry of the active-layer list: a layer that is currently meant
/// to be rendered, independent of whether it has been materialized yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLayerRecord {
    pub definition: LayerDefinition,
    pub tier: Tier,
    /// Position within the tier, most-recently-added first.
    pub order_in_group: usize,
    pub visible: bool,
    /// 0–100, 0 = opaque.
    pub transparency: u8,
}

impl ActiveLayerRecord {
    /// Activation defaults: visible, opaque, top of its tier.
    pub fn new(definition: LayerDefinition, tier: Tier) -> Self {
        Self {
            definition,
            tier,
            order_in_group: 0,
            visible: true,
            transparency: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }
}
