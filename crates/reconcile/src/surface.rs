use catalog::{LayerDefinition, ServiceType};
use layers::Tier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The surface (or the requested tier group) has not initialized yet.
    /// Expected during startup races; callers skip and retry, never fail.
    SurfaceNotReady,
    /// No render strategy exists for this service type. The layer is
    /// skipped; no other layer is affected.
    UnsupportedService { id: String, service_type: ServiceType },
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::SurfaceNotReady => write!(f, "render surface not ready"),
            RenderError::UnsupportedService { id, service_type } => {
                write!(f, "layer \"{id}\": no render strategy for {service_type:?}")
            }
        }
    }
}

impl std::error::Error for RenderError {}

/// The renderer's live layer object, tagged with the `id` of the
/// definition it materializes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLayerHandle {
    pub id: String,
}

impl RenderedLayerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Ordered snapshot of one tier's physical layer collection, topmost
/// first. Read-only: replacing the order goes back through
/// [`RenderSurface::set_ordered_layers`], because the underlying surface
/// only supports whole-collection reassignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerGroupHandle {
    layers: Vec<RenderedLayerHandle>,
}

impl LayerGroupHandle {
    pub fn new(layers: Vec<RenderedLayerHandle>) -> Self {
        Self { layers }
    }

    pub fn ordered_layers(&self) -> &[RenderedLayerHandle] {
        &self.layers
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.id.as_str())
    }
}

/// Primitive operations of the render surface adapter.
///
/// The reconciler is the exclusive owner of each tier it manages; the
/// only other caller is the explicit single-layer delete path in
/// [`crate::work_area`].
pub trait RenderSurface {
    fn add_layer(&mut self, definition: &LayerDefinition, tier: Tier) -> Result<(), RenderError>;
    fn remove_layer(&mut self, id: &str, tier: Tier);
    /// `None` until the surface has initialized the tier.
    fn layer_group(&self, tier: Tier) -> Option<LayerGroupHandle>;
    /// Whole-collection replace for the tier, topmost first.
    fn set_ordered_layers(&mut self, tier: Tier, ordered: Vec<RenderedLayerHandle>);
    fn set_opacity(&mut self, id: &str, tier: Tier, transparency: u8);
    fn set_visible(&mut self, id: &str, tier: Tier, visible: bool);
}

/// One recorded adapter call, for asserting exact call sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOp {
    Add { id: String, tier: Tier },
    Remove { id: String, tier: Tier },
    ReplaceOrder { tier: Tier, ids: Vec<String> },
    SetOpacity { id: String, tier: Tier, transparency: u8 },
    SetVisible { id: String, tier: Tier, visible: bool },
}

/// In-memory render surface.
///
/// Backs the host binary and the test suite. New layers are inserted at
/// the head of their tier (newest draws on top); every adapter call is
/// appended to a drainable op log.
#[derive(Debug)]
pub struct MemoryRenderSurface {
    intermediate: Option<Vec<RenderedLayerHandle>>,
    upper: Option<Vec<RenderedLayerHandle>>,
    supported: Vec<ServiceType>,
    ops: Vec<SurfaceOp>,
}

const ALL_SERVICES: [ServiceType; 3] =
    [ServiceType::WebMapService, ServiceType::RestTile, ServiceType::File];

impl MemoryRenderSurface {
    /// A surface with both tiers initialized and every service supported.
    pub fn new() -> Self {
        Self {
            intermediate: Some(Vec::new()),
            upper: Some(Vec::new()),
            supported: ALL_SERVICES.to_vec(),
            ops: Vec::new(),
        }
    }

    /// A surface that has not initialized its tier groups yet.
    pub fn not_ready() -> Self {
        Self {
            intermediate: None,
            upper: None,
            supported: ALL_SERVICES.to_vec(),
            ops: Vec::new(),
        }
    }

    pub fn with_supported_services(services: &[ServiceType]) -> Self {
        Self {
            supported: services.to_vec(),
            ..Self::new()
        }
    }

    /// Initializes both tier groups (empty), simulating startup finishing.
    pub fn make_ready(&mut self) {
        self.intermediate.get_or_insert_with(Vec::new);
        self.upper.get_or_insert_with(Vec::new);
    }

    pub fn is_ready(&self) -> bool {
        self.intermediate.is_some() && self.upper.is_some()
    }

    /// Topmost-first ids of a tier; empty if the tier is uninitialized.
    pub fn tier_ids(&self, tier: Tier) -> Vec<String> {
        self.group(tier)
            .map(|g| g.iter().map(|l| l.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn ops(&self) -> &[SurfaceOp] {
        &self.ops
    }

    /// Drains the op log.
    pub fn take_ops(&mut self) -> Vec<SurfaceOp> {
        std::mem::take(&mut self.ops)
    }

    fn group(&self, tier: Tier) -> Option<&Vec<RenderedLayerHandle>> {
        match tier {
            Tier::Intermediate => self.intermediate.as_ref(),
            Tier::Upper => self.upper.as_ref(),
        }
    }

    fn group_mut(&mut self, tier: Tier) -> Option<&mut Vec<RenderedLayerHandle>> {
        match tier {
            Tier::Intermediate => self.intermediate.as_mut(),
            Tier::Upper => self.upper.as_mut(),
        }
    }
}

impl Default for MemoryRenderSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface for MemoryRenderSurface {
    fn add_layer(&mut self, definition: &LayerDefinition, tier: Tier) -> Result<(), RenderError> {
        if !self.supported.contains(&definition.service_type) {
            return Err(RenderError::UnsupportedService {
                id: definition.id.clone(),
                service_type: definition.service_type,
            });
        }
        let id = definition.id.clone();
        let Some(group) = self.group_mut(tier) else {
            return Err(RenderError::SurfaceNotReady);
        };
        group.insert(0, RenderedLayerHandle::new(id.clone()));
        self.ops.push(SurfaceOp::Add { id, tier });
        Ok(())
    }

    fn remove_layer(&mut self, id: &str, tier: Tier) {
        if let Some(group) = self.group_mut(tier) {
            group.retain(|l| l.id != id);
        }
        self.ops.push(SurfaceOp::Remove { id: id.to_string(), tier });
    }

    fn layer_group(&self, tier: Tier) -> Option<LayerGroupHandle> {
        self.group(tier).map(|g| LayerGroupHandle::new(g.clone()))
    }

    fn set_ordered_layers(&mut self, tier: Tier, ordered: Vec<RenderedLayerHandle>) {
        let ids = ordered.iter().map(|l| l.id.clone()).collect();
        if let Some(group) = self.group_mut(tier) {
            *group = ordered;
        }
        self.ops.push(SurfaceOp::ReplaceOrder { tier, ids });
    }

    fn set_opacity(&mut self, id: &str, tier: Tier, transparency: u8) {
        self.ops.push(SurfaceOp::SetOpacity {
            id: id.to_string(),
            tier,
            transparency,
        });
    }

    fn set_visible(&mut self, id: &str, tier: Tier, visible: bool) {
        self.ops.push(SurfaceOp::SetVisible {
            id: id.to_string(),
            tier,
            visible,
        });
    }
}
