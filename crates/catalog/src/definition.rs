use serde::{Deserialize, Serialize};

/// How a layer's imagery or features are served.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    WebMapService,
    RestTile,
    File,
}

impl Default for ServiceType {
    fn default() -> Self {
        ServiceType::WebMapService
    }
}

/// Whether a catalog entry comes from our own services or a third party.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Internal,
    External,
}

impl Default for Origin {
    fn default() -> Self {
        Origin::Internal
    }
}

/// One entry of the layer catalog.
///
/// Leaves (`is_leaf`) are selectable layers; branches are organizational
/// only and carry their entries in `children`. Within a canonical tree
/// (see [`crate::tree::build_unique_tree`]) no two siblings share an `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub is_leaf: bool,
    #[serde(default)]
    pub children: Vec<LayerDefinition>,
    #[serde(default)]
    pub service_type: ServiceType,
    #[serde(default)]
    pub service_url: String,
    /// Auto-activate this layer once the render surface is up.
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata_url: Option<String>,
    #[serde(default)]
    pub origin: Origin,
}

impl LayerDefinition {
    pub fn leaf(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            is_leaf: true,
            children: Vec::new(),
            service_type: ServiceType::default(),
            service_url: String::new(),
            checked: false,
            description: None,
            metadata_url: None,
            origin: Origin::default(),
        }
    }

    pub fn branch(
        id: impl Into<String>,
        title: impl Into<String>,
        children: Vec<LayerDefinition>,
    ) -> Self {
        Self {
            is_leaf: false,
            children,
            ..Self::leaf(id, title)
        }
    }

    /// Copy of this node alone, children left empty. Field-by-field so
    /// that no subtree is cloned along the way.
    pub fn without_children(&self) -> Self {
        Self {
            id: self.id.clone(),
            title: self.title.clone(),
            is_leaf: self.is_leaf,
            children: Vec::new(),
            service_type: self.service_type,
            service_url: self.service_url.clone(),
            checked: self.checked,
            description: self.description.clone(),
            metadata_url: self.metadata_url.clone(),
            origin: self.origin,
        }
    }

    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn with_service(mut self, service_type: ServiceType, url: impl Into<String>) -> Self {
        self.service_type = service_type;
        self.service_url = url.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    Parse(String),
    Io(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Parse(msg) => write!(f, "catalog response malformed: {msg}"),
            CatalogError::Io(msg) => write!(f, "catalog read error: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Parses a raw catalog response.
///
/// Responses come either as a list of root entries or as a single root
/// node; both shapes are accepted. The result is *not* deduplicated —
/// feed it through [`crate::tree::build_unique_tree`].
pub fn parse_catalog(json: &str) -> Result<Vec<LayerDefinition>, CatalogError> {
    match serde_json::from_str::<Vec<LayerDefinition>>(json) {
        Ok(list) => Ok(list),
        Err(list_err) => match serde_json::from_str::<LayerDefinition>(json) {
            Ok(node) => Ok(vec![node]),
            Err(_) => Err(CatalogError::Parse(list_err.to_string())),
        },
    }
}
