use crate::definition::LayerDefinition;

/// Index of a node inside a [`CatalogTree`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogNode {
    /// The node's own data; its `children` field is always empty here,
    /// the tree shape lives in the index lists.
    pub definition: LayerDefinition,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

/// The canonical catalog tree, stored as a flat arena.
///
/// Building from a raw response deduplicates per level exactly like
/// [`crate::tree::build_unique_tree`] (first-seen order wins, empty ids
/// pass through, the same id under two parents survives), but parent and
/// child relationships are index references, so no subtree is ever
/// structurally cloned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogTree {
    nodes: Vec<CatalogNode>,
    roots: Vec<NodeId>,
}

impl CatalogTree {
    pub fn from_raw(raw: &[LayerDefinition]) -> Self {
        let mut tree = Self::default();
        tree.roots = tree.build_level(raw, None);
        tree
    }

    fn build_level(&mut self, level: &[LayerDefinition], parent: Option<NodeId>) -> Vec<NodeId> {
        let mut kept: Vec<NodeId> = Vec::new();
        for raw_node in level {
            let duplicate = !raw_node.id.is_empty()
                && kept
                    .iter()
                    .any(|&id| self.nodes[id.index()].definition.id == raw_node.id);
            if duplicate {
                continue;
            }

            let id = NodeId(self.nodes.len() as u32);
            self.nodes.push(CatalogNode {
                definition: raw_node.without_children(),
                children: Vec::new(),
                parent,
            });
            let children = self.build_level(&raw_node.children, Some(id));
            self.nodes[id.index()].children = children;
            kept.push(id);
        }
        kept
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> &CatalogNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a definition anywhere in the tree by layer id.
    pub fn get(&self, layer_id: &str) -> Option<&LayerDefinition> {
        self.nodes
            .iter()
            .map(|n| &n.definition)
            .find(|d| d.id == layer_id)
    }

    /// Every leaf flagged `checked`, in tree order.
    pub fn checked_leaves(&self) -> Vec<&LayerDefinition> {
        let mut out = Vec::new();
        for &root in &self.roots {
            self.collect_checked(root, &mut out);
        }
        out
    }

    fn collect_checked<'a>(&'a self, id: NodeId, out: &mut Vec<&'a LayerDefinition>) {
        let node = self.node(id);
        if node.definition.is_leaf && node.definition.checked {
            out.push(&node.definition);
        }
        for &child in &node.children {
            self.collect_checked(child, out);
        }
    }

    /// Materializes the nested representation, for consumers that want
    /// plain recursive data (the layer-panel checkbox tree does).
    pub fn to_nested(&self) -> Vec<LayerDefinition> {
        self.roots.iter().map(|&id| self.materialize(id)).collect()
    }

    fn materialize(&self, id: NodeId) -> LayerDefinition {
        let node = self.node(id);
        let mut definition = node.definition.clone();
        definition.children = node
            .children
            .iter()
            .map(|&child| self.materialize(child))
            .collect();
        definition
    }
}
