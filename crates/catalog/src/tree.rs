use crate::arena::CatalogTree;
use crate::definition::LayerDefinition;

/// Builds the canonical tree from a raw catalog response, as plain
/// nested data.
///
/// Raw responses legitimately repeat whole subtrees under some
/// organizational branches. Duplicates occur at matching depth, so the
/// check is per level: a node is dropped when a direct sibling with the
/// same `id` was already kept, first-seen order wins. Children are
/// deduplicated independently within each parent, so the same `id` under
/// two different parents survives.
///
/// Nodes with an empty `id` never match anything and are passed through
/// untouched.
///
/// Deduplication itself runs on the index-based [`CatalogTree`]; this is
/// the convenience view for consumers that want recursive data. Keep the
/// arena instead when the catalog is large.
pub fn build_unique_tree(raw: &[LayerDefinition]) -> Vec<LayerDefinition> {
    CatalogTree::from_raw(raw).to_nested()
}

/// Collects every leaf whose `checked` flag is set, in tree order.
///
/// These seed the active-layer store on startup; activation defaults
/// (tier, order, visibility, transparency) are applied by the store.
pub fn collect_checked_leaves(tree: &[LayerDefinition]) -> Vec<LayerDefinition> {
    let mut out = Vec::new();
    collect_checked_into(tree, &mut out);
    out
}

fn collect_checked_into(tree: &[LayerDefinition], out: &mut Vec<LayerDefinition>) {
    for node in tree {
        if node.is_leaf && node.checked {
            out.push(node.clone());
        }
        collect_checked_into(&node.children, out);
    }
}

/// Looks up a definition anywhere in the tree by `id`.
pub fn find_by_id<'a>(tree: &'a [LayerDefinition], id: &str) -> Option<&'a LayerDefinition> {
    for node in tree {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_by_id(&node.children, id) {
            return Some(found);
        }
    }
    None
}
