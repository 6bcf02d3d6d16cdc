//! Explicit user-driven maintenance of the work-area list.
//!
//! These paths bypass the automatic diff pass for UI affordances that
//! want immediate feedback. Bulk operations ("turn all layers on/off")
//! deliberately have no function here: they dispatch a single store
//! action and the reconciler's normal pass applies the result.

use layers::Tier;
use tracing::debug;

use crate::surface::RenderSurface;

/// Removes one layer immediately, e.g. from a delete button on a layer
/// card, without waiting for the next reconciliation emission.
///
/// The id is looked up in the *rendered* set rather than the declarative
/// list, so a record already removed by a concurrent update is a no-op.
/// Any drift this introduces is reconciled on the next pass. Returns
/// `true` if a layer was removed.
pub fn remove_rendered<S: RenderSurface>(surface: &mut S, id: &str, tier: Tier) -> bool {
    let Some(group) = surface.layer_group(tier) else {
        return false;
    };
    if group.position_of(id).is_none() {
        debug!(layer = id, tier = tier.name(), "not rendered, nothing to remove");
        return false;
    }
    surface.remove_layer(id, tier);
    true
}
