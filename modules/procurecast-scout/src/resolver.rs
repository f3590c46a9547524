use std::collections::BTreeSet;

use tracing::info;

use procurecast_common::AgencyId;
use procurecast_store::{ProcurementStore, StoreResult};

/// Agencies relevant to a region: the first agency whose name contains
/// `region`, its direct children, and the DOT of the parent's state.
///
/// One hop only. Grandchildren are not collected. No parent match is an
/// empty result, not an error. Ids come back sorted.
pub async fn resolve_region(store: &dyn ProcurementStore, region: &str) -> StoreResult<Vec<AgencyId>> {
    let Some(parent) = store.find_agency_by_name(region).await? else {
        info!(region, "No parent agency found for region");
        return Ok(Vec::new());
    };
    info!(
        region,
        parent_id = parent.agency_id,
        parent = parent.name.as_str(),
        state = parent.state.as_deref().unwrap_or("-"),
        "Found parent agency"
    );

    let mut ids = BTreeSet::from([parent.agency_id]);

    let children = store.child_agency_ids(parent.agency_id).await?;
    info!(region, count = children.len(), "Found child agencies");
    ids.extend(children);

    if let Some(state) = parent.state.as_deref() {
        if let Some(dot) = store.state_dot(state).await? {
            info!(region, state, dot_id = dot, "Found state DOT");
            ids.insert(dot);
        }
    }

    info!(region, total = ids.len(), "Region resolved");
    Ok(ids.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use procurecast_common::{Agency, STATE_DOT_TYPE};
    use procurecast_store::MemoryStore;

    fn houston() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_agency(Agency::new(1, "Houston-Galveston Area Council").with_state("TX").with_type("COG"));
        store.add_agency(Agency::new(2, "METRO (Houston)").with_state("TX"));
        store.add_agency(Agency::new(3, "City of Houston").with_state("TX"));
        store.add_agency(Agency::new(4, "Texas Department of Transportation").with_state("TX").with_type(STATE_DOT_TYPE));
        store.add_agency(Agency::new(5, "Harris County Toll Road Authority").with_state("TX"));
        store.add_agency(Agency::new(6, "Oklahoma DOT").with_state("OK").with_type(STATE_DOT_TYPE));
        store
    }

    #[tokio::test]
    async fn parent_children_and_dot_deduplicated() {
        let store = houston();
        store.add_relationship(1, 2, 1);
        // same child under a second structure type
        store.add_relationship(1, 2, 2);
        let ids = resolve_region(&store, "houston-galveston").await.unwrap();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn traversal_is_single_hop() {
        let store = houston();
        store.add_relationship(1, 3, 1);
        store.add_relationship(3, 5, 1);
        let ids = resolve_region(&store, "Galveston Area").await.unwrap();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn unknown_region_is_empty() {
        let store = houston();
        assert!(resolve_region(&store, "Puget Sound").await.unwrap().is_empty());
        assert!(resolve_region(&store, "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn parent_without_state_skips_dot_lookup() {
        let store = MemoryStore::new();
        store.add_agency(Agency::new(10, "Capital Area MPO"));
        store.add_agency(Agency::new(11, "Texas DOT").with_state("TX").with_type(STATE_DOT_TYPE));
        assert_eq!(resolve_region(&store, "capital area").await.unwrap(), vec![10]);
    }
}
