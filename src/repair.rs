//! Merge of sub-areas duplicated by inconsistent zero padding.
//!
//! Before names were canonicalized, importing "1" and "01" produced two
//! sibling sub-areas. For every single-digit sub-area that has a padded
//! sibling under the same region, the addresses are re-pointed to the padded
//! node and the single-digit node is deleted. Each pair is merged on its
//! own: a failure is recorded and the remaining pairs still run. The
//! re-point and the delete are not atomic.

use chrono::Utc;
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;
use serde_json::json;

use crate::{
    error::{ImportError, StoreError, StoreResult},
    model::{SubArea, from_document},
    row::{canonicalize_sub_area_name, is_single_digit},
    store::{Collection, Document, DocumentStore, Field, Filter, Spelling, document_id, find_all},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Single-digit sub-areas that had a padded sibling.
    pub found: usize,
    pub merged: usize,
    pub errors: Vec<String>,
}

pub async fn merge_duplicate_sub_areas<S>(
    store: &S,
    owner_scope_id: &str,
) -> Result<RepairReport, ImportError>
where
    S: DocumentStore + ?Sized,
{
    let scope = owner_scope_id.trim();
    if scope.is_empty() {
        return Err(ImportError::MissingScope);
    }

    let sub_areas = find_all(store, Collection::SubAreas, |spelling| {
        Filter::new().eq(Field::OwnerScopeId.name(spelling), scope)
    })
    .await?
    .into_iter()
    .map(|doc| from_document::<SubArea>(doc, Collection::SubAreas))
    .collect::<StoreResult<Vec<_>>>()?;

    let mut report = RepairReport::default();
    let groups = sub_areas
        .into_iter()
        .into_group_map_by(|sub_area| sub_area.region_id.clone());
    for (region_id, siblings) in groups.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)) {
        for source in &siblings {
            let name = source.name.trim();
            if !is_single_digit(name) {
                continue;
            }
            let padded = canonicalize_sub_area_name(name);
            let Some(target) = siblings
                .iter()
                .find(|candidate| candidate.name == padded && candidate.id != source.id)
            else {
                continue;
            };
            report.found += 1;
            match merge_pair(store, source, target).await {
                Ok(moved) => {
                    report.merged += 1;
                    info!(
                        "Merged sub-area '{name}' into '{padded}' in region {region_id} ({moved} address(es) moved)"
                    );
                }
                Err(err) => {
                    warn!("Merging '{name}' into '{padded}' failed: {err}");
                    report
                        .errors
                        .push(format!("Error merging {name} -> {padded}: {err}"));
                }
            }
        }
    }
    info!(
        "Repair for scope '{}': {} duplicate(s) found, {} merged, {} error(s)",
        scope,
        report.found,
        report.merged,
        report.errors.len()
    );
    Ok(report)
}

/// Re-points every address of `source` to `target`, then deletes `source`.
async fn merge_pair<S>(store: &S, source: &SubArea, target: &SubArea) -> StoreResult<usize>
where
    S: DocumentStore + ?Sized,
{
    let addresses = find_all(store, Collection::LeafRecords, |spelling| {
        Filter::new().eq(Field::SubAreaId.name(spelling), source.id.as_str())
    })
    .await?;
    let now = Utc::now();
    for address in &addresses {
        let id = document_id(address).ok_or_else(|| {
            StoreError::malformed(Collection::LeafRecords.as_str(), "document has no id")
        })?;
        let mut patch = Document::new();
        patch.insert(
            Field::SubAreaId.name(Spelling::Current).to_string(),
            json!(target.id),
        );
        let legacy = Field::SubAreaId.name(Spelling::Legacy);
        if address.contains_key(legacy) {
            patch.insert(legacy.to_string(), json!(target.id));
        }
        patch.insert("updatedAt".to_string(), json!(now));
        store.update(Collection::LeafRecords, id, patch).await?;
    }
    store.delete(Collection::SubAreas, &source.id).await?;
    Ok(addresses.len())
}
