//! Region → sub-area resolution with a run-scoped cache.
//!
//! Each distinct region (`STATE:lowercase name`) and sub-area
//! (`scope:regionId:canonicalName`) touches the store at most once per
//! import; later rows reuse the cached id. Rows must therefore be processed
//! in file order so that a node created for one row is visible to the next.

use std::collections::HashMap;

use log::debug;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    error::{StoreError, StoreResult},
    model::{Region, SubArea, from_document, to_document},
    row::ImportRow,
    store::{Collection, Document, DocumentStore, Field, Filter, document_id, find_first},
    upsert::ImportContext,
};

#[derive(Debug, Default, Clone)]
pub struct HierarchyCache {
    regions: HashMap<String, String>,
    sub_areas: HashMap<String, String>,
}

impl HierarchyCache {
    pub fn region_key(state_code: &str, region_name: &str) -> String {
        format!("{state_code}:{}", region_name.to_lowercase())
    }

    pub fn sub_area_key(owner_scope_id: &str, region_id: &str, sub_area_name: &str) -> String {
        format!("{owner_scope_id}:{region_id}:{sub_area_name}")
    }

    pub fn region(&self, key: &str) -> Option<&str> {
        self.regions.get(key).map(String::as_str)
    }

    pub fn sub_area(&self, key: &str) -> Option<&str> {
        self.sub_areas.get(key).map(String::as_str)
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn sub_area_count(&self) -> usize {
        self.sub_areas.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHierarchy {
    pub region_id: String,
    pub sub_area_id: String,
}

pub async fn resolve_hierarchy<S>(
    store: &S,
    ctx: &mut ImportContext,
    row: &ImportRow,
) -> StoreResult<ResolvedHierarchy>
where
    S: DocumentStore + ?Sized,
{
    let region_id = resolve_region(store, ctx, row).await?;
    let sub_area_id = resolve_sub_area(store, ctx, row, &region_id).await?;
    Ok(ResolvedHierarchy {
        region_id,
        sub_area_id,
    })
}

fn required_id(document: &Document, collection: Collection) -> StoreResult<String> {
    document_id(document)
        .map(str::to_string)
        .ok_or_else(|| StoreError::malformed(collection.as_str(), "document has no id"))
}

async fn resolve_region<S>(store: &S, ctx: &mut ImportContext, row: &ImportRow) -> StoreResult<String>
where
    S: DocumentStore + ?Sized,
{
    let key = HierarchyCache::region_key(&row.state_code, &row.region_name);
    if let Some(id) = ctx.cache.region(&key) {
        return Ok(id.to_string());
    }

    let scope = ctx.owner_scope_id.clone();
    let wanted = row.region_name.to_lowercase();
    let existing = find_first(
        store,
        Collection::Regions,
        |spelling| {
            Filter::new()
                .eq(Field::OwnerScopeId.name(spelling), scope.as_str())
                .eq("stateCode", row.state_code.as_str())
        },
        |doc| {
            doc.get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.trim().to_lowercase() == wanted)
        },
    )
    .await?;

    let id = match existing {
        Some(document) => required_id(&document, Collection::Regions)?,
        None if ctx.options.simulate => {
            ctx.summary.created.regions += 1;
            format!("sim-region-{key}")
        }
        None => {
            let region = Region {
                id: Uuid::new_v4().to_string(),
                name: row.region_name.clone(),
                state_code: row.state_code.clone(),
                owner_scope_id: scope.clone(),
            };
            let id = store
                .insert(Collection::Regions, to_document(&region, Collection::Regions)?)
                .await?;
            ctx.summary.created.regions += 1;
            debug!("Line {}: created region '{}' ({id})", row.line, row.region_name);
            id
        }
    };
    ctx.cache.regions.insert(key, id.clone());
    Ok(id)
}

async fn resolve_sub_area<S>(
    store: &S,
    ctx: &mut ImportContext,
    row: &ImportRow,
    region_id: &str,
) -> StoreResult<String>
where
    S: DocumentStore + ?Sized,
{
    let scope = ctx.owner_scope_id.clone();
    let key = HierarchyCache::sub_area_key(&scope, region_id, &row.sub_area_name);
    if let Some(id) = ctx.cache.sub_area(&key) {
        return Ok(id.to_string());
    }

    let existing = find_first(
        store,
        Collection::SubAreas,
        |spelling| {
            Filter::new()
                .eq(Field::OwnerScopeId.name(spelling), scope.as_str())
                .eq(Field::RegionId.name(spelling), region_id)
                .eq("name", row.sub_area_name.as_str())
        },
        |_| true,
    )
    .await?;

    let id = match existing {
        Some(document) => {
            let sub_area: SubArea = from_document(document, Collection::SubAreas)?;
            let drifted = row
                .sub_area_notes
                .as_deref()
                .filter(|notes| sub_area.notes.as_deref() != Some(*notes));
            if let Some(notes) = drifted {
                if !ctx.options.simulate {
                    let mut patch = Document::new();
                    patch.insert("notes".to_string(), json!(notes));
                    store.update(Collection::SubAreas, &sub_area.id, patch).await?;
                }
                ctx.summary.updated.sub_areas += 1;
                debug!(
                    "Line {}: updated notes of sub-area '{}' ({})",
                    row.line, sub_area.name, sub_area.id
                );
            }
            sub_area.id
        }
        None if ctx.options.simulate => {
            ctx.summary.created.sub_areas += 1;
            format!("sim-subarea-{key}")
        }
        None => {
            let sub_area = SubArea {
                id: Uuid::new_v4().to_string(),
                name: row.sub_area_name.clone(),
                region_id: region_id.to_string(),
                owner_scope_id: scope.clone(),
                notes: row.sub_area_notes.clone(),
            };
            let id = store
                .insert(Collection::SubAreas, to_document(&sub_area, Collection::SubAreas)?)
                .await?;
            ctx.summary.created.sub_areas += 1;
            debug!(
                "Line {}: created sub-area '{}' under region {region_id} ({id})",
                row.line, row.sub_area_name
            );
            id
        }
    };
    ctx.cache.sub_areas.insert(key, id.clone());
    Ok(id)
}
