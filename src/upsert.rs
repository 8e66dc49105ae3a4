//! Import entry point and per-row upsert decisions.
//!
//! For every decoded row the engine resolves the region/sub-area chain, then
//! looks the address up by `(subAreaId, lowercase street)` and either
//! creates it, updates it when a watched field drifted, or skips it. Rows
//! are reconciled one at a time; there is no cross-row transaction.
//!
//! In simulate mode every read and decision still happens, writes do not,
//! and synthesized ids stand in for the ones the store would have issued.
//! In strict mode the first failing row aborts the run; in lenient mode the
//! failure is recorded with its line number and the next row proceeds.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    decoder,
    error::{ImportError, StoreResult},
    headers::{AliasTable, HeaderMap},
    hierarchy::{HierarchyCache, ResolvedHierarchy, resolve_hierarchy},
    model::{LeafFields, LeafRecord, from_document, to_document},
    row::ImportRow,
    store::{Collection, DocumentStore, Field, Filter, find_first},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub simulate: bool,
    pub strict: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            simulate: false,
            strict: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub owner_scope_id: String,
    pub options: ImportOptions,
    pub aliases: AliasTable,
    pub encoding: &'static Encoding,
}

impl ImportRequest {
    pub fn new(owner_scope_id: impl Into<String>) -> Self {
        Self {
            owner_scope_id: owner_scope_id.into(),
            options: ImportOptions::default(),
            aliases: AliasTable::builtin(),
            encoding: UTF_8,
        }
    }

    pub fn simulate(mut self, simulate: bool) -> Self {
        self.options.simulate = simulate;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    pub fn aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCounts {
    pub regions: usize,
    pub sub_areas: usize,
    pub leaf_records: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedCounts {
    pub sub_areas: usize,
    pub leaf_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub created: CreatedCounts,
    pub updated: UpdatedCounts,
    pub skipped: usize,
    pub errors: Vec<RowError>,
}

/// State owned by exactly one import run.
#[derive(Debug)]
pub struct ImportContext {
    pub owner_scope_id: String,
    pub options: ImportOptions,
    pub cache: HierarchyCache,
    pub summary: ImportSummary,
    /// Addresses created or updated in simulate mode, keyed by
    /// `subAreaId:lowercase street`, so repeats are judged like a real run.
    simulated_leaves: HashMap<String, LeafRecord>,
    now: DateTime<Utc>,
}

impl ImportContext {
    pub fn new(owner_scope_id: impl Into<String>, options: ImportOptions) -> Self {
        Self {
            owner_scope_id: owner_scope_id.into(),
            options,
            cache: HierarchyCache::default(),
            summary: ImportSummary::default(),
            simulated_leaves: HashMap::new(),
            now: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafOutcome {
    Created(String),
    Updated(String),
    Skipped(String),
}

/// Decodes `bytes` and reconciles every row against `store`.
pub async fn import_csv<S>(
    store: &S,
    bytes: &[u8],
    source_name: &str,
    request: &ImportRequest,
) -> Result<ImportSummary, ImportError>
where
    S: DocumentStore + ?Sized,
{
    let scope = request.owner_scope_id.trim();
    if scope.is_empty() {
        return Err(ImportError::MissingScope);
    }

    let text = decoder::decode_text(bytes, request.encoding);
    let table = decoder::decode_table(&text);
    let headers = HeaderMap::resolve(&table.header, &request.aliases)?;
    info!(
        "Importing '{}' into scope '{}' ({} row(s), delimiter '{}', simulate={}, strict={})",
        source_name,
        scope,
        table.rows.len(),
        crate::printable_delimiter(table.delimiter),
        request.options.simulate,
        request.options.strict
    );
    debug!("Resolved columns: {:?}", headers.resolved_keys().collect::<Vec<_>>());

    let mut ctx = ImportContext::new(scope, request.options);
    for raw in &table.rows {
        let Some(row) = ImportRow::from_decoded(raw, &headers) else {
            debug!("Line {}: no region or sub-area, row ignored", raw.line);
            continue;
        };
        if let Err(err) = process_row(store, &mut ctx, &row).await {
            if ctx.options.strict {
                return Err(ImportError::Row {
                    line: row.line,
                    reason: err.to_string(),
                });
            }
            warn!("Line {}: {err}", row.line);
            ctx.summary.errors.push(RowError {
                line: row.line,
                reason: err.to_string(),
            });
        }
    }

    let summary = ctx.summary;
    info!(
        "Import of '{}' finished: created {}/{}/{}, updated {}/{}, skipped {}, {} error(s)",
        source_name,
        summary.created.regions,
        summary.created.sub_areas,
        summary.created.leaf_records,
        summary.updated.sub_areas,
        summary.updated.leaf_records,
        summary.skipped,
        summary.errors.len()
    );
    Ok(summary)
}

async fn process_row<S>(store: &S, ctx: &mut ImportContext, row: &ImportRow) -> StoreResult<()>
where
    S: DocumentStore + ?Sized,
{
    let ids = resolve_hierarchy(store, ctx, row).await?;
    let Some(street) = row.street.as_deref() else {
        debug!("Line {}: no street, hierarchy only", row.line);
        return Ok(());
    };
    match upsert_leaf(store, ctx, row, street, &ids).await? {
        LeafOutcome::Created(id) => {
            debug!("Line {}: created address '{street}' ({id})", row.line);
            ctx.summary.created.leaf_records += 1;
        }
        LeafOutcome::Updated(id) => {
            debug!("Line {}: updated address '{street}' ({id})", row.line);
            ctx.summary.updated.leaf_records += 1;
        }
        LeafOutcome::Skipped(id) => {
            debug!("Line {}: address '{street}' unchanged ({id})", row.line);
            ctx.summary.skipped += 1;
        }
    }
    Ok(())
}

fn leaf_fields(ctx: &ImportContext, row: &ImportRow, street: &str, ids: &ResolvedHierarchy) -> LeafFields {
    LeafFields {
        owner_scope_id: ctx.owner_scope_id.clone(),
        sub_area_id: ids.sub_area_id.clone(),
        city_id: ids.region_id.clone(),
        street: street.to_string(),
        residents_count: row.residents_count,
        resident_name: row.resident_name.clone(),
        map_link: row.map_link.clone(),
        nav_link: row.nav_link.clone(),
        is_active: row.is_active,
        is_deaf: row.is_deaf,
        is_minor: row.is_minor,
        is_student: row.is_student,
        is_neurodivergent: row.is_neurodivergent,
        gender: row.gender.clone(),
        observations: row.observations.clone(),
        visit_status: row.visit_status.clone(),
        sort_order: row.sort_order,
    }
}

/// Re-judges an address already touched earlier in a simulated run.
fn replay_simulated(pending: &mut LeafRecord, fields: LeafFields, now: DateTime<Utc>) -> LeafOutcome {
    if pending.watched_changes(&fields).is_empty() {
        return LeafOutcome::Skipped(pending.id.clone());
    }
    *pending = LeafRecord::new(pending.id.clone(), fields, now);
    LeafOutcome::Updated(pending.id.clone())
}

/// Creates, updates or skips the address `street` under `ids.sub_area_id`.
pub async fn upsert_leaf<S>(
    store: &S,
    ctx: &mut ImportContext,
    row: &ImportRow,
    street: &str,
    ids: &ResolvedHierarchy,
) -> StoreResult<LeafOutcome>
where
    S: DocumentStore + ?Sized,
{
    let fields = leaf_fields(ctx, row, street, ids);
    let wanted = street.to_lowercase();
    let simulated_key = format!("{}:{wanted}", ids.sub_area_id);
    if let Some(pending) = ctx.simulated_leaves.get_mut(&simulated_key) {
        return Ok(replay_simulated(pending, fields, ctx.now));
    }
    let existing = find_first(
        store,
        Collection::LeafRecords,
        |spelling| Filter::new().eq(Field::SubAreaId.name(spelling), ids.sub_area_id.as_str()),
        |doc| {
            doc.get("street")
                .and_then(Value::as_str)
                .is_some_and(|value| value.trim().to_lowercase() == wanted)
        },
    )
    .await?;

    let Some(document) = existing else {
        if ctx.options.simulate {
            let id = format!("sim-leaf-{}", row.line);
            ctx.simulated_leaves
                .insert(simulated_key, LeafRecord::new(id.clone(), fields, ctx.now));
            return Ok(LeafOutcome::Created(id));
        }
        let record = LeafRecord::new(Uuid::new_v4().to_string(), fields, ctx.now);
        let id = store
            .insert(
                Collection::LeafRecords,
                to_document(&record, Collection::LeafRecords)?,
            )
            .await?;
        return Ok(LeafOutcome::Created(id));
    };

    let record: LeafRecord = from_document(document, Collection::LeafRecords)?;
    let changed = record.watched_changes(&fields);
    if changed.is_empty() {
        return Ok(LeafOutcome::Skipped(record.id));
    }
    debug!(
        "Line {}: address '{street}' ({}) changed {:?}",
        row.line, record.id, changed
    );
    if ctx.options.simulate {
        ctx.simulated_leaves
            .insert(simulated_key, LeafRecord::new(record.id.clone(), fields, ctx.now));
    } else {
        let mut patch = to_document(&fields, Collection::LeafRecords)?;
        patch.insert("updatedAt".to_string(), json!(ctx.now));
        store.update(Collection::LeafRecords, &record.id, patch).await?;
    }
    Ok(LeafOutcome::Updated(record.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const HEADER: &str = "Cidade;Número do Mapa;Endereço;Nome;Observação";

    #[tokio::test]
    async fn blank_scope_is_rejected_before_decoding() {
        let store = MemoryStore::new();
        let err = import_csv(&store, b"anything", "x.csv", &ImportRequest::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::MissingScope));
    }

    #[tokio::test]
    async fn street_less_rows_only_build_the_hierarchy() {
        let store = MemoryStore::new();
        let csv = format!("{HEADER}\nSpringfield;5;;;\n");
        let summary = import_csv(&store, csv.as_bytes(), "x.csv", &ImportRequest::new("s1"))
            .await
            .unwrap();
        assert_eq!(summary.created.regions, 1);
        assert_eq!(summary.created.sub_areas, 1);
        assert_eq!(summary.created.leaf_records, 0);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn street_match_is_case_insensitive() {
        let store = MemoryStore::new();
        let first = format!("{HEADER}\nSpringfield;5;Elm Street;Ned;\n");
        import_csv(&store, first.as_bytes(), "x.csv", &ImportRequest::new("s1"))
            .await
            .unwrap();
        let second = format!("{HEADER}\nSpringfield;5;ELM STREET;Ned;\n");
        let summary = import_csv(&store, second.as_bytes(), "x.csv", &ImportRequest::new("s1"))
            .await
            .unwrap();
        assert_eq!(summary.created.leaf_records, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.len(Collection::LeafRecords), 1);
    }

    #[tokio::test]
    async fn update_preserves_identity_and_created_at() {
        let store = MemoryStore::new();
        let first = format!("{HEADER}\nSpringfield;5;Elm Street;Ned;\n");
        import_csv(&store, first.as_bytes(), "x.csv", &ImportRequest::new("s1"))
            .await
            .unwrap();
        let before: LeafRecord = from_document(
            store.documents(Collection::LeafRecords).remove(0),
            Collection::LeafRecords,
        )
        .unwrap();

        let second = format!("{HEADER}\nSpringfield;5;Elm Street;Maude;moved in\n");
        let summary = import_csv(&store, second.as_bytes(), "x.csv", &ImportRequest::new("s1"))
            .await
            .unwrap();
        assert_eq!(summary.updated.leaf_records, 1);

        let after: LeafRecord = from_document(
            store.documents(Collection::LeafRecords).remove(0),
            Collection::LeafRecords,
        )
        .unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.resident_name.as_deref(), Some("Maude"));
        assert_eq!(after.observations.as_deref(), Some("moved in"));
    }

    #[test]
    fn summary_serializes_with_camel_case_keys() {
        let summary = ImportSummary {
            created: CreatedCounts {
                regions: 1,
                sub_areas: 1,
                leaf_records: 1,
            },
            errors: vec![RowError {
                line: 4,
                reason: "boom".into(),
            }],
            ..ImportSummary::default()
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["created"]["subAreas"], json!(1));
        assert_eq!(value["updated"]["leafRecords"], json!(0));
        assert_eq!(value["errors"][0]["line"], json!(4));
    }
}
