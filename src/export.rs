//! CSV export in the importer's own column layout.
//!
//! Output is UTF-8 with a leading BOM, `;`-separated, one row per address,
//! ordered by sub-area and then `sortOrder`. Values containing the
//! separator, a quote or a line break are quoted with inner quotes doubled,
//! so every export can be fed straight back into the importer.

use std::collections::HashMap;

use csv::{QuoteStyle, Terminator};
use itertools::Itertools;
use log::info;

use crate::{
    decoder::SEMICOLON,
    error::ImportError,
    headers::{AliasTable, CanonicalKey},
    model::{LeafRecord, Region, SubArea, from_document},
    store::{Collection, DocumentStore, Field, Filter, find_all},
};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub owner_scope_id: String,
    pub sub_area_id: Option<String>,
    pub region_id: Option<String>,
    pub aliases: AliasTable,
}

impl ExportRequest {
    pub fn new(owner_scope_id: impl Into<String>) -> Self {
        Self {
            owner_scope_id: owner_scope_id.into(),
            sub_area_id: None,
            region_id: None,
            aliases: AliasTable::builtin(),
        }
    }

    pub fn sub_area(mut self, sub_area_id: impl Into<String>) -> Self {
        self.sub_area_id = Some(sub_area_id.into());
        self
    }

    pub fn region(mut self, region_id: impl Into<String>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }
}

pub fn open_export_writer(buffer: Vec<u8>) -> csv::Writer<Vec<u8>> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(SEMICOLON)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .terminator(Terminator::Any(b'\n'));
    builder.from_writer(buffer)
}

fn bool_cell(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

#[derive(Debug, Default)]
struct NodeNames {
    regions: HashMap<String, Region>,
    sub_areas: HashMap<String, SubArea>,
}

fn render_row(record: &LeafRecord, names: &NodeNames) -> Vec<String> {
    let region = names.regions.get(&record.city_id);
    let sub_area = names.sub_areas.get(&record.sub_area_id);
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    CanonicalKey::ALL
        .iter()
        .map(|key| match key {
            CanonicalKey::RegionName => region.map(|r| r.name.clone()).unwrap_or_default(),
            CanonicalKey::StateCode => region.map(|r| r.state_code.clone()).unwrap_or_default(),
            CanonicalKey::SubAreaName => sub_area.map(|t| t.name.clone()).unwrap_or_default(),
            CanonicalKey::SubAreaNotes => sub_area.and_then(|t| t.notes.clone()).unwrap_or_default(),
            CanonicalKey::Street => record.street.clone(),
            CanonicalKey::ResidentsCount => record.residents_count.to_string(),
            CanonicalKey::ResidentName => text(&record.resident_name),
            CanonicalKey::MapLink => text(&record.map_link),
            CanonicalKey::NavLink => text(&record.nav_link),
            CanonicalKey::IsActive => bool_cell(record.is_active),
            CanonicalKey::IsDeaf => bool_cell(record.is_deaf),
            CanonicalKey::IsMinor => bool_cell(record.is_minor),
            CanonicalKey::IsStudent => bool_cell(record.is_student),
            CanonicalKey::IsNeurodivergent => bool_cell(record.is_neurodivergent),
            CanonicalKey::Gender => text(&record.gender),
            CanonicalKey::Observations => text(&record.observations),
            CanonicalKey::VisitStatus => record.visit_status.clone(),
            CanonicalKey::SortOrder => record.sort_order.to_string(),
        })
        .collect()
}

/// Renders every address of the scope (optionally narrowed to a sub-area or a region).
pub async fn export_csv<S>(store: &S, request: &ExportRequest) -> Result<Vec<u8>, ImportError>
where
    S: DocumentStore + ?Sized,
{
    let scope = request.owner_scope_id.trim();
    if scope.is_empty() {
        return Err(ImportError::MissingScope);
    }

    let documents = find_all(store, Collection::LeafRecords, |spelling| {
        let filter = Filter::new().eq(Field::OwnerScopeId.name(spelling), scope);
        match (&request.sub_area_id, &request.region_id) {
            (Some(sub_area_id), _) => {
                filter.eq(Field::SubAreaId.name(spelling), sub_area_id.as_str())
            }
            (None, Some(region_id)) => filter.eq(Field::CityId.name(spelling), region_id.as_str()),
            (None, None) => filter,
        }
    })
    .await?;

    let records = documents
        .into_iter()
        .map(|doc| from_document::<LeafRecord>(doc, Collection::LeafRecords))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .sorted_by(|a, b| {
            a.sub_area_id
                .cmp(&b.sub_area_id)
                .then(a.sort_order.cmp(&b.sort_order))
        })
        .collect::<Vec<_>>();

    let mut names = NodeNames::default();
    for region_id in records.iter().map(|r| r.city_id.as_str()).unique() {
        if let Some(doc) = store.get(Collection::Regions, region_id).await? {
            names
                .regions
                .insert(region_id.to_string(), from_document(doc, Collection::Regions)?);
        }
    }
    for sub_area_id in records.iter().map(|r| r.sub_area_id.as_str()).unique() {
        if let Some(doc) = store.get(Collection::SubAreas, sub_area_id).await? {
            names
                .sub_areas
                .insert(sub_area_id.to_string(), from_document(doc, Collection::SubAreas)?);
        }
    }

    let mut writer = open_export_writer(UTF8_BOM.to_vec());
    writer
        .write_record(request.aliases.export_header())
        .map_err(|err| ImportError::Export(err.to_string()))?;
    for record in &records {
        writer
            .write_record(render_row(record, &names))
            .map_err(|err| ImportError::Export(err.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ImportError::Export(err.to_string()))?;
    info!(
        "Exported {} address row(s) for scope '{}'",
        records.len(),
        scope
    );
    Ok(bytes)
}
