//! Header alias resolution.
//!
//! Spreadsheets arrive with whatever header spelling the exporting tool or
//! the person editing them chose. [`AliasTable`] holds, per [`CanonicalKey`],
//! the accepted spellings in priority order; [`HeaderMap::resolve`] maps a
//! decoded header row onto column positions once per import. The first alias
//! of every list doubles as the header emitted by the exporter.

use std::{fmt, path::Path};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{decoder::DecodedRow, error::ImportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalKey {
    RegionName,
    StateCode,
    #[serde(alias = "subAreaId")]
    SubAreaName,
    SubAreaNotes,
    Street,
    ResidentsCount,
    ResidentName,
    MapLink,
    NavLink,
    IsActive,
    IsDeaf,
    IsMinor,
    IsStudent,
    IsNeurodivergent,
    Gender,
    Observations,
    VisitStatus,
    SortOrder,
}

impl CanonicalKey {
    /// All keys in export column order.
    pub const ALL: [CanonicalKey; 18] = [
        CanonicalKey::RegionName,
        CanonicalKey::StateCode,
        CanonicalKey::SubAreaName,
        CanonicalKey::SubAreaNotes,
        CanonicalKey::Street,
        CanonicalKey::ResidentsCount,
        CanonicalKey::ResidentName,
        CanonicalKey::MapLink,
        CanonicalKey::NavLink,
        CanonicalKey::IsActive,
        CanonicalKey::IsDeaf,
        CanonicalKey::IsMinor,
        CanonicalKey::IsStudent,
        CanonicalKey::IsNeurodivergent,
        CanonicalKey::Gender,
        CanonicalKey::Observations,
        CanonicalKey::VisitStatus,
        CanonicalKey::SortOrder,
    ];

    pub const REQUIRED: [CanonicalKey; 2] = [CanonicalKey::RegionName, CanonicalKey::SubAreaName];

    fn index(self) -> usize {
        self as usize
    }

    pub fn is_required(self) -> bool {
        Self::REQUIRED.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalKey::RegionName => "regionName",
            CanonicalKey::StateCode => "stateCode",
            CanonicalKey::SubAreaName => "subAreaName",
            CanonicalKey::SubAreaNotes => "subAreaNotes",
            CanonicalKey::Street => "street",
            CanonicalKey::ResidentsCount => "residentsCount",
            CanonicalKey::ResidentName => "residentName",
            CanonicalKey::MapLink => "mapLink",
            CanonicalKey::NavLink => "navLink",
            CanonicalKey::IsActive => "isActive",
            CanonicalKey::IsDeaf => "isDeaf",
            CanonicalKey::IsMinor => "isMinor",
            CanonicalKey::IsStudent => "isStudent",
            CanonicalKey::IsNeurodivergent => "isNeurodivergent",
            CanonicalKey::Gender => "gender",
            CanonicalKey::Observations => "observations",
            CanonicalKey::VisitStatus => "visitStatus",
            CanonicalKey::SortOrder => "sortOrder",
        }
    }

    fn builtin_aliases(self) -> &'static [&'static str] {
        match self {
            CanonicalKey::RegionName => &[
                "Nome da cidade (Cities name)",
                "Nome da cidade",
                "Cidade",
                "City name",
                "City",
            ],
            CanonicalKey::StateCode => &["UF (Cities uf)", "UF", "State"],
            CanonicalKey::SubAreaName => &[
                "Número do Mapa (Territories name)",
                "Número do Mapa",
                "Map number",
            ],
            CanonicalKey::SubAreaNotes => {
                &["Descrição (Territories notes)", "Descrição", "Description"]
            }
            CanonicalKey::Street => &["Endereço (street)", "Endereço", "Address"],
            CanonicalKey::ResidentsCount => &[
                "Número de residentes (residents_count)",
                "Número de residentes",
                "Número de Residentes",
                "Quantidade de residentes",
                "Resident count",
            ],
            CanonicalKey::ResidentName => {
                &["Nome (resident_name)", "Nome", "Resident name", "Name"]
            }
            CanonicalKey::MapLink => &[
                "Link do Maps (google_maps_link)",
                "Link do Maps",
                "Link do Google Maps",
                "Map link",
            ],
            CanonicalKey::NavLink => &["Link do Waze (waze_link)", "Link do Waze", "Navigation link"],
            CanonicalKey::IsActive => &["Status (is_active)", "Status"],
            CanonicalKey::IsDeaf => &["Surdo (is_deaf)", "Surdo", "Deaf"],
            CanonicalKey::IsMinor => &["Menor de idade (is_minor)", "Menor de idade", "Minor"],
            CanonicalKey::IsStudent => &["Estudante (is_student)", "Estudante", "Student"],
            CanonicalKey::IsNeurodivergent => &[
                "Neurodivergente (is_neurodivergent)",
                "Neurodivergente  (is_neurodivergent)",
                "Neurodivergente",
                "Neurodivergent",
            ],
            CanonicalKey::Gender => &["Gênero (gender)", "Gênero", "Gender"],
            CanonicalKey::Observations => &[
                "Observação (observations)",
                "Observação",
                "Observações",
                "Observations",
            ],
            CanonicalKey::VisitStatus => {
                &["visit_status", "Resultado da ultima visita", "Visit status"]
            }
            CanonicalKey::SortOrder => &["sort_order", "Ordem na listagem", "Sort order"],
        }
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered alias lists for every canonical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasTable {
    aliases: Vec<Vec<String>>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AliasTable {
    pub fn builtin() -> Self {
        let aliases = CanonicalKey::ALL
            .iter()
            .map(|key| {
                key.builtin_aliases()
                    .iter()
                    .map(|alias| alias.to_string())
                    .collect()
            })
            .collect();
        Self { aliases }
    }

    /// Built-in table extended with the YAML mapping at `path`
    /// (`canonicalKey: [alias, ...]`).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Reading alias file {path:?}"))?;
        Self::builtin()
            .with_yaml(&raw)
            .with_context(|| format!("Parsing alias file {path:?}"))
    }

    pub fn with_yaml(mut self, raw: &str) -> Result<Self> {
        let extra: serde_yaml::Mapping = serde_yaml::from_str(raw)?;
        for (key, value) in extra {
            let key: CanonicalKey = serde_yaml::from_value(key.clone())
                .map_err(|_| anyhow!("Unknown canonical key {key:?}"))?;
            let values: Vec<String> = serde_yaml::from_value(value)
                .with_context(|| format!("Aliases for '{key}' must be a list of strings"))?;
            self.extend(key, values);
        }
        Ok(self)
    }

    pub fn extend<I, S>(&mut self, key: CanonicalKey, extra: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = &mut self.aliases[key.index()];
        for alias in extra {
            let alias = alias.into().trim().to_string();
            if !alias.is_empty() && !list.contains(&alias) {
                list.push(alias);
            }
        }
    }

    pub fn aliases(&self, key: CanonicalKey) -> &[String] {
        &self.aliases[key.index()]
    }

    /// Header row written by the exporter: the first alias of every key.
    pub fn export_header(&self) -> Vec<String> {
        CanonicalKey::ALL
            .iter()
            .map(|key| self.aliases(*key).first().cloned().unwrap_or_else(|| key.to_string()))
            .collect()
    }
}

/// Column position of every canonical key in one concrete header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMap {
    positions: [Option<usize>; CanonicalKey::ALL.len()],
}

impl HeaderMap {
    pub fn resolve(header: &[String], table: &AliasTable) -> Result<Self, ImportError> {
        let mut positions = [None; CanonicalKey::ALL.len()];
        for key in CanonicalKey::ALL {
            let aliases = table.aliases(key);
            positions[key.index()] = header
                .iter()
                .position(|cell| aliases.iter().any(|alias| alias == cell.trim()));
        }
        let map = Self { positions };
        if CanonicalKey::REQUIRED
            .iter()
            .any(|key| map.position(*key).is_none())
        {
            return Err(ImportError::Schema {
                header: header.join(" | "),
            });
        }
        Ok(map)
    }

    pub fn position(&self, key: CanonicalKey) -> Option<usize> {
        self.positions[key.index()]
    }

    pub fn has(&self, key: CanonicalKey) -> bool {
        self.position(key).is_some()
    }

    /// Trimmed cell for `key`, or `""` when the column is absent or the row is short.
    pub fn cell<'r>(&self, row: &'r DecodedRow, key: CanonicalKey) -> &'r str {
        match self.position(key) {
            Some(idx) => row.field(idx).trim(),
            None => "",
        }
    }

    pub fn resolved_keys(&self) -> impl Iterator<Item = CanonicalKey> + '_ {
        CanonicalKey::ALL.into_iter().filter(|key| self.has(*key))
    }
}
