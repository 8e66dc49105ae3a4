//! Per-row normalization into a typed [`ImportRow`].
//!
//! All helpers here are pure: blank optional strings become `None`, numbers
//! fall back to defaults instead of failing, and sub-area names are
//! canonicalized so "1" and "01" address the same node.

use crate::{
    decoder::DecodedRow,
    headers::{CanonicalKey, HeaderMap},
};

pub const DEFAULT_RESIDENTS_COUNT: i64 = 1;
pub const DEFAULT_SORT_ORDER: i64 = 0;
pub const DEFAULT_VISIT_STATUS: &str = "not_contacted";

const TRUTHY: &[&str] = &["true", "1", "t", "sim", "yes"];

pub fn parse_boolean(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    TRUTHY.contains(&lowered.as_str())
}

pub fn is_single_digit(value: &str) -> bool {
    let mut chars = value.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_digit())
}

/// Trims `value` and left-pads a lone ASCII digit to two characters.
pub fn canonicalize_sub_area_name(value: &str) -> String {
    let trimmed = value.trim();
    if is_single_digit(trimmed) {
        format!("0{trimmed}")
    } else {
        trimmed.to_string()
    }
}

pub fn parse_int_or(value: &str, default: i64) -> i64 {
    value.trim().parse().unwrap_or(default)
}

pub fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// One data row after alias resolution and scalar coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub line: usize,
    pub region_name: String,
    pub state_code: String,
    pub sub_area_name: String,
    pub sub_area_notes: Option<String>,
    pub street: Option<String>,
    pub residents_count: i64,
    pub resident_name: Option<String>,
    pub map_link: Option<String>,
    pub nav_link: Option<String>,
    pub is_active: bool,
    pub is_deaf: bool,
    pub is_minor: bool,
    pub is_student: bool,
    pub is_neurodivergent: bool,
    pub gender: Option<String>,
    pub observations: Option<String>,
    pub visit_status: String,
    pub sort_order: i64,
}

impl ImportRow {
    /// Normalizes `raw`; returns `None` when the row names no region or no sub-area.
    pub fn from_decoded(raw: &DecodedRow, headers: &HeaderMap) -> Option<Self> {
        let cell = |key: CanonicalKey| headers.cell(raw, key);

        let region_name = cell(CanonicalKey::RegionName).to_string();
        let sub_area_name = canonicalize_sub_area_name(cell(CanonicalKey::SubAreaName));
        if region_name.is_empty() || sub_area_name.is_empty() {
            return None;
        }

        let active = cell(CanonicalKey::IsActive);
        Some(Self {
            line: raw.line,
            region_name,
            state_code: cell(CanonicalKey::StateCode).to_uppercase(),
            sub_area_name,
            sub_area_notes: optional(cell(CanonicalKey::SubAreaNotes)),
            street: optional(cell(CanonicalKey::Street)),
            residents_count: parse_int_or(
                cell(CanonicalKey::ResidentsCount),
                DEFAULT_RESIDENTS_COUNT,
            ),
            resident_name: optional(cell(CanonicalKey::ResidentName)),
            map_link: optional(cell(CanonicalKey::MapLink)),
            nav_link: optional(cell(CanonicalKey::NavLink)),
            is_active: active.is_empty() || parse_boolean(active),
            is_deaf: parse_boolean(cell(CanonicalKey::IsDeaf)),
            is_minor: parse_boolean(cell(CanonicalKey::IsMinor)),
            is_student: parse_boolean(cell(CanonicalKey::IsStudent)),
            is_neurodivergent: parse_boolean(cell(CanonicalKey::IsNeurodivergent)),
            gender: optional(cell(CanonicalKey::Gender)),
            observations: optional(cell(CanonicalKey::Observations)),
            visit_status: optional(cell(CanonicalKey::VisitStatus))
                .unwrap_or_else(|| DEFAULT_VISIT_STATUS.to_string()),
            sort_order: parse_int_or(cell(CanonicalKey::SortOrder), DEFAULT_SORT_ORDER),
        })
    }
}
