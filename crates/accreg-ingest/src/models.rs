//! Data model of the loader
//!
//! Two families live here: the in-flight records produced by the XML parser
//! (plain values, no identifiers) and the persisted entity rows the
//! reconciler reads back from storage.

use serde::{Deserialize, Serialize};

/// Stored when the source omits a required name.
pub const MISSING_NAME: &str = "Нет данных";

// ============================================================================
// Parsed records
// ============================================================================

/// One accredited program of an organization, as read from a certificate
/// supplement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub specialty_code: String,
    pub specialty_name: String,
    pub ugs_code: String,
    pub ugs_name: String,
}

/// One organization as described by a certificate record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub ogrn: String,
    pub full_name: String,
    pub short_name: Option<String>,
    pub inn: Option<String>,
    pub address: Option<String>,
    pub is_branch: bool,
    /// Head organization's OGRN; only set for branches.
    pub parent_ogrn: Option<String>,
    pub region_name: Option<String>,
    pub programs: Vec<ProgramRecord>,
}

impl OrganizationRecord {
    /// Parent OGRN for linking, if this record is a branch that names one.
    pub fn declared_parent(&self) -> Option<&str> {
        if !self.is_branch {
            return None;
        }
        self.parent_ogrn.as_deref().filter(|ogrn| !ogrn.is_empty())
    }
}

// ============================================================================
// Persisted rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Region {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SpecialtyGroup {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Specialty {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub group_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EducationalOrganization {
    pub id: i64,
    pub full_name: String,
    pub short_name: Option<String>,
    pub ogrn: String,
    pub inn: Option<String>,
    pub address: Option<String>,
    pub region_id: Option<i64>,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EducationalProgram {
    pub id: i64,
    pub organization_id: i64,
    pub specialty_id: i64,
}

// ============================================================================
// Insert payloads
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewSpecialty {
    pub code: String,
    pub name: String,
    pub group_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub full_name: String,
    pub short_name: Option<String>,
    pub ogrn: String,
    pub inn: Option<String>,
    pub address: Option<String>,
    pub region_id: Option<i64>,
}

impl NewOrganization {
    /// Row for a parsed record. The parent link is set later, once every
    /// organization of the run has an identifier.
    pub fn from_record(record: &OrganizationRecord, region_id: Option<i64>) -> Self {
        let full_name = if record.full_name.is_empty() {
            MISSING_NAME.to_string()
        } else {
            record.full_name.clone()
        };

        Self {
            full_name,
            short_name: record.short_name.clone(),
            ogrn: record.ogrn.clone(),
            inn: record.inn.clone(),
            address: record.address.clone(),
            region_id,
        }
    }
}
