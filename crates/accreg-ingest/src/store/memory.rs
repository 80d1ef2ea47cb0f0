//! In-process storage backend
//!
//! A session works on a private copy of the tables and publishes it on
//! commit; rollback simply drops the copy. Unique rules match the SQL schema.
//! Sessions are meant to be used one at a time: two overlapping sessions do
//! not see each other and the later commit wins.

use super::{ExecutionContext, Session};
use crate::error::{IngestError, Result};
use crate::models::{
    EducationalOrganization, EducationalProgram, NewOrganization, NewSpecialty, Region,
    Specialty, SpecialtyGroup,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Entity tables keyed by natural key.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    pub regions: HashMap<String, Region>,
    pub specialty_groups: HashMap<String, SpecialtyGroup>,
    pub specialties: HashMap<String, Specialty>,
    pub organizations: HashMap<String, EducationalOrganization>,
    pub programs: HashMap<(i64, i64), EducationalProgram>,
    organization_ids: HashMap<i64, String>,
    inns: HashMap<String, i64>,
    next_id: i64,
}

impl MemoryTables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn organization_by_id(&self, id: i64) -> Option<&EducationalOrganization> {
        self.organization_ids
            .get(&id)
            .and_then(|ogrn| self.organizations.get(ogrn))
    }

    /// Row counts in table order: regions, groups, specialties, organizations, programs.
    pub fn row_counts(&self) -> [usize; 5] {
        [
            self.regions.len(),
            self.specialty_groups.len(),
            self.specialties.len(),
            self.organizations.len(),
            self.programs.len(),
        ]
    }
}

/// Shared in-memory database.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<MemoryTables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed state.
    pub async fn snapshot(&self) -> MemoryTables {
        self.tables.lock().await.clone()
    }

    pub async fn begin_session(&self) -> MemorySession {
        let work = self.tables.lock().await.clone();
        MemorySession {
            shared: Arc::clone(&self.tables),
            work: Some(work),
        }
    }
}

#[async_trait]
impl ExecutionContext for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(self.begin_session().await))
    }
}

pub struct MemorySession {
    shared: Arc<Mutex<MemoryTables>>,
    work: Option<MemoryTables>,
}

impl MemorySession {
    fn tables(&mut self) -> Result<&mut MemoryTables> {
        self.work
            .as_mut()
            .ok_or_else(|| IngestError::precondition("session is already closed"))
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn find_region(&mut self, name: &str) -> Result<Option<Region>> {
        Ok(self.tables()?.regions.get(name).cloned())
    }

    async fn insert_region(&mut self, name: &str) -> Result<Region> {
        let tables = self.tables()?;
        if tables.regions.contains_key(name) {
            return Err(IngestError::constraint("region", format!("duplicate name '{name}'")));
        }
        let row = Region {
            id: tables.allocate_id(),
            name: name.to_string(),
        };
        tables.regions.insert(row.name.clone(), row.clone());
        Ok(row)
    }

    async fn find_specialty_group(&mut self, code: &str) -> Result<Option<SpecialtyGroup>> {
        Ok(self.tables()?.specialty_groups.get(code).cloned())
    }

    async fn insert_specialty_group(&mut self, code: &str, name: &str) -> Result<SpecialtyGroup> {
        let tables = self.tables()?;
        if tables.specialty_groups.contains_key(code) {
            return Err(IngestError::constraint(
                "specialty_group",
                format!("duplicate code '{code}'"),
            ));
        }
        let row = SpecialtyGroup {
            id: tables.allocate_id(),
            code: code.to_string(),
            name: name.to_string(),
        };
        tables.specialty_groups.insert(row.code.clone(), row.clone());
        Ok(row)
    }

    async fn find_specialty(&mut self, code: &str) -> Result<Option<Specialty>> {
        Ok(self.tables()?.specialties.get(code).cloned())
    }

    async fn insert_specialty(&mut self, specialty: &NewSpecialty) -> Result<Specialty> {
        let tables = self.tables()?;
        if tables.specialties.contains_key(&specialty.code) {
            return Err(IngestError::constraint(
                "specialty",
                format!("duplicate code '{}'", specialty.code),
            ));
        }
        if !tables.specialty_groups.values().any(|g| g.id == specialty.group_id) {
            return Err(IngestError::constraint(
                "specialty",
                format!("unknown group id {}", specialty.group_id),
            ));
        }
        let row = Specialty {
            id: tables.allocate_id(),
            code: specialty.code.clone(),
            name: specialty.name.clone(),
            group_id: specialty.group_id,
        };
        tables.specialties.insert(row.code.clone(), row.clone());
        Ok(row)
    }

    async fn find_organization(&mut self, ogrn: &str) -> Result<Option<EducationalOrganization>> {
        Ok(self.tables()?.organizations.get(ogrn).cloned())
    }

    async fn insert_organization(
        &mut self,
        organization: &NewOrganization,
    ) -> Result<EducationalOrganization> {
        let tables = self.tables()?;
        if tables.organizations.contains_key(&organization.ogrn) {
            return Err(IngestError::constraint(
                "educational_organization",
                format!("duplicate ogrn '{}'", organization.ogrn),
            ));
        }
        if let Some(inn) = organization.inn.as_deref() {
            if tables.inns.contains_key(inn) {
                return Err(IngestError::constraint(
                    "educational_organization",
                    format!("duplicate inn '{inn}'"),
                ));
            }
        }
        if let Some(region_id) = organization.region_id {
            if !tables.regions.values().any(|r| r.id == region_id) {
                return Err(IngestError::constraint(
                    "educational_organization",
                    format!("unknown region id {region_id}"),
                ));
            }
        }

        let row = EducationalOrganization {
            id: tables.allocate_id(),
            full_name: organization.full_name.clone(),
            short_name: organization.short_name.clone(),
            ogrn: organization.ogrn.clone(),
            inn: organization.inn.clone(),
            address: organization.address.clone(),
            region_id: organization.region_id,
            parent_id: None,
        };
        if let Some(inn) = row.inn.clone() {
            tables.inns.insert(inn, row.id);
        }
        tables.organization_ids.insert(row.id, row.ogrn.clone());
        tables.organizations.insert(row.ogrn.clone(), row.clone());
        Ok(row)
    }

    async fn set_organization_parent(&mut self, id: i64, parent_id: i64) -> Result<()> {
        let tables = self.tables()?;
        if tables.organization_by_id(parent_id).is_none() {
            return Err(IngestError::constraint(
                "educational_organization",
                format!("unknown parent id {parent_id}"),
            ));
        }
        let row = tables
            .organization_ids
            .get(&id)
            .and_then(|ogrn| tables.organizations.get_mut(ogrn))
            .ok_or_else(|| {
                IngestError::constraint("educational_organization", format!("unknown id {id}"))
            })?;
        row.parent_id = Some(parent_id);
        Ok(())
    }

    async fn find_program(
        &mut self,
        organization_id: i64,
        specialty_id: i64,
    ) -> Result<Option<EducationalProgram>> {
        Ok(self
            .tables()?
            .programs
            .get(&(organization_id, specialty_id))
            .cloned())
    }

    async fn insert_program(
        &mut self,
        organization_id: i64,
        specialty_id: i64,
    ) -> Result<EducationalProgram> {
        let tables = self.tables()?;
        let key = (organization_id, specialty_id);
        if tables.programs.contains_key(&key) {
            return Err(IngestError::constraint(
                "educational_program",
                format!("duplicate pair ({organization_id}, {specialty_id})"),
            ));
        }
        let row = EducationalProgram {
            id: tables.allocate_id(),
            organization_id,
            specialty_id,
        };
        tables.programs.insert(key, row.clone());
        Ok(row)
    }

    async fn flush(&mut self) -> Result<()> {
        self.tables().map(|_| ())
    }

    async fn commit(&mut self) -> Result<()> {
        let work = self
            .work
            .take()
            .ok_or_else(|| IngestError::precondition("session is already closed"))?;
        *self.shared.lock().await = work;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.work.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_org(ogrn: &str, inn: Option<&str>) -> NewOrganization {
        NewOrganization {
            full_name: format!("Организация {ogrn}"),
            short_name: None,
            ogrn: ogrn.to_string(),
            inn: inn.map(str::to_string),
            address: None,
            region_id: None,
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_and_rollback_discards() {
        let store = MemoryStore::new();

        let mut session = store.begin_session().await;
        session.insert_region("Томская область").await.unwrap();
        session.rollback().await.unwrap();
        assert!(store.snapshot().await.regions.is_empty());

        let mut session = store.begin_session().await;
        session.insert_region("Томская область").await.unwrap();
        session.commit().await.unwrap();
        assert!(store.snapshot().await.regions.contains_key("Томская область"));
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let store = MemoryStore::new();
        let mut session = store.begin_session().await;
        session.commit().await.unwrap();

        let err = session.find_region("x").await.unwrap_err();
        assert!(err.is_precondition());
        assert!(session.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_unique_rules() {
        let store = MemoryStore::new();
        let mut session = store.begin_session().await;

        session.insert_region("Г. москва").await.unwrap();
        assert!(session.insert_region("Г. москва").await.unwrap_err().is_persistence());

        session.insert_organization(&new_org("1", Some("77"))).await.unwrap();
        assert!(session.insert_organization(&new_org("1", None)).await.is_err());
        assert!(session.insert_organization(&new_org("2", Some("77"))).await.is_err());
        session.insert_organization(&new_org("3", None)).await.unwrap();
        session.insert_organization(&new_org("4", None)).await.unwrap();

        let group = session.insert_specialty_group("09.00.00", "ИВТ").await.unwrap();
        let specialty = session
            .insert_specialty(&NewSpecialty {
                code: "09.03.01".into(),
                name: "Информатика".into(),
                group_id: group.id,
            })
            .await
            .unwrap();
        let org = session.find_organization("1").await.unwrap().unwrap();
        session.insert_program(org.id, specialty.id).await.unwrap();
        assert!(session.insert_program(org.id, specialty.id).await.is_err());
    }

    #[tokio::test]
    async fn test_parent_link_requires_existing_parent() {
        let store = MemoryStore::new();
        let mut session = store.begin_session().await;
        let head = session.insert_organization(&new_org("10", None)).await.unwrap();
        let branch = session.insert_organization(&new_org("11", None)).await.unwrap();

        assert!(session.set_organization_parent(branch.id, 9999).await.is_err());
        session.set_organization_parent(branch.id, head.id).await.unwrap();
        session.commit().await.unwrap();

        let tables = store.snapshot().await;
        assert_eq!(tables.organization_by_id(branch.id).unwrap().parent_id, Some(head.id));
    }
}
