//! Reconciliation of parsed records into the entity graph
//!
//! One call is one transaction. Pass 1 makes sure every organization of the
//! run has a row (creating it without a parent link, flushing after each
//! insert so its identifier exists). Pass 2 links branches to their head
//! organizations and attaches programs, creating specialty groups and
//! specialties on first sight. The session is committed once at the end; any
//! error rolls the whole run back.
//!
//! Lookups go through per-run caches keyed by natural key, so each region,
//! group, specialty and organization is read or created at most once per run.

use crate::error::{IngestError, Result};
use crate::models::{
    EducationalOrganization, NewOrganization, NewSpecialty, OrganizationRecord, ProgramRecord,
    Region, Specialty, SpecialtyGroup, MISSING_NAME,
};
use crate::region::{normalize_region_name, AddressHeuristic, RegionLocator};
use crate::store::{ExecutionContext, Session};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// ============================================================================
// Natural-key lookup
// ============================================================================

/// An entity identified by a single natural key.
#[async_trait]
pub trait NaturalKeyed: Clone + Send + Sync + Sized {
    /// Values used only when the row has to be created.
    type Defaults: Send + Sync;

    const ENTITY: &'static str;

    async fn find(session: &mut dyn Session, key: &str) -> Result<Option<Self>>;
    async fn create(session: &mut dyn Session, key: &str, defaults: &Self::Defaults)
        -> Result<Self>;
}

#[async_trait]
impl NaturalKeyed for Region {
    type Defaults = ();
    const ENTITY: &'static str = "region";

    async fn find(session: &mut dyn Session, key: &str) -> Result<Option<Self>> {
        session.find_region(key).await
    }

    async fn create(session: &mut dyn Session, key: &str, _defaults: &()) -> Result<Self> {
        session.insert_region(key).await
    }
}

#[async_trait]
impl NaturalKeyed for SpecialtyGroup {
    /// Group name
    type Defaults = String;
    const ENTITY: &'static str = "specialty_group";

    async fn find(session: &mut dyn Session, key: &str) -> Result<Option<Self>> {
        session.find_specialty_group(key).await
    }

    async fn create(session: &mut dyn Session, key: &str, name: &String) -> Result<Self> {
        session.insert_specialty_group(key, name).await
    }
}

#[derive(Debug, Clone)]
pub struct SpecialtyDefaults {
    pub name: String,
    pub group_id: i64,
}

#[async_trait]
impl NaturalKeyed for Specialty {
    type Defaults = SpecialtyDefaults;
    const ENTITY: &'static str = "specialty";

    async fn find(session: &mut dyn Session, key: &str) -> Result<Option<Self>> {
        session.find_specialty(key).await
    }

    async fn create(
        session: &mut dyn Session,
        key: &str,
        defaults: &SpecialtyDefaults,
    ) -> Result<Self> {
        session
            .insert_specialty(&NewSpecialty {
                code: key.to_string(),
                name: defaults.name.clone(),
                group_id: defaults.group_id,
            })
            .await
    }
}

/// Cached row for `key`, else the stored row, else a new row built from
/// `key` and `defaults`. The flag is true when a row was inserted.
pub async fn get_or_create<E: NaturalKeyed>(
    session: &mut dyn Session,
    cache: &mut HashMap<String, E>,
    key: &str,
    defaults: &E::Defaults,
) -> Result<(E, bool)> {
    if let Some(hit) = cache.get(key) {
        return Ok((hit.clone(), false));
    }

    let (entity, created) = match E::find(session, key).await? {
        Some(existing) => (existing, false),
        None => {
            let entity = E::create(session, key, defaults).await?;
            debug!(entity = E::ENTITY, key = %key, "Created");
            (entity, true)
        },
    };

    cache.insert(key.to_string(), entity.clone());
    Ok((entity, created))
}

// ============================================================================
// Run state
// ============================================================================

/// Natural key → row, for one run only.
#[derive(Debug, Default)]
struct RunCaches {
    regions: HashMap<String, Region>,
    groups: HashMap<String, SpecialtyGroup>,
    specialties: HashMap<String, Specialty>,
    organizations: HashMap<String, EducationalOrganization>,
    programs: HashSet<(i64, i64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub records: usize,
    pub records_without_ogrn: usize,
    pub organizations_created: usize,
    pub organizations_existing: usize,
    pub regions_created: usize,
    pub groups_created: usize,
    pub specialties_created: usize,
    pub programs_created: usize,
    pub programs_existing: usize,
    pub programs_skipped: usize,
    pub branches_linked: usize,
    pub parents_unresolved: usize,
}

impl ReconcileStats {
    fn log_summary(&self) {
        info!(
            records = self.records,
            records_without_ogrn = self.records_without_ogrn,
            organizations_created = self.organizations_created,
            organizations_existing = self.organizations_existing,
            regions_created = self.regions_created,
            groups_created = self.groups_created,
            specialties_created = self.specialties_created,
            programs_created = self.programs_created,
            programs_existing = self.programs_existing,
            programs_skipped = self.programs_skipped,
            branches_linked = self.branches_linked,
            parents_unresolved = self.parents_unresolved,
            "Reconciliation committed"
        );
    }
}

// ============================================================================
// Reconciler
// ============================================================================

pub struct Reconciler {
    locator: Arc<dyn RegionLocator>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Arc::new(AddressHeuristic))
    }
}

impl Reconciler {
    pub fn new(locator: Arc<dyn RegionLocator>) -> Self {
        Self { locator }
    }

    /// Merge `records` into storage in one transaction.
    ///
    /// Fails with a precondition error when `ctx` is `None`. An empty input
    /// opens no session and returns zeroed stats.
    pub async fn reconcile(
        &self,
        ctx: Option<&dyn ExecutionContext>,
        records: &[OrganizationRecord],
    ) -> Result<ReconcileStats> {
        let Some(ctx) = ctx else {
            error!("Reconciliation invoked without an execution context");
            return Err(IngestError::precondition(
                "reconciliation requires an execution context",
            ));
        };

        if records.is_empty() {
            info!("No records to reconcile");
            return Ok(ReconcileStats::default());
        }

        info!(records = records.len(), "Starting reconciliation");

        let mut session = ctx.begin().await?;
        let mut caches = RunCaches::default();
        let mut stats = ReconcileStats {
            records: records.len(),
            ..ReconcileStats::default()
        };

        let outcome = async {
            self.resolve_organizations(session.as_mut(), records, &mut caches, &mut stats)
                .await?;
            self.link_and_attach(session.as_mut(), records, &mut caches, &mut stats)
                .await
        }
        .await;

        if let Err(e) = outcome {
            error!(error = %e, "Reconciliation failed, rolling back");
            if let Err(rollback_err) = session.rollback().await {
                error!(error = %rollback_err, "Rollback failed");
            }
            return Err(e);
        }

        if let Err(e) = session.commit().await {
            error!(error = %e, "Commit failed, run rolled back");
            return Err(e);
        }

        stats.log_summary();
        Ok(stats)
    }

    // ------------------------------------------------------------------------
    // Pass 1
    // ------------------------------------------------------------------------

    async fn resolve_organizations(
        &self,
        session: &mut dyn Session,
        records: &[OrganizationRecord],
        caches: &mut RunCaches,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        for record in records {
            if record.ogrn.trim().is_empty() {
                warn!(full_name = %record.full_name, "Record without OGRN excluded");
                stats.records_without_ogrn += 1;
                continue;
            }

            if caches.organizations.contains_key(&record.ogrn) {
                stats.organizations_existing += 1;
                continue;
            }

            if let Some(existing) = session.find_organization(&record.ogrn).await? {
                stats.organizations_existing += 1;
                caches.organizations.insert(record.ogrn.clone(), existing);
                continue;
            }

            let region_id = self.resolve_region(session, record, caches, stats).await?;
            let created = session
                .insert_organization(&NewOrganization::from_record(record, region_id))
                .await?;
            session.flush().await?;

            debug!(ogrn = %created.ogrn, id = created.id, "Organization created");
            stats.organizations_created += 1;
            caches.organizations.insert(record.ogrn.clone(), created);
        }

        session.flush().await?;
        info!(
            created = stats.organizations_created,
            existing = stats.organizations_existing,
            "Organizations resolved"
        );
        Ok(())
    }

    /// Explicit region name, else a guess from the address, else none.
    async fn resolve_region(
        &self,
        session: &mut dyn Session,
        record: &OrganizationRecord,
        caches: &mut RunCaches,
        stats: &mut ReconcileStats,
    ) -> Result<Option<i64>> {
        let explicit = record.region_name.as_deref().and_then(normalize_region_name);

        let name = match explicit {
            Some(name) => Some(name),
            None => {
                let guessed = record
                    .address
                    .as_deref()
                    .and_then(|address| self.locator.region_from_address(address))
                    .and_then(|name| normalize_region_name(&name));
                match &guessed {
                    Some(region) => {
                        debug!(ogrn = %record.ogrn, region = %region, "Region derived from address")
                    },
                    None => debug!(ogrn = %record.ogrn, "Region unknown"),
                }
                guessed
            },
        };

        let Some(name) = name else {
            return Ok(None);
        };

        let (region, created) = get_or_create::<Region>(session, &mut caches.regions, &name, &()).await?;
        if created {
            stats.regions_created += 1;
        }
        Ok(Some(region.id))
    }

    // ------------------------------------------------------------------------
    // Pass 2
    // ------------------------------------------------------------------------

    async fn link_and_attach(
        &self,
        session: &mut dyn Session,
        records: &[OrganizationRecord],
        caches: &mut RunCaches,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        for record in records {
            let Some(organization) = caches.organizations.get(&record.ogrn).cloned() else {
                continue;
            };

            if let Some(parent_ogrn) = record.declared_parent() {
                self.link_parent(session, &organization, parent_ogrn, caches, stats)
                    .await?;
            }

            for program in &record.programs {
                self.attach_program(session, &organization, program, caches, stats)
                    .await?;
            }
        }

        info!(
            branches_linked = stats.branches_linked,
            parents_unresolved = stats.parents_unresolved,
            programs_created = stats.programs_created,
            "Hierarchy and programs resolved"
        );
        Ok(())
    }

    async fn link_parent(
        &self,
        session: &mut dyn Session,
        organization: &EducationalOrganization,
        parent_ogrn: &str,
        caches: &mut RunCaches,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        if parent_ogrn == organization.ogrn {
            warn!(ogrn = %organization.ogrn, "Branch names itself as parent, not linked");
            stats.parents_unresolved += 1;
            return Ok(());
        }

        let parent = match caches.organizations.get(parent_ogrn) {
            Some(parent) => Some(parent.clone()),
            None => {
                let found = session.find_organization(parent_ogrn).await?;
                if let Some(parent) = &found {
                    caches
                        .organizations
                        .insert(parent_ogrn.to_string(), parent.clone());
                }
                found
            },
        };

        let Some(parent) = parent else {
            warn!(
                ogrn = %organization.ogrn,
                parent_ogrn = %parent_ogrn,
                "Parent organization not found, branch left without parent"
            );
            stats.parents_unresolved += 1;
            return Ok(());
        };

        if organization.parent_id == Some(parent.id) {
            return Ok(());
        }

        session
            .set_organization_parent(organization.id, parent.id)
            .await?;
        if let Some(cached) = caches.organizations.get_mut(&organization.ogrn) {
            cached.parent_id = Some(parent.id);
        }
        stats.branches_linked += 1;
        debug!(ogrn = %organization.ogrn, parent_ogrn = %parent_ogrn, "Branch linked");
        Ok(())
    }

    async fn attach_program(
        &self,
        session: &mut dyn Session,
        organization: &EducationalOrganization,
        program: &ProgramRecord,
        caches: &mut RunCaches,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        if program.specialty_code.trim().is_empty() || program.ugs_code.trim().is_empty() {
            debug!(
                ogrn = %organization.ogrn,
                specialty_code = %program.specialty_code,
                ugs_code = %program.ugs_code,
                "Program without specialty or group code skipped"
            );
            stats.programs_skipped += 1;
            return Ok(());
        }

        let (group, created) = get_or_create::<SpecialtyGroup>(
            session,
            &mut caches.groups,
            &program.ugs_code,
            &name_or_placeholder(&program.ugs_name),
        )
        .await?;
        if created {
            stats.groups_created += 1;
        }

        let defaults = SpecialtyDefaults {
            name: name_or_placeholder(&program.specialty_name),
            group_id: group.id,
        };
        let (specialty, created) = get_or_create::<Specialty>(
            session,
            &mut caches.specialties,
            &program.specialty_code,
            &defaults,
        )
        .await?;
        if created {
            stats.specialties_created += 1;
        } else if specialty.group_id != group.id {
            debug!(
                specialty_code = %specialty.code,
                ugs_code = %group.code,
                "Specialty already belongs to another group, keeping it"
            );
        }

        let pair = (organization.id, specialty.id);
        if caches.programs.contains(&pair) {
            stats.programs_existing += 1;
            return Ok(());
        }

        if session.find_program(pair.0, pair.1).await?.is_some() {
            stats.programs_existing += 1;
        } else {
            session.insert_program(pair.0, pair.1).await?;
            stats.programs_created += 1;
        }
        caches.programs.insert(pair);
        Ok(())
    }
}

fn name_or_placeholder(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        MISSING_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
