//! Storage seam for reconciliation
//!
//! A [`Session`] is one unit of work: every read and write of a run goes
//! through it, and it ends with exactly one [`Session::commit`] or
//! [`Session::rollback`]. An [`ExecutionContext`] hands out sessions.
//!
//! Two backends ship with the crate:
//!
//! - [`pg::PgContext`]: PostgreSQL through sqlx, one transaction per session
//! - [`memory::MemoryStore`]: in-process tables with the same unique rules,
//!   used for dry runs and tests

pub mod memory;
pub mod pg;

use crate::error::Result;
use crate::models::{
    EducationalOrganization, EducationalProgram, NewOrganization, NewSpecialty, Region,
    Specialty, SpecialtyGroup,
};
use async_trait::async_trait;

pub use memory::{MemorySession, MemoryStore, MemoryTables};
pub use pg::{PgContext, PgSession};

/// Lookups and inserts for the five entity tables, scoped to one transaction.
///
/// Lookups see the session's own uncommitted writes. Inserts enforce the
/// natural-key unique rules and fail with a constraint error on a duplicate.
#[async_trait]
pub trait Session: Send {
    async fn find_region(&mut self, name: &str) -> Result<Option<Region>>;
    async fn insert_region(&mut self, name: &str) -> Result<Region>;

    async fn find_specialty_group(&mut self, code: &str) -> Result<Option<SpecialtyGroup>>;
    async fn insert_specialty_group(&mut self, code: &str, name: &str) -> Result<SpecialtyGroup>;

    async fn find_specialty(&mut self, code: &str) -> Result<Option<Specialty>>;
    async fn insert_specialty(&mut self, specialty: &NewSpecialty) -> Result<Specialty>;

    async fn find_organization(&mut self, ogrn: &str) -> Result<Option<EducationalOrganization>>;
    async fn insert_organization(
        &mut self,
        organization: &NewOrganization,
    ) -> Result<EducationalOrganization>;
    async fn set_organization_parent(&mut self, id: i64, parent_id: i64) -> Result<()>;

    async fn find_program(
        &mut self,
        organization_id: i64,
        specialty_id: i64,
    ) -> Result<Option<EducationalProgram>>;
    async fn insert_program(
        &mut self,
        organization_id: i64,
        specialty_id: i64,
    ) -> Result<EducationalProgram>;

    /// Make pending writes visible and check deferred constraints now.
    async fn flush(&mut self) -> Result<()>;

    /// Finish the unit of work. Any call after this fails.
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
}

/// Source of sessions for a run.
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Session>>;
}
