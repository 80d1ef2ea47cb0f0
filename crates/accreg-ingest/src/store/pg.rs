//! PostgreSQL backend

use super::{ExecutionContext, Session};
use crate::error::{IngestError, Result};
use crate::models::{
    EducationalOrganization, EducationalProgram, NewOrganization, NewSpecialty, Region,
    Specialty, SpecialtyGroup,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

const ORGANIZATION_COLUMNS: &str =
    "id, full_name, short_name, ogrn, inn, address, region_id, parent_id";

/// Hands out one transaction per session.
#[derive(Debug, Clone)]
pub struct PgContext {
    pool: PgPool,
}

impl PgContext {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionContext for PgContext {
    async fn begin(&self) -> Result<Box<dyn Session>> {
        let tx = self.pool.begin().await?;
        debug!("Transaction started");
        Ok(Box::new(PgSession { tx: Some(tx) }))
    }
}

/// A session backed by an open transaction. Dropped without commit, the
/// transaction rolls back.
pub struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| IngestError::precondition("session is already closed"))
    }
}

/// Unique and foreign-key violations become constraint errors naming the table.
fn write_error(table: &str, err: sqlx::Error) -> IngestError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() || db.is_foreign_key_violation() {
            return IngestError::constraint(table, db.message().to_string());
        }
    }
    IngestError::Database(err)
}

#[async_trait]
impl Session for PgSession {
    async fn find_region(&mut self, name: &str) -> Result<Option<Region>> {
        let tx = self.tx()?;
        let row = sqlx::query_as::<_, Region>("SELECT id, name FROM region WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row)
    }

    async fn insert_region(&mut self, name: &str) -> Result<Region> {
        let tx = self.tx()?;
        sqlx::query_as::<_, Region>("INSERT INTO region (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| write_error("region", e))
    }

    async fn find_specialty_group(&mut self, code: &str) -> Result<Option<SpecialtyGroup>> {
        let tx = self.tx()?;
        let row = sqlx::query_as::<_, SpecialtyGroup>(
            "SELECT id, code, name FROM specialty_group WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    async fn insert_specialty_group(&mut self, code: &str, name: &str) -> Result<SpecialtyGroup> {
        let tx = self.tx()?;
        sqlx::query_as::<_, SpecialtyGroup>(
            "INSERT INTO specialty_group (code, name) VALUES ($1, $2) RETURNING id, code, name",
        )
        .bind(code)
        .bind(name)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| write_error("specialty_group", e))
    }

    async fn find_specialty(&mut self, code: &str) -> Result<Option<Specialty>> {
        let tx = self.tx()?;
        let row = sqlx::query_as::<_, Specialty>(
            "SELECT id, code, name, group_id FROM specialty WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    async fn insert_specialty(&mut self, specialty: &NewSpecialty) -> Result<Specialty> {
        let tx = self.tx()?;
        sqlx::query_as::<_, Specialty>(
            r#"
            INSERT INTO specialty (code, name, group_id)
            VALUES ($1, $2, $3)
            RETURNING id, code, name, group_id
            "#,
        )
        .bind(&specialty.code)
        .bind(&specialty.name)
        .bind(specialty.group_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| write_error("specialty", e))
    }

    async fn find_organization(&mut self, ogrn: &str) -> Result<Option<EducationalOrganization>> {
        let tx = self.tx()?;
        let sql = format!("SELECT {ORGANIZATION_COLUMNS} FROM educational_organization WHERE ogrn = $1");
        let row = sqlx::query_as::<_, EducationalOrganization>(&sql)
            .bind(ogrn)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row)
    }

    async fn insert_organization(
        &mut self,
        organization: &NewOrganization,
    ) -> Result<EducationalOrganization> {
        let tx = self.tx()?;
        let sql = format!(
            r#"
            INSERT INTO educational_organization
                (full_name, short_name, ogrn, inn, address, region_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ORGANIZATION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, EducationalOrganization>(&sql)
            .bind(&organization.full_name)
            .bind(&organization.short_name)
            .bind(&organization.ogrn)
            .bind(&organization.inn)
            .bind(&organization.address)
            .bind(organization.region_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| write_error("educational_organization", e))
    }

    async fn set_organization_parent(&mut self, id: i64, parent_id: i64) -> Result<()> {
        let tx = self.tx()?;
        let result = sqlx::query("UPDATE educational_organization SET parent_id = $2 WHERE id = $1")
            .bind(id)
            .bind(parent_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| write_error("educational_organization", e))?;

        if result.rows_affected() == 0 {
            return Err(IngestError::constraint(
                "educational_organization",
                format!("unknown id {id}"),
            ));
        }
        Ok(())
    }

    async fn find_program(
        &mut self,
        organization_id: i64,
        specialty_id: i64,
    ) -> Result<Option<EducationalProgram>> {
        let tx = self.tx()?;
        let row = sqlx::query_as::<_, EducationalProgram>(
            r#"
            SELECT id, organization_id, specialty_id
            FROM educational_program
            WHERE organization_id = $1 AND specialty_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(specialty_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    async fn insert_program(
        &mut self,
        organization_id: i64,
        specialty_id: i64,
    ) -> Result<EducationalProgram> {
        let tx = self.tx()?;
        sqlx::query_as::<_, EducationalProgram>(
            r#"
            INSERT INTO educational_program (organization_id, specialty_id)
            VALUES ($1, $2)
            RETURNING id, organization_id, specialty_id
            "#,
        )
        .bind(organization_id)
        .bind(specialty_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| write_error("educational_program", e))
    }

    async fn flush(&mut self) -> Result<()> {
        let tx = self.tx()?;
        // Check the deferred parent link now, then go back to deferring it.
        sqlx::query("SET CONSTRAINTS ALL IMMEDIATE")
            .execute(&mut **tx)
            .await
            .map_err(|e| write_error("educational_organization", e))?;
        sqlx::query("SET CONSTRAINTS ALL DEFERRED")
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| IngestError::precondition("session is already closed"))?;
        tx.commit()
            .await
            .map_err(|e| write_error("educational_organization", e))?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!("Transaction rolled back");
        }
        Ok(())
    }
}
