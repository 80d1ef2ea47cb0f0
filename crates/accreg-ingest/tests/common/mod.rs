//! Shared helpers for accreg-ingest integration tests
//!
//! - record builders for reconciliation inputs
//! - [`FaultyContext`], a `MemoryStore` wrapper whose sessions fail on cue
//! - [`zip_bytes`] and [`certificate_xml`] for pipeline fixtures

#![allow(dead_code)]

use accreg_ingest::error::{IngestError, Result};
use accreg_ingest::models::{
    EducationalOrganization, EducationalProgram, NewOrganization, NewSpecialty, Region,
    Specialty, SpecialtyGroup,
};
use accreg_ingest::store::{ExecutionContext, MemorySession, MemoryStore, Session};
use accreg_ingest::{OrganizationRecord, ProgramRecord};
use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("accreg_ingest=debug")
        .try_init();
}

/// In-memory log sink for asserting on emitted events.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Route warnings and errors on this thread into a [`LogCapture`] until the
/// guard drops. Use from a current-thread `#[tokio::test]`.
pub fn capture_warnings() -> (LogCapture, DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

// ============================================================================
// Record builders
// ============================================================================

pub fn org(ogrn: &str) -> OrganizationRecord {
    OrganizationRecord {
        ogrn: ogrn.to_string(),
        full_name: format!("Образовательная организация {ogrn}"),
        short_name: None,
        inn: None,
        address: None,
        is_branch: false,
        parent_ogrn: None,
        region_name: None,
        programs: Vec::new(),
    }
}

pub fn in_region(mut record: OrganizationRecord, region: &str) -> OrganizationRecord {
    record.region_name = Some(region.to_string());
    record
}

pub fn at_address(mut record: OrganizationRecord, address: &str) -> OrganizationRecord {
    record.address = Some(address.to_string());
    record
}

pub fn branch_of(mut record: OrganizationRecord, parent_ogrn: &str) -> OrganizationRecord {
    record.is_branch = true;
    record.parent_ogrn = Some(parent_ogrn.to_string());
    record
}

pub fn with_program(
    mut record: OrganizationRecord,
    specialty_code: &str,
    ugs_code: &str,
) -> OrganizationRecord {
    record.programs.push(ProgramRecord {
        specialty_code: specialty_code.to_string(),
        specialty_name: format!("Специальность {specialty_code}"),
        ugs_code: ugs_code.to_string(),
        ugs_name: format!("Группа {ugs_code}"),
    });
    record
}

// ============================================================================
// Fault injection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The n-th `insert_program` call (1-based) fails
    InsertProgram(usize),
    /// The n-th `flush` call (1-based) fails
    Flush(usize),
    Commit,
}

/// Execution context whose sessions delegate to a `MemoryStore` and fail at
/// one chosen point with a constraint error.
#[derive(Clone)]
pub struct FaultyContext {
    pub store: MemoryStore,
    fault: Fault,
    program_inserts: Arc<AtomicUsize>,
    flushes: Arc<AtomicUsize>,
}

impl FaultyContext {
    pub fn new(store: MemoryStore, fault: Fault) -> Self {
        Self {
            store,
            fault,
            program_inserts: Arc::new(AtomicUsize::new(0)),
            flushes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ExecutionContext for FaultyContext {
    async fn begin(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(FaultySession {
            inner: self.store.begin_session().await,
            ctx: self.clone(),
        }))
    }
}

pub struct FaultySession {
    inner: MemorySession,
    ctx: FaultyContext,
}

fn injected(table: &str) -> IngestError {
    IngestError::constraint(table, "injected failure")
}

#[async_trait]
impl Session for FaultySession {
    async fn find_region(&mut self, name: &str) -> Result<Option<Region>> {
        self.inner.find_region(name).await
    }

    async fn insert_region(&mut self, name: &str) -> Result<Region> {
        self.inner.insert_region(name).await
    }

    async fn find_specialty_group(&mut self, code: &str) -> Result<Option<SpecialtyGroup>> {
        self.inner.find_specialty_group(code).await
    }

    async fn insert_specialty_group(&mut self, code: &str, name: &str) -> Result<SpecialtyGroup> {
        self.inner.insert_specialty_group(code, name).await
    }

    async fn find_specialty(&mut self, code: &str) -> Result<Option<Specialty>> {
        self.inner.find_specialty(code).await
    }

    async fn insert_specialty(&mut self, specialty: &NewSpecialty) -> Result<Specialty> {
        self.inner.insert_specialty(specialty).await
    }

    async fn find_organization(&mut self, ogrn: &str) -> Result<Option<EducationalOrganization>> {
        self.inner.find_organization(ogrn).await
    }

    async fn insert_organization(
        &mut self,
        organization: &NewOrganization,
    ) -> Result<EducationalOrganization> {
        self.inner.insert_organization(organization).await
    }

    async fn set_organization_parent(&mut self, id: i64, parent_id: i64) -> Result<()> {
        self.inner.set_organization_parent(id, parent_id).await
    }

    async fn find_program(
        &mut self,
        organization_id: i64,
        specialty_id: i64,
    ) -> Result<Option<EducationalProgram>> {
        self.inner.find_program(organization_id, specialty_id).await
    }

    async fn insert_program(
        &mut self,
        organization_id: i64,
        specialty_id: i64,
    ) -> Result<EducationalProgram> {
        let call = self.ctx.program_inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.ctx.fault == Fault::InsertProgram(call) {
            return Err(injected("educational_program"));
        }
        self.inner.insert_program(organization_id, specialty_id).await
    }

    async fn flush(&mut self) -> Result<()> {
        let call = self.ctx.flushes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.ctx.fault == Fault::Flush(call) {
            return Err(injected("educational_organization"));
        }
        self.inner.flush().await
    }

    async fn commit(&mut self) -> Result<()> {
        if self.ctx.fault == Fault::Commit {
            self.inner.rollback().await?;
            return Err(injected("educational_organization"));
        }
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.inner.rollback().await
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// One `<Certificate>` element with a single accredited program.
pub fn certificate_xml(
    ogrn: &str,
    parent_ogrn: Option<&str>,
    region: &str,
    program: (&str, &str),
) -> String {
    let is_branch = if parent_ogrn.is_some() { "1" } else { "0" };
    format!(
        r#"<Certificate>
  <Id>cert-{ogrn}</Id>
  <EduOrgOGRN>{head}</EduOrgOGRN>
  <ActualEducationOrganization>
    <FullName>Организация {ogrn}</FullName>
    <OGRN>{ogrn}</OGRN>
    <IsBranch>{is_branch}</IsBranch>
    <RegionName>{region}</RegionName>
  </ActualEducationOrganization>
  <Supplements><Supplement><EducationalPrograms>
    <EducationalProgram>
      <ProgrammCode>{code}</ProgrammCode>
      <ProgrammName>Программа {code}</ProgrammName>
      <UGSCode>{ugs}</UGSCode>
      <UGSName>Группа {ugs}</UGSName>
      <IsAccredited>1</IsAccredited>
    </EducationalProgram>
  </EducationalPrograms></Supplement></Supplements>
</Certificate>
"#,
        head = parent_ogrn.unwrap_or(ogrn),
        code = program.0,
        ugs = program.1,
    )
}

pub fn registry_xml(certificates: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<OpenData><Certificates>\n{}</Certificates></OpenData>\n",
        certificates.concat()
    )
}

/// A ZIP archive holding the given files, built in memory.
pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, body) in files {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
