//! Streaming parser for the accreditation registry XML
//!
//! Registry dumps are large files holding tens of thousands of
//! `<Certificate>` records:
//!
//! ```xml
//! <Certificate>
//!   <Id>…</Id>
//!   <EduOrgOGRN>…</EduOrgOGRN>            <!-- head organization, for branches -->
//!   <ActualEducationOrganization>
//!     <FullName/> <ShortName/> <OGRN/> <INN/> <PostAddress/> <IsBranch/> <RegionName/>
//!   </ActualEducationOrganization>
//!   <Supplements><Supplement><EducationalPrograms>
//!     <EducationalProgram>
//!       <ProgrammCode/> <ProgrammName/> <UGSCode/> <UGSName/> <IsAccredited/>
//!     </EducationalProgram>
//!   </EducationalPrograms></Supplement></Supplements>
//! </Certificate>
//! ```
//!
//! The file is walked with a pull reader; only the fields of the certificate
//! currently open are held, and they are dropped as soon as the record is
//! emitted. Each certificate becomes a [`RecordOutcome`]: either a parsed
//! organization or a skip with its reason. A syntax error ends the file but
//! keeps every record emitted before it.

use crate::models::{OrganizationRecord, ProgramRecord};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const CERTIFICATE_TAG: &str = "Certificate";
const ORGANIZATION_TAG: &str = "ActualEducationOrganization";
const PROGRAM_PATH: [&str; 4] = [
    "Supplements",
    "Supplement",
    "EducationalPrograms",
    "EducationalProgram",
];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed XML in {source_name} near byte {position}: {message}")]
    Syntax {
        source_name: String,
        position: u64,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, XmlError>;

// ============================================================================
// Record outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No `<ActualEducationOrganization>` in the certificate
    MissingOrganization,
    /// Organization has no OGRN, which is its natural key
    MissingOgrn,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingOrganization => write!(f, "certificate has no organization"),
            SkipReason::MissingOgrn => write!(f, "organization has no OGRN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub reason: SkipReason,
    pub certificate_id: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Parsed(OrganizationRecord),
    Skipped(SkippedRecord),
}

/// Programs dropped while reading certificates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgramSkips {
    pub not_accredited: usize,
    pub missing_code: usize,
}

// ============================================================================
// Certificate builder
// ============================================================================

#[derive(Debug, Default)]
struct ProgramBuilder {
    specialty_code: String,
    specialty_name: String,
    ugs_code: String,
    ugs_name: String,
    is_accredited: Option<String>,
}

#[derive(Debug, Default)]
struct CertificateBuilder {
    certificate_id: String,
    head_ogrn: String,
    has_organization: bool,
    full_name: String,
    short_name: String,
    ogrn: String,
    inn: String,
    address: String,
    is_branch: String,
    region_name: String,
    programs: Vec<ProgramRecord>,
    current_program: Option<ProgramBuilder>,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl CertificateBuilder {
    fn set_field(&mut self, path: &[&str], value: &str) {
        match path {
            ["Id"] => self.certificate_id = value.to_string(),
            ["EduOrgOGRN"] => self.head_ogrn = value.to_string(),
            [ORGANIZATION_TAG, field] => {
                let slot = match *field {
                    "FullName" => &mut self.full_name,
                    "ShortName" => &mut self.short_name,
                    "OGRN" => &mut self.ogrn,
                    "INN" => &mut self.inn,
                    "PostAddress" => &mut self.address,
                    "IsBranch" => &mut self.is_branch,
                    "RegionName" => &mut self.region_name,
                    _ => return,
                };
                *slot = value.to_string();
            },
            [a, b, c, d, field] if [*a, *b, *c, *d] == PROGRAM_PATH => {
                let Some(program) = self.current_program.as_mut() else {
                    return;
                };
                match *field {
                    "ProgrammCode" => program.specialty_code = value.to_string(),
                    "ProgrammName" => program.specialty_name = value.to_string(),
                    "UGSCode" => program.ugs_code = value.to_string(),
                    "UGSName" => program.ugs_name = value.to_string(),
                    "IsAccredited" => program.is_accredited = Some(value.to_string()),
                    _ => {},
                }
            },
            _ => {},
        }
    }

    fn finish_program(&mut self, skips: &mut ProgramSkips) {
        let Some(program) = self.current_program.take() else {
            return;
        };

        if program.is_accredited.as_deref() == Some("0") {
            skips.not_accredited += 1;
            debug!(
                certificate_id = %self.certificate_id,
                specialty_code = %program.specialty_code,
                "Skipping program not accredited"
            );
            return;
        }

        if program.specialty_code.is_empty() {
            skips.missing_code += 1;
            debug!(certificate_id = %self.certificate_id, "Skipping program without specialty code");
            return;
        }

        self.programs.push(ProgramRecord {
            specialty_code: program.specialty_code,
            specialty_name: program.specialty_name,
            ugs_code: program.ugs_code,
            ugs_name: program.ugs_name,
        });
    }

    fn finish(self) -> RecordOutcome {
        let certificate_id = non_empty(self.certificate_id);

        if !self.has_organization {
            return RecordOutcome::Skipped(SkippedRecord {
                reason: SkipReason::MissingOrganization,
                certificate_id,
                full_name: None,
            });
        }

        if self.ogrn.is_empty() {
            return RecordOutcome::Skipped(SkippedRecord {
                reason: SkipReason::MissingOgrn,
                certificate_id,
                full_name: non_empty(self.full_name),
            });
        }

        let is_branch = self.is_branch == "1";
        let parent_ogrn = if is_branch {
            non_empty(self.head_ogrn)
        } else {
            None
        };

        RecordOutcome::Parsed(OrganizationRecord {
            ogrn: self.ogrn,
            full_name: self.full_name,
            short_name: non_empty(self.short_name),
            inn: non_empty(self.inn),
            address: non_empty(self.address),
            is_branch,
            parent_ogrn,
            region_name: non_empty(self.region_name),
            programs: self.programs,
        })
    }
}

// ============================================================================
// Certificate stream
// ============================================================================

/// Pull-based iterator over the certificates of one XML document.
///
/// Yields one outcome per `<Certificate>` element at any depth. After an
/// error is yielded the stream is exhausted.
pub struct CertificateStream<R: BufRead> {
    reader: Reader<R>,
    source_name: String,
    buf: Vec<u8>,
    /// Element names below the open `<Certificate>`
    path: Vec<String>,
    text: String,
    current: Option<CertificateBuilder>,
    program_skips: ProgramSkips,
    done: bool,
}

impl CertificateStream<BufReader<File>> {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

impl<R: BufRead> CertificateStream<R> {
    pub fn new(reader: R, source_name: impl Into<String>) -> Self {
        let mut reader = Reader::from_reader(reader);
        let config = reader.config_mut();
        config.trim_text(true);
        // Registry dumps are not always well formed; tolerate mismatched end tags.
        config.check_end_names = false;

        Self {
            reader,
            source_name: source_name.into(),
            buf: Vec::with_capacity(4 * 1024),
            path: Vec::new(),
            text: String::new(),
            current: None,
            program_skips: ProgramSkips::default(),
            done: false,
        }
    }

    pub fn program_skips(&self) -> ProgramSkips {
        self.program_skips
    }

    /// Bytes currently reserved for scratch state. Stays flat across records.
    pub fn scratch_capacity(&self) -> usize {
        self.buf.capacity()
            + self.text.capacity()
            + self.path.iter().map(String::capacity).sum::<usize>()
    }

    fn open_element(&mut self, name: String) {
        let Some(certificate) = self.current.as_mut() else {
            if name == CERTIFICATE_TAG {
                self.current = Some(CertificateBuilder::default());
                self.path.clear();
            }
            return;
        };

        self.path.push(name);
        self.text.clear();

        if self.path.len() == 1 && self.path[0] == ORGANIZATION_TAG {
            certificate.has_organization = true;
        }
        if self.path.iter().map(String::as_str).eq(PROGRAM_PATH) {
            certificate.current_program = Some(ProgramBuilder::default());
        }
    }

    /// Returns the finished record when the certificate itself closes.
    fn close_element(&mut self) -> Option<RecordOutcome> {
        let certificate = self.current.as_mut()?;

        if self.path.is_empty() {
            self.text.clear();
            return self.current.take().map(CertificateBuilder::finish);
        }

        let path: Vec<&str> = self.path.iter().map(String::as_str).collect();
        certificate.set_field(&path, self.text.trim());
        if path == PROGRAM_PATH {
            certificate.finish_program(&mut self.program_skips);
        }

        self.path.pop();
        self.text.clear();
        None
    }

    fn syntax_error(&self, message: String) -> XmlError {
        XmlError::Syntax {
            source_name: self.source_name.clone(),
            position: self.reader.buffer_position() as u64,
            message,
        }
    }

    fn next_outcome(&mut self) -> Result<Option<RecordOutcome>> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event.into_owned(),
                Err(e) => return Err(self.syntax_error(e.to_string())),
            };

            match event {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    self.open_element(name);
                },
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if self.current.is_none() && name == CERTIFICATE_TAG {
                        return Ok(Some(CertificateBuilder::default().finish()));
                    }
                    self.open_element(name);
                    if let Some(outcome) = self.close_element() {
                        return Ok(Some(outcome));
                    }
                },
                Event::Text(t) => {
                    if self.current.is_some() {
                        match t.unescape() {
                            Ok(value) => self.text.push_str(&value),
                            Err(_) => self.text.push_str(&String::from_utf8_lossy(&t)),
                        }
                    }
                },
                Event::CData(c) => {
                    if self.current.is_some() {
                        self.text.push_str(&String::from_utf8_lossy(&c));
                    }
                },
                Event::End(_) => {
                    if let Some(outcome) = self.close_element() {
                        return Ok(Some(outcome));
                    }
                },
                Event::Eof => {
                    if self.current.take().is_some() {
                        warn!(source = %self.source_name, "Document ended inside a certificate, record discarded");
                    }
                    return Ok(None);
                },
                _ => {},
            }
        }
    }
}

impl<R: BufRead> Iterator for CertificateStream<R> {
    type Item = Result<RecordOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_outcome() {
            Ok(Some(outcome)) => Some(Ok(outcome)),
            Ok(None) => {
                self.done = true;
                None
            },
            Err(e) => {
                self.done = true;
                Some(Err(e))
            },
        }
    }
}

// ============================================================================
// Directory parsing
// ============================================================================

/// Counters for one parse of the cache directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseSummary {
    pub files: usize,
    pub files_with_errors: usize,
    pub organizations: usize,
    pub skipped_missing_organization: usize,
    pub skipped_missing_ogrn: usize,
    pub programs: usize,
    pub programs_not_accredited: usize,
    pub programs_missing_code: usize,
}

impl ParseSummary {
    fn count_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::MissingOrganization => self.skipped_missing_organization += 1,
            SkipReason::MissingOgrn => self.skipped_missing_ogrn += 1,
        }
    }

    fn add_program_skips(&mut self, skips: ProgramSkips) {
        self.programs_not_accredited += skips.not_accredited;
        self.programs_missing_code += skips.missing_code;
    }
}

#[derive(Debug, Default)]
pub struct ParseOutput {
    pub records: Vec<OrganizationRecord>,
    pub summary: ParseSummary,
}

/// Parser for every `*.xml` file directly inside a directory.
#[derive(Debug, Clone, Default)]
pub struct RegistryParser {
    limit: Option<usize>,
}

impl RegistryParser {
    pub fn new() -> Self {
        Self { limit: None }
    }

    /// Stop after `limit` parsed organizations (across all files).
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }

    /// XML files directly inside `dir`, sorted by name.
    pub fn discover_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && has_xml_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Parse every XML file in `dir`. A missing or empty directory, or a set
    /// of unreadable files, gives an empty output rather than an error.
    pub fn parse_directory(&self, dir: &Path) -> ParseOutput {
        info!(dir = %dir.display(), "Parsing XML files");

        let files = match Self::discover_files(dir) {
            Ok(files) => files,
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "Failed to list cache directory");
                return ParseOutput::default();
            },
        };

        if files.is_empty() {
            warn!(dir = %dir.display(), "No XML files to parse");
            return ParseOutput::default();
        }

        let mut output = ParseOutput::default();
        for path in &files {
            if self.limit_reached(&output) {
                warn!(limit = ?self.limit, "Parse limit reached, remaining files ignored");
                break;
            }
            self.parse_file_into(path, &mut output);
        }

        info!(
            files = output.summary.files,
            organizations = output.summary.organizations,
            skipped_missing_organization = output.summary.skipped_missing_organization,
            skipped_missing_ogrn = output.summary.skipped_missing_ogrn,
            programs_not_accredited = output.summary.programs_not_accredited,
            "XML parsing finished"
        );

        output
    }

    /// Parse one file, appending to `output`. Records read before a syntax
    /// error are kept.
    pub fn parse_file_into(&self, path: &Path, output: &mut ParseOutput) {
        output.summary.files += 1;
        info!(file = %path.display(), "Parsing file");

        let stream = match CertificateStream::from_path(path) {
            Ok(stream) => stream,
            Err(e) => {
                error!(file = %path.display(), error = %e, "Failed to open XML file");
                output.summary.files_with_errors += 1;
                return;
            },
        };

        let found = self.drain(stream, path, output);
        info!(file = %path.display(), organizations = found, "File parsed");
    }

    fn drain<R: BufRead>(
        &self,
        mut stream: CertificateStream<R>,
        path: &Path,
        output: &mut ParseOutput,
    ) -> usize {
        let mut found = 0;

        while !self.limit_reached(output) {
            let Some(item) = stream.next() else {
                break;
            };
            match item {
                Ok(RecordOutcome::Parsed(record)) => {
                    output.summary.organizations += 1;
                    output.summary.programs += record.programs.len();
                    output.records.push(record);
                    found += 1;
                },
                Ok(RecordOutcome::Skipped(skipped)) => {
                    warn!(
                        file = %path.display(),
                        certificate_id = skipped.certificate_id.as_deref().unwrap_or("-"),
                        full_name = skipped.full_name.as_deref().unwrap_or("-"),
                        reason = %skipped.reason,
                        "Skipping certificate"
                    );
                    output.summary.count_skip(skipped.reason);
                },
                Err(e) => {
                    error!(file = %path.display(), error = %e, "XML error, keeping records read so far");
                    output.summary.files_with_errors += 1;
                    break;
                },
            }
        }

        output.summary.add_program_skips(stream.program_skips());
        found
    }

    fn limit_reached(&self, output: &ParseOutput) -> bool {
        self.limit
            .is_some_and(|limit| output.records.len() >= limit)
    }
}

fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes(xml: &str) -> Vec<RecordOutcome> {
        CertificateStream::new(xml.as_bytes(), "inline")
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn parsed(xml: &str) -> Vec<OrganizationRecord> {
        outcomes(xml)
            .into_iter()
            .filter_map(|o| match o {
                RecordOutcome::Parsed(r) => Some(r),
                RecordOutcome::Skipped(_) => None,
            })
            .collect()
    }

    const HEAD_AND_BRANCH: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OpenData>
  <Certificates>
    <Certificate>
      <Id>cert-1</Id>
      <EduOrgOGRN>1027700000001</EduOrgOGRN>
      <ActualEducationOrganization>
        <FullName>Федеральное государственное бюджетное образовательное учреждение &quot;Университет&quot;</FullName>
        <ShortName>ФГБОУ ВО Университет</ShortName>
        <OGRN>1027700000001</OGRN>
        <INN>7701000001</INN>
        <PostAddress>123456, Московская область, г. Подольск</PostAddress>
        <IsBranch>0</IsBranch>
        <RegionName>Московская область</RegionName>
      </ActualEducationOrganization>
      <Supplements>
        <Supplement>
          <EducationalPrograms>
            <EducationalProgram>
              <UGSCode>09.00.00</UGSCode>
              <UGSName>Информатика и вычислительная техника</UGSName>
              <ProgrammCode>09.03.01</ProgrammCode>
              <ProgrammName>Информатика и вычислительная техника</ProgrammName>
              <IsAccredited>1</IsAccredited>
            </EducationalProgram>
            <EducationalProgram>
              <UGSCode>38.00.00</UGSCode>
              <ProgrammCode>38.03.01</ProgrammCode>
              <IsAccredited>0</IsAccredited>
            </EducationalProgram>
            <EducationalProgram>
              <UGSCode>38.00.00</UGSCode>
              <ProgrammName>Без кода</ProgrammName>
            </EducationalProgram>
          </EducationalPrograms>
        </Supplement>
      </Supplements>
    </Certificate>
    <Certificate>
      <Id>cert-2</Id>
      <EduOrgOGRN>1027700000001</EduOrgOGRN>
      <ActualEducationOrganization>
        <FullName>Филиал Университета</FullName>
        <OGRN>1027700000002</OGRN>
        <IsBranch>1</IsBranch>
        <PostAddress>г. Серпухов</PostAddress>
      </ActualEducationOrganization>
    </Certificate>
  </Certificates>
</OpenData>"#;

    #[test]
    fn test_parse_head_and_branch() {
        let records = parsed(HEAD_AND_BRANCH);
        assert_eq!(records.len(), 2);

        let head = &records[0];
        assert_eq!(head.ogrn, "1027700000001");
        assert!(head.full_name.ends_with("\"Университет\""));
        assert_eq!(head.short_name.as_deref(), Some("ФГБОУ ВО Университет"));
        assert_eq!(head.inn.as_deref(), Some("7701000001"));
        assert_eq!(head.region_name.as_deref(), Some("Московская область"));
        assert!(!head.is_branch);
        assert_eq!(head.parent_ogrn, None);

        let branch = &records[1];
        assert!(branch.is_branch);
        assert_eq!(branch.parent_ogrn.as_deref(), Some("1027700000001"));
        assert_eq!(branch.region_name, None);
        assert_eq!(branch.short_name, None);
        assert!(branch.programs.is_empty());
    }

    #[test]
    fn test_non_accredited_and_codeless_programs_are_dropped() {
        let mut stream = CertificateStream::new(HEAD_AND_BRANCH.as_bytes(), "inline");
        let first = stream.next().unwrap().unwrap();
        let RecordOutcome::Parsed(head) = first else {
            panic!("expected parsed record");
        };

        assert_eq!(head.programs.len(), 1);
        assert_eq!(head.programs[0].specialty_code, "09.03.01");
        assert_eq!(head.programs[0].ugs_code, "09.00.00");
        assert_eq!(
            stream.program_skips(),
            ProgramSkips {
                not_accredited: 1,
                missing_code: 1
            }
        );
    }

    #[test]
    fn test_missing_organization_and_ogrn_are_skipped() {
        let xml = r#"<Certificates>
            <Certificate><Id>no-org</Id></Certificate>
            <Certificate><Id>no-ogrn</Id>
              <ActualEducationOrganization><FullName>Без ОГРН</FullName><OGRN></OGRN></ActualEducationOrganization>
            </Certificate>
            <Certificate/>
        </Certificates>"#;

        let results = outcomes(xml);
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0],
            RecordOutcome::Skipped(SkippedRecord {
                reason: SkipReason::MissingOrganization,
                certificate_id: Some("no-org".into()),
                full_name: None,
            })
        );
        assert_eq!(
            results[1],
            RecordOutcome::Skipped(SkippedRecord {
                reason: SkipReason::MissingOgrn,
                certificate_id: Some("no-ogrn".into()),
                full_name: Some("Без ОГРН".into()),
            })
        );
        assert!(matches!(
            &results[2],
            RecordOutcome::Skipped(s) if s.reason == SkipReason::MissingOrganization
        ));
    }

    #[test]
    fn test_head_ogrn_ignored_for_non_branch() {
        let xml = r#"<Certificate>
            <EduOrgOGRN>1111111111111</EduOrgOGRN>
            <ActualEducationOrganization><OGRN>2222222222222</OGRN></ActualEducationOrganization>
        </Certificate>"#;
        let records = parsed(xml);
        assert_eq!(records[0].parent_ogrn, None);
        assert!(!records[0].is_branch);
    }

    #[test]
    fn test_nested_org_fields_do_not_leak() {
        // A <FullName> under some other element must not overwrite the organization's.
        let xml = r#"<Certificate>
            <ActualEducationOrganization>
              <OGRN>3333333333333</OGRN>
              <FullName>Настоящее имя</FullName>
            </ActualEducationOrganization>
            <EduOrg><FullName>Чужое имя</FullName><OGRN>4444444444444</OGRN></EduOrg>
        </Certificate>"#;
        let records = parsed(xml);
        assert_eq!(records[0].full_name, "Настоящее имя");
        assert_eq!(records[0].ogrn, "3333333333333");
    }

    #[test]
    fn test_syntax_error_keeps_earlier_records() {
        let xml = r#"<Certificates>
            <Certificate><ActualEducationOrganization><OGRN>5555555555555</OGRN></ActualEducationOrganization></Certificate>
            <Certificate><ActualEducationOrganization><OGRN>6666666666666</OGRN
        "#;
        let mut stream = CertificateStream::new(xml.as_bytes(), "broken.xml");
        assert!(matches!(stream.next(), Some(Ok(RecordOutcome::Parsed(_)))));
        assert!(matches!(stream.next(), Some(Err(XmlError::Syntax { .. }))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_parse_directory_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.xml"), HEAD_AND_BRANCH).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "<Certificate/>").unwrap();
        std::fs::write(dir.path().join("b.XML"), "<Certificate><Id>x</Id></Certificate>").unwrap();

        let output = RegistryParser::new().parse_directory(dir.path());
        assert_eq!(output.summary.files, 2);
        assert_eq!(output.records.len(), 2);
        assert_eq!(output.summary.skipped_missing_organization, 1);
        assert_eq!(output.summary.programs_not_accredited, 1);
        assert_eq!(output.summary.programs, 1);
    }

    const TRUNCATED: &str = r#"<Certificates>
            <Certificate><ActualEducationOrganization><OGRN>7777777777777</OGRN></ActualEducationOrganization></Certificate>
            <Certificate><ActualEducationOrganization><OGRN>8888888888888</OGRN"#;

    #[test]
    fn test_broken_file_does_not_stop_later_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.xml"), TRUNCATED).unwrap();
        std::fs::write(dir.path().join("b.xml"), HEAD_AND_BRANCH).unwrap();

        let output = RegistryParser::new().parse_directory(dir.path());
        let ogrns: Vec<_> = output.records.iter().map(|r| r.ogrn.as_str()).collect();
        assert_eq!(ogrns, ["7777777777777", "1027700000001", "1027700000002"]);
        assert_eq!(output.summary.files, 2);
        assert_eq!(output.summary.files_with_errors, 1);
        assert_eq!(output.summary.organizations, 3);
    }

    #[test]
    fn test_all_files_broken_gives_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.xml"),
            "<Certificates><Certificate><ActualEducationOrganization><OGRN>1</OGRN",
        )
        .unwrap();
        std::fs::write(dir.path().join("b.xml"), "<Certificates><Certificate><Id>x</Id").unwrap();

        let output = RegistryParser::new().parse_directory(dir.path());
        assert!(output.records.is_empty());
        assert_eq!(output.summary.files, 2);
        assert_eq!(output.summary.files_with_errors, 2);
    }

    #[test]
    fn test_parse_directory_empty_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RegistryParser::new().parse_directory(dir.path()).records.is_empty());
        let missing = dir.path().join("nope");
        assert!(RegistryParser::new().parse_directory(&missing).records.is_empty());
    }

    #[test]
    fn test_parse_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.xml"), HEAD_AND_BRANCH).unwrap();
        let output = RegistryParser::with_limit(1).parse_directory(dir.path());
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].ogrn, "1027700000001");
    }
}
