//! Import orchestration.
//!
//! Discovers `*.pdf` files in the invoice and receipt directories and runs
//! each one through read → parse → categorize → store on a bounded worker
//! pool. Files are independent: a failure is recorded in that file's
//! [`FileReport`] and the batch carries on.

mod state;

pub use state::FileState;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use glob::{glob_with, MatchOptions};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{spawn_blocking, JoinHandle, JoinSet};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::categorizer::{CategorizationAmbiguity, Categorizer};
use crate::error::{KassaError, ParseError};
use crate::models::config::ImportConfig;
use crate::models::document::{ContentHash, DocumentKind, SourceDocument};
use crate::parser::{LayoutParser, TotalMismatch};
use crate::pdf::{DocumentReader, PdfExtractor};
use crate::store::{IngestOutcome, Store};

/// A file found during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

/// Files to import, plus configured directories that do not exist.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    pub missing_directories: Vec<PathBuf>,
}

/// Pipeline step a file failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Read,
    Parse,
    /// The batch deadline passed before reading and parsing finished.
    Timeout,
    Store,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            FailureStage::Read => "read",
            FailureStage::Parse => "parse",
            FailureStage::Timeout => "timeout",
            FailureStage::Store => "store",
        };
        f.write_str(stage)
    }
}

/// How a file ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileOutcome {
    Imported { records: usize },
    /// Same content as an already stored document.
    Duplicate,
    Failed { stage: FailureStage, error: String },
}

/// Non-fatal problems found while importing a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImportWarning {
    /// A line was skipped.
    Line {
        line: usize,
        reason: String,
        context: String,
    },
    Ambiguity(CategorizationAmbiguity),
    /// Record totals do not add up to the stated document total.
    TotalMismatch(TotalMismatch),
}

impl From<ParseError> for ImportWarning {
    fn from(e: ParseError) -> Self {
        ImportWarning::Line {
            line: e.line,
            reason: e.reason.to_string(),
            context: e.context,
        }
    }
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportWarning::Line {
                line,
                reason,
                context,
            } => write!(f, "line {} skipped: {} ({:?})", line, reason, context),
            ImportWarning::Ambiguity(ambiguity) => write!(f, "ambiguous category: {}", ambiguity),
            ImportWarning::TotalMismatch(m) => write!(
                f,
                "records add up to {} but the document states {}",
                m.computed, m.stated
            ),
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub kind: DocumentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<ContentHash>,
    pub state: FileState,
    pub outcome: FileOutcome,
    pub warnings: Vec<ImportWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<NaiveDate>,
    pub elapsed_ms: u64,
}

impl FileReport {
    fn new(file: &DiscoveredFile) -> Self {
        Self {
            path: file.path.clone(),
            kind: file.kind,
            hash: None,
            state: FileState::Discovered,
            outcome: FileOutcome::Duplicate,
            warnings: Vec::new(),
            purchase_date: None,
            elapsed_ms: 0,
        }
    }

    fn fail(&mut self, stage: FailureStage, error: impl fmt::Display) -> FileOutcome {
        self.state.advance(FileState::Failed);
        FileOutcome::Failed {
            stage,
            error: error.to_string(),
        }
    }

    /// File name for display.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Result of one import batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub imported: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
    /// Records written by this batch.
    pub records: usize,
    pub files: Vec<FileReport>,
    pub missing_directories: Vec<PathBuf>,
}

impl Summary {
    fn from_reports(mut files: Vec<FileReport>, missing_directories: Vec<PathBuf>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut summary = Summary {
            missing_directories,
            ..Summary::default()
        };
        for report in &files {
            match report.outcome {
                FileOutcome::Imported { records } => {
                    summary.imported += 1;
                    summary.records += records;
                }
                FileOutcome::Duplicate => summary.skipped_duplicate += 1,
                FileOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary.files = files;
        summary
    }

    pub fn warning_count(&self) -> usize {
        self.files.iter().map(|f| f.warnings.len()).sum()
    }
}

/// Drives files through the pipeline.
pub struct ImportOrchestrator {
    store: Arc<Store>,
    categorizer: Arc<Categorizer>,
    reader: Arc<dyn DocumentReader>,
    config: ImportConfig,
}

impl ImportOrchestrator {
    /// Create an orchestrator that reads PDFs.
    pub fn new(store: Arc<Store>, categorizer: Arc<Categorizer>, config: ImportConfig) -> Self {
        Self {
            store,
            categorizer,
            reader: Arc::new(PdfExtractor::new()),
            config,
        }
    }

    /// Use a different document reader.
    pub fn with_reader(mut self, reader: Arc<dyn DocumentReader>) -> Self {
        self.reader = reader;
        self
    }

    /// Find `*.pdf` files (any case) in both directories.
    pub fn discover(invoice_dir: &Path, receipt_dir: &Path) -> Discovery {
        let mut discovery = Discovery::default();
        let mut seen = HashSet::new();

        for (dir, kind) in [
            (invoice_dir, DocumentKind::Invoice),
            (receipt_dir, DocumentKind::Receipt),
        ] {
            if !dir.is_dir() {
                warn!("{} directory {} does not exist", kind, dir.display());
                discovery.missing_directories.push(dir.to_path_buf());
                continue;
            }

            let mut files = pdf_files(dir);
            files.sort();
            debug!("Found {} {} files in {}", files.len(), kind, dir.display());
            for path in files {
                if seen.insert(path.clone()) {
                    discovery.files.push(DiscoveredFile { path, kind });
                }
            }
        }
        discovery
    }

    /// Discover and import everything in the two directories.
    pub async fn run(&self, invoice_dir: &Path, receipt_dir: &Path) -> Summary {
        let discovery = Self::discover(invoice_dir, receipt_dir);
        self.import(discovery, |_| {}).await
    }

    /// Import discovered files, calling `on_file` as each one finishes.
    pub async fn import<F>(&self, discovery: Discovery, mut on_file: F) -> Summary
    where
        F: FnMut(&FileReport),
    {
        let deadline = (self.config.batch_timeout_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(self.config.batch_timeout_secs));
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let expected = discovery.files.clone();

        info!(
            "Importing {} files with {} workers",
            discovery.files.len(),
            self.config.workers.max(1)
        );

        let mut tasks = JoinSet::new();
        for file in discovery.files {
            let job = FileJob {
                parser: LayoutParser::for_kind(file.kind, self.config.tolerance),
                file,
                store: Arc::clone(&self.store),
                categorizer: Arc::clone(&self.categorizer),
                reader: Arc::clone(&self.reader),
                deadline,
            };
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                job.run().await
            });
        }

        let mut reports = Vec::with_capacity(expected.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    on_file(&report);
                    reports.push(report);
                }
                Err(e) => error!("Import task failed: {}", e),
            }
        }

        // A task that died still gets a report
        let reported: HashSet<PathBuf> = reports.iter().map(|r| r.path.clone()).collect();
        for file in expected.iter().filter(|f| !reported.contains(&f.path)) {
            let mut report = FileReport::new(file);
            report.outcome = report.fail(FailureStage::Read, "import task aborted");
            on_file(&report);
            reports.push(report);
        }

        let summary = Summary::from_reports(reports, discovery.missing_directories);
        info!(
            "Import finished: {} imported, {} duplicates, {} failed",
            summary.imported, summary.skipped_duplicate, summary.failed
        );
        summary
    }
}

fn pdf_files(dir: &Path) -> Vec<PathBuf> {
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    let pattern = format!(
        "{}/*.pdf",
        glob::Pattern::escape(&dir.to_string_lossy())
    );

    match glob_with(&pattern, options) {
        Ok(paths) => paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect(),
        Err(e) => {
            warn!("Invalid discovery pattern {}: {}", pattern, e);
            Vec::new()
        }
    }
}

/// Why a blocking step did not produce a value.
enum Interrupted {
    Timeout,
    Panicked(String),
}

/// One file's trip through the pipeline.
struct FileJob {
    file: DiscoveredFile,
    store: Arc<Store>,
    categorizer: Arc<Categorizer>,
    reader: Arc<dyn DocumentReader>,
    parser: LayoutParser,
    deadline: Option<Instant>,
}

impl FileJob {
    async fn run(self) -> FileReport {
        let started = std::time::Instant::now();
        let mut report = FileReport::new(&self.file);

        report.outcome = self.process(&mut report).await;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        match &report.outcome {
            FileOutcome::Imported { records } => info!(
                "Imported {} ({} records, {} warnings)",
                report.file_name(),
                records,
                report.warnings.len()
            ),
            FileOutcome::Duplicate => info!("Skipped {} (already imported)", report.file_name()),
            FileOutcome::Failed { stage, error } => {
                warn!("Failed {} at {}: {}", report.file_name(), stage, error)
            }
        }
        report
    }

    async fn process(&self, report: &mut FileReport) -> FileOutcome {
        // Hash first: known documents are never read
        let path = self.file.path.clone();
        let kind = self.file.kind;
        let store = Arc::clone(&self.store);
        let checked = spawn_blocking(move || -> Result<_, KassaError> {
            let data = std::fs::read(&path)?;
            let document = SourceDocument::new(&path, kind, &data);
            let known = store.contains(&document.hash)?;
            Ok((document, data, known))
        })
        .await;

        let (document, data, known) = match checked {
            Ok(Ok(checked)) => checked,
            Ok(Err(e)) => return report.fail(FailureStage::Read, e),
            Err(e) => return report.fail(FailureStage::Read, e),
        };
        report.hash = Some(document.hash.clone());

        if known {
            report.state.advance(FileState::Stored);
            return FileOutcome::Duplicate;
        }

        report.state.advance(FileState::Reading);
        let reader = Arc::clone(&self.reader);
        let extracted = match self.before_deadline(move || reader.read(&data)).await {
            Ok(Ok(extracted)) => extracted,
            Ok(Err(e)) => return report.fail(FailureStage::Read, e),
            Err(interrupted) => return self.interrupted(report, FailureStage::Read, interrupted),
        };
        debug!(
            "Read {} lines from {}",
            extracted.lines.len(),
            report.file_name()
        );

        report.state.advance(FileState::Parsing);
        let parser = self.parser.clone();
        let hash = document.hash.clone();
        let raw_text = extracted.layout_text();
        let parsed = match self
            .before_deadline(move || parser.parse(&extracted.lines, &hash))
            .await
        {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(e)) => return report.fail(FailureStage::Parse, e),
            Err(interrupted) => return self.interrupted(report, FailureStage::Parse, interrupted),
        };

        report.purchase_date = Some(parsed.purchase_date);
        report
            .warnings
            .extend(parsed.errors.into_iter().map(ImportWarning::from));
        if let Some(mismatch) = parsed.total_mismatch {
            warn!(
                "{}: records add up to {} but the document states {}",
                report.file_name(),
                mismatch.computed,
                mismatch.stated
            );
            report.warnings.push(ImportWarning::TotalMismatch(mismatch));
        }

        report.state.advance(FileState::Categorizing);
        let rules_version = self.categorizer.version();
        let mut records = parsed.records;
        for record in &mut records {
            if let Some(ambiguity) = self.categorizer.categorize(record) {
                warn!("{}: {}", report.file_name(), ambiguity);
                report.warnings.push(ImportWarning::Ambiguity(ambiguity));
            }
        }

        let document = document
            .with_header(parsed.header)
            .with_raw_text(raw_text)
            .with_rules_version(rules_version);
        let store = Arc::clone(&self.store);
        let stored = spawn_blocking(move || store.ingest(&document, &records)).await;

        match stored {
            Ok(Ok(IngestOutcome::Inserted { records, .. })) => {
                report.state.advance(FileState::Stored);
                FileOutcome::Imported { records }
            }
            Ok(Ok(IngestOutcome::AlreadyImported)) => {
                report.state.advance(FileState::Stored);
                FileOutcome::Duplicate
            }
            Ok(Err(e)) => report.fail(FailureStage::Store, e),
            Err(e) => report.fail(FailureStage::Store, e),
        }
    }

    /// Run blocking work, giving up on it once the batch deadline passes.
    ///
    /// The work itself is not cancelled; its result is dropped.
    async fn before_deadline<T, F>(&self, work: F) -> Result<T, Interrupted>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let Some(deadline) = self.deadline else {
            return spawn_blocking(work)
                .await
                .map_err(|e| Interrupted::Panicked(e.to_string()));
        };
        if Instant::now() >= deadline {
            return Err(Interrupted::Timeout);
        }

        let task: JoinHandle<T> = spawn_blocking(work);
        match timeout_at(deadline, task).await {
            Ok(joined) => joined.map_err(|e| Interrupted::Panicked(e.to_string())),
            Err(_) => Err(Interrupted::Timeout),
        }
    }

    fn interrupted(
        &self,
        report: &mut FileReport,
        stage: FailureStage,
        interrupted: Interrupted,
    ) -> FileOutcome {
        match interrupted {
            Interrupted::Timeout => {
                let state = report.state;
                report.fail(
                    FailureStage::Timeout,
                    format!("batch deadline passed while {}", state),
                )
            }
            Interrupted::Panicked(e) => report.fail(stage, e),
        }
    }
}
