//! # CLI Command Implementations
//!
//! The actual implementations of CLI commands. Every command builds a
//! session from the global `--database`/`--backend`/`--experiments`
//! flags, runs one operation, and prints either aligned text or JSON
//! depending on `--json-mode`.

use crate::api;
use cohort_core::{
    CohortError, Experiment, ExperimentCatalog, ExperimentId, Identifier, Resolution, Session,
    audit_distribution, hash_seed, to_base36,
    export::{export_ledger, import_ledger, ledger_checksum, ledger_crypto_hash},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum catalog file size (1 MB). Catalogs are hand-written TOML;
/// anything larger is a mistake.
const MAX_CATALOG_FILE_SIZE: u64 = 1024 * 1024;

/// Maximum ledger file size for import (256 MB). Bounds memory before
/// the record-count check inside the parser runs.
const MAX_IMPORT_FILE_SIZE: u64 = 256 * 1024 * 1024;

// =============================================================================
// PATH AND FILE VALIDATION
// =============================================================================

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), CohortError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CohortError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(CohortError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path to a canonical file.
///
/// Canonicalization resolves `..` and symlinks and fails on missing
/// paths, so a crafted relative path cannot name files outside what the
/// caller intended.
fn validate_file_path(path: &Path) -> Result<PathBuf, CohortError> {
    let canonical = path.canonicalize().map_err(|e| {
        CohortError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(CohortError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path: canonical parent directory plus filename.
fn validate_output_path(path: &Path) -> Result<PathBuf, CohortError> {
    // A bare filename has an empty parent; treat it as the current dir.
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        CohortError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(CohortError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| CohortError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// CATALOG AND SESSION CONSTRUCTION
// =============================================================================

/// On-disk catalog shape: a TOML document with an `experiments` array.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    experiments: Vec<Experiment>,
}

/// Load and validate an experiment catalog from a TOML file.
///
/// No path means no catalog: commands still run, and every resolution
/// comes back `unknown_experiment`.
pub fn load_catalog(path: Option<&Path>) -> Result<ExperimentCatalog, CohortError> {
    let Some(path) = path else {
        return Ok(ExperimentCatalog::new());
    };

    let validated_path = validate_file_path(path)?;
    validate_file_size(&validated_path, MAX_CATALOG_FILE_SIZE)?;

    let contents = std::fs::read_to_string(&validated_path)
        .map_err(|e| CohortError::IoError(format!("Read catalog: {}", e)))?;

    let file: CatalogFile = toml::from_str(&contents)
        .map_err(|e| CohortError::DeserializationError(format!("Parse catalog: {}", e)))?;

    ExperimentCatalog::from_experiments(file.experiments)
}

/// Open a session on the requested backend.
pub fn open_session(
    db_path: &PathBuf,
    backend: &str,
    catalog: ExperimentCatalog,
) -> Result<Session, CohortError> {
    match backend {
        "redb" => Session::open(db_path, catalog),
        "memory" => Ok(Session::with_catalog(catalog)),
        _ => Err(CohortError::InvalidConfiguration(format!(
            "Unknown backend: {}. Use: redb, memory",
            backend
        ))),
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    db_path: &PathBuf,
    backend: &str,
    catalog_path: Option<&Path>,
    host: &str,
    port: u16,
) -> Result<(), CohortError> {
    let catalog = load_catalog(catalog_path)?;
    let session = open_session(db_path, backend, catalog)?;

    println!("Cohort Experiment Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:        {}", host);
    println!("  Port:        {}", port);
    println!("  Backend:     {}", backend);
    println!("  Database:    {:?}", db_path);
    println!("  Experiments: {}", session.catalog().len());
    println!();
    println!("Endpoints:");
    println!("  POST   /resolve     - Resolve a variant for a subject");
    println!("  POST   /convert     - Record a goal completion");
    println!("  POST   /audit       - Audit an experiment's split");
    println!("  GET    /experiments - List the experiment catalog");
    println!("  GET    /assignments - List stored assignments");
    println!("  DELETE /assignments - Clear stored assignments");
    println!("  POST   /export      - Export the assignment ledger");
    println!("  GET    /status      - Session status");
    println!("  GET    /health      - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, session).await
}

/// Show session status.
pub fn cmd_status(
    db_path: &PathBuf,
    backend: &str,
    catalog_path: Option<&Path>,
    json_mode: bool,
) -> Result<(), CohortError> {
    let catalog = load_catalog(catalog_path)?;
    let session = open_session(db_path, backend, catalog)?;
    let now = api::now_epoch_millis();

    let running = session.running_experiments(now).len();

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "backend": backend,
            "persistent": session.is_persistent(),
            "experiment_count": session.catalog().len(),
            "running_count": running,
            "assignment_count": session.assignment_count(),
            "buffered_events": session.events().len()
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Cohort Session Status");
    println!("=====================");
    println!("Database: {:?}", db_path);
    println!("Backend:  {}", backend);
    println!();
    println!("Experiments: {}", session.catalog().len());
    println!("Running:     {}", running);
    println!("Assignments: {}", session.assignment_count());
    println!("Events:      {}", session.events().len());

    Ok(())
}

/// List the experiment catalog.
pub fn cmd_experiments(
    catalog_path: Option<&Path>,
    json_mode: bool,
    detailed: bool,
) -> Result<(), CohortError> {
    let catalog = load_catalog(catalog_path)?;
    let now = api::now_epoch_millis();

    if json_mode {
        let experiments: Vec<serde_json::Value> = catalog
            .iter()
            .map(|experiment| {
                serde_json::json!({
                    "id": experiment.id.as_str(),
                    "name": experiment.name,
                    "enabled": experiment.enabled,
                    "running": experiment.is_running(now),
                    "variants": experiment.variants.len(),
                    "total_weight": experiment.total_weight()
                })
            })
            .collect();
        let output = serde_json::json!({
            "count": catalog.len(),
            "experiments": experiments
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Cohort Experiment Catalog");
    println!("=========================");
    println!();

    if catalog.is_empty() {
        println!("No experiments loaded. Pass --experiments <file> to load a catalog.");
        return Ok(());
    }

    for experiment in catalog.iter() {
        let state = if experiment.is_running(now) {
            "running"
        } else if experiment.enabled {
            "scheduled"
        } else {
            "disabled"
        };
        println!("{} [{}]", experiment.id.as_str(), state);
        println!("  Name:    {}", experiment.name);
        if detailed {
            if !experiment.description.is_empty() {
                println!("  About:   {}", experiment.description);
            }
            if let Some(rule) = &experiment.audience {
                println!("  Audience: {}%", rule.percentage);
            }
            let total = experiment.total_weight();
            for arm in &experiment.variants {
                println!(
                    "  Arm:     {} (weight {} of {})",
                    arm.id.as_str(),
                    arm.weight.value(),
                    total
                );
            }
        } else {
            println!("  Arms:    {}", experiment.variants.len());
        }
        println!();
    }

    Ok(())
}

/// Resolve a variant for one subject.
pub fn cmd_resolve(
    db_path: &PathBuf,
    backend: &str,
    catalog_path: Option<&Path>,
    json_mode: bool,
    identifier: &str,
    namespace: &str,
) -> Result<(), CohortError> {
    let catalog = load_catalog(catalog_path)?;
    let mut session = open_session(db_path, backend, catalog)?;

    let subject = Identifier::new(identifier);
    let experiment = ExperimentId::new(namespace);
    let resolution = session.resolve(&subject, &experiment, api::now_epoch_millis())?;

    if json_mode {
        let output = match &resolution {
            Resolution::Assigned { assignment, fresh } => serde_json::json!({
                "outcome": "assigned",
                "namespace": namespace,
                "identifier": identifier,
                "variant_id": assignment.variant_id.as_str(),
                "fresh": fresh,
                "assigned_at_epoch_millis": assignment.assigned_at_epoch_millis
            }),
            Resolution::Inactive(reason) => serde_json::json!({
                "outcome": "inactive",
                "namespace": namespace,
                "identifier": identifier,
                "reason": reason.as_str()
            }),
            Resolution::OutOfAudience => serde_json::json!({
                "outcome": "out_of_audience",
                "namespace": namespace,
                "identifier": identifier
            }),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    match resolution {
        Resolution::Assigned { assignment, fresh } => {
            let mark = if fresh { "assigned" } else { "replayed" };
            println!(
                "{} -> {} ({})",
                namespace,
                assignment.variant_id.as_str(),
                mark
            );
        }
        Resolution::Inactive(reason) => {
            println!(
                "{} is not serving variants ({})",
                namespace,
                reason.as_str()
            );
        }
        Resolution::OutOfAudience => {
            println!("{} excludes this subject (audience gate)", namespace);
        }
    }

    Ok(())
}

/// Record a goal completion for one subject.
#[allow(clippy::too_many_arguments)]
pub fn cmd_convert(
    db_path: &PathBuf,
    backend: &str,
    catalog_path: Option<&Path>,
    json_mode: bool,
    identifier: &str,
    namespace: &str,
    goal: &str,
    value: Option<i64>,
) -> Result<(), CohortError> {
    let catalog = load_catalog(catalog_path)?;
    let mut session = open_session(db_path, backend, catalog)?;

    let subject = Identifier::new(identifier);
    let experiment = ExperimentId::new(namespace);
    let converted = session.convert(&subject, &experiment, goal, value, api::now_epoch_millis())?;

    if json_mode {
        let output = match &converted {
            Some(event) => serde_json::json!({
                "converted": true,
                "namespace": namespace,
                "variant_id": event.variant_id.as_str(),
                "goal": event.goal,
                "value": event.value
            }),
            None => serde_json::json!({
                "converted": false,
                "namespace": namespace
            }),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    match converted {
        Some(event) => println!(
            "Recorded {} (value {}) against {} / {}",
            event.goal,
            event.value,
            namespace,
            event.variant_id.as_str()
        ),
        None => println!(
            "{} has no variant for this subject; nothing recorded",
            namespace
        ),
    }

    Ok(())
}

/// Audit an experiment's split against its configured weights.
pub fn cmd_audit(
    catalog_path: Option<&Path>,
    json_mode: bool,
    namespace: &str,
    samples: u32,
    tolerance_bp: u32,
) -> Result<(), CohortError> {
    let catalog = load_catalog(catalog_path)?;
    let experiment_id = ExperimentId::new(namespace);
    let experiment = catalog
        .get(&experiment_id)
        .ok_or_else(|| CohortError::ExperimentNotFound(namespace.to_string()))?;

    let report = audit_distribution(experiment, samples)?;
    let within = report.within_tolerance(tolerance_bp);

    if json_mode {
        let output = serde_json::json!({
            "report": report,
            "tolerance_bp": tolerance_bp,
            "within_tolerance": within
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Cohort Distribution Audit");
    println!("=========================");
    println!();
    println!("Namespace: {}", report.namespace);
    println!("Samples:   {}", report.sample_size);
    println!();
    for split in &report.splits {
        println!(
            "  {:<24} observed {:>8}  expected {:>8}  drift {:>5} bp",
            split.variant_id.as_str(),
            split.observed,
            split.expected,
            split.deviation_bp
        );
    }
    println!();
    println!(
        "Max drift: {} bp (tolerance {} bp)",
        report.max_deviation_bp, tolerance_bp
    );
    println!(
        "Verdict:   {}",
        if within {
            "WITHIN TOLERANCE"
        } else {
            "DRIFT EXCEEDS TOLERANCE"
        }
    );

    Ok(())
}

/// List stored assignments.
pub fn cmd_assignments(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
) -> Result<(), CohortError> {
    let session = open_session(db_path, backend, ExperimentCatalog::new())?;
    let assignments = session.assignments();

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&assignments).unwrap_or_default()
        );
        return Ok(());
    }

    if assignments.is_empty() {
        println!("No stored assignments in {:?}", db_path);
        return Ok(());
    }

    println!("Stored Assignments ({})", assignments.len());
    println!("======================");
    for assignment in &assignments {
        println!(
            "  {:<32} -> {:<20} (subject {}, at {})",
            assignment.namespace.as_str(),
            assignment.variant_id.as_str(),
            assignment.identifier.as_str(),
            assignment.assigned_at_epoch_millis
        );
    }

    Ok(())
}

/// Remove every stored assignment.
pub fn cmd_clear(db_path: &PathBuf, backend: &str, yes: bool) -> Result<(), CohortError> {
    if !yes {
        return Err(CohortError::InvalidConfiguration(
            "Refusing to clear assignments without --yes".to_string(),
        ));
    }

    let mut session = open_session(db_path, backend, ExperimentCatalog::new())?;
    let removed = session.clear_assignments()?;
    println!("Removed {} assignments from {:?}", removed, db_path);

    Ok(())
}

/// Export the assignment ledger to a file.
pub fn cmd_export(
    db_path: &PathBuf,
    backend: &str,
    output: &Path,
    format: &str,
) -> Result<(), CohortError> {
    let validated_output = validate_output_path(output)?;

    let session = open_session(db_path, backend, ExperimentCatalog::new())?;
    let assignments = session.assignments();

    let data = match format {
        "canonical" => {
            let data = export_ledger(&assignments)?;
            println!("Checksum: {}", ledger_checksum(&assignments));
            println!("BLAKE3:   {}", ledger_crypto_hash(&assignments)?);
            data
        }
        "json" => serde_json::to_vec_pretty(&assignments)
            .map_err(|e| CohortError::SerializationError(e.to_string()))?,
        _ => {
            return Err(CohortError::SerializationError(format!(
                "Unknown format: {}. Use: canonical, json",
                format
            )));
        }
    };

    std::fs::write(&validated_output, &data)
        .map_err(|e| CohortError::IoError(format!("Write file: {}", e)))?;

    println!(
        "Exported {} assignments ({} bytes) to {:?}",
        assignments.len(),
        data.len(),
        validated_output
    );

    Ok(())
}

/// Import an assignment ledger from a file.
pub fn cmd_import(db_path: &PathBuf, backend: &str, input: &Path) -> Result<(), CohortError> {
    if backend != "redb" {
        return Err(CohortError::InvalidConfiguration(
            "Import needs the redb backend; a memory store does not outlive the command"
                .to_string(),
        ));
    }

    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;

    let data = std::fs::read(&validated_path)
        .map_err(|e| CohortError::IoError(format!("Read file: {}", e)))?;

    let records = import_ledger(&data)?;
    let mut session = open_session(db_path, backend, ExperimentCatalog::new())?;
    let count = session.import_assignments(records)?;

    println!("Imported {} assignments into {:?}", count, db_path);

    Ok(())
}

/// Initialize a new assignment database.
pub fn cmd_init(db_path: &PathBuf, backend: &str, force: bool) -> Result<(), CohortError> {
    if backend != "redb" {
        return Err(CohortError::InvalidConfiguration(
            "The memory backend has nothing to initialize".to_string(),
        ));
    }

    if db_path.exists() {
        if !force {
            return Err(CohortError::InvalidConfiguration(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| CohortError::IoError(format!("Remove old database: {}", e)))?;
    }

    let _session = Session::open(db_path, ExperimentCatalog::new())?;
    println!("Initialized assignment database at {:?}", db_path);

    Ok(())
}

/// Hash a seed string with the bucketing hash.
pub fn cmd_hash(json_mode: bool, seed: &str) -> Result<(), CohortError> {
    let hash = hash_seed(seed);
    let base36 = to_base36(hash);

    if json_mode {
        let output = serde_json::json!({
            "seed": seed,
            "hash": hash,
            "base36": base36
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Seed:   {}", seed);
    println!("Hash:   {}", hash);
    println!("Base36: {}", base36);

    Ok(())
}
