//! Build (or lock-check) profiles for proposal documents.
//!
//! Usage:
//!   build_profile --insurer samsung [--variant m_40] [--source dump.json]
//!   build_profile --manifest manifest.json
//!
//! Common flags:
//!   --profiles DIR   profile store root (default: profiles)
//!   --sources DIR    source dump directory for auto-discovery (default: proposals)
//!
//! The manifest is a JSON array of {"insurer", "variant", "path"} entries.
//! Exit codes: 0 success, 1 runtime error, 2 hard gate failure (profile
//! lock violation, unreadable document) — code 2 means "do not retry,
//! investigate first".

use std::path::PathBuf;
use std::process::ExitCode;

use serde::Deserialize;

use proposal_oxide::builder::ProfileBuilder;
use proposal_oxide::document::JsonDocument;
use proposal_oxide::heuristics::Heuristics;
use proposal_oxide::profile::{ProfileStore, SaveOutcome};
use proposal_oxide::error::Error;

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    insurer: String,
    #[serde(default = "default_variant")]
    variant: String,
    path: PathBuf,
}

fn default_variant() -> String {
    "default".to_string()
}

struct BuildConfig {
    insurer: Option<String>,
    variant: String,
    source: Option<PathBuf>,
    manifest: Option<PathBuf>,
    profiles_dir: PathBuf,
    sources_dir: PathBuf,
}

impl BuildConfig {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut config = Self {
            insurer: None,
            variant: default_variant(),
            source: None,
            manifest: None,
            profiles_dir: PathBuf::from("profiles"),
            sources_dir: PathBuf::from("proposals"),
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--insurer" => {
                    i += 1;
                    if i < args.len() {
                        config.insurer = Some(args[i].clone());
                    }
                },
                "--variant" => {
                    i += 1;
                    if i < args.len() {
                        config.variant = args[i].clone();
                    }
                },
                "--source" => {
                    i += 1;
                    if i < args.len() {
                        config.source = Some(PathBuf::from(&args[i]));
                    }
                },
                "--manifest" => {
                    i += 1;
                    if i < args.len() {
                        config.manifest = Some(PathBuf::from(&args[i]));
                    }
                },
                "--profiles" => {
                    i += 1;
                    if i < args.len() {
                        config.profiles_dir = PathBuf::from(&args[i]);
                    }
                },
                "--sources" => {
                    i += 1;
                    if i < args.len() {
                        config.sources_dir = PathBuf::from(&args[i]);
                    }
                },
                other => {
                    eprintln!("Unknown argument: {}", other);
                },
            }
            i += 1;
        }
        config
    }

    fn entries(&self) -> Result<Vec<ManifestEntry>, Error> {
        if let Some(manifest) = &self.manifest {
            let bytes = std::fs::read(manifest)?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
        let insurer = self.insurer.clone().ok_or_else(|| {
            Error::NotFound("--insurer or --manifest is required".to_string())
        })?;
        let path = match &self.source {
            Some(path) => path.clone(),
            None => discover_source(&self.sources_dir, &insurer)?,
        };
        Ok(vec![ManifestEntry {
            insurer,
            variant: self.variant.clone(),
            path,
        }])
    }
}

/// Find the one source dump for an insurer under the sources directory.
fn discover_source(dir: &std::path::Path, insurer: &str) -> Result<PathBuf, Error> {
    let direct = dir.join(format!("{}.json", insurer));
    if direct.exists() {
        return Ok(direct);
    }
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "json")
                && p.file_stem()
                    .is_some_and(|stem| stem.to_string_lossy().starts_with(insurer))
        })
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(format!("no source dump for {} in {}", insurer, dir.display())))
}

fn build_one(entry: &ManifestEntry, store: &ProfileStore, heuristics: &Heuristics) -> Result<(), Error> {
    let doc = JsonDocument::open(&entry.path)?;
    let builder = ProfileBuilder::new(heuristics);
    let (profile, outcome) = builder.build_and_save(&doc, &entry.insurer, &entry.variant, store)?;
    let sigs = &profile.summary_table;
    match outcome {
        SaveOutcome::Written => println!(
            "{}/{}: wrote profile ({} primary, {} variant signatures)",
            entry.insurer,
            entry.variant,
            sigs.primary_signatures.len(),
            sigs.variant_signatures.len()
        ),
        SaveOutcome::Unchanged => println!(
            "{}/{}: unchanged (fingerprint and mappings match)",
            entry.insurer, entry.variant
        ),
    }
    for note in &profile.known_anomalies {
        println!("  note: {}", note);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let config = BuildConfig::from_args();

    let entries = match config.entries() {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        },
    };
    let store = match ProfileStore::open(&config.profiles_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        },
    };

    let heuristics = Heuristics::default();
    let mut worst = 0u8;
    for entry in &entries {
        if let Err(e) = build_one(entry, &store, &heuristics) {
            eprintln!("{}/{}: {}", entry.insurer, entry.variant, e);
            worst = worst.max(e.exit_code() as u8);
        }
    }
    ExitCode::from(worst)
}
