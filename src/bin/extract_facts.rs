//! Extract coverage fact streams from profiled proposal documents.
//!
//! Usage:
//!   extract_facts --insurer samsung [--variant m_40] [--source dump.json]
//!   extract_facts --manifest manifest.json
//!
//! Common flags:
//!   --profiles DIR      profile store root (default: profiles)
//!   --sources DIR       source dump directory for auto-discovery (default: proposals)
//!   --out DIR           output directory for the JSONL streams (default: facts)
//!   --baseline N        prior fact count for the parity report
//!   --force-standard    keep standard extraction past the hybrid auto-trigger
//!
//! Exit codes: 0 success, 1 runtime error, 2 hard gate failure
//! (fingerprint mismatch, missing fingerprint, missing product identity) —
//! downstream automation treats code 2 as "re-profile first, do not retry".

use std::path::PathBuf;
use std::process::ExitCode;

use serde::Deserialize;

use proposal_oxide::document::JsonDocument;
use proposal_oxide::error::Error;
use proposal_oxide::extractor::{ExtractionOptions, Extractor};
use proposal_oxide::heuristics::Heuristics;
use proposal_oxide::profile::ProfileStore;

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

struct ExtractConfig {
    insurer: Option<String>,
    variant: String,
    source: Option<PathBuf>,
    manifest: Option<PathBuf>,
    profiles_dir: PathBuf,
    sources_dir: PathBuf,
    out_dir: PathBuf,
    baseline: Option<usize>,
    force_standard: bool,
}

impl ExtractConfig {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut config = Self {
            insurer: None,
            variant: default_variant(),
            source: None,
            manifest: None,
            profiles_dir: PathBuf::from("profiles"),
            sources_dir: PathBuf::from("proposals"),
            out_dir: PathBuf::from("facts"),
            baseline: None,
            force_standard: false,
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
                "--out" => {
                    i += 1;
                    if i < args.len() {
                        config.out_dir = PathBuf::from(&args[i]);
                    }
                },
                "--baseline" => {
                    i += 1;
                    if i < args.len() {
                        config.baseline = args[i].parse().ok();
                    }
                },
                "--force-standard" => {
                    config.force_standard = true;
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

fn extract_one(
    entry: &ManifestEntry,
    config: &ExtractConfig,
    store: &ProfileStore,
    heuristics: &Heuristics,
) -> Result<(), Error> {
    let doc = JsonDocument::open(&entry.path)?;
    let profile = store.load(&entry.insurer, &entry.variant)?;

    let options = ExtractionOptions {
        issuer_code: None,
        proposal_context: None,
        variant_hint: Some(entry.variant.clone()),
        force_standard: config.force_standard,
        baseline_count: config.baseline,
    };

    std::fs::create_dir_all(&config.out_dir)?;
    let stem = format!("{}__{}", entry.insurer, entry.variant);
    let main_path = config.out_dir.join(format!("{}.facts.jsonl", stem));
    let fragment_path = config.out_dir.join(format!("{}.fragments.jsonl", stem));

    let report = Extractor::new(heuristics).run_to_files(
        &doc,
        &profile,
        &options,
        &main_path,
        &fragment_path,
    )?;

    println!(
        "{}/{}: {} facts, {} fragments, parity {:?}{}",
        entry.insurer,
        entry.variant,
        report.extracted,
        report.fragments,
        report.status,
        match report.delta_ratio {
            Some(delta) => format!(" (delta {:+.1}%)", delta * 100.0),
            None => String::new(),
        }
    );
    for anomaly in &report.anomalies {
        println!(
            "  anomaly: page {} table {} row {:?}: {}",
            anomaly.page, anomaly.table_index, anomaly.row, anomaly.reason
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let config = ExtractConfig::from_args();

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
        if let Err(e) = extract_one(entry, &config, &store, &heuristics) {
            // A gate failure on one document must not block the rest of the
            // batch, but it decides the exit code.
            eprintln!("{}/{}: {}", entry.insurer, entry.variant, e);
            worst = worst.max(e.exit_code() as u8);
        }
    }
    ExitCode::from(worst)
}
