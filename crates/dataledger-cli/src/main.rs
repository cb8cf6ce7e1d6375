#![forbid(unsafe_code)]

mod config;

use clap::{Parser, Subcommand};
use config::Settings;
use dataledger_core::{ExitCode, ENV_LOG_JSON};
use dataledger_diff::DiffEngine;
use dataledger_model::VersionSelector;
use dataledger_object::BucketClient;
use dataledger_ops::{
    clean_staging, delete_dataset, finalize, finalize_all, find_pending, preflight_staging,
    prepare, prune, rollback, verify_access, BucketReport, OpsContext, PrepareOutcome,
    PrepareRequest, RollbackRequest,
};
use dataledger_store::LedgerStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode as ProcessExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "dataledger")]
#[command(about = "Versioned dataset ledger and two-phase publish CLI")]
struct Cli {
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe both buckets for existence and read/write/delete access.
    Verify,
    /// List every dataset tracked in the manifest.
    List,
    /// List placeholder entries awaiting finalization.
    Pending,
    /// Add a brand-new dataset (v1) to the manifest.
    Create {
        name: String,
        file: PathBuf,
        #[arg(long)]
        description: Option<String>,
    },
    /// Prepare a new version of an existing dataset.
    Update {
        name: String,
        file: PathBuf,
        #[arg(long)]
        description: Option<String>,
    },
    /// Pull a version from production and verify its integrity.
    Pull {
        name: String,
        #[arg(long, short, default_value = "latest")]
        version: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Re-publish an old version as a new one, without re-uploading.
    Rollback {
        name: String,
        version: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Retire versions beyond the newest `keep`; objects are only deleted
    /// with --apply.
    Prune {
        name: String,
        #[arg(long)]
        keep: usize,
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
    /// Remove a dataset and its whole history from the manifest.
    Delete {
        name: String,
        #[arg(long)]
        yes: bool,
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
    /// Finalize pending placeholders with a commit reference.
    Publish {
        #[arg(long)]
        commit: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete staging objects no placeholder references anymore.
    CleanStaging,
}

fn main() -> ProcessExitCode {
    match run() {
        Ok(()) => ProcessExitCode::from(ExitCode::Success as u8),
        Err(err) => {
            eprintln!("{err}");
            ProcessExitCode::from(ExitCode::Internal as u8)
        }
    }
}

fn run() -> Result<(), String> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    let store = LedgerStore::new(settings.manifest_path.clone());
    let staging = BucketClient::new(settings.endpoint_url.clone(), settings.staging_bucket.clone())
        .with_bearer_token(settings.auth_token.clone());
    let production =
        BucketClient::new(settings.endpoint_url.clone(), settings.production_bucket.clone())
            .with_bearer_token(settings.auth_token.clone());
    let diff = DiffEngine::new();
    let ctx = OpsContext {
        store: &store,
        staging: &staging,
        production: &production,
        diff: &diff,
        limits: settings.diff_limits,
    };

    match cli.command {
        Commands::Verify => cmd_verify(&ctx, cli.json),
        Commands::List => cmd_list(&store, cli.json),
        Commands::Pending => cmd_pending(&store, cli.json),
        Commands::Create {
            name,
            file,
            description,
        } => cmd_create(&ctx, &name, &file, description.as_deref()),
        Commands::Update {
            name,
            file,
            description,
        } => cmd_update(&ctx, &name, &file, description.as_deref()),
        Commands::Pull {
            name,
            version,
            output,
        } => cmd_pull(&ctx, &name, &version, output),
        Commands::Rollback {
            name,
            version,
            description,
        } => cmd_rollback(&ctx, &name, &version, description.as_deref()),
        Commands::Prune { name, keep, apply } => cmd_prune(&ctx, &name, keep, apply),
        Commands::Delete { name, yes, apply } => cmd_delete(&ctx, &name, yes, apply),
        Commands::Publish { commit, name } => cmd_publish(&ctx, &commit, name.as_deref()),
        Commands::CleanStaging => cmd_clean_staging(&ctx),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool(ENV_LOG_JSON, false) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn cmd_verify(ctx: &OpsContext<'_>, json: bool) -> Result<(), String> {
    let reports = verify_access(ctx.production, ctx.staging);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).map_err(|e| e.to_string())?
        );
    } else {
        for report in &reports {
            print_report(report);
        }
    }
    if reports.iter().all(|report| report.exists) {
        Ok(())
    } else {
        Err("verification failed: at least one bucket is unreachable".to_string())
    }
}

fn print_report(report: &BucketReport) {
    let mark = |granted: bool| if granted { "yes" } else { "no" };
    println!(
        "bucket {:<24} exists={:<3} read={:<3} write={:<3} delete={:<3} {}",
        report.bucket_name,
        mark(report.exists),
        mark(report.permissions.read),
        mark(report.permissions.write),
        mark(report.permissions.delete),
        report.message
    );
}

fn cmd_list(store: &LedgerStore, json: bool) -> Result<(), String> {
    let ledger = store.load().map_err(|e| e.to_string())?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ledger).map_err(|e| e.to_string())?
        );
        return Ok(());
    }
    if ledger.datasets.is_empty() {
        println!("no datasets tracked yet");
        return Ok(());
    }
    println!(
        "{:<32} {:<8} {:<10} {:<14} sha256",
        "dataset", "latest", "versions", "commit"
    );
    for dataset in &ledger.datasets {
        if let Some(latest) = dataset.latest() {
            println!(
                "{:<32} {:<8} {:<10} {:<14} {}…",
                dataset.file_name,
                latest.version.to_string(),
                dataset.history.len(),
                latest.commit_hash.as_deref().unwrap_or("(pending)"),
                &latest.sha256[..12.min(latest.sha256.len())]
            );
        }
    }
    Ok(())
}

fn cmd_pending(store: &LedgerStore, json: bool) -> Result<(), String> {
    let ledger = store.load().map_err(|e| e.to_string())?;
    let pending = find_pending(&ledger);
    if json {
        let rows: Vec<serde_json::Value> = pending
            .iter()
            .map(|p| {
                serde_json::json!({
                    "dataset": p.dataset,
                    "version": p.entry.version.to_string(),
                    "objectKey": p.entry.object_key,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).map_err(|e| e.to_string())?
        );
        return Ok(());
    }
    if pending.is_empty() {
        println!("no placeholder entries awaiting finalization");
        return Ok(());
    }
    for p in &pending {
        println!(
            "{} {} awaiting commit (object {})",
            p.dataset, p.entry.version, p.entry.object_key
        );
    }
    Ok(())
}

fn cmd_create(
    ctx: &OpsContext<'_>,
    name: &str,
    file: &Path,
    description: Option<&str>,
) -> Result<(), String> {
    if ctx
        .store
        .get_dataset(name)
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Err(format!("dataset '{name}' already exists; use 'update'"));
    }
    preflight_staging(ctx).map_err(|e| e.to_string())?;
    let description = description
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("Add dataset '{name}'"));
    let result = prepare(
        ctx,
        &PrepareRequest {
            name,
            file,
            description: &description,
        },
    )
    .map_err(|e| e.to_string())?;
    match result.outcome {
        PrepareOutcome::CreatedDataset(entry) => {
            println!(
                "created '{name}' {} (object {}); commit the manifest change to publish",
                entry.version, entry.object_key
            );
            Ok(())
        }
        other => Err(format!("unexpected create outcome: {other:?}")),
    }
}

fn cmd_update(
    ctx: &OpsContext<'_>,
    name: &str,
    file: &Path,
    description: Option<&str>,
) -> Result<(), String> {
    if ctx
        .store
        .get_dataset(name)
        .map_err(|e| e.to_string())?
        .is_none()
    {
        return Err(format!("dataset '{name}' not found; use 'create'"));
    }
    preflight_staging(ctx).map_err(|e| e.to_string())?;
    let description = description
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("Update dataset '{name}'"));
    let result = prepare(
        ctx,
        &PrepareRequest {
            name,
            file,
            description: &description,
        },
    )
    .map_err(|e| e.to_string())?;
    match result.outcome {
        PrepareOutcome::NewVersion(entry) => {
            println!(
                "prepared '{name}' {} (object {}); commit the manifest change to publish",
                entry.version, entry.object_key
            );
            if let Some(summary) = entry.diff_summary {
                println!("--- change summary ---\n{summary}");
            }
            Ok(())
        }
        PrepareOutcome::Unchanged(version) => {
            println!("no changes detected: '{name}' is already at {version} with identical content");
            Ok(())
        }
        other => Err(format!("unexpected update outcome: {other:?}")),
    }
}

fn cmd_pull(
    ctx: &OpsContext<'_>,
    name: &str,
    version: &str,
    output: Option<PathBuf>,
) -> Result<(), String> {
    let selector = VersionSelector::parse(version).map_err(|e| e.to_string())?;
    let entry = ctx
        .store
        .get_version_entry(name, &selector)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("could not find version '{version}' for dataset '{name}'"))?;

    let target = resolve_output_path(name, output);
    ctx.production
        .pull_and_verify(&entry.object_key, &entry.sha256, &target)
        .map_err(|e| e.to_string())?;
    println!(
        "pulled '{name}' {} to {} (integrity verified)",
        entry.version,
        target.display()
    );
    Ok(())
}

fn resolve_output_path(name: &str, output: Option<PathBuf>) -> PathBuf {
    match output {
        None => PathBuf::from(name),
        Some(path) if path.is_dir() => path.join(name),
        Some(path) => path,
    }
}

fn cmd_rollback(
    ctx: &OpsContext<'_>,
    name: &str,
    version: &str,
    description: Option<&str>,
) -> Result<(), String> {
    let target = dataledger_model::VersionLabel::parse(version).map_err(|e| e.to_string())?;
    let result = rollback(
        ctx,
        &RollbackRequest {
            name,
            target,
            description,
        },
    )
    .map_err(|e| e.to_string())?;
    println!(
        "rollback recorded: '{name}' {} aliases {} (object {}); commit the manifest change to publish",
        result.entry.version, target, result.entry.object_key
    );
    Ok(())
}

fn cmd_prune(ctx: &OpsContext<'_>, name: &str, keep: usize, apply: bool) -> Result<(), String> {
    let result = prune(ctx, name, keep).map_err(|e| e.to_string())?;
    if result.removed.is_empty() {
        println!("nothing to prune: '{name}' has at most {keep} versions");
        return Ok(());
    }
    let versions: Vec<String> = result
        .removed
        .iter()
        .map(|entry| entry.version.to_string())
        .collect();
    println!("retired {} from '{name}'", versions.join(", "));
    report_reclaim(ctx, &result.reclaim, apply)
}

fn cmd_delete(ctx: &OpsContext<'_>, name: &str, yes: bool, apply: bool) -> Result<(), String> {
    if !yes {
        return Err(format!(
            "refusing to delete dataset '{name}': this is irreversible once production objects are removed; pass --yes to confirm"
        ));
    }
    let result = delete_dataset(ctx, name).map_err(|e| e.to_string())?;
    println!(
        "deleted dataset '{name}' ({} versions removed from the manifest)",
        result.dataset.history.len()
    );
    report_reclaim(ctx, &result.reclaim, apply)
}

fn report_reclaim(ctx: &OpsContext<'_>, reclaim: &[String], apply: bool) -> Result<(), String> {
    if reclaim.is_empty() {
        return Ok(());
    }
    if apply {
        for key in reclaim {
            ctx.production.delete(key).map_err(|e| e.to_string())?;
            println!("deleted production object {key}");
        }
    } else {
        println!("production objects no longer referenced (deleted only with --apply):");
        for key in reclaim {
            println!("  {key}");
        }
    }
    Ok(())
}

fn cmd_publish(ctx: &OpsContext<'_>, commit: &str, name: Option<&str>) -> Result<(), String> {
    let results = match name {
        Some(name) => vec![(
            name.to_string(),
            finalize(ctx, name, commit).map_err(|e| e.to_string())?,
        )],
        None => finalize_all(ctx, commit).map_err(|e| e.to_string())?,
    };
    if results.is_empty() {
        println!("no placeholder entries awaiting finalization");
        return Ok(());
    }
    for (dataset, result) in results {
        match result.outcome {
            dataledger_ops::FinalizeOutcome::Finalized(entry) => {
                println!(
                    "published '{dataset}' {} under commit {}",
                    entry.version,
                    entry.commit_hash.as_deref().unwrap_or(commit)
                );
            }
            dataledger_ops::FinalizeOutcome::AlreadyFinalized(version) => {
                println!("'{dataset}' {version} was already finalized; nothing to do");
            }
        }
    }
    Ok(())
}

fn cmd_clean_staging(ctx: &OpsContext<'_>) -> Result<(), String> {
    let result = clean_staging(ctx).map_err(|e| e.to_string())?;
    println!(
        "staging cleanup: {} deleted, {} kept for pending placeholders",
        result.deleted.len(),
        result.kept.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_defaults_to_the_dataset_name() {
        assert_eq!(
            resolve_output_path("grid.sqlite", None),
            PathBuf::from("grid.sqlite")
        );
        assert_eq!(
            resolve_output_path("grid.sqlite", Some(PathBuf::from("elsewhere.db"))),
            PathBuf::from("elsewhere.db")
        );
    }

    #[test]
    fn env_bool_falls_back_to_the_default_when_unset() {
        assert!(!env_bool("DATALEDGER_TEST_UNSET_FLAG", false));
        assert!(env_bool("DATALEDGER_TEST_UNSET_FLAG", true));
    }
}
