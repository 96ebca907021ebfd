use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::json;

use repotrack_catalog::{Catalog, ResourceKind};
use repotrack_digest::combine;
use repotrack_remote::{scan_layout, StrategyRegistry};
use repotrack_store::{InMemoryDirectory, MemoryStore};
use repotrack_tracker::TrackerConfig;
use repotrack_types::{Repository, RepositoryKind};

use crate::cli::*;
use crate::config::AppConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::List(args) => cmd_list(&open_catalog(&config)?.1, args, format),
        Command::Show(args) => cmd_show(&open_catalog(&config)?.1, args, format),
        Command::Status(args) => {
            cmd_status(&open_catalog(&config)?.1, &config.tracker, args, format)
        }
        Command::Check(args) => cmd_check(&open_catalog(&config)?.1, args, format),
        Command::Digest(args) => cmd_digest(&args.path, format),
        Command::Compact(_) => cmd_compact(&open_catalog(&config)?.0),
    }
}

/// Open the journal named in the configuration and wrap it in a read-side
/// catalog. No strategies are registered: the binary never fetches.
fn open_catalog(config: &AppConfig) -> anyhow::Result<(Arc<MemoryStore>, Catalog)> {
    let store = Arc::new(
        MemoryStore::open(&config.store)
            .with_context(|| format!("opening journal {}", config.store.path.display()))?,
    );
    let catalog = Catalog::new(
        store.clone(),
        Arc::new(InMemoryDirectory::new()),
        Arc::new(StrategyRegistry::new()),
    );
    Ok((store, catalog))
}

fn cmd_list(catalog: &Catalog, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let kind = args
        .kind
        .as_deref()
        .map(str::parse::<RepositoryKind>)
        .transpose()?;

    if format == OutputFormat::Json {
        let body = match kind {
            Some(kind) => catalog.get_by_kind_json(kind, false)?,
            None => catalog.get_all_json(false)?,
        };
        println!("{}", String::from_utf8(body)?);
        return Ok(());
    }

    let repositories = match kind {
        Some(kind) => catalog.get_by_kind(kind, false)?,
        None => catalog.get_all(false)?,
    };
    if repositories.is_empty() {
        println!("No repositories.");
        return Ok(());
    }
    for repository in &repositories {
        let mut flags = Vec::new();
        if repository.verified_publisher {
            flags.push("verified".green().to_string());
        }
        if repository.official {
            flags.push("official".cyan().to_string());
        }
        if repository.disabled {
            flags.push("disabled".dimmed().to_string());
        }
        println!(
            "{:<32} {:<12} {} {}",
            repository.name.bold(),
            repository.kind.to_string().yellow(),
            repository.url,
            flags.join(" ")
        );
    }
    Ok(())
}

fn cmd_show(catalog: &Catalog, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let repository = catalog.get_by_name(&args.name, args.credentials)?;
    let audit = catalog.audit_log(&repository.id)?;

    if format == OutputFormat::Json {
        let body = json!({ "repository": repository, "ownershipHistory": audit });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("{} {}", repository.name.bold(), repository.id.to_string().dimmed());
    if let Some(display_name) = &repository.display_name {
        println!("  Display name: {display_name}");
    }
    println!("  Kind: {}", repository.kind.to_string().yellow());
    println!("  URL: {}", repository.url.blue());
    if let Some(branch) = &repository.branch {
        println!("  Branch: {branch}");
    }
    println!("  Owner: {}", repository.owner);
    println!(
        "  Verified publisher: {}  Official: {}  Disabled: {}",
        yes_no(repository.verified_publisher),
        yes_no(repository.official),
        yes_no(repository.disabled)
    );
    if let Some(credentials) = &repository.credentials {
        println!("  Credentials: {} / {}", credentials.username, credentials.password);
    }
    println!("  Digest: {}", repository.digest.as_deref().unwrap_or("-"));
    println!("  Tracking: {}", Health::of(&repository).describe());
    if let Some(errors) = repository.last_tracking_errors.as_deref().filter(|e| !e.is_empty()) {
        for line in errors.lines() {
            println!("    {}", line.red());
        }
    }
    println!("  Created: {}", repository.created_at.to_rfc3339());

    if !audit.is_empty() {
        println!("\nOwnership history:");
        for entry in &audit {
            println!(
                "  {}  {} -> {}  by {}{}",
                entry.at.to_rfc3339().dimmed(),
                entry.previous_owner,
                entry.new_owner,
                entry.performed_by,
                if entry.ownership_claim { " (claim)" } else { "" }
            );
        }
    }
    Ok(())
}

fn cmd_status(
    catalog: &Catalog,
    tracker: &TrackerConfig,
    args: StatusArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let repositories: Vec<Repository> = catalog
        .get_all(false)?
        .into_iter()
        .filter(|r| !args.errors || Health::of(r) == Health::Failing)
        .collect();

    if format == OutputFormat::Json {
        let rows: Vec<_> = repositories
            .iter()
            .map(|r| {
                json!({
                    "name": r.name,
                    "kind": r.kind,
                    "tracked": tracker.selects(r),
                    "health": Health::of(r).label(),
                    "lastTrackingTs": r.last_tracking_ts,
                    "lastTrackingErrors": r.last_tracking_errors,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "Tracker: {} workers, {}s per repository, digest pre-check {}",
        tracker.workers.to_string().bold(),
        tracker.repository_timeout_secs,
        if tracker.bypass_digest_check { "off".yellow() } else { "on".green() }
    );
    let failing = repositories
        .iter()
        .filter(|r| Health::of(r) == Health::Failing)
        .count();
    println!(
        "{} repositories, {} failing\n",
        repositories.len().to_string().bold(),
        if failing == 0 { "0".green() } else { failing.to_string().red() }
    );

    for repository in &repositories {
        let health = Health::of(repository);
        let marker = match health {
            Health::Healthy => "✓".green(),
            Health::Failing => "✗".red(),
            Health::Never => "·".dimmed(),
        };
        let skipped = if tracker.selects(repository) { "" } else { " (not tracked)" };
        println!(
            "{} {:<32} {}{}",
            marker,
            repository.name,
            health.describe_at(repository.last_tracking_ts),
            skipped.dimmed()
        );
    }
    Ok(())
}

fn cmd_check(catalog: &Catalog, args: CheckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let resource: ResourceKind = args.resource.parse()?;
    // Users and organizations live outside the journal.
    if matches!(resource, ResourceKind::OrganizationName | ResourceKind::UserAlias) {
        anyhow::bail!(
            "{resource} availability needs the user directory; the journal only holds repositories"
        );
    }
    let available = catalog.check_availability(resource, &args.value)?;
    if format == OutputFormat::Json {
        println!("{}", json!({ "resourceKind": resource, "value": args.value, "available": available }));
    } else if available {
        println!("{} {} {} is available", "✓".green().bold(), resource, args.value.bold());
    } else {
        println!("{} {} {} is taken", "✗".red().bold(), resource, args.value.bold());
    }
    Ok(())
}

fn cmd_digest(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let packages = scan_layout(path)?;
    let combined = combine(packages.iter().map(|p| p.digest.as_str()));

    if format == OutputFormat::Json {
        let rows: Vec<_> = packages
            .iter()
            .map(|p| json!({ "name": p.key.name, "version": p.key.version, "digest": p.digest }))
            .collect();
        let body = json!({ "digest": combined, "packages": rows });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    for package in &packages {
        println!("{}  {}", package.digest.dimmed(), package.key);
    }
    println!("{} packages, repository digest {}", packages.len(), combined.yellow());
    Ok(())
}

fn cmd_compact(store: &MemoryStore) -> anyhow::Result<()> {
    let before = store.journal_len()?.unwrap_or_default();
    store.compact()?;
    let after = store.journal_len()?.unwrap_or_default();
    println!(
        "{} Journal compacted: {} -> {} bytes ({} repositories)",
        "✓".green().bold(),
        before,
        after,
        store.len()?
    );
    Ok(())
}

fn yes_no(flag: bool) -> colored::ColoredString {
    if flag { "yes".green() } else { "no".dimmed() }
}

/// Tracking health as shown to operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Health {
    Never,
    Healthy,
    Failing,
}

impl Health {
    fn of(repository: &Repository) -> Self {
        if repository.last_tracking_ts.is_none() {
            Self::Never
        } else if repository.is_healthy() {
            Self::Healthy
        } else {
            Self::Failing
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Never => "never-tracked",
            Self::Healthy => "healthy",
            Self::Failing => "failing",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Never => "never tracked",
            Self::Healthy => "healthy",
            Self::Failing => "last cycle reported errors",
        }
    }

    fn describe_at(self, at: Option<DateTime<Utc>>) -> String {
        match at {
            Some(at) => format!("{} ({})", self.describe(), at.format("%Y-%m-%d %H:%M:%S")),
            None => self.describe().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repotrack_store::{JournalConfig, RepositoryStore};
    use repotrack_types::{Owner, RepositoryDraft, RepositoryEdit, TrackingCommit, UserId};

    fn repo(name: &str) -> Repository {
        Repository::from_draft(
            RepositoryDraft::new(name, format!("https://{name}.example.org"), RepositoryKind::Helm),
            Owner::User(UserId::new()),
        )
    }

    fn config_in(dir: &Path) -> AppConfig {
        AppConfig {
            store: JournalConfig {
                path: dir.join("catalog.journal"),
                ..JournalConfig::default()
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn health_follows_last_cycle() {
        let mut r = repo("acme");
        assert_eq!(Health::of(&r), Health::Never);

        r.last_tracking_ts = Some(Utc::now());
        r.last_tracking_errors = Some(String::new());
        assert_eq!(Health::of(&r), Health::Healthy);

        r.last_tracking_errors = Some("chart-a@1.0: invalid chart".into());
        assert_eq!(Health::of(&r), Health::Failing);
        assert!(Health::Failing.describe_at(r.last_tracking_ts).starts_with("last cycle"));
    }

    #[test]
    fn catalog_reopens_from_configured_journal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        {
            let (store, _) = open_catalog(&config).unwrap();
            let r = repo("acme");
            let id = r.id;
            store.insert(r).unwrap();
            store
                .commit_tracking(&id, TrackingCommit::result_only("", Utc::now()))
                .unwrap();
        }

        let (_, catalog) = open_catalog(&config).unwrap();
        let repository = catalog.get_by_name("acme", false).unwrap();
        assert_eq!(Health::of(&repository), Health::Healthy);
        assert!(!catalog
            .check_availability(ResourceKind::RepositoryName, "acme")
            .unwrap());
    }

    #[test]
    fn compact_shrinks_journal_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let (store, _) = open_catalog(&config).unwrap();
        let r = repo("acme");
        store.insert(r.clone()).unwrap();
        for i in 0..20 {
            let mut edit = RepositoryEdit::from_record(&r);
            edit.display_name = Some(format!("Acme {i}"));
            store.update_metadata(&r.id, r.owner, edit).unwrap();
        }
        let before = store.journal_len().unwrap().unwrap();

        cmd_compact(&store).unwrap();
        assert!(store.journal_len().unwrap().unwrap() < before);
        drop(store);

        let (_, catalog) = open_catalog(&config).unwrap();
        let repository = catalog.get_by_name("acme", false).unwrap();
        assert_eq!(repository.display_name.as_deref(), Some("Acme 19"));
    }

    #[test]
    fn digest_command_reads_layout() {
        let dir = tempfile::tempdir().unwrap();
        let version = dir.path().join("redis").join("1.0.0");
        std::fs::create_dir_all(&version).unwrap();
        std::fs::write(version.join("rules.yaml"), "a: 1").unwrap();

        cmd_digest(dir.path(), OutputFormat::Json).unwrap();
        assert!(cmd_digest(&dir.path().join("missing"), OutputFormat::Text).is_err());
    }

    #[test]
    fn unknown_resource_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, catalog) = open_catalog(&config_in(dir.path())).unwrap();
        let args = CheckArgs {
            resource: "packageName".into(),
            value: "x".into(),
        };
        assert!(cmd_check(&catalog, args, OutputFormat::Text).is_err());
    }

    #[test]
    fn directory_resource_kinds_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, catalog) = open_catalog(&config_in(dir.path())).unwrap();
        for resource in ["organizationName", "userAlias"] {
            let args = CheckArgs {
                resource: resource.into(),
                value: "acme".into(),
            };
            let err = cmd_check(&catalog, args, OutputFormat::Json).unwrap_err();
            assert!(err.to_string().contains("user directory"), "{err}");
        }

        let args = CheckArgs {
            resource: "repositoryName".into(),
            value: "acme".into(),
        };
        cmd_check(&catalog, args, OutputFormat::Json).unwrap();
    }
}
