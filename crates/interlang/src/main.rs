use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use interlang_core::api::{
    LanglinkSource, MediaWikiClient, MediaWikiClientConfig, fetch_page_index, fetch_redirect_map,
};
use interlang_core::config::{InterlangConfig, load_config};
use interlang_core::graph::LanglinkGraph;
use interlang_core::lang::{LanguageOracle, LanguageTable};
use interlang_core::plan::{PlanOptions, RecordingApplier, apply_plan, plan_updates};
use interlang_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, ensure_layout_initialized,
    init_layout, resolve_paths,
};
use interlang_core::store::{SnapshotMeta, load_snapshot, save_snapshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "interlang",
    version,
    about = "Keep interlanguage links consistent across a MediaWiki's language families"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase log verbosity (-v, -vv, -vvv)")]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create the .interlang/ layout and config template")]
    Init(InitArgs),
    #[command(about = "Fetch langlinks and redirects from the wiki into the local snapshot")]
    Fetch,
    #[command(about = "Show snapshot and family statistics")]
    Status,
    #[command(about = "Show family grouping results")]
    Families(FamiliesArgs),
    #[command(about = "Print the resolved tag/title mapping of a page's family")]
    Resolve(ResolveArgs),
    #[command(about = "List pages whose interlanguage links need updating")]
    Plan(PlanArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
    #[arg(long, help = "Skip writing .interlang/config.toml")]
    no_config: bool,
}

#[derive(Debug, Args)]
struct FamiliesArgs {
    #[arg(long, value_name = "TITLE", help = "Show the family containing this page")]
    title: Option<String>,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    title: String,
}

#[derive(Debug, Args)]
struct PlanArgs {
    #[arg(long = "title", value_name = "TITLE", help = "Only plan these pages (repeatable)")]
    titles: Vec<String>,
    #[arg(long, help = "Emit the plan as JSON")]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Commands::Init(args) => run_init(&runtime, args),
        Commands::Fetch => run_fetch(&runtime),
        Commands::Status => run_status(&runtime),
        Commands::Families(args) => run_families(&runtime, args),
        Commands::Resolve(ResolveArgs { title }) => run_resolve(&runtime, &title),
        Commands::Plan(args) => run_plan(&runtime, args),
    }
}

/// `RUST_LOG` wins over the `-v` count when set.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(
        &paths,
        &InitOptions {
            materialize_config: !args.no_config,
            force: args.force,
        },
    )?;

    println!("Initialized interlang runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_fetch(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    ensure_layout_initialized(&paths)?;
    let config = load_config(&paths.config_path)?;
    let namespaces = config.namespaces();

    let mut client = MediaWikiClient::new(MediaWikiClientConfig::from_config(&config))?;
    info!(api_url = %client.api_url(), namespaces = ?namespaces, "fetching langlinks");
    let pages = fetch_page_index(&mut client, &namespaces)?;
    let redirects = fetch_redirect_map(&mut client, &namespaces)?;
    let api_url = client.api_url().to_string();
    let meta = save_snapshot(&paths, &pages, &redirects, &api_url)?;

    println!("fetch");
    println!("api_url: {api_url}");
    println!(
        "namespaces: {}",
        namespaces
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    );
    println!("requests: {}", client.request_count());
    println!("pages: {}", meta.page_count);
    println!("langlinks: {}", pages.langlink_count());
    println!("redirects: {}", meta.redirect_count);
    println!("fingerprint: {}", meta.fingerprint);
    println!("db_path: {}", normalize_path(&paths.db_path));
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;

    println!("interlang status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir_exists: {}", format_flag(paths.state_dir.exists()));
    println!("config_exists: {}", format_flag(paths.config_path.exists()));
    println!("api_url: {}", format_optional(config.api_url()));
    println!("wiki_url: {}", format_optional(config.wiki_url()));
    match load_snapshot(&paths)? {
        Some(snapshot) => {
            println!("snapshot: present");
            print_snapshot_meta(&snapshot.meta);
            println!("snapshot.langlinks: {}", snapshot.pages.langlink_count());
            let graph =
                LanglinkGraph::build(config.language_table(), snapshot.pages, snapshot.redirects)?;
            println!("families: {}", graph.families().len());
            println!(
                "families.case_sensitive_splits: {}",
                graph.families().case_sensitive_splits()
            );
            println!(
                "families.skipped_unsupported: {}",
                graph.families().skipped_unsupported()
            );
        }
        None => println!("snapshot: <none> (run `interlang fetch`)"),
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_families(runtime: &RuntimeOptions, args: FamiliesArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let (graph, _) = load_graph(&paths)?;
    let families = graph.families();

    println!("families");
    match args.title.as_deref().map(str::trim) {
        Some(title) => {
            let Some(family) = families.family_of(title) else {
                bail!("page is not part of any interlanguage family: {title}");
            };
            println!("family.key: {}", family.key);
            println!("family.members: {}", family.members.len());
            for member in &family.members {
                let tag = graph.oracle().tag_for_title(member).unwrap_or("?");
                println!("family.member: {tag} {member}");
            }
        }
        None => {
            println!("families.count: {}", families.len());
            println!(
                "families.multilingual: {}",
                families
                    .iter()
                    .filter(|family| family.members.len() > 1)
                    .count()
            );
            println!(
                "families.case_sensitive_splits: {}",
                families.case_sensitive_splits()
            );
            println!(
                "families.skipped_unsupported: {}",
                families.skipped_unsupported()
            );
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_resolve(runtime: &RuntimeOptions, title: &str) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let (graph, _) = load_graph(&paths)?;
    let title = title.trim();
    if title.is_empty() {
        bail!("resolve requires a non-empty title");
    }

    let resolved = graph
        .resolve(title)
        .with_context(|| format!("failed to resolve {title}"))?;
    let langlinks = graph
        .langlinks_for(title)
        .with_context(|| format!("failed to compute langlinks for {title}"))?;

    println!("resolve");
    println!("master: {title}");
    println!("family.size: {}", resolved.len());
    for (tag, base) in resolved.pairs() {
        println!("{tag}: {base}");
    }
    println!("langlinks.count: {}", langlinks.len());
    for link in &langlinks {
        println!("langlink: {}", link.to_wikitext());
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_plan(runtime: &RuntimeOptions, args: PlanArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let (graph, config) = load_graph(&paths)?;
    let titles = args
        .titles
        .iter()
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .collect();
    let report = plan_updates(&graph, &PlanOptions { titles });

    if args.json {
        let mut recorder = RecordingApplier::default();
        let outcome = apply_plan(&report, &mut recorder, config.edit_summary());
        let payload = serde_json::json!({
            "edit_summary": config.edit_summary(),
            "checked": report.checked,
            "up_to_date": report.up_to_date,
            "skipped_unsupported": report.skipped_unsupported,
            "updates": recorder.applied,
            "applied": outcome.applied,
            "failures": report.failures,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to serialize plan JSON")?
        );
    } else {
        println!("plan");
        println!("edit_summary: {}", config.edit_summary());
        println!("checked: {}", report.checked);
        println!("up_to_date: {}", report.up_to_date);
        println!("skipped_unsupported: {}", report.skipped_unsupported);
        println!("updates: {}", report.updates.len());
        for update in &report.updates {
            println!("\nupdate: {}", update.title);
            print!("{}", update.render_diff());
        }
        if !report.failures.is_empty() {
            println!("failures: {}", report.failures.len());
            for failure in &report.failures {
                println!("  - {}: {}", failure.title, failure.message);
            }
        }
        print_diagnostics(runtime, &paths);
    }

    if !report.success() {
        bail!(
            "{} resolution(s) failed; see the plan output",
            report.failures.len()
        );
    }
    Ok(())
}

fn load_graph(paths: &ResolvedPaths) -> Result<(LanglinkGraph<LanguageTable>, InterlangConfig)> {
    let config = load_config(&paths.config_path)?;
    let snapshot = load_snapshot(paths)?
        .ok_or_else(|| anyhow::anyhow!("no snapshot found; run `interlang fetch` first"))?;
    info!(
        pages = snapshot.meta.page_count,
        fetched_at_unix = snapshot.meta.fetched_at_unix,
        "loaded snapshot"
    );
    let graph = LanglinkGraph::build(config.language_table(), snapshot.pages, snapshot.redirects)
        .context("failed to group pages into families")?;
    Ok((graph, config))
}

fn print_snapshot_meta(meta: &SnapshotMeta) {
    println!("snapshot.fetched_at_unix: {}", meta.fetched_at_unix);
    println!(
        "snapshot.api_url: {}",
        if meta.api_url.is_empty() {
            "<unknown>"
        } else {
            meta.api_url.as_str()
        }
    );
    println!("snapshot.pages: {}", meta.page_count);
    println!("snapshot.redirects: {}", meta.redirect_count);
    println!("snapshot.fingerprint: {}", meta.fingerprint);
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn format_optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "<unset>".to_string())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands, format_optional};

    #[test]
    fn parses_repeated_plan_titles_and_verbosity() {
        let cli = Cli::try_parse_from([
            "interlang", "-vv", "plan", "--title", "Bash", "--title", "Zsh (Česky)", "--json",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Plan(args) => {
                assert_eq!(args.titles, vec!["Bash", "Zsh (Česky)"]);
                assert!(args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "interlang",
            "resolve",
            "Bash (Česky)",
            "--project-root",
            "/tmp/wiki",
            "--diagnostics",
        ])
        .expect("parse");
        assert!(cli.diagnostics);
        assert_eq!(
            cli.project_root.as_deref(),
            Some(std::path::Path::new("/tmp/wiki"))
        );
        assert!(matches!(cli.command, Commands::Resolve(ref args) if args.title == "Bash (Česky)"));
    }

    #[test]
    fn missing_urls_print_as_unset() {
        assert_eq!(format_optional(None), "<unset>");
        assert_eq!(
            format_optional(Some("https://wiki.archlinux.org".to_string())),
            "https://wiki.archlinux.org"
        );
    }
}
