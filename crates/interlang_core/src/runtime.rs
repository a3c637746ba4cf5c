use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub const STATE_DIR_NAME: &str = ".interlang";
pub const SNAPSHOT_DB_FILENAME: &str = "snapshot.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
    pub executable_dir: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        let executable_dir = env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(Path::to_path_buf));
        Ok(Self {
            cwd,
            executable_dir,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub data_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\ndata_dir={} ({})\ndb_path={}\nconfig_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.data_dir),
            self.data_source.as_str(),
            normalize_for_display(&self.db_path),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

/// Fails with a hint to run `interlang init` when the state directory is absent.
pub fn ensure_layout_initialized(paths: &ResolvedPaths) -> Result<()> {
    if !paths.state_dir.exists() {
        bail!(
            "{} is missing under {}\nRun: interlang init --project-root {}",
            STATE_DIR_NAME,
            normalize_for_display(&paths.project_root),
            normalize_for_display(&paths.project_root)
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub materialize_config: bool,
    pub force: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            materialize_config: true,
            force: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env);
    let state_dir = project_root.join(STATE_DIR_NAME);

    let (data_dir, data_source) = if let Some(path) = overrides.data_dir.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env("INTERLANG_DATA_DIR")) {
        (
            absolutize(Path::new(&value), &project_root),
            ValueSource::Env,
        )
    } else {
        (state_dir.join("data"), ValueSource::Default)
    };

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env("INTERLANG_CONFIG")) {
        (
            absolutize(Path::new(&value), &project_root),
            ValueSource::Env,
        )
    } else {
        (state_dir.join("config.toml"), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        db_path: data_dir.join(SNAPSHOT_DB_FILENAME),
        project_root,
        state_dir,
        data_dir,
        config_path,
        root_source,
        data_source,
        config_source,
    })
}

pub fn init_layout(paths: &ResolvedPaths, options: &InitOptions) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    for dir in [&paths.state_dir, &paths.data_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.clone());
        }
    }

    let wrote_config = if options.materialize_config {
        write_text_file(&paths.config_path, &render_config_template(), options.force)?
    } else {
        false
    };

    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

pub fn render_config_template() -> String {
    "# interlang configuration (materialized by `interlang init`)\n\
     # WIKI_* environment variables override the [wiki] values.\n\n\
     [wiki]\n\
     # url = \"https://wiki.archlinux.org\"\n\
     # api_url = \"https://wiki.archlinux.org/api.php\"\n\
     # user_agent = \"interlang/0.1\"\n\n\
     [interlanguage]\n\
     namespaces = [0, 4, 10, 12, 14]\n\
     edit_summary = \"update interlanguage links\"\n\
     # Override the built-in tag classification:\n\
     # internal_tags = [\"ar\", \"bg\", \"cs\", \"en\"]\n\
     # external_tags = [\"de\", \"fr\", \"ja\"]\n"
        .to_string()
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }

    if let Some(value) = non_empty(lookup_env("INTERLANG_PROJECT_ROOT")) {
        return (absolutize(Path::new(&value), &context.cwd), ValueSource::Env);
    }

    match detect_project_root_heuristic(&context.cwd, context.executable_dir.as_deref()) {
        Some(root) => (root, ValueSource::Heuristic),
        None => (context.cwd.clone(), ValueSource::Default),
    }
}

fn detect_project_root_heuristic(cwd: &Path, executable_dir: Option<&Path>) -> Option<PathBuf> {
    let mut seen = HashSet::new();
    let mut candidates = ancestors(cwd);
    if let Some(exe_dir) = executable_dir {
        candidates.extend(ancestors(exe_dir));
    }
    candidates.into_iter().find(|candidate| {
        seen.insert(normalize_for_display(candidate)) && candidate.join(STATE_DIR_NAME).is_dir()
    })
}

fn ancestors(path: &Path) -> Vec<PathBuf> {
    path.ancestors().map(Path::to_path_buf).collect()
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use super::{
        InitOptions, PathOverrides, ResolutionContext, ValueSource, ensure_layout_initialized,
        init_layout, render_config_template, resolve_paths_with_lookup,
    };
    use crate::config::{InterlangConfig, load_config};

    fn context(cwd: &std::path::Path) -> ResolutionContext {
        ResolutionContext {
            cwd: cwd.to_path_buf(),
            executable_dir: None,
        }
    }

    #[test]
    fn resolve_paths_prefers_flag_over_env() {
        let temp = tempdir().expect("tempdir");
        let cwd = temp.path().join("cwd");
        let from_flag = temp.path().join("flag-root");
        fs::create_dir_all(&cwd).expect("create cwd");

        let overrides = PathOverrides {
            project_root: Some(from_flag.clone()),
            ..PathOverrides::default()
        };
        let env = HashMap::from([(
            "INTERLANG_PROJECT_ROOT".to_string(),
            temp.path().join("env-root").to_string_lossy().to_string(),
        )]);

        let resolved =
            resolve_paths_with_lookup(&context(&cwd), &overrides, |key| env.get(key).cloned())
                .expect("resolve paths");
        assert_eq!(resolved.project_root, from_flag);
        assert_eq!(resolved.root_source, ValueSource::Flag);
        assert_eq!(resolved.state_dir, from_flag.join(".interlang"));
        assert_eq!(
            resolved.db_path,
            from_flag.join(".interlang").join("data").join("snapshot.db")
        );
        assert_eq!(resolved.data_source, ValueSource::Default);
    }

    #[test]
    fn resolve_paths_reads_env_overrides() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("env-root");
        let env = HashMap::from([
            (
                "INTERLANG_PROJECT_ROOT".to_string(),
                root.to_string_lossy().to_string(),
            ),
            ("INTERLANG_DATA_DIR".to_string(), "cache".to_string()),
            ("INTERLANG_CONFIG".to_string(), "  ".to_string()),
        ]);

        let resolved = resolve_paths_with_lookup(
            &context(temp.path()),
            &PathOverrides::default(),
            |key| env.get(key).cloned(),
        )
        .expect("resolve paths");
        assert_eq!(resolved.root_source, ValueSource::Env);
        assert_eq!(resolved.data_dir, root.join("cache"));
        assert_eq!(resolved.data_source, ValueSource::Env);
        assert_eq!(resolved.config_source, ValueSource::Default);
        assert_eq!(resolved.config_path, root.join(".interlang").join("config.toml"));
    }

    #[test]
    fn heuristic_finds_ancestor_with_state_dir() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("project");
        let nested = root.join("a").join("b");
        fs::create_dir_all(root.join(".interlang")).expect("state dir");
        fs::create_dir_all(&nested).expect("nested");

        let resolved =
            resolve_paths_with_lookup(&context(&nested), &PathOverrides::default(), |_| None)
                .expect("resolve");
        assert_eq!(resolved.project_root, root);
        assert_eq!(resolved.root_source, ValueSource::Heuristic);
    }

    #[test]
    fn init_layout_creates_dirs_and_keeps_existing_config() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("project");
        fs::create_dir_all(&root).expect("create root");
        let overrides = PathOverrides {
            project_root: Some(root.clone()),
            ..PathOverrides::default()
        };
        let paths = resolve_paths_with_lookup(&context(&root), &overrides, |_| None)
            .expect("resolve");
        assert!(ensure_layout_initialized(&paths).is_err());

        let report = init_layout(&paths, &InitOptions::default()).expect("init");
        assert_eq!(report.created_dirs.len(), 2);
        assert!(report.wrote_config);
        assert!(paths.data_dir.exists());
        ensure_layout_initialized(&paths).expect("initialized");

        fs::write(&paths.config_path, "[wiki]\nurl = \"https://example.org\"\n")
            .expect("edit config");
        let again = init_layout(&paths, &InitOptions::default()).expect("init again");
        assert!(again.created_dirs.is_empty());
        assert!(!again.wrote_config);

        let forced = init_layout(
            &paths,
            &InitOptions {
                force: true,
                ..InitOptions::default()
            },
        )
        .expect("force init");
        assert!(forced.wrote_config);
    }

    #[test]
    fn config_template_parses_to_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, render_config_template()).expect("write template");
        let config = load_config(&path).expect("load template");
        assert_eq!(config.namespaces(), InterlangConfig::default().namespaces());
        assert!(config.interlanguage.internal_tags.is_none());
    }
}
