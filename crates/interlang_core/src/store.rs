use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::page_index::{LangLink, Page, PageIndex, Revision};
use crate::redirects::RedirectMap;
use crate::runtime::ResolvedPaths;

const SNAPSHOT_DROP_SQL: &str = r#"
DROP TABLE IF EXISTS snapshot_pages;
DROP TABLE IF EXISTS snapshot_redirects;
DROP TABLE IF EXISTS snapshot_meta;
"#;

const SNAPSHOT_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshot_pages (
    title TEXT PRIMARY KEY,
    page_id INTEGER,
    namespace INTEGER NOT NULL,
    langlinks_json TEXT NOT NULL,
    revision_id INTEGER,
    revision_timestamp TEXT
);
CREATE INDEX IF NOT EXISTS idx_snapshot_pages_namespace ON snapshot_pages(namespace);

CREATE TABLE IF NOT EXISTS snapshot_redirects (
    source_title TEXT PRIMARY KEY,
    target_title TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshot_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotMeta {
    pub fetched_at_unix: u64,
    pub api_url: String,
    pub fingerprint: String,
    pub page_count: usize,
    pub redirect_count: usize,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub pages: PageIndex,
    pub redirects: RedirectMap,
    pub meta: SnapshotMeta,
}

/// Replace the stored snapshot with `pages` and `redirects` in one transaction.
pub fn save_snapshot(
    paths: &ResolvedPaths,
    pages: &PageIndex,
    redirects: &RedirectMap,
    api_url: &str,
) -> Result<SnapshotMeta> {
    let parent = paths
        .db_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", paths.db_path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let mut connection = open_connection(&paths.db_path)?;

    let meta = SnapshotMeta {
        fetched_at_unix: unix_timestamp()?,
        api_url: api_url.to_string(),
        fingerprint: snapshot_fingerprint(pages, redirects),
        page_count: pages.len(),
        redirect_count: redirects.len(),
    };

    let transaction = connection
        .transaction()
        .context("failed to start snapshot transaction")?;
    // Recreated on every save so older layouts never linger.
    transaction
        .execute_batch(SNAPSHOT_DROP_SQL)
        .context("failed to clear previous snapshot")?;
    transaction
        .execute_batch(SNAPSHOT_SCHEMA_SQL)
        .context("failed to initialize snapshot schema")?;

    {
        let mut page_statement = transaction
            .prepare(
                "INSERT INTO snapshot_pages
                 (title, page_id, namespace, langlinks_json, revision_id, revision_timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .context("failed to prepare snapshot page insert")?;
        for page in pages.iter() {
            let langlinks = serde_json::to_string(&page.langlinks)
                .with_context(|| format!("failed to serialize langlinks for {}", page.title))?;
            let revision = page.latest_revision();
            page_statement
                .execute(params![
                    page.title,
                    page.page_id,
                    page.namespace,
                    langlinks,
                    revision.and_then(|r| r.revid),
                    revision.and_then(|r| r.timestamp.as_deref()),
                ])
                .with_context(|| format!("failed to insert snapshot page {}", page.title))?;
        }

        let mut redirect_statement = transaction
            .prepare("INSERT INTO snapshot_redirects (source_title, target_title) VALUES (?1, ?2)")
            .context("failed to prepare snapshot redirect insert")?;
        for (source, target) in redirects.iter() {
            redirect_statement
                .execute(params![source, target])
                .with_context(|| format!("failed to insert snapshot redirect {source}"))?;
        }

        let mut meta_statement = transaction
            .prepare("INSERT INTO snapshot_meta (key, value) VALUES (?1, ?2)")
            .context("failed to prepare snapshot meta insert")?;
        for (key, value) in [
            ("fetched_at_unix", meta.fetched_at_unix.to_string()),
            ("api_url", meta.api_url.clone()),
            ("fingerprint", meta.fingerprint.clone()),
        ] {
            meta_statement
                .execute(params![key, value])
                .with_context(|| format!("failed to write snapshot meta {key}"))?;
        }
    }

    transaction
        .commit()
        .context("failed to commit snapshot transaction")?;

    info!(
        pages = meta.page_count,
        redirects = meta.redirect_count,
        db = %paths.db_path.display(),
        "saved snapshot"
    );
    Ok(meta)
}

/// Load the stored snapshot. Returns `None` when nothing has been fetched yet.
pub fn load_snapshot(paths: &ResolvedPaths) -> Result<Option<Snapshot>> {
    if !paths.db_path.exists() {
        return Ok(None);
    }
    let connection = open_connection(&paths.db_path)?;
    if !table_exists(&connection, "snapshot_meta")? {
        return Ok(None);
    }

    let stored = load_meta(&connection)?;
    let Some(fingerprint) = stored.get("fingerprint").cloned() else {
        return Ok(None);
    };
    let fetched_at_unix = stored
        .get("fetched_at_unix")
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(0);
    let api_url = stored.get("api_url").cloned().unwrap_or_default();

    let mut statement = connection
        .prepare(
            "SELECT title, page_id, namespace, langlinks_json, revision_id, revision_timestamp
             FROM snapshot_pages ORDER BY title",
        )
        .context("failed to prepare snapshot page query")?;
    let rows = statement
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })
        .context("failed to query snapshot pages")?;
    let mut pages = Vec::new();
    for row in rows {
        let (title, page_id, namespace, langlinks_json, revid, timestamp) =
            row.context("failed to decode snapshot page row")?;
        let langlinks: Vec<LangLink> = serde_json::from_str(&langlinks_json)
            .with_context(|| format!("failed to decode langlinks for {title}"))?;
        let mut page = Page::new(title);
        page.page_id = page_id;
        page.namespace = namespace;
        page.langlinks = langlinks;
        if revid.is_some() || timestamp.is_some() {
            page.revisions.push(Revision { revid, timestamp });
        }
        pages.push(page);
    }
    let pages = PageIndex::from_pages(pages);

    let mut statement = connection
        .prepare("SELECT source_title, target_title FROM snapshot_redirects")
        .context("failed to prepare snapshot redirect query")?;
    let rows = statement
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .context("failed to query snapshot redirects")?;
    let mut redirects = RedirectMap::new();
    for row in rows {
        let (source, target) = row.context("failed to decode snapshot redirect row")?;
        redirects.insert(&source, &target);
    }

    let actual = snapshot_fingerprint(&pages, &redirects);
    if actual != fingerprint {
        bail!(
            "snapshot fingerprint mismatch in {} (expected {fingerprint}, found {actual}); run `interlang fetch` again",
            paths.db_path.display()
        );
    }
    debug!(fingerprint = %actual, "verified snapshot fingerprint");

    let meta = SnapshotMeta {
        fetched_at_unix,
        api_url,
        fingerprint,
        page_count: pages.len(),
        redirect_count: redirects.len(),
    };
    Ok(Some(Snapshot {
        pages,
        redirects,
        meta,
    }))
}

/// SHA-256 over pages (title order, langlinks as declared) and redirects.
pub fn snapshot_fingerprint(pages: &PageIndex, redirects: &RedirectMap) -> String {
    let mut hasher = Sha256::new();
    for page in pages.iter() {
        hasher.update(b"P\t");
        hasher.update(page.title.as_bytes());
        hasher.update(format!("\t{}\t{}\n", page.namespace, page.page_id.unwrap_or(-1)).as_bytes());
        if let Some(revision) = page.latest_revision() {
            hasher.update(
                format!(
                    "V\t{}\t{}\n",
                    revision.revid.unwrap_or(-1),
                    revision.timestamp.as_deref().unwrap_or("")
                )
                .as_bytes(),
            );
        }
        for link in &page.langlinks {
            hasher.update(format!("L\t{}\t{}\n", link.tag, link.title).as_bytes());
        }
    }
    for (source, target) in redirects.iter() {
        hasher.update(format!("R\t{source}\t{target}\n").as_bytes());
    }
    let digest = hasher.finalize();
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn load_meta(connection: &Connection) -> Result<BTreeMap<String, String>> {
    let mut statement = connection
        .prepare("SELECT key, value FROM snapshot_meta")
        .context("failed to prepare snapshot meta query")?;
    let rows = statement
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .context("failed to query snapshot meta")?;
    let mut out = BTreeMap::new();
    for row in rows {
        let (key, value) = row.context("failed to decode snapshot meta row")?;
        out.insert(key, value);
    }
    Ok(out)
}

fn open_connection(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    connection
        .busy_timeout(Duration::from_secs(5))
        .context("failed to set sqlite busy timeout")?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL journal mode")?;
    Ok(connection)
}

fn table_exists(connection: &Connection, table_name: &str) -> Result<bool> {
    let found = connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table_name],
            |_| Ok(()),
        )
        .optional()
        .with_context(|| format!("failed to check for table {table_name}"))?;
    Ok(found.is_some())
}

fn unix_timestamp() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")
        .map(|duration| duration.as_secs())
}
