use anyhow::Result;
use serde::Serialize;
use similar::TextDiff;
use tracing::{debug, info, warn};

use crate::graph::LanglinkGraph;
use crate::lang::LanguageOracle;
use crate::langlinks::needs_update;
use crate::page_index::{LangLink, Page};

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Restrict planning to these titles; empty means every page.
    pub titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpdate {
    pub title: String,
    pub page_id: Option<i64>,
    pub base_timestamp: Option<String>,
    pub current: Vec<LangLink>,
    pub proposed: Vec<LangLink>,
}

impl PlannedUpdate {
    /// Unified diff of the link block, one `[[tag:title]]` per line.
    pub fn render_diff(&self) -> String {
        let mut current = self.current.clone();
        current.sort();
        current.dedup();
        let old = render_link_block(&current);
        let new = render_link_block(&self.proposed);
        TextDiff::from_lines(&old, &new)
            .unified_diff()
            .context_radius(3)
            .header(&format!("{} (current)", self.title), &format!("{} (proposed)", self.title))
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanFailure {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanReport {
    pub checked: usize,
    pub up_to_date: usize,
    pub skipped_unsupported: usize,
    pub updates: Vec<PlannedUpdate>,
    pub failures: Vec<PlanFailure>,
}

impl PlanReport {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Work out which pages need their link block replaced.
///
/// A failed resolution is recorded and the remaining pages are still planned.
pub fn plan_updates<O: LanguageOracle>(
    graph: &LanglinkGraph<O>,
    options: &PlanOptions,
) -> PlanReport {
    let mut report = PlanReport::default();

    let selected: Vec<&Page> = if options.titles.is_empty() {
        graph.pages().iter().collect()
    } else {
        let mut selected = Vec::with_capacity(options.titles.len());
        for title in &options.titles {
            match graph.pages().get(title) {
                Some(page) => selected.push(page),
                None => report.failures.push(PlanFailure {
                    title: title.clone(),
                    message: "page is not in the snapshot".to_string(),
                }),
            }
        }
        selected
    };

    for page in selected {
        if !graph.oracle().supports_title(&page.title) {
            info!(title = %page.title, "skipping page (unsupported language)");
            report.skipped_unsupported += 1;
            continue;
        }
        report.checked += 1;

        let proposed = match graph.langlinks_for(&page.title) {
            Ok(links) => links,
            Err(error) => {
                warn!(title = %page.title, error = %error, "resolution failed");
                report.failures.push(PlanFailure {
                    title: page.title.clone(),
                    message: error.to_string(),
                });
                continue;
            }
        };

        if !needs_update(page, &proposed) {
            debug!(title = %page.title, "page is up to date");
            report.up_to_date += 1;
            continue;
        }

        report.updates.push(PlannedUpdate {
            title: page.title.clone(),
            page_id: page.page_id,
            base_timestamp: page
                .latest_revision()
                .and_then(|revision| revision.timestamp.clone()),
            current: page.langlinks.clone(),
            proposed,
        });
    }

    info!(
        checked = report.checked,
        updates = report.updates.len(),
        up_to_date = report.up_to_date,
        failures = report.failures.len(),
        "planned interlanguage updates"
    );
    report
}

/// Receives pages whose link block must be replaced. Rewriting the page text
/// and submitting the edit is the implementor's job.
pub trait EditApplier {
    fn apply(&mut self, update: &PlannedUpdate, summary: &str) -> Result<()>;
}

/// Collects updates instead of editing anything.
#[derive(Debug, Default)]
pub struct RecordingApplier {
    pub applied: Vec<PlannedUpdate>,
}

impl EditApplier for RecordingApplier {
    fn apply(&mut self, update: &PlannedUpdate, _summary: &str) -> Result<()> {
        self.applied.push(update.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub applied: usize,
    pub failures: Vec<PlanFailure>,
}

pub fn apply_plan<A: EditApplier>(report: &PlanReport, applier: &mut A, summary: &str) -> ApplyReport {
    let mut outcome = ApplyReport::default();
    for update in &report.updates {
        match applier.apply(update, summary) {
            Ok(()) => outcome.applied += 1,
            Err(error) => {
                warn!(title = %update.title, error = %error, "edit applier failed");
                outcome.failures.push(PlanFailure {
                    title: update.title.clone(),
                    message: format!("{error:#}"),
                });
            }
        }
    }
    outcome
}

fn render_link_block(links: &[LangLink]) -> String {
    let mut block = String::new();
    for link in links {
        block.push_str(&link.to_wikitext());
        block.push('\n');
    }
    block
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use super::*;
    use crate::lang::LanguageTable;
    use crate::page_index::{PageIndex, Revision};
    use crate::redirects::RedirectMap;

    fn graph(pages: Vec<Page>) -> LanglinkGraph<LanguageTable> {
        LanglinkGraph::build(
            LanguageTable::archwiki(),
            PageIndex::from_pages(pages),
            RedirectMap::new(),
        )
        .expect("build graph")
    }

    fn sample_graph() -> LanglinkGraph<LanguageTable> {
        graph(vec![
            Page::new("Bash")
                .with_langlink("cs", "Bash")
                .with_langlink("fr", "Bash"),
            Page::new("Bash (Česky)")
                .with_langlink("en", "Bash")
                .with_langlink("fr", "Bash"),
            Page::new("Bash (Esperanto)"),
            Page::new("Zsh (Polski)"),
        ])
    }

    #[test]
    fn plan_reports_only_pages_with_changed_links() {
        let graph = sample_graph();
        let report = plan_updates(&graph, &PlanOptions::default());

        assert!(report.success());
        assert_eq!(report.checked, 3);
        assert_eq!(report.skipped_unsupported, 1);
        assert_eq!(report.up_to_date, 3);
        assert!(report.updates.is_empty());
    }

    #[test]
    fn plan_proposes_missing_links() {
        let mut pages = vec![
            Page::new("Bash")
                .with_langlink("cs", "Bash")
                .with_langlink("fr", "Bash"),
            Page::new("Bash (Česky)").with_langlink("de", "Bash"),
        ];
        pages[1].page_id = Some(42);
        pages[1].revisions.push(Revision {
            revid: Some(300),
            timestamp: Some("2024-05-01T10:00:00Z".to_string()),
        });
        let graph = graph(pages);
        let report = plan_updates(
            &graph,
            &PlanOptions {
                titles: vec!["Bash (Česky)".to_string(), "Missing".to_string()],
            },
        );

        assert_eq!(report.checked, 1);
        assert_eq!(report.updates.len(), 1);
        let update = &report.updates[0];
        assert_eq!(update.page_id, Some(42));
        assert_eq!(update.base_timestamp.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert_eq!(
            update.proposed,
            vec![LangLink::new("en", "Bash"), LangLink::new("fr", "Bash")]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].title, "Missing");
        assert!(!report.success());
    }

    #[test]
    fn render_diff_shows_link_block_changes() {
        let update = PlannedUpdate {
            title: "Bash (Česky)".to_string(),
            page_id: None,
            base_timestamp: None,
            current: vec![LangLink::new("de", "Bash"), LangLink::new("de", "Bash")],
            proposed: vec![LangLink::new("en", "Bash"), LangLink::new("fr", "Bash")],
        };
        let diff = update.render_diff();
        assert!(diff.contains("--- Bash (Česky) (current)"));
        assert!(diff.contains("+++ Bash (Česky) (proposed)"));
        assert!(diff.contains("-[[de:Bash]]"));
        assert!(diff.contains("+[[en:Bash]]"));
        assert!(diff.contains("+[[fr:Bash]]"));
    }

    struct FailingApplier;

    impl EditApplier for FailingApplier {
        fn apply(&mut self, update: &PlannedUpdate, _summary: &str) -> Result<()> {
            bail!("edit conflict on {}", update.title)
        }
    }

    #[test]
    fn apply_plan_feeds_every_update_to_the_applier() {
        let graph = graph(vec![
            Page::new("Bash").with_langlink("cs", "Bash"),
            Page::new("Bash (Česky)"),
            Page::new("Bash (Русский)"),
        ]);
        let report = plan_updates(&graph, &PlanOptions::default());
        assert_eq!(report.updates.len(), 3);

        let mut recorder = RecordingApplier::default();
        let outcome = apply_plan(&report, &mut recorder, "update interlanguage links");
        assert_eq!(outcome.applied, 3);
        assert!(outcome.failures.is_empty());
        assert_eq!(recorder.applied, report.updates);

        let outcome = apply_plan(&report, &mut FailingApplier, "update interlanguage links");
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.failures.len(), 3);
        assert!(outcome.failures[0].message.contains("edit conflict"));
    }
}
