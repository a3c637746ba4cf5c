use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::error::EngineError;
use crate::lang::LanguageOracle;
use crate::page_index::{Page, PageIndex};

/// Pages representing one logical article across languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Family {
    pub key: String,
    /// Member titles in ascending title order.
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Families {
    by_key: BTreeMap<String, Family>,
    family_index: BTreeMap<String, String>,
    case_sensitive_splits: usize,
    skipped_unsupported: usize,
}

impl Families {
    pub fn get(&self, key: &str) -> Option<&Family> {
        self.by_key.get(key)
    }

    pub fn key_of(&self, title: &str) -> Option<&str> {
        self.family_index.get(title).map(String::as_str)
    }

    pub fn family_of(&self, title: &str) -> Option<&Family> {
        self.key_of(title).and_then(|key| self.by_key.get(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Family> {
        self.by_key.values()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Number of case-insensitive runs that had to be re-split case-sensitively.
    pub fn case_sensitive_splits(&self) -> usize {
        self.case_sensitive_splits
    }

    pub fn skipped_unsupported(&self) -> usize {
        self.skipped_unsupported
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyMode {
    CaseInsensitive,
    CaseSensitive,
}

/// Partition the page index into families keyed by base title.
///
/// Grouping is case-insensitive; a run in which two pages share a language tag
/// is grouped again with case-sensitive keys.
pub fn group_into_families<O: LanguageOracle>(
    oracle: &O,
    pages: &PageIndex,
) -> Result<Families, EngineError> {
    let mut families = Families::default();
    let mut eligible = Vec::with_capacity(pages.len());
    for page in pages.iter() {
        if oracle.supports_title(&page.title) {
            eligible.push(page);
        } else {
            debug!(title = %page.title, "language does not support interlanguage links");
            families.skipped_unsupported += 1;
        }
    }

    group_runs(oracle, eligible, KeyMode::CaseInsensitive, &mut families)?;

    for family in families.by_key.values() {
        for title in &family.members {
            families
                .family_index
                .insert(title.clone(), family.key.clone());
        }
    }

    info!(
        pages = pages.len(),
        families = families.by_key.len(),
        case_sensitive_splits = families.case_sensitive_splits,
        skipped_unsupported = families.skipped_unsupported,
        "grouped pages into families"
    );
    Ok(families)
}

fn group_runs<O: LanguageOracle>(
    oracle: &O,
    pages: Vec<&Page>,
    mode: KeyMode,
    families: &mut Families,
) -> Result<(), EngineError> {
    let mut keyed: Vec<(String, &Page)> = pages
        .into_iter()
        .map(|page| (family_key(oracle, &page.title, mode), page))
        .collect();
    // Stable: pages keep their title order inside a run.
    keyed.sort_by(|left, right| left.0.cmp(&right.0));

    for run in keyed.chunk_by(|left, right| left.0 == right.0) {
        let key = &run[0].0;
        let mut seen = BTreeSet::new();
        let mut collision = None;
        for (_, page) in run {
            let tag = oracle.tag_for_title(&page.title).unwrap_or_default();
            if !seen.insert(tag) && collision.is_none() {
                collision = Some(tag.to_string());
            }
        }

        match (collision, mode) {
            (None, _) => {
                families.by_key.insert(
                    key.clone(),
                    Family {
                        key: key.clone(),
                        members: run.iter().map(|(_, page)| page.title.clone()).collect(),
                    },
                );
            }
            (Some(tag), KeyMode::CaseInsensitive) => {
                debug!(key = %key, tag = %tag, "tag collision, regrouping case-sensitively");
                families.case_sensitive_splits += 1;
                let run_pages = run.iter().map(|(_, page)| *page).collect();
                group_runs(oracle, run_pages, KeyMode::CaseSensitive, families)?;
            }
            (Some(tag), KeyMode::CaseSensitive) => {
                return Err(EngineError::FamilyCollision {
                    key: key.clone(),
                    tag,
                });
            }
        }
    }
    Ok(())
}

fn family_key<O: LanguageOracle>(oracle: &O, title: &str, mode: KeyMode) -> String {
    let (base, _) = oracle.detect_language(title);
    match mode {
        KeyMode::CaseInsensitive => base.to_lowercase(),
        KeyMode::CaseSensitive => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::LanguageTable;

    fn index(titles: &[&str]) -> PageIndex {
        PageIndex::from_pages(titles.iter().map(|title| Page::new(*title)))
    }

    #[test]
    fn groups_pages_by_base_title() {
        let pages = index(&[
            "Bash",
            "Bash (Česky)",
            "Bash (Русский)",
            "Zsh",
            "zsh (Polski)",
        ]);
        let families = group_into_families(&LanguageTable::archwiki(), &pages).expect("group");

        assert_eq!(families.len(), 2);
        let bash = families.get("bash").expect("bash family");
        assert_eq!(bash.members, vec!["Bash", "Bash (Česky)", "Bash (Русский)"]);
        assert_eq!(families.key_of("zsh (Polski)"), Some("zsh"));
        assert_eq!(
            families.family_of("Zsh").map(|family| family.members.len()),
            Some(2)
        );
        assert_eq!(families.case_sensitive_splits(), 0);
    }

    #[test]
    fn unsupported_languages_are_left_out() {
        let pages = index(&["Bash", "Bash (Esperanto)"]);
        let families = group_into_families(&LanguageTable::archwiki(), &pages).expect("group");

        assert_eq!(families.skipped_unsupported(), 1);
        assert!(families.key_of("Bash (Esperanto)").is_none());
        assert_eq!(
            families.get("bash").map(|family| family.members.clone()),
            Some(vec!["Bash".to_string()])
        );
    }

    #[test]
    fn tag_collision_splits_case_sensitively() {
        let pages = index(&["FiSH", "Fish", "Fish (Česky)", "FiSH (Polski)"]);
        let families = group_into_families(&LanguageTable::archwiki(), &pages).expect("group");

        assert_eq!(families.case_sensitive_splits(), 1);
        assert!(families.get("fish").is_none());
        assert_eq!(
            families.get("Fish").map(|family| family.members.clone()),
            Some(vec!["Fish".to_string(), "Fish (Česky)".to_string()])
        );
        assert_eq!(
            families.get("FiSH").map(|family| family.members.clone()),
            Some(vec!["FiSH".to_string(), "FiSH (Polski)".to_string()])
        );
        assert_eq!(families.key_of("Fish (Česky)"), Some("Fish"));
    }

    #[test]
    fn distinct_languages_with_different_case_stay_together() {
        let pages = index(&["Fish", "FiSH (Česky)"]);
        let families = group_into_families(&LanguageTable::archwiki(), &pages).expect("group");

        assert_eq!(families.case_sensitive_splits(), 0);
        assert_eq!(families.len(), 1);
        assert_eq!(families.key_of("FiSH (Česky)"), Some("fish"));
    }

    #[test]
    fn collision_surviving_case_sensitive_split_is_fatal() {
        // Underscore and space variants detect the same base and language.
        let pages = index(&["Fish (Česky)", "Fish_(Česky)"]);
        let error =
            group_into_families(&LanguageTable::archwiki(), &pages).expect_err("must fail");
        assert_eq!(
            error,
            EngineError::FamilyCollision {
                key: "Fish".to_string(),
                tag: "cs".to_string(),
            }
        );
    }
}
