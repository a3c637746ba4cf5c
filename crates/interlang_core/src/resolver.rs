use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::EngineError;
use crate::graph::LanglinkGraph;
use crate::lang::{ENGLISH_TAG, LanguageOracle, canonicalize, normalize_tag};
use crate::page_index::{LangLink, Page};

/// Tag -> base title bijection for one family, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedFamily {
    tags: Vec<String>,
    titles: Vec<String>,
}

impl ResolvedFamily {
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .map(String::as_str)
            .zip(self.titles.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn contains_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|existing| existing == tag)
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.titles.iter().any(|existing| existing == title)
    }

    pub fn title_for(&self, tag: &str) -> Option<&str> {
        self.tags
            .iter()
            .position(|existing| existing == tag)
            .map(|position| self.titles[position].as_str())
    }

    /// First occurrence of a tag wins.
    fn insert(&mut self, tag: &str, title: &str) -> bool {
        if self.contains_tag(tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        self.titles.push(title.to_string());
        true
    }

    fn verify(&self, master_title: &str, master_tag: &str, master_base: &str) -> Result<(), EngineError> {
        if !self.contains_tag(master_tag) {
            return Err(EngineError::MissingMasterTag {
                title: master_title.to_string(),
                tag: master_tag.to_string(),
            });
        }
        if !self.contains_title(master_base) {
            return Err(EngineError::MissingMasterTitle {
                title: master_title.to_string(),
                base: master_base.to_string(),
            });
        }
        if self.tags.len() != self.titles.len() {
            return Err(EngineError::LengthMismatch {
                title: master_title.to_string(),
                tags: self.tags.len(),
                titles: self.titles.len(),
            });
        }
        let mut seen = BTreeSet::new();
        for tag in &self.tags {
            if !seen.insert(tag.as_str()) {
                return Err(EngineError::DuplicateTag {
                    title: master_title.to_string(),
                    tag: tag.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The English bridge may resolve the English page's family once; that nested
/// resolution always has an English master and never bridges again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Outer,
    Nested,
}

impl<O: LanguageOracle> LanglinkGraph<O> {
    /// Resolve the canonical tag/title bijection of the family containing
    /// `master_title`.
    pub fn resolve(&self, master_title: &str) -> Result<ResolvedFamily, EngineError> {
        self.resolve_at(master_title, Level::Outer)
    }

    fn resolve_at(&self, master_title: &str, level: Level) -> Result<ResolvedFamily, EngineError> {
        let family = self
            .families
            .family_of(master_title)
            .ok_or_else(|| EngineError::UnknownPage(master_title.to_string()))?;
        let members: Vec<&Page> = family
            .members
            .iter()
            .filter_map(|title| self.pages.get(title))
            .collect();

        let (master_base, master_language) = self.oracle.detect_language(master_title);
        let master_tag = self
            .oracle
            .tag_for_language(master_language)
            .ok_or_else(|| EngineError::UnknownPage(master_title.to_string()))?
            .to_string();

        let mut resolved = ResolvedFamily::default();
        for title in &family.members {
            let (base, language) = self.oracle.detect_language(title);
            if let Some(tag) = self.oracle.tag_for_language(language) {
                resolved.insert(tag, base);
            }
        }
        let had_english_early = resolved.contains_tag(ENGLISH_TAG);

        // Internal links first; this is also how an English member is discovered.
        for page in &members {
            self.pull_from_page(page, &mut resolved, |tag, base| {
                self.is_valid_internal(tag, base)
            });
        }

        let mut pulled_from_english = false;
        if let Some(english_title) = resolved.title_for(ENGLISH_TAG).map(str::to_string) {
            let english_page = self
                .oracle
                .full_title(ENGLISH_TAG, &english_title)
                .and_then(|full_title| self.pages.get(&full_title));
            match english_page {
                // A family index built from a wider page set can name an
                // English member this index does not hold.
                None => {
                    warn!(
                        title = %master_title,
                        english = %english_title,
                        "English page missing from index, skipping bridge"
                    );
                }
                Some(english_page) => {
                    let bridge = if master_tag == ENGLISH_TAG || had_english_early {
                        true
                    } else {
                        match level {
                            Level::Nested => {
                                return Err(EngineError::NestedBridge(master_title.to_string()));
                            }
                            Level::Outer => {
                                let english = self.resolve_at(&english_title, Level::Nested)?;
                                let compatible = english.contains_title(master_base)
                                    || !english.contains_tag(&master_tag);
                                if !compatible {
                                    debug!(
                                        title = %master_title,
                                        english = %english_title,
                                        "English family conflicts, leaving families unmerged"
                                    );
                                }
                                compatible
                            }
                        }
                    };
                    if bridge {
                        self.pull_from_page(english_page, &mut resolved, |tag, base| {
                            self.oracle.is_external_tag(tag) || self.is_valid_internal(tag, base)
                        });
                        pulled_from_english = true;
                    }
                }
            }
        }

        if !pulled_from_english {
            for page in &members {
                self.pull_from_page(page, &mut resolved, |tag, _| {
                    self.oracle.is_external_tag(tag)
                });
            }
        }

        resolved.verify(master_title, &master_tag, master_base)?;
        Ok(resolved)
    }

    fn pull_from_page<F>(&self, page: &Page, resolved: &mut ResolvedFamily, accept: F)
    where
        F: Fn(&str, &str) -> bool,
    {
        for link in &page.langlinks {
            let tag = normalize_tag(&link.tag);
            if resolved.contains_tag(&tag) {
                continue;
            }
            let Some(full_title) = self.title_from_langlink(&tag, link) else {
                trace!(page = %page.title, tag = %link.tag, target = %link.title, "rejected malformed langlink");
                continue;
            };
            let (base, _) = self.oracle.detect_language(&full_title);
            if accept(&tag, base) {
                resolved.insert(&tag, base);
            } else {
                trace!(page = %page.title, tag = %tag, target = %link.title, "langlink not pulled");
            }
        }
    }

    /// Full local title a raw langlink points at, with internal targets
    /// canonicalized and passed through one redirect hop.
    fn title_from_langlink(&self, tag: &str, link: &LangLink) -> Option<String> {
        let full_title = self.oracle.full_title(tag, &link.title)?;
        if !self.oracle.is_internal_tag(tag) {
            return Some(full_title);
        }
        let canonical = canonicalize(&full_title);
        if canonical.is_empty() {
            return None;
        }
        Some(self.redirects.resolve(&canonical).to_string())
    }

    fn is_valid_internal(&self, tag: &str, base: &str) -> bool {
        if !self.oracle.is_internal_tag(tag) {
            return false;
        }
        self.oracle
            .full_title(tag, base)
            .is_some_and(|full_title| self.pages.contains(&full_title))
    }
}
