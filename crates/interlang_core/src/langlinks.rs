use std::collections::BTreeSet;

use crate::error::EngineError;
use crate::graph::LanglinkGraph;
use crate::lang::LanguageOracle;
use crate::page_index::{LangLink, Page};

impl<O: LanguageOracle> LanglinkGraph<O> {
    /// Links a page should carry: its resolved family minus itself, sorted by tag.
    pub fn langlinks_for(&self, full_title: &str) -> Result<Vec<LangLink>, EngineError> {
        let resolved = self.resolve(full_title)?;
        let (base, language) = self.oracle.detect_language(full_title);
        let own_tag = self
            .oracle
            .tag_for_language(language)
            .ok_or_else(|| EngineError::UnknownPage(full_title.to_string()))?;

        let mut links = Vec::with_capacity(resolved.len().saturating_sub(1));
        let mut removed_self = false;
        for (tag, title) in resolved.pairs() {
            if tag == own_tag && title == base {
                removed_self = true;
                continue;
            }
            links.push(LangLink::new(tag, title));
        }
        if !removed_self {
            return Err(EngineError::MissingMasterTitle {
                title: full_title.to_string(),
                base: base.to_string(),
            });
        }
        links.sort_by(|left, right| left.tag.cmp(&right.tag));
        Ok(links)
    }
}

/// Whether the recorded links differ from `proposed` as sets.
pub fn needs_update(page: &Page, proposed: &[LangLink]) -> bool {
    let current: BTreeSet<(&str, &str)> = page
        .langlinks
        .iter()
        .map(|link| (link.tag.as_str(), link.title.as_str()))
        .collect();
    let proposed: BTreeSet<(&str, &str)> = proposed
        .iter()
        .map(|link| (link.tag.as_str(), link.title.as_str()))
        .collect();
    current != proposed
}
