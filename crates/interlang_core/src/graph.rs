use tracing::info;

use crate::error::EngineError;
use crate::families::{Families, group_into_families};
use crate::lang::LanguageOracle;
use crate::page_index::PageIndex;
use crate::redirects::RedirectMap;

/// Immutable per-run context: the page index, the redirect map and the
/// families derived from them. Resolution only ever reads from it.
#[derive(Debug, Clone)]
pub struct LanglinkGraph<O> {
    pub(crate) oracle: O,
    pub(crate) pages: PageIndex,
    pub(crate) redirects: RedirectMap,
    pub(crate) families: Families,
}

impl<O: LanguageOracle> LanglinkGraph<O> {
    pub fn build(oracle: O, pages: PageIndex, redirects: RedirectMap) -> Result<Self, EngineError> {
        let families = group_into_families(&oracle, &pages)?;
        info!(
            pages = pages.len(),
            redirects = redirects.len(),
            families = families.len(),
            "built langlink graph"
        );
        Ok(Self {
            oracle,
            pages,
            redirects,
            families,
        })
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn pages(&self) -> &PageIndex {
        &self.pages
    }

    pub fn redirects(&self) -> &RedirectMap {
        &self.redirects
    }

    pub fn families(&self) -> &Families {
        &self.families
    }
}
