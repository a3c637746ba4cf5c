use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A declared interlanguage link, `[[tag:title]]` in wikitext.
///
/// The title is the raw interwiki target: for internal languages it is the base
/// title without the language suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LangLink {
    #[serde(rename = "lang")]
    pub tag: String,
    #[serde(alias = "*")]
    pub title: String,
}

impl LangLink {
    pub fn new(tag: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            title: title.into(),
        }
    }

    pub fn to_wikitext(&self) -> String {
        format!("[[{}:{}]]", self.tag, self.title)
    }
}

/// Latest revision metadata; the timestamp is the base for edit conflict detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    #[serde(default)]
    pub revid: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One fetched page snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub title: String,
    #[serde(default, rename = "pageid")]
    pub page_id: Option<i64>,
    #[serde(default, rename = "ns")]
    pub namespace: i32,
    #[serde(default)]
    pub langlinks: Vec<LangLink>,
    #[serde(default)]
    pub revisions: Vec<Revision>,
}

impl Page {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            page_id: None,
            namespace: 0,
            langlinks: Vec::new(),
            revisions: Vec::new(),
        }
    }

    pub fn with_langlink(mut self, tag: &str, title: &str) -> Self {
        self.langlinks.push(LangLink::new(tag, title));
        self
    }

    pub fn latest_revision(&self) -> Option<&Revision> {
        self.revisions.first()
    }
}

/// Pages sorted by title with binary-search lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageIndex {
    pages: Vec<Page>,
}

impl PageIndex {
    /// Build an index from decoded pages. Entries sharing a title are merged:
    /// langlinks and revisions concatenate, later scalars win.
    pub fn from_pages(pages: impl IntoIterator<Item = Page>) -> Self {
        let mut by_title: BTreeMap<String, Page> = BTreeMap::new();
        for page in pages {
            match by_title.get_mut(&page.title) {
                Some(existing) => {
                    if page.page_id.is_some() {
                        existing.page_id = page.page_id;
                    }
                    existing.namespace = page.namespace;
                    existing.langlinks.extend(page.langlinks);
                    existing.revisions.extend(page.revisions);
                }
                None => {
                    by_title.insert(page.title.clone(), page);
                }
            }
        }
        Self {
            pages: by_title.into_values().collect(),
        }
    }

    pub fn get(&self, title: &str) -> Option<&Page> {
        self.pages
            .binary_search_by(|page| page.title.as_str().cmp(title))
            .ok()
            .map(|position| &self.pages[position])
    }

    pub fn contains(&self, title: &str) -> bool {
        self.get(title).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn langlink_count(&self) -> usize {
        self.pages.iter().map(|page| page.langlinks.len()).sum()
    }
}

/// Accumulates raw API page objects that may arrive in pieces across
/// continuation batches, merging pieces of the same title before decoding.
#[derive(Debug, Default)]
pub struct PageIndexBuilder {
    raw: BTreeMap<String, Value>,
}

impl PageIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, page: Value) -> Result<()> {
        let title = page
            .get("title")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| anyhow::anyhow!("page object without a title: {page}"))?;
        match self.raw.get_mut(&title) {
            Some(existing) => deep_merge(page, existing)
                .with_context(|| format!("failed to merge partial page data for {title}"))?,
            None => {
                self.raw.insert(title, page);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn finish(self) -> Result<PageIndex> {
        let mut pages = Vec::with_capacity(self.raw.len());
        for (title, value) in self.raw {
            let page: Page = serde_json::from_value(value)
                .with_context(|| format!("failed to decode page {title}"))?;
            pages.push(page);
        }
        Ok(PageIndex::from_pages(pages))
    }
}

/// Deep union of `source` into `destination`: objects merge key-wise,
/// arrays concatenate, anything else overwrites.
pub fn deep_merge(source: Value, destination: &mut Value) -> Result<()> {
    let (Value::Object(source), Value::Object(destination)) = (source, destination) else {
        bail!("both merge operands must be JSON objects");
    };
    for (key, value) in source {
        match value {
            Value::Object(_) => {
                let node = destination
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Default::default()));
                deep_merge(value, node).with_context(|| format!("at key `{key}`"))?;
            }
            Value::Array(items) => {
                let node = destination
                    .entry(key.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                match node {
                    Value::Array(existing) => existing.extend(items),
                    _ => bail!("cannot append array to non-array value at key `{key}`"),
                }
            }
            scalar => {
                destination.insert(key, scalar);
            }
        }
    }
    Ok(())
}
