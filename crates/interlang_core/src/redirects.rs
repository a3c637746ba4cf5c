use std::collections::BTreeMap;

use serde::Deserialize;

/// One redirect as reported by `query.redirects` in the MediaWiki API.
/// The section anchor arrives separately as `tofragment` and is not kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedirectEntry {
    pub from: String,
    pub to: String,
}

/// Redirect source title -> canonical target title, fragments stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectMap {
    targets: BTreeMap<String, String>,
}

impl RedirectMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = RedirectEntry>) -> Self {
        let mut map = Self::new();
        for entry in entries {
            map.insert(&entry.from, &entry.to);
        }
        map
    }

    pub fn insert(&mut self, source: &str, target: &str) {
        let target = strip_fragment(target);
        if target.is_empty() || target == source {
            return;
        }
        self.targets.insert(source.to_string(), target.to_string());
    }

    /// Follow a single redirect hop; non-redirect titles resolve to themselves.
    pub fn resolve<'a>(&'a self, title: &'a str) -> &'a str {
        self.targets
            .get(title)
            .map(String::as_str)
            .unwrap_or(title)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.targets
            .iter()
            .map(|(source, target)| (source.as_str(), target.as_str()))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn strip_fragment(target: &str) -> &str {
    target
        .split_once('#')
        .map(|(title, _)| title)
        .unwrap_or(target)
        .trim()
}
