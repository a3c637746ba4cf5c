use std::collections::BTreeSet;

pub const ENGLISH_TAG: &str = "en";
pub const LOCAL_LANGUAGE: &str = "English";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// Localized name, as used in title suffixes such as `Foo (Česky)`.
    pub name: &'static str,
    pub tag: &'static str,
    pub english: &'static str,
}

/// Sorted by tag.
pub const LANGUAGES: [Language; 36] = [
    Language { name: "العربية", tag: "ar", english: "Arabic" },
    Language { name: "Български", tag: "bg", english: "Bulgarian" },
    Language { name: "Català", tag: "ca", english: "Catalan" },
    Language { name: "Česky", tag: "cs", english: "Czech" },
    Language { name: "Dansk", tag: "da", english: "Danish" },
    Language { name: "Deutsch", tag: "de", english: "German" },
    Language { name: "Ελληνικά", tag: "el", english: "Greek" },
    Language { name: "English", tag: "en", english: "English" },
    Language { name: "Esperanto", tag: "eo", english: "Esperanto" },
    Language { name: "Español", tag: "es", english: "Spanish" },
    Language { name: "فارسی", tag: "fa", english: "Persian" },
    Language { name: "Suomi", tag: "fi", english: "Finnish" },
    Language { name: "Français", tag: "fr", english: "French" },
    Language { name: "עברית", tag: "he", english: "Hebrew" },
    Language { name: "Hrvatski", tag: "hr", english: "Croatian" },
    Language { name: "Magyar", tag: "hu", english: "Hungarian" },
    Language { name: "Indonesia", tag: "id", english: "Indonesian" },
    Language { name: "Italiano", tag: "it", english: "Italian" },
    Language { name: "日本語", tag: "ja", english: "Japanese" },
    Language { name: "한국어", tag: "ko", english: "Korean" },
    Language { name: "Lietuviškai", tag: "lt", english: "Lithuanian" },
    Language { name: "Norsk Bokmål", tag: "nb", english: "Norwegian (Bokmål)" },
    Language { name: "Nederlands", tag: "nl", english: "Dutch" },
    Language { name: "Polski", tag: "pl", english: "Polish" },
    Language { name: "Português", tag: "pt", english: "Portuguese" },
    Language { name: "Română", tag: "ro", english: "Romanian" },
    Language { name: "Русский", tag: "ru", english: "Russian" },
    Language { name: "Slovenský", tag: "sk", english: "Slovak" },
    Language { name: "Српски", tag: "sr", english: "Serbian" },
    Language { name: "Svenska", tag: "sv", english: "Swedish" },
    Language { name: "ไทย", tag: "th", english: "Thai" },
    Language { name: "Türkçe", tag: "tr", english: "Turkish" },
    Language { name: "Українська", tag: "uk", english: "Ukrainian" },
    Language { name: "Tiếng Việt", tag: "vi", english: "Vietnamese" },
    Language { name: "简体中文", tag: "zh-cn", english: "Chinese (Simplified)" },
    Language { name: "正體中文", tag: "zh-tw", english: "Chinese (Traditional)" },
];

/// Interwiki prefixes pointing at separate wikis.
pub const EXTERNAL_TAGS: [&str; 8] = ["de", "fa", "fi", "fr", "ja", "ro", "sv", "tr"];

/// Languages hosted on this wiki as suffixed titles.
pub const INTERNAL_TAGS: [&str; 24] = [
    "ar", "bg", "cs", "da", "el", "en", "es", "he", "hr", "hu", "id", "it", "ko", "lt", "nl", "pl",
    "pt", "ru", "sk", "sr", "th", "uk", "zh-cn", "zh-tw",
];

/// Title/language lookups the resolution engine depends on.
///
/// Tag arguments are compared case-insensitively.
pub trait LanguageOracle {
    /// Split a title into `(base title, language name)`. Titles without a
    /// recognized suffix belong to the local language.
    fn detect_language<'t, 's>(&'s self, title: &'t str) -> (&'t str, &'s str);
    fn tag_for_language(&self, name: &str) -> Option<&str>;
    fn language_for_tag(&self, tag: &str) -> Option<&str>;
    fn is_interlanguage_tag(&self, tag: &str) -> bool;
    fn is_internal_tag(&self, tag: &str) -> bool;
    fn is_external_tag(&self, tag: &str) -> bool;
    fn all_tags(&self) -> BTreeSet<&str>;
    fn local_language(&self) -> &str;

    fn tag_for_title(&self, title: &str) -> Option<&str> {
        let (_, language) = self.detect_language(title);
        self.tag_for_language(language)
    }

    /// Whether pages with this title can take part in interlanguage linking.
    fn supports_title(&self, title: &str) -> bool {
        self.tag_for_title(title)
            .is_some_and(|tag| self.is_interlanguage_tag(tag))
    }

    /// Rebuild a full title from a tag and a base title using the suffix convention.
    fn full_title(&self, tag: &str, base: &str) -> Option<String> {
        let language = self.language_for_tag(tag)?;
        if language == self.local_language() {
            Some(base.to_string())
        } else {
            Some(format!("{base} ({language})"))
        }
    }
}

#[derive(Debug, Clone)]
pub struct LanguageTable {
    languages: &'static [Language],
    internal: BTreeSet<String>,
    external: BTreeSet<String>,
}

impl Default for LanguageTable {
    fn default() -> Self {
        Self::archwiki()
    }
}

impl LanguageTable {
    pub fn archwiki() -> Self {
        Self {
            languages: &LANGUAGES,
            internal: INTERNAL_TAGS.iter().map(|tag| (*tag).to_string()).collect(),
            external: EXTERNAL_TAGS.iter().map(|tag| (*tag).to_string()).collect(),
        }
    }

    /// Replace the internal/external classification. Unknown tags are kept;
    /// they simply never match a language.
    pub fn with_classification(
        mut self,
        internal: Option<&[String]>,
        external: Option<&[String]>,
    ) -> Self {
        if let Some(tags) = internal {
            self.internal = tags.iter().map(|tag| normalize_tag(tag)).collect();
        }
        if let Some(tags) = external {
            self.external = tags.iter().map(|tag| normalize_tag(tag)).collect();
        }
        self
    }

    pub fn languages(&self) -> &[Language] {
        self.languages
    }
}

impl LanguageOracle for LanguageTable {
    fn detect_language<'t, 's>(&'s self, title: &'t str) -> (&'t str, &'s str) {
        if let Some((base, name)) = split_language_suffix(title)
            && let Some(language) = self.languages.iter().find(|language| language.name == name)
        {
            return (base, language.name);
        }
        (title, LOCAL_LANGUAGE)
    }

    fn tag_for_language(&self, name: &str) -> Option<&str> {
        self.languages
            .iter()
            .find(|language| language.name == name)
            .map(|language| language.tag)
    }

    fn language_for_tag(&self, tag: &str) -> Option<&str> {
        let tag = normalize_tag(tag);
        self.languages
            .iter()
            .find(|language| language.tag == tag)
            .map(|language| language.name)
    }

    fn is_interlanguage_tag(&self, tag: &str) -> bool {
        self.is_internal_tag(tag) || self.is_external_tag(tag)
    }

    fn is_internal_tag(&self, tag: &str) -> bool {
        self.internal.contains(&normalize_tag(tag))
    }

    fn is_external_tag(&self, tag: &str) -> bool {
        self.external.contains(&normalize_tag(tag))
    }

    fn all_tags(&self) -> BTreeSet<&str> {
        self.languages.iter().map(|language| language.tag).collect()
    }

    fn local_language(&self) -> &str {
        LOCAL_LANGUAGE
    }
}

pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_ascii_lowercase()
}

/// Canonical title form: underscores become spaces, surrounding whitespace is
/// stripped and the first letter is uppercased.
pub fn canonicalize(title: &str) -> String {
    let spaced = title.replace('_', " ");
    let trimmed = spaced.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Match `<base>[ _](<name>)` where `<name>` contains no opening parenthesis.
fn split_language_suffix(title: &str) -> Option<(&str, &str)> {
    let without_close = title.strip_suffix(')')?;
    let open = without_close.rfind('(')?;
    let name = &without_close[open + 1..];
    if name.is_empty() {
        return None;
    }
    let before = &without_close[..open];
    let base = before
        .strip_suffix(' ')
        .or_else(|| before.strip_suffix('_'))?;
    if base.is_empty() {
        return None;
    }
    Some((base, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_language_splits_known_suffix() {
        let table = LanguageTable::archwiki();
        assert_eq!(
            table.detect_language("Installation guide (Česky)"),
            ("Installation guide", "Česky")
        );
        assert_eq!(
            table.detect_language("Installation_guide_(简体中文)"),
            ("Installation_guide", "简体中文")
        );
    }

    #[test]
    fn detect_language_defaults_to_english() {
        let table = LanguageTable::archwiki();
        assert_eq!(table.detect_language("Xorg"), ("Xorg", "English"));
        assert_eq!(
            table.detect_language("Wine (software)"),
            ("Wine (software)", "English")
        );
        assert_eq!(table.detect_language("(Česky)"), ("(Česky)", "English"));
        assert_eq!(table.detect_language("Foo(Česky)"), ("Foo(Česky)", "English"));
    }

    #[test]
    fn detect_language_handles_parentheses_in_language_name() {
        let table = LanguageTable::archwiki();
        // "Norwegian (Bokmål)" is an English name; only local names are suffixes.
        assert_eq!(
            table.detect_language("Foo (Norsk Bokmål)"),
            ("Foo", "Norsk Bokmål")
        );
    }

    #[test]
    fn tag_lookups_are_case_insensitive() {
        let table = LanguageTable::archwiki();
        assert_eq!(table.tag_for_language("Česky"), Some("cs"));
        assert_eq!(table.language_for_tag("ZH-CN"), Some("简体中文"));
        assert!(table.is_internal_tag("CS"));
        assert!(table.is_external_tag("de"));
        assert!(!table.is_interlanguage_tag("eo"));
        assert!(table.all_tags().contains("eo"));
        assert_eq!(table.all_tags().len(), 36);
    }

    #[test]
    fn supports_title_rejects_non_interlanguage_languages() {
        let table = LanguageTable::archwiki();
        assert!(table.supports_title("Foo (Česky)"));
        assert!(table.supports_title("Foo"));
        assert!(!table.supports_title("Foo (Esperanto)"));
    }

    #[test]
    fn full_title_applies_suffix_except_for_local_language() {
        let table = LanguageTable::archwiki();
        assert_eq!(table.full_title("en", "Foo").as_deref(), Some("Foo"));
        assert_eq!(table.full_title("cs", "Foo").as_deref(), Some("Foo (Česky)"));
        assert_eq!(table.full_title("xx", "Foo"), None);
    }

    #[test]
    fn classification_override_replaces_tag_sets() {
        let table = LanguageTable::archwiki()
            .with_classification(Some(&["en".to_string(), "DE".to_string()]), None);
        assert!(table.is_internal_tag("de"));
        assert!(!table.is_internal_tag("cs"));
        assert!(table.is_external_tag("de"));
    }

    #[test]
    fn canonicalize_normalizes_underscores_and_case() {
        assert_eq!(canonicalize("  installation_guide "), "Installation guide");
        assert_eq!(canonicalize("čeština"), "Čeština");
        assert_eq!(canonicalize("   "), "");
    }
}
