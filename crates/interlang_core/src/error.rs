use thiserror::Error;

/// Fatal conditions raised by family grouping and resolution.
///
/// Each of these means the page index and the grouping logic disagree, so the
/// affected resolution is aborted instead of emitting a wrong link set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("page is not part of any interlanguage family: {0}")]
    UnknownPage(String),
    #[error("family `{key}` still contains tag `{tag}` twice after case-sensitive grouping")]
    FamilyCollision { key: String, tag: String },
    #[error("resolved family of `{title}` is missing its own tag `{tag}`")]
    MissingMasterTag { title: String, tag: String },
    #[error("resolved family of `{title}` is missing its own title `{base}`")]
    MissingMasterTitle { title: String, base: String },
    #[error("resolved family of `{title}` has {tags} tags but {titles} titles")]
    LengthMismatch {
        title: String,
        tags: usize,
        titles: usize,
    },
    #[error("resolved family of `{title}` contains tag `{tag}` more than once")]
    DuplicateTag { title: String, tag: String },
    #[error("English bridge for `{0}` would recurse more than one level")]
    NestedBridge(String),
}
