use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("Failed to open PDF {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Failed to save PDF {path}: {reason}")]
    Save { path: String, reason: String },

    #[error("Page {index} does not exist (document has {page_count} pages)")]
    InvalidPageIndex { index: String, page_count: usize },

    #[error("Unknown edit kind: {0}")]
    UnknownEditKind(String),

    #[error("Unknown shape type: {0}")]
    UnknownShapeType(String),

    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    #[error("Render failed: {0}")]
    RenderFailure(String),

    #[error("Malformed edit configuration: {0}")]
    MalformedConfig(String),
}

impl EditError {
    /// Fatal errors abort the whole request; everything else only costs one
    /// edit (or one page).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EditError::Open { .. } | EditError::Save { .. } | EditError::MalformedConfig(_)
        )
    }

    pub(crate) fn render(reason: impl Into<String>) -> Self {
        EditError::RenderFailure(reason.into())
    }
}

impl From<lopdf::Error> for EditError {
    fn from(e: lopdf::Error) -> Self {
        EditError::RenderFailure(e.to_string())
    }
}
