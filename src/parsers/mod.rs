pub mod clinical;

/// Locates one section in free text produced by the text-generation service.
/// Each clinical key has an ordered list of these; the first that returns
/// `Some` decides the section's content.
pub trait SectionMatcher: Send + Sync {
    /// Short name for diagnostics (e.g. "bold-label", "abbreviation").
    fn name(&self) -> &'static str;

    /// Trimmed section content, or `None` when this form is absent.
    fn extract(&self, text: &str) -> Option<String>;
}
