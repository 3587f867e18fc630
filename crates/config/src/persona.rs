use std::path::Path;
use std::sync::Arc;
use tracing::info;
use twin_common::{Error, Result};

/// The fixed system prompt, loaded once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona(Arc<str>);

impl Persona {
    /// Read the persona text. A missing file is a startup failure.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Startup(format!(
                "Failed to read persona file {}: {}",
                path.display(),
                e
            ))
        })?;

        let persona = Self::new(raw.trim());
        info!(
            "Loaded persona from {} ({} chars)",
            path.display(),
            persona.as_str().chars().count()
        );
        Ok(persona)
    }

    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
