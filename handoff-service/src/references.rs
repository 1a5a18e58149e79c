use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Full-text extract of a source document, precomputed as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDocument {
    #[serde(default)]
    pub source: String,
    #[serde(alias = "text", alias = "content")]
    pub full_text: String,
}

/// Directory of `<title>.json` reference files
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    dir: PathBuf,
}

impl ReferenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolve a title to a file inside the store, refusing anything that could escape it
    fn path_for(&self, title: &str) -> Option<PathBuf> {
        let title = title.trim();
        if title.contains('\0') {
            return None;
        }
        let mut components = Path::new(title).components();
        let single_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(name)), None) if name == OsStr::new(title)
        );
        if !single_name {
            return None;
        }
        let file_name = if title.ends_with(".json") {
            title.to_string()
        } else {
            format!("{title}.json")
        };
        Some(self.dir.join(file_name))
    }

    /// Load the reference named `title`. A missing file is `Ok(None)`, not an error.
    pub async fn load(&self, title: &str) -> anyhow::Result<Option<ReferenceDocument>> {
        let Some(path) = self.path_for(title) else {
            warn!(title = %title, "refusing unsafe reference name");
            return Ok(None);
        };

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "reference file not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let mut document: ReferenceDocument = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("invalid reference file {}: {e}", path.display()))?;
        if document.source.is_empty() {
            document.source = title.to_string();
        }
        Ok(Some(document))
    }
}
