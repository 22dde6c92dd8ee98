use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::exam::Catalog;
use crate::selection::SelectionStore;

/// File-backed session state: the imported catalog and the active
/// selection, both living under the data directory. Each CLI invocation
/// loads them, mutates synchronously, and saves atomically.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub selection_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let catalog_path = data_dir.join("catalog.data");
        let selection_path = data_dir.join("selection.data");

        if !catalog_path.exists() {
            fs::write(&catalog_path, "")?;
        }
        if !selection_path.exists() {
            fs::write(&selection_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            catalog = %catalog_path.display(),
            selection = %selection_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            catalog_path,
            selection_path,
        })
    }

    /// `None` until an import has happened.
    #[tracing::instrument(skip(self))]
    pub fn load_catalog(&self) -> anyhow::Result<Option<Catalog>> {
        let raw = fs::read_to_string(&self.catalog_path)
            .with_context(|| format!("failed reading {}", self.catalog_path.display()))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let catalog: Catalog = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.catalog_path.display()))?;
        debug!(
            rows = catalog.rows.len(),
            options = catalog.options.len(),
            "loaded catalog"
        );
        Ok(Some(catalog))
    }

    /// Loads the catalog or explains that an import is needed first.
    pub fn require_catalog(&self) -> anyhow::Result<Catalog> {
        self.load_catalog()?
            .ok_or_else(|| anyhow!("no catalog yet; run 'roki import <file.ics>...' first"))
    }

    #[tracing::instrument(skip(self, catalog))]
    pub fn save_catalog(&self, catalog: &Catalog) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(catalog)?;
        write_atomic(&self.catalog_path, serialized.as_bytes())
            .context("failed to save catalog.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_selection(&self) -> anyhow::Result<SelectionStore> {
        let raw = fs::read_to_string(&self.selection_path)
            .with_context(|| format!("failed reading {}", self.selection_path.display()))?;

        let mut ids = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let token = line.trim();
            if token.is_empty() {
                continue;
            }
            let id = token.parse().with_context(|| {
                format!(
                    "failed parsing {} line {}",
                    self.selection_path.display(),
                    idx + 1
                )
            })?;
            ids.push(id);
        }

        debug!(active = ids.len(), "loaded selection");
        Ok(SelectionStore::from_ids(ids))
    }

    #[tracing::instrument(skip(self, selection))]
    pub fn save_selection(&self, selection: &SelectionStore) -> anyhow::Result<()> {
        let mut payload = String::new();
        for id in selection.active_ids() {
            payload.push_str(&id.to_string());
            payload.push('\n');
        }
        write_atomic(&self.selection_path, payload.as_bytes())
            .context("failed to save selection.data")
    }

    /// Importing a fresh catalog invalidates whatever was selected before.
    #[tracing::instrument(skip(self, catalog))]
    pub fn replace_catalog(&self, catalog: &Catalog) -> anyhow::Result<()> {
        self.save_catalog(catalog)?;
        self.save_selection(&SelectionStore::new())
    }
}

#[tracing::instrument(skip(path, payload))]
fn write_atomic(path: &Path, payload: &[u8]) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = payload.len(), "saving atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(payload)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::DataStore;
    use crate::exam::OptionId;
    use crate::selection::SelectionStore;

    #[test]
    fn fresh_store_has_no_catalog_and_an_empty_selection() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");

        assert!(store.load_catalog().expect("load").is_none());
        assert!(store.require_catalog().is_err());
        let selection = store.load_selection().expect("load selection");
        assert_eq!(selection.active_ids().count(), 0);
    }

    #[test]
    fn selection_round_trips_through_the_file() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");

        let selection = SelectionStore::from_ids([OptionId(3), OptionId(1), OptionId(12)]);
        store.save_selection(&selection).expect("save");
        assert_eq!(store.load_selection().expect("load"), selection);
    }
}
