use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, instrument};

use crate::exam::Catalog;
use crate::ics::FIELD_SEPARATOR;

/// Fixed download name; the export always produces this file.
pub const FILE_NAME: &str = "izbrani_izpiti.ics";

pub const MIME_TYPE: &str = "text/calendar";

/// A finished calendar document for the currently visible rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDocument {
    content: String,
}

impl CalendarDocument {
    /// Wraps the shared header and the row fragments into one calendar.
    /// Every `@@@@` token expands to a newline; rows join with newlines in
    /// display order. No rows is fine: the document is then just the
    /// header between the calendar markers.
    pub fn compose<'a, I>(header: &str, fragments: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let rows = fragments
            .into_iter()
            .flat_map(|fragment| fragment.split(FIELD_SEPARATOR))
            .collect::<Vec<_>>()
            .join("\n");
        let content = format!(
            "BEGIN:VCALENDAR\n{}\n{}\nEND:VCALENDAR\n",
            header.replace(FIELD_SEPARATOR, "\n"),
            rows
        );
        Self { content }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// `data:` URI form with percent-encoded content, as used for an
    /// in-page download link.
    pub fn data_uri(&self) -> String {
        format!(
            "data:{MIME_TYPE};charset=utf8,{}",
            urlencoding::encode(&self.content)
        )
    }

    #[instrument(skip(self, path))]
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        fs::write(path, self.content.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!(file = %path.display(), bytes = self.content.len(), "wrote calendar");
        Ok(())
    }
}

/// Serializes the currently visible rows. Reads only the already-computed
/// visibility; selection state plays no part here.
pub fn export_visible(catalog: &Catalog, visible: &[bool]) -> CalendarDocument {
    let fragments = catalog
        .rows
        .iter()
        .zip(visible)
        .filter(|(_, shown)| **shown)
        .map(|(row, _)| row.ics_fragment.as_str());
    CalendarDocument::compose(&catalog.header, fragments)
}
