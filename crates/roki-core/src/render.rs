use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::exam::{Catalog, Category, ExamSlot};
use crate::selection::{CategorySummary, SelectionStore, SummaryStyle, group_is_active};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, catalog, rows))]
    pub fn print_exam_table(&mut self, catalog: &Catalog, rows: &[&ExamSlot]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "Datum".to_string(),
            "Predmet".to_string(),
            "Smer in letnik".to_string(),
            "Rok".to_string(),
            "Izvajalci".to_string(),
            "Obdobje".to_string(),
        ];

        let mut table = Vec::with_capacity(rows.len());
        for row in rows {
            table.push(vec![
                row.display_date(),
                catalog.option_label(row.subject).to_string(),
                row.display_programs(catalog),
                catalog.option_label(row.round).to_string(),
                row.display_instructors(catalog),
                catalog.option_label(row.period).to_string(),
            ]);
        }

        write_table(&mut out, headers, table)?;
        Ok(())
    }

    /// One bulk-control line: category name, its label in the style color,
    /// and the active/total counts.
    pub fn print_summary(&mut self, summary: &CategorySummary) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let label = self.paint(&summary.label, style_code(summary.style));
        writeln!(
            out,
            "{:<10} {} ({}/{})",
            summary.category.display_name(),
            label,
            summary.n_active,
            summary.n_total
        )?;
        Ok(())
    }

    /// The option listing for one category, letter groups included. Group
    /// headers show the derived group activity; options show their own.
    #[tracing::instrument(skip(self, catalog, selection))]
    pub fn print_options(
        &mut self,
        catalog: &Catalog,
        selection: &SelectionStore,
        category: Category,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let grouped = category.grouped_by_letter();

        for (letter, members) in catalog.letter_groups(category) {
            if grouped && let Some(letter) = letter {
                let active = group_is_active(catalog, selection, category, letter);
                let marker = if active { "*" } else { " " };
                let header = format!("{letter} {marker}");
                writeln!(out, "{}", self.paint(&header, "1"))?;
            }

            for option in members {
                let mark = if selection.is_active(option.id) {
                    self.paint("[x]", "32")
                } else {
                    "[ ]".to_string()
                };
                writeln!(out, "  {mark} {:>4}  {}", option.id, option.display)?;
            }
        }

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn style_code(style: SummaryStyle) -> &'static str {
    match style {
        SummaryStyle::Secondary => "90",
        SummaryStyle::Warning => "33",
        SummaryStyle::Success => "32",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }
    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(cell.as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let padding = widths[idx].saturating_sub(UnicodeWidthStr::width(cell.as_str()));
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}
