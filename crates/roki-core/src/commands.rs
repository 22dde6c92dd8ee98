use std::path::{Path, PathBuf};

use anyhow::anyhow;
use tracing::{debug, info, instrument};

use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::exam::Category;
use crate::export;
use crate::ics::{self, ImportOptions};
use crate::render::Renderer;
use crate::selection;
use crate::visibility;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "import",
        "list",
        "toggle",
        "all",
        "categories",
        "options",
        "export",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    debug!(
        command = %inv.command,
        args = ?inv.command_args,
        "dispatching command"
    );

    match inv.command.as_str() {
        "import" => cmd_import(store, cfg, &inv.command_args),
        "list" => cmd_list(store, renderer),
        "toggle" => cmd_toggle(store, renderer, &inv.command_args),
        "all" => cmd_all(store, renderer, &inv.command_args),
        "categories" => cmd_categories(store, renderer),
        "options" => cmd_options(store, renderer, &inv.command_args),
        "export" => cmd_export(store, &inv.command_args),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, cfg, args))]
fn cmd_import(store: &mut DataStore, cfg: &Config, args: &[String]) -> anyhow::Result<()> {
    info!("command import");

    if args.is_empty() {
        return Err(anyhow!("import requires at least one .ics file"));
    }

    let opts = ImportOptions::new(
        cfg.summary_pattern().as_deref(),
        cfg.date_format().as_deref(),
    )?;
    let periods = cfg.periods()?;
    let name_overrides = cfg.name_overrides()?;

    let mut calendars = Vec::with_capacity(args.len());
    for path in args {
        calendars.push(ics::load_calendar(Path::new(path), &opts)?);
    }

    let catalog = ics::build_catalog(&calendars, periods, &name_overrides, &opts)?;
    let n_rows = catalog.rows.len();
    store.replace_catalog(&catalog)?;

    println!("Imported {} calendar(s) with {} exam slot(s).", calendars.len(), n_rows);
    Ok(())
}

#[instrument(skip(store, renderer))]
fn cmd_list(store: &mut DataStore, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command list");

    let catalog = store.require_catalog()?;
    let selection = store.load_selection()?;
    let visible = visibility::recompute_all(&catalog, &selection);
    let rows = visibility::visible_rows(&catalog, &visible);

    renderer.print_exam_table(&catalog, &rows)?;
    println!("{} of {} exam slot(s) visible.", rows.len(), catalog.rows.len());
    Ok(())
}

#[instrument(skip(store, renderer, args))]
fn cmd_toggle(store: &mut DataStore, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command toggle");

    if args.is_empty() {
        return Err(anyhow!(
            "toggle requires option tokens (an id or category:name)"
        ));
    }

    let catalog = store.require_catalog()?;
    let mut selection = store.load_selection()?;

    let mut n_visible = 0;
    for token in args {
        let id = catalog.resolve_token(token)?;
        let refresh = selection::toggle_option(&catalog, &mut selection, id)?;
        renderer.print_summary(&refresh.summary)?;
        n_visible = refresh.visible.iter().filter(|shown| **shown).count();
    }

    store.save_selection(&selection)?;
    println!("{} of {} exam slot(s) visible.", n_visible, catalog.rows.len());
    Ok(())
}

#[instrument(skip(store, renderer, args))]
fn cmd_all(store: &mut DataStore, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command all");

    let category = parse_category_arg(args)?;
    let catalog = store.require_catalog()?;
    let mut selection = store.load_selection()?;

    let refresh = selection::toggle_category(&catalog, &mut selection, category);
    store.save_selection(&selection)?;

    renderer.print_summary(&refresh.summary)?;
    let n_visible = refresh.visible.iter().filter(|shown| **shown).count();
    println!("{} of {} exam slot(s) visible.", n_visible, catalog.rows.len());
    Ok(())
}

#[instrument(skip(store, renderer))]
fn cmd_categories(store: &mut DataStore, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command categories");

    let catalog = store.require_catalog()?;
    let selection = store.load_selection()?;

    for category in Category::ALL {
        let summary = selection::summarize_category(&catalog, &selection, category);
        renderer.print_summary(&summary)?;
    }
    Ok(())
}

#[instrument(skip(store, renderer, args))]
fn cmd_options(
    store: &mut DataStore,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command options");

    let category = parse_category_arg(args)?;
    let catalog = store.require_catalog()?;
    let selection = store.load_selection()?;

    renderer.print_options(&catalog, &selection, category)
}

#[instrument(skip(store, args))]
fn cmd_export(store: &mut DataStore, args: &[String]) -> anyhow::Result<()> {
    info!("command export");

    let catalog = store.require_catalog()?;
    let selection = store.load_selection()?;
    let visible = visibility::recompute_all(&catalog, &selection);
    let n_visible = visible.iter().filter(|shown| **shown).count();

    let document = export::export_visible(&catalog, &visible);
    let path = args
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(export::FILE_NAME));
    document.write_to(&path)?;

    println!("Wrote {} exam slot(s) to {}.", n_visible, path.display());
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for (key, value) in cfg.iter() {
        println!("{key}={value}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Implemented commands: import, list, toggle, all, categories, options, export, _show, help, version"
    );
    println!("Categories: predmeti, programi, letniki, roki, izvajalci, obdobja");
    Ok(())
}

fn parse_category_arg(args: &[String]) -> anyhow::Result<Category> {
    let token = args
        .first()
        .ok_or_else(|| anyhow!("a category is required (e.g. 'programi')"))?;
    Category::parse(token).ok_or_else(|| {
        anyhow!(
            "unknown category: {token} (expected one of predmeti, programi, letniki, roki, izvajalci, obdobja)"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::{expand_command_abbrev, known_command_names};

    #[test]
    fn command_prefixes_expand_when_unambiguous() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("exp", &known), Some("export"));
        assert_eq!(expand_command_abbrev("t", &known), Some("toggle"));
        assert_eq!(expand_command_abbrev("list", &known), Some("list"));
        // no command starts with "z"
        assert_eq!(expand_command_abbrev("z", &known), None);
    }
}
