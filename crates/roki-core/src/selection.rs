use std::collections::BTreeSet;

use anyhow::anyhow;
use tracing::debug;

use crate::exam::{Catalog, Category, OptionId};
use crate::visibility;

/// The set of active facet options. This is the only mutable state of the
/// whole system; everything else (group flags, category summaries, row
/// visibility) is derived from it and the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionStore {
    active: BTreeSet<OptionId>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I: IntoIterator<Item = OptionId>>(ids: I) -> Self {
        Self {
            active: ids.into_iter().collect(),
        }
    }

    pub fn is_active(&self, id: OptionId) -> bool {
        self.active.contains(&id)
    }

    /// Flips one option and returns its new state.
    pub fn toggle(&mut self, id: OptionId) -> bool {
        let now_active = if self.active.remove(&id) {
            false
        } else {
            self.active.insert(id);
            true
        };
        debug!(option = %id, active = now_active, "toggled option");
        now_active
    }

    /// Sets every option of one category to the same state.
    pub fn set_category(&mut self, catalog: &Catalog, category: Category, active: bool) {
        for option in catalog.options_in(category) {
            if active {
                self.active.insert(option.id);
            } else {
                self.active.remove(&option.id);
            }
        }
        debug!(category = ?category, active, "set whole category");
    }

    pub fn active_ids(&self) -> impl Iterator<Item = OptionId> + '_ {
        self.active.iter().copied()
    }

    pub fn n_active_in(&self, catalog: &Catalog, category: Category) -> usize {
        catalog
            .options_in(category)
            .iter()
            .filter(|option| self.is_active(option.id))
            .count()
    }
}

/// A letter group is shown active exactly when at least one of its member
/// options is active. One level only; groups do not nest.
pub fn group_is_active(
    catalog: &Catalog,
    store: &SelectionStore,
    category: Category,
    letter: char,
) -> bool {
    catalog
        .letter_groups(category)
        .iter()
        .filter(|(group_letter, _)| *group_letter == Some(letter))
        .any(|(_, members)| members.iter().any(|member| store.is_active(member.id)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    NoneSelected,
    PartiallySelected,
    AllSelected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryStyle {
    Secondary,
    Warning,
    Success,
}

/// What the bulk control for a category shows: its semantic state and the
/// label/style projection of that state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySummary {
    pub category: Category,
    pub state: SelectionState,
    pub n_active: usize,
    pub n_total: usize,
    pub label: String,
    pub style: SummaryStyle,
}

/// Pure function of the active/total counts; nothing else may influence
/// the control's label or style.
pub fn summarize(category: Category, n_active: usize, n_total: usize) -> CategorySummary {
    let (state, verb, style) = if n_active == 0 {
        (SelectionState::NoneSelected, "Izberi", SummaryStyle::Secondary)
    } else if n_active == n_total {
        (SelectionState::AllSelected, "Odstrani", SummaryStyle::Success)
    } else {
        (
            SelectionState::PartiallySelected,
            "Odstrani",
            SummaryStyle::Warning,
        )
    };

    CategorySummary {
        category,
        state,
        n_active,
        n_total,
        label: format!("{verb} {}", category.all_word()),
        style,
    }
}

pub fn summarize_category(
    catalog: &Catalog,
    store: &SelectionStore,
    category: Category,
) -> CategorySummary {
    summarize(
        category,
        store.n_active_in(catalog, category),
        catalog.n_options_in(category),
    )
}

/// Result of one interaction turn: the refreshed summary of the touched
/// category and the re-derived visibility of every row.
#[derive(Debug, Clone)]
pub struct Refresh {
    pub summary: CategorySummary,
    pub visible: Vec<bool>,
}

/// One option toggle: mutate, then re-derive the category summary and all
/// row visibility, in that order. Group activity is derived on read, so
/// flipping the option is all the group bookkeeping there is.
pub fn toggle_option(
    catalog: &Catalog,
    store: &mut SelectionStore,
    id: OptionId,
) -> anyhow::Result<Refresh> {
    let category = catalog
        .option(id)
        .map(|option| option.category)
        .ok_or_else(|| anyhow!("no option with id {id}"))?;
    store.toggle(id);

    Ok(Refresh {
        summary: summarize_category(catalog, store, category),
        visible: visibility::recompute_all(catalog, store),
    })
}

/// The category-level bulk control: with everything already selected it
/// clears the category, in every other state it selects everything.
pub fn toggle_category(
    catalog: &Catalog,
    store: &mut SelectionStore,
    category: Category,
) -> Refresh {
    let before = summarize_category(catalog, store, category);
    let select_all = before.state != SelectionState::AllSelected;
    store.set_category(catalog, category, select_all);

    Refresh {
        summary: summarize_category(catalog, store, category),
        visible: visibility::recompute_all(catalog, store),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::{
        SelectionState, SelectionStore, SummaryStyle, group_is_active, summarize,
        toggle_category, toggle_option,
    };
    use crate::exam::{Catalog, Category, OptionId};
    use crate::ics::{ImportOptions, build_catalog, load_calendar};

    fn sample_catalog() -> Catalog {
        let sample = "BEGIN:VCALENDAR\n\
PRODID:-//Google Inc//Google Calendar 70.9054//EN\n\
VERSION:2.0\n\
X-WR-CALNAME:Matematika 2022/23\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20220629\n\
SUMMARY:Analiza 1 (1Mate)\\, prvi letnik\\, Novak Ana\\, 1. rok\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20220701\n\
SUMMARY:Algebra 1 (1FiMa\\, 1Mate)\\, drugi letnik\\, Kos Bor\\, 2. rok\n\
END:VEVENT\n\
END:VCALENDAR\n";
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(sample.as_bytes()).expect("write sample");
        let opts = ImportOptions::new(None, None).expect("options");
        let calendar = load_calendar(file.path(), &opts).expect("load");
        build_catalog(&[calendar], Vec::new(), &HashMap::new(), &opts).expect("catalog")
    }

    #[test]
    fn summary_is_a_pure_three_state_projection() {
        let none = summarize(Category::Program, 0, 2);
        assert_eq!(none.state, SelectionState::NoneSelected);
        assert_eq!(none.label, "Izberi vse");
        assert_eq!(none.style, SummaryStyle::Secondary);

        let partial = summarize(Category::Program, 1, 2);
        assert_eq!(partial.state, SelectionState::PartiallySelected);
        assert_eq!(partial.label, "Odstrani vse");
        assert_eq!(partial.style, SummaryStyle::Warning);

        let all = summarize(Category::Program, 2, 2);
        assert_eq!(all.state, SelectionState::AllSelected);
        assert_eq!(all.label, "Odstrani vse");
        assert_eq!(all.style, SummaryStyle::Success);

        // same counts, same triple, regardless of history
        assert_eq!(summarize(Category::Program, 1, 2), partial);
        // the period category takes the neuter-plural variant
        assert_eq!(summarize(Category::Period, 0, 3).label, "Izberi vsa");
    }

    #[test]
    fn toggling_twice_restores_everything() {
        let catalog = sample_catalog();
        let mut store = SelectionStore::new();
        store.set_category(&catalog, Category::Subject, true);

        let before_store = store.clone();
        let before_visible = crate::visibility::recompute_all(&catalog, &store);

        let subject = catalog
            .find_option(Category::Subject, "Analiza 1")
            .expect("option")
            .id;
        toggle_option(&catalog, &mut store, subject).expect("toggle");
        assert_ne!(store, before_store);
        toggle_option(&catalog, &mut store, subject).expect("toggle back");

        assert_eq!(store, before_store);
        assert_eq!(
            crate::visibility::recompute_all(&catalog, &store),
            before_visible
        );
        assert!(group_is_active(&catalog, &store, Category::Subject, 'A'));
    }

    #[test]
    fn bulk_toggle_cycles_between_all_and_none() {
        let catalog = sample_catalog();
        let mut store = SelectionStore::new();

        let refresh = toggle_category(&catalog, &mut store, Category::Program);
        assert_eq!(refresh.summary.state, SelectionState::AllSelected);
        assert_eq!(refresh.summary.label, "Odstrani vse");
        assert_eq!(refresh.summary.n_active, refresh.summary.n_total);

        let refresh = toggle_category(&catalog, &mut store, Category::Program);
        assert_eq!(refresh.summary.state, SelectionState::NoneSelected);
        assert_eq!(refresh.summary.label, "Izberi vse");
        assert_eq!(refresh.summary.n_active, 0);
    }

    #[test]
    fn partial_selection_bulk_toggles_to_all() {
        let catalog = sample_catalog();
        let mut store = SelectionStore::new();
        let program = catalog
            .find_option(Category::Program, "1Mate")
            .expect("option")
            .id;
        store.toggle(program);

        let refresh = toggle_category(&catalog, &mut store, Category::Program);
        assert_eq!(refresh.summary.state, SelectionState::AllSelected);
    }

    #[test]
    fn group_activity_follows_its_members() {
        let catalog = sample_catalog();
        let mut store = SelectionStore::new();
        assert!(!group_is_active(&catalog, &store, Category::Subject, 'A'));

        let subject = catalog
            .find_option(Category::Subject, "Algebra 1")
            .expect("option")
            .id;
        store.toggle(subject);
        assert!(group_is_active(&catalog, &store, Category::Subject, 'A'));
        assert!(!group_is_active(&catalog, &store, Category::Subject, 'B'));

        store.toggle(subject);
        assert!(!group_is_active(&catalog, &store, Category::Subject, 'A'));
    }

    #[test]
    fn unknown_option_is_an_error_not_a_panic() {
        let catalog = sample_catalog();
        let mut store = SelectionStore::new();
        assert!(toggle_option(&catalog, &mut store, OptionId(9999)).is_err());
    }
}
