use tracing::trace;

use crate::exam::{Catalog, Category, CompositeKey, ExamSlot};
use crate::selection::SelectionStore;

/// Decides whether one row's composite key is satisfied by the current
/// selection. Every slot except the year slot needs at least one active
/// id; a program id only counts together with the year id at the same
/// position, because year activity is only meaningful next to its program.
/// Unknown ids and missing year partners count as inactive (fail closed);
/// a slot that genuinely lists no ids is vacuously satisfied.
pub fn should_show(key: &CompositeKey, selection: &SelectionStore) -> bool {
    for category in Category::ALL {
        if category == Category::Year {
            // years are checked alongside their programs
            continue;
        }

        let ids = key.slot(category);
        if ids.is_empty() {
            continue;
        }

        let satisfied = if category == Category::Program {
            let years = key.slot(Category::Year);
            ids.iter().enumerate().any(|(pos, id)| {
                selection.is_active(*id)
                    && years
                        .get(pos)
                        .map(|year| selection.is_active(*year))
                        .unwrap_or(false)
            })
        } else {
            ids.iter().any(|id| selection.is_active(*id))
        };

        if !satisfied {
            trace!(category = ?category, key = %key, "slot unsatisfied, hiding row");
            return false;
        }
    }

    true
}

/// Full visibility pass over every row. Rows are few (a course catalog),
/// so there is no dirty tracking; every mutation re-derives everything.
pub fn recompute_all(catalog: &Catalog, selection: &SelectionStore) -> Vec<bool> {
    catalog
        .rows
        .iter()
        .map(|row| should_show(&row.key(), selection))
        .collect()
}

pub fn visible_rows<'a>(catalog: &'a Catalog, visible: &[bool]) -> Vec<&'a ExamSlot> {
    catalog
        .rows
        .iter()
        .zip(visible)
        .filter(|(_, shown)| **shown)
        .map(|(row, _)| row)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::should_show;
    use crate::exam::{CompositeKey, OptionId};
    use crate::selection::SelectionStore;

    fn store(ids: &[u32]) -> SelectionStore {
        SelectionStore::from_ids(ids.iter().map(|id| OptionId(*id)))
    }

    fn worked_key() -> CompositeKey {
        CompositeKey::parse("38_6x122_7x45_20_39x40x24_2").expect("key")
    }

    #[test]
    fn every_slot_needs_an_active_id() {
        let key = worked_key();
        assert!(should_show(&key, &store(&[38, 6, 7, 20, 39, 2])));
        // subject missing
        assert!(!should_show(&key, &store(&[6, 7, 20, 39, 2])));
        // round missing
        assert!(!should_show(&key, &store(&[38, 6, 7, 39, 2])));
        // period missing
        assert!(!should_show(&key, &store(&[38, 6, 7, 20, 39])));
        // any of the listed instructors is enough
        assert!(should_show(&key, &store(&[38, 6, 7, 20, 24, 2])));
    }

    #[test]
    fn program_only_counts_with_its_paired_year() {
        let key = worked_key();
        // program 6 is active but its year 7 is not
        assert!(!should_show(&key, &store(&[38, 6, 45, 20, 39, 2])));
        // year 45 pairs with program 122, not with 6
        assert!(should_show(&key, &store(&[38, 122, 45, 20, 39, 2])));
        // the year slot is never an independent requirement
        assert!(should_show(&key, &store(&[38, 6, 7, 45, 20, 39, 2])));
    }

    #[test]
    fn missing_year_partner_fails_closed() {
        // three programs, only two years listed: the third program can
        // never satisfy the pair
        let key = CompositeKey::parse("1_2x3x4_5x6_7_8_9").expect("key");
        assert!(!should_show(&key, &store(&[1, 4, 5, 6, 7, 8, 9])));
        assert!(should_show(&key, &store(&[1, 3, 6, 7, 8, 9])));
    }

    #[test]
    fn explicitly_empty_slots_are_vacuous() {
        let key = CompositeKey::new([
            vec![OptionId(1)],
            Vec::new(),
            Vec::new(),
            vec![OptionId(7)],
            Vec::new(),
            Vec::new(),
        ]);
        assert!(should_show(&key, &store(&[1, 7])));
        assert!(!should_show(&key, &store(&[1])));
    }

    #[test]
    fn unknown_ids_simply_never_activate() {
        let key = worked_key();
        // 9999 is not a real option anywhere; activating it changes nothing
        assert!(!should_show(&key, &store(&[9999])));
    }
}
