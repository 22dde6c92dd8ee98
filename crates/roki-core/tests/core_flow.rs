use std::collections::HashMap;
use std::fs;

use roki_core::datastore::DataStore;
use roki_core::exam::Category;
use roki_core::export;
use roki_core::ics::{ImportOptions, build_catalog, load_calendar};
use roki_core::selection::{SelectionState, toggle_category, toggle_option};
use roki_core::visibility;
use tempfile::tempdir;

const SAMPLE: &str = "BEGIN:VCALENDAR\n\
PRODID:-//Google Inc//Google Calendar 70.9054//EN\n\
VERSION:2.0\n\
CALSCALE:GREGORIAN\n\
X-WR-CALNAME:Matematika 2022/23\n\
X-WR-TIMEZONE:Europe/Belgrade\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20230129\n\
UID:rok1@example.com\n\
SUMMARY:Analiza 1 (1Mate)\\, prvi letnik\\, Novak Ana\\, 1. rok\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20230630\n\
UID:rok2@example.com\n\
SUMMARY:Algebra 1 (1FiMa\\, 1Mate)\\, drugi letnik\\, Kos Bor\\, 2. rok\n\
END:VEVENT\n\
END:VCALENDAR\n";

#[test]
fn import_toggle_and_export_round_trip() {
    let temp = tempdir().expect("tempdir");
    let ics_path = temp.path().join("matematika.ics");
    fs::write(&ics_path, SAMPLE).expect("write sample calendar");

    let opts = ImportOptions::new(None, None).expect("import options");
    let calendar = load_calendar(&ics_path, &opts).expect("load calendar");
    let catalog =
        build_catalog(&[calendar], Vec::new(), &HashMap::new(), &opts).expect("build catalog");
    assert_eq!(catalog.rows.len(), 2);

    let store = DataStore::open(&temp.path().join("data")).expect("open datastore");
    store.replace_catalog(&catalog).expect("save catalog");
    let catalog = store.require_catalog().expect("reload catalog");
    let mut selection = store.load_selection().expect("load selection");

    // nothing is active yet, so nothing is visible
    let visible = visibility::recompute_all(&catalog, &selection);
    assert!(visible.iter().all(|shown| !*shown));

    // select everything everywhere: both rows appear
    for category in Category::ALL {
        let refresh = toggle_category(&catalog, &mut selection, category);
        assert_eq!(refresh.summary.state, SelectionState::AllSelected);
    }
    let visible = visibility::recompute_all(&catalog, &selection);
    assert_eq!(visible, vec![true, true]);

    // dropping one subject hides exactly its row
    let analiza = catalog
        .find_option(Category::Subject, "Analiza 1")
        .expect("subject option")
        .id;
    let refresh = toggle_option(&catalog, &mut selection, analiza).expect("toggle");
    assert_eq!(refresh.summary.state, SelectionState::PartiallySelected);
    assert_eq!(refresh.visible, vec![false, true]);

    store.save_selection(&selection).expect("save selection");
    let selection = store.load_selection().expect("reload selection");

    // the export contains only the visible row
    let visible = visibility::recompute_all(&catalog, &selection);
    let document = export::export_visible(&catalog, &visible);
    let content = document.content();
    assert!(content.starts_with("BEGIN:VCALENDAR\n"));
    assert!(content.ends_with("END:VCALENDAR\n"));
    assert!(content.contains("X-WR-CALNAME:Izpitni roki"));
    assert!(content.contains("Algebra 1"));
    assert!(!content.contains("Analiza 1"));

    let out_path = temp.path().join(export::FILE_NAME);
    document.write_to(&out_path).expect("write export");
    assert_eq!(fs::read_to_string(&out_path).expect("read export"), content);
}
