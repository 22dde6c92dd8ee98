use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::datetime::{self, ExamPeriod};
use crate::exam::{
    Catalog, Category, ExamSlot, FacetOption, OptionId, ProgramYear, YEAR_NAMES, collation_key,
};

/// SUMMARY fields look like
/// `Uvod v programiranje (1Mate\, 2PeMa\, ni smeri)\, prvi letnik\, Prisojnik Matjaž\, 3. rok`.
pub const DEFAULT_SUMMARY_PATTERN: &str = r"^(?P<predmet>[^(]+)\((?P<smeri>[^)]+)\)\\, ?(?P<letnik>[^ ]+) letnik\\, ?(?P<izvajalci>([^\\]+\\, ?)+)(?P<rok>\d+\.) rok ?$";

pub const DEFAULT_DATE_FORMAT: &str = "%Y%m%d";

/// Exported calendars all carry this generic name instead of the name of
/// whichever source calendar happened to supply the header.
pub const EXPORT_CALENDAR_NAME: &str = "Izpitni roki";

/// Joins the lines of an ICS payload into a single attribute-safe string.
pub const FIELD_SEPARATOR: &str = "@@@@";

/// Placeholder some calendars use for "no program"; dropped everywhere.
const NO_PROGRAM: &str = "ni smeri";

const KEYWORDS: [&str; 18] = [
    // event properties
    "DTSTART;VALUE=DATE",
    "DTEND;VALUE=DATE",
    "DTSTAMP",
    "UID",
    "CREATED",
    "DESCRIPTION",
    "LAST-MODIFIED",
    "LOCATION",
    "SEQUENCE",
    "STATUS",
    "SUMMARY",
    "TRANSP",
    // calendar properties
    "PRODID",
    "VERSION",
    "CALSCALE",
    "METHOD",
    "X-WR-CALNAME",
    "X-WR-TIMEZONE",
];

const DATE_KEY: &str = "DTSTART;VALUE=DATE";
const SUMMARY_KEY: &str = "SUMMARY";
const CALENDAR_NAME_KEY: &str = "X-WR-CALNAME";

#[derive(Debug)]
pub struct ImportOptions {
    summary: Regex,
    date_format: String,
    scrub: Regex,
    calendar_name: Regex,
}

impl ImportOptions {
    pub fn new(
        summary_pattern: Option<&str>,
        date_format: Option<&str>,
    ) -> anyhow::Result<Self> {
        let pattern = summary_pattern.unwrap_or(DEFAULT_SUMMARY_PATTERN);
        let summary = Regex::new(pattern)
            .with_context(|| format!("invalid summary pattern: {pattern}"))?;
        for group in ["predmet", "smeri", "letnik", "izvajalci", "rok"] {
            if !summary.capture_names().flatten().any(|name| name == group) {
                return Err(anyhow!("summary pattern is missing the {group} group"));
            }
        }

        Ok(Self {
            summary,
            date_format: date_format.unwrap_or(DEFAULT_DATE_FORMAT).to_string(),
            scrub: Regex::new(r"(\\, ?)?ni smeri").context("scrub pattern")?,
            calendar_name: Regex::new(r"X-WR-CALNAME:.+(\n)?( .+(\n)?)*")
                .context("calendar name pattern")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub date: NaiveDate,
    pub subject: String,
    pub programs: Vec<String>,
    pub year: String,
    pub round: String,
    pub instructors: Vec<String>,
    /// `BEGIN:VEVENT..END:VEVENT` joined with `@@@@`, placeholder scrubbed.
    pub fragment: String,
}

#[derive(Debug, Clone)]
pub struct ParsedCalendar {
    pub name: String,
    pub header_lines: Vec<String>,
    pub events: Vec<ParsedEvent>,
}

/// Reads one exported calendar file. The expected shape is a single
/// VCALENDAR whose meta lines surround a run of VEVENT blocks; property
/// lines longer than the fold width continue on lines starting with a
/// space.
#[instrument(skip(path, opts))]
pub fn load_calendar(path: &Path, opts: &ImportOptions) -> anyhow::Result<ParsedCalendar> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut in_calendar = false;
    let mut in_event = false;
    let mut calendar_lines: Vec<String> = Vec::new();
    let mut event_lines: Vec<String> = Vec::new();
    let mut events: Vec<ParsedEvent> = Vec::new();
    let mut calendar: Option<ParsedCalendar> = None;
    let mut n_events = 0_usize;

    for line in text.lines() {
        if line.starts_with("BEGIN:VEVENT") {
            in_event = true;
            n_events += 1;
        } else if line.starts_with("END:VEVENT") {
            let event = parse_event(&event_lines, opts).with_context(|| {
                format!("failed parsing event {} of {}", events.len() + 1, path.display())
            })?;
            events.push(event);
            event_lines.clear();
            in_event = false;
        } else if line.starts_with("BEGIN:VCALENDAR") {
            in_calendar = true;
        } else if line.starts_with("END:VCALENDAR") {
            calendar = Some(parse_calendar_meta(&calendar_lines, std::mem::take(&mut events))?);
            in_calendar = false;
        } else if in_event {
            event_lines.push(line.to_string());
        } else if in_calendar {
            calendar_lines.push(line.to_string());
        }
    }

    let calendar = calendar
        .ok_or_else(|| anyhow!("no calendar was found in {}", path.display()))?;
    if calendar.events.len() != n_events {
        return Err(anyhow!(
            "parsed {} events but {} declares {}",
            calendar.events.len(),
            path.display(),
            n_events
        ));
    }

    info!(
        calendar = %calendar.name,
        events = calendar.events.len(),
        file = %path.display(),
        "loaded calendar"
    );
    Ok(calendar)
}

/// Unfolds the lines of one block and pulls out the required property
/// values. Unknown `KEY:value` lines are skipped with a warning; a line
/// that neither starts a known property, looks like an unknown one, nor
/// continues the previous line is an error.
fn extract_values(
    lines: &[String],
    required: &[&str],
) -> anyhow::Result<HashMap<String, String>> {
    let mut values: HashMap<String, String> = HashMap::new();
    let mut last = String::new();

    for line in lines {
        if let Some(keyword) = KEYWORDS.iter().find(|keyword| line.starts_with(*keyword)) {
            last = (*keyword).to_string();
            let value = line.get(keyword.len() + 1..).unwrap_or("");
            values.insert(last.clone(), value.to_string());
        } else if is_unknown_property(line) {
            warn!(line = %line, "unknown property, skipping");
            last.clear();
        } else if !last.is_empty() {
            let rest = line
                .strip_prefix(' ')
                .ok_or_else(|| anyhow!("expected a folded continuation line, got: {line}"))?;
            if let Some(value) = values.get_mut(&last) {
                value.push_str(rest);
            }
        }
    }

    for key in required {
        if !values.contains_key(*key) {
            return Err(anyhow!("required property {key} is missing"));
        }
    }
    Ok(values)
}

fn is_unknown_property(line: &str) -> bool {
    let Some((name, value)) = line.split_once(':') else {
        return false;
    };
    !name.is_empty()
        && !value.is_empty()
        && name.chars().all(|ch| ch.is_ascii_uppercase() || ch == '-' || ch == ';' || ch == '=')
}

fn parse_event(lines: &[String], opts: &ImportOptions) -> anyhow::Result<ParsedEvent> {
    let values = extract_values(lines, &[DATE_KEY, SUMMARY_KEY])?;
    let date = NaiveDate::parse_from_str(&values[DATE_KEY], &opts.date_format)
        .with_context(|| format!("invalid event date: {}", values[DATE_KEY]))?;

    let summary = &values[SUMMARY_KEY];
    let captures = opts.summary.captures(summary).ok_or_else(|| {
        anyhow!(
            "summary '{summary}' does not match the expected pattern {}",
            opts.summary.as_str()
        )
    })?;

    let group = |name: &str| {
        captures
            .name(name)
            .map(|found| found.as_str())
            .unwrap_or("")
    };
    let subject = group("predmet").trim().to_string();
    let programs = split_parts(group("smeri"), Some(NO_PROGRAM));
    let year = group("letnik").trim().to_string();
    let instructors = split_parts(group("izvajalci"), None);
    let round = group("rok").trim().to_string();

    if subject.is_empty() || programs.is_empty() || instructors.is_empty() || round.is_empty() {
        return Err(anyhow!("summary '{summary}' leaves a facet empty"));
    }
    if !YEAR_NAMES.contains(&year.as_str()) {
        return Err(anyhow!(
            "invalid study year '{year}', allowed: {}",
            YEAR_NAMES.join(", ")
        ));
    }

    let raw = format!("BEGIN:VEVENT\n{}\nEND:VEVENT", lines.join("\n"));
    let fragment = opts
        .scrub
        .replace_all(&raw.replace('\n', FIELD_SEPARATOR), "")
        .into_owned();

    debug!(subject = %subject, date = %date, "parsed event");
    Ok(ParsedEvent {
        date,
        subject,
        programs,
        year,
        round,
        instructors,
        fragment,
    })
}

fn parse_calendar_meta(
    lines: &[String],
    events: Vec<ParsedEvent>,
) -> anyhow::Result<ParsedCalendar> {
    let values = extract_values(lines, &[CALENDAR_NAME_KEY])?;
    Ok(ParsedCalendar {
        name: values[CALENDAR_NAME_KEY].clone(),
        header_lines: lines.to_vec(),
        events,
    })
}

/// Splits a `\,`-separated SUMMARY segment into trimmed parts, dropping
/// empty parts and the optional forbidden placeholder.
fn split_parts(raw: &str, forbidden: Option<&str>) -> Vec<String> {
    raw.split("\\,")
        .map(str::trim)
        .filter(|part| !part.is_empty() && Some(*part) != forbidden)
        .map(ToString::to_string)
        .collect()
}

/// Builds the facet catalog out of the parsed calendars: interns every
/// distinct facet value into a small sequential id (first-seen order),
/// pairs each program with the event's study year, assigns exam periods,
/// and prepares the shared export header from the first calendar.
#[instrument(skip(calendars, periods, name_overrides))]
pub fn build_catalog(
    calendars: &[ParsedCalendar],
    periods: Vec<ExamPeriod>,
    name_overrides: &HashMap<String, String>,
    opts: &ImportOptions,
) -> anyhow::Result<Catalog> {
    let first = calendars
        .first()
        .ok_or_else(|| anyhow!("nothing was imported"))?;

    let mut interner = Interner::new(name_overrides);
    let mut rows: Vec<ExamSlot> = Vec::new();

    for calendar in calendars {
        for event in &calendar.events {
            let year = interner.intern(Category::Year, &event.year);
            let programs: Vec<ProgramYear> = event
                .programs
                .iter()
                .map(|program| ProgramYear {
                    program: interner.intern(Category::Program, program),
                    year,
                })
                .collect();
            let period_name = datetime::assign_period(event.date, &periods);

            rows.push(ExamSlot {
                date: event.date,
                subject: interner.intern(Category::Subject, &event.subject),
                programs,
                round: interner.intern(Category::Round, &event.round),
                instructors: event
                    .instructors
                    .iter()
                    .map(|name| interner.intern(Category::Instructor, name))
                    .collect(),
                period: interner.intern(Category::Period, &period_name),
                ics_fragment: event.fragment.clone(),
            });
        }
    }

    let names: HashMap<OptionId, String> = interner
        .options
        .iter()
        .map(|option| (option.id, option.name.clone()))
        .collect();
    rows.sort_by_key(|row| {
        (
            row.date,
            names.get(&row.subject).map(|name| collation_key(name)),
            names.get(&row.round).cloned(),
        )
    });

    let header = export_header(&first.header_lines, opts);
    info!(
        options = interner.options.len(),
        rows = rows.len(),
        "built catalog"
    );

    Ok(Catalog {
        options: interner.options,
        rows,
        header,
        periods,
    })
}

/// The shared document header: the first calendar's meta lines with its
/// name swapped for the generic export name, joined with `@@@@`.
fn export_header(lines: &[String], opts: &ImportOptions) -> String {
    let joined = lines.join("\n");
    let renamed = opts.calendar_name.replace(
        &joined,
        format!("{CALENDAR_NAME_KEY}:{EXPORT_CALENDAR_NAME}\n"),
    );
    renamed.trim_end().replace('\n', FIELD_SEPARATOR)
}

struct Interner<'a> {
    next: u32,
    ids: HashMap<(Category, String), OptionId>,
    options: Vec<FacetOption>,
    overrides: &'a HashMap<String, String>,
    warned: HashSet<String>,
}

impl<'a> Interner<'a> {
    fn new(overrides: &'a HashMap<String, String>) -> Self {
        Self {
            next: 0,
            ids: HashMap::new(),
            options: Vec::new(),
            overrides,
            warned: HashSet::new(),
        }
    }

    fn intern(&mut self, category: Category, name: &str) -> OptionId {
        if let Some(id) = self.ids.get(&(category, name.to_string())) {
            return *id;
        }

        self.next += 1;
        let id = OptionId(self.next);
        let display = if category == Category::Instructor {
            self.instructor_display(name)
        } else {
            name.to_string()
        };
        self.ids.insert((category, name.to_string()), id);
        self.options.push(FacetOption {
            id,
            category,
            name: name.to_string(),
            display,
        });
        id
    }

    /// Source calendars list instructors surname-first; the display form
    /// moves the last word to the front. Names with more than two words
    /// are ambiguous and come from the overrides table when present.
    fn instructor_display(&mut self, name: &str) -> String {
        let words: Vec<&str> = name.split_whitespace().collect();
        let Some((last, rest)) = words.split_last() else {
            return name.to_string();
        };
        if rest.is_empty() {
            return name.to_string();
        }

        let mut flipped = vec![*last];
        flipped.extend_from_slice(rest);
        let guess = flipped.join(" ");

        if words.len() > 2 {
            if let Some(fixed) = self.overrides.get(name) {
                return fixed.clone();
            }
            if self.warned.insert(name.to_string()) {
                warn!(
                    name = %name,
                    guess = %guess,
                    "instructor name has more than two words; add a names-file entry if the guess is wrong"
                );
            }
        }
        guess
    }
}
