use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::datetime::{self, ExamPeriod};

/// Slovene alphabet, in the order used for letter submenus.
pub const ALPHABET: &str = "ABCČDEFGHIJKLMNOPRSŠTUVZŽ";

/// Study years accepted in calendar summaries, in ascending order.
pub const YEAR_NAMES: [&str; 5] = ["prvi", "drugi", "tretji", "četrti", "peti"];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OptionId(pub u32);

impl std::fmt::Display for OptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OptionId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .parse::<u32>()
            .map_err(|_| anyhow!("invalid option id: {s}"))?;
        Ok(OptionId(raw))
    }
}

/// The six filter axes, in composite-key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Subject,
    Program,
    Year,
    Round,
    Instructor,
    Period,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Subject,
        Category::Program,
        Category::Year,
        Category::Round,
        Category::Instructor,
        Category::Period,
    ];

    pub fn index(self) -> usize {
        match self {
            Category::Subject => 0,
            Category::Program => 1,
            Category::Year => 2,
            Category::Round => 3,
            Category::Instructor => 4,
            Category::Period => 5,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Category::Subject => "Predmeti",
            Category::Program => "Programi",
            Category::Year => "Letniki",
            Category::Round => "Roki",
            Category::Instructor => "Izvajalci",
            Category::Period => "Obdobja",
        }
    }

    /// The form of "all" matching the category's grammatical gender,
    /// as used in the bulk-control labels ("Izberi vse" / "Izberi vsa").
    pub fn all_word(self) -> &'static str {
        match self {
            Category::Period => "vsa",
            _ => "vse",
        }
    }

    /// Subjects and instructors are long lists and get grouped under
    /// the initial letter of each name.
    pub fn grouped_by_letter(self) -> bool {
        matches!(self, Category::Subject | Category::Instructor)
    }

    pub fn parse(token: &str) -> Option<Category> {
        match token.to_lowercase().as_str() {
            "predmet" | "predmeti" => Some(Category::Subject),
            "program" | "programi" => Some(Category::Program),
            "letnik" | "letniki" => Some(Category::Year),
            "rok" | "roki" => Some(Category::Round),
            "izvajalec" | "izvajalci" => Some(Category::Instructor),
            "obdobje" | "obdobja" => Some(Category::Period),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetOption {
    pub id: OptionId,
    pub category: Category,
    /// Value as it appears in the source calendar (instructors surname-first).
    pub name: String,
    /// Human-facing form; differs from `name` only for instructors.
    pub display: String,
}

/// One program the exam belongs to, paired with the study year it has
/// there. The same course can sit in different years under different
/// programs, so the year is only meaningful next to its program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramYear {
    pub program: OptionId,
    pub year: OptionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSlot {
    pub date: NaiveDate,
    pub subject: OptionId,
    pub programs: Vec<ProgramYear>,
    pub round: OptionId,
    pub instructors: Vec<OptionId>,
    pub period: OptionId,
    /// Raw VEVENT lines joined with the `@@@@` separator, ready for export.
    pub ics_fragment: String,
}

impl ExamSlot {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new([
            vec![self.subject],
            self.programs.iter().map(|pair| pair.program).collect(),
            self.programs.iter().map(|pair| pair.year).collect(),
            vec![self.round],
            self.instructors.clone(),
            vec![self.period],
        ])
    }

    pub fn display_date(&self) -> String {
        datetime::format_long_date(self.date)
    }

    /// E.g. "1FiMa, 2PeMa (prvi letnik)".
    pub fn display_programs(&self, catalog: &Catalog) -> String {
        let names: Vec<&str> = self
            .programs
            .iter()
            .map(|pair| catalog.option_label(pair.program))
            .collect();
        let year = self
            .programs
            .first()
            .map(|pair| catalog.option_label(pair.year))
            .unwrap_or("?");
        format!("{} ({} letnik)", join_readable(&names), year)
    }

    /// E.g. "Matjaž Prisojnik, Martin Perko in Marija Pletna".
    pub fn display_instructors(&self, catalog: &Catalog) -> String {
        let names: Vec<&str> = self
            .instructors
            .iter()
            .map(|id| catalog.option_label(*id))
            .collect();
        join_readable(&names)
    }
}

/// Joins "A", "B", "C" into "A, B in C".
pub fn join_readable(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => (*only).to_string(),
        [head @ .., last] => format!("{} in {}", head.join(", "), last),
    }
}

/// The row identifier contract: six `_`-separated slots, each an
/// `x`-separated list of option ids, e.g. `38_6x122_7x45_20_39x40x24_2`.
/// The program and year slots are positionally parallel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeKey {
    slots: [Vec<OptionId>; 6],
}

impl CompositeKey {
    pub fn new(slots: [Vec<OptionId>; 6]) -> Self {
        Self { slots }
    }

    pub fn slot(&self, category: Category) -> &[OptionId] {
        &self.slots[category.index()]
    }

    /// Parses the external string form. An empty or non-numeric segment is
    /// malformed; callers are expected to treat a parse failure as "row
    /// stays hidden" rather than a fatal error.
    pub fn parse(raw: &str) -> anyhow::Result<CompositeKey> {
        let segments: Vec<&str> = raw.split('_').collect();
        if segments.len() != Category::ALL.len() {
            return Err(anyhow!(
                "composite key {raw} has {} slots, expected {}",
                segments.len(),
                Category::ALL.len()
            ));
        }

        let mut slots: [Vec<OptionId>; 6] = std::array::from_fn(|_| Vec::new());
        for (idx, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(anyhow!("composite key {raw} has an empty slot {idx}"));
            }
            for token in segment.split('x') {
                slots[idx].push(token.parse()?);
            }
        }

        Ok(CompositeKey { slots })
    }
}

impl std::fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self
            .slots
            .iter()
            .map(|slot| {
                slot.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("x")
            })
            .collect();
        write!(f, "{}", rendered.join("_"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub options: Vec<FacetOption>,
    pub rows: Vec<ExamSlot>,
    /// Calendar meta lines joined with `@@@@`, calendar name already
    /// rewritten to the generic export title.
    pub header: String,
    /// Configured exam periods, kept for display ordering.
    pub periods: Vec<ExamPeriod>,
}

impl Catalog {
    pub fn option(&self, id: OptionId) -> Option<&FacetOption> {
        self.options.iter().find(|option| option.id == id)
    }

    pub fn option_label(&self, id: OptionId) -> &str {
        self.option(id).map(|option| option.display.as_str()).unwrap_or("?")
    }

    /// Options of one category in display order: years by numeral, periods
    /// by range start (the outside-periods bucket last), everything else by
    /// Slovene collation of the source name.
    pub fn options_in(&self, category: Category) -> Vec<&FacetOption> {
        let mut out: Vec<&FacetOption> = self
            .options
            .iter()
            .filter(|option| option.category == category)
            .collect();
        match category {
            Category::Year => out.sort_by_key(|option| year_rank(&option.name)),
            Category::Period => out.sort_by_key(|option| self.period_rank(&option.name)),
            _ => out.sort_by_key(|option| collation_key(&option.name)),
        }
        out
    }

    /// Letter submenus for the grouped categories; ungrouped categories get
    /// their whole listing back under a single `None` group.
    pub fn letter_groups(&self, category: Category) -> Vec<(Option<char>, Vec<&FacetOption>)> {
        let sorted = self.options_in(category);
        if !category.grouped_by_letter() {
            return vec![(None, sorted)];
        }

        let mut groups: Vec<(Option<char>, Vec<&FacetOption>)> = Vec::new();
        for letter in ALPHABET.chars() {
            let members: Vec<&FacetOption> = sorted
                .iter()
                .copied()
                .filter(|option| initial_letter(&option.name) == Some(letter))
                .collect();
            if !members.is_empty() {
                groups.push((Some(letter), members));
            }
        }

        // names starting outside the alphabet still need a home
        let stray: Vec<&FacetOption> = sorted
            .iter()
            .copied()
            .filter(|option| {
                initial_letter(&option.name)
                    .map(|letter| !ALPHABET.contains(letter))
                    .unwrap_or(true)
            })
            .collect();
        if !stray.is_empty() {
            groups.push((None, stray));
        }

        groups
    }

    pub fn find_option(&self, category: Category, name: &str) -> Option<&FacetOption> {
        let wanted = name.to_lowercase();
        self.options.iter().find(|option| {
            option.category == category
                && (option.name.to_lowercase() == wanted
                    || option.display.to_lowercase() == wanted)
        })
    }

    /// Resolves a user token: either a bare option id or `category:name`,
    /// e.g. `predmet:Analiza 1`.
    pub fn resolve_token(&self, token: &str) -> anyhow::Result<OptionId> {
        if let Ok(id) = token.parse::<OptionId>() {
            return self
                .option(id)
                .map(|option| option.id)
                .ok_or_else(|| anyhow!("no option with id {id}"));
        }

        let (category_token, name) = token
            .split_once(':')
            .ok_or_else(|| anyhow!("expected an option id or category:name, got: {token}"))?;
        let category = Category::parse(category_token.trim())
            .ok_or_else(|| anyhow!("unknown category: {category_token}"))?;
        self.find_option(category, name.trim())
            .map(|option| option.id)
            .ok_or_else(|| {
                anyhow!(
                    "no option named {} in {}",
                    name.trim(),
                    category.display_name()
                )
            })
    }

    pub fn n_options_in(&self, category: Category) -> usize {
        self.options
            .iter()
            .filter(|option| option.category == category)
            .count()
    }

    fn period_rank(&self, name: &str) -> (usize, String) {
        let rank = self
            .periods
            .iter()
            .position(|period| period.name == name)
            .unwrap_or(self.periods.len());
        (rank, name.to_string())
    }
}

/// Sort key implementing Slovene lexicographic order over the extended
/// alphabet: the carons and đ sort right after their base letters.
pub fn collation_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        match ch {
            'č' => out.push_str("cc"),
            'ć' => out.push_str("ccc"),
            'đ' => out.push_str("dd"),
            'š' => out.push_str("ss"),
            'ž' => out.push_str("zz"),
            _ => out.push(ch),
        }
    }
    out
}

fn year_rank(name: &str) -> usize {
    YEAR_NAMES
        .iter()
        .position(|year| *year == name)
        .unwrap_or(YEAR_NAMES.len())
}

fn initial_letter(name: &str) -> Option<char> {
    name.chars().next().map(|ch| {
        let mut upper = ch.to_uppercase();
        upper.next().unwrap_or(ch)
    })
}

#[cfg(test)]
mod tests {
    use super::{Category, CompositeKey, OptionId, collation_key, join_readable};

    #[test]
    fn collation_orders_carons_after_base_letters() {
        let mut names = vec!["Šečđežeć", "Sosed", "Zima", "Žaga", "Cena", "Čas"];
        names.sort_by_key(|name| collation_key(name));
        // the doubled-letter scheme puts č-words between "cc" and "cd"
        assert_eq!(names, vec!["Čas", "Cena", "Sosed", "Šečđežeć", "Zima", "Žaga"]);
    }

    #[test]
    fn composite_key_round_trips_the_worked_example() {
        let raw = "38_6x122_7x45_20_39x40x24_2";
        let key = CompositeKey::parse(raw).expect("parse key");
        assert_eq!(key.slot(Category::Subject), &[OptionId(38)]);
        assert_eq!(key.slot(Category::Program), &[OptionId(6), OptionId(122)]);
        assert_eq!(key.slot(Category::Year), &[OptionId(7), OptionId(45)]);
        assert_eq!(
            key.slot(Category::Instructor),
            &[OptionId(39), OptionId(40), OptionId(24)]
        );
        assert_eq!(key.to_string(), raw);
    }

    #[test]
    fn composite_key_rejects_truncated_and_empty_slots() {
        assert!(CompositeKey::parse("38_6x122_7x45_20_39").is_err());
        assert!(CompositeKey::parse("38__7_20_39_2").is_err());
        assert!(CompositeKey::parse("38_6a_7_20_39_2").is_err());
    }

    #[test]
    fn readable_join_uses_in_before_the_last_name() {
        assert_eq!(join_readable(&["Ana"]), "Ana");
        assert_eq!(join_readable(&["Ana", "Beno", "Cene"]), "Ana, Beno in Cene");
    }
}
