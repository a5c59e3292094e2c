use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use calamine::{open_workbook_auto, Data, DataType, Reader};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::{error::LoadError, models::TagShare};

pub const TOP_TAGS_LIMIT: usize = 20;

const DATE_COLUMN: &str = "Date";
const TAGS_COLUMN: &str = "Tags";

const DATE_TEXT_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_TEXT_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// One row of the source table. The year is derived from the `Date`
/// column at load time; rows with an unparseable date keep `year = None`
/// and only participate in unfiltered aggregations.
#[derive(Debug, Clone)]
pub struct Record {
    pub year: Option<i32>,
    pub tags: Option<String>,
}

impl Record {
    pub fn new(date: Option<NaiveDate>, tags: Option<String>) -> Self {
        Self {
            year: date.map(|d| d.year()),
            tags,
        }
    }

    /// Trimmed, non-empty comma-separated pieces of the tags field.
    fn tag_pieces(&self) -> impl Iterator<Item = &str> {
        self.tags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearFilter {
    All,
    Year(i32),
}

/// Immutable in-memory table plus the indexes precomputed at load time.
/// Built once at startup and shared read-only across requests.
#[derive(Debug, Default)]
pub struct Dataset {
    records: Vec<Record>,
    tag_index: Vec<String>,
    years: Vec<i32>,
}

impl Dataset {
    /// Read the spreadsheet at `path`, falling back to an empty dataset
    /// on any load error. Queries over the empty dataset return empty
    /// results rather than failing.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(dataset) => {
                info!(
                    path = %path.display(),
                    records = dataset.records.len(),
                    tags = dataset.tag_index.len(),
                    "Loaded dataset"
                );
                dataset
            }
            Err(err) => {
                warn!(path = %path.display(), "Falling back to empty dataset: {err}");
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        let records = match extension.as_str() {
            "xlsx" | "xlsm" | "xls" => load_spreadsheet(path)?,
            "csv" => load_csv(path)?,
            _ => return Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        };

        Ok(Self::from_records(records))
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        let mut tag_set = BTreeSet::new();
        let mut year_set = BTreeSet::new();
        for record in &records {
            for piece in record.tag_pieces() {
                tag_set.insert(piece.to_string());
            }
            if let Some(year) = record.year {
                year_set.insert(year);
            }
        }

        Self {
            records,
            tag_index: tag_set.into_iter().collect(),
            years: year_set.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted, deduplicated tags across all records.
    pub fn tags(&self) -> &[String] {
        &self.tag_index
    }

    /// Sorted, deduplicated years across all records with a parseable date.
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    /// Per-year occurrence counts for each requested tag, in request
    /// order. A tag is counted when it appears in a record's tags field
    /// as a whole token, case-insensitively; the requested text is
    /// matched literally, never as a pattern. Unknown tags map to an
    /// empty per-year table.
    pub fn tag_frequencies(&self, requested: &[String]) -> IndexMap<String, BTreeMap<i32, u64>> {
        let mut result = IndexMap::with_capacity(requested.len());
        for tag in requested {
            let mut per_year: BTreeMap<i32, u64> = BTreeMap::new();
            for record in &self.records {
                let Some(year) = record.year else { continue };
                let Some(field) = record.tags.as_deref() else { continue };
                if contains_whole_tag(field, tag) {
                    *per_year.entry(year).or_insert(0) += 1;
                }
            }
            result.insert(tag.clone(), per_year);
        }
        result
    }

    /// The most frequent tags, optionally restricted to one year.
    /// Returns at most [`TOP_TAGS_LIMIT`] entries sorted by descending
    /// count; ties keep first-encountered order. Each percentage is
    /// relative to the sum of the returned counts, not the full tag
    /// universe.
    pub fn top_tags(&self, filter: YearFilter) -> Vec<TagShare> {
        let mut counts: IndexMap<&str, u64> = IndexMap::new();
        for record in &self.records {
            if let YearFilter::Year(year) = filter {
                if record.year != Some(year) {
                    continue;
                }
            }
            for piece in record.tag_pieces() {
                *counts.entry(piece).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(TOP_TAGS_LIMIT);

        let total: u64 = ranked.iter().map(|(_, count)| *count).sum();
        ranked
            .into_iter()
            .map(|(tag, count)| TagShare {
                tag: tag.to_string(),
                count,
                percentage: if total == 0 {
                    0.0
                } else {
                    round2(count as f64 / total as f64 * 100.0)
                },
            })
            .collect()
    }
}

fn load_spreadsheet(path: &Path) -> Result<Vec<Record>, LoadError> {
    let mut workbook = open_workbook_auto(path).map_err(|err| match err {
        calamine::Error::Io(source) => LoadError::Open {
            path: path.to_path_buf(),
            source,
        },
        other => LoadError::Sheet(other.to_string()),
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoadError::Sheet("workbook contains no worksheets".to_string()))?
        .map_err(|err| LoadError::Sheet(err.to_string()))?;

    let mut rows = range.rows();
    let header = rows.next().ok_or(LoadError::MissingColumn(DATE_COLUMN))?;
    let date_col = find_cell_column(header, DATE_COLUMN)?;
    let tags_col = find_cell_column(header, TAGS_COLUMN)?;

    Ok(rows
        .map(|row| {
            let date = row.get(date_col).and_then(parse_date_cell);
            let tags = row.get(tags_col).and_then(parse_tags_cell);
            Record::new(date, tags)
        })
        .collect())
}

fn load_csv(path: &Path) -> Result<Vec<Record>, LoadError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let date_col = find_text_column(&headers, DATE_COLUMN)?;
    let tags_col = find_text_column(&headers, TAGS_COLUMN)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let date = row.get(date_col).and_then(parse_date_text);
        let tags = row.get(tags_col).and_then(|raw| {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });
        records.push(Record::new(date, tags));
    }
    Ok(records)
}

fn find_cell_column(header: &[Data], name: &'static str) -> Result<usize, LoadError> {
    header
        .iter()
        .position(|cell| cell.to_string().trim() == name)
        .ok_or(LoadError::MissingColumn(name))
}

fn find_text_column(headers: &csv::StringRecord, name: &'static str) -> Result<usize, LoadError> {
    headers
        .iter()
        .position(|header| header.trim() == name)
        .ok_or(LoadError::MissingColumn(name))
}

fn parse_date_cell(cell: &Data) -> Option<NaiveDate> {
    if let Some(date) = cell.as_date() {
        return Some(date);
    }
    if let Some(datetime) = cell.as_datetime() {
        return Some(datetime.date());
    }
    match cell {
        Data::String(raw) | Data::DateTimeIso(raw) => parse_date_text(raw),
        _ => None,
    }
}

fn parse_tags_cell(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty => return None,
        Data::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DATE_TEXT_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    for format in DATETIME_TEXT_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.date());
        }
    }
    None
}

/// Case-insensitive whole-token search of `needle` inside `haystack`.
/// Literal text comparison with boundary checks on both sides, so tags
/// containing pattern metacharacters ("C++", "AI (general)") match
/// exactly and never panic. Blank needles match nothing.
fn contains_whole_tag(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }

    let haystack_lower = haystack.to_lowercase();
    let needle_lower = needle.to_lowercase();

    let mut start = 0;
    while let Some(found) = haystack_lower[start..].find(&needle_lower) {
        let begin = start + found;
        let end = begin + needle_lower.len();
        let open = haystack_lower[..begin]
            .chars()
            .next_back()
            .is_none_or(|c| !is_word_char(c));
        let close = haystack_lower[end..]
            .chars()
            .next()
            .is_none_or(|c| !is_word_char(c));
        if open && close {
            return true;
        }
        start = begin
            + haystack_lower[begin..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }
    false
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{contains_whole_tag, Dataset, Record, YearFilter, TOP_TAGS_LIMIT};
    use crate::error::LoadError;

    fn record(date: &str, tags: &str) -> Record {
        let date = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok();
        let tags = (!tags.is_empty()).then(|| tags.to_string());
        Record::new(date, tags)
    }

    fn sample() -> Dataset {
        Dataset::from_records(vec![
            record("2020-01-01", "AI, Robotics"),
            record("2020-06-01", "AI"),
            record("2021-01-01", "Robotics"),
        ])
    }

    fn write_fixture(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "tag-trends-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    #[test]
    fn tag_index_is_sorted_and_deduplicated() {
        let dataset = Dataset::from_records(vec![
            record("2020-01-01", "Robotics, AI"),
            record("2020-06-01", "AI,  Robotics "),
        ]);
        assert_eq!(dataset.tags(), &["AI".to_string(), "Robotics".to_string()]);
    }

    #[test]
    fn years_are_sorted_ascending() {
        let dataset = Dataset::from_records(vec![
            record("2021-01-01", "A"),
            record("2019-03-05", "B"),
            record("2021-12-31", "C"),
        ]);
        assert_eq!(dataset.years(), &[2019, 2021]);
    }

    #[test]
    fn whole_tag_matching_is_case_insensitive_and_bounded() {
        assert!(contains_whole_tag("AI, Healthcare", "ai"));
        assert!(contains_whole_tag("healthcare, AI", "Healthcare"));
        assert!(!contains_whole_tag("AI, Healthcare", "A"));
        assert!(!contains_whole_tag("SAIL", "AI"));
        assert!(!contains_whole_tag("AI, Healthcare", ""));
        assert!(!contains_whole_tag("AI, Healthcare", "   "));
    }

    #[test]
    fn metacharacters_in_requested_tags_are_literal() {
        assert!(contains_whole_tag("C++, AI (general)", "c++"));
        assert!(contains_whole_tag("C++, AI (general)", "ai (general)"));
        assert!(!contains_whole_tag("C++, AI (general)", ".*"));
        assert!(!contains_whole_tag("CA++B", "c++"));
    }

    #[test]
    fn frequencies_group_matches_by_year() {
        let result = sample().tag_frequencies(&["ai".to_string(), "Robotics".to_string()]);
        assert_eq!(result["ai"].get(&2020), Some(&2));
        assert_eq!(result["ai"].get(&2021), None);
        assert_eq!(result["Robotics"].get(&2020), Some(&1));
        assert_eq!(result["Robotics"].get(&2021), Some(&1));
    }

    #[test]
    fn frequencies_for_absent_tag_are_empty_not_an_error() {
        let result = sample().tag_frequencies(&["Quantum".to_string()]);
        assert!(result["Quantum"].is_empty());
    }

    #[test]
    fn frequencies_preserve_request_order() {
        let result = sample().tag_frequencies(&["Robotics".to_string(), "AI".to_string()]);
        let keys: Vec<&String> = result.keys().collect();
        assert_eq!(keys, ["Robotics", "AI"]);
    }

    #[test]
    fn records_without_a_year_are_skipped_in_frequencies() {
        let dataset = Dataset::from_records(vec![
            record("2020-01-01", "AI"),
            record("", "AI"),
        ]);
        let result = dataset.tag_frequencies(&["AI".to_string()]);
        assert_eq!(result["AI"].len(), 1);
        assert_eq!(result["AI"].get(&2020), Some(&1));
    }

    #[test]
    fn top_tags_splits_counts_and_shares_evenly() {
        let top = sample().top_tags(YearFilter::All);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].tag, "AI");
        assert_eq!(top[0].count, 2);
        assert_eq!(top[0].percentage, 50.0);
        assert_eq!(top[1].tag, "Robotics");
        assert_eq!(top[1].count, 2);
        assert_eq!(top[1].percentage, 50.0);
    }

    #[test]
    fn top_tags_filters_by_year() {
        let top = sample().top_tags(YearFilter::Year(2020));
        assert_eq!(top[0].tag, "AI");
        assert_eq!(top[0].count, 2);
        assert_eq!(top[0].percentage, 66.67);
        assert_eq!(top[1].tag, "Robotics");
        assert_eq!(top[1].count, 1);
        assert_eq!(top[1].percentage, 33.33);
    }

    #[test]
    fn top_tags_for_unknown_year_is_empty() {
        assert!(sample().top_tags(YearFilter::Year(1999)).is_empty());
    }

    #[test]
    fn top_tags_includes_undated_records_only_without_a_filter() {
        let dataset = Dataset::from_records(vec![
            record("2020-01-01", "AI"),
            record("", "Solo"),
        ]);
        let top = dataset.top_tags(YearFilter::All);
        let all: Vec<&str> = top.iter().map(|s| s.tag.as_str()).collect();
        assert!(all.contains(&"Solo"));
        let filtered = dataset.top_tags(YearFilter::Year(2020));
        assert!(filtered.iter().all(|s| s.tag != "Solo"));
    }

    #[test]
    fn top_tags_truncates_to_the_limit() {
        let records = (0..30)
            .map(|n| record("2020-01-01", &format!("tag{n:02}")))
            .collect();
        let top = Dataset::from_records(records).top_tags(YearFilter::All);
        assert_eq!(top.len(), TOP_TAGS_LIMIT);
        // Every kept tag occurs once, so shares are relative to the
        // kept 20 rather than all 30 occurrences.
        assert!(top.iter().all(|s| s.percentage == 5.0));
    }

    #[test]
    fn top_tags_ties_keep_first_encountered_order() {
        let dataset = Dataset::from_records(vec![
            record("2020-01-01", "Zeta, Alpha"),
            record("2020-02-01", "Zeta, Alpha, Mid"),
        ]);
        let top = dataset.top_tags(YearFilter::All);
        let order: Vec<&str> = top.iter().map(|s| s.tag.as_str()).collect();
        assert_eq!(order, ["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn empty_tag_pieces_are_discarded() {
        let dataset = Dataset::from_records(vec![record("2020-01-01", "AI,, Robotics,")]);
        assert_eq!(dataset.tags(), &["AI".to_string(), "Robotics".to_string()]);
        let top = dataset.top_tags(YearFilter::All);
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn loads_csv_fixture() {
        let path = write_fixture(
            "basic.csv",
            "Date,Tags\n2020-01-01,\"AI, Robotics\"\n2020-06-01,AI\nnot-a-date,Solo\n2021-01-01,\n",
        );
        let dataset = Dataset::load(&path).expect("load csv");
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.years(), &[2020, 2021]);
        assert_eq!(
            dataset.tags(),
            &["AI".to_string(), "Robotics".to_string(), "Solo".to_string()]
        );
        let freq = dataset.tag_frequencies(&["AI".to_string()]);
        assert_eq!(freq["AI"].get(&2020), Some(&2));
    }

    #[test]
    fn missing_tags_column_fails_the_load() {
        let path = write_fixture("no-tags.csv", "Date,Title\n2020-01-01,hello\n");
        match Dataset::load(&path) {
            Err(LoadError::MissingColumn(column)) => assert_eq!(column, "Tags"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn load_or_empty_degrades_to_an_empty_dataset() {
        let path = write_fixture("no-tags-2.csv", "Date,Title\n2020-01-01,hello\n");
        let dataset = Dataset::load_or_empty(&path);
        assert!(dataset.is_empty());
        assert!(dataset.tags().is_empty());
        assert!(dataset.years().is_empty());
        assert!(dataset.top_tags(YearFilter::All).is_empty());
        assert!(dataset.tag_frequencies(&["AI".to_string()])["AI"].is_empty());
    }

    #[test]
    fn unsupported_extension_is_a_load_error() {
        let path = write_fixture("notes.txt", "Date,Tags\n");
        assert!(matches!(
            Dataset::load(&path),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let path = std::env::temp_dir().join("tag-trends-does-not-exist.csv");
        assert!(Dataset::load(&path).is_err());
    }
}
