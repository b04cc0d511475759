//! CSV ingest and normalization.
//!
//! Three inputs are read here:
//!
//! - participant datasets (any columns, one id column) → [`Dataset`]
//! - survey microdata (CPS-style extract) → [`SurveyRecord`]s
//! - the block-group deprivation table → [`DeprivationIndex`]
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Separation of concerns**: no analysis logic here

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{debug, info};

use crate::domain::{Dataset, GroupKey, is_missing_token};
use crate::earnings::{PremiumInput, SurveyRecord, work_experience, years_of_schooling};
use crate::error::RoiError;
use crate::outcomes::{CompletionRecord, EmploymentRecord};
use crate::ses::{AddressRecord, DeprivationEntry, DeprivationIndex, GeoUnitId, KnownUnitRecord, SesScore};

/// CPS income variables above this value are "not in universe" / missing codes.
pub const CPS_INCOME_SENTINEL: f64 = 9_999_998.0;

/// Dollar year of wages that have been multiplied by the CPS `CPI99` factor.
pub const CPI99_BASE_YEAR: i32 = 1999;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// A loaded input plus the bookkeeping of what was skipped.
#[derive(Debug, Clone)]
pub struct Ingested<T> {
    pub data: T,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

fn open_reader(path: &Path) -> Result<(csv::Reader<File>, HashMap<String, usize>), RoiError> {
    let file = File::open(path)
        .map_err(|e| RoiError::io(format!("failed to open CSV '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);
    let headers = reader
        .headers()
        .map_err(|e| RoiError::io(format!("failed to read CSV headers: {e}")))?
        .clone();
    Ok((reader, build_header_map(&headers)))
}

/// Load a participant CSV as a string-typed dataset.
///
/// Every column other than `id_column` becomes a dataset column under its
/// normalized (trimmed, lower-cased) header. Rows without an id are skipped
/// and reported; duplicate ids are rejected outright.
pub fn load_dataset(path: &Path, id_column: &str) -> Result<Ingested<Dataset>, RoiError> {
    let (mut reader, header_map) = open_reader(path)?;
    let id_key = normalize_header_name(id_column);
    let id_idx = *header_map.get(&id_key).ok_or_else(|| RoiError::MissingColumn {
        column: id_key.clone(),
    })?;

    let mut columns: Vec<(&String, usize)> = header_map
        .iter()
        .filter(|(name, _)| **name != id_key)
        .map(|(name, idx)| (name, *idx))
        .collect();
    columns.sort_by_key(|(_, idx)| *idx);

    let mut ids = Vec::new();
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); columns.len()];
    let mut seen = HashSet::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records start after the header, lines are 1-based.
        let line = idx + 2;
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let Some(id) = record.get(id_idx).map(str::trim).filter(|s| !s.is_empty()) else {
            row_errors.push(RowError {
                line,
                id: None,
                message: format!("missing required value: `{id_key}`"),
            });
            continue;
        };
        if !seen.insert(id.to_string()) {
            return Err(RoiError::invalid(format!(
                "duplicate id '{id}' at line {line}"
            )));
        }

        ids.push(id.to_string());
        for (col, (_, field)) in columns.iter().enumerate() {
            cells[col].push(get_optional(&record, *field).map(str::to_string));
        }
    }

    if ids.is_empty() {
        return Err(RoiError::empty(format!("no rows with an id in '{}'", path.display())));
    }

    let mut dataset = Dataset::new(ids);
    for ((name, _), column) in columns.into_iter().zip(cells) {
        dataset.add_column(name.as_str(), column)?;
    }
    info!(
        path = %path.display(),
        rows = dataset.len(),
        skipped = row_errors.len(),
        "loaded dataset"
    );

    Ok(Ingested {
        data: dataset,
        row_errors,
        rows_read,
    })
}

/// Load CPS-style survey microdata.
///
/// Recognized columns (headers are case-insensitive):
///
/// | field | column | notes |
/// |---|---|---|
/// | state | `statefip` or `state` | zero-padded to two digits |
/// | wage | `incwage` or `wage` | values above [`CPS_INCOME_SENTINEL`] are missing |
/// | schooling | `educ` (CPS code) or `schooling_years` | |
/// | experience | `age` or `experience_years` | `age` is turned into potential experience |
/// | weight | `asecwt` or `weight` | optional, defaults to 1 |
/// | year | `year` | optional |
/// | deflator | `cpi99` | optional; wages become 1999 dollars |
///
/// Rows that cannot produce a record are skipped and reported. Rows with a
/// missing wage are skipped too; the fit would drop them anyway.
pub fn load_survey(path: &Path) -> Result<Ingested<Vec<SurveyRecord>>, RoiError> {
    let (mut reader, header_map) = open_reader(path)?;

    let state_col = require_any(&header_map, &["statefip", "state"])?;
    let wage_col = require_any(&header_map, &["incwage", "wage"])?;
    let schooling_col = match header_map.get("educ") {
        Some(&idx) => SchoolingColumn::EducCode(idx),
        None => SchoolingColumn::Years(require_any(&header_map, &["schooling_years"])?),
    };
    let experience_col = match header_map.get("age") {
        Some(&idx) => ExperienceColumn::Age(idx),
        None => ExperienceColumn::Years(require_any(&header_map, &["experience_years"])?),
    };
    let weight_col = find_any(&header_map, &["asecwt", "weight"]);
    let year_col = header_map.get("year").copied();
    let cpi99_col = header_map.get("cpi99").copied();

    let mut records = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| {
                let state = normalize_state(get_required(&record, state_col, "state")?)?;
                let Some(wage) = parse_number(get_optional(&record, wage_col), "wage")?
                    .filter(|w| *w <= CPS_INCOME_SENTINEL)
                else {
                    return Err("missing wage".to_string());
                };
                let schooling_years = match schooling_col {
                    SchoolingColumn::EducCode(i) => {
                        let code = parse_int(get_required(&record, i, "educ")?, "educ")?;
                        years_of_schooling(code)
                            .ok_or_else(|| format!("unknown education code {code}"))?
                    }
                    SchoolingColumn::Years(i) => {
                        parse_required_number(get_required(&record, i, "schooling_years")?, "schooling_years")?
                    }
                };
                let experience_years = match experience_col {
                    ExperienceColumn::Age(i) => {
                        let age = parse_required_number(get_required(&record, i, "age")?, "age")?;
                        work_experience(age, schooling_years)
                    }
                    ExperienceColumn::Years(i) => parse_required_number(
                        get_required(&record, i, "experience_years")?,
                        "experience_years",
                    )?,
                };
                let weight = match weight_col {
                    Some(i) => parse_number(get_optional(&record, i), "weight")?.unwrap_or(1.0),
                    None => 1.0,
                };
                let mut year = match year_col {
                    Some(i) => get_optional(&record, i).map(|y| parse_int(y, "year")).transpose()?,
                    None => None,
                };
                let mut wage = wage;
                if let Some(i) = cpi99_col {
                    if let Some(factor) = parse_number(get_optional(&record, i), "cpi99")? {
                        wage *= factor;
                        year = Some(CPI99_BASE_YEAR);
                    }
                }
                Ok(SurveyRecord {
                    year,
                    state,
                    wage,
                    schooling_years,
                    experience_years,
                    weight,
                })
            });

        match parsed {
            Ok(r) => records.push(r),
            Err(message) => row_errors.push(RowError {
                line,
                id: None,
                message,
            }),
        }
    }

    if records.is_empty() {
        return Err(RoiError::empty(format!(
            "no usable survey rows in '{}'",
            path.display()
        )));
    }
    info!(
        path = %path.display(),
        records = records.len(),
        skipped = row_errors.len(),
        "loaded survey microdata"
    );

    Ok(Ingested {
        data: records,
        row_errors,
        rows_read,
    })
}

#[derive(Clone, Copy)]
enum SchoolingColumn {
    EducCode(usize),
    Years(usize),
}

#[derive(Clone, Copy)]
enum ExperienceColumn {
    Age(usize),
    Years(usize),
}

/// Load the block-group deprivation table.
///
/// Columns: `fips` (or `geoid`), `adi_natrank` (national percentile 1–100)
/// and `adi_staternk` (state decile 1–10). A non-numeric national rank such
/// as `PH` or `GQ` marks a suppressed block group and is kept as such.
pub fn load_deprivation_index(path: &Path) -> Result<Ingested<DeprivationIndex>, RoiError> {
    let (mut reader, header_map) = open_reader(path)?;
    let fips_col = require_any(&header_map, &["fips", "geoid"])?;
    let nat_col = require_any(&header_map, &["adi_natrank"])?;
    let state_col = require_any(&header_map, &["adi_staternk"])?;

    let mut entries = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| {
                let raw_unit = get_required(&record, fips_col, "fips")?;
                let unit = GeoUnitId::parse(raw_unit).map_err(|e| e.to_string())?;
                let entry = parse_deprivation_entry(
                    get_optional(&record, nat_col),
                    get_optional(&record, state_col),
                )?;
                Ok((unit, entry))
            });
        match parsed {
            Ok(e) => entries.push(e),
            Err(message) => row_errors.push(RowError {
                line,
                id: None,
                message,
            }),
        }
    }

    let index = DeprivationIndex::from_entries(entries)?;
    if index.is_empty() {
        return Err(RoiError::empty(format!(
            "no usable block groups in '{}'",
            path.display()
        )));
    }
    info!(
        path = %path.display(),
        block_groups = index.len(),
        suppressed = index.suppressed_count(),
        skipped = row_errors.len(),
        "loaded deprivation table"
    );

    Ok(Ingested {
        data: index,
        row_errors,
        rows_read,
    })
}

fn parse_deprivation_entry(
    national: Option<&str>,
    state: Option<&str>,
) -> Result<DeprivationEntry, String> {
    let national = national.ok_or_else(|| "missing `adi_natrank`".to_string())?;
    let Ok(percentile) = national.parse::<f64>() else {
        return Ok(DeprivationEntry::Suppressed {
            code: national.to_string(),
        });
    };
    let state = state.ok_or_else(|| "missing `adi_staternk`".to_string())?;
    let decile = state
        .parse::<u8>()
        .map_err(|_| format!("invalid `adi_staternk` '{state}'"))?;
    SesScore::new(percentile, decile)
        .map(DeprivationEntry::Scored)
        .map_err(|e| e.to_string())
}

/// Column mapping for building premium inputs from a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PremiumColumns {
    pub group_columns: Vec<String>,
    pub state: String,
    /// CPS education code column.
    pub educ: String,
    pub age: String,
    pub wage: String,
}

impl Default for PremiumColumns {
    fn default() -> Self {
        Self {
            group_columns: vec!["program".to_string()],
            state: "state".to_string(),
            educ: "educ".to_string(),
            age: "age".to_string(),
            wage: "earnings".to_string(),
        }
    }
}

/// Build premium-calculator inputs from dataset rows.
///
/// A missing state is kept (the prediction falls back to the intercept) and a
/// missing wage is kept (the calculator excludes and counts it). Rows missing
/// a group label, education or age are reported as row errors; `line` is the
/// 1-based dataset row.
pub fn premium_inputs(
    dataset: &Dataset,
    columns: &PremiumColumns,
) -> Result<(Vec<PremiumInput>, Vec<RowError>), RoiError> {
    let wages = dataset.numeric_column(&columns.wage)?;
    let ages = dataset.numeric_column(&columns.age)?;
    let educ = dataset.numeric_column(&columns.educ)?;
    let states = dataset.label_column(&columns.state)?;
    let groups: Vec<Vec<Option<String>>> = columns
        .group_columns
        .iter()
        .map(|g| dataset.label_column(g))
        .collect::<Result<_, _>>()?;

    let mut inputs = Vec::with_capacity(dataset.len());
    let mut row_errors = Vec::new();
    for (row, id) in dataset.ids().iter().enumerate() {
        let reject = |message: String| RowError {
            line: row + 1,
            id: Some(id.clone()),
            message,
        };
        let Some(group) = groups
            .iter()
            .map(|col| col[row].clone())
            .collect::<Option<Vec<String>>>()
        else {
            row_errors.push(reject("missing group label".to_string()));
            continue;
        };
        let Some(code) = educ[row] else {
            row_errors.push(reject(format!("missing `{}`", columns.educ)));
            continue;
        };
        let Some(schooling_years) = years_of_schooling(code as i32) else {
            row_errors.push(reject(format!("unknown education code {code}")));
            continue;
        };
        let Some(age) = ages[row] else {
            row_errors.push(reject(format!("missing `{}`", columns.age)));
            continue;
        };

        inputs.push(PremiumInput {
            id: id.clone(),
            group: GroupKey::new(group),
            state: states[row].as_deref().and_then(|s| normalize_state(s).ok()),
            schooling_years,
            experience_years: work_experience(age, schooling_years),
            observed_wage: wages[row],
        });
    }
    debug!(inputs = inputs.len(), skipped = row_errors.len(), "built premium inputs");
    Ok((inputs, row_errors))
}

/// Address records for the batch resolver, in dataset row order.
///
/// A missing address becomes an empty string, which geocoders reject as
/// malformed, so the row still shows up in the coverage report.
pub fn address_records(dataset: &Dataset, column: &str) -> Result<Vec<AddressRecord>, RoiError> {
    let addresses = dataset.label_column(column)?;
    Ok(dataset
        .ids()
        .iter()
        .zip(addresses)
        .map(|(id, address)| AddressRecord {
            id: id.clone(),
            address: address.unwrap_or_default(),
        })
        .collect())
}

/// Pre-geocoded records; unparseable codes count as missing geocodes.
pub fn known_unit_records(dataset: &Dataset, column: &str) -> Result<Vec<KnownUnitRecord>, RoiError> {
    let units = dataset.label_column(column)?;
    Ok(dataset
        .ids()
        .iter()
        .zip(units)
        .map(|(id, unit)| KnownUnitRecord {
            id: id.clone(),
            unit: unit.and_then(|u| GeoUnitId::parse(&u).ok()),
        })
        .collect())
}

/// Column mapping for completion and employment outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeColumns {
    pub group_columns: Vec<String>,
    /// 0/1 completion flag.
    pub completed: String,
    pub entry_year: String,
    pub exit_year: String,
    pub state: String,
    /// Entry month as `YYYY-MM` (or a full date).
    pub entry_month: String,
    pub exit_month: String,
    pub employed_at_start: String,
    pub employed_at_end: String,
}

impl Default for OutcomeColumns {
    fn default() -> Self {
        Self {
            group_columns: vec!["program".to_string()],
            completed: "completed".to_string(),
            entry_year: "entry_year".to_string(),
            exit_year: "exit_year".to_string(),
            state: "state".to_string(),
            entry_month: "entry_month".to_string(),
            exit_month: "exit_month".to_string(),
            employed_at_start: "employed_start".to_string(),
            employed_at_end: "employed_end".to_string(),
        }
    }
}

/// Completion records; rows without a group label or with unreadable values
/// are reported as row errors, missing values are kept as `None`.
pub fn completion_records(
    dataset: &Dataset,
    columns: &OutcomeColumns,
) -> Result<(Vec<CompletionRecord>, Vec<RowError>), RoiError> {
    let groups = group_keys(dataset, &columns.group_columns)?;
    let completed = dataset.label_column(&columns.completed)?;
    let entry = dataset.label_column(&columns.entry_year)?;
    let exit = dataset.label_column(&columns.exit_year)?;

    let mut records = Vec::with_capacity(dataset.len());
    let mut row_errors = Vec::new();
    for (row, id) in dataset.ids().iter().enumerate() {
        let parsed = (|| {
            let group = groups[row].clone().ok_or("missing group label")?;
            Ok::<_, String>(CompletionRecord {
                id: id.clone(),
                group,
                completed: parse_cell(&completed[row], &columns.completed, parse_flag)?,
                entry_year: parse_cell(&entry[row], &columns.entry_year, parse_int)?,
                exit_year: parse_cell(&exit[row], &columns.exit_year, parse_int)?,
            })
        })();
        match parsed {
            Ok(record) => records.push(record),
            Err(message) => row_errors.push(RowError {
                line: row + 1,
                id: Some(id.clone()),
                message,
            }),
        }
    }
    debug!(records = records.len(), skipped = row_errors.len(), "built completion records");
    Ok((records, row_errors))
}

/// Employment records, with the same row rules as [`completion_records`].
pub fn employment_records(
    dataset: &Dataset,
    columns: &OutcomeColumns,
) -> Result<(Vec<EmploymentRecord>, Vec<RowError>), RoiError> {
    let groups = group_keys(dataset, &columns.group_columns)?;
    let states = dataset.label_column(&columns.state)?;
    let entry = dataset.label_column(&columns.entry_month)?;
    let exit = dataset.label_column(&columns.exit_month)?;
    let start = dataset.label_column(&columns.employed_at_start)?;
    let end = dataset.label_column(&columns.employed_at_end)?;

    let mut records = Vec::with_capacity(dataset.len());
    let mut row_errors = Vec::new();
    for (row, id) in dataset.ids().iter().enumerate() {
        let parsed = (|| {
            let group = groups[row].clone().ok_or("missing group label")?;
            Ok::<_, String>(EmploymentRecord {
                id: id.clone(),
                group,
                state: parse_cell(&states[row], &columns.state, |s, _| normalize_state(s))?,
                entry_month: parse_cell(&entry[row], &columns.entry_month, parse_month)?,
                exit_month: parse_cell(&exit[row], &columns.exit_month, parse_month)?,
                employed_at_start: parse_cell(&start[row], &columns.employed_at_start, parse_flag)?,
                employed_at_end: parse_cell(&end[row], &columns.employed_at_end, parse_flag)?,
            })
        })();
        match parsed {
            Ok(record) => records.push(record),
            Err(message) => row_errors.push(RowError {
                line: row + 1,
                id: Some(id.clone()),
                message,
            }),
        }
    }
    debug!(records = records.len(), skipped = row_errors.len(), "built employment records");
    Ok((records, row_errors))
}

/// Joint group key per row; `None` when any grouping column is missing.
fn group_keys(dataset: &Dataset, columns: &[String]) -> Result<Vec<Option<GroupKey>>, RoiError> {
    let labels: Vec<Vec<Option<String>>> = columns
        .iter()
        .map(|c| dataset.label_column(c))
        .collect::<Result<_, _>>()?;
    Ok((0..dataset.len())
        .map(|row| {
            labels
                .iter()
                .map(|col| col[row].clone())
                .collect::<Option<Vec<String>>>()
                .map(GroupKey::new)
        })
        .collect())
}

fn parse_cell<T>(
    cell: &Option<String>,
    name: &str,
    parse: impl Fn(&str, &str) -> Result<T, String>,
) -> Result<Option<T>, String> {
    cell.as_deref().map(|raw| parse(raw, name)).transpose()
}

fn parse_flag(raw: &str, name: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" | "y" => Ok(true),
        "0" | "0.0" | "false" | "no" | "n" => Ok(false),
        _ => Err(format!("invalid `{name}` flag '{raw}'")),
    }
}

/// `YYYY-MM`, `YYYYMM` or a full `YYYY-MM-DD` date, as the first of the month.
fn parse_month(raw: &str, name: &str) -> Result<NaiveDate, String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let parsed = match digits.len() {
        6 | 8 => {
            let year = digits[..4].parse::<i32>().ok();
            let month = digits[4..6].parse::<u32>().ok();
            year.zip(month)
                .and_then(|(y, m)| NaiveDate::from_ymd_opt(y, m, 1))
        }
        _ => None,
    };
    parsed.ok_or_else(|| format!("invalid `{name}` month '{raw}'"))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

/// Trimmed, lower-cased header without a UTF-8 BOM.
pub fn normalize_header_name(name: &str) -> String {
    // Excel sometimes emits a BOM on the first header; without stripping it the
    // id column would be reported missing.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn find_any(header_map: &HashMap<String, usize>, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|n| header_map.get(*n).copied())
}

fn require_any(header_map: &HashMap<String, usize>, names: &[&str]) -> Result<usize, RoiError> {
    find_any(header_map, names).ok_or_else(|| RoiError::MissingColumn {
        column: names.join(" or "),
    })
}

fn get_required<'a>(record: &'a StringRecord, idx: usize, name: &str) -> Result<&'a str, String> {
    get_optional(record, idx).ok_or_else(|| format!("missing required value: `{name}`"))
}

fn get_optional(record: &StringRecord, idx: usize) -> Option<&str> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_missing_token(s))
}

fn parse_number(raw: Option<&str>, name: &str) -> Result<Option<f64>, String> {
    raw.map(|s| parse_required_number(s, name)).transpose()
}

fn parse_required_number(raw: &str, name: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("invalid `{name}` '{raw}'")),
    }
}

fn parse_int(raw: &str, name: &str) -> Result<i32, String> {
    raw.parse::<i32>()
        .map_err(|_| format!("invalid `{name}` '{raw}'"))
}

/// Two-digit state FIPS code (`8` → `08`).
fn normalize_state(raw: &str) -> Result<String, String> {
    let t = raw.trim();
    let padded = if t.len() == 1 { format!("0{t}") } else { t.to_string() };
    if padded.len() != 2 || !padded.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{raw}' is not a state FIPS code"));
    }
    Ok(padded)
}
