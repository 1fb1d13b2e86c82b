//! Record Store: loading the cleaned per-record tables
//!
//! Each table is read with Polars as all-string columns, the required
//! columns are validated up front, and rows are converted into typed
//! records. A field that fails to parse becomes `None` for that record only;
//! the run continues.

use crate::error::{stage, PipelineError, PipelineResult};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

pub const VISITS: &str = "visits";
pub const MEMBERS: &str = "members";
pub const TRANSACTIONS: &str = "transactions";
pub const CHECKINS: &str = "checkins";
pub const CANCELLATIONS: &str = "cancellations";
pub const EVENTS: &str = "events";

pub const VISIT_COLUMNS: [&str; 9] = [
    "customer_id",
    "start_time",
    "partners",
    "party_size",
    "guests",
    "is_event",
    "event_name",
    "booking_type",
    "payment_status",
];
pub const MEMBER_COLUMNS: [&str; 5] = [
    "customer_id",
    "membership",
    "total_paid",
    "skill_singles",
    "skill_doubles",
];
pub const TRANSACTION_COLUMNS: [&str; 3] = ["customer_id", "amount", "date"];
pub const CHECKIN_COLUMNS: [&str; 3] = ["customer_id", "checkin_time", "status"];

/// One court booking or event attendance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Visit {
    pub customer_id: String,
    pub start: Option<NaiveDateTime>,
    /// Free-text partner list, see [`crate::partners`]
    pub partners: String,
    pub party_size: Option<f64>,
    pub has_guests: bool,
    pub is_event: bool,
    pub event_name: String,
    pub booking_type: String,
    pub payment_status: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Member {
    pub customer_id: String,
    pub membership: Option<String>,
    pub total_paid: Option<f64>,
    /// Raw rating text; parsed leniently by the feature extractor
    pub skill_singles: Option<String>,
    pub skill_doubles: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub customer_id: String,
    pub amount: Option<f64>,
    pub date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckIn {
    pub customer_id: String,
    pub time: Option<NaiveDateTime>,
    pub status: String,
}

impl CheckIn {
    pub fn is_checked_in(&self) -> bool {
        self.status == "Checked-In"
    }
}

/// Record counts per table, for the data-coverage summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataCoverage {
    pub visits: usize,
    pub members: usize,
    pub transactions: usize,
    pub checkins: usize,
    pub cancellations: usize,
    pub events: usize,
}

/// All cleaned tables for one analysis window
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    pub visits: Vec<Visit>,
    pub members: Vec<Member>,
    pub transactions: Vec<Transaction>,
    pub checkins: Vec<CheckIn>,
    /// Cancellations and the event catalog are only counted
    pub cancellation_count: usize,
    pub event_count: usize,
}

/// Read-only view of one customer's records
#[derive(Debug, Clone, Default)]
pub struct CustomerRecords<'a> {
    pub customer_id: &'a str,
    pub visits: Vec<&'a Visit>,
    pub transactions: Vec<&'a Transaction>,
    pub checkins: Vec<&'a CheckIn>,
    pub member: Option<&'a Member>,
}

/// Per-customer row positions into a [`RecordStore`]
#[derive(Debug)]
pub struct CustomerIndex<'a> {
    store: &'a RecordStore,
    order: Vec<&'a str>,
    visits: HashMap<&'a str, Vec<usize>>,
    transactions: HashMap<&'a str, Vec<usize>>,
    checkins: HashMap<&'a str, Vec<usize>>,
    members: HashMap<&'a str, usize>,
}

impl<'a> CustomerIndex<'a> {
    /// Customers with at least one visit, in order of first visit record
    pub fn customer_ids(&self) -> &[&'a str] {
        &self.order
    }

    pub fn records_for(&self, customer_id: &'a str) -> CustomerRecords<'a> {
        let store = self.store;
        let pick = |map: &HashMap<&'a str, Vec<usize>>| -> Vec<usize> {
            map.get(customer_id).cloned().unwrap_or_default()
        };
        CustomerRecords {
            customer_id,
            visits: pick(&self.visits).into_iter().map(|i| &store.visits[i]).collect(),
            transactions: pick(&self.transactions)
                .into_iter()
                .map(|i| &store.transactions[i])
                .collect(),
            checkins: pick(&self.checkins)
                .into_iter()
                .map(|i| &store.checkins[i])
                .collect(),
            member: self.members.get(customer_id).map(|&i| &store.members[i]),
        }
    }
}

impl RecordStore {
    pub fn new(
        visits: Vec<Visit>,
        members: Vec<Member>,
        transactions: Vec<Transaction>,
        checkins: Vec<CheckIn>,
    ) -> Self {
        Self {
            visits,
            members,
            transactions,
            checkins,
            cancellation_count: 0,
            event_count: 0,
        }
    }

    pub fn coverage(&self) -> DataCoverage {
        DataCoverage {
            visits: self.visits.len(),
            members: self.members.len(),
            transactions: self.transactions.len(),
            checkins: self.checkins.len(),
            cancellations: self.cancellation_count,
            events: self.event_count,
        }
    }

    /// Group row positions by customer id
    pub fn index(&self) -> CustomerIndex<'_> {
        let mut order = Vec::new();
        let mut visits: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, visit) in self.visits.iter().enumerate() {
            let entry = visits.entry(visit.customer_id.as_str()).or_insert_with(|| {
                order.push(visit.customer_id.as_str());
                Vec::new()
            });
            entry.push(i);
        }

        let mut transactions: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, tx) in self.transactions.iter().enumerate() {
            transactions.entry(tx.customer_id.as_str()).or_default().push(i);
        }

        let mut checkins: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, checkin) in self.checkins.iter().enumerate() {
            checkins.entry(checkin.customer_id.as_str()).or_default().push(i);
        }

        // First member row wins
        let mut members = HashMap::new();
        for (i, member) in self.members.iter().enumerate() {
            members.entry(member.customer_id.as_str()).or_insert(i);
        }

        CustomerIndex {
            store: self,
            order,
            visits,
            transactions,
            checkins,
            members,
        }
    }
}

/// Load all tables from `<dir>/<table>.csv`
///
/// The four tables the analysis consumes are required and validated before
/// any row is converted. Cancellations and events are optional.
///
/// # Arguments
/// * `dir` - Directory holding the exported CSV tables
///
/// # Returns
/// * `PipelineResult<RecordStore>` - Typed records; unparsable fields are `None`
pub fn load_record_store(dir: &Path) -> PipelineResult<RecordStore> {
    let visits_df = read_table(dir, VISITS)?;
    let members_df = read_table(dir, MEMBERS)?;
    let transactions_df = read_table(dir, TRANSACTIONS)?;
    let checkins_df = read_table(dir, CHECKINS)?;

    require_columns(&visits_df, VISITS, &VISIT_COLUMNS)?;
    require_columns(&members_df, MEMBERS, &MEMBER_COLUMNS)?;
    require_columns(&transactions_df, TRANSACTIONS, &TRANSACTION_COLUMNS)?;
    require_columns(&checkins_df, CHECKINS, &CHECKIN_COLUMNS)?;

    let mut store = RecordStore::new(
        visits_from_frame(&visits_df)?,
        members_from_frame(&members_df)?,
        transactions_from_frame(&transactions_df)?,
        checkins_from_frame(&checkins_df)?,
    );
    store.cancellation_count = optional_row_count(dir, CANCELLATIONS)?;
    store.event_count = optional_row_count(dir, EVENTS)?;

    info!(
        stage = stage::LOAD,
        visits = store.visits.len(),
        members = store.members.len(),
        transactions = store.transactions.len(),
        checkins = store.checkins.len(),
        "record store loaded"
    );
    Ok(store)
}

fn read_table(dir: &Path, table: &str) -> PipelineResult<DataFrame> {
    let path = dir.join(format!("{table}.csv"));
    // Zero-length inference reads every column as a string
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path))
        .and_then(|reader| reader.finish())
        .map_err(|source| PipelineError::Csv {
            table: table.to_string(),
            source,
        })
}

fn optional_row_count(dir: &Path, table: &str) -> PipelineResult<usize> {
    if !dir.join(format!("{table}.csv")).exists() {
        debug!(stage = stage::LOAD, table, "optional table absent");
        return Ok(0);
    }
    Ok(read_table(dir, table)?.height())
}

/// Fail with the first required column that is absent
pub fn require_columns(df: &DataFrame, table: &str, columns: &[&str]) -> PipelineResult<()> {
    match columns.iter().find(|name| df.column(name).is_err()) {
        Some(missing) => Err(PipelineError::missing_column(table, missing)),
        None => Ok(()),
    }
}

fn string_column(df: &DataFrame, table: &str, name: &str) -> PipelineResult<Vec<Option<String>>> {
    let series = df
        .column(name)
        .map_err(|_| PipelineError::missing_column(table, name))?;
    let values = series.str().map_err(|source| PipelineError::Csv {
        table: table.to_string(),
        source,
    })?;
    Ok(values
        .into_iter()
        .map(|value| {
            value
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .collect())
}

/// Tracks absorbed parse failures for one table
struct ParseLog<'t> {
    table: &'t str,
    failures: usize,
}

impl<'t> ParseLog<'t> {
    fn new(table: &'t str) -> Self {
        Self { table, failures: 0 }
    }

    fn timestamp(&mut self, raw: &Option<String>, column: &str, row: usize) -> Option<NaiveDateTime> {
        let text = raw.as_deref()?;
        let parsed = parse_timestamp(text);
        if parsed.is_none() {
            self.record(column, row, text);
        }
        parsed
    }

    fn number(&mut self, raw: &Option<String>, column: &str, row: usize) -> Option<f64> {
        let text = raw.as_deref()?;
        let parsed = parse_number(text);
        if parsed.is_none() {
            self.record(column, row, text);
        }
        parsed
    }

    fn record(&mut self, column: &str, row: usize, text: &str) {
        self.failures += 1;
        debug!(table = self.table, column, row, value = text, "unparsable field replaced with null");
    }

    fn finish(self) {
        if self.failures > 0 {
            warn!(
                stage = stage::LOAD,
                table = self.table,
                failures = self.failures,
                "fields could not be parsed and were treated as missing"
            );
        }
    }
}

fn visits_from_frame(df: &DataFrame) -> PipelineResult<Vec<Visit>> {
    let mut columns = Vec::with_capacity(VISIT_COLUMNS.len());
    for name in VISIT_COLUMNS {
        columns.push(string_column(df, VISITS, name)?);
    }
    let mut log = ParseLog::new(VISITS);
    let mut visits = Vec::with_capacity(df.height());

    for row in 0..df.height() {
        let Some(customer_id) = columns[0][row].clone() else {
            debug!(table = VISITS, row, "visit without customer id dropped");
            continue;
        };
        let text = |c: usize| columns[c][row].clone().unwrap_or_default();
        visits.push(Visit {
            customer_id,
            start: log.timestamp(&columns[1][row], "start_time", row),
            partners: text(2),
            party_size: log.number(&columns[3][row], "party_size", row),
            has_guests: parse_guest_flag(columns[4][row].as_deref()),
            is_event: parse_flag(columns[5][row].as_deref()),
            event_name: text(6),
            booking_type: text(7),
            payment_status: text(8),
        });
    }
    log.finish();
    Ok(visits)
}

fn members_from_frame(df: &DataFrame) -> PipelineResult<Vec<Member>> {
    let mut columns = Vec::with_capacity(MEMBER_COLUMNS.len());
    for name in MEMBER_COLUMNS {
        columns.push(string_column(df, MEMBERS, name)?);
    }
    let mut log = ParseLog::new(MEMBERS);
    let mut members = Vec::with_capacity(df.height());

    for row in 0..df.height() {
        let Some(customer_id) = columns[0][row].clone() else {
            continue;
        };
        members.push(Member {
            customer_id,
            membership: columns[1][row].clone(),
            total_paid: log.number(&columns[2][row], "total_paid", row),
            skill_singles: columns[3][row].clone(),
            skill_doubles: columns[4][row].clone(),
        });
    }
    log.finish();
    Ok(members)
}

fn transactions_from_frame(df: &DataFrame) -> PipelineResult<Vec<Transaction>> {
    let ids = string_column(df, TRANSACTIONS, "customer_id")?;
    let amounts = string_column(df, TRANSACTIONS, "amount")?;
    let dates = string_column(df, TRANSACTIONS, "date")?;
    let mut log = ParseLog::new(TRANSACTIONS);

    let transactions = (0..df.height())
        .filter_map(|row| {
            let customer_id = ids[row].clone()?;
            Some(Transaction {
                customer_id,
                amount: log.number(&amounts[row], "amount", row),
                date: log.timestamp(&dates[row], "date", row),
            })
        })
        .collect();
    log.finish();
    Ok(transactions)
}

fn checkins_from_frame(df: &DataFrame) -> PipelineResult<Vec<CheckIn>> {
    let ids = string_column(df, CHECKINS, "customer_id")?;
    let times = string_column(df, CHECKINS, "checkin_time")?;
    let statuses = string_column(df, CHECKINS, "status")?;
    let mut log = ParseLog::new(CHECKINS);

    let checkins = (0..df.height())
        .filter_map(|row| {
            let customer_id = ids[row].clone()?;
            Some(CheckIn {
                customer_id,
                time: log.timestamp(&times[row], "checkin_time", row),
                status: statuses[row].clone().unwrap_or_default(),
            })
        })
        .collect();
    log.finish();
    Ok(checkins)
}

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Parse a cleaned timestamp; a bare date maps to midnight
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Parse an amount or count, tolerating currency symbols and thousands separators
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_flag(text: Option<&str>) -> bool {
    matches!(
        text.map(|t| t.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "yes" | "y" | "1")
    )
}

/// Any guest text that is not an explicit negative counts as a guest
pub fn parse_guest_flag(text: Option<&str>) -> bool {
    match text.map(|t| t.trim().to_ascii_lowercase()) {
        None => false,
        Some(t) => !matches!(t.as_str(), "" | "false" | "no" | "0" | "none"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_table(dir: &TempDir, table: &str, lines: &[&str]) {
        let mut file = std::fs::File::create(dir.path().join(format!("{table}.csv"))).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    fn write_minimal_store(dir: &TempDir, visit_header: &str) {
        write_table(
            dir,
            VISITS,
            &[
                visit_header,
                "101,2025-10-01 07:30,Jane (#202),2,,FALSE,,Open Play,Paid",
                "101,not a date,,abc,Bob,TRUE,Skill Drill,Doubles - Add Players Now,Unpaid",
                "202,10/04/2025 06:15 PM,Me (#101),4,,false,,Drop-In,Partially Paid",
            ],
        );
        write_table(
            dir,
            MEMBERS,
            &[
                "customer_id,membership,total_paid,skill_singles,skill_doubles",
                "101,Founder Annual,\"$1,200.00\",3.5,",
            ],
        );
        write_table(
            dir,
            TRANSACTIONS,
            &["customer_id,amount,date", "101,25.00,2025-10-01", "202,oops,2025-10-04"],
        );
        write_table(
            dir,
            CHECKINS,
            &["customer_id,checkin_time,status", "101,2025-10-01 07:20,Checked-In"],
        );
    }

    const VISIT_HEADER: &str = "customer_id,start_time,partners,party_size,guests,is_event,event_name,booking_type,payment_status";

    #[test]
    fn test_load_record_store() {
        let dir = TempDir::new().unwrap();
        write_minimal_store(&dir, VISIT_HEADER);

        let store = load_record_store(dir.path()).unwrap();
        assert_eq!(store.visits.len(), 3);
        assert_eq!(store.members.len(), 1);
        assert_eq!(store.coverage().cancellations, 0);

        let first = &store.visits[0];
        assert_eq!(first.start.map(|t| t.hour()), Some(7));
        assert_eq!(first.party_size, Some(2.0));
        assert!(!first.is_event);

        // Unparsable fields become None without aborting the load
        let second = &store.visits[1];
        assert_eq!(second.start, None);
        assert_eq!(second.party_size, None);
        assert!(second.has_guests);
        assert!(second.is_event);

        assert_eq!(store.visits[2].start.map(|t| t.hour()), Some(18));
        assert_eq!(store.members[0].total_paid, Some(1200.0));
        assert_eq!(store.transactions[1].amount, None);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_minimal_store(&dir, VISIT_HEADER);
        write_table(
            &dir,
            CHECKINS,
            &["customer_id,checkin_time", "101,2025-10-01 07:20"],
        );

        match load_record_store(dir.path()) {
            Err(PipelineError::MissingColumn { table, column }) => {
                assert_eq!(table, CHECKINS);
                assert_eq!(column, "status");
            }
            other => panic!("expected missing column error, got {other:?}"),
        }
    }

    #[test]
    fn test_index_preserves_discovery_order() {
        let visit = |id: &str| Visit {
            customer_id: id.to_string(),
            ..Visit::default()
        };
        let store = RecordStore::new(
            vec![visit("b"), visit("a"), visit("b")],
            vec![],
            vec![Transaction {
                customer_id: "a".into(),
                amount: Some(10.0),
                date: None,
            }],
            vec![],
        );
        let index = store.index();
        assert_eq!(index.customer_ids(), &["b", "a"]);

        let records = index.records_for("b");
        assert_eq!(records.visits.len(), 2);
        assert!(records.transactions.is_empty());
        assert_eq!(index.records_for("a").transactions.len(), 1);
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_timestamp("2025-10-01T09:00:00").is_some());
        assert_eq!(
            parse_timestamp("2025-10-01").map(|t| t.hour()),
            Some(0)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_number(" $12.50 "), Some(12.5));
        assert_eq!(parse_number("NaN"), None);
        assert!(parse_flag(Some("TRUE")));
        assert!(!parse_flag(None));
        assert!(!parse_guest_flag(Some("0")));
    }
}
