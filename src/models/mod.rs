use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for a field the extractor could not resolve.
pub const NOT_AVAILABLE: &str = "N/A";
/// Sentinel for every field of a record whose fetch failed outright.
pub const FAILED: &str = "Error";

// ── Columns ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Link,
    Name,
    Ministry,
    Department,
    About,
    Eligibility,
    Documents,
    Applicability,
    Fee,
    Validity,
    AverageTime,
    NswsApplicable,
}

impl Column {
    pub const fn header(self) -> &'static str {
        match self {
            Column::Link => "Approval Link",
            Column::Name => "Approval Name",
            Column::Ministry => "Ministry Name",
            Column::Department => "Department Name",
            Column::About => "About this approval",
            Column::Eligibility => "Who can apply",
            Column::Documents => "Documents required",
            Column::Applicability => "Approval applicability/trigger",
            Column::Fee => "Application Fee",
            Column::Validity => "Validity",
            Column::AverageTime => "Average Time taken to get this",
            Column::NswsApplicable => "Can be applied through NSWS",
        }
    }
}

// ── Schemas ───────────────────────────────────────────────────────────────────

pub type Schema = &'static [Column];

pub const MINISTRY_SCHEMA: Schema = &[
    Column::Link,
    Column::Name,
    Column::Ministry,
    Column::About,
    Column::Eligibility,
    Column::Documents,
    Column::Applicability,
    Column::Fee,
    Column::Validity,
    Column::AverageTime,
    Column::NswsApplicable,
];

pub const DEPARTMENT_SCHEMA: Schema = &[
    Column::Link,
    Column::Name,
    Column::Department,
    Column::About,
    Column::Eligibility,
    Column::Documents,
    Column::Applicability,
    Column::Fee,
    Column::Validity,
    Column::AverageTime,
    Column::NswsApplicable,
];

pub const ALL_SCHEMA: Schema = &[
    Column::Link,
    Column::Name,
    Column::Ministry,
    Column::Department,
    Column::About,
    Column::Eligibility,
    Column::Documents,
    Column::Applicability,
    Column::Fee,
    Column::Validity,
    Column::AverageTime,
    Column::NswsApplicable,
];

// ── NSWS applicability ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NswsApplicability {
    Yes,
    InformationOnly,
}

impl fmt::Display for NswsApplicability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NswsApplicability::Yes => "Yes",
            NswsApplicability::InformationOnly => "No (Information Only)",
        })
    }
}

// ── Approval record ───────────────────────────────────────────────────────────

/// One output row. Every field always holds a value; unresolved ones carry
/// [`NOT_AVAILABLE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub link: String,
    pub name: String,
    pub ministry: String,
    pub department: String,
    pub about: String,
    pub eligibility: String,
    pub documents: String,
    pub applicability: String,
    pub fee: String,
    pub validity: String,
    pub average_time: String,
    pub nsws_applicable: String,
}

impl ApprovalRecord {
    /// A record for `link` with every other field unresolved.
    pub fn new(link: impl Into<String>) -> Self {
        let na = || NOT_AVAILABLE.to_string();
        Self {
            link: link.into(),
            name: na(),
            ministry: na(),
            department: na(),
            about: na(),
            eligibility: na(),
            documents: na(),
            applicability: na(),
            fee: na(),
            validity: na(),
            average_time: na(),
            nsws_applicable: NswsApplicability::InformationOnly.to_string(),
        }
    }

    /// A record whose fetch failed: `Error` in every column.
    pub fn failed() -> Self {
        let mut record = Self::new(FAILED);
        for column in ALL_SCHEMA {
            record.set(*column, FAILED);
        }
        record
    }

    pub fn get(&self, column: Column) -> &str {
        match column {
            Column::Link => &self.link,
            Column::Name => &self.name,
            Column::Ministry => &self.ministry,
            Column::Department => &self.department,
            Column::About => &self.about,
            Column::Eligibility => &self.eligibility,
            Column::Documents => &self.documents,
            Column::Applicability => &self.applicability,
            Column::Fee => &self.fee,
            Column::Validity => &self.validity,
            Column::AverageTime => &self.average_time,
            Column::NswsApplicable => &self.nsws_applicable,
        }
    }

    pub fn set(&mut self, column: Column, value: impl Into<String>) {
        let value = value.into();
        let slot = match column {
            Column::Link => &mut self.link,
            Column::Name => &mut self.name,
            Column::Ministry => &mut self.ministry,
            Column::Department => &mut self.department,
            Column::About => &mut self.about,
            Column::Eligibility => &mut self.eligibility,
            Column::Documents => &mut self.documents,
            Column::Applicability => &mut self.applicability,
            Column::Fee => &mut self.fee,
            Column::Validity => &mut self.validity,
            Column::AverageTime => &mut self.average_time,
            Column::NswsApplicable => &mut self.nsws_applicable,
        };
        *slot = value;
    }

    /// Project the record onto a schema, in column order. Empty values are
    /// written as [`NOT_AVAILABLE`] so no column is ever blank.
    pub fn row(&self, schema: Schema) -> Vec<&str> {
        schema
            .iter()
            .map(|c| match self.get(*c) {
                "" => NOT_AVAILABLE,
                v => v,
            })
            .collect()
    }
}

// ── Forced fields ─────────────────────────────────────────────────────────────

/// Column values that override whatever the extractor found, e.g. the label of
/// the active ministry filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForcedFields(Vec<(Column, String)>);

impl ForcedFields {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn single(column: Column, value: impl Into<String>) -> Self {
        Self(vec![(column, value.into())])
    }

    pub fn apply(&self, record: &mut ApprovalRecord) {
        for (column, value) in &self.0 {
            record.set(*column, value.clone());
        }
    }
}

// ── Filter groups & phases ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterGroup {
    Ministries,
    Departments,
}

impl FilterGroup {
    pub const fn label(self) -> &'static str {
        match self {
            FilterGroup::Ministries => "Ministries",
            FilterGroup::Departments => "Departments",
        }
    }

    /// Lowercase stem matched against sidebar headers; covers both
    /// "Ministry" and "Ministries".
    pub const fn header_keyword(self) -> &'static str {
        match self {
            FilterGroup::Ministries => "ministr",
            FilterGroup::Departments => "department",
        }
    }

    /// Sidebar position used when the group's header text can't be matched.
    pub const fn fallback_index(self) -> usize {
        match self {
            FilterGroup::Ministries => 0,
            FilterGroup::Departments => 1,
        }
    }
}

impl fmt::Display for FilterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CrawlPhase {
    #[value(name = "ministries")]
    ByMinistry,
    #[value(name = "departments")]
    ByDepartment,
    #[value(name = "all")]
    Unfiltered,
}

impl CrawlPhase {
    /// Fixed execution order.
    pub const ALL: [CrawlPhase; 3] = [
        CrawlPhase::ByMinistry,
        CrawlPhase::ByDepartment,
        CrawlPhase::Unfiltered,
    ];

    pub const fn schema(self) -> Schema {
        match self {
            CrawlPhase::ByMinistry => MINISTRY_SCHEMA,
            CrawlPhase::ByDepartment => DEPARTMENT_SCHEMA,
            CrawlPhase::Unfiltered => ALL_SCHEMA,
        }
    }

    pub const fn file_name(self) -> &'static str {
        match self {
            CrawlPhase::ByMinistry => "Ministries.csv",
            CrawlPhase::ByDepartment => "Departments.csv",
            CrawlPhase::Unfiltered => "All_Approvals.csv",
        }
    }

    /// Filter group and the column its label is forced into.
    pub const fn filter(self) -> Option<(FilterGroup, Column)> {
        match self {
            CrawlPhase::ByMinistry => Some((FilterGroup::Ministries, Column::Ministry)),
            CrawlPhase::ByDepartment => Some((FilterGroup::Departments, Column::Department)),
            CrawlPhase::Unfiltered => None,
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrawlPhase::ByMinistry => "by-ministry",
            CrawlPhase::ByDepartment => "by-department",
            CrawlPhase::Unfiltered => "unfiltered",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_field_overrides_banner_value() {
        let mut record = ApprovalRecord::new("https://example.org/a/1");
        record.ministry = "X".into();
        ForcedFields::single(Column::Ministry, "Y").apply(&mut record);
        assert_eq!(record.ministry, "Y");
        assert_eq!(record.row(MINISTRY_SCHEMA)[2], "Y");
    }

    #[test]
    fn test_failed_record_is_error_everywhere() {
        let record = ApprovalRecord::failed();
        assert!(record.row(ALL_SCHEMA).iter().all(|v| *v == FAILED));
    }

    #[test]
    fn test_row_never_blank() {
        let mut record = ApprovalRecord::new("https://example.org/a/1");
        record.fee = String::new();
        let row = record.row(ALL_SCHEMA);
        assert_eq!(row.len(), ALL_SCHEMA.len());
        assert_eq!(row[8], NOT_AVAILABLE);
    }

    #[test]
    fn test_schemas_differ_only_in_forced_column() {
        assert_eq!(MINISTRY_SCHEMA.len(), DEPARTMENT_SCHEMA.len());
        assert_eq!(MINISTRY_SCHEMA[2].header(), "Ministry Name");
        assert_eq!(DEPARTMENT_SCHEMA[2].header(), "Department Name");
        assert_eq!(ALL_SCHEMA.len(), 12);
    }
}
