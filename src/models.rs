use crate::errors::{AnsError, Result};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Brazilian federative units used to split beneficiary data
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegionCode {
    AC,
    AL,
    AP,
    AM,
    BA,
    CE,
    DF,
    ES,
    GO,
    MA,
    MT,
    MS,
    MG,
    PA,
    PB,
    PR,
    PE,
    PI,
    RJ,
    RN,
    RS,
    RO,
    RR,
    SC,
    SP,
    SE,
    TO,
}

impl RegionCode {
    pub const ALL: [RegionCode; 27] = [
        RegionCode::AC,
        RegionCode::AL,
        RegionCode::AP,
        RegionCode::AM,
        RegionCode::BA,
        RegionCode::CE,
        RegionCode::DF,
        RegionCode::ES,
        RegionCode::GO,
        RegionCode::MA,
        RegionCode::MT,
        RegionCode::MS,
        RegionCode::MG,
        RegionCode::PA,
        RegionCode::PB,
        RegionCode::PR,
        RegionCode::PE,
        RegionCode::PI,
        RegionCode::RJ,
        RegionCode::RN,
        RegionCode::RS,
        RegionCode::RO,
        RegionCode::RR,
        RegionCode::SC,
        RegionCode::SP,
        RegionCode::SE,
        RegionCode::TO,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegionCode::AC => "AC",
            RegionCode::AL => "AL",
            RegionCode::AP => "AP",
            RegionCode::AM => "AM",
            RegionCode::BA => "BA",
            RegionCode::CE => "CE",
            RegionCode::DF => "DF",
            RegionCode::ES => "ES",
            RegionCode::GO => "GO",
            RegionCode::MA => "MA",
            RegionCode::MT => "MT",
            RegionCode::MS => "MS",
            RegionCode::MG => "MG",
            RegionCode::PA => "PA",
            RegionCode::PB => "PB",
            RegionCode::PR => "PR",
            RegionCode::PE => "PE",
            RegionCode::PI => "PI",
            RegionCode::RJ => "RJ",
            RegionCode::RN => "RN",
            RegionCode::RS => "RS",
            RegionCode::RO => "RO",
            RegionCode::RR => "RR",
            RegionCode::SC => "SC",
            RegionCode::SP => "SP",
            RegionCode::SE => "SE",
            RegionCode::TO => "TO",
        }
    }

    /// Parse and deduplicate a caller-supplied list of codes, keeping input order.
    pub fn parse_list<I, S>(codes: I) -> Result<Vec<RegionCode>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut regions = Vec::new();
        for code in codes {
            let region: RegionCode = code.as_ref().parse()?;
            if !regions.contains(&region) {
                regions.push(region);
            }
        }
        if regions.is_empty() {
            return Err(AnsError::EmptyRegionList);
        }
        Ok(regions)
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionCode {
    type Err = AnsError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        RegionCode::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == upper)
            .ok_or_else(|| AnsError::InvalidRegion {
                code: s.to_string(),
                valid: RegionCode::ALL.to_vec(),
            })
    }
}

/// Shared behaviour of the period tokens used to address remote folders.
pub trait Period: Copy + Ord + fmt::Display + FromStr<Err = AnsError> {
    /// The period immediately after this one
    fn next(&self) -> Self;
}

/// A calendar month, written `YYYYMM` on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthPeriod {
    year: i32,
    month: u32,
}

impl MonthPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return Err(AnsError::InvalidPeriod(format!("{:04}{:02}", year, month)));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Two-digit month as used in archive names
    pub fn month_str(&self) -> String {
        format!("{:02}", self.month)
    }

    /// Human-readable label such as `Jan 2024`
    pub fn label(&self) -> String {
        self.first_day().format("%b %Y").to_string()
    }

    fn first_day(&self) -> NaiveDate {
        // year and month are range-checked at construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }
}

impl Period for MonthPeriod {
    fn next(&self) -> Self {
        let next = self.first_day() + Months::new(1);
        Self {
            year: next.year(),
            month: next.month(),
        }
    }
}

impl fmt::Display for MonthPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for MonthPeriod {
    type Err = AnsError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AnsError::InvalidPeriod(s.to_string()));
        }
        let year = s[..4]
            .parse()
            .map_err(|_| AnsError::InvalidPeriod(s.to_string()))?;
        let month = s[4..]
            .parse()
            .map_err(|_| AnsError::InvalidPeriod(s.to_string()))?;
        MonthPeriod::new(year, month).map_err(|_| AnsError::InvalidPeriod(s.to_string()))
    }
}

/// A calendar quarter, written `{quarter}T{year}` on the server (e.g. `4T2021`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuarterPeriod {
    year: i32,
    quarter: u32,
}

impl QuarterPeriod {
    pub fn new(year: i32, quarter: u32) -> Result<Self> {
        if !(1..=4).contains(&quarter) || !(0..=9999).contains(&year) {
            return Err(AnsError::InvalidPeriod(format!("{}T{}", quarter, year)));
        }
        Ok(Self { year, quarter })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u32 {
        self.quarter
    }
}

impl Period for QuarterPeriod {
    fn next(&self) -> Self {
        if self.quarter == 4 {
            Self {
                year: self.year + 1,
                quarter: 1,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter + 1,
            }
        }
    }
}

impl fmt::Display for QuarterPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.quarter, self.year)
    }
}

impl FromStr for QuarterPeriod {
    type Err = AnsError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AnsError::InvalidPeriod(s.to_string());
        let (quarter, year) = s.trim().split_once(&['T', 't'][..]).ok_or_else(invalid)?;
        if year.len() != 4 {
            return Err(invalid());
        }
        let quarter = quarter.parse().map_err(|_| invalid())?;
        let year = year.parse().map_err(|_| invalid())?;
        QuarterPeriod::new(year, quarter).map_err(|_| invalid())
    }
}

/// Either a single period or a closed range of periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodSelection<P: Period> {
    Single(P),
    Range { start: P, end: P },
}

impl<P: Period> PeriodSelection<P> {
    /// Exactly one of `target` or both `start` and `end` must be given.
    pub fn from_args(target: Option<&str>, start: Option<&str>, end: Option<&str>) -> Result<Self> {
        match (target, start, end) {
            (Some(target), None, None) => Ok(PeriodSelection::Single(target.parse()?)),
            (None, Some(start), Some(end)) => {
                let start: P = start.parse()?;
                let end: P = end.parse()?;
                if start > end {
                    return Err(AnsError::InvalidRange {
                        start: start.to_string(),
                        end: end.to_string(),
                    });
                }
                Ok(PeriodSelection::Range { start, end })
            }
            _ => Err(AnsError::ConflictingPeriodArgs),
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, PeriodSelection::Range { .. })
    }

    /// Expand into the inclusive, ascending list of periods
    pub fn periods(&self) -> Vec<P> {
        match *self {
            PeriodSelection::Single(period) => vec![period],
            PeriodSelection::Range { start, end } => expand(start, end),
        }
    }
}

/// Inclusive range from `start` to `end`, one step at a time
pub fn expand<P: Period>(start: P, end: P) -> Vec<P> {
    let mut periods = Vec::new();
    let mut current = start;
    while current <= end {
        periods.push(current);
        current = current.next();
    }
    periods
}

/// ANS operator registration number (the `REG_ANS` column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegistrationCode(pub u32);

impl RegistrationCode {
    /// Parse a set of codes once, at the API boundary.
    pub fn parse_set<I, S>(codes: I) -> Result<std::collections::BTreeSet<RegistrationCode>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        codes.into_iter().map(|c| c.as_ref().parse()).collect()
    }
}

impl fmt::Display for RegistrationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RegistrationCode {
    type Err = AnsError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse()
            .map(RegistrationCode)
            .map_err(|_| AnsError::InvalidRegistrationCode(s.to_string()))
    }
}

impl From<u32> for RegistrationCode {
    fn from(value: u32) -> Self {
        RegistrationCode(value)
    }
}

/// One link scraped from a directory listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

impl RemoteEntry {
    pub fn from_href(href: &str) -> Self {
        Self {
            name: href.to_string(),
            is_dir: href.ends_with('/'),
        }
    }

    /// Entry name without its trailing separator
    pub fn stem(&self) -> &str {
        self.name.trim_end_matches('/')
    }
}
