//! Human-readable voucher numbers scoped to a financial year.
//!
//! Financial years run April to March and are labelled `2024-25`. A voucher
//! number reads `{prefix}/{year}/{seq:04}`, e.g. `JW/2024-25/0007`; the
//! sequence restarts at 1 every year.

use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Month (1-based) on which a financial year begins.
const FY_START_MONTH: u32 = 4;

/// An April–March financial year, identified by the calendar year it starts
/// in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FinancialYear {
  pub start_year: i32,
}

impl FinancialYear {
  /// The financial year a calendar date falls in.
  pub fn containing(date: NaiveDate) -> Self {
    let start_year = if date.month() >= FY_START_MONTH {
      date.year()
    } else {
      date.year() - 1
    };
    Self { start_year }
  }

  /// First day of the year (1 April).
  pub fn first_day(&self) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(self.start_year, FY_START_MONTH, 1)
  }

  /// Last day of the year (31 March of the following calendar year).
  pub fn last_day(&self) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(self.start_year + 1, FY_START_MONTH, 1)
      .and_then(|d| d.pred_opt())
  }
}

impl fmt::Display for FinancialYear {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{:02}", self.start_year, (self.start_year + 1).rem_euclid(100))
  }
}

impl FromStr for FinancialYear {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::InvalidVoucherNo(s.to_owned());
    let (start, end) = s.split_once('-').ok_or_else(invalid)?;
    if start.len() != 4 || end.len() != 2 {
      return Err(invalid());
    }
    let start_year: i32 = start.parse().map_err(|_| invalid())?;
    let end_short: i32 = end.parse().map_err(|_| invalid())?;
    if (start_year + 1).rem_euclid(100) != end_short {
      return Err(invalid());
    }
    Ok(Self { start_year })
  }
}

/// A parsed voucher number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoucherNo {
  pub prefix: String,
  pub year:   FinancialYear,
  /// 1-based position within `(prefix, year)`.
  pub seq:    u32,
}

impl VoucherNo {
  pub fn new(prefix: impl Into<String>, year: FinancialYear, seq: u32) -> Self {
    Self { prefix: prefix.into(), year, seq }
  }
}

impl fmt::Display for VoucherNo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{:04}", self.prefix, self.year, self.seq)
  }
}

impl FromStr for VoucherNo {
  type Err = Error;

  /// The prefix may itself contain `/`; the year and sequence are always the
  /// last two segments.
  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::InvalidVoucherNo(s.to_owned());
    let mut parts = s.rsplitn(3, '/');
    let seq = parts.next().ok_or_else(invalid)?;
    let year = parts.next().ok_or_else(invalid)?;
    let prefix = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;

    let seq: u32 = seq.parse().map_err(|_| invalid())?;
    if seq == 0 {
      return Err(invalid());
    }
    let year: FinancialYear = year.parse().map_err(|_| invalid())?;
    Ok(Self::new(prefix, year, seq))
  }
}
