//! Monthly and yearly totals over confirmed records.
//!
//! Amounts are stored as decimal text, so grouping happens here rather than
//! in SQL where `SUM` would go through floating point.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use super::{parse_amount, Store, StoreError, UNCATEGORIZED_EMOJI, UNCATEGORIZED_NAME};

/// Total for one category in a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTotal {
    /// Category id; `None` for records whose category was removed.
    pub category_id: Option<i64>,
    /// Category name.
    pub name: String,
    /// Category emoji.
    pub emoji: String,
    /// Income category.
    pub is_income: bool,
    /// Sum of amounts.
    pub total: Decimal,
    /// Number of records.
    pub count: u32,
}

impl CategoryTotal {
    /// `"{emoji} {name}"`.
    pub fn label(&self) -> String {
        if self.emoji.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.emoji, self.name)
        }
    }
}

/// Confirmed totals for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlySummary {
    /// Year.
    pub year: i32,
    /// Month, 1-12.
    pub month: u32,
    /// Expense categories, largest total first.
    pub expense: Vec<CategoryTotal>,
    /// Income categories, largest total first.
    pub income: Vec<CategoryTotal>,
    /// Sum of all expense totals.
    pub total_expense: Decimal,
    /// Sum of all income totals.
    pub total_income: Decimal,
}

impl MonthlySummary {
    /// Income minus expenses.
    pub fn net(&self) -> Decimal {
        self.total_income
            .checked_sub(self.total_expense)
            .unwrap_or(Decimal::ZERO)
    }

    /// Whether nothing was confirmed in the month.
    pub fn is_empty(&self) -> bool {
        self.expense.is_empty() && self.income.is_empty()
    }
}

/// One row of a yearly breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthTotal {
    /// Month, 1-12.
    pub month: u32,
    /// Confirmed expenses.
    pub expense_total: Decimal,
    /// Confirmed income.
    pub income_total: Decimal,
    /// Number of expense records.
    pub expense_count: u32,
    /// Number of income records.
    pub income_count: u32,
}

/// Confirmed totals for one calendar year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearlySummary {
    /// Year.
    pub year: i32,
    /// Twelve entries, January first.
    pub months: Vec<MonthTotal>,
    /// Whole-year category breakdown, expenses then income, largest first.
    pub categories: Vec<CategoryTotal>,
    /// Sum of all expenses.
    pub total_expense: Decimal,
    /// Sum of all income.
    pub total_income: Decimal,
}

impl YearlySummary {
    /// Income minus expenses.
    pub fn net(&self) -> Decimal {
        self.total_income
            .checked_sub(self.total_expense)
            .unwrap_or(Decimal::ZERO)
    }
}

type TotalsRow = (
    Option<i64>,
    Option<String>,
    Option<String>,
    bool,
    String,
    NaiveDateTime,
);

#[derive(Default)]
struct Accumulator {
    categories: BTreeMap<(bool, Option<i64>), CategoryTotal>,
    months: BTreeMap<u32, MonthTotal>,
    total_expense: Decimal,
    total_income: Decimal,
}

impl Accumulator {
    fn add(&mut self, row: TotalsRow) -> Result<(), StoreError> {
        let (category_id, name, emoji, is_income, raw_amount, occurred_at) = row;
        let amount = parse_amount(&raw_amount)?;

        let entry = self
            .categories
            .entry((is_income, category_id))
            .or_insert_with(|| CategoryTotal {
                category_id,
                name: name.unwrap_or_else(|| UNCATEGORIZED_NAME.to_owned()),
                emoji: emoji.unwrap_or_else(|| UNCATEGORIZED_EMOJI.to_owned()),
                is_income,
                total: Decimal::ZERO,
                count: 0,
            });
        entry.total = checked_sum(entry.total, amount)?;
        entry.count = entry.count.saturating_add(1);

        let month = occurred_at.month();
        let bucket = self.months.entry(month).or_insert_with(|| MonthTotal {
            month,
            ..MonthTotal::default()
        });
        if is_income {
            bucket.income_total = checked_sum(bucket.income_total, amount)?;
            bucket.income_count = bucket.income_count.saturating_add(1);
            self.total_income = checked_sum(self.total_income, amount)?;
        } else {
            bucket.expense_total = checked_sum(bucket.expense_total, amount)?;
            bucket.expense_count = bucket.expense_count.saturating_add(1);
            self.total_expense = checked_sum(self.total_expense, amount)?;
        }
        Ok(())
    }

    fn split(&self) -> (Vec<CategoryTotal>, Vec<CategoryTotal>) {
        let (mut income, mut expense): (Vec<_>, Vec<_>) = self
            .categories
            .values()
            .cloned()
            .partition(|total| total.is_income);
        sort_largest_first(&mut expense);
        sort_largest_first(&mut income);
        (expense, income)
    }
}

fn checked_sum(a: Decimal, b: Decimal) -> Result<Decimal, StoreError> {
    a.checked_add(b)
        .ok_or_else(|| StoreError::InvalidAmount(format!("{a} + {b} overflows")))
}

fn sort_largest_first(totals: &mut [CategoryTotal]) {
    totals.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
}

/// `[start, end)` bounds of a month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month.checked_add(1)?, 1)?
    };
    Some((start.and_hms_opt(0, 0, 0)?, end.and_hms_opt(0, 0, 0)?))
}

/// `[start, end)` bounds of a year.
pub fn year_bounds(year: i32) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let end = NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?;
    Some((start.and_hms_opt(0, 0, 0)?, end.and_hms_opt(0, 0, 0)?))
}

impl Store {
    async fn confirmed_rows(
        &self,
        user_id: i64,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<Accumulator, StoreError> {
        let rows: Vec<TotalsRow> = sqlx::query_as(
            "SELECT e.category_id, c.name, c.emoji, e.is_income, e.amount, e.occurred_at \
             FROM expenses e LEFT JOIN categories c ON c.id = e.category_id \
             WHERE e.user_id = ?1 AND e.is_confirmed = 1 \
               AND e.occurred_at >= ?2 AND e.occurred_at < ?3",
        )
        .bind(user_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        let mut acc = Accumulator::default();
        for row in rows {
            acc.add(row)?;
        }
        Ok(acc)
    }

    /// Confirmed totals per category for one month. Pending records are
    /// excluded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidEnum`] for an impossible month, or
    /// [`StoreError`] on query failure or a corrupt amount.
    pub async fn monthly_summary(
        &self,
        user_id: i64,
        year: i32,
        month: u32,
    ) -> Result<MonthlySummary, StoreError> {
        let (from, until) = month_bounds(year, month).ok_or_else(|| StoreError::InvalidEnum {
            field: "month",
            value: format!("{year}-{month}"),
        })?;
        let acc = self.confirmed_rows(user_id, from, until).await?;
        let (expense, income) = acc.split();
        Ok(MonthlySummary {
            year,
            month,
            expense,
            income,
            total_expense: acc.total_expense,
            total_income: acc.total_income,
        })
    }

    /// Confirmed totals per month and per category for one year.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidEnum`] for an impossible year, or
    /// [`StoreError`] on query failure or a corrupt amount.
    pub async fn yearly_summary(&self, user_id: i64, year: i32) -> Result<YearlySummary, StoreError> {
        let (from, until) = year_bounds(year).ok_or_else(|| StoreError::InvalidEnum {
            field: "year",
            value: year.to_string(),
        })?;
        let acc = self.confirmed_rows(user_id, from, until).await?;
        let (mut categories, income) = acc.split();
        categories.extend(income);
        let months = (1..=12)
            .map(|month| {
                acc.months.get(&month).cloned().unwrap_or(MonthTotal {
                    month,
                    ..MonthTotal::default()
                })
            })
            .collect();
        Ok(YearlySummary {
            year,
            months,
            categories,
            total_expense: acc.total_expense,
            total_income: acc.total_income,
        })
    }
}
