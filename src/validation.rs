// Input validation, run before any write

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{PlannerError, PlannerResult};
use crate::model::{Lot, RowDraft, RowFields};

pub const MIN_FISCAL_YEAR: i32 = 2000;
pub const MAX_FISCAL_YEAR: i32 = 2100;

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

static MONTH: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").ok());

pub fn validate_email(email: &str) -> PlannerResult<()> {
    if EMAIL.as_ref().is_some_and(|re| re.is_match(email.trim())) {
        Ok(())
    } else {
        Err(PlannerError::validation("email", "Enter a valid email address"))
    }
}

pub fn validate_fiscal_year(fiscal_year: i32) -> PlannerResult<()> {
    if (MIN_FISCAL_YEAR..=MAX_FISCAL_YEAR).contains(&fiscal_year) {
        Ok(())
    } else {
        Err(PlannerError::validation(
            "fiscal_year",
            format!("Fiscal year must be between {MIN_FISCAL_YEAR} and {MAX_FISCAL_YEAR}"),
        ))
    }
}

pub fn required(field: &str, value: &str) -> PlannerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(PlannerError::validation(field, format!("{} is required", field.replace('_', " "))))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Accepts `YYYY-MM-DD`, or `YYYY-MM` meaning the first of that month.
pub fn parse_plan_date(field: &str, value: &str) -> PlannerResult<NaiveDate> {
    let value = value.trim();
    let invalid = || PlannerError::validation(field, format!("'{value}' is not a valid date"));
    if let Some(caps) = MONTH.as_ref().and_then(|re| re.captures(value)) {
        let year = caps[1].parse().map_err(|_| invalid())?;
        let month = caps[2].parse().map_err(|_| invalid())?;
        return NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())
}

fn non_negative(field: &str, value: Option<f64>) -> PlannerResult<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(PlannerError::validation(
            field,
            format!("{} must be a non-negative number", field.replace('_', " ")),
        )),
        _ => Ok(()),
    }
}

fn validate_lots(lots: &[Lot]) -> PlannerResult<()> {
    for (l, lot) in lots.iter().enumerate() {
        if lot.name.trim().is_empty() {
            return Err(PlannerError::validation(
                "items",
                format!("lot {} needs a name", l + 1),
            ));
        }
        for (i, item) in lot.items.iter().enumerate() {
            if item.description.trim().is_empty() {
                return Err(PlannerError::validation(
                    "items",
                    format!("item {} of lot {} needs a description", i + 1, l + 1),
                ));
            }
            non_negative("quantity", item.quantity)?;
            non_negative("estimated_cost", item.estimated_cost)?;
        }
    }
    Ok(())
}

/// Checks a row form and normalizes it for writing.
pub fn validate_row(draft: RowDraft) -> PlannerResult<RowFields> {
    let general_description = required("general_description", &draft.general_description)?;
    let project_type = draft
        .project_type
        .ok_or_else(|| PlannerError::validation("project_type", "project type is required"))?;
    validate_lots(&draft.items)?;
    non_negative("estimated_budget", draft.estimated_budget)?;

    if let (Some(start), Some(end)) = (draft.procurement_start_date, draft.procurement_end_date) {
        if end < start {
            return Err(PlannerError::validation(
                "procurement_end_date",
                "procurement end date is before the start date",
            ));
        }
    }

    let source_of_funds = draft
        .source_of_funds
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let remarks = draft
        .remarks
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    Ok(RowFields {
        general_description,
        project_type,
        items: draft.items,
        procurement_mode: draft.procurement_mode,
        pre_procurement_conference: draft.pre_procurement_conference,
        procurement_start_date: draft.procurement_start_date,
        procurement_end_date: draft.procurement_end_date,
        delivery_period: draft.delivery_period,
        source_of_funds,
        estimated_budget: draft.estimated_budget,
        remarks,
    })
}
