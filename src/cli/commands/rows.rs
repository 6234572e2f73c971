use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;

use super::CliContext;
use crate::cli::RowCommands;
use crate::model::{Lot, LotItem, PpmpRow, ProcurementMode, RowDraft};
use crate::planning::UploadFile;
use crate::validation::parse_plan_date;

pub async fn execute(ctx: &CliContext, command: RowCommands) -> Result<()> {
    match command {
        RowCommands::Add {
            ppmp_id,
            description,
            project_type,
            items,
            mode,
            start,
            end,
            funds,
            budget,
            remarks,
        } => {
            let draft = RowDraft {
                general_description: description,
                project_type: Some(project_type),
                items: parse_lots(&items)?,
                procurement_mode: mode.as_deref().map(str::parse::<ProcurementMode>).transpose()?,
                pre_procurement_conference: false,
                procurement_start_date: start
                    .as_deref()
                    .map(|s| parse_plan_date("procurement_start_date", s))
                    .transpose()?,
                procurement_end_date: end
                    .as_deref()
                    .map(|s| parse_plan_date("procurement_end_date", s))
                    .transpose()?,
                delivery_period: None,
                source_of_funds: funds,
                estimated_budget: budget,
                remarks,
            };
            let row = ctx.planner.ppmps().add_row(ppmp_id, ctx.actor()?, draft).await?;
            println!("➕ Added row #{} to PPMP #{ppmp_id}", row.id);
            print_row(&row);
        }
        RowCommands::Update {
            row_id,
            description,
            items,
            funds,
            budget,
        } => {
            let current = ctx
                .planner
                .store()
                .get_row(row_id)
                .await?
                .ok_or_else(|| anyhow!("row #{row_id} not found"))?;
            let mut draft = draft_from(current);
            if let Some(description) = description {
                draft.general_description = description;
            }
            if !items.is_empty() {
                draft.items = parse_lots(&items)?;
            }
            if funds.is_some() {
                draft.source_of_funds = funds;
            }
            if budget.is_some() {
                draft.estimated_budget = budget;
            }
            let row = ctx.planner.ppmps().update_row(row_id, ctx.actor()?, draft).await?;
            println!("✏️  Updated row #{}", row.id);
            print_row(&row);
        }
        RowCommands::List { ppmp_id } => {
            let rows = ctx.planner.ppmps().rows(ppmp_id).await?;
            if rows.is_empty() {
                println!("📭 PPMP #{ppmp_id} has no rows");
            }
            for row in &rows {
                print_row(row);
            }
        }
        RowCommands::Delete { row_id } => {
            ctx.planner.ppmps().delete_row(row_id, ctx.actor()?).await?;
            println!("🗑️  Deleted row #{row_id}");
        }
        RowCommands::Attach { row_id, files } => attach(ctx, row_id, files).await?,
        RowCommands::Approve { row_id } => {
            let row = ctx.planner.app().approve_row(row_id, ctx.actor()?).await?;
            println!("✅ Row #{} approved for the APP", row.id);
        }
        RowCommands::Pending { row_id } => {
            let row = ctx.planner.app().mark_row_pending(row_id, ctx.actor()?).await?;
            println!("⏳ Row #{} is pending again", row.id);
        }
        RowCommands::Remark { row_id, text } => {
            let actor = ctx.actor()?;
            let remark = ctx.planner.ppmps().add_row_remark(row_id, actor, &text).await?;
            println!("💬 [{}] {}", remark.role, remark.text);
            for earlier in ctx.planner.ppmps().row_remarks(row_id).await? {
                if earlier.id != remark.id {
                    println!("   [{}] {}", earlier.role, earlier.text);
                }
            }
        }
    }
    Ok(())
}

async fn attach(ctx: &CliContext, row_id: i64, files: Vec<PathBuf>) -> Result<()> {
    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        uploads.push(UploadFile::new(name, bytes));
    }

    let row = ctx
        .planner
        .ppmps()
        .upload_attachments(row_id, ctx.actor()?, uploads)
        .await?;
    for attachment in &row.attachments {
        if attachment.url.is_empty() {
            println!("⚠️  {} (upload failed)", attachment.name);
        } else {
            println!("📎 {} -> {}", attachment.name, attachment.url);
        }
    }
    Ok(())
}

/// Groups `LOT:DESCRIPTION[:QUANTITY[:UNIT[:COST]]]` entries into lots,
/// keeping lots in order of first appearance.
pub fn parse_lots(entries: &[String]) -> Result<Vec<Lot>> {
    let mut lots: Vec<Lot> = Vec::new();
    for entry in entries {
        let mut parts = entry.splitn(5, ':').map(str::trim);
        let lot_name = parts.next().unwrap_or_default();
        let description = parts.next().unwrap_or_default();
        if lot_name.is_empty() || description.is_empty() {
            bail!("item '{entry}' must look like LOT:DESCRIPTION[:QUANTITY[:UNIT[:COST]]]");
        }
        let quantity = parse_number(entry, parts.next())?;
        let unit = parts.next().filter(|u| !u.is_empty()).map(str::to_string);
        let estimated_cost = parse_number(entry, parts.next())?;

        let item = LotItem {
            description: description.to_string(),
            quantity,
            unit,
            estimated_cost,
        };
        match lots.iter_mut().find(|lot| lot.name == lot_name) {
            Some(lot) => lot.items.push(item),
            None => lots.push(Lot {
                name: lot_name.to_string(),
                items: vec![item],
            }),
        }
    }
    Ok(lots)
}

fn draft_from(row: PpmpRow) -> RowDraft {
    RowDraft {
        general_description: row.general_description,
        project_type: Some(row.project_type),
        items: row.items,
        procurement_mode: row.procurement_mode,
        pre_procurement_conference: row.pre_procurement_conference,
        procurement_start_date: row.procurement_start_date,
        procurement_end_date: row.procurement_end_date,
        delivery_period: row.delivery_period,
        source_of_funds: row.source_of_funds,
        estimated_budget: row.estimated_budget,
        remarks: row.remarks,
    }
}

fn parse_number(entry: &str, part: Option<&str>) -> Result<Option<f64>> {
    match part {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<f64>()
            .map(Some)
            .with_context(|| format!("'{value}' in item '{entry}' is not a number")),
    }
}

fn print_row(row: &PpmpRow) {
    println!(
        "📦 #{} {} [{}] - APP {}",
        row.id,
        row.general_description,
        row.project_type.as_str(),
        row.app_status.as_str()
    );
    if let Some(mode) = row.procurement_mode {
        println!("   Mode: {}", mode.as_str());
    }
    if let (Some(start), Some(end)) = (row.procurement_start_date, row.procurement_end_date) {
        println!("   Schedule: {start} to {end}");
    }
    if let Some(budget) = row.estimated_budget {
        println!("   Budget: {budget:.2}");
    }
    for (l, lot) in row.items.iter().enumerate() {
        println!("   {l}. {} ({} items)", lot.name, lot.items.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_group_into_lots() {
        let lots = parse_lots(&[
            "Lot 1:Laptop:2:unit:45000".to_string(),
            "Lot 2:Printer".to_string(),
            "Lot 1:Mouse:2".to_string(),
        ])
        .unwrap();

        assert_eq!(lots.len(), 2);
        assert_eq!(lots[0].name, "Lot 1");
        assert_eq!(lots[0].items.len(), 2);
        assert_eq!(lots[0].items[0].quantity, Some(2.0));
        assert_eq!(lots[0].items[0].unit.as_deref(), Some("unit"));
        assert_eq!(lots[0].items[0].estimated_cost, Some(45000.0));
        assert_eq!(lots[0].items[1].description, "Mouse");
        assert_eq!(lots[1].items[0].quantity, None);
    }

    #[test]
    fn test_malformed_item_is_rejected() {
        assert!(parse_lots(&["Laptop".to_string()]).is_err());
        assert!(parse_lots(&["Lot 1:Laptop:two".to_string()]).is_err());
    }
}
