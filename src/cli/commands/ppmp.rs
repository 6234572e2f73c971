use anyhow::{bail, Result};

use super::CliContext;
use crate::cli::PpmpCommands;
use crate::model::{EndUser, Ppmp};
use crate::store::{Page, PpmpFilter};
use crate::workflow::side_channel::end_user_label;

pub async fn execute(ctx: &CliContext, command: PpmpCommands) -> Result<()> {
    let ppmps = ctx.planner.ppmps();
    match command {
        PpmpCommands::Create {
            fiscal_year,
            school,
            office,
        } => {
            let end_user = match (school, office) {
                (Some(id), None) => EndUser::School(id),
                (None, Some(id)) => EndUser::Office(id),
                _ => bail!("pass exactly one of --school or --office"),
            };
            let ppmp = ppmps
                .create_ppmp(ctx.fiscal_year(fiscal_year), end_user, ctx.actor()?)
                .await?;
            println!(
                "📝 Created PPMP #{} for FY{} ({})",
                ppmp.id,
                ppmp.fiscal_year,
                end_user_label(ctx.planner.store().as_ref(), &ppmp.end_user).await
            );
        }
        PpmpCommands::List {
            fiscal_year,
            status,
            mine,
            page,
        } => {
            let filter = PpmpFilter {
                fiscal_year,
                statuses: status,
                end_users: None,
                created_by: if mine { Some(ctx.actor()?) } else { None },
            };
            let result = ppmps
                .list_ppmps(&filter, Page::number(page, ctx.per_page()))
                .await?;
            print_page(ctx, &result.items, result.total, page).await;
        }
        PpmpCommands::Show { id } => show(ctx, id).await?,
        PpmpCommands::Delete { id } => {
            ppmps.delete_ppmp(id, ctx.actor()?).await?;
            println!("🗑️  Deleted PPMP #{id}");
        }
        PpmpCommands::Submissions { page } => {
            let result = ppmps
                .submissions_for(ctx.actor()?, Page::number(page, ctx.per_page()))
                .await?;
            if result.total == 0 {
                println!("📭 Nothing is waiting on you");
            } else {
                println!("📥 {} PPMP(s) waiting on you", result.total);
                print_page(ctx, &result.items, result.total, page).await;
            }
        }
    }
    Ok(())
}

async fn print_page(ctx: &CliContext, items: &[Ppmp], total: usize, page: usize) {
    if items.is_empty() {
        println!("📭 No PPMPs found");
        return;
    }
    for ppmp in items {
        println!(
            "📄 #{} FY{} {} - {}",
            ppmp.id,
            ppmp.fiscal_year,
            end_user_label(ctx.planner.store().as_ref(), &ppmp.end_user).await,
            ppmp.status.label()
        );
    }
    println!("   page {page}, {total} total");
}

async fn show(ctx: &CliContext, id: i64) -> Result<()> {
    let ppmp = ctx.planner.ppmps().get(id).await?;
    let label = end_user_label(ctx.planner.store().as_ref(), &ppmp.end_user).await;
    println!("📄 PPMP #{} - FY{} {}", ppmp.id, ppmp.fiscal_year, label);
    println!("   Status: {}", ppmp.status.label());
    if let Some(creator) = ppmp.created_by {
        println!("   Created by: user #{creator}");
    }

    for remark in &ppmp.remarks {
        println!(
            "   💬 [{}] {} ({})",
            remark.role.as_str(),
            remark.text,
            remark.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    let rows = ctx.planner.ppmps().rows(id).await?;
    println!();
    println!("📦 Rows ({})", rows.len());
    for row in &rows {
        println!(
            "   #{} {} [{}] budget {} - APP {}",
            row.id,
            row.general_description,
            row.project_type.as_str(),
            row.estimated_budget
                .map(|b| format!("{b:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            row.app_status.as_str()
        );
        for (l, lot) in row.items.iter().enumerate() {
            println!("      {}. {}", l, lot.name);
            for (i, item) in lot.items.iter().enumerate() {
                println!(
                    "         {l}-{i} {} x{} {}",
                    item.description,
                    item.quantity.map(|q| q.to_string()).unwrap_or_default(),
                    item.unit.as_deref().unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}
