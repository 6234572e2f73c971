use anyhow::Result;

use super::CliContext;
use crate::cli::PrCommands;

pub async fn execute(ctx: &CliContext, command: PrCommands) -> Result<()> {
    let requests = ctx.planner.purchase_requests();
    match command {
        PrCommands::Create { row_id, items } => {
            let created = requests.create(row_id, &items, ctx.actor()?).await?;
            println!(
                "🧾 Created purchase request {} with {} item(s)",
                created
                    .request
                    .reference_number
                    .as_deref()
                    .unwrap_or("(no reference)"),
                created.items.len()
            );
            for item in &created.items {
                println!("   {} {}", item.key(), item.description);
            }
        }
        PrCommands::Available { row_id } => {
            let claimed = requests.items_for_row(row_id).await?;
            for item in &claimed {
                println!(
                    "🔒 {} {} (purchase request #{})",
                    item.key(),
                    item.description,
                    item.purchase_request_id
                );
            }
            let keys = requests.selectable_items(row_id).await?;
            if keys.is_empty() {
                println!("📭 Every item of row #{row_id} is already in a purchase request");
                return Ok(());
            }
            let row = ctx.planner.store().get_row(row_id).await?;
            println!("🛒 Items of row #{row_id} free for a purchase request:");
            for key in keys {
                let description = row
                    .as_ref()
                    .and_then(|r| r.item(key))
                    .map(|item| item.description.as_str())
                    .unwrap_or_default();
                println!("   {key} {description}");
            }
        }
        PrCommands::List { mine } => {
            let created_by = if mine { Some(ctx.actor()?) } else { None };
            let list = requests.list(created_by).await?;
            if list.is_empty() {
                println!("📭 No purchase requests");
            }
            for pr in list {
                println!(
                    "🧾 #{} {} row #{} [{}] by user #{}",
                    pr.id,
                    pr.reference_number.as_deref().unwrap_or("-"),
                    pr.ppmp_row_id,
                    pr.status.as_str(),
                    pr.created_by
                );
            }
        }
    }
    Ok(())
}
