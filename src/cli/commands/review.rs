use anyhow::Result;

use super::CliContext;
use crate::cli::{AppCommands, BacCommands};
use crate::model::{AppStatus, PpmpId};
use crate::store::{Page, RowFilter};
use crate::workflow::WorkflowAction;

pub async fn transition(
    ctx: &CliContext,
    ppmp_id: PpmpId,
    action: WorkflowAction,
    remark: Option<String>,
) -> Result<()> {
    let outcome = ctx
        .planner
        .transition(ppmp_id, ctx.actor()?, action, remark)
        .await?;

    println!(
        "🔄 PPMP #{}: {} → {}",
        outcome.ppmp.id,
        outcome.from.label(),
        outcome.ppmp.status.label()
    );
    if outcome.audit_entry.is_none() {
        println!("⚠️  The audit entry could not be written");
    }
    if outcome.notified > 0 {
        println!("🔔 Notified {} user(s)", outcome.notified);
    }
    Ok(())
}

pub async fn actions(ctx: &CliContext, ppmp_id: PpmpId) -> Result<()> {
    let actions = ctx
        .planner
        .workflow()
        .available_actions(ppmp_id, ctx.actor()?)
        .await?;
    if actions.is_empty() {
        println!("🚫 No actions available on PPMP #{ppmp_id}");
        return Ok(());
    }
    println!("🎯 Available actions on PPMP #{ppmp_id}:");
    for action in actions {
        let note = if action.is_return() { " (remark required)" } else { "" };
        println!("   {}{note}", action.as_str().replace('_', "-"));
    }
    Ok(())
}

pub async fn history(ctx: &CliContext, ppmp_id: PpmpId) -> Result<()> {
    let entries = ctx.planner.workflow().history(ppmp_id).await?;
    if entries.is_empty() {
        println!("📭 No history for PPMP #{ppmp_id}");
        return Ok(());
    }
    println!("📜 History of PPMP #{ppmp_id}");
    for entry in entries {
        let who = entry
            .user_id
            .map(|id| format!("user #{id}"))
            .unwrap_or_else(|| "deleted user".to_string());
        println!(
            "   {} {} by {} ({} → {})",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.describe(),
            who,
            entry.from_status.as_str(),
            entry.to_status.as_str()
        );
    }
    Ok(())
}

pub async fn bac(ctx: &CliContext, command: BacCommands) -> Result<()> {
    let gate = ctx.planner.bac();
    match command {
        BacCommands::Approve { ppmp_id } => {
            gate.approve(ppmp_id, ctx.actor()?).await?;
            let status = gate.status(ppmp_id).await?;
            println!(
                "✅ BAC approval recorded ({}/{})",
                status.approved(),
                status.required()
            );
            if status.all_approved() {
                println!("🎉 Every BAC member has approved; PPMP #{ppmp_id} can go to HOPE");
            }
        }
        BacCommands::Status { ppmp_id } => {
            let status = gate.status(ppmp_id).await?;
            println!(
                "🏛️  BAC sign-off for PPMP #{ppmp_id}: {}/{}",
                status.approved(),
                status.required()
            );
            for signoff in &status.roster {
                match signoff.approved_at {
                    Some(at) => println!(
                        "   ✅ {} ({}) {}",
                        signoff.name,
                        signoff.user_type.label(),
                        at.format("%Y-%m-%d %H:%M")
                    ),
                    None => println!("   ⏳ {} ({})", signoff.name, signoff.user_type.label()),
                }
            }
        }
    }
    Ok(())
}

pub async fn app(ctx: &CliContext, command: AppCommands) -> Result<()> {
    let app = ctx.planner.app();
    match command {
        AppCommands::Status { fiscal_year } => {
            let gate = app.gate(ctx.fiscal_year(fiscal_year)).await?;
            println!("📊 APP FY{}", gate.fiscal_year);
            println!(
                "   Rows: {} total, {} pending",
                gate.total_rows, gate.pending_rows
            );
            match gate.approved_at {
                Some(at) => println!("   ✅ Approved {}", at.format("%Y-%m-%d %H:%M")),
                None if gate.is_enabled() => println!("   🟢 Ready for HOPE approval"),
                None => println!("   ⏳ Not ready for approval"),
            }
        }
        AppCommands::Approve { fiscal_year } => {
            let approval = app
                .approve_app(ctx.fiscal_year(fiscal_year), ctx.actor()?)
                .await?;
            println!("🎉 APP FY{} approved", approval.fiscal_year);
        }
        AppCommands::Rows {
            fiscal_year,
            keyword,
            page,
        } => {
            let filter = RowFilter {
                fiscal_year: Some(ctx.fiscal_year(fiscal_year)),
                keyword,
                ..Default::default()
            };
            let result = app
                .list_rows(&filter, Page::number(page, ctx.per_page()))
                .await?;
            if result.items.is_empty() {
                println!("📭 No APP rows found");
            }
            for row in &result.items {
                let marker = if row.app_status == AppStatus::Approved { "✅" } else { "⏳" };
                println!(
                    "{marker} #{} PPMP #{} {}",
                    row.id, row.ppmp_id, row.general_description
                );
            }
            println!("   page {page}, {} total", result.total);
        }
    }
    Ok(())
}
