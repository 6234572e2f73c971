use anyhow::{anyhow, Result};

use super::{Cli, Commands};
use crate::model::UserId;
use crate::planner::Planner;

pub mod inbox;
pub mod organization;
pub mod ppmp;
pub mod purchase;
pub mod review;
pub mod rows;

/// What every command runs against.
pub struct CliContext {
    pub planner: Planner,
    pub actor: Option<UserId>,
}

impl CliContext {
    pub fn new(planner: Planner, actor: Option<UserId>) -> Self {
        Self { planner, actor }
    }

    /// The `--as` user, required by every command that acts on a record.
    pub fn actor(&self) -> Result<UserId> {
        self.actor
            .ok_or_else(|| anyhow!("this command needs an acting user: pass --as <user-id>"))
    }

    pub fn fiscal_year(&self, explicit: Option<i32>) -> i32 {
        explicit.unwrap_or(self.planner.config().planning.current_fiscal_year)
    }

    pub fn per_page(&self) -> usize {
        self.planner.config().planning.per_page
    }
}

pub async fn run(cli: Cli, ctx: &CliContext) -> Result<()> {
    match cli.command {
        None => show_how_to_start(),
        Some(Commands::School { command }) => organization::schools(ctx, command).await,
        Some(Commands::Office { command }) => organization::offices(ctx, command).await,
        Some(Commands::User { command }) => organization::users(ctx, command).await,
        Some(Commands::Ppmp { command }) => ppmp::execute(ctx, command).await,
        Some(Commands::Row { command }) => rows::execute(ctx, command).await,
        Some(Commands::Transition {
            ppmp_id,
            action,
            remark,
        }) => review::transition(ctx, ppmp_id, action, remark).await,
        Some(Commands::Actions { ppmp_id }) => review::actions(ctx, ppmp_id).await,
        Some(Commands::History { ppmp_id }) => review::history(ctx, ppmp_id).await,
        Some(Commands::Bac { command }) => review::bac(ctx, command).await,
        Some(Commands::App { command }) => review::app(ctx, command).await,
        Some(Commands::Pr { command }) => purchase::execute(ctx, command).await,
        Some(Commands::Notifications {
            unread,
            mark_read,
            mark_all,
        }) => inbox::execute(ctx, unread, mark_read, mark_all).await,
    }
}

pub fn show_how_to_start() -> Result<()> {
    println!("📋 PPMP Planner - Procurement Planning Workflow");
    println!();
    println!("To get started:");
    println!("  🏫 ppmp-planner school add \"Central ES\"       # Register a school");
    println!("  👤 ppmp-planner user add NAME EMAIL --type ...  # Register a user");
    println!("  📝 ppmp-planner --as 1 ppmp create --school 1   # Start a draft PPMP");
    println!("  ➕ ppmp-planner --as 1 row add 1 --description ...");
    println!("  🚀 ppmp-planner --as 1 transition 1 submit-to-unit-head");
    println!();
    println!("Reviewers:");
    println!("  📥 ppmp-planner --as 2 ppmp submissions         # What is waiting on you");
    println!("  🔔 ppmp-planner --as 2 notifications");
    println!();
    println!("💡 Every command that changes a record needs --as <user-id>.");
    Ok(())
}
