use anyhow::Result;

use super::CliContext;
use crate::cli::{UnitCommands, UserCommands};
use crate::model::{EndUser, NewUser};
use crate::store::UserFilter;

pub async fn schools(ctx: &CliContext, command: UnitCommands) -> Result<()> {
    let org = ctx.planner.organization();
    match command {
        UnitCommands::Add { name, head } => {
            let school = org.create_school(&name, head).await?;
            println!("🏫 Created school #{} {}", school.id, school.name);
        }
        UnitCommands::List => {
            let schools = org.schools().await?;
            if schools.is_empty() {
                println!("📭 No schools yet");
            }
            for school in schools {
                println!("🏫 #{} {} (head: {})", school.id, school.name, head_label(school.head_user_id));
            }
        }
        UnitCommands::SetHead { id, head } => {
            org.set_unit_head(EndUser::School(id), head).await?;
            println!("✅ School #{id} head set to {}", head_label(head));
        }
        UnitCommands::Delete { id } => {
            org.delete_school(id).await?;
            println!("🗑️  Deleted school #{id}");
        }
    }
    Ok(())
}

pub async fn offices(ctx: &CliContext, command: UnitCommands) -> Result<()> {
    let org = ctx.planner.organization();
    match command {
        UnitCommands::Add { name, head } => {
            let office = org.create_office(&name, head).await?;
            println!("🏢 Created office #{} {}", office.id, office.name);
        }
        UnitCommands::List => {
            let offices = org.offices().await?;
            if offices.is_empty() {
                println!("📭 No offices yet");
            }
            for office in offices {
                println!("🏢 #{} {} (head: {})", office.id, office.name, head_label(office.head_user_id));
            }
        }
        UnitCommands::SetHead { id, head } => {
            org.set_unit_head(EndUser::Office(id), head).await?;
            println!("✅ Office #{id} head set to {}", head_label(head));
        }
        UnitCommands::Delete { id } => {
            org.delete_office(id).await?;
            println!("🗑️  Deleted office #{id}");
        }
    }
    Ok(())
}

pub async fn users(ctx: &CliContext, command: UserCommands) -> Result<()> {
    let org = ctx.planner.organization();
    match command {
        UserCommands::Add {
            name,
            email,
            user_type,
            designation,
            school,
            office,
        } => {
            let user = org
                .create_user(NewUser {
                    name,
                    email,
                    user_type,
                    designation,
                    school_id: school,
                    office_id: office,
                })
                .await?;
            println!(
                "👤 Created user #{} {} <{}> ({})",
                user.id,
                user.name,
                user.email,
                user.user_type.label()
            );
        }
        UserCommands::List { active } => {
            let filter = UserFilter {
                active_only: active,
                ..Default::default()
            };
            for user in org.users(&filter).await? {
                let marker = if user.is_active { "👤" } else { "💤" };
                println!(
                    "{marker} #{} {} <{}> - {}",
                    user.id,
                    user.name,
                    user.email,
                    user.user_type.label()
                );
            }
        }
        UserCommands::Deactivate { id } => {
            org.set_active(id, false).await?;
            println!("💤 Deactivated user #{id}");
        }
        UserCommands::Activate { id } => {
            org.set_active(id, true).await?;
            println!("✅ Activated user #{id}");
        }
        UserCommands::Delete { id } => {
            org.delete_user(id).await?;
            println!("🗑️  Deleted user #{id}");
        }
    }
    Ok(())
}

fn head_label(head: Option<i64>) -> String {
    head.map(|id| format!("user #{id}"))
        .unwrap_or_else(|| "none".to_string())
}
