use anyhow::Result;

use super::CliContext;

pub async fn execute(
    ctx: &CliContext,
    unread_only: bool,
    mark_read: Option<i64>,
    mark_all: bool,
) -> Result<()> {
    let inbox = ctx.planner.inbox();
    let user_id = ctx.actor()?;

    if let Some(id) = mark_read {
        inbox.mark_read(id, user_id).await?;
        println!("✅ Notification #{id} marked as read");
        return Ok(());
    }
    if mark_all {
        let count = inbox.mark_all_read(user_id).await?;
        println!("✅ Marked {count} notification(s) as read");
        return Ok(());
    }

    let notifications = inbox.notifications_for(user_id, unread_only).await?;
    if notifications.is_empty() {
        println!("📭 No notifications");
        return Ok(());
    }
    println!(
        "🔔 {} unread of {}",
        inbox.unread_count(user_id).await?,
        notifications.len()
    );
    for n in notifications {
        let marker = if n.is_read() { "  " } else { "🆕" };
        println!("{marker} #{} {} - {}", n.id, n.title, n.message);
        if let Some(link) = &n.link {
            println!("      {link}");
        }
    }
    Ok(())
}
