use anyhow::Result;

use roomwatch::context::AppContext;
use roomwatch::models::ScraperType;
use roomwatch::storage::{CursorRepository, EventRepository};
use roomwatch::versioning::detect_changes;

/// Show every scraper cursor and the number of tracked events
pub fn status(ctx: &AppContext) -> Result<()> {
    println!("Scraper status");
    println!("==============");

    let cursors = ctx.repository.list_cursors()?;
    for kind in ScraperType::all() {
        match cursors.iter().find(|c| c.scraper_type == kind) {
            Some(cursor) => println!(
                "  {:<11} at {} ({}), updated {}",
                kind.as_str(),
                cursor.current_date,
                if cursor.enabled { "enabled" } else { "disabled" },
                cursor.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => println!("  {:<11} never run", kind.as_str()),
        }
    }

    println!("\nTracked events: {}", ctx.repository.event_count()?);
    Ok(())
}

/// Show the live row of an event and every archived version
pub fn history(ctx: &AppContext, event_id: i64) -> Result<()> {
    let Some(live) = ctx.repository.find_event(event_id)? else {
        println!("Event {event_id} is not tracked");
        return Ok(());
    };

    println!("Event {event_id}: {}", live.event.event_name);
    println!("================================");
    println!("  Version:      {}", live.version_number);
    println!("  Scheduled:    {} .. {}", live.event.event_start, live.event.event_end);
    println!("  Room:         {} ({})", live.event.room, live.event.building);
    println!("  First seen:   {}", live.created_at);
    println!("  Last changed: {}", live.updated_at);
    println!("  Last checked: {}", live.last_checked);
    if let Some(missing) = live.no_longer_found_at {
        println!("  Missing since {missing}");
    }

    let archived = ctx.repository.history(event_id)?;
    if archived.is_empty() {
        println!("\nNo earlier versions.");
        return Ok(());
    }

    println!("\nEarlier versions:");
    for (i, snapshot) in archived.iter().enumerate() {
        // Each snapshot differs from whatever replaced it
        let next = archived.get(i + 1).map_or(&live.event, |h| &h.event);
        println!(
            "  v{} archived {} ({} field(s) changed)",
            snapshot.version_number, snapshot.archived_at, snapshot.change_count
        );
        for change in detect_changes(next, &snapshot.event).unwrap_or_default() {
            println!("      {change}");
        }
    }
    Ok(())
}

/// Show the most recent constant-field violations
pub fn violations(ctx: &AppContext, limit: usize) -> Result<()> {
    let violations = ctx.repository.violations(limit)?;
    if violations.is_empty() {
        println!("No constant-field violations recorded");
        return Ok(());
    }

    println!("Latest {} constant-field violation(s):\n", violations.len());
    for v in &violations {
        println!(
            "  {}  event {}  {}: expected {:?}, found {:?}",
            v.detected_at.format("%Y-%m-%d %H:%M:%S"),
            v.event_id,
            v.field_name,
            v.expected_value,
            v.actual_value
        );
    }
    Ok(())
}
