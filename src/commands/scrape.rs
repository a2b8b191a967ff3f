use anyhow::{Context, Result};
use chrono::NaiveDate;

use roomwatch::context::AppContext;

/// Run the continuous loop until Ctrl-C, then stop cooperatively
pub async fn run(ctx: AppContext) -> Result<()> {
    println!("Starting continuous scraper");
    println!("===========================");

    let scraper = ctx.continuous_scraper();
    let Some(handle) = scraper.start()? else {
        println!("Continuous scraper is already running");
        return Ok(());
    };

    let status = scraper.status()?;
    if let Some(date) = status.current_date {
        println!("Resuming after {date}");
    }
    println!("Press Ctrl-C to stop after the current day completes.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutdown signal received");
    println!("\nStopping; waiting for the in-flight day to finish...");
    scraper.stop()?;
    handle.await.context("Continuous scraper task panicked")?;

    let status = scraper.status()?;
    println!(
        "Stopped. Last completed date: {}",
        status
            .current_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    Ok(())
}

/// One historical backfill over `from..=to` (or the configured range)
pub async fn backfill(ctx: AppContext, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<()> {
    let backfill = ctx.historical_backfill(from, to)?;
    let (start, end) = backfill.range();

    println!("Historical backfill {start} ..= {end}");
    println!("==================================");

    let report = backfill
        .run()
        .await
        .context("Historical backfill halted")?;

    print_report(&report);
    Ok(())
}

/// One pass over today through the rolling horizon
pub async fn refresh(ctx: AppContext) -> Result<()> {
    println!("Upcoming refresh");
    println!("================");

    let report = ctx.upcoming_refresh().run().await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &roomwatch::scraper::RangeReport) {
    println!("\nDays: {}/{} succeeded", report.days_succeeded(), report.days_attempted);
    println!("  Fetched:    {}", report.totals.fetched);
    println!("  Inserted:   {}", report.totals.inserted);
    println!("  Updated:    {}", report.totals.updated);
    println!("  Unchanged:  {}", report.totals.unchanged);
    println!("  Reappeared: {}", report.totals.reappeared);

    if !report.failed_days.is_empty() {
        println!("\nFailed days (not retried):");
        for date in &report.failed_days {
            println!("  - {date}");
        }
    }
}
