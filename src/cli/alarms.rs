// CLI alarm commands: set, list, del, kill

use anyhow::Context;
use chrono::{DateTime, FixedOffset};

use super::parse_time;
use crate::app::App;
use crate::controller::NO_ALARM_RUNNING;
use crate::spool::fire_time::wall_clock;

/// Render a wall-clock time in 24 or 12 hour form.
pub fn format_time(time: &DateTime<FixedOffset>, time_24hr_format: bool) -> String {
    if time_24hr_format {
        time.format("%a %Y-%m-%d %H:%M").to_string()
    } else {
        time.format("%a %Y-%m-%d %I:%M %p").to_string()
    }
}

/// One line of `list` output: right-aligned timestamp, then the time.
pub fn format_list_line(timestamp: i64, time: &str) -> String {
    format!("{:>11}  {}", timestamp, time)
}

/// ffalarms set
pub fn cmd_set(app: &App, time: &str, json: bool) -> anyhow::Result<()> {
    let (hour, minute) = parse_time(time).map_err(|e| anyhow::anyhow!(e))?;
    let player = app.config.player_command()?;
    let repeat = app.config.repeat()?;

    let alarm = app.emitter.schedule(hour, minute, &player, repeat)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&alarm).context("Failed to serialize alarm")?
        );
        return Ok(());
    }

    println!(
        "Alarm set for {} ({})",
        format_time(&alarm.fire_time, app.config.time_24hr_format()),
        alarm.job_id
    );
    Ok(())
}

/// ffalarms list
pub fn cmd_list(app: &App, json: bool) -> anyhow::Result<()> {
    let alarms = app.registry().list_alarms()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&alarms).context("Failed to serialize alarms")?
        );
        return Ok(());
    }

    for alarm in &alarms {
        let time = wall_clock(alarm.timestamp, app.config.timezone.as_deref())?;
        println!(
            "{}",
            format_list_line(
                alarm.timestamp,
                &format_time(&time, app.config.time_24hr_format())
            )
        );
    }
    Ok(())
}

/// ffalarms del
pub fn cmd_del(app: &App, timestamp: i64) -> anyhow::Result<()> {
    if let Some(diagnostics) = app.controller.delete_by_timestamp(timestamp)? {
        eprintln!("{}", diagnostics);
    }
    Ok(())
}

/// ffalarms kill
pub fn cmd_kill(app: &App) -> anyhow::Result<()> {
    if !app.controller.kill()? {
        eprintln!("{}", NO_ALARM_RUNNING);
    }
    Ok(())
}
