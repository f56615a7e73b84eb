//! Terminal rendering of race views
//!
//! Tables are rendered with `tabled`; the watched rider's row carries a
//! marker and is highlighted with `colored` after layout so ANSI codes do
//! not skew column widths.

use colored::*;
use tabled::{settings::Style, Table, Tabled};

use crate::course::ElevationProfile;
use crate::database::RaceSummary;
use crate::groups::Group;
use crate::models::DataStatus;
use crate::session::{ChartSeries, CompareTarget, RaceView};
use crate::units::{format_clock, format_gap};

const WATCHED_MARKER: &str = "▶";

#[derive(Tabled)]
struct StandingRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Rider")]
    name: String,
    #[tabled(rename = "Km")]
    distance: String,
    #[tabled(rename = "Progress")]
    progress: String,
    #[tabled(rename = "Power")]
    power: String,
}

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Group")]
    name: String,
    #[tabled(rename = "Riders")]
    riders: String,
    #[tabled(rename = "Avg W")]
    average_power: i64,
    #[tabled(rename = "Gap")]
    gap: String,
}

#[derive(Tabled)]
struct RaceRow {
    #[tabled(rename = "Event")]
    event_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Riders")]
    riders: usize,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

fn highlight_marked(table: String) -> String {
    table
        .lines()
        .map(|line| {
            if line.contains(WATCHED_MARKER) {
                line.yellow().bold().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn marker(watched: bool) -> &'static str {
    if watched {
        WATCHED_MARKER
    } else {
        ""
    }
}

/// One-line header: event, cursor, play state, data completeness
pub fn status_line(view: &RaceView<'_>) -> String {
    let playback = &view.playback;
    let state = if playback.is_playing {
        "playing".green()
    } else {
        "paused".dimmed()
    };
    let status = match view.status {
        DataStatus::Empty => "no data".red().to_string(),
        DataStatus::Partial { fetched, total } => {
            format!("loading {}/{}", fetched, total).yellow().to_string()
        }
        DataStatus::Complete => "complete".green().to_string(),
    };

    format!(
        "{}  {} / {}  {} {}  [{}]",
        view.event_name.bold(),
        format_clock(playback.cursor_seconds),
        format_clock(playback.max_time_seconds),
        state,
        playback.speed,
        status
    )
}

/// Rank, gaps and compare figures for the watched rider
pub fn watched_summary(view: &RaceView<'_>) -> Option<String> {
    let id = view.watched?;
    let standing = view.snapshot.find(id)?;

    let mut line = format!(
        "{} P{}  leader {}  group ahead {}",
        standing.name.yellow().bold(),
        standing.rank,
        view.watched_gaps.to_leader_display(),
        view.watched_gaps.to_group_ahead_display()
    );

    if let Some(compare) = &view.compare {
        let relation = if compare.gap_seconds >= 0 {
            format!("{} ahead", format_gap(compare.gap_seconds))
        } else {
            format!("{} behind", format_gap(-compare.gap_seconds))
        };
        line.push_str(&format!(
            "  vs {} {} ({:.0} W)",
            compare.label.cyan(),
            relation,
            compare.current_power
        ));
    }
    Some(line)
}

/// Full standings, optionally limited to the first `limit` rows
pub fn standings_table(view: &RaceView<'_>, limit: Option<usize>) -> String {
    let rows: Vec<StandingRow> = view
        .snapshot
        .standings
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|s| StandingRow {
            marker: marker(Some(s.id) == view.watched),
            rank: s.rank,
            name: s.name.to_string(),
            distance: format!("{:.2}", s.current_distance_km),
            progress: format!("{:.1}%", s.progress * 100.0),
            power: format!("{:.0}", s.current_power),
        })
        .collect();

    highlight_marked(Table::new(rows).with(Style::rounded()).to_string())
}

fn group_riders(group: &Group<'_>, expanded: bool) -> String {
    if expanded {
        group
            .members
            .iter()
            .map(|m| format!("{}. {}", m.rank, m.name))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        match group.len() {
            1 => group.members[0].name.to_string(),
            n => format!("{} riders", n),
        }
    }
}

/// Group list; expanded groups list their members
pub fn groups_table(view: &RaceView<'_>) -> String {
    let rows: Vec<GroupRow> = view
        .groups
        .iter()
        .map(|g| GroupRow {
            marker: marker(g.contains_watched),
            name: g.name.clone(),
            riders: group_riders(g, view.is_group_expanded(g.index)),
            average_power: g.average_power,
            gap: if g.index == 0 {
                "-".to_string()
            } else {
                format_gap(g.gap_to_leader_seconds)
            },
        })
        .collect();

    highlight_marked(Table::new(rows).with(Style::rounded()).to_string())
}

/// A complete frame as printed by the replay command
pub fn render_frame(view: &RaceView<'_>, standings_limit: usize) -> String {
    if view.is_empty() {
        return format!("{}\n{}", status_line(view), "Waiting for rider data...".dimmed());
    }

    let mut out = status_line(view);
    if let Some(summary) = watched_summary(view) {
        out.push('\n');
        out.push_str(&summary);
    }
    out.push('\n');
    out.push_str(&groups_table(view));
    out.push('\n');
    out.push_str(&standings_table(view, Some(standings_limit)));
    out
}

/// Stored races
pub fn races_table(races: &[RaceSummary]) -> String {
    let rows: Vec<RaceRow> = races
        .iter()
        .map(|r| RaceRow {
            event_id: r.event_id.clone(),
            name: r.event_name.clone(),
            riders: r.rider_count,
            status: if r.in_progress { "in progress" } else { "complete" }.to_string(),
            updated: r
                .updated_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Smallest row spacing of a chart table
const MIN_CHART_STEP_SECONDS: f64 = 1.0;

/// Chart series as a table sampled every `step_seconds`
pub fn chart_table(series: &[ChartSeries], step_seconds: f64) -> String {
    // Rows finer than one sample only repeat values
    let step = if step_seconds.is_finite() && step_seconds > 0.0 {
        step_seconds.max(MIN_CHART_STEP_SECONDS)
    } else {
        60.0
    };

    let mut header = vec!["Time".to_string()];
    header.extend(series.iter().map(|s| match s.source {
        CompareTarget::Group(_) => format!("{} (avg)", s.label),
        _ => s.label.clone(),
    }));

    let mut builder = tabled::builder::Builder::default();
    builder.push_record(header);

    let last_time = series
        .iter()
        .filter_map(|s| s.points.last().map(|p| p.0))
        .fold(0.0_f64, f64::max);
    let mut time = 0.0;
    while time <= last_time {
        let mut record = vec![format_clock(time)];
        for line in series {
            let value = line
                .points
                .iter()
                .take_while(|p| p.0 <= time)
                .last()
                .map(|p| format!("{:.1}", p.1))
                .unwrap_or_else(|| "-".to_string());
            record.push(value);
        }
        builder.push_record(record);
        time += step;
    }

    builder.build().with(Style::rounded()).to_string()
}

/// Course summary line
pub fn profile_summary(profile: &ElevationProfile) -> String {
    match (profile.points.first(), profile.points.last()) {
        (Some(first), Some(last)) => format!(
            "Course {:.1} km, {:.0} m climbing, {:.0} m to {:.0} m",
            last.0 - first.0,
            profile.elevation_gain(),
            first.1,
            last.1
        ),
        _ => "No course profile".to_string(),
    }
}
