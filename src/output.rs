use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::services::backfill::BackfillData;
use crate::services::groups::ConnectedGroup;
use crate::services::import::ProjectsPage;

// Styling helpers

fn bright_yellow(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().yellow()
}

fn bright_green(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().green()
}

fn bright_red(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().red()
}

fn cyan(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).cyan()
}

fn dim(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).dim()
}

fn bright(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright()
}

fn magenta_bold(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).fg(TableColor::Cyan))
                .collect::<Vec<_>>(),
        );
    table
}

fn yes_no(value: bool) -> Cell {
    if value {
        Cell::new("yes").fg(TableColor::Green)
    } else {
        Cell::new("no").fg(TableColor::DarkGrey)
    }
}

// Banner

pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🧭 compass-gitlab"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitLab to Compass integration")
    );
}

// Progress tracking

/// Spinner on stderr for commands that wait on the network.
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn start(message: impl std::fmt::Display) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("  {msg} {spinner}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(bright_yellow(message).to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    pub fn finish(self, message: impl std::fmt::Display) {
        self.pb
            .finish_with_message(bright_green(format!("{message} ✓")).to_string());
    }

    pub fn fail(self, message: impl std::fmt::Display) {
        self.pb
            .abandon_with_message(bright_red(format!("{message} ✗")).to_string());
    }
}

// Rendering

pub fn render_validation(path: &str, errors: &[String]) -> String {
    if errors.is_empty() {
        return format!("{} {}\n", bright_green("✓"), bright(format!("{path} is valid")));
    }

    let mut output = format!(
        "{} {}\n",
        bright_red("✗"),
        bright(format!("{path} has {} problem(s)", errors.len())).underlined()
    );
    for error in errors {
        output.push_str(&format!("  {} {error}\n", cyan("•")));
    }
    output
}

pub fn render_groups(groups: &[ConnectedGroup]) -> String {
    if groups.is_empty() {
        return format!("{}\n", bright_yellow("No connected groups."));
    }

    let mut groups_table = table(&["ID", "Name", "Role", "Webhook pending"]);
    for group in groups {
        groups_table.add_row(vec![
            Cell::new(group.id),
            Cell::new(&group.name),
            Cell::new(group.role.map_or("unknown", |r| r.as_str())),
            yes_no(group.webhook_setup_in_progress),
        ]);
    }
    format!("{} {}\n{groups_table}\n", bright("👥"), bright("Connected Groups").underlined())
}

pub fn render_projects(page: &ProjectsPage) -> String {
    let mut output = format!(
        "{} {} {}\n",
        bright("📦"),
        bright("Projects").underlined(),
        dim(format!("({} total)", page.total))
    );

    if page.projects.is_empty() {
        output.push_str(&format!("{}\n", bright_yellow("No projects found.")));
        return output;
    }

    let mut projects_table = table(&["ID", "Name", "Labels", "Component", "Open compass MR", "URL"]);
    for project in &page.projects {
        projects_table.add_row(vec![
            Cell::new(project.id),
            Cell::new(&project.name),
            Cell::new(project.labels.join(", ")),
            yes_no(project.has_component),
            yes_no(project.has_open_compass_mr),
            Cell::new(&project.web_url),
        ]);
    }
    output.push_str(&format!("{projects_table}\n"));
    output
}

pub fn render_backfill(project: &str, data: &BackfillData) -> String {
    let mut output = format!("{} {}\n", bright("📊"), bright("Overview").underlined());
    output.push_str(&format!("  {} {}\n", dim("Project:"), cyan(project)));
    output.push_str(&format!(
        "  {} {}\n",
        dim("Builds:"),
        bright_yellow(data.builds.len())
    ));
    output.push_str(&format!(
        "  {} {}\n",
        dim("Deployments:"),
        bright_yellow(data.deployments.len())
    ));

    let metric = |value: Option<u64>, unit: &str| {
        value.map_or_else(|| "n/a".to_string(), |v| format!("{v}{unit}"))
    };
    output.push_str(&format!(
        "  {} {}\n",
        dim("MR cycle time:"),
        bright_yellow(metric(data.metrics.merge_request_cycle_time, "min"))
    ));
    output.push_str(&format!(
        "  {} {}\n\n",
        dim("Open MRs:"),
        bright_yellow(metric(data.metrics.open_merge_requests, ""))
    ));

    if !data.deployments.is_empty() {
        let mut deployments_table = table(&["Environment", "Category", "State", "Updated"]);
        for deployment in data.deployments.iter().take(10) {
            deployments_table.add_row(vec![
                Cell::new(&deployment.environment.display_name),
                Cell::new(format!("{:?}", deployment.environment.category)),
                Cell::new(format!("{:?}", deployment.state)),
                Cell::new(deployment.last_updated.format("%Y-%m-%d %H:%M UTC")),
            ]);
        }
        if data.deployments.len() > 10 {
            deployments_table.add_row(vec![
                Cell::new(format!("... and {} more", data.deployments.len() - 10)).fg(TableColor::DarkGrey),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
            ]);
        }
        output.push_str(&format!("{deployments_table}\n"));
    }

    output
}
