use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use serde_json::Value;

use crate::app::{App, InputMode};
use crate::model::ResourceKind;
use crate::nav::Overlay;
use crate::session::SessionPhase;
use crate::view::ViewRow;

const BG: Color = Color::Rgb(11, 17, 28);
const PANEL: Color = Color::Rgb(18, 28, 46);
const ACCENT: Color = Color::Rgb(56, 189, 248);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const OK: Color = Color::Rgb(52, 211, 153);

pub fn render(frame: &mut Frame, app: &App) {
    let banner = app.metrics_degraded().is_some();
    let mut constraints = vec![Constraint::Length(1)];
    if banner {
        constraints.push(Constraint::Length(1));
    }
    constraints.push(Constraint::Min(6));
    constraints.push(Constraint::Length(1));

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.area());

    render_header(frame, root[0], app);
    let body_index = if banner {
        render_metrics_banner(frame, root[1], app);
        2
    } else {
        1
    };
    render_table(frame, root[body_index], app);
    render_footer(frame, root[body_index + 1], app);

    if let Some(overlay) = app.overlay() {
        match overlay {
            Overlay::Help => render_help_modal(frame),
            Overlay::DeleteConfirm {
                namespace, name, ..
            } => render_delete_confirm(frame, namespace.as_deref(), name),
            Overlay::Detail { title, body }
            | Overlay::Logs { title, body }
            | Overlay::Shell { title, body }
            | Overlay::Yaml { title, body } => {
                render_text_overlay(frame, title, body, app.overlay_scroll());
            }
        }
    }

    if app.config_switch_active() {
        render_config_switch(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let phase = match app.phase() {
        SessionPhase::Connecting => Span::styled("connecting", Style::default().fg(WARN)),
        SessionPhase::Open => Span::styled("live", Style::default().fg(OK)),
        SessionPhase::ClosedClean => Span::styled("closed", Style::default().fg(MUTED)),
        SessionPhase::ClosedError => Span::styled("error", Style::default().fg(ERROR)),
    };

    let left = Line::from(vec![
        Span::styled(
            " periscope ",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::styled(app.scope().describe(), Style::default().fg(Color::White)),
        Span::raw("  "),
        phase,
    ]);
    let right = Line::from(vec![
        Span::styled(app.context().to_string(), Style::default().fg(ACCENT)),
        Span::styled(format!(" {} ", app.user()), Style::default().fg(MUTED)),
        Span::styled(app.cluster().to_string(), Style::default().fg(MUTED)),
    ]);

    let right_width = (right.width() as u16).min(area.width / 2);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(Paragraph::new(left).style(Style::default().bg(BG)), chunks[0]);
    frame.render_widget(Paragraph::new(right).style(Style::default().bg(BG)), chunks[1]);
}

fn render_metrics_banner(frame: &mut Frame, area: Rect, app: &App) {
    let reason = app.metrics_degraded().unwrap_or_default();
    let line = Line::from(vec![
        Span::styled(" metrics degraded ", Style::default().fg(Color::Black).bg(WARN)),
        Span::styled(
            format!(" {reason} (usage columns show 0, polling suspended)"),
            Style::default().fg(WARN),
        ),
    ]);
    frame.render_widget(Paragraph::new(line).style(Style::default().bg(BG)), area);
}

fn render_table(frame: &mut Frame, area: Rect, app: &App) {
    if let Some(error) = app.scope_error() {
        let panel = Paragraph::new(format!("Connection failed:\n{error}\n\nPress r to retry."))
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .title(app.scope().kind.title())
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(ERROR))
                    .style(Style::default().bg(PANEL)),
            )
            .style(Style::default().fg(ERROR));
        frame.render_widget(panel, area);
        return;
    }

    if app.rows().is_empty() && app.phase() == SessionPhase::Connecting {
        let panel = Paragraph::new(format!("Streaming {}…", app.scope().kind.plural()))
            .block(
                Block::default()
                    .title(app.scope().kind.title())
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(MUTED))
                    .style(Style::default().bg(PANEL)),
            )
            .style(Style::default().fg(MUTED));
        frame.render_widget(panel, area);
        return;
    }

    let headers = table_headers(app);
    let header_row = Row::new(headers.iter().map(|header| {
        Cell::from(header.clone()).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let rows = app.rows().iter().map(|row| {
        Row::new(
            row_cells(app, row)
                .into_iter()
                .map(|column| Cell::from(column).style(Style::default().fg(Color::White))),
        )
    });

    let direction = if app.sort_desc() { "v" } else { "^" };
    let title = format!(
        "{} ({}) sorted by {}{}{}",
        app.scope().kind.title(),
        app.rows().len(),
        app.sort_key().label(),
        direction,
        if app.filter().is_empty() {
            String::new()
        } else {
            format!("  /{}", app.filter())
        }
    );
    let table = Table::new(rows, column_constraints(headers.len()))
        .header(header_row)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(Color::Rgb(28, 42, 66))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = TableState::default();
    if !app.rows().is_empty() {
        state.select(Some(app.cursor()));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn table_headers(app: &App) -> Vec<String> {
    let mut headers = Vec::new();
    if app.show_namespace_column() {
        headers.push("NAMESPACE".to_string());
    }
    headers.push("NAME".to_string());
    match app.scope().kind {
        ResourceKind::Pods => {
            for header in [
                "READY", "STATUS", "RESTARTS", "CPU", "MEM", "%CPU/R", "%CPU/L", "%MEM/R",
                "%MEM/L", "AGE",
            ] {
                headers.push(header.to_string());
            }
        }
        ResourceKind::Nodes => {
            for header in ["STATUS", "CPU", "MEM", "AGE"] {
                headers.push(header.to_string());
            }
        }
        _ => {
            headers.push("STATUS".to_string());
            headers.push("AGE".to_string());
        }
    }
    headers
}

fn row_cells(app: &App, row: &ViewRow) -> Vec<String> {
    let mut cells = Vec::new();
    if app.show_namespace_column() {
        cells.push(row.object.namespace().to_string());
    }
    cells.push(row.object.name().to_string());
    match app.scope().kind {
        ResourceKind::Pods => {
            cells.push(format!("{}/{}", row.ready.0, row.ready.1));
            cells.push(
                row.object
                    .status_phase()
                    .unwrap_or("Pending")
                    .to_string(),
            );
            cells.push(row.restarts.to_string());
            cells.push(format_cpu(row.cpu_millicores()));
            cells.push(format_mem(row.memory_kibibytes()));
            cells.push(format!("{}%", row.cpu_of_request_pct));
            cells.push(format!("{}%", row.cpu_of_limit_pct));
            cells.push(format!("{}%", row.mem_of_request_pct));
            cells.push(format!("{}%", row.mem_of_limit_pct));
        }
        ResourceKind::Nodes => {
            cells.push(node_status(&row.object.payload));
            cells.push(format_cpu(row.cpu_millicores()));
            cells.push(format_mem(row.memory_kibibytes()));
        }
        _ => {
            cells.push(row.object.status_phase().unwrap_or("Active").to_string());
        }
    }
    cells.push(row.age_label());
    cells
}

fn node_status(payload: &Value) -> String {
    let ready = payload
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|condition| condition.get("type").and_then(Value::as_str) == Some("Ready"))
        })
        .and_then(|condition| condition.get("status").and_then(Value::as_str));
    if ready == Some("True") {
        "Ready".to_string()
    } else {
        "NotReady".to_string()
    }
}

/// Integer rounding happens here, at presentation time.
fn format_cpu(millicores: f64) -> String {
    format!("{}m", millicores.round() as u64)
}

fn format_mem(kibibytes: f64) -> String {
    format!("{} Mi", (kibibytes / 1024.0).round() as u64)
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let line = match app.mode() {
        InputMode::Command => Line::from(vec![
            Span::styled(" : ", Style::default().fg(Color::Black).bg(ACCENT)),
            Span::styled(
                format!("{}▎", app.input()),
                Style::default().fg(Color::White),
            ),
        ]),
        InputMode::Filter => Line::from(vec![
            Span::styled(" / ", Style::default().fg(Color::Black).bg(ACCENT)),
            Span::styled(
                format!("{}▎", app.input()),
                Style::default().fg(Color::White),
            ),
        ]),
        InputMode::Confirm => Line::from(Span::styled(
            " confirm with y, cancel with n ",
            Style::default().fg(Color::Black).bg(WARN),
        )),
        InputMode::Normal => Line::from(vec![
            Span::styled(" nrm ", Style::default().fg(Color::White).bg(PANEL)),
            Span::styled(format!(" {}", app.status()), Style::default().fg(MUTED)),
        ]),
    };
    frame.render_widget(Paragraph::new(line).style(Style::default().bg(BG)), area);
}

fn render_text_overlay(frame: &mut Frame, title: &str, body: &str, scroll: u16) {
    let area = centered_rect(84, 80, frame.area());
    frame.render_widget(Clear, area);
    let panel = Paragraph::new(body.to_string())
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0))
        .block(
            Block::default()
                .title(title.to_string())
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(panel, area);
}

fn render_delete_confirm(frame: &mut Frame, namespace: Option<&str>, name: &str) {
    let area = centered_rect(50, 20, frame.area());
    frame.render_widget(Clear, area);
    let target = match namespace {
        Some(namespace) => format!("{namespace}/{name}"),
        None => name.to_string(),
    };
    let panel = Paragraph::new(format!("\nDelete {target}?\n\ny: delete    n: cancel"))
        .alignment(ratatui::layout::Alignment::Center)
        .block(
            Block::default()
                .title("Confirm delete")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ERROR))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(panel, area);
}

fn render_help_modal(frame: &mut Frame) {
    let area = centered_rect(60, 70, frame.area());
    frame.render_widget(Clear, area);
    let body = [
        ("j / k", "move the cursor"),
        ("Enter", "activate row (drill down / logs)"),
        (":", "command mode (resource, ns <name>, all, exec)"),
        ("/", "filter rows by name or phase"),
        ("Esc", "close overlay, then clear selectors and filter"),
        ("d", "detail overlay"),
        ("y", "YAML overlay"),
        ("l", "pod logs"),
        ("s", "exec in pod"),
        ("Ctrl-d", "delete (with confirmation)"),
        ("c", "switch kubeconfig context"),
        ("0", "all namespaces"),
        ("Shift-N/A/C/M/T", "sort by name/age/cpu/mem/restarts"),
        ("r", "reconnect the current scope"),
        ("q", "quit"),
    ]
    .iter()
    .map(|(key, text)| {
        Line::from(vec![
            Span::styled(format!(" {key:<16}"), Style::default().fg(ACCENT)),
            Span::styled((*text).to_string(), Style::default().fg(Color::White)),
        ])
    })
    .collect::<Vec<_>>();

    let panel = Paragraph::new(body).block(
        Block::default()
            .title("Help")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(ACCENT))
            .style(Style::default().bg(PANEL)),
    );
    frame.render_widget(panel, area);
}

fn render_config_switch(frame: &mut Frame, app: &App) {
    let area = centered_rect(50, 60, frame.area());
    frame.render_widget(Clear, area);

    let lines = if app.contexts().is_empty() {
        vec![Line::from(Span::styled(
            " no kubeconfig contexts found ",
            Style::default().fg(MUTED),
        ))]
    } else {
        app.contexts()
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let mut style = Style::default().fg(Color::White);
                if index == app.config_cursor() {
                    style = style.bg(Color::Rgb(28, 42, 66)).add_modifier(Modifier::BOLD);
                }
                let marker = if name == app.context() { "*" } else { " " };
                Line::from(Span::styled(format!(" {marker} {name}"), style))
            })
            .collect()
    };

    let panel = Paragraph::new(lines).block(
        Block::default()
            .title("Switch context (Enter to select, Esc to close)")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(ACCENT))
            .style(Style::default().bg(PANEL)),
    );
    frame.render_widget(panel, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn column_constraints(columns: usize) -> Vec<Constraint> {
    if columns == 0 {
        return vec![Constraint::Percentage(100)];
    }

    let width = (100 / columns as u16).max(1);
    (0..columns)
        .map(|_| Constraint::Percentage(width))
        .collect()
}
