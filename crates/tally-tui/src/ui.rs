use std::iter;

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use tally_core::{ChartSpec, Message, Origin, Payload, Table};

use crate::app::{App, FocusPane, InputMode};

/// Widest a table column or chart label may grow before it is truncated.
const MAX_CELL_WIDTH: usize = 24;
const BAR_WIDTH: usize = 30;
const MAX_SUGGESTION_ROWS: usize = 5;
const SERIES_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Magenta,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Red,
];

fn flush_plain(spans: &mut Vec<Span<'static>>, plain: &mut String) {
    if !plain.is_empty() {
        spans.push(Span::raw(std::mem::take(plain)));
    }
}

/// Style `**bold**`, `*italic*` and `[label](url)` runs; anything unclosed stays literal.
fn parse_markup_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix("**") {
            if let Some(end) = after.find("**").filter(|&end| end > 0) {
                flush_plain(&mut spans, &mut plain);
                spans.push(Span::styled(
                    after[..end].to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                ));
                rest = &after[end + 2..];
                continue;
            }
        } else if let Some(after) = rest.strip_prefix('*') {
            // "* item" is a bullet, not emphasis
            let opens = after.chars().next().is_some_and(|c| !c.is_whitespace());
            if let Some(end) = after.find('*').filter(|&end| opens && end > 0) {
                flush_plain(&mut spans, &mut plain);
                spans.push(Span::styled(
                    after[..end].to_string(),
                    Style::default().add_modifier(Modifier::ITALIC),
                ));
                rest = &after[end + 1..];
                continue;
            }
        } else if let Some(after) = rest.strip_prefix('[') {
            if let Some((label, tail)) = after.split_once("](") {
                if let Some((url, tail)) = tail.split_once(')') {
                    if !label.is_empty() && !label.contains(']') {
                        flush_plain(&mut spans, &mut plain);
                        spans.push(Span::styled(
                            label.to_string(),
                            Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
                        ));
                        spans.push(Span::styled(
                            format!(" ({})", url),
                            Style::default().fg(Color::DarkGray),
                        ));
                        rest = tail;
                        continue;
                    }
                }
            }
        }

        plain.push(c);
        rest = &rest[c.len_utf8()..];
    }

    flush_plain(&mut spans, &mut plain);

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn fit(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len > width {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    } else {
        format!("{}{}", text, " ".repeat(width - len))
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// Lay a table out as aligned text: header, rule, then one line per row.
fn table_lines(table: &Table) -> Vec<Line<'static>> {
    let columns = table.columns();
    let headers: Vec<String> = columns.iter().map(|c| Table::header_label(c)).collect();
    let rows: Vec<Vec<String>> = table
        .rows()
        .iter()
        .map(|row| columns.iter().map(|c| Table::cell_text(row, c)).collect())
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
                .clamp(1, MAX_CELL_WIDTH)
        })
        .collect();

    let join = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| fit(cell, *width))
            .collect::<Vec<_>>()
            .join(" │ ")
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(Line::from(Span::styled(
        join(&headers),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(Span::styled(
        widths
            .iter()
            .map(|w| "─".repeat(*w))
            .collect::<Vec<_>>()
            .join("─┼─"),
        Style::default().fg(Color::DarkGray),
    )));
    for row in &rows {
        lines.push(Line::from(join(row)));
    }
    lines
}

/// Text rendition of a chart: bars per label, or a point listing for
/// scatter and bubble charts.
fn chart_lines(chart: &ChartSpec) -> Vec<Line<'static>> {
    let series = chart.series();
    let mut heading = vec![Span::styled(
        format!("[{} chart]", chart.kind.as_str()),
        Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
    )];
    if let Some(title) = chart.title() {
        heading.push(Span::styled(format!(" {}", title), Style::default().bold()));
    }
    let mut lines = vec![Line::from(heading)];
    let show_legend = chart.legend_visible();

    if series.datasets.is_empty() {
        lines.push(Line::from(Span::styled(
            "(no data)",
            Style::default().fg(Color::DarkGray),
        )));
        return lines;
    }

    let label_width = series
        .labels
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(3, MAX_CELL_WIDTH);

    for (i, dataset) in series.datasets.iter().enumerate() {
        let color = SERIES_COLORS[i % SERIES_COLORS.len()];
        if show_legend {
            lines.push(Line::from(Span::styled(dataset.label.clone(), Style::default().fg(color).bold())));
        }

        if chart.kind.is_point_based() {
            for (j, point) in dataset.values.iter().enumerate() {
                let Some(point) = point else { continue };
                let x = point.x.unwrap_or(j as f64);
                let text = match point.r {
                    Some(r) => format!("  ({}, {}) r={}", format_number(x), format_number(point.y), format_number(r)),
                    None => format!("  ({}, {})", format_number(x), format_number(point.y)),
                };
                lines.push(Line::from(text));
            }
            continue;
        }

        let max = dataset
            .values
            .iter()
            .flatten()
            .map(|p| p.y.abs())
            .fold(0.0_f64, f64::max);

        for (j, value) in dataset.values.iter().enumerate() {
            let label = series
                .labels
                .get(j)
                .cloned()
                .unwrap_or_else(|| format!("#{}", j + 1));
            let prefix = format!("  {} ", fit(&label, label_width));
            match value {
                Some(point) => {
                    let len = if max > 0.0 {
                        ((point.y.abs() / max) * BAR_WIDTH as f64).round() as usize
                    } else {
                        0
                    };
                    lines.push(Line::from(vec![
                        Span::raw(prefix),
                        Span::styled("█".repeat(len), Style::default().fg(color)),
                        Span::raw(format!(" {}", format_number(point.y))),
                    ]));
                }
                None => {
                    lines.push(Line::from(vec![
                        Span::raw(prefix),
                        Span::styled("-", Style::default().fg(Color::DarkGray)),
                    ]));
                }
            }
        }
    }
    lines
}

fn message_lines(msg: &Message) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    match msg.origin {
        Origin::User => {
            lines.push(Line::from(Span::styled(
                "You:",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            lines.extend(msg.text.lines().map(|l| Line::from(l.to_string())));
        }
        Origin::Assistant => {
            lines.push(Line::from(Span::styled(
                "Assistant:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            match &msg.payload {
                Payload::Notice(_) => {
                    let style = Style::default().fg(Color::Red);
                    lines.extend(msg.text.lines().map(|l| Line::from(Span::styled(l.to_string(), style))));
                }
                Payload::FileDownloadAck { .. } => {
                    lines.push(Line::from(vec![
                        Span::styled("⬇ ", Style::default().fg(Color::Green)),
                        Span::styled(msg.text.clone(), Style::default().fg(Color::Green)),
                    ]));
                }
                payload => {
                    lines.extend(msg.text.lines().map(parse_markup_line));
                    match payload {
                        Payload::Table(table) => lines.extend(table_lines(table)),
                        Payload::Chart(chart) => lines.extend(chart_lines(chart)),
                        _ => {}
                    }
                }
            }
        }
    }

    lines.push(Line::default());
    lines
}

/// Rows the lines occupy once wrapped to `width`.
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    let rows: usize = lines
        .iter()
        .map(|line| line.width().div_ceil(width).max(1))
        .sum();
    rows.min(u16::MAX as usize) as u16
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let suggestions_height = if app.suggestions_visible() {
        (app.session.suggestions().len().min(MAX_SUGGESTION_ROWS) + 2) as u16 // +2 for borders
    } else {
        0
    };

    // Main layout: header, transcript, suggestions, input, footer
    let [header_area, chat_area, suggestions_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(suggestions_height),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_transcript(app, frame, chat_area);
    render_suggestions(app, frame, suggestions_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let activity = if app.snapshot.loading {
        Span::styled(" ● waiting for reply ", Style::default().fg(Color::Yellow))
    } else {
        Span::raw("")
    };

    let title = Line::from(vec![
        Span::styled(" Tally ", Style::default().fg(Color::Cyan).bold()),
        Span::styled("AI Tax Assistant ", Style::default().fg(Color::White)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
        activity,
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing and inner size for scrolling
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    let inner_width = area.width.saturating_sub(2);

    let border_color = if app.focus == FocusPane::Transcript {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", app.backend_url));

    let conversation = &app.snapshot.conversation;
    let lines: Vec<Line> = if conversation.is_empty() && !app.snapshot.loading {
        vec![Line::from(Span::styled(
            "Ask a question about your tax data...",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        let mut lines: Vec<Line> = conversation.messages().iter().flat_map(message_lines).collect();

        if app.snapshot.loading {
            lines.push(Line::from(Span::styled(
                "Assistant:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }
        lines
    };

    let max_scroll = wrapped_height(&lines, inner_width).saturating_sub(app.chat_height);
    app.chat_scroll = if app.follow_tail {
        max_scroll
    } else {
        app.chat_scroll.min(max_scroll)
    };

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_suggestions(app: &mut App, frame: &mut Frame, area: Rect) {
    if area.height == 0 {
        app.suggestions_area = None;
        return;
    }
    app.suggestions_area = Some(area);

    let focused = app.focus == FocusPane::Suggestions;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { Color::Cyan } else { Color::Magenta }))
        .title(" Try asking (Tab to focus, Enter to ask) ");

    let items: Vec<ListItem> = app
        .session
        .suggestions()
        .iter()
        .map(|s| ListItem::new(format!(" {} ", s)))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(if focused {
            Style::default()
                .bg(Color::Magenta)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        })
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.suggestion_state);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let loading = app.snapshot.loading;
    let border_color = if loading {
        Color::DarkGray
    } else if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::Gray
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(if loading { " Waiting for reply... " } else { " Ask " });

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .pending_input()
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let text_color = if loading { Color::DarkGray } else { Color::Cyan };
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(text_color))
        .block(block);

    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing && !loading {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" CHAT ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INPUT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = match app.input_mode {
        InputMode::Normal => {
            let mut hints = vec![
                Span::styled(" i ", key_style),
                Span::styled(" type ", label_style),
                Span::styled(" j/k ", key_style),
                Span::styled(" scroll ", label_style),
            ];
            if app.suggestions_visible() {
                hints.extend(vec![
                    Span::styled(" Tab ", key_style),
                    Span::styled(" suggestions ", label_style),
                ]);
            }
            hints.extend(vec![
                Span::styled(" e ", key_style),
                Span::styled(" export table ", label_style),
            ]);
            hints
        }
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
        ],
    };
    hints.extend(vec![
        Span::styled(" ^R ", key_style),
        Span::styled(" reset ", label_style),
        Span::styled(" ^L ", key_style),
        Span::styled(" clear ", label_style),
    ]);
    if app.input_mode == InputMode::Normal {
        hints.extend(vec![
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ]);
    }
    if let Some(status) = &app.status {
        hints.push(Span::styled(format!("  {}", status), Style::default().fg(Color::Yellow)));
    }

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_core::ChartKind;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn table(value: serde_json::Value) -> Table {
        let rows = value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().unwrap().clone())
            .collect();
        Table::new(rows).unwrap()
    }

    #[test]
    fn test_markup_bold_and_italic() {
        let line = parse_markup_line("Total **ETR** is *high*");
        assert_eq!(plain(&line), "Total ETR is high");
        assert_eq!(line.spans.len(), 4);
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert!(line.spans[3].style.add_modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn test_markup_unclosed_and_bullets_stay_literal() {
        assert_eq!(plain(&parse_markup_line("a ** b")), "a ** b");
        assert_eq!(plain(&parse_markup_line("* item one * two")), "* item one * two");
        assert_eq!(parse_markup_line("").spans.len(), 0);
    }

    #[test]
    fn test_markup_links_show_url() {
        let line = parse_markup_line("See [report](https://example.com/r) now");
        assert_eq!(plain(&line), "See report (https://example.com/r) now");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::UNDERLINED));
    }

    #[test]
    fn test_table_lines_align_columns() {
        let t = table(json!([
            {"entity_name": "Tropicana", "etr": 21.5},
            {"entity_name": "A", "etr": null}
        ]));
        let lines: Vec<String> = table_lines(&t).iter().map(plain).collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "entity name │ etr ");
        assert_eq!(lines[1], "────────────┼─────");
        assert_eq!(lines[2], "Tropicana   │ 21.5");
        assert_eq!(lines[3], "A           │ null");
    }

    #[test]
    fn test_long_cells_are_truncated() {
        let t = table(json!([{"note": "x".repeat(40)}]));
        let lines: Vec<String> = table_lines(&t).iter().map(plain).collect();
        assert_eq!(lines[2].chars().count(), MAX_CELL_WIDTH);
        assert!(lines[2].ends_with('…'));
    }

    #[test]
    fn test_bar_chart_scales_to_largest_value() {
        let chart = ChartSpec {
            kind: ChartKind::Bar,
            data: json!({
                "labels": ["QE", "CA"],
                "datasets": [{"label": "2023", "data": [50, 100]}]
            }),
            options: None,
        };
        let lines: Vec<String> = chart_lines(&chart).iter().map(plain).collect();
        assert_eq!(lines[0], "[bar chart]");
        assert_eq!(lines[1], "2023");
        assert_eq!(lines[2], format!("  QE  {} 50", "█".repeat(BAR_WIDTH / 2)));
        assert_eq!(lines[3], format!("  CA  {} 100", "█".repeat(BAR_WIDTH)));
    }

    #[test]
    fn test_scatter_chart_lists_points() {
        let chart = ChartSpec {
            kind: ChartKind::Bubble,
            data: json!({"datasets": [{"label": "Risk", "data": [{"x": 1, "y": 2.5, "r": 4}, "bad"]}]}),
            options: None,
        };
        let lines: Vec<String> = chart_lines(&chart).iter().map(plain).collect();
        assert_eq!(lines, vec!["[bubble chart]", "Risk", "  (1, 2.50) r=4"]);
    }

    #[test]
    fn test_chart_options_control_title_and_legend() {
        let chart = ChartSpec {
            kind: ChartKind::Line,
            data: json!({
                "labels": ["QE"],
                "datasets": [{"label": "2023", "data": [4]}]
            }),
            options: Some(json!({
                "plugins": {
                    "legend": {"display": false},
                    "title": {"display": true, "text": "QE vs CA"}
                }
            })),
        };
        let lines: Vec<String> = chart_lines(&chart).iter().map(plain).collect();
        assert_eq!(lines[0], "[line chart] QE vs CA");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("  QE  "));
    }

    #[test]
    fn test_empty_chart_data() {
        let chart = ChartSpec {
            kind: ChartKind::Pie,
            data: json!({}),
            options: None,
        };
        let lines: Vec<String> = chart_lines(&chart).iter().map(plain).collect();
        assert_eq!(lines, vec!["[pie chart]", "(no data)"]);
    }

    #[test]
    fn test_notices_render_in_red() {
        let lines = message_lines(&Message::network_error("timeout"));
        assert_eq!(plain(&lines[0]), "Assistant:");
        assert_eq!(lines[1].spans[0].style.fg, Some(Color::Red));
    }

    #[test]
    fn test_wrapped_height() {
        let lines = vec![Line::from("x".repeat(25)), Line::default(), Line::from("abc")];
        assert_eq!(wrapped_height(&lines, 10), 3 + 1 + 1);
    }
}
