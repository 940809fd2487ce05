use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Cell, Clear, Gauge, Padding, Paragraph, Row, Table, TableState,
    Wrap,
};

use super::super::episode::{
    Episode, Transcript, TranscriptSegment, format_clock, format_created_display,
    highlight_tokens, truncate, word_preview,
};
use super::super::gateway::PROGRESS_STEPS;
use super::super::malformed_transcript_notice;
use super::super::player::{EngineState, PlaybackPolicy, PlaylistDirection};
use super::form::{FormField, GeneratorForm};
use super::{GenerationJob, NowPlaying, PendingDelete, PendingNotice};

const ACCENT: Color = Color::Rgb(110, 170, 255);
const MUTED: Color = Color::Rgb(185, 195, 210);
const TEXT: Color = Color::Rgb(230, 230, 230);

/// Everything one frame needs, borrowed from the event loop.
pub(super) struct Screen<'a> {
    pub(super) items: &'a [Episode],
    pub(super) table_state: &'a mut TableState,
    pub(super) now_playing: Option<&'a NowPlaying>,
    pub(super) engine_state: EngineState,
    pub(super) position: f64,
    pub(super) duration: Option<f64>,
    pub(super) policy: PlaybackPolicy,
    pub(super) direction: PlaylistDirection,
    pub(super) status: &'a str,
    pub(super) form: Option<&'a GeneratorForm>,
    pub(super) generation: Option<&'a GenerationJob>,
    pub(super) pending_delete: Option<&'a PendingDelete>,
    pub(super) pending_notice: Option<&'a PendingNotice>,
}

pub(super) fn draw_tui(frame: &mut Frame, screen: &mut Screen) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "LINGOCAST",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled(
            format!("{} episodes", screen.items.len()),
            Style::default().fg(MUTED),
        ),
        Span::raw("   "),
        Span::styled(
            format!("policy {}", screen.policy.label()),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw("   "),
        Span::styled(
            format!("playlist {}", screen.direction.label()),
            Style::default().fg(MUTED),
        ),
    ]))
    .alignment(Alignment::Center)
    .block(panel_block("Dashboard"));
    frame.render_widget(header, chunks[0]);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(42), Constraint::Percentage(58)])
        .split(chunks[1]);
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Length(3),
            Constraint::Min(5),
        ])
        .split(body_chunks[1]);

    draw_library(frame, body_chunks[0], screen);
    draw_player(frame, right_chunks[0], screen);
    draw_scrubber(frame, right_chunks[1], screen);
    draw_transcript(frame, right_chunks[2], screen.now_playing);

    let controls = Paragraph::new(Line::from(Span::styled(
        "↑/↓ move  Enter load  space play/pause  ←/→ 10s  Home restart  g new  p policy  o direction  d delete  r refresh  q quit",
        Style::default().fg(MUTED),
    )))
    .alignment(Alignment::Center)
    .block(panel_block("Controls"));
    frame.render_widget(controls, chunks[2]);

    let status_widget = Paragraph::new(screen.status.to_string())
        .style(status_style(screen.status))
        .block(panel_block("Status"));
    frame.render_widget(status_widget, chunks[3]);

    if let Some(confirm) = screen.pending_delete {
        let popup_text = format!(
            "Delete episode?\n\n{}\n\nThis cannot be undone.\n\n[y / Enter] Delete   [n / Esc] Cancel",
            truncate(&confirm.title, 56)
        );
        draw_text_popup(frame, "Confirm Delete", &popup_text);
    } else if let Some(notice) = screen.pending_notice {
        draw_text_popup(frame, notice.title, &notice.message);
    } else if let Some(form) = screen.form {
        draw_form(frame, form);
    } else if let Some(job) = screen.generation {
        draw_generation(frame, job);
    }
}

fn draw_library(frame: &mut Frame, area: Rect, screen: &mut Screen) {
    let playing_id = screen.now_playing.map(|current| current.episode.id.as_str());
    let rows: Vec<Row> = screen
        .items
        .iter()
        .map(|item| {
            let marker = if Some(item.id.as_str()) == playing_id {
                "♪"
            } else if item.is_playable() {
                ""
            } else {
                "-"
            };
            Row::new(vec![
                Cell::from(marker),
                Cell::from(item.title.clone()),
                Cell::from(word_preview(&item.target_words, 3)),
                Cell::from(format_created_display(&item.created_at)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Percentage(45),
            Constraint::Percentage(30),
            Constraint::Length(16),
        ],
    )
    .header(
        Row::new(vec!["", "Title", "Words", "Created"])
            .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
    )
    .block(panel_block("Library"))
    .row_highlight_style(
        Style::default()
            .bg(ACCENT)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("▸ ");
    frame.render_stateful_widget(table, area, screen.table_state);
}

fn draw_player(frame: &mut Frame, area: Rect, screen: &Screen) {
    let text = match screen.now_playing {
        Some(current) => {
            let episode = &current.episode;
            vec![
                Line::from(Span::styled(
                    truncate(&episode.title, 60),
                    Style::default().fg(TEXT).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    truncate(&episode.topic, 60),
                    Style::default().fg(MUTED),
                )),
                Line::from(vec![
                    Span::styled("Words  ", Style::default().fg(MUTED)),
                    Span::styled(
                        word_preview(&episode.target_words, 5),
                        Style::default().fg(Color::Yellow),
                    ),
                ]),
                Line::from(vec![
                    Span::styled("State  ", Style::default().fg(MUTED)),
                    Span::styled(
                        screen.engine_state.label(),
                        engine_state_style(screen.engine_state),
                    ),
                ]),
            ]
        }
        None => vec![
            Line::from("Nothing loaded."),
            Line::from(""),
            Line::from("Select an episode and press Enter."),
        ],
    };
    let player = Paragraph::new(text)
        .style(Style::default().fg(TEXT))
        .block(panel_block("Player"));
    frame.render_widget(player, area);
}

fn draw_scrubber(frame: &mut Frame, area: Rect, screen: &Screen) {
    let (ratio, label) = scrubber_progress(screen.position, screen.duration);
    let gauge = Gauge::default()
        .block(panel_block("Position"))
        .gauge_style(
            Style::default()
                .fg(Color::Rgb(130, 190, 255))
                .bg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .label(label)
        .ratio(ratio);
    frame.render_widget(gauge, area);
}

fn scrubber_progress(position: f64, duration: Option<f64>) -> (f64, String) {
    match duration {
        Some(duration) if duration > 0.0 => (
            (position / duration).clamp(0.0, 1.0),
            format!("{} / {}", format_clock(position), format_clock(duration)),
        ),
        _ => (0.0, format!("{} / --:--", format_clock(position))),
    }
}

fn draw_transcript(frame: &mut Frame, area: Rect, now_playing: Option<&NowPlaying>) {
    let block = panel_block("Transcript");
    let Some(current) = now_playing else {
        frame.render_widget(Paragraph::new("").block(block), area);
        return;
    };
    let targets = &current.episode.target_words;

    let paragraph = match &current.episode.transcript {
        Transcript::Segments(segments) => {
            let inner_width = area.width.saturating_sub(2).max(1);
            let inner_height = area.height.saturating_sub(2);
            let lines: Vec<Line> = segments
                .iter()
                .enumerate()
                .map(|(idx, segment)| {
                    segment_line(segment, targets, current.active_segment() == Some(idx))
                })
                .collect();
            let heights: Vec<u16> = segments
                .iter()
                .map(|segment| wrapped_height(&segment_label(segment), inner_width))
                .collect();
            let offset = current
                .scroll_anchor
                .map_or(0, |anchor| centered_scroll_offset(&heights, anchor, inner_height));
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .scroll((offset, 0))
        }
        Transcript::Plain(text) => {
            let lines: Vec<Line> = text
                .lines()
                .map(|line| highlighted_line(line, targets, Style::default().fg(TEXT)))
                .collect();
            Paragraph::new(lines).wrap(Wrap { trim: false })
        }
        Transcript::Malformed(_) => Paragraph::new(malformed_transcript_notice())
            .style(Style::default().fg(Color::Rgb(255, 145, 120)))
            .wrap(Wrap { trim: true }),
    };
    frame.render_widget(paragraph.block(block), area);
}

fn segment_label(segment: &TranscriptSegment) -> String {
    format!("[{}] {}", format_clock(segment.start), segment.text)
}

fn segment_line<'a>(segment: &'a TranscriptSegment, targets: &[String], active: bool) -> Line<'a> {
    let base = if active {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Rgb(160, 190, 235))
    } else {
        Style::default().fg(MUTED)
    };
    let mut line = highlighted_line(&segment.text, targets, base);
    line.spans.insert(
        0,
        Span::styled(format!("[{}] ", format_clock(segment.start)), base),
    );
    line
}

fn highlighted_line<'a>(text: &'a str, targets: &[String], base: Style) -> Line<'a> {
    let target_style = base.fg(Color::Yellow).add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
    let mut spans = Vec::new();
    for (idx, token) in highlight_tokens(text, targets).into_iter().enumerate() {
        if idx > 0 {
            spans.push(Span::styled(" ", base));
        }
        let style = if token.is_target { target_style } else { base };
        spans.push(Span::styled(token.text, style));
    }
    Line::from(spans)
}

/// Rows `text` takes when word-wrapped to `width` columns. Words wider than a
/// row are split across rows. Counts chars, not display width.
fn wrapped_height(text: &str, width: u16) -> u16 {
    let width = usize::from(width.max(1));
    let mut rows = 1usize;
    let mut used = 0usize;
    for word in text.split_whitespace() {
        let len = word.chars().count();
        if used > 0 && used + 1 + len <= width {
            used += 1 + len;
            continue;
        }
        if used > 0 {
            rows += 1;
        }
        let spanned = len.div_ceil(width).max(1);
        rows += spanned - 1;
        used = len - (spanned - 1) * width;
    }
    u16::try_from(rows).unwrap_or(u16::MAX)
}

/// Scroll offset that puts the anchor row block in the middle of a viewport
/// `viewport` rows tall.
fn centered_scroll_offset(heights: &[u16], anchor: usize, viewport: u16) -> u16 {
    let Some(anchor_height) = heights.get(anchor) else {
        return 0;
    };
    let above: u16 = heights[..anchor].iter().sum();
    let margin = viewport.saturating_sub(*anchor_height) / 2;
    above.saturating_sub(margin)
}

fn draw_form(frame: &mut Frame, form: &GeneratorForm) {
    let field_style = |field: FormField| {
        if form.focus == field {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(MUTED)
        }
    };
    let cursor = |field: FormField| if form.focus == field { "▏" } else { "" };

    let mut tags: Vec<Span> = Vec::new();
    for word in &form.words {
        tags.push(Span::styled(format!(" {word} "), pill_style()));
        tags.push(Span::raw(" "));
    }
    if tags.is_empty() {
        tags.push(Span::styled("no words yet", Style::default().fg(MUTED)));
    }

    let lines = vec![
        Line::from(Span::styled("Topic", field_style(FormField::Topic))),
        Line::from(format!("{}{}", form.topic, cursor(FormField::Topic))),
        Line::from(""),
        Line::from(Span::styled("Target words", field_style(FormField::Words))),
        Line::from(tags),
        Line::from(format!("> {}{}", form.word_input, cursor(FormField::Words))),
        Line::from(""),
        Line::from(Span::styled(
            "Tab switch  Enter/, add word  Backspace remove  Ctrl+S generate  Esc close",
            Style::default().fg(MUTED),
        )),
    ];
    let area = centered_fixed_rect(76, 14, frame.area());
    render_popup_shadow(frame, area);
    frame.render_widget(Clear, area);
    let popup = Paragraph::new(lines)
        .style(Style::default().fg(TEXT))
        .wrap(Wrap { trim: false })
        .block(modal_block("New Episode"));
    frame.render_widget(popup, area);
}

fn draw_generation(frame: &mut Frame, job: &GenerationJob) {
    let current = job.step();
    let mut lines = vec![
        Line::from(Span::styled(
            truncate(&job.topic, 56),
            Style::default().fg(TEXT).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    for (idx, step) in PROGRESS_STEPS.iter().enumerate() {
        let (marker, style) = if idx < current {
            ("✓", Style::default().fg(Color::Rgb(140, 210, 150)))
        } else if idx == current {
            ("›", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))
        } else {
            (" ", Style::default().fg(MUTED))
        };
        lines.push(Line::from(Span::styled(format!("{marker} {step}"), style)));
    }
    let area = centered_fixed_rect(64, 11, frame.area());
    render_popup_shadow(frame, area);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(modal_block("Generating")),
        area,
    );
}

fn draw_text_popup(frame: &mut Frame, title: &'static str, text: &str) {
    let popup_area = popup_rect_for_text(frame.area(), text);
    render_popup_shadow(frame, popup_area);
    frame.render_widget(Clear, popup_area);
    let popup = Paragraph::new(text.to_string())
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(modal_block(title));
    frame.render_widget(popup, popup_area);
}

fn panel_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(125, 135, 150)))
        .title(title)
}

fn modal_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(
            Style::default()
                .fg(Color::Rgb(160, 190, 235))
                .add_modifier(Modifier::BOLD),
        )
        .title(title)
        .padding(Padding::new(2, 2, 1, 1))
}

fn pill_style() -> Style {
    Style::default()
        .bg(Color::Rgb(72, 82, 96))
        .fg(Color::Rgb(230, 235, 242))
}

fn engine_state_style(state: EngineState) -> Style {
    match state {
        EngineState::Playing => Style::default()
            .fg(Color::Rgb(140, 210, 150))
            .add_modifier(Modifier::BOLD),
        EngineState::Failed => Style::default().fg(Color::Rgb(255, 145, 120)),
        EngineState::Loading => Style::default().fg(Color::Yellow),
        EngineState::Ready | EngineState::Unbound => Style::default().fg(MUTED),
    }
}

fn status_style(status: &str) -> Style {
    if status.starts_with("ERROR:") {
        Style::default()
            .fg(Color::Rgb(255, 145, 120))
            .add_modifier(Modifier::BOLD)
    } else if status.starts_with("INFO:") {
        Style::default().fg(Color::Rgb(205, 165, 255))
    } else {
        Style::default().fg(Color::Rgb(230, 235, 242))
    }
}

fn centered_fixed_rect(width: u16, height: u16, area: Rect) -> Rect {
    let clamped_width = width.min(area.width.max(1));
    let clamped_height = height.min(area.height.max(1));
    let x = area.x + area.width.saturating_sub(clamped_width) / 2;
    let y = area.y + area.height.saturating_sub(clamped_height) / 2;
    Rect::new(x, y, clamped_width, clamped_height)
}

fn render_popup_shadow(frame: &mut Frame, popup_area: Rect) {
    let area = frame.area();
    let shadow = Rect::new(
        (popup_area.x + 1).min(area.x + area.width.saturating_sub(1)),
        (popup_area.y + 1).min(area.y + area.height.saturating_sub(1)),
        popup_area.width.saturating_sub(1),
        popup_area.height.saturating_sub(1),
    );
    if shadow.width == 0 || shadow.height == 0 {
        return;
    }
    let shadow_block = Block::default().style(Style::default().bg(Color::Rgb(14, 16, 24)));
    frame.render_widget(shadow_block, shadow);
}

fn popup_rect_for_text(area: Rect, text: &str) -> Rect {
    let max_line_width = text
        .lines()
        .map(|line| line.chars().count() as u16)
        .max()
        .unwrap_or(0);
    let line_count = text.lines().count() as u16;

    let available_width = area.width.saturating_sub(2).max(1);
    let width = max_line_width
        .saturating_add(12)
        .clamp(48.min(available_width), 72.min(available_width));

    let available_height = area.height.saturating_sub(2).max(1);
    let height = line_count
        .saturating_add(6)
        .clamp(10.min(available_height), 18.min(available_height));

    centered_fixed_rect(width, height, area)
}
