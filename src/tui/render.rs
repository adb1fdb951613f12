use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};
use ratatui_image::StatefulImage;

use crate::session::Mode;

use super::{CastUi, SettingsField};

impl CastUi {
    pub(crate) fn ui(&mut self, f: &mut Frame) {
        match self.session.mode() {
            Mode::Select => self.render_select(f),
            Mode::Presenter => self.render_presenter(f),
            Mode::Viewer => self.render_viewer(f),
        }
    }

    fn render_select(&self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // title
                Constraint::Length(6), // role choices
                Constraint::Min(1),    // spacer
                Constraint::Length(1), // IP line
            ])
            .split(f.area());

        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                "📡 lancast",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("  —  mirror a screen over the local network"),
        ]))
        .block(Block::default().borders(Borders::BOTTOM));
        f.render_widget(title, chunks[0]);

        let choices = Paragraph::new(vec![
            Line::from(""),
            Line::from(vec![
                Span::styled("  p", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                Span::raw("  Present — share this screen"),
            ]),
            Line::from(vec![
                Span::styled("  v", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                Span::raw("  View — watch a presenter"),
            ]),
            Line::from(""),
            Line::from(vec![
                Span::styled("  q", Style::default().fg(Color::DarkGray)),
                Span::styled("  Quit", Style::default().fg(Color::DarkGray)),
            ]),
        ]);
        f.render_widget(choices, chunks[1]);

        let ip_line = Paragraph::new(Line::from(vec![
            Span::raw(" Your IP: "),
            Span::styled(
                self.session.local_ip().to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]))
        .style(Style::default().fg(Color::DarkGray));
        f.render_widget(ip_line, chunks[3]);
    }

    fn render_presenter(&self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4), // settings
                Constraint::Length(4), // info
                Constraint::Min(1),    // roster
                Constraint::Length(1), // key hints
            ])
            .split(f.area());

        let editable = !self.session.is_sharing();
        let field_style = |field: SettingsField| {
            if self.focus == field && editable {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if editable {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            }
        };

        let settings = Paragraph::new(vec![
            Line::from(vec![
                Span::raw(" Port: "),
                Span::styled(self.port_input.clone(), field_style(SettingsField::Port)),
            ]),
            Line::from(vec![
                Span::raw(" FPS:  "),
                Span::styled(self.fps_input.clone(), field_style(SettingsField::Fps)),
                Span::styled("  (1-30, 8-12 recommended)", Style::default().fg(Color::DarkGray)),
            ]),
        ])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" 🖥️  Presenter "),
        );
        f.render_widget(settings, chunks[0]);

        let state_line = if self.session.is_sharing() {
            Line::from(vec![
                Span::styled("● ", Style::default().fg(Color::Green)),
                Span::raw(format!(
                    "Share address: {}:{}",
                    self.session.local_ip(),
                    self.session.config().port
                )),
            ])
        } else {
            Line::from(vec![
                Span::styled("○ ", Style::default().fg(Color::DarkGray)),
                Span::raw("Not sharing"),
            ])
        };
        let info = Paragraph::new(vec![
            state_line,
            Line::from(Span::styled(
                format!(" {}", self.session.status()),
                Style::default().fg(Color::Cyan),
            )),
        ])
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(info, chunks[1]);

        let roster = self.session.roster();
        let items: Vec<ListItem> = roster
            .iter()
            .map(|id| ListItem::new(format!(" {}", id)))
            .collect();
        let viewers = List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Viewers ({}) ", roster.len())),
        );
        f.render_widget(viewers, chunks[2]);

        let toggle = if self.session.is_sharing() {
            "stop sharing"
        } else {
            "start sharing"
        };
        f.render_widget(key_hints(&[("Enter", toggle), ("Tab", "switch field"), ("Esc", "back")]), chunks[3]);
    }

    fn render_viewer(&mut self, f: &mut Frame) {
        if self.session.is_connected() {
            self.render_viewer_screen(f);
        } else {
            self.render_viewer_connect(f);
        }
    }

    fn render_viewer_connect(&self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // address input
                Constraint::Length(1), // status
                Constraint::Min(1),    // spacer
                Constraint::Length(1), // key hints
            ])
            .split(f.area());

        let address: String = self.address_input.iter().collect();
        let input = Paragraph::new(address)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" 🔗 Presenter address (e.g. 192.168.1.100:9000) "),
            )
            .style(Style::default().fg(Color::White));
        f.render_widget(input, chunks[0]);
        f.set_cursor_position((chunks[0].x + 1 + self.cursor as u16, chunks[0].y + 1));

        let status = Paragraph::new(format!(" {}", self.session.status()))
            .style(Style::default().fg(Color::Cyan));
        f.render_widget(status, chunks[1]);

        f.render_widget(key_hints(&[("Enter", "connect"), ("Esc", "back")]), chunks[3]);
    }

    fn render_viewer_screen(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),    // frame area
                Constraint::Length(1), // status bar
            ])
            .split(f.area());

        if let Some(ref mut protocol) = self.protocol {
            // Image rendered with no surrounding block: borders make ratatui
            // clear the area every draw, which flickers with Sixel/Kitty
            f.render_stateful_widget(StatefulImage::default(), chunks[0], protocol);
        } else {
            let waiting = Paragraph::new("🖥️  Connected — waiting for frames...")
                .style(Style::default().fg(Color::DarkGray))
                .alignment(Alignment::Center);
            f.render_widget(waiting, chunks[0]);
        }

        let address: String = self.address_input.iter().collect();
        let bar = Paragraph::new(Line::from(vec![
            Span::styled("🟢 ", Style::default().fg(Color::Green)),
            Span::raw(format!("{} ", address)),
            Span::raw("│ "),
            Span::styled("d", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::raw(" disconnect │ "),
            Span::styled("Esc", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::raw(" back"),
        ]));
        f.render_widget(bar, chunks[1]);
    }
}

fn key_hints(pairs: &[(&str, &str)]) -> Paragraph<'static> {
    let mut spans = vec![Span::raw(" ")];
    for (i, (key, action)) in pairs.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        spans.push(Span::styled(
            key.to_string(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw(format!(" {}", action)));
    }
    Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::Gray))
}
