mod render;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use ratatui_image::picker::Picker;
use ratatui_image::protocol::StatefulProtocol;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::events::Subscriber;
use crate::gateway::{CommandGateway, GatewayReply};
use crate::pipeline::FramePipeline;
use crate::screen::viewer::DisplaySurface;
use crate::session::{Mode, Session};

/// Which presenter setting the cursor is on.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum SettingsField {
    Port,
    Fps,
}

pub struct CastUi {
    pub(crate) session: Session,
    gateway: CommandGateway,
    pipeline: FramePipeline,
    surface: Arc<Mutex<DisplaySurface>>,
    picker: Picker,
    /// Encoded image for the current frame, rebuilt when the surface advances
    pub(crate) protocol: Option<StatefulProtocol>,
    seen_generation: u64,
    // Viewer address entry
    pub(crate) address_input: Vec<char>,
    pub(crate) cursor: usize,
    // Presenter settings entry
    pub(crate) focus: SettingsField,
    pub(crate) port_input: String,
    pub(crate) fps_input: String,
}

impl CastUi {
    pub fn new(
        session: Session,
        gateway: CommandGateway,
        pipeline: FramePipeline,
        surface: Arc<Mutex<DisplaySurface>>,
        picker: Picker,
    ) -> Self {
        let config = session.config();
        Self {
            session,
            gateway,
            pipeline,
            surface,
            picker,
            protocol: None,
            seen_generation: 0,
            address_input: Vec::new(),
            cursor: 0,
            focus: SettingsField::Port,
            port_input: config.port.to_string(),
            fps_input: config.fps.to_string(),
        }
    }

    pub async fn run(
        &mut self,
        mut subscriber: Subscriber,
        mut reply_rx: mpsc::UnboundedReceiver<GatewayReply>,
    ) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self
            .run_loop(&mut terminal, &mut subscriber, &mut reply_rx)
            .await;

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    async fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        subscriber: &mut Subscriber,
        reply_rx: &mut mpsc::UnboundedReceiver<GatewayReply>,
    ) -> Result<()> {
        loop {
            terminal.draw(|f| self.ui(f))?;

            // Pushed events: frames to the pipeline, the rest to the session
            subscriber.dispatch(&mut self.session, &self.pipeline);

            // Command completions
            while let Ok(reply) = reply_rx.try_recv() {
                self.apply_reply(reply);
            }

            // New frame on the surface? Rebuild the image protocol once
            self.refresh_frame_protocol();

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key) {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn apply_reply(&mut self, reply: GatewayReply) {
        match reply {
            GatewayReply::SharingStarted(address) => self.session.sharing_started(&address),
            GatewayReply::StartFailed(text) => self.session.start_failed(&text),
            GatewayReply::ConnectFailed(text) => self.session.connect_failed(&text),
        }
    }

    fn refresh_frame_protocol(&mut self) {
        let surface = self.surface.lock().unwrap();
        if surface.generation() != self.seen_generation {
            if let Some(image) = surface.snapshot() {
                self.protocol = Some(self.picker.new_resize_protocol(image));
            }
            self.seen_generation = surface.generation();
        }
    }

    /// Returns true when the app should exit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }

        match self.session.mode() {
            Mode::Select => self.handle_select_key(key),
            Mode::Presenter => self.handle_presenter_key(key),
            Mode::Viewer => self.handle_viewer_key(key),
        }
    }

    fn handle_select_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('p') => self.session.choose_presenter(),
            KeyCode::Char('v') => self.session.choose_viewer(),
            _ => {}
        }
        false
    }

    fn handle_presenter_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            // Back to role selection; deliberately leaves sharing running
            KeyCode::Esc => self.session.back_to_select(),
            KeyCode::Enter => {
                if self.session.is_sharing() {
                    // Explicit stop: flags drop and the roster clears here
                    self.gateway.stop_sharing();
                    self.session.sharing_stopped_by_user();
                } else {
                    let config = self.session.config();
                    self.gateway.start_sharing(config.port, config.fps);
                }
            }
            KeyCode::Tab => {
                self.focus = match self.focus {
                    SettingsField::Port => SettingsField::Fps,
                    SettingsField::Fps => SettingsField::Port,
                };
            }
            KeyCode::Char(c) if c.is_ascii_digit() => {
                self.edit_setting(|field| {
                    if field.len() < 5 {
                        field.push(c);
                    }
                });
            }
            KeyCode::Backspace => {
                self.edit_setting(|field| {
                    field.pop();
                });
            }
            _ => {}
        }
        false
    }

    /// Mutate the focused settings field, then push the parsed value into the
    /// session config (which ignores it once sharing has started).
    fn edit_setting(&mut self, f: impl FnOnce(&mut String)) {
        if self.session.is_sharing() {
            return;
        }
        match self.focus {
            SettingsField::Port => {
                f(&mut self.port_input);
                if let Ok(port) = self.port_input.parse() {
                    self.session.set_port(port);
                }
            }
            SettingsField::Fps => {
                f(&mut self.fps_input);
                if let Ok(fps) = self.fps_input.parse() {
                    self.session.set_fps(fps);
                }
            }
        }
    }

    fn handle_viewer_key(&mut self, key: KeyEvent) -> bool {
        if self.session.is_connected() {
            match key.code {
                // Back keeps the connection up, same asymmetry as presenter
                KeyCode::Esc => self.session.back_to_select(),
                KeyCode::Char('d') => {
                    self.gateway.disconnect();
                    self.session.disconnected_by_user();
                }
                _ => {}
            }
            return false;
        }

        match key.code {
            KeyCode::Esc => self.session.back_to_select(),
            KeyCode::Enter => {
                let address: String = self.address_input.iter().collect();
                if !address.is_empty() {
                    self.session.connect_requested(&address);
                    self.gateway.connect(address);
                }
            }
            KeyCode::Char(c) => {
                self.address_input.insert(self.cursor, c);
                self.cursor += 1;
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.address_input.remove(self.cursor);
                }
            }
            KeyCode::Delete => {
                if self.cursor < self.address_input.len() {
                    self.address_input.remove(self.cursor);
                }
            }
            KeyCode::Left => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                }
            }
            KeyCode::Right => {
                if self.cursor < self.address_input.len() {
                    self.cursor += 1;
                }
            }
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.address_input.len(),
            _ => {}
        }
        false
    }
}
