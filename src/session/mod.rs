//! Session state: role, sharing/connection flags, viewer roster, status text.
//!
//! One instance lives for the whole process, owned by the view. Transitions
//! come from user actions (via the command gateway) and from service-pushed
//! events (via the subscriber). Two quirks are kept deliberately, matching
//! the behavior this tool replaces, and are pinned by tests rather than
//! fixed: leaving a role does not stop sharing or disconnect, and the roster
//! neither deduplicates nor removes entries.

/// The sentinel the service sends when a viewer connection is up. Any other
/// connection-status payload means not connected.
pub const CONNECTED: &str = "connected";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Select,
    Presenter,
    Viewer,
}

/// Presenter settings; editable only in Presenter mode before sharing starts.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    pub port: u16,
    pub fps: u32,
}

pub struct Session {
    mode: Mode,
    sharing: bool,
    connected: bool,
    roster: Vec<String>,
    status: String,
    config: SessionConfig,
    local_ip: String,
}

impl Session {
    pub fn new(local_ip: String, port: u16, fps: u32) -> Self {
        Self {
            mode: Mode::Select,
            sharing: false,
            connected: false,
            roster: Vec::new(),
            status: String::new(),
            // Seed values come straight from the CLI, so the frame rate gets
            // the same clamp as later edits
            config: SessionConfig {
                port,
                fps: fps.clamp(1, 30),
            },
            local_ip,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_sharing(&self) -> bool {
        self.sharing
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn local_ip(&self) -> &str {
        &self.local_ip
    }

    // ── Role choice ──────────────────────────────────────────────

    pub fn choose_presenter(&mut self) {
        self.mode = Mode::Presenter;
        self.status = "Pick a port and frame rate, then start sharing".to_string();
    }

    pub fn choose_viewer(&mut self) {
        self.mode = Mode::Viewer;
        self.status = "Enter the presenter's address to connect".to_string();
    }

    /// Back to role selection. Does NOT stop sharing or disconnect; the
    /// sharing/connected flags survive the mode change.
    pub fn back_to_select(&mut self) {
        self.mode = Mode::Select;
        self.status = String::new();
    }

    // ── Presenter settings ───────────────────────────────────────

    /// Ignored unless in Presenter mode with sharing stopped.
    pub fn set_port(&mut self, port: u16) {
        if self.mode == Mode::Presenter && !self.sharing {
            self.config.port = port;
        }
    }

    /// Ignored unless in Presenter mode with sharing stopped.
    pub fn set_fps(&mut self, fps: u32) {
        if self.mode == Mode::Presenter && !self.sharing {
            self.config.fps = fps.clamp(1, 30);
        }
    }

    // ── Sharing lifecycle ────────────────────────────────────────

    pub fn sharing_started(&mut self, address: &str) {
        self.sharing = true;
        self.status = format!("Sharing at {}", address);
    }

    /// A rejected start request changes nothing but the status text.
    pub fn start_failed(&mut self, reason: &str) {
        self.status = format!("Start failed: {}", reason);
    }

    /// Explicit stop: the only path that clears the roster.
    pub fn sharing_stopped_by_user(&mut self) {
        self.sharing = false;
        self.roster.clear();
        self.status = "Sharing stopped".to_string();
    }

    /// Service-pushed stop: same flag change, roster untouched.
    pub fn apply_sharing_stopped(&mut self) {
        self.sharing = false;
        self.status = "Sharing stopped".to_string();
    }

    /// Appends as reported, duplicates and all.
    pub fn viewer_joined(&mut self, id: String) {
        self.roster.push(id);
    }

    // ── Viewer lifecycle ─────────────────────────────────────────

    pub fn connect_requested(&mut self, address: &str) {
        self.status = format!("Connecting to {}...", address);
    }

    /// A rejected connect request changes nothing but the status text.
    pub fn connect_failed(&mut self, reason: &str) {
        self.status = format!("Connect failed: {}", reason);
    }

    /// The pushed connection-status event is the sole source of truth for
    /// connection success; the connect request completing proves nothing.
    pub fn apply_connection_status(&mut self, payload: &str) {
        self.connected = payload == CONNECTED;
        self.status = if self.connected {
            "Connected".to_string()
        } else {
            "Disconnected".to_string()
        };
    }

    pub fn disconnected_by_user(&mut self) {
        self.connected = false;
        self.status = "Disconnected".to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("192.168.1.5".to_string(), 9000, 10)
    }

    #[test]
    fn starts_in_select_mode() {
        let s = session();
        assert_eq!(s.mode(), Mode::Select);
        assert!(!s.is_sharing());
        assert!(!s.is_connected());
        assert!(s.roster().is_empty());
    }

    #[test]
    fn start_success_sets_flag_and_address_status() {
        let mut s = session();
        s.choose_presenter();
        s.sharing_started("192.168.1.5:9000");
        assert!(s.is_sharing());
        assert_eq!(s.status(), "Sharing at 192.168.1.5:9000");
    }

    #[test]
    fn start_failure_touches_only_status() {
        let mut s = session();
        s.choose_presenter();
        s.start_failed("port unavailable");
        assert!(!s.is_sharing());
        assert_eq!(s.status(), "Start failed: port unavailable");
    }

    #[test]
    fn connect_completion_does_not_connect() {
        let mut s = session();
        s.choose_viewer();
        s.connect_requested("10.0.0.2:9000");
        // Still not connected: only the pushed event flips the flag
        assert!(!s.is_connected());
        s.apply_connection_status(CONNECTED);
        assert!(s.is_connected());
        assert_eq!(s.status(), "Connected");
    }

    #[test]
    fn any_other_connection_payload_means_disconnected() {
        let mut s = session();
        s.choose_viewer();
        s.apply_connection_status(CONNECTED);
        s.apply_connection_status("disconnected");
        assert!(!s.is_connected());
        s.apply_connection_status(CONNECTED);
        s.apply_connection_status("CONNECTED"); // not the exact sentinel
        assert!(!s.is_connected());
    }

    #[test]
    fn roster_keeps_duplicates() {
        // No deduplication, by (questionable) design: K events, K entries
        let mut s = session();
        s.choose_presenter();
        s.viewer_joined("10.0.0.7:51000".to_string());
        s.viewer_joined("10.0.0.8:51001".to_string());
        s.viewer_joined("10.0.0.7:51000".to_string());
        assert_eq!(
            s.roster(),
            ["10.0.0.7:51000", "10.0.0.8:51001", "10.0.0.7:51000"]
        );
    }

    #[test]
    fn explicit_stop_clears_roster_pushed_stop_does_not() {
        let mut s = session();
        s.choose_presenter();
        s.sharing_started("192.168.1.5:9000");
        s.viewer_joined("10.0.0.7:51000".to_string());

        // Service-initiated stop: flag drops, roster survives
        s.apply_sharing_stopped();
        assert!(!s.is_sharing());
        assert_eq!(s.roster().len(), 1);

        // Explicit stop is the only path that clears it
        s.sharing_started("192.168.1.5:9000");
        s.sharing_stopped_by_user();
        assert!(!s.is_sharing());
        assert!(s.roster().is_empty());
    }

    #[test]
    fn back_does_not_stop_sharing() {
        let mut s = session();
        s.choose_presenter();
        s.sharing_started("192.168.1.5:9000");
        s.back_to_select();
        assert_eq!(s.mode(), Mode::Select);
        // Known quirk, preserved: sharing continues after leaving the role
        assert!(s.is_sharing());
    }

    #[test]
    fn role_round_trip_lands_in_fresh_viewer_state() {
        let mut s = session();
        s.choose_presenter();
        s.sharing_started("192.168.1.5:9000");
        s.back_to_select();
        s.choose_viewer();
        assert_eq!(s.mode(), Mode::Viewer);
        assert!(!s.is_connected());
        assert_eq!(s.status(), "Enter the presenter's address to connect");
    }

    #[test]
    fn seed_fps_is_clamped_like_edits() {
        let s = Session::new("192.168.1.5".to_string(), 9000, 2000);
        assert_eq!(s.config().fps, 30);
        let s = Session::new("192.168.1.5".to_string(), 9000, 0);
        assert_eq!(s.config().fps, 1);
    }

    #[test]
    fn config_editable_only_before_sharing() {
        let mut s = session();
        // Not in presenter mode yet: ignored
        s.set_port(8000);
        assert_eq!(s.config().port, 9000);

        s.choose_presenter();
        s.set_port(8000);
        s.set_fps(24);
        assert_eq!(s.config().port, 8000);
        assert_eq!(s.config().fps, 24);

        s.sharing_started("192.168.1.5:8000");
        s.set_port(7000);
        s.set_fps(5);
        assert_eq!(s.config().port, 8000);
        assert_eq!(s.config().fps, 24);
    }
}
