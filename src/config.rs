//! Configuration for the export robot.
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables. The resulting [`RoboConfig`] is passed explicitly to
//! the session launcher and the orchestrator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoboError};

/// Default login page of the portal.
pub const DEFAULT_LOGIN_URL: &str = "https://apps.zeroglosa.com.br/opty-spec/login/auth";

/// Authenticated landing page that exposes the reports menu.
pub const DEFAULT_LANDING_URL: &str =
    "https://apps.zeroglosa.com.br/opty-spec/zg/usuario/nossoPortal";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3001;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoboConfig {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Fixed pauses and timeouts. Not read from the config file.
    #[serde(skip)]
    pub timings: Timings,
}

/// Remote portal endpoints and credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_landing_url")]
    pub landing_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

fn default_login_url() -> String {
    DEFAULT_LOGIN_URL.to_string()
}

fn default_landing_url() -> String {
    DEFAULT_LANDING_URL.to_string()
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            landing_url: default_landing_url(),
            username: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalConfig")
            .field("login_url", &self.login_url)
            .field("landing_url", &self.landing_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl PortalConfig {
    /// Username and password, or `MissingCredentials` if either is unset.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Ok((user, pass)),
            _ => Err(RoboError::MissingCredentials),
        }
    }
}

/// Viewport size applied to every automation page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        // Wide enough for the portal to render its desktop navbar.
        Self {
            width: 1440,
            height: 900,
        }
    }
}

/// Browser launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default)]
    pub viewport: Viewport,

    /// Persistent profile directory shared by all sessions.
    /// `None` gives every session a throwaway profile.
    #[serde(default = "default_profile_dir")]
    pub profile_dir: Option<PathBuf>,

    /// Explicit Chrome/Chromium executable.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Maximum number of browser sessions alive at once.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_headless() -> bool {
    true
}

fn default_profile_dir() -> Option<PathBuf> {
    Some(PathBuf::from(".pup-profile"))
}

fn default_max_sessions() -> usize {
    2
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            viewport: Viewport::default(),
            profile_dir: default_profile_dir(),
            chrome_path: None,
            chrome_args: Vec::new(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Every fixed pause and bounded wait used against the portal.
///
/// The portal exposes no readiness events, so most of these are deliberate
/// delays rather than timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Pointer press/release gap for native clicks.
    pub click_delay: Duration,
    /// Per-character delay when typing credentials.
    pub type_delay: Duration,
    /// Press/release gap when clicking the desktop reports menu.
    pub menu_click_delay: Duration,
    /// Poll interval for bounded selector waits.
    pub selector_poll: Duration,

    /// Login field waits.
    pub login_field_timeout: Duration,
    /// Submit-and-navigate wait after login.
    pub login_navigation_timeout: Duration,
    /// First-run popup wait (absence is not an error).
    pub popup_timeout: Duration,
    /// Page loads (login page, landing page).
    pub page_load_timeout: Duration,

    /// Wait for the desktop reports menu once it is known to exist.
    pub menu_timeout: Duration,
    /// Pause after opening a mobile hamburger menu.
    pub hamburger_settle: Duration,
    /// Interval between reports frame polls.
    pub frame_poll: Duration,
    /// Number of reports frame polls.
    pub frame_attempts: u32,
    /// Category/report row waits.
    pub list_item_timeout: Duration,
    /// Pause for the embedded viewer to load.
    pub viewer_load: Duration,
    /// Per-modal wait when dismissing viewer start-up dialogs.
    pub modal_timeout: Duration,

    /// Poll interval while detecting the exports panel.
    pub panel_poll: Duration,
    /// Detection bound when the panel is only inspected (ensure-closed).
    pub panel_check_timeout: Duration,
    /// Detection bound when the panel is required.
    pub panel_timeout: Duration,
    /// Settle pause after clicking the panel's close control.
    pub close_settle: Duration,
    /// Settle pause after the Escape fallback.
    pub escape_settle: Duration,
    /// Fixed server-side processing wait between export and download.
    pub export_processing: Duration,
    /// Pause after clicking download so the transfer begins.
    pub download_start: Duration,

    /// Download directory poll interval.
    pub download_poll: Duration,
    /// Overall bound for the exported file to land on disk.
    pub download_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            click_delay: Duration::from_millis(10),
            type_delay: Duration::from_millis(20),
            menu_click_delay: Duration::from_millis(50),
            selector_poll: Duration::from_millis(100),
            login_field_timeout: Duration::from_secs(30),
            login_navigation_timeout: Duration::from_secs(30),
            popup_timeout: Duration::from_secs(5),
            page_load_timeout: Duration::from_secs(60),
            menu_timeout: Duration::from_secs(15),
            hamburger_settle: Duration::from_millis(300),
            frame_poll: Duration::from_secs(1),
            frame_attempts: 20,
            list_item_timeout: Duration::from_secs(30),
            viewer_load: Duration::from_secs(5),
            modal_timeout: Duration::from_secs(4),
            panel_poll: Duration::from_millis(200),
            panel_check_timeout: Duration::from_millis(1200),
            panel_timeout: Duration::from_secs(8),
            close_settle: Duration::from_millis(400),
            escape_settle: Duration::from_millis(300),
            export_processing: Duration::from_secs(15),
            download_start: Duration::from_millis(800),
            download_poll: Duration::from_millis(750),
            download_timeout: Duration::from_secs(180),
        }
    }
}

impl RoboConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RoboError::Config(e.to_string()))
    }

    /// Apply environment variable overrides.
    ///
    /// - `ZG_USER` / `ZG_PASS` - portal credentials
    /// - `HEADLESS` - `false`, `0` or `no` runs a visible browser
    /// - `PORT_ROBO` - HTTP listen port
    /// - `CHROME_PATH` - Chrome/Chromium executable
    /// - `ROBO_PROFILE_DIR` - shared profile directory (`none` disables it)
    /// - `ROBO_MAX_SESSIONS` - concurrent browser sessions
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = var("ZG_USER").filter(|v| !v.is_empty()) {
            self.portal.username = Some(val);
        }
        if let Some(val) = var("ZG_PASS").filter(|v| !v.is_empty()) {
            self.portal.password = Some(val);
        }
        if let Some(val) = var("HEADLESS") {
            self.browser.headless = parse_headless(&val);
        }
        if let Some(port) = var("PORT_ROBO").and_then(|v| v.trim().parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = var("CHROME_PATH").filter(|v| !v.is_empty()) {
            self.browser.chrome_path = Some(PathBuf::from(val));
        }
        if let Some(val) = var("ROBO_PROFILE_DIR") {
            self.browser.profile_dir = match val.trim() {
                "" | "none" => None,
                dir => Some(PathBuf::from(dir)),
            };
        }
        if let Some(n) = var("ROBO_MAX_SESSIONS").and_then(|v| v.trim().parse().ok()) {
            self.browser.max_sessions = n;
        }
        self
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("portal.login_url", &self.portal.login_url),
            ("portal.landing_url", &self.portal.landing_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| RoboError::Config(format!("{} '{}': {}", name, value, e)))?;
        }
        if self.browser.max_sessions == 0 {
            return Err(RoboError::Config(
                "browser.max_sessions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl BrowserConfig {
    /// Profile directory with `~` and environment variables expanded.
    pub fn resolved_profile_dir(&self) -> Option<PathBuf> {
        self.profile_dir.as_ref().map(|dir| expand_path(dir))
    }
}

fn parse_headless(val: &str) -> bool {
    !matches!(val.trim().to_lowercase().as_str(), "false" | "0" | "no")
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}
