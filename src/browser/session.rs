//! Per-request browser sessions.
//!
//! A session is one browser process, one page and one private download
//! directory. Sessions are never shared between requests. Owners hold them
//! through a [`SessionGuard`], which closes the session even when the owning
//! future is dropped mid-flight.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use super::Page;
use crate::error::{Result, RoboError};

/// A live automation session.
#[async_trait]
pub trait AutomationSession: Send {
    fn page(&self) -> &dyn Page;

    /// Directory the browser saves downloads into. Unique per session.
    fn download_dir(&self) -> &Path;

    /// Terminate the browser and release the session's resources.
    async fn close(self: Box<Self>);
}

/// Opens sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn AutomationSession>>;
}

/// Admission control in front of a launcher: at most `max_sessions` sessions
/// are alive at once; further launches wait for a slot.
pub struct SessionPool {
    launcher: Arc<dyn SessionLauncher>,
    permits: Arc<Semaphore>,
    max_sessions: usize,
}

impl SessionPool {
    pub fn new(launcher: Arc<dyn SessionLauncher>, max_sessions: usize) -> Self {
        let max_sessions = max_sessions.max(1);
        Self {
            launcher,
            permits: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
        }
    }

    /// Slots not currently held by a session.
    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.max_sessions
    }
}

/// Owner of a launched session.
///
/// [`SessionGuard::close`] is the normal exit. If the guard is dropped first,
/// the close runs on a spawned task instead.
pub struct SessionGuard {
    session: Option<Box<dyn AutomationSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn AutomationSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// The session's page and download directory.
    pub fn parts(&self) -> Result<(&dyn Page, &Path)> {
        match &self.session {
            Some(session) => Ok((session.page(), session.download_dir())),
            None => Err(RoboError::Browser("session already closed".to_string())),
        }
    }

    pub async fn close(mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Session abandoned before close, closing in background");
                handle.spawn(session.close());
            }
            Err(_) => warn!("Session abandoned outside a runtime, dropping it"),
        }
    }
}

struct PooledSession {
    inner: Box<dyn AutomationSession>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl AutomationSession for PooledSession {
    fn page(&self) -> &dyn Page {
        self.inner.page()
    }

    fn download_dir(&self) -> &Path {
        self.inner.download_dir()
    }

    async fn close(self: Box<Self>) {
        let PooledSession { inner, _permit } = *self;
        inner.close().await;
    }
}

#[async_trait]
impl SessionLauncher for SessionPool {
    async fn launch(&self) -> Result<Box<dyn AutomationSession>> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RoboError::Launch(e.to_string()))?;
        debug!(
            "Session slot acquired ({} of {} free)",
            self.permits.available_permits(),
            self.max_sessions
        );
        let inner = self.launcher.launch().await?;
        Ok(Box::new(PooledSession {
            inner,
            _permit: permit,
        }))
    }
}

#[cfg(feature = "browser")]
pub use chrome::ChromeLauncher;

#[cfg(feature = "browser")]
mod chrome {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::browser::{
        SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
    };
    use chromiumoxide::Browser;
    use futures::StreamExt;
    use tempfile::TempDir;
    use tokio::sync::{Mutex, OwnedMutexGuard};
    use tokio::task::JoinHandle;
    use tracing::{debug, info, warn};

    use super::{AutomationSession, SessionLauncher};
    use crate::browser::binary::find_chrome;
    use crate::browser::cdp::CdpPage;
    use crate::browser::Page;
    use crate::config::BrowserConfig;
    use crate::error::{Result, RoboError};

    /// Launches a local Chrome/Chromium per session.
    pub struct ChromeLauncher {
        config: BrowserConfig,
        /// Serialises sessions that share the persistent profile directory.
        profile_lock: Arc<Mutex<()>>,
    }

    impl ChromeLauncher {
        pub fn new(config: BrowserConfig) -> Self {
            Self {
                config,
                profile_lock: Arc::new(Mutex::new(())),
            }
        }

        fn browser_config(
            &self,
            executable: PathBuf,
            profile: &Path,
        ) -> Result<chromiumoxide::BrowserConfig> {
            let viewport = self.config.viewport;
            let mut builder = chromiumoxide::BrowserConfig::builder()
                .chrome_executable(executable)
                .user_data_dir(profile)
                .arg("--no-sandbox")
                .arg("--disable-setuid-sandbox")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg(format!(
                    "--window-size={},{}",
                    viewport.width, viewport.height
                ));

            // with_head means NOT headless
            if !self.config.headless {
                builder = builder.with_head();
            }

            for arg in &self.config.chrome_args {
                builder = builder.arg(arg);
            }

            builder
                .build()
                .map_err(|e| RoboError::Launch(format!("invalid browser config: {}", e)))
        }

        async fn open_page(&self, browser: &Browser, download_dir: &Path) -> Result<CdpPage> {
            let page = CdpPage::new(browser.new_page("about:blank").await?);
            page.set_viewport(self.config.viewport).await?;

            let params = SetDownloadBehaviorParams::builder()
                .behavior(SetDownloadBehaviorBehavior::Allow)
                .download_path(download_dir.to_string_lossy().to_string())
                .build()
                .map_err(RoboError::Browser)?;
            browser.execute(params).await?;
            Ok(page)
        }
    }

    #[async_trait]
    impl SessionLauncher for ChromeLauncher {
        async fn launch(&self) -> Result<Box<dyn AutomationSession>> {
            let executable = find_chrome(self.config.chrome_path.as_deref())?;

            let download_dir = tempfile::Builder::new().prefix("zg-").tempdir()?;

            let (profile_guard, scratch_profile, profile) =
                match self.config.resolved_profile_dir() {
                    Some(dir) => {
                        let guard = self.profile_lock.clone().lock_owned().await;
                        std::fs::create_dir_all(&dir)?;
                        let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
                        (Some(guard), None, dir)
                    }
                    None => {
                        let scratch = tempfile::Builder::new().prefix("zg-profile-").tempdir()?;
                        let dir = scratch.path().to_path_buf();
                        (None, Some(scratch), dir)
                    }
                };

            info!(
                "Launching browser (headless={}, profile={})",
                self.config.headless,
                profile.display()
            );
            let config = self.browser_config(executable, &profile)?;
            let (mut browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| RoboError::Launch(e.to_string()))?;

            let handler_task = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            let page = match self.open_page(&browser, download_dir.path()).await {
                Ok(page) => page,
                Err(e) => {
                    let _ = browser.close().await;
                    let _ = browser.wait().await;
                    handler_task.abort();
                    return Err(e);
                }
            };
            debug!("Downloads go to {}", download_dir.path().display());

            Ok(Box::new(ChromeSession {
                browser,
                handler_task,
                page,
                download_dir,
                _scratch_profile: scratch_profile,
                _profile_guard: profile_guard,
            }))
        }
    }

    struct ChromeSession {
        browser: Browser,
        handler_task: JoinHandle<()>,
        page: CdpPage,
        download_dir: TempDir,
        _scratch_profile: Option<TempDir>,
        _profile_guard: Option<OwnedMutexGuard<()>>,
    }

    #[async_trait]
    impl AutomationSession for ChromeSession {
        fn page(&self) -> &dyn Page {
            &self.page
        }

        fn download_dir(&self) -> &Path {
            self.download_dir.path()
        }

        async fn close(mut self: Box<Self>) {
            if let Err(e) = self.browser.close().await {
                warn!("Browser close failed: {}", e);
            }
            if let Err(e) = self.browser.wait().await {
                warn!("Waiting for browser exit failed: {}", e);
            }
            self.handler_task.abort();
            info!("Browser session closed");
        }
    }

    impl Drop for ChromeSession {
        fn drop(&mut self) {
            self.handler_task.abort();
        }
    }
}

#[cfg(not(feature = "browser"))]
pub use stub::ChromeLauncher;

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
mod stub {
    use async_trait::async_trait;

    use super::{AutomationSession, SessionLauncher};
    use crate::config::BrowserConfig;
    use crate::error::{Result, RoboError};

    pub struct ChromeLauncher;

    impl ChromeLauncher {
        pub fn new(_config: BrowserConfig) -> Self {
            Self
        }
    }

    #[async_trait]
    impl SessionLauncher for ChromeLauncher {
        async fn launch(&self) -> Result<Box<dyn AutomationSession>> {
            Err(RoboError::Launch(
                "Browser support not compiled. Rebuild with: cargo build --features browser"
                    .to_string(),
            ))
        }
    }
}
