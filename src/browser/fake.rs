//! Scriptable in-memory DOM for tests.
//!
//! Selectors are not parsed: each frame maps literal selector strings to node
//! ids, and clicks are recorded (and may trigger scripted effects).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::session::{AutomationSession, SessionLauncher};
use super::{ButtonInfo, Frame, Key, Node, Page};
use crate::config::{PortalConfig, RoboConfig, Timings};
use crate::error::{Result, RoboError};
use crate::robo::{exports, portal, reports};

type Effect = Arc<dyn Fn(&FakeFrame) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Click {
    Native(String),
    Script(String),
}

#[derive(Default)]
struct FakeState {
    selectors: HashMap<String, Vec<Node>>,
    scoped: HashMap<(Node, String), Vec<Node>>,
    ancestors: HashMap<(Node, String), Node>,
    buttons: HashMap<Node, Vec<ButtonInfo>>,
    unclickable: HashSet<Node>,
    hidden: HashMap<Node, usize>,
    broken: HashSet<Node>,
    effects: HashMap<Node, Vec<Effect>>,
    clicks: Vec<Click>,
    keys: Vec<String>,
    typed: Vec<(String, String)>,
}

pub(crate) struct FakeFrame {
    name: String,
    state: Mutex<FakeState>,
    children: Mutex<Vec<Arc<FakeFrame>>>,
    detached: AtomicBool,
}

pub(crate) fn button(id: &str, text: &str, icon: Option<&str>) -> ButtonInfo {
    ButtonInfo {
        node: Node::new(id),
        text: text.to_string(),
        icon: icon.map(str::to_string),
    }
}

fn nodes(ids: &[&str]) -> Vec<Node> {
    ids.iter().map(|id| Node::new(*id)).collect()
}

impl FakeFrame {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(FakeState::default()),
            children: Mutex::new(Vec::new()),
            detached: AtomicBool::new(false),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// The document went away: every later call fails like a lost
    /// execution context.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    fn alive(&self) -> Result<()> {
        if self.detached.load(Ordering::SeqCst) {
            return Err(RoboError::Browser(format!(
                "Cannot find context with specified id ({})",
                self.name
            )));
        }
        Ok(())
    }

    pub fn set(&self, selector: &str, ids: &[&str]) {
        self.state()
            .selectors
            .insert(selector.to_string(), nodes(ids));
    }

    pub fn remove(&self, selector: &str) {
        self.state().selectors.remove(selector);
    }

    pub fn set_within(&self, root: &str, selector: &str, ids: &[&str]) {
        self.state()
            .scoped
            .insert((Node::new(root), selector.to_string()), nodes(ids));
    }

    pub fn set_ancestor(&self, node: &str, tag: &str, ancestor: &str) {
        self.state()
            .ancestors
            .insert((Node::new(node), tag.to_string()), Node::new(ancestor));
    }

    pub fn set_buttons(&self, root: &str, buttons: Vec<ButtonInfo>) {
        self.state().buttons.insert(Node::new(root), buttons);
    }

    pub fn unclickable(&self, id: &str) {
        self.state().unclickable.insert(Node::new(id));
    }

    /// Report the node as not visible for the next `polls` visibility checks.
    pub fn hidden_for(&self, id: &str, polls: usize) {
        self.state().hidden.insert(Node::new(id), polls);
    }

    pub fn broken(&self, id: &str) {
        self.state().broken.insert(Node::new(id));
    }

    pub fn on_click(&self, id: &str, effect: impl Fn(&FakeFrame) + Send + Sync + 'static) {
        self.state()
            .effects
            .entry(Node::new(id))
            .or_default()
            .push(Arc::new(effect));
    }

    pub fn add_child(&self, child: Arc<FakeFrame>) {
        self.children.lock().unwrap().push(child);
    }

    pub fn clicks(&self) -> Vec<Click> {
        self.state().clicks.clone()
    }

    pub fn clicked_ids(&self) -> Vec<String> {
        self.clicks()
            .into_iter()
            .map(|c| match c {
                Click::Native(id) | Click::Script(id) => id,
            })
            .collect()
    }

    pub fn native_clicks(&self) -> Vec<String> {
        self.clicks()
            .into_iter()
            .filter_map(|c| match c {
                Click::Native(id) => Some(id),
                Click::Script(_) => None,
            })
            .collect()
    }

    pub fn script_clicks(&self) -> Vec<String> {
        self.clicks()
            .into_iter()
            .filter_map(|c| match c {
                Click::Script(id) => Some(id),
                Click::Native(_) => None,
            })
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().keys.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state().typed.clone()
    }

    fn fire(&self, node: &Node, click: Click) {
        let effects = {
            let mut state = self.state();
            state.clicks.push(click);
            state.effects.get(node).cloned().unwrap_or_default()
        };
        for effect in effects {
            effect(self);
        }
    }
}

#[async_trait]
impl Frame for FakeFrame {
    fn label(&self) -> String {
        self.name.clone()
    }

    async fn query(&self, selector: &str) -> Result<Option<Node>> {
        self.alive()?;
        Ok(self
            .state()
            .selectors
            .get(selector)
            .and_then(|n| n.first().cloned()))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Node>> {
        self.alive()?;
        Ok(self
            .state()
            .selectors
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn query_within(&self, root: &Node, selector: &str) -> Result<Option<Node>> {
        Ok(self
            .query_all_within(root, selector)
            .await?
            .into_iter()
            .next())
    }

    async fn query_all_within(&self, root: &Node, selector: &str) -> Result<Vec<Node>> {
        self.alive()?;
        Ok(self
            .state()
            .scoped
            .get(&(root.clone(), selector.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn closest_ancestor(&self, node: &Node, tag: &str) -> Result<Option<Node>> {
        self.alive()?;
        Ok(self
            .state()
            .ancestors
            .get(&(node.clone(), tag.to_string()))
            .cloned())
    }

    async fn buttons_within(&self, root: &Node) -> Result<Vec<ButtonInfo>> {
        self.alive()?;
        Ok(self.state().buttons.get(root).cloned().unwrap_or_default())
    }

    async fn is_visible(&self, node: &Node) -> Result<bool> {
        self.alive()?;
        let mut state = self.state();
        if state.unclickable.contains(node) {
            return Ok(false);
        }
        match state.hidden.get_mut(node) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    async fn click(&self, node: &Node, _delay: Duration) -> Result<()> {
        self.alive()?;
        {
            let state = self.state();
            if state.unclickable.contains(node) {
                return Err(RoboError::NotClickable(node.id().to_string()));
            }
            if state.broken.contains(node) {
                return Err(RoboError::Browser(format!("node {} detached", node.id())));
            }
        }
        self.fire(node, Click::Native(node.id().to_string()));
        Ok(())
    }

    async fn script_click(&self, node: &Node) -> Result<()> {
        self.alive()?;
        self.fire(node, Click::Script(node.id().to_string()));
        Ok(())
    }

    async fn type_text(&self, node: &Node, text: &str, _delay: Duration) -> Result<()> {
        self.alive()?;
        self.state()
            .typed
            .push((node.id().to_string(), text.to_string()));
        Ok(())
    }

    async fn press_key(&self, key: Key) -> Result<()> {
        self.alive()?;
        self.state().keys.push(key.name().to_string());
        Ok(())
    }

    async fn child_frames(&self) -> Result<Vec<Arc<dyn Frame>>> {
        Ok(self
            .children
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.clone() as Arc<dyn Frame>)
            .collect())
    }
}

pub(crate) struct FakePage {
    main: Mutex<Arc<FakeFrame>>,
    frames: Mutex<Vec<Arc<FakeFrame>>>,
    gotos: Mutex<Vec<String>>,
    navigations: AtomicUsize,
}

impl FakePage {
    pub fn new(main: Arc<FakeFrame>) -> Arc<Self> {
        Arc::new(Self {
            main: Mutex::new(main),
            frames: Mutex::new(Vec::new()),
            gotos: Mutex::new(Vec::new()),
            navigations: AtomicUsize::new(0),
        })
    }

    /// Register a non-top-level frame.
    pub fn add_frame(&self, frame: Arc<FakeFrame>) {
        self.frames.lock().unwrap().push(frame);
    }

    pub fn gotos(&self) -> Vec<String> {
        self.gotos.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    fn current_main(&self) -> Arc<FakeFrame> {
        self.main.lock().unwrap().clone()
    }

    /// Clicking `id` in `frame` loads a new document: `frame` is detached and
    /// `next` becomes the main frame.
    pub fn navigate_on_click(self: &Arc<Self>, frame: &FakeFrame, id: &str, next: Arc<FakeFrame>) {
        let page = Arc::downgrade(self);
        frame.on_click(id, move |old| {
            old.detach();
            if let Some(page) = page.upgrade() {
                *page.main.lock().unwrap() = next.clone();
            }
        });
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.gotos.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn wait_for_navigation(&self) -> Result<()> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn main_frame(&self) -> Result<Arc<dyn Frame>> {
        Ok(self.current_main())
    }

    async fn frames(&self) -> Result<Vec<Arc<dyn Frame>>> {
        let mut all: Vec<Arc<dyn Frame>> = vec![self.current_main()];
        all.extend(
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|f| f.clone() as Arc<dyn Frame>),
        );
        Ok(all)
    }
}

/// Millisecond-scale timings so flows finish quickly under test.
pub(crate) fn fast_timings() -> Timings {
    let ms = Duration::from_millis;
    Timings {
        click_delay: ms(0),
        type_delay: ms(0),
        menu_click_delay: ms(0),
        selector_poll: ms(2),
        login_field_timeout: ms(40),
        login_navigation_timeout: ms(200),
        popup_timeout: ms(10),
        page_load_timeout: ms(200),
        menu_timeout: ms(40),
        hamburger_settle: ms(1),
        frame_poll: ms(5),
        frame_attempts: 3,
        list_item_timeout: ms(40),
        viewer_load: ms(1),
        modal_timeout: ms(10),
        panel_poll: ms(2),
        panel_check_timeout: ms(10),
        panel_timeout: ms(30),
        close_settle: ms(1),
        escape_settle: ms(1),
        export_processing: ms(1),
        download_start: ms(1),
        download_poll: ms(5),
        download_timeout: ms(300),
    }
}

/// Config with credentials set and [`fast_timings`].
pub(crate) fn test_config() -> RoboConfig {
    RoboConfig {
        portal: PortalConfig {
            username: Some("operador".to_string()),
            password: Some("segredo".to_string()),
            ..PortalConfig::default()
        },
        timings: fast_timings(),
        ..RoboConfig::default()
    }
}

/// A responsive portal: login form, desktop menu, reports frame with every
/// known report, two viewer frames and an open exports card whose first row
/// downloads `file_name` into `download_dir`.
pub(crate) struct FakePortal {
    pub page: Arc<FakePage>,
    pub main: Arc<FakeFrame>,
    pub reports: Arc<FakeFrame>,
    pub viewer: Arc<FakeFrame>,
}

pub(crate) const EXPORTED_FILE: &str = "analitico_glosas.xlsx";

impl FakePortal {
    pub fn new(download_dir: &Path) -> Self {
        let main = FakeFrame::new("main");
        main.set(portal::USERNAME_SELECTOR, &["username"]);
        main.set(portal::PASSWORD_SELECTOR, &["password"]);
        main.set(portal::SUBMIT_SELECTOR, &["submit"]);
        main.set(portal::DESKTOP_MENU_SELECTOR, &["reports-menu"]);

        let frame = FakeFrame::new("reports");
        frame.set(
            portal::REPORTS_MARKER,
            &["cat-1", "cat-2", "cat-3", "cat-4"],
        );
        frame.set(
            &reports::category_selector(reports::CATEGORY_POSITION),
            &["cat-4-title"],
        );
        for report in reports::ReportId::ALL {
            let position = report.position();
            let id = format!("report-{}", position);
            frame.set(&reports::report_selector(position), &[id.as_str()]);
        }

        frame.set(exports::PANEL_SELECTOR, &["exports-card"]);
        frame.set_within(
            "exports-card",
            exports::LIST_ITEM_SELECTOR,
            &["row-1", "row-2"],
        );
        frame.set_buttons(
            "exports-card",
            vec![
                button("export-btn", "Exportar", None),
                button("close-btn", "", Some("close")),
                button("row-1-download", "", Some("file_download")),
                button("row-2-download", "", Some("file_download")),
            ],
        );
        frame.set_buttons(
            "row-1",
            vec![button("row-1-download", "", Some("file_download"))],
        );
        frame.set_buttons(
            "row-2",
            vec![button("row-2-download", "", Some("file_download"))],
        );

        let target: PathBuf = download_dir.join(EXPORTED_FILE);
        frame.on_click("row-1-download", move |_| {
            std::fs::write(&target, b"PK\x03\x04fake-spreadsheet").unwrap();
        });

        let viewer_a = FakeFrame::new("viewer-a");
        let viewer = FakeFrame::new("viewer-b");
        viewer.set(reports::VIEWER_MODALS[0], &["modal-1"]);
        viewer.set(reports::VIEWER_MODALS[1], &["modal-2"]);
        frame.add_child(viewer_a.clone());
        frame.add_child(viewer.clone());

        let page = FakePage::new(main.clone());
        page.add_frame(frame.clone());
        page.add_frame(viewer_a);
        page.add_frame(viewer.clone());

        Self {
            page,
            main,
            reports: frame,
            viewer,
        }
    }
}

/// Launcher handing out sessions over a scripted page.
pub(crate) struct FakeLauncher {
    page: Arc<FakePage>,
    download_dir: PathBuf,
    fail: bool,
    pub launches: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(page: Arc<FakePage>, download_dir: &Path) -> Self {
        Self {
            page,
            download_dir: download_dir.to_path_buf(),
            fail: false,
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

struct FakeSession {
    page: Arc<FakePage>,
    download_dir: PathBuf,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn AutomationSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RoboError::Launch("no display".to_string()));
        }
        Ok(Box::new(FakeSession {
            page: self.page.clone(),
            download_dir: self.download_dir.clone(),
            closes: self.closes.clone(),
        }))
    }
}

#[async_trait]
impl AutomationSession for FakeSession {
    fn page(&self) -> &dyn Page {
        self.page.as_ref()
    }

    fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    async fn close(self: Box<Self>) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
