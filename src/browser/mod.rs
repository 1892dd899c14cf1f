//! Browser driver abstraction.
//!
//! The robot only needs a handful of DOM operations against the portal. They
//! are expressed as the [`Frame`] and [`Page`] traits so the flows run the
//! same way against chromiumoxide (see [`cdp`]) and against the in-memory DOM
//! used by tests.

pub mod binary;
#[cfg(feature = "browser")]
pub mod cdp;
pub mod dom;
pub mod session;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use session::{AutomationSession, ChromeLauncher, SessionGuard, SessionLauncher, SessionPool};

/// Opaque handle to a DOM element living in one frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node(pub(crate) String);

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Snapshot of a button-like element: its visible text and the label of its
/// nested icon glyph, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonInfo {
    pub node: Node,
    pub text: String,
    pub icon: Option<String>,
}

/// Keys the robot sends outside of text entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
}

impl Key {
    pub fn name(self) -> &'static str {
        match self {
            Key::Escape => "Escape",
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Key::Escape => 27,
        }
    }
}

/// One document (top-level page or iframe) in the automated browser.
#[async_trait]
pub trait Frame: Send + Sync {
    /// Short description for logs.
    fn label(&self) -> String;

    /// First element matching `selector` in this document.
    async fn query(&self, selector: &str) -> Result<Option<Node>>;

    /// All elements matching `selector` in this document, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<Node>>;

    /// First element matching `selector` below `root`.
    async fn query_within(&self, root: &Node, selector: &str) -> Result<Option<Node>>;

    /// All elements matching `selector` below `root`.
    async fn query_all_within(&self, root: &Node, selector: &str) -> Result<Vec<Node>>;

    /// Nearest ancestor (or the node itself) with the given tag name.
    async fn closest_ancestor(&self, node: &Node, tag: &str) -> Result<Option<Node>>;

    /// Every `<button>` below `root`, in document order.
    async fn buttons_within(&self, root: &Node) -> Result<Vec<ButtonInfo>>;

    /// Whether the element is rendered with a non-empty box.
    async fn is_visible(&self, node: &Node) -> Result<bool>;

    /// Native pointer click. Fails with `NotClickable` when the element has
    /// no clickable box.
    async fn click(&self, node: &Node, delay: Duration) -> Result<()>;

    /// Invoke the element's click behaviour from script.
    async fn script_click(&self, node: &Node) -> Result<()>;

    /// Focus the element and type `text` one character at a time.
    async fn type_text(&self, node: &Node, text: &str, delay: Duration) -> Result<()>;

    /// Dispatch a key press to whatever has focus.
    async fn press_key(&self, key: Key) -> Result<()>;

    /// Direct child frames, in document order.
    async fn child_frames(&self) -> Result<Vec<Arc<dyn Frame>>>;
}

/// A browser tab.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for the load to finish, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Resolve once the in-flight navigation completes.
    async fn wait_for_navigation(&self) -> Result<()>;

    /// The top-level document.
    async fn main_frame(&self) -> Result<Arc<dyn Frame>>;

    /// Every frame in the tab, top-level first, nested frames after their parent.
    async fn frames(&self) -> Result<Vec<Arc<dyn Frame>>>;
}
