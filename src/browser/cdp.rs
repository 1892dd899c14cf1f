//! chromiumoxide (CDP) implementation of the driver traits.
//!
//! Each frame is addressed through an isolated world created for it, so
//! queries run against the frame's own document (including nested iframes).
//! Element handles are CDP remote object ids scoped to that world.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::{
    GetContentQuadsParams, ScrollIntoViewIfNeededParams,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CreateIsolatedWorldParams, FrameId, FrameTree, GetFrameTreeParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    CallArgument, CallFunctionOnParams, EvaluateParams, ExecutionContextId, RemoteObject,
    RemoteObjectId,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::debug;

use super::{ButtonInfo, Frame, Key, Node, Page};
use crate::config::Viewport;
use crate::error::{Result, RoboError};

const WORLD_NAME: &str = "glosa-robo";

const COUNT_FN: &str = "function(sel) { return this.querySelectorAll(sel).length; }";
const NTH_FN: &str = "function(sel, i) { return this.querySelectorAll(sel)[i] || null; }";
const CLOSEST_FN: &str = r#"function(tag) {
    let n = this;
    while (n && n.tagName && n.tagName.toLowerCase() !== tag) {
        n = n.parentElement;
    }
    return n || null;
}"#;
const BUTTONS_FN: &str = r#"function() {
    return Array.from(this.querySelectorAll("button")).map((b) => {
        const icon = b.querySelector("mat-icon");
        return {
            text: (b.textContent || "").trim(),
            icon: icon ? (icon.textContent || "").trim() : null,
        };
    });
}"#;
const CLICK_FN: &str = "function() { this.click(); }";
const FOCUS_FN: &str = "function() { this.focus(); }";

/// A chromiumoxide tab.
#[derive(Clone)]
pub struct CdpPage {
    page: chromiumoxide::Page,
}

impl CdpPage {
    pub fn new(page: chromiumoxide::Page) -> Self {
        Self { page }
    }

    /// Pin the viewport so the portal renders its desktop layout.
    pub async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        );
        self.page.execute(params).await?;
        Ok(())
    }

    async fn frame_tree(&self) -> Result<FrameTree> {
        let resp = self.page.execute(GetFrameTreeParams::default()).await?;
        Ok(resp.result.frame_tree)
    }

    async fn attach(&self, frame_id: FrameId) -> Result<Arc<dyn Frame>> {
        Ok(Arc::new(CdpFrame::attach(self.page.clone(), frame_id).await?))
    }
}

fn flatten(tree: &FrameTree, out: &mut Vec<FrameId>) {
    out.push(tree.frame.id.clone());
    for child in tree.child_frames.iter().flatten() {
        flatten(child, out);
    }
}

fn find_subtree<'a>(tree: &'a FrameTree, id: &FrameId) -> Option<&'a FrameTree> {
    if &tree.frame.id == id {
        return Some(tree);
    }
    tree.child_frames
        .iter()
        .flatten()
        .find_map(|child| find_subtree(child, id))
}

#[async_trait]
impl Page for CdpPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        debug!("Navigating to {}", url);
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(RoboError::NavigationTimeout {
                target: url.to_string(),
                timeout,
            }),
        }
    }

    async fn wait_for_navigation(&self) -> Result<()> {
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn main_frame(&self) -> Result<Arc<dyn Frame>> {
        let tree = self.frame_tree().await?;
        self.attach(tree.frame.id).await
    }

    async fn frames(&self) -> Result<Vec<Arc<dyn Frame>>> {
        let tree = self.frame_tree().await?;
        let mut ids = Vec::new();
        flatten(&tree, &mut ids);

        let mut frames = Vec::with_capacity(ids.len());
        for id in ids {
            match self.attach(id).await {
                Ok(frame) => frames.push(frame),
                // Frames can detach between listing and attaching.
                Err(e) => debug!("Skipping frame: {}", e),
            }
        }
        Ok(frames)
    }
}

/// One frame of a chromiumoxide tab, bound to an isolated world.
///
/// The world dies with the document it was created for. When the frame
/// navigates, the next evaluation creates a fresh world and retries once.
pub struct CdpFrame {
    page: chromiumoxide::Page,
    frame_id: FrameId,
    context: Mutex<ExecutionContextId>,
}

/// Whether a CDP failure means the execution context no longer exists.
fn is_context_lost(err: &RoboError) -> bool {
    match err {
        RoboError::Browser(msg) => {
            msg.contains("Cannot find context") || msg.contains("context was destroyed")
        }
        _ => false,
    }
}

#[derive(Deserialize)]
struct RawButton {
    text: String,
    icon: Option<String>,
}

impl CdpFrame {
    async fn attach(page: chromiumoxide::Page, frame_id: FrameId) -> Result<Self> {
        let context = Self::create_world(&page, &frame_id).await?;
        Ok(Self {
            page,
            frame_id,
            context: Mutex::new(context),
        })
    }

    async fn create_world(
        page: &chromiumoxide::Page,
        frame_id: &FrameId,
    ) -> Result<ExecutionContextId> {
        let params = CreateIsolatedWorldParams::builder()
            .frame_id(frame_id.clone())
            .world_name(WORLD_NAME)
            .build()
            .map_err(RoboError::Browser)?;
        Ok(page.execute(params).await?.result.execution_context_id.clone())
    }

    fn context(&self) -> ExecutionContextId {
        self.context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn node(object: RemoteObject) -> Option<Node> {
        // `null` results carry no object id.
        object.object_id.map(|id| Node(id.inner().clone()))
    }

    async fn evaluate(&self, expression: String, by_value: bool) -> Result<RemoteObject> {
        match self.evaluate_in(self.context(), &expression, by_value).await {
            Err(e) if is_context_lost(&e) => {
                debug!("{} navigated, recreating isolated world", self.label());
                let context = Self::create_world(&self.page, &self.frame_id).await?;
                *self.context.lock().unwrap_or_else(|e| e.into_inner()) = context.clone();
                self.evaluate_in(context, &expression, by_value).await
            }
            other => other,
        }
    }

    async fn evaluate_in(
        &self,
        context: ExecutionContextId,
        expression: &str,
        by_value: bool,
    ) -> Result<RemoteObject> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .context_id(context)
            .return_by_value(by_value)
            .build()
            .map_err(RoboError::Browser)?;
        let resp = self.page.execute(params).await?;
        if let Some(ex) = &resp.result.exception_details {
            return Err(RoboError::Browser(ex.text.clone()));
        }
        Ok(resp.result.result.clone())
    }

    async fn call_on(
        &self,
        node: &Node,
        function: &str,
        args: Vec<Value>,
        by_value: bool,
    ) -> Result<RemoteObject> {
        let arguments: Vec<CallArgument> = args
            .into_iter()
            .map(|v| CallArgument::builder().value(v).build())
            .collect();
        let params = CallFunctionOnParams::builder()
            .function_declaration(function)
            .object_id(RemoteObjectId::new(node.0.clone()))
            .arguments(arguments)
            .return_by_value(by_value)
            .build()
            .map_err(RoboError::Browser)?;
        let resp = self.page.execute(params).await?;
        if let Some(ex) = &resp.result.exception_details {
            return Err(RoboError::Browser(ex.text.clone()));
        }
        Ok(resp.result.result.clone())
    }

    async fn document(&self) -> Result<Node> {
        Self::node(self.evaluate("document".to_string(), false).await?)
            .ok_or_else(|| RoboError::Browser("frame has no document".to_string()))
    }

    async fn count_within(&self, root: &Node, selector: &str) -> Result<usize> {
        let value = self
            .call_on(root, COUNT_FN, vec![json!(selector)], true)
            .await?
            .value
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        Ok(value as usize)
    }

    async fn nth_within(&self, root: &Node, selector: &str, idx: usize) -> Result<Option<Node>> {
        let object = self
            .call_on(root, NTH_FN, vec![json!(selector), json!(idx)], false)
            .await?;
        Ok(Self::node(object))
    }

    /// Center of the element's first non-empty content quad, in viewport coordinates.
    async fn clickable_point(&self, node: &Node) -> Result<(f64, f64)> {
        let id = RemoteObjectId::new(node.0.clone());
        let scroll = ScrollIntoViewIfNeededParams::builder()
            .object_id(id.clone())
            .build();
        self.page
            .execute(scroll)
            .await
            .map_err(|e| RoboError::NotClickable(e.to_string()))?;

        let quads = self
            .page
            .execute(GetContentQuadsParams::builder().object_id(id).build())
            .await
            .map_err(|e| RoboError::NotClickable(e.to_string()))?
            .result
            .quads
            .clone();

        for quad in &quads {
            let points = quad.inner();
            if points.len() < 8 {
                continue;
            }
            let xs = [points[0], points[2], points[4], points[6]];
            let ys = [points[1], points[3], points[5], points[7]];
            let width = xs.iter().cloned().fold(f64::MIN, f64::max)
                - xs.iter().cloned().fold(f64::MAX, f64::min);
            let height = ys.iter().cloned().fold(f64::MIN, f64::max)
                - ys.iter().cloned().fold(f64::MAX, f64::min);
            if width > 1.0 && height > 1.0 {
                return Ok((xs.iter().sum::<f64>() / 4.0, ys.iter().sum::<f64>() / 4.0));
            }
        }
        Err(RoboError::NotClickable(format!(
            "element has no visible box in {}",
            self.label()
        )))
    }

    async fn mouse(&self, kind: DispatchMouseEventType, x: f64, y: f64) -> Result<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(RoboError::Browser)?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn key(&self, kind: DispatchKeyEventType, key: Key) -> Result<()> {
        let params = DispatchKeyEventParams::builder()
            .r#type(kind)
            .key(key.name())
            .code(key.name())
            .windows_virtual_key_code(key.code())
            .native_virtual_key_code(key.code())
            .build()
            .map_err(RoboError::Browser)?;
        self.page.execute(params).await?;
        Ok(())
    }
}

#[async_trait]
impl Frame for CdpFrame {
    fn label(&self) -> String {
        format!("frame {}", self.frame_id.inner())
    }

    async fn query(&self, selector: &str) -> Result<Option<Node>> {
        let expression = format!("document.querySelector({})", json!(selector));
        Ok(Self::node(self.evaluate(expression, false).await?))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Node>> {
        let document = self.document().await?;
        self.query_all_within(&document, selector).await
    }

    async fn query_within(&self, root: &Node, selector: &str) -> Result<Option<Node>> {
        self.nth_within(root, selector, 0).await
    }

    async fn query_all_within(&self, root: &Node, selector: &str) -> Result<Vec<Node>> {
        let count = self.count_within(root, selector).await?;
        let mut nodes = Vec::with_capacity(count);
        for idx in 0..count {
            if let Some(node) = self.nth_within(root, selector, idx).await? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    async fn closest_ancestor(&self, node: &Node, tag: &str) -> Result<Option<Node>> {
        let object = self
            .call_on(node, CLOSEST_FN, vec![json!(tag.to_lowercase())], false)
            .await?;
        Ok(Self::node(object))
    }

    async fn buttons_within(&self, root: &Node) -> Result<Vec<ButtonInfo>> {
        let listing = self.call_on(root, BUTTONS_FN, Vec::new(), true).await?;
        let raw: Vec<RawButton> = match listing.value {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| RoboError::Browser(format!("unexpected button listing: {}", e)))?,
            None => Vec::new(),
        };

        let mut buttons = Vec::with_capacity(raw.len());
        for (idx, button) in raw.into_iter().enumerate() {
            if let Some(node) = self.nth_within(root, "button", idx).await? {
                buttons.push(ButtonInfo {
                    node,
                    text: button.text,
                    icon: button.icon,
                });
            }
        }
        Ok(buttons)
    }

    async fn is_visible(&self, node: &Node) -> Result<bool> {
        match self.clickable_point(node).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_clickable() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn click(&self, node: &Node, delay: Duration) -> Result<()> {
        let (x, y) = self.clickable_point(node).await?;
        self.mouse(DispatchMouseEventType::MouseMoved, x, y).await?;
        self.mouse(DispatchMouseEventType::MousePressed, x, y).await?;
        sleep(delay).await;
        self.mouse(DispatchMouseEventType::MouseReleased, x, y).await
    }

    async fn script_click(&self, node: &Node) -> Result<()> {
        self.call_on(node, CLICK_FN, Vec::new(), true).await?;
        Ok(())
    }

    async fn type_text(&self, node: &Node, text: &str, delay: Duration) -> Result<()> {
        self.call_on(node, FOCUS_FN, Vec::new(), true).await?;
        for ch in text.chars() {
            let params = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::Char)
                .text(ch.to_string())
                .build()
                .map_err(RoboError::Browser)?;
            self.page.execute(params).await?;
            sleep(delay).await;
        }
        Ok(())
    }

    async fn press_key(&self, key: Key) -> Result<()> {
        self.key(DispatchKeyEventType::KeyDown, key).await?;
        self.key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn child_frames(&self) -> Result<Vec<Arc<dyn Frame>>> {
        let tree = self
            .page
            .execute(GetFrameTreeParams::default())
            .await?
            .result
            .frame_tree
            .clone();
        let Some(subtree) = find_subtree(&tree, &self.frame_id) else {
            return Ok(Vec::new());
        };

        let mut children: Vec<Arc<dyn Frame>> = Vec::new();
        for child in subtree.child_frames.iter().flatten() {
            match CdpFrame::attach(self.page.clone(), child.frame.id.clone()).await {
                Ok(frame) => children.push(Arc::new(frame)),
                Err(e) => debug!("Skipping child frame: {}", e),
            }
        }
        Ok(children)
    }
}
