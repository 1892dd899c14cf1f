//! DOM interaction helpers.
//!
//! The portal offers no stable identifiers for its controls, so buttons are
//! located by fuzzy, case-insensitive matching on icon glyphs and visible text,
//! and lookups are expressed as ordered fallback chains.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use super::{Frame, Node};
use crate::error::{Result, RoboError};

/// Click with a short pointer delay, falling back to a scripted click when the
/// element cannot take a native click. Any other failure propagates.
pub async fn safe_click(frame: &dyn Frame, node: &Node, delay: Duration) -> Result<()> {
    match frame.click(node, delay).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_clickable() => {
            debug!("Native click rejected ({}), clicking via script", e);
            frame.script_click(node).await
        }
        Err(e) => Err(e),
    }
}

/// First button below `root` whose icon label contains `icon`.
pub async fn query_button_by_icon(
    frame: &dyn Frame,
    root: &Node,
    icon: &str,
) -> Result<Option<Node>> {
    let needle = icon.to_lowercase();
    let buttons = frame.buttons_within(root).await?;
    Ok(buttons
        .into_iter()
        .find(|b| {
            b.icon
                .as_deref()
                .is_some_and(|i| i.trim().to_lowercase().contains(&needle))
        })
        .map(|b| b.node))
}

/// First button below `root` whose text contains one of `labels`.
///
/// Labels are tried in the order given: a button matching an earlier label
/// wins over an earlier button that only matches a later label.
pub async fn query_button_by_text(
    frame: &dyn Frame,
    root: &Node,
    labels: &[&str],
) -> Result<Option<Node>> {
    let buttons = frame.buttons_within(root).await?;
    let texts: Vec<String> = buttons
        .iter()
        .map(|b| b.text.trim().to_lowercase())
        .collect();

    for label in labels {
        let needle = label.to_lowercase();
        if let Some(idx) = texts
            .iter()
            .position(|t| !t.is_empty() && t.contains(&needle))
        {
            return Ok(Some(buttons[idx].node.clone()));
        }
    }
    Ok(None)
}

/// One way of locating a control inside a UI fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// Button whose icon glyph label contains the name.
    Icon(&'a str),
    /// Button whose text contains any of the labels, in priority order.
    Text(&'a [&'a str]),
    /// Fixed structural selector relative to the fragment root.
    Selector(&'a str),
}

impl Lookup<'_> {
    async fn run(&self, frame: &dyn Frame, root: &Node) -> Result<Option<Node>> {
        match self {
            Lookup::Icon(icon) => query_button_by_icon(frame, root, icon).await,
            Lookup::Text(labels) => query_button_by_text(frame, root, labels).await,
            Lookup::Selector(selector) => frame.query_within(root, selector).await,
        }
    }
}

/// Evaluate lookups in order and stop at the first hit.
///
/// Returns the index of the strategy that matched along with the node.
pub async fn first_match(
    frame: &dyn Frame,
    root: &Node,
    chain: &[Lookup<'_>],
) -> Result<Option<(usize, Node)>> {
    for (idx, lookup) in chain.iter().enumerate() {
        if let Some(node) = lookup.run(frame, root).await? {
            debug!("Lookup {:?} matched", lookup);
            return Ok(Some((idx, node)));
        }
    }
    Ok(None)
}

/// Poll for `selector` until it appears or `timeout` elapses.
pub async fn wait_for_selector(
    frame: &dyn Frame,
    selector: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<Node> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(node) = frame.query(selector).await? {
            return Ok(node);
        }
        if Instant::now() >= deadline {
            return Err(RoboError::SelectorTimeout {
                selector: selector.to_string(),
                timeout,
            });
        }
        sleep(poll).await;
    }
}

/// Poll until `selector` matches an element with a visible box.
pub async fn wait_for_visible(
    frame: &dyn Frame,
    selector: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<Node> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(node) = frame.query(selector).await? {
            if frame.is_visible(&node).await? {
                return Ok(node);
            }
        }
        if Instant::now() >= deadline {
            return Err(RoboError::SelectorTimeout {
                selector: selector.to_string(),
                timeout,
            });
        }
        sleep(poll).await;
    }
}

/// Wait for `selector`, then native-click it.
pub async fn click_selector(
    frame: &dyn Frame,
    selector: &str,
    timeout: Duration,
    poll: Duration,
    delay: Duration,
) -> Result<()> {
    let node = wait_for_selector(frame, selector, timeout, poll).await?;
    frame.click(&node, delay).await
}
