//! Login and navigation up to the reports frame.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info};

use super::step::optional;
use crate::browser::dom::{click_selector, wait_for_selector, wait_for_visible};
use crate::browser::{Frame, Page};
use crate::config::{PortalConfig, Timings};
use crate::error::{Result, RoboError};

pub const USERNAME_SELECTOR: &str = "#username";
pub const PASSWORD_SELECTOR: &str = "#password";
pub const SUBMIT_SELECTOR: &str = "#submit";
/// "Don't show again" button of the first-run popup.
pub const POPUP_SELECTOR: &str = "#btnNaoExibirPopUpLogin_0";

/// "Painéis e relatórios" entry of the desktop navbar.
pub const DESKTOP_MENU_SELECTOR: &str = "ul.navbar-left a";

/// Buttons that may open the collapsed navbar on narrow layouts, in order.
pub const HAMBURGER_SELECTORS: &[&str] = &[
    "button[aria-label*='menu']",
    "button.mat-icon-button",
    "button[aria-label*='abrir']",
    "button[aria-label*='open']",
];

/// Element that only exists inside the reports frame.
pub const REPORTS_MARKER: &str = "zg-category-list-item";

/// Sign in and land on the portal page hosting the reports menu.
pub async fn login(page: &dyn Page, portal: &PortalConfig, timings: &Timings) -> Result<()> {
    let (username, password) = portal.credentials()?;

    info!("Opening login page");
    page.goto(&portal.login_url, timings.page_load_timeout).await?;
    let main = page.main_frame().await?;
    let frame = main.as_ref();

    let field = wait_for_selector(
        frame,
        USERNAME_SELECTOR,
        timings.login_field_timeout,
        timings.selector_poll,
    )
    .await?;
    frame.type_text(&field, username, timings.type_delay).await?;

    let field = wait_for_selector(
        frame,
        PASSWORD_SELECTOR,
        timings.login_field_timeout,
        timings.selector_poll,
    )
    .await?;
    frame.type_text(&field, password, timings.type_delay).await?;

    info!("Submitting login");
    let submit = wait_for_selector(
        frame,
        SUBMIT_SELECTOR,
        timings.login_field_timeout,
        timings.selector_poll,
    )
    .await?;
    let submitted = async {
        tokio::try_join!(
            page.wait_for_navigation(),
            frame.click(&submit, timings.click_delay)
        )
    };
    tokio::time::timeout(timings.login_navigation_timeout, submitted)
        .await
        .map_err(|_| RoboError::NavigationTimeout {
            target: portal.login_url.clone(),
            timeout: timings.login_navigation_timeout,
        })??;

    // Submitting replaced the document; the old frame handle is stale.
    let main = page.main_frame().await?;
    let popup = click_selector(
        main.as_ref(),
        POPUP_SELECTOR,
        timings.popup_timeout,
        timings.selector_poll,
        timings.click_delay,
    );
    match optional("dismiss login popup", popup).await {
        Some(()) => info!("Closed first-run popup"),
        None => debug!("No first-run popup"),
    }

    // The navbar layout depends on the viewport; the landing page always
    // carries the reports menu.
    page.goto(&portal.landing_url, timings.page_load_timeout).await?;
    info!("Logged in, portal open");
    Ok(())
}

/// Open "Painéis e relatórios": desktop navbar first, then the collapsed
/// menu behind each hamburger candidate.
pub async fn open_reports_menu(page: &dyn Page, timings: &Timings) -> Result<()> {
    let main = page.main_frame().await?;
    let frame = main.as_ref();

    if frame.query(DESKTOP_MENU_SELECTOR).await?.is_some() {
        let item = wait_for_visible(
            frame,
            DESKTOP_MENU_SELECTOR,
            timings.menu_timeout,
            timings.selector_poll,
        )
        .await?;
        frame.click(&item, timings.menu_click_delay).await?;
        info!("Opened reports menu");
        return Ok(());
    }

    for selector in HAMBURGER_SELECTORS {
        let Some(button) = frame.query(selector).await? else {
            continue;
        };
        debug!("Trying collapsed menu via {}", selector);
        frame.click(&button, timings.click_delay).await?;
        sleep(timings.hamburger_settle).await;

        if let Some(item) = frame.query(DESKTOP_MENU_SELECTOR).await? {
            frame.click(&item, timings.menu_click_delay).await?;
            info!("Opened reports menu through {}", selector);
            return Ok(());
        }
    }

    Err(RoboError::ReportsMenuUnavailable)
}

/// Poll every frame of the page for the reports marker.
pub async fn wait_for_reports_frame(page: &dyn Page, timings: &Timings) -> Result<Arc<dyn Frame>> {
    let attempts = timings.frame_attempts;
    for attempt in 1..=attempts {
        for frame in page.frames().await? {
            match frame.query(REPORTS_MARKER).await {
                Ok(Some(_)) => {
                    info!("Reports frame found on attempt {}", attempt);
                    return Ok(frame);
                }
                Ok(None) => {}
                // Frames detach while the portal loads.
                Err(e) => debug!("Skipping frame {}: {}", frame.label(), e),
            }
        }
        debug!("Attempt {}/{}: reports frame not found yet", attempt, attempts);
        sleep(timings.frame_poll).await;
    }
    Err(RoboError::ReportsFrameMissing(attempts))
}
