// src/browser_portal.rs
//! Headless Chromium session against the timekeeping portal.
//!
//! Logs in through the identity broker, opens the timecard view and reads the
//! cumulative-hours and fortnight reference-date elements. The browser is
//! closed on every exit path.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, warn};

use crate::timecard_client::{PortalReading, TimecardError, TimecardPortal};

pub const DEFAULT_LOGIN_URL: &str = "https://cust03-prd01-ath01.prd.mykronos.com/authn/XUI/?realm=monashhealth_prd_01&service=1850CustomerIDPChain&goto=https%3A%2F%2Fmonashhealth-sso.prd.mykronos.com%3A443%2F";
pub const DEFAULT_TIMECARD_URL: &str =
    "https://monashhealth-sso.prd.mykronos.com/timekeeping#/myTimecard?ctxt=myTimecard";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// CSS selectors for the elements the session touches.
#[derive(Debug, Clone)]
pub struct PortalSelectors {
    pub username: String,
    pub password: String,
    pub post_login_landmark: String,
    pub cumulative_hours: String,
    pub reference_date: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            username: "#userNameInput".to_string(),
            password: "#passwordInput".to_string(),
            post_login_landmark: "#emptimecard-btn-204 > div > div:nth-child(2) > i".to_string(),
            cumulative_hours: r#"[id="13_cumulativetotal"] > span:nth-child(3) > span > span"#
                .to_string(),
            reference_date: ".timeframe-selector .date-range span:first-child".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub login_url: String,
    pub timecard_url: String,
    pub username: String,
    pub password: String,
    pub selectors: PortalSelectors,
    pub login_timeout: Duration,
    pub hours_timeout: Duration,
    /// Pause after opening the timecard view; it fills in asynchronously.
    pub settle_delay: Duration,
    pub browser_executable: Option<PathBuf>,
}

pub struct BrowserPortal {
    settings: PortalSettings,
}

impl BrowserPortal {
    pub fn new(settings: PortalSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self) -> Result<BrowserConfig, TimecardError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .request_timeout(Duration::from_secs(30));
        if let Some(path) = &self.settings.browser_executable {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|e| TimecardError::Browser(format!("Failed to build browser config: {}", e)))
    }

    async fn run_session(&self, browser: &Browser) -> Result<PortalReading, TimecardError> {
        let s = &self.settings;

        debug!("Opening login page");
        let page = browser.new_page(s.login_url.as_str()).await?;

        let username = wait_for_element(
            &page,
            "username field",
            &s.selectors.username,
            s.login_timeout,
        )
        .await?;
        username.type_str(&s.username).await?;

        let password = page.find_element(s.selectors.password.as_str()).await?;
        password.type_str(&s.password).await?;
        password.press_key("Enter").await?;

        wait_for_element(
            &page,
            "post-login landmark",
            &s.selectors.post_login_landmark,
            s.login_timeout,
        )
        .await?;
        info!("Portal login succeeded");

        page.goto(s.timecard_url.as_str()).await?;
        sleep(s.settle_delay).await;

        let hours = wait_for_element(
            &page,
            "cumulative hours",
            &s.selectors.cumulative_hours,
            s.hours_timeout,
        )
        .await?;
        let hours_text = hours.inner_text().await?;

        let reference = page.find_element(s.selectors.reference_date.as_str()).await?;
        let reference_date_text = reference.inner_text().await?.unwrap_or_default();

        debug!(
            "Timecard view read: hours={:?} reference={:?}",
            hours_text, reference_date_text
        );
        Ok(PortalReading {
            hours_text,
            reference_date_text,
        })
    }
}

#[async_trait]
impl TimecardPortal for BrowserPortal {
    #[instrument(skip(self))]
    async fn read_timecard(&self) -> Result<PortalReading, TimecardError> {
        let config = self.browser_config()?;
        let (mut browser, mut handler) = Browser::launch(config).await?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = self.run_session(&browser).await;

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Failed to reap browser process: {}", e);
        }
        handle.abort();

        result
    }
}

/// Polls for `selector` until it appears or `limit` elapses.
async fn wait_for_element(
    page: &Page,
    element: &'static str,
    selector: &str,
    limit: Duration,
) -> Result<Element, TimecardError> {
    let started = Instant::now();
    let found = timeout(limit, async {
        loop {
            match page.find_element(selector).await {
                Ok(el) => return el,
                Err(_) => sleep(POLL_INTERVAL).await,
            }
        }
    })
    .await;

    match found {
        Ok(el) => {
            debug!("Found {} after {:?}", element, started.elapsed());
            Ok(el)
        }
        Err(_) => Err(TimecardError::ElementTimeout {
            element,
            selector: selector.to_string(),
            timeout: limit,
        }),
    }
}
