use anyhow::{Result, anyhow};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;

use crate::config::BrowserConfig;

/// Browser the sequence runs in: either the operator's already running
/// Chrome (attached over DevTools) or one launched on a persistent profile.
pub struct BrowserSession {
    _browser: Browser,
    pub tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        tracing::info!(url = %config.debug_url, "Attempting to attach to running Chrome");
        match Browser::connect(config.debug_url.clone()) {
            Ok(browser) => {
                tracing::info!("Attached to running Chrome");
                let existing = {
                    let tabs = browser
                        .get_tabs()
                        .lock()
                        .map_err(|_| anyhow!("browser tab list is poisoned"))?;
                    tabs.first().cloned()
                };
                let tab = match existing {
                    Some(tab) => {
                        tracing::debug!("Using existing tab");
                        tab
                    }
                    None => {
                        tracing::debug!("No tabs open, creating one");
                        browser.new_tab()?
                    }
                };
                return Ok(Self {
                    _browser: browser,
                    tab,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not attach, launching Chrome instead");
            }
        }

        let profile = config.profile_dir();
        std::fs::create_dir_all(&profile)?;
        tracing::info!(profile = ?profile, headless = config.headless, "Launching Chrome");

        let options = LaunchOptions {
            headless: config.headless,
            path: config.chrome_path.clone(),
            user_data_dir: Some(profile),
            args: vec![
                std::ffi::OsStr::new("--no-first-run"),
                std::ffi::OsStr::new("--no-default-browser-check"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        let browser =
            Browser::new(options).map_err(|e| anyhow!("Browser launch failed: {}", e))?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        tracing::info!("Chrome ready");

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Load `url` and wait for its body before handing the tab over.
    pub fn open(&self, url: &str) -> Result<()> {
        tracing::info!(url, "Navigating");
        self.tab.navigate_to(url)?;
        self.tab.wait_until_navigated()?;
        self.tab.wait_for_element("body")?;
        Ok(())
    }
}
