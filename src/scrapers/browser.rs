use crate::config::LogConfig;
use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const CAPTURE_HANDLER: &str = "capture";

/// An open page that must be closed once a scrape is done with it
trait PageHandle {
    fn release(&self);
}

impl PageHandle for Tab {
    fn release(&self) {
        let _ = self.deregister_response_handling(CAPTURE_HANDLER);
        if let Err(e) = self.close(true) {
            warn!("Could not close tab: {}", e);
        }
    }
}

/// Run `steps` against `page`, releasing it if they fail
fn or_release<H: PageHandle, T>(page: &H, steps: impl FnOnce(&H) -> Result<T>) -> Result<T> {
    let result = steps(page);
    if result.is_err() {
        page.release();
    }
    result
}

/// Headless Chrome shared by the site scrapers.
///
/// The browser API is blocking, so every page interaction runs on the
/// blocking pool.
#[derive(Clone)]
pub struct BrowserSession {
    browser: Browser,
    log: LogConfig,
}

impl BrowserSession {
    /// Launch Chrome
    pub fn launch(headless: bool, log: LogConfig) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(headless)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self { browser, log })
    }

    /// Open `page`, click `trigger` once it appears, and return the body of
    /// the first network response whose URL contains `response_url`.
    pub async fn capture_response(
        &self,
        page: &str,
        trigger: &str,
        response_url: &str,
        wait: Duration,
    ) -> Result<String> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let browser = self.browser.clone();
        let page = page.to_string();
        let trigger = trigger.to_string();
        let needle = response_url.to_string();

        let tab = spawn_blocking(move || -> Result<_> {
            let tab = browser.new_tab()?;
            or_release(&*tab, |tab| {
                tab.register_response_handling(
                    CAPTURE_HANDLER,
                    Box::new(move |params, fetch_body| {
                        if !params.response.url.contains(&needle) {
                            return;
                        }
                        match fetch_body() {
                            Ok(body) => {
                                let _ = tx.send(body.body);
                            }
                            Err(e) => warn!("Could not read body of {}: {}", params.response.url, e),
                        }
                    }),
                )?;

                tab.navigate_to(&page)?;
                tab.wait_until_navigated()?;
                tab.wait_for_element(&trigger)
                    .with_context(|| format!("{} never appeared on {}", trigger, page))?
                    .click()?;
                Ok(())
            })?;
            Ok(tab)
        })
        .await
        .context("Browser task panicked")??;

        let received = timeout(wait, rx.recv()).await;

        spawn_blocking(move || tab.release())
            .await
            .context("Browser task panicked")?;

        let body = received
            .with_context(|| format!("No response from {} within {:?}", response_url, wait))?
            .context("Response handler dropped before a response arrived")?;

        if self.log.debug {
            debug!("Captured {} bytes from {}", body.len(), response_url);
        }
        Ok(body)
    }

    /// Open `page`, type `text` into `input`, click `submit`, wait for
    /// `result` to render, and return the page HTML.
    pub async fn search_and_read_html(
        &self,
        page: &str,
        input: &str,
        text: &str,
        submit: &str,
        result: &str,
        wait: Duration,
    ) -> Result<String> {
        let browser = self.browser.clone();
        let (page, input, text, submit, result) = (
            page.to_string(),
            input.to_string(),
            text.to_string(),
            submit.to_string(),
            result.to_string(),
        );

        let html = spawn_blocking(move || -> Result<String> {
            let tab = browser.new_tab()?;
            let html = or_release(&*tab, |tab| {
                tab.navigate_to(&page)?;
                tab.wait_until_navigated()?;

                tab.wait_for_element(&input)
                    .with_context(|| format!("{} never appeared on {}", input, page))?
                    .click()?;
                tab.type_str(&text)?;
                tab.wait_for_element(&submit)?.click()?;
                tab.wait_for_element_with_custom_timeout(&result, wait)
                    .with_context(|| format!("{} did not render within {:?}", result, wait))?;

                Ok(tab.get_content()?)
            })?;
            tab.release();
            Ok(html)
        })
        .await
        .context("Browser task panicked")??;

        if self.log.debug {
            debug!("Read {} bytes of HTML", html.len());
        }
        Ok(html)
    }
}
