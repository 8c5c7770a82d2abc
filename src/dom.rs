use anyhow::{Result, anyhow};
use async_trait::async_trait;
use headless_chrome::Tab;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// The page operations the sequencer needs from a live document.
#[async_trait]
pub trait Dom: Send + Sync {
    type Element: Clone + Send + Sync + fmt::Debug;

    /// First element in the document matching `selector`.
    async fn query(&self, selector: &str) -> Result<Option<Self::Element>>;

    /// First descendant of `parent` matching `selector`.
    async fn query_within(
        &self,
        parent: &Self::Element,
        selector: &str,
    ) -> Result<Option<Self::Element>>;

    /// Direct element children of `parent`, in document order.
    async fn children(&self, parent: &Self::Element) -> Result<Vec<Self::Element>>;

    async fn click(&self, element: &Self::Element) -> Result<()>;

    /// Replace an input's value with `value`.
    async fn set_value(&self, element: &Self::Element, value: &str) -> Result<()>;

    async fn text_content(&self, element: &Self::Element) -> Result<String>;
}

/// Query `selector` every `interval` until it resolves or `timeout` passes.
/// Returns `Ok(None)` on timeout.
pub async fn wait_for_element<D: Dom + ?Sized>(
    dom: &D,
    selector: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<Option<D::Element>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(element) = dom.query(selector).await? {
            return Ok(Some(element));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        tracing::debug!(selector, "Element not present yet");
        sleep(interval.min(deadline - now)).await;
    }
}

/// Attribute stamped onto every element handed out by [`ChromeDom`].
const NODE_ATTR: &str = "data-compose-pilot";

/// Tags an element with a page-unique id (creating one on first sight) and
/// returns the id, or `null` for a missing element.
const TAG_FN_JS: &str = r#"
  const tag = (el) => {
    if (!el) return null;
    if (!el.hasAttribute('data-compose-pilot')) {
      window.__composePilotSeq = (window.__composePilotSeq || 0) + 1;
      el.setAttribute('data-compose-pilot', String(window.__composePilotSeq));
    }
    return el.getAttribute('data-compose-pilot');
  };
"#;

/// Handle to a tagged element on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromeNode {
    id: String,
}

impl ChromeNode {
    pub fn selector(&self) -> String {
        format!(r#"[{NODE_ATTR}="{}"]"#, self.id)
    }
}

/// JSON string literal, which is also a valid JS string literal.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn root_expr(parent: Option<&ChromeNode>) -> String {
    match parent {
        Some(node) => format!("document.querySelector({})", js_string(&node.selector())),
        None => "document".to_string(),
    }
}

/// [`Dom`] over a Chrome tab. Every call runs on the blocking pool.
#[derive(Clone)]
pub struct ChromeDom {
    tab: Arc<Tab>,
}

impl ChromeDom {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| anyhow!("browser call panicked: {}", e))?
    }

    async fn eval(&self, script: String) -> Result<Option<serde_json::Value>> {
        self.blocking(move |tab| {
            let result = tab.evaluate(&script, false)?;
            Ok(result.value.filter(|v| !v.is_null()))
        })
        .await
    }

    async fn tagged_query(
        &self,
        parent: Option<&ChromeNode>,
        selector: &str,
    ) -> Result<Option<ChromeNode>> {
        let tag_fn = TAG_FN_JS;
        let root = root_expr(parent);
        let sel = js_string(selector);
        let script = format!(
            "(() => {{ {tag_fn} const root = {root}; if (!root) return null; return tag(root.querySelector({sel})); }})()"
        );
        let value = self.eval(script).await?;
        Ok(value
            .and_then(|v| v.as_str().map(String::from))
            .map(|id| ChromeNode { id }))
    }
}

#[async_trait]
impl Dom for ChromeDom {
    type Element = ChromeNode;

    async fn query(&self, selector: &str) -> Result<Option<ChromeNode>> {
        self.tagged_query(None, selector).await
    }

    async fn query_within(&self, parent: &ChromeNode, selector: &str) -> Result<Option<ChromeNode>> {
        self.tagged_query(Some(parent), selector).await
    }

    async fn children(&self, parent: &ChromeNode) -> Result<Vec<ChromeNode>> {
        let tag_fn = TAG_FN_JS;
        let root = root_expr(Some(parent));
        let script = format!(
            "(() => {{ {tag_fn} const root = {root}; if (!root) return '[]'; return JSON.stringify(Array.from(root.children).map(tag)); }})()"
        );
        let raw = self
            .eval(script)
            .await?
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "[]".to_string());
        let ids: Vec<String> = serde_json::from_str(&raw)?;
        Ok(ids.into_iter().map(|id| ChromeNode { id }).collect())
    }

    async fn click(&self, element: &ChromeNode) -> Result<()> {
        let selector = element.selector();
        self.blocking(move |tab| {
            let el = tab.find_element(&selector)?;
            el.click()?;
            Ok(())
        })
        .await
    }

    async fn set_value(&self, element: &ChromeNode, value: &str) -> Result<()> {
        let selector = element.selector();
        let value = value.to_string();
        self.blocking(move |tab| {
            let el = tab.find_element(&selector)?;
            el.click()?;
            tab.evaluate(
                &format!("document.querySelector({}).value = ''", js_string(&selector)),
                false,
            )?;
            tab.type_str(&value)?;
            Ok(())
        })
        .await
    }

    async fn text_content(&self, element: &ChromeNode) -> Result<String> {
        let sel = js_string(&element.selector());
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); return el ? (el.textContent || '') : null; }})()"
        );
        self.eval(script)
            .await?
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| anyhow!("element {} is no longer attached", element.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_selector_targets_tag_attribute() {
        let node = ChromeNode { id: "7".into() };
        assert_eq!(node.selector(), r#"[data-compose-pilot="7"]"#);
    }

    #[test]
    fn selectors_are_quoted_for_js() {
        assert_eq!(
            js_string(r#"button[aria-label="New Message"]"#),
            r#""button[aria-label=\"New Message\"]""#
        );
        assert_eq!(
            root_expr(Some(&ChromeNode { id: "3".into() })),
            r#"document.querySelector("[data-compose-pilot=\"3\"]")"#
        );
    }
}
