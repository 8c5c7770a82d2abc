//! In-memory stand-in for the composer page.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use compose_pilot::{Dom, Selectors};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click(String),
    SetValue(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeNode {
    Static(String),
    Row(usize),
    RowName(usize),
}

struct Page {
    present: HashSet<String>,
    rows: Vec<String>,
    rows_from: Option<Instant>,
    failing: HashSet<String>,
    detached_reads: usize,
    bare_rows: bool,
    log: Vec<(Instant, Action)>,
}

/// A page holding every composer control, plus a type-ahead list with the
/// given rows.
pub struct FakeDom {
    selectors: Selectors,
    page: Mutex<Page>,
}

impl FakeDom {
    pub fn new(rows: &[&str]) -> Self {
        let selectors = Selectors::default();
        let present = [
            &selectors.unread_messages,
            &selectors.new_message,
            &selectors.subject,
            &selectors.body,
            &selectors.recipient,
            &selectors.submit,
        ]
        .into_iter()
        .cloned()
        .collect();
        Self {
            selectors,
            page: Mutex::new(Page {
                present,
                rows: rows.iter().map(|r| r.to_string()).collect(),
                rows_from: None,
                failing: HashSet::new(),
                detached_reads: 0,
                bare_rows: false,
                log: Vec::new(),
            }),
        }
    }

    /// Remove a control from the page.
    pub fn without(self, selector: &str) -> Self {
        self.page.lock().unwrap().present.remove(selector);
        self
    }

    /// Make every query for `selector` fail with a driver error.
    pub fn failing_on(self, selector: &str) -> Self {
        self.page.lock().unwrap().failing.insert(selector.to_string());
        self
    }

    /// Render the type-ahead rows only once `delay` has passed from now.
    pub fn rows_after(self, delay: Duration) -> Self {
        self.page.lock().unwrap().rows_from = Some(Instant::now() + delay);
        self
    }

    /// Fail the next `count` text reads as if the node had been re-rendered.
    pub fn detached_text_reads(self, count: usize) -> Self {
        self.page.lock().unwrap().detached_reads = count;
        self
    }

    /// Rows carry no name element; their own text is just the name.
    pub fn bare_rows(self) -> Self {
        self.page.lock().unwrap().bare_rows = true;
        self
    }

    pub fn actions(&self) -> Vec<Action> {
        self.page.lock().unwrap().log.iter().map(|(_, a)| a.clone()).collect()
    }

    pub fn timed_actions(&self) -> Vec<(Instant, Action)> {
        self.page.lock().unwrap().log.clone()
    }

    fn rows_visible(page: &Page) -> bool {
        !page.rows.is_empty() && page.rows_from.is_none_or(|at| Instant::now() >= at)
    }

    fn label(page: &Page, node: &FakeNode) -> String {
        match node {
            FakeNode::Static(sel) => sel.clone(),
            FakeNode::Row(i) | FakeNode::RowName(i) => format!("row:{}", page.rows[*i]),
        }
    }
}

#[async_trait]
impl Dom for FakeDom {
    type Element = FakeNode;

    async fn query(&self, selector: &str) -> Result<Option<FakeNode>> {
        let page = self.page.lock().unwrap();
        if page.failing.contains(selector) {
            return Err(anyhow!("injected fault on `{selector}`"));
        }
        if selector == self.selectors.results {
            return Ok(Self::rows_visible(&page).then(|| FakeNode::Static(selector.to_string())));
        }
        Ok(page
            .present
            .contains(selector)
            .then(|| FakeNode::Static(selector.to_string())))
    }

    async fn query_within(&self, parent: &FakeNode, selector: &str) -> Result<Option<FakeNode>> {
        let bare = self.page.lock().unwrap().bare_rows;
        match parent {
            FakeNode::Row(i) if selector == self.selectors.candidate_name && !bare => {
                Ok(Some(FakeNode::RowName(*i)))
            }
            _ => Ok(None),
        }
    }

    async fn children(&self, parent: &FakeNode) -> Result<Vec<FakeNode>> {
        let page = self.page.lock().unwrap();
        match parent {
            FakeNode::Static(sel) if *sel == self.selectors.results && Self::rows_visible(&page) => {
                Ok((0..page.rows.len()).map(FakeNode::Row).collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn click(&self, element: &FakeNode) -> Result<()> {
        let mut page = self.page.lock().unwrap();
        let label = Self::label(&page, element);
        page.log.push((Instant::now(), Action::Click(label)));
        Ok(())
    }

    async fn set_value(&self, element: &FakeNode, value: &str) -> Result<()> {
        let mut page = self.page.lock().unwrap();
        let label = Self::label(&page, element);
        page.log
            .push((Instant::now(), Action::SetValue(label, value.to_string())));
        Ok(())
    }

    async fn text_content(&self, element: &FakeNode) -> Result<String> {
        let mut page = self.page.lock().unwrap();
        if page.detached_reads > 0 {
            page.detached_reads -= 1;
            return Err(anyhow!("element 7 is no longer attached"));
        }
        match element {
            // Row text carries the surrounding markup's whitespace.
            FakeNode::RowName(i) => Ok(format!("\n  {}  ", page.rows[*i])),
            FakeNode::Row(i) if page.bare_rows => Ok(format!(" {} ", page.rows[*i])),
            FakeNode::Row(i) => Ok(format!("{} (student)", page.rows[*i])),
            FakeNode::Static(_) => Ok(String::new()),
        }
    }
}
