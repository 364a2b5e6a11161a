//! In-process launcher whose renderers simulate a page. No real browser is
//! started, for tests and dry runs only.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;

use crate::{
    error::BrowserError,
    pool::{Launcher, Renderer},
    types::{ControlKey, ElementInfo, PageInfo},
};

const BLANK_PAGE: &str = "about:blank";

/// Launcher producing [`MemoryRenderer`]s.
pub struct MemoryLauncher {
    title: String,
    elements: Vec<ElementInfo>,
    fail_launch: AtomicBool,
    fail_probe: AtomicBool,
    launched: Mutex<Vec<(u16, Arc<MemoryRenderer>)>>,
}

impl MemoryLauncher {
    pub fn new() -> Self {
        Self::with_page("Example Domain", Vec::new())
    }

    /// Every page loaded by renderers from this launcher gets `title` and `elements`.
    pub fn with_page(title: impl Into<String>, elements: Vec<ElementInfo>) -> Self {
        Self {
            title: title.into(),
            elements,
            fail_launch: AtomicBool::new(false),
            fail_probe: AtomicBool::new(false),
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_probe(&self, fail: bool) {
        self.fail_probe.store(fail, Ordering::SeqCst);
    }

    /// Ports of every launched renderer, in launch order.
    pub fn ports(&self) -> Vec<u16> {
        let launched = self.launched.lock().unwrap_or_else(|e| e.into_inner());
        launched.iter().map(|(port, _)| *port).collect()
    }

    /// Every launched renderer, in launch order.
    pub fn renderers(&self) -> Vec<Arc<MemoryRenderer>> {
        let launched = self.launched.lock().unwrap_or_else(|e| e.into_inner());
        launched.iter().map(|(_, r)| Arc::clone(r)).collect()
    }
}

impl Default for MemoryLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Launcher for MemoryLauncher {
    async fn launch(&self, port: u16) -> Result<Arc<dyn Renderer>, BrowserError> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(BrowserError::LaunchFailed(format!(
                "worker on port {port} did not come up"
            )));
        }
        let renderer = Arc::new(MemoryRenderer::new(&self.title, self.elements.clone()));
        let mut launched = self.launched.lock().unwrap_or_else(|e| e.into_inner());
        launched.push((port, Arc::clone(&renderer)));
        Ok(renderer)
    }

    async fn probe(&self) -> Result<(), BrowserError> {
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(BrowserError::Unavailable("worker executable not found".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct PageState {
    history: Vec<String>,
    position: usize,
    elements: Vec<ElementInfo>,
    cursor: Option<usize>,
    pointer_events: Vec<(String, String)>,
    keys: Vec<ControlKey>,
}

/// Simulated page: navigation history, linear element cursor, typed input.
pub struct MemoryRenderer {
    title: String,
    initial_elements: Vec<ElementInfo>,
    state: Mutex<PageState>,
    killed: AtomicBool,
    fail_page_info: AtomicBool,
    renders: AtomicUsize,
}

impl MemoryRenderer {
    fn new(title: &str, elements: Vec<ElementInfo>) -> Self {
        Self {
            title: title.to_string(),
            initial_elements: elements.clone(),
            state: Mutex::new(PageState {
                history: vec![BLANK_PAGE.to_string()],
                elements,
                ..Default::default()
            }),
            killed: AtomicBool::new(false),
            fail_page_info: AtomicBool::new(false),
            renders: AtomicUsize::new(0),
        }
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn set_fail_page_info(&self, fail: bool) {
        self.fail_page_info.store(fail, Ordering::SeqCst);
    }

    pub fn current_url(&self) -> String {
        let state = self.lock();
        state.history[state.position].clone()
    }

    /// Elements with their current values.
    pub fn elements(&self) -> Vec<ElementInfo> {
        self.lock().elements.clone()
    }

    pub fn pointer_events(&self) -> Vec<(String, String)> {
        self.lock().pointer_events.clone()
    }

    pub fn keys(&self) -> Vec<ControlKey> {
        self.lock().keys.clone()
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_alive(&self) -> Result<(), BrowserError> {
        if self.is_killed() {
            return Err(BrowserError::BrowserClosed);
        }
        Ok(())
    }

    fn move_cursor(&self, steps: isize) -> Result<Vec<ElementInfo>, BrowserError> {
        self.ensure_alive()?;
        let mut state = self.lock();
        if state.elements.is_empty() {
            return Ok(Vec::new());
        }
        let last = state.elements.len() - 1;
        let start = state.cursor;
        let target = match start {
            None if steps < 0 => 0,
            None => (steps.unsigned_abs() - 1).min(last),
            Some(current) => current.saturating_add_signed(steps).min(last),
        };
        state.cursor = Some(target);
        let from = match start {
            Some(current) if steps > 0 => (current + 1).min(target),
            None if steps > 0 => 0,
            _ => target,
        };
        let (lo, hi) = (from.min(target), from.max(target));
        Ok(state.elements[lo..=hi].to_vec())
    }

    fn with_focused<F>(&self, f: F) -> Result<(), BrowserError>
    where
        F: FnOnce(&mut ElementInfo),
    {
        self.ensure_alive()?;
        let mut state = self.lock();
        let cursor = state.cursor.ok_or(BrowserError::NoFocusedElement)?;
        let element = state
            .elements
            .get_mut(cursor)
            .ok_or(BrowserError::NoFocusedElement)?;
        f(element);
        Ok(())
    }
}

#[async_trait]
impl Renderer for MemoryRenderer {
    async fn go_back(&self) -> Result<(), BrowserError> {
        self.ensure_alive()?;
        let mut state = self.lock();
        state.position = state.position.saturating_sub(1);
        Ok(())
    }

    async fn go_forward(&self) -> Result<(), BrowserError> {
        self.ensure_alive()?;
        let mut state = self.lock();
        if state.position + 1 < state.history.len() {
            state.position += 1;
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), BrowserError> {
        self.ensure_alive()?;
        self.lock().cursor = None;
        Ok(())
    }

    async fn goto(
        &self,
        _user_agent: &str,
        url: &str,
        _width: u32,
        _height: u32,
    ) -> Result<(), BrowserError> {
        self.ensure_alive()?;
        if url.is_empty() {
            return Err(BrowserError::NavigationFailed("empty url".into()));
        }
        let mut state = self.lock();
        let keep = state.position + 1;
        state.history.truncate(keep);
        state.history.push(url.to_string());
        state.position = keep;
        state.elements = self.initial_elements.clone();
        state.cursor = None;
        Ok(())
    }

    async fn previous_element(&self) -> Result<Vec<ElementInfo>, BrowserError> {
        self.move_cursor(-1)
    }

    async fn next_element(&self) -> Result<Vec<ElementInfo>, BrowserError> {
        self.move_cursor(1)
    }

    async fn next_n_elements(&self, n: usize) -> Result<Vec<ElementInfo>, BrowserError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.move_cursor(isize::try_from(n).unwrap_or(isize::MAX))
    }

    async fn reset_navigation(&self) -> Result<(), BrowserError> {
        self.ensure_alive()?;
        self.lock().cursor = None;
        Ok(())
    }

    async fn pointer(&self, action_type: &str, button: &str) -> Result<(), BrowserError> {
        self.with_focused(|_| {})?;
        self.lock()
            .pointer_events
            .push((action_type.to_string(), button.to_string()));
        Ok(())
    }

    async fn set_value(&self, value: &str) -> Result<(), BrowserError> {
        self.with_focused(|element| element.value = value.to_string())
    }

    async fn send_key(&self, text: &str, key: Option<ControlKey>) -> Result<(), BrowserError> {
        self.with_focused(|element| match key {
            Some(ControlKey::Backspace) => {
                element.value.pop();
            },
            Some(ControlKey::Enter) => {},
            None => element.value.push_str(text),
        })?;
        if let Some(key) = key {
            self.lock().keys.push(key);
        }
        Ok(())
    }

    async fn render_page(&self) -> Result<(), BrowserError> {
        self.ensure_alive()?;
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn page_info(&self) -> Result<PageInfo, BrowserError> {
        self.ensure_alive()?;
        if self.fail_page_info.load(Ordering::SeqCst) {
            return Err(BrowserError::Unavailable("page info timed out".into()));
        }
        let url = self.current_url();
        let title = if url == BLANK_PAGE {
            String::new()
        } else {
            self.title.clone()
        };
        Ok(PageInfo { title, url })
    }

    async fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn elements() -> Vec<ElementInfo> {
        vec![
            ElementInfo::new("input", "q"),
            ElementInfo::new("button", "go"),
            ElementInfo::new("a", "about"),
        ]
    }

    async fn renderer() -> Arc<MemoryRenderer> {
        let launcher = MemoryLauncher::with_page("Search", elements());
        launcher.launch(9000).await.unwrap();
        launcher.renderers().remove(0)
    }

    #[tokio::test]
    async fn history_navigation() {
        let r = renderer().await;
        r.goto("ua", "http://a.test", 1, 1).await.unwrap();
        r.goto("ua", "http://b.test", 1, 1).await.unwrap();
        r.go_back().await.unwrap();
        assert_eq!(r.page_info().await.unwrap().url, "http://a.test");
        r.go_forward().await.unwrap();
        assert_eq!(r.page_info().await.unwrap().url, "http://b.test");
    }

    #[tokio::test]
    async fn blank_page_has_no_title() {
        let r = renderer().await;
        let info = r.page_info().await.unwrap();
        assert_eq!(info.title, "");
        assert_eq!(info.url, "about:blank");
    }

    #[tokio::test]
    async fn element_cursor_moves_linearly() {
        let r = renderer().await;
        assert_eq!(r.next_element().await.unwrap()[0].id, "q");
        assert_eq!(r.next_element().await.unwrap()[0].id, "go");
        assert_eq!(r.previous_element().await.unwrap()[0].id, "q");

        let skipped = r.next_n_elements(2).await.unwrap();
        assert_eq!(skipped.len(), 2);
        let ids: Vec<_> = skipped.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["go", "about"]);

        r.reset_navigation().await.unwrap();
        assert_eq!(r.next_element().await.unwrap()[0].id, "q");
    }

    #[tokio::test]
    async fn typing_requires_focus() {
        let r = renderer().await;
        assert!(matches!(
            r.set_value("x").await,
            Err(BrowserError::NoFocusedElement)
        ));
        r.next_element().await.unwrap();
        r.send_key("rust", None).await.unwrap();
        r.send_key("", Some(ControlKey::Backspace)).await.unwrap();
        assert_eq!(r.elements()[0].value, "rus");
        assert_eq!(r.keys(), vec![ControlKey::Backspace]);
        assert!(r.next_n_elements(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn killed_renderer_rejects_commands() {
        let r = renderer().await;
        r.kill().await;
        assert!(matches!(r.reload().await, Err(BrowserError::BrowserClosed)));
    }
}
