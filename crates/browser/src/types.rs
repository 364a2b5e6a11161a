//! Pool configuration and page data structures.

use serde::{Deserialize, Serialize};

/// Viewport used for every navigation. The exact size barely matters to a
/// remote-controlled page, it only has to be large enough for desktop layouts.
pub const VIEWPORT_WIDTH: u32 = 2560;
pub const VIEWPORT_HEIGHT: u32 = 1440;

/// User agent presented by navigations.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                                      (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Placeholder printed for an empty element list.
pub const NO_ELEMENTS: &str = "(nothing)";

/// Browser pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of concurrently running instances.
    pub max_instances: usize,
    /// Port handed to the instance in slot 0; slot `n` gets `base + n`.
    /// Zero means the pool is not configured.
    pub base_port_number: u16,
    /// Instances unused for longer than this are torn down. Zero disables eviction.
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_instances: 5,
            base_port_number: 0,
            idle_timeout_secs: 30 * 60,
        }
    }
}

/// One DOM element as seen by the renderer's linear element navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag_name: String,
    pub id: String,
    pub name: String,
    pub value: String,
    pub inner_html: String,
}

impl ElementInfo {
    pub fn new(tag_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Title and location of the current page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub title: String,
    pub url: String,
}

impl std::fmt::Display for PageInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.title, self.url)
    }
}

/// Control keystrokes that can be sent to the focused element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    Enter,
    Backspace,
}

/// Render an element list, one `tag[id]-"name"-"value"-innerHTML##` line per element.
pub fn format_elements(elements: &[ElementInfo]) -> String {
    if elements.is_empty() {
        return NO_ELEMENTS.to_string();
    }
    elements
        .iter()
        .map(|e| {
            format!(
                "{}[{}]-\"{}\"-\"{}\"-{}##",
                e.tag_name, e.id, e.name, e.value, e.inner_html
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
