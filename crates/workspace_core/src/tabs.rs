//! Identity-keyed artifact tabs with a single active selection.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use workspace_logging::ws_debug;

use crate::{JobId, TabId, WorkspaceId};

const COMPLETION_STATUSES: &[&str] = &["completed", "complete", "done", "finished", "success"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabKind {
    File,
    Agent,
    Search,
    Image,
    Browser,
    Sources,
    Document,
}

impl TabKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TabKind::File => "file",
            TabKind::Agent => "agent",
            TabKind::Search => "search",
            TabKind::Image => "image",
            TabKind::Browser => "browser",
            TabKind::Sources => "sources",
            TabKind::Document => "document",
        }
    }

    /// Durable artifacts are never auto-closed.
    pub fn is_durable(self) -> bool {
        matches!(self, TabKind::File | TabKind::Image | TabKind::Sources)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tab {
    /// Derived identity key; unique within the set.
    pub id: TabId,
    pub kind: TabKind,
    pub title: String,
    pub data: Map<String, Value>,
    pub workspace_id: WorkspaceId,
    pub job_id: Option<JobId>,
}

impl Tab {
    pub fn status(&self) -> Option<&str> {
        self.data.get("status").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabChange {
    Created,
    Updated,
}

/// Which activity tabs close themselves after reporting completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabPolicy {
    pub auto_close_delay_ms: u64,
    /// Case-insensitive substrings of transient agent names.
    pub transient_agent_patterns: Vec<String>,
}

impl Default for TabPolicy {
    fn default() -> Self {
        Self {
            auto_close_delay_ms: 4_000,
            transient_agent_patterns: ["swarm", "worker", "subagent", "scout", "crawler"]
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
        }
    }
}

impl TabPolicy {
    pub fn is_transient_agent(&self, agent: &str) -> bool {
        let agent = agent.to_ascii_lowercase();
        self.transient_agent_patterns
            .iter()
            .any(|pattern| agent.contains(&pattern.to_ascii_lowercase()))
    }

    pub fn should_auto_close(&self, tab: &Tab) -> bool {
        if tab.kind != TabKind::Agent {
            return false;
        }
        let agent = tab
            .data
            .get("agent")
            .and_then(Value::as_str)
            .unwrap_or_default();
        tab.status().is_some_and(is_completion_status) && self.is_transient_agent(agent)
    }
}

pub fn is_completion_status(status: &str) -> bool {
    let status = status.trim().to_ascii_lowercase();
    COMPLETION_STATUSES.contains(&status.as_str())
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabSet {
    tabs: Vec<Tab>,
    active: Option<TabId>,
    panel_open: bool,
}

impl TabSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn get(&self, tab_id: &str) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == tab_id)
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel_open
    }

    /// Creates the tab for `identity`, or shallow-merges `data` into the
    /// existing one (new fields win).
    #[allow(clippy::too_many_arguments)]
    pub fn open_or_update(
        &mut self,
        kind: TabKind,
        identity: TabId,
        title: &str,
        data: Value,
        workspace_id: &str,
        job_id: Option<&str>,
        activate: bool,
    ) -> TabChange {
        let incoming = into_object(data);
        if let Some(tab) = self.tabs.iter_mut().find(|tab| tab.id == identity) {
            for (key, value) in incoming {
                tab.data.insert(key, value);
            }
            if !title.is_empty() {
                tab.title = title.to_string();
            }
            if job_id.is_some() {
                tab.job_id = job_id.map(ToOwned::to_owned);
            }
            if activate {
                self.active = Some(identity);
                self.panel_open = true;
            }
            return TabChange::Updated;
        }

        ws_debug!("open tab {} ({})", identity, kind.as_str());
        if self.tabs.is_empty() {
            self.panel_open = true;
        }
        self.tabs.push(Tab {
            id: identity.clone(),
            kind,
            title: title.to_string(),
            data: incoming,
            workspace_id: workspace_id.to_string(),
            job_id: job_id.map(ToOwned::to_owned),
        });
        self.active = Some(identity);
        TabChange::Created
    }

    pub fn select(&mut self, tab_id: &str) -> bool {
        if self.get(tab_id).is_none() {
            return false;
        }
        self.active = Some(tab_id.to_string());
        self.panel_open = true;
        true
    }

    /// Removes the tab and re-resolves the active pointer.
    pub fn close(&mut self, tab_id: &str) -> bool {
        let before = self.tabs.len();
        self.tabs.retain(|tab| tab.id != tab_id);
        if self.tabs.len() == before {
            return false;
        }
        if self.active.as_deref() == Some(tab_id) {
            self.active = self.tabs.last().map(|tab| tab.id.clone());
        }
        if self.tabs.is_empty() {
            self.active = None;
            self.panel_open = false;
        }
        true
    }

    /// Timer callback for a scheduled auto-close. The tab may already be
    /// gone or may have been reopened by a newer, unfinished event.
    pub fn auto_close(&mut self, tab_id: &str, policy: &TabPolicy) -> bool {
        match self.get(tab_id) {
            Some(tab) if policy.should_auto_close(tab) => self.close(tab_id),
            Some(_) => {
                ws_debug!("auto-close skipped for {}: no longer completed", tab_id);
                false
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.tabs.clear();
        self.active = None;
        self.panel_open = false;
    }
}

fn into_object(data: Value) -> Map<String, Value> {
    match data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

pub fn file_identity(path: &str) -> TabId {
    format!("file:{}", normalize_workspace_path(path))
}

pub fn image_identity(path: &str) -> TabId {
    format!("image:{}", normalize_workspace_path(path))
}

pub fn agent_identity(agent: &str, job_id: &str) -> TabId {
    format!("agent:{}:{}", agent.trim().to_ascii_lowercase(), job_id)
}

pub fn browser_identity(raw_url: &str) -> TabId {
    format!("browser:{}", normalize_url(raw_url))
}

pub fn sources_identity(workspace_id: &str) -> TabId {
    format!("sources:{workspace_id}")
}

/// Structural identity: hash of the canonical JSON of `data`.
pub fn data_identity(kind: TabKind, data: &Value) -> TabId {
    // serde_json maps are key-ordered, so equal payloads serialize equally.
    let canonical = data.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("{}:{}", kind.as_str(), &hex[..16])
}

/// Workspace-relative path with `/` separators and no `.`/`..` segments.
pub fn normalize_workspace_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => trimmed.trim_end_matches('/').to_ascii_lowercase(),
    }
}

/// "writer" -> "Writer Agent", "research_swarm" -> "Research Swarm Agent".
pub fn agent_title(agent: &str) -> String {
    let words: Vec<String> = agent
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    let base = words.join(" ");
    if base.to_ascii_lowercase().ends_with("agent") {
        base
    } else {
        format!("{base} Agent")
    }
}
