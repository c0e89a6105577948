use std::collections::BTreeMap;
use std::sync::Arc;

use crate::scheduler::DEFAULT_MAX_TIMER_REFIRES;
use crate::shim::HostShim;

/// Default import namespace.
pub const DEFAULT_NAMESPACE: &str = "gojs";

/// How a module bridge is built.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Process arguments passed to the guest's `run`.
    pub argv: Vec<String>,
    /// Environment variables, encoded sorted by key.
    pub env: BTreeMap<String, String>,
    /// Import namespace the guest links against.
    pub namespace: String,
    /// Extra namespaces that expose the same imports, for guests built by
    /// older toolchains.
    pub alias_namespaces: Vec<String>,
    /// Upper bound on linear memory, in 64 KiB pages.
    pub max_memory_pages: Option<u32>,
    /// Extra resumes a fired timer may trigger before it is dropped.
    pub max_timer_refires: u32,
    /// OS shim instance; a fresh one is created when absent.
    pub shim: Option<Arc<HostShim>>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            argv: vec!["js".to_owned()],
            env: BTreeMap::new(),
            namespace: DEFAULT_NAMESPACE.to_owned(),
            alias_namespaces: vec!["go".to_owned()],
            max_memory_pages: None,
            max_timer_refires: DEFAULT_MAX_TIMER_REFIRES,
            shim: None,
        }
    }
}

impl BridgeOptions {
    /// Every namespace the imports are registered under.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> + Clone {
        std::iter::once(self.namespace.as_str()).chain(self.alias_namespaces.iter().map(String::as_str))
    }
}
