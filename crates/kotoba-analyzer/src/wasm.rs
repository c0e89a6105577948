//! Tokenizer backed by a guest module running on the host bridge.

use async_trait::async_trait;
use kotoba_bridge::{BridgeOptions, HostValue, ModuleBridge, TimerOutcome};
use tracing::{debug, info, warn};

use crate::error::{AnalyzerError, AnalyzerResult};
use crate::source::ModuleSource;
use crate::token::Token;
use crate::tokenizer::{Tokenizer, TokenizerLoader};

/// Name of the function the kagome guest publishes on its global object.
pub const DEFAULT_TOKENIZE_EXPORT: &str = "kagome_tokenize";

/// Calls the guest's tokenize function through a started bridge.
#[derive(Debug)]
pub struct WasmTokenizer {
    bridge: ModuleBridge,
    export: String,
}

impl WasmTokenizer {
    /// Wrap a bridge whose guest has already been started.
    #[must_use]
    pub fn new(bridge: ModuleBridge, export: impl Into<String>) -> Self {
        Self {
            bridge,
            export: export.into(),
        }
    }

    /// The underlying bridge.
    #[must_use]
    pub fn bridge(&self) -> &ModuleBridge {
        &self.bridge
    }

    fn service_timers(&mut self) -> AnalyzerResult<()> {
        for outcome in self.bridge.service_timers()? {
            if let TimerOutcome::Exhausted { id, refires } = outcome {
                warn!(timer_id = id, refires, "guest timer dropped between calls");
            }
        }
        Ok(())
    }
}

impl Tokenizer for WasmTokenizer {
    fn tokenize(&mut self, text: &str) -> AnalyzerResult<Vec<Token>> {
        self.service_timers()?;
        match self
            .bridge
            .call_global(&self.export, &[HostValue::string(text)])?
        {
            Ok(result) => Ok(Token::list_from_host(&result)),
            Err(thrown) => Err(AnalyzerError::AnalysisFailure(thrown.to_js_string())),
        }
    }
}

/// Loads the guest module from a [`ModuleSource`] and starts it.
#[derive(Debug, Clone)]
pub struct WasmLoader {
    source: ModuleSource,
    options: BridgeOptions,
    export: String,
}

impl WasmLoader {
    /// A loader for `source` with default bridge options.
    #[must_use]
    pub fn new(source: ModuleSource) -> Self {
        Self {
            source,
            options: BridgeOptions::default(),
            export: DEFAULT_TOKENIZE_EXPORT.to_owned(),
        }
    }

    /// Use these bridge options.
    #[must_use]
    pub fn with_options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Call this global function to tokenize.
    #[must_use]
    pub fn with_export(mut self, export: impl Into<String>) -> Self {
        self.export = export.into();
        self
    }
}

#[async_trait]
impl TokenizerLoader for WasmLoader {
    type Tokenizer = WasmTokenizer;

    async fn load(&self) -> AnalyzerResult<WasmTokenizer> {
        info!(source = %self.source, "loading tokenizer module");
        let wasm = self.source.fetch().await?;
        let load_failure = |e: kotoba_bridge::BridgeError| AnalyzerError::LoadFailure(e.to_string());

        let mut bridge = ModuleBridge::load(&wasm, self.options.clone()).map_err(load_failure)?;
        bridge.start().map_err(load_failure)?;
        bridge.service_timers().map_err(load_failure)?;

        if let Some(code) = bridge.exit_code() {
            return Err(AnalyzerError::LoadFailure(format!(
                "guest exited with code {code} during startup"
            )));
        }
        if matches!(bridge.global().get(&self.export), HostValue::Function(_)) {
            debug!(export = %self.export, "tokenizer function is available");
        } else {
            warn!(export = %self.export, "guest did not publish tokenizer function");
        }
        info!("tokenizer module loaded");
        Ok(WasmTokenizer::new(bridge, self.export.clone()))
    }
}
