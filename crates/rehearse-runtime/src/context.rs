//! Shared handles for one evaluation run.
//!
//! [`EvalContext`] is built once at startup and shared by `Arc`. Provider
//! clients per model tier and the knowledge index are created on first use.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{ModelTier, RuntimeConfig};
use crate::orchestrator::RuntimeError;
use crate::providers::{LlmProvider, ProviderRegistry};
use crate::responder::{LlmResponder, Responder, ResponderFactory};
use crate::scheduler::{ConversationEvaluator, ParallelScheduler};
use crate::tools::{KnowledgeIndex, KnowledgeTool, ToolSet};

/// Configuration, provider clients and the knowledge index of a run.
pub struct EvalContext {
    config: RuntimeConfig,
    registry: ProviderRegistry,
    providers: RwLock<BTreeMap<ModelTier, Arc<dyn LlmProvider>>>,
    knowledge: Arc<KnowledgeIndex>,
}

impl EvalContext {
    /// Context over every provider compiled into this build.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::with_registry(config, ProviderRegistry::with_defaults())
    }

    /// Context over a custom registry. The provider settings are validated
    /// here so a missing key fails before any conversation starts.
    pub fn with_registry(
        config: RuntimeConfig,
        registry: ProviderRegistry,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let kind = config.provider.kind.as_str();
        if !registry.has_provider(kind) {
            return Err(RuntimeError::NotConfigured(format!(
                "unknown provider type '{}' (available: {:?})",
                kind,
                registry.available_types()
            )));
        }
        registry.validate(kind, &config.provider.factory_options())?;

        let knowledge = Arc::new(KnowledgeIndex::new(config.knowledge_dir.clone()));
        tracing::debug!(
            provider = kind,
            knowledge_dir = %config.knowledge_dir.display(),
            "Evaluation context ready"
        );

        Ok(Self {
            config,
            registry,
            providers: RwLock::new(BTreeMap::new()),
            knowledge,
        })
    }

    /// Use `provider` for `tier` instead of creating one from the registry.
    pub fn with_provider(self, tier: ModelTier, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.write().insert(tier, provider);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeIndex> {
        &self.knowledge
    }

    /// Provider client for a tier, created on first use.
    pub fn provider(&self, tier: ModelTier) -> Result<Arc<dyn LlmProvider>, RuntimeError> {
        if let Some(provider) = self.providers.read().get(&tier) {
            return Ok(Arc::clone(provider));
        }

        let mut providers = self.providers.write();
        if let Some(provider) = providers.get(&tier) {
            return Ok(Arc::clone(provider));
        }

        let provider = self.registry.create(
            &self.config.provider.kind,
            &self.config.provider.factory_options(),
        )?;
        tracing::debug!(
            tier = %tier,
            provider = provider.name(),
            model = self.config.models.model_id(tier),
            "Created provider client"
        );
        providers.insert(tier, Arc::clone(&provider));
        Ok(provider)
    }

    fn responder(&self, tier: ModelTier) -> Result<Arc<dyn Responder>, RuntimeError> {
        let responder = LlmResponder::new(self.provider(tier)?, self.config.completion_config(tier))
            .with_max_tool_rounds(self.config.max_tool_rounds);
        Ok(Arc::new(responder))
    }

    /// Evaluator wired from this context.
    pub fn evaluator(&self) -> Result<ConversationEvaluator, RuntimeError> {
        ConversationEvaluator::from_factory(self, &self.config)
    }

    pub fn scheduler(&self) -> ParallelScheduler {
        ParallelScheduler::from_config(&self.config)
    }
}

impl ResponderFactory for EvalContext {
    fn support(&self) -> Result<Arc<dyn Responder>, RuntimeError> {
        self.responder(ModelTier::Primary)
    }

    fn counterpart(&self) -> Result<Arc<dyn Responder>, RuntimeError> {
        self.responder(ModelTier::Primary)
    }

    fn judge(&self) -> Result<Arc<dyn Responder>, RuntimeError> {
        self.responder(ModelTier::Light)
    }

    fn support_tools(&self) -> ToolSet {
        ToolSet::empty().with(Arc::new(KnowledgeTool::new(Arc::clone(&self.knowledge))))
    }
}
