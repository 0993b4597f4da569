//! Engine options: which extension points to plug in, plus a `Config`.

use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::extension::{
    AssociativeFold, AssociativeMergeOperator, BytewiseComparator, Comparator, FilterPolicy, MergeOperator,
    SliceTransform,
};

/// Extension points and limits the engine is opened with
#[derive(Clone)]
pub struct Options {
    comparator: Arc<dyn Comparator>,
    merge_operator: Option<Arc<dyn MergeOperator>>,
    filter_policy: Option<Arc<dyn FilterPolicy>>,
    prefix_extractor: Option<Arc<dyn SliceTransform>>,
    config: Config,
}

impl Options {
    /// Bytewise ordering, no merge operator, no filters, default config
    pub fn new() -> Self {
        Self {
            comparator: Arc::new(BytewiseComparator),
            merge_operator: None,
            filter_policy: None,
            prefix_extractor: None,
            config: Config::default(),
        }
    }

    pub fn with_comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_merge_operator(mut self, operator: Arc<dyn MergeOperator>) -> Self {
        self.merge_operator = Some(operator);
        self
    }

    /// Plug in a pairwise operator; the engine drives it as a left fold.
    pub fn with_associative_merge_operator(mut self, operator: Arc<dyn AssociativeMergeOperator>) -> Self {
        self.merge_operator = Some(Arc::new(AssociativeFold::new(operator)));
        self
    }

    pub fn with_filter_policy(mut self, policy: Arc<dyn FilterPolicy>) -> Self {
        self.filter_policy = Some(policy);
        self
    }

    pub fn with_prefix_extractor(mut self, extractor: Arc<dyn SliceTransform>) -> Self {
        self.prefix_extractor = Some(extractor);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.comparator
    }

    pub fn merge_operator(&self) -> Option<&Arc<dyn MergeOperator>> {
        self.merge_operator.as_ref()
    }

    pub fn filter_policy(&self) -> Option<&Arc<dyn FilterPolicy>> {
        self.filter_policy.as_ref()
    }

    pub fn prefix_extractor(&self) -> Option<&Arc<dyn SliceTransform>> {
        self.prefix_extractor.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Default for Options {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("comparator", &self.comparator.display_name())
            .field("merge_operator", &self.merge_operator.as_ref().map(|m| m.display_name()))
            .field("filter_policy", &self.filter_policy.as_ref().map(|p| p.display_name()))
            .field("prefix_extractor", &self.prefix_extractor.as_ref().map(|p| p.display_name()))
            .field("config", &self.config)
            .finish()
    }
}
