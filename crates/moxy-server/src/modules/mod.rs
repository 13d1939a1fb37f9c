//! The module interface and the pipeline built from it.
//!
//! A module sees each request together with a write-once response sink
//! and an opaque `next` continuation. It may answer the request itself,
//! forward it down the chain, do both (the first sink write wins), or do
//! neither ("no reply"). Module instances are shared across every
//! connection task, so stateful modules synchronize internally.

use std::sync::Arc;

use async_trait::async_trait;
use bson::Document;

use moxy_wire::{Request, ResponseSink};

use crate::error::Result;

pub mod mockule;
pub mod registry;

pub use registry::{default_registry, ModuleRegistry};

/// A pluggable request handler.
#[async_trait]
pub trait Module: Send + Sync {
    /// Identifier used for registry lookup and configuration binding.
    fn name(&self) -> &'static str;

    /// Produce a fresh, unconfigured instance of this module.
    fn create(&self) -> Box<dyn Module>;

    /// Apply startup options. Called once, before the listener starts;
    /// an error here aborts startup.
    fn configure(&mut self, options: Document) -> Result<()>;

    /// Handle one request.
    async fn process(&self, request: &Request, sink: &mut ResponseSink, next: Next<'_>);
}

/// The remainder of the chain after the current module.
///
/// Modules cannot inspect it; they can only run it.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Module>],
}

impl Next<'_> {
    /// A continuation with nothing left to run.
    pub fn end() -> Next<'static> {
        Next { chain: &[] }
    }

    /// Forward the request to the rest of the chain. A no-op at the end
    /// of the chain.
    pub async fn run(self, request: &Request, sink: &mut ResponseSink) {
        if let Some((module, rest)) = self.chain.split_first() {
            module.process(request, sink, Next { chain: rest }).await;
        }
    }
}

/// An ordered list of configured module instances, assembled at startup.
#[derive(Default)]
pub struct ModuleChain {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, module: Box<dyn Module>) {
        self.modules.push(Arc::from(module));
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Fold the chain into its dispatch function.
    pub fn into_pipeline(self) -> Pipeline {
        Pipeline {
            chain: self.modules.into(),
        }
    }
}

/// The module chain folded into a single dispatch entry point.
///
/// Cheap to clone; read-only after construction.
#[derive(Clone)]
pub struct Pipeline {
    chain: Arc<[Arc<dyn Module>]>,
}

impl Pipeline {
    pub async fn dispatch(&self, request: &Request, sink: &mut ResponseSink) {
        Next { chain: &self.chain }.run(request, sink).await;
    }
}
