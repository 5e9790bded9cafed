//! Capability discovery.
//!
//! A handler type opts methods into the remote surface by implementing
//! [`RemoteHandler::export`] and registering each method by name. Scanning one
//! or more handler instances yields bound [`MethodDescriptor`]s and the
//! ordered [`CapabilitySet`] the contract is synthesized from.
//!
//! # Example
//!
//! ```rust,ignore
//! struct TextProcessor;
//!
//! impl RemoteHandler for TextProcessor {
//!     fn export(exports: &mut Exports<Self>) {
//!         exports.method("process", |_this, call| {
//!             let arg: String = call.require(0, "arg")?;
//!             Ok(format!("Processed! (arg='{}')", arg).into())
//!         });
//!     }
//! }
//! ```

use crate::envelope::Envelope;
use crate::error::HandlerError;
use crate::hooks::SerializationHooks;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Result of a handler method.
pub type HandlerResult = std::result::Result<Value, HandlerError>;

/// A handler method bound to its owning instance.
pub type BoundMethod = Arc<dyn Fn(&Envelope) -> HandlerResult + Send + Sync>;

type UnboundMethod<H> = Arc<dyn Fn(&H, &Envelope) -> HandlerResult + Send + Sync>;

/// A type whose instances expose remote-callable methods.
pub trait RemoteHandler: Send + Sync + 'static {
    /// Register the methods of this type that are remotely invokable.
    fn export(exports: &mut Exports<Self>)
    where
        Self: Sized;
}

/// Registration list filled in by [`RemoteHandler::export`].
pub struct Exports<H> {
    entries: Vec<Export<H>>,
}

struct Export<H> {
    name: String,
    hooks: SerializationHooks,
    method: UnboundMethod<H>,
}

impl<H: RemoteHandler> Exports<H> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Export a method with the default serialization hooks.
    pub fn method<F>(&mut self, name: &str, method: F) -> &mut Self
    where
        F: Fn(&H, &Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.method_with(name, SerializationHooks::default(), method)
    }

    /// Export a method with its own encoders or decoder hook.
    pub fn method_with<F>(&mut self, name: &str, hooks: SerializationHooks, method: F) -> &mut Self
    where
        F: Fn(&H, &Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        if self.entries.iter().any(|e| e.name == name) {
            return self;
        }
        self.entries.push(Export {
            name: name.to_string(),
            hooks,
            method: Arc::new(method),
        });
        self
    }
}

/// Identity of the handler instance a method is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId {
    /// Registration position within its handler set.
    pub index: usize,
    pub type_name: &'static str,
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.index)
    }
}

/// One exported method bound to its owning instance.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub owner: OwnerId,
    pub hooks: SerializationHooks,
    callable: BoundMethod,
}

impl MethodDescriptor {
    /// Call the bound method directly.
    pub fn invoke(&self, envelope: &Envelope) -> HandlerResult {
        (self.callable)(envelope)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Bind every exported method of `handler`.
pub fn describe<H: RemoteHandler>(handler: &Arc<H>, index: usize) -> Vec<MethodDescriptor> {
    let mut exports = Exports::new();
    H::export(&mut exports);

    let owner = OwnerId {
        index,
        type_name: std::any::type_name::<H>(),
    };

    exports
        .entries
        .into_iter()
        .map(|export| {
            let instance = Arc::clone(handler);
            let method = export.method;
            MethodDescriptor {
                name: export.name,
                owner,
                hooks: export.hooks,
                callable: Arc::new(move |envelope: &Envelope| method(&instance, envelope)),
            }
        })
        .collect()
}

/// Capability names of a single handler.
pub fn scan<H: RemoteHandler>(handler: &Arc<H>) -> CapabilitySet {
    describe(handler, 0).into_iter().map(|d| d.name).collect()
}

/// Unique capability names in discovery order.
///
/// Equality ignores order; order only affects generated contract text.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    names: Vec<String>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name; returns false if it was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl PartialEq for CapabilitySet {
    fn eq(&self, other: &Self) -> bool {
        let mine: HashSet<&str> = self.iter().collect();
        let theirs: HashSet<&str> = other.iter().collect();
        mine == theirs
    }
}

impl Eq for CapabilitySet {}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = CapabilitySet::new();
        for name in iter {
            set.insert(name);
        }
        set
    }
}

/// Ordered list of handler instances served or proxied together.
#[derive(Clone, Default)]
pub struct HandlerSet {
    descriptors: Vec<MethodDescriptor>,
    handlers: usize,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler instance; earlier handlers win name clashes.
    pub fn with<H: RemoteHandler>(mut self, handler: Arc<H>) -> Self {
        self.add(handler);
        self
    }

    pub fn add<H: RemoteHandler>(&mut self, handler: Arc<H>) -> &mut Self {
        let index = self.handlers;
        self.descriptors.extend(describe(&handler, index));
        self.handlers += 1;
        self
    }

    /// Every descriptor of every handler, in registration order.
    ///
    /// Duplicated names appear once per owning handler.
    pub fn descriptors(&self) -> &[MethodDescriptor] {
        &self.descriptors
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    /// Number of registered handler instances.
    pub fn handler_count(&self) -> usize {
        self.handlers
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSet")
            .field("handlers", &self.handlers)
            .field("descriptors", &self.descriptors)
            .finish()
    }
}
