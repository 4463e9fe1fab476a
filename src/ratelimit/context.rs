//! Request context used as rule input.

use serde::{Deserialize, Serialize};

/// An immutable snapshot of the attributes of one logical request.
///
/// Rules read these fields to pick a limiter and a limiter key. Two contexts
/// with equal fields are interchangeable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestContext {
    user_id: String,
    user_level: String,
    resource: String,
    method: String,
    ip: String,
}

impl RequestContext {
    /// Create a context from all of its fields.
    pub fn new(
        user_id: impl Into<String>,
        user_level: impl Into<String>,
        resource: impl Into<String>,
        method: impl Into<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_level: user_level.into(),
            resource: resource.into(),
            method: method.into(),
            ip: ip.into(),
        }
    }

    /// Start building a context field by field.
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn user_level(&self) -> &str {
        &self.user_level
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "user={} level={} {} {} from {}",
            self.user_id, self.user_level, self.method, self.resource, self.ip
        )
    }
}

/// Builder for [`RequestContext`]. Unset fields are empty strings.
#[derive(Debug, Clone, Default)]
pub struct RequestContextBuilder {
    inner: RequestContext,
}

impl RequestContextBuilder {
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.inner.user_id = user_id.into();
        self
    }

    pub fn user_level(mut self, user_level: impl Into<String>) -> Self {
        self.inner.user_level = user_level.into();
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.inner.resource = resource.into();
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.inner.method = method.into();
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.inner.ip = ip.into();
        self
    }

    pub fn build(self) -> RequestContext {
        self.inner
    }
}
