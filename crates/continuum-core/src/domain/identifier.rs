//! Service naming.
//!
//! A [`ServiceIdentifier`] names a logical service independently of where
//! it runs. Its canonical CRI is
//! `srv://[scope@]namespace.name#version`, and each function is addressed
//! one path segment below it.

use continuum_types::{Cri, CriError, Scheme};
use std::fmt;

/// Structural key of a registrable service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceIdentifier {
    namespace: Option<String>,
    name: String,
    scope: Option<String>,
    version: String,
    cri: Cri,
}

impl ServiceIdentifier {
    /// Build an identifier and derive its CRI.
    ///
    /// # Errors
    ///
    /// - [`CriError::InvalidResourceName`] for a blank name.
    /// - [`CriError::Malformed`] for a blank version, an empty namespace or
    ///   reserved characters in any component.
    pub fn new(
        namespace: Option<&str>,
        name: &str,
        scope: Option<&str>,
        version: &str,
    ) -> Result<Self, CriError> {
        if name.trim().is_empty() {
            return Err(CriError::InvalidResourceName(name.to_string()));
        }
        if matches!(namespace, Some(ns) if ns.trim().is_empty()) {
            return Err(CriError::Malformed {
                raw: name.to_string(),
                reason: "empty namespace".to_string(),
            });
        }
        if version.trim().is_empty() {
            return Err(CriError::Malformed {
                raw: name.to_string(),
                reason: "service version is required".to_string(),
            });
        }

        let qualified = qualify(namespace, name);
        let cri = Cri::create(Scheme::Service, scope, &qualified, Some(version), None)?;

        Ok(Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            scope: scope.map(str::to_string),
            version: version.to_string(),
            cri,
        })
    }

    /// Unscoped identifier without a namespace.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceIdentifier::new`].
    pub fn named(name: &str, version: &str) -> Result<Self, CriError> {
        Self::new(None, name, None, version)
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// `namespace.name`, or `name` without a namespace.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.namespace.as_deref(), &self.name)
    }

    /// Canonical CRI.
    #[must_use]
    pub fn cri(&self) -> &Cri {
        &self.cri
    }

    /// Address of one function of this service.
    ///
    /// # Errors
    ///
    /// Fails when `function` is blank.
    pub fn function_cri(&self, function: &str) -> Result<Cri, CriError> {
        self.cri.with_path(function)
    }

    /// Whether a request CRI addresses this exact service.
    ///
    /// Handlers for other versions or scopes share the base resource, so
    /// version and scope have to match as well.
    #[must_use]
    pub fn addresses(&self, request: &Cri) -> bool {
        request.scheme() == Scheme::Service
            && request.scope() == self.cri.scope()
            && request.resource_name() == self.cri.resource_name()
            && request.version() == self.cri.version()
    }
}

fn qualify(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}.{name}"),
        None => name.to_string(),
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cri.raw())
    }
}
