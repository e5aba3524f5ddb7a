//! # Continuum Resource Identifier
//!
//! Grammar: `scheme://[scope@]resourceName[#version][/path]`
//!
//! | Component      | Rules                                                   |
//! |----------------|---------------------------------------------------------|
//! | `scheme`       | `srv` or `stream`                                       |
//! | `scope`        | optional, non-empty, no `@`, `/` or `#`                 |
//! | `resourceName` | required, non-blank, no `@`, `/` or `#`                 |
//! | `version`      | optional, non-empty, no `@` or `/`                      |
//! | `path`         | optional, everything after the first `/` of the rest    |
//!
//! The `raw` form produced by [`Cri::create`] always parses back to the same
//! components.
//!
//! ## Patterns
//!
//! [`CriPattern`] is a glob over the raw form: `*` matches any run of
//! characters except `/` and `@`, `**` matches anything.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Separator between scheme and the rest of a CRI.
pub const SCHEME_SEPARATOR: &str = "://";

/// Character marking a wildcard segment.
pub const WILDCARD: char = '*';

/// Errors produced while parsing or building a CRI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CriError {
    /// Scheme missing or not one of `srv`, `stream`.
    #[error("Invalid scheme in '{0}': expected srv:// or stream://")]
    InvalidScheme(String),

    /// Resource name missing or blank.
    #[error("Invalid resource name in '{0}': must not be blank")]
    InvalidResourceName(String),

    /// Component contains a reserved character or is otherwise unusable.
    #[error("Malformed CRI '{raw}': {reason}")]
    Malformed { raw: String, reason: String },
}

impl CriError {
    fn malformed(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// SCHEME
// =============================================================================

/// Addressing scheme of a CRI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scheme {
    /// RPC traffic, `srv://`.
    #[serde(rename = "srv")]
    Service,
    /// Persisted event streams, `stream://`.
    #[serde(rename = "stream")]
    Stream,
}

impl Scheme {
    /// Raw token as it appears before `://`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Service => "srv",
            Self::Stream => "stream",
        }
    }
}

impl FromStr for Scheme {
    type Err = CriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "srv" => Ok(Self::Service),
            "stream" => Ok(Self::Stream),
            other => Err(CriError::InvalidScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CRI
// =============================================================================

/// A parsed Continuum Resource Identifier.
///
/// Equality, ordering and hashing use the raw string.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cri {
    scheme: Scheme,
    scope: Option<String>,
    resource_name: String,
    version: Option<String>,
    path: Option<String>,
    raw: String,
}

impl Cri {
    /// Parse a raw CRI.
    ///
    /// The first `@` that appears before any `/` ends the scope. The first
    /// `#` before the path starts the version. Everything after the first
    /// `/` that follows the resource name is the path.
    ///
    /// # Errors
    ///
    /// - [`CriError::InvalidScheme`] when `://` is missing or the scheme is unknown.
    /// - [`CriError::InvalidResourceName`] when the resource name is blank.
    /// - [`CriError::Malformed`] when a component breaks its character rules.
    pub fn parse(raw: &str) -> Result<Self, CriError> {
        let (scheme_token, mut rest) = raw
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| CriError::InvalidScheme(raw.to_string()))?;
        let scheme: Scheme = scheme_token
            .parse()
            .map_err(|_| CriError::InvalidScheme(raw.to_string()))?;

        let first_slash = rest.find('/');
        let scope = match rest.find('@') {
            Some(at) if first_slash.map_or(true, |slash| at < slash) => {
                let scope = &rest[..at];
                rest = &rest[at + 1..];
                Some(scope)
            }
            _ => None,
        };

        let (head, path) = match rest.split_once('/') {
            Some((head, path)) => (head, Some(path)),
            None => (rest, None),
        };
        let (resource_name, version) = match head.split_once('#') {
            Some((name, version)) => (name, Some(version)),
            None => (head, None),
        };

        if matches!(path, Some("")) {
            return Err(CriError::malformed(raw, "empty path after '/'"));
        }

        let cri = Self::create(scheme, scope, resource_name, version, path)?;
        if cri.raw != raw {
            return Err(CriError::malformed(raw, "non-canonical form"));
        }
        Ok(cri)
    }

    /// Build a CRI from components.
    ///
    /// A leading `/` on `path` is stripped; an empty path is treated as absent.
    ///
    /// # Errors
    ///
    /// Same rules as [`Cri::parse`].
    pub fn create(
        scheme: Scheme,
        scope: Option<&str>,
        resource_name: &str,
        version: Option<&str>,
        path: Option<&str>,
    ) -> Result<Self, CriError> {
        let path = path
            .map(|p| p.strip_prefix('/').unwrap_or(p))
            .filter(|p| !p.is_empty());
        let raw = render(scheme, scope, resource_name, version, path);

        if resource_name.trim().is_empty() {
            return Err(CriError::InvalidResourceName(raw));
        }
        if resource_name.contains(['@', '/', '#']) {
            return Err(CriError::malformed(
                raw,
                "resource name contains '@', '/' or '#'",
            ));
        }
        if let Some(scope) = scope {
            if scope.is_empty() {
                return Err(CriError::malformed(raw, "empty scope before '@'"));
            }
            if scope.contains(['@', '/', '#']) {
                return Err(CriError::malformed(raw, "scope contains '@', '/' or '#'"));
            }
        }
        if let Some(version) = version {
            if version.is_empty() {
                return Err(CriError::malformed(raw, "empty version after '#'"));
            }
            if version.contains(['@', '/']) {
                return Err(CriError::malformed(raw, "version contains '@' or '/'"));
            }
        }

        Ok(Self {
            scheme,
            scope: scope.map(str::to_string),
            resource_name: resource_name.to_string(),
            version: version.map(str::to_string),
            path: path.map(str::to_string),
            raw,
        })
    }

    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Last `/`-separated segment of the path.
    #[must_use]
    pub fn last_path_segment(&self) -> Option<&str> {
        self.path.as_deref().and_then(|p| p.rsplit('/').next())
    }

    /// Canonical string form.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// `scheme://[scope@]resourceName`, dropping version and path.
    #[must_use]
    pub fn base_resource(&self) -> Cri {
        self.derive(self.scope.clone(), None, None)
    }

    /// `scheme://[scope@]resourceName[#version]`, dropping the path.
    #[must_use]
    pub fn versioned_resource(&self) -> Cri {
        self.derive(self.scope.clone(), self.version.clone(), None)
    }

    /// Same CRI with `segment` appended to the path.
    ///
    /// # Errors
    ///
    /// Returns [`CriError::Malformed`] when `segment` is empty.
    pub fn with_path(&self, segment: &str) -> Result<Cri, CriError> {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            return Err(CriError::malformed(&self.raw, "empty path segment"));
        }
        let path = match &self.path {
            Some(existing) => format!("{existing}/{segment}"),
            None => segment.to_string(),
        };
        Ok(self.derive(self.scope.clone(), self.version.clone(), Some(path)))
    }

    /// Same CRI under a different scope.
    ///
    /// # Errors
    ///
    /// Fails when `scope` breaks the scope rules.
    pub fn with_scope(&self, scope: &str) -> Result<Cri, CriError> {
        Cri::create(
            self.scheme,
            Some(scope),
            &self.resource_name,
            self.version.as_deref(),
            self.path.as_deref(),
        )
    }

    /// Whether the raw form contains a `*`.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.raw.contains(WILDCARD)
    }

    /// Whether an event addressed to `self` reaches a listener on `listener`.
    ///
    /// A listener receives an event when the CRIs are equal, when the
    /// listener is the event's base or versioned resource (same scope), or
    /// when the listener contains a wildcard that matches the event.
    #[must_use]
    pub fn delivers_to(&self, listener: &Cri) -> bool {
        if self.raw == listener.raw {
            return true;
        }
        if listener.scheme != self.scheme {
            return false;
        }
        if listener.has_wildcard() {
            return CriPattern::new(&listener.raw).is_ok_and(|p| p.matches_cri(self));
        }
        listener.path.is_none()
            && listener.scope == self.scope
            && listener.resource_name == self.resource_name
            && (listener.version.is_none() || listener.version == self.version)
    }

    // Components derived from a valid CRI stay valid, so no re-validation.
    fn derive(&self, scope: Option<String>, version: Option<String>, path: Option<String>) -> Cri {
        let raw = render(
            self.scheme,
            scope.as_deref(),
            &self.resource_name,
            version.as_deref(),
            path.as_deref(),
        );
        Cri {
            scheme: self.scheme,
            scope,
            resource_name: self.resource_name.clone(),
            version,
            path,
            raw,
        }
    }
}

fn render(
    scheme: Scheme,
    scope: Option<&str>,
    resource_name: &str,
    version: Option<&str>,
    path: Option<&str>,
) -> String {
    let mut raw = String::with_capacity(
        scheme.as_str().len()
            + SCHEME_SEPARATOR.len()
            + resource_name.len()
            + scope.map_or(0, |s| s.len() + 1)
            + version.map_or(0, |v| v.len() + 1)
            + path.map_or(0, |p| p.len() + 1),
    );
    raw.push_str(scheme.as_str());
    raw.push_str(SCHEME_SEPARATOR);
    if let Some(scope) = scope {
        raw.push_str(scope);
        raw.push('@');
    }
    raw.push_str(resource_name);
    if let Some(version) = version {
        raw.push('#');
        raw.push_str(version);
    }
    if let Some(path) = path {
        raw.push('/');
        raw.push_str(path);
    }
    raw
}

impl PartialEq for Cri {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Cri {}

impl Hash for Cri {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialOrd for Cri {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cri {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl fmt::Debug for Cri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cri").field(&self.raw).finish()
    }
}

impl fmt::Display for Cri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Cri {
    type Err = CriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Cri {
    type Error = CriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Cri> for String {
    fn from(cri: Cri) -> Self {
        cri.raw
    }
}

// =============================================================================
// PATTERNS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Token {
    Literal(String),
    /// `*`: any run without `/` or `@`.
    Star,
    /// `**`: any run.
    DoubleStar,
}

/// Glob pattern over raw CRIs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CriPattern {
    raw: String,
    tokens: Vec<Token>,
}

impl CriPattern {
    /// Compile a pattern such as `srv://alice@**` or `stream://*@orders`.
    ///
    /// # Errors
    ///
    /// Returns [`CriError::InvalidScheme`] when the pattern does not start
    /// with a known scheme followed by `://`.
    pub fn new(pattern: &str) -> Result<Self, CriError> {
        let (scheme, _) = pattern
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| CriError::InvalidScheme(pattern.to_string()))?;
        scheme
            .parse::<Scheme>()
            .map_err(|_| CriError::InvalidScheme(pattern.to_string()))?;

        Ok(Self {
            raw: pattern.to_string(),
            tokens: tokenize(pattern),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the raw string matches.
    #[must_use]
    pub fn matches(&self, raw: &str) -> bool {
        match_tokens(&self.tokens, raw)
    }

    #[must_use]
    pub fn matches_cri(&self, cri: &Cri) -> bool {
        self.matches(cri.raw())
    }

    /// Whether every address `cri` can stand for is matched.
    ///
    /// A concrete CRI is covered when it matches. A CRI containing
    /// wildcards is read as a pattern itself: each of its wildcards must
    /// fall inside a pattern wildcard at least as wide, so `srv://*` does
    /// not cover `srv://**` even though it matches that text.
    #[must_use]
    pub fn covers(&self, cri: &Cri) -> bool {
        if !cri.has_wildcard() {
            return self.matches_cri(cri);
        }
        let units = units(&tokenize(cri.raw()));
        covers_units(&self.tokens, &units)
    }
}

impl fmt::Display for CriPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != WILDCARD {
            literal.push(c);
            continue;
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }
        let token = if chars.peek() == Some(&WILDCARD) {
            chars.next();
            Token::DoubleStar
        } else {
            Token::Star
        };
        // Adjacent wildcards collapse into the wider one.
        if !matches!(tokens.last(), Some(Token::Star | Token::DoubleStar)) {
            tokens.push(token);
        } else if token == Token::DoubleStar {
            if let Some(last) = tokens.last_mut() {
                *last = Token::DoubleStar;
            }
        }
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

fn match_tokens(tokens: &[Token], input: &str) -> bool {
    let Some((first, rest)) = tokens.split_first() else {
        return input.is_empty();
    };
    match first {
        Token::Literal(lit) => input
            .strip_prefix(lit.as_str())
            .is_some_and(|remaining| match_tokens(rest, remaining)),
        Token::DoubleStar => (0..=input.len())
            .filter(|i| input.is_char_boundary(*i))
            .any(|i| match_tokens(rest, &input[i..])),
        Token::Star => {
            let limit = input.find(|c| c == '/' || c == '@').unwrap_or(input.len());
            (0..=limit)
                .filter(|i| input.is_char_boundary(*i))
                .any(|i| match_tokens(rest, &input[i..]))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Char(char),
    Star,
    DoubleStar,
}

fn units(tokens: &[Token]) -> Vec<Unit> {
    tokens
        .iter()
        .flat_map(|token| match token {
            Token::Literal(lit) => lit.chars().map(Unit::Char).collect::<Vec<_>>(),
            Token::Star => vec![Unit::Star],
            Token::DoubleStar => vec![Unit::DoubleStar],
        })
        .collect()
}

fn covers_units(tokens: &[Token], units: &[Unit]) -> bool {
    let Some((first, rest)) = tokens.split_first() else {
        return units.is_empty();
    };
    match first {
        Token::Literal(lit) => {
            let len = lit.chars().count();
            units.len() >= len
                && lit
                    .chars()
                    .zip(units)
                    .all(|(c, unit)| *unit == Unit::Char(c))
                && covers_units(rest, &units[len..])
        }
        Token::DoubleStar => (0..=units.len()).any(|i| covers_units(rest, &units[i..])),
        Token::Star => {
            let limit = units
                .iter()
                .position(|unit| matches!(unit, Unit::Char('/' | '@') | Unit::DoubleStar))
                .unwrap_or(units.len());
            (0..=limit).any(|i| covers_units(rest, &units[i..]))
        }
    }
}
