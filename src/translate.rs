//! Name translation: version-aware rewriting of type paths.
//!
//! DESIGN
//! ======
//! Host releases renamed some built-in component types. The client speaks one
//! canonical ("internal") spelling and rewrites payload text on the way out
//! (internal → configured version) and on the way in (any known external
//! spelling → internal).
//!
//! Translation works on serialized JSON text rather than on decoded values,
//! because type paths show up as object keys and inside arbitrary string
//! arrays alike. Each table entry is a literal replace-all.
//!
//! INVARIANTS
//! ==========
//! - No identifier in a table is a substring of another identifier in the
//!   same direction, so replacement order never matters.
//! - Internal → version → internal is the identity on payloads whose only
//!   matches are whole identifiers.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use crate::types::ClientError;

// =============================================================================
// SERVER VERSION
// =============================================================================

/// Which host release the session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerVersion {
    /// Send and receive payloads untouched.
    Ignore,
    V0_15,
    V0_16,
}

impl ServerVersion {
    /// Every concrete release with a translation table.
    pub const SUPPORTED: [Self; 2] = [Self::V0_15, Self::V0_16];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::V0_15 => "0.15",
            Self::V0_16 => "0.16",
        }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerVersion {
    type Err = ClientError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "0.15" => Ok(Self::V0_15),
            "0.16" => Ok(Self::V0_16),
            other => Err(ClientError::ConfigParse(format!(
                "unknown server version '{other}' (expected 'ignore', '0.15' or '0.16')"
            ))),
        }
    }
}

// =============================================================================
// TABLES
// =============================================================================

/// Internal → 0.15 spellings.
const INTERNAL_TO_V0_15: &[(&str, &str)] = &[
    ("bevy_ecs::hierarchy::Children", "bevy_hierarchy::components::children::Children"),
    ("bevy_ecs::name::Name", "bevy_core::name::Name"),
];

/// 0.16 is the canonical spelling.
const INTERNAL_TO_V0_16: &[(&str, &str)] = &[];

static STANDARD: LazyLock<Arc<TranslationTables>> = LazyLock::new(|| Arc::new(TranslationTables::standard()));

/// Immutable lookup built once per process.
#[derive(Debug, Clone)]
pub struct TranslationTables {
    forward: Vec<(ServerVersion, Vec<(String, String)>)>,
    any_to_internal: Vec<(String, String)>,
}

impl TranslationTables {
    /// Tables for every [`ServerVersion::SUPPORTED`] release.
    #[must_use]
    pub fn standard() -> Self {
        Self::from_entries(&[
            (ServerVersion::V0_15, INTERNAL_TO_V0_15),
            (ServerVersion::V0_16, INTERNAL_TO_V0_16),
        ])
    }

    /// Process-wide shared copy of [`TranslationTables::standard`].
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(&STANDARD)
    }

    /// Build tables from per-version `(internal, external)` pairs.
    ///
    /// The union reverse table keeps the first mapping seen for an external
    /// spelling.
    #[must_use]
    pub fn from_entries(entries: &[(ServerVersion, &[(&str, &str)])]) -> Self {
        let mut forward = Vec::with_capacity(entries.len());
        let mut any_to_internal: Vec<(String, String)> = Vec::new();

        for (version, pairs) in entries {
            let owned: Vec<(String, String)> = pairs
                .iter()
                .map(|(internal, external)| ((*internal).to_owned(), (*external).to_owned()))
                .collect();
            for (internal, external) in &owned {
                if !any_to_internal.iter().any(|(seen, _)| seen == external) {
                    any_to_internal.push((external.clone(), internal.clone()));
                }
            }
            forward.push((*version, owned));
        }

        Self { forward, any_to_internal }
    }

    /// `(internal, external)` pairs for `version`; empty for `Ignore` and
    /// unknown versions.
    #[must_use]
    pub fn internal_to(&self, version: ServerVersion) -> &[(String, String)] {
        self.forward
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, pairs)| pairs.as_slice())
            .unwrap_or_default()
    }

    /// `(external, internal)` pairs across every version.
    #[must_use]
    pub fn any_to_internal(&self) -> &[(String, String)] {
        &self.any_to_internal
    }

    /// Identifiers that are substrings of another identifier on the same
    /// side of some table. Empty for a well-formed set.
    #[must_use]
    pub fn ambiguous_identifiers(&self) -> Vec<(String, String)> {
        let mut sides: Vec<Vec<&str>> = self
            .forward
            .iter()
            .flat_map(|(_, pairs)| {
                [
                    pairs.iter().map(|(i, _)| i.as_str()).collect::<Vec<_>>(),
                    pairs.iter().map(|(_, e)| e.as_str()).collect::<Vec<_>>(),
                ]
            })
            .collect();
        sides.push(self.any_to_internal.iter().map(|(e, _)| e.as_str()).collect());

        let mut clashes = Vec::new();
        for side in sides {
            for a in &side {
                for b in &side {
                    if a != b && b.contains(a) {
                        clashes.push(((*a).to_owned(), (*b).to_owned()));
                    }
                }
            }
        }
        clashes
    }
}

// =============================================================================
// TRANSLATOR
// =============================================================================

/// Version-bound view over the shared tables.
#[derive(Debug, Clone)]
pub struct Translator {
    version: ServerVersion,
    tables: Arc<TranslationTables>,
}

impl Translator {
    #[must_use]
    pub fn new(version: ServerVersion) -> Self {
        Self::with_tables(version, TranslationTables::shared())
    }

    #[must_use]
    pub fn with_tables(version: ServerVersion, tables: Arc<TranslationTables>) -> Self {
        Self { version, tables }
    }

    #[must_use]
    pub fn version(&self) -> ServerVersion {
        self.version
    }

    /// Rewrite every known external spelling to its internal form.
    ///
    /// Any active version applies the union table, since host output may use
    /// any spelling the client has ever seen.
    #[must_use]
    pub fn to_internal<'a>(&self, payload: &'a str) -> Cow<'a, str> {
        if self.version == ServerVersion::Ignore {
            return Cow::Borrowed(payload);
        }
        replace_all(payload, self.tables.any_to_internal())
    }

    /// Rewrite internal spellings to the configured version's.
    #[must_use]
    pub fn to_external<'a>(&self, payload: &'a str) -> Cow<'a, str> {
        replace_all(payload, self.tables.internal_to(self.version))
    }
}

fn replace_all<'a>(payload: &'a str, pairs: &[(String, String)]) -> Cow<'a, str> {
    let mut out = Cow::Borrowed(payload);
    for (search, replacement) in pairs {
        if out.contains(search.as_str()) {
            out = Cow::Owned(out.replace(search.as_str(), replacement));
        }
    }
    out
}

#[cfg(test)]
#[path = "translate_test.rs"]
mod tests;
