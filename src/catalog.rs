use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};
use thiserror::Error;

#[derive(Error, PartialEq, Debug)]
pub enum CatalogError {
    #[error("variable {0} has already been defined")]
    DuplicateVariable(VariableId),
    #[error("a variable named {0:?} already exists")]
    DuplicateVariableName(String),
    #[error("proxy {0} has already been defined")]
    DuplicateProxy(ProxyId),
    #[error("proxy {proxy} refers to the non-existing variable {variable}")]
    NonExistingVariable {
        proxy: ProxyId,
        variable: VariableId,
    },
}

#[derive(
    Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ProxyId(pub u64);

impl Display for ProxyId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "proxy({})", self.0)
    }
}

#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableId(pub u64);

impl Display for VariableId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "variable({})", self.0)
    }
}

/// How a proxy's search term is matched against scraped content.
///
/// The matching itself happens in the scraping subsystem; the kind is carried
/// here so intersection tooling can describe proxies faithfully.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Contains,
    Regex,
    Fuzzy,
}

/// A search term standing in for the presence of a concept in text.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Proxy {
    pub id: ProxyId,
    pub variable: VariableId,
    pub term: String,
    pub kind: MatchKind,
    pub weight: f64,
    pub case_sensitive: bool,
}

impl Proxy {
    /// Create a proxy with the default matching behavior (case-insensitive
    /// substring, weight 1.0).
    pub fn new(id: ProxyId, variable: VariableId, term: &str) -> Self {
        Self {
            id,
            variable,
            term: term.to_owned(),
            kind: MatchKind::Contains,
            weight: 1.0,
            case_sensitive: false,
        }
    }

    pub fn with_kind(mut self, kind: MatchKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }
}

/// A named analytical dimension grouping related proxies.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
    pub code: String,
    pub category: Option<String>,
    pub color: Option<String>,
    pub weight: f64,
}

impl Variable {
    pub fn new(id: VariableId, name: &str, code: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            code: code.to_owned(),
            category: None,
            color: None,
            weight: 1.0,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_owned());
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Some(color.to_owned());
        self
    }
}

/// The lookup capability the parser needs to turn quoted fragments into
/// proxy references. Kept as a trait so parsing is testable without a
/// backing store.
pub trait ProxyResolver {
    /// All proxies whose search term matches the fragment. Order does not
    /// matter; the parser applies the deterministic tie-break.
    fn find_by_text(&self, fragment: &str) -> Vec<&Proxy>;

    fn variable_name(&self, id: VariableId) -> Option<&str>;
}

/// In-memory table of variables and their proxies.
#[derive(Clone, Debug, Default)]
pub struct ProxyCatalog {
    variables: HashMap<VariableId, Variable>,
    variable_names: HashMap<String, VariableId>,
    proxies: HashMap<ProxyId, Proxy>,
    by_variable: HashMap<VariableId, Vec<ProxyId>>,
}

impl ProxyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, variable: Variable) -> Result<(), CatalogError> {
        if self.variables.contains_key(&variable.id) {
            return Err(CatalogError::DuplicateVariable(variable.id));
        }
        if self.variable_names.contains_key(&variable.name) {
            return Err(CatalogError::DuplicateVariableName(variable.name));
        }

        self.variable_names
            .insert(variable.name.clone(), variable.id);
        self.variables.insert(variable.id, variable);
        Ok(())
    }

    pub fn add_proxy(&mut self, proxy: Proxy) -> Result<(), CatalogError> {
        if self.proxies.contains_key(&proxy.id) {
            return Err(CatalogError::DuplicateProxy(proxy.id));
        }
        if !self.variables.contains_key(&proxy.variable) {
            return Err(CatalogError::NonExistingVariable {
                proxy: proxy.id,
                variable: proxy.variable,
            });
        }

        self.by_variable
            .entry(proxy.variable)
            .or_default()
            .push(proxy.id);
        self.proxies.insert(proxy.id, proxy);
        Ok(())
    }

    /// Remove a proxy, leaving its variable in place. Expression trees that
    /// still reference the id keep evaluating; the dangling leaf reads as
    /// "not found".
    pub fn remove_proxy(&mut self, id: ProxyId) -> Option<Proxy> {
        let proxy = self.proxies.remove(&id)?;
        if let Some(ids) = self.by_variable.get_mut(&proxy.variable) {
            ids.retain(|other| *other != id);
        }
        Some(proxy)
    }

    #[inline]
    pub fn proxy(&self, id: ProxyId) -> Option<&Proxy> {
        self.proxies.get(&id)
    }

    #[inline]
    pub fn variable(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(&id)
    }

    pub fn variable_proxies(&self, id: VariableId) -> &[ProxyId] {
        self.by_variable
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }
}

impl ProxyResolver for ProxyCatalog {
    fn find_by_text(&self, fragment: &str) -> Vec<&Proxy> {
        let needle = fragment.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        self.proxies
            .values()
            .filter(|proxy| {
                let term = proxy.term.to_lowercase();
                term.contains(&needle) || needle.contains(&term)
            })
            .collect()
    }

    fn variable_name(&self, id: VariableId) -> Option<&str> {
        self.variables.get(&id).map(|variable| variable.name.as_str())
    }
}
