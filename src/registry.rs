use crate::{
    ast::ExpressionNode,
    catalog::{ProxyCatalog, ProxyId, VariableId},
    config::{EngineConfig, VariablePolicy},
    error::{ExpressionError, ParseError},
    evaluator,
    matches::{CatalogScopedLookup, MatchLookup, OrganizationId},
    parser::{parse, ResolvedProxy},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use slab::Slab;
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("no intersection with id {0}")]
    UnknownIntersection(IntersectionId),
    #[error("an intersection named {0:?} already exists")]
    DuplicateName(String),
    #[error("a proxy-simple intersection needs at least one proxy")]
    EmptyProxyList,
    #[error("a variable-based intersection needs at least one variable")]
    EmptyVariableList,
    #[error("variable {0} does not exist")]
    UnknownVariable(VariableId),
    #[error("variable {0} has no proxies to expand")]
    VariableWithoutProxies(VariableId),
    #[error("proxy {0} does not exist")]
    UnknownProxy(ProxyId),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntersectionId(pub u64);

impl Display for IntersectionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "intersection({})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl Operator {
    fn node(&self, children: Vec<ExpressionNode>) -> ExpressionNode {
        match self {
            Self::And => ExpressionNode::And { children },
            Self::Or => ExpressionNode::Or { children },
        }
    }
}

impl Display for Operator {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => write!(formatter, "AND"),
            Self::Or => write!(formatter, "OR"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntersectionMode {
    VariableBased,
    ProxySimple,
    Expression,
}

/// How an intersection's logic is defined. One variant per historical mode;
/// each carries only its own data, so no other mode's fields can go stale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum IntersectionDefinition {
    /// Legacy: a list of variables combined with one operator, each variable
    /// expanding to its proxies per the configured policy.
    VariableBased {
        variables: Vec<VariableId>,
        operator: Operator,
    },
    /// Legacy: a flat list of proxies combined with one operator.
    ProxySimple {
        proxies: Vec<ProxyId>,
        operator: Operator,
    },
    /// An explicit expression tree.
    Expression { tree: ExpressionNode },
}

impl IntersectionDefinition {
    pub fn mode(&self) -> IntersectionMode {
        match self {
            Self::VariableBased { .. } => IntersectionMode::VariableBased,
            Self::ProxySimple { .. } => IntersectionMode::ProxySimple,
            Self::Expression { .. } => IntersectionMode::Expression,
        }
    }

    /// Materialize the definition into a validated, normalized expression
    /// tree. All three modes go through here before anything is evaluated
    /// or persisted.
    pub fn normalize(
        &self,
        catalog: &ProxyCatalog,
        config: &EngineConfig,
    ) -> Result<ExpressionNode, RegistryError> {
        let tree = match self {
            Self::VariableBased {
                variables,
                operator,
            } => {
                if variables.is_empty() {
                    return Err(RegistryError::EmptyVariableList);
                }
                let mut children = Vec::with_capacity(variables.len());
                for id in variables {
                    if catalog.variable(*id).is_none() {
                        return Err(RegistryError::UnknownVariable(*id));
                    }
                    let proxies = catalog.variable_proxies(*id);
                    if proxies.is_empty() {
                        return Err(RegistryError::VariableWithoutProxies(*id));
                    }
                    let references = proxies.iter().copied().map(ExpressionNode::proxy).collect();
                    children.push(match config.variable_policy {
                        VariablePolicy::AnyProxy => ExpressionNode::Or {
                            children: references,
                        },
                        VariablePolicy::AllProxies => ExpressionNode::And {
                            children: references,
                        },
                    });
                }
                operator.node(children)
            }
            Self::ProxySimple { proxies, operator } => {
                if proxies.is_empty() {
                    return Err(RegistryError::EmptyProxyList);
                }
                for id in proxies {
                    if catalog.proxy(*id).is_none() {
                        return Err(RegistryError::UnknownProxy(*id));
                    }
                }
                operator.node(proxies.iter().copied().map(ExpressionNode::proxy).collect())
            }
            Self::Expression { tree } => {
                for id in tree.proxy_ids() {
                    if catalog.proxy(id).is_none() {
                        return Err(RegistryError::UnknownProxy(id));
                    }
                }
                tree.clone()
            }
        };

        let tree = tree.normalize();
        tree.validate(config.max_depth)?;
        Ok(tree)
    }
}

/// A named, persisted query over variables. The normalized tree and its
/// display string are cached at write time and regenerated on every
/// definition change, never recomputed per evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct Intersection {
    pub id: IntersectionId,
    pub name: String,
    pub description: Option<String>,
    pub definition: IntersectionDefinition,
    tree: ExpressionNode,
    display: String,
}

impl Intersection {
    #[inline]
    pub fn tree(&self) -> &ExpressionNode {
        &self.tree
    }

    #[inline]
    pub fn display(&self) -> &str {
        &self.display
    }

    /// The flat record surface consumed by the CRUD layer, legacy flags
    /// included. Only the active mode's fields are populated.
    pub fn to_record(&self) -> IntersectionRecord {
        let mode = self.definition.mode();
        IntersectionRecord {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            mode,
            use_proxies: mode == IntersectionMode::ProxySimple,
            use_logic_expression: mode == IntersectionMode::Expression,
            logic_expression: match &self.definition {
                IntersectionDefinition::Expression { .. } => Some(self.tree.clone()),
                _ => None,
            },
            expression_display: self.display.clone(),
            include_ids: match &self.definition {
                IntersectionDefinition::VariableBased { variables, .. } => variables.clone(),
                _ => Vec::new(),
            },
            include_proxy_ids: match &self.definition {
                IntersectionDefinition::ProxySimple { proxies, .. } => proxies.clone(),
                _ => Vec::new(),
            },
        }
    }
}

/// Flat intersection record as exposed to and consumed from the CRUD layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntersectionRecord {
    pub id: IntersectionId,
    pub name: String,
    pub description: Option<String>,
    pub mode: IntersectionMode,
    pub use_proxies: bool,
    pub use_logic_expression: bool,
    pub logic_expression: Option<ExpressionNode>,
    pub expression_display: String,
    pub include_ids: Vec<VariableId>,
    pub include_proxy_ids: Vec<ProxyId>,
}

/// The outcome of evaluating one intersection for one organization.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntersectionResult {
    pub value: bool,
    pub matched_proxy_ids: Vec<ProxyId>,
}

/// In-memory intersection store with create/update/delete and evaluation.
#[derive(Debug)]
pub struct IntersectionRegistry {
    config: EngineConfig,
    intersections: Slab<Intersection>,
    keys_by_ids: HashMap<IntersectionId, usize>,
    ids_by_names: HashMap<String, IntersectionId>,
    next_id: u64,
}

impl Default for IntersectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IntersectionRegistry {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            intersections: Slab::new(),
            keys_by_ids: HashMap::new(),
            ids_by_names: HashMap::new(),
            next_id: 1,
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create an intersection from a structured definition. The definition
    /// is normalized and validated first; nothing is stored on failure.
    pub fn create(
        &mut self,
        catalog: &ProxyCatalog,
        name: &str,
        description: Option<&str>,
        definition: IntersectionDefinition,
    ) -> Result<IntersectionId, RegistryError> {
        if self.ids_by_names.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_owned()));
        }

        let tree = definition.normalize(catalog, &self.config)?;
        let display = render_display(&tree, catalog);
        let id = IntersectionId(self.next_id);
        self.next_id += 1;

        let key = self.intersections.insert(Intersection {
            id,
            name: name.to_owned(),
            description: description.map(str::to_owned),
            definition,
            tree,
            display,
        });
        self.keys_by_ids.insert(id, key);
        self.ids_by_names.insert(name.to_owned(), id);
        debug!(%id, "created intersection {name:?}");
        Ok(id)
    }

    /// Create an intersection from a textual expression, returning the
    /// resolved proxies alongside the id so the caller can show the user
    /// what each quoted fragment ended up referring to.
    pub fn create_from_text(
        &mut self,
        catalog: &ProxyCatalog,
        name: &str,
        description: Option<&str>,
        expression: &str,
    ) -> Result<(IntersectionId, Vec<ResolvedProxy>), RegistryError> {
        let outcome = parse(expression, catalog)?;
        let id = self.create(
            catalog,
            name,
            description,
            IntersectionDefinition::Expression { tree: outcome.tree },
        )?;
        Ok((id, outcome.resolved))
    }

    /// Replace an intersection's definition, possibly changing its mode.
    /// The cached tree and display string follow the new definition; the old
    /// mode's data is gone with the old definition.
    pub fn update_definition(
        &mut self,
        catalog: &ProxyCatalog,
        id: IntersectionId,
        definition: IntersectionDefinition,
    ) -> Result<(), RegistryError> {
        let tree = definition.normalize(catalog, &self.config)?;
        let display = render_display(&tree, catalog);

        let intersection = self.get_mut(id)?;
        intersection.definition = definition;
        intersection.tree = tree;
        intersection.display = display;
        debug!(%id, "updated intersection definition");
        Ok(())
    }

    pub fn update_definition_from_text(
        &mut self,
        catalog: &ProxyCatalog,
        id: IntersectionId,
        expression: &str,
    ) -> Result<Vec<ResolvedProxy>, RegistryError> {
        let outcome = parse(expression, catalog)?;
        self.update_definition(
            catalog,
            id,
            IntersectionDefinition::Expression { tree: outcome.tree },
        )?;
        Ok(outcome.resolved)
    }

    pub fn rename(&mut self, id: IntersectionId, name: &str) -> Result<(), RegistryError> {
        match self.ids_by_names.get(name) {
            Some(other) if *other != id => {
                return Err(RegistryError::DuplicateName(name.to_owned()))
            }
            _ => {}
        }

        let intersection = self.get_mut(id)?;
        let previous = std::mem::replace(&mut intersection.name, name.to_owned());
        self.ids_by_names.remove(&previous);
        self.ids_by_names.insert(name.to_owned(), id);
        Ok(())
    }

    pub fn set_description(
        &mut self,
        id: IntersectionId,
        description: Option<&str>,
    ) -> Result<(), RegistryError> {
        self.get_mut(id)?.description = description.map(str::to_owned);
        Ok(())
    }

    /// Hard delete. Referenced proxies and variables are untouched.
    pub fn delete(&mut self, id: IntersectionId) -> Result<Intersection, RegistryError> {
        let key = self
            .keys_by_ids
            .remove(&id)
            .ok_or(RegistryError::UnknownIntersection(id))?;
        let intersection = self.intersections.remove(key);
        self.ids_by_names.remove(&intersection.name);
        debug!(%id, "deleted intersection {:?}", intersection.name);
        Ok(intersection)
    }

    pub fn get(&self, id: IntersectionId) -> Option<&Intersection> {
        self.keys_by_ids
            .get(&id)
            .map(|key| &self.intersections[*key])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Intersection> + '_ {
        self.intersections.iter().map(|(_, intersection)| intersection)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.intersections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intersections.is_empty()
    }

    /// Evaluate an intersection for one organization. Leaves referencing a
    /// proxy that no longer exists in the catalog read as "not found", with
    /// a warning, so historical intersections survive proxy cleanup.
    pub fn evaluate(
        &self,
        catalog: &ProxyCatalog,
        id: IntersectionId,
        organization: OrganizationId,
        matches: &impl MatchLookup,
    ) -> Result<IntersectionResult, RegistryError> {
        let intersection = self
            .get(id)
            .ok_or(RegistryError::UnknownIntersection(id))?;

        let scoped = CatalogScopedLookup::new(catalog, matches);
        let evaluation = evaluator::evaluate(&intersection.tree, organization, &scoped)?;
        Ok(IntersectionResult {
            value: evaluation.value,
            matched_proxy_ids: evaluation.contributing,
        })
    }

    fn get_mut(&mut self, id: IntersectionId) -> Result<&mut Intersection, RegistryError> {
        let key = self
            .keys_by_ids
            .get(&id)
            .ok_or(RegistryError::UnknownIntersection(id))?;
        Ok(&mut self.intersections[*key])
    }
}

const DISPLAY_TERM_LIMIT: usize = 30;

/// Human-readable rendering of a tree, resolving leaves to their search
/// terms. Operator nodes are parenthesized below the root only.
fn render_display(tree: &ExpressionNode, catalog: &ProxyCatalog) -> String {
    render_node(tree, catalog, 0)
}

fn render_node(node: &ExpressionNode, catalog: &ProxyCatalog, depth: usize) -> String {
    match node {
        ExpressionNode::Proxy { id } => match catalog.proxy(*id) {
            Some(proxy) => {
                if proxy.term.chars().count() > DISPLAY_TERM_LIMIT {
                    let short = proxy.term.chars().take(DISPLAY_TERM_LIMIT).collect::<String>();
                    format!("\"{short}...\"")
                } else {
                    format!("\"{}\"", proxy.term)
                }
            }
            None => format!("[Proxy {}]", id.0),
        },
        ExpressionNode::And { children } => render_children(children, "AND", catalog, depth),
        ExpressionNode::Or { children } => render_children(children, "OR", catalog, depth),
    }
}

fn render_children(
    children: &[ExpressionNode],
    keyword: &str,
    catalog: &ProxyCatalog,
    depth: usize,
) -> String {
    let joined = children
        .iter()
        .map(|child| render_node(child, catalog, depth + 1))
        .join(&format!(" {keyword} "));
    if depth > 0 {
        format!("({joined})")
    } else {
        joined
    }
}
