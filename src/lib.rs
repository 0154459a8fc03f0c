//! A boolean intersection engine for qualitative comparative analysis:
//! combine binary text-match indicators ("proxies") into named logical
//! conditions, evaluate them per organization, and export the resulting
//! indicator matrix as a QCA/Tosmana-compatible truth table.
//!
//! # Examples
//!
//! From proxy definitions to an evaluated truth table:
//!
//! ```
//! use venn_logic::{
//!     export_truth_table, Case, Condition, IntersectionRegistry, MatchStore, OrganizationId,
//!     Proxy, ProxyCatalog, ProxyId, ProxyMatch, Variable, VariableId,
//! };
//!
//! // Variables and the proxy search terms that stand in for them.
//! let mut catalog = ProxyCatalog::new();
//! catalog
//!     .add_variable(Variable::new(VariableId(1), "Condiciones de Mercado", "CM"))
//!     .unwrap();
//! catalog
//!     .add_proxy(Proxy::new(ProxyId(1), VariableId(1), "Existen mercados"))
//!     .unwrap();
//! catalog
//!     .add_proxy(Proxy::new(ProxyId(2), VariableId(1), "La propiedad"))
//!     .unwrap();
//!
//! // Match facts produced by the scraping subsystem.
//! let mut store = MatchStore::new();
//! let organization = OrganizationId(7);
//! store.record(ProxyMatch::new(organization, ProxyId(1), true));
//! store.record(ProxyMatch::new(organization, ProxyId(2), false));
//!
//! // Parse a textual expression into a named, persisted intersection. The
//! // resolved proxies come back so a caller can confirm what each quoted
//! // fragment ended up referring to.
//! let mut registry = IntersectionRegistry::new();
//! let (id, resolved) = registry
//!     .create_from_text(&catalog, "Mercado activo", None, r#""mercados" OR "propiedad""#)
//!     .unwrap();
//! assert_eq!(2, resolved.len());
//!
//! // Evaluate it for one organization.
//! let result = registry.evaluate(&catalog, id, organization, &store).unwrap();
//! assert!(result.value);
//! assert_eq!(vec![ProxyId(1)], result.matched_proxy_ids);
//!
//! // Export a truth table for downstream QCA tooling.
//! let table = export_truth_table(
//!     &catalog,
//!     &registry,
//!     &store,
//!     &[Case::new(organization, "Org Uno")],
//!     &[Condition::Intersection(id)],
//! );
//! assert_eq!("1", table.rows()[0].signature);
//! ```
//!
//! # Expression language
//!
//! Intersections can be written as text: double-quoted fragments name
//! proxies by (a substring of) their search term, combined with
//! case-insensitive `AND`/`OR` and grouped with parentheses, `AND` binding
//! tighter than `OR`:
//!
//! ```text
//! "Existen mercados" OR "La propiedad" OR ("Procesos civiles" AND "Planes de desarrollo")
//! ```
//!
//! Parsed expressions persist as JSON trees (`{"type":"proxy","id":1}`,
//! `{"type":"AND"|"OR","children":[...]}`) that round-trip structurally.
//! Two legacy intersection modes — a flat proxy list with a single operator,
//! and a variable list expanding to each variable's proxies — normalize to
//! the same tree form before evaluation.
//!
//! # Evaluation semantics
//!
//! A proxy leaf reads the effective match value for the organization, where
//! human corrections override the raw scraped fact. Missing facts and
//! references to since-deleted proxies evaluate as "not found" rather than
//! erroring, so historical intersections stay usable; the truth-table
//! exporter still reports such cells as unknown (`-`) instead of `0`.
mod ast;
mod catalog;
mod config;
mod error;
mod evaluator;
mod lexer;
mod matches;
mod parser;
mod registry;
#[cfg(test)]
mod test_utils;
mod truth_table;

pub use crate::{
    ast::ExpressionNode,
    catalog::{
        CatalogError, MatchKind, Proxy, ProxyCatalog, ProxyId, ProxyResolver, Variable, VariableId,
    },
    config::{EngineConfig, VariablePolicy},
    error::{ExpressionError, ParseError},
    evaluator::{evaluate, Evaluation, EvaluationBatch, LeafOutcome},
    lexer::LexicalError,
    matches::{
        CatalogScopedLookup, MatchLookup, MatchSource, MatchStore, OrganizationId, ProxyMatch,
        VerificationStatus,
    },
    parser::{parse, ParseOutcome, ResolvedProxy},
    registry::{
        Intersection, IntersectionDefinition, IntersectionId, IntersectionMode, IntersectionRecord,
        IntersectionRegistry, IntersectionResult, Operator, RegistryError,
    },
    truth_table::{
        export_truth_table, Case, Cell, Condition, Configuration, Row, Summary, TruthTable,
    },
};
