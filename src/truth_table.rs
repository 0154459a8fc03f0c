use crate::{
    ast::ExpressionNode,
    catalog::{ProxyCatalog, VariableId},
    evaluator::EvaluationBatch,
    matches::{CatalogScopedLookup, MatchLookup, OrganizationId},
    registry::{IntersectionDefinition, IntersectionId, IntersectionRegistry, Operator},
};
use itertools::Itertools;
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};
use tracing::warn;

/// One cell of the exported matrix. Unlike evaluation, which coerces missing
/// data to `false`, the exporter keeps "no data" apart from a definite `0`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cell {
    True,
    False,
    Unknown,
}

impl Cell {
    pub fn symbol(&self) -> char {
        match self {
            Self::True => '1',
            Self::False => '0',
            Self::Unknown => '-',
        }
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl Display for Cell {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.symbol())
    }
}

/// A case (organization) to export, with the name used for its row.
#[derive(Clone, Debug, PartialEq)]
pub struct Case {
    pub id: OrganizationId,
    pub name: String,
}

impl Case {
    pub fn new(id: OrganizationId, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
        }
    }
}

/// A condition (column) to export: a registered intersection or a bare
/// variable, expanded per the registry's variable policy.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Condition {
    Intersection(IntersectionId),
    Variable(VariableId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub case: String,
    pub cells: Vec<Cell>,
    /// The concatenated cell symbols in condition order. Cases sharing a
    /// signature are the same configuration.
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    pub signature: String,
    pub count: usize,
    pub cases: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub cases: usize,
    pub conditions: usize,
    pub distinct_configurations: usize,
    /// Filled cells over total cells, in percent.
    pub coverage: f64,
}

/// The (case × condition) matrix, ready for QCA tooling.
#[derive(Clone, Debug, PartialEq)]
pub struct TruthTable {
    conditions: Vec<String>,
    rows: Vec<Row>,
}

impl TruthTable {
    #[inline]
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The distinct configurations, in first-seen row order, each with the
    /// cases that share it.
    pub fn configurations(&self) -> Vec<Configuration> {
        let mut configurations: Vec<Configuration> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for row in &self.rows {
            match positions.get(row.signature.as_str()) {
                Some(position) => {
                    configurations[*position].count += 1;
                    configurations[*position].cases.push(row.case.clone());
                }
                None => {
                    positions.insert(row.signature.as_str(), configurations.len());
                    configurations.push(Configuration {
                        signature: row.signature.clone(),
                        count: 1,
                        cases: vec![row.case.clone()],
                    });
                }
            }
        }
        configurations
    }

    pub fn summary(&self) -> Summary {
        let total = self.rows.len() * self.conditions.len();
        let filled = self
            .rows
            .iter()
            .flat_map(|row| &row.cells)
            .filter(|cell| cell.is_filled())
            .count();
        Summary {
            cases: self.rows.len(),
            conditions: self.conditions.len(),
            distinct_configurations: self.configurations().len(),
            coverage: if total == 0 {
                100.0
            } else {
                100.0 * filled as f64 / total as f64
            },
        }
    }

    /// Serialize to a delimited text document: a header of condition names,
    /// then one row per case with its cell symbols and signature.
    pub fn to_delimited(&self, delimiter: &str) -> String {
        let header = std::iter::once("case")
            .chain(self.conditions.iter().map(String::as_str))
            .chain(std::iter::once("signature"))
            .join(delimiter);

        let mut document = header;
        for row in &self.rows {
            document.push('\n');
            let cells = row.cells.iter().map(Cell::symbol).join(delimiter);
            document.push_str(
                &[row.case.as_str(), cells.as_str(), row.signature.as_str()].join(delimiter),
            );
        }
        document.push('\n');
        document
    }
}

/// Evaluate every (case, condition) pair into a truth table.
///
/// A condition that cannot be materialized (unknown intersection, variable
/// with nothing to expand, structurally invalid persisted tree) degrades to
/// an unknown column with a warning; it never fails the rest of the export.
/// A case with no match data under a condition renders `-`, not `0`.
pub fn export_truth_table(
    catalog: &ProxyCatalog,
    registry: &IntersectionRegistry,
    matches: &impl MatchLookup,
    cases: &[Case],
    conditions: &[Condition],
) -> TruthTable {
    let columns = conditions
        .iter()
        .map(|condition| resolve_condition(condition, catalog, registry))
        .collect::<Vec<_>>();

    let scoped = CatalogScopedLookup::new(catalog, matches);
    let mut batch = EvaluationBatch::new(&scoped);
    let rows = cases
        .iter()
        .map(|case| {
            let cells = conditions
                .iter()
                .zip(&columns)
                .map(|(condition, (_, tree))| {
                    evaluate_cell(&mut batch, condition, tree.as_ref(), case)
                })
                .collect::<Vec<_>>();
            let signature = cells.iter().map(Cell::symbol).collect();
            Row {
                case: case.name.clone(),
                cells,
                signature,
            }
        })
        .collect();

    TruthTable {
        conditions: columns.into_iter().map(|(name, _)| name).collect(),
        rows,
    }
}

fn resolve_condition(
    condition: &Condition,
    catalog: &ProxyCatalog,
    registry: &IntersectionRegistry,
) -> (String, Option<ExpressionNode>) {
    match condition {
        Condition::Intersection(id) => match registry.get(*id) {
            Some(intersection) => (intersection.name.clone(), Some(intersection.tree().clone())),
            None => {
                warn!(%id, "unknown intersection in export; its column degrades to unknown");
                (format!("[Intersection {}]", id.0), None)
            }
        },
        Condition::Variable(id) => {
            let name = catalog
                .variable(*id)
                .map(|variable| variable.name.clone())
                .unwrap_or_else(|| format!("[Variable {}]", id.0));
            let definition = IntersectionDefinition::VariableBased {
                variables: vec![*id],
                operator: Operator::Or,
            };
            match definition.normalize(catalog, registry.config()) {
                Ok(tree) => (name, Some(tree)),
                Err(error) => {
                    warn!(%id, %error, "variable cannot be expanded; its column degrades to unknown");
                    (name, None)
                }
            }
        }
    }
}

fn evaluate_cell<L: MatchLookup>(
    batch: &mut EvaluationBatch<'_, Condition, L>,
    condition: &Condition,
    tree: Option<&ExpressionNode>,
    case: &Case,
) -> Cell {
    let Some(tree) = tree else {
        return Cell::Unknown;
    };
    match batch.evaluate(condition.clone(), tree, case.id) {
        Ok(evaluation) if !evaluation.has_data() => Cell::Unknown,
        Ok(evaluation) if evaluation.value => Cell::True,
        Ok(_) => Cell::False,
        Err(error) => {
            warn!(case = %case.id, %error, "invalid condition tree; cell degrades to unknown");
            Cell::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{Proxy, ProxyId, Variable},
        matches::{MatchStore, ProxyMatch},
    };

    const ORG_1: OrganizationId = OrganizationId(1);
    const ORG_2: OrganizationId = OrganizationId(2);
    const ORG_3: OrganizationId = OrganizationId(3);

    #[test]
    fn three_cases_over_two_conditions_aggregate_into_two_configurations() {
        let (catalog, registry, conditions) = define_conditions();
        let mut store = MatchStore::new();
        // org1=[1,1], org2=[1,0], org3=[1,1]
        store.record(ProxyMatch::new(ORG_1, ProxyId(1), true));
        store.record(ProxyMatch::new(ORG_1, ProxyId(2), true));
        store.record(ProxyMatch::new(ORG_2, ProxyId(1), true));
        store.record(ProxyMatch::new(ORG_2, ProxyId(2), false));
        store.record(ProxyMatch::new(ORG_3, ProxyId(1), true));
        store.record(ProxyMatch::new(ORG_3, ProxyId(2), true));

        let table = export_truth_table(
            &catalog,
            &registry,
            &store,
            &three_cases(),
            &conditions,
        );

        let configurations = table.configurations();
        assert_eq!(2, configurations.len());
        assert_eq!(
            Configuration {
                signature: "11".to_owned(),
                count: 2,
                cases: vec!["Org Uno".to_owned(), "Org Tres".to_owned()],
            },
            configurations[0]
        );
        assert_eq!(
            Configuration {
                signature: "10".to_owned(),
                count: 1,
                cases: vec!["Org Dos".to_owned()],
            },
            configurations[1]
        );

        let summary = table.summary();
        assert_eq!(3, summary.cases);
        assert_eq!(2, summary.conditions);
        assert_eq!(2, summary.distinct_configurations);
        assert_eq!(100.0, summary.coverage);
    }

    #[test]
    fn a_case_without_data_renders_unknown_not_false() {
        let (catalog, registry, conditions) = define_conditions();
        let mut store = MatchStore::new();
        store.record(ProxyMatch::new(ORG_1, ProxyId(1), true));
        store.record(ProxyMatch::new(ORG_1, ProxyId(2), false));
        // ORG_2 has no facts at all.

        let table = export_truth_table(
            &catalog,
            &registry,
            &store,
            &[Case::new(ORG_1, "Org Uno"), Case::new(ORG_2, "Org Dos")],
            &conditions,
        );

        assert_eq!("10", table.rows()[0].signature);
        assert_eq!("--", table.rows()[1].signature);
        assert_eq!(vec![Cell::Unknown, Cell::Unknown], table.rows()[1].cells);
        assert_eq!(50.0, table.summary().coverage);
    }

    #[test]
    fn a_recorded_false_renders_zero_not_unknown() {
        let (catalog, registry, conditions) = define_conditions();
        let mut store = MatchStore::new();
        store.record(ProxyMatch::new(ORG_1, ProxyId(1), false));
        store.record(ProxyMatch::new(ORG_1, ProxyId(2), false));

        let table = export_truth_table(
            &catalog,
            &registry,
            &store,
            &[Case::new(ORG_1, "Org Uno")],
            &conditions,
        );

        assert_eq!("00", table.rows()[0].signature);
    }

    #[test]
    fn an_unknown_intersection_degrades_its_column_only() {
        let (catalog, registry, mut conditions) = define_conditions();
        conditions.push(Condition::Intersection(IntersectionId(42)));
        let mut store = MatchStore::new();
        store.record(ProxyMatch::new(ORG_1, ProxyId(1), true));
        store.record(ProxyMatch::new(ORG_1, ProxyId(2), true));

        let table = export_truth_table(
            &catalog,
            &registry,
            &store,
            &[Case::new(ORG_1, "Org Uno")],
            &conditions,
        );

        assert_eq!("11-", table.rows()[0].signature);
        assert_eq!("[Intersection 42]", table.conditions()[2]);
    }

    #[test]
    fn a_variable_without_proxies_degrades_its_column_only() {
        let (mut catalog, registry, mut conditions) = define_conditions();
        catalog
            .add_variable(Variable::new(VariableId(9), "Sin proxies", "SP"))
            .unwrap();
        conditions.push(Condition::Variable(VariableId(9)));
        let mut store = MatchStore::new();
        store.record(ProxyMatch::new(ORG_1, ProxyId(1), true));
        store.record(ProxyMatch::new(ORG_1, ProxyId(2), true));

        let table = export_truth_table(
            &catalog,
            &registry,
            &store,
            &[Case::new(ORG_1, "Org Uno")],
            &conditions,
        );

        assert_eq!("11-", table.rows()[0].signature);
        assert_eq!("Sin proxies", table.conditions()[2]);
    }

    #[test]
    fn a_variable_condition_expands_to_its_proxies() {
        let (catalog, registry, _) = define_conditions();
        let conditions = vec![Condition::Variable(VariableId(1))];
        let mut store = MatchStore::new();
        store.record(ProxyMatch::new(ORG_1, ProxyId(1), true));

        let table = export_truth_table(
            &catalog,
            &registry,
            &store,
            &[Case::new(ORG_1, "Org Uno")],
            &conditions,
        );

        assert_eq!("Acceso a Mercados", table.conditions()[0]);
        assert_eq!("1", table.rows()[0].signature);
    }

    #[test]
    fn serialize_to_a_delimited_document() {
        let (catalog, registry, conditions) = define_conditions();
        let mut store = MatchStore::new();
        store.record(ProxyMatch::new(ORG_1, ProxyId(1), true));
        store.record(ProxyMatch::new(ORG_1, ProxyId(2), false));
        store.record(ProxyMatch::new(ORG_2, ProxyId(1), true));

        let table = export_truth_table(
            &catalog,
            &registry,
            &store,
            &[Case::new(ORG_1, "Org Uno"), Case::new(ORG_2, "Org Dos")],
            &conditions,
        );

        assert_eq!(
            "case;Mercados;Liderazgo;signature\n\
             Org Uno;1;0;10\n\
             Org Dos;1;-;1-\n",
            table.to_delimited(";")
        );
    }

    #[test]
    fn an_empty_export_serializes_to_a_bare_header() {
        let (catalog, registry, conditions) = define_conditions();
        let store = MatchStore::new();

        let table = export_truth_table(&catalog, &registry, &store, &[], &conditions);

        assert_eq!("case;Mercados;Liderazgo;signature\n", table.to_delimited(";"));
        assert_eq!(100.0, table.summary().coverage);
    }

    fn define_conditions() -> (ProxyCatalog, IntersectionRegistry, Vec<Condition>) {
        let mut catalog = ProxyCatalog::new();
        catalog
            .add_variable(Variable::new(VariableId(1), "Acceso a Mercados", "AM"))
            .unwrap();
        catalog
            .add_variable(Variable::new(VariableId(2), "Liderazgo Femenino", "LF"))
            .unwrap();
        catalog
            .add_proxy(Proxy::new(ProxyId(1), VariableId(1), "Existen mercados"))
            .unwrap();
        catalog
            .add_proxy(Proxy::new(ProxyId(2), VariableId(2), "lideresa"))
            .unwrap();

        let mut registry = IntersectionRegistry::new();
        let mercados = registry
            .create(
                &catalog,
                "Mercados",
                None,
                IntersectionDefinition::ProxySimple {
                    proxies: vec![ProxyId(1)],
                    operator: Operator::Or,
                },
            )
            .unwrap();
        let liderazgo = registry
            .create(
                &catalog,
                "Liderazgo",
                None,
                IntersectionDefinition::ProxySimple {
                    proxies: vec![ProxyId(2)],
                    operator: Operator::Or,
                },
            )
            .unwrap();

        let conditions = vec![
            Condition::Intersection(mercados),
            Condition::Intersection(liderazgo),
        ];
        (catalog, registry, conditions)
    }

    fn three_cases() -> Vec<Case> {
        vec![
            Case::new(ORG_1, "Org Uno"),
            Case::new(ORG_2, "Org Dos"),
            Case::new(ORG_3, "Org Tres"),
        ]
    }
}
