use crate::catalog::{ProxyCatalog, ProxyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};
use tracing::warn;

#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub u64);

impl Display for OrganizationId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "organization({})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Manual,
    Automatic,
    Mixed,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
    Modified,
}

/// A fact, produced by the scraping/matching subsystem, stating whether a
/// proxy was found in an organization's content.
///
/// The underlying fact is immutable once recorded; human review only layers
/// a verification status and an optional corrected value on top of it.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ProxyMatch {
    pub organization: OrganizationId,
    pub proxy: ProxyId,
    pub found: bool,
    pub confidence: f64,
    pub source_urls: Vec<String>,
    pub fragments: Vec<String>,
    pub recorded_at: DateTime<Utc>,
    pub source: MatchSource,
    pub status: VerificationStatus,
    pub corrected_value: Option<bool>,
    pub verified_by: Option<String>,
    pub notes: Option<String>,
}

impl ProxyMatch {
    pub fn new(organization: OrganizationId, proxy: ProxyId, found: bool) -> Self {
        Self {
            organization,
            proxy,
            found,
            confidence: 1.0,
            source_urls: Vec::new(),
            fragments: Vec::new(),
            recorded_at: Utc::now(),
            source: MatchSource::Automatic,
            status: VerificationStatus::Pending,
            corrected_value: None,
            verified_by: None,
            notes: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_evidence(mut self, url: &str, fragment: &str) -> Self {
        self.source_urls.push(url.to_owned());
        self.fragments.push(fragment.to_owned());
        self
    }

    pub fn verify(&mut self, by: &str) {
        self.status = VerificationStatus::Verified;
        self.verified_by = Some(by.to_owned());
    }

    pub fn reject(&mut self, by: &str) {
        self.status = VerificationStatus::Rejected;
        self.verified_by = Some(by.to_owned());
    }

    pub fn correct(&mut self, value: bool, by: &str) {
        self.status = VerificationStatus::Modified;
        self.corrected_value = Some(value);
        self.verified_by = Some(by.to_owned());
        self.source = MatchSource::Mixed;
    }

    /// The value evaluation should use: the human correction when one was
    /// recorded, `false` for rejected matches, the raw fact otherwise.
    pub fn effective_value(&self) -> bool {
        match self.status {
            VerificationStatus::Rejected => false,
            VerificationStatus::Verified | VerificationStatus::Modified => {
                self.corrected_value.unwrap_or(self.found)
            }
            VerificationStatus::Pending => self.found,
        }
    }
}

/// The evaluator's only window into the world. `None` means no match fact
/// exists for the pair, which evaluation coerces to "not found".
pub trait MatchLookup {
    fn effective(&self, organization: OrganizationId, proxy: ProxyId) -> Option<bool>;
}

/// In-memory proxy-match store keyed by (organization, proxy).
#[derive(Clone, Debug, Default)]
pub struct MatchStore {
    by_pair: HashMap<(OrganizationId, ProxyId), ProxyMatch>,
}

impl MatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a match fact, replacing any previous fact for the same pair.
    pub fn record(&mut self, fact: ProxyMatch) -> Option<ProxyMatch> {
        self.by_pair
            .insert((fact.organization, fact.proxy), fact)
    }

    #[inline]
    pub fn get(&self, organization: OrganizationId, proxy: ProxyId) -> Option<&ProxyMatch> {
        self.by_pair.get(&(organization, proxy))
    }

    #[inline]
    pub fn get_mut(
        &mut self,
        organization: OrganizationId,
        proxy: ProxyId,
    ) -> Option<&mut ProxyMatch> {
        self.by_pair.get_mut(&(organization, proxy))
    }

    pub fn remove(&mut self, organization: OrganizationId, proxy: ProxyId) -> Option<ProxyMatch> {
        self.by_pair.remove(&(organization, proxy))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_pair.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_pair.is_empty()
    }
}

impl MatchLookup for MatchStore {
    fn effective(&self, organization: OrganizationId, proxy: ProxyId) -> Option<bool> {
        self.by_pair
            .get(&(organization, proxy))
            .map(ProxyMatch::effective_value)
    }
}

/// Restricts a lookup to proxies that still exist in the catalog. A leaf
/// referencing a deleted proxy reads as missing data, with a warning, even
/// when a stale match fact is still around, so historical intersections keep
/// evaluating after proxy cleanup.
pub struct CatalogScopedLookup<'a, L> {
    catalog: &'a ProxyCatalog,
    inner: &'a L,
}

impl<'a, L> CatalogScopedLookup<'a, L> {
    pub fn new(catalog: &'a ProxyCatalog, inner: &'a L) -> Self {
        Self { catalog, inner }
    }
}

impl<L: MatchLookup> MatchLookup for CatalogScopedLookup<'_, L> {
    fn effective(&self, organization: OrganizationId, proxy: ProxyId) -> Option<bool> {
        if self.catalog.proxy(proxy).is_none() {
            warn!(%proxy, %organization, "dangling proxy reference evaluates as not found");
            return None;
        }
        self.inner.effective(organization, proxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AN_ORGANIZATION: OrganizationId = OrganizationId(7);
    const A_PROXY: ProxyId = ProxyId(1);

    #[test]
    fn a_pending_match_uses_the_raw_value() {
        let fact = ProxyMatch::new(AN_ORGANIZATION, A_PROXY, true);

        assert!(fact.effective_value());
    }

    #[test]
    fn a_rejected_match_reads_as_not_found() {
        let mut fact = ProxyMatch::new(AN_ORGANIZATION, A_PROXY, true);

        fact.reject("reviewer");

        assert!(!fact.effective_value());
    }

    #[test]
    fn a_corrected_match_uses_the_corrected_value() {
        let mut fact = ProxyMatch::new(AN_ORGANIZATION, A_PROXY, false);

        fact.correct(true, "reviewer");

        assert!(fact.effective_value());
        assert_eq!(MatchSource::Mixed, fact.source);
    }

    #[test]
    fn a_verified_match_without_correction_keeps_the_raw_value() {
        let mut fact = ProxyMatch::new(AN_ORGANIZATION, A_PROXY, true);

        fact.verify("reviewer");

        assert!(fact.effective_value());
        assert_eq!(Some("reviewer".to_owned()), fact.verified_by);
    }

    #[test]
    fn the_store_returns_no_value_for_an_unknown_pair() {
        let store = MatchStore::new();

        assert_eq!(None, store.effective(AN_ORGANIZATION, A_PROXY));
    }

    #[test]
    fn the_store_returns_the_effective_value_for_a_known_pair() {
        let mut store = MatchStore::new();
        store.record(ProxyMatch::new(AN_ORGANIZATION, A_PROXY, true));

        assert_eq!(Some(true), store.effective(AN_ORGANIZATION, A_PROXY));
    }

    #[test]
    fn recording_the_same_pair_twice_replaces_the_fact() {
        let mut store = MatchStore::new();
        store.record(ProxyMatch::new(AN_ORGANIZATION, A_PROXY, true));

        let replaced = store.record(ProxyMatch::new(AN_ORGANIZATION, A_PROXY, false));

        assert!(replaced.is_some());
        assert_eq!(Some(false), store.effective(AN_ORGANIZATION, A_PROXY));
        assert_eq!(1, store.len());
    }

    #[test]
    fn a_correction_through_the_store_changes_the_effective_value() {
        let mut store = MatchStore::new();
        store.record(
            ProxyMatch::new(AN_ORGANIZATION, A_PROXY, false)
                .with_confidence(0.4)
                .with_evidence("https://example.org/about", "trabajo con lideresas"),
        );

        if let Some(fact) = store.get_mut(AN_ORGANIZATION, A_PROXY) {
            fact.correct(true, "reviewer");
        }

        assert_eq!(Some(true), store.effective(AN_ORGANIZATION, A_PROXY));
    }

    #[test]
    fn a_catalog_scoped_lookup_hides_facts_for_deleted_proxies() {
        use crate::catalog::{Proxy, Variable, VariableId};

        let mut catalog = ProxyCatalog::new();
        catalog
            .add_variable(Variable::new(VariableId(1), "Liderazgo Femenino", "LF"))
            .unwrap();
        catalog
            .add_proxy(Proxy::new(A_PROXY, VariableId(1), "lideresa"))
            .unwrap();
        let mut store = MatchStore::new();
        store.record(ProxyMatch::new(AN_ORGANIZATION, A_PROXY, true));

        catalog.remove_proxy(A_PROXY);
        let scoped = CatalogScopedLookup::new(&catalog, &store);

        assert_eq!(Some(true), store.effective(AN_ORGANIZATION, A_PROXY));
        assert_eq!(None, scoped.effective(AN_ORGANIZATION, A_PROXY));
    }
}
