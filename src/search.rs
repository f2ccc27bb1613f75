//! Search coordination.
//!
//! Every query or mode change supersedes the previous request. A request
//! is started with [`SearchCoordinator::begin`], which does the cheap
//! in-process work and returns a [`SearchPlan`] for the collaborator calls.
//! The plan may run anywhere; its outcome is applied with
//! [`SearchCoordinator::complete`] only if no newer request was made.

use serde::{Deserialize, Serialize};

use crate::{expansion::Expanders, photos::PhotoStore, semantic::SemanticSearchService};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    LocalVector,
    CloudExpansion,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::LocalVector => write!(f, "local_vector"),
            SearchMode::CloudExpansion => write!(f, "cloud_expansion"),
        }
    }
}

/// Ticket for one search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchRequest {
    pub seq: u64,
    /// Whether the query feeds the personalization context.
    pub learn: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub mode: SearchMode,
    pub photo_ids: Vec<String>,
    pub active_tags: Vec<String>,
}

/// Collaborator work left for a request after [`SearchCoordinator::begin`].
#[derive(Debug, Clone)]
pub struct SearchPlan {
    seq: u64,
    query: String,
    mode: SearchMode,
    /// Local mode only: ids ranked by the vector index.
    ranked: Vec<String>,
}

impl SearchPlan {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Runs the expansion call. May block on the network.
    pub fn execute(self, expanders: &Expanders) -> SearchOutcome {
        let keywords = match self.mode {
            SearchMode::LocalVector => expanders.expand_local(&self.query),
            SearchMode::CloudExpansion => expanders.expand_cloud(&self.query),
        };

        SearchOutcome {
            seq: self.seq,
            query: self.query,
            mode: self.mode,
            ranked: self.ranked,
            keywords,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    seq: u64,
    query: String,
    mode: SearchMode,
    ranked: Vec<String>,
    keywords: Vec<String>,
}

impl SearchOutcome {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

pub struct SearchCoordinator {
    mode: SearchMode,
    query: String,
    seq: u64,
    results: SearchResults,
}

impl SearchCoordinator {
    pub fn new(mode: SearchMode) -> Self {
        Self {
            mode,
            query: String::new(),
            seq: 0,
            results: SearchResults {
                mode,
                ..Default::default()
            },
        }
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Sequence number of the latest request.
    pub fn latest(&self) -> u64 {
        self.seq
    }

    fn next_request(&mut self, learn: bool) -> SearchRequest {
        self.seq += 1;
        SearchRequest {
            seq: self.seq,
            learn,
        }
    }

    pub fn set_query(&mut self, text: &str) -> SearchRequest {
        self.query = text.to_string();
        self.next_request(true)
    }

    /// Switches mode without running a search.
    pub fn set_mode(&mut self, mode: SearchMode) -> SearchRequest {
        self.mode = mode;
        self.next_request(true)
    }

    /// Re-runs the current query after the index changed.
    pub fn refresh(&mut self) -> SearchRequest {
        self.next_request(false)
    }

    pub fn begin(
        &mut self,
        request: SearchRequest,
        store: &PhotoStore,
        semantic: &mut SemanticSearchService,
    ) -> Option<SearchPlan> {
        if request.seq != self.seq {
            log::debug!("search #{} superseded by #{}", request.seq, self.seq);
            return None;
        }

        let query = self.query.trim().to_string();
        if query.is_empty() {
            self.results = SearchResults {
                query: String::new(),
                mode: self.mode,
                photo_ids: store.ids(),
                active_tags: vec![],
            };
            return None;
        }

        let ranked = match self.mode {
            SearchMode::LocalVector => {
                let ranked = semantic.search(&query);
                if request.learn {
                    semantic.learn(&query);
                }
                ranked
            }
            SearchMode::CloudExpansion => vec![],
        };

        log::debug!("search #{} {:?} in {}", request.seq, query, self.mode);

        Some(SearchPlan {
            seq: request.seq,
            query,
            mode: self.mode,
            ranked,
        })
    }

    /// Applies an outcome. Returns false when the outcome is stale.
    pub fn complete(&mut self, outcome: SearchOutcome, store: &PhotoStore) -> bool {
        if outcome.seq != self.seq {
            log::info!(
                "discarding stale search #{} for {:?}, latest is #{}",
                outcome.seq,
                outcome.query,
                self.seq
            );
            return false;
        }

        let photo_ids = match outcome.mode {
            SearchMode::LocalVector => outcome
                .ranked
                .into_iter()
                .filter(|id| store.contains(id))
                .collect(),
            SearchMode::CloudExpansion => {
                let keywords: Vec<String> = outcome
                    .keywords
                    .iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();

                store
                    .iter()
                    .filter(|photo| {
                        let haystack = photo.keyword_haystack();
                        keywords.iter().any(|k| haystack.contains(k.as_str()))
                    })
                    .map(|photo| photo.id.clone())
                    .collect()
            }
        };

        self.results = SearchResults {
            query: outcome.query,
            mode: outcome.mode,
            photo_ids,
            active_tags: outcome.keywords,
        };

        true
    }

    /// Begin, execute and complete in one go.
    pub fn run_blocking(
        &mut self,
        request: SearchRequest,
        store: &PhotoStore,
        semantic: &mut SemanticSearchService,
        expanders: &Expanders,
    ) -> bool {
        match self.begin(request, store, semantic) {
            Some(plan) => {
                let outcome = plan.execute(expanders);
                self.complete(outcome, store)
            }
            None => request.seq == self.seq,
        }
    }

    /// Current results. An empty query always shows the whole store.
    pub fn results(&self, store: &PhotoStore) -> SearchResults {
        if self.query.trim().is_empty() {
            return SearchResults {
                query: String::new(),
                mode: self.mode,
                photo_ids: store.ids(),
                active_tags: vec![],
            };
        }

        self.results.clone()
    }
}
