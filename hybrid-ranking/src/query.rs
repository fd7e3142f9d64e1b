use crate::error::{RankingError, Result};
use crate::score::ScoreKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Query syntax used for the lexical request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextSearchMode {
    /// Simple keyword syntax
    #[default]
    Simple,
    /// Full query syntax, matching any term
    Full,
}

/// Whether a lexical match needs any or all of the query terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermMatchMode {
    Any,
    All,
}

impl TextSearchMode {
    /// Term matching sent alongside the syntax. `None` leaves the index default.
    pub fn term_match(self) -> Option<TermMatchMode> {
        match self {
            TextSearchMode::Simple => None,
            TextSearchMode::Full => Some(TermMatchMode::Any),
        }
    }
}

/// How lexical hits are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextRankingMode {
    /// By the lexical relevance score
    Bm25,
    /// By the semantic reranker score
    Semantic,
}

/// How the similarity request is executed by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorSearchMode {
    /// Approximate nearest neighbours
    Approximate,
    /// Exhaustive search over every vector
    Exact,
}

/// Similarity measure the index applies to vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VectorRankingMode {
    #[default]
    Cosine,
}

/// How ranked lists are combined into the final ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FusionPolicy {
    /// Pass a single source through unchanged
    Identity,
    /// Sort the union of all hits by one named score
    ScoreDescending(ScoreKind),
    /// Sum of `1 / (k + rank)` over every source
    ReciprocalRankFusion,
    /// Sort the union of all hits by the semantic reranker score
    SemanticRerank,
}

impl fmt::Display for TextSearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextSearchMode::Simple => f.write_str("simple"),
            TextSearchMode::Full => f.write_str("full"),
        }
    }
}

impl fmt::Display for TextRankingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextRankingMode::Bm25 => f.write_str("bm25"),
            TextRankingMode::Semantic => f.write_str("semantic"),
        }
    }
}

impl fmt::Display for VectorSearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorSearchMode::Approximate => f.write_str("approximate"),
            VectorSearchMode::Exact => f.write_str("exact"),
        }
    }
}

impl fmt::Display for FusionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionPolicy::Identity => f.write_str("identity"),
            FusionPolicy::ScoreDescending(kind) => write!(f, "score:{kind}"),
            FusionPolicy::ReciprocalRankFusion => f.write_str("rrf"),
            FusionPolicy::SemanticRerank => f.write_str("semantic_rerank"),
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace('-', "_")
}

impl FromStr for TextSearchMode {
    type Err = RankingError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "simple" => Ok(TextSearchMode::Simple),
            "full" => Ok(TextSearchMode::Full),
            other => Err(RankingError::InvalidStrategy(format!(
                "unknown text search mode '{other}'"
            ))),
        }
    }
}

impl FromStr for TextRankingMode {
    type Err = RankingError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "bm25" => Ok(TextRankingMode::Bm25),
            "semantic" => Ok(TextRankingMode::Semantic),
            other => Err(RankingError::InvalidStrategy(format!(
                "unknown text ranking mode '{other}'"
            ))),
        }
    }
}

impl FromStr for VectorSearchMode {
    type Err = RankingError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "approximate" | "ann" => Ok(VectorSearchMode::Approximate),
            "exact" | "exhaustive" => Ok(VectorSearchMode::Exact),
            other => Err(RankingError::InvalidStrategy(format!(
                "unknown vector search mode '{other}'"
            ))),
        }
    }
}

impl FromStr for VectorRankingMode {
    type Err = RankingError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "cosine" => Ok(VectorRankingMode::Cosine),
            other => Err(RankingError::InvalidStrategy(format!(
                "unknown vector ranking mode '{other}'"
            ))),
        }
    }
}

impl FromStr for FusionPolicy {
    type Err = RankingError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = normalize(s);
        if let Some(kind) = normalized.strip_prefix("score:") {
            return Ok(FusionPolicy::ScoreDescending(kind.parse()?));
        }
        match normalized.as_str() {
            "identity" | "none" => Ok(FusionPolicy::Identity),
            "rrf" | "reciprocal_rank_fusion" => Ok(FusionPolicy::ReciprocalRankFusion),
            "semantic" | "semantic_rerank" => Ok(FusionPolicy::SemanticRerank),
            other => Err(RankingError::InvalidStrategy(format!(
                "unknown fusion policy '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for FusionPolicy {
    type Error = RankingError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FusionPolicy> for String {
    fn from(policy: FusionPolicy) -> Self {
        policy.to_string()
    }
}

/// Immutable description of one search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Lexical query. Blank text counts as absent.
    #[serde(default)]
    pub text: Option<String>,

    /// Query embedding. An empty vector counts as absent.
    #[serde(default)]
    pub vector: Option<Vec<f32>>,

    /// Fields to return with each hit (empty = service default)
    #[serde(default)]
    pub fields: Vec<String>,

    /// Number of hits returned after fusion
    pub limit: usize,

    /// Number of candidates requested per modality
    pub neighbors: usize,

    pub text_search: TextSearchMode,
    pub text_ranking: TextRankingMode,
    pub vector_search: VectorSearchMode,
    #[serde(default)]
    pub vector_ranking: VectorRankingMode,
    pub fusion: FusionPolicy,

    /// Embed `text` to obtain the query vector when `vector` is absent
    #[serde(default)]
    pub vector_from_text: bool,
}

impl QuerySpec {
    /// Pure lexical query: simple syntax, passed through unchanged.
    pub fn text(text: impl Into<String>, ranking: TextRankingMode, limit: usize) -> Self {
        Self {
            text: Some(text.into()),
            vector: None,
            fields: Vec::new(),
            limit,
            neighbors: limit,
            text_search: TextSearchMode::Simple,
            text_ranking: ranking,
            vector_search: VectorSearchMode::Approximate,
            vector_ranking: VectorRankingMode::Cosine,
            fusion: FusionPolicy::Identity,
            vector_from_text: false,
        }
    }

    /// Pure vector query, passed through unchanged.
    pub fn vector(vector: Vec<f32>, search: VectorSearchMode, limit: usize) -> Self {
        Self {
            text: None,
            vector: Some(vector),
            fields: Vec::new(),
            limit,
            neighbors: limit,
            text_search: TextSearchMode::Simple,
            text_ranking: TextRankingMode::Bm25,
            vector_search: search,
            vector_ranking: VectorRankingMode::Cosine,
            fusion: FusionPolicy::Identity,
            vector_from_text: false,
        }
    }

    /// Lexical (BM25) plus approximate vector query combined by `fusion`.
    pub fn hybrid(
        text: impl Into<String>,
        vector: Vec<f32>,
        fusion: FusionPolicy,
        limit: usize,
    ) -> Self {
        Self {
            text: Some(text.into()),
            vector: Some(vector),
            fields: Vec::new(),
            limit,
            neighbors: limit,
            text_search: TextSearchMode::Simple,
            text_ranking: TextRankingMode::Bm25,
            vector_search: VectorSearchMode::Approximate,
            vector_ranking: VectorRankingMode::Cosine,
            fusion,
            vector_from_text: false,
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_neighbors(mut self, neighbors: usize) -> Self {
        self.neighbors = neighbors;
        self
    }

    pub fn with_text_search(mut self, mode: TextSearchMode) -> Self {
        self.text_search = mode;
        self
    }

    pub fn with_text_ranking(mut self, mode: TextRankingMode) -> Self {
        self.text_ranking = mode;
        self
    }

    pub fn with_vector_search(mut self, mode: VectorSearchMode) -> Self {
        self.vector_search = mode;
        self
    }

    pub fn with_fusion(mut self, fusion: FusionPolicy) -> Self {
        self.fusion = fusion;
        self
    }

    /// Derive the query vector from the text through the embedding provider.
    pub fn with_vector_from_text(mut self) -> Self {
        self.vector_from_text = true;
        self
    }

    /// The lexical query, if any non-blank text was given
    pub fn query_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// The explicit query vector, if a non-empty one was given
    pub fn query_vector(&self) -> Option<&[f32]> {
        self.vector.as_deref().filter(|vector| !vector.is_empty())
    }

    pub fn wants_text(&self) -> bool {
        self.query_text().is_some()
    }

    pub fn wants_vector(&self) -> bool {
        self.query_vector().is_some() || (self.vector_from_text && self.wants_text())
    }

    /// Whether ranking or fusion reads the semantic reranker score, so the
    /// lexical request must ask the index for it.
    pub fn needs_semantic_scores(&self) -> bool {
        self.text_ranking == TextRankingMode::Semantic
            || matches!(
                self.fusion,
                FusionPolicy::SemanticRerank | FusionPolicy::ScoreDescending(ScoreKind::SemanticRerank)
            )
    }

    /// Check the request before anything is sent to the index.
    pub fn validate(&self) -> Result<()> {
        if self.vector_from_text && self.query_text().is_none() {
            return Err(RankingError::InvalidQuerySpec(
                "vector_from_text requires query text".to_string(),
            ));
        }

        if !self.wants_text() && !self.wants_vector() {
            return Err(RankingError::InvalidQuerySpec(
                "at least one of text or vector must be provided".to_string(),
            ));
        }

        if self.limit == 0 {
            return Err(RankingError::InvalidQuerySpec(
                "limit must be > 0".to_string(),
            ));
        }

        if self.neighbors < self.limit {
            return Err(RankingError::InvalidQuerySpec(format!(
                "neighbors ({}) cannot be less than limit ({})",
                self.neighbors, self.limit
            )));
        }

        if self
            .query_vector()
            .is_some_and(|vector| vector.iter().any(|component| !component.is_finite()))
        {
            return Err(RankingError::InvalidQuerySpec(
                "query vector contains non-finite components".to_string(),
            ));
        }

        if self.fields.iter().any(|field| field.trim().is_empty()) {
            return Err(RankingError::InvalidQuerySpec(
                "field names must not be blank".to_string(),
            ));
        }

        if self.fusion == FusionPolicy::Identity && self.wants_text() && self.wants_vector() {
            return Err(RankingError::InvalidStrategy(
                "identity fusion requires exactly one of text or vector".to_string(),
            ));
        }

        if self.needs_semantic_scores() && !self.wants_text() {
            return Err(RankingError::InvalidStrategy(format!(
                "{} fusion needs reranker scores, which only a text query provides",
                self.fusion
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_requires_text_or_vector() {
        let mut spec = QuerySpec::text("   ", TextRankingMode::Bm25, 5);
        assert!(matches!(
            spec.validate(),
            Err(RankingError::InvalidQuerySpec(_))
        ));

        spec.text = None;
        spec.vector = Some(Vec::new());
        assert!(matches!(
            spec.validate(),
            Err(RankingError::InvalidQuerySpec(_))
        ));
    }

    #[test]
    fn test_limit_and_neighbors_validation() {
        let spec = QuerySpec::text("rust", TextRankingMode::Bm25, 0);
        assert!(spec.validate().is_err());

        let spec = QuerySpec::text("rust", TextRankingMode::Bm25, 10).with_neighbors(5);
        assert!(spec.validate().is_err());

        let spec = QuerySpec::text("rust", TextRankingMode::Bm25, 10).with_neighbors(50);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_finite_vector() {
        let spec = QuerySpec::vector(vec![0.1, f32::NAN], VectorSearchMode::Exact, 3);
        assert!(matches!(
            spec.validate(),
            Err(RankingError::InvalidQuerySpec(_))
        ));
    }

    #[test]
    fn test_identity_with_two_modalities_is_invalid_strategy() {
        let spec = QuerySpec::hybrid("rust", vec![0.5], FusionPolicy::Identity, 3);
        assert!(matches!(
            spec.validate(),
            Err(RankingError::InvalidStrategy(_))
        ));
    }

    #[test]
    fn test_semantic_score_fusion_needs_text() {
        let spec = QuerySpec::hybrid("rust", vec![0.5], FusionPolicy::SemanticRerank, 3);
        assert!(spec.needs_semantic_scores());
        assert!(spec.validate().is_ok());

        let spec = QuerySpec::vector(vec![0.5], VectorSearchMode::Approximate, 3)
            .with_fusion(FusionPolicy::ScoreDescending(ScoreKind::SemanticRerank));
        assert!(matches!(
            spec.validate(),
            Err(RankingError::InvalidStrategy(_))
        ));

        let spec = QuerySpec::hybrid("rust", vec![0.5], FusionPolicy::ReciprocalRankFusion, 3);
        assert!(!spec.needs_semantic_scores());
    }

    #[test]
    fn test_vector_from_text() {
        let spec = QuerySpec::text("rust", TextRankingMode::Bm25, 3)
            .with_vector_from_text()
            .with_fusion(FusionPolicy::ReciprocalRankFusion);
        assert!(spec.wants_vector());
        assert!(spec.validate().is_ok());

        let mut spec = spec;
        spec.text = None;
        spec.vector = Some(vec![0.1]);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_fusion_policy_parsing() {
        assert_eq!(
            "RRF".parse::<FusionPolicy>().unwrap(),
            FusionPolicy::ReciprocalRankFusion
        );
        assert_eq!(
            "score:vector".parse::<FusionPolicy>().unwrap(),
            FusionPolicy::ScoreDescending(ScoreKind::Vector)
        );
        assert_eq!(
            "semantic-rerank".parse::<FusionPolicy>().unwrap(),
            FusionPolicy::SemanticRerank
        );
        assert!(matches!(
            "borda".parse::<FusionPolicy>(),
            Err(RankingError::InvalidStrategy(_))
        ));
        assert!("score:pagerank".parse::<FusionPolicy>().is_err());
    }

    #[test]
    fn test_mode_parsing_rejects_unknown_values() {
        assert_eq!(
            "exhaustive".parse::<VectorSearchMode>().unwrap(),
            VectorSearchMode::Exact
        );
        assert_eq!("full".parse::<TextSearchMode>().unwrap(), TextSearchMode::Full);
        assert!(matches!(
            "tfidf".parse::<TextRankingMode>(),
            Err(RankingError::InvalidStrategy(_))
        ));
        assert!(matches!(
            "euclidean".parse::<VectorRankingMode>(),
            Err(RankingError::InvalidStrategy(_))
        ));
    }

    #[test]
    fn test_spec_serde_round_trip_uses_policy_names() {
        let spec = QuerySpec::hybrid("rust", vec![0.5], FusionPolicy::ReciprocalRankFusion, 3);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["fusion"], "rrf");

        let bad = serde_json::json!({
            "limit": 3,
            "neighbors": 3,
            "text_search": "simple",
            "text_ranking": "bm25",
            "vector_search": "approximate",
            "fusion": "borda",
        });
        assert!(serde_json::from_value::<QuerySpec>(bad).is_err());
    }
}
