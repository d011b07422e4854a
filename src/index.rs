//! Search index schema and client.
//!
//! [`index_definition`] builds the declarative schema (fields, HNSW vector
//! search, semantic configuration) as typed values serialized to the
//! Azure AI Search REST format. [`SearchIndex`] is the seam between the
//! upsert pipeline and the service; [`AzureSearchIndex`] implements it
//! over `reqwest::blocking`.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | create/update schema | `PUT {endpoint}/indexes/{name}?api-version=...` |
//! | upload documents | `POST {endpoint}/indexes/{name}/docs/index?api-version=...` |
//! | delete index | `DELETE {endpoint}/indexes/{name}?api-version=...` |

use serde::Serialize;

use crate::config::SearchConfig;
use crate::embedding::REQUEST_TIMEOUT;
use crate::error::IndexServiceError;
use crate::models::{IndexAction, IndexDocument, SearchAction};

/// Name of the HNSW algorithm configuration.
pub const HNSW_ALGORITHM: &str = "hnsw";
/// Vector profile referenced by `content_vector`.
pub const VECTOR_PROFILE: &str = "vprofile";

/// Fields prioritized as keywords by the semantic ranker.
const SEMANTIC_KEYWORD_FIELDS: &[&str] = &[
    "assunto",
    "area_interesse",
    "conhecimento",
    "norma_tipo",
    "orgao_emissor",
    "ano_letivo",
    "fase_processo",
    "programa",
    "publico_alvo",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<Field>,
    pub vector_search: VectorSearch,
    pub semantic: Semantic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub key: bool,
    pub searchable: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub filterable: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub facetable: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sortable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_search_profile: Option<&'static str>,
}

impl Field {
    fn new(name: &'static str, field_type: &'static str) -> Self {
        Self {
            name,
            field_type,
            key: false,
            searchable: false,
            filterable: false,
            facetable: false,
            sortable: false,
            analyzer: None,
            dimensions: None,
            vector_search_profile: None,
        }
    }

    fn string(name: &'static str) -> Self {
        Self::new(name, "Edm.String")
    }

    /// Filterable and facetable string.
    fn facet(name: &'static str) -> Self {
        Self {
            filterable: true,
            facetable: true,
            ..Self::string(name)
        }
    }

    fn date(name: &'static str) -> Self {
        Self {
            filterable: true,
            sortable: true,
            ..Self::new(name, "Edm.DateTimeOffset")
        }
    }

    fn full_text(name: &'static str, analyzer: &str) -> Self {
        Self {
            searchable: true,
            analyzer: Some(analyzer.to_string()),
            ..Self::string(name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorSearch {
    pub algorithms: Vec<NamedAlgorithm>,
    pub profiles: Vec<VectorProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedAlgorithm {
    pub name: &'static str,
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorProfile {
    pub name: &'static str,
    pub algorithm: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Semantic {
    pub configurations: Vec<SemanticConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticConfiguration {
    pub name: String,
    pub prioritized_fields: PrioritizedFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizedFields {
    pub title_field: FieldRef,
    pub prioritized_content_fields: Vec<FieldRef>,
    pub prioritized_keywords_fields: Vec<FieldRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRef {
    pub field_name: &'static str,
}

/// The knowledge-base index schema.
pub fn index_definition(
    name: &str,
    dimensions: usize,
    analyzer: &str,
    semantic_configuration: &str,
) -> IndexDefinition {
    let fields = vec![
        Field {
            key: true,
            ..Field::string("id")
        },
        Field::full_text("text", analyzer),
        Field {
            searchable: true,
            dimensions: Some(dimensions),
            vector_search_profile: Some(VECTOR_PROFILE),
            ..Field::new("content_vector", "Collection(Edm.Single)")
        },
        Field {
            filterable: true,
            ..Field::new("chunk", "Edm.Int32")
        },
        Field::full_text("doc_title", analyzer),
        Field {
            filterable: true,
            ..Field::string("source_file")
        },
        Field::facet("assunto"),
        Field::facet("area_interesse"),
        Field::facet("conhecimento"),
        Field::facet("norma_tipo"),
        Field::facet("orgao_emissor"),
        Field::date("data_publicacao"),
        Field::facet("ano_letivo"),
        Field::facet("fase_processo"),
        Field::facet("programa"),
        Field::facet("publico_alvo"),
        Field::date("prazo_inicio"),
        Field::date("prazo_fim"),
        Field {
            filterable: true,
            facetable: true,
            ..Field::new("referencias_legais", "Collection(Edm.String)")
        },
        Field {
            filterable: true,
            ..Field::new("updated_at", "Edm.DateTimeOffset")
        },
        Field::string("id_original"),
    ];

    IndexDefinition {
        name: name.to_string(),
        fields,
        vector_search: VectorSearch {
            algorithms: vec![NamedAlgorithm {
                name: HNSW_ALGORITHM,
                kind: "hnsw",
            }],
            profiles: vec![VectorProfile {
                name: VECTOR_PROFILE,
                algorithm: HNSW_ALGORITHM,
            }],
        },
        semantic: Semantic {
            configurations: vec![SemanticConfiguration {
                name: semantic_configuration.to_string(),
                prioritized_fields: PrioritizedFields {
                    title_field: FieldRef {
                        field_name: "doc_title",
                    },
                    prioritized_content_fields: vec![FieldRef { field_name: "text" }],
                    prioritized_keywords_fields: SEMANTIC_KEYWORD_FIELDS
                        .iter()
                        .map(|f| FieldRef { field_name: *f })
                        .collect(),
                },
            }],
        },
    }
}

/// Operations the pipeline needs from a search index service.
pub trait SearchIndex {
    /// Create or update the index schema.
    fn put_definition(&self, definition: &IndexDefinition) -> Result<(), IndexServiceError>;

    /// Upsert documents keyed by `id`. Returns the number accepted.
    fn merge_or_upload(&self, docs: &[IndexDocument]) -> Result<usize, IndexServiceError>;

    /// Delete an index. Returns `false` if it did not exist.
    fn delete_index(&self, name: &str) -> Result<bool, IndexServiceError>;
}

/// Create or update the configured index for vectors of `dimensions`.
pub fn ensure_index(
    index: &dyn SearchIndex,
    search: &SearchConfig,
    dimensions: usize,
) -> Result<IndexDefinition, IndexServiceError> {
    let definition = index_definition(
        &search.index,
        dimensions,
        &search.analyzer,
        &search.semantic_configuration,
    );
    index.put_definition(&definition)?;
    Ok(definition)
}

/// Azure AI Search over its REST API.
pub struct AzureSearchIndex {
    http: reqwest::blocking::Client,
    endpoint: String,
    index_name: String,
    api_version: String,
    api_key: String,
}

impl AzureSearchIndex {
    pub fn new(
        endpoint: &str,
        index_name: &str,
        api_version: &str,
        api_key: String,
    ) -> Result<Self, IndexServiceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index_name: index_name.to_string(),
            api_version: api_version.to_string(),
            api_key,
        })
    }

    fn index_url(&self, name: &str) -> String {
        format!(
            "{}/indexes/{}?api-version={}",
            self.endpoint, name, self.api_version
        )
    }
}

impl SearchIndex for AzureSearchIndex {
    fn put_definition(&self, definition: &IndexDefinition) -> Result<(), IndexServiceError> {
        let resp = self
            .http
            .put(self.index_url(&definition.name))
            .header("api-key", &self.api_key)
            .json(definition)
            .send()?;
        match resp.status().as_u16() {
            200 | 201 | 204 => Ok(()),
            status => Err(IndexServiceError::Http {
                operation: "create/update",
                status,
                body: resp.text().unwrap_or_default(),
            }),
        }
    }

    fn merge_or_upload(&self, docs: &[IndexDocument]) -> Result<usize, IndexServiceError> {
        let url = format!(
            "{}/indexes/{}/docs/index?api-version={}",
            self.endpoint, self.index_name, self.api_version
        );
        let actions: Vec<IndexAction<'_>> = docs
            .iter()
            .map(|document| IndexAction {
                action: SearchAction::MergeOrUpload,
                document,
            })
            .collect();
        let payload = serde_json::json!({ "value": actions });

        let resp = self
            .http
            .post(url)
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(IndexServiceError::Http {
                operation: "upload",
                status: status.as_u16(),
                body,
            });
        }
        parse_upload_response(&body, docs.len())
    }

    fn delete_index(&self, name: &str) -> Result<bool, IndexServiceError> {
        let resp = self
            .http
            .delete(self.index_url(name))
            .header("api-key", &self.api_key)
            .send()?;
        match resp.status().as_u16() {
            200 | 204 => Ok(true),
            404 => Ok(false),
            status => Err(IndexServiceError::Http {
                operation: "delete",
                status,
                body: resp.text().unwrap_or_default(),
            }),
        }
    }
}

/// Check per-document results of an upload (`200` or `207 Multi-Status`).
///
/// Any `"status": false` entry turns the whole batch into
/// [`IndexServiceError::Rejected`]. A body without results is taken as
/// full acceptance.
pub fn parse_upload_response(body: &str, sent: usize) -> Result<usize, IndexServiceError> {
    let json: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return Ok(sent),
    };
    let Some(results) = json.get("value").and_then(|v| v.as_array()) else {
        return Ok(sent);
    };

    let failures: Vec<String> = results
        .iter()
        .filter(|r| r.get("status").and_then(|s| s.as_bool()) == Some(false))
        .map(|r| {
            let key = r.get("key").and_then(|k| k.as_str()).unwrap_or("?");
            let message = r
                .get("errorMessage")
                .and_then(|m| m.as_str())
                .unwrap_or("no error message");
            let code = r.get("statusCode").and_then(|c| c.as_u64()).unwrap_or(0);
            format!("{} ({}): {}", key, code, message)
        })
        .collect();

    if failures.is_empty() {
        Ok(results.len())
    } else {
        Err(IndexServiceError::Rejected(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> serde_json::Value {
        serde_json::to_value(index_definition(
            "kb-atribuicao",
            3072,
            "pt-BR.microsoft",
            "kb-atribuicao-semantic",
        ))
        .unwrap()
    }

    fn field<'a>(def: &'a serde_json::Value, name: &str) -> &'a serde_json::Value {
        def["fields"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["name"] == name)
            .unwrap_or_else(|| panic!("field {} missing", name))
    }

    #[test]
    fn test_key_and_vector_fields() {
        let def = definition();
        assert_eq!(def["name"], "kb-atribuicao");
        assert_eq!(field(&def, "id")["key"], true);
        let vector = field(&def, "content_vector");
        assert_eq!(vector["type"], "Collection(Edm.Single)");
        assert_eq!(vector["dimensions"], 3072);
        assert_eq!(vector["vectorSearchProfile"], "vprofile");
        assert_eq!(def["vectorSearch"]["algorithms"][0]["kind"], "hnsw");
        assert_eq!(def["vectorSearch"]["profiles"][0]["algorithm"], "hnsw");
    }

    #[test]
    fn test_text_fields_use_portuguese_analyzer() {
        let def = definition();
        for name in ["text", "doc_title"] {
            assert_eq!(field(&def, name)["searchable"], true);
            assert_eq!(field(&def, name)["analyzer"], "pt-BR.microsoft");
        }
        assert!(field(&def, "assunto").get("analyzer").is_none());
    }

    #[test]
    fn test_metadata_fields_are_filterable_facets() {
        let def = definition();
        for name in SEMANTIC_KEYWORD_FIELDS {
            let f = field(&def, name);
            assert_eq!(f["type"], "Edm.String");
            assert_eq!(f["filterable"], true);
            assert_eq!(f["facetable"], true);
            assert_eq!(f["searchable"], false);
        }
        for name in ["data_publicacao", "prazo_inicio", "prazo_fim"] {
            assert_eq!(field(&def, name)["type"], "Edm.DateTimeOffset");
            assert_eq!(field(&def, name)["sortable"], true);
        }
        assert_eq!(
            field(&def, "referencias_legais")["type"],
            "Collection(Edm.String)"
        );
        assert_eq!(field(&def, "id_original")["type"], "Edm.String");
    }

    #[test]
    fn test_semantic_configuration() {
        let def = definition();
        let config = &def["semantic"]["configurations"][0];
        assert_eq!(config["name"], "kb-atribuicao-semantic");
        let prioritized = &config["prioritizedFields"];
        assert_eq!(prioritized["titleField"]["fieldName"], "doc_title");
        assert_eq!(prioritized["prioritizedContentFields"][0]["fieldName"], "text");
        assert_eq!(
            prioritized["prioritizedKeywordsFields"]
                .as_array()
                .unwrap()
                .len(),
            9
        );
    }

    #[test]
    fn test_upload_response_all_ok() {
        let body = r#"{"value":[{"key":"a","status":true,"errorMessage":null,"statusCode":201},{"key":"b","status":true,"errorMessage":null,"statusCode":200}]}"#;
        assert_eq!(parse_upload_response(body, 2).unwrap(), 2);
    }

    #[test]
    fn test_upload_response_partial_failure() {
        let body = r#"{"value":[{"key":"a","status":true,"statusCode":200},{"key":"b","status":false,"errorMessage":"Invalid date","statusCode":400}]}"#;
        match parse_upload_response(body, 2) {
            Err(IndexServiceError::Rejected(failures)) => {
                assert_eq!(failures, vec!["b (400): Invalid date".to_string()]);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_upload_response_without_results() {
        assert_eq!(parse_upload_response("", 3).unwrap(), 3);
    }
}
