//! 🔎 Multi-search plumbing for the dedup engine.
//!
//! One sub-query per target index (more when an index has over
//! [`MAX_TERMS_PER_QUERY`] values waiting), each a `terms` query on the dedup field that
//! only fetches the dedup field back. Hits are collapsed on the dedup field: without that,
//! a value stored a hundred times would eat the whole `size` and hide the other values.
//! Responses come back in request order, so sub-query `i` is answered by `responses[i]`.

use serde_json::{Value, json};

use crate::common::{value_as_plain_string, value_at_path};
use crate::errors::ClusterError;

/// 🧮 Upper bound on values in one `terms` sub-query.
pub(crate) const MAX_TERMS_PER_QUERY: usize = 1024;

/// One `terms` lookup against one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubQuery {
    pub(crate) index: String,
    pub(crate) values: Vec<String>,
}

/// What came back for one sub-query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubQueryOutcome {
    /// Dedup values found on the cluster.
    Found(Vec<String>),
    /// The cluster could not answer this one. Reason attached for the log.
    Failed(String),
}

/// ✂️ Split every index's waiting values into sub-queries of bounded size.
pub(crate) fn plan_queries(snapshot: Vec<(String, Vec<String>)>) -> Vec<SubQuery> {
    snapshot
        .into_iter()
        .flat_map(|(index, values)| {
            values
                .chunks(MAX_TERMS_PER_QUERY)
                .map(|chunk| SubQuery {
                    index: index.clone(),
                    values: chunk.to_vec(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// 📝 Header/body NDJSON pairs, newline-terminated like the cluster insists.
pub(crate) fn render_msearch(field: &str, queries: &[SubQuery]) -> String {
    let mut body = String::new();
    for query in queries {
        let header = json!({"index": query.index});
        let search = json!({
            "size": query.values.len(),
            "_source": {"includes": [field]},
            "query": {"terms": {field: query.values}},
            "collapse": {"field": field}
        });
        body.push_str(&header.to_string());
        body.push('\n');
        body.push_str(&search.to_string());
        body.push('\n');
    }
    body
}

/// 📬 Match responses back to sub-queries and pull out the dedup values that were found.
pub(crate) fn parse_msearch(
    field: &str,
    response: &Value,
    expected: usize,
) -> Result<Vec<SubQueryOutcome>, ClusterError> {
    let responses = response
        .get("responses")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ClusterError::UnexpectedResponse("multi-search answer has no \"responses\" array".to_string())
        })?;
    if responses.len() != expected {
        return Err(ClusterError::UnexpectedResponse(format!(
            "multi-search answered {} queries, {expected} were sent",
            responses.len()
        )));
    }

    Ok(responses.iter().map(|item| outcome_of(field, item)).collect())
}

fn outcome_of(field: &str, item: &Value) -> SubQueryOutcome {
    if let Some(error) = item.get("error") {
        let reason = error
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return SubQueryOutcome::Failed(reason);
    }
    if let Some(status) = item
        .get("status")
        .and_then(Value::as_u64)
        .filter(|status| !(200..300).contains(status))
    {
        return SubQueryOutcome::Failed(format!("sub-query answered status {status}"));
    }
    let Some(hits) = item.pointer("/hits/hits").and_then(Value::as_array) else {
        return SubQueryOutcome::Failed("sub-query answer has no hits".to_string());
    };
    SubQueryOutcome::Found(
        hits.iter()
            .filter_map(|hit| hit.get("_source"))
            .filter_map(|source| value_at_path(source, field))
            .filter_map(value_as_plain_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_a_huge_backlog_is_split_into_polite_chunks() {
        let values: Vec<String> = (0..2050).map(|i| i.to_string()).collect();
        let queries = plan_queries(vec![("big".to_string(), values), ("small".to_string(), vec!["x".to_string()])]);

        let sizes: Vec<usize> = queries.iter().map(|q| q.values.len()).collect();
        assert_eq!(sizes, vec![1024, 1024, 2, 1]);
        assert_eq!(queries[3].index, "small");
    }

    #[test]
    fn the_one_where_the_body_is_ndjson_that_only_asks_for_the_dedup_field() {
        let body = render_msearch(
            "id",
            &[SubQuery {
                index: "idx".to_string(),
                values: vec!["abc".to_string(), "def".to_string()],
            }],
        );
        let lines: Vec<Value> = body
            .lines()
            .map(|l| serde_json::from_str(l).expect("each line is JSON"))
            .collect();

        assert!(body.ends_with('\n'));
        assert_eq!(lines[0], json!({"index": "idx"}));
        assert_eq!(lines[1]["size"], 2);
        assert_eq!(lines[1]["_source"]["includes"], json!(["id"]));
        assert_eq!(lines[1]["query"]["terms"]["id"], json!(["abc", "def"]));
        assert_eq!(lines[1]["collapse"], json!({"field": "id"}));
    }

    #[test]
    fn the_one_where_one_failed_sub_query_does_not_spoil_the_rest() -> Result<(), ClusterError> {
        let response = json!({"responses": [
            {"hits": {"hits": [{"_index": "idx", "_source": {"id": "abc"}}]}, "status": 200},
            {"error": {"type": "index_not_found_exception", "reason": "no such index [gone]"}, "status": 404}
        ]});

        let outcomes = parse_msearch("id", &response, 2)?;

        assert_eq!(outcomes[0], SubQueryOutcome::Found(vec!["abc".to_string()]));
        assert_eq!(outcomes[1], SubQueryOutcome::Failed("no such index [gone]".to_string()));
        Ok(())
    }

    #[test]
    fn the_one_where_a_short_answer_is_not_trusted() {
        let response = json!({"responses": []});
        assert!(parse_msearch("id", &response, 1).is_err());
    }
}
