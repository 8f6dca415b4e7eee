//! HTTP client for the inference server
//!
//! Speaks the server's v2 infer protocol: one POST per request carrying a
//! fixed set of named input tensors, one generated-token tensor back. The
//! tensor names and defaults mirror the ensemble model the deployment lab
//! serves.

use serde_json::{Value, json};

use super::DeployError;

/// Sampling and decoding knobs sent alongside the prompt. Defaults match
/// the deployment walkthrough: greedy top-k=1 decoding of 128 tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub output_len: u32,
    pub beam_width: u32,
    pub top_k: u32,
    pub top_p: f32,
    pub temperature: f32,
    pub beam_search_diversity_rate: f32,
    pub len_penalty: f32,
    pub repetition_penalty: f32,
    pub random_seed: i32,
    pub return_log_probs: bool,
    pub start_id: u32,
    pub end_id: u32,
    pub stop_words: Vec<String>,
    pub bad_words: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            output_len: 128,
            beam_width: 1,
            top_k: 1,
            top_p: 0.0,
            temperature: 1.0,
            beam_search_diversity_rate: 0.0,
            len_penalty: 1.0,
            repetition_penalty: 1.0,
            random_seed: 0,
            return_log_probs: true,
            start_id: 220,
            end_id: 50256,
            stop_words: Vec::new(),
            bad_words: Vec::new(),
        }
    }
}

/// Result of one infer call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub token_ids: Vec<u32>,
}

/// Client bound to one model endpoint on one server.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    base_url: String,
    model: String,
}

impl InferenceClient {
    /// `base_url` is scheme + authority, e.g. `http://localhost:8000`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn infer_url(&self) -> String {
        format!("{}/v2/models/{}/infer", self.base_url, self.model)
    }

    /// Send one prompt, return the generated token ids.
    pub fn infer(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, DeployError> {
        let body = build_request(prompt, params);
        tracing::debug!(url = %self.infer_url(), "sending infer request");

        let response: Value = ureq::post(&self.infer_url())
            .send_json(body)
            .map_err(|e| DeployError::Http(Box::new(e)))?
            .into_json()
            .map_err(|e| DeployError::BadResponse(e.to_string()))?;

        parse_response(&response)
    }
}

fn tensor(name: &str, datatype: &str, shape: Vec<usize>, data: Value) -> Value {
    json!({
        "name": name,
        "shape": shape,
        "datatype": datatype,
        "data": data,
    })
}

fn build_request(prompt: &str, params: &GenerationParams) -> Value {
    let word_list = |words: &[String]| -> Value {
        if words.is_empty() {
            json!([""])
        } else {
            json!(words)
        }
    };

    json!({
        "inputs": [
            tensor("INPUT_0", "BYTES", vec![1, 1], json!([prompt])),
            tensor("INPUT_1", "UINT32", vec![1, 1], json!([params.output_len])),
            tensor("INPUT_2", "BYTES", vec![1, 1], word_list(&params.bad_words)),
            tensor("INPUT_3", "BYTES", vec![1, 1], word_list(&params.stop_words)),
            tensor("runtime_top_k", "UINT32", vec![1, 1], json!([params.top_k])),
            tensor("runtime_top_p", "FP32", vec![1, 1], json!([params.top_p])),
            tensor(
                "beam_search_diversity_rate",
                "FP32",
                vec![1, 1],
                json!([params.beam_search_diversity_rate]),
            ),
            tensor("temperature", "FP32", vec![1, 1], json!([params.temperature])),
            tensor("len_penalty", "FP32", vec![1, 1], json!([params.len_penalty])),
            tensor(
                "repetition_penalty",
                "FP32",
                vec![1, 1],
                json!([params.repetition_penalty]),
            ),
            tensor("random_seed", "INT32", vec![1, 1], json!([params.random_seed])),
            tensor(
                "is_return_log_probs",
                "BOOL",
                vec![1, 1],
                json!([params.return_log_probs]),
            ),
            tensor("beam_width", "UINT32", vec![1, 1], json!([params.beam_width])),
            tensor("start_id", "UINT32", vec![1, 1], json!([params.start_id])),
            tensor("end_id", "UINT32", vec![1, 1], json!([params.end_id])),
        ],
    })
}

fn parse_response(response: &Value) -> Result<Generation, DeployError> {
    let outputs = response
        .get("outputs")
        .and_then(Value::as_array)
        .ok_or_else(|| DeployError::BadResponse("missing `outputs` array".to_string()))?;

    let output0 = outputs
        .iter()
        .find(|o| o.get("name").and_then(Value::as_str) == Some("OUTPUT_0"))
        .ok_or_else(|| DeployError::BadResponse("no OUTPUT_0 tensor".to_string()))?;

    let token_ids = output0
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| DeployError::BadResponse("OUTPUT_0 has no data".to_string()))?
        .iter()
        .map(|v| {
            v.as_u64()
                .map(|id| id as u32)
                .ok_or_else(|| DeployError::BadResponse(format!("non-integer token id: {v}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Generation { token_ids })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_infer_url() {
        let client = InferenceClient::new("http://localhost:8000/", "ensemble");
        assert_eq!(client.infer_url(), "http://localhost:8000/v2/models/ensemble/infer");
    }

    #[test]
    fn test_request_carries_every_named_tensor() {
        let body = build_request("hello", &GenerationParams::default());
        let inputs = body["inputs"].as_array().unwrap();
        let names: Vec<_> = inputs
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "INPUT_0",
                "INPUT_1",
                "INPUT_2",
                "INPUT_3",
                "runtime_top_k",
                "runtime_top_p",
                "beam_search_diversity_rate",
                "temperature",
                "len_penalty",
                "repetition_penalty",
                "random_seed",
                "is_return_log_probs",
                "beam_width",
                "start_id",
                "end_id",
            ]
        );
    }

    #[test]
    fn test_request_defaults_match_the_walkthrough() {
        let body = build_request("hello", &GenerationParams::default());
        let inputs = body["inputs"].as_array().unwrap();
        let find = |name: &str| {
            inputs
                .iter()
                .find(|t| t["name"] == name)
                .unwrap()
                .clone()
        };

        assert_eq!(find("INPUT_0")["data"], json!(["hello"]));
        assert_eq!(find("INPUT_1")["data"], json!([128]));
        assert_eq!(find("runtime_top_k")["data"], json!([1]));
        assert_eq!(find("runtime_top_p")["data"], json!([0.0]));
        assert_eq!(find("start_id")["data"], json!([220]));
        assert_eq!(find("end_id")["data"], json!([50256]));
        // Empty word lists are sent as a single empty string, not omitted.
        assert_eq!(find("INPUT_2")["data"], json!([""]));
        assert_eq!(find("INPUT_3")["data"], json!([""]));
    }

    #[test]
    fn test_parse_response_extracts_token_ids() {
        let response = json!({
            "outputs": [
                {"name": "OUTPUT_1", "data": [0.5]},
                {"name": "OUTPUT_0", "datatype": "UINT32", "data": [15496, 11, 995]},
            ],
        });
        let generation = parse_response(&response).unwrap();
        assert_eq!(generation.token_ids, vec![15496, 11, 995]);
    }

    #[test]
    fn test_parse_response_without_output0_fails() {
        let response = json!({"outputs": []});
        assert!(matches!(
            parse_response(&response),
            Err(DeployError::BadResponse(_))
        ));
    }
}
