pub const FAKE_MODEL_YAML: &str = r#"# Canned-response model for dry runs; no network access.
model:
  name: fake
  type: fake
  parameters:
    default_response: '{"work_order": "AB123", "total_amount": "100.00"}'
    responses: {}
  timeout_seconds: 10
  retry:
    max_attempts: 1
"#;

pub const OLLAMA_MODEL_YAML: &str = r#"model:
  name: llava
  type: ollama
  prompt_format: llama
  parameters:
    base_url: "http://localhost:11434"
    model: "llava:13b"
  inference:
    temperature: 0.1
    max_tokens: 256
  timeout_seconds: 120
  loading_timeout_seconds: 300
  retry:
    max_attempts: 3
    delay_seconds: 1.0
    backoff_factor: 2.0
    max_delay_seconds: 30.0
  preprocessing:
    target_size: [1024, 1024]
    color_mode: rgb
    maintain_aspect_ratio: true
    enhancements:
      contrast: 1.2
"#;

pub const BASIC_PROMPTS_YAML: &str = r#"config_info:
  name: basic prompts
  description: Single-instruction prompts, one per field
  version: "1.0"
prompts:
  - name: basic_work_order
    text: "Extract the work order number from this invoice image. Reply with JSON: {{\"work_order\": \"...\"}}"
    category: basic
    field_to_extract: work_order
    metadata:
      source: tally init
  - name: basic_cost
    text: "Extract the total amount from this invoice image. Reply with JSON: {{\"total_amount\": \"...\"}}"
    category: basic
    field_to_extract: cost
    metadata:
      source: tally init
"#;

pub const EVALUATION_YAML: &str = r#"evaluation:
  metrics: [accuracy, precision, recall, f1, exact_match]
  dataset:
    path: data
  output:
    format: json
    results_dir: results
  fields: [work_order, cost]
  concurrency: 4
"#;
