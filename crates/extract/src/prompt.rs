use crate::schema::FieldSchema;

pub fn build_extraction_prompt(document_text: &str, schema: &FieldSchema) -> String {
    let fields = schema
        .iter()
        .map(|f| format!("- {}", f))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Extract named entities from the document below for each of the requested fields.

FIELDS:
{}

INSTRUCTIONS:
1. For every field, find the values in the document that answer it
2. Copy each value exactly as it appears in the document
3. Use the field name exactly as listed above
4. Output ONLY valid JSON, nothing else

SCHEMA:
{{
  "extractions": [
    {{"field": "one of the listed fields", "value": "exact text from the document", "extraction_class": "short entity type, e.g. PERSON, ORGANIZATION, EMAIL, DATE"}}
  ]
}}

RULES:
- Omit fields that have no value in the document
- Do not invent values
- Output ONLY the JSON object, no markdown, no explanations

DOCUMENT:
{}

JSON OUTPUT:"#,
        fields, document_text
    )
}

pub fn build_retry_prompt(invalid_json: &str) -> String {
    format!(
        r#"The following JSON is invalid:

{}

Fix this JSON. Output only valid JSON with no markdown formatting, no code blocks, no explanations. Just the raw JSON object with an "extractions" array."#,
        invalid_json
    )
}
