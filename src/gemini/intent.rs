//! Intent classification: which clinic a patient's complaint belongs to.
//!
//! The model is asked for JSON matching a three-field schema, and the reply is
//! deserialized into `ClinicIntent`. A closed `Urgency` enum means an
//! out-of-vocabulary urgency fails parsing instead of reaching the caller.

use super::{excerpt, GeminiClient, GeminiError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Receptionist instructions sent as the system prompt.
const SYSTEM_PROMPT: &str = "Sen bir hastane karşılama asistanısın. Görevin, hastanın şikayetini analiz edip \
onu *sadece* doğru polikliniğe yönlendirmektir. Tıbbi tavsiye verme, 'geçmiş olsun' deme. \
Cevabını *sadece* istenen JSON formatında ver. \
Eğer şikayet belirsizse 'poliklinik' alanını 'Belirsiz' olarak ayarla.";

/// Clinic name the model uses when the complaint is too vague.
pub const UNDETERMINED_CLINIC: &str = "Belirsiz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    #[serde(rename = "acil")]
    Urgent,
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "acil değil")]
    NotUrgent,
}

impl Urgency {
    pub const ALL: [Urgency; 3] = [Urgency::Urgent, Urgency::Normal, Urgency::NotUrgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Urgent => "acil",
            Urgency::Normal => "normal",
            Urgency::NotUrgent => "acil değil",
        }
    }
}

/// Routing decision for one complaint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicIntent {
    pub poliklinik: String,
    pub aciliyet: Urgency,
    pub sebep_ozeti: String,
}

impl ClinicIntent {
    /// True for an empty clinic or any casing of `Belirsiz`.
    pub fn is_undetermined(&self) -> bool {
        let clinic = self.poliklinik.trim();
        clinic.is_empty() || fold_turkish(clinic) == fold_turkish(UNDETERMINED_CLINIC)
    }
}

/// Lowercase with the dotted and dotless i collapsed, so `BELİRSİZ`,
/// `BELIRSIZ` and `belirsiz` compare equal.
fn fold_turkish(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'İ' | 'I' | 'ı' => 'i',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// `responseSchema` in the OpenAPI subset the API accepts.
fn response_schema() -> Value {
    let urgencies: Vec<&str> = Urgency::ALL.iter().map(Urgency::as_str).collect();
    json!({
        "type": "OBJECT",
        "properties": {
            "poliklinik": { "type": "STRING" },
            "aciliyet": { "type": "STRING", "enum": urgencies },
            "sebep_ozeti": { "type": "STRING" }
        },
        "required": ["poliklinik", "aciliyet", "sebep_ozeti"]
    })
}

pub(crate) fn intent_payload(text: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": text }] }],
        "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema()
        }
    })
}

/// Parse the JSON document the model put in its text part.
pub(crate) fn parse_intent(json_text: &str) -> Result<ClinicIntent, GeminiError> {
    serde_json::from_str(json_text).map_err(|e| {
        GeminiError::Malformed(format!(
            "intent does not match schema: {} (got: {})",
            e,
            excerpt(json_text, 200)
        ))
    })
}

impl GeminiClient {
    /// Classify a complaint into clinic, urgency and a short reason summary.
    pub async fn classify_intent(&self, text: &str) -> Result<ClinicIntent, GeminiError> {
        let response = self
            .generate("intent", &self.intent_model, self.intent_timeout, &intent_payload(text))
            .await?;

        let json_text = response
            .into_first_part()?
            .text
            .ok_or_else(|| GeminiError::Malformed("candidate part has no text".to_string()))?;

        parse_intent(&json_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::test_support::client_for;

    fn envelope(json_text: &str) -> String {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": json_text }], "role": "model" },
                "finishReason": "STOP"
            }]
        })
        .to_string()
    }

    #[test]
    fn test_payload_requests_json_with_schema() {
        let payload = intent_payload("başım dönüyor");

        assert_eq!(payload["contents"][0]["parts"][0]["text"], "başım dönüyor");
        assert_eq!(payload["generationConfig"]["responseMimeType"], "application/json");

        let schema = &payload["generationConfig"]["responseSchema"];
        assert_eq!(schema["required"].as_array().unwrap().len(), 3);
        assert_eq!(schema["properties"]["aciliyet"]["enum"], json!(["acil", "normal", "acil değil"]));
        assert!(payload["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Belirsiz"));
    }

    #[test]
    fn test_parse_accepts_every_urgency() {
        for urgency in Urgency::ALL {
            let text = json!({
                "poliklinik": "KBB",
                "aciliyet": urgency.as_str(),
                "sebep_ozeti": "boğaz ağrısı"
            })
            .to_string();
            assert_eq!(parse_intent(&text).unwrap().aciliyet, urgency);
        }
    }

    #[test]
    fn test_parse_rejects_schema_violations() {
        let bad_urgency = r#"{"poliklinik":"KBB","aciliyet":"çok acil","sebep_ozeti":"x"}"#;
        let missing_field = r#"{"poliklinik":"KBB","aciliyet":"acil"}"#;
        let wrong_type = r#"{"poliklinik":7,"aciliyet":"acil","sebep_ozeti":"x"}"#;

        for text in [bad_urgency, missing_field, wrong_type, "not json"] {
            let err = parse_intent(text).unwrap_err();
            assert!(matches!(err, GeminiError::Malformed(_)), "accepted: {}", text);
        }
    }

    #[test]
    fn test_undetermined_clinic_is_case_insensitive() {
        let mut intent = ClinicIntent {
            poliklinik: "BELIRSIZ".to_string(),
            aciliyet: Urgency::Normal,
            sebep_ozeti: String::new(),
        };
        assert!(intent.is_undetermined());

        intent.poliklinik = " belirsiz ".to_string();
        assert!(intent.is_undetermined());

        intent.poliklinik = "BELİRSİZ".to_string();
        assert!(intent.is_undetermined());

        intent.poliklinik = "belırsız".to_string();
        assert!(intent.is_undetermined());

        intent.poliklinik = "  ".to_string();
        assert!(intent.is_undetermined());

        intent.poliklinik = "Dahiliye".to_string();
        assert!(!intent.is_undetermined());
    }

    #[tokio::test]
    async fn test_classify_intent_against_mock() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.5-flash-preview-09-2025:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(envelope(
                r#"{"poliklinik":"Kulak Burun Boğaz","aciliyet":"normal","sebep_ozeti":"Boğaz ağrısı"}"#,
            ))
            .create_async()
            .await;

        let client = client_for(&server.url());
        let intent = client.classify_intent("boğazım ağrıyor").await.unwrap();

        assert_eq!(intent.poliklinik, "Kulak Burun Boğaz");
        assert_eq!(intent.aciliyet, Urgency::Normal);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_classify_intent_http_error_carries_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(429)
            .with_body(r#"{"error":{"message":"Resource exhausted"}}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.classify_intent("boğazım ağrıyor").await.unwrap_err();

        match err {
            GeminiError::Http { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("Resource exhausted"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_classify_intent_rejects_off_schema_reply() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(200)
            .with_body(envelope(r#"{"poliklinik":"KBB","aciliyet":"yüksek","sebep_ozeti":"x"}"#))
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.classify_intent("boğazım ağrıyor").await.unwrap_err();
        assert!(err.to_string().contains("does not match schema"));
    }
}
