//! Knowledge engine lookup (`.w <question>`).

use std::{sync::OnceLock, time::Duration};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::{
    command::{Command, Outcome, Trigger},
    error::{Error, Result},
    feature::Feature,
};

pub const TRIGGER: Trigger = Trigger::new(".w");

const SELF_TEST_QUERY: &str = "pi";
const NO_ANSWER: &str = "(no answer)";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// API application ID. Unset disables the feature. Never serialised back out.
    #[serde(skip_serializing)]
    pub app_id: Option<Secret<String>>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            base_url: "https://api.wolframalpha.com/v2/query".into(),
            timeout_secs: 30,
        }
    }
}

/// Answers free-text questions through a remote knowledge engine.
pub struct KnowledgeLookup {
    config: KnowledgeConfig,
    client: OnceLock<reqwest::Client>,
}

impl KnowledgeLookup {
    pub fn new(config: KnowledgeConfig) -> Self {
        Self {
            config,
            client: OnceLock::new(),
        }
    }

    fn app_id(&self) -> Option<&str> {
        self.config
            .app_id
            .as_ref()
            .map(|id| id.expose_secret().as_str())
            .filter(|id| !id.is_empty())
    }

    async fn query(&self, question: &str) -> Result<String> {
        let client = self
            .client
            .get()
            .ok_or_else(|| Error::state("knowledge lookup is not initialised"))?;
        let app_id = self
            .app_id()
            .ok_or_else(|| Error::state("knowledge lookup is not configured"))?;

        let response = client
            .get(&self.config.base_url)
            .query(&[
                ("appid", app_id),
                ("input", question),
                ("format", "plaintext"),
            ])
            .send()
            .await
            .map_err(|err| Error::external("query failed", err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::state(format!("query failed with HTTP status {status}")));
        }
        let body = response
            .text()
            .await
            .map_err(|err| Error::external("failed to read response", err))?;
        Ok(extract_plaintext(&body))
    }
}

/// Collect every `<plaintext>` section of the engine's XML answer.
fn extract_plaintext(xml: &str) -> String {
    const OPEN: &str = "<plaintext>";
    const CLOSE: &str = "</plaintext>";

    let mut answers = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(OPEN) {
        rest = &rest[start + OPEN.len()..];
        let Some(end) = rest.find(CLOSE) else {
            break;
        };
        let text = decode_entities(rest[..end].trim());
        if !text.is_empty() {
            answers.push(text);
        }
        rest = &rest[end + CLOSE.len()..];
    }

    if answers.is_empty() {
        NO_ANSWER.to_string()
    } else {
        answers.join(". ")
    }
}

/// Replace XML character references with the characters they stand for.
/// Unrecognised references are kept verbatim.
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            },
            None => {
                out.push('&');
                rest = &rest[1..];
            },
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        },
    }
}

#[async_trait]
impl Feature for KnowledgeLookup {
    fn key(&self) -> &'static str {
        "knowledge"
    }

    fn trigger(&self) -> Trigger {
        TRIGGER
    }

    fn is_configured(&self) -> bool {
        self.app_id().is_some()
    }

    async fn initialise(&self) -> Result<()> {
        if self.client.get().is_some() {
            return Ok(());
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|err| Error::initialisation(TRIGGER, err))?;
        let _ = self.client.set(client);
        Ok(())
    }

    async fn self_test(&self) -> Result<()> {
        let answer = self.query(SELF_TEST_QUERY).await?;
        if answer == NO_ANSWER {
            return Err(Error::state("self test query returned no answer"));
        }
        Ok(())
    }

    async fn execute(&self, mut cmd: Command) -> Outcome {
        if let Err(err) = cmd.trim() {
            return Outcome::failed(err);
        }
        self.query(&cmd.content).await.into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    async fn lookup(server: &mockito::Server) -> KnowledgeLookup {
        let lookup = KnowledgeLookup::new(KnowledgeConfig {
            app_id: Some(Secret::new("test-app".into())),
            base_url: format!("{}/v2/query", server.url()),
            timeout_secs: 5,
        });
        lookup.initialise().await.unwrap();
        lookup
    }

    #[test]
    fn extracts_all_plaintext_sections() {
        let xml = "<queryresult><pod><plaintext>3.14159</plaintext></pod>\
                   <pod><plaintext></plaintext></pod>\
                   <pod><plaintext> pi </plaintext></pod></queryresult>";
        assert_eq!(extract_plaintext(xml), "3.14159. pi");
        assert_eq!(extract_plaintext("<queryresult/>"), "(no answer)");
    }

    #[rstest]
    #[case("AT&amp;T &lt;3 &quot;x&quot;", "AT&T <3 \"x\"")]
    #[case("it&apos;s &gt; 2", "it's > 2")]
    #[case("&#960; &#x3C0; &#X3A3;", "\u{3c0} \u{3c0} \u{3a3}")]
    #[case("fish & chips", "fish & chips")]
    #[case("&bogus; &#xZZ; &", "&bogus; &#xZZ; &")]
    #[case("&amp;lt;", "&lt;")]
    fn decodes_character_references(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(decode_entities(text), expected);
    }

    #[test]
    fn plaintext_sections_are_decoded() {
        let xml = "<pod><plaintext>x &lt; y &amp;&amp; y &lt; z</plaintext></pod>";
        assert_eq!(extract_plaintext(xml), "x < y && y < z");
    }

    #[test]
    fn configured_only_with_app_id() {
        assert!(!KnowledgeLookup::new(KnowledgeConfig::default()).is_configured());
        let cfg: KnowledgeConfig = serde_json::from_str(r#"{"app_id": "abc"}"#).unwrap();
        assert!(KnowledgeLookup::new(cfg).is_configured());
    }

    #[test]
    fn serialisation_omits_app_id() {
        let cfg: KnowledgeConfig = serde_json::from_str(r#"{"app_id": "abc"}"#).unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("abc"));
    }

    #[tokio::test]
    async fn execute_returns_answer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/query")
            .match_query(mockito::Matcher::UrlEncoded(
                "input".into(),
                "distance to moon".into(),
            ))
            .with_status(200)
            .with_body("<queryresult><pod><plaintext>384400 km</plaintext></pod></queryresult>")
            .create_async()
            .await;

        let outcome = lookup(&server)
            .await
            .execute(Command::new("test", "distance to moon"))
            .await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.output, "384400 km");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn self_test_fails_on_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/query")
            .match_query(mockito::Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let err = lookup(&server).await.self_test().await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }
}
