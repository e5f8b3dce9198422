use reqwest::Client;
use serde::Deserialize;

/// Capabilities the pipeline's agents may invoke.
///
/// Investment analysis and risk assessment exist in the interface but have no
/// implementation; invoking them reports that explicitly rather than
/// fabricating output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCapability {
    ReadDocument,
    WebSearch,
    InvestmentAnalysis,
    RiskAssessment,
}

/// Stateless tool set shared across jobs. Holds only configuration and an
/// HTTP client; no per-job state survives an invocation.
pub struct ToolSet {
    http: Client,
    serper_api_key: Option<String>,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperHit>,
}

#[derive(Deserialize)]
struct SerperHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

impl ToolSet {
    pub fn new(serper_api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            serper_api_key,
        }
    }

    pub async fn invoke(&self, capability: ToolCapability, input: &str) -> Result<String, ToolError> {
        match capability {
            ToolCapability::ReadDocument => self.read_document(input).await,
            ToolCapability::WebSearch => self.web_search(input).await,
            ToolCapability::InvestmentAnalysis => {
                Err(ToolError::NotImplemented("investment analysis"))
            }
            ToolCapability::RiskAssessment => Err(ToolError::NotImplemented("risk assessment")),
        }
    }

    /// Read an uploaded document into normalized text.
    pub async fn read_document(&self, path: &str) -> Result<String, ToolError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| ToolError::Io(path.to_string(), e))?;
        Ok(normalize_text(&String::from_utf8_lossy(&raw)))
    }

    /// Search the web for market context. Unavailable unless a Serper API key
    /// is configured.
    pub async fn web_search(&self, query: &str) -> Result<String, ToolError> {
        let Some(api_key) = &self.serper_api_key else {
            return Err(ToolError::NotConfigured("web search"));
        };

        let response = self
            .http
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", api_key)
            .json(&serde_json::json!({ "q": query }))
            .send()
            .await
            .map_err(ToolError::Http)?
            .error_for_status()
            .map_err(ToolError::Http)?;

        let parsed: SerperResponse = response.json().await.map_err(ToolError::Http)?;
        let summary = parsed
            .organic
            .iter()
            .take(5)
            .map(|hit| format!("{}: {} ({})", hit.title, hit.snippet, hit.link))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(summary)
    }
}

/// Collapse runs of newlines and spaces into single ones, in one pass.
/// Carriage returns are dropped.
pub fn normalize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_newline = false;
    let mut prev_space = false;
    for ch in input.chars() {
        match ch {
            '\n' => {
                if !prev_newline {
                    out.push('\n');
                }
                prev_newline = true;
                prev_space = false;
            }
            ' ' => {
                if !prev_space {
                    out.push(' ');
                }
                prev_space = true;
                prev_newline = false;
            }
            '\r' => {}
            _ => {
                out.push(ch);
                prev_newline = false;
                prev_space = false;
            }
        }
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("failed to read document at {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_newline_runs() {
        assert_eq!(normalize_text("a\n\n\nb\nc"), "a\nb\nc");
    }

    #[test]
    fn test_normalize_collapses_double_spaces() {
        assert_eq!(normalize_text("total  revenue   grew"), "total revenue grew");
    }

    #[test]
    fn test_normalize_drops_carriage_returns() {
        assert_eq!(normalize_text("a\r\nb\r\n\r\nc"), "a\nb\nc");
    }

    #[test]
    fn test_normalize_leaves_clean_text_unchanged() {
        assert_eq!(normalize_text("one line\nanother line"), "one line\nanother line");
    }

    #[tokio::test]
    async fn test_stub_capabilities_report_not_implemented() {
        let tools = ToolSet::new(None);
        let err = tools
            .invoke(ToolCapability::InvestmentAnalysis, "ignored")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotImplemented(_)));

        let err = tools
            .invoke(ToolCapability::RiskAssessment, "ignored")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotImplemented(_)));
    }

    #[tokio::test]
    async fn test_web_search_without_key_is_not_configured() {
        let tools = ToolSet::new(None);
        let err = tools.web_search("TSLA earnings").await.unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
    }
}
