use std::sync::Arc;

use crate::services::llm::{GeminiClient, LlmError};
use crate::services::tools::{ToolError, ToolSet};

/// A pipeline participant: a role prompt for one class of analysis work.
#[derive(Debug, Clone, Copy)]
pub struct AgentProfile {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
}

/// One sequential stage of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub name: &'static str,
    pub agent: AgentProfile,
    pub instructions: &'static str,
    pub expected_output: &'static str,
}

const FINANCIAL_ANALYST: AgentProfile = AgentProfile {
    role: "Senior Financial Analyst",
    goal: "Thoroughly analyze financial documents and provide accurate, data-driven insights",
    backstory: "You are an experienced financial analyst with deep expertise in reading and \
        interpreting financial statements, SEC filings, and market data. You cite specific \
        numbers from the documents to support your conclusions and clearly distinguish \
        between facts and opinions.",
};

const DOCUMENT_VERIFIER: AgentProfile = AgentProfile {
    role: "Financial Document Verifier",
    goal: "Verify that uploaded documents are valid financial documents and that extracted \
        data is consistent and complete",
    backstory: "You are a meticulous verification specialist with compliance and auditing \
        experience. You confirm documents are legitimate financial reports (10-K, 10-Q, \
        earnings reports, balance sheets) and flag inconsistencies or missing data.",
};

const INVESTMENT_ADVISOR: AgentProfile = AgentProfile {
    role: "Investment Advisor",
    goal: "Provide well-researched, balanced investment recommendations grounded in the \
        document analysis",
    backstory: "You are a certified investment advisor. You base all recommendations on \
        fundamental analysis, present both bull and bear cases, and disclose that your \
        analysis is not personalized financial advice.",
};

const RISK_ASSESSOR: AgentProfile = AgentProfile {
    role: "Risk Assessment Analyst",
    goal: "Identify and evaluate market, credit, liquidity, and operational risks from the \
        document data",
    backstory: "You are a seasoned risk management professional. You evaluate debt levels, \
        liquidity ratios, and market exposure methodically and recommend mitigation \
        strategies such as diversification and hedging.",
};

fn default_stages() -> Vec<StageSpec> {
    vec![
        StageSpec {
            name: "verification",
            agent: DOCUMENT_VERIFIER,
            instructions: "Verify whether the document is a valid financial document. \
                Classify its type, note the key financial sections present, and flag any \
                data quality issues.",
            expected_output: "A verification report: document type classification, key \
                sections identified, data quality issues, and whether the document is \
                suitable for financial analysis.",
        },
        StageSpec {
            name: "financial_analysis",
            agent: FINANCIAL_ANALYST,
            instructions: "Analyze the document to answer the user's query. Cover revenue, \
                expenses, profit margins, cash flow, and key ratios; identify notable \
                trends and year-over-year changes.",
            expected_output: "A comprehensive financial analysis with an executive summary, \
                specific numbers from the document, key ratios, and data-driven \
                conclusions addressing the query.",
        },
        StageSpec {
            name: "investment_analysis",
            agent: INVESTMENT_ADVISOR,
            instructions: "Based on the analysis so far, provide balanced buy/hold/sell \
                recommendations supported by data from the document. Consider both \
                short-term catalysts and long-term fundamentals.",
            expected_output: "An investment thesis with bull and bear cases, valuation \
                analysis, specific recommendations, key catalysts and risks, and the \
                appropriate disclaimers.",
        },
        StageSpec {
            name: "risk_assessment",
            agent: RISK_ASSESSOR,
            instructions: "Perform a risk assessment covering market, credit, liquidity, \
                and operational risk. Analyze debt levels, cash flow stability, and \
                regulatory exposure, then recommend mitigations.",
            expected_output: "A risk report with severity ratings, risk-by-risk analysis, \
                stress scenarios, and recommended mitigation strategies.",
        },
    ]
}

/// Sequential multi-agent analysis pipeline.
///
/// Built fresh per job by [`AnalysisPipeline::new`]; nothing is shared across
/// invocations except the immutable LLM client and tool set, so concurrent
/// workers cannot leak state between jobs. Stages run strictly in order, each
/// seeing the outputs of the stages before it; the final stage's output is
/// the report.
pub struct AnalysisPipeline {
    llm: Arc<GeminiClient>,
    tools: Arc<ToolSet>,
    stages: Vec<StageSpec>,
}

impl AnalysisPipeline {
    pub fn new(llm: Arc<GeminiClient>, tools: Arc<ToolSet>) -> Self {
        Self {
            llm,
            tools,
            stages: default_stages(),
        }
    }

    /// Run the full pipeline over one document. Long-running; this is the
    /// dominant latency source in the system.
    pub async fn run(&self, file_path: &str, query: &str) -> Result<String, PipelineError> {
        let document = self.tools.read_document(file_path).await?;

        // Market context is enrichment, not a prerequisite.
        let market_context = match self.tools.web_search(query).await {
            Ok(results) => Some(results),
            Err(ToolError::NotConfigured(_)) => None,
            Err(e) => {
                tracing::warn!(error = %e, "web search failed, continuing without market context");
                None
            }
        };

        let mut prior_outputs = String::new();
        let mut report = String::new();

        for stage in &self.stages {
            tracing::debug!(stage = stage.name, "running pipeline stage");
            let system = format!(
                "You are a {}.\nGoal: {}\n{}",
                stage.agent.role, stage.agent.goal, stage.agent.backstory
            );
            let prompt = build_stage_prompt(
                stage,
                query,
                &document,
                market_context.as_deref(),
                &prior_outputs,
            );

            report = self.llm.generate(&system, &prompt).await?;
            prior_outputs.push_str(&format!("\n## {} output\n{}\n", stage.name, report));
        }

        Ok(report)
    }
}

fn build_stage_prompt(
    stage: &StageSpec,
    query: &str,
    document: &str,
    market_context: Option<&str>,
    prior_outputs: &str,
) -> String {
    let mut prompt = format!(
        "{}\n\nExpected output: {}\n\nUser query: {}\n\n## Document text\n{}\n",
        stage.instructions, stage.expected_output, query, document
    );
    if let Some(context) = market_context {
        prompt.push_str(&format!("\n## Market context from web search\n{context}\n"));
    }
    if !prior_outputs.is_empty() {
        prompt.push_str(&format!("\n## Prior stage outputs\n{prior_outputs}"));
    }
    prompt
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}
