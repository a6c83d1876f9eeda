use std::sync::{Arc, Mutex, MutexGuard};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::{
    data_dir::DataDir,
    error,
    search::{SearchAllResponse, SearchEngine, SearchResponse},
    text_util::add_line_numbers,
};

const DEFAULT_SEARCH_LIMIT: usize = 5;
const MAX_SEARCH_LIMIT: usize = 20;
const DEFAULT_LIMIT_PER_CORPUS: usize = 3;
const MAX_LIMIT_PER_CORPUS: usize = 10;

#[derive(Clone)]
pub struct LibscopeMcpServer {
    engine: Arc<Mutex<SearchEngine>>,
    tool_router: ToolRouter<Self>,
}

impl LibscopeMcpServer {
    pub fn new(engine: SearchEngine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            tool_router: Self::tool_router(),
        }
    }

    fn engine(&self) -> Result<MutexGuard<'_, SearchEngine>, rmcp::ErrorData> {
        self.engine.lock().map_err(|_| {
            rmcp::ErrorData::internal_error("engine lock poisoned", None)
        })
    }
}

#[tool_router(router = tool_router)]
impl LibscopeMcpServer {
    #[tool(
        name = "libscope_search",
        description = "Search one indexed library corpus. Results are ranked by BM25 and boosted by shared concept tags (react_hooks, async_ops, ...)."
    )]
    pub async fn libscope_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let limit = check_limit(
            "limit",
            params.limit,
            DEFAULT_SEARCH_LIMIT,
            MAX_SEARCH_LIMIT,
        )?;

        let response = self
            .engine()?
            .search(&params.query, &params.corpus, limit)
            .map_err(|e| mcp_error("search failed", e))?;
        if response.is_slow() {
            warn!(
                corpus = %response.corpus,
                ms = response.search_time_ms,
                "slow search"
            );
        }

        let summary = format_search_summary(&response);
        structured_result(summary, &response)
    }

    #[tool(
        name = "libscope_search_all",
        description = "Search every indexed library corpus. Returns up to limitPerCorpus results per corpus; scores are not comparable across corpora."
    )]
    pub async fn libscope_search_all(
        &self,
        params: Parameters<SearchAllParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let limit = check_limit(
            "limitPerCorpus",
            params.limit_per_corpus,
            DEFAULT_LIMIT_PER_CORPUS,
            MAX_LIMIT_PER_CORPUS,
        )?;

        let response = self
            .engine()?
            .search_all(&params.query, limit)
            .map_err(|e| mcp_error("search failed", e))?;

        let summary = format_search_all_summary(&response);
        structured_result(summary, &response)
    }

    #[tool(
        name = "libscope_get_segment",
        description = "Fetch the full content of a segment by the id returned from a search."
    )]
    pub async fn libscope_get_segment(
        &self,
        params: Parameters<GetSegmentParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let id = params.0.id;
        let record = self
            .engine()?
            .get_segment(id)
            .map_err(|e| mcp_error("segment lookup failed", e))?;

        let Some(record) = record else {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "Segment {id} not found"
            ))]));
        };

        let text = format!(
            "{} {}:{}-{}\n{}",
            record.corpus,
            record.source_path,
            record.start_line,
            record.end_line,
            add_line_numbers(&record.content, record.start_line)
        );
        structured_result(text, &record)
    }

    #[tool(
        name = "libscope_list_corpora",
        description = "List indexed library corpora with their segment counts."
    )]
    pub async fn libscope_list_corpora(
        &self,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let corpora = self
            .engine()?
            .list_corpora()
            .map_err(|e| mcp_error("listing corpora failed", e))?;

        let summary = if corpora.is_empty() {
            "No corpora indexed".to_string()
        } else {
            corpora
                .iter()
                .map(|c| format!("{} ({} segments)", c.name, c.segment_count))
                .collect::<Vec<_>>()
                .join("\n")
        };
        structured_result(summary, &json!({ "corpora": corpora }))
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for LibscopeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("libscope", env!("CARGO_PKG_VERSION"))
                    .with_title("libscope MCP"),
            )
            .with_instructions(
                "Use libscope_list_corpora to see which libraries are indexed, libscope_search or libscope_search_all to find relevant segments, and libscope_get_segment to read one in full.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Search query string.
    pub query: String,
    /// Corpus (library) to search.
    pub corpus: String,
    /// Maximum number of results, 1-20 (default: 5).
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchAllParams {
    /// Search query string.
    pub query: String,
    /// Maximum results per corpus, 1-10 (default: 3).
    pub limit_per_corpus: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetSegmentParams {
    /// Segment id from a search result.
    pub id: u64,
}

fn check_limit(
    name: &str,
    value: Option<usize>,
    default: usize,
    max: usize,
) -> Result<usize, rmcp::ErrorData> {
    let limit = value.unwrap_or(default);
    if (1..=max).contains(&limit) {
        Ok(limit)
    } else {
        Err(rmcp::ErrorData::invalid_params(
            format!("{name} must be between 1 and {max}"),
            Some(json!({ "param": name, "value": limit })),
        ))
    }
}

fn structured_result(
    summary: String,
    value: &impl Serialize,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let structured = serde_json::to_value(value)
        .map_err(|e| mcp_error("failed to serialize result", e))?;
    let mut result = CallToolResult::success(vec![Content::text(summary)]);
    result.structured_content = Some(structured);
    Ok(result)
}

fn format_search_summary(response: &SearchResponse) -> String {
    if response.results.is_empty() {
        return format!(
            "No results found for \"{}\" in {}",
            response.query, response.corpus
        );
    }

    let suffix = if response.total_results == 1 { "" } else { "s" };
    let mut lines = vec![format!(
        "Found {} result{suffix} for \"{}\" in {}:",
        response.total_results, response.query, response.corpus
    )];
    for r in &response.results {
        lines.push(format!(
            "#{} {:.3} {}:{}-{} [{}]",
            r.id,
            r.score,
            r.source_path,
            r.start_line,
            r.end_line,
            r.tags.join(", ")
        ));
    }
    lines.join("\n")
}

fn format_search_all_summary(response: &SearchAllResponse) -> String {
    if response.results_by_corpus.is_empty() {
        return format!(
            "No results found for \"{}\" in {} corpora",
            response.query,
            response.corpora_searched.len()
        );
    }

    let mut lines = vec![format!(
        "Found {} result(s) for \"{}\" across {} corpora:",
        response.total_results,
        response.query,
        response.results_by_corpus.len()
    )];
    for group in &response.results_by_corpus {
        lines.push(format!("{}:", group.corpus));
        for r in &group.results {
            lines.push(format!(
                "  #{} {:.3} {}:{}-{}",
                r.id, r.score, r.source_path, r.start_line, r.end_line
            ));
        }
    }
    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(data_dir: &DataDir) -> error::Result<()> {
    let engine = SearchEngine::open(&data_dir.segments_db())?;
    let server = LibscopeMcpServer::new(engine);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}
