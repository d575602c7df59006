//! MCP server implementation.

use super::protocol::*;
use super::tools::get_tools;
use crate::config::Settings;
use crate::error::Result;
use crate::jobs::{ReplicateRequest, VeoRequest};
use crate::media::{ImageRequest, MusicRequest};
use crate::orchestrator::{FlightSearchRequest, Orchestrator, VideoJob, VideoProvider};
use crate::places::PlaceSearchRequest;
use crate::poller::{ProgressEvent, ProgressSink, RecordingSink, TracingSink};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "vente";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server for Vente.
///
/// Tool calls run in their own tasks once the server is initialized, so a
/// long poll never holds up `ping` or other requests. Responses from every
/// task funnel through one writer and may arrive out of request order.
pub struct McpServer {
    settings: Settings,
    orchestrator: Option<Arc<Orchestrator>>,
}

/// Records events for the tool result and mirrors them to the log.
#[derive(Default)]
struct ToolSink {
    recording: RecordingSink,
}

impl ProgressSink for ToolSink {
    fn emit(&self, event: ProgressEvent) {
        TracingSink.emit(event.clone());
        self.recording.emit(event);
    }
}

#[derive(Debug, Deserialize)]
struct RouteArgs {
    origin_airport_name: String,
    destination_airport_name: String,
}

#[derive(Debug, Deserialize)]
struct SearchFlightsArgs {
    origin_airport_name: String,
    destination_airport_name: String,
    departure_date: String,
    return_date: String,
    #[serde(default = "one")]
    passengers: u32,
}

#[derive(Debug, Deserialize)]
struct CheapestArgs {
    origin_airport_name: String,
    destination_airport_name: String,
    #[serde(default = "week")]
    trip_duration_days: i64,
}

#[derive(Debug, Deserialize)]
struct ProviderArgs {
    #[serde(default)]
    provider: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobArgs {
    #[serde(default)]
    provider: Option<String>,
    job_id: String,
}

fn one() -> u32 {
    1
}

fn week() -> i64 {
    7
}

fn provider(raw: Option<&str>) -> Result<VideoProvider> {
    raw.map_or(Ok(VideoProvider::Replicate), str::parse::<VideoProvider>)
}

fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> std::result::Result<T, ToolCallResult> {
    serde_json::from_value(args.unwrap_or_else(|| json!({})))
        .map_err(|e| ToolCallResult::error(format!("Invalid arguments: {}", e)))
}

/// Tool text followed by any media messages the operation emitted.
fn respond(result: Result<String>, sink: &ToolSink) -> ToolCallResult {
    match result {
        Ok(text) => {
            let messages = sink.recording.messages();
            if messages.is_empty() {
                ToolCallResult::text(text)
            } else {
                ToolCallResult::text(format!("{}\n\n{}", text, messages.join("\n\n")))
            }
        }
        Err(e) => ToolCallResult::error(e.to_string()),
    }
}

impl McpServer {
    /// Create a new MCP server.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            orchestrator: None,
        }
    }

    /// Run the MCP server (reads from stdin, writes to stdout).
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let (responses, mut outgoing) = mpsc::unbounded_channel::<JsonRpcResponse>();

        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(response) = outgoing.recv().await {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                stdout.write_all(out.as_bytes()).await?;
                stdout.flush().await?;
            }
            Ok::<_, anyhow::Error>(())
        });

        info!("Vente MCP server starting");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let request = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Failed to parse request: {}", e);
                    let parse_error = JsonRpcResponse::error(None, PARSE_ERROR, "Parse error");
                    let _ = responses.send(parse_error);
                    continue;
                }
            };

            let id = request.id.clone();
            match self.spawn_tool_call(request) {
                Ok(task) => {
                    let responses = responses.clone();
                    tokio::spawn(async move {
                        let response = task.await.unwrap_or_else(|e| {
                            error!("Tool call task failed: {}", e);
                            JsonRpcResponse::error(id, INTERNAL_ERROR, "Tool call aborted")
                        });
                        let _ = responses.send(response);
                    });
                }
                Err(request) => {
                    if let Some(response) = self.handle_request(request).await {
                        let _ = responses.send(response);
                    }
                }
            }
        }

        info!("Input closed, waiting for running tool calls");
        drop(responses);
        writer.await??;
        info!("MCP server stopping");
        Ok(())
    }

    /// Start a tool call in its own task.
    ///
    /// Hands the request back when it must be answered inline: anything that
    /// is not a `tools/call` request, and calls made before `initialize`.
    fn spawn_tool_call(
        &self,
        request: JsonRpcRequest,
    ) -> std::result::Result<JoinHandle<JsonRpcResponse>, JsonRpcRequest> {
        match &self.orchestrator {
            Some(orchestrator) if request.method == "tools/call" && !request.is_notification() => {
                let orchestrator = Arc::clone(orchestrator);
                debug!(id = ?request.id, "Spawning tool call");
                Ok(tokio::spawn(async move {
                    Self::handle_tools_call(Some(orchestrator.as_ref()), request.id, request.params)
                        .await
                }))
            }
            _ => Err(request),
        }
    }

    /// Handle a single JSON-RPC request. Notifications get no response.
    async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            if request.method != "notifications/initialized" && request.method != "initialized" {
                warn!("Ignoring notification: {}", request.method);
            }
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => {
                Self::handle_tools_call(self.orchestrator.as_deref(), request.id, request.params)
                    .await
            }
            _ => JsonRpcResponse::error(
                request.id,
                METHOD_NOT_FOUND,
                &format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    /// Handle initialize request.
    fn handle_initialize(&mut self, id: Option<Value>) -> JsonRpcResponse {
        match Orchestrator::new(self.settings.clone()) {
            Ok(orch) => {
                self.orchestrator = Some(Arc::new(orch));
                info!("Orchestrator initialized");
            }
            Err(e) => {
                error!("Failed to initialize orchestrator: {}", e);
                return JsonRpcResponse::error(id, SERVER_ERROR, &format!("Init failed: {}", e));
            }
        }

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability { list_changed: false },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        };

        JsonRpcResponse::from_result(id, &result)
    }

    /// Handle tools/list request.
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::from_result(id, &ToolsListResult { tools: get_tools() })
    }

    /// Handle tools/call request.
    async fn handle_tools_call(
        orchestrator: Option<&Orchestrator>,
        id: Option<Value>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        INVALID_PARAMS,
                        &format!("Invalid params: {}", e),
                    )
                }
            },
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params"),
        };

        let result = match orchestrator {
            Some(orchestrator) => Self::call_tool(orchestrator, &params.name, params.arguments).await,
            None => ToolCallResult::error("Server not initialized".to_string()),
        };

        JsonRpcResponse::from_result(id, &result)
    }

    async fn call_tool(orchestrator: &Orchestrator, name: &str, args: Option<Value>) -> ToolCallResult {
        info!(tool = name, "Tool call");
        let outcome = match name {
            "search_flights" => Self::tool_search_flights(orchestrator, args).await,
            "get_flight_price_calendar" => Self::tool_price_calendar(orchestrator, args).await,
            "find_cheapest_round_trip_by_calendar" => {
                Self::tool_cheapest_round_trip(orchestrator, args).await
            }
            "get_place_suggestions" => Self::tool_place_suggestions(orchestrator, args).await,
            "generate_video" => Self::tool_generate_video(orchestrator, args).await,
            "check_video_status" => Self::tool_video_status(orchestrator, args).await,
            "cancel_video" => Self::tool_cancel_video(orchestrator, args).await,
            "generate_image" => Self::tool_generate_image(orchestrator, args).await,
            "generate_music" => Self::tool_generate_music(orchestrator, args).await,
            "list_available_models" => Ok(ToolCallResult::text(orchestrator.list_models())),
            _ => Err(ToolCallResult::error(format!("Unknown tool: {}", name))),
        };
        outcome.unwrap_or_else(|invalid| invalid)
    }

    async fn tool_search_flights(
        orchestrator: &Orchestrator,
        args: Option<Value>,
    ) -> std::result::Result<ToolCallResult, ToolCallResult> {
        let args: SearchFlightsArgs = parse_args(args)?;
        let request = FlightSearchRequest {
            origin: args.origin_airport_name,
            destination: args.destination_airport_name,
            departure: args.departure_date,
            return_date: args.return_date,
            adults: args.passengers,
        };
        let sink = ToolSink::default();
        let result = orchestrator.search_flights(&request, &sink).await;
        Ok(respond(result, &sink))
    }

    async fn tool_price_calendar(
        orchestrator: &Orchestrator,
        args: Option<Value>,
    ) -> std::result::Result<ToolCallResult, ToolCallResult> {
        let args: RouteArgs = parse_args(args)?;
        let sink = ToolSink::default();
        let result = orchestrator
            .price_calendar(&args.origin_airport_name, &args.destination_airport_name, &sink)
            .await;
        Ok(respond(result, &sink))
    }

    async fn tool_cheapest_round_trip(
        orchestrator: &Orchestrator,
        args: Option<Value>,
    ) -> std::result::Result<ToolCallResult, ToolCallResult> {
        let args: CheapestArgs = parse_args(args)?;
        let sink = ToolSink::default();
        let result = orchestrator
            .cheapest_round_trip(
                &args.origin_airport_name,
                &args.destination_airport_name,
                args.trip_duration_days,
                &sink,
            )
            .await;
        Ok(respond(result, &sink))
    }

    async fn tool_place_suggestions(
        orchestrator: &Orchestrator,
        args: Option<Value>,
    ) -> std::result::Result<ToolCallResult, ToolCallResult> {
        let request: PlaceSearchRequest = parse_args(args)?;
        let sink = ToolSink::default();
        let result = orchestrator.search_places(&request, &sink).await;
        Ok(respond(result, &sink))
    }

    async fn tool_generate_video(
        orchestrator: &Orchestrator,
        args: Option<Value>,
    ) -> std::result::Result<ToolCallResult, ToolCallResult> {
        let selected: ProviderArgs = parse_args(args.clone())?;
        let job = match provider(selected.provider.as_deref()) {
            Ok(VideoProvider::Replicate) => VideoJob::Replicate(parse_args::<ReplicateRequest>(args)?),
            Ok(VideoProvider::Veo) => VideoJob::Veo(parse_args::<VeoRequest>(args)?),
            Err(e) => return Err(ToolCallResult::error(e.to_string())),
        };
        let sink = ToolSink::default();
        let result = orchestrator.generate_video(&job, &sink).await;
        Ok(respond(result, &sink))
    }

    async fn tool_video_status(
        orchestrator: &Orchestrator,
        args: Option<Value>,
    ) -> std::result::Result<ToolCallResult, ToolCallResult> {
        let args: JobArgs = parse_args(args)?;
        let provider =
            provider(args.provider.as_deref()).map_err(|e| ToolCallResult::error(e.to_string()))?;
        let sink = ToolSink::default();
        let result = orchestrator.video_status(provider, &args.job_id, &sink).await;
        Ok(respond(result, &sink))
    }

    async fn tool_cancel_video(
        orchestrator: &Orchestrator,
        args: Option<Value>,
    ) -> std::result::Result<ToolCallResult, ToolCallResult> {
        let args: JobArgs = parse_args(args)?;
        let provider =
            provider(args.provider.as_deref()).map_err(|e| ToolCallResult::error(e.to_string()))?;
        let sink = ToolSink::default();
        let result = orchestrator.cancel_video(provider, &args.job_id, &sink).await;
        Ok(respond(result, &sink))
    }

    async fn tool_generate_image(
        orchestrator: &Orchestrator,
        args: Option<Value>,
    ) -> std::result::Result<ToolCallResult, ToolCallResult> {
        let request: ImageRequest = parse_args(args)?;
        let sink = ToolSink::default();
        let result = orchestrator.generate_image(request, &sink).await;
        Ok(respond(result, &sink))
    }

    async fn tool_generate_music(
        orchestrator: &Orchestrator,
        args: Option<Value>,
    ) -> std::result::Result<ToolCallResult, ToolCallResult> {
        let request: MusicRequest = parse_args(args)?;
        let sink = ToolSink::default();
        let result = orchestrator.generate_music(&request, &sink).await;
        Ok(respond(result, &sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VenteError;

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    fn tool_text(response: &JsonRpcResponse) -> (String, bool) {
        let result = response.result.as_ref().unwrap();
        let text = result["content"][0]["text"].as_str().unwrap().to_string();
        let is_error = result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false);
        (text, is_error)
    }

    async fn initialized() -> McpServer {
        let mut server = McpServer::new(Settings::default());
        let response = server
            .handle_request(request(1, "initialize", json!({})))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["serverInfo"]["name"], "vente");
        server
    }

    #[tokio::test]
    async fn test_tools_list() {
        let mut server = McpServer::new(Settings::default());
        let response = server
            .handle_request(request(2, "tools/list", json!({})))
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 10);
    }

    #[tokio::test]
    async fn test_unknown_method_and_notification() {
        let mut server = McpServer::new(Settings::default());
        let response = server
            .handle_request(request(3, "resources/list", json!({})))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);

        let notification: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        assert!(server.handle_request(notification).await.is_none());
    }

    #[tokio::test]
    async fn test_tool_call_requires_initialize() {
        let mut server = McpServer::new(Settings::default());
        let response = server
            .handle_request(request(
                4,
                "tools/call",
                json!({"name": "list_available_models"}),
            ))
            .await
            .unwrap();
        let (text, is_error) = tool_text(&response);
        assert!(is_error);
        assert_eq!(text, "Server not initialized");
    }

    #[tokio::test]
    async fn test_list_models_tool() {
        let mut server = initialized().await;
        let response = server
            .handle_request(request(
                5,
                "tools/call",
                json!({"name": "list_available_models", "arguments": {}}),
            ))
            .await
            .unwrap();
        let (text, is_error) = tool_text(&response);
        assert!(!is_error);
        assert!(text.starts_with("Available Vertex AI Models:"));
    }

    #[tokio::test]
    async fn test_validation_errors_surface_as_tool_errors() {
        let mut server = initialized().await;

        let response = server
            .handle_request(request(
                6,
                "tools/call",
                json!({
                    "name": "find_cheapest_round_trip_by_calendar",
                    "arguments": {
                        "origin_airport_name": "AMS",
                        "destination_airport_name": "BCN",
                        "trip_duration_days": 0
                    }
                }),
            ))
            .await
            .unwrap();
        let (text, is_error) = tool_text(&response);
        assert!(is_error);
        assert!(text.starts_with("Invalid input:"));

        let response = server
            .handle_request(request(
                7,
                "tools/call",
                json!({"name": "search_flights", "arguments": {"origin_airport_name": "AMS"}}),
            ))
            .await
            .unwrap();
        let (text, is_error) = tool_text(&response);
        assert!(is_error);
        assert!(text.starts_with("Invalid arguments:"));

        let response = server
            .handle_request(request(
                8,
                "tools/call",
                json!({"name": "check_video_status", "arguments": {"provider": "sora", "job_id": "x"}}),
            ))
            .await
            .unwrap();
        let (text, _) = tool_text(&response);
        assert!(text.contains("Unknown video provider 'sora'"));
    }

    #[tokio::test]
    async fn test_tool_calls_run_off_the_request_loop() {
        let mut server = McpServer::new(Settings::default());
        let early = request(9, "tools/call", json!({"name": "list_available_models"}));
        let early = match server.spawn_tool_call(early) {
            Err(request) => request,
            Ok(_) => panic!("tool call spawned before initialize"),
        };
        let (text, _) = tool_text(&server.handle_request(early).await.unwrap());
        assert_eq!(text, "Server not initialized");

        let mut server = initialized().await;
        let places = request(
            10,
            "tools/call",
            json!({"name": "get_place_suggestions", "arguments": {"query": " "}}),
        );
        let task = match server.spawn_tool_call(places) {
            Ok(task) => task,
            Err(_) => panic!("tool call was not spawned"),
        };

        let ping = request(11, "ping", json!({}));
        let ping = match server.spawn_tool_call(ping) {
            Err(request) => request,
            Ok(_) => panic!("ping spawned as a tool call"),
        };
        let pong = server.handle_request(ping).await.unwrap();
        assert_eq!(pong.id, Some(json!(11)));

        let response = task.await.unwrap();
        assert_eq!(response.id, Some(json!(10)));
        let (text, is_error) = tool_text(&response);
        assert!(is_error);
        assert!(text.starts_with("Invalid input:"));
    }

    #[test]
    fn test_respond_appends_messages() {
        let sink = ToolSink::default();
        sink.message("<video>\nhttps://v/1.mp4\n</video>");
        let result = serde_json::to_value(respond(Ok("Done".to_string()), &sink)).unwrap();
        assert_eq!(
            result["content"][0]["text"],
            "Done\n\n<video>\nhttps://v/1.mp4\n</video>"
        );

        let timeout = VenteError::Timeout {
            attempts: 3,
            last_status: "pending".into(),
        };
        let result = respond(Err(timeout), &sink);
        assert_eq!(result.is_error, Some(true));
    }

    #[test]
    fn test_provider_defaults_to_replicate() {
        assert_eq!(provider(None).unwrap(), VideoProvider::Replicate);
        assert_eq!(provider(Some("veo")).unwrap(), VideoProvider::Veo);
    }
}
