//! MCP Integration Tests
//!
//! Client and server wired together in-process over an in-memory pipe, and
//! against the built binary spawned as a child process.

#![allow(deprecated)] // Allow deprecated cargo_bin for now

use assert_cmd::cargo::CommandCargoExt;
use assert_cmd::Command as AssertCommand;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use mcp_bridge::config::{ClientConfig, PeerCommand, ServerConfig};
use mcp_bridge::mcp::handler::{success_result, ToolRegistry};
use mcp_bridge::mcp::resources::ResourceRegistry;
use mcp_bridge::mcp::schema::ToolBuilder;
use mcp_bridge::mcp::transport::StreamTransport;
use mcp_bridge::mcp::{McpClient, McpServer, ToolArgs};
use mcp_bridge::tools;
use mcp_bridge::Error;

const BIN: &str = env!("CARGO_BIN_EXE_mcp-bridge");

/// Raw JSON-RPC client that talks to the binary over stdio line by line.
struct McpTestClient {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    request_id: i64,
}

impl McpTestClient {
    fn spawn() -> Result<Self, Box<dyn std::error::Error>> {
        let mut child = Command::cargo_bin("mcp-bridge")?
            .arg("serve")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child.stdin.take().expect("Failed to get stdin");
        let stdout = BufReader::new(child.stdout.take().expect("Failed to get stdout"));

        Ok(Self {
            child,
            stdin,
            stdout,
            request_id: 0,
        })
    }

    fn send_raw(&mut self, line: &str) -> Result<(), Box<dyn std::error::Error>> {
        writeln!(self.stdin, "{}", line)?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Send a JSON-RPC request and get the response
    fn request(&mut self, method: &str, params: Value) -> Result<Value, Box<dyn std::error::Error>> {
        self.request_id += 1;
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.request_id,
            "method": method,
            "params": params
        });
        self.send_raw(&serde_json::to_string(&request)?)?;

        let mut response_line = String::new();
        self.stdout.read_line(&mut response_line)?;
        Ok(serde_json::from_str(&response_line)?)
    }

    fn initialize(&mut self) -> Result<Value, Box<dyn std::error::Error>> {
        let response = self.request(
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            }),
        )?;
        self.send_raw(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)?;
        Ok(response)
    }
}

impl Drop for McpTestClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

fn builtin_server() -> McpServer {
    let config = ServerConfig::default();
    let mut tools = ToolRegistry::new();
    tools::register_builtin_tools(&mut tools).unwrap();
    let mut resources = ResourceRegistry::new();
    tools::register_builtin_resources(&mut resources, &tools, &config).unwrap();
    McpServer::new(config, tools, resources)
}

/// Start `server` on one end of an in-memory pipe and connect a client to
/// the other.
fn connect_in_process(server: McpServer) -> (McpClient, tokio::task::JoinHandle<()>) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let (client_read, client_write) = tokio::io::split(client_io);

    let task = tokio::spawn(async move {
        server
            .run(StreamTransport::new(server_read, server_write))
            .await
            .unwrap();
    });
    let client = McpClient::connect(client_read, client_write, ClientConfig::default());
    (client, task)
}

// ============================================================================
// In-process
// ============================================================================

#[tokio::test]
async fn test_echo_end_to_end_in_process() {
    let (client, server) = connect_in_process(builtin_server());

    let init = client.initialize().await.unwrap();
    assert_eq!(init.server_info.name, "mcp-bridge");
    assert_eq!(init.protocol_version, "2024-11-05");

    let raw = client
        .call("tools/call", Some(json!({"name": "echo", "arguments": {"text": "hi"}})))
        .await
        .unwrap();
    assert_eq!(
        raw,
        json!({"content": [{"type": "text", "text": "hi"}], "isError": false})
    );

    client.close().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop after client closed")
        .unwrap();
}

#[tokio::test]
async fn test_tool_failures_are_results_not_errors() {
    let (client, _server) = connect_in_process(builtin_server());
    client.initialize().await.unwrap();

    let missing = client.call_tool("echo", json!({})).await.unwrap();
    assert!(missing.is_error);
    assert_eq!(missing.text(), "missing required field text");

    let unknown = client.call_tool("no_such_tool", json!({})).await.unwrap();
    assert!(unknown.is_error);

    // the connection survives both
    let ok = client
        .call_tool("transform_text", json!({"text": "ab", "case": "upper", "repeat": 2}))
        .await
        .unwrap();
    assert_eq!(ok.text(), "AB AB");
}

#[tokio::test]
async fn test_unknown_method_is_rpc_error() {
    let (client, _server) = connect_in_process(builtin_server());
    client.initialize().await.unwrap();

    let err = client.call("prompts/list", None).await.unwrap_err();
    assert!(err.is_rpc());
    assert_eq!(err.rpc_code(), -32601);

    client.ping().await.unwrap();
}

#[tokio::test]
async fn test_list_tools_and_resources() {
    let (client, _server) = connect_in_process(builtin_server());
    let init = client.initialize().await.unwrap();
    assert!(init.capabilities.resources.is_some());

    let names: Vec<_> = client
        .list_tools()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["echo", "transform_text"]);

    let resources = client.list_resources().await.unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].uri, tools::SERVER_INFO_URI);

    let read = client.read_resource(tools::SERVER_INFO_URI).await.unwrap();
    let info: Value = serde_json::from_str(read.contents[0].text.as_deref().unwrap()).unwrap();
    assert_eq!(info["tools"], json!(["echo", "transform_text"]));

    let err = client.read_resource("mcp://nowhere").await.unwrap_err();
    assert_eq!(err.rpc_code(), -32002);
}

#[tokio::test]
async fn test_concurrent_calls_share_one_connection() {
    let mut tools = ToolRegistry::new();
    let definition = ToolBuilder::new("delay", "Answer after a delay")
        .integer("millis", "Delay in milliseconds", true)
        .build()
        .unwrap();
    tools
        .register_fn(definition, |args: ToolArgs| async move {
            let millis = args.require_i64("millis")?;
            tokio::time::sleep(Duration::from_millis(millis as u64)).await;
            Ok::<_, Error>(success_result(millis.to_string()))
        })
        .unwrap();
    let server = McpServer::with_tools(ServerConfig::default(), tools);

    let (client, _server) = connect_in_process(server);
    let client = Arc::new(client);
    client.initialize().await.unwrap();

    let mut handles = Vec::new();
    for millis in [30, 10, 20, 0] {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let result = client
                .call_tool("delay", json!({"millis": millis}))
                .await
                .unwrap();
            assert_eq!(result.text(), millis.to_string());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(client.pending_calls(), 0);
}

// ============================================================================
// Spawned binary
// ============================================================================

#[tokio::test]
async fn test_client_spawns_binary_and_echoes() {
    let peer = PeerCommand {
        command: BIN.to_string(),
        args: vec!["serve".to_string(), "--name".to_string(), "spawned".to_string()],
        ..Default::default()
    };
    let client = McpClient::spawn(&peer, ClientConfig::default()).unwrap();

    let init = client.initialize().await.unwrap();
    assert_eq!(init.server_info.name, "spawned");

    let result = client.call_tool("echo", json!({"text": "hi"})).await.unwrap();
    assert!(!result.is_error);
    assert_eq!(result.text(), "hi");

    // closing stdin lets the server reach EOF and exit cleanly
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_client_spawn_missing_binary() {
    let peer = PeerCommand {
        command: "/nonexistent/mcp-server".to_string(),
        ..Default::default()
    };
    let err = McpClient::spawn(&peer, ClientConfig::default())
        .err()
        .expect("spawn should fail");
    assert!(err.is_transport());
}

#[test]
fn test_raw_stdio_session() {
    let mut client = McpTestClient::spawn().expect("Failed to spawn MCP server");

    let response = client.initialize().expect("Failed to initialize");
    let result = &response["result"];
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert!(result["capabilities"].get("tools").is_some());

    // garbage is skipped, the next request still gets its answer
    client.send_raw("not json at all").unwrap();
    let response = client.request("ping", json!({})).unwrap();
    assert_eq!(response["result"], json!({}));

    let response = client
        .request("tools/call", json!({"name": "echo", "arguments": {"text": "raw"}}))
        .unwrap();
    assert_eq!(response["result"]["content"][0]["text"], "raw");
}

// ============================================================================
// Command line
// ============================================================================

#[test]
fn test_binary_help() {
    AssertCommand::cargo_bin("mcp-bridge")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Model Context Protocol"));
}

#[test]
fn test_binary_version() {
    AssertCommand::cargo_bin("mcp-bridge")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mcp-bridge"));
}

#[test]
fn test_call_subcommand_against_self() {
    AssertCommand::cargo_bin("mcp-bridge")
        .unwrap()
        .args(["call", "--tool", "echo", "--arguments", r#"{"text":"hello"}"#, BIN, "serve"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""text": "hello""#));
}

#[test]
fn test_call_subcommand_lists_tools() {
    AssertCommand::cargo_bin("mcp-bridge")
        .unwrap()
        .args(["call", BIN, "serve"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("transform_text"));
}

#[test]
fn test_call_subcommand_rejects_bad_json() {
    AssertCommand::cargo_bin("mcp-bridge")
        .unwrap()
        .args(["call", "--tool", "echo", "--arguments", "{oops", BIN, "serve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}
