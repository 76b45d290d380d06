//! Minimal stdio tool server used by the end-to-end tests.
//!
//! Speaks newline-delimited JSON-RPC on stdin/stdout and implements the
//! four methods a broker client exercises: `initialize`,
//! `notifications/initialized`, `tools/list`, and `tools/call`. The single
//! exposed tool replies with a fixed text result.
//!
//! Flags:
//! - `--tool NAME`: tool name to advertise (default `t1`)
//! - `--text TEXT`: text returned by the tool (default `ok`)
//! - `--exit-after-list`: exit right after answering `tools/list`,
//!   simulating a crashing server

use pryx_broker::types::protocol::{
    CallToolResult, Implementation, InitializeResult, ListToolsResult, ProtocolVersion, ToolInfo,
};
use pryx_broker::types::{JSONRPCError, JSONRPCRequest, JSONRPCResponse};
use serde_json::json;
use std::io::{BufRead, Write};
use std::process::ExitCode;

#[derive(Debug)]
struct Options {
    tool: String,
    text: String,
    exit_after_list: bool,
}

fn parse_args() -> Options {
    let mut options = Options {
        tool: "t1".to_string(),
        text: "ok".to_string(),
        exit_after_list: false,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--tool" => {
                if let Some(value) = args.next() {
                    options.tool = value;
                }
            },
            "--text" => {
                if let Some(value) = args.next() {
                    options.text = value;
                }
            },
            "--exit-after-list" => options.exit_after_list = true,
            other => eprintln!("pryx-echo: ignoring unknown flag {other}"),
        }
    }
    options
}

fn write_response(response: &JSONRPCResponse) {
    let mut stdout = std::io::stdout().lock();
    let line = serde_json::to_string(response).expect("response serializes");
    writeln!(stdout, "{line}").expect("stdout writable");
    stdout.flush().expect("stdout flushable");
}

fn main() -> ExitCode {
    let options = parse_args();
    eprintln!("pryx-echo: serving tool '{}'", options.tool);

    let stdin = std::io::stdin().lock();
    for line in stdin.lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Notifications carry no id and get no reply.
        let Ok(request) = serde_json::from_str::<JSONRPCRequest>(line) else {
            continue;
        };
        let id = request.id.clone();

        match request.method.as_str() {
            "initialize" => {
                let result = InitializeResult {
                    protocol_version: ProtocolVersion::default(),
                    capabilities: json!({"tools": {}}),
                    server_info: Implementation::new("pryx-echo", env!("CARGO_PKG_VERSION")),
                    instructions: None,
                };
                write_response(&JSONRPCResponse::success(
                    id,
                    serde_json::to_value(result).expect("result serializes"),
                ));
            },
            "tools/list" => {
                let result = ListToolsResult {
                    tools: vec![ToolInfo::new(
                        options.tool.as_str(),
                        Some("Echo a fixed text".to_string()),
                        json!({"type": "object"}),
                    )],
                    next_cursor: None,
                };
                write_response(&JSONRPCResponse::success(
                    id,
                    serde_json::to_value(result).expect("result serializes"),
                ));
                if options.exit_after_list {
                    eprintln!("pryx-echo: exiting after tools/list");
                    return ExitCode::SUCCESS;
                }
            },
            "tools/call" => {
                let name = request
                    .params
                    .as_ref()
                    .and_then(|params| params.get("name"))
                    .and_then(|name| name.as_str())
                    .unwrap_or_default();
                let response = if name == options.tool {
                    JSONRPCResponse::success(
                        id,
                        serde_json::to_value(CallToolResult::text(options.text.clone()))
                            .expect("result serializes"),
                    )
                } else {
                    JSONRPCResponse::error(
                        id,
                        JSONRPCError::server_error(format!("unknown tool: {name}")),
                    )
                };
                write_response(&response);
            },
            other => {
                write_response(&JSONRPCResponse::error(
                    id,
                    JSONRPCError::method_not_found(other),
                ));
            },
        }
    }
    ExitCode::SUCCESS
}
