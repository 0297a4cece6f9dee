use assert_cmd::Command;
use chrono::Local;
use predicates::prelude::*;
use serde_json::{json, Value};

const WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

fn request(id: u64, method: &str, params: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }).to_string()
}

fn call_tool(id: u64, name: &str) -> String {
    request(id, "tools/call", json!({ "name": name, "arguments": {} }))
}

fn run(lines: &[String]) -> (Vec<Value>, String) {
    let mut input = lines.join("\n");
    input.push('\n');

    let assert = Command::cargo_bin("date-mcp")
        .unwrap()
        .env("RUST_LOG", "info")
        .write_stdin(input)
        .assert()
        .success();

    let output = assert.get_output();
    let responses = String::from_utf8(output.stdout.clone())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout must only carry JSON-RPC"))
        .collect();
    (responses, String::from_utf8_lossy(&output.stderr).into_owned())
}

fn text(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().unwrap()
}

#[test]
fn full_session_over_stdio() {
    let before = Local::now().date_naive();
    let (responses, stderr) = run(&[
        request(1, "initialize", json!({ "protocolVersion": "2024-11-05" })),
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string(),
        request(2, "tools/list", json!({})),
        call_tool(3, "get_day_name"),
        call_tool(4, "get_iso_date"),
    ]);
    let after = Local::now().date_naive();

    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "date");

    let tools: Vec<&str> = responses[1]["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(tools, vec!["get_day_name", "get_iso_date"]);

    let day = text(&responses[2]);
    assert!(WEEKDAYS.contains(&day), "unexpected weekday {day}");
    let expected_days = [before.format("%A").to_string(), after.format("%A").to_string()];
    assert!(expected_days.iter().any(|d| d == day));

    let iso = text(&responses[3]);
    let expected_dates = [
        before.format("%Y-%m-%d").to_string(),
        after.format("%Y-%m-%d").to_string(),
    ];
    assert!(expected_dates.iter().any(|d| d == iso), "unexpected date {iso}");

    assert!(stderr.contains("MCP server starting"));
}

#[test]
fn unknown_tool_does_not_stop_the_server() {
    let (responses, _) = run(&[call_tool(1, "unknown_tool"), call_tool(2, "get_day_name")]);

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["error"]["code"], -32601);
    assert_eq!(responses[1]["id"], 2);
    assert!(WEEKDAYS.contains(&text(&responses[1])));
}

#[test]
fn garbage_input_is_answered_and_survived() {
    let (responses, _) = run(&["this is not json".to_string(), request(2, "ping", json!({}))]);

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert!(responses[0]["id"].is_null());
    assert_eq!(responses[1]["result"], json!({}));
}

#[test]
fn closed_stdin_exits_cleanly() {
    Command::cargo_bin("date-mcp")
        .unwrap()
        .env("RUST_LOG", "off")
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn server_name_comes_from_environment() {
    let mut input = request(1, "initialize", json!({}));
    input.push('\n');

    Command::cargo_bin("date-mcp")
        .unwrap()
        .env("SERVER_NAME", "calendar")
        .env("RUST_LOG", "off")
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name":"calendar""#));
}

#[test]
fn invalid_log_filter_is_reported_on_stderr() {
    let mut input = request(1, "ping", json!({}));
    input.push('\n');

    Command::cargo_bin("date-mcp")
        .unwrap()
        .env("RUST_LOG", "date_mcp=loudest")
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id":1"#))
        .stderr(predicate::str::contains("ignoring invalid RUST_LOG"));
}

/// Start the server with stdin held open and wait for its startup log line.
#[cfg(unix)]
fn spawn_and_wait_for_startup() -> (std::process::Child, std::process::ChildStdin) {
    use std::io::{BufRead, BufReader};
    use std::process::Stdio;

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("date-mcp"))
        .env("RUST_LOG", "info")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let stdin = child.stdin.take().unwrap();
    let stderr = child.stderr.take().unwrap();
    let mut lines = BufReader::new(stderr).lines();
    loop {
        let line = lines
            .next()
            .expect("server exited before starting")
            .unwrap();
        if line.contains("MCP server starting") {
            break;
        }
    }
    // Keep draining stderr so the child never blocks on a full pipe.
    std::thread::spawn(move || lines.for_each(drop));
    (child, stdin)
}

#[cfg(unix)]
#[test]
fn sigterm_exits_cleanly() {
    use std::io::Read;

    let (mut child, stdin) = spawn_and_wait_for_startup();

    let kill = std::process::Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(kill.success());

    let status = child.wait().unwrap();
    drop(stdin);
    assert_eq!(status.code(), Some(0));

    let mut stdout = String::new();
    child.stdout.take().unwrap().read_to_string(&mut stdout).unwrap();
    assert!(stdout.is_empty());
}

#[cfg(unix)]
#[test]
fn sigint_exits_cleanly() {
    let (mut child, stdin) = spawn_and_wait_for_startup();

    let kill = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(kill.success());

    let status = child.wait().unwrap();
    drop(stdin);
    assert_eq!(status.code(), Some(0));
}

#[cfg(unix)]
#[test]
fn unreadable_stdin_is_a_fatal_transport_error() {
    // Reading a directory fails with EISDIR on the first read.
    let dir = std::fs::File::open("/").unwrap();

    let output = std::process::Command::new(assert_cmd::cargo::cargo_bin("date-mcp"))
        .env("RUST_LOG", "off")
        .stdin(dir)
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("stdio transport failed"));
}
