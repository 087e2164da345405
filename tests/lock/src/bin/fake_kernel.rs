//! Stand-in kernel speaking the stdio JSON-lines protocol.
//!
//! Answers `kernel_info_request` on shell, runs each `execute_request` by
//! interpreting the first word of its code, and exits on `shutdown_request`
//! or EOF. With `--ignore-shutdown` it lingers for a minute instead, so the
//! harness has to kill it. Every broadcast message carries the request id as
//! its parent, and each completed execution is answered with an
//! `execute_reply` on shell.
//!
//! Usage: `fake_kernel [--never-ready] [--ready-delay-ms N] [--ignore-shutdown]`
//!
//! Code directives:
//!   `print <text>`  stdout stream `<text>\n`
//!   `warn <text>`   stderr stream `<text>\n`
//!   `table`         execute_result with a text/plain table
//!   `table-html`    same, plus text/html
//!   `png`           display_data with a base64 PNG
//!   `fail`          error message
//!   `echo`          execute_input (not a broadcast type the harness knows)
//!   `idle-twice`    idle marker for a setup phase, then output, then idle
//!   `garbage`       a malformed stdout line, then a stdout stream
//!   `garbage-bytes` a stdout line that is not UTF-8, then a stdout stream
//!   `silent`        busy, then nothing
//!   `exit`          exits mid-execution

use std::io::{BufRead, Write};
use std::time::Duration;

use base64::Engine as _;
use outcheck_harness::stdio::{Channel, Frame};
use outcheck_wire::message::{
    MSG_EXECUTE_REPLY, MSG_EXECUTE_REQUEST, MSG_KERNEL_INFO_REPLY, MSG_KERNEL_INFO_REQUEST,
    MSG_SHUTDOWN_REQUEST,
};
use outcheck_wire::RawMessage;
use serde_json::json;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01";
const TABLE: &str = "      Source |       SS\n-------------+----------\n       Model |  1.52e+09\n    Residual |  4.43e+08";

struct Kernel<W: Write> {
    out: W,
    execution_count: i64,
    next_id: u64,
}

impl<W: Write> Kernel<W> {
    fn emit(&mut self, channel: Channel, message: RawMessage, parent: &str) {
        self.next_id += 1;
        let frame = Frame {
            channel,
            message: message
                .with_id(format!("fake-{}", self.next_id))
                .with_parent(parent),
        };
        let line = serde_json::to_string(&frame).expect("frame serializes");
        writeln!(self.out, "{line}").expect("stdout write");
        self.out.flush().expect("stdout flush");
    }

    fn iopub(&mut self, message: RawMessage, parent: &str) {
        self.emit(Channel::Iopub, message, parent);
    }

    fn execute(&mut self, parent: &str, code: &str) {
        self.execution_count += 1;
        let count = self.execution_count;
        let (directive, rest) = code.split_once(' ').unwrap_or((code, ""));

        self.iopub(RawMessage::status("busy"), parent);
        match directive {
            "print" => self.iopub(RawMessage::stream("stdout", &format!("{rest}\n")), parent),
            "warn" => self.iopub(RawMessage::stream("stderr", &format!("{rest}\n")), parent),
            "table" => self.iopub(
                RawMessage::execute_result(count, json!({ "text/plain": TABLE })),
                parent,
            ),
            "table-html" => self.iopub(
                RawMessage::execute_result(
                    count,
                    json!({
                        "text/plain": TABLE,
                        "text/html": "<table><tr><th>Source</th><th>SS</th></tr></table>",
                    }),
                ),
                parent,
            ),
            "png" => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(PNG);
                self.iopub(
                    RawMessage::display_data(json!({
                        "image/png": encoded,
                        "text/plain": "<Figure size 640x480>",
                    })),
                    parent,
                );
            }
            "fail" => self.iopub(
                RawMessage::error("r(111)", "variable not found", &["r(111);"]),
                parent,
            ),
            "echo" => self.iopub(
                RawMessage::new("execute_input", json!({ "code": code, "execution_count": count })),
                parent,
            ),
            "idle-twice" => {
                self.iopub(RawMessage::status("idle"), parent);
                self.iopub(RawMessage::status("busy"), parent);
                self.iopub(RawMessage::stream("stdout", "after setup\n"), parent);
            }
            "garbage" => {
                writeln!(self.out, "{{not a frame").expect("stdout write");
                self.iopub(RawMessage::stream("stdout", "still here\n"), parent);
            }
            "garbage-bytes" => {
                self.out.write_all(b"\xff\xfe{\n").expect("stdout write");
                self.iopub(RawMessage::stream("stdout", "still here\n"), parent);
            }
            "silent" => return,
            "exit" => std::process::exit(3),
            _ => {}
        }
        self.iopub(RawMessage::status("idle"), parent);
        self.emit(
            Channel::Shell,
            RawMessage::new(
                MSG_EXECUTE_REPLY,
                json!({ "status": "ok", "execution_count": count }),
            ),
            parent,
        );
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let never_ready = args.iter().any(|a| a == "--never-ready");
    let ignore_shutdown = args.iter().any(|a| a == "--ignore-shutdown");
    let ready_delay = args
        .iter()
        .position(|a| a == "--ready-delay-ms")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis);

    let mut kernel = Kernel {
        out: std::io::stdout().lock(),
        execution_count: 0,
        next_id: 0,
    };

    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let Ok(frame) = serde_json::from_str::<Frame>(&line) else {
            eprintln!("fake_kernel: ignoring malformed request");
            continue;
        };
        let request = frame.message;
        let request_id = request.header.msg_id.clone();
        match request.msg_type() {
            MSG_KERNEL_INFO_REQUEST if !never_ready => {
                if let Some(delay) = ready_delay {
                    std::thread::sleep(delay);
                }
                kernel.emit(
                    Channel::Shell,
                    RawMessage::new(
                        MSG_KERNEL_INFO_REPLY,
                        json!({ "status": "ok", "implementation": "fake_kernel" }),
                    ),
                    &request_id,
                );
            }
            MSG_EXECUTE_REQUEST => {
                let code = request.content["code"].as_str().unwrap_or_default().to_string();
                kernel.execute(&request_id, &code);
            }
            MSG_SHUTDOWN_REQUEST if !ignore_shutdown => break,
            _ => {}
        }
    }
    if ignore_shutdown {
        std::thread::sleep(Duration::from_secs(60));
    }
}
