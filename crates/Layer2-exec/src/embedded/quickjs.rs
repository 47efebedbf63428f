//! QuickJS engine - `.js` entries run in-process
//!
//! The script gets `console.log/info/warn/error` wired to the job's output
//! and `input(prompt)` reading one line of the job's stdin. Cancellation is
//! observed by the runtime's interrupt handler between bytecode steps and by
//! `input` while it waits, so a kill lands at the next step rather than
//! instantly.

use super::{Engine, EngineJob};
use crate::job::OutputSender;
use crate::sandbox::ResolvedEntry;
use async_trait::async_trait;
use orbit_foundation::{Error, Result};
use parking_lot::Mutex;
use rquickjs::function::{Opt, Rest};
use rquickjs::{Context, Ctx, Function, Object, Runtime, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const INPUT_POLL: Duration = Duration::from_millis(20);

/// QuickJS-backed engine for JavaScript
#[derive(Debug, Clone, Default)]
pub struct QuickJsEngine {
    memory_limit: Option<usize>,
}

impl QuickJsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }
}

#[async_trait]
impl Engine for QuickJsEngine {
    fn name(&self) -> &'static str {
        "quickjs"
    }

    fn handles(&self, entry: &ResolvedEntry) -> bool {
        entry.extension == "js"
    }

    async fn execute(&self, job: EngineJob<'_>) -> Result<i32> {
        let source = tokio::fs::read_to_string(job.entry.host_path(job.session.workspace())).await?;
        let output = job
            .sink
            .output()
            .ok_or_else(|| Error::Internal("job sink already closed".into()))?;

        // the script owns stdin until it finishes
        let stdin = std::mem::replace(&mut job.control.stdin, mpsc::unbounded_channel().1);
        let cancel = job.control.cancel.clone();
        let script = Script {
            name: job.entry.vpath.clone(),
            source,
            memory_limit: self.memory_limit,
        };

        tokio::task::spawn_blocking(move || script.run(output, stdin, cancel))
            .await
            .map_err(|e| Error::Internal(format!("QuickJS task failed: {}", e)))?
    }
}

struct Script {
    name: String,
    source: String,
    memory_limit: Option<usize>,
}

impl Script {
    fn run(
        self,
        output: OutputSender,
        stdin: mpsc::UnboundedReceiver<Vec<u8>>,
        cancel: CancellationToken,
    ) -> Result<i32> {
        let runtime = Runtime::new()
            .map_err(|e| Error::Internal(format!("failed to create QuickJS runtime: {}", e)))?;
        if let Some(limit) = self.memory_limit {
            runtime.set_memory_limit(limit);
        }
        let flag = cancel.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || flag.is_cancelled())));

        let context = Context::full(&runtime)
            .map_err(|e| Error::Internal(format!("failed to create QuickJS context: {}", e)))?;
        let reader = Arc::new(Mutex::new(LineReader::new(stdin, cancel.clone())));

        debug!(script = %self.name, "evaluating");
        context.with(|ctx| {
            install_globals(&ctx, &output, &reader)
                .map_err(|e| Error::Internal(format!("failed to set up globals: {}", e)))?;

            let result = ctx.eval::<(), _>(self.source.as_str()).and_then(|()| {
                while ctx.execute_pending_job() {}
                Ok(())
            });

            match result {
                Ok(()) => Ok(0),
                Err(_) if cancel.is_cancelled() => Err(Error::Cancelled),
                Err(err) => Err(Error::Runtime {
                    code: 1,
                    diagnostic: format!("{}\n", describe_error(&ctx, err)),
                }),
            }
        })
    }
}

// ============================================================================
// Globals
// ============================================================================

fn install_globals(
    ctx: &Ctx<'_>,
    output: &OutputSender,
    reader: &Arc<Mutex<LineReader>>,
) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let console = Object::new(ctx.clone())?;
    for (name, to_stderr) in [("log", false), ("info", false), ("warn", true), ("error", true)] {
        let out = output.clone();
        console.set(
            name,
            Function::new(ctx.clone(), move |args: Rest<Value>| {
                let parts: Vec<String> = args.0.iter().map(js_value_to_string).collect();
                let line = format!("{}\n", parts.join(" "));
                if to_stderr {
                    out.stderr(line);
                } else {
                    out.stdout(line);
                }
            })?,
        )?;
    }
    globals.set("console", console)?;

    let out = output.clone();
    let reader = Arc::clone(reader);
    globals.set(
        "input",
        Function::new(ctx.clone(), move |prompt: Opt<String>| {
            if let Some(prompt) = prompt.0 {
                out.stdout(prompt);
            }
            reader.lock().read_line()
        })?,
    )?;

    Ok(())
}

/// Text for one console argument, formatted in the value's own context
fn js_value_to_string(val: &Value<'_>) -> String {
    use rquickjs::Type;
    match val.type_of() {
        Type::Null => "null".to_string(),
        Type::Undefined => "undefined".to_string(),
        Type::Bool => val.as_bool().map(|b| b.to_string()).unwrap_or_default(),
        Type::Int => val.as_int().map(|n| n.to_string()).unwrap_or_default(),
        Type::Float => val.as_float().map(|f| f.to_string()).unwrap_or_default(),
        Type::String => val
            .as_string()
            .and_then(|s| s.to_string().ok())
            .unwrap_or_default(),
        Type::Object | Type::Exception | Type::Array => {
            if let Some(obj) = val.as_object() {
                let name: Option<String> = obj.get("name").ok();
                let message: Option<String> = obj.get("message").ok();
                if let (Some(name), Some(message)) = (&name, &message) {
                    return format!("{}: {}", name, message);
                }
            }
            val.ctx()
                .json_stringify(val.clone())
                .ok()
                .flatten()
                .and_then(|s| s.to_string().ok())
                .unwrap_or_else(|| "[object]".to_string())
        }
        Type::Function | Type::Constructor => "[function]".to_string(),
        Type::Symbol => "[symbol]".to_string(),
        _ => format!("[{}]", val.type_name()),
    }
}

fn describe_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if err.is_exception() {
        let exc = ctx.catch();
        if let Some(obj) = exc.as_object() {
            let name: String = obj.get("name").unwrap_or_else(|_| "Error".to_string());
            let message: String = obj.get("message").unwrap_or_default();
            let stack: String = obj.get("stack").unwrap_or_default();
            return if stack.is_empty() {
                format!("Uncaught {}: {}", name, message)
            } else {
                format!("Uncaught {}: {}\n{}", name, message, stack.trim_end())
            };
        }
        return format!("Uncaught {}", js_value_to_string(&exc));
    }
    err.to_string()
}

// ============================================================================
// Input
// ============================================================================

/// Blocking line reader over the job's stdin channel
struct LineReader {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: Vec<u8>,
    cancel: CancellationToken,
    closed: bool,
}

impl LineReader {
    fn new(rx: mpsc::UnboundedReceiver<Vec<u8>>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            cancel,
            closed: false,
        }
    }

    /// Next line without its terminator; `None` at end of input or on kill
    fn read_line(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line[..pos]);
                return Some(text.trim_end_matches('\r').to_string());
            }
            if self.closed {
                if self.pending.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut self.pending);
                return Some(String::from_utf8_lossy(&rest).into_owned());
            }
            if self.cancel.is_cancelled() {
                return None;
            }
            match self.rx.try_recv() {
                Ok(bytes) => self.pending.extend_from_slice(&bytes),
                Err(mpsc::error::TryRecvError::Empty) => std::thread::sleep(INPUT_POLL),
                Err(mpsc::error::TryRecvError::Disconnected) => self.closed = true,
            }
        }
    }
}
