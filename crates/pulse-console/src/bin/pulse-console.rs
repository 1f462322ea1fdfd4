use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use pulse_console::{spawn_console, ConsoleHandle, ConsoleSnapshot};
use pulse_core::config::{load_config, Config};
use pulse_core::logging::init_tracing;
use pulse_core::{GroupKey, GroupOptions, LogEntry, LogLevel, Mode, NewRecord, SortDirection};
use pulse_store::instrumentation::{
    HttpRequest, HttpResponse, InstrumentationContext, NetworkLogger, Transport, TransportError,
};
use pulse_store::{InMemoryRecordStore, RecordSink, RecordStore};

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    json: bool,
    requests: usize,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        requests: 40,
        ..Args::default()
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                args.config = Some(iter.next().ok_or("--config requires a path")?);
            }
            "--json" => args.json = true,
            "--requests" => {
                let raw = iter.next().ok_or("--requests requires a number")?;
                args.requests = raw
                    .parse()
                    .map_err(|_| format!("invalid --requests value: {raw}"))?;
            }
            "-h" | "--help" => {
                return Err("usage: pulse-console [--config PATH] [--json] [--requests N]".into())
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

/// Deterministic stand-in for an HTTP client.
struct SimulatedTransport;

impl Transport for SimulatedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let n = request.url.len() + request.url.bytes().map(usize::from).sum::<usize>();
        match n % 9 {
            0 => Err(TransportError::Timeout { after_ms: 30_000 }),
            1 => Err(TransportError::Connect("connection refused".into())),
            2 | 3 => Ok(HttpResponse {
                status: 500,
                body_len: 64,
            }),
            4 => Ok(HttpResponse {
                status: 404,
                body_len: 0,
            }),
            _ => Ok(HttpResponse {
                status: 200,
                body_len: 512,
            }),
        }
    }
}

fn seed(store: &Arc<InMemoryRecordStore>, requests: usize) -> Result<(), String> {
    let session = Uuid::new_v4();
    let sink: Arc<dyn RecordSink> = store.clone();
    let context = InstrumentationContext::new();
    context.register(Arc::new(NetworkLogger::new(Arc::clone(&sink), session)));
    let transport = context.instrument(SimulatedTransport);

    let hosts = ["api.example.com", "cdn.example.com", "auth.example.com"];
    for idx in 0..requests {
        let host = hosts[idx % hosts.len()];
        let method = if idx % 4 == 0 { "POST" } else { "GET" };
        let request = HttpRequest::new(method, &format!("https://{host}/v1/items/{idx}"));
        // Failures are recorded as tasks; the demo only cares about the log.
        let _ = transport.send(&request);

        let level = LogLevel::ALL[idx % LogLevel::ALL.len()];
        let entry = LogEntry::new(level, "app", &format!("processed batch {idx}"));
        sink.append(NewRecord::log(session, entry))
            .map_err(|err| format!("append failed: {err}"))?;
    }
    Ok(())
}

fn print_snapshot(step: &str, snapshot: &ConsoleSnapshot, json: bool) -> Result<(), String> {
    if json {
        let line = serde_json::to_string(snapshot).map_err(|err| err.to_string())?;
        println!("{line}");
        return Ok(());
    }
    println!(
        "{step:<12} mode={:<5} results={:<4} visible={:<4} logs={:<4} tasks={:<4} criteria={}",
        snapshot.mode.as_str(),
        snapshot.result_count,
        snapshot.visible_ids.len(),
        snapshot.log_count,
        snapshot.task_count,
        snapshot.criteria.active_label(),
    );
    if let Some(sections) = &snapshot.sections {
        for section in sections {
            println!("{:>14} {:<24} {}", "", section.key, section.len());
        }
    }
    Ok(())
}

async fn show(handle: &ConsoleHandle, step: &str, json: bool) -> Result<(), String> {
    let snapshot = handle.snapshot().await.map_err(|err| err.to_string())?;
    print_snapshot(step, &snapshot, json)
}

async fn run(cfg: Config, args: &Args) -> Result<(), String> {
    let store = Arc::new(InMemoryRecordStore::with_config(&cfg.store));
    seed(&store, args.requests)?;

    let handle = spawn_console(store.clone() as Arc<dyn RecordStore>, &cfg.console);
    handle.set_visible(true).map_err(|err| err.to_string())?;
    show(&handle, "initial", args.json).await?;

    handle.set_filter_term("api").map_err(|err| err.to_string())?;
    tokio::time::sleep(cfg.console.filter_term_throttle() + Duration::from_millis(10)).await;
    show(&handle, "term", args.json).await?;

    handle.set_only_errors(true).map_err(|err| err.to_string())?;
    show(&handle, "errors", args.json).await?;

    handle.set_mode(Mode::Tasks).map_err(|err| err.to_string())?;
    handle
        .send(pulse_console::ConsoleCommand::SetGroup(Some(GroupOptions::new(
            GroupKey::Host,
            SortDirection::Ascending,
        ))))
        .map_err(|err| err.to_string())?;
    show(&handle, "tasks", args.json).await?;

    handle.shutdown().await.map_err(|err| err.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };
    let (cfg, loaded_from) = match load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_tracing(&cfg.logging) {
        eprintln!("logging setup failed: {err}");
        return ExitCode::FAILURE;
    }
    if let Some(path) = loaded_from {
        tracing::info!(path = %path.display(), "loaded config");
    }

    match run(cfg, &args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("pulse-console: {message}");
            ExitCode::FAILURE
        }
    }
}
