use clap::{App, Arg};
use std::time::Duration;
use tanktwin::collaborators::{JsonLinesSink, LevelPublisher, MeasurementSink};
use tanktwin::record::LevelSample;
use tanktwin::{Pacing, Simulation, SinkError, SystemConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time;
use tracing::{error, info, warn};

const DEFAULT_PORT: &str = "8080";
const DEFAULT_RECORDS_PATH: &str = "tank_records.jsonl";
const LEVEL_BROADCAST_BUFFER_SIZE: usize = 256;

/// Communication collaborator: one JSON line per sample to every TCP client.
struct BroadcastPublisher {
    tx: broadcast::Sender<String>,
}

impl LevelPublisher for BroadcastPublisher {
    fn publish(&mut self, sample: &LevelSample) -> Result<(), SinkError> {
        let line = serde_json::to_string(sample)?;
        // No connected client is not a failure for a fire-and-forget uplink.
        let receivers = self.tx.send(line).unwrap_or(0);
        info!("📡 level {:.2} cm -> {} client(s)", sample.level, receivers);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("tanktwin-simulator")
        .version("0.1.0")
        .about("Real-time tank digital twin with TCP level streaming")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("TCP port for level streaming")
                .takes_value(true)
                .default_value(DEFAULT_PORT),
        )
        .arg(
            Arg::with_name("records")
                .short("r")
                .long("records")
                .value_name("FILE")
                .help("JSON-lines file measurement records are appended to")
                .takes_value(true)
                .default_value(DEFAULT_RECORDS_PATH),
        )
        .arg(
            Arg::with_name("duration")
                .short("t")
                .long("duration")
                .value_name("SECONDS")
                .help("Simulated seconds to run (default: until Ctrl-C)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("time-scale")
                .long("time-scale")
                .value_name("FACTOR")
                .help("Run this many times faster than real time")
                .takes_value(true)
                .default_value("1.0"),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => SystemConfig::from_json_file(path)?,
        None => SystemConfig::default(),
    };
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let time_scale: f64 = matches.value_of("time-scale").unwrap_or("1.0").parse()?;
    let frame_limit = match matches.value_of("duration") {
        Some(secs) => Some(config.frames_for_duration(secs.parse()?)),
        None => None,
    };
    let records_path = matches.value_of("records").unwrap_or(DEFAULT_RECORDS_PATH);

    println!("🛢️  Tank Digital Twin Simulator");
    println!("==============================");

    let (level_tx, _) = broadcast::channel(LEVEL_BROADCAST_BUFFER_SIZE);
    let sink = JsonLinesSink::append_to(records_path)?;
    let publisher = BroadcastPublisher {
        tx: level_tx.clone(),
    };
    let mut sim = Simulation::new(&config, sink, publisher)?;
    sim.twin_mut().set_simulate_acquisition_delay(true);

    info!(
        "frame {} ms, major frame {} frames, records -> {}",
        config.schedule.base_period_ms,
        sim.executive()
            .schedule()
            .major_frame()
            .map_or_else(|| "n/a".to_string(), |f| f.to_string()),
        records_path
    );

    let tcp_tx = level_tx.clone();
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = start_tcp_server(port, tcp_tx).await {
            error!("TCP server error: {}", e);
        }
    });

    let base_period = config.schedule.base_period();
    let period = Pacing::RealTime { time_scale }
        .frame_period(base_period)
        .unwrap_or(base_period);
    let mut interval = time::interval(period.max(Duration::from_micros(1)));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        if frame_limit.is_some_and(|limit| sim.executive().frame_counter() >= limit) {
            break;
        }

        tokio::select! {
            _ = interval.tick() => {
                // The acquisition settle time sleeps the thread; keep it off the async workers.
                let report = tokio::task::block_in_place(|| sim.step());
                if !report.overruns.is_empty() {
                    warn!("frame {} overran on {:?}", report.frame, report.overruns);
                }
            }
            _ = &mut shutdown => {
                info!("Ctrl-C received, stopping after last committed frame");
                break;
            }
        }
    }

    if let Err(e) = sim.twin_mut().sink_mut().flush() {
        error!("failed to flush records: {}", e);
    }
    tcp_server.abort();

    let stats = sim.twin().stats();
    let snapshot = sim.twin().snapshot();
    println!(
        "✅ Stopped after {} frames | level {:.2} cm | mode {} | {} records, {} samples published",
        sim.executive().frame_counter(),
        snapshot.fused_level,
        snapshot.mode,
        stats.records_stored,
        stats.samples_published
    );

    Ok(())
}

async fn start_tcp_server(
    port: u16,
    level_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("🌐 Streaming levels on TCP port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 Client connected: {}", addr);
                let level_rx = level_tx.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = stream_levels(stream, level_rx).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("🔌 Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn stream_levels(
    mut stream: TcpStream,
    mut level_rx: broadcast::Receiver<String>,
) -> Result<(), std::io::Error> {
    loop {
        match level_rx.recv().await {
            Ok(line) => {
                stream.write_all(line.as_bytes()).await?;
                stream.write_all(b"\n").await?;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Client lagging, skipped {} samples", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

