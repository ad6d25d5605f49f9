use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tanktwin::collaborators::{
    JsonLinesSink, LevelForecaster, MeasurementSink, MemorySink, TracingPublisher, TrendForecaster,
};
use tanktwin::twin::TwinSnapshot;
use tanktwin::{AlarmMode, Pacing, Simulation, SystemConfig, TaskId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const DEFAULT_DURATION_S: &str = "60";
const DEFAULT_TIME_SCALE: &str = "10";
const ROW_EVERY_FRAMES: u64 = 10;

type CliResult = Result<(), Box<dyn std::error::Error>>;
type BoxedSink = Box<dyn MeasurementSink + Send>;

#[tokio::main]
async fn main() -> CliResult {
    tracing_subscriber::fmt::init();

    let matches = App::new("tanktwin")
        .version("0.1.0")
        .about("🛢️  Tank Digital Twin - simulated level acquisition, fusion and alarm control")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file (defaults apply to missing fields)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("seed")
                .short("s")
                .long("seed")
                .value_name("SEED")
                .help("Override the random seed")
                .takes_value(true)
                .global(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Seed must be a non-negative integer".into()),
                }),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("▶️  Run the simulation")
                .arg(
                    Arg::with_name("frames")
                        .short("n")
                        .long("frames")
                        .value_name("FRAMES")
                        .help("Number of base frames to execute")
                        .takes_value(true)
                        .conflicts_with("duration"),
                )
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Simulated seconds to execute [default: 60]")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("realtime")
                        .long("realtime")
                        .help("Pace frames against the wall clock"),
                )
                .arg(
                    Arg::with_name("time-scale")
                        .long("time-scale")
                        .value_name("FACTOR")
                        .help("Speed-up factor when pacing in real time")
                        .takes_value(true)
                        .default_value(DEFAULT_TIME_SCALE),
                )
                .arg(
                    Arg::with_name("records")
                        .short("r")
                        .long("records")
                        .value_name("FILE")
                        .help("Append measurement records to a JSON-lines file")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("check-config")
                .about("🔍 Validate a configuration and print the effective values"),
        )
        .subcommand(
            SubCommand::with_name("forecast")
                .about("📈 Run headless, then forecast future levels")
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Simulated seconds to run before forecasting")
                        .takes_value(true)
                        .default_value(DEFAULT_DURATION_S),
                )
                .arg(
                    Arg::with_name("steps")
                        .long("steps")
                        .value_name("STEPS")
                        .help("Number of future samples to forecast")
                        .takes_value(true)
                        .default_value("10"),
                )
                .arg(
                    Arg::with_name("window")
                        .long("window")
                        .value_name("SAMPLES")
                        .help("Trend window of the forecaster")
                        .takes_value(true)
                        .default_value("5"),
                ),
        )
        .subcommand(
            SubCommand::with_name("watch")
                .about("📡 Watch levels streamed by a running tanktwin-simulator")
                .arg(
                    Arg::with_name("host")
                        .long("host")
                        .value_name("HOST")
                        .takes_value(true)
                        .default_value(DEFAULT_HOST),
                )
                .arg(
                    Arg::with_name("port")
                        .short("p")
                        .long("port")
                        .value_name("PORT")
                        .takes_value(true)
                        .default_value(DEFAULT_PORT),
                ),
        )
        .get_matches();

    let format = matches.value_of("format").unwrap_or("table").to_string();

    match matches.subcommand() {
        ("run", Some(sub_matches)) => {
            let config = load_config(&matches, sub_matches)?;
            handle_run(sub_matches, config, &format).await?;
        }
        ("check-config", Some(sub_matches)) => {
            let config = load_config(&matches, sub_matches)?;
            handle_check_config(&config, &format)?;
        }
        ("forecast", Some(sub_matches)) => {
            let config = load_config(&matches, sub_matches)?;
            handle_forecast(sub_matches, config, &format)?;
        }
        ("watch", Some(sub_matches)) => {
            handle_watch(sub_matches, &format).await?;
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Run one simulated minute", "tanktwin run".bright_cyan());
            println!("  {} Validate a config file", "tanktwin --config tank.json check-config".bright_cyan());
            println!("  {} Watch a running simulator", "tanktwin watch".bright_cyan());
        }
    }

    Ok(())
}

/// Global options may be given before or after the subcommand.
fn load_config(global: &ArgMatches<'_>, sub: &ArgMatches<'_>) -> Result<SystemConfig, Box<dyn std::error::Error>> {
    let mut config = match sub.value_of("config").or_else(|| global.value_of("config")) {
        Some(path) => SystemConfig::from_json_file(path)?,
        None => SystemConfig::default(),
    };
    if let Some(seed) = sub.value_of("seed").or_else(|| global.value_of("seed")) {
        config.seed = seed.parse()?;
    }
    config.validate()?;
    Ok(config)
}

fn frames_requested(matches: &ArgMatches<'_>, config: &SystemConfig) -> Result<u64, Box<dyn std::error::Error>> {
    if let Some(frames) = matches.value_of("frames") {
        return Ok(frames.parse()?);
    }
    let seconds: f64 = matches.value_of("duration").unwrap_or(DEFAULT_DURATION_S).parse()?;
    Ok(config.frames_for_duration(seconds))
}

async fn handle_run(matches: &ArgMatches<'_>, config: SystemConfig, format: &str) -> CliResult {
    let frames = frames_requested(matches, &config)?;
    let pacing = if matches.is_present("realtime") {
        let time_scale: f64 = matches.value_of("time-scale").unwrap_or(DEFAULT_TIME_SCALE).parse()?;
        Pacing::RealTime { time_scale }
    } else {
        Pacing::Headless
    };

    let sink: BoxedSink = match matches.value_of("records") {
        Some(path) => Box::new(JsonLinesSink::append_to(path)?),
        None => Box::new(MemorySink::new()),
    };
    let mut sim = Simulation::new(&config, sink, TracingPublisher)?;

    let stop = Arc::new(AtomicBool::new(false));
    let ctrl_c_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_stop.store(true, Ordering::SeqCst);
        }
    });

    if format == "table" {
        println!("{}", "▶️  Running tank digital twin".bright_blue().bold());
        println!(
            "{} {} frames of {} ms, major frame {}",
            "Schedule:".dimmed(),
            frames,
            config.schedule.base_period_ms,
            sim.executive()
                .schedule()
                .major_frame()
                .map_or_else(|| "n/a".to_string(), |f| f.to_string())
        );
        print_table_header();
    }

    let format_owned = format.to_string();
    let sim = tokio::task::spawn_blocking(move || {
        let mut remaining = frames;
        while remaining > 0 && !stop.load(Ordering::SeqCst) {
            let chunk = remaining.min(ROW_EVERY_FRAMES);
            let summary = sim.run(chunk, pacing, &stop);
            remaining -= summary.frames_run;
            if summary.frames_run > 0 {
                print_snapshot(&sim.twin().snapshot(), &format_owned);
            }
            if summary.stopped_early {
                break;
            }
        }
        sim
    })
    .await?;

    let mut sim = sim;
    sim.twin_mut().sink_mut().flush()?;
    print_run_summary(&sim, format)?;
    Ok(())
}

fn handle_check_config(config: &SystemConfig, format: &str) -> CliResult {
    match format {
        "compact" => println!("{}", "CONFIG OK".bright_green()),
        "json" => println!("{}", serde_json::to_string_pretty(config)?),
        _ => {
            println!("{} {}", "✅".green(), "Configuration is valid".bright_green());
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}

fn handle_forecast(matches: &ArgMatches<'_>, config: SystemConfig, format: &str) -> CliResult {
    let seconds: f64 = matches.value_of("duration").unwrap_or(DEFAULT_DURATION_S).parse()?;
    let steps: usize = matches.value_of("steps").unwrap_or("10").parse()?;
    let window: usize = matches.value_of("window").unwrap_or("5").parse()?;

    let mut sim = Simulation::new(&config, MemorySink::new(), TracingPublisher)?;
    sim.run_headless(config.frames_for_duration(seconds));

    let forecaster = TrendForecaster::new(window);
    let history = sim.twin().level_history();
    let ambient = sim.twin().ambient();
    let forecast = forecaster.forecast(&history, ambient.temperature, ambient.pressure, steps);

    match format {
        "json" => {
            let out = serde_json::json!({
                "snapshot": sim.twin().snapshot(),
                "forecast": forecast,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        "compact" => {
            let values: Vec<String> = forecast.iter().map(|v| format!("{:.2}", v)).collect();
            println!("{}", values.join(" "));
        }
        _ => {
            let snapshot = sim.twin().snapshot();
            println!("{}", "📈 Level Forecast".bright_blue().bold());
            println!("{}", "══════════════════".bright_blue());
            println!(
                "After {:.1} s: fused level {:.2} cm, mode {}",
                snapshot.timestamp_ms as f64 / 1000.0,
                snapshot.fused_level,
                mode_colored(snapshot.mode)
            );
            for (k, level) in forecast.iter().enumerate() {
                println!("  t+{:<3} {:>8.2} cm", k + 1, level);
            }
        }
    }
    Ok(())
}

async fn handle_watch(matches: &ArgMatches<'_>, format: &str) -> CliResult {
    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;

    let stream = match TcpStream::connect((host, port)).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("{} Failed to connect to simulator at {}:{}", "❌".red(), host, port);
            eprintln!("{} Start it with: {}", "💡".yellow(), "tanktwin-simulator".bright_cyan());
            return Err(e.into());
        }
    };

    println!("{}", "📡 Watching tank levels (Press Ctrl+C to stop)...".bright_blue().bold());
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        if format == "json" {
            println!("{}", line);
            continue;
        }
        if let Ok(sample) = serde_json::from_str::<serde_json::Value>(&line) {
            let timestamp_ms = sample["timestamp_ms"].as_u64().unwrap_or(0);
            let level = sample["level"].as_f64().unwrap_or(0.0);
            println!("[{:>8.1}s] {:>7.2} cm", timestamp_ms as f64 / 1000.0, level);
        }
    }
    println!("{}", "Simulator closed the stream".dimmed());
    Ok(())
}

fn mode_colored(mode: AlarmMode) -> ColoredString {
    match mode {
        AlarmMode::Normal => mode.to_string().bright_green(),
        AlarmMode::LowAlarm => mode.to_string().bright_yellow(),
        AlarmMode::HighAlarm => mode.to_string().bright_red(),
    }
}

fn print_table_header() {
    println!("{}", "┌──────────┬──────────┬──────────┬────────┬─────────┬────────────┬────────┐".bright_white());
    println!("{}", "│ Time     │ True     │ Fused    │ Temp   │ Press   │ Mode       │ Valves │".bright_white());
    println!("{}", "├──────────┼──────────┼──────────┼────────┼─────────┼────────────┼────────┤".bright_white());
}

fn print_snapshot(snapshot: &TwinSnapshot, format: &str) {
    match format {
        "json" => match serde_json::to_string(snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("{} {}", "❌".red(), e),
        },
        "compact" => println!(
            "[{:.1}] {:.2} {}",
            snapshot.timestamp_ms as f64 / 1000.0,
            snapshot.fused_level,
            snapshot.mode
        ),
        _ => {
            let valves = format!(
                "{}{}",
                if snapshot.inflow_enabled { "I" } else { "-" },
                if snapshot.outflow_enabled { "O" } else { "-" }
            );
            println!(
                "│ {:>7.1}s │ {:>7.2}  │ {:>7.2}  │ {:>5.1}  │ {:>7.1} │ {:<10} │   {}   │",
                snapshot.timestamp_ms as f64 / 1000.0,
                snapshot.true_level,
                snapshot.fused_level,
                snapshot.temperature,
                snapshot.pressure,
                mode_colored(snapshot.mode),
                valves
            );
        }
    }
}

fn print_run_summary(sim: &Simulation<BoxedSink, TracingPublisher>, format: &str) -> CliResult {
    let exec = sim.executive().get_stats();
    let twin = sim.twin().stats();

    match format {
        "json" => {
            let out = serde_json::json!({
                "snapshot": sim.twin().snapshot(),
                "executive": exec,
                "twin": twin,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        "compact" => println!(
            "frames={} records={} published={} failures={}",
            exec.frames_executed, twin.records_stored, twin.samples_published, twin.storage_failures + twin.publish_failures
        ),
        _ => {
            println!("{}", "└──────────┴──────────┴──────────┴────────┴─────────┴────────────┴────────┘".bright_white());
            println!("\n{}", "📊 Run Summary".bright_white().bold());
            println!("Frames executed:   {}", exec.frames_executed.to_string().bright_cyan());
            for task in TaskId::ALL {
                let i = task.index();
                println!(
                    "  {} {:<14} runs {:>6}  failures {:>4}  overruns {:>4}  max {:>6} µs",
                    task.label(),
                    task.to_string(),
                    exec.task_runs[i],
                    exec.task_failures[i],
                    exec.deadline_overruns[i],
                    exec.max_task_time_us[i]
                );
            }
            println!("Invalid readings:  {}", twin.invalid_readings);
            println!("Records stored:    {}", twin.records_stored.to_string().bright_green());
            println!("Samples published: {}", twin.samples_published.to_string().bright_green());
            if let Some(err) = &twin.last_error {
                println!("Last export error: {}", err.bright_red());
            }
        }
    }
    Ok(())
}
