use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chaslice::common::{pin_current_thread, resolve_generation, SocketMsrs};
use chaslice::config::load_monitor_events;
use chaslice::counters::cha::events::parse_hex;
use chaslice::counters::cha::{ChaEvent, DiscoverySettings};
use chaslice::memory::SocketBuffers;
use chaslice::{
    BenchmarkContext, BenchmarkRegistry, ChaMonitor, EventCatalog, MeasurementPipeline, OffsetLog,
    ProbeConfig, ReportWriter, SliceProbe, SocketCores,
};
use chaslice_raw::Generation;

#[derive(Parser, Debug)]
#[command(name = "chaslice")]
#[command(about = "CHA slice discovery and uncore event measurement for Intel Xeon")]
struct Args {
    #[arg(
        help = "Benchmark to measure",
        required_unless_present_any = ["list", "search", "event_code"]
    )]
    benchmark: Option<String>,

    #[arg(long, help = "List registered benchmarks and exit")]
    list: bool,

    #[arg(
        long,
        value_name = "FILTER",
        help = "Search the event catalog by name or description and exit"
    )]
    search: Option<String>,

    #[arg(long, value_name = "CODE", help = "List catalog events with this event code and exit")]
    event_code: Option<String>,

    #[arg(long, help = "Print catalog searches as JSON")]
    json: bool,

    #[arg(long, help = "CPU generation (skx, clx, icx, spr); detected via CPUID when omitted")]
    arch: Option<Generation>,

    #[arg(long, help = "JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Event catalog (defaults to the generation's catalog)")]
    catalog: Option<PathBuf>,

    #[arg(long, help = "File listing the events to monitor, one per line")]
    monitor: Option<PathBuf>,

    #[arg(long, help = "Runs per event batch")]
    runs: Option<usize>,

    #[arg(long, help = "Report output directory")]
    output: Option<PathBuf>,

    #[arg(long, help = "Slice map log written during discovery")]
    offset_log: Option<PathBuf>,

    #[arg(long, help = "Leave the core prefetchers enabled")]
    keep_prefetch: bool,

    #[arg(
        short,
        long,
        help = "Enable verbose logging (shows all MSR read/write operations)"
    )]
    verbose: bool,
}

fn check_permissions() -> anyhow::Result<()> {
    let msr_path = "/dev/cpu/0/msr";
    if std::fs::metadata(msr_path).is_err() {
        bail!("cannot access {msr_path}; the msr kernel module may not be loaded (sudo modprobe msr)");
    }

    if let Err(e) = std::fs::File::open(msr_path) {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            bail!("permission denied accessing {msr_path}; run as root");
        }
    }
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<ProbeConfig> {
    let mut config = match &args.config {
        Some(path) => ProbeConfig::from_file(path)?,
        None => ProbeConfig::default(),
    };

    if let Some(catalog) = &args.catalog {
        config.catalog = Some(catalog.clone());
    }
    if let Some(monitor) = &args.monitor {
        config.monitor_file = monitor.clone();
    }
    if let Some(runs) = args.runs {
        config.runs = runs;
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if let Some(offset_log) = &args.offset_log {
        config.offset_log = Some(offset_log.clone());
    }
    if args.keep_prefetch {
        config.disable_prefetch = false;
    }

    config.validate()?;
    Ok(config)
}

fn print_events(events: &[&ChaEvent], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(events)?);
        return Ok(());
    }

    let hex = |v: i64| {
        if v < 0 {
            "-".to_string()
        } else {
            format!("0x{v:02X}")
        }
    };
    for event in events {
        println!(
            "{:<48} code={:<5} umask={:<10} {}",
            event.name,
            hex(event.code),
            hex(event.umask),
            event.brief_description
        );
    }
    println!("{} events", events.len());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let registry = BenchmarkRegistry::builtin();
    if args.list {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let config = load_config(&args)?;
    let profile = resolve_generation(args.arch).profile();

    let catalog_path = config.catalog_path(profile);
    let catalog = EventCatalog::load(&catalog_path)
        .with_context(|| format!("loading event catalog {}", catalog_path.display()))?;

    if let Some(filter) = &args.search {
        return print_events(&catalog.search(filter), args.json);
    }
    if let Some(code) = &args.event_code {
        let code = parse_hex(code);
        if code < 0 {
            bail!("invalid event code");
        }
        return print_events(&catalog.by_code(code), args.json);
    }

    let name = args.benchmark.as_deref().unwrap_or_default();
    let benchmark = registry.get(name).ok_or_else(|| {
        anyhow!(
            "unknown benchmark '{name}' (available: {})",
            registry.names().collect::<Vec<_>>().join(", ")
        )
    })?;

    let events = load_monitor_events(&config.monitor_file, config.max_monitor_events)?;
    if events.is_empty() {
        bail!("{} lists no events", config.monitor_file.display());
    }
    let cores = SocketCores::discover(
        &config.sysfs_cpu_root,
        profile.max_sockets(),
        &mut rand::thread_rng(),
    )?;

    // Fallible setup that touches no hardware state goes first
    let buffers = SocketBuffers::allocate_per_socket(&config, cores.socket_count())?;
    let offset_log_path = config.offset_log_path(profile);
    let mut offset_log = OffsetLog::create(&offset_log_path)?;
    let settings = DiscoverySettings::from(&config);
    settings.check_catalog(&catalog)?;

    check_permissions()?;

    let msrs = SocketMsrs::open(&cores.primary_cores()?).context("opening MSR handles")?;
    let monitor = ChaMonitor::new(profile, msrs);
    if config.disable_prefetch {
        monitor.disable_prefetch()?;
    }

    if let Some(core) = cores.orchestrator_core() {
        pin_current_thread(core)?;
        tracing::info!("Orchestrating from core {}", core);
    }

    let probe = SliceProbe::new(&monitor, &catalog, settings)?;
    let addresses = probe
        .generate_cha_mapped_offsets(&buffers, &mut offset_log)
        .context("slice discovery")?;
    tracing::info!("Slice map written to {}", offset_log_path.display());

    let ctx = BenchmarkContext::new(&addresses, &buffers, &cores);
    let pipeline = MeasurementPipeline::new(&monitor, &catalog, config.runs);
    let table = pipeline
        .run(&events, benchmark, &ctx)
        .with_context(|| format!("measuring {}", benchmark.name()))?;

    let mut writer = ReportWriter::new(config.output_dir.clone());
    writer.write(benchmark.name(), &events, &table)?;
    monitor.reset_counters();

    tracing::info!("Done");
    Ok(())
}
