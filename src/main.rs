extern crate getopts;
extern crate scanstage;

use scanstage::controller::RunController;
use scanstage::firmware::{pause_millis_from_minutes, write_device_config, ArduinoCli};
use scanstage::interrupt::{catch_interrupt, take_interrupt};
use scanstage::run_machine::{Phase, RunConfig};
use scanstage::scan_config::ScanConfig;
use scanstage::scan_config_parser;

use std::env;
use std::process;
use std::thread;
use std::time::Duration;

use getopts::Options;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn usage(prg: &str, opts: Options)
{
    let brief = format!("Usage: {} [options]", prg);
    print!("{}", opts.usage(&brief));
}

const STATUS_INTERVAL: Duration = Duration::from_millis(500);

fn parse_count(matches: &getopts::Matches, name: &str, default: u64) -> Result<u64, String>
{
    match matches.opt_str(name) {
        Some(arg) => arg.parse::<u64>().map_err(|e| format!("Invalid {}: {}", name, e)),
        None => Ok(default)
    }
}

fn run(config: &ScanConfig, run_config: RunConfig) -> Phase
{
    let mut controller = match RunController::from_config(config) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            return Phase::Aborted;
        }
    };
    if let Err(e) = catch_interrupt() {
        warn!("Ctrl-C will not abort the run: {}", e);
    }
    if let Err(e) = controller.start(run_config) {
        error!("Run not started: {}", e);
        return Phase::Idle;
    }
    let mut last = controller.status();
    while controller.is_running() {
        thread::sleep(STATUS_INTERVAL);
        if take_interrupt() {
            warn!("Interrupted, aborting run");
            controller.abort();
        }
        let status = controller.status();
        if status != last {
            info!("{:?}: cycle {}/{}, station {}/{}",
                  status.phase, status.cycle_count, run_config.repeats,
                  status.move_count, controller.grid().total_stations());
            last = status;
        }
    }
    let phase = controller.status().phase;
    controller.shutdown();
    phase
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
                         .unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();
    let mut opts = Options::new();
    opts.optopt("c", "config", "scanner configuration file", "FILE");
    opts.optopt("d", "device", "serial device", "DEV");
    opts.optopt("r", "repeats", "number of cycles", "N");
    opts.optopt("p", "pause", "pause between cycles (minutes)", "MINUTES");
    opts.optflag("u", "upload", "generate device configuration and upload firmware first");
    opts.optopt("", "move", "move to a station and exit", "STATION");
    opts.optflag("", "snapshot", "take one photo and exit");
    opts.optflag("h", "help", "print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            println!("{}", f);
            process::exit(2);
        }
    };
    if matches.opt_present("h") {
        usage(&program, opts);
        return;
    }

    let mut config = match matches.opt_str("config") {
        Some(filename) => match scan_config_parser::read_config(&filename) {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e);
                process::exit(2);
            }
        },
        None => ScanConfig::default()
    };
    if let Some(device) = matches.opt_str("device") {
        config.serial.port = device;
    }

    let (repeats, pause) = match (parse_count(&matches, "repeats", 2),
                                  parse_count(&matches, "pause", 1)) {
        (Ok(r), Ok(p)) => (r, p),
        (Err(e), _) | (_, Err(e)) => {
            println!("{}", e);
            process::exit(2);
        }
    };
    let pause_millis = match pause_millis_from_minutes(pause) {
        Ok(ms) => ms,
        Err(e) => {
            println!("{}", e);
            process::exit(2);
        }
    };
    let run_config = RunConfig {repeats: repeats as usize, pause_millis};
    if let Err(e) = run_config.validate() {
        println!("{}", e);
        process::exit(2);
    }

    if let Some(station) = matches.opt_str("move") {
        let mut controller = match RunController::from_config(&config) {
            Ok(c) => c,
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        };
        let position = controller.grid().parse_station(&station);
        let result = match position {
            Some(pos) => controller.manual_move(&pos.row, &pos.column),
            None => {
                println!("Unknown station {}", station);
                process::exit(2);
            }
        };
        controller.shutdown();
        if let Err(e) = result {
            error!("{}", e);
            process::exit(1);
        }
        return;
    }

    if matches.opt_present("snapshot") {
        let result = RunController::from_config(&config)
            .and_then(|mut controller| controller.capture_manual());
        match result {
            Ok(path) => println!("{}", path.display()),
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        }
        return;
    }

    if matches.opt_present("upload") {
        let fw = &config.firmware;
        let cli = ArduinoCli::new(&fw.arduino_cli, &fw.fqbn);
        let prepared = write_device_config(&fw.template, &fw.output, &run_config)
            .and_then(|_| cli.ensure_core_installed())
            .and_then(|_| cli.compile(&fw.sketch_dir))
            .and_then(|_| cli.upload(&config.serial.port, &fw.sketch_dir));
        if let Err(e) = prepared {
            error!("{}", e);
            process::exit(1);
        }
    }

    match run(&config, run_config) {
        Phase::Finished => info!("Run finished"),
        phase => {
            error!("Run ended {:?}", phase);
            process::exit(1);
        }
    }
}
