extern crate getopts;
extern crate scanstage;

use scanstage::firmware::{pause_millis_from_minutes, write_device_config};
use scanstage::run_machine::RunConfig;
use scanstage::scan_config::ScanConfig;
use scanstage::scan_config_parser;

use std::env;
use std::path::PathBuf;
use std::process;

use getopts::Options;
use tracing_subscriber::EnvFilter;

fn usage(prg: &str, opts: Options)
{
    let brief = format!("Usage: {} [options] REPEATS PAUSE_MINUTES", prg);
    print!("{}", opts.usage(&brief));
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
    opts.optopt("t", "template", "device configuration template", "FILE");
    opts.optopt("o", "output", "generated device configuration", "FILE");
    opts.optflag("h", "help", "print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            println!("{}", f);
            process::exit(2);
        }
    };
    if matches.opt_present("h") || matches.free.len() < 2 {
        usage(&program, opts);
        return;
    }

    let config = match matches.opt_str("config") {
        Some(filename) => match scan_config_parser::read_config(&filename) {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e);
                process::exit(2);
            }
        },
        None => ScanConfig::default()
    };

    let repeats = match matches.free[0].parse::<usize>() {
        Ok(r) => r,
        Err(e) => {
            println!("Invalid repeats: {}", e);
            process::exit(2);
        }
    };
    let pause = match matches.free[1].parse::<u64>() {
        Ok(p) => p,
        Err(e) => {
            println!("Invalid pause: {}", e);
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
    let run_config = RunConfig {repeats, pause_millis};
    if let Err(e) = run_config.validate() {
        println!("{}", e);
        process::exit(2);
    }

    let template = matches.opt_str("template").map(PathBuf::from)
        .unwrap_or_else(|| config.firmware.template.clone());
    let output = matches.opt_str("output").map(PathBuf::from)
        .unwrap_or_else(|| config.firmware.output.clone());
    if let Err(e) = write_device_config(&template, &output, &run_config) {
        println!("{}", e);
        process::exit(1);
    }
}
