#![forbid(unsafe_code)]

//! Ripple demo binary entry point.

use ripple_demo::cli;
use ripple_demo::logging;
use ripple_demo::scenarios::Scenario;

fn main() {
    let opts = cli::Opts::parse();

    if opts.list {
        for scenario in Scenario::ALL {
            println!("{:<16} {}", scenario.name(), scenario.summary());
        }
        return;
    }

    logging::init(&opts.log_filter);
    let config = opts.config();
    for scenario in opts.scenarios() {
        println!("--- Start {} ---", scenario.summary());
        for line in scenario.run(&config) {
            println!("{line}");
        }
        println!("--- End {} ---", scenario.summary());
    }
}
