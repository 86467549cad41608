#![forbid(unsafe_code)]

//! Command-line argument parsing for the scenario runner.
//!
//! Parses args by hand. `RIPPLE_DEMO_*` environment variables set defaults;
//! explicit flags override them.

use std::env;
use std::process;

use web_time::Duration;

use crate::config::DemoConfig;
use crate::currency::Currency;
use crate::scenarios::Scenario;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP_TEXT: &str = "\
Ripple demo: walkthroughs of demand-driven streams

USAGE:
    ripple-demo [OPTIONS]

OPTIONS:
    --scenario=NAME      Run only scenario NAME (default: all)
    --debounce-ms=N      Currency debounce interval in ms (default: 500)
    --latency-ms=N       Mock fetch latency in ms, 0 answers inline (default: 50)
    --currency=CODE      Currency the checkout settles on (default: EUR)
    --log=FILTER         Log filter directive (default: info)
    --list               List scenarios and exit
    --help, -h           Show this help message
    --version, -V        Show version

SCENARIOS:
    backpressure         Demand topped up from inside receive
    decode               Fetch a body and decode it inside try_map
    sharing              One fetch shared by two subscribers
    multicast            Subscribers attach before connect starts the fetch
    map-vs-try-map       Typed failures through map, try_map and map_error
    checkout             Debounced currency selection repricing a checkout

ENVIRONMENT VARIABLES:
    RIPPLE_DEMO_SCENARIO      Override --scenario
    RIPPLE_DEMO_DEBOUNCE_MS   Override --debounce-ms
    RIPPLE_DEMO_LATENCY_MS    Override --latency-ms
    RIPPLE_DEMO_CURRENCY      Override --currency
    RIPPLE_LOG                Override --log";

/// Parsed command-line options.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Scenario to run; `None` runs all of them.
    pub scenario: Option<Scenario>,
    /// Currency debounce interval in milliseconds.
    pub debounce_ms: u64,
    /// Mock fetch latency in milliseconds.
    pub latency_ms: u64,
    /// Currency the checkout scenario settles on.
    pub currency: Currency,
    /// `tracing` filter directive.
    pub log_filter: String,
    /// Print the scenario list instead of running.
    pub list: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParseError {
    Help,
    Version,
    InvalidValue { flag: &'static str, value: String },
    UnknownArg(String),
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            scenario: None,
            debounce_ms: 500,
            latency_ms: 50,
            currency: Currency::Eur,
            log_filter: "info".into(),
            list: false,
        }
    }
}

impl Opts {
    /// Parse command-line arguments and environment variables.
    ///
    /// Environment variables take precedence over defaults but are overridden
    /// by explicit command-line flags.
    pub fn parse() -> Self {
        match Self::parse_from_env_and_args(env::args().skip(1), |key| env::var(key).ok()) {
            Ok(opts) => opts,
            Err(ParseError::Help) => {
                println!("{HELP_TEXT}");
                process::exit(0);
            }
            Err(ParseError::Version) => {
                println!("ripple-demo {VERSION}");
                process::exit(0);
            }
            Err(ParseError::InvalidValue { flag, value }) => {
                eprintln!("Invalid {flag} value: {value}");
                process::exit(1);
            }
            Err(ParseError::UnknownArg(arg)) => {
                eprintln!("Unknown argument: {arg}");
                eprintln!("Run with --help for usage information.");
                process::exit(1);
            }
        }
    }

    pub(crate) fn parse_from_env_and_args<I, S, F>(args: I, get_env: F) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        // Apply environment variable defaults first
        if let Some(val) = get_env("RIPPLE_DEMO_SCENARIO")
            && let Ok(scenario) = val.parse()
        {
            opts.scenario = Some(scenario);
        }
        if let Some(val) = get_env("RIPPLE_DEMO_DEBOUNCE_MS")
            && let Ok(n) = val.parse()
        {
            opts.debounce_ms = n;
        }
        if let Some(val) = get_env("RIPPLE_DEMO_LATENCY_MS")
            && let Ok(n) = val.parse()
        {
            opts.latency_ms = n;
        }
        if let Some(val) = get_env("RIPPLE_DEMO_CURRENCY")
            && let Ok(currency) = val.parse()
        {
            opts.currency = currency;
        }
        if let Some(val) = get_env("RIPPLE_LOG") {
            opts.log_filter = val;
        }

        // Parse command-line args (override env vars)
        for arg in args {
            let arg = arg.as_ref();
            match arg {
                "--help" | "-h" => return Err(ParseError::Help),
                "--version" | "-V" => return Err(ParseError::Version),
                "--list" => opts.list = true,
                other => {
                    if let Some(val) = other.strip_prefix("--scenario=") {
                        opts.scenario = Some(val.parse().map_err(|_| ParseError::InvalidValue {
                            flag: "--scenario",
                            value: val.to_string(),
                        })?);
                    } else if let Some(val) = other.strip_prefix("--debounce-ms=") {
                        opts.debounce_ms = parse_number("--debounce-ms", val)?;
                    } else if let Some(val) = other.strip_prefix("--latency-ms=") {
                        opts.latency_ms = parse_number("--latency-ms", val)?;
                    } else if let Some(val) = other.strip_prefix("--currency=") {
                        opts.currency = val.parse().map_err(|_| ParseError::InvalidValue {
                            flag: "--currency",
                            value: val.to_string(),
                        })?;
                    } else if let Some(val) = other.strip_prefix("--log=") {
                        opts.log_filter = val.to_string();
                    } else {
                        return Err(ParseError::UnknownArg(other.to_string()));
                    }
                }
            }
        }

        Ok(opts)
    }

    /// Scenarios selected by these options, in running order.
    #[must_use]
    pub fn scenarios(&self) -> Vec<Scenario> {
        self.scenario
            .map_or_else(|| Scenario::ALL.to_vec(), |scenario| vec![scenario])
    }

    #[must_use]
    pub fn config(&self) -> DemoConfig {
        DemoConfig::default()
            .with_debounce(Duration::from_millis(self.debounce_ms))
            .with_fetch_latency(Duration::from_millis(self.latency_ms))
            .with_currency(self.currency)
    }
}

fn parse_number(flag: &'static str, val: &str) -> Result<u64, ParseError> {
    val.parse().map_err(|_| ParseError::InvalidValue {
        flag,
        value: val.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_with_env<I, S>(
        args: I,
        env_pairs: &[(&'static str, &'static str)],
    ) -> Result<Opts, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = std::collections::HashMap::new();
        for (key, value) in env_pairs {
            map.insert(*key, *value);
        }
        Opts::parse_from_env_and_args(args, |key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn default_opts() {
        let opts = Opts::default();
        assert!(opts.scenario.is_none());
        assert_eq!(opts.debounce_ms, 500);
        assert_eq!(opts.latency_ms, 50);
        assert_eq!(opts.currency, Currency::Eur);
        assert_eq!(opts.log_filter, "info");
        assert!(!opts.list);
        assert_eq!(opts.scenarios(), Scenario::ALL.to_vec());
    }

    #[test]
    fn version_string_nonempty() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn help_text_lists_every_scenario() {
        for scenario in Scenario::ALL {
            assert!(HELP_TEXT.contains(scenario.name()), "{scenario} missing");
            assert!(HELP_TEXT.contains(scenario.summary()), "{scenario} summary missing");
        }
    }

    #[test]
    fn flags_parse() {
        let opts = parse_with_env(
            [
                "--scenario=sharing",
                "--debounce-ms=10",
                "--latency-ms=0",
                "--currency=jpy",
                "--log=ripple_core=trace",
            ],
            &[],
        )
        .unwrap();
        assert_eq!(opts.scenario, Some(Scenario::Sharing));
        assert_eq!(opts.debounce_ms, 10);
        assert_eq!(opts.latency_ms, 0);
        assert_eq!(opts.currency, Currency::Jpy);
        assert_eq!(opts.log_filter, "ripple_core=trace");

        let config = opts.config();
        assert_eq!(config.debounce, Duration::from_millis(10));
        assert!(config.fetch_latency.is_zero());
        assert_eq!(config.currency, Currency::Jpy);
    }

    #[test]
    fn env_sets_defaults_and_flags_win() {
        let env = [
            ("RIPPLE_DEMO_SCENARIO", "checkout"),
            ("RIPPLE_DEMO_DEBOUNCE_MS", "42"),
            ("RIPPLE_DEMO_CURRENCY", "gbp"),
            ("RIPPLE_LOG", "debug"),
        ];
        let opts = parse_with_env(Vec::<String>::new(), &env).unwrap();
        assert_eq!(opts.scenario, Some(Scenario::Checkout));
        assert_eq!(opts.debounce_ms, 42);
        assert_eq!(opts.currency, Currency::Gbp);
        assert_eq!(opts.log_filter, "debug");

        let opts = parse_with_env(["--debounce-ms=7", "--currency=usd"], &env).unwrap();
        assert_eq!(opts.debounce_ms, 7);
        assert_eq!(opts.currency, Currency::Usd);
        assert_eq!(opts.scenarios(), vec![Scenario::Checkout]);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let opts = parse_with_env(
            Vec::<String>::new(),
            &[("RIPPLE_DEMO_LATENCY_MS", "soon"), ("RIPPLE_DEMO_SCENARIO", "nope")],
        )
        .unwrap();
        assert_eq!(opts.latency_ms, 50);
        assert!(opts.scenario.is_none());
    }

    #[test]
    fn invalid_flag_values_are_errors() {
        assert_eq!(
            parse_with_env(["--debounce-ms=abc"], &[]).unwrap_err(),
            ParseError::InvalidValue {
                flag: "--debounce-ms",
                value: "abc".into()
            }
        );
        assert_eq!(
            parse_with_env(["--currency=btc"], &[]).unwrap_err(),
            ParseError::InvalidValue {
                flag: "--currency",
                value: "btc".into()
            }
        );
        assert_eq!(
            parse_with_env(["--scenario=everything"], &[]).unwrap_err(),
            ParseError::InvalidValue {
                flag: "--scenario",
                value: "everything".into()
            }
        );
    }

    #[test]
    fn help_version_and_unknown() {
        assert_eq!(parse_with_env(["-h"], &[]).unwrap_err(), ParseError::Help);
        assert_eq!(parse_with_env(["--version"], &[]).unwrap_err(), ParseError::Version);
        assert_eq!(
            parse_with_env(["--frobnicate"], &[]).unwrap_err(),
            ParseError::UnknownArg("--frobnicate".into())
        );
        assert!(parse_with_env(["--list"], &[]).unwrap().list);
    }
}
