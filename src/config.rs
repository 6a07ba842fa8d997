//! Relay configuration and command-line parsing.

use std::collections::HashSet;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::ProducerId;

pub const DEFAULT_CAPACITY: usize = 3;
pub const DEFAULT_PRODUCERS: [ProducerId; 2] = [1, 2];
pub const DEFAULT_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_PROCESSING_MS: u64 = 10_000;

/// Everything the driver needs to wire up one relay run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    pub capacity: usize,
    pub producers: Vec<ProducerId>,
    /// Pause between two sends of the same producer.
    pub producer_interval: Duration,
    /// Simulated work per received message.
    pub processing: Duration,
    /// Pause after an empty poll; zero busy-polls.
    pub idle_backoff: Duration,
    /// Stop each producer after this many messages; `None` runs forever.
    pub messages_per_producer: Option<u64>,
    pub quiet_idle: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            producers: DEFAULT_PRODUCERS.to_vec(),
            producer_interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            processing: Duration::from_millis(DEFAULT_PROCESSING_MS),
            idle_backoff: Duration::ZERO,
            messages_per_producer: None,
            quiet_idle: false,
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::MustBePositive {
                option: "--capacity",
            });
        }
        if self.producers.is_empty() {
            return Err(ConfigError::MustBePositive {
                option: "--producers",
            });
        }
        let mut seen = HashSet::new();
        if let Some(&id) = self.producers.iter().find(|&&id| !seen.insert(id)) {
            return Err(ConfigError::DuplicateProducer(id));
        }
        if self.messages_per_producer == Some(0) {
            return Err(ConfigError::MustBePositive {
                option: "--messages",
            });
        }
        Ok(())
    }
}

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Run(RelayConfig),
    Help,
}

fn parse_u64_list(option: &str, arg: &str) -> Result<Vec<u64>, ConfigError> {
    let mut values = Vec::new();
    for part in arg.split(',') {
        let value = part
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(option, arg))?;
        values.push(value);
    }
    Ok(values)
}

fn invalid(option: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    }
}

fn next_value(
    args: &mut impl Iterator<Item = String>,
    option: &str,
) -> Result<String, ConfigError> {
    args.next()
        .ok_or_else(|| ConfigError::MissingValue(option.to_string()))
}

fn parse_number<T: std::str::FromStr>(option: &str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| invalid(option, value))
}

/// Parse the arguments following the program name.
pub fn parse_args<I>(args: I) -> Result<Command, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let mut config = RelayConfig::default();
    let mut args = args.into_iter().peekable();
    if args.peek().map(String::as_str) == Some("run") {
        args.next();
    }

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" | "help" => return Ok(Command::Help),
            "--quiet-idle" => config.quiet_idle = true,
            "--capacity" => config.capacity = parse_number(&arg, &next_value(&mut args, &arg)?)?,
            "--producers" => {
                config.producers = parse_u64_list(&arg, &next_value(&mut args, &arg)?)?
            }
            "--interval-ms" => {
                let ms = parse_number(&arg, &next_value(&mut args, &arg)?)?;
                config.producer_interval = Duration::from_millis(ms);
            }
            "--processing-ms" => {
                let ms = parse_number(&arg, &next_value(&mut args, &arg)?)?;
                config.processing = Duration::from_millis(ms);
            }
            "--idle-backoff-ms" => {
                let ms = parse_number(&arg, &next_value(&mut args, &arg)?)?;
                config.idle_backoff = Duration::from_millis(ms);
            }
            "--messages" => {
                let count = parse_number(&arg, &next_value(&mut args, &arg)?)?;
                config.messages_per_producer = Some(count);
            }
            _ => return Err(ConfigError::UnknownOption(arg)),
        }
    }

    config.validate()?;
    Ok(Command::Run(config))
}
