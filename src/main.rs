use std::env;
use std::io::{self, Read};

use anyhow::{anyhow, Context, Result};

use round_robin_os_simulator::config::KernelConfig;
use round_robin_os_simulator::io::loader::{self, PROGRAM_FILE_PATH};
use round_robin_os_simulator::kernel::{Driver, OperatingSystem};

fn main() -> Result<()> {
    env_logger::init();

    let config = config_from_env()?;
    let program_path = env::var("OS_SIM_PROGRAMS").unwrap_or_else(|_| PROGRAM_FILE_PATH.to_string());

    println!("Loading programs from {}.", program_path);
    let programs = loader::load_programs(&program_path)?;

    let os = OperatingSystem::new(config).context("Failed to start the kernel")?;
    let mut driver = Driver::new(os, programs);

    let mut script = String::new();
    io::stdin()
        .read_to_string(&mut script)
        .context("Failed to read events from stdin")?;

    let result = driver.run(&script);
    println!("{}", driver.report());

    result.context("Simulation halted")
}

/// Builds the kernel configuration from the JSON file named by
/// `OS_SIM_CONFIG` (defaults when unset), then applies `OS_SIM_*` overrides.
fn config_from_env() -> Result<KernelConfig> {
    let mut config = match env::var("OS_SIM_CONFIG") {
        Ok(path) => KernelConfig::load(path)?,
        Err(_) => KernelConfig::default(),
    };

    if let Ok(value) = env::var("OS_SIM_MEMORY_SIZE") {
        config.memory_size = value
            .parse()
            .with_context(|| format!("Invalid OS_SIM_MEMORY_SIZE: {}", value))?;
    }
    if let Ok(value) = env::var("OS_SIM_TIME_SLICE") {
        config.round_robin_cycle_limit = value
            .parse()
            .with_context(|| format!("Invalid OS_SIM_TIME_SLICE: {}", value))?;
    }
    if let Ok(value) = env::var("OS_SIM_FIT_POLICY") {
        config.fit_policy = value.parse().map_err(|err: String| anyhow!(err))?;
    }

    Ok(config)
}
