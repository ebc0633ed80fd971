use common::constants::BASE_DELAY_MILLIS;
use common::logger::LogLevel;

/// What the tracker does with an event whose stage is earlier than the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegressionPolicy {
    /// Last writer wins, regressions included.
    #[default]
    Overwrite,
    /// Keep the current stage unless the event is flagged as a correction.
    RejectUnlessCorrection,
}

impl std::str::FromStr for RegressionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overwrite" => Ok(RegressionPolicy::Overwrite),
            "reject-regressions" => Ok(RegressionPolicy::RejectUnlessCorrection),
            other => Err(format!("unknown regression policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub regression_policy: RegressionPolicy,
    pub log_level: LogLevel,
    /// Delay between simulated lifecycle steps (demo only).
    pub step_delay_millis: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            regression_policy: RegressionPolicy::default(),
            log_level: LogLevel::Info,
            step_delay_millis: BASE_DELAY_MILLIS,
        }
    }
}

impl TrackerConfig {
    /// Builds a config from `--policy <p>`, `--log-level <l>` and `--step-delay-ms <n>` pairs.
    /// `args` excludes the program name.
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        let mut config = TrackerConfig::default();
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            let value = iter
                .next()
                .ok_or_else(|| format!("missing value for {}", flag))?;
            match flag.as_str() {
                "--policy" => config.regression_policy = value.parse()?,
                "--log-level" => config.log_level = value.parse()?,
                "--step-delay-ms" => {
                    config.step_delay_millis = value
                        .parse()
                        .map_err(|_| format!("invalid delay '{}'", value))?
                }
                other => return Err(format!("unknown flag {}", other)),
            }
        }
        Ok(config)
    }
}
