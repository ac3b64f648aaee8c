use std::collections::HashMap;
use std::sync::LazyLock;

use keyagg_error::{AggError, ErrorKind, Result};

use crate::scalar::ScalarValue;

/// Configuration for an aggregation run.
///
/// None of these settings affect the computed output, only how work is
/// scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateConfig {
    /// Number of worker threads.
    pub parallelism: usize,
    /// Maximum number of states combined in a single merge step.
    pub merge_fan_in: usize,
    /// Number of buckets partial results are shuffled into before merging.
    pub merge_partitions: usize,
    /// Number of times a failed task is re-run before the run fails.
    pub max_task_retries: usize,
}

pub const DEFAULT_MERGE_FAN_IN: usize = 2;
pub const DEFAULT_MAX_TASK_RETRIES: usize = 3;

impl AggregateConfig {
    pub fn new() -> Self {
        let parallelism = num_cpus::get().clamp(MIN_PARALLELISM, MAX_PARALLELISM);
        AggregateConfig {
            parallelism,
            merge_fan_in: DEFAULT_MERGE_FAN_IN,
            merge_partitions: parallelism,
            max_task_retries: DEFAULT_MAX_TASK_RETRIES,
        }
    }

    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = get_setting_functions(name)?;
        (func.set)(value, self)
    }

    /// Set a value from its string representation, inferring the type.
    pub fn set_from_str(&mut self, name: &str, value: &str) -> Result<()> {
        self.set_from_scalar(name, ScalarValue::parse_inferred(value))
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = get_setting_functions(name)?;
        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::new();

        let func = get_setting_functions(name)?;
        let scalar = (func.get)(&def_conf);
        (func.set)(scalar, self)
    }

    pub fn reset_all(&mut self) {
        *self = Self::new();
    }

    /// Names and descriptions of all settings, sorted by name.
    pub fn settings() -> Vec<(&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, func)| (*name, func.description))
            .collect();
        settings.sort_unstable();
        settings
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn get_setting_functions(name: &str) -> Result<&'static SettingFunctions> {
    GET_SET_FUNCTIONS.get(name).ok_or_else(|| {
        AggError::new(format!("Missing setting for '{name}'")).with_kind(ErrorKind::InvalidArgument)
    })
}

struct SettingFunctions {
    description: &'static str,
    set: fn(scalar: ScalarValue, conf: &mut AggregateConfig) -> Result<()>,
    get: fn(conf: &AggregateConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: AggregateSetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
        }
    }
}

fn insert_setting<S: AggregateSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<Parallelism>(&mut map);
    insert_setting::<MergeFanIn>(&mut map);
    insert_setting::<MergePartitions>(&mut map);
    insert_setting::<MaxTaskRetries>(&mut map);

    map
});

pub trait AggregateSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut AggregateConfig) -> Result<()>;
    fn get_as_scalar(conf: &AggregateConfig) -> ScalarValue;
}

fn validate_range(name: &'static str, val: usize, min: usize, max: usize) -> Result<()> {
    if val < min {
        return Err(
            AggError::new(format!("Setting '{name}' cannot be less than {min}"))
                .with_kind(ErrorKind::InvalidArgument),
        );
    }

    if val > max {
        return Err(
            AggError::new(format!("Setting '{name}' cannot be greater than {max}"))
                .with_kind(ErrorKind::InvalidArgument),
        );
    }

    Ok(())
}

const MIN_PARALLELISM: usize = 1;
const MAX_PARALLELISM: usize = 512;

pub struct Parallelism;

impl AggregateSetting for Parallelism {
    const NAME: &'static str = "parallelism";
    const DESCRIPTION: &'static str = "Number of worker threads used for accumulation and merging";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut AggregateConfig) -> Result<()> {
        let val = scalar.try_as_usize()?;
        validate_range(Self::NAME, val, MIN_PARALLELISM, MAX_PARALLELISM)?;
        conf.parallelism = val;
        Ok(())
    }

    fn get_as_scalar(conf: &AggregateConfig) -> ScalarValue {
        conf.parallelism.into()
    }
}

const MIN_MERGE_FAN_IN: usize = 2;
const MAX_MERGE_FAN_IN: usize = 1024;

pub struct MergeFanIn;

impl AggregateSetting for MergeFanIn {
    const NAME: &'static str = "merge_fan_in";
    const DESCRIPTION: &'static str = "Maximum number of partial states combined per merge step";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut AggregateConfig) -> Result<()> {
        let val = scalar.try_as_usize()?;
        validate_range(Self::NAME, val, MIN_MERGE_FAN_IN, MAX_MERGE_FAN_IN)?;
        conf.merge_fan_in = val;
        Ok(())
    }

    fn get_as_scalar(conf: &AggregateConfig) -> ScalarValue {
        conf.merge_fan_in.into()
    }
}

const MIN_MERGE_PARTITIONS: usize = 1;
const MAX_MERGE_PARTITIONS: usize = 4096;

pub struct MergePartitions;

impl AggregateSetting for MergePartitions {
    const NAME: &'static str = "merge_partitions";
    const DESCRIPTION: &'static str = "Number of buckets partial results are shuffled into";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut AggregateConfig) -> Result<()> {
        let val = scalar.try_as_usize()?;
        validate_range(Self::NAME, val, MIN_MERGE_PARTITIONS, MAX_MERGE_PARTITIONS)?;
        conf.merge_partitions = val;
        Ok(())
    }

    fn get_as_scalar(conf: &AggregateConfig) -> ScalarValue {
        conf.merge_partitions.into()
    }
}

const MAX_TASK_RETRIES: usize = 64;

pub struct MaxTaskRetries;

impl AggregateSetting for MaxTaskRetries {
    const NAME: &'static str = "max_task_retries";
    const DESCRIPTION: &'static str = "Number of times a failed worker task is retried";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut AggregateConfig) -> Result<()> {
        let val = scalar.try_as_usize()?;
        validate_range(Self::NAME, val, 0, MAX_TASK_RETRIES)?;
        conf.max_task_retries = val;
        Ok(())
    }

    fn get_as_scalar(conf: &AggregateConfig) -> ScalarValue {
        conf.max_task_retries.into()
    }
}
