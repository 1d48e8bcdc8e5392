//! Resource quantities requested from the scheduler.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for memory and time quantities.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QuantityError {
    #[error("Invalid memory quantity: {0:?}")]
    Memory(String),
    #[error("Invalid wall clock limit: {0:?}")]
    WallClock(String),
}

/// Unit suffix understood by `--mem-per-cpu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryUnit {
    K,
    M,
    G,
    T,
}

impl MemoryUnit {
    fn from_suffix(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'K' => Some(MemoryUnit::K),
            'M' => Some(MemoryUnit::M),
            'G' => Some(MemoryUnit::G),
            'T' => Some(MemoryUnit::T),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let suffix = match self {
            MemoryUnit::K => "K",
            MemoryUnit::M => "M",
            MemoryUnit::G => "G",
            MemoryUnit::T => "T",
        };
        f.write_str(suffix)
    }
}

/// Memory per CPU, e.g. "4G".
///
/// A missing unit is left missing so the directive reads exactly as written (SLURM assumes
/// megabytes in that case).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Memory {
    pub amount: u64,
    pub unit: Option<MemoryUnit>,
}

impl Memory {
    pub fn new(amount: u64, unit: MemoryUnit) -> Self {
        Memory { amount, unit: Some(unit) }
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }
}

impl FromStr for Memory {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || QuantityError::Memory(s.to_string());

        let (digits, unit) = match s.chars().last() {
            Some(c) if c.is_ascii_alphabetic() => {
                let unit = MemoryUnit::from_suffix(c).ok_or_else(invalid)?;
                (&s[..s.len() - 1], Some(unit))
            }
            Some(_) => (s, None),
            None => return Err(invalid()),
        };

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let amount = digits.parse::<u64>().map_err(|_| invalid())?;
        Ok(Memory { amount, unit })
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.unit {
            Some(unit) => write!(f, "{}{}", self.amount, unit),
            None => write!(f, "{}", self.amount),
        }
    }
}

impl TryFrom<String> for Memory {
    type Error = QuantityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Memory> for String {
    fn from(memory: Memory) -> Self {
        memory.to_string()
    }
}

/// Wall clock limit, held in seconds and written as `HH:MM:SS`.
///
/// Hours are not folded into days, so 48 hours renders as `48:00:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallClock {
    seconds: u64,
}

impl WallClock {
    pub fn from_secs(seconds: u64) -> Self {
        WallClock { seconds }
    }

    pub fn as_secs(&self) -> u64 {
        self.seconds
    }

    pub fn is_positive(&self) -> bool {
        self.seconds > 0
    }
}

/// Accepts `D-HH:MM:SS`, `HH:MM:SS`, `MM:SS` or plain minutes.
impl FromStr for WallClock {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || QuantityError::WallClock(s.to_string());

        let (days, hms) = match s.split_once('-') {
            Some((d, rest)) => (d.parse::<u64>().map_err(|_| invalid())?, rest),
            None => (0, s),
        };

        let parts = hms
            .split(':')
            .map(|p| {
                if p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid());
                }
                p.parse::<u64>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<u64>, QuantityError>>()?;

        let (h, m, sec) = match (days, parts.as_slice()) {
            (_, [h, m, sec]) => (*h, *m, *sec),
            (0, [m, sec]) => (0, *m, *sec),
            (0, [m]) => (0, *m, 0),
            _ => return Err(invalid()),
        };

        let seconds = days
            .checked_mul(86400)
            .and_then(|total| total.checked_add(h.checked_mul(3600)?))
            .and_then(|total| total.checked_add(m.checked_mul(60)?))
            .and_then(|total| total.checked_add(sec))
            .ok_or_else(invalid)?;

        Ok(WallClock { seconds })
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let hours = self.seconds / 3600;
        let mins = (self.seconds % 3600) / 60;
        let secs = self.seconds % 60;
        write!(f, "{:02}:{:02}:{:02}", hours, mins, secs)
    }
}

impl TryFrom<String> for WallClock {
    type Error = QuantityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WallClock> for String {
    fn from(wall_clock: WallClock) -> Self {
        wall_clock.to_string()
    }
}

/// Everything a job asks the scheduler for, as written in the directive block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resources {
    pub name: String,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub nodes: u32,
    pub tasks_per_node: u32,
    pub cpus_per_task: u32,
    pub mem_per_cpu: Memory,
    pub wall_clock: WallClock,
}
