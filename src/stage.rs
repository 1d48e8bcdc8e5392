use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named phase of the reduction pipeline, passed straight after `-red`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Stage {
    Tmpl,
    Other(String),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("stage name can't be empty")]
pub struct EmptyStage;

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Tmpl => write!(f, "tmpl"),
            Stage::Other(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for Stage {
    type Err = EmptyStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(EmptyStage),
            "tmpl" => Ok(Stage::Tmpl),
            other => Ok(Stage::Other(other.to_string())),
        }
    }
}

impl TryFrom<String> for Stage {
    type Error = EmptyStage;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Stage> for String {
    fn from(stage: Stage) -> Self {
        stage.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage() {
        assert_eq!("tmpl".parse::<Stage>(), Ok(Stage::Tmpl));
        assert_eq!("diff".parse::<Stage>(), Ok(Stage::Other("diff".to_string())));
        assert_eq!("  ".parse::<Stage>(), Err(EmptyStage));
    }

    #[test]
    fn test_stage_serde() {
        let stage: Stage = serde_json::from_str("\"tmpl\"").unwrap();
        assert_eq!(stage, Stage::Tmpl);
        assert_eq!(serde_json::to_string(&Stage::Other("diff".into())).unwrap(), "\"diff\"");
        assert!(serde_json::from_str::<Stage>("\"\"").is_err());
    }
}
