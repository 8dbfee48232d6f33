//! Run configuration types
//!
//! Defines the data structures for deserializing the YAML file that maps
//! tutorials to the hardware units they are tested on.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;

use crate::common::{Error, Result};
use crate::notebook::literal::str_value;
use crate::preprocess::{merge_layers, ParameterSet};

/// A complete run configuration
#[derive(Deserialize, Debug, Clone)]
pub struct HarnessConfig {
    /// Notebook path (relative to the notebook directory) to its test runs,
    /// in file order
    pub tutorials: IndexMap<String, TutorialConfig>,
    /// Attached hardware units; a unit's id is its index here
    pub connected: Vec<HardwareConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TutorialConfig {
    pub configurations: Vec<TutorialRun>,
}

/// One test run of a tutorial
#[derive(Deserialize, Debug, Clone)]
pub struct TutorialRun {
    /// Hardware units that run this configuration
    pub ids: Vec<usize>,
    /// SimpleSerial protocol version, injected as `SS_VER`
    pub ssver: String,
    pub kwargs: Option<ParameterSet>,
}

/// One physical test rig
#[derive(Deserialize, Debug, Clone)]
pub struct HardwareConfig {
    pub scope: String,
    pub target: String,
    pub firmware: String,
    #[serde(rename = "tutorial type")]
    pub tutorial_type: String,
    /// Numeric serials in YAML stay numeric, so keep the raw value
    #[serde(rename = "serial number")]
    pub serial_number: Option<Value>,
    pub kwargs: Option<ParameterSet>,
}

impl HarnessConfig {
    /// Load and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read run configuration '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: HarnessConfig = serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("run configuration: {}", e)))?;
        for (name, tutorial) in &config.tutorials {
            for run in &tutorial.configurations {
                if let Some(id) = run.ids.iter().find(|id| **id >= config.connected.len()) {
                    tracing::warn!(
                        "{} lists hardware id {} but only {} units are connected",
                        name,
                        id,
                        config.connected.len()
                    );
                }
            }
        }
        Ok(config)
    }

    /// Runs for hardware unit `id`, in configuration order
    pub fn runs_for(&self, id: usize) -> impl Iterator<Item = (&str, &TutorialRun)> {
        self.tutorials.iter().flat_map(move |(name, tutorial)| {
            tutorial
                .configurations
                .iter()
                .filter(move |run| run.ids.contains(&id))
                .map(move |run| (name.as_str(), run))
        })
    }
}

impl HardwareConfig {
    /// Parameters every test on this unit starts from
    pub fn base_parameters(&self, run: &TutorialRun) -> ParameterSet {
        let mut base = ParameterSet::new();
        let text = |s: &str| Value::String(s.to_string());
        base.insert("SCOPETYPE".into(), text(&self.scope));
        base.insert("PLATFORM".into(), text(&self.target));
        base.insert("CRYPTO_TARGET".into(), text(&self.firmware));
        base.insert(
            "serial_number".into(),
            self.serial_number
                .as_ref()
                .map(|sn| Value::String(str_value(sn)))
                .unwrap_or(Value::Null),
        );
        base.insert("VERSION".into(), text(&self.tutorial_type));
        base.insert("SS_VER".into(), text(&run.ssver));
        base
    }
}

/// Kwargs for one test: unit base, then unit kwargs, then run kwargs
pub fn test_parameters(hardware: &HardwareConfig, run: &TutorialRun) -> ParameterSet {
    let base = hardware.base_parameters(run);
    let empty = ParameterSet::new();
    merge_layers([
        &base,
        hardware.kwargs.as_ref().unwrap_or(&empty),
        run.kwargs.as_ref().unwrap_or(&empty),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
tutorials:
  courses/sca101/Lab 2_1.ipynb:
    configurations:
      - ids: [0, 1]
        ssver: SS_VER_1_1
      - ids: [1]
        ssver: SS_VER_2_1
        kwargs:
          allowable_exceptions: [OSError]
          SCOPETYPE: CWNANO
  demos/intro.ipynb:
    configurations:
      - ids: [0]
        ssver: SS_VER_1_1
connected:
  - scope: OPENADC
    target: CWLITEARM
    firmware: TINYAES128C
    tutorial type: HARDWARE
    serial number: 50203120485a3930
  - scope: OPENADC
    target: CWLITEXMEGA
    firmware: AVRCRYPTOLIB
    tutorial type: HARDWARE
    serial number: 442031204743
    kwargs:
      baud: 38400
      SCOPETYPE: CW308
"#;

    #[test]
    fn test_parse() {
        let config = HarnessConfig::parse(CONFIG).unwrap();
        assert_eq!(config.connected.len(), 2);
        assert_eq!(
            config.tutorials.keys().collect::<Vec<_>>(),
            vec!["courses/sca101/Lab 2_1.ipynb", "demos/intro.ipynb"]
        );
        assert_eq!(config.connected[0].tutorial_type, "HARDWARE");
    }

    #[test]
    fn test_runs_for_unit() {
        let config = HarnessConfig::parse(CONFIG).unwrap();
        let unit0: Vec<_> = config.runs_for(0).map(|(nb, run)| (nb, &run.ssver)).collect();
        assert_eq!(
            unit0,
            vec![
                ("courses/sca101/Lab 2_1.ipynb", &"SS_VER_1_1".to_string()),
                ("demos/intro.ipynb", &"SS_VER_1_1".to_string())
            ]
        );
        assert_eq!(config.runs_for(1).count(), 2);
        assert_eq!(config.runs_for(2).count(), 0);
    }

    #[test]
    fn test_layering() {
        let config = HarnessConfig::parse(CONFIG).unwrap();
        let hw = &config.connected[1];
        let run = &config.tutorials["courses/sca101/Lab 2_1.ipynb"].configurations[1];
        let params = test_parameters(hw, run);

        // run kwargs beat unit kwargs beat the base layer
        assert_eq!(params["SCOPETYPE"], Value::String("CWNANO".into()));
        assert_eq!(params["baud"], Value::Number(38400.into()));
        assert_eq!(params["SS_VER"], Value::String("SS_VER_2_1".into()));
        assert_eq!(params["serial_number"], Value::String("442031204743".into()));
        assert_eq!(params["CRYPTO_TARGET"], Value::String("AVRCRYPTOLIB".into()));
    }

    #[test]
    fn test_missing_serial_is_null() {
        let config = HarnessConfig::parse(
            "tutorials: {}\nconnected:\n  - {scope: a, target: b, firmware: c, tutorial type: d}\n",
        )
        .unwrap();
        let run = TutorialRun {
            ids: vec![0],
            ssver: "SS_VER_1_1".into(),
            kwargs: None,
        };
        let params = test_parameters(&config.connected[0], &run);
        assert_eq!(params["serial_number"], Value::Null);
    }

    #[test]
    fn test_parse_error() {
        let err = HarnessConfig::parse("tutorials: [").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
