//! Minimal metrics sink for a pipeline run.
//!
//! Timings are collected in memory as the run progresses and flushed to a
//! JSON summary file under the config's metrics folder when the run ends,
//! success or failure.

use crate::error::Result;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

#[derive(Default, Serialize)]
pub struct Metrics {
    steps: Vec<(String, u128)>,
    run: Vec<(String, String)>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step(&mut self, name: &str, taken: Duration) {
        self.steps.push((name.to_string(), taken.as_millis()));
    }

    pub fn record_run(&mut self, key: &str, value: impl Into<String>) {
        self.run.push((key.to_string(), value.into()));
    }

    pub fn write_summary(&self, metrics_folder: &Path) -> Result<()> {
        std::fs::create_dir_all(metrics_folder)?;
        let path = metrics_folder.join("metrics.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
