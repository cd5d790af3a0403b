//! Demo mode: synthetic farms and an in-process ingestion endpoint

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hv_core::{Feature, IngestClient, JobSnapshot, JobStatus, JobTicket, Upload};
use parking_lot::Mutex;
use serde_json::json;

const VILLAGES: [&str; 4] = ["Shirur", "Baramati", "Daund", "Indapur"];

/// Grid of square farms around Pune with deterministic health readings
pub fn demo_features(rows: usize, cols: usize) -> Vec<Feature> {
    let mut features = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let n = row * cols + col;
            let lng = 73.8 + col as f64 * 0.02;
            let lat = 18.4 + row as f64 * 0.02;
            let side = 0.008;
            // Cheap hash so neighbouring farms differ
            let wobble = ((n * 7919) % 100) as f64 / 100.0;
            let recent = 0.3 + wobble * 0.55;
            let previous = (recent - 0.1 + ((n * 31) % 20) as f64 / 100.0).max(0.0);

            let value = json!({
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [lng, lat],
                        [lng + side, lat],
                        [lng + side, lat + side],
                        [lng, lat + side],
                        [lng, lat]
                    ]]
                },
                "properties": {
                    "farm_id": n + 1,
                    "Farmer_Name": format!("Farmer {}", n + 1),
                    "Vill_Name": VILLAGES[col * VILLAGES.len() / cols.max(1)],
                    "Area": 1.0 + (n % 5) as f64 * 0.5,
                    "recent_ndvi": recent,
                    "prev_ndvi": previous,
                    "harvest_flag": u8::from(recent >= 0.7)
                }
            });
            if let Ok(feature) = serde_json::from_value(value) {
                features.push(feature);
            }
        }
    }
    features
}

struct LocalJob {
    file_name: String,
    rows: usize,
    submitted_at: DateTime<Utc>,
    polls: u32,
}

impl LocalJob {
    fn status(&self) -> JobStatus {
        match self.polls {
            0 | 1 => JobStatus::Pending,
            2 => JobStatus::Running,
            _ => JobStatus::Finished,
        }
    }

    fn logs(&self) -> Vec<String> {
        let stamp = |offset_ms: i64| {
            (self.submitted_at + chrono::Duration::milliseconds(offset_ms)).format("%H:%M:%S%.3f")
        };
        let mut logs = vec![format!("[{}] received {}", stamp(0), self.file_name)];
        if self.polls >= 2 {
            logs.push(format!("[{}] parsing {} rows", stamp(1500), self.rows));
        }
        if self.polls >= 3 {
            logs.push(format!("[{}] upserted {} farms", stamp(3000), self.rows));
        }
        logs
    }
}

/// Ingestion endpoint that accepts CSV uploads and finishes them on the third poll
#[derive(Default)]
pub struct LocalIngest {
    jobs: Mutex<HashMap<String, LocalJob>>,
}

impl LocalIngest {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IngestClient for LocalIngest {
    async fn submit(&self, upload: &Upload) -> Result<JobTicket> {
        let text = String::from_utf8_lossy(&upload.bytes);
        let rows = text.lines().skip(1).filter(|line| !line.trim().is_empty()).count();
        if rows == 0 {
            bail!("{} has no data rows", upload.file_name);
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        self.jobs.lock().insert(
            job_id.clone(),
            LocalJob {
                file_name: upload.file_name.clone(),
                rows,
                submitted_at: Utc::now(),
                polls: 0,
            },
        );
        Ok(JobTicket { job_id })
    }

    async fn job(&self, job_id: &str) -> Result<JobSnapshot> {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(job_id) else {
            bail!("404 Not Found: job {}", job_id);
        };
        job.polls += 1;
        Ok(JobSnapshot {
            status: job.status(),
            logs: job.logs(),
        })
    }
}
