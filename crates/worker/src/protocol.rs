//! Message contract between a requesting context and a path worker.
//!
//! The first message is an [`Message::Init`] carrying `[width, height, depth]`; every
//! message after it is a [`JobRequest`], answered by exactly one [`JobResponse`].

use std::fmt;
use std::time::Instant;

use glam::IVec3;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use voxpath_common::{Coord, Volume};
use voxpath_kernel::{CollisionGrid, SearchError, SearchOutcome, find_path};

use crate::config::WorkerConfig;
use crate::stats::{JobOutcome, WorkerStats};

/// Any inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Init([u32; 3]),
    Job(JobRequest),
}

/// Raw collision flags. Accepts a sequence of integers or a byte string on the wire and
/// emits a byte string (which JSON renders as an array).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionBytes(pub Vec<u8>);

impl Serialize for CollisionBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for CollisionBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = CollisionBytes;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a byte string or a sequence of bytes")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(CollisionBytes(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(CollisionBytes(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element::<u8>()? {
                    out.push(b);
                }
                Ok(CollisionBytes(out))
            }
        }

        deserializer.deserialize_any(BytesVisitor)
    }
}

/// One search job. Only `id` is required to decode; missing fields are reported back as
/// `malformed_request` in the job's response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: u64,
    /// Opaque token echoed back unchanged.
    #[serde(default)]
    pub e: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision: Option<CollisionBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sx: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sy: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sz: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dx: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dy: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dz: Option<i64>,
}

impl JobRequest {
    pub fn new(id: u64, collision: Vec<u8>, start: Coord, dest: Coord) -> Self {
        Self {
            id,
            e: Value::Null,
            collision: Some(CollisionBytes(collision)),
            sx: Some(start.x.into()),
            sy: Some(start.y.into()),
            sz: Some(start.z.into()),
            dx: Some(dest.x.into()),
            dy: Some(dest.y.into()),
            dz: Some(dest.z.into()),
        }
    }

    pub fn with_echo(mut self, e: Value) -> Self {
        self.e = e;
        self
    }
}

/// Failure classes reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    OutOfBounds,
    InvalidStep,
    MalformedRequest,
    NotConfigured,
}

/// Result part of a response: `[...]` a path, `null` no path, `{error, message}` a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Path(Vec<u16>),
    NoPath,
    Failed { error: ErrorKind, message: String },
}

/// Answer to one job, sent as `[id, e, payload]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(u64, Value, Payload)", into = "(u64, Value, Payload)")]
pub struct JobResponse {
    pub id: u64,
    pub e: Value,
    pub payload: Payload,
}

impl From<(u64, Value, Payload)> for JobResponse {
    fn from((id, e, payload): (u64, Value, Payload)) -> Self {
        Self { id, e, payload }
    }
}

impl From<JobResponse> for (u64, Value, Payload) {
    fn from(r: JobResponse) -> Self {
        (r.id, r.e, r.payload)
    }
}

/// Errors scoped to a single job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("worker has not been given its volume")]
    NotConfigured,
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error(transparent)]
    Search(#[from] SearchError),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::NotConfigured => ErrorKind::NotConfigured,
            JobError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            JobError::Search(SearchError::OutOfBounds(_)) => ErrorKind::OutOfBounds,
            JobError::Search(SearchError::BlockedEndpoint { .. }) => ErrorKind::MalformedRequest,
            JobError::Search(SearchError::InvalidStep(_)) => ErrorKind::InvalidStep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Unconfigured,
    Ready(Volume),
}

/// The worker side of the protocol. Handles one message at a time, in order.
#[derive(Debug)]
pub struct PathWorker {
    state: WorkerState,
    stats: WorkerStats,
    log_every: u64,
}

impl Default for PathWorker {
    fn default() -> Self {
        Self::new(&WorkerConfig::default())
    }
}

impl PathWorker {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            state: WorkerState::Unconfigured,
            stats: WorkerStats::new(config.latency_window),
            log_every: config.log_every,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn into_stats(self) -> WorkerStats {
        self.stats
    }

    /// Handle one inbound message. Returns the response for jobs, nothing for init.
    pub fn handle(&mut self, message: Message) -> Option<JobResponse> {
        match message {
            Message::Init(dims) => {
                self.configure(dims);
                None
            }
            Message::Job(job) => Some(self.run_job(job)),
        }
    }

    fn configure(&mut self, [width, height, depth]: [u32; 3]) {
        if let WorkerState::Ready(volume) = self.state {
            tracing::warn!(?volume, "ignoring init message, volume already configured");
            return;
        }
        match Volume::new(width, height, depth) {
            Ok(volume) => {
                tracing::info!(width, height, depth, "worker volume configured");
                self.state = WorkerState::Ready(volume);
            }
            Err(e) => tracing::error!(error = %e, "rejecting init message"),
        }
    }

    /// Run one job to completion and build its response.
    pub fn run_job(&mut self, mut job: JobRequest) -> JobResponse {
        let _span = tracing::info_span!("job", id = job.id).entered();
        let started = Instant::now();
        let id = job.id;
        let e = std::mem::take(&mut job.e);

        let (payload, outcome) = match self.solve(job) {
            Ok(SearchOutcome::Found(route)) => (
                Payload::Path(route.steps),
                JobOutcome::Found {
                    expanded: route.expanded,
                },
            ),
            Ok(SearchOutcome::Exhausted { expanded }) => {
                (Payload::NoPath, JobOutcome::NoPath { expanded })
            }
            Err(err) => {
                tracing::debug!(error = %err, "job failed");
                (
                    Payload::Failed {
                        error: err.kind(),
                        message: err.to_string(),
                    },
                    JobOutcome::Failed,
                )
            }
        };
        self.finish(outcome, started);
        JobResponse { id, e, payload }
    }

    /// Answer a job whose body could not be decoded.
    pub fn reject(&mut self, id: u64, e: Value, reason: &str) -> JobResponse {
        let err = JobError::MalformedRequest(reason.to_string());
        self.finish(JobOutcome::Failed, Instant::now());
        JobResponse {
            id,
            e,
            payload: Payload::Failed {
                error: err.kind(),
                message: err.to_string(),
            },
        }
    }

    fn solve(&self, job: JobRequest) -> Result<SearchOutcome, JobError> {
        let WorkerState::Ready(volume) = self.state else {
            return Err(JobError::NotConfigured);
        };
        let start = coord([job.sx, job.sy, job.sz], "start")?;
        let dest = coord([job.dx, job.dy, job.dz], "destination")?;
        let collision = job
            .collision
            .ok_or_else(|| JobError::MalformedRequest("missing field `collision`".into()))?;
        let grid = CollisionGrid::from_raw(volume, collision.0)
            .map_err(|e| JobError::MalformedRequest(e.to_string()))?;
        Ok(find_path(&grid, start, dest)?)
    }

    fn finish(&mut self, outcome: JobOutcome, started: Instant) {
        self.stats.record(outcome, started.elapsed());
        tracing::trace!(?outcome, "job complete");
        if self.log_every > 0 && self.stats.jobs % self.log_every == 0 {
            tracing::info!(
                jobs = self.stats.jobs,
                found = self.stats.found,
                no_path = self.stats.no_path,
                failed = self.stats.failed,
                avg = ?self.stats.latency.average(),
                "worker stats"
            );
        }
    }
}

fn coord(parts: [Option<i64>; 3], which: &str) -> Result<Coord, JobError> {
    let mut out = [0i32; 3];
    for (slot, part) in out.iter_mut().zip(parts) {
        let v = part.ok_or_else(|| {
            JobError::MalformedRequest(format!("missing {which} coordinate"))
        })?;
        // Values beyond i32 are out of any volume; clamping keeps them out of bounds.
        *slot = v.clamp(i32::MIN.into(), i32::MAX.into()) as i32;
    }
    Ok(IVec3::from_array(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voxpath_kernel::trace;

    fn ready_worker(dims: [u32; 3]) -> PathWorker {
        let mut worker = PathWorker::default();
        assert!(worker.handle(Message::Init(dims)).is_none());
        worker
    }

    #[test]
    fn first_message_configures_volume() {
        let worker = ready_worker([10, 10, 1]);
        assert_eq!(
            worker.state(),
            WorkerState::Ready(Volume::new(10, 10, 1).unwrap())
        );
    }

    #[test]
    fn job_before_init_is_not_configured() {
        let mut worker = PathWorker::default();
        let resp = worker
            .handle(Message::Job(JobRequest::new(
                7,
                vec![0; 4],
                IVec3::ZERO,
                IVec3::ZERO,
            )))
            .unwrap();
        assert_eq!(resp.id, 7);
        assert!(matches!(
            resp.payload,
            Payload::Failed {
                error: ErrorKind::NotConfigured,
                ..
            }
        ));
        assert_eq!(worker.state(), WorkerState::Unconfigured);
    }

    #[test]
    fn second_init_is_ignored() {
        let mut worker = ready_worker([4, 4, 1]);
        assert!(worker.handle(Message::Init([8, 8, 8])).is_none());
        assert_eq!(
            worker.state(),
            WorkerState::Ready(Volume::new(4, 4, 1).unwrap())
        );
    }

    #[test]
    fn invalid_init_leaves_worker_unconfigured() {
        let mut worker = PathWorker::default();
        worker.handle(Message::Init([0, 4, 4]));
        assert_eq!(worker.state(), WorkerState::Unconfigured);
    }

    #[test]
    fn job_returns_path_and_echo() {
        let mut worker = ready_worker([10, 10, 1]);
        let job = JobRequest::new(1, vec![0; 100], IVec3::ZERO, IVec3::new(3, 0, 0))
            .with_echo(json!({"unit": "scout"}));
        let resp = worker.handle(Message::Job(job)).unwrap();
        assert_eq!(resp.id, 1);
        assert_eq!(resp.e, json!({"unit": "scout"}));
        let Payload::Path(steps) = resp.payload else {
            panic!("expected a path");
        };
        assert_eq!(steps.len(), 3);
        assert_eq!(
            trace(IVec3::ZERO, &steps).unwrap().last().copied(),
            Some(IVec3::new(3, 0, 0))
        );
        assert_eq!(worker.stats().found, 1);
    }

    #[test]
    fn unreachable_destination_is_no_path() {
        let mut worker = ready_worker([3, 3, 1]);
        let mut collision = vec![0; 9];
        // Wall off the right column.
        for y in 0..3 {
            collision[1 + 3 * y] = 1;
        }
        let job = JobRequest::new(2, collision, IVec3::ZERO, IVec3::new(2, 2, 0));
        let resp = worker.run_job(job);
        assert_eq!(resp.payload, Payload::NoPath);
        assert_eq!(worker.stats().no_path, 1);
    }

    #[test]
    fn mis_sized_collision_is_malformed() {
        let mut worker = ready_worker([4, 4, 1]);
        let resp = worker.run_job(JobRequest::new(3, vec![0; 15], IVec3::ZERO, IVec3::ONE));
        assert!(matches!(
            resp.payload,
            Payload::Failed {
                error: ErrorKind::MalformedRequest,
                ..
            }
        ));
    }

    #[test]
    fn missing_fields_are_malformed() {
        let mut worker = ready_worker([4, 4, 1]);
        let resp = worker.run_job(JobRequest {
            id: 4,
            ..JobRequest::default()
        });
        assert!(matches!(
            resp.payload,
            Payload::Failed {
                error: ErrorKind::MalformedRequest,
                ..
            }
        ));
    }

    #[test]
    fn blocked_endpoint_is_malformed() {
        let mut worker = ready_worker([4, 4, 1]);
        let mut collision = vec![0; 16];
        collision[0] = 1;
        let job = JobRequest::new(5, collision, IVec3::ZERO, IVec3::new(3, 3, 0));
        let resp = worker.run_job(job);
        assert!(matches!(
            resp.payload,
            Payload::Failed {
                error: ErrorKind::MalformedRequest,
                ..
            }
        ));
    }

    #[test]
    fn out_of_volume_endpoint_is_out_of_bounds() {
        let mut worker = ready_worker([4, 4, 1]);
        let mut job = JobRequest::new(6, vec![0; 16], IVec3::ZERO, IVec3::ZERO);
        job.dx = Some(-3);
        let resp = worker.run_job(job);
        assert!(matches!(
            resp.payload,
            Payload::Failed {
                error: ErrorKind::OutOfBounds,
                ..
            }
        ));
    }

    #[test]
    fn failures_do_not_stop_later_jobs() {
        let mut worker = ready_worker([4, 4, 1]);
        worker.run_job(JobRequest::new(1, vec![0; 3], IVec3::ZERO, IVec3::ONE));
        let job = JobRequest::new(2, vec![0; 16], IVec3::ZERO, IVec3::new(3, 0, 0));
        let resp = worker.run_job(job);
        assert!(matches!(resp.payload, Payload::Path(ref p) if p.len() == 3));
        assert_eq!(worker.stats().failed, 1);
        assert_eq!(worker.stats().jobs, 2);
    }

    #[test]
    fn start_equals_destination_is_empty_path() {
        let mut worker = ready_worker([4, 4, 1]);
        let here = IVec3::new(1, 1, 0);
        let resp = worker.run_job(JobRequest::new(8, vec![0; 16], here, here));
        assert_eq!(resp.payload, Payload::Path(Vec::new()));
    }

    #[test]
    fn wire_shapes() {
        let init: Message = serde_json::from_value(json!([10, 10, 1])).unwrap();
        assert_eq!(init, Message::Init([10, 10, 1]));

        let job: Message = serde_json::from_value(json!({
            "id": 3, "e": "tok", "collision": [0, 0, 1, 0],
            "sx": 0, "sy": 0, "sz": 0, "dx": 1, "dy": 1, "dz": 0
        }))
        .unwrap();
        let Message::Job(job) = job else {
            panic!("expected a job");
        };
        assert_eq!(job.collision, Some(CollisionBytes(vec![0, 0, 1, 0])));
        assert_eq!(job.e, json!("tok"));

        let found = JobResponse {
            id: 3,
            e: json!("tok"),
            payload: Payload::Path(vec![2, 2]),
        };
        assert_eq!(serde_json::to_value(&found).unwrap(), json!([3, "tok", [2, 2]]));

        let none = JobResponse {
            id: 4,
            e: Value::Null,
            payload: Payload::NoPath,
        };
        let text = serde_json::to_string(&none).unwrap();
        assert_eq!(text, "[4,null,null]");
        assert_eq!(serde_json::from_str::<JobResponse>(&text).unwrap(), none);

        let failed = JobResponse {
            id: 5,
            e: Value::Null,
            payload: Payload::Failed {
                error: ErrorKind::OutOfBounds,
                message: "x".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!([5, null, {"error": "out_of_bounds", "message": "x"}])
        );
    }
}
