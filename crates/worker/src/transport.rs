//! Byte-stream transport for a [`PathWorker`].
//!
//! Two framings:
//! - `json`: one JSON value per line.
//! - `cbor`: a 4-byte little-endian length followed by one CBOR value.
//!
//! A message that does not fit the protocol is answered as `malformed_request` when its
//! `id` can be recovered, and otherwise logged and skipped. Unparseable input, including
//! lines that are not UTF-8, is skipped the same way; only I/O failures end a session.
//!
//! The echo token `e` is carried as a JSON value on both framings. On the CBOR framing it
//! must therefore be plain data: a byte string or a tagged value in `e` makes the job
//! `malformed_request`, answered with a `null` token.

use std::io::{self, BufRead, Read, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::WorkerConfig;
use crate::protocol::{JobResponse, Message, PathWorker};
use crate::stats::WorkerStats;

/// Frames larger than this are skipped unread.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Json,
    Cbor,
}

impl FromStr for WireFormat {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(WireFormat::Json),
            "cbor" => Ok(WireFormat::Cbor),
            other => Err(TransportError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("unknown wire format `{0}` (expected json or cbor)")]
    UnknownFormat(String),
}

/// What one inbound frame turned into.
enum Decoded {
    Message(Message),
    /// Decoded far enough to recover the job id, but not into a request.
    Rejected { id: u64, e: Value, reason: String },
    Dropped(String),
}

/// Serve the protocol until `reader` reaches end of input. Returns the worker's stats.
pub fn serve<R: BufRead, W: Write>(
    reader: R,
    writer: W,
    config: &WorkerConfig,
) -> Result<WorkerStats, TransportError> {
    let _span = tracing::info_span!("serve", format = ?config.format).entered();
    let mut worker = PathWorker::new(config);
    match config.format {
        WireFormat::Json => serve_json(reader, writer, &mut worker)?,
        WireFormat::Cbor => serve_cbor(reader, writer, &mut worker)?,
    }
    tracing::info!(jobs = worker.stats().jobs, "input closed, worker stopping");
    Ok(worker.into_stats())
}

fn dispatch(worker: &mut PathWorker, decoded: Decoded) -> Option<JobResponse> {
    match decoded {
        Decoded::Message(message) => worker.handle(message),
        Decoded::Rejected { id, e, reason } => {
            tracing::warn!(id, %reason, "rejecting undecodable job");
            Some(worker.reject(id, e, &reason))
        }
        Decoded::Dropped(reason) => {
            tracing::warn!(%reason, "dropping message without a job id");
            None
        }
    }
}

fn serve_json<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    worker: &mut PathWorker,
) -> Result<(), TransportError> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        if line.trim_ascii().is_empty() {
            continue;
        }
        if let Some(response) = dispatch(worker, decode_json(&line)) {
            serde_json::to_writer(&mut writer, &response)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
    }
}

fn decode_json(line: &[u8]) -> Decoded {
    let value: Value = match serde_json::from_slice(line) {
        Ok(v) => v,
        Err(e) => return Decoded::Dropped(e.to_string()),
    };
    let id = value.get("id").and_then(Value::as_u64);
    let e = value.get("e").cloned().unwrap_or(Value::Null);
    match serde_json::from_value::<Message>(value) {
        Ok(message) => Decoded::Message(message),
        Err(err) => match id {
            Some(id) => Decoded::Rejected {
                id,
                e,
                reason: err.to_string(),
            },
            None => Decoded::Dropped(err.to_string()),
        },
    }
}

fn serve_cbor<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    worker: &mut PathWorker,
) -> Result<(), TransportError> {
    while let Some(frame) = read_frame(&mut reader)? {
        if let Some(response) = dispatch(worker, decode_cbor(&frame)) {
            write_frame(&mut writer, &response)?;
        }
    }
    Ok(())
}

/// Read one length-prefixed frame. `None` at a clean end of input.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError> {
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_BYTES {
        tracing::warn!(len, "skipping oversized frame");
        io::copy(&mut reader.take(len as u64), &mut io::sink())?;
        return Ok(Some(Vec::new()));
    }
    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame)?;
    Ok(Some(frame))
}

/// Write `value` as one length-prefixed CBOR frame.
pub fn write_frame<W: Write, T: Serialize>(
    writer: &mut W,
    value: &T,
) -> Result<(), TransportError> {
    let mut body = Vec::new();
    ciborium::into_writer(value, &mut body)
        .map_err(|e| TransportError::CborEncode(e.to_string()))?;
    let len = u32::try_from(body.len())
        .map_err(|_| TransportError::CborEncode(format!("frame of {} bytes", body.len())))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

fn decode_cbor(frame: &[u8]) -> Decoded {
    let value: ciborium::Value = match ciborium::from_reader(frame) {
        Ok(v) => v,
        Err(e) => return Decoded::Dropped(e.to_string()),
    };
    let field = |name: &str| {
        value.as_map().and_then(|entries| {
            entries
                .iter()
                .find(|(k, _)| k.as_text() == Some(name))
                .map(|(_, v)| v.clone())
        })
    };
    let id = field("id")
        .and_then(|v| v.as_integer())
        .and_then(|i| u64::try_from(i).ok());
    let e = field("e")
        .and_then(|v| v.deserialized::<Value>().ok())
        .unwrap_or(Value::Null);
    match value.deserialized::<Message>() {
        Ok(message) => Decoded::Message(message),
        Err(err) => match id {
            Some(id) => Decoded::Rejected {
                id,
                e,
                reason: err.to_string(),
            },
            None => Decoded::Dropped(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorKind, JobRequest, Payload};
    use glam::IVec3;
    use serde_json::json;
    use std::io::Cursor;

    fn run_json(input: &str) -> Vec<JobResponse> {
        let mut out = Vec::new();
        serve(Cursor::new(input), &mut out, &WorkerConfig::default()).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn json_lines_session() {
        let job = json!({
            "id": 1, "e": 9, "collision": vec![0; 100],
            "sx": 0, "sy": 0, "sz": 0, "dx": 3, "dy": 0, "dz": 0
        });
        let input = format!("[10,10,1]\n\n{job}\n");
        let responses = run_json(&input);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, 1);
        assert_eq!(responses[0].e, json!(9));
        assert!(matches!(&responses[0].payload, Payload::Path(p) if p.len() == 3));
    }

    #[test]
    fn undecodable_job_with_id_is_rejected() {
        let input = "[4,4,1]\n{\"id\": 5, \"e\": \"x\", \"collision\": \"nope\"}\n";
        let responses = run_json(input);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, 5);
        assert_eq!(responses[0].e, json!("x"));
        assert!(matches!(
            responses[0].payload,
            Payload::Failed {
                error: ErrorKind::MalformedRequest,
                ..
            }
        ));
    }

    #[test]
    fn garbage_without_id_is_skipped() {
        let job = json!({
            "id": 2, "collision": vec![0; 16],
            "sx": 0, "sy": 0, "sz": 0, "dx": 1, "dy": 0, "dz": 0
        });
        let input = format!("[4,4,1]\nnot json\n{{\"x\": 1}}\n{job}\n");
        let responses = run_json(&input);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, 2);
    }

    #[test]
    fn invalid_utf8_line_does_not_end_session() {
        let job = |id: u64| {
            json!({
                "id": id, "collision": vec![0; 16],
                "sx": 0, "sy": 0, "sz": 0, "dx": 3, "dy": 0, "dz": 0
            })
        };
        let mut input = b"[4,4,1]\n".to_vec();
        input.extend_from_slice(format!("{}\n", job(1)).as_bytes());
        input.extend_from_slice(b"\xff\xfe\n");
        input.extend_from_slice(format!("{}\n", job(2)).as_bytes());

        let mut out = Vec::new();
        let stats = serve(Cursor::new(input), &mut out, &WorkerConfig::default()).unwrap();
        assert_eq!(stats.jobs, 2);
        let ids: Vec<u64> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<JobResponse>(l).unwrap().id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn final_line_without_newline_is_served() {
        let job = json!({
            "id": 3, "collision": vec![0; 4],
            "sx": 0, "sy": 0, "sz": 0, "dx": 1, "dy": 1, "dz": 0
        });
        let responses = run_json(&format!("[2,2,1]\n{job}"));
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, 3);
    }

    #[test]
    fn cbor_byte_string_echo_is_rejected() {
        use ciborium::Value as Cbor;
        let int = |n: u8| Cbor::Integer(n.into());
        let job = Cbor::Map(
            [
                ("id", int(4)),
                ("e", Cbor::Bytes(vec![1, 2])),
                ("collision", Cbor::Bytes(vec![0; 4])),
                ("sx", int(0)),
                ("sy", int(0)),
                ("sz", int(0)),
                ("dx", int(1)),
                ("dy", int(0)),
                ("dz", int(0)),
            ]
            .into_iter()
            .map(|(k, v)| (Cbor::Text(k.into()), v))
            .collect(),
        );
        let mut input = Vec::new();
        write_frame(&mut input, &Message::Init([2, 2, 1])).unwrap();
        write_frame(&mut input, &job).unwrap();

        let config = WorkerConfig {
            format: WireFormat::Cbor,
            ..WorkerConfig::default()
        };
        let mut out = Vec::new();
        serve(Cursor::new(input), &mut out, &config).unwrap();
        let frame = read_frame(&mut Cursor::new(out)).unwrap().unwrap();
        let response: JobResponse = ciborium::from_reader(frame.as_slice()).unwrap();
        assert_eq!(response.id, 4);
        assert_eq!(response.e, Value::Null);
        assert!(matches!(
            response.payload,
            Payload::Failed {
                error: ErrorKind::MalformedRequest,
                ..
            }
        ));
    }

    #[test]
    fn cbor_frames_session() {
        let mut input = Vec::new();
        write_frame(&mut input, &Message::Init([10, 10, 1])).unwrap();
        let job = JobRequest::new(11, vec![0; 100], IVec3::ZERO, IVec3::new(3, 0, 0))
            .with_echo(json!("tok"));
        write_frame(&mut input, &Message::Job(job)).unwrap();

        let config = WorkerConfig {
            format: WireFormat::Cbor,
            ..WorkerConfig::default()
        };
        let mut out = Vec::new();
        let stats = serve(Cursor::new(input), &mut out, &config).unwrap();
        assert_eq!(stats.jobs, 1);

        let mut reader = Cursor::new(out);
        let frame = read_frame(&mut reader).unwrap().unwrap();
        let response: JobResponse = ciborium::from_reader(frame.as_slice()).unwrap();
        assert_eq!(response.id, 11);
        assert_eq!(response.e, json!("tok"));
        assert!(matches!(&response.payload, Payload::Path(p) if p.len() == 3));
        assert!(read_frame(&mut reader).unwrap().is_none());
    }

    #[test]
    fn wire_format_parses() {
        assert_eq!("json".parse::<WireFormat>().unwrap(), WireFormat::Json);
        assert_eq!("CBOR".parse::<WireFormat>().unwrap(), WireFormat::Cbor);
        assert!("xml".parse::<WireFormat>().is_err());
    }
}
